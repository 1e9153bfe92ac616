//! Load generator and scrape client for the RED metrics demo service.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

#[derive(Parser)]
#[command(name = "red-loadgen")]
#[command(about = "Traffic generator for the RED metrics demo service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check service liveness
    Health,
    /// Fire requests at /work and report the status tally
    Work {
        /// Total number of requests
        #[arg(short = 'n', long, default_value_t = 100)]
        requests: usize,

        /// Number of concurrent callers
        #[arg(short, long, default_value_t = 8)]
        concurrency: usize,
    },
    /// Print the current metrics exposition
    Scrape,
}

#[derive(Debug, Default, Serialize)]
struct Tally {
    requests: usize,
    transport_errors: usize,
    by_status: BTreeMap<u16, usize>,
    elapsed_ms: u128,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Health => {
            let res = client.get(format!("{}/health", cli.url)).send().await?;
            println!("{} {}", res.status(), res.text().await?);
        }
        Commands::Scrape => {
            let res = client.get(format!("{}/metrics", cli.url)).send().await?;
            print!("{}", res.text().await?);
        }
        Commands::Work { requests, concurrency } => {
            let tally = run_work(&client, &cli.url, requests, concurrency.max(1)).await;
            println!("{}", serde_json::to_string_pretty(&tally)?);
        }
    }

    Ok(())
}

async fn run_work(client: &reqwest::Client, base: &str, requests: usize, concurrency: usize) -> Tally {
    let url = format!("{}/work", base);
    let tally = Arc::new(Mutex::new(Tally::default()));
    let start = Instant::now();

    let mut tasks = Vec::with_capacity(concurrency);
    for worker in 0..concurrency {
        // Spread the remainder over the first workers
        let share = requests / concurrency + usize::from(worker < requests % concurrency);
        let client = client.clone();
        let url = url.clone();
        let tally = tally.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..share {
                let outcome = client.get(&url).send().await;
                let mut t = tally.lock().await;
                t.requests += 1;
                match outcome {
                    Ok(res) => *t.by_status.entry(res.status().as_u16()).or_default() += 1,
                    Err(_) => t.transport_errors += 1,
                }
            }
        }));
    }
    for task in tasks {
        let _ = task.await;
    }

    let mut tally = std::mem::take(&mut *tally.lock().await);
    tally.elapsed_ms = start.elapsed().as_millis();
    tally
}
