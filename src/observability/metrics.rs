//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Hold labelled counter and histogram families for the lifetime of the process
//! - Accept observations from concurrently running handlers
//! - Render a Prometheus-compatible text snapshot on demand
//!
//! # Metrics
//! - `http_requests_total` (counter): requests by method, path, status
//! - `http_request_duration_seconds` (histogram): latency by method, path
//!
//! # Design Decisions
//! - The registry is built once and shared through `Arc`, never a global
//! - Counter updates are atomic increments per label tuple
//! - Each histogram tuple sits behind its own mutex so buckets, sum and count
//!   are always read and written together
//! - Registration order is render order; label tuples render sorted

use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

/// Latency buckets in seconds.
pub const LATENCY_BUCKETS: [f64; 10] = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0];

fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn escape_help(v: &str) -> String {
    v.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Format a float the way the Python Prometheus client does: `+Inf`, `-Inf`,
/// `NaN`, integral values with one decimal (`1.0`), shortest form otherwise.
fn format_float(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "+Inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{:.1}", v)
    } else {
        v.to_string()
    }
}

fn label_pairs(names: &[String], values: &[String]) -> String {
    names
        .iter()
        .zip(values)
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
        .collect::<Vec<_>>()
        .join(",")
}

/// Wrap rendered label pairs in braces; unlabelled samples carry none.
fn braced(pairs: &str) -> String {
    if pairs.is_empty() {
        String::new()
    } else {
        format!("{{{}}}", pairs)
    }
}

fn to_key(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Counter family keyed by label values.
struct CounterVec {
    labels: Vec<String>,
    map: DashMap<Vec<String>, AtomicU64>,
}

impl CounterVec {
    fn inc(&self, values: &[&str]) {
        let key = to_key(values);
        if let Some(counter) = self.map.get(&key) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.map
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    fn get(&self, values: &[&str]) -> u64 {
        self.map
            .get(&to_key(values))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, out: &mut String) {
        let mut rows: Vec<(Vec<String>, u64)> = self
            .map
            .iter()
            .map(|r| (r.key().clone(), r.value().load(Ordering::Relaxed)))
            .collect();
        rows.sort();

        for (key, val) in rows {
            let _ = writeln!(out, "{}{} {}", name, braced(&label_pairs(&self.labels, &key)), val);
        }
    }
}

/// Observations for one label tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    /// Cumulative count per bucket, aligned with the family's bounds.
    pub buckets: Vec<u64>,
    pub count: u64,
    pub sum: f64,
}

impl HistogramSnapshot {
    fn empty(bounds: usize) -> Self {
        Self {
            buckets: vec![0; bounds],
            count: 0,
            sum: 0.0,
        }
    }
}

/// Histogram family keyed by label values.
struct HistogramVec {
    labels: Vec<String>,
    bounds: Vec<f64>,
    map: DashMap<Vec<String>, Mutex<HistogramSnapshot>>,
}

impl HistogramVec {
    fn observe(&self, values: &[&str], seconds: f64) {
        let apply = |state: &Mutex<HistogramSnapshot>| {
            let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
            state.count += 1;
            state.sum += seconds;
            // Cumulative: every bucket whose bound covers the value
            for (i, &le) in self.bounds.iter().enumerate() {
                if seconds <= le {
                    state.buckets[i] += 1;
                }
            }
        };

        let key = to_key(values);
        if let Some(state) = self.map.get(&key) {
            apply(state.value());
            return;
        }
        let entry = self
            .map
            .entry(key)
            .or_insert_with(|| Mutex::new(HistogramSnapshot::empty(self.bounds.len())));
        apply(entry.value());
    }

    fn snapshot(&self, values: &[&str]) -> Option<HistogramSnapshot> {
        self.map
            .get(&to_key(values))
            .map(|s| s.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn render(&self, name: &str, out: &mut String) {
        let mut rows: Vec<(Vec<String>, HistogramSnapshot)> = self
            .map
            .iter()
            .map(|r| {
                let state = r.value().lock().unwrap_or_else(|e| e.into_inner()).clone();
                (r.key().clone(), state)
            })
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));

        for (key, state) in rows {
            let labels = label_pairs(&self.labels, &key);
            let prefix = if labels.is_empty() {
                String::new()
            } else {
                format!("{},", labels)
            };

            for (le, count) in self.bounds.iter().zip(&state.buckets) {
                let _ = writeln!(
                    out,
                    "{}_bucket{{{}le=\"{}\"}} {}",
                    name,
                    prefix,
                    format_float(*le),
                    count
                );
            }
            let _ = writeln!(out, "{}_bucket{{{}le=\"+Inf\"}} {}", name, prefix, state.count);
            let _ = writeln!(out, "{}_sum{} {}", name, braced(&labels), format_float(state.sum));
            let _ = writeln!(out, "{}_count{} {}", name, braced(&labels), state.count);
        }
    }
}

enum Family {
    Counter(CounterVec),
    Histogram(HistogramVec),
}

impl Family {
    fn kind(&self) -> &'static str {
        match self {
            Family::Counter(_) => "counter",
            Family::Histogram(_) => "histogram",
        }
    }

    fn labels(&self) -> &[String] {
        match self {
            Family::Counter(c) => &c.labels,
            Family::Histogram(h) => &h.labels,
        }
    }
}

struct Metric {
    name: String,
    help: String,
    family: Family,
}

/// Builder for a [`Registry`]. Metrics are fixed once built.
#[derive(Default)]
pub struct RegistryBuilder {
    metrics: Vec<Metric>,
}

impl RegistryBuilder {
    /// Register a counter family.
    pub fn counter(mut self, name: &str, help: &str, labels: &[&str]) -> Self {
        self.push(
            name,
            help,
            Family::Counter(CounterVec {
                labels: to_key(labels),
                map: DashMap::new(),
            }),
        );
        self
    }

    /// Register a histogram family with ascending bucket upper bounds.
    ///
    /// # Panics
    /// If the bounds are not strictly ascending and finite.
    pub fn histogram(mut self, name: &str, help: &str, labels: &[&str], buckets: &[f64]) -> Self {
        assert!(
            buckets.iter().all(|b| b.is_finite()) && buckets.windows(2).all(|w| w[0] < w[1]),
            "histogram {} buckets must be finite and strictly ascending",
            name
        );
        self.push(
            name,
            help,
            Family::Histogram(HistogramVec {
                labels: to_key(labels),
                bounds: buckets.to_vec(),
                map: DashMap::new(),
            }),
        );
        self
    }

    fn push(&mut self, name: &str, help: &str, family: Family) {
        assert!(
            self.metrics.iter().all(|m| m.name != name),
            "metric {} registered twice",
            name
        );
        self.metrics.push(Metric {
            name: name.to_string(),
            help: help.to_string(),
            family,
        });
    }

    pub fn build(self) -> Registry {
        let index = self
            .metrics
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name.clone(), i))
            .collect();
        Registry {
            metrics: self.metrics,
            index,
        }
    }
}

/// Process-wide metric registry.
///
/// Misuse (unknown name, wrong kind, wrong label arity, negative duration)
/// is a programming error and panics.
pub struct Registry {
    metrics: Vec<Metric>,
    index: HashMap<String, usize>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    fn lookup(&self, name: &str, values: &[&str]) -> &Family {
        let metric = self
            .index
            .get(name)
            .map(|&i| &self.metrics[i])
            .unwrap_or_else(|| panic!("metric {} is not registered", name));
        let declared = metric.family.labels().len();
        assert_eq!(
            declared,
            values.len(),
            "metric {} takes {} label values, got {}",
            name,
            declared,
            values.len()
        );
        &metric.family
    }

    /// Increment a counter tuple by one, creating it on first use.
    pub fn increment_counter(&self, name: &str, values: &[&str]) {
        match self.lookup(name, values) {
            Family::Counter(c) => c.inc(values),
            other => panic!("metric {} is a {}, not a counter", name, other.kind()),
        }
    }

    /// Record a duration in seconds into a histogram tuple.
    pub fn record_duration(&self, name: &str, values: &[&str], seconds: f64) {
        assert!(
            seconds >= 0.0,
            "metric {} observed invalid duration {}",
            name,
            seconds
        );
        match self.lookup(name, values) {
            Family::Histogram(h) => h.observe(values, seconds),
            other => panic!("metric {} is a {}, not a histogram", name, other.kind()),
        }
    }

    /// Current value of a counter tuple (0 if never incremented).
    pub fn counter_value(&self, name: &str, values: &[&str]) -> u64 {
        match self.lookup(name, values) {
            Family::Counter(c) => c.get(values),
            other => panic!("metric {} is a {}, not a counter", name, other.kind()),
        }
    }

    /// Current state of a histogram tuple, `None` if never observed.
    pub fn histogram_snapshot(&self, name: &str, values: &[&str]) -> Option<HistogramSnapshot> {
        match self.lookup(name, values) {
            Family::Histogram(h) => h.snapshot(values),
            other => panic!("metric {} is a {}, not a histogram", name, other.kind()),
        }
    }

    /// Bucket upper bounds of a histogram family.
    pub fn histogram_bounds(&self, name: &str) -> Option<&[f64]> {
        self.index.get(name).and_then(|&i| match &self.metrics[i].family {
            Family::Histogram(h) => Some(h.bounds.as_slice()),
            Family::Counter(_) => None,
        })
    }

    /// Render every registered metric in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for metric in &self.metrics {
            let _ = writeln!(out, "# HELP {} {}", metric.name, escape_help(&metric.help));
            let _ = writeln!(out, "# TYPE {} {}", metric.name, metric.family.kind());
            match &metric.family {
                Family::Counter(c) => c.render(&metric.name, &mut out),
                Family::Histogram(h) => h.render(&metric.name, &mut out),
            }
        }
        out
    }
}

/// RED metric set served by this process.
pub struct RedMetrics {
    registry: Registry,
}

impl RedMetrics {
    pub fn new() -> Self {
        let registry = Registry::builder()
            .counter(
                HTTP_REQUESTS_TOTAL,
                "Total HTTP requests",
                &["method", "path", "status"],
            )
            .histogram(
                HTTP_REQUEST_DURATION_SECONDS,
                "HTTP request latency in seconds",
                &["method", "path"],
                &LATENCY_BUCKETS,
            )
            .build();
        Self { registry }
    }

    /// Count one finished request.
    pub fn record_request(&self, method: &str, path: &str, status: u16) {
        let status = status.to_string();
        self.registry
            .increment_counter(HTTP_REQUESTS_TOTAL, &[method, path, &status]);
    }

    /// Record request latency in seconds.
    pub fn record_latency(&self, method: &str, path: &str, seconds: f64) {
        self.registry
            .record_duration(HTTP_REQUEST_DURATION_SECONDS, &[method, path], seconds);
    }

    pub fn requests(&self, method: &str, path: &str, status: u16) -> u64 {
        let status = status.to_string();
        self.registry
            .counter_value(HTTP_REQUESTS_TOTAL, &[method, path, &status])
    }

    pub fn latency(&self, method: &str, path: &str) -> Option<HistogramSnapshot> {
        self.registry
            .histogram_snapshot(HTTP_REQUEST_DURATION_SECONDS, &[method, path])
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn render(&self) -> String {
        self.registry.render()
    }
}

impl Default for RedMetrics {
    fn default() -> Self {
        Self::new()
    }
}
