//! # OpenMetrics registry
//!
//! Thread-safe, typed metric store rendered in the OpenMetrics text format.
//!
//! ## Overview
//!
//! The registry owns every metric for the lifetime of the process: metrics
//! are created at any time and never removed. Each metric is addressed by a
//! canonical key derived from its name and its label set sorted by key, so
//! two label sets that are permutations of each other map to the same key
//! and the second registration is rejected as a duplicate.
//!
//! ## Concurrency
//!
//! - Counters and gauges are cache-line padded relaxed atomics.
//! - Histograms and summaries guard their aggregates with a mutex;
//!   rendering snapshots under the lock and formats outside it.
//! - The registry mutex guards only insertion and key lookup. Rendering
//!   copies the node pointers under the lock and releases it before
//!   formatting a single line.
//!
//! ## Rendering
//!
//! For each family sharing a name the output carries `# HELP` (when help is
//! non-empty), `# TYPE`, and `# UNIT` (when a unit is set) once, followed by
//! one line per instance. Info families sort first: their keys carry a `#`
//! prefix, which the natural map ordering places on top. The body always
//! ends with `# EOF`.

mod instance;

pub use instance::{InstanceMetrics, MetricsHandler};

use std::collections::{BTreeMap, VecDeque};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crossbeam_utils::CachePadded;

use crate::error::{Error, Result};
use crate::mime::OPENMETRICS_MIME_TYPE;

/// A single label pair.
pub type Label = (String, String);
/// A label set. Sorted by key at metric construction.
pub type Labels = Vec<Label>;

/// Default sample window for [`Summary`] quantile estimation.
pub const DEFAULT_SUMMARY_CAPACITY: usize = 500;

/// The OpenMetrics metric families supported by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
    Summary,
    Info,
    Stateset,
    Untyped,
}

impl MetricType {
    pub fn type_name(self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
            MetricType::Histogram => "histogram",
            MetricType::Summary => "summary",
            MetricType::Info => "info",
            MetricType::Stateset => "stateset",
            MetricType::Untyped => "untyped",
        }
    }
}

/// Wall clock with a test override, shared by a registry and its metrics.
#[derive(Default, Debug)]
struct Clock {
    override_ms: Mutex<Option<u64>>,
}

impl Clock {
    fn now_ms(&self) -> u64 {
        if let Some(ms) = *self.override_ms.lock().unwrap() {
            return ms;
        }
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

fn sort_labels(mut labels: Labels) -> Labels {
    labels.sort_by(|a, b| a.0.cmp(&b.0));
    labels
}

fn label_string(labels: &[Label]) -> String {
    if labels.is_empty() {
        return String::new();
    }
    let mut out = String::from("{");
    for (i, (k, v)) in labels.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "{k}=\"{v}\"");
    }
    out.push('}');
    out
}

/// Like [`label_string`] but with one extra pair appended after the sorted
/// set, used for `le` and `quantile` and `state` instance labels.
fn label_string_with(labels: &[Label], extra_key: &str, extra_value: &str) -> String {
    let mut out = String::from("{");
    for (k, v) in labels {
        let _ = write!(out, "{k}=\"{v}\",");
    }
    let _ = write!(out, "{extra_key}=\"{extra_value}\"");
    out.push('}');
    out
}

fn name_with_suffix_and_labels(name: &str, suffix: &str, labels: &[Label], info_first: bool) -> String {
    let mut out = if info_first {
        format!("#{name}")
    } else {
        name.to_string()
    };
    if !suffix.is_empty() {
        out.push('_');
        out.push_str(suffix);
    }
    out.push_str(&label_string(labels));
    out
}

fn make_key(name: &str, labels: &[Label], metric_type: Option<MetricType>) -> String {
    let info_first = metric_type == Some(MetricType::Info);
    name_with_suffix_and_labels(name, "", labels, info_first)
}

/// Render a float the way the exposition format expects: integral values
/// keep exactly one decimal, tiny magnitudes render fixed with six
/// decimals, everything else uses a general form capped at six significant
/// digits.
fn render_number(value: f64) -> String {
    if value.floor() == value && value.is_finite() {
        return format!("{value:.1}");
    }
    if value.abs() < 0.001 {
        return format!("{value:.6}");
    }
    let exponent = value.abs().log10().floor() as i32;
    let decimals = (6 - 1 - exponent).max(0) as usize;
    let fixed = format!("{value:.decimals$}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}

fn render_timestamp(ms: u64) -> String {
    format!("{}.{:03}", ms / 1000, ms % 1000)
}

/// Immutable identity plus the created/touched timestamps every metric
/// carries.
#[derive(Debug)]
pub struct MetricMeta {
    metric_type: MetricType,
    name: String,
    help: String,
    unit: String,
    labels: Labels,
    metric_name: String,
    created_ms: u64,
    updated_ms: AtomicU64,
    clock: Arc<Clock>,
}

impl MetricMeta {
    fn new(
        metric_type: MetricType,
        name: String,
        help: String,
        unit: String,
        labels: Labels,
        clock: Arc<Clock>,
    ) -> Self {
        let labels = sort_labels(labels);
        let metric_name = name_with_suffix_and_labels(&name, "", &labels, false);
        let now = clock.now_ms();
        Self {
            metric_type,
            name,
            help,
            unit,
            labels,
            metric_name,
            created_ms: now,
            updated_ms: AtomicU64::new(now),
            clock,
        }
    }

    pub fn metric_type(&self) -> MetricType {
        self.metric_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// The labelled instance name, e.g. `http_requests{endpoint="/",method="GET"}`.
    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// Creation time in milliseconds since the epoch.
    pub fn created_ms(&self) -> u64 {
        self.created_ms
    }

    /// Time of the last mutation in milliseconds since the epoch.
    pub fn updated_ms(&self) -> u64 {
        self.updated_ms.load(Ordering::Relaxed)
    }

    fn touch(&self) {
        self.updated_ms.store(self.clock.now_ms(), Ordering::Relaxed);
    }

    fn key(&self) -> String {
        make_key(&self.name, &self.labels, Some(self.metric_type))
    }
}

/// Common surface of every registered metric.
pub trait Metric: Send + Sync {
    fn meta(&self) -> &MetricMeta;

    /// Append this instance's exposition lines to `out`.
    fn render(&self, out: &mut String);
}

/// Anything a [`ScopedTimer`] can record an observation into.
pub trait Observe: Send + Sync {
    fn observe(&self, value: f64);
}

/// Monotonically increasing counter. The hot path is a single relaxed
/// `fetch_add` on a cache-line padded atomic.
#[derive(Debug)]
pub struct Counter {
    meta: MetricMeta,
    value: CachePadded<AtomicU64>,
    total_name: String,
}

impl Counter {
    fn new(meta: MetricMeta) -> Self {
        let total_name = name_with_suffix_and_labels(meta.name(), "total", meta.labels(), false);
        Self {
            meta,
            value: CachePadded::new(AtomicU64::new(0)),
            total_name,
        }
    }

    pub fn inc(&self) {
        self.inc_by(1);
    }

    pub fn inc_by(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
        self.meta.touch();
    }

    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Metric for Counter {
    fn meta(&self) -> &MetricMeta {
        &self.meta
    }

    fn render(&self, out: &mut String) {
        let _ = writeln!(
            out,
            "{} {} {}",
            self.total_name,
            self.value(),
            render_timestamp(self.meta.updated_ms())
        );
    }
}

/// Gauge over an unsigned integer value.
pub struct Gauge {
    meta: MetricMeta,
    value: CachePadded<AtomicU64>,
}

impl Gauge {
    fn new(meta: MetricMeta) -> Self {
        Self {
            meta,
            value: CachePadded::new(AtomicU64::new(0)),
        }
    }

    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
        self.meta.touch();
    }

    pub fn inc(&self) {
        self.inc_by(1);
    }

    pub fn inc_by(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
        self.meta.touch();
    }

    pub fn dec(&self) {
        self.dec_by(1);
    }

    pub fn dec_by(&self, value: u64) {
        self.value.fetch_sub(value, Ordering::Relaxed);
        self.meta.touch();
    }

    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// RAII increment: the gauge goes up now and back down when the guard
    /// drops, on every exit path.
    pub fn scoped(self: &Arc<Self>) -> ScopedGauge {
        self.inc();
        ScopedGauge {
            gauge: Arc::clone(self),
        }
    }
}

impl Metric for Gauge {
    fn meta(&self) -> &MetricMeta {
        &self.meta
    }

    fn render(&self, out: &mut String) {
        let _ = writeln!(
            out,
            "{} {} {}",
            self.meta.metric_name(),
            self.value(),
            render_timestamp(self.meta.updated_ms())
        );
    }
}

/// Guard returned by [`Gauge::scoped`].
pub struct ScopedGauge {
    gauge: Arc<Gauge>,
}

impl Drop for ScopedGauge {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

/// Static information rendered as a constant `1` sample. Info families
/// always sort before everything else.
pub struct Info {
    meta: MetricMeta,
    info_name: String,
}

impl Info {
    fn new(meta: MetricMeta) -> Self {
        let info_name = name_with_suffix_and_labels(meta.name(), "info", meta.labels(), false);
        Self { meta, info_name }
    }
}

impl Metric for Info {
    fn meta(&self) -> &MetricMeta {
        &self.meta
    }

    fn render(&self, out: &mut String) {
        let _ = writeln!(
            out,
            "{} 1 {}",
            self.info_name,
            render_timestamp(self.meta.updated_ms())
        );
    }
}

struct HistogramState {
    buckets: Vec<u64>,
    count: u64,
    sum: f64,
}

/// Histogram over explicit bucket bounds plus an implicit `+Inf` bucket.
pub struct Histogram {
    meta: MetricMeta,
    bounds: Vec<f64>,
    state: Mutex<HistogramState>,
}

impl Histogram {
    fn new(meta: MetricMeta, bounds: Vec<f64>) -> Self {
        let buckets = vec![0; bounds.len() + 1];
        Self {
            meta,
            bounds,
            state: Mutex::new(HistogramState {
                buckets,
                count: 0,
                sum: 0.0,
            }),
        }
    }

    /// Record one observation. The value lands in the first bucket whose
    /// bound is greater than or equal to it, else in the `+Inf` bucket.
    pub fn observe(&self, value: f64) {
        let idx = self
            .bounds
            .iter()
            .position(|bound| value <= *bound)
            .unwrap_or(self.bounds.len());
        let mut state = self.state.lock().unwrap();
        state.buckets[idx] += 1;
        state.count += 1;
        state.sum += value;
        drop(state);
        self.meta.touch();
    }

    pub fn count(&self) -> u64 {
        self.state.lock().unwrap().count
    }

    pub fn sum(&self) -> f64 {
        self.state.lock().unwrap().sum
    }

    /// Per-bucket (non-cumulative) observation counts, `+Inf` last.
    pub fn bucket_counts(&self) -> Vec<u64> {
        self.state.lock().unwrap().buckets.clone()
    }

    /// Wall-clock timer that observes the elapsed seconds on drop.
    pub fn scoped(self: &Arc<Self>) -> ScopedTimer {
        ScopedTimer::new(Arc::clone(self) as Arc<dyn Observe>)
    }
}

impl Observe for Histogram {
    fn observe(&self, value: f64) {
        Histogram::observe(self, value);
    }
}

impl Metric for Histogram {
    fn meta(&self) -> &MetricMeta {
        &self.meta
    }

    fn render(&self, out: &mut String) {
        let (buckets, count, sum) = {
            let state = self.state.lock().unwrap();
            (state.buckets.clone(), state.count, state.sum)
        };
        let name = self.meta.name();
        let labels = self.meta.labels();
        let mut cumulative = 0u64;
        for (bound, bucket) in self.bounds.iter().zip(&buckets) {
            cumulative += bucket;
            let _ = writeln!(
                out,
                "{name}_bucket{} {cumulative}",
                label_string_with(labels, "le", &render_number(*bound))
            );
        }
        cumulative += buckets.last().copied().unwrap_or(0);
        let _ = writeln!(
            out,
            "{name}_bucket{} {cumulative}",
            label_string_with(labels, "le", "+Inf")
        );
        let _ = writeln!(out, "{name}_count{} {count}", label_string(labels));
        let _ = writeln!(out, "{name}_sum{} {}", label_string(labels), render_number(sum));
    }
}

struct SummaryState {
    samples: VecDeque<f64>,
    count: u64,
    sum: f64,
}

/// Summary with quantiles estimated over a bounded, oldest-evicting sample
/// window. `count` and `sum` cover every observation ever made.
pub struct Summary {
    meta: MetricMeta,
    quantiles: Vec<f64>,
    capacity: usize,
    state: Mutex<SummaryState>,
}

impl Summary {
    fn new(meta: MetricMeta, quantiles: Vec<f64>, capacity: usize) -> Self {
        Self {
            meta,
            quantiles,
            capacity,
            state: Mutex::new(SummaryState {
                samples: VecDeque::with_capacity(capacity),
                count: 0,
                sum: 0.0,
            }),
        }
    }

    pub fn observe(&self, value: f64) {
        let mut state = self.state.lock().unwrap();
        if state.samples.len() == self.capacity {
            state.samples.pop_front();
        }
        state.samples.push_back(value);
        state.count += 1;
        state.sum += value;
        drop(state);
        self.meta.touch();
    }

    pub fn count(&self) -> u64 {
        self.state.lock().unwrap().count
    }

    pub fn sum(&self) -> f64 {
        self.state.lock().unwrap().sum
    }

    /// Estimate the configured quantiles over the retained window. Empty
    /// when nothing has been observed yet.
    pub fn quantile_values(&self) -> Vec<f64> {
        let mut samples: Vec<f64> = {
            let state = self.state.lock().unwrap();
            state.samples.iter().copied().collect()
        };
        if samples.is_empty() {
            return Vec::new();
        }
        samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        self.quantiles
            .iter()
            .map(|q| interpolate_quantile(&samples, *q))
            .collect()
    }

    /// Wall-clock timer that observes the elapsed seconds on drop.
    pub fn scoped(self: &Arc<Self>) -> ScopedTimer {
        ScopedTimer::new(Arc::clone(self) as Arc<dyn Observe>)
    }
}

impl Observe for Summary {
    fn observe(&self, value: f64) {
        Summary::observe(self, value);
    }
}

impl Metric for Summary {
    fn meta(&self) -> &MetricMeta {
        &self.meta
    }

    fn render(&self, out: &mut String) {
        let values = self.quantile_values();
        let name = self.meta.name();
        let labels = self.meta.labels();
        for (q, value) in self.quantiles.iter().zip(&values) {
            let _ = writeln!(
                out,
                "{name}{} {}",
                label_string_with(labels, "quantile", &render_number(*q)),
                render_number(*value)
            );
        }
        let _ = writeln!(out, "{name}_count{} {}", label_string(labels), self.count());
        let _ = writeln!(out, "{name}_sum{} {}", label_string(labels), render_number(self.sum()));
    }
}

/// Linear interpolation between the sorted samples bracketing
/// `q * n - 0.5`, clamped to the sample range.
fn interpolate_quantile(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    let pos = (q * n as f64 - 0.5).clamp(0.0, (n - 1) as f64);
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// A set of mutually independent boolean states. At most one is typically
/// set via [`Stateset::set_exclusive_state`], but the format allows any
/// combination.
pub struct Stateset {
    meta: MetricMeta,
    states: Vec<String>,
    bits: Vec<AtomicBool>,
}

impl Stateset {
    fn new(meta: MetricMeta, states: Vec<String>) -> Self {
        let bits = states.iter().map(|_| AtomicBool::new(false)).collect();
        Self { meta, states, bits }
    }

    fn index_of(&self, state: &str) -> Result<usize> {
        self.states
            .iter()
            .position(|s| s == state)
            .ok_or_else(|| Error::UnknownState(state.to_string()))
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.bits.len() {
            return Err(Error::StateIndexOutOfRange {
                index,
                len: self.bits.len(),
            });
        }
        Ok(())
    }

    pub fn set_state_index(&self, index: usize, value: bool) -> Result<()> {
        self.check_index(index)?;
        self.bits[index].store(value, Ordering::Relaxed);
        self.meta.touch();
        Ok(())
    }

    pub fn set_state(&self, state: &str, value: bool) -> Result<()> {
        let index = self.index_of(state)?;
        self.set_state_index(index, value)
    }

    pub fn state_index(&self, index: usize) -> Result<bool> {
        self.check_index(index)?;
        Ok(self.bits[index].load(Ordering::Relaxed))
    }

    pub fn state(&self, state: &str) -> Result<bool> {
        let index = self.index_of(state)?;
        self.state_index(index)
    }

    /// Set exactly one state, clearing all others.
    pub fn set_exclusive_state(&self, index: usize) -> Result<()> {
        self.check_index(index)?;
        for (i, bit) in self.bits.iter().enumerate() {
            bit.store(i == index, Ordering::Relaxed);
        }
        self.meta.touch();
        Ok(())
    }
}

impl Metric for Stateset {
    fn meta(&self) -> &MetricMeta {
        &self.meta
    }

    fn render(&self, out: &mut String) {
        let name = self.meta.name();
        let labels = self.meta.labels();
        for (state, bit) in self.states.iter().zip(&self.bits) {
            let _ = writeln!(
                out,
                "{name}_stateset{} {}",
                label_string_with(labels, "state", state),
                u8::from(bit.load(Ordering::Relaxed))
            );
        }
    }
}

/// Wall-clock duration guard: measures from construction to drop and
/// records the elapsed seconds into a histogram or summary.
pub struct ScopedTimer {
    target: Arc<dyn Observe>,
    start: Instant,
}

impl ScopedTimer {
    fn new(target: Arc<dyn Observe>) -> Self {
        Self {
            target,
            start: Instant::now(),
        }
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        self.target.observe(self.start.elapsed().as_secs_f64());
    }
}

/// The registry. See the module docs for the storage and rendering
/// contract.
pub struct Metrics {
    nodes: CachePadded<Mutex<BTreeMap<String, Arc<dyn Metric>>>>,
    clock: Arc<Clock>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            nodes: CachePadded::new(Mutex::new(BTreeMap::new())),
            clock: Arc::new(Clock::default()),
        }
    }

    /// Pin the registry clock for deterministic rendering in tests.
    pub fn set_now(&self, now: Option<SystemTime>) {
        let ms = now.map(|t| {
            t.duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0)
        });
        *self.clock.override_ms.lock().unwrap() = ms;
    }

    pub fn content_type() -> &'static str {
        OPENMETRICS_MIME_TYPE
    }

    fn meta(
        &self,
        metric_type: MetricType,
        name: &str,
        help: &str,
        unit: &str,
        labels: Labels,
    ) -> MetricMeta {
        MetricMeta::new(
            metric_type,
            name.to_string(),
            help.to_string(),
            unit.to_string(),
            labels,
            Arc::clone(&self.clock),
        )
    }

    fn insert<M: Metric + 'static>(&self, metric: M) -> Result<Arc<M>> {
        let key = metric.meta().key();
        let metric = Arc::new(metric);
        let mut nodes = self.nodes.lock().unwrap();
        if nodes.contains_key(&key) {
            return Err(Error::DuplicateMetric(key));
        }
        nodes.insert(key, Arc::clone(&metric) as Arc<dyn Metric>);
        Ok(metric)
    }

    pub fn add_counter(
        &self,
        name: &str,
        help: &str,
        unit: &str,
        labels: Labels,
    ) -> Result<Arc<Counter>> {
        self.insert(Counter::new(self.meta(MetricType::Counter, name, help, unit, labels)))
    }

    pub fn add_gauge(
        &self,
        name: &str,
        help: &str,
        unit: &str,
        labels: Labels,
    ) -> Result<Arc<Gauge>> {
        self.insert(Gauge::new(self.meta(MetricType::Gauge, name, help, unit, labels)))
    }

    pub fn add_info(
        &self,
        name: &str,
        help: &str,
        unit: &str,
        labels: Labels,
    ) -> Result<Arc<Info>> {
        self.insert(Info::new(self.meta(MetricType::Info, name, help, unit, labels)))
    }

    pub fn add_histogram(
        &self,
        name: &str,
        help: &str,
        unit: &str,
        labels: Labels,
        bucket_bounds: Vec<f64>,
    ) -> Result<Arc<Histogram>> {
        self.insert(Histogram::new(
            self.meta(MetricType::Histogram, name, help, unit, labels),
            bucket_bounds,
        ))
    }

    pub fn add_summary(
        &self,
        name: &str,
        help: &str,
        unit: &str,
        labels: Labels,
        quantiles: Vec<f64>,
        capacity: usize,
    ) -> Result<Arc<Summary>> {
        self.insert(Summary::new(
            self.meta(MetricType::Summary, name, help, unit, labels),
            quantiles,
            capacity,
        ))
    }

    pub fn add_stateset(
        &self,
        name: &str,
        help: &str,
        unit: &str,
        labels: Labels,
        states: Vec<String>,
    ) -> Result<Arc<Stateset>> {
        self.insert(Stateset::new(
            self.meta(MetricType::Stateset, name, help, unit, labels),
            states,
        ))
    }

    /// Register a counter with the same name, help and unit as `source`
    /// under a different label set.
    pub fn clone_counter(&self, source: &Counter, labels: Labels) -> Result<Arc<Counter>> {
        let meta = source.meta();
        self.add_counter(meta.name(), meta.help(), meta.unit(), labels)
    }

    /// Register a gauge with the same name, help and unit as `source`
    /// under a different label set.
    pub fn clone_gauge(&self, source: &Gauge, labels: Labels) -> Result<Arc<Gauge>> {
        let meta = source.meta();
        self.add_gauge(meta.name(), meta.help(), meta.unit(), labels)
    }

    /// Register an info metric with the same name, help and unit as
    /// `source` under a different label set.
    pub fn clone_info(&self, source: &Info, labels: Labels) -> Result<Arc<Info>> {
        let meta = source.meta();
        self.add_info(meta.name(), meta.help(), meta.unit(), labels)
    }

    /// Find a metric by name and label set, optionally constrained to a
    /// type. Info metrics are only found when the type is given, because
    /// their keys carry the sort marker.
    pub fn lookup(
        &self,
        name: &str,
        labels: Labels,
        metric_type: Option<MetricType>,
    ) -> Option<Arc<dyn Metric>> {
        let labels = sort_labels(labels);
        let key = make_key(name, &labels, metric_type);
        let nodes = self.nodes.lock().unwrap();
        let node = nodes.get(&key)?;
        if let Some(wanted) = metric_type {
            if node.meta().metric_type() != wanted {
                return None;
            }
        }
        Some(Arc::clone(node))
    }

    /// Render every metric in the OpenMetrics text format, terminated with
    /// `# EOF`.
    pub fn render(&self) -> String {
        let nodes: Vec<Arc<dyn Metric>> = {
            let nodes = self.nodes.lock().unwrap();
            nodes.values().cloned().collect()
        };

        let mut out = String::new();
        let mut current_family = String::new();
        for node in &nodes {
            let meta = node.meta();
            if current_family != meta.name() {
                current_family = meta.name().to_string();
                if !meta.help().is_empty() {
                    let _ = writeln!(out, "# HELP {} {}", meta.name(), meta.help());
                }
                let _ = writeln!(out, "# TYPE {} {}", meta.name(), meta.metric_type().type_name());
                if !meta.unit().is_empty() {
                    let _ = writeln!(out, "# UNIT {} {}", meta.name(), meta.unit());
                }
            }
            node.render(&mut out);
        }
        out.push_str("# EOF\n");
        out
    }
}
