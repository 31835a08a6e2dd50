//! API performance profiler
//!
//! Records request latencies per endpoint and per internal dependency
//! (database calls, password hashing), keeps Prometheus-style histograms and
//! counters, and turns the collected samples into a report that lists the
//! slowest endpoints, error rates and optimization suggestions.
//!
//! Samples are bounded: the last [`MAX_TIMINGS`] durations per name and the
//! last [`MAX_ERRORS`] errors per endpoint are kept.

use crate::core::config::ProfilerConfig;
use crate::core::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

pub const MAX_TIMINGS: usize = 1000;
pub const MAX_ERRORS: usize = 100;
pub const SLOWEST_ENDPOINTS_LIMIT: usize = 10;
pub const SLOWEST_DEPENDENCIES_LIMIT: usize = 5;
pub const COMMON_ERRORS_LIMIT: usize = 3;
/// Error rate (percent) above which an endpoint is flagged
pub const HIGH_ERROR_RATE: f64 = 5.0;

pub const ENDPOINT_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0, 25.0, 50.0,
];
pub const DEPENDENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0];

/// Paths never profiled
pub fn is_excluded_path(path: &str) -> bool {
    matches!(path, "/metrics" | "/health" | "/favicon.ico") || path.starts_with("/static/")
}

/// Fixed-bucket latency histogram
#[derive(Debug, Clone)]
struct Histogram {
    buckets: &'static [f64],
    counts: Vec<u64>,
    sum: f64,
    count: u64,
}

impl Histogram {
    fn new(buckets: &'static [f64]) -> Self {
        Self {
            buckets,
            counts: vec![0; buckets.len()],
            sum: 0.0,
            count: 0,
        }
    }

    fn observe(&mut self, value: f64) {
        if let Some(index) = self.buckets.iter().position(|bound| value <= *bound) {
            self.counts[index] += 1;
        }
        self.sum += value;
        self.count += 1;
    }

    fn render(&self, out: &mut String, metric: &str, labels: &str) {
        let mut cumulative = 0;
        for (bound, count) in self.buckets.iter().zip(&self.counts) {
            cumulative += count;
            out.push_str(&format!(
                "{}_bucket{{{},le=\"{}\"}} {}\n",
                metric, labels, bound, cumulative
            ));
        }
        out.push_str(&format!("{}_bucket{{{},le=\"+Inf\"}} {}\n", metric, labels, self.count));
        out.push_str(&format!("{}_sum{{{}}} {}\n", metric, labels, self.sum));
        out.push_str(&format!("{}_count{{{}}} {}\n", metric, labels, self.count));
    }
}

#[derive(Debug, Clone)]
struct ErrorSample {
    error_type: String,
}

#[derive(Default)]
struct ProfilerState {
    endpoints: HashMap<String, VecDeque<f64>>,
    dependencies: HashMap<String, VecDeque<f64>>,
    errors: HashMap<String, VecDeque<ErrorSample>>,
    // (path, method, status)
    endpoint_latency: BTreeMap<(String, String, u16), Histogram>,
    dependency_latency: BTreeMap<String, Histogram>,
    // (path, method)
    slow_endpoints: BTreeMap<(String, String), u64>,
    // (path, method, error_type)
    error_counter: BTreeMap<(String, String, String), u64>,
    last_analysis: Option<Instant>,
}

fn push_bounded<T>(queue: &mut VecDeque<T>, value: T, cap: usize) {
    queue.push_back(value);
    while queue.len() > cap {
        queue.pop_front();
    }
}

/// Timing statistics for one endpoint or dependency
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingSummary {
    pub name: String,
    pub avg_time: f64,
    pub p95_time: f64,
    pub p99_time: f64,
    pub min_time: f64,
    pub max_time: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorCount {
    #[serde(rename = "type")]
    pub error_type: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorRate {
    pub error_rate: f64,
    pub error_count: usize,
    pub total_requests: usize,
    pub common_errors: Vec<ErrorCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Suggestion {
    pub target: String,
    pub issue: String,
    pub metric: String,
    pub suggestion: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileReport {
    pub generated_at: String,
    pub slowest_endpoints: Vec<TimingSummary>,
    pub slowest_dependencies: Vec<TimingSummary>,
    pub error_rates: BTreeMap<String, ErrorRate>,
    pub optimization_suggestions: Vec<Suggestion>,
}

/// Quantile `i / n` of sorted data, interpolated with the exclusive method
fn exclusive_quantile(sorted: &[f64], i: usize, n: usize) -> f64 {
    let m = sorted.len();
    if m < 2 {
        return sorted.last().copied().unwrap_or(0.0);
    }
    let j = (i * (m + 1) / n).clamp(1, m - 1);
    let delta = (i * (m + 1)) as f64 - (j * n) as f64;
    (sorted[j - 1] * (n as f64 - delta) + sorted[j] * delta) / n as f64
}

fn summarize(name: &str, samples: &VecDeque<f64>) -> Option<TimingSummary> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted: Vec<f64> = samples.iter().copied().collect();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let count = sorted.len();
    let min_time = sorted[0];
    let max_time = sorted[count - 1];
    let avg_time = sorted.iter().sum::<f64>() / count as f64;
    let p95_time = if count >= 20 { exclusive_quantile(&sorted, 19, 20) } else { max_time };
    let p99_time = if count >= 100 { exclusive_quantile(&sorted, 99, 100) } else { max_time };

    Some(TimingSummary {
        name: name.to_string(),
        avg_time,
        p95_time,
        p99_time,
        min_time,
        max_time,
        count,
    })
}

fn slowest(data: &HashMap<String, VecDeque<f64>>, limit: usize) -> Vec<TimingSummary> {
    let mut results: Vec<TimingSummary> = data
        .iter()
        .filter_map(|(name, samples)| summarize(name, samples))
        .collect();
    results.sort_by(|a, b| b.p95_time.total_cmp(&a.p95_time).then_with(|| a.name.cmp(&b.name)));
    results.truncate(limit);
    results
}

fn common_errors(errors: &VecDeque<ErrorSample>) -> Vec<ErrorCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for error in errors {
        *counts.entry(error.error_type.as_str()).or_default() += 1;
    }
    let mut sorted: Vec<ErrorCount> = counts
        .into_iter()
        .map(|(error_type, count)| ErrorCount { error_type: error_type.to_string(), count })
        .collect();
    sorted.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.error_type.cmp(&b.error_type)));
    sorted.truncate(COMMON_ERRORS_LIMIT);
    sorted
}

/// Result of one analysis pass over the collected samples
struct Analysis {
    slowest_endpoints: Vec<TimingSummary>,
    slowest_dependencies: Vec<TimingSummary>,
    error_rates: BTreeMap<String, ErrorRate>,
}

/// Collects and analyses API timing data
pub struct ApiProfiler {
    config: ProfilerConfig,
    state: RwLock<ProfilerState>,
}

impl ApiProfiler {
    pub fn new(config: ProfilerConfig) -> Self {
        tracing::info!(
            enabled = config.enabled,
            sample_rate = config.sample_rate,
            slow_endpoint_threshold = config.slow_endpoint_threshold,
            slow_dependency_threshold = config.slow_dependency_threshold,
            "API profiler initialized"
        );
        Self {
            config,
            state: RwLock::new(ProfilerState::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn should_sample(&self) -> bool {
        self.config.enabled
            && (self.config.sample_rate >= 1.0 || rand::random::<f64>() <= self.config.sample_rate)
    }

    /// Record one handled request
    ///
    /// `error_type` is the typed error name when the handler failed with one;
    /// other failures (status >= 400) are recorded as `HTTP<status>`.
    pub async fn track_endpoint(
        &self,
        path: &str,
        method: &str,
        duration: Duration,
        status: u16,
        error_type: Option<&str>,
    ) {
        if !self.should_sample() {
            return;
        }

        let seconds = duration.as_secs_f64();
        let key = format!("{} {}", method, path);
        let mut state = self.state.write().await;

        push_bounded(state.endpoints.entry(key.clone()).or_default(), seconds, MAX_TIMINGS);
        state
            .endpoint_latency
            .entry((path.to_string(), method.to_string(), status))
            .or_insert_with(|| Histogram::new(ENDPOINT_BUCKETS))
            .observe(seconds);

        if seconds > self.config.slow_endpoint_threshold {
            *state
                .slow_endpoints
                .entry((path.to_string(), method.to_string()))
                .or_default() += 1;
            tracing::warn!(
                endpoint = %key,
                duration = seconds,
                threshold = self.config.slow_endpoint_threshold,
                "Slow endpoint"
            );
        }

        if error_type.is_some() || status >= 400 {
            let error_type = error_type
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP{}", status));
            *state
                .error_counter
                .entry((path.to_string(), method.to_string(), error_type.clone()))
                .or_default() += 1;
            push_bounded(
                state.errors.entry(key).or_default(),
                ErrorSample { error_type },
                MAX_ERRORS,
            );
        }
    }

    /// Record one dependency call
    pub async fn track_dependency(&self, name: &str, duration: Duration) {
        if !self.should_sample() {
            return;
        }

        let seconds = duration.as_secs_f64();
        let mut state = self.state.write().await;
        push_bounded(state.dependencies.entry(name.to_string()).or_default(), seconds, MAX_TIMINGS);
        state
            .dependency_latency
            .entry(name.to_string())
            .or_insert_with(|| Histogram::new(DEPENDENCY_BUCKETS))
            .observe(seconds);

        if seconds > self.config.slow_dependency_threshold {
            tracing::debug!(
                dependency = name,
                duration = seconds,
                threshold = self.config.slow_dependency_threshold,
                "Slow dependency"
            );
        }
    }

    /// Await `fut` and record how long it took under `name`
    pub async fn time_dependency<F, T>(&self, name: &str, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        let started = Instant::now();
        let output = fut.await;
        self.track_dependency(name, started.elapsed()).await;
        output
    }

    async fn analyze(&self) -> Analysis {
        let mut state = self.state.write().await;
        state.last_analysis = Some(Instant::now());

        let mut error_rates = BTreeMap::new();
        for (endpoint, errors) in &state.errors {
            let Some(timings) = state.endpoints.get(endpoint) else {
                continue;
            };
            let total_requests = timings.len();
            if total_requests == 0 {
                continue;
            }
            error_rates.insert(
                endpoint.clone(),
                ErrorRate {
                    error_rate: errors.len() as f64 / total_requests as f64 * 100.0,
                    error_count: errors.len(),
                    total_requests,
                    common_errors: common_errors(errors),
                },
            );
        }

        Analysis {
            slowest_endpoints: slowest(&state.endpoints, SLOWEST_ENDPOINTS_LIMIT),
            slowest_dependencies: slowest(&state.dependencies, SLOWEST_DEPENDENCIES_LIMIT),
            error_rates,
        }
    }

    fn suggestions(&self, analysis: &Analysis) -> Vec<Suggestion> {
        let mut suggestions = Vec::new();

        for endpoint in &analysis.slowest_endpoints {
            if endpoint.p95_time > self.config.slow_endpoint_threshold {
                suggestions.push(Suggestion {
                    target: endpoint.name.clone(),
                    issue: "Slow endpoint".to_string(),
                    metric: format!("P95 = {:.3}s", endpoint.p95_time),
                    suggestion: "Review the database queries and cache the results of this endpoint"
                        .to_string(),
                });
            }
        }

        for dependency in &analysis.slowest_dependencies {
            if dependency.avg_time > self.config.slow_dependency_threshold {
                suggestions.push(Suggestion {
                    target: dependency.name.clone(),
                    issue: "Slow dependency".to_string(),
                    metric: format!("Avg = {:.3}s", dependency.avg_time),
                    suggestion: "Optimize this dependency or cache its results".to_string(),
                });
            }
        }

        for (endpoint, rate) in &analysis.error_rates {
            if rate.error_rate > HIGH_ERROR_RATE {
                let types: Vec<&str> = rate
                    .common_errors
                    .iter()
                    .map(|e| e.error_type.as_str())
                    .collect();
                suggestions.push(Suggestion {
                    target: endpoint.clone(),
                    issue: "High error rate".to_string(),
                    metric: format!("{:.1}%", rate.error_rate),
                    suggestion: format!("Handle the {} errors raised by this endpoint", types.join(", ")),
                });
            }
        }

        suggestions
    }

    /// Analyse the collected data and build a report
    pub async fn report(&self) -> ProfileReport {
        let analysis = self.analyze().await;
        let optimization_suggestions = self.suggestions(&analysis);
        ProfileReport {
            generated_at: chrono::Utc::now().to_rfc3339(),
            slowest_endpoints: analysis.slowest_endpoints,
            slowest_dependencies: analysis.slowest_dependencies,
            error_rates: analysis.error_rates,
            optimization_suggestions,
        }
    }

    /// Drop every collected sample and counter
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        *state = ProfilerState {
            last_analysis: Some(Instant::now()),
            ..ProfilerState::default()
        };
        tracing::info!("API profiler data cleared");
    }

    /// Log the slowest endpoints, dependencies and high error rates
    pub async fn log_analysis(&self) {
        let since_last = {
            let state = self.state.read().await;
            if state.endpoints.is_empty() && state.dependencies.is_empty() {
                return;
            }
            state.last_analysis.map(|t| t.elapsed().as_secs_f64())
        };

        let analysis = self.analyze().await;
        for (rank, endpoint) in analysis.slowest_endpoints.iter().enumerate() {
            tracing::info!(
                rank = rank + 1,
                endpoint = %endpoint.name,
                avg = endpoint.avg_time,
                p95 = endpoint.p95_time,
                count = endpoint.count,
                window_secs = ?since_last,
                "Slowest endpoint"
            );
        }
        for (rank, dependency) in analysis.slowest_dependencies.iter().enumerate() {
            tracing::info!(
                rank = rank + 1,
                dependency = %dependency.name,
                avg = dependency.avg_time,
                p95 = dependency.p95_time,
                count = dependency.count,
                "Slowest dependency"
            );
        }
        for (endpoint, rate) in &analysis.error_rates {
            if rate.error_rate > HIGH_ERROR_RATE {
                tracing::warn!(
                    endpoint = %endpoint,
                    error_rate = rate.error_rate,
                    errors = rate.error_count,
                    total = rate.total_requests,
                    common = ?rate.common_errors,
                    "High endpoint error rate"
                );
            }
        }
    }

    /// Write the final report to `output_dir`, returning its path
    pub async fn save_report(&self) -> Result<Option<PathBuf>> {
        let Some(dir) = self.config.output_dir.clone() else {
            return Ok(None);
        };

        let report = self.report().await;
        let path = dir.join(format!("api_profile_{}.json", chrono::Utc::now().timestamp()));
        let body = serde_json::to_vec_pretty(&report)?;

        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(&path, body).await?;
        tracing::info!(path = %path.display(), "API profiler report saved");

        Ok(Some(path))
    }

    /// Run [`Self::log_analysis`] every `analysis_interval` seconds
    pub fn spawn_periodic_analysis(self: &Arc<Self>) -> JoinHandle<()> {
        let profiler = Arc::clone(self);
        let period = Duration::from_secs(self.config.analysis_interval);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                profiler.log_analysis().await;
            }
        })
    }

    /// Prometheus text exposition of the latency histograms and counters
    pub async fn render_prometheus(&self, prefix: &str) -> String {
        let state = self.state.read().await;
        let mut out = String::new();

        let metric = format!("{}_endpoint_latency_seconds", prefix);
        out.push_str(&format!("# HELP {} Endpoint latency in seconds\n", metric));
        out.push_str(&format!("# TYPE {} histogram\n", metric));
        for ((path, method, status), histogram) in &state.endpoint_latency {
            let labels = format!(
                "endpoint=\"{}\",method=\"{}\",status_code=\"{}\"",
                path, method, status
            );
            histogram.render(&mut out, &metric, &labels);
        }
        out.push('\n');

        let metric = format!("{}_dependency_latency_seconds", prefix);
        out.push_str(&format!("# HELP {} Dependency latency in seconds\n", metric));
        out.push_str(&format!("# TYPE {} histogram\n", metric));
        for (name, histogram) in &state.dependency_latency {
            histogram.render(&mut out, &metric, &format!("dependency_name=\"{}\"", name));
        }
        out.push('\n');

        let metric = format!("{}_slow_endpoints_total", prefix);
        out.push_str(&format!("# HELP {} Requests slower than the threshold\n", metric));
        out.push_str(&format!("# TYPE {} counter\n", metric));
        for ((path, method), count) in &state.slow_endpoints {
            out.push_str(&format!(
                "{}{{endpoint=\"{}\",method=\"{}\"}} {}\n",
                metric, path, method, count
            ));
        }
        out.push('\n');

        let metric = format!("{}_endpoint_errors_total", prefix);
        out.push_str(&format!("# HELP {} Failed requests by error type\n", metric));
        out.push_str(&format!("# TYPE {} counter\n", metric));
        for ((path, method, error_type), count) in &state.error_counter {
            out.push_str(&format!(
                "{}{{endpoint=\"{}\",method=\"{}\",error_type=\"{}\"}} {}\n",
                metric, path, method, error_type, count
            ));
        }

        out
    }

    /// Total number of requests currently held in the sample windows
    pub async fn sampled_requests(&self) -> usize {
        self.state.read().await.endpoints.values().map(VecDeque::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProfilerConfig {
        ProfilerConfig {
            enabled: true,
            sample_rate: 1.0,
            slow_endpoint_threshold: 1.0,
            slow_dependency_threshold: 0.1,
            analysis_interval: 900,
            output_dir: None,
        }
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_exclusive_quantile_matches_interpolation() {
        let data: Vec<f64> = (1..=20).map(|v| v as f64).collect();
        // 19 * 21 / 20 = 19.95 -> between the 19th and 20th values
        let p95 = exclusive_quantile(&data, 19, 20);
        assert!((p95 - 19.95).abs() < 1e-9);

        let data: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        let p99 = exclusive_quantile(&data, 99, 100);
        assert!((p99 - 99.99).abs() < 1e-9);
    }

    #[test]
    fn test_summary_uses_max_for_small_samples() {
        let samples: VecDeque<f64> = vec![0.2, 0.1, 0.4].into();
        let summary = summarize("GET /x", &samples).unwrap();
        assert_eq!(summary.p95_time, 0.4);
        assert_eq!(summary.p99_time, 0.4);
        assert_eq!(summary.min_time, 0.1);
        assert_eq!(summary.count, 3);
        assert!((summary.avg_time - 0.7 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_excluded_paths() {
        assert!(is_excluded_path("/health"));
        assert!(is_excluded_path("/static/app.js"));
        assert!(!is_excluded_path("/api/v1/books"));
    }

    #[tokio::test]
    async fn test_slowest_sorted_by_p95() {
        let profiler = ApiProfiler::new(config());
        profiler.track_endpoint("/fast", "GET", ms(10), 200, None).await;
        profiler.track_endpoint("/slow", "GET", ms(1500), 200, None).await;
        profiler.track_endpoint("/medium", "POST", ms(300), 201, None).await;

        let report = profiler.report().await;
        let names: Vec<&str> = report.slowest_endpoints.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["GET /slow", "POST /medium", "GET /fast"]);

        assert_eq!(report.optimization_suggestions.len(), 1);
        assert_eq!(report.optimization_suggestions[0].target, "GET /slow");
        assert_eq!(report.optimization_suggestions[0].issue, "Slow endpoint");
    }

    #[tokio::test]
    async fn test_error_rates_and_common_errors() {
        let profiler = ApiProfiler::new(config());
        for _ in 0..6 {
            profiler.track_endpoint("/books", "GET", ms(5), 200, None).await;
        }
        profiler.track_endpoint("/books", "GET", ms(5), 404, Some("NotFound")).await;
        profiler.track_endpoint("/books", "GET", ms(5), 404, Some("NotFound")).await;
        profiler.track_endpoint("/books", "GET", ms(5), 500, None).await;
        profiler.track_endpoint("/books", "GET", ms(5), 403, Some("PermissionDenied")).await;

        let report = profiler.report().await;
        let rate = &report.error_rates["GET /books"];
        assert_eq!(rate.total_requests, 10);
        assert_eq!(rate.error_count, 4);
        assert!((rate.error_rate - 40.0).abs() < 1e-9);
        assert_eq!(rate.common_errors[0], ErrorCount { error_type: "NotFound".into(), count: 2 });
        assert_eq!(rate.common_errors.len(), 3);
        assert!(rate.common_errors.iter().any(|e| e.error_type == "HTTP500"));

        assert!(report
            .optimization_suggestions
            .iter()
            .any(|s| s.issue == "High error rate" && s.metric == "40.0%"));
    }

    #[tokio::test]
    async fn test_timings_are_bounded() {
        let profiler = ApiProfiler::new(config());
        for _ in 0..(MAX_TIMINGS + 50) {
            profiler.track_dependency("sqlite.execute", ms(1)).await;
        }
        let report = profiler.report().await;
        assert_eq!(report.slowest_dependencies[0].count, MAX_TIMINGS);
    }

    #[tokio::test]
    async fn test_slow_dependency_suggestion() {
        let profiler = ApiProfiler::new(config());
        let value = profiler
            .time_dependency("bcrypt.verify", async {
                tokio::time::sleep(ms(120)).await;
                7
            })
            .await;
        assert_eq!(value, 7);

        let report = profiler.report().await;
        assert_eq!(report.slowest_dependencies[0].name, "bcrypt.verify");
        assert!(report
            .optimization_suggestions
            .iter()
            .any(|s| s.target == "bcrypt.verify" && s.issue == "Slow dependency"));
    }

    #[tokio::test]
    async fn test_disabled_profiler_records_nothing() {
        let profiler = ApiProfiler::new(ProfilerConfig { enabled: false, ..config() });
        profiler.track_endpoint("/books", "GET", ms(5), 200, None).await;
        assert_eq!(profiler.sampled_requests().await, 0);
    }

    #[tokio::test]
    async fn test_clear_and_prometheus() {
        let profiler = ApiProfiler::new(config());
        profiler.track_endpoint("/books", "GET", ms(30), 200, None).await;
        profiler.track_endpoint("/books", "GET", ms(2000), 500, None).await;

        let text = profiler.render_prometheus("bookhub").await;
        assert!(text.contains(
            "bookhub_endpoint_latency_seconds_bucket{endpoint=\"/books\",method=\"GET\",status_code=\"200\",le=\"0.05\"} 1"
        ));
        assert!(text.contains("bookhub_slow_endpoints_total{endpoint=\"/books\",method=\"GET\"} 1"));
        assert!(text.contains("error_type=\"HTTP500\"} 1"));

        profiler.clear().await;
        assert_eq!(profiler.sampled_requests().await, 0);
        assert!(profiler.report().await.slowest_endpoints.is_empty());
    }

    #[tokio::test]
    async fn test_save_report_to_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let profiler = ApiProfiler::new(ProfilerConfig {
            output_dir: Some(dir.path().to_path_buf()),
            ..config()
        });
        profiler.track_endpoint("/books", "GET", ms(5), 200, None).await;

        let path = profiler.save_report().await.unwrap().unwrap();
        let name = path.file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("api_profile_") && name.ends_with(".json"));

        let saved: ProfileReport =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(saved.slowest_endpoints[0].name, "GET /books");
    }
}
