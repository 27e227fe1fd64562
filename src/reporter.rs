//! The reporting sequence: resolve the target, optionally read the value
//! already on the gateway, build the gauge snapshot, push it.
//!
//! Reporting is best effort. Nothing in this module returns an error or
//! panics towards the caller; failures are logged and dropped so that a
//! metric push can never take the reporting process down with it.
use crate::{
    gateway::Gateway,
    parser::parse_samples,
    GaugeMetric,
    Labels,
};
use std::time::{
    SystemTime,
    UNIX_EPOCH,
};
use tracing::{
    debug,
    error,
    warn,
};

/// Configuration resolved from the process environment, once, at the
/// boundary. The reporting core itself never reads environment variables.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    /// Host identifier appended to the job name on push (`HOST`).
    pub host_suffix: Option<String>,
    /// Gateway address used when the report carries none (`PROMETHEUS_HOST`).
    pub fallback_gateway: Option<String>,
}

impl Environment {
    /// Read `HOST` and `PROMETHEUS_HOST`. Empty values count as unset.
    pub fn from_env() -> Self {
        Self {
            host_suffix: std::env::var("HOST").ok().filter(|v| !v.is_empty()),
            fallback_gateway: std::env::var("PROMETHEUS_HOST").ok().filter(|v| !v.is_empty()),
        }
    }
}

/// One metric report, as handed to [`send_info`].
#[derive(Debug, Clone, Default)]
pub struct InfoReport<'a> {
    /// Push gateway base address. Falls back to the environment's.
    pub gateway: Option<&'a str>,
    /// Job name, before any host suffix.
    pub job: &'a str,
    /// Metric name.
    pub metric: &'a str,
    pub source: Option<&'a str>,
    pub block: Option<&'a str>,
    pub family: Option<&'a str>,
    /// Literal value to set. `None` means "set to the current time".
    pub value: Option<f64>,
    /// Delta added to the value currently on the gateway. Overrides
    /// `value` when present.
    pub add: Option<i64>,
}

/// Scan exposition text for the first sample named `metric` whose `job`
/// label contains `job`.
///
/// The containment check is deliberately loose: jobs are pushed under
/// names carrying a host suffix (`jobA<host>`) but looked up by their
/// base name. The flip side, unrelated jobs sharing a prefix matching
/// too, is accepted.
pub fn find_current_value(text: &str, metric: &str, job: &str) -> Option<f64> {
    let samples = match parse_samples(text) {
        Ok(samples) => samples,
        Err(err) => {
            warn!(%err, "metrics page is not valid exposition text");
            return None;
        }
    };
    samples
        .into_iter()
        .find(|sample| {
            sample.name == metric
                && sample
                    .labels
                    .get("job")
                    .is_some_and(|label| label.contains(job))
        })
        .map(|sample| sample.value)
}

/// The value currently stored on the gateway for `metric` under a job
/// matching `job`, or `0` when there is none or the fetch fails.
pub fn fetch_current_value(gateway: &Gateway, metric: &str, job: &str) -> f64 {
    let text = match gateway.fetch_metrics() {
        Ok(text) => text,
        Err(err) => {
            warn!(gateway = %gateway.address(), %err, "failed to fetch current metrics, assuming 0");
            return 0.0;
        }
    };
    match find_current_value(&text, metric, job) {
        Some(value) => value,
        None => {
            debug!(metric, job, "no matching sample on the gateway, assuming 0");
            0.0
        }
    }
}

/// Build the gauge snapshot to push: the literal value when one is given,
/// the current wall-clock time otherwise.
pub fn build_metric(name: &str, labels: Labels, value: Option<f64>) -> GaugeMetric {
    let value = value.unwrap_or_else(unix_time_now);
    GaugeMetric::new(name.into(), labels, value)
}

/// Seconds since the Unix epoch, fractional.
fn unix_time_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or_default()
}

/// Report one metric to the push gateway.
///
/// The job name gets the environment's host suffix appended; the gateway
/// address comes from the report or, failing that, the environment. With
/// neither this is a no-op: reporting must never block or fail its
/// caller. With `add` set, the currently stored value is fetched first
/// and the delta added to it.
pub fn send_info(report: &InfoReport<'_>, env: &Environment) {
    let mut job = report.job.to_string();
    if let Some(host) = env.host_suffix.as_deref() {
        job.push_str(host);
    }
    let Some(addr) = report.gateway.or(env.fallback_gateway.as_deref()) else {
        debug!(metric = report.metric, "no gateway address resolvable, skipping report");
        return;
    };
    let gateway = match Gateway::new(addr) {
        Ok(gateway) => gateway,
        Err(err) => {
            error!(gateway = addr, metric = report.metric, %err, "not reporting: bad gateway address");
            return;
        }
    };
    // The lookup uses the pre-suffix job name: suffixes are appended at
    // push time and substring-matched at fetch time.
    let value = match report.add {
        Some(delta) => Some(fetch_current_value(&gateway, report.metric, report.job) + delta as f64),
        None => report.value,
    };
    let labels = Labels::from_optional([
        ("source", report.source),
        ("block", report.block),
        ("family", report.family),
    ]);
    let metric = build_metric(report.metric, labels, value);
    if let Err(err) = gateway.push_add(&job, &metric) {
        error!(
            %job,
            gateway = addr,
            metric = %metric.name,
            value = metric.value,
            labels = %metric.labels,
            %err,
            "failed to push metric"
        );
    }
}
