#![forbid(unsafe_code)]
//! Report a single gauge metric to a Prometheus push gateway, optionally
//! adding to the value already stored there.
//!
//! The wire format on both the read (`GET /metrics`) and write
//! (`POST /metrics/job/<job>`) paths is the Prometheus text exposition
//! format, taken from here:
//! <https://prometheus.io/docs/instrumenting/exposition_formats/>
use derive_more::Constructor;
pub use gateway::{
    Gateway,
    GatewayError,
};
pub use parser::{
    parse_samples,
    ScrapeParseError,
};
pub use reporter::{
    build_metric,
    fetch_current_value,
    find_current_value,
    send_info,
    Environment,
    InfoReport,
};
use std::fmt::Display;

pub mod gateway;
mod parser;
pub mod reporter;

/// The possible kinds of Prometheus metrics.
///
/// The read side uses the full list to recognize `# TYPE` lines; the write
/// side only ever emits `Gauge`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::EnumString, strum::Display)]
#[strum(ascii_case_insensitive)]
#[strum(serialize_all = "snake_case")]
pub enum Kind {
    Counter,
    Gauge,
    #[default]
    Untyped,
    Summary,
    Histogram,
}

/// A single label of a sample.
///
/// Example:
/// ```text
/// source="a"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Constructor)]
pub struct Label {
    /// Label key
    pub key: String,
    /// Label value (without the quotes)
    pub value: String,
}

/// A set of labels identifying a sample.
///
/// Example:
/// ```text
/// {source="a",block="1",family="x"}
/// ```
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Default,
    derive_more::Deref,
    derive_more::DerefMut,
    derive_more::From,
)]
#[repr(transparent)]
pub struct Labels(Vec<Label>);

impl Labels {
    /// Build a label set from optional values, dropping any pair whose
    /// value is absent or empty.
    pub fn from_optional<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
    {
        let labels = pairs
            .into_iter()
            .filter_map(|(key, value)| match value {
                Some(value) if !value.is_empty() => Some(Label::new(key.into(), value.into())),
                _ => None,
            })
            .collect::<Vec<_>>();
        Self(labels)
    }

    /// The value of the label with the given key, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|label| label.key == key)
            .map(|label| label.value.as_str())
    }
}

impl Display for Labels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return Ok(());
        }
        let last_idx = self.0.len() - 1;
        f.write_str("{")?;
        for (idx, label) in self.0.iter().enumerate() {
            f.write_str(&label.key)?;
            f.write_str("=\"")?;
            f.write_str(&escape_label_value(&label.value))?;
            f.write_str("\"")?;
            if idx != last_idx {
                f.write_str(",")?;
            }
        }
        f.write_str("}")?;
        Ok(())
    }
}

/// Escape a label value for the exposition format: backslash, double
/// quote and line feed.
fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str(r"\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str(r"\n"),
            ch => escaped.push(ch),
        }
    }
    escaped
}

/// Render a sample value the way Go does: the special values are spelled
/// `+Inf`, `-Inf` and `NaN`, everything else prints as a plain float.
fn format_value(value: f64) -> String {
    if value == f64::INFINITY {
        "+Inf".into()
    } else if value == f64::NEG_INFINITY {
        "-Inf".into()
    } else if value.is_nan() {
        "NaN".into()
    } else {
        format!("{value}")
    }
}

/// A single parsed sample line of a scrape.
///
/// Examples:
/// ```text
/// metric_x{job="jobA"} 7
/// metric_without_timestamp_and_labels 12.47
/// http_requests_total{method="post",code="200"} 1027 1395066363000
/// ```
#[derive(Debug, Clone, PartialEq, Constructor)]
pub struct Sample {
    /// The metric name the sample belongs to.
    pub name: String,
    pub labels: Labels,
    pub value: f64,
    /// Milliseconds since epoch. Parsed and tolerated, unused here.
    pub timestamp: Option<i64>,
}

/// The gauge snapshot pushed to the gateway.
///
/// Implements `Display` to render a complete single-metric exposition body.
/// The gateway attaches the `job` grouping label itself, from the push URL,
/// so the body never carries one.
///
/// Example:
/// ```text
/// # HELP crawl_pages crawl_pages
/// # TYPE crawl_pages gauge
/// crawl_pages{source="shop",family="dress"} 1027
/// ```
#[derive(Debug, Clone, PartialEq, Constructor)]
pub struct GaugeMetric {
    pub name: String,
    pub labels: Labels,
    pub value: f64,
}

impl Display for GaugeMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The metric name doubles as its HELP text.
        writeln!(f, "# HELP {} {}", self.name, self.name)?;
        writeln!(f, "# TYPE {} {}", self.name, Kind::Gauge)?;
        writeln!(f, "{}{} {}", self.name, self.labels, format_value(self.value))?;
        Ok(())
    }
}
