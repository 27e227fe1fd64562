//! CLI front of the reporter: parse the flags, send one gauge metric to
//! the push gateway.
//!
//! The `HOST`/`PROMETHEUS_HOST` environment variables are a library
//! concern; this binary is driven by its flags alone. Push failures are
//! logged and the process still exits 0.
use clap::Parser;
use prom_metric_pusher::{
    send_info,
    Environment,
    InfoReport,
};
use tracing_subscriber::EnvFilter;

/// Send a gauge metric to a Prometheus push gateway
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Push gateway base address (host:port)
    #[arg(short = 'a', long)]
    addr_gateway: String,

    /// Metric name
    #[arg(short = 'n', long)]
    name_metric: String,

    /// Job name
    #[arg(short = 'N', long)]
    name_job: String,

    /// Value for the source label
    #[arg(short = 's', long)]
    source: Option<String>,

    /// Value for the block label
    #[arg(short = 'b', long)]
    block: Option<String>,

    /// Value for the family label
    #[arg(short = 'f', long)]
    family: Option<String>,

    /// Delta to add to the value currently stored on the gateway
    /// (overrides --set)
    #[arg(short = 'A', long)]
    add: Option<i64>,

    /// Literal value to set; without --set or --add the metric is set to
    /// the current time
    #[arg(short = 'S', long)]
    set: Option<i64>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let report = InfoReport {
        gateway: Some(&cli.addr_gateway),
        job: &cli.name_job,
        metric: &cli.name_metric,
        source: cli.source.as_deref(),
        block: cli.block.as_deref(),
        family: cli.family.as_deref(),
        value: cli.set.map(|value| value as f64),
        add: cli.add,
    };
    send_info(&report, &Environment::default());
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use clap::Parser;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_parses_all_flags() {
        let cli = Cli::parse_from([
            "prom_metric_pusher",
            "-a",
            "pushgw:9091",
            "-n",
            "crawl_pages",
            "-N",
            "jobA",
            "-s",
            "shop",
            "-b",
            "b1",
            "-f",
            "dress",
            "-A",
            "3",
        ]);
        assert_eq!(cli.addr_gateway, "pushgw:9091");
        assert_eq!(cli.name_metric, "crawl_pages");
        assert_eq!(cli.name_job, "jobA");
        assert_eq!(cli.source.as_deref(), Some("shop"));
        assert_eq!(cli.block.as_deref(), Some("b1"));
        assert_eq!(cli.family.as_deref(), Some("dress"));
        assert_eq!(cli.add, Some(3));
        assert_eq!(cli.set, None);
    }

    #[test]
    fn test_cli_long_flags() {
        let cli = Cli::parse_from([
            "prom_metric_pusher",
            "--addr-gateway",
            "pushgw:9091",
            "--name-metric",
            "crawl_pages",
            "--name-job",
            "jobA",
            "--set",
            "5",
        ]);
        assert_eq!(cli.set, Some(5));
        assert_eq!(cli.add, None);
    }

    #[test]
    fn test_cli_requires_gateway_metric_and_job() {
        let res = Cli::try_parse_from(["prom_metric_pusher", "-a", "pushgw:9091"]);
        assert!(res.is_err());
    }
}
