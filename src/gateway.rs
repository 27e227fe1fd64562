//! Blocking HTTP against one push gateway: read the current metrics page,
//! push one metric set for a job.
use crate::GaugeMetric;
use reqwest::blocking::Client;
use url::Url;

/// Content type of the text exposition format, on both directions.
const TEXT_FORMAT: &str = "text/plain; version=0.0.4";

/// The ways talking to the gateway can fail.
///
/// These are returned as-is; deciding whether a failure matters is the
/// caller's business (the reporter logs and moves on).
#[derive(Debug, derive_more::Display, derive_more::From)]
pub enum GatewayError {
    /// The gateway address did not parse as a URL.
    #[display(fmt = "invalid gateway address: {}", _0)]
    Address(url::ParseError),
    /// The request could not be sent, or the response body not read.
    #[display(fmt = "request failed: {}", _0)]
    Transport(reqwest::Error),
    /// The gateway answered with a non-success status.
    #[display(fmt = "gateway returned status {}", _0)]
    #[from(ignore)]
    Status(u16),
}

impl std::error::Error for GatewayError {}

/// A handle to one push gateway.
///
/// Holds the normalized base address and the blocking HTTP client shared
/// by the fetch and push calls of a single invocation.
#[derive(Debug, Clone)]
pub struct Gateway {
    base: Url,
    client: Client,
}

impl Gateway {
    /// Create a handle from a base address like `pushgw.example.org:9091`.
    ///
    /// The scheme defaults to plain HTTP when the address does not carry
    /// one.
    pub fn new(addr: &str) -> Result<Self, GatewayError> {
        let addr = if addr.contains("://") {
            addr.to_string()
        } else {
            format!("http://{addr}")
        };
        let base = Url::parse(&addr)?;
        Ok(Self {
            base,
            client: Client::new(),
        })
    }

    /// The normalized base address.
    pub fn address(&self) -> &Url {
        &self.base
    }

    /// `<base>/metrics`
    fn metrics_url(&self) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("metrics");
        }
        url
    }

    /// `<base>/metrics/job/<job>`, with the job name percent-encoded as a
    /// single path segment.
    fn push_url(&self, job: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["metrics", "job", job]);
        }
        url
    }

    /// Fetch the gateway's metrics page.
    pub fn fetch_metrics(&self) -> Result<String, GatewayError> {
        let response = self.client.get(self.metrics_url()).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status(status.as_u16()));
        }
        Ok(response.text()?)
    }

    /// Push one rendered metric under the given job name.
    ///
    /// POST is the gateway's push-with-add: this job's metric set is
    /// replaced, every other job's data stays untouched.
    pub fn push_add(&self, job: &str, metric: &GaugeMetric) -> Result<(), GatewayError> {
        let response = self
            .client
            .post(self.push_url(job))
            .header(reqwest::header::CONTENT_TYPE, TEXT_FORMAT)
            .body(metric.to_string())
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status(status.as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Gateway,
        GatewayError,
    };
    use crate::{
        tests::init_test_logging,
        GaugeMetric,
        Labels,
    };
    use pretty_assertions::assert_eq;
    use std::{
        io::Read,
        thread::{
            self,
            JoinHandle,
        },
    };
    use tiny_http::{
        Response,
        Server,
    };

    /// What the test server saw in the one request it handled.
    struct Captured {
        method: String,
        url: String,
        content_type: Option<String>,
        body: String,
    }

    /// Answer exactly one request with the given status and body, handing
    /// back what was received.
    fn serve_one(status: u16, body: &'static str) -> (String, JoinHandle<Captured>) {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap().to_string();
        let handle = thread::spawn(move || {
            let mut request = server.recv().unwrap();
            let mut received = String::new();
            request.as_reader().read_to_string(&mut received).unwrap();
            let captured = Captured {
                method: request.method().to_string(),
                url: request.url().to_owned(),
                content_type: request
                    .headers()
                    .iter()
                    .find(|header| header.field.equiv("Content-Type"))
                    .map(|header| header.value.to_string()),
                body: received,
            };
            let response = Response::from_string(body).with_status_code(status);
            request.respond(response).unwrap();
            captured
        });
        (addr, handle)
    }

    #[test]
    fn test_new_defaults_to_http() {
        init_test_logging();

        let gateway = Gateway::new("pushgw.example.org:9091").unwrap();
        assert_eq!(gateway.address().as_str(), "http://pushgw.example.org:9091/");

        let gateway = Gateway::new("https://pushgw.example.org").unwrap();
        assert_eq!(gateway.address().scheme(), "https");
    }

    #[test]
    fn test_new_rejects_garbage() {
        init_test_logging();

        assert!(matches!(
            Gateway::new("http://"),
            Err(GatewayError::Address(_))
        ));
    }

    #[test]
    fn test_fetch_metrics() {
        init_test_logging();

        let page = "# TYPE crawl_pages gauge\ncrawl_pages{job=\"jobA\"} 7\n";
        let (addr, handle) = serve_one(200, page);
        let gateway = Gateway::new(&addr).unwrap();
        let fetched = gateway.fetch_metrics().unwrap();
        assert_eq!(fetched, page);
        let captured = handle.join().unwrap();
        assert_eq!(captured.method, "GET");
        assert_eq!(captured.url, "/metrics");
    }

    #[test]
    fn test_fetch_metrics_bad_status() {
        init_test_logging();

        let (addr, handle) = serve_one(500, "boom");
        let gateway = Gateway::new(&addr).unwrap();
        assert!(matches!(
            gateway.fetch_metrics(),
            Err(GatewayError::Status(500))
        ));
        handle.join().unwrap();
    }

    #[test]
    fn test_push_add() {
        init_test_logging();

        let (addr, handle) = serve_one(200, "");
        let gateway = Gateway::new(&addr).unwrap();
        let labels = Labels::from_optional([("source", Some("shop"))]);
        let metric = GaugeMetric::new("crawl_pages".into(), labels, 10.0);
        gateway.push_add("jobA", &metric).unwrap();

        let captured = handle.join().unwrap();
        assert_eq!(captured.method, "POST");
        assert_eq!(captured.url, "/metrics/job/jobA");
        assert_eq!(
            captured.content_type.as_deref(),
            Some("text/plain; version=0.0.4")
        );
        assert_eq!(captured.body, metric.to_string());
    }

    #[test]
    fn test_push_add_encodes_job_segment() {
        init_test_logging();

        let (addr, handle) = serve_one(200, "");
        let gateway = Gateway::new(&addr).unwrap();
        let metric = GaugeMetric::new("m".into(), Labels::default(), 1.0);
        gateway.push_add("job with spaces", &metric).unwrap();

        let captured = handle.join().unwrap();
        assert_eq!(captured.url, "/metrics/job/job%20with%20spaces");
    }

    #[test]
    fn test_push_add_bad_status() {
        init_test_logging();

        let (addr, handle) = serve_one(400, "pushed metrics are invalid");
        let gateway = Gateway::new(&addr).unwrap();
        let metric = GaugeMetric::new("m".into(), Labels::default(), 1.0);
        assert!(matches!(
            gateway.push_add("jobA", &metric),
            Err(GatewayError::Status(400))
        ));
        handle.join().unwrap();
    }
}
