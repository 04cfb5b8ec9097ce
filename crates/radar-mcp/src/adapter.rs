//! Request adapter: the mutable request specification, the marker header
//! stamped on scanner traffic, and the HTTP transport that records every
//! exchange in the store.

use crate::store::{RequestStore, StoredResponse};
use std::time::Duration;

/// Stamped on every request the scanner sends; listings exclude requests
/// carrying it.
pub const MARKER_HEADER: &str = "X-Mass-Assignment-Radar";

const SEND_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Baseline,
    Mutated,
    Persisted,
    VerifyBaseline,
    VerifyMutated,
}

impl ScanPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            ScanPhase::Baseline => "baseline",
            ScanPhase::Mutated => "mutated",
            ScanPhase::Persisted => "persisted",
            ScanPhase::VerifyBaseline => "verify-baseline",
            ScanPhase::VerifyMutated => "verify-mutated",
        }
    }
}

/// A mutable clone of a stored request, ready to be adjusted and sent.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: String,
    pub url: String,
    /// Insertion-ordered; lookups are case-insensitive.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RequestSpec {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Replace the first matching header or append a new one.
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let Some(slot) = self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            slot.1 = value.to_string();
        } else {
            self.headers.push((name.to_string(), value.to_string()));
        }
    }

    pub fn set_marker(&mut self, phase: ScanPhase) {
        self.set_header(MARKER_HEADER, phase.as_str());
    }
}

/// Outcome of one send: the stored request id, and the response when one
/// arrived. A transport failure is `response: None`, never a retry.
#[derive(Debug, Clone)]
pub struct Sent {
    pub request_id: String,
    pub response: Option<StoredResponse>,
}

/// The engine's only suspension point. `Err` means the exchange could not
/// even be recorded; a plain transport failure is `Ok` with no response.
pub trait Transport {
    fn send(&self, spec: &RequestSpec) -> impl Future<Output = Result<Sent, String>> + Send;
}

/// Reqwest-backed transport. One request per call, bounded timeout, no
/// redirects, no retries; framing headers are recomputed by the client.
pub struct HttpTransport<'a> {
    store: &'a RequestStore,
}

impl<'a> HttpTransport<'a> {
    pub fn new(store: &'a RequestStore) -> Self {
        Self { store }
    }

    async fn exchange(&self, spec: &RequestSpec) -> Option<StoredResponse> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(SEND_TIMEOUT_SECS))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .ok()?;
        let method = reqwest::Method::from_bytes(spec.method.as_bytes()).ok()?;
        let mut request = client.request(method, &spec.url);
        for (name, value) in &spec.headers {
            if name.eq_ignore_ascii_case("content-length")
                || name.eq_ignore_ascii_case("transfer-encoding")
            {
                continue;
            }
            request = request.header(name, value);
        }
        if !spec.body.is_empty() {
            request = request.body(spec.body.clone());
        }
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                eprintln!("radar transport send error: {e}");
                return None;
            }
        };
        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(n, v)| {
                (
                    n.as_str().to_string(),
                    String::from_utf8_lossy(v.as_bytes()).to_string(),
                )
            })
            .collect();
        let body = response.text().await.unwrap_or_default();
        Some(StoredResponse {
            status,
            headers,
            body,
        })
    }
}

impl Transport for HttpTransport<'_> {
    async fn send(&self, spec: &RequestSpec) -> Result<Sent, String> {
        let response = self.exchange(spec).await;
        let record = self.store.record_exchange(spec, response.clone())?;
        Ok(Sent {
            request_id: record.id,
            response,
        })
    }
}
