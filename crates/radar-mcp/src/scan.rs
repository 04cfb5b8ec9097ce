//! Scan orchestration: config validation, baseline resolution, the optional
//! verification baseline, and the cancellable mutation loop.

use crate::adapter::{RequestSpec, ScanPhase, Transport};
use crate::api::{ScanConfig, ScanResult, VerificationConfig};
use crate::classify::{self, truncate_snippet};
use crate::errors::RadarError;
use crate::mutation;
use crate::store::{RequestRecord, RequestStore};
use serde_json::{Map, Value};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use url::Url;

const MAX_SNIFF_BODY_BYTES: usize = 1_000_000;

/// Scan-scoped cancellation signal. Advisory: the loop exits at the next
/// mutation boundary, in-flight requests are never aborted.
#[derive(Debug, Clone, Default)]
pub struct ScanToken(Arc<AtomicBool>);

impl ScanToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One scan at a time: `begin` installs a fresh token and fails while one is
/// installed; `stop` cancels the installed token. The slot is released when
/// the returned guard drops, so early returns, panics, and dropped scan
/// futures never wedge the gate.
#[derive(Debug, Default)]
pub struct ScanGate {
    active: Mutex<Option<ScanToken>>,
}

/// Holds the gate slot for the lifetime of one scan.
#[derive(Debug)]
pub struct ScanGuard<'a> {
    gate: &'a ScanGate,
    token: ScanToken,
}

impl ScanGuard<'_> {
    pub fn token(&self) -> &ScanToken {
        &self.token
    }
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.gate.finish();
    }
}

impl ScanGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> Result<ScanGuard<'_>, RadarError> {
        let mut slot = self.active.lock().map_err(|_| RadarError::ScanAlreadyRunning)?;
        if slot.is_some() {
            return Err(RadarError::ScanAlreadyRunning);
        }
        let token = ScanToken::new();
        *slot = Some(token.clone());
        Ok(ScanGuard { gate: self, token })
    }

    fn finish(&self) {
        if let Ok(mut slot) = self.active.lock() {
            *slot = None;
        }
    }

    /// Cancel the active scan, reporting whether one was installed.
    pub fn stop(&self) -> bool {
        match self.active.lock() {
            Ok(slot) => match slot.as_ref() {
                Some(token) => {
                    token.cancel();
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }
}

/// Per-scan state shared with the classifier.
pub(crate) struct ScanContext {
    pub baseline_id: String,
    pub baseline_spec: RequestSpec,
    pub baseline_value: Value,
    pub baseline_status: Option<u16>,
    pub baseline_snippet: Option<String>,
    pub verify: Option<VerifyContext>,
    pub confirm_persistence: bool,
    pub persistence_delay_ms: u64,
}

pub(crate) struct VerifyContext {
    /// Verification spec as sent for the baseline probe; re-stamped
    /// `verify-mutated` per mutation.
    pub spec: RequestSpec,
    pub delay_ms: u64,
    pub baseline_request_id: String,
    /// Set only when the verify-baseline response parsed as a JSON object;
    /// unset skips the per-mutation diff.
    pub baseline_json: Option<Value>,
}

/// Enforce the configuration bounds before any I/O.
pub fn validate_config(target_id: &str, config: &ScanConfig) -> Result<(), RadarError> {
    if target_id.trim().is_empty() {
        return Err(RadarError::RequestIdRequired);
    }
    if config.max_mutations < 1 {
        return Err(RadarError::MaxMutationsTooSmall);
    }
    if config.max_mutations > 256 {
        return Err(RadarError::MaxMutationsTooLarge);
    }
    if config.persistence_delay_ms < 0 {
        return Err(RadarError::PersistenceDelayNegative);
    }
    if config.persistence_delay_ms > 10_000 {
        return Err(RadarError::PersistenceDelayTooLarge);
    }
    if config.candidate_fields.len() > 5_000 {
        return Err(RadarError::CandidateFieldsTooLarge);
    }
    if let VerificationConfig::FollowUp { delay_ms, .. } = &config.verification {
        if *delay_ms < 0 {
            return Err(RadarError::VerificationDelayNegative);
        }
        if *delay_ms > 10_000 {
            return Err(RadarError::VerificationDelayTooLarge);
        }
    }
    Ok(())
}

/// Whether a stored request qualifies as a JSON scan target: JSON
/// content-type, or a body that sniffs as a JSON object (bounded).
pub fn is_json_candidate(record: &RequestRecord) -> bool {
    if content_type_is_json(record) {
        return true;
    }
    sniffs_as_object(&record.body)
}

fn content_type_is_json(record: &RequestRecord) -> bool {
    record
        .header("Content-Type")
        .is_some_and(|v| v.to_ascii_lowercase().contains("application/json"))
}

fn sniffs_as_object(body: &str) -> bool {
    body.len() <= MAX_SNIFF_BODY_BYTES
        && body.trim_start().starts_with('{')
        && serde_json::from_str::<Value>(body)
            .map(|v| v.is_object())
            .unwrap_or(false)
}

fn decode_baseline_object(record: &RequestRecord) -> Result<Map<String, Value>, RadarError> {
    let body = record.body.as_str();
    if content_type_is_json(record) {
        if body.trim().is_empty() {
            return Err(RadarError::BodyEmpty);
        }
    } else if body.len() > MAX_SNIFF_BODY_BYTES || !body.trim_start().starts_with('{') {
        return Err(RadarError::NotJsonContentType);
    }
    let value: Value = serde_json::from_str(body.trim()).map_err(|_| RadarError::BodyNotJson)?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(RadarError::BodyNotObject),
    }
}

fn resolve_follow_up_url(baseline_url: &str, target: &str) -> Result<String, RadarError> {
    let target = target.trim();
    if target.starts_with("http://") || target.starts_with("https://") {
        return Ok(target.to_string());
    }
    let base = Url::parse(baseline_url).map_err(|_| RadarError::BaselineUrlInvalid)?;
    let host = base.host_str().ok_or(RadarError::BaselineUrlInvalid)?;
    let origin = match base.port() {
        Some(port) => format!("{}://{host}:{port}", base.scheme()),
        None => format!("{}://{host}", base.scheme()),
    };
    if target.starts_with('/') {
        Ok(format!("{origin}{target}"))
    } else {
        Ok(format!("{origin}/{target}"))
    }
}

fn verify_spec(
    baseline: &RequestRecord,
    url: String,
    method: &str,
    body: &str,
) -> RequestSpec {
    let method = method.trim().to_ascii_uppercase();
    let mut spec = RequestSpec {
        method: if method.is_empty() {
            "GET".to_string()
        } else {
            method
        },
        url,
        headers: baseline
            .headers
            .iter()
            .filter(|(name, _)| {
                !name.eq_ignore_ascii_case("content-length")
                    && !name.eq_ignore_ascii_case("transfer-encoding")
                    && !name.eq_ignore_ascii_case("host")
            })
            .cloned()
            .collect(),
        body: body.to_string(),
    };
    spec.set_marker(ScanPhase::VerifyBaseline);
    spec
}

/// Run one scan to completion (or cancellation), returning the accumulated
/// findings in mutation order.
pub async fn run_scan<T: Transport>(
    store: &RequestStore,
    transport: &T,
    target_id: &str,
    config: &ScanConfig,
    token: &ScanToken,
) -> Result<ScanResult, RadarError> {
    validate_config(target_id, config)?;
    let target_id = target_id.trim();

    let record = store
        .get(target_id)
        .map_err(RadarError::Store)?
        .ok_or_else(|| RadarError::RequestNotFound(target_id.to_string()))?;

    let baseline_obj = decode_baseline_object(&record)?;

    let (baseline_status, baseline_body) = match &record.response {
        Some(response) => (Some(response.status), response.body.clone()),
        None => {
            let mut spec = record.to_spec();
            spec.set_marker(ScanPhase::Baseline);
            let sent = transport
                .send(&spec)
                .await
                .map_err(|_| RadarError::BaselineSendFailed)?;
            let response = sent.response.ok_or(RadarError::BaselineSendFailed)?;
            (Some(response.status), response.body)
        }
    };

    let verify = match &config.verification {
        VerificationConfig::Disabled => None,
        VerificationConfig::FollowUp {
            url,
            method,
            body,
            delay_ms,
        } => {
            if url.trim().is_empty() {
                return Err(RadarError::VerificationUrlRequired);
            }
            let resolved = resolve_follow_up_url(&record.url, url)?;
            let spec = verify_spec(&record, resolved, method, body);
            let sent = transport
                .send(&spec)
                .await
                .map_err(|_| RadarError::VerificationSendFailed)?;
            let response = sent.response.ok_or(RadarError::VerificationNoResponse)?;
            let baseline_json = serde_json::from_str::<Value>(&response.body)
                .ok()
                .filter(Value::is_object);
            Some(VerifyContext {
                spec,
                delay_ms: *delay_ms as u64,
                baseline_request_id: sent.request_id,
                baseline_json,
            })
        }
    };

    let mutations = mutation::build_mutations(&baseline_obj, config);
    if mutations.is_empty() {
        return Err(RadarError::NoMutations);
    }

    let ctx = ScanContext {
        baseline_id: record.id.clone(),
        baseline_spec: record.to_spec(),
        baseline_value: Value::Object(baseline_obj),
        baseline_status,
        baseline_snippet: truncate_snippet(&baseline_body),
        verify,
        confirm_persistence: config.confirm_persistence,
        persistence_delay_ms: config.persistence_delay_ms as u64,
    };

    let mut findings = vec![];
    for mutation in &mutations {
        if token.is_cancelled() {
            break;
        }
        classify::classify_mutation(transport, &ctx, mutation, &mut findings).await;
    }

    Ok(ScanResult {
        request_id: record.id,
        findings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ValueModes;

    fn config() -> ScanConfig {
        ScanConfig {
            max_mutations: 16,
            include_built_in_candidates: true,
            candidate_fields: vec![],
            custom_values: vec![],
            mutate_existing_fields: false,
            value_modes: ValueModes {
                boolean_true: true,
                ..ValueModes::default()
            },
            confirm_persistence: false,
            persistence_delay_ms: 0,
            verification: VerificationConfig::Disabled,
        }
    }

    #[test]
    fn validation_covers_every_bound() {
        let cases: Vec<(ScanConfig, &str)> = vec![
            (
                ScanConfig {
                    max_mutations: 0,
                    ..config()
                },
                "maxMutations must be >= 1",
            ),
            (
                ScanConfig {
                    max_mutations: 257,
                    ..config()
                },
                "maxMutations must be <= 256",
            ),
            (
                ScanConfig {
                    persistence_delay_ms: -1,
                    ..config()
                },
                "persistenceDelayMs must be >= 0",
            ),
            (
                ScanConfig {
                    persistence_delay_ms: 10_001,
                    ..config()
                },
                "persistenceDelayMs must be <= 10000",
            ),
            (
                ScanConfig {
                    candidate_fields: vec![String::from("f"); 5_001],
                    ..config()
                },
                "candidateFields is too large",
            ),
            (
                ScanConfig {
                    verification: VerificationConfig::FollowUp {
                        url: "/me".to_string(),
                        method: String::new(),
                        body: String::new(),
                        delay_ms: -5,
                    },
                    ..config()
                },
                "verification.delayMs must be >= 0",
            ),
            (
                ScanConfig {
                    verification: VerificationConfig::FollowUp {
                        url: "/me".to_string(),
                        method: String::new(),
                        body: String::new(),
                        delay_ms: 10_001,
                    },
                    ..config()
                },
                "verification.delayMs must be <= 10000",
            ),
        ];
        for (cfg, expected) in cases {
            let err = validate_config("req-1", &cfg).expect_err("config must be rejected");
            assert_eq!(err.to_string(), expected);
        }
    }

    #[test]
    fn blank_target_id_is_rejected() {
        let err = validate_config("  ", &config()).expect_err("blank id");
        assert_eq!(err.to_string(), "requestId is required");
    }

    #[test]
    fn boundary_mutation_counts_pass_validation() {
        for max in [1, 256] {
            let cfg = ScanConfig {
                max_mutations: max,
                ..config()
            };
            assert!(validate_config("req-1", &cfg).is_ok());
        }
    }

    #[test]
    fn follow_up_url_resolution() {
        assert_eq!(
            resolve_follow_up_url("http://api.internal:3000/update", "/me").expect("resolve"),
            "http://api.internal:3000/me"
        );
        assert_eq!(
            resolve_follow_up_url("https://api.internal/update", "me").expect("resolve"),
            "https://api.internal/me"
        );
        assert_eq!(
            resolve_follow_up_url("http://x/y", "https://other.example/z").expect("resolve"),
            "https://other.example/z"
        );
        assert!(matches!(
            resolve_follow_up_url("not a url", "/me"),
            Err(RadarError::BaselineUrlInvalid)
        ));
    }

    #[test]
    fn verify_spec_strips_hop_headers_and_defaults_method() {
        let record = RequestRecord {
            id: "req-1".to_string(),
            created_at_ms: 0,
            method: "POST".to_string(),
            url: "http://h/x".to_string(),
            headers: vec![
                ("Host".to_string(), "h".to_string()),
                ("Content-Length".to_string(), "7".to_string()),
                ("Transfer-Encoding".to_string(), "chunked".to_string()),
                ("Cookie".to_string(), "sid=1".to_string()),
            ],
            body: "{}".to_string(),
            response: None,
        };
        let spec = verify_spec(&record, "http://h/me".to_string(), "  ", "");
        assert_eq!(spec.method, "GET");
        assert_eq!(spec.header("Host"), None);
        assert_eq!(spec.header("Content-Length"), None);
        assert_eq!(spec.header("Transfer-Encoding"), None);
        assert_eq!(spec.header("Cookie"), Some("sid=1"));
        assert_eq!(spec.header(crate::adapter::MARKER_HEADER), Some("verify-baseline"));
    }

    #[test]
    fn scan_gate_enforces_single_scan() {
        let gate = ScanGate::new();
        let guard = gate.begin().expect("first scan");
        assert!(matches!(gate.begin(), Err(RadarError::ScanAlreadyRunning)));
        assert!(gate.stop());
        assert!(guard.token().is_cancelled());
        drop(guard);
        assert!(gate.begin().is_ok());
    }

    #[test]
    fn gate_releases_when_guard_drops_early() {
        let gate = ScanGate::new();
        {
            let _guard = gate.begin().expect("begin");
            assert!(matches!(gate.begin(), Err(RadarError::ScanAlreadyRunning)));
        }
        assert!(gate.begin().is_ok());
    }

    #[test]
    fn stop_without_active_scan_reports_false() {
        let gate = ScanGate::new();
        assert!(!gate.stop());
    }

    #[test]
    fn json_candidate_rules() {
        let mut record = RequestRecord {
            id: "r".to_string(),
            created_at_ms: 0,
            method: "POST".to_string(),
            url: "http://h/x".to_string(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: "{\"a\":1}".to_string(),
            response: None,
        };
        assert!(is_json_candidate(&record));

        record.headers.clear();
        assert!(is_json_candidate(&record));

        record.body = "[1,2]".to_string();
        assert!(!is_json_candidate(&record));

        record.body = "plain text".to_string();
        assert!(!is_json_candidate(&record));
    }

    #[test]
    fn baseline_decode_error_precedence() {
        let mut record = RequestRecord {
            id: "r".to_string(),
            created_at_ms: 0,
            method: "POST".to_string(),
            url: "http://h/x".to_string(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: String::new(),
            response: None,
        };
        assert!(matches!(
            decode_baseline_object(&record),
            Err(RadarError::BodyEmpty)
        ));

        record.body = "{broken".to_string();
        assert!(matches!(
            decode_baseline_object(&record),
            Err(RadarError::BodyNotJson)
        ));

        record.body = "[1]".to_string();
        assert!(matches!(
            decode_baseline_object(&record),
            Err(RadarError::BodyNotObject)
        ));

        record.headers.clear();
        record.body = "plain".to_string();
        assert!(matches!(
            decode_baseline_object(&record),
            Err(RadarError::NotJsonContentType)
        ));
    }
}
