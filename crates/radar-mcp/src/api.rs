use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// schemars renders a tagged enum's root schema as a bare `oneOf`, but the
/// MCP spec requires tool outputSchema to declare root `"type": "object"`;
/// every variant is already an object, so this only adds the missing tag.
fn ensure_object_type(schema: &mut schemars::Schema) {
    if schema.get("oneOf").is_some() && schema.get("type").is_none() {
        schema.insert("type".to_string(), serde_json::json!("object"));
    }
}

/// Envelope for every RPC return: `{kind:"Ok",value}` or
/// `{kind:"Error",error}`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind")]
#[schemars(transform = ensure_object_type)]
pub enum ApiResult<T> {
    Ok { value: T },
    Error { error: String },
}

impl<T> ApiResult<T> {
    pub fn ok(value: T) -> Self {
        Self::Ok { value }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
        }
    }

    pub fn from_result(result: Result<T, crate::errors::RadarError>) -> Self {
        match result {
            Ok(value) => Self::Ok { value },
            Err(e) => Self::Error {
                error: e.to_string(),
            },
        }
    }
}

/// The five independent built-in value modes of the mutation generator.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ValueModes {
    #[serde(default)]
    pub boolean_true: bool,
    #[serde(default)]
    pub string_admin: bool,
    #[serde(default)]
    pub number_one: bool,
    #[serde(default)]
    pub number_plus_one: bool,
    #[serde(default)]
    pub number_minus_one: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind")]
pub enum VerificationConfig {
    #[default]
    Disabled,
    #[serde(rename_all = "camelCase")]
    FollowUp {
        #[serde(default)]
        url: String,
        /// Trimmed and upper-cased before use; empty defaults to GET.
        #[serde(default)]
        method: String,
        #[serde(default)]
        body: String,
        #[serde(default)]
        delay_ms: i64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ScanConfig {
    pub max_mutations: i64,
    #[serde(default)]
    pub include_built_in_candidates: bool,
    #[serde(default)]
    pub candidate_fields: Vec<String>,
    #[serde(default)]
    pub custom_values: Vec<String>,
    #[serde(default)]
    pub mutate_existing_fields: bool,
    #[serde(default)]
    pub value_modes: ValueModes,
    #[serde(default)]
    pub confirm_persistence: bool,
    #[serde(default)]
    pub persistence_delay_ms: i64,
    #[serde(default)]
    pub verification: VerificationConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum FindingKind {
    Reflected,
    Persisted,
    CodeChanged,
    StateChanged,
    NonJsonResponse,
    NoResponse,
}

impl FindingKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FindingKind::Reflected => "Reflected",
            FindingKind::Persisted => "Persisted",
            FindingKind::CodeChanged => "CodeChanged",
            FindingKind::StateChanged => "StateChanged",
            FindingKind::NonJsonResponse => "NonJsonResponse",
            FindingKind::NoResponse => "NoResponse",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScanFinding {
    /// `"{baselineRequestId}:{kind}:{field}:{value}"`; unique within a scan.
    pub id: String,
    /// The baseline stored-request id the finding is attributed to.
    pub request_id: String,
    pub kind: FindingKind,
    pub field: String,
    /// Stringified injected value (see `body::safe_stringify`).
    pub value: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutated_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persisted_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutated_request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persisted_request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_baseline_request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_body_snippet: Option<String>,
    /// Snippet of the response that evidences the finding (mutated,
    /// persisted, or verification response depending on `kind`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_snippet: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    /// Resolved baseline request id.
    pub request_id: String,
    pub findings: Vec<ScanFinding>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestSummary {
    pub id: String,
    pub method: String,
    pub url: String,
    /// ISO-8601.
    pub created_at: String,
    pub has_response: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RunScanRequest {
    pub request_id: String,
    pub config: ScanConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct StopScanRequest {}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StopScanOutput {
    /// Whether a scan was active when the stop arrived.
    pub stopped: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ListJsonRequestsRequest {
    /// Case-insensitive substring over `"<METHOD> <URL>"`.
    #[serde(default)]
    pub filter: Option<String>,
    pub limit: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RequestIdRequest {
    pub request_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestPreview {
    pub request_id: String,
    pub request_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SaveRawRequest {
    pub host: String,
    pub port: i64,
    #[serde(default)]
    pub is_tls: bool,
    pub raw: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateFindingsRequest {
    pub request_id: String,
    #[serde(default)]
    pub findings: Vec<ScanFinding>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateFindingsOutput {
    pub created: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_result_envelope_is_kind_tagged() {
        let ok = serde_json::to_value(ApiResult::ok(1)).unwrap();
        assert_eq!(ok["kind"], "Ok");
        assert_eq!(ok["value"], 1);

        let err = serde_json::to_value(ApiResult::<i32>::error("boom")).unwrap();
        assert_eq!(err["kind"], "Error");
        assert_eq!(err["error"], "boom");
    }

    #[test]
    fn scan_config_uses_camel_case_wire_names() {
        let cfg: ScanConfig = serde_json::from_value(serde_json::json!({
            "maxMutations": 16,
            "includeBuiltInCandidates": true,
            "valueModes": {"stringAdmin": true},
            "persistenceDelayMs": 250
        }))
        .expect("deserialize ScanConfig");
        assert_eq!(cfg.max_mutations, 16);
        assert!(cfg.include_built_in_candidates);
        assert!(cfg.value_modes.string_admin);
        assert!(!cfg.value_modes.boolean_true);
        assert_eq!(cfg.persistence_delay_ms, 250);
        assert!(matches!(cfg.verification, VerificationConfig::Disabled));
    }

    #[test]
    fn scan_config_rejects_unknown_fields() {
        let err = serde_json::from_value::<ScanConfig>(serde_json::json!({
            "maxMutations": 1,
            "unknown": true
        }))
        .unwrap_err();
        assert!(err.to_string().contains("unknown field"), "{err}");
    }

    #[test]
    fn verification_is_kind_tagged() {
        let v: VerificationConfig = serde_json::from_value(serde_json::json!({
            "kind": "FollowUp",
            "url": "/me",
            "method": "GET",
            "delayMs": 100
        }))
        .expect("deserialize FollowUp");
        let VerificationConfig::FollowUp { url, delay_ms, .. } = v else {
            panic!("expected FollowUp");
        };
        assert_eq!(url, "/me");
        assert_eq!(delay_ms, 100);

        let disabled: VerificationConfig =
            serde_json::from_value(serde_json::json!({"kind": "Disabled"}))
                .expect("deserialize Disabled");
        assert!(matches!(disabled, VerificationConfig::Disabled));
    }

    #[test]
    fn finding_omits_absent_statuses() {
        let finding = ScanFinding {
            id: "b:Reflected:role:admin".to_string(),
            request_id: "b".to_string(),
            kind: FindingKind::Reflected,
            field: "role".to_string(),
            value: "admin".to_string(),
            message: "response contains injected key".to_string(),
            baseline_status: Some(200),
            mutated_status: None,
            persisted_status: None,
            mutated_request_id: None,
            persisted_request_id: None,
            verify_baseline_request_id: None,
            verify_request_id: None,
            baseline_body_snippet: None,
            body_snippet: None,
        };
        let json = serde_json::to_value(&finding).unwrap();
        assert_eq!(json["baselineStatus"], 200);
        assert!(json.get("mutatedStatus").is_none());
        assert_eq!(json["kind"], "Reflected");
    }

    #[test]
    fn save_raw_request_wire_shape() {
        let req: SaveRawRequest = serde_json::from_value(serde_json::json!({
            "host": "api.internal",
            "port": 8443,
            "isTls": true,
            "raw": "POST /x HTTP/1.1\r\n\r\n{}"
        }))
        .expect("deserialize SaveRawRequest");
        assert!(req.is_tls);
        assert_eq!(req.port, 8443);
    }
}
