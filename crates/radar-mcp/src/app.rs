//! Operation layer between the tool surface and the engine: bound
//! validation with contractual error strings, then store/engine calls.

use crate::adapter::HttpTransport;
use crate::api::{
    ApiResult, CreateFindingsOutput, RequestPreview, RequestSummary, ScanConfig, ScanFinding,
    ScanResult, StopScanOutput,
};
use crate::errors::RadarError;
use crate::scan::{self, ScanGate};
use crate::sink::FindingsSink;
use crate::store::{RequestRecord, RequestStore};
use crate::wire;

const MAX_PREVIEW_CHARS: usize = 200_000;
const MAX_FINDINGS_PER_CALL: usize = 200;

pub async fn run_scan(
    gate: &ScanGate,
    store: &RequestStore,
    request_id: &str,
    config: &ScanConfig,
) -> ApiResult<ScanResult> {
    // The guard releases the gate on every exit path, including a dropped
    // scan future.
    let guard = match gate.begin() {
        Ok(guard) => guard,
        Err(e) => return ApiResult::error(e.to_string()),
    };
    let transport = HttpTransport::new(store);
    let result = scan::run_scan(store, &transport, request_id, config, guard.token()).await;
    ApiResult::from_result(result)
}

pub fn stop_scan(gate: &ScanGate) -> ApiResult<StopScanOutput> {
    ApiResult::ok(StopScanOutput {
        stopped: gate.stop(),
    })
}

pub fn list_json_requests(
    store: &RequestStore,
    filter: Option<&str>,
    limit: i64,
) -> ApiResult<Vec<RequestSummary>> {
    if limit < 1 {
        return ApiResult::error(RadarError::LimitTooSmall.to_string());
    }
    if limit > 5_000 {
        return ApiResult::error(RadarError::LimitTooLarge.to_string());
    }
    let records = match store.list() {
        Ok(records) => records,
        Err(e) => return ApiResult::error(RadarError::Store(e).to_string()),
    };
    let needle = filter.unwrap_or_default().trim().to_ascii_lowercase();
    let summaries: Vec<RequestSummary> = records
        .into_iter()
        .filter(|record| !record.has_marker())
        .filter(scan::is_json_candidate)
        .filter(|record| {
            needle.is_empty()
                || format!("{} {}", record.method, record.url)
                    .to_ascii_lowercase()
                    .contains(&needle)
        })
        .take(limit as usize)
        .map(|record| record.summary())
        .collect();
    ApiResult::ok(summaries)
}

fn load_record(store: &RequestStore, request_id: &str) -> Result<RequestRecord, RadarError> {
    let request_id = request_id.trim();
    if request_id.is_empty() {
        return Err(RadarError::RequestIdRequired);
    }
    store
        .get(request_id)
        .map_err(RadarError::Store)?
        .ok_or_else(|| RadarError::RequestNotFound(request_id.to_string()))
}

pub fn get_request_summary(store: &RequestStore, request_id: &str) -> ApiResult<RequestSummary> {
    ApiResult::from_result(load_record(store, request_id).map(|record| record.summary()))
}

fn preview_text(first_line: &str, headers: &[(String, String)], body: &str) -> String {
    let mut out = String::new();
    out.push_str(first_line);
    out.push('\n');
    for (name, value) in headers {
        out.push_str(name);
        out.push_str(": ");
        out.push_str(value);
        out.push('\n');
    }
    out.push('\n');
    out.extend(body.chars().take(MAX_PREVIEW_CHARS));
    out
}

pub fn get_request_preview(store: &RequestStore, request_id: &str) -> ApiResult<RequestPreview> {
    let record = match load_record(store, request_id) {
        Ok(record) => record,
        Err(e) => return ApiResult::error(e.to_string()),
    };
    let request_text = preview_text(
        &format!("{} {}", record.method, record.url),
        &record.headers,
        &record.body,
    );
    let response_text = record
        .response
        .as_ref()
        .map(|response| preview_text(&response.status.to_string(), &response.headers, &response.body));
    ApiResult::ok(RequestPreview {
        request_id: record.id,
        request_text,
        response_text,
    })
}

pub fn save_request_from_raw(
    store: &RequestStore,
    host: &str,
    port: i64,
    is_tls: bool,
    raw: &str,
) -> ApiResult<RequestSummary> {
    if raw.trim().is_empty() {
        return ApiResult::error(RadarError::RawRequestEmpty.to_string());
    }
    let spec = match wire::parse_raw(host, port, is_tls, raw) {
        Ok(spec) => spec,
        Err(e) => return ApiResult::error(e.to_string()),
    };
    match store.insert(&spec.method, &spec.url, spec.headers, spec.body, None) {
        Ok(record) => ApiResult::ok(record.summary()),
        Err(e) => ApiResult::error(RadarError::Store(e).to_string()),
    }
}

pub fn create_findings(
    store: &RequestStore,
    request_id: &str,
    findings: &[ScanFinding],
) -> ApiResult<CreateFindingsOutput> {
    let request_id = request_id.trim();
    if request_id.is_empty() {
        return ApiResult::error(RadarError::RequestIdRequired.to_string());
    }
    if findings.is_empty() {
        return ApiResult::error(RadarError::FindingsEmpty.to_string());
    }
    if findings.len() > MAX_FINDINGS_PER_CALL {
        return ApiResult::error(RadarError::TooManyFindings.to_string());
    }
    let sink = FindingsSink::open(store.state_dir());
    match sink.create(request_id, findings) {
        Ok(created) => ApiResult::ok(CreateFindingsOutput { created }),
        Err(cause) => ApiResult::error(RadarError::SinkFailed(cause).to_string()),
    }
}
