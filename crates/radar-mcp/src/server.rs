use crate::api::*;
use crate::scan::ScanGate;
use crate::store::RequestStore;
use rmcp::{
    Json, ServerHandler,
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::*,
    tool, tool_handler, tool_router,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone)]
pub struct RadarServer {
    tool_router: ToolRouter<Self>,
    gate: Arc<ScanGate>,
    state_dir: Option<PathBuf>,
}

#[tool_router]
impl RadarServer {
    pub fn new() -> Self {
        Self {
            tool_router: Self::tool_router(),
            gate: Arc::new(ScanGate::new()),
            state_dir: None,
        }
    }

    /// Pin the state directory instead of resolving `RADAR_STATE_DIR`.
    pub fn with_state_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            gate: Arc::new(ScanGate::new()),
            state_dir: Some(dir.into()),
        }
    }

    fn store(&self) -> RequestStore {
        match &self.state_dir {
            Some(dir) => RequestStore::open(dir.clone()),
            None => RequestStore::from_env(),
        }
    }

    #[tool(
        name = "radar.run_scan",
        description = "Scan a stored JSON request for mass assignment: replays the baseline, sends bounded field/value mutations, classifies the outcomes. One scan at a time."
    )]
    async fn run_scan(&self, params: Parameters<RunScanRequest>) -> Json<ApiResult<ScanResult>> {
        Json(
            crate::app::run_scan(
                &self.gate,
                &self.store(),
                &params.0.request_id,
                &params.0.config,
            )
            .await,
        )
    }

    #[tool(
        name = "radar.stop_scan",
        description = "Cancel the active scan at the next mutation boundary; in-flight requests are never aborted."
    )]
    async fn stop_scan(&self, _params: Parameters<StopScanRequest>) -> Json<ApiResult<StopScanOutput>> {
        Json(crate::app::stop_scan(&self.gate))
    }

    #[tool(
        name = "radar.list_json_requests",
        description = "List stored JSON-bodied requests (scanner-generated traffic excluded). filter is a case-insensitive substring over 'METHOD URL'; limit is 1..=5000."
    )]
    async fn list_json_requests(
        &self,
        params: Parameters<ListJsonRequestsRequest>,
    ) -> Json<ApiResult<Vec<RequestSummary>>> {
        Json(crate::app::list_json_requests(
            &self.store(),
            params.0.filter.as_deref(),
            params.0.limit,
        ))
    }

    #[tool(
        name = "radar.get_request_summary",
        description = "Summary of one stored request: method, URL, createdAt, response status."
    )]
    async fn get_request_summary(
        &self,
        params: Parameters<RequestIdRequest>,
    ) -> Json<ApiResult<RequestSummary>> {
        Json(crate::app::get_request_summary(
            &self.store(),
            &params.0.request_id,
        ))
    }

    #[tool(
        name = "radar.get_request_preview",
        description = "Wire-style preview of a stored request and its response, bodies truncated to 200000 chars."
    )]
    async fn get_request_preview(
        &self,
        params: Parameters<RequestIdRequest>,
    ) -> Json<ApiResult<RequestPreview>> {
        Json(crate::app::get_request_preview(
            &self.store(),
            &params.0.request_id,
        ))
    }

    #[tool(
        name = "radar.save_request_from_raw",
        description = "Parse a raw HTTP/1 request (host/port/isTls + wire text) and store it as a scan target."
    )]
    async fn save_request_from_raw(
        &self,
        params: Parameters<SaveRawRequest>,
    ) -> Json<ApiResult<RequestSummary>> {
        Json(crate::app::save_request_from_raw(
            &self.store(),
            &params.0.host,
            params.0.port,
            params.0.is_tls,
            &params.0.raw,
        ))
    }

    #[tool(
        name = "radar.create_findings",
        description = "Write up to 200 scan findings to the deduplicated findings sink, attaching the evidencing stored request."
    )]
    async fn create_findings(
        &self,
        params: Parameters<CreateFindingsRequest>,
    ) -> Json<ApiResult<CreateFindingsOutput>> {
        Json(crate::app::create_findings(
            &self.store(),
            &params.0.request_id,
            &params.0.findings,
        ))
    }
}

impl Default for RadarServer {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_handler]
impl ServerHandler for RadarServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Mass Assignment Radar: mutation-based scanner for mass-assignment defects in JSON endpoints.\n\nQuickstart:\n  1) Import a target with `radar.save_request_from_raw` (or pick one via `radar.list_json_requests`).\n  2) Run `radar.run_scan` with a ScanConfig; stop early with `radar.stop_scan`.\n  3) Persist results with `radar.create_findings`.\n\nEnv defaults:\n  - RADAR_STATE_DIR=<path> (default .radar/state)\n"
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
