//! File-backed request store: one JSON record per stored request, an
//! insertion-ordered index, a lockfile for cross-process exclusion, and
//! atomic tmp+rename writes.

use crate::adapter::{MARKER_HEADER, RequestSpec};
use crate::api::RequestSummary;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
    time::Duration,
};

const LOCK_ATTEMPTS: usize = 120;
const LOCK_SLEEP_MS: u64 = 25;

pub const STATE_DIR_ENV: &str = "RADAR_STATE_DIR";
pub const DEFAULT_STATE_DIR: &str = ".radar/state";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub id: String,
    pub created_at_ms: i64,
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub response: Option<StoredResponse>,
}

impl RequestRecord {
    /// First value of `name`, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// True for requests the scanner itself generated.
    pub fn has_marker(&self) -> bool {
        self.header(MARKER_HEADER).is_some()
    }

    pub fn to_spec(&self) -> RequestSpec {
        RequestSpec {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }

    pub fn summary(&self) -> RequestSummary {
        RequestSummary {
            id: self.id.clone(),
            method: self.method.clone(),
            url: self.url.clone(),
            created_at: ts_rfc3339(self.created_at_ms),
            has_response: self.response.is_some(),
            status: self.response.as_ref().map(|r| r.status),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct StoreIndex {
    entries: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RequestStore {
    dir: PathBuf,
}

fn ts_rfc3339(ms: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(ms)
        .unwrap_or_else(Utc::now)
        .to_rfc3339()
}

fn next_request_id() -> String {
    static COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);
    let now = Utc::now().timestamp_millis();
    let n = COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    format!("req-{now}-{}-{n}", std::process::id())
}

fn write_json_atomic(path: &Path, value: &impl Serialize) -> Result<(), String> {
    let json =
        serde_json::to_string_pretty(value).map_err(|e| format!("serialize {:?}: {e}", path))?;
    let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
    std::fs::write(&tmp, json).map_err(|e| format!("write tmp {:?}: {e}", tmp))?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        format!("rename {:?} -> {:?}: {e}", tmp, path)
    })
}

impl RequestStore {
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Resolve the state directory from `RADAR_STATE_DIR`, defaulting to
    /// `.radar/state`.
    pub fn from_env() -> Self {
        let dir = std::env::var(STATE_DIR_ENV)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_STATE_DIR.to_string());
        Self::open(dir)
    }

    pub fn state_dir(&self) -> &Path {
        &self.dir
    }

    fn requests_dir(&self) -> PathBuf {
        self.dir.join("requests")
    }

    fn index_path(&self) -> PathBuf {
        self.requests_dir().join("index.json")
    }

    fn lock_path(&self) -> PathBuf {
        self.requests_dir().join(".lock")
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.requests_dir().join(format!("{id}.json"))
    }

    fn with_lock<T, F>(&self, f: F) -> Result<T, String>
    where
        F: FnOnce() -> Result<T, String>,
    {
        let dir = self.requests_dir();
        std::fs::create_dir_all(&dir)
            .map_err(|e| format!("failed to create request store dir {:?}: {e}", dir))?;

        let lock = self.lock_path();
        let mut last_err: Option<std::io::Error> = None;
        for _ in 0..LOCK_ATTEMPTS {
            match OpenOptions::new().write(true).create_new(true).open(&lock) {
                Ok(_handle) => {
                    let res = f();
                    let _ = std::fs::remove_file(&lock);
                    return res;
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    std::thread::sleep(Duration::from_millis(LOCK_SLEEP_MS));
                }
                Err(e) => {
                    last_err = Some(e);
                    break;
                }
            }
        }
        Err(format!(
            "failed to acquire request store lock {:?}: {}",
            lock,
            last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "timeout".to_string())
        ))
    }

    fn read_index(&self) -> StoreIndex {
        let path = self.index_path();
        if !path.is_file() {
            return StoreIndex::default();
        }
        std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    /// Persist a new record. Headers keep their insertion order.
    pub fn insert(
        &self,
        method: &str,
        url: &str,
        headers: Vec<(String, String)>,
        body: String,
        response: Option<StoredResponse>,
    ) -> Result<RequestRecord, String> {
        let record = RequestRecord {
            id: next_request_id(),
            created_at_ms: Utc::now().timestamp_millis(),
            method: method.to_string(),
            url: url.to_string(),
            headers,
            body,
            response,
        };
        self.with_lock(|| {
            write_json_atomic(&self.record_path(&record.id), &record)?;
            let mut index = self.read_index();
            index.entries.push(record.id.clone());
            write_json_atomic(&self.index_path(), &index)
        })?;
        Ok(record)
    }

    /// Persist the exchange a scan send produced (request always, response
    /// when one arrived).
    pub fn record_exchange(
        &self,
        spec: &RequestSpec,
        response: Option<StoredResponse>,
    ) -> Result<RequestRecord, String> {
        self.insert(
            &spec.method,
            &spec.url,
            spec.headers.clone(),
            spec.body.clone(),
            response,
        )
    }

    pub fn get(&self, id: &str) -> Result<Option<RequestRecord>, String> {
        let path = self.record_path(id);
        if !path.is_file() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| format!("read {:?}: {e}", path))?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| format!("parse {:?}: {e}", path))
    }

    /// All records in insertion order. Entries whose file disappeared are
    /// skipped rather than failing the listing.
    pub fn list(&self) -> Result<Vec<RequestRecord>, String> {
        let index = self.read_index();
        let mut out = Vec::with_capacity(index.entries.len());
        for id in &index.entries {
            if let Some(record) = self.get(id)? {
                out.push(record);
            }
        }
        Ok(out)
    }
}
