//! Findings sink: a deduplicated issue file keyed by
//! `"<requestId>:<kind>:<field>"`, overwrite-on-collision.

use crate::api::{FindingKind, ScanFinding};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const REPORTER: &str = "Mass Assignment Radar";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkIssue {
    pub dedupe_key: String,
    pub title: String,
    pub reporter: String,
    pub created_at: String,
    /// The stored request attached as evidence.
    pub attached_request_id: String,
    pub finding: ScanFinding,
}

#[derive(Debug, Clone)]
pub struct FindingsSink {
    dir: PathBuf,
}

/// Evidence selection: StateChanged attaches the verify request when known,
/// Persisted the persisted request, otherwise the mutated request, falling
/// back to the baseline.
fn attached_request_id(baseline_id: &str, finding: &ScanFinding) -> String {
    match finding.kind {
        FindingKind::StateChanged if finding.verify_request_id.is_some() => {
            finding.verify_request_id.clone().unwrap_or_default()
        }
        FindingKind::Persisted if finding.persisted_request_id.is_some() => {
            finding.persisted_request_id.clone().unwrap_or_default()
        }
        _ => finding
            .mutated_request_id
            .clone()
            .unwrap_or_else(|| baseline_id.to_string()),
    }
}

impl FindingsSink {
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn issues_path(&self) -> PathBuf {
        self.dir.join("findings.json")
    }

    fn read_issues(&self, path: &Path) -> Result<BTreeMap<String, SinkIssue>, String> {
        if !path.is_file() {
            return Ok(BTreeMap::new());
        }
        let raw = std::fs::read_to_string(path).map_err(|e| format!("read {:?}: {e}", path))?;
        serde_json::from_str(&raw).map_err(|e| format!("parse {:?}: {e}", path))
    }

    /// Write each finding under its dedupe key; collisions overwrite.
    /// Returns the number of findings written.
    pub fn create(&self, baseline_id: &str, findings: &[ScanFinding]) -> Result<usize, String> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| format!("failed to create findings dir {:?}: {e}", self.dir))?;
        let path = self.issues_path();
        let mut issues = self.read_issues(&path)?;
        let created_at = Utc::now().to_rfc3339();
        for finding in findings {
            let dedupe_key = format!(
                "{}:{}:{}",
                baseline_id,
                finding.kind.as_str(),
                finding.field
            );
            issues.insert(
                dedupe_key.clone(),
                SinkIssue {
                    dedupe_key,
                    title: format!(
                        "Mass Assignment Radar: {} {}",
                        finding.kind.as_str(),
                        finding.field
                    ),
                    reporter: REPORTER.to_string(),
                    created_at: created_at.clone(),
                    attached_request_id: attached_request_id(baseline_id, finding),
                    finding: finding.clone(),
                },
            );
        }
        let json = serde_json::to_string_pretty(&issues)
            .map_err(|e| format!("serialize {:?}: {e}", path))?;
        let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
        std::fs::write(&tmp, json).map_err(|e| format!("write tmp {:?}: {e}", tmp))?;
        std::fs::rename(&tmp, &path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            format!("rename {:?} -> {:?}: {e}", tmp, path)
        })?;
        Ok(findings.len())
    }
}
