//! Per-mutation classification: status diff, follow-up state diff, body
//! reflection, and the persistence probe.

use crate::adapter::{ScanPhase, Transport};
use crate::api::{FindingKind, ScanFinding};
use crate::body::{contains_key_deep, get_all_primitives, get_primitive_deep, safe_stringify};
use crate::mutation::Mutation;
use crate::scan::ScanContext;
use serde_json::Value;
use std::time::Duration;

const MAX_SNIPPET_CHARS: usize = 4_000;

/// Leaf names whose changes are expected churn, not state evidence.
const NOISY_LEAVES: [&str; 9] = [
    "id",
    "createdAt",
    "updatedAt",
    "timestamp",
    "time",
    "iat",
    "exp",
    "nonce",
    "imageUrl",
];

pub(crate) fn truncate_snippet(text: &str) -> Option<String> {
    if text.is_empty() {
        return None;
    }
    Some(text.chars().take(MAX_SNIPPET_CHARS).collect())
}

fn is_noisy_path(path: &str) -> bool {
    NOISY_LEAVES
        .iter()
        .any(|leaf| path == *leaf || path.ends_with(&format!(".{leaf}")))
}

fn base_finding(ctx: &ScanContext, mutation: &Mutation, kind: FindingKind, message: String) -> ScanFinding {
    let value = safe_stringify(&mutation.value);
    ScanFinding {
        id: format!(
            "{}:{}:{}:{}",
            ctx.baseline_id,
            kind.as_str(),
            mutation.field,
            value
        ),
        request_id: ctx.baseline_id.clone(),
        kind,
        field: mutation.field.clone(),
        value,
        message,
        baseline_status: ctx.baseline_status,
        mutated_status: None,
        persisted_status: None,
        mutated_request_id: None,
        persisted_request_id: None,
        verify_baseline_request_id: None,
        verify_request_id: None,
        baseline_body_snippet: ctx.baseline_snippet.clone(),
        body_snippet: None,
    }
}

fn reflection_message(ctx: &ScanContext, mutation: &Mutation) -> &'static str {
    if !contains_key_deep(&ctx.baseline_value, &mutation.field) {
        return "response contains injected key";
    }
    match get_primitive_deep(&ctx.baseline_value, &mutation.field) {
        Some(existing) if safe_stringify(existing) == safe_stringify(&mutation.value) => {
            "response echoed injected value"
        }
        _ => "response contains overridden value",
    }
}

/// Run every classification step of one mutation, appending findings in
/// emission order.
pub(crate) async fn classify_mutation<T: Transport>(
    transport: &T,
    ctx: &ScanContext,
    mutation: &Mutation,
    findings: &mut Vec<ScanFinding>,
) {
    let mut spec = ctx.baseline_spec.clone();
    spec.body = mutation.body_text.clone();
    spec.set_marker(ScanPhase::Mutated);

    let (mutated_request_id, response) = match transport.send(&spec).await {
        Ok(sent) => (Some(sent.request_id), sent.response),
        Err(_) => (None, None),
    };
    let Some(response) = response else {
        let mut finding = base_finding(
            ctx,
            mutation,
            FindingKind::NoResponse,
            "failed to send request".to_string(),
        );
        finding.mutated_request_id = mutated_request_id;
        findings.push(finding);
        return;
    };

    if let Some(baseline_code) = ctx.baseline_status
        && response.status != baseline_code
    {
        let mut finding = base_finding(
            ctx,
            mutation,
            FindingKind::CodeChanged,
            format!("status code changed {baseline_code} -> {}", response.status),
        );
        finding.mutated_status = Some(response.status);
        finding.mutated_request_id = mutated_request_id.clone();
        findings.push(finding);
    }

    if let Some(verify) = &ctx.verify
        && verify.baseline_json.is_some()
    {
        follow_up_diff(transport, ctx, mutation, mutated_request_id.as_deref(), findings).await;
    }

    if response.body.is_empty() {
        return;
    }
    let parsed: Value = match serde_json::from_str(&response.body) {
        Ok(v) => v,
        Err(_) => {
            let mut finding = base_finding(
                ctx,
                mutation,
                FindingKind::NonJsonResponse,
                "response is not JSON".to_string(),
            );
            finding.mutated_status = Some(response.status);
            finding.mutated_request_id = mutated_request_id;
            findings.push(finding);
            return;
        }
    };

    let reflected = get_primitive_deep(&parsed, &mutation.field)
        .is_some_and(|v| safe_stringify(v) == safe_stringify(&mutation.value));
    if !reflected {
        return;
    }

    let mut finding = base_finding(
        ctx,
        mutation,
        FindingKind::Reflected,
        reflection_message(ctx, mutation).to_string(),
    );
    finding.mutated_status = Some(response.status);
    finding.mutated_request_id = mutated_request_id.clone();
    finding.body_snippet = truncate_snippet(&response.body);
    findings.push(finding);

    if ctx.confirm_persistence {
        persistence_probe(transport, ctx, mutation, findings).await;
    }
}

/// Re-fetch the verification URL and diff flattened primitives against the
/// verify-baseline snapshot. Any failure silently skips the diff.
async fn follow_up_diff<T: Transport>(
    transport: &T,
    ctx: &ScanContext,
    mutation: &Mutation,
    mutated_request_id: Option<&str>,
    findings: &mut Vec<ScanFinding>,
) {
    let Some(verify) = &ctx.verify else {
        return;
    };
    let Some(baseline_json) = &verify.baseline_json else {
        return;
    };

    if verify.delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(verify.delay_ms)).await;
    }

    let mut spec = verify.spec.clone();
    spec.set_marker(ScanPhase::VerifyMutated);
    let Ok(sent) = transport.send(&spec).await else {
        return;
    };
    let Some(response) = sent.response else {
        return;
    };
    let Ok(current) = serde_json::from_str::<Value>(&response.body) else {
        return;
    };
    if !current.is_object() {
        return;
    }

    let before = get_all_primitives(baseline_json, "");
    let after = get_all_primitives(&current, "");
    let changes: Vec<String> = after
        .iter()
        .filter_map(|(path, new_value)| {
            let old = before.get(path)?;
            (old != new_value && !is_noisy_path(path))
                .then(|| format!("{path}: {old} -> {new_value}"))
        })
        .collect();
    if changes.is_empty() {
        return;
    }

    let mut finding = base_finding(
        ctx,
        mutation,
        FindingKind::StateChanged,
        format!("state changed via follow-up ({})", changes.join(", ")),
    );
    finding.mutated_request_id = mutated_request_id.map(str::to_string);
    finding.verify_baseline_request_id = Some(verify.baseline_request_id.clone());
    finding.verify_request_id = Some(sent.request_id);
    finding.body_snippet = truncate_snippet(&response.body);
    findings.push(finding);
}

/// Replay the original baseline body and look for the injected value in the
/// response. Any failure silently ends the probe for this mutation.
async fn persistence_probe<T: Transport>(
    transport: &T,
    ctx: &ScanContext,
    mutation: &Mutation,
    findings: &mut Vec<ScanFinding>,
) {
    if ctx.persistence_delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(ctx.persistence_delay_ms)).await;
    }

    let mut spec = ctx.baseline_spec.clone();
    spec.set_marker(ScanPhase::Persisted);
    let Ok(sent) = transport.send(&spec).await else {
        return;
    };
    let Some(response) = sent.response else {
        return;
    };
    let Ok(parsed) = serde_json::from_str::<Value>(&response.body) else {
        return;
    };
    let persisted = get_primitive_deep(&parsed, &mutation.field)
        .is_some_and(|v| safe_stringify(v) == safe_stringify(&mutation.value));
    if !persisted {
        return;
    }

    let mut finding = base_finding(
        ctx,
        mutation,
        FindingKind::Persisted,
        "injected value present after baseline replay".to_string(),
    );
    finding.persisted_status = Some(response.status);
    finding.persisted_request_id = Some(sent.request_id);
    finding.body_snippet = truncate_snippet(&response.body);
    findings.push(finding);
}
