//! Raw HTTP/1 request parsing for imports: normalization, header folding,
//! framing-header drops, and target resolution against host/port/TLS.

use crate::adapter::RequestSpec;
use crate::errors::RadarError;
use url::Url;

/// Parse a wire-format HTTP/1 request into a sendable spec.
///
/// `\r\n` is normalized to `\n` and the message splits at the first blank
/// line. Relative targets are resolved against `scheme://host:port`.
/// `Content-Length` and `Transfer-Encoding` are dropped; the transport
/// recomputes framing.
pub fn parse_raw(host: &str, port: i64, is_tls: bool, raw: &str) -> Result<RequestSpec, RadarError> {
    let host = host.trim();
    if host.is_empty() {
        return Err(RadarError::HostRequired);
    }
    if !(1..=65535).contains(&port) {
        return Err(RadarError::PortInvalid);
    }

    let text = raw.replace("\r\n", "\n");
    let text = text.trim_start_matches('\n');
    if text.trim().is_empty() {
        return Err(RadarError::RequestEmpty);
    }

    let (head, body) = match text.split_once("\n\n") {
        Some((head, body)) => (head, body.to_string()),
        None => (text, String::new()),
    };

    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or_default().trim_end();
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        return Err(RadarError::InvalidRequestLine);
    };

    let url = resolve_target(host, port, is_tls, target);
    if Url::parse(&url).is_err() {
        return Err(RadarError::InvalidRequestLine);
    }

    let mut headers: Vec<(String, String)> = vec![];
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        // Folded continuation lines append to the previous header value.
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = headers.last_mut() {
                last.1 = format!("{} {}", last.1, line.trim());
            }
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }
    headers.retain(|(name, _)| {
        !name.eq_ignore_ascii_case("content-length") && !name.eq_ignore_ascii_case("transfer-encoding")
    });

    Ok(RequestSpec {
        method: method.to_string(),
        url,
        headers,
        body,
    })
}

fn resolve_target(host: &str, port: i64, is_tls: bool, target: &str) -> String {
    if target.starts_with("http://") || target.starts_with("https://") {
        return target.to_string();
    }
    let scheme = if is_tls { "https" } else { "http" };
    if target.starts_with('/') {
        format!("{scheme}://{host}:{port}{target}")
    } else {
        format!("{scheme}://{host}:{port}/{target}")
    }
}
