//! API server `Warning` response headers (`299 <agent> "<text>"`).

use http::HeaderMap;
use tracing::warn;

/// A parsed warning header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiWarning {
    pub code: u16,
    pub agent: String,
    pub message: String,
}

/// Parse one `Warning` header value.
pub fn parse_warning(value: &str) -> Option<ApiWarning> {
    let (code, rest) = value.trim().split_once(' ')?;
    let code: u16 = code.parse().ok()?;
    let (agent, text) = rest.trim_start().split_once(' ')?;
    let text = text.trim();

    Some(ApiWarning {
        code,
        agent: agent.to_string(),
        message: unquote(text).unwrap_or_else(|| text.to_string()),
    })
}

/// Contents of a leading quoted string, with `\` escapes resolved.
/// Anything after the closing quote (the optional date) is ignored.
fn unquote(text: &str) -> Option<String> {
    let inner = text.strip_prefix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut escaped = false;
    for c in inner.chars() {
        match (escaped, c) {
            (true, c) => {
                out.push(c);
                escaped = false;
            }
            (false, '\\') => escaped = true,
            (false, '"') => return Some(out),
            (false, c) => out.push(c),
        }
    }
    None
}

/// Log every miscellaneous (299) warning in `headers`.
pub fn log_warnings(headers: &HeaderMap) {
    for value in headers.get_all(http::header::WARNING) {
        let Some(warning) = value.to_str().ok().and_then(parse_warning) else {
            continue;
        };
        if warning.code != 299 || warning.message.is_empty() {
            continue;
        }

        if warning.message.contains("is deprecated") {
            warn!(agent = %warning.agent, message = %warning.message, "kubernetes deprecation alert");
        } else {
            warn!(agent = %warning.agent, "{}", warning.message);
        }
    }
}
