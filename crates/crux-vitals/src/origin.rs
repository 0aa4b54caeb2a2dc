//! Origin variant resolution
//!
//! Field data is keyed by exact origin, so `https://example.com` and
//! `https://www.example.com` are different records. Given one configured
//! base host we try both, given-first.

use reqwest::Url;

use crate::error::IngestError;

const WWW_PREFIX: &str = "www.";

/// The two origins to try for one configured base host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginCandidates {
    given: String,
    toggled: String,
}

impl OriginCandidates {
    /// The base host as configured
    pub fn given(&self) -> &str {
        &self.given
    }

    /// The base host with its `www.` prefix added or stripped
    pub fn toggled(&self) -> &str {
        &self.toggled
    }

    /// Candidates in lookup order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        [self.given.as_str(), self.toggled.as_str()].into_iter()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.iter().map(str::to_string).collect()
    }
}

/// Derive the lookup candidates for a configured base host
///
/// Inputs without a scheme are treated as `https://`. Only the origin is
/// kept: path, query and trailing slash are dropped, a non-default port is
/// preserved.
///
/// # Example
///
/// ```
/// use crux_vitals::origin::candidates;
///
/// let c = candidates("gant.com").unwrap();
/// assert_eq!(c.to_vec(), vec!["https://gant.com", "https://www.gant.com"]);
/// ```
pub fn candidates(base: &str) -> Result<OriginCandidates, IngestError> {
    let invalid = |reason: String| IngestError::InvalidOrigin {
        input: base.to_string(),
        reason,
    };

    let trimmed = base.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty origin".to_string()));
    }

    let with_scheme = if has_http_scheme(trimmed) {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let url = Url::parse(&with_scheme).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    let host = url
        .host_str()
        .ok_or_else(|| invalid("missing host".to_string()))?;

    let toggled_host = match host.strip_prefix(WWW_PREFIX) {
        Some(bare) if !bare.is_empty() => bare.to_string(),
        Some(_) => return Err(invalid("host is only 'www.'".to_string())),
        None => format!("{}{}", WWW_PREFIX, host),
    };

    let mut toggled = url.clone();
    toggled
        .set_host(Some(&toggled_host))
        .map_err(|e| invalid(e.to_string()))?;

    Ok(OriginCandidates {
        given: url.origin().ascii_serialization(),
        toggled: toggled.origin().ascii_serialization(),
    })
}

fn has_http_scheme(input: &str) -> bool {
    let lower = input.get(..8).unwrap_or(input).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
