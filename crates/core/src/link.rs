//! Short link domain model: full short URLs, validity and redirect eligibility.

use crate::short_uri::validate_short_uri;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Maximum domain length accepted in a full short URL.
const MAX_DOMAIN_LEN: usize = 253;

/// A full short URL: `<domain>/<short identifier>`, e.g. `s.ly/abc123`.
///
/// This is the key every cache entry, lock and routing row is namespaced by.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FullShortUrl {
    value: String,
    split: usize,
}

impl FullShortUrl {
    /// Build from a domain and a short identifier, validating both.
    /// Host names are case-insensitive, so the domain is stored lowercased.
    pub fn new(domain: &str, short_uri: &str) -> crate::Result<Self> {
        validate_domain(domain)?;
        validate_short_uri(short_uri)?;
        let domain = domain.to_ascii_lowercase();
        Ok(Self {
            value: format!("{domain}/{short_uri}"),
            split: domain.len(),
        })
    }

    /// Parse a `<domain>/<short identifier>` string.
    pub fn parse(value: &str) -> crate::Result<Self> {
        let (domain, short_uri) = value
            .split_once('/')
            .ok_or_else(|| crate::Error::InvalidFullShortUrl(format!("missing '/': {value}")))?;
        Self::new(domain, short_uri)
    }

    /// The domain portion.
    pub fn domain(&self) -> &str {
        &self.value[..self.split]
    }

    /// The short identifier portion.
    pub fn short_uri(&self) -> &str {
        &self.value[self.split + 1..]
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for FullShortUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FullShortUrl({self})")
    }
}

impl fmt::Display for FullShortUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

fn validate_domain(domain: &str) -> crate::Result<()> {
    if domain.is_empty() || domain.len() > MAX_DOMAIN_LEN {
        return Err(crate::Error::InvalidDomain(format!(
            "domain length must be 1..={MAX_DOMAIN_LEN}, got {}",
            domain.len()
        )));
    }
    for c in domain.chars() {
        if !matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '.' | ':') {
            return Err(crate::Error::InvalidDomain(format!(
                "invalid character in domain: {c:?}"
            )));
        }
    }
    Ok(())
}

/// Validate an origin URL before it is stored.
pub fn validate_origin_url(url: &str) -> crate::Result<()> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| crate::Error::InvalidOriginUrl(format!("unsupported scheme: {url}")))?;
    if rest.is_empty() || rest.chars().any(char::is_whitespace) {
        return Err(crate::Error::InvalidOriginUrl(url.to_string()));
    }
    Ok(())
}

/// How long a link stays redirectable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidityMode {
    /// Never expires.
    Permanent,
    /// Redirectable until `until` (exclusive).
    Custom {
        #[serde(with = "time::serde::rfc3339")]
        until: OffsetDateTime,
    },
}

impl ValidityMode {
    const PERMANENT_CODE: i64 = 0;
    const CUSTOM_CODE: i64 = 1;

    /// Rebuild from the stored `(valid_date_type, valid_date)` column pair.
    pub fn from_parts(code: i64, until: Option<OffsetDateTime>) -> crate::Result<Self> {
        match (code, until) {
            (Self::PERMANENT_CODE, _) => Ok(Self::Permanent),
            (Self::CUSTOM_CODE, Some(until)) => Ok(Self::Custom { until }),
            (Self::CUSTOM_CODE, None) => Err(crate::Error::InvalidValidity(
                "custom validity requires an end timestamp".to_string(),
            )),
            (other, _) => Err(crate::Error::InvalidValidity(format!(
                "unknown validity type code {other}"
            ))),
        }
    }

    /// Stored `valid_date_type` code.
    pub fn code(&self) -> i64 {
        match self {
            Self::Permanent => Self::PERMANENT_CODE,
            Self::Custom { .. } => Self::CUSTOM_CODE,
        }
    }

    /// Stored `valid_date` value.
    pub fn until(&self) -> Option<OffsetDateTime> {
        match self {
            Self::Permanent => None,
            Self::Custom { until } => Some(*until),
        }
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        matches!(self, Self::Custom { until } if *until <= now)
    }

    /// Time left before expiry; `None` for permanent links.
    pub fn remaining(&self, now: OffsetDateTime) -> Option<time::Duration> {
        self.until().map(|until| until - now)
    }
}

/// Whether a link is enabled or sitting in the recycle bin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnableStatus {
    #[default]
    Enabled,
    Disabled,
}

impl EnableStatus {
    /// Stored `enable_status` code.
    pub fn code(self) -> i64 {
        match self {
            Self::Enabled => 0,
            Self::Disabled => 1,
        }
    }

    pub fn from_code(code: i64) -> crate::Result<Self> {
        match code {
            0 => Ok(Self::Enabled),
            1 => Ok(Self::Disabled),
            other => Err(crate::Error::InvalidStatus(other)),
        }
    }
}

/// Outcome of classifying a stored link for redirection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Disabled,
    Expired,
    Deleted,
}

impl Eligibility {
    pub fn is_eligible(self) -> bool {
        self == Self::Eligible
    }
}

/// A short link record as seen by the resolution pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShortLink {
    pub gid: String,
    pub full_short_url: FullShortUrl,
    pub origin_url: String,
    pub validity: ValidityMode,
    pub status: EnableStatus,
    pub deleted: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl ShortLink {
    pub fn domain(&self) -> &str {
        self.full_short_url.domain()
    }

    pub fn short_uri(&self) -> &str {
        self.full_short_url.short_uri()
    }

    /// Classify the record at `now`. Soft deletion wins over disablement,
    /// which wins over expiry.
    pub fn eligibility(&self, now: OffsetDateTime) -> Eligibility {
        if self.deleted {
            Eligibility::Deleted
        } else if self.status == EnableStatus::Disabled {
            Eligibility::Disabled
        } else if self.validity.is_expired(now) {
            Eligibility::Expired
        } else {
            Eligibility::Eligible
        }
    }

    /// TTL for a positive cache entry: `cap`, shortened so the entry never
    /// outlives the record's own validity window. `None` once expired.
    pub fn cache_ttl(&self, now: OffsetDateTime, cap: std::time::Duration) -> Option<std::time::Duration> {
        match self.validity.remaining(now) {
            None => Some(cap),
            Some(remaining) if remaining.is_positive() => {
                let remaining = std::time::Duration::try_from(remaining).ok()?;
                Some(remaining.min(cap))
            }
            Some(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn link(validity: ValidityMode) -> ShortLink {
        ShortLink {
            gid: "g1".to_string(),
            full_short_url: FullShortUrl::new("s.ly", "abc123").unwrap(),
            origin_url: "https://example.com".to_string(),
            validity,
            status: EnableStatus::Enabled,
            deleted: false,
            created_at: datetime!(2026-01-01 00:00 UTC),
            updated_at: datetime!(2026-01-01 00:00 UTC),
        }
    }

    #[test]
    fn test_full_short_url_parts() {
        let url = FullShortUrl::new("s.ly", "abc123").unwrap();
        assert_eq!(url.as_str(), "s.ly/abc123");
        assert_eq!(url.domain(), "s.ly");
        assert_eq!(url.short_uri(), "abc123");
        assert_eq!(FullShortUrl::parse("s.ly/abc123").unwrap(), url);
    }

    #[test]
    fn test_full_short_url_lowercases_domain() {
        let url = FullShortUrl::new("S.Ly", "AbC123").unwrap();
        assert_eq!(url.as_str(), "s.ly/AbC123");
        assert_eq!(url.domain(), "s.ly");
        assert_eq!(url.short_uri(), "AbC123");
        assert_eq!(FullShortUrl::parse("S.LY/AbC123").unwrap(), url);
    }

    #[test]
    fn test_full_short_url_with_port() {
        let url = FullShortUrl::parse("localhost:8080/zzz999").unwrap();
        assert_eq!(url.domain(), "localhost:8080");
        assert_eq!(url.short_uri(), "zzz999");
    }

    #[test]
    fn test_full_short_url_rejects_bad_input() {
        assert!(FullShortUrl::parse("no-slash").is_err());
        assert!(FullShortUrl::new("", "abc").is_err());
        assert!(FullShortUrl::new("s.ly", "").is_err());
        assert!(FullShortUrl::new("s ly", "abc").is_err());
        assert!(FullShortUrl::new("s.ly", "a/b").is_err());
    }

    #[test]
    fn test_origin_url_validation() {
        assert!(validate_origin_url("https://example.com").is_ok());
        assert!(validate_origin_url("http://example.com/a?b=c").is_ok());
        assert!(validate_origin_url("ftp://example.com").is_err());
        assert!(validate_origin_url("https://").is_err());
        assert!(validate_origin_url("https://exa mple.com").is_err());
    }

    #[test]
    fn test_validity_codes_roundtrip() {
        let until = datetime!(2026-06-01 00:00 UTC);
        let custom = ValidityMode::Custom { until };
        assert_eq!(
            ValidityMode::from_parts(custom.code(), custom.until()).unwrap(),
            custom
        );
        assert_eq!(
            ValidityMode::from_parts(0, None).unwrap(),
            ValidityMode::Permanent
        );
        assert!(ValidityMode::from_parts(1, None).is_err());
        assert!(ValidityMode::from_parts(7, None).is_err());
    }

    #[test]
    fn test_eligibility_precedence() {
        let now = datetime!(2026-03-01 00:00 UTC);
        let expired = ValidityMode::Custom {
            until: datetime!(2026-02-01 00:00 UTC),
        };

        assert_eq!(link(ValidityMode::Permanent).eligibility(now), Eligibility::Eligible);
        assert_eq!(link(expired).eligibility(now), Eligibility::Expired);

        let mut disabled = link(expired);
        disabled.status = EnableStatus::Disabled;
        assert_eq!(disabled.eligibility(now), Eligibility::Disabled);

        disabled.deleted = true;
        assert_eq!(disabled.eligibility(now), Eligibility::Deleted);
    }

    #[test]
    fn test_cache_ttl_capped_by_validity() {
        let now = datetime!(2026-03-01 00:00 UTC);
        let cap = std::time::Duration::from_secs(86_400);

        assert_eq!(link(ValidityMode::Permanent).cache_ttl(now, cap), Some(cap));

        let soon = link(ValidityMode::Custom {
            until: now + time::Duration::minutes(10),
        });
        assert_eq!(
            soon.cache_ttl(now, cap),
            Some(std::time::Duration::from_secs(600))
        );

        let later = link(ValidityMode::Custom {
            until: now + time::Duration::days(30),
        });
        assert_eq!(later.cache_ttl(now, cap), Some(cap));

        let gone = link(ValidityMode::Custom { until: now });
        assert_eq!(gone.cache_ttl(now, cap), None);
    }

    #[test]
    fn test_enable_status_codes() {
        assert_eq!(EnableStatus::from_code(0).unwrap(), EnableStatus::Enabled);
        assert_eq!(EnableStatus::from_code(1).unwrap(), EnableStatus::Disabled);
        assert!(EnableStatus::from_code(2).is_err());
    }
}
