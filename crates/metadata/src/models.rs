//! Database rows for the link store schema.

use shortlink_core::{EnableStatus, FullShortUrl, ShortLink, ValidityMode};
use sqlx::FromRow;
use time::OffsetDateTime;

pub const LINKS_TABLE: &str = "links";
pub const ROUTES_TABLE: &str = "link_routes";

/// Every column of [`LinkRow`], in declaration order.
pub const LINK_COLUMNS: [&str; 11] = [
    "gid",
    "domain",
    "short_uri",
    "full_short_url",
    "origin_url",
    "valid_date_type",
    "valid_date",
    "enable_status",
    "del_flag",
    "create_time",
    "update_time",
];

// =============================================================================
// Links (sharded by gid)
// =============================================================================

/// Short link record. Flags are stored as integers so both engines agree.
#[derive(Debug, Clone, FromRow)]
pub struct LinkRow {
    pub gid: String,
    pub domain: String,
    pub short_uri: String,
    pub full_short_url: String,
    pub origin_url: String,
    /// 0 permanent, 1 custom.
    pub valid_date_type: i64,
    pub valid_date: Option<OffsetDateTime>,
    /// 0 enabled, 1 disabled.
    pub enable_status: i64,
    /// 0 live, 1 soft-deleted.
    pub del_flag: i64,
    pub create_time: OffsetDateTime,
    pub update_time: OffsetDateTime,
}

impl LinkRow {
    /// A fresh, enabled, live row for `link`.
    pub fn from_link(link: &ShortLink) -> Self {
        Self {
            gid: link.gid.clone(),
            domain: link.domain().to_string(),
            short_uri: link.short_uri().to_string(),
            full_short_url: link.full_short_url.as_str().to_string(),
            origin_url: link.origin_url.clone(),
            valid_date_type: link.validity.code(),
            valid_date: link.validity.until(),
            enable_status: link.status.code(),
            del_flag: i64::from(link.deleted),
            create_time: link.created_at,
            update_time: link.updated_at,
        }
    }
}

impl TryFrom<LinkRow> for ShortLink {
    type Error = shortlink_core::Error;

    fn try_from(row: LinkRow) -> Result<Self, Self::Error> {
        let full_short_url = FullShortUrl::new(&row.domain, &row.short_uri)?;
        if full_short_url.as_str() != row.full_short_url {
            return Err(shortlink_core::Error::InvalidFullShortUrl(row.full_short_url));
        }
        Ok(ShortLink {
            gid: row.gid,
            full_short_url,
            origin_url: row.origin_url,
            validity: ValidityMode::from_parts(row.valid_date_type, row.valid_date)?,
            status: EnableStatus::from_code(row.enable_status)?,
            deleted: row.del_flag != 0,
            created_at: row.create_time,
            updated_at: row.update_time,
        })
    }
}

// =============================================================================
// Routes (sharded by full_short_url)
// =============================================================================

/// Maps a full short URL to the group that owns it, so a lookup by URL can
/// find the gid-sharded link row.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct LinkRouteRow {
    pub gid: String,
    pub full_short_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn row() -> LinkRow {
        LinkRow {
            gid: "g1".to_string(),
            domain: "s.ly".to_string(),
            short_uri: "abc123".to_string(),
            full_short_url: "s.ly/abc123".to_string(),
            origin_url: "https://example.com/a".to_string(),
            valid_date_type: 1,
            valid_date: Some(datetime!(2030-01-01 00:00 UTC)),
            enable_status: 0,
            del_flag: 0,
            create_time: datetime!(2026-01-01 00:00 UTC),
            update_time: datetime!(2026-01-01 00:00 UTC),
        }
    }

    #[test]
    fn test_row_to_link() {
        let link = ShortLink::try_from(row()).unwrap();
        assert_eq!(link.full_short_url.as_str(), "s.ly/abc123");
        assert_eq!(
            link.validity,
            ValidityMode::Custom {
                until: datetime!(2030-01-01 00:00 UTC)
            }
        );
        assert_eq!(link.status, EnableStatus::Enabled);
        assert!(!link.deleted);

        let back = LinkRow::from_link(&link);
        assert_eq!(back.full_short_url, "s.ly/abc123");
        assert_eq!(back.valid_date_type, 1);
    }

    #[test]
    fn test_inconsistent_row_rejected() {
        let mut bad = row();
        bad.full_short_url = "s.ly/other".to_string();
        assert!(ShortLink::try_from(bad).is_err());

        let mut bad = row();
        bad.enable_status = 7;
        assert!(ShortLink::try_from(bad).is_err());

        let mut bad = row();
        bad.valid_date = None;
        assert!(ShortLink::try_from(bad).is_err());
    }
}
