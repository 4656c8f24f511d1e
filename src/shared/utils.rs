use chrono::{DateTime, Duration, Utc};
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;
use serde::Deserialize;

use crate::shared::error::{ApiError, ApiResult};

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

pub fn create_conn(
    database_url: &str,
    max_connections: u32,
) -> Result<DbPool, diesel::r2d2::PoolError> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder().max_size(max_connections).build(manager)
}

pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 500;

/// Query parameters shared by every list endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct CommonParams {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub skip: i64,
    pub limit: i64,
}

impl CommonParams {
    /// Clamp pagination to a sane window: skip >= 0, 1 <= limit <= MAX_LIMIT.
    pub fn page(&self) -> Page {
        Page {
            skip: self.skip.unwrap_or(0).max(0),
            limit: self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        }
    }

    pub fn sort(&self) -> Option<(&str, SortDir)> {
        let field = self.sort_by.as_deref()?;
        let dir = match self.sort_order.as_deref() {
            Some("desc") => SortDir::Desc,
            _ => SortDir::Asc,
        };
        Some((field, dir))
    }

    pub fn search_term(&self) -> Option<&str> {
        match self.search.as_deref() {
            Some(s) if !s.trim().is_empty() => Some(s),
            _ => None,
        }
    }
}

/// Resolve an optional date range, defaulting to the trailing 30 days.
pub fn resolve_date_range(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> ApiResult<(DateTime<Utc>, DateTime<Utc>)> {
    let end = end.unwrap_or_else(Utc::now);
    let start = start.unwrap_or(end - Duration::days(30));
    if start >= end {
        return Err(ApiError::bad_request("Start date must be before end date"));
    }
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_clamps_out_of_range_values() {
        let params = CommonParams {
            skip: Some(-5),
            limit: Some(10_000),
            ..Default::default()
        };
        let page = params.page();
        assert_eq!(page.skip, 0);
        assert_eq!(page.limit, MAX_LIMIT);
    }

    #[test]
    fn page_defaults() {
        let page = CommonParams::default().page();
        assert_eq!(page.skip, 0);
        assert_eq!(page.limit, DEFAULT_LIMIT);
    }

    #[test]
    fn blank_search_is_ignored() {
        let params = CommonParams {
            search: Some("   ".into()),
            ..Default::default()
        };
        assert!(params.search_term().is_none());
    }

    #[test]
    fn sort_order_defaults_to_ascending() {
        let params = CommonParams {
            sort_by: Some("created_at".into()),
            sort_order: Some("sideways".into()),
            ..Default::default()
        };
        assert_eq!(params.sort(), Some(("created_at", SortDir::Asc)));
    }

    #[test]
    fn inverted_date_range_is_rejected() {
        let end = Utc::now();
        let start = end + Duration::hours(1);
        assert!(resolve_date_range(Some(start), Some(end)).is_err());
    }

    #[test]
    fn date_range_defaults_to_trailing_month() {
        let (start, end) = resolve_date_range(None, None).unwrap();
        assert_eq!((end - start).num_days(), 30);
    }
}
