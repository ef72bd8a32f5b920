//! Page/limit/sort contract shared by every list endpoint.
//!
//! Pages are 1-indexed. Sorting defaults to most recent first unless the
//! caller picks one of the whitelisted fields.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;
/// Highest page whose offset still fits in an `i64` at `MAX_LIMIT`.
pub const MAX_PAGE: i64 = i64::MAX / MAX_LIMIT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Raw pagination parameters as they arrive on the query string.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    /// Column name, always one of the whitelisted entries.
    pub sort_column: &'static str,
    pub sort_order: SortOrder,
}

impl Pagination {
    /// `sortable` maps public field names to column names; the first entry is the default.
    pub fn resolve(params: &PageParams, sortable: &[(&str, &'static str)]) -> Self {
        let page = params
            .page
            .filter(|page| *page >= 1)
            .map(|page| page.min(MAX_PAGE))
            .unwrap_or(DEFAULT_PAGE);
        let limit = params
            .limit
            .filter(|limit| *limit >= 1)
            .map(|limit| limit.min(MAX_LIMIT))
            .unwrap_or(DEFAULT_LIMIT);

        let default_column = sortable.first().map(|(_, column)| *column).unwrap_or("createdAt");
        let sort_column = params
            .sort_by
            .as_deref()
            .and_then(|field| {
                sortable
                    .iter()
                    .find(|(name, _)| *name == field)
                    .map(|(_, column)| *column)
            })
            .unwrap_or(default_column);

        Self {
            page,
            limit,
            sort_column,
            sort_order: params.sort_order.unwrap_or_default(),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn meta(&self, count: i64) -> PageMeta {
        PageMeta {
            page: self.page,
            limit: self.limit,
            count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub page: i64,
    pub limit: i64,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SORTABLE: &[(&str, &str)] = &[("createdAt", "createdAt"), ("title", "title")];

    #[test]
    fn test_defaults() {
        let pagination = Pagination::resolve(&PageParams::default(), SORTABLE);
        assert_eq!(pagination.page, 1);
        assert_eq!(pagination.limit, DEFAULT_LIMIT);
        assert_eq!(pagination.sort_column, "createdAt");
        assert_eq!(pagination.sort_order, SortOrder::Desc);
        assert_eq!(pagination.offset(), 0);
    }

    #[test]
    fn test_out_of_range_values_fall_back() {
        let params = PageParams {
            page: Some(0),
            limit: Some(10_000),
            sort_by: Some("password".to_string()),
            sort_order: Some(SortOrder::Asc),
        };
        let pagination = Pagination::resolve(&params, SORTABLE);
        assert_eq!(pagination.page, 1);
        assert_eq!(pagination.limit, MAX_LIMIT);
        assert_eq!(pagination.sort_column, "createdAt");
        assert_eq!(pagination.sort_order, SortOrder::Asc);
    }

    #[test]
    fn test_offset_uses_one_indexed_pages() {
        let params = PageParams {
            page: Some(3),
            limit: Some(20),
            sort_by: Some("title".to_string()),
            sort_order: None,
        };
        let pagination = Pagination::resolve(&params, SORTABLE);
        assert_eq!(pagination.offset(), 40);
        assert_eq!(pagination.sort_column, "title");
        assert_eq!(pagination.meta(7).count, 7);
    }

    #[test]
    fn test_huge_page_is_capped() {
        let params = PageParams {
            page: Some(i64::MAX),
            limit: Some(MAX_LIMIT),
            ..PageParams::default()
        };
        let pagination = Pagination::resolve(&params, SORTABLE);
        assert_eq!(pagination.page, MAX_PAGE);
        assert!(pagination.offset() > 0);
        assert_eq!(pagination.offset(), (MAX_PAGE - 1) * MAX_LIMIT);
    }
}
