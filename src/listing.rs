//! Filtered, sorted, paginated question listings with read-through caching.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::cache::QueryCache;
use crate::db::queries::questions::{
    self, CategoryStat, DateStat, QuestionFilter, SortKey, SortOrder,
};
use crate::db::Question;
use crate::server::deserializers::deserialize_optional_i64;
use crate::telemetry::LISTING_CACHE_CNTR;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 10;

#[derive(Debug, Error)]
pub enum ListingError {
    #[error("{0}")]
    InvalidParams(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("cannot encode listing: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Raw listing parameters as they arrive in the query string.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub search: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_i64")]
    pub page: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_optional_i64")]
    pub limit: Option<i64>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_i64")]
    pub category_id: Option<i64>,
}

/// Validated listing request with defaults filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub search: Option<String>,
    pub page: i64,
    pub limit: i64,
    pub sort_by: SortKey,
    pub order: SortOrder,
    pub category_id: Option<i64>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            search: None,
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            sort_by: SortKey::default(),
            order: SortOrder::default(),
            category_id: None,
        }
    }
}

impl TryFrom<ListParams> for ListQuery {
    type Error = ListingError;

    fn try_from(params: ListParams) -> Result<Self, Self::Error> {
        let page = params.page.unwrap_or(DEFAULT_PAGE);
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
        if page < 1 {
            return Err(ListingError::InvalidParams(
                "page must be a positive integer".to_owned(),
            ));
        }
        if limit < 1 {
            return Err(ListingError::InvalidParams(
                "limit must be a positive integer".to_owned(),
            ));
        }
        let sort_by = match params.sort_by.as_deref().map(str::trim) {
            None | Some("") => SortKey::default(),
            Some(value) => value.parse().map_err(ListingError::InvalidParams)?,
        };
        let order = match params.order.as_deref().map(str::trim) {
            None | Some("") => SortOrder::default(),
            Some(value) => value.parse().map_err(ListingError::InvalidParams)?,
        };
        let search = params
            .search
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty());

        Ok(ListQuery {
            search,
            page,
            limit,
            sort_by,
            order,
            category_id: params.category_id,
        })
    }
}

impl ListQuery {
    /// Key under which the serialized page is memoized.
    ///
    /// A present search term is tagged so that searching for the word "all"
    /// cannot collide with an unfiltered listing.
    pub fn cache_key(&self) -> String {
        let search = match &self.search {
            Some(term) => format!("s:{term}"),
            None => "all".to_owned(),
        };
        let category = match self.category_id {
            Some(id) => id.to_string(),
            None => "all".to_owned(),
        };
        format!(
            "questions_{search}_{}_{}_{}_{}_{category}",
            self.page, self.limit, self.sort_by, self.order
        )
    }

    fn offset(&self) -> Result<i64, ListingError> {
        (self.page - 1)
            .checked_mul(self.limit)
            .ok_or_else(|| ListingError::InvalidParams("page is out of range".to_owned()))
    }

    fn filter(&self) -> QuestionFilter {
        QuestionFilter {
            search: self.search.clone(),
            category_id: self.category_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionPage {
    pub questions: Vec<Question>,
    pub total_pages: i64,
    pub current_page: i64,
    pub total_questions: i64,
    pub category_stats: Vec<CategoryStat>,
    pub date_stats: Vec<DateStat>,
    pub filtered_questions_count: usize,
}

pub fn total_pages(total: i64, limit: i64) -> i64 {
    if total <= 0 {
        0
    } else {
        (total - 1) / limit + 1
    }
}

/// Runs the listing against storage, bypassing the cache.
pub async fn load_page(pool: &SqlitePool, query: &ListQuery) -> Result<QuestionPage, ListingError> {
    let offset = query.offset()?;
    let filter = query.filter();

    let total = questions::count_questions(pool, &filter).await?;
    let rows = questions::find_questions(
        pool,
        &filter,
        query.sort_by,
        query.order,
        query.limit,
        offset,
    )
    .await?;
    let category_stats = questions::category_stats(pool).await?;
    let date_stats = questions::date_stats(pool).await?;

    Ok(QuestionPage {
        filtered_questions_count: rows.len(),
        questions: rows,
        total_pages: total_pages(total, query.limit),
        current_page: query.page,
        total_questions: total,
        category_stats,
        date_stats,
    })
}

/// Serialized listing for `query`, served from `cache` when possible.
pub async fn cached_page(
    pool: &SqlitePool,
    cache: &QueryCache,
    query: &ListQuery,
) -> Result<Arc<str>, ListingError> {
    let key = query.cache_key();
    if let Some(payload) = cache.get(&key).await {
        LISTING_CACHE_CNTR.with_label_values(&["hit"]).inc();
        tracing::debug!(%key, "Question listing served from cache");
        return Ok(payload);
    }
    LISTING_CACHE_CNTR.with_label_values(&["miss"]).inc();

    let generation = cache.generation();
    let page = load_page(pool, query).await?;
    let payload: Arc<str> = Arc::from(serde_json::to_string(&page)?);
    if !cache.set_if_current(key, payload.clone(), generation).await {
        tracing::debug!("Listing changed while loading, not cached");
    }
    Ok(payload)
}
