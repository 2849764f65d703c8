//! Page envelope shared by every list endpoint.

use serde::{Deserialize, Serialize};

/// Default page size when `maxResults` is absent.
pub const DEFAULT_PAGE_SIZE: usize = 50;
/// Upper bound on `maxResults`; larger values are clamped, not rejected.
pub const MAX_PAGE_SIZE: usize = 100;

/// The `{startAt, maxResults, total, isLast, values}` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub start_at: usize,
    pub max_results: usize,
    pub total: usize,
    pub is_last: bool,
    pub values: Vec<T>,
}

impl<T> Page<T> {
    /// Slice an owned sequence into a page envelope.
    pub fn slice(items: Vec<T>, start_at: usize, max_results: usize) -> Self {
        let max_results = max_results.clamp(1, MAX_PAGE_SIZE);
        let total = items.len();
        let values: Vec<T> = items
            .into_iter()
            .skip(start_at)
            .take(max_results)
            .collect();
        let is_last = start_at + values.len() >= total;
        Page {
            start_at,
            max_results,
            total,
            is_last,
            values,
        }
    }
}
