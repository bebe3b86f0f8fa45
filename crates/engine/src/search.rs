//! Shared paged-search helper for the readers.

use recommit_orders::{LineSearch, Page, Pagination, QuerySpec, Row};

use crate::budget::GovernanceBudget;
use crate::config::EngineConfig;
use crate::error::EngineError;

/// Drain every page of a search, charging one search unit per page.
pub(crate) fn fetch_all<Q>(
    search: &Q,
    spec: &QuerySpec,
    config: &EngineConfig,
    budget: &mut GovernanceBudget,
) -> Result<Vec<Row>, EngineError>
where
    Q: LineSearch + ?Sized,
{
    let mut rows = Vec::new();
    let mut offset = 0u32;

    loop {
        if !budget.try_spend(config.costs.search) {
            return Err(EngineError::BudgetExhausted);
        }
        let Page {
            rows: page_rows,
            has_more,
        } = search.search(spec, Pagination::new(config.page_size, offset))?;
        let fetched = page_rows.len() as u32;
        rows.extend(page_rows);
        if !has_more || fetched == 0 {
            break;
        }
        offset += fetched;
    }

    Ok(rows)
}
