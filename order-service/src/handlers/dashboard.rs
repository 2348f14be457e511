//! Dashboard handlers.

use axum::extract::{Json, Query, State};
use chrono::{Datelike, NaiveDate, Utc};
use serde::Deserialize;

use super::retrying;
use crate::error::OrderResult;
use crate::models::{DashboardStats, RequestContext};
use crate::startup::AppState;

/// Revenue window; both ends inclusive.
#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl StatsQuery {
    /// Resolve the window, defaulting to the current month up to today.
    pub fn resolve(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let to = self.to.unwrap_or(today);
        let from = self.from.unwrap_or_else(|| to.with_day(1).unwrap_or(to));
        (from, to)
    }
}

/// Aggregate order counts and delivered revenue.
///
/// GET /dashboard/stats
pub async fn dashboard_stats(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<StatsQuery>,
) -> OrderResult<Json<DashboardStats>> {
    let (from, to) = query.resolve(Utc::now().date_naive());

    let stats = retrying(&state, "dashboard_stats", || {
        state.service.dashboard_stats(&ctx, from, to)
    })
    .await?;
    Ok(Json(stats))
}
