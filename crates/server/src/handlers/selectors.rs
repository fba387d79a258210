//! Selector enumeration endpoint.

use crate::error::ApiResult;
use crate::metrics::SELECTOR_QUERY_DURATION;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, State};
use memo_core::WeakFingerprint;
use memo_metadata::SelectorQuery;
use memo_metadata::wire::{SelectorsParams, SelectorsResponse};

/// GET /v1/{namespace}/selectors/{weak}?max_selectors=&max_content_bags=
///
/// Without parameters every selector is returned. `max_selectors` limits the
/// list; `max_content_bags` additionally inlines the values of the first
/// selectors.
pub async fn get_selectors(
    State(state): State<AppState>,
    Path((namespace, weak)): Path<(String, String)>,
    Query(params): Query<SelectorsParams>,
) -> ApiResult<Json<SelectorsResponse>> {
    let weak = WeakFingerprint::from_hex(&weak)?;
    let database = state.database(&namespace)?;
    let query = SelectorQuery::from_limits(params.max_selectors, params.max_content_bags);

    let shape = match query {
        SelectorQuery::All => "all",
        SelectorQuery::SelectorsOnly { .. } => "selectors_only",
        SelectorQuery::WithContentBags { .. } => "with_content_bags",
    };
    let timer = SELECTOR_QUERY_DURATION
        .with_label_values(&[shape])
        .start_timer();
    let selectors = database.get_selectors(&weak, &query).await?;
    timer.observe_duration();

    Ok(Json(SelectorsResponse { selectors }))
}
