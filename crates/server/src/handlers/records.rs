//! Content hash list endpoints (point lookup, add, compare-exchange).

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use memo_core::{ContentHashListWithDeterminism, Selector, StrongFingerprint, WeakFingerprint};
use memo_metadata::wire::{
    AddContentHashListRequest, AddContentHashListResponse, AddOutcomeKind,
    CompareExchangeRequest, CompareExchangeResponse, ConflictResponse,
};
use memo_metadata::{AddOutcome, CompareExchange, Expected};
use tracing::{debug, warn};

/// Set on a lookup response whose record could not be re-pinned.
pub const WARNING_HEADER: HeaderName = HeaderName::from_static("x-memo-warning");

/// Path parameters addressing one record.
type RecordPath = Path<(String, String, String)>;

fn parse_fingerprint(weak: &str, selector: &str) -> ApiResult<StrongFingerprint> {
    let weak = WeakFingerprint::from_hex(weak)?;
    let selector = Selector::from_key(selector)?;
    Ok(StrongFingerprint::new(weak, selector))
}

/// GET /v1/{namespace}/content-hash-lists/{weak}/{selector}
///
/// Pins the record's content when its retention window has lapsed, so remote
/// readers see refreshed pin times.
pub async fn get_content_hash_list(
    State(state): State<AppState>,
    Path((namespace, weak, selector)): RecordPath,
) -> ApiResult<Response> {
    let key = parse_fingerprint(&weak, &selector)?;
    let database = state.database(&namespace)?;

    let lookup = database
        .get_and_refresh(&key, state.content.as_ref())
        .await?;
    let Some(record) = lookup.record else {
        metrics::record_lookup("miss");
        return Err(ApiError::NotFound(format!(
            "no content hash list for {key}"
        )));
    };

    let mut response = Json(record).into_response();
    match lookup.warning {
        Some(warning) => {
            metrics::record_lookup("stale");
            match HeaderValue::from_str(&warning) {
                Ok(value) => {
                    response.headers_mut().insert(WARNING_HEADER, value);
                }
                Err(e) => warn!(error = %e, "pin warning is not a valid header value"),
            }
        }
        None => metrics::record_lookup("hit"),
    }
    Ok(response)
}

/// POST /v1/{namespace}/content-hash-lists/{weak}/{selector}
///
/// AddContentHashList: add-or-get under the determinism policy, or an
/// unconditional overwrite when `force_update` is set.
pub async fn add_content_hash_list(
    State(state): State<AppState>,
    Path((namespace, weak, selector)): RecordPath,
    Json(request): Json<AddContentHashListRequest>,
) -> ApiResult<Json<AddContentHashListResponse>> {
    let key = parse_fingerprint(&weak, &selector)?;
    let database = state.database(&namespace)?;
    let value =
        ContentHashListWithDeterminism::new(request.content_hash_list, request.determinism);

    let (outcome, record) = if request.force_update {
        (AddOutcomeKind::Forced, database.force_update(&key, &value).await?)
    } else {
        let outcome = database.add_or_replace(&key, &value).await?;
        let kind = match &outcome {
            AddOutcome::Added(_) => AddOutcomeKind::Added,
            AddOutcome::Replaced(_) => AddOutcomeKind::Replaced,
            AddOutcome::Unchanged(_) => AddOutcomeKind::Unchanged,
            AddOutcome::Existing(_) => AddOutcomeKind::Existing,
        };
        (kind, outcome.into_record())
    };

    let label = match outcome {
        AddOutcomeKind::Added => "added",
        AddOutcomeKind::Replaced => "replaced",
        AddOutcomeKind::Unchanged => "unchanged",
        AddOutcomeKind::Existing => "existing",
        AddOutcomeKind::Forced => "forced",
    };
    metrics::record_add(label);
    debug!(namespace, fingerprint = %key, outcome = label, "content hash list added");

    Ok(Json(AddContentHashListResponse { outcome, record }))
}

/// POST /v1/{namespace}/content-hash-lists/{weak}/{selector}/compare-exchange
///
/// 200 `{version}` when the precondition held, 409 `{current}` when it did not.
pub async fn compare_exchange(
    State(state): State<AppState>,
    Path((namespace, weak, selector)): RecordPath,
    Json(request): Json<CompareExchangeRequest>,
) -> ApiResult<Response> {
    let key = parse_fingerprint(&weak, &selector)?;
    let database = state.database(&namespace)?;
    let expected = Expected::from_version(request.expected);

    let result = database
        .compare_exchange_record(&key, &expected, &request.replacement)
        .await?;
    Ok(match result {
        CompareExchange::Succeeded(version) => {
            metrics::record_compare_exchange("succeeded");
            Json(CompareExchangeResponse { version }).into_response()
        }
        CompareExchange::Conflict(current) => {
            metrics::record_compare_exchange("conflict");
            (StatusCode::CONFLICT, Json(ConflictResponse { current })).into_response()
        }
    })
}
