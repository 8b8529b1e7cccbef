//! HTTP request handlers
//!
//! - Resolving private URLs (`/{namespace}/{action}/{token}`)
//! - Creating, listing and deleting records through the management API

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use chrono::{TimeDelta, Utc};
use serde_json::json;

use crate::availability::is_available;
use crate::dispatch::Resolution;
use crate::error::{Error, Result};
use crate::lifecycle::{CreateOptions, Expire};
use crate::model::{
    is_valid_action, is_valid_token, CreateRequest, CreateResponse, DeleteParams, ListParams,
    RecordView,
};
use crate::route::AppState;

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "URL not found").into_response()
}

/// Resolves a private URL
///
/// Subscribers registered on the dispatcher may replace the response.
/// Without an override:
///
/// - **307 Temporary Redirect** to the configured default redirect when the
///   hit was counted
/// - **404 Not Found** when the token is unknown, expired or used up
pub async fn resolve_private_url(
    State(state): State<AppState>,
    Path((action, token)): Path<(String, String)>,
) -> Response {
    // Malformed slugs can never match a record; skip the lookup and subscribers
    if !is_valid_action(&action) || !is_valid_token(&token) {
        return not_found();
    }

    match state.dispatcher.resolve(&action, &token) {
        Ok(Resolution::Override(response)) => response,
        Ok(Resolution::Redirect) => {
            Redirect::temporary(&state.urls.settings().default_redirect).into_response()
        }
        Ok(Resolution::NotFound) => not_found(),
        Err(e) => e.into_response(),
    }
}

/// Creates a new private URL
///
/// # Request Body
///
/// ```json
/// {
///   "action": "confirm-email",
///   "owner": "user_123",
///   "expire_in_secs": 3600,
///   "payload": {"email": "user@example.com"},
///   "hits_limit": 1,
///   "replace": true
/// }
/// ```
///
/// # Response
///
/// - **201 Created** - record stored
/// - **400 Bad Request** - invalid action, token size or body
/// - **503 Service Unavailable** - no free token found within the retry ceiling
pub async fn create_private_url(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CreateRequest>, JsonRejection>,
) -> Result<Response> {
    // Surface body errors (missing action, bad token_size shape) as 400 JSON
    let Json(request) = payload.map_err(|rejection| Error::validation(rejection.body_text()))?;

    // An absolute expire_at wins over a relative expire_in_secs
    let expire = match (request.expire_at, request.expire_in_secs) {
        (Some(at), _) => Some(Expire::At(at)),
        (None, Some(secs)) => Some(Expire::In(TimeDelta::try_seconds(secs).ok_or_else(
            || Error::validation("expire_in_secs is out of range"),
        )?)),
        (None, None) => None,
    };

    let mut options = CreateOptions {
        owner: request.owner,
        expire,
        hits_limit: request.hits_limit.unwrap_or(1),
        auto_delete: request.auto_delete,
        token_size: request.token_size,
        dashed_piece_size: request.dashed_piece_size,
        replace: request.replace,
        ..CreateOptions::default()
    };
    if let Some(data) = &request.payload {
        options = options.payload(data)?;
    }

    let record = state.urls.create(&request.action, options)?;

    // Build the public link from the configured origin and namespace

    let settings = state.urls.settings();
    let response = CreateResponse {
        url: settings.absolute_url(&record.absolute_path(&settings.url_namespace)),
        action: record.action,
        token: record.token,
        expire: record.expire,
        hits_limit: record.hits_limit,
        auto_delete: record.auto_delete,
        created: record.created,
    };

    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// Lists records with pagination
///
/// # Query Parameters
///
/// - `action` (optional) - only records of this action (range query)
/// - `owner` (optional) - only records of this owner
/// - `page` (optional) - page number, starts from 1 (default: 1)
/// - `limit` (optional) - items per page, max 100 (default: 10)
pub async fn list_private_urls(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Response> {
    // Parse pagination parameters with defaults
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(10).min(100);
    // Pages past the end just come back empty
    let offset = (page - 1).saturating_mul(limit);

    // Availability is evaluated once for the whole page
    let now = Utc::now();
    let records: Vec<RecordView> = state
        .urls
        .list(params.action.as_deref(), params.owner.as_deref(), offset, limit)?
        .into_iter()
        .map(|record| RecordView {
            used: record.used(),
            available: is_available(&record, now),
            record,
        })
        .collect();

    Ok(Json(json!({
        "page": page,
        "limit": limit,
        "total_fetched": records.len(),
        "data": records
    }))
    .into_response())
}

/// Deletes a record
///
/// `DELETE /api/urls/{action}/{token}?owner=user_123`
///
/// - **200 OK** - deleted
/// - **403 Forbidden** - `owner` given and not matching
/// - **404 Not Found** - no such record
pub async fn delete_private_url(
    State(state): State<AppState>,
    Path((action, token)): Path<(String, String)>,
    Query(params): Query<DeleteParams>,
) -> Result<Response> {
    // Owner verification and the delete itself happen in the lifecycle layer
    let record = state.urls.remove(&action, &token, params.owner.as_deref())?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "message": "Private url deleted successfully",
            "deleted": record.key()
        })),
    )
        .into_response())
}
