//! Configuration endpoints

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use meridian_config_store::to_properties;
use meridian_types::ConfigRequest;
use serde::Deserialize;

/// Query parameters for config requests
#[derive(Debug, Default, Deserialize)]
pub struct ConfigQuery {
    /// `json` (default) or `properties`
    pub format: Option<String>,
}

/// `GET /config/:application/:profiles`
pub async fn get_config(
    State(state): State<AppState>,
    Path((application, profiles)): Path<(String, String)>,
    Query(query): Query<ConfigQuery>,
) -> ApiResult<Response> {
    resolve(&state, application, &profiles, None, query).await
}

/// `GET /config/:application/:profiles/:label`
pub async fn get_labelled_config(
    State(state): State<AppState>,
    Path((application, profiles, label)): Path<(String, String, String)>,
    Query(query): Query<ConfigQuery>,
) -> ApiResult<Response> {
    resolve(&state, application, &profiles, Some(label), query).await
}

async fn resolve(
    state: &AppState,
    application: String,
    profiles: &str,
    label: Option<String>,
    query: ConfigQuery,
) -> ApiResult<Response> {
    let mut request =
        ConfigRequest::new(application).with_profiles(ConfigRequest::parse_profiles(profiles));
    if let Some(label) = label {
        // Labels containing '/' travel as "(_)" in a single path segment.
        request = request.with_label(label.replace("(_)", "/"));
    }

    let document = state.resolver.resolve(&request).await?;

    match query.format.as_deref() {
        None | Some("json") => Ok(Json(document).into_response()),
        Some("properties") => Ok((
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            to_properties(&document),
        )
            .into_response()),
        Some(other) => Err(ApiError::BadRequest(format!("unknown format: {}", other))),
    }
}
