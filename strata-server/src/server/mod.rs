use crate::config::Config;
use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use strata_core::{Hub, Result, StrataError};
use tokio::net::TcpListener;

mod channels;
mod groups;
mod items;
mod types;

use channels::{
    create_channel, delete_channel, get_channel, get_tag, health, list_channels, list_tags,
};
use groups::{delete_group, get_group, list_groups, put_group};
use items::{get_channel_path, insert_item};
pub(crate) use types::*;

pub(crate) const WRITE_ID_HEADER: &str = "x-strata-write-id";

pub struct ServerState {
    pub(crate) hub: Arc<Hub>,
    pub(crate) config: Config,
    pub(crate) public_url: String,
}

impl ServerState {
    pub fn new(hub: Arc<Hub>, config: Config) -> Self {
        let public_url = config.server.public_url_or_default();
        Self {
            hub,
            config,
            public_url,
        }
    }
}

pub async fn run_server(config: Config) -> Result<()> {
    let hub = Arc::new(Hub::start(config.to_hub_config()?).await?);
    let bind_addr = config.server.bind_addr.clone();
    let state = Arc::new(ServerState::new(hub, config));

    let app = build_router(state);
    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("strata listening on {}", bind_addr);

    axum::serve(listener, app)
        .await
        .map_err(|error| StrataError::Http(error.to_string()))?;

    Ok(())
}

pub(crate) fn build_router(state: Arc<ServerState>) -> Router {
    let body_limit = state.config.server.max_payload_bytes;

    Router::new()
        .route("/health", get(health))
        .route("/channel", get(list_channels).post(create_channel))
        .route(
            "/channel/:name",
            get(get_channel).post(insert_item).delete(delete_channel),
        )
        .route("/channel/:name/*rest", get(get_channel_path))
        .route("/tag", get(list_tags))
        .route("/tag/:tag", get(get_tag))
        .route("/group", get(list_groups))
        .route(
            "/group/:name",
            get(get_group).put(put_group).delete(delete_group),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Scheme and authority for links: the request's Host header, or the
/// configured public URL.
pub(crate) fn base_url(state: &ServerState, headers: &HeaderMap) -> String {
    headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .map(|host| format!("http://{}", host))
        .unwrap_or_else(|| state.public_url.clone())
}

pub(crate) fn channel_url(base: &str, name: &str) -> String {
    format!("{}/channel/{}", base, name)
}

pub(crate) fn item_url(base: &str, name: &str, sequence: i64) -> String {
    format!("{}/channel/{}/{}", base, name, sequence)
}

pub(crate) fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn response_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Maps core errors to statuses. Storage failures are reported generically.
pub(crate) fn error_response(error: StrataError) -> Response {
    match error {
        StrataError::InvalidName(message) => {
            response_error(StatusCode::INTERNAL_SERVER_ERROR, message)
        }
        StrataError::InvalidRequest(message) => response_error(StatusCode::BAD_REQUEST, message),
        StrataError::PayloadTooLarge { .. } => {
            response_error(StatusCode::PAYLOAD_TOO_LARGE, error.to_string())
        }
        StrataError::ChannelNotFound(_)
        | StrataError::ItemNotFound { .. }
        | StrataError::GroupNotFound(_) => response_error(StatusCode::NOT_FOUND, error.to_string()),
        StrataError::ChannelExists(_) | StrataError::GroupConflict(_) => {
            response_error(StatusCode::CONFLICT, error.to_string())
        }
        other => {
            tracing::error!("request failed: {}", other);
            response_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}
