use super::{
    ChannelLinks, ChannelListLinks, ChannelListResponse, ChannelResponse, CreateChannelBody,
    HealthResponse, Link, NamedLink, ServerState, TagListLinks, TagListResponse, base_url,
    channel_url, error_response, format_timestamp, response_error,
};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use strata_core::{
    ChannelConfig, CreateChannelOperationOutcome, CreateChannelOperationRequest,
    ListChannelsOperationRequest,
};

pub(crate) async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub(crate) fn channel_response(base: &str, channel: &ChannelConfig) -> ChannelResponse {
    let href = channel_url(base, &channel.name);
    ChannelResponse {
        name: channel.name.clone(),
        tags: channel.tags.clone(),
        ttl_days: channel.ttl_days,
        creation_date: format_timestamp(channel.created_at),
        links: ChannelLinks {
            latest: Link::new(format!("{}/latest", href)),
            status: Link::new(format!("{}/status", href)),
            self_link: Link::new(href),
        },
    }
}

fn channel_links(base: &str, channels: Vec<ChannelConfig>) -> Vec<NamedLink> {
    channels
        .into_iter()
        .map(|channel| NamedLink {
            href: channel_url(base, &channel.name),
            name: channel.name,
        })
        .collect()
}

pub(crate) async fn list_channels(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> Response {
    let base = base_url(&state, &headers);
    let channels = match state
        .hub
        .list_channels_operation
        .run(ListChannelsOperationRequest::default())
        .await
    {
        Ok(channels) => channels,
        Err(error) => return error_response(error),
    };

    let payload = ChannelListResponse {
        links: ChannelListLinks {
            self_link: Link::new(format!("{}/channel", base)),
            channels: channel_links(&base, channels),
        },
    };

    (StatusCode::OK, Json(payload)).into_response()
}

pub(crate) async fn create_channel(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request: CreateChannelBody = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(error) => {
            return response_error(StatusCode::BAD_REQUEST, format!("malformed JSON: {}", error));
        }
    };

    let outcome = match state
        .hub
        .create_channel_operation
        .run(CreateChannelOperationRequest {
            name: request.name,
            tags: request.tags,
            ttl_days: request.ttl_days,
        })
        .await
    {
        Ok(outcome) => outcome,
        Err(error) => return error_response(error),
    };

    let base = base_url(&state, &headers);
    let payload = channel_response(&base, outcome.channel());
    let location = payload.links.self_link.href.clone();

    match outcome {
        CreateChannelOperationOutcome::Created(_) => {
            let mut response = (StatusCode::CREATED, Json(payload)).into_response();
            if let Ok(location) = HeaderValue::from_str(&location) {
                response.headers_mut().insert(header::LOCATION, location);
            }
            response
        }
        CreateChannelOperationOutcome::Existing(_) => (StatusCode::OK, Json(payload)).into_response(),
    }
}

pub(crate) async fn get_channel(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    match state.hub.get_channel_operation.run(&name).await {
        Ok(channel) => {
            let base = base_url(&state, &headers);
            (StatusCode::OK, Json(channel_response(&base, &channel))).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn delete_channel(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Response {
    match state.hub.delete_channel_operation.run(&name).await {
        Ok(_) => StatusCode::ACCEPTED.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn list_tags(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> Response {
    let base = base_url(&state, &headers);
    let tags = match state.hub.list_channels_operation.tags().await {
        Ok(tags) => tags,
        Err(error) => return error_response(error),
    };

    let payload = TagListResponse {
        links: TagListLinks {
            self_link: Link::new(format!("{}/tag", base)),
            tags: tags
                .into_iter()
                .map(|tag| NamedLink {
                    href: format!("{}/tag/{}", base, tag),
                    name: tag,
                })
                .collect(),
        },
    };

    (StatusCode::OK, Json(payload)).into_response()
}

pub(crate) async fn get_tag(
    State(state): State<Arc<ServerState>>,
    Path(tag): Path<String>,
    headers: HeaderMap,
) -> Response {
    let base = base_url(&state, &headers);
    let channels = match state
        .hub
        .list_channels_operation
        .run(ListChannelsOperationRequest {
            tag: Some(tag.clone()),
        })
        .await
    {
        Ok(channels) => channels,
        Err(error) => return error_response(error),
    };

    let payload = ChannelListResponse {
        links: ChannelListLinks {
            self_link: Link::new(format!("{}/tag/{}", base, tag)),
            channels: channel_links(&base, channels),
        },
    };

    (StatusCode::OK, Json(payload)).into_response()
}
