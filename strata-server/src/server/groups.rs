use super::{
    GroupLinks, GroupListLinks, GroupListResponse, GroupResponse, Link, NamedLink, PutGroupBody,
    ServerState, base_url, error_response, response_error,
};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use strata_core::{GroupConfig, GroupRecord, PutGroupOperationOutcome};

fn group_url(base: &str, name: &str) -> String {
    format!("{}/group/{}", base, name)
}

fn group_response(base: &str, record: &GroupRecord) -> GroupResponse {
    let config = &record.config;
    GroupResponse {
        name: config.name.clone(),
        callback_url: config.callback_url.clone(),
        channel_url: config.channel_url.clone(),
        transactional: config.transactional,
        last_completed: record
            .last_completed
            .map(|sequence| strata_core::group_caller::item_uri(&config.channel_url, sequence)),
        links: GroupLinks {
            self_link: Link::new(group_url(base, &config.name)),
        },
    }
}

pub(crate) async fn list_groups(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> Response {
    let base = base_url(&state, &headers);
    let groups = match state.hub.get_group_operation.list().await {
        Ok(groups) => groups,
        Err(error) => return error_response(error),
    };

    let payload = GroupListResponse {
        links: GroupListLinks {
            self_link: Link::new(format!("{}/group", base)),
            groups: groups
                .into_iter()
                .map(|record| NamedLink {
                    href: group_url(&base, &record.config.name),
                    name: record.config.name,
                })
                .collect(),
        },
    };

    (StatusCode::OK, Json(payload)).into_response()
}

pub(crate) async fn get_group(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    match state.hub.get_group_operation.run(&name).await {
        Ok(record) => {
            let base = base_url(&state, &headers);
            (StatusCode::OK, Json(group_response(&base, &record))).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn put_group(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request: PutGroupBody = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(error) => {
            return response_error(StatusCode::BAD_REQUEST, format!("malformed JSON: {}", error));
        }
    };

    let outcome = match state
        .hub
        .put_group_operation
        .run(GroupConfig {
            name,
            callback_url: request.callback_url,
            channel_url: request.channel_url,
            transactional: request.transactional,
        })
        .await
    {
        Ok(outcome) => outcome,
        Err(error) => return error_response(error),
    };

    let base = base_url(&state, &headers);
    let payload = group_response(&base, outcome.group());
    let status = match outcome {
        PutGroupOperationOutcome::Created(_) => StatusCode::CREATED,
        PutGroupOperationOutcome::Unchanged(_) | PutGroupOperationOutcome::Replaced(_) => {
            StatusCode::OK
        }
    };

    (status, Json(payload)).into_response()
}

pub(crate) async fn delete_group(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Response {
    match state.hub.delete_group_operation.run(&name).await {
        Ok(_) => StatusCode::ACCEPTED.into_response(),
        Err(error) => error_response(error),
    }
}
