use super::{
    ChannelStatusResponse, InsertItemLinks, InsertItemResponse, LatestItem, Link, LocationQuery,
    ServerState, TimeLinks, TimeResponse, WRITE_ID_HEADER, base_url, channel_url,
    error_response, format_timestamp, item_url, response_error,
};
use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use strata_core::{
    DEFAULT_CONTENT_TYPE, InsertItemOperationRequest, Locate, QueryItemsOperationRequest,
    ReadItemOperationRequest, StrataError, Tier, TimeBucket,
};

/// What the path after `/channel/{name}/` addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ChannelPath {
    Latest,
    Status,
    Item(i64),
    Adjacent(Locate),
    Time(TimeBucket),
}

/// `Ok(None)` when nothing is addressed; `Err` for a malformed time bucket.
pub(crate) fn parse_channel_path(rest: &str) -> Result<Option<ChannelPath>, StrataError> {
    let segments: Vec<&str> = rest
        .trim_matches('/')
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();

    let path = match segments.as_slice() {
        ["latest"] => Some(ChannelPath::Latest),
        ["status"] => Some(ChannelPath::Status),
        [sequence] => sequence.parse().ok().map(ChannelPath::Item),
        [sequence, "next"] => sequence
            .parse()
            .ok()
            .map(|sequence| ChannelPath::Adjacent(Locate::Next(sequence))),
        [sequence, "previous"] => sequence
            .parse()
            .ok()
            .map(|sequence| ChannelPath::Adjacent(Locate::Previous(sequence))),
        segments if (3..=6).contains(&segments.len()) => {
            if !segments
                .iter()
                .all(|segment| segment.chars().all(|ch| ch.is_ascii_digit()))
            {
                return Ok(None);
            }
            Some(ChannelPath::Time(TimeBucket::from_segments(segments)?))
        }
        _ => None,
    };

    Ok(path)
}

pub(crate) async fn insert_item(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let base = base_url(&state, &headers);
    let write_id = header_string(&headers, WRITE_ID_HEADER);

    let result = match state
        .hub
        .insert_item_operation
        .run(InsertItemOperationRequest {
            channel: name.clone(),
            payload: body,
            content_type: header_string(&headers, header::CONTENT_TYPE.as_str()),
            content_language: header_string(&headers, header::CONTENT_LANGUAGE.as_str()),
            write_id,
        })
        .await
    {
        Ok(result) => result,
        Err(error) => return error_response(error),
    };

    let timestamp = format_timestamp(result.item.timestamp);
    let location = item_url(&base, &name, result.item.sequence);
    let payload = InsertItemResponse {
        timestamp,
        sequence: result.item.sequence,
        links: InsertItemLinks {
            channel: Link::new(channel_url(&base, &name)),
            self_link: Link::new(location.clone()),
        },
        idempotent_replay: result.replayed.then_some(true),
    };

    if result.replayed {
        return (StatusCode::OK, Json(payload)).into_response();
    }

    let mut response = (StatusCode::CREATED, Json(payload)).into_response();
    if let Ok(location) = HeaderValue::from_str(&location) {
        response.headers_mut().insert(header::LOCATION, location);
    }
    response
}

pub(crate) async fn get_channel_path(
    State(state): State<Arc<ServerState>>,
    Path((name, rest)): Path<(String, String)>,
    Query(query): Query<LocationQuery>,
    headers: HeaderMap,
) -> Response {
    let path = match parse_channel_path(&rest) {
        Ok(Some(path)) => path,
        Ok(None) => {
            return response_error(
                StatusCode::NOT_FOUND,
                format!("no such resource: /channel/{}/{}", name, rest.trim_matches('/')),
            );
        }
        Err(error) => return error_response(error),
    };

    let base = base_url(&state, &headers);
    match path {
        ChannelPath::Latest => redirect_to(&state, &base, &name, Locate::Latest).await,
        ChannelPath::Adjacent(locate) => redirect_to(&state, &base, &name, locate).await,
        ChannelPath::Status => channel_status(&state, &base, &name).await,
        ChannelPath::Item(sequence) => get_item(&state, &base, &name, sequence).await,
        ChannelPath::Time(bucket) => {
            let tier = match query.location.as_deref() {
                Some(location) => match location.parse::<Tier>() {
                    Ok(tier) => tier,
                    Err(error) => return error_response(error),
                },
                None => Tier::Cache,
            };
            query_time(&state, &base, &name, bucket, tier, query.location.is_some()).await
        }
    }
}

async fn redirect_to(state: &ServerState, base: &str, name: &str, locate: Locate) -> Response {
    match state.hub.read_item_operation.locate(name, locate).await {
        Ok(Some(key)) => Redirect::to(&item_url(base, name, key.sequence)).into_response(),
        Ok(None) => response_error(StatusCode::NOT_FOUND, "no item found"),
        Err(error) => error_response(error),
    }
}

async fn get_item(state: &ServerState, base: &str, name: &str, sequence: i64) -> Response {
    let item = match state
        .hub
        .read_item_operation
        .run(ReadItemOperationRequest {
            channel: name.to_string(),
            sequence,
        })
        .await
    {
        Ok(item) => item,
        Err(error) => return error_response(error),
    };

    let mut links = Vec::new();
    for (locate, rel) in [
        (Locate::Previous(sequence), "previous"),
        (Locate::Next(sequence), "next"),
    ] {
        match state.hub.read_item_operation.locate(name, locate).await {
            Ok(Some(_)) => links.push(format!(
                "<{}/{}>;rel=\"{}\"",
                item_url(base, name, sequence),
                rel,
                rel
            )),
            Ok(None) => {}
            Err(error) => return error_response(error),
        }
    }

    let record = &item.record;
    let mut response = Response::new(Body::from(item.payload.clone()));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&record.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE)),
    );
    if let Some(language) = &record.content_language {
        if let Ok(value) = HeaderValue::from_str(language) {
            headers.insert(header::CONTENT_LANGUAGE, value);
        }
    }
    if let Ok(value) = HeaderValue::from_str(&format_timestamp(record.timestamp)) {
        headers.insert("creation-date", value);
    }
    for link in links {
        if let Ok(value) = HeaderValue::from_str(&link) {
            headers.append(header::LINK, value);
        }
    }

    response
}

async fn channel_status(state: &ServerState, base: &str, name: &str) -> Response {
    let status = match state.hub.channel_status_operation.run(name).await {
        Ok(status) => status,
        Err(error) => return error_response(error),
    };

    let payload = ChannelStatusResponse {
        latest: status.latest.map(|key| LatestItem {
            sequence: key.sequence,
            timestamp: format_timestamp(key.timestamp()),
            href: item_url(base, name, key.sequence),
        }),
        pending_replication: status.pending_replication,
        converged: status.converged,
    };

    (StatusCode::OK, Json(payload)).into_response()
}

async fn query_time(
    state: &ServerState,
    base: &str,
    name: &str,
    bucket: TimeBucket,
    tier: Tier,
    explicit_location: bool,
) -> Response {
    let result = match state
        .hub
        .query_items_operation
        .run(QueryItemsOperationRequest {
            channel: name.to_string(),
            bucket,
            tier,
        })
        .await
    {
        Ok(result) => result,
        Err(error) => return error_response(error),
    };

    let channel = channel_url(base, name);
    let suffix = if explicit_location {
        format!("?location={}", tier.as_str())
    } else {
        String::new()
    };
    let bucket_link =
        |bucket: TimeBucket| Link::new(format!("{}/{}{}", channel, bucket.path(), suffix));

    let payload = TimeResponse {
        links: TimeLinks {
            self_link: bucket_link(bucket),
            previous: bucket_link(bucket.previous()),
            next: bucket_link(bucket.next()),
            uris: result
                .items
                .iter()
                .map(|key| item_url(base, name, key.sequence))
                .collect(),
        },
    };

    (StatusCode::OK, Json(payload)).into_response()
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(rest: &str) -> Option<ChannelPath> {
        parse_channel_path(rest).expect("parse")
    }

    #[test]
    fn parses_channel_paths() {
        assert_eq!(parse("latest"), Some(ChannelPath::Latest));
        assert_eq!(parse("/status"), Some(ChannelPath::Status));
        assert_eq!(parse("1000"), Some(ChannelPath::Item(1000)));
        assert_eq!(
            parse("1000/next"),
            Some(ChannelPath::Adjacent(Locate::Next(1000)))
        );
        assert_eq!(
            parse("1001/previous/"),
            Some(ChannelPath::Adjacent(Locate::Previous(1001)))
        );

        match parse("2024/03/05/14/07") {
            Some(ChannelPath::Time(bucket)) => assert_eq!(bucket.path(), "2024/03/05/14/07"),
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(parse("abc"), None);
        assert_eq!(parse("2024/xx/05"), None);
        assert_eq!(parse("1/2/3/4/5/6/7"), None);
        assert!(matches!(
            parse_channel_path("2024/13/05"),
            Err(StrataError::InvalidRequest(_))
        ));
    }
}
