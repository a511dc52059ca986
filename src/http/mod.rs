//! HTTP pub/sub endpoint.
//!
//! One handler serves four request shapes, dispatched on query options:
//! terminate (`?terminate=ID`), size-only (`?sizeonly=1`), schema
//! (`?schema=1[&schema_format=KEY]`), and the default — a long-lived
//! chunked feed of entries, one JSON record per line.
//!
//! The feed bridges worlds: the subscription runner is a plain thread
//! pushing rendered lines into a bounded channel, and the response body
//! drains that channel. Client disconnect closes the channel, which the
//! runner observes as a failed send and shuts down.

mod endpoint;
mod params;

pub use endpoint::JsonFlavour;
pub use params::{RequestParams, Tail, UnknownJsonFlavour};

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use crate::persist::Persister;
use crate::schema::{SchemaFormatNotFound, SubscribableSchema};
use crate::stream::Stream;

use endpoint::HttpFeed;

/// Response header naming the feed's subscription id, usable with
/// `?terminate=`.
pub const SUBSCRIPTION_ID_HEADER: &str = "X-Stream-Subscription-Id";

/// Response header carrying the entry count on `?sizeonly=1` answers.
pub const STREAM_SIZE_HEADER: &str = "X-Current-Stream-Size";

/// Chunks buffered between the runner thread and the response body.
const CHUNK_QUEUE: usize = 32;

/// A router serving the stream's pub/sub endpoint at `/`.
pub fn router<P>(stream: Arc<Stream<P>>) -> Router
where
    P: Persister,
    P::Entry: Serialize,
{
    Router::new()
        .route("/", any(serve::<P>))
        .with_state(stream)
}

/// The endpoint handler itself, for mounting under a custom path.
pub async fn serve<P>(
    State(stream): State<Arc<Stream<P>>>,
    method: Method,
    Query(query): Query<HashMap<String, String>>,
) -> Response
where
    P: Persister,
    P::Entry: Serialize,
{
    let params = match RequestParams::parse(&query) {
        Ok(params) => params,
        Err(UnknownJsonFlavour { requested }) => {
            let message = format!(
                "The `?json` parameter value `{requested}` is invalid, legal values are `js`, `fs`, or omit the parameter.\n"
            );
            return (StatusCode::NOT_FOUND, message).into_response();
        }
    };

    if stream.is_shutting_down() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    if let Some(id) = &params.terminate_id {
        return match stream.terminate_http_subscription(id) {
            Ok(()) => StatusCode::OK.into_response(),
            Err(_) => StatusCode::NOT_FOUND.into_response(),
        };
    }

    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    if params.size_only {
        return size_only(&stream, &method);
    }

    if params.schema_requested {
        return schema(&stream, &params);
    }

    feed(&stream, &params)
}

fn size_only<P>(stream: &Stream<P>, method: &Method) -> Response
where
    P: Persister,
{
    let size = stream.size();
    let body = if *method == Method::GET {
        Body::from(format!("{size}\n"))
    } else {
        Body::empty()
    };
    Response::builder()
        .status(StatusCode::OK)
        .header(STREAM_SIZE_HEADER, size.to_string())
        .body(body)
        .expect("size response")
}

fn schema<P>(stream: &Stream<P>, params: &RequestParams) -> Response
where
    P: Persister,
{
    let schema = stream.schema();
    match params.schema_format.as_str() {
        "" => Json(schema.clone()).into_response(),
        "simple" => {
            let namespace = stream.namespace();
            Json(SubscribableSchema {
                type_id: schema.type_id.clone(),
                entry_name: namespace.entry_name.clone(),
                namespace_name: namespace.namespace_name.clone(),
            })
            .into_response()
        }
        format => match schema.language.get(format) {
            Some(text) => text.clone().into_response(),
            None => (
                StatusCode::NOT_FOUND,
                Json(SchemaFormatNotFound::new(format)),
            )
                .into_response(),
        },
    }
}

fn feed<P>(stream: &Stream<P>, params: &RequestParams) -> Response
where
    P: Persister,
    P::Entry: Serialize,
{
    let size = stream.size();
    let begin_idx = params.resolve_begin_idx(size, |us| stream.index_at_or_after(us));

    if params.entry_count == Some(0) || (params.no_wait && begin_idx >= size) {
        return StatusCode::OK.into_response();
    }

    let (chunks, drain) = mpsc::channel::<Bytes>(CHUNK_QUEUE);
    let subscriber = HttpFeed::new(chunks, params.flavour, params.entry_count);
    let id = match stream.register_http_subscription(subscriber, begin_idx) {
        Ok(id) => id,
        Err(_) => return StatusCode::SERVICE_UNAVAILABLE.into_response(),
    };

    let body = Body::from_stream(ReceiverStream::new(drain).map(Ok::<_, Infallible>));
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(SUBSCRIPTION_ID_HEADER, id.as_str())
        .body(body)
        .expect("feed response")
}
