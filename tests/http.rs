//! The HTTP pub/sub endpoint: request dispatch, streamed feeds, and
//! subscription termination.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use tower::ServiceExt;

use strand::http::{self, STREAM_SIZE_HEADER, SUBSCRIPTION_ID_HEADER};
use strand::{MemoryPersister, Micros, SchemaDescriptor, Stream};

const READ_TIMEOUT: Duration = Duration::from_secs(2);

fn seeded_stream() -> Arc<Stream<MemoryPersister<String>>> {
    let schema = SchemaDescriptor::new("T9000", "Payload")
        .with_language("fs", "type Payload = string");
    let stream = Arc::new(Stream::with_schema(MemoryPersister::new(), schema));
    for (payload, us) in [("x", 100), ("y", 200), ("z", 300)] {
        stream.publish_at(payload.to_string(), Micros(us)).unwrap();
    }
    stream
}

fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, method: Method, uri: &str) -> axum::response::Response {
    app.clone().oneshot(request(method, uri)).await.unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let collected = tokio::time::timeout(READ_TIMEOUT, response.into_body().collect())
        .await
        .expect("bounded body")
        .unwrap();
    String::from_utf8(collected.to_bytes().to_vec()).unwrap()
}

#[tokio::test]
async fn size_only_reports_the_entry_count() {
    let app = http::router(seeded_stream());

    let response = send(&app, Method::GET, "/?sizeonly=1").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(STREAM_SIZE_HEADER).unwrap(), "3");
    assert_eq!(body_text(response).await, "3\n");

    let response = send(&app, Method::HEAD, "/?sizeonly=1").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(STREAM_SIZE_HEADER).unwrap(), "3");
    assert_eq!(body_text(response).await, "");
}

#[tokio::test]
async fn non_get_methods_are_rejected() {
    let app = http::router(seeded_stream());
    let response = send(&app, Method::POST, "/").await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    let response = send(&app, Method::DELETE, "/?sizeonly=1").await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn schema_formats() {
    let app = http::router(seeded_stream());

    let response = send(&app, Method::GET, "/?schema=1").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["type_id"], "T9000");
    assert_eq!(body["type_name"], "Payload");

    let response = send(&app, Method::GET, "/?schema=1&schema_format=simple").await;
    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["type_id"], "T9000");
    assert_eq!(body["entry_name"], "TopLevelEntry");
    assert_eq!(body["namespace_name"], "StrandSchema");

    let response = send(&app, Method::GET, "/?schema=1&schema_format=fs").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "type Payload = string");

    let response = send(&app, Method::GET, "/?schema=1&schema_format=cobol").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["unsupported_format_requested"], "cobol");
}

#[tokio::test]
async fn unknown_json_flavour_is_a_404() {
    let app = http::router(seeded_stream());
    let response = send(&app, Method::GET, "/?json=xml").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn since_filter_yields_the_suffix() {
    let app = http::router(seeded_stream());
    let response = send(&app, Method::GET, "/?since=200&n=2").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert_eq!(
        body,
        "{\"index\":1,\"us\":200}\t\"y\"\n{\"index\":2,\"us\":300}\t\"z\"\n"
    );
}

#[tokio::test]
async fn minimalistic_flavour_streams_bare_entries() {
    let app = http::router(seeded_stream());
    let response = send(&app, Method::GET, "/?i=1&n=2&json=js").await;
    let body = body_text(response).await;
    assert_eq!(body, "\"y\"\n\"z\"\n");
}

#[tokio::test]
async fn fsharp_flavour_wraps_with_pascal_case() {
    let app = http::router(seeded_stream());
    let response = send(&app, Method::GET, "/?tail=1&n=1&json=fs").await;
    let body = body_text(response).await;
    assert_eq!(
        body,
        "{\"Entry\":\"z\",\"Index\":2,\"TimestampUS\":300}\n"
    );
}

#[tokio::test]
async fn nowait_returns_immediately_when_caught_up() {
    let app = http::router(seeded_stream());
    let response = send(&app, Method::GET, "/?i=10&nowait=1").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "");
}

#[tokio::test]
async fn recent_window_skips_old_entries() {
    let stream = Arc::new(Stream::<MemoryPersister<String>>::in_memory());
    let now = strand::clock::now_us();
    stream
        .publish_at("old".to_string(), now.saturating_sub(10_000_000))
        .unwrap();
    stream.publish_at("new".to_string(), now).unwrap();

    let app = http::router(stream);
    let response = send(&app, Method::GET, "/?recent=5000000&n=1&json=js").await;
    assert_eq!(body_text(response).await, "\"new\"\n");
}

#[tokio::test]
async fn terminate_closes_the_feed_and_then_reports_404() {
    let stream = seeded_stream();
    let app = http::router(Arc::clone(&stream));

    // Open a feed that would otherwise stay up forever.
    let response = send(&app, Method::GET, "/").await;
    assert_eq!(response.status(), StatusCode::OK);
    let id = response
        .headers()
        .get(SUBSCRIPTION_ID_HEADER)
        .expect("feed responses carry their subscription id")
        .to_str()
        .unwrap()
        .to_string();
    let mut body = response.into_body();

    // The three seeded entries arrive...
    let mut received = String::new();
    while received.matches('\n').count() < 3 {
        let frame = tokio::time::timeout(READ_TIMEOUT, body.frame())
            .await
            .expect("seeded entries arrive promptly")
            .expect("feed is still open")
            .unwrap();
        if let Some(data) = frame.data_ref() {
            received.push_str(std::str::from_utf8(data).unwrap());
        }
    }

    // ...then the feed idles until terminated by id.
    let response = send(&app, Method::GET, &format!("/?terminate={id}")).await;
    assert_eq!(response.status(), StatusCode::OK);

    // The response body ends shortly after.
    let end = tokio::time::timeout(READ_TIMEOUT, async {
        while let Some(frame) = body.frame().await {
            frame.unwrap();
        }
    })
    .await;
    assert!(end.is_ok(), "terminated feed must close its response");

    // Once the registry entry is cleaned up, the id is unknown.
    let deadline = tokio::time::Instant::now() + READ_TIMEOUT;
    loop {
        let response = send(&app, Method::GET, &format!("/?terminate={id}")).await;
        if response.status() == StatusCode::NOT_FOUND {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "stale subscription id should become unknown"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn terminate_with_unknown_id_is_a_404() {
    let app = http::router(seeded_stream());
    let response = send(&app, Method::GET, "/?terminate=nope").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn feeds_carry_a_content_type_and_fresh_ids() {
    let app = http::router(seeded_stream());
    let first = send(&app, Method::GET, "/?n=1").await;
    let second = send(&app, Method::GET, "/?n=1").await;
    assert_eq!(
        first.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/plain; charset=utf-8"
    );
    let id_a = first.headers().get(SUBSCRIPTION_ID_HEADER).unwrap();
    let id_b = second.headers().get(SUBSCRIPTION_ID_HEADER).unwrap();
    assert_ne!(id_a, id_b);
}

#[tokio::test]
async fn shutdown_turns_the_endpoint_off() {
    let stream = seeded_stream();
    let app = http::router(Arc::clone(&stream));

    stream.shutdown();
    let response = send(&app, Method::GET, "/").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let response = send(&app, Method::GET, "/?sizeonly=1").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    // Terminate requests are no exception.
    let response = send(&app, Method::GET, "/?terminate=whatever").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn tail_from_current_end_sees_only_new_entries() {
    let stream = seeded_stream();
    let app = http::router(Arc::clone(&stream));

    let response = send(&app, Method::GET, "/?tail=-1&n=1&json=js").await;
    assert_eq!(response.status(), StatusCode::OK);
    let mut body = response.into_body();

    stream.publish_at("w".to_string(), Micros(400)).unwrap();

    let frame = tokio::time::timeout(READ_TIMEOUT, body.frame())
        .await
        .expect("new entry arrives")
        .expect("feed is open")
        .unwrap();
    let data = frame.data_ref().unwrap();
    assert_eq!(std::str::from_utf8(data).unwrap(), "\"w\"\n");
}
