//! End-to-end request scenarios through `TandemServer::handle`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use http::{header, Method, Request, StatusCode};
use serde_json::{json, Value};
use tandem_client::{
    hydrate, markup_islands, ClientComponent, ClientError, ClientManifest, ModuleCache,
    StreamDecoder,
};
use tandem_core::{define_request_state, Element, Node, RequestContext, RequestState, TandemError};
use tandem_registry::{ModuleReference, ServerFunction};
use tandem_render::{check_shapes, RenderError};
use tandem_router::{middleware_fn, Flow, Route};
use tandem_server::{HttpResponse, TandemApp, TandemServer};
use tandem_store::{MemoryStore, SESSION_COOKIE};
use tandem_streaming::{decode_all, Frame, FrameDecoder, FrameKind, FRAME_CONTENT_TYPE};

// === Fixtures ===

fn item_page(cx: &RequestContext) -> Node {
    Node::text(format!("item {}", cx.param("id").unwrap_or_default()))
}

fn counter_page(_cx: &RequestContext) -> Node {
    Node::fragment([
        Node::server("A", || async { Ok(Node::text("A")) }),
        Node::client("btn#Counter", json!({"count": 0})),
    ])
}

fn feed_page(_cx: &RequestContext) -> Node {
    Element::new("main")
        .child("early")
        .child(Node::server("Late", || async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(Node::text("late"))
        }))
        .into()
}

fn broken_page(_cx: &RequestContext) -> Node {
    Node::server("Broken", || async { Err(anyhow::anyhow!("db password rejected")) })
}

fn counter_markup(props: &Value) -> Node {
    Element::new("button")
        .child(Node::text(format!("count: {}", props["count"])))
        .into()
}

fn echo_page(state: RequestState<String>) -> impl Fn(&RequestContext) -> Node + Send + Sync {
    move |cx: &RequestContext| {
        let who = cx.param("who").unwrap_or_default();
        let delay = if who == "alice" { 60 } else { 10 };
        if let Err(err) = state.set(who) {
            return Node::text(err.to_string());
        }

        let state = state.clone();
        Node::server("Echo", move || {
            let state = state.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok::<_, anyhow::Error>(Node::text(format!("hello {}", state.get()?)))
            }
        })
    }
}

fn app() -> TandemApp {
    TandemApp::new("scenarios")
        .with_title("Scenarios")
        .page("/items/:id", item_page)
        .page("/counter", counter_page)
        .page("/feed", feed_page)
        .page("/broken", broken_page)
        .page("/echo/:who", echo_page(define_request_state(String::new)))
        .route(
            Route::new("/admin")
                .with(middleware_fn(|_cx| async { Ok(Flow::redirect("/login")) }))
                .page(item_page),
        )
        .route(
            Route::new("/cached")
                .with(middleware_fn(|cx: RequestContext| async move {
                    cx.set_response_header(
                        header::CACHE_CONTROL,
                        header::HeaderValue::from_static("public, max-age=60"),
                    );
                    Ok(Flow::Continue)
                }))
                .page(item_page),
        )
        .client_module(ModuleReference::new("btn#Counter", "Counter"))
        .ssr_component("btn#Counter", counter_markup)
        .server_fn(
            "actions#incrementCounter",
            ServerFunction::unary("incrementCounter", |n: i64| async move { Ok(n + 1) }),
        )
}

async fn server() -> TandemServer {
    app().build().await.unwrap()
}

fn get(uri: &str) -> Request<Vec<u8>> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Vec::new())
        .unwrap()
}

fn post_action(body: Value) -> Request<Vec<u8>> {
    Request::builder()
        .method(Method::POST)
        .uri("/_action")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.to_string().into_bytes())
        .unwrap()
}

async fn body_text(response: HttpResponse) -> String {
    String::from_utf8(response.into_body().collect().await).unwrap()
}

async fn frames(response: HttpResponse) -> Vec<Frame> {
    assert_eq!(response.headers()[header::CONTENT_TYPE], FRAME_CONTENT_TYPE);
    decode_all(&response.into_body().collect().await).unwrap()
}

fn counting_cache(loads: Arc<AtomicUsize>) -> ModuleCache {
    let mut manifest = ClientManifest::new();
    manifest
        .register("btn#Counter", move || {
            let loads = Arc::clone(&loads);
            async move {
                loads.fetch_add(1, Ordering::SeqCst);
                let component: Arc<dyn ClientComponent> =
                    Arc::new(|props: &Value| json!({"count": props["count"]}));
                Ok(component)
            }
        })
        .unwrap();
    ModuleCache::new(Arc::new(manifest))
}

fn decode(frames: Vec<Frame>) -> StreamDecoder {
    let mut decoder = StreamDecoder::new();
    for frame in frames {
        decoder.push_frame(frame).unwrap();
    }
    decoder.finish().unwrap();
    decoder
}

// === Routing Tests ===

#[tokio::test]
async fn test_route_params_reach_the_page() {
    let server = server().await;

    let matched = server.routes().match_route(&Method::GET, "/items/42").unwrap();
    assert_eq!(matched.param("id"), Some("42"));

    let response = server.handle(get("/items/42?_rsc")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let decoder = decode(frames(response).await);
    let root = decoder.root().wait().await.unwrap();
    assert_eq!(root.text_content(), "item 42");
}

#[tokio::test]
async fn test_unmatched_requests() {
    let server = server().await;

    let response = server.handle(get("/nope")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = server
        .handle(
            Request::builder()
                .method(Method::POST)
                .uri("/items/42")
                .body(Vec::new())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_middleware_short_circuit() {
    let server = server().await;

    let response = server.handle(get("/admin")).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/login");
}

#[tokio::test]
async fn test_middleware_response_headers() {
    let server = server().await;

    let response = server.handle(get("/cached")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=60");
}

// === Streaming Tests ===

#[tokio::test]
async fn test_value_and_reference_frames_load_once() {
    let server = server().await;
    let request = Request::builder()
        .uri("/counter")
        .header(header::ACCEPT, FRAME_CONTENT_TYPE)
        .body(Vec::new())
        .unwrap();

    let frames = frames(server.handle(request).await).await;

    let values = frames
        .iter()
        .filter(|f| f.kind == FrameKind::Value && f.payload == json!("A"))
        .count();
    assert_eq!(values, 1);
    let references: Vec<_> = frames.iter().filter(|f| f.kind == FrameKind::Reference).collect();
    assert_eq!(references.len(), 1);
    assert_eq!(references[0].payload["id"], json!("btn#Counter"));
    assert_eq!(references[0].payload["props"], json!({"count": 0}));

    let loads = Arc::new(AtomicUsize::new(0));
    let cache = counting_cache(Arc::clone(&loads));
    let root = decode(frames).root().wait().await.unwrap();
    let islands = root.islands();
    assert_eq!(islands.len(), 1);
    islands[0].load(&cache).await.unwrap();
    islands[0].load(&cache).await.unwrap();

    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_early_shell_flushed_before_late_resolution() {
    let server = server().await;
    let started = Instant::now();

    let response = server.handle(get("/feed?_rsc")).await;
    assert!(response.body().is_stream());
    let mut chunks = response.into_body().into_stream();

    let mut wire = FrameDecoder::new();
    let mut decoder = StreamDecoder::new();

    let shell = chunks.next().await.unwrap();
    let shell_at = started.elapsed();
    let text = String::from_utf8_lossy(&shell).to_string();
    assert!(text.contains("early"));
    assert!(!text.contains("late"));

    wire.push(&shell);
    for frame in wire.drain().unwrap() {
        decoder.push_frame(frame).unwrap();
    }
    let root = decoder.root().try_get().unwrap().unwrap();
    assert_eq!(root.text_content(), "early");

    while let Some(chunk) = chunks.next().await {
        wire.push(&chunk);
        for frame in wire.drain().unwrap() {
            decoder.push_frame(frame).unwrap();
        }
    }
    decoder.finish().unwrap();

    assert!(started.elapsed() >= shell_at + Duration::from_millis(50));
    assert_eq!(root.resolve_deep().await.text_content(), "earlylate");
}

#[tokio::test]
async fn test_buffered_frames_without_streaming() {
    let server = app().with_streaming(false).build().await.unwrap();

    let response = server.handle(get("/feed?_rsc")).await;

    assert!(!response.body().is_stream());
    let frames = frames(response).await;
    assert!(frames.iter().any(|f| f.kind == FrameKind::Resolution));
    assert!(frames.last().unwrap().is_end());
}

#[tokio::test]
async fn test_shell_error_is_generic_500() {
    let server = server().await;

    let response = server.handle(get("/broken?_rsc")).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_text(response).await;
    assert!(body.contains("Something went wrong"));
    assert!(!body.contains("db password"));
}

#[tokio::test]
async fn test_shell_error_fails_the_document_too() {
    let server = server().await;

    let response = server.handle(get("/broken")).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_text(response).await;
    assert!(body.contains("Something went wrong"));
    assert!(!body.contains("db password"));
}

#[tokio::test]
async fn test_suspense_deadline_bounds_both_passes() {
    let server = TandemApp::new("deadline")
        .configure(|config| config.with_suspense_timeout(Some(Duration::from_millis(50))))
        .page("/stuck", |_cx: &RequestContext| {
            Node::fragment([
                Node::text("shell"),
                Node::server("Never", || async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Node::text("never"))
                }),
            ])
        })
        .build()
        .await
        .unwrap();

    let streamed = tokio::time::timeout(Duration::from_secs(2), async {
        let response = server.handle(get("/stuck?_rsc")).await;
        frames(response).await
    })
    .await
    .expect("frame stream outlived the suspense deadline");
    assert_eq!(streamed[streamed.len() - 2].kind, FrameKind::Error);
    assert!(streamed.last().unwrap().is_end());

    let html = tokio::time::timeout(Duration::from_secs(2), async {
        let response = server.handle(get("/stuck")).await;
        assert_eq!(response.status(), StatusCode::OK);
        body_text(response).await
    })
    .await
    .expect("document outlived the suspense deadline");
    assert!(html.contains("shell<template data-tandem-error=\"Never\"></template>"));
}

#[tokio::test]
async fn test_dropped_stream_abandons_pending_subtrees() {
    let finished = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&finished);
    let server = TandemApp::new("abort")
        .page("/slow", move |_cx: &RequestContext| {
            let flag = Arc::clone(&flag);
            Node::fragment([
                Node::text("shell"),
                Node::server("Slow", move || {
                    let flag = Arc::clone(&flag);
                    async move {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        flag.store(true, Ordering::SeqCst);
                        Ok(Node::text("late"))
                    }
                }),
            ])
        })
        .build()
        .await
        .unwrap();

    let response = server.handle(get("/slow?_rsc")).await;
    assert!(response.body().is_stream());
    let mut chunks = response.into_body().into_stream();
    let shell = chunks.next().await.unwrap();
    assert!(!shell.is_empty());
    drop(chunks);

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(!finished.load(Ordering::SeqCst));
}

// === Action Tests ===

#[tokio::test]
async fn test_increment_counter_action() {
    let server = server().await;

    let response = server
        .handle(post_action(json!({"referenceId": "actions#incrementCounter", "args": [5]})))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    let envelope: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(envelope, json!({"kind": "value", "payload": 6}));
}

#[tokio::test]
async fn test_unknown_action_reference() {
    let server = server().await;

    let response = server
        .handle(post_action(json!({"referenceId": "actions#missing", "args": []})))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let envelope: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(envelope["kind"], "error");
    assert_eq!(envelope["payload"]["code"], "unknown_reference");
}

#[tokio::test]
async fn test_malformed_action_body() {
    let server = server().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/_action")
        .body(b"not json".to_vec())
        .unwrap();

    let response = server.handle(request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// === SSR Bridge Tests ===

#[tokio::test]
async fn test_document_hydrates_against_stream() {
    let server = server().await;

    let document = server.handle(get("/counter")).await;
    assert_eq!(document.status(), StatusCode::OK);
    let html = body_text(document).await;
    assert!(html.contains("<!--tandem:island:btn#Counter-->"));
    assert!(html.contains("count: 0"));
    assert_eq!(markup_islands(&html).unwrap(), vec!["btn#Counter"]);

    let frames = frames(server.handle(get("/counter?_rsc")).await).await;
    let root = decode(frames).root().wait().await.unwrap();
    let cache = counting_cache(Arc::new(AtomicUsize::new(0)));
    let mounted = hydrate(&html, &root, &cache).await.unwrap();

    assert_eq!(mounted.islands().len(), 1);
    assert_eq!(mounted.islands()[0].state(), &json!({"count": 0}));

    let empty = "<main></main>";
    assert!(matches!(
        hydrate(empty, &root, &cache).await,
        Err(ClientError::Hydration(_))
    ));
}

#[tokio::test]
async fn test_pass_shapes_agree_and_mismatch_is_detected() {
    let server = server().await;
    let cx = RequestContext::new(Method::GET, "/counter");

    let ssr = server.ssr().render(&counter_page(&cx), &cx).await.unwrap();
    let primary = server
        .renderer()
        .render_to_frames(counter_page(&cx), &cx)
        .await
        .unwrap();
    assert!(check_shapes(&ssr, &primary).is_ok());

    let doubled = Node::fragment([counter_page(&cx), Node::client("btn#Counter", json!({"count": 1}))]);
    let primary = server.renderer().render_to_frames(doubled, &cx).await.unwrap();
    let err = check_shapes(&ssr, &primary).unwrap_err();

    assert!(matches!(err, RenderError::Mismatch(_)));
    assert!(matches!(TandemError::from(err), TandemError::HydrationMismatch(_)));
}

// === Isolation Tests ===

#[tokio::test]
async fn test_concurrent_requests_do_not_share_state() {
    let server = server().await;

    let (alice, bob) = tokio::join!(
        server.handle(get("/echo/alice?_rsc")),
        server.handle(get("/echo/bob?_rsc")),
    );
    let (alice, bob) = tokio::join!(body_text(alice), body_text(bob));

    assert!(alice.contains("hello alice"));
    assert!(!alice.contains("bob"));
    assert!(bob.contains("hello bob"));
    assert!(!bob.contains("alice"));
}

#[tokio::test]
async fn test_session_cookie_issued_with_storage() {
    let server = app()
        .with_storage(Arc::new(MemoryStore::new()))
        .build()
        .await
        .unwrap();

    let response = server.handle(get("/items/1")).await;
    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    assert!(cookie.starts_with(&format!("{}=sess_", SESSION_COOKIE)));

    let returning = Request::builder()
        .uri("/items/1")
        .header(header::COOKIE, format!("{}=sess_known", SESSION_COOKIE))
        .body(Vec::new())
        .unwrap();
    let response = server.handle(returning).await;
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}
