use std::net::SocketAddr;

use fastls::server::grpc::pb;
use fastls::server::grpc::FastlsServiceClient;
use fastls::server::{GrpcServer, HttpServer, RpcServer};
use fastls::{FetchExecutor, FetchRequest, FetchResult};
use serde_json::{json, Value};
use tokio::net::TcpListener;

mod helpers;
use helpers::mock_server::{MockHttpServer, MockResponse};

async fn start_http_api() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(HttpServer::new(addr, FetchExecutor::default()).serve(listener));
    addr
}

async fn start_rpc_api() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(RpcServer::new(addr, FetchExecutor::default()).serve(listener));
    addr
}

async fn start_origin() -> String {
    let origin = MockHttpServer::new().await.unwrap();
    let url = format!("{}/echo", origin.url());
    origin.start(MockResponse::echo);
    url
}

/// The engine doubles as the test client for its own front ends.
async fn post_json(url: String, document: Value) -> FetchResult {
    let request = FetchRequest::new(url)
        .method("POST")
        .header("Content-Type", "application/json")
        .body(document.to_string());
    FetchExecutor::default().execute(&request).await
}

fn body_json(result: &FetchResult) -> Value {
    serde_json::from_slice(&result.body).unwrap()
}

#[tokio::test]
async fn test_http_fetch_round_trip() {
    helpers::init_tracing();
    let api = start_http_api().await;
    let origin = start_origin().await;

    let result = post_json(
        format!("http://{}/fetch", api),
        json!({
            "url": origin,
            "method": "POST",
            "headers": {"Content-Type": "application/json"},
            "body": "{\"key\":\"value\"}",
        }),
    )
    .await;

    assert_eq!(result.status, 200);
    assert_eq!(result.headers.get("access-control-allow-origin"), Some("*"));
    let document = body_json(&result);
    assert_eq!(document["ok"], json!(true));
    assert_eq!(document["status"], json!(200));
    assert_eq!(document["body"], json!("{\"key\":\"value\"}"));
}

#[tokio::test]
async fn test_http_fetch_failure_is_200() {
    let api = start_http_api().await;
    let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = format!("http://{}/", closed.local_addr().unwrap());
    drop(closed);

    let result = post_json(format!("http://{}/fetch", api), json!({"url": dead})).await;

    assert_eq!(result.status, 200);
    let document = body_json(&result);
    assert_eq!(document["ok"], json!(false));
    assert_eq!(document["status"], json!(0));
    assert_eq!(document["errorKind"], json!("connect"));
}

#[tokio::test]
async fn test_http_validation_and_malformed() {
    let api = start_http_api().await;

    let invalid = post_json(
        format!("http://{}/fetch", api),
        json!({"url": "https://example.com", "browser": "chrome", "fingerprint": {"type": "ja3", "value": "771,4865,0,29,0"}}),
    )
    .await;
    assert_eq!(invalid.status, 400);
    assert_eq!(body_json(&invalid)["errorKind"], json!("validation"));

    let request = FetchRequest::new(format!("http://{}/fetch", api))
        .method("POST")
        .body("{not json");
    let malformed = FetchExecutor::default().execute(&request).await;
    assert_eq!(malformed.status, 400);
    assert_eq!(body_json(&malformed)["ok"], json!(false));
}

#[tokio::test]
async fn test_http_health_preflight_and_not_found() {
    let api = start_http_api().await;
    let executor = FetchExecutor::default();

    let health = executor
        .execute(&FetchRequest::new(format!("http://{}/health", api)))
        .await;
    assert_eq!(health.status, 200);
    assert_eq!(body_json(&health), json!({"status": "ok"}));

    let preflight = executor
        .execute(&FetchRequest::new(format!("http://{}/fetch", api)).method("OPTIONS"))
        .await;
    assert_eq!(preflight.status, 204);
    assert_eq!(
        preflight.headers.get("access-control-allow-methods"),
        Some("POST, OPTIONS, GET, PUT, DELETE")
    );

    let missing = executor
        .execute(&FetchRequest::new(format!("http://{}/nope", api)))
        .await;
    assert_eq!(missing.status, 404);
}

#[tokio::test]
async fn test_rpc_fetch_and_errors() {
    let api = start_rpc_api().await;
    let origin = start_origin().await;
    let rpc = format!("http://{}/rpc", api);

    let reply = post_json(
        rpc.clone(),
        json!({"jsonrpc": "2.0", "method": "fetch", "params": {"url": origin, "method": "POST", "body": "hi"}, "id": 9}),
    )
    .await;
    assert_eq!(reply.status, 200);
    let document = body_json(&reply);
    assert_eq!(document["id"], json!(9));
    assert_eq!(document["result"]["ok"], json!(true));
    assert_eq!(document["result"]["body"], json!("hi"));

    let reply = post_json(
        rpc.clone(),
        json!({"jsonrpc": "2.0", "method": "explode", "id": 10}),
    )
    .await;
    assert_eq!(reply.status, 200);
    assert_eq!(body_json(&reply)["error"]["code"], json!(-32601));

    let request = FetchRequest::new(rpc).method("POST").body("{oops");
    let reply = FetchExecutor::default().execute(&request).await;
    assert_eq!(reply.status, 200);
    let document = body_json(&reply);
    assert_eq!(document["error"]["code"], json!(-32700));
    assert_eq!(document["id"], Value::Null);
}

#[tokio::test]
async fn test_grpc_fetch_and_health() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(GrpcServer::new(addr, FetchExecutor::default()).serve(listener));
    let origin = start_origin().await;

    let mut client = FastlsServiceClient::connect(format!("http://{}", addr))
        .await
        .unwrap();

    let health = client.health(pb::HealthRequest {}).await.unwrap();
    assert_eq!(health.into_inner().status, "ok");

    let response = client
        .fetch(pb::FetchRequest {
            url: origin,
            method: "POST".into(),
            headers: vec![pb::Header {
                name: "Content-Type".into(),
                value: "application/octet-stream".into(),
            }],
            body: vec![0u8, 159, 146, 150].into(),
            ..Default::default()
        })
        .await
        .unwrap()
        .into_inner();
    assert!(response.ok);
    assert_eq!(response.status, 200);
    assert_eq!(&response.body[..], &[0u8, 159, 146, 150]);
    assert!(response
        .headers
        .iter()
        .any(|h| h.name.eq_ignore_ascii_case("content-type")
            && h.values == ["application/octet-stream"]));

    let status = client
        .fetch(pb::FetchRequest {
            url: "ftp://example.com/".into(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::InvalidArgument);
}
