//! End-to-end tests for the standard forwarding path.

use axum::http::StatusCode;

mod common;

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

#[tokio::test]
async fn keep_alive_request_is_forwarded() {
    let (backend, mut requests) = common::start_mock_backend("hello from backend").await;
    let dead = common::closed_port().await;
    let proxy = common::start_proxy(common::proxy_config(backend, &dead.to_string())).await;

    let res = client()
        .get(proxy.url("/items/7?sort=asc"))
        .header("connection", "keep-alive")
        .header("x-custom", "kept")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.headers()["x-backend"], "mock");
    assert_eq!(res.headers()["cache-control"], "no-store");
    assert_eq!(res.headers()["content-length"], "18");
    assert_eq!(res.text().await.unwrap(), "hello from backend");

    let seen = requests.recv().await.unwrap().to_ascii_lowercase();
    assert!(seen.starts_with("get /items/7?sort=asc http/1.1\r\n"));
    assert!(seen.contains("x-custom: kept\r\n"));
    assert!(seen.contains("x-forwarded-for: 127.0.0.1\r\n"));
    assert!(seen.contains("x-request-id: "));
}

#[tokio::test]
async fn request_body_is_streamed() {
    let (backend, mut requests) = common::start_mock_backend("stored").await;
    let dead = common::closed_port().await;
    let proxy = common::start_proxy(common::proxy_config(backend, &dead.to_string())).await;

    let res = client()
        .post(proxy.url("/upload"))
        .body("payload-bytes")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let seen = requests.recv().await.unwrap();
    assert!(seen.ends_with("\r\n\r\npayload-bytes"));
}

#[tokio::test]
async fn dead_backend_is_bad_gateway() {
    let dead_http = common::closed_port().await;
    let dead_upgrade = common::closed_port().await;
    let proxy =
        common::start_proxy(common::proxy_config(dead_http, &dead_upgrade.to_string())).await;

    let res = client().get(proxy.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(res.text().await.unwrap(), "Upstream request failed.\n");
}

#[tokio::test]
async fn unmatched_request_is_not_found() {
    let (backend, _) = common::start_mock_backend("api").await;
    let dead = common::closed_port().await;
    let mut config = common::proxy_config(backend, &dead.to_string());
    config.routes = vec![common::route("api", Some("/api"), &format!("http://{backend}"))];
    let proxy = common::start_proxy(config).await;

    let res = client().get(proxy.url("/api/users")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client().get(proxy.url("/other")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.text().await.unwrap(), "Not found.\n");
}

#[tokio::test]
async fn prefix_is_stripped_when_configured() {
    let (backend, mut requests) = common::start_mock_backend("ok").await;
    let dead = common::closed_port().await;
    let mut config = common::proxy_config(backend, &dead.to_string());
    let mut route = common::route("api", Some("/api"), &format!("http://{backend}"));
    route.strip_prefix = true;
    config.routes = vec![route];
    let proxy = common::start_proxy(config).await;

    let res = client().get(proxy.url("/api/users")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(requests
        .recv()
        .await
        .unwrap()
        .starts_with("GET /users HTTP/1.1\r\n"));
}

#[tokio::test]
async fn malformed_head_is_bad_request() {
    let dead = common::closed_port().await;
    let proxy = common::start_proxy(common::proxy_config(dead, &dead.to_string())).await;

    let mut client = common::send_raw(proxy.addr, "NOT A REQUEST\r\n\r\n").await;
    let response = common::read_response(&mut client).await;
    assert_eq!(response.status, 400);
    assert!(response.head.contains("Connection: close"));
}

#[tokio::test]
async fn serves_on_configured_listener() {
    let (backend, _) = common::start_mock_backend("bound").await;
    let dead = common::closed_port().await;
    let mut config = common::proxy_config(backend, &dead.to_string());
    config.listener.bind_address = "127.0.0.1:0".into();
    let proxy = common::serve_bound(upgrade_proxy::ProxyServer::new(config)).await;

    let res = client().get(proxy.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "bound");
}
