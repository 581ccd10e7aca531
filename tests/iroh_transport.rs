//! Sessions over real iroh endpoints bound in-process.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::{HeaderValue, Request, StatusCode};
use iroh::discovery::static_provider::StaticProvider;
use iroh::endpoint::BindError;
use iroh::protocol::Router;
use iroh::{Endpoint, EndpointId};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use peer_http_bridge::forward::Forward;
use peer_http_bridge::http::{fetch, DecodedRequest, ResponseSink};
use peer_http_bridge::net::iroh::IrohAcceptor;
use peer_http_bridge::net::{Bridge, PeerIdentity, SessionSettings};
use peer_http_bridge::security::AllowList;

const ALPN: &[u8] = b"/http-bridge/test/1";

#[derive(Debug)]
struct WhoAmI;

impl Forward for WhoAmI {
    fn forward<'a>(&'a self, req: DecodedRequest, sink: &'a mut ResponseSink) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let peer = req
                .extensions()
                .get::<PeerIdentity>()
                .map(|p| p.to_string())
                .unwrap_or_default();
            sink.headers_mut()
                .insert("x-peer", HeaderValue::from_str(&peer).unwrap());
            sink.write_body(format!("hello from {}", req.uri().path()).as_bytes());
        })
    }
}

async fn bind_endpoint() -> Result<Endpoint, BindError> {
    static STATIC_DISCOVERY: OnceLock<StaticProvider> = OnceLock::new();
    let discovery = STATIC_DISCOVERY.get_or_init(StaticProvider::default);
    let endpoint = Endpoint::empty_builder(iroh::RelayMode::Disabled)
        .discovery(discovery.clone())
        .bind()
        .await?;
    discovery.add_endpoint_info(endpoint.addr());
    Ok(endpoint)
}

async fn spawn_bridge(allowed: &[String]) -> (Router, EndpointId) {
    let bridge = Bridge::new(
        AllowList::new(allowed).unwrap(),
        Arc::new(WhoAmI),
        SessionSettings::default(),
    );
    let endpoint = bind_endpoint().await.unwrap();
    let router = Router::builder(endpoint)
        .accept(ALPN, IrohAcceptor::new(bridge))
        .spawn();
    let endpoint_id = router.endpoint().id();
    (router, endpoint_id)
}

#[tokio::test]
async fn allowed_endpoint_is_served_and_others_get_silence() {
    let allowed = bind_endpoint().await.unwrap();
    let stranger = bind_endpoint().await.unwrap();
    let (router, bridge_id) = spawn_bridge(&[allowed.id().to_string()]).await;

    let conn = allowed.connect(bridge_id, ALPN).await.unwrap();
    let (send, recv) = conn.open_bi().await.unwrap();
    let mut stream = tokio::io::join(recv, send);
    let req = Request::builder()
        .uri("/status")
        .header("host", "bridge")
        .body(Bytes::new())
        .unwrap();
    let resp = tokio::time::timeout(Duration::from_secs(10), fetch(&mut stream, req))
        .await
        .expect("allowed endpoint got no response")
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-peer"], allowed.id().to_string());
    assert_eq!(resp.body().as_ref(), b"hello from /status");

    let conn = stranger.connect(bridge_id, ALPN).await.unwrap();
    let (send, recv) = conn.open_bi().await.unwrap();
    let mut stream = tokio::io::join(recv, send);
    stream
        .write_all(b"GET /status HTTP/1.1\r\nHost: bridge\r\n\r\n")
        .await
        .unwrap();
    stream.shutdown().await.unwrap();
    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut out))
        .await
        .expect("bridge did not close the stream")
        .unwrap();
    assert!(out.is_empty());

    tokio::time::timeout(Duration::from_secs(10), router.shutdown())
        .await
        .expect("router shutdown hung")
        .unwrap();
}

#[tokio::test]
async fn each_stream_on_a_connection_is_its_own_session() {
    let client = bind_endpoint().await.unwrap();
    let (router, bridge_id) = spawn_bridge(&["*".to_string()]).await;

    let conn = client.connect(bridge_id, ALPN).await.unwrap();
    for path in ["/one", "/two"] {
        let (send, recv) = conn.open_bi().await.unwrap();
        let mut stream = tokio::io::join(recv, send);
        let req = Request::builder()
            .uri(path)
            .header("host", "bridge")
            .body(Bytes::new())
            .unwrap();
        let resp = tokio::time::timeout(Duration::from_secs(10), fetch(&mut stream, req))
            .await
            .expect("no response")
            .unwrap();
        assert_eq!(resp.body().as_ref(), format!("hello from {path}").as_bytes());
    }

    tokio::time::timeout(Duration::from_secs(10), router.shutdown())
        .await
        .expect("router shutdown hung")
        .unwrap();
}
