use super::stream::request_path;
use super::{Gateway, serve};
use crate::auth::{BearerToken, IdentityExtractor, TokenVerifier, TrustedParameter};
use crate::config::{Alg, EnvelopeShape};
use crate::registry::{Identity, Registry};
use crate::relay::{BusMessage, Envelope, EventRelay};
use crate::utils::GatewayError;
use futures::channel::mpsc::{UnboundedSender, unbounded};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tungstenite::handshake::server::Request;

const RSA_PRIVATE_KEY: &str = include_str!("../../testdata/rsa_private.pem");
const RSA_PUBLIC_KEY: &str = include_str!("../../testdata/rsa_public.pem");

type BusSender = UnboundedSender<Result<BusMessage, GatewayError>>;

struct TestGateway {
    addr: SocketAddr,
    registry: Arc<Registry>,
    bus: BusSender,
}

async fn start_gateway(extractor: Arc<dyn IdentityExtractor>) -> TestGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let registry = Arc::new(Registry::new());

    tokio::spawn(serve(
        listener,
        Gateway::new(registry.clone(), extractor, "/probe"),
    ));

    let (bus, bus_rx) = unbounded();
    let relay = EventRelay::new(
        registry.clone(),
        Envelope::new(EnvelopeShape::Nested, "user_id"),
    );
    tokio::spawn(async move {
        let _ = relay.run(bus_rx).await;
    });

    TestGateway {
        addr,
        registry,
        bus,
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

fn identity(value: &str) -> Identity {
    Identity::new(value).expect("identity")
}

fn publish(bus: &BusSender, raw: &str) {
    bus.unbounded_send(Ok(BusMessage::Data(raw.as_bytes().to_vec())))
        .expect("bus open");
}

async fn raw_exchange(addr: SocketAddr, request: &str) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream.write_all(request.as_bytes()).await.expect("write");
    let mut response = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut response))
        .await
        .expect("server closed the socket");
    response
}

fn upgrade_request(target: &str) -> String {
    format!(
        "GET {target} HTTP/1.1\r\nHost: localhost\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n\
         Sec-WebSocket-Version: 13\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n"
    )
}

#[derive(Default)]
struct RejectAll {
    calls: AtomicUsize,
}

impl IdentityExtractor for RejectAll {
    fn extract(&self, _request: &Request) -> Option<Identity> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        None
    }
}

#[test]
fn test_request_path_strips_query() {
    assert_eq!(
        request_path(b"GET /probe?x=1 HTTP/1.1\r\nHost: a\r\n\r\n"),
        Some("/probe")
    );
    assert_eq!(request_path(b"GET / HTTP/1.1\r\n\r\n"), Some("/"));
    assert_eq!(request_path(b"garbage"), None);
}

#[tokio::test]
async fn test_health_probe_bypasses_identity_extraction() {
    let extractor = Arc::new(RejectAll::default());
    let gateway = start_gateway(extractor.clone()).await;

    let plain = raw_exchange(gateway.addr, "GET /probe HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
    let upgrade = raw_exchange(gateway.addr, &upgrade_request("/probe")).await;

    for response in [plain, upgrade] {
        let response = String::from_utf8(response).expect("utf8 response");
        assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
        assert!(response.ends_with("OK"));
    }
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    assert!(gateway.registry.is_empty());
}

#[tokio::test]
async fn test_rejected_handshake_gets_no_response() {
    let extractor = Arc::new(RejectAll::default());
    let gateway = start_gateway(extractor.clone()).await;

    let response = raw_exchange(gateway.addr, &upgrade_request("/?remote-user-id=x")).await;
    assert!(response.is_empty(), "unexpected bytes: {response:?}");
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
    assert!(gateway.registry.is_empty());
}

#[tokio::test]
async fn test_trusted_parameter_end_to_end() {
    let gateway = start_gateway(Arc::new(TrustedParameter::query("remote-user-id"))).await;
    let user = "3f29a1c0-5b8e-4d2f-9c1a-7e6b5d4c3b2a";

    let url = format!("ws://{}/?remote-user-id={user}", gateway.addr);
    let (mut ws, _) = connect_async(url).await.expect("handshake");
    let registry = gateway.registry.clone();
    wait_until(|| registry.get(&identity(user)).is_some()).await;

    let raw = format!(r#"{{"payload": {{"user_id": "{user}", "msg": "done"}}}}"#);
    publish(&gateway.bus, r#"{"payload": {"user_id": "somebody-else", "msg": "nope"}}"#);
    publish(&gateway.bus, &raw);

    match ws.next().await {
        Some(Ok(WsMessage::Text(text))) => assert_eq!(text.as_str(), raw),
        other => panic!("Expected the event, got {other:?}"),
    }
    let extra = tokio::time::timeout(Duration::from_millis(200), ws.next()).await;
    assert!(extra.is_err(), "event delivered more than once: {extra:?}");
}

#[tokio::test]
async fn test_garbage_token_never_connects() {
    let verifier =
        TokenVerifier::from_pem(RSA_PUBLIC_KEY.as_bytes(), &[Alg::RS256]).expect("verifier");
    let gateway = start_gateway(Arc::new(BearerToken::new("token", verifier))).await;

    let url = format!("ws://{}/?token=garbage.not.valid", gateway.addr);
    assert!(connect_async(url).await.is_err());
    assert!(gateway.registry.is_empty());
}

#[tokio::test]
async fn test_valid_token_connects_as_subject() {
    let verifier =
        TokenVerifier::from_pem(RSA_PUBLIC_KEY.as_bytes(), &[Alg::RS256]).expect("verifier");
    let gateway = start_gateway(Arc::new(BearerToken::new("token", verifier))).await;
    let key = EncodingKey::from_rsa_pem(RSA_PRIVATE_KEY.as_bytes()).expect("private key");
    let token = encode(&Header::new(Algorithm::RS256), &json!({"sub": "a1"}), &key)
        .expect("sign token");

    let url = format!("ws://{}/?token={token}", gateway.addr);
    let (mut ws, _) = connect_async(url).await.expect("handshake");
    let registry = gateway.registry.clone();
    wait_until(|| registry.get(&identity("a1")).is_some()).await;

    publish(&gateway.bus, r#"{"payload": {"user_id": "a1"}}"#);
    match ws.next().await {
        Some(Ok(WsMessage::Text(text))) => assert_eq!(text.as_str(), r#"{"payload": {"user_id": "a1"}}"#),
        other => panic!("Expected the event, got {other:?}"),
    }
}

#[tokio::test]
async fn test_closing_removes_registration() {
    let gateway = start_gateway(Arc::new(TrustedParameter::query("remote-user-id"))).await;

    let url = format!("ws://{}/?remote-user-id=leaving", gateway.addr);
    let (mut ws, _) = connect_async(url).await.expect("handshake");
    let registry = gateway.registry.clone();
    wait_until(|| registry.len() == 1).await;

    ws.close(None).await.expect("close");
    drop(ws);
    wait_until(|| registry.is_empty()).await;
}

#[tokio::test]
async fn test_replaced_connection_closing_keeps_replacement() {
    let gateway = start_gateway(Arc::new(TrustedParameter::query("remote-user-id"))).await;
    let url = format!("ws://{}/?remote-user-id=U", gateway.addr);
    let registry = gateway.registry.clone();

    let (mut first, _) = connect_async(url.clone()).await.expect("first handshake");
    wait_until(|| registry.get(&identity("U")).is_some()).await;
    let first_id = registry.get(&identity("U")).map(|c| c.id());

    let (mut second, _) = connect_async(url).await.expect("second handshake");
    wait_until(|| registry.get(&identity("U")).map(|c| c.id()) != first_id).await;
    let second_id = registry.get(&identity("U")).map(|c| c.id());

    // the replaced connection is left open and quiet
    let orphan = tokio::time::timeout(Duration::from_millis(300), first.next()).await;
    assert!(orphan.is_err(), "replaced connection got a frame: {orphan:?}");

    first.close(None).await.expect("close first");
    drop(first);
    // give the first handler time to run its teardown
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(registry.get(&identity("U")).map(|c| c.id()), second_id);

    publish(&gateway.bus, r#"{"payload": {"user_id": "U", "n": 1}}"#);
    match second.next().await {
        Some(Ok(WsMessage::Text(text))) => assert!(text.as_str().contains(r#""n": 1"#)),
        other => panic!("Expected the event, got {other:?}"),
    }
    second.close(None).await.expect("close second");
}

#[tokio::test]
async fn test_replaced_connection_stays_open_until_peer_closes() {
    let gateway = start_gateway(Arc::new(TrustedParameter::query("remote-user-id"))).await;
    let url = format!("ws://{}/?remote-user-id=U", gateway.addr);
    let registry = gateway.registry.clone();

    let (mut first, _) = connect_async(url.clone()).await.expect("first handshake");
    wait_until(|| registry.get(&identity("U")).is_some()).await;
    let first_id = registry.get(&identity("U")).map(|c| c.id());

    let (_second, _) = connect_async(url).await.expect("second handshake");
    wait_until(|| registry.get(&identity("U")).map(|c| c.id()) != first_id).await;

    let orphan = tokio::time::timeout(Duration::from_millis(500), first.next()).await;
    assert!(orphan.is_err(), "replaced connection was closed: {orphan:?}");

    // still a working socket: a ping is answered by the server
    first
        .send(WsMessage::Ping(Vec::new().into()))
        .await
        .expect("orphan accepts frames");
    match tokio::time::timeout(Duration::from_secs(2), first.next()).await {
        Ok(Some(Ok(WsMessage::Pong(_)))) => {}
        other => panic!("Expected a pong, got {other:?}"),
    }
}
