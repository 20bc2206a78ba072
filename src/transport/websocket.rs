//! WebSocket server and per-connection lifecycle.
//!
//! Each accepted socket goes through:
//!
//! 1. health probe check on the raw request path (answered with `200 OK`,
//!    no upgrade, no identity extraction)
//! 2. handshake, during which the identity extractor runs; no identity means
//!    the attempt is dropped without writing anything back
//! 3. registration under the identity, then waiting until the peer or the
//!    process closes the socket
//! 4. guarded deregistration, so a replaced connection never removes the
//!    connection that replaced it

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};
use tracing::{debug, info, warn};
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::protocol::Message as WsMessage;

use crate::auth::IdentityExtractor;
use crate::client::{Connection, OUTBOUND_QUEUE_CAPACITY};
use crate::registry::{Identity, Registry};
use crate::transport::stream::{HandshakeStream, read_request_head, request_path};
use crate::utils::GatewayError;

/// Time a client gets to send its complete handshake request.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

const HEALTH_RESPONSE: &[u8] =
    b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\nConnection: close\r\n\r\nOK";

/// Outcome of the handshake callback.
enum Handshake {
    Pending,
    Rejected,
    Identified(Identity),
}

/// Everything a connection task needs. Cloned into every task.
#[derive(Clone)]
pub struct Gateway {
    registry: Arc<Registry>,
    extractor: Arc<dyn IdentityExtractor>,
    health_check_path: Arc<str>,
}

impl Gateway {
    pub fn new(
        registry: Arc<Registry>,
        extractor: Arc<dyn IdentityExtractor>,
        health_check_path: &str,
    ) -> Self {
        Self {
            registry,
            extractor,
            health_check_path: Arc::from(health_check_path),
        }
    }

    async fn handle_connection(self, mut stream: TcpStream, peer: SocketAddr) {
        let head = tokio::time::timeout(HANDSHAKE_TIMEOUT, read_request_head(&mut stream)).await;
        let head = match head {
            Ok(Ok(head)) => head,
            Ok(Err(e)) => {
                debug!("Could not read request from {peer}: {e}");
                return;
            }
            Err(_) => {
                debug!("Handshake from {peer} timed out");
                return;
            }
        };

        if request_path(&head) == Some(&*self.health_check_path) {
            if let Err(e) = answer_health_probe(&mut stream).await {
                debug!("Failed to answer health probe from {peer}: {e}");
            }
            return;
        }

        let muted = Arc::new(AtomicBool::new(false));
        let stream = HandshakeStream::new(stream, head, muted.clone());
        let mut outcome = Handshake::Pending;

        let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            match self.extractor.extract(request) {
                Some(identity) => {
                    outcome = Handshake::Identified(identity);
                    Ok(response)
                }
                None => {
                    outcome = Handshake::Rejected;
                    muted.store(true, Ordering::SeqCst);
                    Err(ErrorResponse::new(None))
                }
            }
        };

        let result = accept_hdr_async(stream, callback).await;
        match (result, outcome) {
            (Ok(ws_stream), Handshake::Identified(identity)) => {
                self.run_connection(ws_stream, identity, peer).await;
            }
            (_, Handshake::Rejected) => {
                debug!("Dropped unidentified connection attempt from {peer}");
            }
            (Err(e), _) => {
                debug!("WebSocket handshake error from {peer}: {e}");
            }
            (Ok(_), Handshake::Pending) => {
                warn!("Handshake from {peer} completed without identity check");
            }
        }
    }

    async fn run_connection(
        &self,
        ws_stream: WebSocketStream<HandshakeStream<TcpStream>>,
        identity: Identity,
        peer: SocketAddr,
    ) {
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (tx, mut rx) = mpsc::channel::<WsMessage>(OUTBOUND_QUEUE_CAPACITY);
        let connection = Connection::new(tx);
        let connection_id = connection.id();

        // the registry only borrows a handle: being replaced there must not
        // end the writer, so this task holds one until the peer goes away
        self.registry.register(identity.clone(), connection.clone());
        info!("{identity} connected from {peer} ({connection_id})");

        let mut writer = {
            let identity = identity.clone();
            tokio::spawn(async move {
                while let Some(msg) = rx.recv().await {
                    if let Err(e) = ws_sender.send(msg).await {
                        warn!("Failed to send message to {identity}: {e}");
                        break;
                    }
                }
                let _ = ws_sender.close().await;
            })
        };

        // client frames are not interpreted; reading drives ping/close handling
        let reader = async { while let Some(Ok(_)) = ws_receiver.next().await {} };

        tokio::select! {
            _ = reader => {}
            _ = &mut writer => {}
        }

        self.registry.deregister(&identity, connection_id);
        drop(connection);
        writer.abort();
        info!("{identity} disconnected ({connection_id})");
    }
}

async fn answer_health_probe(stream: &mut TcpStream) -> std::io::Result<()> {
    stream.write_all(HEALTH_RESPONSE).await?;
    stream.shutdown().await
}

/// Binds `addr` and serves connections until the process stops.
pub async fn start_websocket_server(addr: String, gateway: Gateway) -> Result<(), GatewayError> {
    let listener = TcpListener::bind(&addr).await?;
    info!("WebSocket server listening on ws://{addr}");
    serve(listener, gateway).await;
    Ok(())
}

/// Accept loop over an already bound listener.
pub async fn serve(listener: TcpListener, gateway: Gateway) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tokio::spawn(gateway.clone().handle_connection(stream, peer));
            }
            Err(e) => {
                warn!("Failed to accept connection: {e}");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}
