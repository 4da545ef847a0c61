//! Inbound CoAP over UDP.
//!
//! # Responsibilities
//! - Decode request datagrams into exchanges
//! - Hand exchanges to the proxy resolver
//! - Answer CON requests with a piggybacked ACK, NON requests with NON
//!
//! # Design Decisions
//! - Responses not ready within the piggyback window get an empty ACK first
//!   and follow as a NON message
//! - Malformed datagrams are dropped without a reply

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, oneshot};
use tokio::time;

use crate::coap::codec::Packet;
use crate::coap::exchange::Exchange;
use crate::coap::message::{CoapRequest, CoapResponse, Code, MessageType};
use crate::resolver::ProxyResolver;

const MAX_DATAGRAM: usize = 1152;
const PIGGYBACK_WINDOW: Duration = Duration::from_secs(1);

/// CoAP ingress server.
pub struct CoapServer {
    socket: Arc<UdpSocket>,
    resolver: Arc<ProxyResolver>,
    piggyback_window: Duration,
}

impl CoapServer {
    /// Bind the ingress socket.
    pub async fn bind(addr: &str, resolver: Arc<ProxyResolver>) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket: Arc::new(socket),
            resolver,
            piggyback_window: PIGGYBACK_WINDOW,
        })
    }

    pub fn with_piggyback_window(mut self, window: Duration) -> Self {
        self.piggyback_window = window;
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Serve until the shutdown signal fires.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> io::Result<()> {
        tracing::info!(address = %self.local_addr()?, "CoAP server starting");

        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("CoAP server stopping");
                    break;
                }
                received = self.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, peer)) => self.handle_datagram(&buf[..len], peer),
                        Err(e) => tracing::debug!(error = %e, "CoAP receive error"),
                    }
                }
            }
        }

        tracing::info!("CoAP server stopped");
        Ok(())
    }

    fn handle_datagram(&self, datagram: &[u8], peer: SocketAddr) {
        let packet = match Packet::decode(datagram) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(peer = %peer, error = %e, "Dropping malformed datagram");
                return;
            }
        };

        if packet.code == Code::EMPTY {
            if packet.mtype == MessageType::Confirmable {
                // CoAP ping
                let reset = Packet::empty(MessageType::Reset, packet.message_id);
                tokio::spawn(send(self.socket.clone(), peer, reset));
            }
            return;
        }
        if !packet.code.is_request()
            || !matches!(packet.mtype, MessageType::Confirmable | MessageType::NonConfirmable)
        {
            tracing::debug!(peer = %peer, code = %packet.code, "Ignoring non-request message");
            return;
        }

        let request = CoapRequest {
            method: packet.code,
            mtype: packet.mtype,
            options: packet.options,
            payload: packet.payload,
            destination: None,
        };
        tracing::debug!(peer = %peer, request = %request, "CoAP request received");

        let (exchange, rx) = Exchange::new(request);
        self.resolver.dispatch(exchange.with_source(peer));

        let reply = Reply {
            socket: self.socket.clone(),
            peer,
            confirmable: packet.mtype == MessageType::Confirmable,
            message_id: packet.message_id,
            token: packet.token,
        };
        tokio::spawn(reply.deliver(rx, self.piggyback_window));
    }
}

struct Reply {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    confirmable: bool,
    message_id: u16,
    token: Bytes,
}

impl Reply {
    async fn deliver(self, mut rx: oneshot::Receiver<CoapResponse>, window: Duration) {
        if self.confirmable {
            match time::timeout(window, &mut rx).await {
                Ok(result) => {
                    let packet = self.packet(MessageType::Acknowledgement, self.message_id, result);
                    send(self.socket, self.peer, packet).await;
                    return;
                }
                Err(_) => {
                    let ack = Packet::empty(MessageType::Acknowledgement, self.message_id);
                    send(self.socket.clone(), self.peer, ack).await;
                }
            }
        }

        let result = rx.await;
        let packet = self.packet(MessageType::NonConfirmable, rand::random(), result);
        send(self.socket, self.peer, packet).await;
    }

    fn packet(
        &self,
        mtype: MessageType,
        message_id: u16,
        result: Result<CoapResponse, oneshot::error::RecvError>,
    ) -> Packet {
        let response = result.unwrap_or_else(|_| {
            tracing::error!(peer = %self.peer, "Exchange dropped without a response");
            CoapResponse::new(Code::INTERNAL_SERVER_ERROR)
        });
        Packet {
            mtype,
            code: response.code,
            message_id,
            token: self.token.clone(),
            options: response.options,
            payload: response.payload,
        }
    }
}

async fn send(socket: Arc<UdpSocket>, peer: SocketAddr, packet: Packet) {
    let datagram = match packet.encode() {
        Ok(d) => d,
        Err(e) => {
            tracing::error!(peer = %peer, error = %e, "Failed to encode CoAP response");
            return;
        }
    };
    if let Err(e) = socket.send_to(&datagram, peer).await {
        tracing::warn!(peer = %peer, error = %e, "Failed to send CoAP response");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coap::option;
    use crate::resolver::TargetResource;

    async fn start(window: Duration) -> (SocketAddr, broadcast::Sender<()>) {
        let resolver = ProxyResolver::new().register(Arc::new(TargetResource::new("target")));
        let server = CoapServer::bind("127.0.0.1:0", Arc::new(resolver))
            .await
            .unwrap()
            .with_piggyback_window(window);
        let addr = server.local_addr().unwrap();
        let (tx, rx) = broadcast::channel(1);
        tokio::spawn(server.run(rx));
        (addr, tx)
    }

    fn get(mtype: MessageType, path: &str) -> Packet {
        let mut packet = Packet::empty(mtype, 0x1234);
        packet.code = Code::GET;
        packet.token = Bytes::from_static(&[9, 9]);
        packet.options.push(option::URI_PATH, path.to_string());
        packet
    }

    async fn exchange(addr: SocketAddr, packet: Packet) -> Packet {
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(&packet.encode().unwrap(), addr).await.unwrap();
        let mut buf = [0u8; 1152];
        let (len, _) = time::timeout(Duration::from_secs(5), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        Packet::decode(&buf[..len]).unwrap()
    }

    #[tokio::test]
    async fn confirmable_request_gets_piggybacked_ack() {
        let (addr, _shutdown) = start(PIGGYBACK_WINDOW).await;
        let reply = exchange(addr, get(MessageType::Confirmable, "target")).await;
        assert_eq!(reply.mtype, MessageType::Acknowledgement);
        assert_eq!(reply.message_id, 0x1234);
        assert_eq!(reply.token.as_ref(), &[9, 9]);
        assert_eq!(reply.code, Code::CONTENT);
        assert_eq!(reply.payload.as_ref(), b"Response 1 from resource target");
    }

    #[tokio::test]
    async fn non_confirmable_request_gets_non_response() {
        let (addr, _shutdown) = start(PIGGYBACK_WINDOW).await;
        let reply = exchange(addr, get(MessageType::NonConfirmable, "nothing-here")).await;
        assert_eq!(reply.mtype, MessageType::NonConfirmable);
        assert_eq!(reply.code, Code::NOT_FOUND);
        assert_eq!(reply.token.as_ref(), &[9, 9]);
    }

    #[tokio::test]
    async fn ping_is_answered_with_reset() {
        let (addr, _shutdown) = start(PIGGYBACK_WINDOW).await;
        let reply = exchange(addr, Packet::empty(MessageType::Confirmable, 77)).await;
        assert_eq!(reply.mtype, MessageType::Reset);
        assert_eq!(reply.message_id, 77);
    }
}
