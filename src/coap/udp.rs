//! Minimal UDP message layer for outbound requests.
//!
//! # Responsibilities
//! - Bind an ephemeral socket per address family on first use
//! - Correlate responses by token and empty ACK/RST by message ID
//! - Retransmit CON requests with a doubling ACK timeout
//!
//! # Design Decisions
//! - No deduplication, block-wise transfer or observe
//! - IPv4 destinations are preferred when a host resolves to both families
//! - Receive errors back off exponentially instead of spinning
//! - Dropping the last handle aborts the receive loop

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use dashmap::DashMap;
use rand::Rng;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, OnceCell};
use tokio::task::JoinHandle;
use tokio::time;

use crate::coap::codec::Packet;
use crate::coap::endpoint::{CoapEndpoint, MessageObserver};
use crate::coap::message::{CoapRequest, CoapResponse, Code, MessageType};

const MAX_DATAGRAM: usize = 1152;
const TOKEN_LEN: usize = 4;
const RECV_BACKOFF_BASE: Duration = Duration::from_millis(10);
const RECV_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Retransmission parameters (RFC 7252 §4.8).
#[derive(Debug, Clone, Copy)]
pub struct TransmissionParams {
    pub ack_timeout: Duration,
    pub max_retransmit: u32,
}

impl TransmissionParams {
    /// How long to wait for a response once the request is known to have arrived.
    fn response_timeout(&self) -> Duration {
        self.ack_timeout * 2u32.saturating_pow(self.max_retransmit + 1)
    }
}

impl Default for TransmissionParams {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(2),
            max_retransmit: 4,
        }
    }
}

#[derive(Debug)]
enum Event {
    Ack,
    Reset,
    Response(Packet),
}

#[derive(Default)]
struct Shared {
    by_token: DashMap<Bytes, mpsc::UnboundedSender<Event>>,
    by_message_id: DashMap<u16, Bytes>,
}

struct Inner {
    params: TransmissionParams,
    next_message_id: AtomicU16,
    shared: Arc<Shared>,
    socket_v4: OnceCell<Arc<UdpSocket>>,
    socket_v6: OnceCell<Arc<UdpSocket>>,
    recv_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Ok(mut tasks) = self.recv_tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}

/// A CoAP endpoint sending over its own UDP socket.
#[derive(Clone)]
pub struct UdpEndpoint {
    inner: Arc<Inner>,
}

impl UdpEndpoint {
    /// Create an endpoint; sockets are bound lazily on the first request
    /// to a peer of each address family.
    pub fn new(params: TransmissionParams) -> Self {
        Self {
            inner: Arc::new(Inner {
                params,
                next_message_id: AtomicU16::new(rand::thread_rng().gen()),
                shared: Arc::new(Shared::default()),
                socket_v4: OnceCell::new(),
                socket_v6: OnceCell::new(),
                recv_tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    async fn socket(&self, peer: SocketAddr) -> std::io::Result<Arc<UdpSocket>> {
        let (cell, bind_addr) = if peer.is_ipv4() {
            (&self.inner.socket_v4, "0.0.0.0:0")
        } else {
            (&self.inner.socket_v6, "[::]:0")
        };
        let socket = cell
            .get_or_try_init(|| async {
                let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
                let task = tokio::spawn(receive_loop(socket.clone(), self.inner.shared.clone()));
                if let Ok(mut tasks) = self.inner.recv_tasks.lock() {
                    tasks.push(task);
                }
                tracing::debug!(local_addr = ?socket.local_addr().ok(), "CoAP endpoint bound");
                Ok::<_, std::io::Error>(socket)
            })
            .await?;
        Ok(socket.clone())
    }

    async fn exchange(&self, request: CoapRequest, observer: Box<dyn MessageObserver>) {
        let Some(destination) = request.destination.clone() else {
            tracing::warn!(request = %request, "Request has no destination");
            observer.on_reject();
            return;
        };

        let peer = match resolve(&destination.host, destination.port).await {
            Some(addr) => addr,
            None => {
                tracing::warn!(host = %destination.host, "Could not resolve CoAP destination");
                observer.on_reject();
                return;
            }
        };

        let socket = match self.socket(peer).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Failed to bind CoAP endpoint socket");
                observer.on_reject();
                return;
            }
        };

        let token = Bytes::from(rand::thread_rng().gen::<[u8; TOKEN_LEN]>().to_vec());
        let message_id = self.inner.next_message_id.fetch_add(1, Ordering::Relaxed);
        let packet = Packet {
            mtype: request.mtype,
            code: request.method,
            message_id,
            token: token.clone(),
            options: request.options,
            payload: request.payload,
        };
        let datagram = match packet.encode() {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode CoAP request");
                observer.on_reject();
                return;
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        self.inner.shared.by_token.insert(token.clone(), tx);
        self.inner.shared.by_message_id.insert(message_id, token.clone());

        let outcome = self
            .transmit(&socket, peer, &datagram, packet.mtype, &mut rx, observer.as_ref())
            .await;

        self.inner.shared.by_token.remove(&token);
        self.inner.shared.by_message_id.remove(&message_id);

        match outcome {
            Outcome::Response(packet) => observer.on_response(CoapResponse {
                code: packet.code,
                options: packet.options,
                payload: packet.payload,
                timestamp: Some(SystemTime::now()),
            }),
            Outcome::Reset => observer.on_reject(),
            Outcome::Timeout => observer.on_timeout(),
            Outcome::Closed => observer.on_cancel(),
        }
    }

    async fn transmit(
        &self,
        socket: &UdpSocket,
        peer: SocketAddr,
        datagram: &[u8],
        mtype: MessageType,
        rx: &mut mpsc::UnboundedReceiver<Event>,
        observer: &dyn MessageObserver,
    ) -> Outcome {
        let params = self.inner.params;
        let mut attempt = 0u32;
        let mut acked = mtype != MessageType::Confirmable;

        if let Err(e) = socket.send_to(datagram, peer).await {
            tracing::warn!(peer = %peer, error = %e, "Failed to send CoAP request");
            return Outcome::Reset;
        }

        loop {
            let wait = if acked {
                params.response_timeout()
            } else {
                params.ack_timeout * 2u32.saturating_pow(attempt)
            };

            match time::timeout(wait, rx.recv()).await {
                Ok(Some(Event::Response(packet))) => return Outcome::Response(packet),
                Ok(Some(Event::Reset)) => return Outcome::Reset,
                Ok(Some(Event::Ack)) => acked = true,
                Ok(None) => return Outcome::Closed,
                Err(_) if acked || attempt >= params.max_retransmit => return Outcome::Timeout,
                Err(_) => {
                    attempt += 1;
                    observer.on_retransmission();
                    if let Err(e) = socket.send_to(datagram, peer).await {
                        tracing::warn!(peer = %peer, error = %e, "Failed to retransmit CoAP request");
                        return Outcome::Reset;
                    }
                }
            }
        }
    }
}

impl CoapEndpoint for UdpEndpoint {
    fn send_request(&self, request: CoapRequest, observer: Box<dyn MessageObserver>) {
        let endpoint = self.clone();
        tokio::spawn(async move {
            endpoint.exchange(request, observer).await;
        });
    }
}

enum Outcome {
    Response(Packet),
    Reset,
    Timeout,
    Closed,
}

async fn resolve(host: &str, port: u16) -> Option<SocketAddr> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port)).await.ok()?.collect();
    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
}

/// Pause after `consecutive` receive errors in a row.
fn recv_backoff(consecutive: u32) -> Duration {
    let factor = 2u32.saturating_pow(consecutive.saturating_sub(1));
    RECV_BACKOFF_BASE.saturating_mul(factor).min(RECV_BACKOFF_MAX)
}

async fn receive_loop(socket: Arc<UdpSocket>, shared: Arc<Shared>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    let mut errors = 0u32;
    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(r) => {
                errors = 0;
                r
            }
            Err(e) => {
                // ICMP errors surface here on some platforms; keep going.
                errors = errors.saturating_add(1);
                let pause = recv_backoff(errors);
                tracing::debug!(error = %e, consecutive = errors, backoff_ms = pause.as_millis() as u64, "CoAP endpoint receive error");
                time::sleep(pause).await;
                continue;
            }
        };

        let packet = match Packet::decode(&buf[..len]) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(peer = %peer, error = %e, "Dropping malformed datagram");
                continue;
            }
        };

        match (packet.mtype, packet.code) {
            (MessageType::Acknowledgement, Code::EMPTY) => {
                notify_by_message_id(&shared, packet.message_id, Event::Ack);
            }
            (MessageType::Reset, _) => {
                notify_by_message_id(&shared, packet.message_id, Event::Reset);
            }
            (mtype, _) => {
                if mtype == MessageType::Confirmable {
                    let ack = Packet::empty(MessageType::Acknowledgement, packet.message_id);
                    if let Ok(datagram) = ack.encode() {
                        let _ = socket.send_to(&datagram, peer).await;
                    }
                }
                let token = packet.token.clone();
                match shared.by_token.get(&token) {
                    Some(tx) => {
                        let _ = tx.send(Event::Response(packet));
                    }
                    None => tracing::debug!(peer = %peer, "Response for unknown token"),
                }
            }
        }
    }
}

fn notify_by_message_id(shared: &Shared, message_id: u16, event: Event) {
    let Some(token) = shared.by_message_id.get(&message_id).map(|t| t.clone()) else {
        return;
    };
    if let Some(tx) = shared.by_token.get(&token) {
        let _ = tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coap::message::Destination;
    use tokio::sync::oneshot;

    struct Observer(Mutex<Option<oneshot::Sender<(String, Option<CoapResponse>)>>>);

    impl Observer {
        fn finish(&self, event: &str, response: Option<CoapResponse>) {
            if let Some(tx) = self.0.lock().unwrap().take() {
                let _ = tx.send((event.to_string(), response));
            }
        }
    }

    impl MessageObserver for Observer {
        fn on_response(self: Box<Self>, response: CoapResponse) {
            self.finish("response", Some(response));
        }
        fn on_reject(self: Box<Self>) {
            self.finish("reject", None);
        }
        fn on_timeout(self: Box<Self>) {
            self.finish("timeout", None);
        }
        fn on_cancel(self: Box<Self>) {
            self.finish("cancel", None);
        }
    }

    fn request_to(addr: SocketAddr) -> CoapRequest {
        let mut request = CoapRequest::get();
        request.destination = Some(Destination {
            scheme: "coap".into(),
            host: addr.ip().to_string(),
            port: addr.port(),
        });
        request
    }

    /// Answer the first request with a piggybacked 2.05.
    fn spawn_piggyback_server(server: UdpSocket) {
        tokio::spawn(async move {
            let mut buf = [0u8; 1152];
            let (len, peer) = server.recv_from(&mut buf).await.unwrap();
            let request = Packet::decode(&buf[..len]).unwrap();
            let mut reply = Packet::empty(MessageType::Acknowledgement, request.message_id);
            reply.code = Code::CONTENT;
            reply.token = request.token;
            reply.payload = Bytes::from_static(b"22.5 C");
            server.send_to(&reply.encode().unwrap(), peer).await.unwrap();
        });
    }

    #[test]
    fn exchange_future_is_send() {
        fn assert_send<T: Send>(_: &T) {}

        let endpoint = UdpEndpoint::new(TransmissionParams::default());
        let (tx, _rx) = oneshot::channel();
        let exchange = endpoint.exchange(
            CoapRequest::get(),
            Box::new(Observer(Mutex::new(Some(tx)))),
        );
        assert_send(&exchange);
    }

    #[test]
    fn receive_backoff_doubles_up_to_cap() {
        assert_eq!(recv_backoff(1), Duration::from_millis(10));
        assert_eq!(recv_backoff(2), Duration::from_millis(20));
        assert_eq!(recv_backoff(4), Duration::from_millis(80));
        assert_eq!(recv_backoff(8), RECV_BACKOFF_MAX);
        assert_eq!(recv_backoff(u32::MAX), RECV_BACKOFF_MAX);
    }

    #[tokio::test]
    async fn piggybacked_response_is_delivered() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();
        spawn_piggyback_server(server);

        let (tx, rx) = oneshot::channel();
        let endpoint = UdpEndpoint::new(TransmissionParams::default());
        endpoint.send_request(request_to(server_addr), Box::new(Observer(Mutex::new(Some(tx)))));

        let (event, response) = rx.await.unwrap();
        assert_eq!(event, "response");
        let response = response.unwrap();
        assert_eq!(response.code, Code::CONTENT);
        assert_eq!(response.payload_text(), "22.5 C");
        assert!(response.timestamp.is_some());
    }

    #[tokio::test]
    async fn ipv6_peer_is_reached() {
        // Hosts without IPv6 loopback have nothing to test.
        let Ok(server) = UdpSocket::bind("[::1]:0").await else {
            return;
        };
        let server_addr = server.local_addr().unwrap();
        spawn_piggyback_server(server);

        let (tx, rx) = oneshot::channel();
        let endpoint = UdpEndpoint::new(TransmissionParams::default());
        endpoint.send_request(request_to(server_addr), Box::new(Observer(Mutex::new(Some(tx)))));

        let (event, response) = rx.await.unwrap();
        assert_eq!(event, "response");
        assert_eq!(response.unwrap().payload_text(), "22.5 C");
    }

    #[tokio::test]
    async fn silent_peer_times_out_after_retransmissions() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let silent_addr = silent.local_addr().unwrap();

        let (tx, rx) = oneshot::channel();
        let endpoint = UdpEndpoint::new(TransmissionParams {
            ack_timeout: Duration::from_millis(20),
            max_retransmit: 2,
        });
        endpoint.send_request(request_to(silent_addr), Box::new(Observer(Mutex::new(Some(tx)))));

        let (event, _) = rx.await.unwrap();
        assert_eq!(event, "timeout");
        drop(silent);
    }

    #[tokio::test]
    async fn reset_is_a_reject() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 1152];
            let (len, peer) = server.recv_from(&mut buf).await.unwrap();
            let request = Packet::decode(&buf[..len]).unwrap();
            let reset = Packet::empty(MessageType::Reset, request.message_id);
            server.send_to(&reset.encode().unwrap(), peer).await.unwrap();
        });

        let (tx, rx) = oneshot::channel();
        let endpoint = UdpEndpoint::new(TransmissionParams::default());
        endpoint.send_request(request_to(server_addr), Box::new(Observer(Mutex::new(Some(tx)))));

        let (event, _) = rx.await.unwrap();
        assert_eq!(event, "reject");
    }
}
