//! The async half of CurveCP (C8): a single UDP socket driven by a
//! `tokio::select!` loop, dispatching datagrams by magic to the sans-I/O
//! state machines in `curvecp-core` and owning the two pieces of real time
//! those machines need — retransmit backoff and the 60s minute-key rotation.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use curvecp_core::client::ClientHandshake;
use curvecp_core::server::Server;
use curvecp_core::{CurveCpError, DiscardReason, PacketKind, PublicKey, SessionId, StaticSecret, StreamBridge};
use curvecp_types::{MAX_UDP_PAYLOAD, SERVER_DOMAIN_LEN};
use curvecp_utils::Backoff;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::net::UdpSocket;
use tokio::time::{self, Instant};
use tracing::trace;

/// Server-side driver: owns the socket, the stateless handshake server, and
/// one `StreamBridge` per established session.
pub struct Listener {
    socket: UdpSocket,
    server: Server,
    bridges: HashMap<SessionId, Box<dyn StreamBridge + Send>>,
    rng: StdRng,
}

impl Listener {
    pub async fn bind(addr: SocketAddr, server_long_term_sk: StaticSecret) -> Result<Self, CurveCpError> {
        let socket = UdpSocket::bind(addr).await.map_err(CurveCpError::NetworkError)?;
        let mut rng = StdRng::from_entropy();
        let server = Server::new(server_long_term_sk, &mut rng);
        Ok(Self {
            socket,
            server,
            bridges: HashMap::new(),
            rng,
        })
    }

    pub fn long_term_public_key(&self) -> PublicKey {
        self.server.long_term_public_key()
    }

    /// Run the accept loop forever. `new_bridge` is called once per newly
    /// established session, never for a retransmitted Initiate.
    pub async fn run(
        &mut self,
        mut new_bridge: impl FnMut(SessionId) -> Box<dyn StreamBridge + Send>,
    ) -> Result<(), CurveCpError> {
        let mut buf = vec![0u8; MAX_UDP_PAYLOAD];
        let mut minute_tick = time::interval(Duration::from_secs(60));
        let mut flush_tick = time::interval(Duration::from_millis(50));

        loop {
            tokio::select! {
                _ = minute_tick.tick() => {
                    self.server.rotate_minute_key(&mut self.rng);
                }
                _ = flush_tick.tick() => {
                    self.flush_outbound().await?;
                }
                res = self.socket.recv_from(&mut buf) => {
                    let (n, peer) = res.map_err(CurveCpError::NetworkError)?;
                    self.handle_datagram(&buf[..n], peer, &mut new_bridge).await?;
                }
            }
        }
    }

    async fn handle_datagram(
        &mut self,
        bytes: &[u8],
        peer: SocketAddr,
        new_bridge: &mut impl FnMut(SessionId) -> Box<dyn StreamBridge + Send>,
    ) -> Result<(), CurveCpError> {
        let kind = match curvecp_core::wire::identify(bytes) {
            Ok(kind) => kind,
            Err(reason) => {
                log_discard(reason);
                return Ok(());
            }
        };

        match kind {
            PacketKind::Hello => match self.server.handle_hello(bytes, &mut self.rng) {
                Ok(cookie) => {
                    self.socket.send_to(&cookie, peer).await.map_err(CurveCpError::NetworkError)?;
                }
                Err(reason) => log_discard(reason),
            },
            PacketKind::Initiate => match self.server.handle_initiate(bytes, peer, &mut self.rng) {
                Ok(outcome) => {
                    let is_new = !self.bridges.contains_key(&outcome.session_id);
                    let bridge = self
                        .bridges
                        .entry(outcome.session_id)
                        .or_insert_with(|| new_bridge(outcome.session_id));
                    if is_new && !outcome.was_duplicate {
                        bridge.on_plaintext_in(&outcome.payload);
                    }
                    if let Some(reply) = bridge.poll_plaintext_out() {
                        if let Ok(packet) = self.server.build_server_message(&outcome.session_id, &reply) {
                            self.socket.send_to(&packet, peer).await.map_err(CurveCpError::NetworkError)?;
                        }
                    }
                }
                Err(reason) => log_discard(reason),
            },
            PacketKind::ClientMessage => match self.server.handle_client_message(bytes) {
                Ok((id, payload)) => {
                    if let Some(bridge) = self.bridges.get_mut(&id) {
                        bridge.on_plaintext_in(&payload);
                    }
                }
                Err(reason) => log_discard(reason),
            },
            PacketKind::Cookie | PacketKind::ServerMessage => {
                // These only ever arrive at a client, never a listener.
                log_discard(DiscardReason::UnknownMagic);
            }
        }
        Ok(())
    }

    /// Give every active bridge a chance to push outbound data.
    async fn flush_outbound(&mut self) -> Result<(), CurveCpError> {
        let mut closed = Vec::new();
        for (id, bridge) in self.bridges.iter_mut() {
            let Some(peer_addr) = self.server.session(id).map(|s| s.peer_addr) else {
                closed.push(*id);
                continue;
            };
            while let Some(payload) = bridge.poll_plaintext_out() {
                match self.server.build_server_message(id, &payload) {
                    Ok(packet) => {
                        self.socket.send_to(&packet, peer_addr).await.map_err(CurveCpError::NetworkError)?;
                    }
                    Err(reason) => log_discard(reason),
                }
            }
        }
        for id in closed {
            if let Some(mut bridge) = self.bridges.remove(&id) {
                bridge.close();
            }
            self.server.close_session(&id);
        }
        Ok(())
    }
}

/// Client-side driver: dial a server, retransmitting Hello then Initiate
/// with jittered backoff until the 60s deadline, then run steady state.
pub async fn connect(
    remote: SocketAddr,
    client_long_term_sk: StaticSecret,
    server_long_term_pk: PublicKey,
    server_domain: [u8; SERVER_DOMAIN_LEN],
    mut bridge: Box<dyn StreamBridge + Send>,
) -> Result<(), CurveCpError> {
    let mut rng = StdRng::from_entropy();
    let socket = UdpSocket::bind("0.0.0.0:0").await.map_err(CurveCpError::NetworkError)?;
    socket.connect(remote).await.map_err(CurveCpError::NetworkError)?;

    let mut client = ClientHandshake::dial(
        client_long_term_sk,
        server_long_term_pk,
        server_domain,
        [0u8; 16],
        [0u8; 16],
        &mut rng,
    );
    let deadline = Instant::now() + Duration::from_secs(60);
    let mut buf = vec![0u8; MAX_UDP_PAYLOAD];

    let mut backoff = Backoff::curvecp_default();
    loop {
        if Instant::now() >= deadline {
            return Err(CurveCpError::ConnectionTimeout);
        }
        let hello = client.build_hello();
        socket.send(&hello).await.map_err(CurveCpError::NetworkError)?;

        let wait = backoff.next_delay(&mut rng).min(deadline.saturating_duration_since(Instant::now()));
        if let Ok(Ok(n)) = time::timeout(wait, socket.recv(&mut buf)).await {
            if client.on_cookie(&buf[..n]).is_ok() {
                break;
            }
        }
    }

    backoff.reset();
    let first_payload = bridge.poll_plaintext_out().unwrap_or_default();
    loop {
        if Instant::now() >= deadline {
            return Err(CurveCpError::ConnectionTimeout);
        }
        let initiate = client
            .build_initiate(&first_payload, &mut rng)
            .map_err(|_| CurveCpError::InvalidKey)?;
        socket.send(&initiate).await.map_err(CurveCpError::NetworkError)?;

        let wait = backoff.next_delay(&mut rng).min(deadline.saturating_duration_since(Instant::now()));
        if let Ok(Ok(n)) = time::timeout(wait, socket.recv(&mut buf)).await {
            if let Ok(plaintext) = client.on_server_message(&buf[..n]) {
                bridge.on_plaintext_in(&plaintext);
                break;
            }
        }
    }

    let mut flush_tick = time::interval(Duration::from_millis(50));
    loop {
        tokio::select! {
            res = socket.recv(&mut buf) => {
                let n = res.map_err(CurveCpError::NetworkError)?;
                if let Ok(plaintext) = client.on_server_message(&buf[..n]) {
                    bridge.on_plaintext_in(&plaintext);
                } else {
                    trace!("servermessage discarded");
                }
            }
            _ = flush_tick.tick() => {
                while let Some(payload) = bridge.poll_plaintext_out() {
                    if let Ok(packet) = client.build_client_message(&payload) {
                        socket.send(&packet).await.map_err(CurveCpError::NetworkError)?;
                    }
                }
            }
        }
    }
}

fn log_discard(reason: DiscardReason) {
    trace!(?reason, "datagram discarded");
}
