//! Demonstration CurveCP daemon: `curvecpd config.kdl` either listens and
//! echoes back whatever each session sends, or dials a listener and does
//! the same from the other side. Wiring, not a real application — see
//! `curvecp-reactor` for the driver and `curvecp-core` for the protocol.

use std::collections::VecDeque;
use std::net::SocketAddr;

use base64ct::{Base64, Encoding};
use curvecp_core::{PublicKey, SessionId, StaticSecret, StreamBridge};
use curvecp_reactor::Listener;
use curvecp_types::SERVER_DOMAIN_LEN;
use rand::rngs::OsRng;

#[derive(knuffel::Decode)]
struct DaemonConfig {
    #[knuffel(child, unwrap(argument))]
    mode: String,

    #[knuffel(child)]
    listen: Option<ListenConfig>,

    #[knuffel(child)]
    connect: Option<ConnectConfig>,
}

#[derive(knuffel::Decode)]
struct ListenConfig {
    #[knuffel(child, unwrap(argument))]
    bind: String,

    #[knuffel(child, unwrap(argument, bytes))]
    key: Option<Vec<u8>>,
}

#[derive(knuffel::Decode)]
struct ConnectConfig {
    #[knuffel(child, unwrap(argument))]
    remote: String,

    #[knuffel(child, unwrap(argument, bytes))]
    server_key: Vec<u8>,

    #[knuffel(child, unwrap(argument, bytes))]
    key: Option<Vec<u8>>,
}

impl DaemonConfig {
    fn parse() -> Self {
        let path = std::env::args().nth(1).unwrap_or_else(|| "curvecpd.kdl".into());
        let text = std::fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("could not read {path}: {e}"));
        knuffel::parse(&path, &text).unwrap_or_else(|e| panic!("invalid config: {e}"))
    }
}

fn resolve_key(bytes: Option<Vec<u8>>, label: &str) -> StaticSecret {
    match bytes {
        Some(bytes) => {
            let raw: [u8; 32] = bytes.as_slice().try_into().expect("key must be 32 bytes");
            StaticSecret::from(raw)
        }
        None => {
            let secret = StaticSecret::random_from_rng(OsRng);
            println!("{label} generated public key: {}", Base64::encode_string(PublicKey::from(&secret).as_bytes()));
            secret
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt::init();
    let config = DaemonConfig::parse();

    match config.mode.as_str() {
        "listen" => run_listen(config.listen.expect("`listen` block required in listen mode")).await,
        "connect" => run_connect(config.connect.expect("`connect` block required in connect mode")).await,
        other => panic!("unknown mode {other:?}, expected \"listen\" or \"connect\""),
    }
}

async fn run_listen(cfg: ListenConfig) {
    let key = resolve_key(cfg.key, "listener");
    let addr: SocketAddr = cfg.bind.parse().expect("invalid bind address");

    let mut listener = Listener::bind(addr, key).await.expect("failed to bind");
    println!(
        "listening on {addr} with public key {}",
        Base64::encode_string(listener.long_term_public_key().as_bytes())
    );

    listener
        .run(|_id: SessionId| Box::new(EchoBridge::default()) as Box<dyn StreamBridge + Send>)
        .await
        .expect("listener loop failed");
}

async fn run_connect(cfg: ConnectConfig) {
    let remote: SocketAddr = cfg.remote.parse().expect("invalid remote address");
    let server_key: [u8; 32] = cfg.server_key.as_slice().try_into().expect("server-key must be 32 bytes");
    let server_pk = PublicKey::from(server_key);
    let key = resolve_key(cfg.key, "dialer");

    let mut bridge = EchoBridge::default();
    bridge.pending.push_back(b"hello from curvecpd".to_vec());

    curvecp_reactor::connect(remote, key, server_pk, [0u8; SERVER_DOMAIN_LEN], Box::new(bridge))
        .await
        .expect("connection failed");
}

#[derive(Default)]
struct EchoBridge {
    pending: VecDeque<Vec<u8>>,
}

impl StreamBridge for EchoBridge {
    fn on_plaintext_in(&mut self, data: &[u8]) {
        println!("recv: {}", String::from_utf8_lossy(data));
        self.pending.push_back(data.to_vec());
    }

    fn poll_plaintext_out(&mut self) -> Option<Vec<u8>> {
        self.pending.pop_front()
    }

    fn close(&mut self) {
        println!("session closed");
    }
}
