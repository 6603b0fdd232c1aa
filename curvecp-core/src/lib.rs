//! Sans-I/O CurveCP handshake and session machinery.
//!
//! Nothing in this crate touches a socket or a clock. Every state machine
//! here takes bytes (or a duration, for backoff) in and bytes (or plaintext)
//! out; `curvecp-reactor` is what actually drives a UDP socket against it.
//! This split exists so the handshake and replay logic can be exercised with
//! plain `#[test]`/`proptest!` cases, no network or async runtime required.

pub mod bridge;
pub mod client;
pub mod error;
pub mod server;
pub mod session;
pub mod table;
pub mod wire;

pub use bridge::StreamBridge;
pub use client::{ClientHandshake, ClientState};
pub use error::CurveCpError;
pub use server::{InitiateOutcome, Server};
pub use session::{Session, SessionId};
pub use table::SessionTable;

pub use curvecp_crypto::{PublicKey, StaticSecret};
pub use curvecp_types::{DiscardReason, PacketKind};
