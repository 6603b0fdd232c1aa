//! Fatal, caller-visible errors (error tier 3 of the design). Wire-level
//! failures never reach here — see [`curvecp_types::DiscardReason`], which
//! has no `Display` impl on purpose.

/// Errors returned to the `Listener`/`dial` caller. These never correspond
/// to anything sent on the wire.
#[derive(Debug, thiserror::Error)]
pub enum CurveCpError {
    #[error("handshake did not complete within the 60s deadline")]
    ConnectionTimeout,

    #[error("network error: {0}")]
    NetworkError(#[source] std::io::Error),

    #[error("caller-supplied key is invalid")]
    InvalidKey,

    #[error("session was closed")]
    Closed,
}
