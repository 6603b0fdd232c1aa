//! The seam between a CurveCP session's decrypted byte stream and whatever
//! application sits behind it (§4.9). `curvecp-core` never interprets the
//! stream body itself — no Message-format framing, no ordering beyond the
//! nonce-counter monotonicity already enforced by [`crate::session::Session`]
//! — it only hands plaintext bytes across this trait in both directions.

/// Implemented by the application side of a CurveCP connection.
///
/// Both methods must return promptly: the reactor calls them inline from its
/// single-threaded event loop, so a blocking implementation stalls every
/// other session it is driving.
pub trait StreamBridge {
    /// A plaintext datagram arrived from the peer, already authenticated and
    /// replay-checked. `data` is the opaque payload carried inside a
    /// ClientMessage or ServerMessage body (or an Initiate's trailing bytes,
    /// for the first message from a client).
    fn on_plaintext_in(&mut self, data: &[u8]);

    /// The reactor is ready to send another datagram for this session; return
    /// the next chunk of outbound plaintext, or `None` if there is nothing to
    /// send right now. Each call should be cheap — this is polled, not
    /// blocked on.
    fn poll_plaintext_out(&mut self) -> Option<Vec<u8>>;

    /// The session has ended, successfully or not. No further calls to
    /// either method above will follow.
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct EchoBridge {
        inbox: VecDeque<Vec<u8>>,
        closed: bool,
    }

    impl StreamBridge for EchoBridge {
        fn on_plaintext_in(&mut self, data: &[u8]) {
            self.inbox.push_back(data.to_vec());
        }

        fn poll_plaintext_out(&mut self) -> Option<Vec<u8>> {
            self.inbox.pop_front()
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    #[test]
    fn echo_bridge_round_trips_and_closes() {
        let mut bridge = EchoBridge {
            inbox: VecDeque::new(),
            closed: false,
        };
        bridge.on_plaintext_in(b"ping");
        assert_eq!(bridge.poll_plaintext_out(), Some(b"ping".to_vec()));
        assert_eq!(bridge.poll_plaintext_out(), None);
        bridge.close();
        assert!(bridge.closed);
    }
}
