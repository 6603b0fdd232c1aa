//! Small pieces shared between `curvecp-core` and `curvecp-reactor`: a
//! keyed hasher for the session table and the jittered retransmit backoff.

use core::time::Duration;

use ahash::RandomState;
use rand_core::RngCore;

/// Builds an `ahash`-keyed `BuildHasher`, seeded once at listener
/// construction from a CSPRNG. The session table is keyed by a
/// client-controlled short-term public key; without a random per-listener
/// seed, an attacker who knows the hash function could pick keys that all
/// collide into the same bucket.
pub fn session_table_hasher(rng: &mut impl RngCore) -> RandomState {
    RandomState::with_seeds(rng.next_u64(), rng.next_u64(), rng.next_u64(), rng.next_u64())
}

/// Exponential backoff with jitter for Hello/Initiate retransmission.
///
/// Starts at `initial`, doubles on every call to [`Backoff::next_delay`] up to
/// `max`, and multiplies the result by a uniform factor in `[1 - jitter, 1 +
/// jitter]` so that many clients retransmitting after a shared packet loss
/// event don't all collide again on the retry.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    jitter: f64,
    attempt: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, jitter: f64) -> Self {
        assert!((0.0..=1.0).contains(&jitter));
        Self { initial, max, jitter, attempt: 0 }
    }

    /// CurveCP's own discipline: 1s initial, doubling to a 16s ceiling, ±25% jitter.
    pub fn curvecp_default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(16), 0.25)
    }

    /// Number of retransmits issued so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Compute the next delay and advance the attempt counter.
    pub fn next_delay(&mut self, rng: &mut impl RngCore) -> Duration {
        let shift = self.attempt.min(8); // 2^8 headroom is plenty before clamping to `max`
        self.attempt += 1;

        let unjittered = self.initial.checked_mul(1u32 << shift).unwrap_or(self.max).min(self.max);

        let jitter_span = self.jitter;
        // Uniform factor in [1 - jitter_span, 1 + jitter_span], derived from a
        // single random u32 to avoid pulling in a float RNG distribution crate.
        let r = (rng.next_u32() as f64) / (u32::MAX as f64); // [0, 1]
        let factor = 1.0 - jitter_span + 2.0 * jitter_span * r;

        Duration::from_secs_f64((unjittered.as_secs_f64() * factor).max(0.0))
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn backoff_grows_then_clamps() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut b = Backoff::new(Duration::from_secs(1), Duration::from_secs(16), 0.0);
        let d0 = b.next_delay(&mut rng);
        let d1 = b.next_delay(&mut rng);
        let d2 = b.next_delay(&mut rng);
        assert!(d0 < d1);
        assert!(d1 < d2);
        for _ in 0..10 {
            let d = b.next_delay(&mut rng);
            assert!(d <= Duration::from_secs(16));
        }
    }

    #[test]
    fn backoff_jitter_stays_in_band() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut b = Backoff::new(Duration::from_secs(4), Duration::from_secs(100), 0.25);
        for _ in 0..50 {
            let d = b.next_delay(&mut rng);
            // first delay's unjittered base is 4s; band is [3s, 5s]
            if b.attempt() == 1 {
                assert!(d >= Duration::from_millis(2999) && d <= Duration::from_millis(5001));
            }
        }
    }

    #[test]
    fn hasher_seeds_differ_across_calls() {
        let mut rng = StdRng::seed_from_u64(3);
        let h1 = session_table_hasher(&mut rng);
        let h2 = session_table_hasher(&mut rng);
        use std::hash::{BuildHasher, Hasher};
        let a = h1.hash_one(b"some-key");
        let b = h2.hash_one(b"some-key");
        assert_ne!(a, b);
    }
}
