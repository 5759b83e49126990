use crate::CoinSource;
use rand::{Rng, rng};

/// A `CoinSource` backed by the thread-local RNG (`rand::rng()`).
///
/// The RNG is cryptographically secure (ChaCha-based) and reseeded
/// periodically. Each OS thread has its own instance, so concurrent casting is
/// contention-free.
///
/// This type does **not** store the RNG; it is a zero-sized handle that reaches
/// for the thread-local generator on every toss, so it is `Send + Sync` and can
/// be shared freely across tasks.
#[derive(Default, Clone, Copy, Debug)]
pub struct ThreadCoins;

impl CoinSource for ThreadCoins {
    fn toss(&self) -> bool {
        rng().random()
    }
}
