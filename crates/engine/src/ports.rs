//! Port traits for infrastructure boundaries.
//!
//! These are the only abstractions in the engine. Everything else is
//! concrete types. Ports exist for:
//! - LLM calls (swap the Anthropic client for a scripted fake in tests)
//! - Clock/Random (deterministic tests)

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::generator::GeneratorError;

/// One request to the text generator.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub system: String,
    pub user: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// The only component allowed to talk to a concrete LLM vendor.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GeneratorPort: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> Result<String, GeneratorError>;

    /// Emit the response as a lazy, finite sequence of text chunks.
    async fn generate_streaming(
        &self,
        request: GenerateRequest,
    ) -> Result<BoxStream<'static, Result<String, GeneratorError>>, GeneratorError>;
}

/// Clock abstraction so tests can pin time.
pub trait ClockPort: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
pub struct SystemClock;

impl ClockPort for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed clock for tests.
pub struct FixedClock(pub DateTime<Utc>);

impl ClockPort for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Shared uniform RNG handle. One source per process; tests seed it.
#[derive(Clone)]
pub struct SharedRng {
    inner: Arc<Mutex<StdRng>>,
}

impl SharedRng {
    pub fn from_entropy() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StdRng::from_entropy())),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    /// Run a closure with exclusive access to the RNG. The closure must not
    /// block; the lock is held only for the duration of the call.
    pub fn with<R>(&self, f: impl FnOnce(&mut StdRng) -> R) -> R {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn seeded_rng_is_deterministic() {
        let a = SharedRng::seeded(7);
        let b = SharedRng::seeded(7);
        let roll_a: i32 = a.with(|rng| rng.gen_range(1..=20));
        let roll_b: i32 = b.with(|rng| rng.gen_range(1..=20));
        assert_eq!(roll_a, roll_b);
    }

    #[test]
    fn fixed_clock_returns_pinned_instant() {
        let instant = Utc::now();
        let clock = FixedClock(instant);
        assert_eq!(clock.now(), instant);
    }
}
