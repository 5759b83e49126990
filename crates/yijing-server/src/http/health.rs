use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Serving status published by `/healthz`.
///
/// Starts out serving; flipped to not serving when shutdown begins so load
/// balancers drain the instance before the workers stop.
#[derive(Debug, Clone)]
pub struct HealthReporter {
    serving: Arc<AtomicBool>,
}

impl Default for HealthReporter {
    fn default() -> Self {
        Self {
            serving: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl HealthReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_serving(&self) {
        self.serving.store(true, Ordering::Release);
    }

    pub fn set_not_serving(&self) {
        self.serving.store(false, Ordering::Release);
    }

    pub fn is_serving(&self) -> bool {
        self.serving.load(Ordering::Acquire)
    }
}
