//! Request-scoped cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One-way cancellation flag shared between a capture and its aborter.
///
/// A fresh token is minted per capture, so an abort can never leak into a
/// later request. Once raised a token stays raised.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    raised: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}
