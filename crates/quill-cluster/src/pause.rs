//! Cooperative pause signal for the batch classification runner.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable pause flag checked between batches.
///
/// Pausing is cooperative: the runner checks the token at the top of each
/// batch iteration, so an in-flight batch still completes. No partial-batch
/// state is ever persisted.
#[derive(Debug, Clone, Default)]
pub struct PauseToken {
    flag: Arc<AtomicBool>,
}

impl PauseToken {
    /// Create a new, unpaused token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a pause.
    pub fn pause(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Clear a pause request.
    pub fn resume(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// Check whether a pause has been requested.
    pub fn is_paused(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pause_resume_cycle() {
        let token = PauseToken::new();
        assert!(!token.is_paused());

        token.pause();
        assert!(token.is_paused());

        token.resume();
        assert!(!token.is_paused());
    }

    #[test]
    fn test_clones_share_state() {
        let token = PauseToken::new();
        let clone = token.clone();

        clone.pause();
        assert!(token.is_paused());
    }
}
