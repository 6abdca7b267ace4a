//! interruption handling stuff
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

#[derive(Clone)]
/// an interruption handler
pub struct InterruptHandler {
    /// whether an interrupt signal has arrived
    flag: Arc<AtomicBool>,
}

impl InterruptHandler {
    /// make a new interruption handler
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// trigger the handler (set the flag to true)
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// whether the handler has been triggered
    pub fn triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// spawn a ctrl-c listener that trips this handler
    pub fn listen(&self) {
        let handler = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, finishing current page");
                handler.trigger();
            }
        });
    }
}

impl Default for InterruptHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_is_sticky() {
        let handler = InterruptHandler::new();
        assert!(!handler.triggered());
        handler.trigger();
        assert!(handler.triggered());
        assert!(handler.triggered());
    }
}
