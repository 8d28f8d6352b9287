use crate::error::{JarSourcesError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag flipped by Ctrl+C.
///
/// Clones share the same state, so the pipeline can check it from worker threads.
#[derive(Debug, Clone)]
pub struct GracefulShutdown {
    running: Arc<AtomicBool>,
    shutdown_message_shown: Arc<AtomicBool>,
}

impl GracefulShutdown {
    pub fn new() -> Result<Self> {
        let shutdown = Self::detached();

        let running_clone = shutdown.running.clone();
        let message_shown_clone = shutdown.shutdown_message_shown.clone();

        ctrlc::set_handler(move || {
            running_clone.store(false, Ordering::SeqCst);

            if !message_shown_clone.swap(true, Ordering::SeqCst) {
                eprintln!("\n🛑 Stopping after the current class... (press Ctrl+C again to force exit)");
            } else {
                eprintln!("\n💀 Force stopping...");
                std::process::exit(130);
            }
        })
        .map_err(|e| JarSourcesError::Config {
            message: format!("Failed to set signal handler: {}", e),
        })?;

        Ok(shutdown)
    }

    /// A flag with no signal handler behind it; only `request_shutdown` flips it.
    pub fn detached() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            shutdown_message_shown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn check_shutdown(&self) -> Result<()> {
        if !self.is_running() {
            return Err(JarSourcesError::Cancelled);
        }
        Ok(())
    }

    pub fn request_shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::detached()
    }
}
