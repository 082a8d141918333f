//! Outbound ports for the rendezvous engine.

/// Time source trait for testability
pub trait TimeSource: Send + Sync {
    /// Milliseconds since Unix epoch
    fn now_ms(&self) -> u64;
}

/// System time implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            // Clock before Unix epoch: report 0 rather than panic
            .unwrap_or(0)
    }
}
