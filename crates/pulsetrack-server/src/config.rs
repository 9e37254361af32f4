/// Re-export `Config` from `pulsetrack-core` for use within this crate.
///
/// Environment parsing lives in `pulsetrack-core` so integration tests can
/// build configs without the server.
pub use pulsetrack_core::config::{Config, SmtpConfig};
