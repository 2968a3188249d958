//! Utility modules shared across the crate

pub mod lock;
pub mod logging;

// Re-export commonly used items
pub use lock::{lock_recover, with_lock, with_read_lock, with_write_lock};
pub use logging::{init_logging, init_logging_from_config};
