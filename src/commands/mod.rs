pub mod serve;

// Re-export command functions for convenience
pub use serve::{admin, dispatcher, license_server, worker};
