//! Admin API role
//!
//! A small JSON API for operators: log in with the shared admin secret, then
//! list, create and delete licenses and inspect worker load.

pub mod api;
pub mod session;

pub use api::{create_router, AdminState};
pub use session::SessionStore;
