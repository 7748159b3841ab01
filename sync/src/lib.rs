//! Keeps a map's fog grid consistent between the host's edits, the other viewers, and a durable store.

pub use config::*;
pub use debounce::*;
pub use error::*;
pub use session::*;
pub use store::*;

mod config;
mod debounce;
mod error;
mod session;
mod store;
