//! Rolling latency history for network targets.
//!
//! The window logic is pure; the store adds JSON persistence across runs.

mod store;
mod window;

pub use store::*;
pub use window::*;
