//! HTTP request handlers.

pub mod export;
pub mod health;
pub mod prune;

pub use export::*;
pub use health::*;
pub use prune::*;
