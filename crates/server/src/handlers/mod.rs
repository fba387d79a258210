//! HTTP request handlers.

pub mod health;
pub mod records;
pub mod selectors;

pub use health::*;
pub use records::*;
pub use selectors::*;
