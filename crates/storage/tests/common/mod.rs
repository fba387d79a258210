pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{backends_under_test, seeded_bytes};
