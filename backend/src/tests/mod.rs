pub mod helpers;
pub mod unit;

pub use helpers::{init_test_logging, InterleavingStore, Interleaved, RecordingSink, TestContext};
