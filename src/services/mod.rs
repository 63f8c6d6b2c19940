pub mod cleanup;
pub mod discovery;
pub mod history;
pub mod runner;
pub mod stamper;

pub use runner::Runner;
pub use stamper::{DryRunSink, StampSink, TextStamper};
