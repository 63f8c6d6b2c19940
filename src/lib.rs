//! Synthesizes plausible capture timestamps for folders of work-session
//! photographs and burns date, time and location into each picture.

pub mod config;
pub mod core;
pub mod services;

pub use crate::config::{Config, ConfigError, Settings};
pub use crate::core::allocator::{Allocator, Schedule};
pub use crate::core::difference::{DifferenceMetric, PixelDifference};
pub use crate::core::grouper::{group, group_shots, Shot};
pub use crate::core::incident::IncidentPolicy;
pub use crate::core::jitter::{FixedJitter, Jitter, RandomJitter};
pub use crate::core::timestamp::{normalize, parse_hms, Timestamp};
pub use crate::services::runner::{RunReport, Runner};
pub use crate::services::stamper::{DryRunSink, StampSink, TextStamper};
