//! Pure timestamp synthesis: nothing in here touches the filesystem except
//! `difference::PixelDifference`, which decodes the two images it compares.

pub mod allocator;
pub mod difference;
pub mod grouper;
pub mod incident;
pub mod jitter;
pub mod timestamp;
