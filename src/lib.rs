//! Stopwatch for time spent on social platforms. Pick a platform, the timer runs while you are
//! there, totals accumulate per platform and start over every day at local midnight.

pub mod cli;
pub mod opener;
pub mod platform;
pub mod storage;
pub mod tracker;
pub mod utils;
