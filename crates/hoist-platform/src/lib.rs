//! Per-platform locations of hoist's settings, stores, and logs.

mod paths;

pub use paths::{AppPaths, AppPathsError, HOME_ENV};
