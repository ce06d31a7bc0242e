pub mod config;
pub mod logging;

// Launch pipeline, leaves first
pub mod archive;
pub mod cache;
pub mod checksum;
pub mod coordinator;
pub mod decoder;
pub mod error;
pub mod fetch;
pub mod loader;
pub mod pipe;
pub mod progress;
pub mod remote_config;
pub mod trust;

#[cfg(test)]
mod testutil;

pub use coordinator::{Launched, LoadCoordinator, Origin};
pub use error::{FailureCategory, LaunchError};
pub use progress::ProgressSink;
