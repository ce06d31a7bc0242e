//! CLI command handlers, one file per command.

mod cache;
mod launch;
mod pack;
mod show_config;
mod verify;

pub use cache::{run_cache_clear, run_cache_status};
pub use launch::{run_launch, LaunchOverrides};
pub use pack::run_pack;
pub use show_config::run_config;
pub use verify::run_verify;
