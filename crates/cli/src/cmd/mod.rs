mod build;
mod info;

pub use build::{BuildOpts, cmd_build};
pub use info::cmd_info;
