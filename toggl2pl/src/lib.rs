pub mod cli;
pub mod load_config;
pub mod pl;
pub mod review;
pub mod toggl;

pub use cli::{run, Cli, Commands};
