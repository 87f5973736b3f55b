pub mod app;
pub mod cli;
pub mod download;
pub mod file;
pub mod resolve;
pub mod util;

pub use app::{config::Config, settings::RunOptions};
