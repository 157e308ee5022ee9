pub mod api;
pub mod assets;
pub mod audio;
pub mod config;
pub mod credentials;
pub mod error;
pub mod ffmpeg;
pub mod init;
pub mod layout;
pub mod log;
pub mod model;
pub mod phase;
pub mod pipeline;
pub mod planner;
pub mod render;
pub mod retry;
pub mod state;
pub mod store;
pub mod timeline;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
