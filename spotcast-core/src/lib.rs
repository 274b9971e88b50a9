// src/lib.rs

pub mod auth;
pub mod config;
pub mod platforms;
pub mod services;
pub mod tasks;
pub mod test_utils;
pub mod voice;

pub use config::{BotConfig, RelayConfig};
pub use spotcast_common::error::Error;
