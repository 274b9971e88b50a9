pub mod command_service;
pub mod replies;

pub use command_service::{CommandRouter, ParsedCommand, TrackRef};
