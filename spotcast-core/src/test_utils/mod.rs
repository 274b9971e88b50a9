pub mod fakes;
pub mod helpers;

pub use fakes::{FakeCapture, FakeGateway, FakeTransport};
pub use helpers::{guild_message, sample_track, wait_until, wait_until_async};
