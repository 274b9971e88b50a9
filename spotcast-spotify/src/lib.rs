pub mod client;
pub mod error;
pub mod models;

pub use client::{SpotifyClient, ACCOUNTS_URL, API_URL};
pub use error::{Result, SpotifyError};
pub use models::*;
