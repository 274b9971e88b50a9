pub mod token_refresh;

pub use token_refresh::spawn_token_refresh_task;
