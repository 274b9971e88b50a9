use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

mod server;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Discord bot with streaming and playback commands.
    Bot,
    /// Only the OAuth callback relay, for running it as its own process.
    Callback,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "spotcast")]
#[command(author, version, about = "Spotcast - streams captured audio into Discord voice and drives Spotify playback")]
pub struct Args {
    #[arg(long, value_enum, default_value = "bot")]
    pub mode: Mode,

    /// Extra env file loaded before the process environment.
    #[arg(long)]
    pub env_file: Option<PathBuf>,

    /// Print the authorize URL without opening a browser.
    #[arg(long, default_value = "false")]
    pub no_browser: bool,

    /// The callback relay runs in another process; only watch the code file.
    #[arg(long, default_value = "false")]
    pub external_callback: bool,

    /// Overrides the port taken from SPOTIFY_REDIRECT_URI.
    #[arg(long)]
    pub callback_port: Option<u16>,
}

fn init_tracing() {
    let mut filter = EnvFilter::from_default_env();
    for directive in ["spotcast_core=info", "spotcast_server=info", "spotcast_spotify=info"] {
        if let Ok(d) = directive.parse() {
            filter = filter.add_directive(d);
        }
    }
    let sub = fmt().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(sub) {
        eprintln!("Failed to set global subscriber: {e}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    if let Some(path) = &args.env_file {
        if let Err(e) = dotenv::from_path(path) {
            error!("Could not load env file {}: {}", path.display(), e);
        }
    }
    info!("Spotcast starting. mode={:?}", args.mode);

    let result = match args.mode {
        Mode::Bot => server::run_bot(&args).await,
        Mode::Callback => server::run_callback(&args).await,
    };
    if let Err(e) = &result {
        error!("Fatal: {:?}", e);
    }

    info!("Main finished. Goodbye!");
    Ok(result?)
}
