mod app;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use colcache::{config, logging};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "colcache")]
#[command(about = "Cached client for collections and their source connections")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/colcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Backend url, overrides the config file
  #[arg(short, long)]
  url: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List collections
  Collections {
    /// Bypass the cache
    #[arg(short, long)]
    refresh: bool,
    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
  },
  /// List the source connections of a collection
  Connections {
    /// Collection identifier
    collection_id: String,
    /// Bypass the cache
    #[arg(short, long)]
    refresh: bool,
    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
  },
  /// Keep refreshing collections and print every change
  Watch {
    /// Seconds between refreshes
    #[arg(short, long, default_value_t = 30)]
    interval: u64,
  },
}

impl From<Command> for app::Action {
  fn from(command: Command) -> Self {
    match command {
      Command::Collections { refresh, json } => app::Action::Collections { refresh, json },
      Command::Connections {
        collection_id,
        refresh,
        json,
      } => app::Action::Connections {
        collection_id,
        refresh,
        json,
      },
      Command::Watch { interval } => app::Action::Watch {
        interval: Duration::from_secs(interval.max(1)),
      },
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration, a url on the command line works without a config file
  let config = match (&args.url, &args.config) {
    (Some(url), None) => config::Config::for_url(url),
    (url, path) => {
      let config = config::Config::load(path.as_deref())?;
      match url {
        Some(url) => config::Config {
          api: config::ApiConfig {
            url: url.clone(),
            ..config.api
          },
          ..config
        },
        None => config,
      }
    }
  };

  let _log_guard = logging::init(&config.log)?;

  let app = app::App::new(&config)?;
  app.run(args.command.into()).await?;

  Ok(())
}
