mod api;
mod app;
mod cache;
mod commands;
mod config;
mod controller;
mod error;
mod event;
mod logging;
mod oauth;
mod query;
mod store;
mod ui;
mod validation;

#[cfg(test)]
mod test_support;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "b9s")]
#[command(about = "A terminal UI for burnout-detector integrations, inspired by k9s")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/b9s/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Backend base URL, overriding the config file
  #[arg(long)]
  api_url: Option<String>,

  /// Keep state in memory only; nothing is read from or written to disk
  #[arg(long)]
  no_cache: bool,

  /// Finish a GitHub or Slack connection from the provider's redirect URL and exit
  #[arg(long, value_name = "REDIRECT_URL")]
  oauth_callback: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let _log_guard = logging::init(&config::data_dir()?.join("logs"))?;

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;

  // Override API URL if specified on command line
  if let Some(url) = args.api_url {
    config.api.url = url;
  }
  info!(api = %config.api.url, "starting b9s");

  if let Some(redirect) = args.oauth_callback {
    let callback = oauth::OAuthCallback::parse(&redirect)?;
    let state = app::open_state(&config.api.url, args.no_cache);
    let token = config::Config::get_api_token().or_else(|| state.auth_token());
    let client = api::ApiClient::new(&config.api.url, token)?;
    oauth::complete(&client, &state, &callback).await?;
    println!("{} connected", callback.platform);
    return Ok(());
  }

  // Initialize and run the app
  let mut app = app::App::new(config, args.no_cache)?;
  app.run().await?;

  Ok(())
}
