mod app;
mod event;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use smart_fetch::config::{Config, LogConfig};
use smart_fetch::{FetchOptions, HttpMethod};
use std::path::PathBuf;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "smart-fetch")]
#[command(about = "Fetch a URL through an in-memory response cache")]
#[command(version)]
struct Args {
  /// URL to fetch; relative URLs need `http.base_url` in the config
  url: String,

  /// HTTP method
  #[arg(short = 'X', long)]
  method: Option<HttpMethod>,

  /// Request header as "Name: value" (repeatable)
  #[arg(short = 'H', long = "header", value_parser = parse_header)]
  headers: Vec<(String, String)>,

  /// JSON request body
  #[arg(short = 'd', long = "data", value_parser = parse_json)]
  body: Option<Value>,

  /// Cache time in milliseconds (default 300000)
  #[arg(long)]
  cache_time: Option<u64>,

  /// Subscribe this many times in sequence
  #[arg(long, default_value_t = 1)]
  repeat: usize,

  /// Refetch once after the first subscription settles
  #[arg(long)]
  refetch: bool,

  /// Path to config file (default: $XDG_CONFIG_HOME/smart-fetch/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,
}

impl Args {
  fn options(&self) -> FetchOptions {
    let mut options = FetchOptions::new();
    options.method = self.method;
    options.body = self.body.clone();
    options.cache_time = self.cache_time.map(Duration::from_millis);
    for (name, value) in &self.headers {
      options = options.with_header(name.clone(), value.clone());
    }
    options
  }
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
  let (name, value) = raw
    .split_once(':')
    .ok_or_else(|| format!("expected \"Name: value\", got {:?}", raw))?;
  let name = name.trim();
  if name.is_empty() {
    return Err(format!("missing header name in {:?}", raw));
  }
  Ok((name.to_string(), value.trim().to_string()))
}

fn parse_json(raw: &str) -> Result<Value, String> {
  serde_json::from_str(raw).map_err(|e| format!("invalid JSON body: {}", e))
}

fn init_logging(config: &LogConfig) -> Result<WorkerGuard> {
  let filter = EnvFilter::try_from_env("SMART_FETCH_LOG")
    .or_else(|_| EnvFilter::try_new(config.filter.as_deref().unwrap_or("info")))
    .map_err(|e| eyre!("Invalid log filter: {}", e))?;

  let (writer, guard) = match &config.directory {
    Some(dir) => tracing_appender::non_blocking(tracing_appender::rolling::daily(
      dir,
      "smart-fetch.log",
    )),
    None => tracing_appender::non_blocking(std::io::stderr()),
  };

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(config.directory.is_none())
    .init();

  Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = init_logging(&config.log)?;

  let plan = app::Plan {
    url: args.url.clone(),
    options: args.options(),
    repeat: args.repeat,
    refetch: args.refetch,
  };

  // Initialize and run the app
  let mut app = app::App::new(&config, plan)?;
  if !app.run().await? {
    std::process::exit(1);
  }

  Ok(())
}
