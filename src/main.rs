use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use rewards_sync::app::App;
use rewards_sync::config::Config;
use rewards_sync::domain::Domain;
use rewards_sync::referrals::SortOrder;

#[derive(Parser, Debug)]
#[command(name = "rewards-sync")]
#[command(about = "Cached sync of affiliate and bonus reward data")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/rewards-sync/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Write logs to this file instead of stderr
  #[arg(long, global = true)]
  log_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Refresh rates, summary, detail and referrals
  Sync {
    /// Only this domain (default: all)
    #[arg(short, long)]
    domain: Option<Domain>,

    /// Ignore the staleness window
    #[arg(short, long)]
    force: bool,
  },
  /// Show a page of referrals
  Referrals {
    #[arg(short, long)]
    domain: Domain,

    #[arg(short, long)]
    page: Option<u32>,

    #[arg(short, long, value_enum)]
    sort: Option<SortOrder>,
  },
  /// Claim the accrued balance
  Claim {
    #[arg(short, long)]
    domain: Domain,
  },
  /// Drop every cached entry
  Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_logging(args.log_file.as_deref())?;

  let config = Config::load(args.config.as_deref())?;
  let app = App::new(&config)?;

  match args.command {
    Command::Sync { domain, force } => {
      let domains = match domain {
        Some(domain) => vec![domain],
        None => Domain::ALL.to_vec(),
      };
      print_json(&app.sync(&domains, force).await)?;
    }
    Command::Referrals { domain, page, sort } => {
      print_json(&app.referrals(domain, page, sort).await)?;
    }
    Command::Claim { domain } => {
      print_json(&app.claim(domain).await)?;
    }
    Command::Logout => app.logout(),
  }

  Ok(())
}

/// Logs go to stderr so stdout stays valid JSON. The returned guard flushes
/// the file writer on drop.
fn init_logging(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

  let Some(path) = log_file else {
    tracing_subscriber::fmt()
      .with_env_filter(filter)
      .with_writer(std::io::stderr)
      .init();
    return Ok(None);
  };

  let file_name = path
    .file_name()
    .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;
  let dir = path
    .parent()
    .filter(|p| !p.as_os_str().is_empty())
    .unwrap_or_else(|| Path::new("."));
  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(Some(guard))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  let json =
    serde_json::to_string_pretty(value).map_err(|e| eyre!("Failed to serialize output: {}", e))?;
  println!("{}", json);
  Ok(())
}
