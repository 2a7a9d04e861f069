mod api;
mod app;
mod cache;
mod clock;
mod commands;
mod config;
mod event;
mod logging;
mod notify;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;

use api::types::{FavouriteKind, NotificationCategory, WatchRecord, WatchStatus};
use notify::{AppState, NetworkClass};

#[derive(Parser, Debug)]
#[command(name = "anitrack")]
#[command(about = "Anime tracker client with cached state and notification polling")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/anitrack/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Log level for the anitrack target (overridden by RUST_LOG)
  #[arg(long)]
  log_level: Option<String>,

  #[command(subcommand)]
  command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
  /// Show the watch record for a title
  Status { slug: String },

  /// Set the watch status for a title
  SetStatus {
    slug: String,
    status: WatchStatus,
    #[arg(long)]
    episodes: Option<u32>,
    #[arg(long)]
    score: Option<u8>,
    #[arg(long)]
    rewatches: Option<u32>,
    #[arg(long)]
    note: Option<String>,
  },

  /// Remove a title from the watch list
  ClearStatus { slug: String },

  /// Show or change favourite state
  Favourite {
    slug: String,
    #[arg(long, default_value = "anime")]
    kind: FavouriteKind,
    #[arg(long, conflicts_with = "unset")]
    set: bool,
    #[arg(long)]
    unset: bool,
  },

  /// List one page of the notification feed
  Notifications {
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = 15)]
    size: u32,
  },

  /// Show the unseen notification count
  Unseen,

  /// Mark a notification, or all of them, as seen
  Seen {
    #[arg(required_unless_present = "all")]
    reference: Option<String>,
    #[arg(long)]
    all: bool,
  },

  /// Check for new notifications once and deliver them
  Check,

  /// Poll for notifications until interrupted; reads control commands on stdin
  Poll {
    /// Start as if the app were in the background
    #[arg(long)]
    background: bool,
    #[arg(long, value_enum, default_value_t = Network::Wifi)]
    network: Network,
  },

  /// Show notification preferences, or turn a category on or off
  Prefs {
    category: Option<String>,
    #[arg(requires = "category")]
    state: Option<Toggle>,
  },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Network {
  Wifi,
  Cellular,
  Unknown,
}

impl From<Network> for NetworkClass {
  fn from(network: Network) -> Self {
    match network {
      Network::Wifi => NetworkClass::Unmetered,
      Network::Cellular => NetworkClass::Metered,
      Network::Unknown => NetworkClass::Unknown,
    }
  }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Toggle {
  On,
  Off,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  let _log_guard = logging::init(
    &config::data_dir()?.join("logs"),
    args.log_level.as_deref(),
  )?;

  let app = app::App::new(config)?;
  let result = run(&app, args.command).await;
  app.shutdown().await;
  result
}

async fn run(app: &app::App, command: Cmd) -> Result<()> {
  let tracker = app.tracker();

  match command {
    Cmd::Status { slug } => match tracker.watch(&slug).await? {
      Some(record) => print_record(&slug, &record),
      None => println!("{}: not on watch list", slug),
    },

    Cmd::SetStatus {
      slug,
      status,
      episodes,
      score,
      rewatches,
      note,
    } => {
      // Unspecified fields keep their current values
      let mut record = tracker
        .watch(&slug)
        .await?
        .unwrap_or_else(|| WatchRecord::new(status, 0));
      record.status = status;
      if let Some(episodes) = episodes {
        record.episodes = episodes;
      }
      if let Some(score) = score {
        record.score = score;
      }
      if let Some(rewatches) = rewatches {
        record.rewatches = rewatches;
      }
      if note.is_some() {
        record.note = note;
      }
      tracker.set_watch(&slug, record.clone()).await?;
      print_record(&slug, &record);
    }

    Cmd::ClearStatus { slug } => {
      tracker.clear_watch(&slug).await?;
      println!("{}: removed from watch list", slug);
    }

    Cmd::Favourite {
      slug,
      kind,
      set,
      unset,
    } => {
      if set || unset {
        tracker.set_favourite(kind, &slug, set).await?;
      }
      let favourite = tracker.favourite(kind, &slug).await?;
      println!(
        "{} {}: {}",
        kind,
        slug,
        if favourite { "favourite" } else { "not favourite" }
      );
    }

    Cmd::Notifications { page, size } => {
      let feed = tracker.notifications(page, size).await?;
      if feed.items.is_empty() {
        println!("No notifications");
      }
      for item in &feed.items {
        let message = notify::render(item);
        println!(
          "{} {} [{}] {}{}",
          if item.seen { " " } else { "*" },
          item.created.format("%Y-%m-%d %H:%M"),
          item.reference.as_deref().unwrap_or("-"),
          message.title,
          if message.body.is_empty() {
            String::new()
          } else {
            format!(": {}", message.body)
          }
        );
      }
      println!("Page {}/{}", page, feed.pages.max(1));
    }

    Cmd::Unseen => {
      println!("{}", tracker.unseen_count().await?);
    }

    Cmd::Seen { reference, all } => {
      if all {
        tracker.mark_all_seen().await?;
        println!("All notifications marked seen");
      } else if let Some(reference) = reference {
        tracker.mark_seen(&reference).await?;
        println!("{}: marked seen", reference);
      }
    }

    Cmd::Check => {
      let report = app.check_now().await?;
      println!(
        "Fetched {}, new {}, delivered {}, skipped {} disabled, {} duplicate, {} failed",
        report.fetched,
        report.candidates,
        report.dispatch.delivered,
        report.dispatch.disabled,
        report.dispatch.duplicates,
        report.dispatch.failed,
      );
    }

    Cmd::Poll {
      background,
      network,
    } => {
      let state = if background {
        AppState::Background
      } else {
        AppState::Foreground
      };
      println!("Polling; commands:\n{}", commands::help());
      app.run_poller(state, network.into()).await?;
    }

    Cmd::Prefs { category, state } => {
      let mut settings = app.settings();
      match (category, state) {
        (Some(category), Some(state)) => {
          let category = NotificationCategory::from(category);
          if !NotificationCategory::KNOWN.contains(&category) {
            return Err(eyre!("Unknown notification category '{}'", category));
          }
          settings.set_enabled(&category, state == Toggle::On);
          app.save_settings(&settings)?;
          println!("{}: {}", category, if state == Toggle::On { "on" } else { "off" });
        }
        (Some(category), None) => {
          let category = NotificationCategory::from(category);
          println!(
            "{}: {}",
            category,
            if settings.is_enabled(&category) { "on" } else { "off" }
          );
        }
        _ => {
          for (category, enabled) in settings.entries() {
            println!("{:<20} {}", category, if enabled { "on" } else { "off" });
          }
        }
      }
    }
  }

  Ok(())
}

fn print_record(slug: &str, record: &WatchRecord) {
  println!(
    "{}: {} ep {} score {} rewatches {}{}",
    slug,
    record.status,
    record.episodes,
    record.score,
    record.rewatches,
    record
      .note
      .as_deref()
      .map(|n| format!(" ({})", n))
      .unwrap_or_default()
  );
}
