//! shoplist - shopping lists from the terminal, online or off.
//!
//! Usage: `shoplist [--offline] <command>`
//!
//! Commands:
//!   lists                  show all lists
//!   show <list>            show a list's items
//!   toggle <list> <item>   flip an item's purchased flag
//!   sync                   send pending changes now
//!   status                 connectivity and pending-change summary
//!   warm                   download every list for offline use
//!   logout                 remove all local data

use std::io;
use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use shoplist_core::{
    ApiClient, Config, FileStore, FlushOutcome, KeyValueStore, NetworkMonitor, RemoteListApi,
    Store, WatchMonitor,
};

const LOG_FILE_PREFIX: &str = "shoplist.log";

/// Base URL for offline runs with no endpoint configured. The monitor stays
/// offline for the whole run, so nothing is ever sent to it.
const OFFLINE_BASE_URL: &str = "http://localhost/";

const USAGE: &str = "usage: shoplist [--offline] <lists|show <list>|toggle <list> <item>|sync|status|warm|logout>";

/// Initialize the tracing subscriber: stderr filtered by RUST_LOG (default
/// warn) plus a daily log file in the cache directory.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match config.cache_dir() {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir.join("logs"), LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

enum Command {
    Lists,
    Show(String),
    Toggle(String, String),
    Sync,
    Status,
    Warm,
    Logout,
}

fn parse_args(args: &[String]) -> Result<(bool, Command)> {
    let offline = args.iter().any(|a| a == "--offline");
    let rest: Vec<&str> = args
        .iter()
        .map(String::as_str)
        .filter(|a| *a != "--offline")
        .collect();

    let command = match rest.as_slice() {
        ["lists"] => Command::Lists,
        ["show", list] => Command::Show(list.to_string()),
        ["toggle", list, item] => Command::Toggle(list.to_string(), item.to_string()),
        ["sync"] => Command::Sync,
        ["status"] | [] => Command::Status,
        ["warm"] => Command::Warm,
        ["logout"] => Command::Logout,
        _ => bail!("{}", USAGE),
    };
    Ok((offline, command))
}

fn resolve_base_url(config: &Config, online: bool) -> Result<&str> {
    match config.api_base_url.as_deref() {
        Some(url) => Ok(url),
        None if !online => Ok(OFFLINE_BASE_URL),
        None => bail!("No API URL configured (set SHOPLIST_API_URL or pass --offline)"),
    }
}

fn build_store(config: &Config, online: bool) -> Result<(Arc<Store>, Arc<WatchMonitor>)> {
    let base_url = resolve_base_url(config, online)?;
    let mut client = ApiClient::new(base_url, config.timeout_secs())?;
    if let Some(token) = &config.api_token {
        client = client.with_token(token.clone());
    }

    let cache_dir = config.cache_dir()?;
    let kv: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(cache_dir.join("data"))?);
    let api: Arc<dyn RemoteListApi> = Arc::new(client);
    let monitor = Arc::new(WatchMonitor::new(online));
    let store = Arc::new(Store::new(api, kv, monitor.clone()));
    Ok((store, monitor))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = Config::load()?;
    let _log_guard = init_tracing(&config);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (offline_flag, command) = parse_args(&args)?;
    let online = !(offline_flag || config.offline_mode);

    let (store, monitor) = build_store(&config, online)?;
    info!(online, "shoplist starting");
    store.start().await;

    let result = run(&store, monitor.as_ref(), command).await;

    store.shutdown().await;
    if let Some(message) = store.take_error().await {
        eprintln!("Error: {}", message);
    }
    result
}

async fn run(store: &Store, monitor: &dyn NetworkMonitor, command: Command) -> Result<()> {
    match command {
        Command::Lists => {
            for list in store.load_lists().await? {
                let marker = if list.is_active { "*" } else { " " };
                println!("{} {:<12} {:<30} {}", marker, list.id, list.name, list.progress_display());
            }
        }
        Command::Show(list_id) => {
            let list = store.open_list(&list_id).await?;
            println!("{} ({} of {} purchased)", list.name, list.purchased_count(), list.items.len());
            for item in &list.items {
                let check = if item.purchased { "x" } else { " " };
                println!("[{}] {:<12} {:<30} {}", check, item.id, item.name, item.display_quantity());
            }
            let total = list.estimated_total();
            if total > 0.0 {
                println!("estimated total: {:.2}", total);
            }
        }
        Command::Toggle(list_id, item_id) => {
            // Load first so the toggle flips the freshest known value
            store.open_list(&list_id).await?;
            let phase = store.toggle_purchased(&list_id, &item_id).await?;
            println!("{:?}", phase);
        }
        Command::Sync => match store.flush().await {
            FlushOutcome::Completed(report) => println!(
                "sent {}, dropped {}, remaining {}",
                report.sent, report.dropped, report.remaining
            ),
            FlushOutcome::Coalesced => println!("sync already running"),
            FlushOutcome::Skipped => println!("offline, nothing sent"),
        },
        Command::Status => {
            let status = store.status().await;
            println!("online:  {}", if monitor.is_online() { "yes" } else { "no" });
            println!("pending: {}", status.pending_count);
            if let Some(age) = store.cache().overview_age().await {
                println!("lists cached {}", age);
            }
            if let Some(notice) = status.stale_notice {
                println!("{}", notice);
            }
        }
        Command::Warm => {
            let cached = store.warm_cache().await?;
            println!("{} lists available offline", cached);
        }
        Command::Logout => {
            store.logout().await;
            println!("local data removed");
        }
    }
    Ok(())
}
