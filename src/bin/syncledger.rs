use anyhow::Context;
use clap::{Parser, Subcommand};
use syncledger::{DateRange, ItemKind, SyncLedger, Window};

#[derive(Parser)]
#[command(name = "syncledger", about = "Inspect and maintain mirrored-coverage manifests")]
struct Cli {
    /// Database path (default: ~/.syncledger/syncledger.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show coverage per item kind and the last successful sync
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recorded manifests for a kind
    Manifests {
        kind: ItemKind,
        /// Only manifests overlapping this window (e.g. 2025-Q1, 30d)
        #[arg(long)]
        window: Option<Window>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the gaps still to fetch for a kind
    Gaps {
        kind: ItemKind,
        /// Window to inspect (default: last `window_days`)
        #[arg(long)]
        window: Option<Window>,
        /// Cut gaps longer than `max_gap_days`
        #[arg(long)]
        split: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Fraction of a window mirrored, per kind
    Availability {
        /// Kinds to report (default: all)
        kinds: Vec<ItemKind>,
        /// Window to inspect (default: last `window_days`)
        #[arg(long)]
        window: Option<Window>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Coalesce touching or overlapping manifests of a kind
    Merge {
        kind: ItemKind,
        /// Window to merge within (default: last `window_days`)
        #[arg(long)]
        window: Option<Window>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
}

fn resolve_window(ledger: &SyncLedger, window: Option<Window>) -> anyhow::Result<DateRange> {
    let window = window.unwrap_or(Window::Rolling(ledger.config().window_days));
    window
        .to_range(chrono::Utc::now())
        .with_context(|| format!("cannot resolve window {window}"))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn or_dash<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => syncledger::Database::open_at(path).await?,
        None => syncledger::Database::open().await?,
    };
    let ledger = SyncLedger::open(db).await?;

    match cli.command {
        Commands::Status { json } => print_status(&ledger, json).await?,
        Commands::Manifests { kind, window, json } => {
            let range = window
                .map(|w| w.to_range(chrono::Utc::now()))
                .transpose()?;
            let manifests = ledger.list(Some(kind), range.as_ref()).await?;
            if json {
                print_json(&manifests)?;
            } else if manifests.is_empty() {
                println!("No {kind} manifests recorded.");
            } else {
                for m in &manifests {
                    println!(
                        "{:>6}  {}  ids {}  refreshed {}",
                        or_dash(m.id),
                        m.dates,
                        m.ids.to_query().unwrap_or_else(|| "-".into()),
                        or_dash(m.refreshed_at.map(syncledger::date_util::format_ts)),
                    );
                }
            }
        }
        Commands::Gaps {
            kind,
            window,
            split,
            json,
        } => {
            let range = resolve_window(&ledger, window)?;
            let gaps = if split {
                ledger.list_gaps_split(kind, &range).await?
            } else {
                ledger.list_gaps(kind, &range).await?
            };
            if json {
                print_json(&gaps)?;
            } else if gaps.is_empty() {
                println!("{kind} is fully mirrored over {range}.");
            } else {
                for gap in &gaps {
                    println!("{gap}  ({}h)", gap.duration().num_hours());
                }
            }
        }
        Commands::Availability { kinds, window, json } => {
            let range = resolve_window(&ledger, window)?;
            let report = ledger.availability(&range, &kinds).await?;
            if json {
                print_json(&report)?;
            } else {
                println!("Availability over {range}");
                for a in &report {
                    println!(
                        "  {:<13} {:>6.1}%  ({} manifests, {} gaps)",
                        a.kind.as_str(),
                        a.fraction * 100.0,
                        a.manifest_count,
                        a.gap_count
                    );
                }
            }
        }
        Commands::Merge { kind, window, json } => {
            let range = resolve_window(&ledger, window)?;
            let outcome = ledger.merge_all_in_range(kind, &range).await?;
            if json {
                print_json(&serde_json::json!({
                    "keep": outcome.keep,
                    "discard": outcome.discard,
                }))?;
            } else {
                println!(
                    "Kept {} manifests, discarded {}.",
                    outcome.keep.len(),
                    outcome.discard.len()
                );
            }
        }
        Commands::Config { action } => handle_config(&ledger, action).await?,
    }

    Ok(())
}

async fn print_status(ledger: &SyncLedger, json: bool) -> anyhow::Result<()> {
    let status = ledger.status().await?;
    if json {
        return print_json(&status);
    }

    println!("Ledger Status");
    for summary in &status.kinds {
        let kind = summary.kind.as_str();
        if summary.manifest_count == 0 {
            println!("  {kind:<13} no coverage");
            continue;
        }
        println!(
            "  {kind:<13} {} manifests, {}h covered, {} .. {}, last sync {}",
            summary.manifest_count,
            summary.covered_secs / 3600,
            or_dash(summary.earliest.map(syncledger::date_util::format_ts)),
            or_dash(summary.latest.map(syncledger::date_util::format_ts)),
            status
                .last_synced
                .get(kind)
                .map_or("never", String::as_str),
        );
    }
    Ok(())
}

async fn handle_config(ledger: &SyncLedger, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match ledger.config_get(&key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            ledger.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let items = ledger.config_list().await?;
            if items.is_empty() {
                println!("No configuration set.");
            } else {
                for (k, v) in items {
                    println!("{k} = {v}");
                }
            }
        }
    }
    Ok(())
}

