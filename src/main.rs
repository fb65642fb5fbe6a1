//! Origin Scan CLI
//!
//! Command-line interface for exercising the scanner with a mock camera and
//! for managing the scan ledger on disk.

use clap::{Parser, Subcommand};
use origin_scan::{
    capture::{DetectionEvent, MockCameraDevice, StaticPermission},
    config::FileConfig,
    geometry::{Rect, TargetFrame},
    ledger::{EntitlementLedger, JsonFileStore, MemoryStore, ResolvedCountry},
    lookup::{normalize_barcode, CountryLookup, EventLog, NoopEventLog, StaticLookup},
    metrics::{MetricsRegistry, MetricsSnapshot},
    orchestrator::OrchestratorAction,
    preferences::{CountryPreferences, CountryStance},
    purchase::{GrantOutcome, PurchaseListener, Transaction, Verification},
    service::{process_barcode, LedgerHandle, Scanner},
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser, Debug)]
#[command(name = "origin-scan", version, about = "Barcode country-of-origin scanner")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Ledger JSON file (overrides the configured history path)
    #[arg(long, global = true)]
    store: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive the capture engine with a mock camera and scripted detections
    Simulate {
        /// Barcodes to present, in order
        #[arg(required = true)]
        barcodes: Vec<String>,
        /// Country every barcode resolves to
        #[arg(long, default_value = "US")]
        country: String,
        /// Accept detections anywhere in the preview
        #[arg(long, default_value_t = false)]
        no_gating: bool,
        /// Print Prometheus metrics at the end
        #[arg(long, default_value_t = false)]
        metrics: bool,
    },
    /// Record a manually entered barcode
    Submit {
        barcode: String,
        /// Issuing country; looked up over HTTP when omitted
        #[arg(long)]
        country: Option<String>,
    },
    /// List the scan history, most recent first
    History {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Remove every history entry
    Clear,
    /// Apply a purchase transaction
    Grant {
        /// Transaction id
        transaction: String,
        /// Product id (defaults to the configured scan pack)
        #[arg(long)]
        product: Option<String>,
        /// Mark the transaction as failing verification
        #[arg(long)]
        unverified: Option<String>,
    },
    /// Show remaining scans
    Quota,
    /// Manage supported and boycotted countries
    Prefs {
        #[command(subcommand)]
        command: PrefsCommands,
    },
}

#[derive(Subcommand, Debug)]
enum PrefsCommands {
    Show,
    Support { code: String },
    Boycott { code: String },
    Stance { code: String },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> CliResult {
    let config = match &cli.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };
    let store_path = cli
        .store
        .clone()
        .unwrap_or_else(|| config.ledger.history_path.clone());

    match cli.command {
        Commands::Simulate {
            barcodes,
            country,
            no_gating,
            metrics,
        } => simulate(&config, barcodes, &country, !no_gating, metrics).await,
        Commands::Submit { barcode, country } => {
            let ledger = open_ledger(&config, store_path)?;
            let lookup = lookup_for(&config, &barcode, country)?;
            let events = event_log_for(&config)?;
            let outcome =
                process_barcode(&ledger, lookup.as_ref(), events.as_ref(), &barcode).await?;
            let item = outcome.item();
            println!(
                "{} {} {} ({})",
                item.flag_glyph,
                item.barcode,
                item.country_name_primary,
                if outcome.is_charged() { "charged" } else { "repeat" }
            );
            println!("Remaining scans: {}", ledger.remaining());
            Ok(())
        }
        Commands::History { json } => {
            let ledger = open_ledger(&config, store_path)?;
            let history = ledger.history();
            if json {
                println!("{}", serde_json::to_string_pretty(history.as_slice())?);
            } else if history.is_empty() {
                println!("No scans yet");
            } else {
                for item in history.iter() {
                    println!(
                        "{}  {} {:<16} {}",
                        item.scanned_at.format("%Y-%m-%d %H:%M:%S"),
                        item.flag_glyph,
                        item.barcode,
                        item.country_name_primary
                    );
                }
            }
            Ok(())
        }
        Commands::Clear => {
            let ledger = open_ledger(&config, store_path)?;
            ledger.clear().await?;
            println!("History cleared");
            Ok(())
        }
        Commands::Grant {
            transaction,
            product,
            unverified,
        } => {
            let ledger = open_ledger(&config, store_path)?;
            let mut listener = PurchaseListener::new(ledger.clone(), &config.ledger);
            let transaction = Transaction {
                id: transaction,
                product_id: product.unwrap_or_else(|| config.ledger.product_id.clone()),
                verification: unverified.map_or(Verification::Verified, Verification::Unverified),
            };
            match listener.apply(&transaction).await? {
                GrantOutcome::Granted(remaining) => println!("Remaining scans: {}", remaining),
                GrantOutcome::AlreadyGranted => println!("Transaction already granted"),
            }
            Ok(())
        }
        Commands::Quota => {
            let ledger = open_ledger(&config, store_path)?;
            println!("Remaining scans: {}", ledger.remaining());
            Ok(())
        }
        Commands::Prefs { command } => prefs(&config, command),
    }
}

fn open_ledger(
    config: &FileConfig,
    path: PathBuf,
) -> Result<LedgerHandle, Box<dyn std::error::Error>> {
    let store = JsonFileStore::new(path);
    let ledger = EntitlementLedger::open(Box::new(store), config.ledger.free_scans)?;
    Ok(LedgerHandle::spawn(ledger).0)
}

fn lookup_for(
    config: &FileConfig,
    barcode: &str,
    country: Option<String>,
) -> Result<Box<dyn CountryLookup>, Box<dyn std::error::Error>> {
    if let Some(code) = country {
        let barcode = normalize_barcode(barcode)?;
        return Ok(Box::new(
            StaticLookup::new().with(barcode, ResolvedCountry::from_code(code)),
        ));
    }

    #[cfg(feature = "http")]
    {
        let lookup = origin_scan::lookup::HttpCountryLookup::new(&config.lookup)?;
        Ok(Box::new(lookup))
    }

    #[cfg(not(feature = "http"))]
    {
        let _ = config;
        Err("no --country given and HTTP lookup is not enabled (build with --features http)".into())
    }
}

fn event_log_for(config: &FileConfig) -> Result<Box<dyn EventLog>, Box<dyn std::error::Error>> {
    if !config.lookup.log_events {
        return Ok(Box::new(NoopEventLog));
    }

    #[cfg(feature = "http")]
    {
        let log = origin_scan::lookup::HttpEventLog::new(&config.lookup)?;
        Ok(Box::new(log))
    }

    #[cfg(not(feature = "http"))]
    {
        warn!("Event logging needs the http feature; events are dropped");
        Ok(Box::new(NoopEventLog))
    }
}

/// Preview regions presented for each barcode.
///
/// With gating on, a glancing read outside the frame precedes one aimed at
/// it. With gating off any read is accepted, so only one is sent.
fn scripted_reads(frame: &TargetFrame, gating_enabled: bool) -> Vec<Rect> {
    let target = *frame.rect();
    let inside = Rect::new(
        target.x + target.width / 4.0,
        target.y + target.height / 4.0,
        target.width / 2.0,
        target.height / 2.0,
    );
    if gating_enabled {
        vec![Rect::new(0.0, 0.0, 20.0, 10.0), inside]
    } else {
        vec![inside]
    }
}

async fn simulate(
    config: &FileConfig,
    barcodes: Vec<String>,
    country: &str,
    gating_enabled: bool,
    print_metrics: bool,
) -> CliResult {
    info!("Origin Scan v{}", origin_scan::VERSION);
    info!("This is a simulation using mock camera input");

    let scanner = Scanner::new(
        Box::new(MockCameraDevice::new()),
        Arc::new(StaticPermission::authorized()),
        Box::new(MemoryStore::new()),
    );
    let (handle, tasks) = scanner.spawn(&config.scanner, &config.ledger)?;

    let frame = config.scanner.target_frame();
    let reads = scripted_reads(&frame, gating_enabled);
    let events = event_log_for(config)?;
    let lookup = barcodes.iter().fold(StaticLookup::new(), |lookup, barcode| {
        lookup.with(barcode.trim(), ResolvedCountry::from_code(country))
    });

    let mut actions = handle.subscribe_actions();
    handle.start_session(frame, gating_enabled).await?;

    let sender = handle.detection_sender();
    for barcode in &barcodes {
        for region in &reads {
            sender.send(DetectionEvent::new(barcode.clone(), *region)).await?;
        }

        loop {
            match actions.recv().await? {
                OrchestratorAction::Ignored => info!(barcode = %barcode, "Detection ignored"),
                OrchestratorAction::Accepted(code) => {
                    match process_barcode(handle.ledger(), &lookup, events.as_ref(), &code).await {
                        Ok(outcome) => println!(
                            "{} {} ({}), {} scans left",
                            outcome.item().flag_glyph,
                            code,
                            if outcome.is_charged() { "charged" } else { "repeat" },
                            handle.remaining_scans()
                        ),
                        Err(e) => warn!(barcode = %code, error = %e, "Scan not recorded"),
                    }
                    break;
                }
            }
        }

        handle.resume_after_pause().await?;
    }

    handle.teardown().await?;
    let view = handle.session_view();
    info!(
        seen = view.stats.seen,
        accepted = view.stats.accepted,
        ignored = view.stats.ignored,
        discarded = view.stats.discarded,
        "Simulation finished"
    );

    if print_metrics {
        let registry = MetricsRegistry::new()?;
        registry.update(&MetricsSnapshot::from_views(&view, &handle.ledger_view()));
        print!("{}", registry.encode()?);
    }

    drop(handle);
    tasks.join().await;
    Ok(())
}

fn prefs(config: &FileConfig, command: PrefsCommands) -> CliResult {
    let path = &config.ledger.preferences_path;
    let mut prefs = CountryPreferences::load(path)?;

    match command {
        PrefsCommands::Show => {
            println!("Supported: {}", prefs.supported().join(", "));
            println!("Boycotted: {}", prefs.boycotted().join(", "));
        }
        PrefsCommands::Support { code } => {
            let on = prefs.toggle_supported(&code)?;
            prefs.save(path)?;
            let status = if on { "supported" } else { "no longer supported" };
            println!("{} {}", code.to_ascii_uppercase(), status);
        }
        PrefsCommands::Boycott { code } => {
            let on = prefs.toggle_boycotted(&code)?;
            prefs.save(path)?;
            let status = if on { "boycotted" } else { "no longer boycotted" };
            println!("{} {}", code.to_ascii_uppercase(), status);
        }
        PrefsCommands::Stance { code } => {
            let stance = match prefs.stance(&code) {
                CountryStance::Neutral => "neutral",
                CountryStance::Supported => "supported",
                CountryStance::Boycotted => "boycotted",
                CountryStance::Conflicted => "both supported and boycotted",
            };
            println!("{}: {}", code.to_ascii_uppercase(), stance);
        }
    }
    Ok(())
}
