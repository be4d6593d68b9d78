#![forbid(unsafe_code)]
//! Operator CLI for the FarmTrace ledger: inspect, verify and serve the chain.

use clap::{Parser, Subcommand};
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Color as TableColor;
use comfy_table::{Attribute, Cell, ContentArrangement, Table};
use farmtrace_ledger::blockchain::{AnnotatedTransaction, ChainStats, Ledger};
use farmtrace_ledger::config::{load_config, Config, DEFAULT_CONFIG_FILE};
use farmtrace_ledger::recorder::share;
use farmtrace_ledger::transaction::{EventKind, LedgerEvent};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the configured store, writing the genesis block if it is empty
    Init,
    /// Show chain statistics
    Stats,
    /// Re-check every block digest and link; exits non-zero when tampered
    Verify,
    /// List every sealed event for one batch
    History {
        /// Batch code, e.g. BT-0001
        batch_code: String,
    },
    /// Print the full chain as JSON
    Chain,
    /// Serve the read-only audit API
    Serve {
        /// Overrides `api.port` from the config file
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    init_tracing(&config);

    let ledger = Ledger::from_config(&config)?;

    match cli.command {
        Commands::Init => init(&config, &ledger),
        Commands::Stats => print_stats(&ledger.stats()),
        Commands::Verify => return Ok(verify(&ledger)),
        Commands::History { batch_code } => history(&ledger, &batch_code),
        Commands::Chain => println!("{}", serde_json::to_string_pretty(ledger.full_chain())?),
        Commands::Serve { port } => {
            let port = port.unwrap_or(config.api.port);
            println!(
                "{}",
                format!("🌾 FarmTrace audit API on http://0.0.0.0:{}/api", port).bright_green()
            );
            farmtrace_ledger::api::run_api_server(share(ledger), port).await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn init(config: &Config, ledger: &Ledger) {
    println!("{}", "✅ Ledger ready".green().bold());
    println!("   Store:      {}", config.storage.path.display());
    println!("   Blocks:     {}", ledger.len());
    println!("   Difficulty: {}", ledger.difficulty());
    if let Some(genesis) = ledger.full_chain().first() {
        println!("   Genesis:    {}", genesis.hash.bright_cyan());
    }
}

fn print_stats(stats: &ChainStats) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Metric")
                .fg(TableColor::Cyan)
                .add_attribute(Attribute::Bold),
            Cell::new("Value")
                .fg(TableColor::Cyan)
                .add_attribute(Attribute::Bold),
        ]);

    let (valid_text, valid_color) = if stats.is_valid {
        ("intact", TableColor::Green)
    } else {
        ("TAMPERED", TableColor::Red)
    };

    table.add_row(vec![Cell::new("Blocks"), Cell::new(stats.total_blocks)]);
    table.add_row(vec![
        Cell::new("Transactions"),
        Cell::new(stats.total_transactions),
    ]);
    table.add_row(vec![
        Cell::new("Pending"),
        Cell::new(stats.pending_transactions),
    ]);
    table.add_row(vec![
        Cell::new("Integrity"),
        Cell::new(valid_text).fg(valid_color),
    ]);
    table.add_row(vec![
        Cell::new("Last block hash"),
        Cell::new(&stats.last_block_hash).fg(TableColor::Grey),
    ]);

    println!("{}", table);
}

fn verify(ledger: &Ledger) -> ExitCode {
    match ledger.validate() {
        Ok(()) => {
            println!(
                "{}",
                format!("✅ {} blocks verified, no tampering detected", ledger.len())
                    .green()
                    .bold()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", "❌ Blockchain integrity compromised!".red().bold());
            eprintln!("   {}", e.to_string().red());
            ExitCode::FAILURE
        }
    }
}

fn history(ledger: &Ledger, batch_code: &str) {
    let records = ledger.transactions_for_batch(batch_code);
    if records.is_empty() {
        println!(
            "{}",
            format!("📭 No blockchain records found for {}", batch_code).yellow()
        );
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Block")
                .fg(TableColor::Cyan)
                .add_attribute(Attribute::Bold),
            Cell::new("Event")
                .fg(TableColor::Cyan)
                .add_attribute(Attribute::Bold),
            Cell::new("Details")
                .fg(TableColor::Cyan)
                .add_attribute(Attribute::Bold),
            Cell::new("Recorded")
                .fg(TableColor::Cyan)
                .add_attribute(Attribute::Bold),
        ]);

    for record in &records {
        let kind = record.transaction.kind();
        table.add_row(vec![
            Cell::new(format!("#{}", record.block_index)).fg(TableColor::White),
            Cell::new(kind).fg(kind_color(kind)),
            Cell::new(describe(record)).fg(TableColor::White),
            Cell::new(record.transaction.recorded_at.format("%Y-%m-%d %H:%M:%S"))
                .fg(TableColor::Grey),
        ]);
    }

    println!("{}", format!("📜 History for {}", batch_code).bright_cyan().bold());
    println!("{}", table);
    println!("{}", format!("{} records", records.len()).blue());
}

fn kind_color(kind: EventKind) -> TableColor {
    match kind {
        EventKind::BatchCreated => TableColor::Green,
        EventKind::TransferInitiated | EventKind::TransferAccepted => TableColor::Yellow,
        EventKind::PickupConfirmed | EventKind::DropoffConfirmed => TableColor::Magenta,
        EventKind::AuctionPriceSet | EventKind::RetailPriceSet => TableColor::Cyan,
        EventKind::Genesis | EventKind::UserRegistered => TableColor::White,
    }
}

fn describe(record: &AnnotatedTransaction) -> String {
    match &record.transaction.event {
        LedgerEvent::BatchCreated {
            crop,
            quantity_kg,
            farmer_name,
            ..
        } => format!("{} kg {} by {}", quantity_kg, crop, farmer_name),
        LedgerEvent::TransferInitiated {
            from_owner_name,
            to_owner_name,
            ..
        } => format!("{} → {}", from_owner_name, to_owner_name),
        LedgerEvent::TransferAccepted {
            new_owner_name,
            new_status,
            ..
        } => format!("{} ({})", new_owner_name, new_status),
        LedgerEvent::PickupConfirmed {
            transporter_name,
            pickup_location,
            ..
        } => format!(
            "{} at {}",
            transporter_name,
            pickup_location.as_deref().unwrap_or("-")
        ),
        LedgerEvent::DropoffConfirmed {
            transporter_name,
            dropoff_location,
            ..
        } => format!(
            "{} at {}",
            transporter_name,
            dropoff_location.as_deref().unwrap_or("-")
        ),
        LedgerEvent::AuctionPriceSet {
            auction_price_per_kg,
            percentage_change,
            ..
        } => format!("₹{}/kg ({}%)", auction_price_per_kg, percentage_change),
        LedgerEvent::RetailPriceSet {
            retail_price_per_kg,
            retailer_name,
            ..
        } => format!("₹{}/kg at {}", retail_price_per_kg, retailer_name),
        LedgerEvent::UserRegistered { name, role, .. } => format!("{} ({})", name, role),
        LedgerEvent::Genesis { message, .. } => message.clone(),
    }
}
