//! Deal Hunter CLI
//!
//! Scans deal feeds for listings priced well below their estimated value.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use deal_hunter::{Config, DealPipeline, MemoryStore, Opportunity};
use std::fs::File;
use std::io;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "deal-hunter")]
#[command(about = "Find underpriced deals in RSS feeds")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one scan cycle and show new opportunities
    Scan,

    /// Run scan cycles continuously
    Run {
        /// Seconds between cycles (defaults to SCAN_INTERVAL_SECONDS)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Show opportunities in memory, newest first
    List {
        /// Maximum number of opportunities to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show memory statistics
    Stats,

    /// Remove every opportunity from memory
    Clear,

    /// Export memory as CSV
    Export {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();

    // Load configuration
    let config = Config::from_env()?;

    match cli.command {
        Commands::Scan => scan_once(&config).await?,
        Commands::Run { interval } => {
            run_loop(&config, interval.unwrap_or(config.scan_interval_seconds)).await?
        }
        Commands::List { limit } => list_opportunities(&config, limit).await?,
        Commands::Stats => show_stats(&config).await?,
        Commands::Clear => clear_memory(&config).await?,
        Commands::Export { output } => export(&config, output.as_deref()).await?,
    }

    Ok(())
}

fn banner(title: &str) {
    println!("\n{}", "=".repeat(70));
    println!("  {}", title);
    println!("{}\n", "=".repeat(70));
}

async fn scan_once(config: &Config) -> Result<()> {
    banner(&format!(
        "DEAL SCAN | {} feeds | threshold ${}",
        config.scanner.feed_urls.len(),
        config.deal_threshold
    ));

    let pipeline = DealPipeline::from_config(config)?;
    let mut memory = MemoryStore::load(&config.memory_path).await?;

    let found = pipeline
        .run_cycle(&mut memory)
        .await
        .context("Scan cycle failed")?;

    if found.is_empty() {
        println!("No new opportunities this run.\n");
    } else {
        println!("{}\n", format!("Found {} new opportunities", found.len()).green().bold());
        print_opportunities(&found, found.len());
    }

    Ok(())
}

async fn run_loop(config: &Config, interval: u64) -> Result<()> {
    banner(&format!(
        "CONTINUOUS MODE | interval {}s | threshold ${}",
        interval, config.deal_threshold
    ));

    let pipeline = DealPipeline::from_config(config)?;
    let mut memory = MemoryStore::load(&config.memory_path).await?;

    println!("Starting continuous scan loop (Ctrl+C to stop)...\n");

    loop {
        match pipeline.run_cycle(&mut memory).await {
            Ok(found) => {
                if !found.is_empty() {
                    println!("\n--- Scan at {} ---", chrono::Utc::now().format("%H:%M:%S"));
                    for opp in &found {
                        println!("  {}", opp.headline());
                    }
                }
                info!("{} opportunities in memory", memory.len());
            }
            Err(e) => {
                // Memory could not be saved; stop rather than re-alert on the same deals
                error!("Scan cycle failed: {}", e);
                return Err(e.into());
            }
        }

        tokio::time::sleep(Duration::from_secs(interval)).await;
    }
}

async fn list_opportunities(config: &Config, limit: usize) -> Result<()> {
    let memory = MemoryStore::load(&config.memory_path).await?;

    banner(&format!("OPPORTUNITIES IN MEMORY ({})", memory.len()));

    let newest_first: Vec<Opportunity> = memory.opportunities().iter().rev().cloned().collect();
    print_opportunities(&newest_first, limit);

    Ok(())
}

async fn show_stats(config: &Config) -> Result<()> {
    let memory = MemoryStore::load(&config.memory_path).await?;
    let stats = memory.stats(config.deal_threshold);

    banner("MEMORY STATISTICS");

    println!("  Total Opportunities:    {}", stats.total);
    println!("  Average Discount:       ${:.2}", stats.average_discount);
    println!("  Best Discount:          ${:.2}", stats.best_discount);
    println!("  Total Savings:          ${:.2}", stats.total_savings);
    println!("  Above ${} Threshold:    {}", config.deal_threshold, stats.above_threshold);
    if let Some(latest) = stats.latest_discount {
        println!("  Latest Discount:        ${:.2}", latest);
    }
    println!();

    Ok(())
}

async fn clear_memory(config: &Config) -> Result<()> {
    let mut memory = MemoryStore::load(&config.memory_path).await?;
    let removed = memory.len();
    memory.clear();
    memory.persist().await?;

    println!("Cleared {} opportunities from {}", removed, memory.path().display());
    Ok(())
}

async fn export(config: &Config, output: Option<&str>) -> Result<()> {
    let memory = MemoryStore::load(&config.memory_path).await?;

    match output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("Failed to create {}", path))?;
            memory.export_csv(file)?;
            eprintln!("Exported {} opportunities to {}", memory.len(), path);
        }
        None => memory.export_csv(io::stdout().lock())?,
    }

    Ok(())
}

fn print_opportunities(opportunities: &[Opportunity], limit: usize) {
    if opportunities.is_empty() {
        println!("No opportunities to display.\n");
        return;
    }

    for (i, opp) in opportunities.iter().take(limit).enumerate() {
        println!("{}. {}", i + 1, opp.deal.short_description(60).bold());
        println!(
            "   Price: ${:.2} | Estimate: ${:.2} | Discount: {}",
            opp.deal.price,
            opp.estimated_value,
            format!("${:.2}", opp.discount()).green()
        );
        println!("   Found: {}", opp.discovered_at.format("%Y-%m-%d %H:%M UTC"));
        println!("   {}", opp.url());
        println!();
    }

    if opportunities.len() > limit {
        println!("   ... and {} more\n", opportunities.len() - limit);
    }
}
