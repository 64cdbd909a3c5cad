// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metrics_reconciliation::{
    write_csv, BatchOutcome, ExtractionResponse, ReconConfig, ReconciliationSession,
};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "metrics-recon")]
#[command(about = "Reconcile financial metrics extracted from multiple sources")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, global = true, env = "RECON_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge extraction response files and print a summary
    Import {
        /// Extraction response JSON files, merged in order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Write the projected table to this CSV file
        #[arg(short, long)]
        export: Option<PathBuf>,
    },

    /// Open the terminal viewer over the merged files
    View {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Fetch fiscal years from the configured extraction endpoint
    #[cfg(feature = "fetch")]
    Fetch {
        #[arg(required = true)]
        years: Vec<i32>,

        #[arg(short, long)]
        export: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("metrics_reconciliation=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = ReconConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;

    match args.command {
        Command::Import { files, export } => run_import(&config, &files, export.as_deref()),
        Command::View { files } => run_ui_mode(&config, &files),
        #[cfg(feature = "fetch")]
        Command::Fetch { years, export } => run_fetch(&config, &years, export.as_deref()),
    }
}

fn load_session(config: &ReconConfig, files: &[PathBuf]) -> Result<ReconciliationSession> {
    let mut session = ReconciliationSession::from_config(config).context("Failed to set up session")?;

    for path in files {
        let response = ExtractionResponse::from_path(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        match session.ingest(&response) {
            BatchOutcome::Merged(outcome) => println!(
                "✓ {}: {} new observations, {} duplicates",
                path.display(),
                outcome.appended,
                outcome.duplicates
            ),
            BatchOutcome::AlreadyMerged => println!("• {}: identical batch already merged", path.display()),
        }
    }

    Ok(session)
}

fn print_summary(session: &ReconciliationSession) {
    let ledger = session.ledger();
    let table = session.project();

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("📊 {} metrics × {} periods", ledger.metric_count(), table.periods.len());
    println!("   {} cells, {} observations", ledger.cell_count(), ledger.observation_count());
    println!("⚠️  {} cells with conflicting sources", table.conflict_count());

    for row in table.rows.iter().filter(|row| row.conflict_count() > 0) {
        let periods: Vec<String> = row
            .cells
            .iter()
            .filter(|cell| cell.is_conflict)
            .map(|cell| cell.period.label())
            .collect();
        println!("   {}: {}", row.title, periods.join(", "));
    }
}

fn export_to(session: &ReconciliationSession, path: &Path) -> Result<()> {
    write_csv(path, &session.project(), session.export_options())
        .with_context(|| format!("Failed to export to {}", path.display()))?;
    println!("\n💾 Exported to {}", path.display());
    Ok(())
}

fn run_import(config: &ReconConfig, files: &[PathBuf], export: Option<&Path>) -> Result<()> {
    println!("📂 Merging {} extraction files...\n", files.len());
    let session = load_session(config, files)?;
    print_summary(&session);

    if let Some(path) = export {
        export_to(&session, path)?;
    }

    Ok(())
}

#[cfg(feature = "fetch")]
fn run_fetch(config: &ReconConfig, years: &[i32], export: Option<&Path>) -> Result<()> {
    use metrics_reconciliation::ExtractionClient;

    let client = ExtractionClient::from_config(&config.extraction)?;
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;

    println!("🌐 Fetching {} years from {}...\n", years.len(), client.endpoint());
    let results = runtime.block_on(client.fetch_years(years));

    let mut session = ReconciliationSession::from_config(config)?;
    let mut failed = Vec::new();
    for (year, result) in results {
        match result {
            Ok(response) => {
                let outcome = session.ingest(&response);
                println!("✓ {}: {:?}", year, outcome);
            }
            Err(e) => {
                println!("❌ {}: {}", year, e);
                failed.push(year);
            }
        }
    }

    print_summary(&session);
    if !failed.is_empty() {
        info!(?failed, "some years failed, re-run to retry them");
    }

    if let Some(path) = export {
        export_to(&session, path)?;
    }

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &ReconConfig, files: &[PathBuf]) -> Result<()> {
    println!("🖥️  Loading Metrics Reconciliation viewer...\n");
    let session = load_session(config, files)?;
    println!("\nStarting UI... (Press 'q' to quit)\n");

    let mut app = ui::App::new(session);
    ui::run_ui(&mut app)?;

    let selections = app.session.journal().len();
    info!(selections, "viewer closed");
    println!("\n✅ UI closed, {} selections made", selections);

    if let Some(path) = &config.audit.database {
        println!("   Selections logged to {}", path.display());
    }

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &ReconConfig, _files: &[PathBuf]) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the API: cargo run --bin recon-server --features server");
    std::process::exit(1);
}
