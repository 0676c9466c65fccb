use std::path::PathBuf;

use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tooling_sync::config::Settings;
use tooling_sync::forecast::{self, classify};
use tooling_sync::model::chain::ReplacementIndex;
use tooling_sync::model::{FieldMap, NewTooling, ToolingId};
use tooling_sync::normalize::{self, CellValue};
use tooling_sync::store::{SqliteStore, ToolingStore};
use tooling_sync::{Result, ToolError, records, sync};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        eprintln!("error: {error}");
        if error.is_structural() {
            eprintln!("the workbook was rejected before any tool was changed");
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    init_logging()?;
    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let store = SqliteStore::open(&cli.db)?;
    store.migrate()?;

    match cli.command {
        Command::Init => {
            info!(db = %cli.db.display(), "database ready");
            Ok(())
        }
        Command::Create(args) => execute_create(&store, args),
        Command::Update(args) => execute_update(&store, args),
        Command::Export(args) => {
            let rows = sync::export_to_file(
                &store,
                &args.supplier,
                &args.output,
                &settings,
                Utc::now(),
            )?;
            println!("Exported {rows} tools to {}", args.output.display());
            Ok(())
        }
        Command::Import(args) => {
            let outcome =
                sync::import_file(&args.input, &args.supplier, &store, &settings, Utc::now())?;
            println!("{}", outcome.summary());
            Ok(())
        }
        Command::Status(args) => execute_status(&store, args),
    }
}

fn init_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| ToolError::Logging(error.to_string()))
}

fn execute_create(store: &SqliteStore, args: CreateArgs) -> Result<()> {
    let date = |value: &Option<String>| {
        value
            .as_deref()
            .map(|text| normalize::normalize_date(&CellValue::text(text)))
            .filter(|iso| !iso.is_empty())
    };
    let new = NewTooling {
        pn: args.pn,
        supplier: args.supplier,
        pn_description: args.pn_description.unwrap_or_default(),
        tool_description: args.tool_description.unwrap_or_default(),
        tooling_life_qty: args.life,
        produced: args.produced,
        date_remaining_tooling_life: date(&args.production_date),
        annual_volume_forecast: args.annual_volume,
        date_annual_volume: date(&args.annual_volume_date),
    };
    let record = records::create_tooling(store, new, args.comment.as_deref(), Utc::now())?;
    println!("Created tool {} ({})", record.id, record.pn);
    Ok(())
}

fn execute_update(store: &SqliteStore, args: UpdateArgs) -> Result<()> {
    let mut incoming = FieldMap::new();
    for assignment in &args.set {
        let (field, value) = assignment.split_once('=').ok_or_else(|| {
            ToolError::InvalidRecord(format!("expected FIELD=VALUE, got '{assignment}'"))
        })?;
        incoming.insert(field.trim().to_string(), Value::String(value.to_string()));
    }
    let (_, changes) = records::update_tooling(
        store,
        args.id,
        &incoming,
        args.comment.as_deref(),
        args.initial.as_deref(),
        Utc::now(),
    )?;
    if changes.is_empty() {
        println!("No changes for tool {}", args.id);
    }
    for change in changes {
        println!(
            "{}: {} --> {}",
            change.label, change.old_formatted, change.new_formatted
        );
    }
    Ok(())
}

fn execute_status(store: &SqliteStore, args: StatusArgs) -> Result<()> {
    let today = Utc::now().date_naive();
    let records = store.list_for_supplier(&args.supplier)?;

    let chains = ReplacementIndex::build(&records);

    println!(
        "{:>6}  {:<20} {:<18} {:>10}  {:>8}  {:>7}  {:>10}  {}",
        "ID", "PN", "STATE", "EXPIRES", "DAYS", "USED %", "UPDATED", "CHAIN"
    );
    for record in &records {
        let status = classify(record, today);
        let expires = status
            .expiration_date
            .map(normalize::to_display)
            .unwrap_or_default();
        let days = status
            .diff_days
            .map(|days| days.to_string())
            .unwrap_or_default();
        let updated = record
            .last_update
            .as_deref()
            .map(|stamp| normalize::format_display_date(&CellValue::text(stamp)))
            .unwrap_or_default();
        let chain = chains.chain_text(record.id);
        println!(
            "{:>6}  {:<20} {:<18} {:>10}  {:>8}  {:>7}  {:>10}  {}",
            record.id,
            record.pn,
            status.state.as_str(),
            expires,
            days,
            normalize::format_number(status.percent_used),
            updated,
            chain
        );
    }

    let summary = forecast::summarize(&records, today);
    println!();
    println!("Expired:            {}", summary.expired);
    println!("Within 2 years:     {}", summary.within_two_years);
    println!("Within 5 years:     {}", summary.within_five_years);
    println!("Beyond 5 years:     {}", summary.beyond_five_years);
    println!("Unscheduled:        {}", summary.unscheduled);
    println!("Obsolete:           {}", summary.obsolete);
    println!("Total:              {}", summary.total());
    Ok(())
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Track tooling life and round-trip it through supplier workbooks."
)]
struct Cli {
    /// SQLite database holding the tooling records.
    #[arg(long, global = true, default_value = "tooling.db")]
    db: PathBuf,

    /// Optional JSON settings file overriding workbook defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database and bring its schema up to date.
    Init,
    /// Register a new tool.
    Create(CreateArgs),
    /// Change fields of an existing tool.
    Update(UpdateArgs),
    /// Write the supplier workbook.
    Export(ExportArgs),
    /// Read a filled-in supplier workbook back and rewrite it in place.
    Import(ImportArgs),
    /// Show the health of a supplier's tools.
    Status(StatusArgs),
}

#[derive(clap::Args)]
struct CreateArgs {
    #[arg(long)]
    pn: String,

    #[arg(long)]
    supplier: String,

    #[arg(long)]
    pn_description: Option<String>,

    #[arg(long)]
    tool_description: Option<String>,

    /// Rated tooling life in pieces.
    #[arg(long, default_value_t = 0.0)]
    life: f64,

    /// Pieces produced so far.
    #[arg(long, default_value_t = 0.0)]
    produced: f64,

    /// Date the production count was taken (DD/MM/YYYY or YYYY-MM-DD).
    #[arg(long)]
    production_date: Option<String>,

    #[arg(long)]
    annual_volume: Option<f64>,

    #[arg(long)]
    annual_volume_date: Option<String>,

    #[arg(long)]
    comment: Option<String>,
}

#[derive(clap::Args)]
struct UpdateArgs {
    #[arg(long)]
    id: ToolingId,

    /// Field assignment such as `produced=1200`; repeatable.
    #[arg(long = "set", value_name = "FIELD=VALUE")]
    set: Vec<String>,

    #[arg(long)]
    comment: Option<String>,

    /// Initials recorded with the comment.
    #[arg(long)]
    initial: Option<String>,
}

#[derive(clap::Args)]
struct ExportArgs {
    #[arg(long)]
    supplier: String,

    /// Output workbook path.
    #[arg(long)]
    output: PathBuf,
}

#[derive(clap::Args)]
struct ImportArgs {
    #[arg(long)]
    supplier: String,

    /// Workbook previously produced by `export`.
    #[arg(long)]
    input: PathBuf,
}

#[derive(clap::Args)]
struct StatusArgs {
    #[arg(long)]
    supplier: String,
}
