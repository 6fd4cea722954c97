mod config;
mod export;
mod filter;
mod heuristics;
mod import;
mod record;
mod render;
mod store;

use std::path::PathBuf;

use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use config::{Backend, Config};
use export::{ExportFormat, ExportMeta};
use filter::{RecordFilter, SortKey, SortOrder};
use record::{PqStatus, RecordDraft};
use store::{RecordStore, StoreError};

#[derive(Parser)]
#[command(
    name = "pq_tracker",
    version,
    about = "Track phytosanitary (PQ) certification records for export shipments"
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(
        long,
        global = true,
        env = "PQ_TRACKER_CONFIG",
        default_value = ".config/pq_tracker.toml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a record, optionally pre-filled from an invoice spreadsheet.
    Add(FormArgs),
    /// Edit an existing record.
    Edit {
        id: Uuid,
        #[command(flatten)]
        form: FormArgs,
    },
    /// Delete a record.
    Delete { id: Uuid },
    /// Show one record in full.
    Show { id: Uuid },
    /// List records with filters, search and sorting.
    List(ListArgs),
    /// Run the invoice extractor without saving anything.
    Extract {
        file: PathBuf,
        /// Print the full extraction report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Export the filtered list to a spreadsheet or PDF.
    Export {
        out: PathBuf,
        /// Output format; inferred from the file extension when omitted.
        #[arg(long, value_enum)]
        format: Option<ExportFormat>,
        #[command(flatten)]
        list: ListArgs,
    },
    /// Change settings in the config file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Choose where records are stored.
    SetBackend {
        #[arg(value_enum)]
        backend: Backend,
    },
}

#[derive(Args)]
struct FormArgs {
    /// Set a form field, e.g. `--set commodity="Fresh mangoes"`. Repeatable.
    #[arg(long = "set", value_name = "FIELD=VALUE")]
    set: Vec<String>,
    /// Invoice spreadsheet used to pre-fill the form.
    #[arg(long, value_name = "FILE")]
    invoice: Option<PathBuf>,
    /// Let invoice values replace fields that already have a value.
    #[arg(long)]
    overwrite: bool,
}

#[derive(Args)]
struct ListArgs {
    #[arg(long)]
    status: Option<PqStatus>,
    #[arg(long)]
    destination: Option<String>,
    /// Substring of the exporter name.
    #[arg(long)]
    exporter: Option<String>,
    /// Earliest invoice date (inclusive).
    #[arg(long, value_parser = parse_date_arg)]
    from: Option<NaiveDate>,
    /// Latest invoice date (inclusive).
    #[arg(long, value_parser = parse_date_arg)]
    to: Option<NaiveDate>,
    /// Free-text search; every word must match.
    #[arg(long, short)]
    search: Option<String>,
    #[arg(long, value_enum, default_value_t = SortKey::Created)]
    sort: SortKey,
    #[arg(long, value_enum, default_value_t = SortOrder::Desc)]
    order: SortOrder,
}

impl ListArgs {
    fn filter(&self) -> RecordFilter {
        RecordFilter {
            status: self.status,
            destination: self.destination.clone(),
            exporter: self.exporter.clone(),
            from: self.from,
            to: self.to,
            search: self.search.clone(),
        }
    }
}

fn parse_date_arg(s: &str) -> Result<NaiveDate, String> {
    heuristics::parse_date(s).ok_or_else(|| format!("not a recognised date: {s}"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    match cli.command {
        Command::Add(form) => {
            let store = store::open(&cfg.store)?;
            let mut draft = RecordDraft::default();
            fill_form(&mut draft, &form)?;

            let record = draft.build(Utc::now())?;
            import::find_duplicates(store.as_ref(), &record.invoice_no, None).await?;
            let stored = store.insert(&record).await?;
            info!(id = %stored.id, "Record created");
            print!("{}", render::record_detail(&stored));
        }
        Command::Edit { id, form } => {
            let store = store::open(&cfg.store)?;
            let existing = store.get(id).await?.ok_or(StoreError::NotFound(id))?;
            let mut draft = RecordDraft::from_record(&existing);
            fill_form(&mut draft, &form)?;

            let record = draft.merge_into(&existing, Utc::now())?;
            import::find_duplicates(store.as_ref(), &record.invoice_no, Some(id)).await?;
            let stored = store.update(&record).await?;
            print!("{}", render::record_detail(&stored));
        }
        Command::Delete { id } => {
            let store = store::open(&cfg.store)?;
            store.delete(id).await?;
            println!("Deleted {id}");
        }
        Command::Show { id } => {
            let store = store::open(&cfg.store)?;
            let record = store.get(id).await?.ok_or(StoreError::NotFound(id))?;
            print!("{}", render::record_detail(&record));
        }
        Command::List(args) => {
            let store = store::open(&cfg.store)?;
            let records = filtered(store.as_ref(), &args).await?;
            print!("{}", render::record_table(&records));
        }
        Command::Extract { file, json } => {
            let report = heuristics::extract_from_path(&file)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", render::extraction_summary(&report));
            }
        }
        Command::Export { out, format, list } => {
            let store = store::open(&cfg.store)?;
            let records = filtered(store.as_ref(), &list).await?;
            let meta = ExportMeta {
                title: cfg.export.title.clone(),
                generated_at: Utc::now(),
            };
            let format = export::write_export(&out, &records, format, &meta)?;
            println!(
                "Exported {} record(s) to {} ({format:?})",
                records.len(),
                out.display()
            );
        }
        Command::Config {
            action: ConfigAction::SetBackend { backend },
        } => {
            Config::set_backend(&cli.config, backend)?;
            println!("Store backend set to {}", backend.as_str());
        }
    }

    Ok(())
}

/// Invoice first, then explicit `--set` values, so typed values always win.
fn fill_form(draft: &mut RecordDraft, form: &FormArgs) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = &form.invoice {
        let report = import::import_invoice(path, draft, form.overwrite)?;
        print!("{}", render::extraction_summary(&report));
    }
    for assignment in &form.set {
        draft.assign(assignment)?;
    }
    Ok(())
}

async fn filtered(
    store: &dyn RecordStore,
    args: &ListArgs,
) -> Result<Vec<record::ShipmentRecord>, StoreError> {
    let records = store.list().await?;
    Ok(filter::apply(records, &args.filter(), args.sort, args.order))
}
