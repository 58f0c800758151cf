use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use moviedb_import::db::Db;
use moviedb_import::extract::read_import_batches;
use moviedb_import::import::run_import;
use moviedb_import::trace::init_tracing;
use moviedb_import::util::env as env_util;

/// Import a directory of movie catalog CSVs into Postgres in one
/// all-or-nothing run.
#[derive(Debug, Parser)]
#[command(name = "mdb-import", version)]
struct Args {
    /// Directory holding genres.csv, countries.csv, companies.csv,
    /// people.csv and movies.csv.
    #[arg(long, default_value = ".")]
    csv_dir: String,

    /// Postgres DSN; falls back to DATABASE_URL.
    #[arg(long)]
    database_url: Option<String>,

    /// Pool size for the import connection.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_util::init_env();
    init_tracing("info")?;
    let args = Args::parse();

    let database_url = match args.database_url {
        Some(url) => url,
        None => env_util::db_url().context("no --database-url and no DATABASE_URL set")?,
    };

    let batches = read_import_batches(&args.csv_dir)
        .with_context(|| format!("extracting csv batches from {}", args.csv_dir))?;

    let db = Db::connect(&database_url, args.max_connections).await?;

    match run_import(&db, &batches).await {
        Ok(report) => {
            info!("import committed");
            print!("{report}");
            Ok(())
        }
        Err(e) => {
            error!(
                entity = e.entity().map(|k| k.as_str()),
                row = e.row(),
                "import rolled back: {e}"
            );
            Err(e.into())
        }
    }
}
