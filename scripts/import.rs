#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use catalogd::{import_batch, migrate, repo, FailurePolicy};

#[derive(Parser)]
#[command(name = "catalog-import", about = "Catalog import helper")]
struct Cli {
    /// Path to the SQLite database (defaults to $CATALOGD_DB or ./catalog.sqlite3)
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Import a JSON batch file (a list of {EntityType: {id, ...fields}} items)
    Import {
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = Policy::RevertAll)]
        policy: Policy,
    },
    /// List all row ids for an entity type
    List { entity: String },
    /// Print the full row for an entity type and id
    Detail { entity: String, id: i64 },
}

#[derive(Clone, Copy, ValueEnum)]
enum Policy {
    /// Keep rows persisted before the first failure
    StopAndKeep,
    /// Roll the whole batch back on the first failure
    RevertAll,
}

impl From<Policy> for FailurePolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::StopAndKeep => FailurePolicy::StopAndKeep,
            Policy::RevertAll => FailurePolicy::RevertAll,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    catalogd::logging::init();

    let cli = Cli::parse();
    let db_path = cli
        .db
        .or_else(|| std::env::var_os("CATALOGD_DB").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("catalog.sqlite3"));

    let pool = catalogd::db::open_sqlite_pool(&db_path).await?;
    migrate::apply_migrations(&pool).await?;

    match cli.cmd {
        Cmd::Import { file, policy } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("read batch file {}", file.display()))?;
            let payload: serde_json::Value =
                serde_json::from_str(&raw).context("parse batch file as JSON")?;
            let result = import_batch(&pool, &payload, policy.into()).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.is_success() {
                std::process::exit(1);
            }
        }
        Cmd::List { entity } => {
            let ids = repo::list_ids(&pool, &entity).await?;
            println!("{}", serde_json::to_string(&ids)?);
        }
        Cmd::Detail { entity, id } => match repo::get_detail(&pool, &entity, id).await? {
            Some(row) => println!("{}", serde_json::to_string_pretty(&row)?),
            None => {
                eprintln!("{entity} {id} not found");
                std::process::exit(2);
            }
        },
    }

    Ok(())
}
