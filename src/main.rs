mod mlb;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use tabled::{Table, Tabled};

use mlb::config::{Config, StoreCredentials};
use mlb::db::{SqliteStore, UpsertSink};
use mlb::endpoints::MLBClient;
use mlb::pipelines::{run_pipelines, Pipeline, PipelineOutcome, SyncContext};
use mlb::rest_store::RestStore;

/// Pull MLB games, standings and season stats into the store.
///
/// With no subcommand every pipeline runs once, in order.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct MLBCli {
    #[clap(subcommand)]
    cmd: Option<Commands>,

    /// Write into a local SQLite file instead of the hosted store
    #[clap(long, global = true)]
    sqlite: Option<PathBuf>,

    /// Season year, defaults to the current year
    #[clap(long, global = true)]
    season: Option<i32>,

    /// Days ahead covered by the schedule pipeline
    #[clap(long, global = true)]
    schedule_days: Option<i64>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Commands {
    /// Today's games
    Games,
    /// Division standings for both leagues
    Standings,
    /// Season batting lines
    Players,
    /// Upcoming schedule
    Schedule,
    /// Merged team hitting, pitching and fielding totals
    TeamStats,
}

impl From<Commands> for Pipeline {
    fn from(cmd: Commands) -> Self {
        match cmd {
            Commands::Games => Pipeline::Games,
            Commands::Standings => Pipeline::Standings,
            Commands::Players => Pipeline::PlayerStats,
            Commands::Schedule => Pipeline::Schedule,
            Commands::TeamStats => Pipeline::TeamStats,
        }
    }
}

#[derive(Tabled)]
struct SummaryRow {
    pipeline: &'static str,
    fetched: String,
    rejected: String,
    written: String,
    status: String,
}

impl From<&PipelineOutcome> for SummaryRow {
    fn from(outcome: &PipelineOutcome) -> Self {
        let pipeline = outcome.pipeline.name();
        match &outcome.result {
            Ok(report) => SummaryRow {
                pipeline,
                fetched: report.fetched.to_string(),
                rejected: report.rejected.to_string(),
                written: report.written.to_string(),
                status: "ok".to_string(),
            },
            Err(e) => SummaryRow {
                pipeline,
                fetched: "-".to_string(),
                rejected: "-".to_string(),
                written: "-".to_string(),
                status: format!("failed: {}", e),
            },
        }
    }
}

fn init_logging() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    pretty_env_logger::formatted_timed_builder().parse_filters(&filter).init();
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_logging();
    let args = MLBCli::parse();

    let mut config = Config::from_env()?;
    if let Some(season) = args.season {
        config.season = season;
    }
    if let Some(days) = args.schedule_days {
        config.schedule_days = days;
    }

    let sink: Box<dyn UpsertSink> = match &args.sqlite {
        Some(path) => {
            info!("Writing to local database {}", path.display());
            Box::new(SqliteStore::open(path).with_context(|| format!("opening {}", path.display()))?)
        }
        None => Box::new(RestStore::new(StoreCredentials::from_env()?, config.http_timeout)),
    };

    let client = MLBClient::new(&config.api_base_url, config.http_timeout);
    let ctx = SyncContext::new(&config, &client, sink.as_ref());
    let pipelines = match args.cmd {
        Some(cmd) => vec![Pipeline::from(cmd)],
        None => Pipeline::ALL.to_vec(),
    };

    let outcomes = run_pipelines(&ctx, &pipelines);
    let summary: Vec<SummaryRow> = outcomes.iter().map(SummaryRow::from).collect();
    println!("{}", Table::new(summary));

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    if failed > 0 {
        bail!("{} of {} pipelines failed", failed, outcomes.len());
    }
    Ok(())
}
