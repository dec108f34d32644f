use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use tracing_subscriber::EnvFilter;

use subject_forecast::{
    db, default_catalog, report, CohortStatsTable, EngineConfig, InMemoryHistory, ModelArtifacts,
    PredictionEngine, StudentPerformanceCache,
};

#[derive(Parser)]
#[command(name = "subject-forecast")]
#[command(about = "Hybrid subject success forecasting for student course plans", long_about = None)]
struct Cli {
    /// Directory holding model.json and encoders.json
    #[arg(long, env = "FORECAST_MODEL_DIR", default_value = "models", global = true)]
    model_dir: PathBuf,
    /// Optional TOML file overriding engine constants
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Read student history from a CSV export instead of Postgres
    #[arg(long, global = true)]
    history_csv: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import subject results from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Predict success in one subject
    Predict {
        #[arg(long)]
        student: i64,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        json: bool,
    },
    /// Predict a multi-subject plan and write a markdown report
    Plan {
        #[arg(long)]
        student: i64,
        #[arg(long = "subject", required = true)]
        subjects: Vec<String>,
        #[arg(long, default_value = "forecast.md")]
        out: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Show the prerequisite chain for a subject
    Prerequisites {
        #[arg(long)]
        subject: String,
    },
    /// Show historical cohort statistics
    Cohort {
        #[arg(long)]
        subject: Option<String>,
    },
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn load_history(history_csv: Option<&Path>) -> anyhow::Result<InMemoryHistory> {
    match history_csv {
        Some(path) => db::load_csv_history(path),
        None => {
            let pool = connect().await?;
            db::fetch_history(&pool).await
        }
    }
}

fn build_engine(
    history: InMemoryHistory,
    model_dir: &Path,
    config: EngineConfig,
) -> PredictionEngine<InMemoryHistory> {
    let cohort_stats = CohortStatsTable::from_records(history.records());
    let artifacts = ModelArtifacts::load_dir(model_dir);
    let cache = StudentPerformanceCache::new(config.cache_capacity, config.cache_eviction_fraction);
    info!(
        students = history.len(),
        subjects = cohort_stats.len(),
        ml = artifacts.classifier.is_available(),
        "forecast engine ready"
    );
    PredictionEngine::new(
        history,
        default_catalog(),
        cohort_stats,
        artifacts,
        cache,
        config,
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect().await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let pool = connect().await?;
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} results from {}.", csv.display());
        }
        Commands::Predict {
            student,
            subject,
            json,
        } => {
            let history = load_history(cli.history_csv.as_deref()).await?;
            let engine = build_engine(history, &cli.model_dir, config);
            let prediction = engine.predict_one(student, &subject)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&prediction)?);
            } else {
                print!("{}", report::format_prediction(&prediction));
            }
        }
        Commands::Plan {
            student,
            subjects,
            out,
            json,
        } => {
            let history = load_history(cli.history_csv.as_deref()).await?;
            let engine = build_engine(history, &cli.model_dir, config);
            let forecast = engine.predict_many(student, &subjects)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&forecast)?);
            } else {
                std::fs::write(&out, report::build_report(&forecast))?;
                println!("Report written to {}.", out.display());
            }
        }
        Commands::Prerequisites { subject } => {
            let history = load_history(cli.history_csv.as_deref()).await?;
            let engine = build_engine(history, &cli.model_dir, config);
            let chain = engine.prerequisite_chain(&subject)?;

            println!("Prerequisites for {} ({}):", chain.subject_name, chain.subject_code);
            if chain.full_chain.is_empty() {
                println!("- none");
            }
            for link in &chain.full_chain {
                println!(
                    "{}- {} ({}) weight {:.1}",
                    "  ".repeat(link.depth.saturating_sub(1)),
                    link.subject_name,
                    link.subject_code,
                    link.weight
                );
            }
        }
        Commands::Cohort { subject } => {
            let history = load_history(cli.history_csv.as_deref()).await?;
            let engine = build_engine(history, &cli.model_dir, config);

            let stats: Vec<_> = match &subject {
                Some(code) => vec![engine.cohort_stat(code)?],
                None => engine.cohort_stats().iter().collect(),
            };

            if stats.is_empty() {
                println!("No cohort history loaded.");
                return Ok(());
            }

            for stat in stats {
                println!(
                    "- {} ({}) pass rate {:.1}% across {} students, avg score {}, avg GPA {}",
                    stat.subject_name,
                    stat.subject_code,
                    stat.pass_rate * 100.0,
                    stat.sample_size,
                    stat.avg_score
                        .map_or_else(|| "n/a".to_string(), |score| format!("{score:.1}")),
                    stat.avg_gpa
                        .map_or_else(|| "n/a".to_string(), |gpa| format!("{gpa:.2}")),
                );
            }
        }
    }

    Ok(())
}
