use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod aggregate;
mod config;
mod dashboard;
mod db;
mod error;
mod models;
mod refresh;
mod report;
mod store;
mod streak;

use config::DbConfig;
use dashboard::DashboardOptions;
use models::DashboardData;

#[derive(Parser)]
#[command(name = "tutor-dashboard")]
#[command(about = "Learning session tracker and dashboard for the AI tutor", long_about = None)]
struct Cli {
    #[command(flatten)]
    db: DbConfig,

    /// Debug logging for this crate
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic demo sessions for a user
    Seed {
        #[arg(long)]
        user: String,
    },
    /// Import historical sessions from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Start a tutoring session and print its id
    Start {
        #[arg(long)]
        user: String,
        #[arg(long)]
        topic: String,
    },
    /// End an open tutoring session
    End {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        score: Option<i32>,
        /// Detected emotion label, repeatable
        #[arg(long = "emotion")]
        emotions: Vec<String>,
        #[arg(long)]
        messages: Option<i32>,
    },
    /// Print a user's dashboard
    Dashboard {
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = 7, value_parser = days_in_range())]
        days: u32,
        #[arg(long, default_value_t = 5)]
        recent: i64,
        /// Emit the dashboard as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown dashboard report
    Report {
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = 30, value_parser = days_in_range())]
        days: u32,
        #[arg(long, default_value = "dashboard.md")]
        out: PathBuf,
    },
    /// Reprint the dashboard whenever the user's sessions change
    Watch {
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = 7, value_parser = days_in_range())]
        days: u32,
        /// Quiet period that closes a burst of changes
        #[arg(long, default_value_t = 750)]
        debounce_ms: u64,
    },
}

fn days_in_range() -> clap::builder::RangedI64ValueParser<u32> {
    clap::value_parser!(u32).range(0..=aggregate::MAX_ACTIVITY_DAYS as i64)
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "warn,tutor_dashboard=debug"
    } else {
        "warn,tutor_dashboard=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::InitDb => {
            let pool = cli.db.require_pool()?;
            db::init_db(&pool).await.context("failed to run migrations")?;
            println!("Schema ready.");
        }
        Commands::Seed { user } => {
            let pool = cli.db.require_pool()?;
            let inserted = db::seed(&pool, &user).await?;
            println!("Inserted {inserted} demo sessions for {user}.");
        }
        Commands::Import { csv } => {
            let pool = cli.db.require_pool()?;
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} sessions from {}.", csv.display());
        }
        Commands::Start { user, topic } => {
            let pool = cli.db.require_pool()?;
            let id = db::start_session(&pool, &user, &topic).await?;
            println!("{id}");
        }
        Commands::End {
            id,
            score,
            emotions,
            messages,
        } => {
            let pool = cli.db.require_pool()?;
            let outcome = db::SessionOutcome {
                quiz_score: score,
                emotions,
                message_count: messages,
            };
            let session = db::end_session(&pool, id, &outcome).await?;
            println!(
                "Ended {} ({}) after {} min.",
                session.id,
                session.topic_name,
                session.minutes()
            );
        }
        Commands::Dashboard {
            user,
            days,
            recent,
            json,
        } => {
            let options = DashboardOptions {
                activity_days: days,
                recent_limit: recent,
            };
            let dashboard = dashboard::from_config(&cli.db, options)?;
            let data = dashboard::load_today(dashboard.as_ref(), &user).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                print!("{}", report::render_summary(&user, &data));
            }
        }
        Commands::Report { user, days, out } => {
            let options = DashboardOptions {
                activity_days: days,
                ..DashboardOptions::default()
            };
            let dashboard = dashboard::from_config(&cli.db, options)?;
            let data = dashboard::load_today(dashboard.as_ref(), &user).await;
            let report = report::build_report(&user, Utc::now().date_naive(), &data);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Watch {
            user,
            days,
            debounce_ms,
        } => {
            let options = DashboardOptions {
                activity_days: days,
                ..DashboardOptions::default()
            };
            let dashboard = dashboard::from_config(&cli.db, options)?
                .context("SUPABASE_DB_URL and SUPABASE_DB_PASSWORD must both be set")?;
            let events = refresh::listen_for_changes(dashboard.store().pool(), user.clone()).await?;
            let (updates, mut subscriber) = watch::channel(DashboardData::loading());

            let printer = tokio::spawn({
                let user = user.clone();
                async move {
                    while subscriber.changed().await.is_ok() {
                        let data = subscriber.borrow_and_update().clone();
                        print!("{}", report::render_summary(&user, &data));
                        println!();
                    }
                }
            });

            refresh::run(
                &dashboard,
                &user,
                events,
                Duration::from_millis(debounce_ms),
                updates,
            )
            .await;
            printer.await?;
        }
    }

    Ok(())
}
