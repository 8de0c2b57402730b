use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use sqlx::PgPool;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod db;
mod engagement;
mod error;
#[cfg(test)]
mod memory;
mod models;
mod report;
mod store;
mod user;

use engagement::{EngagementParams, DEFAULT_MAX_COMMENTS_PER_CHECKIN};
use error::EngagementError;
use models::{EngagementReport, TimeWindow};

#[derive(Parser)]
#[command(name = "engagement-ratings")]
#[command(about = "Engagement ratings from comments on connected check-ins", long_about = None)]
struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Compute ratings and print them
    Score {
        #[command(flatten)]
        run: RunArgs,
        /// Print the raw organization -> ratings mapping as JSON
        #[arg(long)]
        json: bool,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Compute ratings and write a markdown report
    Report {
        #[command(flatten)]
        run: RunArgs,
        #[arg(long, default_value = "engagement.md")]
        out: PathBuf,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Compute ratings and write one CSV row per member
    Export {
        #[command(flatten)]
        run: RunArgs,
        #[arg(long, default_value = "engagement.csv")]
        out: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Window length ending now, used when --from is not given
    #[arg(long, default_value_t = 7)]
    since_days: i64,
    /// Window start (RFC 3339 or YYYY-MM-DD)
    #[arg(long, value_parser = parse_time)]
    from: Option<DateTime<Utc>>,
    /// Window end, exclusive (RFC 3339 or YYYY-MM-DD); defaults to now
    #[arg(long, value_parser = parse_time)]
    to: Option<DateTime<Utc>>,
    #[arg(long, default_value_t = DEFAULT_MAX_COMMENTS_PER_CHECKIN)]
    max_comments_per_checkin: usize,
    /// Compute without writing ratings back
    #[arg(long)]
    dry_run: bool,
    /// Abort the run (and roll back) after this many seconds
    #[arg(long, env = "ENGAGEMENT_TIMEOUT_SECS", default_value_t = 300)]
    timeout_secs: u64,
}

impl RunArgs {
    fn params(&self) -> Result<EngagementParams, EngagementError> {
        let from = match self.from {
            Some(from) => from,
            None => engagement::window_start(self.since_days)?,
        };
        Ok(EngagementParams {
            to: self.to,
            persist: !self.dry_run,
            max_comments_per_checkin: self.max_comments_per_checkin,
            ..EngagementParams::new(from)
        })
    }
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|at| at.and_utc())
        .ok_or_else(|| format!("expected RFC 3339 or YYYY-MM-DD, got {value}"))
}

/// Runs one scoring pass inside a single transaction, committing only if
/// the whole run finishes before the timeout or Ctrl-C.
async fn run_engagement(
    pool: &PgPool,
    run: &RunArgs,
) -> anyhow::Result<(TimeWindow, EngagementReport)> {
    let params = run.params()?;
    let window = params.window()?;
    let params = EngagementParams {
        to: Some(window.to),
        ..params
    };

    let mut store = db::PgEngagementStore::begin(pool).await?;
    let timeout = Duration::from_secs(run.timeout_secs.max(1));

    let report = tokio::select! {
        result = tokio::time::timeout(timeout, engagement::compute_engagement(&mut store, &params)) => {
            match result {
                Ok(report) => report?,
                Err(_) => bail!("engagement run timed out after {}s; nothing was saved", timeout.as_secs()),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, rolling back engagement run");
            bail!("engagement run cancelled; nothing was saved");
        }
    };

    if params.persist {
        store.commit().await.context("failed to commit ratings")?;
        info!(organizations = report.organizations.len(), "ratings saved");
    }
    Ok((window, report))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("engagement_ratings={},warn", cli.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let database_url = cli
        .database_url
        .context("DATABASE_URL must be set to a production Postgres instance")?;
    let pool = db::connect(&database_url, 5).await?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Score { run, json, limit } => {
            let (window, report) = run_engagement(&pool, &run).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }

            if report.organizations.is_empty() {
                println!("No onboarded organizations to score.");
                return Ok(());
            }

            println!(
                "Engagement from {} to {}{}:",
                window.from.format("%Y-%m-%d %H:%M"),
                window.to.format("%Y-%m-%d %H:%M"),
                if run.dry_run { " (dry run)" } else { "" }
            );
            for organization in report::ranked_organizations(&report) {
                match organization.total {
                    Some(total) => println!("- {} total {:.3}", organization.name, total),
                    None => println!("- {} no rating", organization.name),
                }
            }
            println!("Top members:");
            for member in engagement::ranked_members(&report).iter().take(limit) {
                println!(
                    "- {} ({}) rating {:.3}",
                    member.member_name, member.organization_name, member.rating
                );
            }
        }
        Commands::Report { run, out, limit } => {
            let (window, report) = run_engagement(&pool, &run).await?;
            let markdown = report::build_report(&window, &report, limit);
            std::fs::write(&out, markdown)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { run, out } => {
            let (_, report) = run_engagement(&pool, &run).await?;
            let file = std::fs::File::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            let rows = report::write_csv(&report, file)?;
            println!("Exported {rows} member ratings to {}.", out.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn run_args() -> RunArgs {
        RunArgs {
            since_days: 7,
            from: None,
            to: None,
            max_comments_per_checkin: 2,
            dry_run: false,
            timeout_secs: 300,
        }
    }

    #[test]
    fn parses_dates_and_timestamps() {
        assert_eq!(
            parse_time("2026-01-05").unwrap(),
            Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_time("2026-01-05T09:30:00+02:00").unwrap(),
            Utc.with_ymd_and_hms(2026, 1, 5, 7, 30, 0).unwrap()
        );
        assert!(parse_time("last tuesday").is_err());
    }

    #[test]
    fn explicit_from_overrides_since_days() {
        let from = Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap();
        let args = RunArgs {
            from: Some(from),
            dry_run: true,
            ..run_args()
        };
        let params = args.params().unwrap();
        assert_eq!(params.from, from);
        assert!(!params.persist);
    }

    #[test]
    fn since_days_sets_window_start() {
        let params = run_args().params().unwrap();
        let expected = Utc::now() - chrono::Duration::days(7);
        assert!((params.from - expected).num_seconds().abs() < 5);
        assert!(params.persist);
        assert_eq!(params.max_comments_per_checkin, 2);
    }

    #[test]
    fn oversized_since_days_is_an_error() {
        let args = RunArgs {
            since_days: i64::MAX,
            ..run_args()
        };
        assert!(matches!(
            args.params(),
            Err(EngagementError::WindowOutOfRange(_))
        ));
    }

    #[test]
    fn cli_accepts_score_flags() {
        let cli = Cli::try_parse_from([
            "engagement-ratings",
            "--database-url",
            "postgres://localhost/engagement",
            "score",
            "--from",
            "2026-01-05",
            "--to",
            "2026-01-12",
            "--dry-run",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Score { run, json, .. } => {
                assert!(json);
                assert!(run.dry_run);
                assert_eq!(
                    run.to,
                    Some(Utc.with_ymd_and_hms(2026, 1, 12, 0, 0, 0).unwrap())
                );
            }
            _ => panic!("expected score command"),
        }
    }
}
