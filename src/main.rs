mod alert;
mod cache;
mod config;
mod db;
mod fetch;
mod paginate;
mod parser;
mod pipeline;
mod reconcile;

use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use crate::alert::AlertLog;
use crate::config::Settings;
use crate::fetch::HttpFetcher;
use crate::pipeline::Pipeline;

#[derive(Parser)]
#[command(name = "knesset_ingest", about = "Knesset bill and proposal ingestion")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,
    /// Manage Knesset terms (needed to date government proposals)
    Term {
        #[command(subcommand)]
        action: TermAction,
    },
    /// Ingest member-proposed laws
    Private {
        /// Stop after the page that reaches this many days back
        #[arg(short, long, default_value = "15")]
        days_back: i64,
    },
    /// Ingest government proposal booklets
    Gov {
        /// Stop at this booklet (default: highest booklet already stored)
        #[arg(short, long)]
        min_booklet: Option<i64>,
    },
    /// Re-ingest a single booklet document
    Refresh {
        /// Booklet PDF URL
        #[arg(short, long)]
        url: String,
        /// Booklet number (default: taken from the stored proposal)
        #[arg(short, long)]
        booklet: Option<i64>,
        /// Proposal title (default: read from the document)
        #[arg(short, long)]
        title: Option<String>,
    },
    /// Forward one law to another
    MergeLaw {
        #[arg(long)]
        from: i64,
        #[arg(long)]
        into: i64,
    },
    /// Show store statistics
    Stats,
}

#[derive(Subcommand)]
enum TermAction {
    /// Add or update a term
    Add {
        #[arg(short, long)]
        number: i64,
        /// First day, YYYY-MM-DD
        #[arg(short, long)]
        start: NaiveDate,
        /// Day the next term starts, YYYY-MM-DD
        #[arg(short, long)]
        end: Option<NaiveDate>,
    },
    /// List known terms
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;
    let conn = db::connect(&settings.db_path)?;
    db::init_schema(&conn)?;

    let result = match cli.command {
        Commands::Init => {
            println!("Schema ready in {}", settings.db_path.display());
            Ok(())
        }
        Commands::Term { action: TermAction::Add { number, start, end } } => {
            db::upsert_knesset(&conn, &db::KnessetRow { number, start_date: start, end_date: end })?;
            println!("Knesset {} saved.", number);
            Ok(())
        }
        Commands::Term { action: TermAction::List } => {
            let terms = db::list_knessets(&conn)?;
            if terms.is_empty() {
                println!("No terms. Add them with 'term add'.");
                return Ok(());
            }
            println!("{:>3} | {:<10} | {:<10}", "#", "Start", "End");
            println!("{}", "-".repeat(29));
            for t in &terms {
                let end = t.end_date.map(|d| d.to_string()).unwrap_or_else(|| "-".into());
                println!("{:>3} | {:<10} | {:<10}", t.number, t.start_date, end);
            }
            Ok(())
        }
        Commands::Private { days_back } => {
            let fetcher = HttpFetcher::new(&settings)?;
            let alerts = AlertLog::new(settings.alerts_path.clone());
            println!("Ingesting private laws from the last {} days...", days_back);
            let summary = Pipeline::new(&conn, &fetcher, &alerts, &settings)
                .with_progress(spinner())
                .run_private(days_back)
                .await?;
            summary.print();
            Ok(())
        }
        Commands::Gov { min_booklet } => {
            let min_booklet = match min_booklet {
                Some(n) => n,
                None => db::max_booklet(&conn)?.unwrap_or(0),
            };
            let fetcher = HttpFetcher::new(&settings)?;
            let alerts = AlertLog::new(settings.alerts_path.clone());
            println!("Ingesting government booklets above {}...", min_booklet);
            let summary = Pipeline::new(&conn, &fetcher, &alerts, &settings)
                .with_progress(spinner())
                .run_gov(min_booklet)
                .await?;
            summary.print();
            Ok(())
        }
        Commands::Refresh { url, booklet, title } => {
            let fetcher = HttpFetcher::new(&settings)?;
            let alerts = AlertLog::new(settings.alerts_path.clone());
            let summary = Pipeline::new(&conn, &fetcher, &alerts, &settings)
                .refresh_gov(&url, booklet, title.as_deref())
                .await?;
            summary.print();
            Ok(())
        }
        Commands::MergeLaw { from, into } => {
            db::merge_law(&conn, from, into)
                .with_context(|| format!("Failed to merge law {} into {}", from, into))?;
            println!("Law {} now forwards to {}.", from, into);
            Ok(())
        }
        Commands::Stats => {
            let s = db::get_stats(&conn)?;
            println!("Terms:             {}", s.knessets);
            println!("Laws:              {} ({} merged)", s.laws, s.merged_laws);
            println!("Bills:             {}", s.bills);
            println!("Gov proposals:     {}", s.gov_proposals);
            println!("Private proposals: {}", s.private_proposals);
            println!("Cached files:      {}", s.cached_files);
            match s.max_booklet {
                Some(b) => println!("Latest booklet:    {}", b),
                None => println!("Latest booklet:    -"),
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} records | {msg}")
            .unwrap(),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
