use clap::Parser;
use anyhow::Context;
use finrec_core::config::{RecommenderOptions, Settings};
use finrec_core::domain::recommendation::{Explanation, Recommendation};
use finrec_core::domain::sector::SectorMetrics;
use finrec_core::RecommenderSnapshot;
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod ingest;
mod universe;

#[derive(Debug, Parser)]
#[command(name = "finrec_worker")]
struct Args {
    /// Instrument universe JSON. Defaults to INSTRUMENTS_PATH.
    #[arg(long)]
    instruments: Option<PathBuf>,

    /// Holdings JSON ({user: {instrument: {quantity, purchase_price}}}). Defaults to HOLDINGS_PATH.
    #[arg(long)]
    holdings: Option<PathBuf>,

    /// Market data JSON. Defaults to MARKET_DATA_PATH when neither this nor --sector-etfs is given.
    #[arg(long, conflicts_with = "sector_etfs")]
    market_data: Option<PathBuf>,

    /// Fetch sector ETF history from the market data feed instead of a file.
    #[arg(long)]
    sector_etfs: bool,

    #[arg(long, default_value = "6mo")]
    period: String,

    #[arg(long, default_value = "1d")]
    interval: String,

    /// Run on the built-in sample universe.
    #[arg(long, conflicts_with_all = ["instruments", "holdings", "market_data", "sector_etfs"])]
    demo: bool,

    /// Sample history end date (YYYY-MM-DD) for --demo. Defaults to today's UTC date.
    #[arg(long, requires = "demo")]
    as_of_date: Option<String>,

    /// Users to report on. Defaults to every user in the holdings.
    #[arg(long = "user")]
    users: Vec<String>,

    #[arg(short = 'n', long, default_value_t = 5)]
    n: usize,

    #[arg(long, default_value = "month")]
    timeframe: String,

    #[arg(long, default_value_t = 3)]
    top_n: usize,

    /// Build the snapshot and log its size without printing a report.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Serialize)]
struct Report {
    timeframe: String,
    trending_sectors: Vec<SectorMetrics>,
    users: Vec<UserReport>,
    sector_recommendations: Vec<Recommendation>,
}

#[derive(Debug, Serialize)]
struct UserReport {
    user_id: String,
    recommendations: Vec<ExplainedRecommendation>,
}

#[derive(Debug, Serialize)]
struct ExplainedRecommendation {
    #[serde(flatten)]
    recommendation: Recommendation,
    explanations: Vec<Explanation>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    match run(&settings, args).await {
        Ok(()) => Ok(()),
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "recommendation run failed");
            Err(err)
        }
    }
}

async fn run(settings: &Settings, args: Args) -> anyhow::Result<()> {
    let inputs = if args.demo {
        ingest::load_demo(resolve_as_of_date(args.as_of_date.as_deref())?)?
    } else {
        let market = if args.sector_etfs {
            ingest::MarketSource::SectorEtfs {
                period: args.period.clone(),
                interval: args.interval.clone(),
            }
        } else {
            match args.market_data.clone().or_else(|| settings.market_data_path.clone()) {
                Some(path) => ingest::MarketSource::File(path),
                None => ingest::MarketSource::None,
            }
        };
        ingest::load_inputs(
            settings,
            args.instruments.clone(),
            args.holdings.clone(),
            market,
        )
        .await?
    };

    let options = RecommenderOptions::from_env();
    let snapshot = RecommenderSnapshot::build(
        &inputs.instruments,
        inputs.holdings,
        &inputs.market_data,
        &options,
    )
    .context("build recommender snapshot")?;

    if args.dry_run {
        tracing::info!(
            dry_run = true,
            instruments = snapshot.features().len(),
            dimension = snapshot.features().layout().dimension(),
            users = snapshot.holdings().len(),
            has_sector_analysis = snapshot.sector_analysis().is_ok(),
            "snapshot built (dry-run)"
        );
        return Ok(());
    }

    let report = build_report(&snapshot, &args)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn build_report(snapshot: &RecommenderSnapshot, args: &Args) -> anyhow::Result<Report> {
    let user_ids: Vec<String> = if args.users.is_empty() {
        snapshot.holdings().user_ids().map(str::to_string).collect()
    } else {
        args.users.clone()
    };

    let mut users = Vec::with_capacity(user_ids.len());
    for user_id in user_ids {
        let recs = snapshot
            .get_recommendations(&user_id, args.n)
            .with_context(|| format!("recommendations for user {user_id}"))?;

        let mut recommendations = Vec::with_capacity(recs.len());
        for recommendation in recs {
            let explanations =
                snapshot.explain_for_user(&user_id, &recommendation.instrument_id)?;
            recommendations.push(ExplainedRecommendation {
                recommendation,
                explanations,
            });
        }
        users.push(UserReport {
            user_id,
            recommendations,
        });
    }

    // Sector sections need market data; a run without it still reports holdings.
    let (trending_sectors, sector_recommendations) = match snapshot.sector_analysis() {
        Ok(_) => (
            snapshot
                .get_trending_sectors(&args.timeframe, args.top_n)?
                .to_vec(),
            snapshot.get_sector_based_recommendations(args.n, &args.timeframe)?,
        ),
        Err(err) => {
            tracing::warn!(error = %err, "no market data; skipping sector sections");
            (Vec::new(), Vec::new())
        }
    };

    Ok(Report {
        timeframe: args.timeframe.clone(),
        trending_sectors,
        users,
        sector_recommendations,
    })
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

fn resolve_as_of_date(as_of_date_arg: Option<&str>) -> anyhow::Result<chrono::NaiveDate> {
    if let Some(s) = as_of_date_arg {
        return chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid --as-of-date {s:?}"));
    }
    Ok(chrono::Utc::now().date_naive())
}
