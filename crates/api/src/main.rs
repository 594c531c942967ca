use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use finrec_core::config::{RecommenderOptions, Settings};
use finrec_core::domain::instrument::UserHoldings;
use finrec_core::domain::recommendation::{Explanation, Recommendation};
use finrec_core::domain::sector::SectorMetrics;
use finrec_core::ingest::files;
use finrec_core::{RecommenderError, RecommenderSnapshot, SnapshotStore};

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

    let options = RecommenderOptions::from_env();
    let snapshot = match load_snapshot(&settings, &options) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "snapshot load failed; starting API with an empty universe");
            RecommenderSnapshot::build(&[], UserHoldings::new(), &[], &options)?
        }
    };

    let state = AppState {
        store: SnapshotStore::new(snapshot),
        settings: Arc::new(settings),
        options: Arc::new(options),
    };

    let app = router(state).layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/users/:user_id/recommendations", get(get_user_recommendations))
        .route(
            "/users/:user_id/recommendations/:instrument_id/explanation",
            get(get_explanation),
        )
        .route("/sectors/trending", get(get_trending_sectors))
        .route("/recommendations/sectors", get(get_sector_recommendations))
        .route("/snapshot/refresh", post(refresh_snapshot))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Clone)]
struct AppState {
    store: SnapshotStore,
    settings: Arc<Settings>,
    options: Arc<RecommenderOptions>,
}

/// Loads the configured input files and builds a snapshot. Market data is optional.
fn load_snapshot(
    settings: &Settings,
    options: &RecommenderOptions,
) -> anyhow::Result<RecommenderSnapshot> {
    let instruments = files::load_instruments(settings.require_instruments_path()?)?;
    let holdings = files::load_holdings(settings.require_holdings_path()?)?;
    let market_data = match &settings.market_data_path {
        Some(path) => files::load_market_data(path)?,
        None => Vec::new(),
    };

    Ok(RecommenderSnapshot::build(
        &instruments,
        holdings,
        &market_data,
        options,
    )?)
}

#[derive(Debug)]
enum ApiError {
    Recommender(RecommenderError),
    Internal(anyhow::Error),
}

impl From<RecommenderError> for ApiError {
    fn from(err: RecommenderError) -> Self {
        Self::Recommender(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn status_for(err: &RecommenderError) -> StatusCode {
    match err {
        RecommenderError::UserNotFound(_) | RecommenderError::UnknownInstrument(_) => {
            StatusCode::NOT_FOUND
        }
        RecommenderError::InvalidTimeframe { .. } => StatusCode::BAD_REQUEST,
        RecommenderError::InsufficientData { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Recommender(err) => {
                let status = status_for(&err);
                if status.is_server_error() {
                    sentry_anyhow::capture_anyhow(&anyhow::Error::new(err.clone()));
                    tracing::error!(error = %err, "request failed");
                }
                (status, err.to_string())
            }
            Self::Internal(err) => {
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct RecommendationsQuery {
    n: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SectorQuery {
    n: Option<usize>,
    top_n: Option<usize>,
    timeframe: Option<String>,
}

impl SectorQuery {
    fn timeframe<'a>(&'a self, options: &'a RecommenderOptions) -> &'a str {
        self.timeframe
            .as_deref()
            .unwrap_or(options.momentum_timeframe.as_str())
    }
}

const DEFAULT_N: usize = 5;

async fn get_user_recommendations(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<RecommendationsQuery>,
) -> Result<Json<Vec<Recommendation>>, ApiError> {
    let snapshot = state.store.current();
    let recs = snapshot.get_recommendations(&user_id, query.n.unwrap_or(DEFAULT_N))?;
    Ok(Json(recs))
}

async fn get_explanation(
    State(state): State<AppState>,
    Path((user_id, instrument_id)): Path<(String, String)>,
) -> Result<Json<Vec<Explanation>>, ApiError> {
    let snapshot = state.store.current();
    Ok(Json(snapshot.explain_for_user(&user_id, &instrument_id)?))
}

async fn get_trending_sectors(
    State(state): State<AppState>,
    Query(query): Query<SectorQuery>,
) -> Result<Json<Vec<SectorMetrics>>, ApiError> {
    let snapshot = state.store.current();
    let trending = snapshot.get_trending_sectors(
        query.timeframe(&state.options),
        query.top_n.unwrap_or(state.options.trending_sectors),
    )?;
    Ok(Json(trending.to_vec()))
}

async fn get_sector_recommendations(
    State(state): State<AppState>,
    Query(query): Query<SectorQuery>,
) -> Result<Json<Vec<Recommendation>>, ApiError> {
    let snapshot = state.store.current();
    let recs = snapshot.get_sector_based_recommendations(
        query.n.unwrap_or(DEFAULT_N),
        query.timeframe(&state.options),
    )?;
    Ok(Json(recs))
}

#[derive(Debug, Serialize)]
struct RefreshSummary {
    instruments: usize,
    users: usize,
    sector_analysis: bool,
}

async fn refresh_snapshot(State(state): State<AppState>) -> Result<Json<RefreshSummary>, ApiError> {
    let settings = Arc::clone(&state.settings);
    let options = Arc::clone(&state.options);
    let snapshot = tokio::task::spawn_blocking(move || load_snapshot(&settings, &options))
        .await
        .map_err(anyhow::Error::new)??;

    let summary = RefreshSummary {
        instruments: snapshot.features().len(),
        users: snapshot.holdings().len(),
        sector_analysis: snapshot.sector_analysis().is_ok(),
    };
    state.store.replace(snapshot);

    tracing::info!(
        instruments = summary.instruments,
        users = summary.users,
        "snapshot refreshed"
    );
    Ok(Json(summary))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn empty_settings() -> Settings {
        Settings {
            sentry_dsn: None,
            market_data_base_url: None,
            market_data_api_key: None,
            instruments_path: None,
            holdings_path: None,
            market_data_path: None,
        }
    }

    fn write_fixture(name: &str, value: serde_json::Value) -> PathBuf {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        let dir = std::env::temp_dir().join(format!(
            "finrec_api_{}_{}",
            std::process::id(),
            NEXT.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();
        path
    }

    fn file_settings() -> Settings {
        let instruments = write_fixture(
            "instruments.json",
            json!([
                {"instrument_id": "AAPL", "sector": "Technology", "market_cap": 2000.0, "pe_ratio": 25.0,
                 "dividend_yield": 0.5, "volatility": 0.2, "beta": 1.1},
                {"instrument_id": "MSFT", "sector": "Technology", "market_cap": 1800.0, "pe_ratio": 30.0,
                 "dividend_yield": 1.0, "volatility": 0.2, "beta": 1.0},
                {"instrument_id": "TSLA", "sector": "Automotive", "market_cap": 700.0, "pe_ratio": 100.0,
                 "dividend_yield": 0.0, "volatility": 0.5, "beta": 1.8}
            ]),
        );
        let holdings = write_fixture(
            "holdings.json",
            json!({"user1": {"AAPL": {"quantity": 100.0, "purchase_price": 150.0}}}),
        );
        Settings {
            instruments_path: Some(instruments),
            holdings_path: Some(holdings),
            ..empty_settings()
        }
    }

    fn state_from(settings: Settings) -> AppState {
        let options = RecommenderOptions::default();
        let snapshot = load_snapshot(&settings, &options).unwrap();
        AppState {
            store: SnapshotStore::new(snapshot),
            settings: Arc::new(settings),
            options: Arc::new(options),
        }
    }

    #[test]
    fn error_variants_map_to_http_statuses() {
        assert_eq!(
            status_for(&RecommenderError::UserNotFound("u".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&RecommenderError::UnknownInstrument("X".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&RecommenderError::InvalidTimeframe {
                requested: "decade".into(),
                available: vec!["month".into()],
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&RecommenderError::InsufficientData {
                context: "sector analysis".into(),
                required: 2,
                actual: 0,
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&RecommenderError::DuplicateInstrument("X".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn user_recommendations_exclude_holdings() {
        let state = state_from(file_settings());
        let Json(recs) = get_user_recommendations(
            State(state),
            Path("user1".to_string()),
            Query(RecommendationsQuery { n: Some(5) }),
        )
        .await
        .unwrap();

        let ids: Vec<&str> = recs.iter().map(|r| r.instrument_id.as_str()).collect();
        assert_eq!(ids, vec!["MSFT", "TSLA"]);
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let state = state_from(file_settings());
        let err = get_user_recommendations(
            State(state),
            Path("nobody".to_string()),
            Query(RecommendationsQuery { n: None }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn sector_routes_without_market_data_are_unprocessable() {
        let state = state_from(file_settings());
        let err = get_trending_sectors(
            State(state),
            Query(SectorQuery {
                n: None,
                top_n: None,
                timeframe: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn refresh_without_configured_files_keeps_current_snapshot() {
        let mut state = state_from(file_settings());
        state.settings = Arc::new(empty_settings());
        let before = state.store.current();

        let err = refresh_snapshot(State(state.clone())).await.unwrap_err();
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert!(Arc::ptr_eq(&before, &state.store.current()));
    }

    #[tokio::test]
    async fn refresh_swaps_in_a_rebuilt_snapshot() {
        let state = state_from(file_settings());
        let before = state.store.current();

        let Json(summary) = refresh_snapshot(State(state.clone())).await.unwrap();
        assert_eq!(summary.instruments, 3);
        assert_eq!(summary.users, 1);
        assert!(!summary.sector_analysis);
        assert!(!Arc::ptr_eq(&before, &state.store.current()));
    }
}
