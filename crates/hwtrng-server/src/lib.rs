//! HTTP control and generation API for a serial TRNG.
//!
//! Every route lives under `/trng/randomNum/` and answers `GET`. Device calls
//! block on the serial link, so they run on tokio's blocking pool; the async
//! side only shapes responses.
//!
//! Besides the usual codes two non-standard statuses are used, matching the
//! frontend that consumes this API: `432` for "system not initialized" and
//! `555` for any device or generation failure.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State},
    http::{StatusCode, Uri, header},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use hwtrng_core::{CancelToken, Device, Error, FileFormat, ReadLimits, Transition};
use hwtrng_tests::TestResult;

/// Status for requests that need the generator powered on.
pub const STATUS_NOT_INITIALIZED: u16 = 432;
/// Status for device, link and generation failures.
pub const STATUS_FAILURE: u16 = 555;

const DEFAULT_TESTDATA_BITS: usize = 5000;
const DEFAULT_BATTERY_BITS: usize = 20_000;
/// Widest single number `getRandom` hands out.
pub const MAX_NUMBER_BITS: usize = 4096;
/// Most numbers per `getRandom` call.
pub const MAX_QUANTITY: usize = 10_000;

/// Shared server state.
struct AppState {
    device: Arc<Device>,
    output_dir: PathBuf,
    /// Path of the most recent `generateTestdata` output.
    last_file: Mutex<Option<PathBuf>>,
    /// Tripped on shutdown to abort in-flight acquisitions.
    cancel: CancelToken,
}

impl AppState {
    fn new(device: Arc<Device>, output_dir: PathBuf) -> Self {
        Self {
            device,
            output_dir,
            last_file: Mutex::new(None),
            cancel: CancelToken::new(),
        }
    }
}

type ApiResponse = (StatusCode, Json<Value>);

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn message(code: StatusCode, text: &str) -> ApiResponse {
    (code, Json(json!({ "message": text })))
}

fn failure(text: impl Into<String>) -> ApiResponse {
    (status(STATUS_FAILURE), Json(json!({ "error": text.into() })))
}

fn not_initialized() -> ApiResponse {
    message(status(STATUS_NOT_INITIALIZED), "System not initialized")
}

/// Why a blocking device call did not produce a value.
#[derive(Debug)]
enum ApiError {
    Device(Error),
    Worker(String),
}

impl ApiError {
    fn into_api_response(self) -> ApiResponse {
        match self {
            ApiError::Device(Error::NotReady) => not_initialized(),
            ApiError::Device(e) => {
                log::warn!("device call failed: {e}");
                failure(e.to_string())
            }
            ApiError::Worker(e) => {
                log::error!("device worker failed: {e}");
                failure(format!("internal worker failure: {e}"))
            }
        }
    }
}

/// Run `f` against the device on the blocking pool.
async fn on_device<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Device, ReadLimits) -> hwtrng_core::Result<T> + Send + 'static,
{
    let device = Arc::clone(&state.device);
    let limits = device.read_limits().with_cancel(state.cancel.clone());
    match tokio::task::spawn_blocking(move || f(&device, limits)).await {
        Ok(result) => result.map_err(ApiError::Device),
        Err(e) => Err(ApiError::Worker(e.to_string())),
    }
}

/// Liveness probe, then require the generator to be on.
fn ensure_ready(device: &Device) -> hwtrng_core::Result<()> {
    device.probe_liveness();
    if device.is_initialized() {
        Ok(())
    } else {
        Err(Error::NotReady)
    }
}

/// Lenient integer query parameter: unparsable means `default`, clamped to
/// `1..=max`.
fn int_param(raw: Option<&str>, default: usize, max: usize) -> usize {
    raw.and_then(|s| s.trim().parse::<i128>().ok())
        .map(|v| usize::try_from(v.clamp(1, max as i128)).unwrap_or(max))
        .unwrap_or(default)
        .clamp(1, max)
}

#[derive(Deserialize, Default)]
struct RandomParams {
    #[serde(rename = "numBits")]
    num_bits: Option<String>,
    quantity: Option<String>,
}

#[derive(Deserialize, Default)]
struct TestdataParams {
    #[serde(rename = "numBits")]
    num_bits: Option<String>,
    filetype: Option<String>,
}

#[derive(Deserialize, Default)]
struct BatteryParams {
    #[serde(rename = "numBits")]
    num_bits: Option<String>,
}

async fn handle_init(State(state): State<Arc<AppState>>) -> ApiResponse {
    match on_device(&state, |d, _| d.initialize()).await {
        Ok(Transition::Applied) => {
            log::info!("generator powered on");
            message(StatusCode::OK, "System initialised successfully")
        }
        Ok(_) => message(StatusCode::CONFLICT, "System already initialized"),
        Err(e) => e.into_api_response(),
    }
}

async fn handle_get_random(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RandomParams>,
) -> ApiResponse {
    let length = int_param(params.num_bits.as_deref(), 1, MAX_NUMBER_BITS);
    let count = int_param(params.quantity.as_deref(), 1, MAX_QUANTITY);

    let generated = on_device(&state, move |d, limits| {
        ensure_ready(d)?;
        d.generate_numbers(count, length, &limits)
    })
    .await;

    match generated {
        Ok(g) if g.total_failure && g.numbers.is_empty() => {
            log::warn!("total failure before any number was complete");
            failure("Total failure detected.")
        }
        Ok(g) => {
            if g.total_failure {
                log::warn!(
                    "total failure after {} bits; returning {} of {count} numbers",
                    g.bits_acquired,
                    g.numbers.len()
                );
            }
            (StatusCode::OK, Json(json!(g.numbers)))
        }
        Err(e) => e.into_api_response(),
    }
}

async fn handle_generate_testdata(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TestdataParams>,
) -> ApiResponse {
    let length = int_param(
        params.num_bits.as_deref(),
        DEFAULT_TESTDATA_BITS,
        state.device.max_bits(),
    );
    let filetype = params.filetype.unwrap_or_else(|| "bin".to_string());
    let dir = state.output_dir.clone();

    let written = on_device(&state, move |d, limits| {
        ensure_ready(d)?;
        let format: FileFormat = filetype.parse()?;
        d.generate_to_file(length, format, &dir, &limits)
    })
    .await;

    match written {
        Ok(path) => {
            log::info!("wrote {length} bits to {}", path.display());
            *state.last_file.lock().await = Some(path);
            message(StatusCode::OK, "Generation successful")
        }
        Err(e) => e.into_api_response(),
    }
}

async fn handle_download(State(state): State<Arc<AppState>>) -> Response {
    let Some(path) = state.last_file.lock().await.clone() else {
        return failure("No test data has been generated yet").into_response();
    };
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("testdata");
            (
                [
                    (header::CONTENT_TYPE, "application/octet-stream".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{name}\""),
                    ),
                ],
                bytes,
            )
                .into_response()
        }
        Err(e) => failure(format!("{}: {e}", path.display())).into_response(),
    }
}

async fn handle_shutdown(State(state): State<Arc<AppState>>) -> ApiResponse {
    match on_device(&state, |d, _| d.shutdown()).await {
        Ok(Transition::Applied) => {
            log::info!("generator in standby");
            message(StatusCode::OK, "System successfully shutdown")
        }
        Ok(_) => message(StatusCode::OK, "System already in standby"),
        Err(e) => e.into_api_response(),
    }
}

async fn handle_restart(State(state): State<Arc<AppState>>) -> ApiResponse {
    match on_device(&state, |d, _| d.restart()).await {
        Ok(Transition::Applied) => {
            log::info!("generator restarted");
            message(StatusCode::OK, "System successfully restarted")
        }
        Ok(_) => message(StatusCode::OK, "System already in standby"),
        Err(e) => e.into_api_response(),
    }
}

fn result_json(r: &TestResult) -> Value {
    json!({
        "name": r.name,
        "passed": r.passed,
        "p_value": r.p_value,
        "statistic": r.statistic,
        "details": r.details,
        "grade": r.grade.to_string(),
    })
}

async fn handle_test_data(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BatteryParams>,
) -> ApiResponse {
    let length = int_param(
        params.num_bits.as_deref(),
        DEFAULT_BATTERY_BITS,
        state.device.max_bits(),
    );

    let results = on_device(&state, move |d, limits| {
        ensure_ready(d)?;
        let bits = d.acquire_bits(length, &limits)?;
        Ok(hwtrng_tests::run_all_tests(bits.as_slice()))
    })
    .await;

    match results {
        Ok(results) => {
            let passed = results.iter().filter(|r| r.passed).count();
            let score = hwtrng_tests::calculate_quality_score(&results);
            log::info!("battery on {length} bits: {passed}/{} passed", results.len());
            (
                StatusCode::OK,
                Json(json!({
                    "numBits": length,
                    "passed": passed,
                    "total": results.len(),
                    "score": score,
                    "tests": results.iter().map(result_json).collect::<Vec<_>>(),
                })),
            )
        }
        Err(e) => e.into_api_response(),
    }
}

async fn handle_index(State(state): State<Arc<AppState>>) -> ApiResponse {
    // An acquisition holds the device for its whole run.
    let device_state = match state.device.try_state() {
        Some(s) => s.to_string(),
        None => "busy".to_string(),
    };
    (
        StatusCode::OK,
        Json(json!({
            "name": "hwtrng server",
            "version": hwtrng_core::VERSION,
            "state": device_state,
            "endpoints": {
                "/trng/randomNum/init": "Power the generator on",
                "/trng/randomNum/getRandom": "numBits (default 1), quantity (default 1): hex numbers",
                "/trng/randomNum/generateTestdata": "numBits (default 5000), filetype txt|bin (default bin)",
                "/trng/randomNum/downloadFile": "Last generated test data file",
                "/trng/randomNum/testData": "numBits (default 20000): randomness test battery",
                "/trng/randomNum/shutdown": "Put the generator in standby",
                "/trng/randomNum/restart": "Power cycle the generator",
            },
        })),
    )
}

async fn handle_not_found(uri: Uri) -> ApiResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": format!("404 Not Found: {uri} was not found on the server."),
        })),
    )
}

/// Build the axum router.
fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_index))
        .route("/trng/randomNum/init", get(handle_init))
        .route("/trng/randomNum/getRandom", get(handle_get_random))
        .route("/trng/randomNum/generateTestdata", get(handle_generate_testdata))
        .route("/trng/randomNum/downloadFile", get(handle_download))
        .route("/trng/randomNum/shutdown", get(handle_shutdown))
        .route("/trng/randomNum/restart", get(handle_restart))
        .route("/trng/randomNum/testData", get(handle_test_data))
        .fallback(handle_not_found)
        .layer(cors)
        .with_state(state)
}

/// Run the HTTP server until Ctrl-C.
///
/// Test data files are written to `output_dir`. On Ctrl-C in-flight
/// acquisitions are cancelled and the server drains before returning; the
/// device itself is left as it is for the caller to power down.
pub async fn run_server(
    device: Arc<Device>,
    output_dir: PathBuf,
    host: &str,
    port: u16,
) -> std::io::Result<()> {
    let state = Arc::new(AppState::new(device, output_dir));
    let cancel = state.cancel.clone();
    let app = build_router(state);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("failed to listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
            log::info!("shutdown requested");
            cancel.cancel();
        })
        .await
}
