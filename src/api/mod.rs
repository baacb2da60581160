mod params;

use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    RecoveryProfile, Scenario, SearchResult, SimulationResult, find_required_savings,
    simulate_scenario,
};

pub use params::{
    ApiPayoutMode, ApiTargetMode, ApiWithdrawalMode, Cli, CliWithdrawalMode, SimulatePayload,
    SolveDefaults, SolveOptions, SolvePayload, ValidatedScenario, Validation, ValidationError,
    build_scenario, build_search, cli_from_payload, default_cli_for_api,
    solve_options_from_payload, validate, validate_solve,
};

pub const ASSUMPTIONS: &[&str] = &[
    "Monthly savings are deposited at the start of each month, before that month's return.",
    "Returns are deterministic or lognormal Monte Carlo draws without regime switching.",
    "Withdrawals are taxed on a pro-rata share of unrealized gain.",
    "Real values divide nominal values by a cumulative CPI index.",
    "A crisis is a shaped 12-month drawdown with partial recovery by the end of the year.",
    "Recovery profiles add an expected-return premium that decays linearly to zero.",
    "Fees, transaction costs and distributions are not modeled.",
];

const RECOVERY_PROFILES: [(&str, RecoveryProfile); 5] = [
    ("off", RecoveryProfile::Off),
    ("fast", RecoveryProfile::Fast),
    ("typical", RecoveryProfile::Typical),
    ("gfc", RecoveryProfile::Gfc),
    ("lostDecade", RecoveryProfile::LostDecade),
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateResponse {
    pub scenario: Scenario,
    pub warnings: Vec<String>,
    pub results: SimulationResult,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveResponse {
    pub warnings: Vec<String>,
    pub result: SearchResult,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecoveryProfileInfo {
    key: &'static str,
    label: &'static str,
    horizon_years: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DefaultsResponse {
    scenario: Scenario,
    solve: SolveDefaults,
    recovery_profiles: Vec<RecoveryProfileInfo>,
    assumptions: &'static [&'static str],
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    details: Vec<String>,
}

/// JSON body of `POST /api/solve`: scenario and solver fields side by side.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SolveRequest {
    #[serde(flatten)]
    scenario: SimulatePayload,
    #[serde(flatten)]
    solve: SolvePayload,
}

pub fn run_simulation(cli: &Cli) -> Result<SimulateResponse, Vec<ValidationError>> {
    let ValidatedScenario { scenario, warnings } = build_scenario(cli)?;
    let results = simulate_scenario(&scenario);
    Ok(SimulateResponse {
        scenario,
        warnings,
        results,
    })
}

pub fn run_solver(cli: &Cli, options: &SolveOptions) -> Result<SolveResponse, Vec<ValidationError>> {
    let ValidatedScenario { scenario, warnings } = build_scenario(cli)?;
    let search = build_search(scenario, options)?;
    Ok(SolveResponse {
        warnings,
        result: find_required_savings(&search),
    })
}

pub fn router() -> Router {
    Router::new()
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route(
            "/api/solve",
            get(solve_get_handler).post(solve_post_handler),
        )
        .route("/api/defaults", get(defaults_handler))
        .fallback(not_found_handler)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "sparplan HTTP API listening");
    info!("local access: http://127.0.0.1:{port}/api/defaults");

    axum::serve(listener, router()).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found", Vec::new())
}

async fn simulate_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_handler_impl(payload: SimulatePayload) -> Response {
    let cli = cli_from_payload(payload);
    let outcome = tokio::task::spawn_blocking(move || run_simulation(&cli)).await;

    match outcome {
        Ok(Ok(response)) => {
            info!(
                months = response.results.deterministic.timeline.len(),
                monte_carlo = response.results.monte_carlo.is_some(),
                warnings = response.warnings.len(),
                "simulation served"
            );
            json_response(StatusCode::OK, response)
        }
        Ok(Err(errors)) => validation_failure("Invalid scenario", errors),
        Err(e) => {
            warn!(error = %e, "simulation task failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Simulation failed",
                Vec::new(),
            )
        }
    }
}

async fn solve_get_handler(
    Query(scenario): Query<SimulatePayload>,
    Query(solve): Query<SolvePayload>,
) -> Response {
    solve_handler_impl(scenario, solve).await
}

async fn solve_post_handler(Json(request): Json<SolveRequest>) -> Response {
    solve_handler_impl(request.scenario, request.solve).await
}

async fn solve_handler_impl(scenario: SimulatePayload, solve: SolvePayload) -> Response {
    let cli = cli_from_payload(scenario);
    let options = solve_options_from_payload(solve);
    let outcome = tokio::task::spawn_blocking(move || run_solver(&cli, &options)).await;

    match outcome {
        Ok(Ok(response)) => {
            info!(
                feasible = response.result.feasible,
                iterations = response.result.iterations,
                "solve served"
            );
            json_response(StatusCode::OK, response)
        }
        Ok(Err(errors)) => validation_failure("Invalid solver request", errors),
        Err(e) => {
            warn!(error = %e, "solver task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Solver failed", Vec::new())
        }
    }
}

async fn defaults_handler() -> Response {
    match build_scenario(&default_cli_for_api()) {
        Ok(validated) => json_response(
            StatusCode::OK,
            DefaultsResponse {
                scenario: validated.scenario,
                solve: SolveOptions::default().into(),
                recovery_profiles: RECOVERY_PROFILES
                    .iter()
                    .map(|&(key, profile)| RecoveryProfileInfo {
                        key,
                        label: profile.label(),
                        horizon_years: profile.horizon_years(),
                    })
                    .collect(),
                assumptions: ASSUMPTIONS,
            },
        ),
        Err(errors) => {
            warn!(count = errors.len(), "built-in defaults failed validation");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Invalid defaults",
                errors.iter().map(ToString::to_string).collect(),
            )
        }
    }
}

fn validation_failure(msg: &str, errors: Vec<ValidationError>) -> Response {
    let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
    warn!(errors = ?details, "{msg}");
    error_response(StatusCode::BAD_REQUEST, msg, details)
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str, details: Vec<String>) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
            details,
        },
    )
}
