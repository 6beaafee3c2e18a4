use axum::{
    Router,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::info;

use crate::core::{
    DEFAULT_SAFETY_CAP_PERIODS, DEFAULT_SEED, DEFAULT_TRIALS, DEFAULT_VOLATILITY, Debt,
    DebtPortfolio, EventImpact, FinancialProfile, GoalSolveConfig, GoalSolveResult, GoalType,
    InvalidInputError, MAX_GOAL_ITERATIONS, MAX_SAFETY_CAP_PERIODS, MAX_TRIALS,
    MonteCarloConfig, MonteCarloResult, PayoffStrategy, ProbabilityClass, ProjectionPoint,
    RankedOutcome, RetirementAnalysis, ScenarioEvent, ScenarioSummary, StrategyOutcome,
    analyze_retirement, compare_strategies, evaluate, evaluate_combined, project,
    run_monte_carlo, simulate_with_cap,
};

const DEFAULT_GOAL_SUCCESS_PCT: f64 = 90.0;
const DEFAULT_GOAL_TOLERANCE: f64 = 1.0;
const DEFAULT_GOAL_MAX_ITERATIONS: u32 = 40;
const DEFAULT_GOAL_TRIALS_PER_ITERATION: u32 = 500;
const DEFAULT_GOAL_FINAL_TRIALS: u32 = 2_000;
const DEFAULT_EVENT_DURATION: u32 = 1;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] InvalidInputError),
}

/// Operations reachable both over HTTP and from the command line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Endpoint {
    Projection,
    DebtSimulate,
    DebtCompare,
    Stress,
    MonteCarlo,
    Goal,
}

impl Endpoint {
    fn name(self) -> &'static str {
        match self {
            Endpoint::Projection => "projection",
            Endpoint::DebtSimulate => "debts/simulate",
            Endpoint::DebtCompare => "debts/compare",
            Endpoint::Stress => "stress",
            Endpoint::MonteCarlo => "monte-carlo",
            Endpoint::Goal => "goal",
        }
    }
}

/// Profile as sent by clients: rates and the employer match are percents.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProfilePayload {
    current_age: Option<u32>,
    target_age: Option<u32>,
    life_expectancy: Option<u32>,
    annual_income: Option<f64>,
    annual_expenses: Option<f64>,
    current_savings: Option<f64>,
    monthly_contribution: Option<f64>,
    nominal_return_rate: Option<f64>,
    inflation_rate: Option<f64>,
    employer_match: Option<f64>,
    desired_retirement_income: Option<f64>,
    external_income: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct DebtPayload {
    id: Option<String>,
    name: Option<String>,
    balance: Option<f64>,
    annual_rate: Option<f64>,
    minimum_payment: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct DebtsPayload {
    debts: Option<Vec<DebtPayload>>,
    monthly_budget: Option<f64>,
    strategy: Option<PayoffStrategy>,
    safety_cap_periods: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct EventPayload {
    name: Option<String>,
    probability: Option<ProbabilityClass>,
    income_delta_pct: Option<f64>,
    expense_delta_pct: Option<f64>,
    one_time_cost: Option<f64>,
    duration_periods: Option<u32>,
    enabled: Option<bool>,
    activation_period: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct StressPayload {
    profile: Option<ProfilePayload>,
    events: Option<Vec<EventPayload>>,
    include_combined: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct MonteCarloPayload {
    profile: Option<ProfilePayload>,
    trials: Option<u32>,
    volatility: Option<f64>,
    seed: Option<u64>,
    target: Option<f64>,
    include_trials: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct GoalPayload {
    profile: Option<ProfilePayload>,
    goal_type: Option<GoalType>,
    target_success_probability: Option<f64>,
    search_min: Option<f64>,
    search_max: Option<f64>,
    tolerance: Option<f64>,
    max_iterations: Option<u32>,
    trials_per_iteration: Option<u32>,
    final_trials: Option<u32>,
    volatility: Option<f64>,
    seed: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectionResponse {
    analysis: RetirementAnalysis,
    points: Vec<ProjectionPoint>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DebtSimulateResponse {
    outcomes: Vec<StrategyOutcome>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DebtCompareResponse {
    recommended: Option<PayoffStrategy>,
    ranking: Vec<RankedOutcome>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StressResponse {
    summaries: Vec<ScenarioSummary>,
    combined: Option<ScenarioSummary>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn required<T>(value: Option<T>, field: &'static str) -> Result<T, InvalidInputError> {
    value.ok_or(InvalidInputError::MissingField(field))
}

fn build_profile(payload: ProfilePayload) -> Result<FinancialProfile, InvalidInputError> {
    Ok(FinancialProfile {
        current_age: required(payload.current_age, "currentAge")?,
        target_age: required(payload.target_age, "targetAge")?,
        life_expectancy: required(payload.life_expectancy, "lifeExpectancy")?,
        annual_income: required(payload.annual_income, "annualIncome")?,
        annual_expenses: required(payload.annual_expenses, "annualExpenses")?,
        current_savings: required(payload.current_savings, "currentSavings")?,
        monthly_contribution: required(payload.monthly_contribution, "monthlyContribution")?,
        nominal_return_rate: required(payload.nominal_return_rate, "nominalReturnRate")? / 100.0,
        inflation_rate: required(payload.inflation_rate, "inflationRate")? / 100.0,
        employer_match: payload.employer_match.unwrap_or(0.0) / 100.0,
        desired_retirement_income: required(
            payload.desired_retirement_income,
            "desiredRetirementIncome",
        )?,
        external_income: payload.external_income.unwrap_or(0.0),
    })
}

fn build_portfolio(
    debts: Option<Vec<DebtPayload>>,
    monthly_budget: Option<f64>,
) -> Result<DebtPortfolio, InvalidInputError> {
    let debts = required(debts, "debts")?
        .into_iter()
        .map(|d| {
            let id = required(d.id, "debt.id")?;
            Ok(Debt {
                name: d.name.unwrap_or_else(|| id.clone()),
                id,
                balance: required(d.balance, "debt.balance")?,
                annual_rate: required(d.annual_rate, "debt.annualRate")? / 100.0,
                minimum_payment: required(d.minimum_payment, "debt.minimumPayment")?,
            })
        })
        .collect::<Result<Vec<_>, InvalidInputError>>()?;
    Ok(DebtPortfolio {
        debts,
        monthly_budget: required(monthly_budget, "monthlyBudget")?,
    })
}

fn build_event(payload: EventPayload) -> Result<ScenarioEvent, InvalidInputError> {
    Ok(ScenarioEvent {
        name: required(payload.name, "event.name")?,
        probability: required(payload.probability, "event.probability")?,
        impact: EventImpact {
            income_delta_pct: payload.income_delta_pct.unwrap_or(0.0),
            expense_delta_pct: payload.expense_delta_pct.unwrap_or(0.0),
            one_time_cost: payload.one_time_cost.unwrap_or(0.0),
            duration_periods: payload.duration_periods.unwrap_or(DEFAULT_EVENT_DURATION),
        },
        enabled: payload.enabled.unwrap_or(true),
        activation_period: payload.activation_period.unwrap_or(0),
    })
}

fn build_monte_carlo_config(
    trials: Option<u32>,
    volatility_pct: Option<f64>,
    target: Option<f64>,
) -> Result<MonteCarloConfig, InvalidInputError> {
    let trials = trials.unwrap_or(DEFAULT_TRIALS);
    if trials == 0 || trials > MAX_TRIALS {
        return Err(InvalidInputError::OutOfRange {
            field: "trials",
            reason: format!("must be between 1 and {MAX_TRIALS}, got {trials}"),
        });
    }
    Ok(MonteCarloConfig {
        trials,
        volatility: volatility_pct.map_or(DEFAULT_VOLATILITY, |v| v / 100.0),
        target,
    })
}

fn projection(payload: ProfilePayload) -> Result<ProjectionResponse, InvalidInputError> {
    let profile = build_profile(payload)?;
    Ok(ProjectionResponse {
        analysis: analyze_retirement(&profile)?,
        points: project(&profile)?,
    })
}

fn debt_simulate(payload: DebtsPayload) -> Result<DebtSimulateResponse, InvalidInputError> {
    let portfolio = build_portfolio(payload.debts, payload.monthly_budget)?;
    let cap = payload
        .safety_cap_periods
        .unwrap_or(DEFAULT_SAFETY_CAP_PERIODS);
    if cap == 0 || cap > MAX_SAFETY_CAP_PERIODS {
        return Err(InvalidInputError::OutOfRange {
            field: "safetyCapPeriods",
            reason: format!("must be between 1 and {MAX_SAFETY_CAP_PERIODS}, got {cap}"),
        });
    }
    let strategies = match payload.strategy {
        Some(strategy) => vec![strategy],
        None => PayoffStrategy::ALL.to_vec(),
    };
    let outcomes = strategies
        .into_iter()
        .map(|strategy| simulate_with_cap(&portfolio, strategy, cap))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(DebtSimulateResponse { outcomes })
}

fn debt_compare(payload: DebtsPayload) -> Result<DebtCompareResponse, InvalidInputError> {
    let portfolio = build_portfolio(payload.debts, payload.monthly_budget)?;
    let ranking = compare_strategies(&portfolio)?;
    Ok(DebtCompareResponse {
        recommended: ranking.first().map(|r| r.outcome.strategy),
        ranking,
    })
}

fn stress(payload: StressPayload) -> Result<StressResponse, InvalidInputError> {
    let profile = build_profile(required(payload.profile, "profile")?)?;
    let events = match payload.events {
        Some(events) => events
            .into_iter()
            .map(build_event)
            .collect::<Result<Vec<_>, _>>()?,
        None => ScenarioEvent::presets(),
    };
    let combined = if payload.include_combined.unwrap_or(false) {
        evaluate_combined(&profile, &events)?
    } else {
        None
    };
    Ok(StressResponse {
        summaries: evaluate(&profile, &events)?,
        combined,
    })
}

fn monte_carlo(payload: MonteCarloPayload) -> Result<MonteCarloResult, InvalidInputError> {
    let profile = build_profile(required(payload.profile, "profile")?)?;
    let config = build_monte_carlo_config(payload.trials, payload.volatility, payload.target)?;
    let mut rng = ChaCha8Rng::seed_from_u64(payload.seed.unwrap_or(DEFAULT_SEED));
    let mut result = run_monte_carlo(&profile, &config, &mut rng)?;
    if !payload.include_trials.unwrap_or(false) {
        result.trials.clear();
    }
    Ok(result)
}

fn goal(payload: GoalPayload) -> Result<GoalSolveResult, InvalidInputError> {
    let profile = build_profile(required(payload.profile, "profile")?)?;
    let trials_per_iteration = payload
        .trials_per_iteration
        .unwrap_or(DEFAULT_GOAL_TRIALS_PER_ITERATION);
    let final_trials = payload.final_trials.unwrap_or(DEFAULT_GOAL_FINAL_TRIALS);
    for (field, trials) in [
        ("trialsPerIteration", trials_per_iteration),
        ("finalTrials", final_trials),
    ] {
        if trials > MAX_TRIALS {
            return Err(InvalidInputError::OutOfRange {
                field,
                reason: format!("must be at most {MAX_TRIALS}, got {trials}"),
            });
        }
    }
    let max_iterations = payload
        .max_iterations
        .unwrap_or(DEFAULT_GOAL_MAX_ITERATIONS);
    if max_iterations == 0 || max_iterations > MAX_GOAL_ITERATIONS {
        return Err(InvalidInputError::OutOfRange {
            field: "maxIterations",
            reason: format!("must be between 1 and {MAX_GOAL_ITERATIONS}, got {max_iterations}"),
        });
    }
    let config = GoalSolveConfig {
        goal_type: required(payload.goal_type, "goalType")?,
        target_success_probability: payload
            .target_success_probability
            .unwrap_or(DEFAULT_GOAL_SUCCESS_PCT),
        search_min: payload.search_min.unwrap_or(0.0),
        search_max: required(payload.search_max, "searchMax")?,
        tolerance: payload.tolerance.unwrap_or(DEFAULT_GOAL_TOLERANCE),
        max_iterations,
        trials_per_iteration,
        final_trials,
        volatility: payload
            .volatility
            .map_or(DEFAULT_VOLATILITY, |v| v / 100.0),
        seed: payload.seed.unwrap_or(DEFAULT_SEED),
    };
    crate::core::solve_goal(&profile, config)
}

fn to_value<T: Serialize>(
    result: Result<T, InvalidInputError>,
) -> Result<serde_json::Value, ApiError> {
    Ok(serde_json::to_value(result?)?)
}

/// Parses a JSON request body for `endpoint` and runs it.
pub fn handle_json(endpoint: Endpoint, body: &str) -> Result<serde_json::Value, ApiError> {
    info!(endpoint = endpoint.name(), "handling request");
    match endpoint {
        Endpoint::Projection => to_value(projection(serde_json::from_str(body)?)),
        Endpoint::DebtSimulate => to_value(debt_simulate(serde_json::from_str(body)?)),
        Endpoint::DebtCompare => to_value(debt_compare(serde_json::from_str(body)?)),
        Endpoint::Stress => to_value(stress(serde_json::from_str(body)?)),
        Endpoint::MonteCarlo => to_value(monte_carlo(serde_json::from_str(body)?)),
        Endpoint::Goal => to_value(goal(serde_json::from_str(body)?)),
    }
}

pub async fn run_http_server(host: IpAddr, port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::new(host, port);
    let app = Router::new()
        .route("/api/projection", post(projection_handler))
        .route("/api/debts/simulate", post(debt_simulate_handler))
        .route("/api/debts/compare", post(debt_compare_handler))
        .route("/api/stress", post(stress_handler))
        .route("/api/stress/presets", get(presets_handler))
        .route("/api/monte-carlo", post(monte_carlo_handler))
        .route("/api/goal", post(goal_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "finsim HTTP API listening");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn presets_handler() -> Response {
    json_response(StatusCode::OK, ScenarioEvent::presets())
}

async fn projection_handler(body: String) -> Response {
    respond(Endpoint::Projection, &body)
}

async fn debt_simulate_handler(body: String) -> Response {
    respond(Endpoint::DebtSimulate, &body)
}

async fn debt_compare_handler(body: String) -> Response {
    respond(Endpoint::DebtCompare, &body)
}

async fn stress_handler(body: String) -> Response {
    respond(Endpoint::Stress, &body)
}

async fn monte_carlo_handler(body: String) -> Response {
    respond(Endpoint::MonteCarlo, &body)
}

async fn goal_handler(body: String) -> Response {
    respond(Endpoint::Goal, &body)
}

fn respond(endpoint: Endpoint, body: &str) -> Response {
    match handle_json(endpoint, body) {
        Ok(value) => json_response(StatusCode::OK, value),
        Err(e) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, axum::Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}
