mod compare;
mod debt;
mod engine;
mod error;
mod solver;
mod stress;
mod types;

pub use compare::{compare_strategies, rank};
pub use debt::{
    DEFAULT_SAFETY_CAP_PERIODS, MAX_SAFETY_CAP_PERIODS, simulate, simulate_all, simulate_with_cap,
    validate_portfolio,
};
pub use engine::{
    ContributionAdjustment, OneTimeCost, ProjectionOverrides, analyze_retirement,
    periodic_real_rate, project, project_with, required_contribution, required_savings,
    terminal_balance, terminal_balance_with, validate_profile,
};
pub use error::InvalidInputError;
pub use solver::{
    GoalSolveConfig, GoalSolveIteration, GoalSolveResult, GoalType, MAX_GOAL_ITERATIONS,
    solve_goal,
};
pub use stress::{
    DEFAULT_SEED, DEFAULT_TRIALS, DEFAULT_VOLATILITY, MAX_SIGMA_DRAW, MAX_TRIALS,
    MonteCarloConfig, evaluate, evaluate_combined, run_monte_carlo, stress_level,
};
pub use types::{
    Debt, DebtPayoff, DebtPortfolio, EventImpact, FinancialProfile, MonteCarloResult,
    OutcomeFlags, PERIODS_PER_YEAR, PayoffStrategy, ProbabilityClass, ProjectionPoint,
    RankedOutcome, RetirementAnalysis, ScenarioEvent, ScenarioSummary, SimulationTrial,
    StrategyOutcome, StressLevel,
};
