use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::engine::validate_profile;
use super::error::InvalidInputError;
use super::stress::{MonteCarloConfig, run_monte_carlo};
use super::types::FinancialProfile;

/// Slack on success comparisons so bisection is not thrown by rounding.
const SUCCESS_EPS: f64 = 1e-9;

/// Upper bound on bisection steps in one solve.
pub const MAX_GOAL_ITERATIONS: u32 = 200;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GoalType {
    #[serde(alias = "requiredContribution", alias = "required_contribution")]
    RequiredContribution,
    #[serde(alias = "maxIncome", alias = "max_income")]
    MaxIncome,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoalSolveConfig {
    pub goal_type: GoalType,
    /// Percent of trials that must reach the target, 0..=100.
    pub target_success_probability: f64,
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
    pub trials_per_iteration: u32,
    pub final_trials: u32,
    pub volatility: f64,
    pub seed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalSolveIteration {
    pub iteration: u32,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub candidate_value: f64,
    pub success_probability: f64,
    pub success_ci_half_width: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalSolveResult {
    pub goal_type: GoalType,
    pub target_success_probability: f64,
    pub search_min: f64,
    pub search_max: f64,
    pub solved_value: Option<f64>,
    pub achieved_success_probability: Option<f64>,
    pub achieved_success_ci_half_width: Option<f64>,
    pub iterations: Vec<GoalSolveIteration>,
    pub converged: bool,
    pub feasible: bool,
    pub message: String,
}

#[derive(Debug, Clone, Copy)]
struct CandidateEval {
    success_probability: f64,
    success_ci_half_width: f64,
}

/// Bisection on the Monte Carlo success probability.
///
/// Every candidate is evaluated with a generator reseeded from `config.seed`,
/// so candidates are compared on identical return draws.
pub fn solve_goal(
    profile: &FinancialProfile,
    config: GoalSolveConfig,
) -> Result<GoalSolveResult, InvalidInputError> {
    validate_profile(profile)?;
    validate_config(config)?;

    let target = config.target_success_probability;
    let meets = |eval: CandidateEval| eval.success_probability + SUCCESS_EPS >= target;

    let mut iterations = Vec::with_capacity(config.max_iterations as usize);
    let low_eval =
        evaluate_candidate(profile, config, config.search_min, config.trials_per_iteration)?;
    let high_eval =
        evaluate_candidate(profile, config, config.search_max, config.trials_per_iteration)?;

    // Contribution raises success; income lowers it.
    let increasing = config.goal_type == GoalType::RequiredContribution;
    let (already_met, unreachable) = if increasing {
        (meets(low_eval), !meets(high_eval))
    } else {
        (meets(high_eval), !meets(low_eval))
    };

    let mut solved_value = None;
    let mut converged = false;
    let feasible;
    let message;

    if unreachable {
        feasible = false;
        message = match config.goal_type {
            GoalType::RequiredContribution => {
                "No feasible contribution found within the search bounds."
            }
            GoalType::MaxIncome => "No feasible income found within the search bounds.",
        }
        .to_string();
    } else if already_met {
        feasible = true;
        converged = true;
        if increasing {
            solved_value = Some(config.search_min);
            message = "Already meets target at lower contribution bound.".to_string();
        } else {
            solved_value = Some(config.search_max);
            message =
                "Upper income bound is still feasible; increase search max for higher target."
                    .to_string();
        }
    } else {
        let mut lo = config.search_min;
        let mut hi = config.search_max;
        let mut it = 0;
        while it < config.max_iterations {
            it += 1;
            let mid = (lo + hi) * 0.5;
            let eval = evaluate_candidate(profile, config, mid, config.trials_per_iteration)?;
            iterations.push(GoalSolveIteration {
                iteration: it,
                lower_bound: lo,
                upper_bound: hi,
                candidate_value: mid,
                success_probability: eval.success_probability,
                success_ci_half_width: eval.success_ci_half_width,
            });

            match (increasing, meets(eval)) {
                (true, true) | (false, false) => hi = mid,
                (true, false) | (false, true) => lo = mid,
            }

            if (hi - lo).abs() <= config.tolerance {
                converged = true;
                break;
            }
        }
        // The feasible side of the bracket.
        solved_value = Some(if increasing { hi } else { lo });
        feasible = true;
        message = match (converged, config.goal_type) {
            (true, GoalType::RequiredContribution) => "Solved required contribution.".to_string(),
            (true, GoalType::MaxIncome) => "Solved maximum sustainable income.".to_string(),
            (false, _) => {
                "Reached max iterations before tolerance was met; returning best estimate."
                    .to_string()
            }
        };
    }

    let mut achieved_success_probability = None;
    let mut achieved_success_ci_half_width = None;
    if let Some(value) = solved_value {
        let final_eval = evaluate_candidate(profile, config, value, config.final_trials)?;
        achieved_success_probability = Some(final_eval.success_probability);
        achieved_success_ci_half_width = Some(final_eval.success_ci_half_width);
    }

    debug!(
        goal = ?config.goal_type,
        ?solved_value,
        iterations = iterations.len(),
        feasible,
        "goal solve finished"
    );

    Ok(GoalSolveResult {
        goal_type: config.goal_type,
        target_success_probability: config.target_success_probability,
        search_min: config.search_min,
        search_max: config.search_max,
        solved_value,
        achieved_success_probability,
        achieved_success_ci_half_width,
        iterations,
        converged,
        feasible,
        message,
    })
}

fn evaluate_candidate(
    base_profile: &FinancialProfile,
    config: GoalSolveConfig,
    candidate_value: f64,
    trials: u32,
) -> Result<CandidateEval, InvalidInputError> {
    let mut profile = base_profile.clone();
    match config.goal_type {
        GoalType::RequiredContribution => profile.monthly_contribution = candidate_value.max(0.0),
        GoalType::MaxIncome => profile.desired_retirement_income = candidate_value.max(0.0),
    }

    let mc_config = MonteCarloConfig {
        trials: trials.max(1),
        volatility: config.volatility,
        target: None,
    };
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let result = run_monte_carlo(&profile, &mc_config, &mut rng)?;
    Ok(CandidateEval {
        success_probability: result.success_probability,
        success_ci_half_width: binomial_ci_half_width(
            result.success_probability,
            mc_config.trials,
        ),
    })
}

/// 95% normal-approximation half width, in percentage points.
fn binomial_ci_half_width(probability_pct: f64, n: u32) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let p = (probability_pct / 100.0).clamp(0.0, 1.0);
    1.96 * (p * (1.0 - p) / n as f64).sqrt() * 100.0
}

fn validate_config(config: GoalSolveConfig) -> Result<(), InvalidInputError> {
    let fail = |msg: &str| Err(InvalidInputError::InvalidConfig(msg.to_string()));
    if !(0.0..=100.0).contains(&config.target_success_probability) {
        return fail("target_success_probability must be between 0 and 100");
    }
    if !config.search_min.is_finite() || !config.search_max.is_finite() {
        return fail("search bounds must be finite");
    }
    if config.search_min < 0.0 {
        return fail("search_min must be >= 0");
    }
    if config.search_max <= config.search_min {
        return fail("search_max must be greater than search_min");
    }
    if !config.tolerance.is_finite() || config.tolerance <= 0.0 {
        return fail("tolerance must be > 0");
    }
    if config.max_iterations == 0 || config.max_iterations > MAX_GOAL_ITERATIONS {
        return Err(InvalidInputError::InvalidConfig(format!(
            "max_iterations must be between 1 and {MAX_GOAL_ITERATIONS}, got {}",
            config.max_iterations
        )));
    }
    if config.trials_per_iteration == 0 {
        return fail("trials_per_iteration must be > 0");
    }
    if config.final_trials == 0 {
        return fail("final_trials must be > 0");
    }
    if !config.volatility.is_finite() || config.volatility < 0.0 {
        return fail("volatility must be >= 0");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::tests::sample_profile;

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn deterministic_profile() -> FinancialProfile {
        FinancialProfile {
            current_age: 30,
            target_age: 31,
            life_expectancy: 32,
            annual_income: 40_000.0,
            annual_expenses: 20_000.0,
            current_savings: 0.0,
            monthly_contribution: 0.0,
            nominal_return_rate: 0.0,
            inflation_rate: 0.0,
            employer_match: 0.0,
            desired_retirement_income: 12_000.0,
            external_income: 0.0,
        }
    }

    fn deterministic_config(goal_type: GoalType, search_max: f64) -> GoalSolveConfig {
        GoalSolveConfig {
            goal_type,
            target_success_probability: 100.0,
            search_min: 0.0,
            search_max,
            tolerance: 0.5,
            max_iterations: 40,
            trials_per_iteration: 1,
            final_trials: 1,
            volatility: 0.0,
            seed: 7,
        }
    }

    #[test]
    fn required_contribution_solver_finds_deterministic_solution() {
        let profile = deterministic_profile();
        let config = deterministic_config(GoalType::RequiredContribution, 2_000.0);

        let result = solve_goal(&profile, config).expect("must solve");
        assert!(result.feasible);
        assert!(result.converged);
        assert_close(
            result.solved_value.expect("value expected"),
            1_000.0,
            config.tolerance + 0.5,
        );
        assert_close(
            result.achieved_success_probability.expect("probability expected"),
            100.0,
            1e-9,
        );
        assert!(!result.iterations.is_empty());
    }

    #[test]
    fn max_income_solver_finds_deterministic_solution() {
        let mut profile = deterministic_profile();
        profile.monthly_contribution = 1_000.0;
        let config = deterministic_config(GoalType::MaxIncome, 30_000.0);

        let result = solve_goal(&profile, config).expect("must solve");
        assert!(result.feasible);
        assert_close(
            result.solved_value.expect("value expected"),
            12_000.0,
            config.tolerance + 0.5,
        );
    }

    #[test]
    fn required_contribution_solver_reports_infeasible_when_bounds_too_low() {
        let profile = deterministic_profile();
        let config = deterministic_config(GoalType::RequiredContribution, 500.0);

        let result = solve_goal(&profile, config).expect("must return result");
        assert!(!result.feasible);
        assert!(result.solved_value.is_none());
        assert!(result.achieved_success_probability.is_none());
    }

    #[test]
    fn lower_bound_already_meeting_target_short_circuits() {
        let mut profile = deterministic_profile();
        profile.current_savings = 20_000.0;
        let config = deterministic_config(GoalType::RequiredContribution, 2_000.0);

        let result = solve_goal(&profile, config).expect("must solve");
        assert_eq!(result.solved_value, Some(0.0));
        assert!(result.iterations.is_empty());
    }

    #[test]
    fn stochastic_solver_is_reproducible() {
        let profile = sample_profile();
        let config = GoalSolveConfig {
            goal_type: GoalType::RequiredContribution,
            target_success_probability: 90.0,
            search_min: 0.0,
            search_max: 20_000.0,
            tolerance: 5.0,
            max_iterations: 30,
            trials_per_iteration: 200,
            final_trials: 200,
            volatility: 0.15,
            seed: 42,
        };
        let a = solve_goal(&profile, config).expect("must solve");
        let b = solve_goal(&profile, config).expect("must solve");
        assert_eq!(a, b);
        assert!(a.feasible);
        assert!(a.achieved_success_probability.expect("probability") >= 90.0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let profile = deterministic_profile();
        let mut config = deterministic_config(GoalType::RequiredContribution, 2_000.0);
        config.search_max = config.search_min;
        assert!(matches!(
            solve_goal(&profile, config),
            Err(InvalidInputError::InvalidConfig(_))
        ));

        let mut config = deterministic_config(GoalType::MaxIncome, 2_000.0);
        config.target_success_probability = 120.0;
        assert!(solve_goal(&profile, config).is_err());

        let mut config = deterministic_config(GoalType::RequiredContribution, 2_000.0);
        config.max_iterations = MAX_GOAL_ITERATIONS + 1;
        assert!(matches!(
            solve_goal(&profile, config),
            Err(InvalidInputError::InvalidConfig(_))
        ));
    }

    #[test]
    fn ci_half_width_is_zero_at_certainty() {
        assert_eq!(binomial_ci_half_width(100.0, 50), 0.0);
        assert!(binomial_ci_half_width(50.0, 100) > 9.0);
    }
}
