use std::f64::consts::PI;

use rand::Rng;
use tracing::debug;

use super::engine::{
    ContributionAdjustment, OneTimeCost, ProjectionOverrides, required_savings, terminal_balance,
    terminal_balance_with, validate_profile,
};
use super::error::{InvalidInputError, require_finite, require_non_negative};
use super::types::{
    EventImpact, FinancialProfile, MonteCarloResult, PERIODS_PER_YEAR, ProbabilityClass,
    ScenarioEvent, ScenarioSummary, SimulationTrial, StressLevel,
};

pub const DEFAULT_TRIALS: u32 = 1_000;
pub const DEFAULT_VOLATILITY: f64 = 0.15;
pub const DEFAULT_SEED: u64 = 42;
pub const MAX_TRIALS: u32 = 100_000;

/// Return draws are truncated to this many standard deviations.
pub const MAX_SIGMA_DRAW: f64 = 3.0;
const MIN_ANNUAL_RETURN: f64 = -0.95;

const LOW_STRESS_LIMIT: f64 = 5.0;
const MEDIUM_STRESS_LIMIT: f64 = 15.0;
const HIGH_STRESS_LIMIT: f64 = 30.0;

const P10: f64 = 10.0;
const P50: f64 = 50.0;
const P90: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonteCarloConfig {
    pub trials: u32,
    pub volatility: f64,
    /// Terminal balance a trial must reach; the required savings when unset.
    pub target: Option<f64>,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            trials: DEFAULT_TRIALS,
            volatility: DEFAULT_VOLATILITY,
            target: None,
        }
    }
}

impl ScenarioEvent {
    pub fn new(
        name: &str,
        probability: ProbabilityClass,
        impact: EventImpact,
        activation_period: u32,
    ) -> Self {
        Self {
            name: name.to_string(),
            probability,
            impact,
            enabled: true,
            activation_period,
        }
    }

    /// Standard catalog of life events.
    pub fn presets() -> Vec<ScenarioEvent> {
        vec![
            ScenarioEvent::new(
                "Job loss",
                ProbabilityClass::Medium,
                EventImpact {
                    income_delta_pct: -100.0,
                    expense_delta_pct: 0.0,
                    one_time_cost: 0.0,
                    duration_periods: 6,
                },
                PERIODS_PER_YEAR,
            ),
            ScenarioEvent::new(
                "Medical emergency",
                ProbabilityClass::Low,
                EventImpact {
                    income_delta_pct: 0.0,
                    expense_delta_pct: 0.0,
                    one_time_cost: 15_000.0,
                    duration_periods: 1,
                },
                2 * PERIODS_PER_YEAR,
            ),
            ScenarioEvent::new(
                "Reduced hours",
                ProbabilityClass::Medium,
                EventImpact {
                    income_delta_pct: -25.0,
                    expense_delta_pct: 0.0,
                    one_time_cost: 0.0,
                    duration_periods: 12,
                },
                PERIODS_PER_YEAR,
            ),
            ScenarioEvent::new(
                "Major home repair",
                ProbabilityClass::Medium,
                EventImpact {
                    income_delta_pct: 0.0,
                    expense_delta_pct: 0.0,
                    one_time_cost: 10_000.0,
                    duration_periods: 1,
                },
                3 * PERIODS_PER_YEAR,
            ),
            ScenarioEvent::new(
                "Inflation spike",
                ProbabilityClass::High,
                EventImpact {
                    income_delta_pct: 0.0,
                    expense_delta_pct: 15.0,
                    one_time_cost: 0.0,
                    duration_periods: 24,
                },
                6,
            ),
            ScenarioEvent::new(
                "New dependent",
                ProbabilityClass::Low,
                EventImpact {
                    income_delta_pct: 0.0,
                    expense_delta_pct: 20.0,
                    one_time_cost: 0.0,
                    duration_periods: 18 * PERIODS_PER_YEAR,
                },
                2 * PERIODS_PER_YEAR,
            ),
        ]
    }

    fn validate(&self) -> Result<(), InvalidInputError> {
        require_finite("impact.income_delta_pct", self.impact.income_delta_pct)?;
        require_finite("impact.expense_delta_pct", self.impact.expense_delta_pct)?;
        require_non_negative("impact.one_time_cost", self.impact.one_time_cost)?;
        if self.impact.income_delta_pct < -100.0 {
            return Err(InvalidInputError::OutOfRange {
                field: "impact.income_delta_pct",
                reason: format!(
                    "cannot lose more than all income, got {}",
                    self.impact.income_delta_pct
                ),
            });
        }
        if self.impact.expense_delta_pct < -100.0 {
            return Err(InvalidInputError::OutOfRange {
                field: "impact.expense_delta_pct",
                reason: format!(
                    "cannot cut more than all expenses, got {}",
                    self.impact.expense_delta_pct
                ),
            });
        }
        Ok(())
    }

    fn apply_to(&self, profile: &FinancialProfile, overrides: &mut ProjectionOverrides) {
        let periods = PERIODS_PER_YEAR as f64;
        let income_delta = profile.annual_income / periods * self.impact.income_delta_pct / 100.0;
        let expense_delta =
            profile.annual_expenses / periods * self.impact.expense_delta_pct / 100.0;
        if (income_delta != 0.0 || expense_delta != 0.0) && self.impact.duration_periods > 0 {
            overrides.adjustments.push(ContributionAdjustment {
                start_period: self.activation_period,
                duration_periods: self.impact.duration_periods,
                monthly_income_delta: income_delta,
                monthly_expense_delta: expense_delta,
            });
        }
        if self.impact.one_time_cost > 0.0 {
            overrides.one_time_costs.push(OneTimeCost {
                period: self.activation_period,
                amount: self.impact.one_time_cost,
            });
        }
    }
}

pub fn stress_level(savings_impact_percent: f64) -> StressLevel {
    let magnitude = savings_impact_percent.abs();
    if magnitude < LOW_STRESS_LIMIT {
        StressLevel::Low
    } else if magnitude < MEDIUM_STRESS_LIMIT {
        StressLevel::Medium
    } else if magnitude < HIGH_STRESS_LIMIT {
        StressLevel::High
    } else {
        StressLevel::Critical
    }
}

fn savings_impact_percent(baseline: f64, stressed: f64) -> f64 {
    if baseline <= 0.0 {
        return 0.0;
    }
    (stressed - baseline) / baseline * 100.0
}

fn summarize(
    name: String,
    probability: ProbabilityClass,
    baseline: f64,
    stressed: f64,
) -> ScenarioSummary {
    let impact = savings_impact_percent(baseline, stressed);
    ScenarioSummary {
        event_name: name,
        probability,
        baseline_terminal: baseline,
        stressed_terminal: stressed,
        savings_impact_percent: impact,
        stress_level: stress_level(impact),
        goal_achievement_probability: (100.0 + impact).clamp(0.0, 100.0),
    }
}

/// Re-runs the projection once per enabled event and compares it with the
/// unperturbed terminal balance.
pub fn evaluate(
    profile: &FinancialProfile,
    events: &[ScenarioEvent],
) -> Result<Vec<ScenarioSummary>, InvalidInputError> {
    let baseline = terminal_balance(profile)?;
    let mut summaries = Vec::with_capacity(events.len());
    for event in events.iter().filter(|e| e.enabled) {
        event.validate()?;
        let mut overrides = ProjectionOverrides::default();
        event.apply_to(profile, &mut overrides);
        let stressed = terminal_balance_with(profile, &overrides)?;
        summaries.push(summarize(
            event.name.clone(),
            event.probability,
            baseline,
            stressed,
        ));
    }
    Ok(summaries)
}

/// All enabled events applied together; `None` when nothing is enabled.
pub fn evaluate_combined(
    profile: &FinancialProfile,
    events: &[ScenarioEvent],
) -> Result<Option<ScenarioSummary>, InvalidInputError> {
    let enabled: Vec<&ScenarioEvent> = events.iter().filter(|e| e.enabled).collect();
    if enabled.is_empty() {
        return Ok(None);
    }

    let baseline = terminal_balance(profile)?;
    let mut overrides = ProjectionOverrides::default();
    for event in &enabled {
        event.validate()?;
        event.apply_to(profile, &mut overrides);
    }
    let stressed = terminal_balance_with(profile, &overrides)?;
    let probability = enabled
        .iter()
        .map(|e| e.probability)
        .min_by_key(|p| match p {
            ProbabilityClass::Low => 0,
            ProbabilityClass::Medium => 1,
            ProbabilityClass::High => 2,
        })
        .unwrap_or(ProbabilityClass::Low);
    let name = enabled
        .iter()
        .map(|e| e.name.as_str())
        .collect::<Vec<_>>()
        .join(" + ");

    Ok(Some(summarize(name, probability, baseline, stressed)))
}

fn validate_monte_carlo(config: &MonteCarloConfig) -> Result<(), InvalidInputError> {
    if config.trials == 0 || config.trials > MAX_TRIALS {
        return Err(InvalidInputError::InvalidConfig(format!(
            "trials must be between 1 and {MAX_TRIALS}, got {}",
            config.trials
        )));
    }
    require_non_negative("volatility", config.volatility)?;
    if let Some(target) = config.target {
        require_non_negative("target", target)?;
    }
    Ok(())
}

/// Randomized projections around the nominal return.
///
/// Each trial draws one truncated-normal perturbation of the annual return
/// and re-runs the projection with it. The generator is supplied by the
/// caller so a fixed seed reproduces every figure.
pub fn run_monte_carlo<R: Rng>(
    profile: &FinancialProfile,
    config: &MonteCarloConfig,
    rng: &mut R,
) -> Result<MonteCarloResult, InvalidInputError> {
    validate_profile(profile)?;
    validate_monte_carlo(config)?;

    let baseline_terminal = terminal_balance(profile)?;
    let target = match config.target {
        Some(target) => target,
        None => required_savings(profile)?,
    };
    let return_floor = MIN_ANNUAL_RETURN.min(profile.nominal_return_rate);

    let mut trials = Vec::with_capacity(config.trials as usize);
    for trial in 0..config.trials {
        let z = standard_normal(rng).clamp(-MAX_SIGMA_DRAW, MAX_SIGMA_DRAW);
        let annual_return = (profile.nominal_return_rate + config.volatility * z).max(return_floor);
        let terminal_balance =
            terminal_balance_with(profile, &ProjectionOverrides::with_return(annual_return))?;
        trials.push(SimulationTrial {
            trial,
            annual_return,
            terminal_balance,
        });
    }

    let mut ranked: Vec<(f64, u32)> = trials
        .iter()
        .map(|t| (t.terminal_balance, t.trial))
        .collect();
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    let sorted: Vec<f64> = ranked.into_iter().map(|(value, _)| value).collect();

    let successes = trials
        .iter()
        .filter(|t| t.terminal_balance >= target)
        .count();
    let count = trials.len() as f64;
    let success_probability = successes as f64 / count * 100.0;
    let mean = sorted.iter().sum::<f64>() / count;

    let result = MonteCarloResult {
        target,
        baseline_terminal,
        success_probability,
        mean,
        median: percentile(&sorted, P50),
        p10: percentile(&sorted, P10),
        p90: percentile(&sorted, P90),
        trials,
    };
    debug!(
        trials = config.trials,
        success_probability = result.success_probability,
        median = result.median,
        "monte carlo finished"
    );
    Ok(result)
}

fn standard_normal<R: Rng>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Linear interpolation between ranks of an ascending slice.
pub(crate) fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }

    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }

    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper || sorted[lower] == sorted[upper] {
        sorted[lower]
    } else {
        let w = rank - lower as f64;
        sorted[lower] * (1.0 - w) + sorted[upper] * w
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::tests::sample_profile;
    use proptest::prelude::{prop_assert, proptest};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn flat_profile() -> FinancialProfile {
        let mut profile = sample_profile();
        profile.monthly_contribution = 0.0;
        profile.nominal_return_rate = 0.0;
        profile.inflation_rate = 0.0;
        profile
    }

    fn cost_event(name: &str, cost: f64) -> ScenarioEvent {
        ScenarioEvent::new(
            name,
            ProbabilityClass::Low,
            EventImpact {
                income_delta_pct: 0.0,
                expense_delta_pct: 0.0,
                one_time_cost: cost,
                duration_periods: 1,
            },
            12,
        )
    }

    #[test]
    fn stress_levels_use_absolute_impact() {
        assert_eq!(stress_level(-4.99), StressLevel::Low);
        assert_eq!(stress_level(5.0), StressLevel::Medium);
        assert_eq!(stress_level(-14.9), StressLevel::Medium);
        assert_eq!(stress_level(15.0), StressLevel::High);
        assert_eq!(stress_level(-29.9), StressLevel::High);
        assert_eq!(stress_level(-30.0), StressLevel::Critical);
        assert_eq!(stress_level(-75.0), StressLevel::Critical);
    }

    #[test]
    fn one_time_cost_scales_impact() {
        let profile = flat_profile();
        let summaries = evaluate(&profile, &[cost_event("Roof", 10_000.0)]).expect("valid");
        assert_eq!(summaries.len(), 1);
        let summary = &summaries[0];
        assert_approx(summary.baseline_terminal, 50_000.0);
        assert_approx(summary.stressed_terminal, 40_000.0);
        assert_approx(summary.savings_impact_percent, -20.0);
        assert_eq!(summary.stress_level, StressLevel::High);
        assert_approx(summary.goal_achievement_probability, 80.0);
    }

    #[test]
    fn income_loss_reduces_savings_for_its_duration() {
        let profile = flat_profile();
        let event = ScenarioEvent::new(
            "Unpaid leave",
            ProbabilityClass::Medium,
            EventImpact {
                income_delta_pct: -50.0,
                expense_delta_pct: 0.0,
                one_time_cost: 0.0,
                duration_periods: 4,
            },
            0,
        );
        let summaries = evaluate(&profile, &[event]).expect("valid");
        let lost = 75_000.0 / 12.0 * 0.5 * 4.0;
        assert_approx(summaries[0].stressed_terminal, 50_000.0 - lost);
    }

    #[test]
    fn disabled_events_are_skipped() {
        let profile = sample_profile();
        let mut event = cost_event("Skipped", 1_000.0);
        event.enabled = false;
        let summaries = evaluate(&profile, &[event.clone()]).expect("valid");
        assert!(summaries.is_empty());
        assert_eq!(evaluate_combined(&profile, &[event]).expect("valid"), None);
    }

    #[test]
    fn goal_probability_is_clamped() {
        let profile = flat_profile();
        let summaries = evaluate(&profile, &[cost_event("Wipeout", 500_000.0)]).expect("valid");
        assert_approx(summaries[0].stressed_terminal, 0.0);
        assert_approx(summaries[0].savings_impact_percent, -100.0);
        assert_approx(summaries[0].goal_achievement_probability, 0.0);
        assert_eq!(summaries[0].stress_level, StressLevel::Critical);
    }

    #[test]
    fn presets_never_improve_savings() {
        let profile = sample_profile();
        let summaries = evaluate(&profile, &ScenarioEvent::presets()).expect("valid");
        assert_eq!(summaries.len(), ScenarioEvent::presets().len());
        for summary in &summaries {
            assert!(summary.savings_impact_percent <= 0.0, "{summary:?}");
            assert!((0.0..=100.0).contains(&summary.goal_achievement_probability));
        }
    }

    #[test]
    fn combined_events_compound() {
        let profile = flat_profile();
        let events = vec![cost_event("Car", 5_000.0), cost_event("Roof", 15_000.0)];
        let combined = evaluate_combined(&profile, &events)
            .expect("valid")
            .expect("enabled events");
        assert_eq!(combined.event_name, "Car + Roof");
        assert_approx(combined.stressed_terminal, 30_000.0);
        assert_approx(combined.savings_impact_percent, -40.0);
        assert_eq!(combined.stress_level, StressLevel::Critical);
    }

    #[test]
    fn evaluate_rejects_impossible_income_loss() {
        let profile = sample_profile();
        let mut event = cost_event("Bad", 0.0);
        event.impact.income_delta_pct = -150.0;
        assert!(matches!(
            evaluate(&profile, &[event]),
            Err(InvalidInputError::OutOfRange { .. })
        ));
    }

    #[test]
    fn zero_volatility_collapses_to_baseline() {
        let profile = sample_profile();
        let config = MonteCarloConfig {
            trials: 200,
            volatility: 0.0,
            target: None,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(DEFAULT_SEED);
        let result = run_monte_carlo(&profile, &config, &mut rng).expect("valid");
        let baseline = terminal_balance(&profile).expect("valid");

        assert!(result.success_probability == 0.0 || result.success_probability == 100.0);
        assert_eq!(result.p10, baseline);
        assert_eq!(result.median, baseline);
        assert_eq!(result.p90, baseline);
        assert_eq!(result.baseline_terminal, baseline);
        assert_eq!(result.success_probability, 100.0);
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let profile = sample_profile();
        let config = MonteCarloConfig::default();
        let a = run_monte_carlo(&profile, &config, &mut ChaCha8Rng::seed_from_u64(7))
            .expect("valid");
        let b = run_monte_carlo(&profile, &config, &mut ChaCha8Rng::seed_from_u64(7))
            .expect("valid");
        let c = run_monte_carlo(&profile, &config, &mut ChaCha8Rng::seed_from_u64(8))
            .expect("valid");
        assert_eq!(a, b);
        assert_ne!(a.median, c.median);
        assert_eq!(a.trials.len(), DEFAULT_TRIALS as usize);
    }

    #[test]
    fn seeded_percentiles_are_pinned() {
        let profile = sample_profile();
        let config = MonteCarloConfig::default();
        let result = run_monte_carlo(&profile, &config, &mut ChaCha8Rng::seed_from_u64(7))
            .expect("valid");
        let pinned = |actual: f64, expected: f64| {
            assert!(
                (actual - expected).abs() <= expected.abs() * 1e-9,
                "expected {expected}, got {actual}"
            );
        };
        pinned(result.p10, 40_792.863_264_012_14);
        pinned(result.median, 745_133.133_295_070_3);
        pinned(result.p90, 296_021_088.251_702_55);
    }

    #[test]
    fn trial_returns_stay_within_truncation() {
        let profile = sample_profile();
        let config = MonteCarloConfig::default();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let result = run_monte_carlo(&profile, &config, &mut rng).expect("valid");
        let bound = MAX_SIGMA_DRAW * config.volatility + EPS;
        for (idx, trial) in result.trials.iter().enumerate() {
            assert_eq!(trial.trial as usize, idx);
            assert!((trial.annual_return - profile.nominal_return_rate).abs() <= bound);
        }
        assert!(result.p10 <= result.median && result.median <= result.p90);
    }

    #[test]
    fn explicit_target_controls_success() {
        let profile = sample_profile();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let easy = MonteCarloConfig {
            target: Some(0.0),
            ..MonteCarloConfig::default()
        };
        let result = run_monte_carlo(&profile, &easy, &mut rng).expect("valid");
        assert_eq!(result.success_probability, 100.0);

        let impossible = MonteCarloConfig {
            target: Some(1e15),
            ..MonteCarloConfig::default()
        };
        let result = run_monte_carlo(&profile, &impossible, &mut rng).expect("valid");
        assert_eq!(result.success_probability, 0.0);
    }

    #[test]
    fn invalid_monte_carlo_config_is_rejected() {
        let profile = sample_profile();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let zero = MonteCarloConfig {
            trials: 0,
            ..MonteCarloConfig::default()
        };
        assert!(matches!(
            run_monte_carlo(&profile, &zero, &mut rng),
            Err(InvalidInputError::InvalidConfig(_))
        ));
        let nan = MonteCarloConfig {
            volatility: f64::NAN,
            ..MonteCarloConfig::default()
        };
        assert!(run_monte_carlo(&profile, &nan, &mut rng).is_err());
    }

    #[test]
    fn percentile_interpolates_between_points() {
        let values = vec![1.0, 2.0, 3.0, 4.0];
        assert_approx(percentile(&values, 25.0), 1.75);
        assert_approx(percentile(&values, 50.0), 2.5);
        assert_approx(percentile(&[7.0], 90.0), 7.0);
        assert_approx(percentile(&[], 90.0), 0.0);
    }

    proptest! {
        #[test]
        fn percentiles_are_ordered(seed in 0u64..10_000, volatility in 0.0f64..0.4) {
            let profile = sample_profile();
            let config = MonteCarloConfig { trials: 64, volatility, target: None };
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let result = run_monte_carlo(&profile, &config, &mut rng).expect("valid");
            prop_assert!(result.p10 <= result.median);
            prop_assert!(result.median <= result.p90);
            prop_assert!((0.0..=100.0).contains(&result.success_probability));
        }
    }
}
