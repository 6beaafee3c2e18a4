use tracing::debug;

use super::error::{InvalidInputError, require_finite, require_non_negative, require_rate};
use super::types::{FinancialProfile, PERIODS_PER_YEAR, ProjectionPoint, RetirementAnalysis};

/// Rates closer to zero than this use the linear (zero-growth) formulas.
const ZERO_RATE_EPS: f64 = 1e-12;

/// Shortfalls under a cent still count as on track.
const ON_TRACK_TOLERANCE: f64 = 0.01;

/// Monthly income/expense change applied while a window is active.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContributionAdjustment {
    pub start_period: u32,
    pub duration_periods: u32,
    pub monthly_income_delta: f64,
    pub monthly_expense_delta: f64,
}

impl ContributionAdjustment {
    fn covers(&self, month: u32) -> bool {
        month >= self.start_period && (month - self.start_period) < self.duration_periods
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OneTimeCost {
    pub period: u32,
    pub amount: f64,
}

/// Perturbations layered over a profile without touching it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectionOverrides {
    pub nominal_return_rate: Option<f64>,
    pub adjustments: Vec<ContributionAdjustment>,
    pub one_time_costs: Vec<OneTimeCost>,
}

impl ProjectionOverrides {
    pub fn with_return(nominal_return_rate: f64) -> Self {
        Self {
            nominal_return_rate: Some(nominal_return_rate),
            ..Self::default()
        }
    }

    fn has_cashflow_changes(&self) -> bool {
        !self.adjustments.is_empty() || !self.one_time_costs.is_empty()
    }
}

/// Inflation-adjusted monthly rate: `(1 + n/12) / (1 + i/12) - 1`.
pub fn periodic_real_rate(nominal_annual: f64, inflation_annual: f64) -> f64 {
    let periods = PERIODS_PER_YEAR as f64;
    (1.0 + nominal_annual / periods) / (1.0 + inflation_annual / periods) - 1.0
}

fn fv_lump_sum(present_value: f64, rate: f64, periods: u32) -> f64 {
    present_value * (1.0 + rate).powi(periods as i32)
}

fn fv_ordinary_annuity(payment: f64, rate: f64, periods: u32) -> f64 {
    if rate.abs() < ZERO_RATE_EPS {
        return payment * periods as f64;
    }
    payment * ((1.0 + rate).powi(periods as i32) - 1.0) / rate
}

fn pv_annuity_due(payment: f64, rate: f64, periods: u32) -> f64 {
    if rate.abs() < ZERO_RATE_EPS {
        return payment * periods as f64;
    }
    payment * (1.0 - (1.0 + rate).powi(-(periods as i32))) / rate * (1.0 + rate)
}

pub fn validate_profile(profile: &FinancialProfile) -> Result<(), InvalidInputError> {
    let horizon = profile.horizon_periods();
    if horizon <= 0 {
        return Err(InvalidInputError::NonPositiveHorizon {
            field: "target_age",
            periods: horizon,
        });
    }
    let retirement = profile.retirement_periods();
    if retirement <= 0 {
        return Err(InvalidInputError::NonPositiveHorizon {
            field: "life_expectancy",
            periods: retirement,
        });
    }

    require_non_negative("annual_income", profile.annual_income)?;
    require_non_negative("annual_expenses", profile.annual_expenses)?;
    require_non_negative("current_savings", profile.current_savings)?;
    require_non_negative("monthly_contribution", profile.monthly_contribution)?;
    require_non_negative("employer_match", profile.employer_match)?;
    require_non_negative(
        "desired_retirement_income",
        profile.desired_retirement_income,
    )?;
    require_non_negative("external_income", profile.external_income)?;
    require_rate("nominal_return_rate", profile.nominal_return_rate)?;
    require_rate("inflation_rate", profile.inflation_rate)?;
    Ok(())
}

/// Deterministic monthly trajectory from today to the target age, inclusive.
pub fn project(profile: &FinancialProfile) -> Result<Vec<ProjectionPoint>, InvalidInputError> {
    project_with(profile, &ProjectionOverrides::default())
}

pub fn project_with(
    profile: &FinancialProfile,
    overrides: &ProjectionOverrides,
) -> Result<Vec<ProjectionPoint>, InvalidInputError> {
    validate_profile(profile)?;
    validate_overrides(overrides)?;

    let horizon = profile.horizon_periods() as u32;
    let nominal = overrides
        .nominal_return_rate
        .unwrap_or(profile.nominal_return_rate);
    let rate = periodic_real_rate(nominal, profile.inflation_rate);
    let required = required_savings(profile)?;
    let base_income = profile.annual_income / PERIODS_PER_YEAR as f64;
    let base_expenses = profile.annual_expenses / PERIODS_PER_YEAR as f64;
    let contribution = profile.effective_contribution();

    let mut points = Vec::with_capacity(horizon as usize + 1);

    if !overrides.has_cashflow_changes() {
        for period in 0..=horizon {
            let balance = fv_lump_sum(profile.current_savings, rate, period)
                + fv_ordinary_annuity(contribution, rate, period);
            points.push(point(
                profile,
                period,
                balance,
                base_income,
                base_expenses,
                required,
            ));
        }
        return Ok(points);
    }

    let mut balance = (profile.current_savings - cost_at(overrides, 0)).max(0.0);
    points.push(point(
        profile,
        0,
        balance,
        base_income,
        base_expenses,
        required,
    ));

    for period in 1..=horizon {
        let month = period - 1;
        let (income_delta, expense_delta) = overrides
            .adjustments
            .iter()
            .filter(|adj| adj.covers(month))
            .fold((0.0, 0.0), |(inc, exp), adj| {
                (inc + adj.monthly_income_delta, exp + adj.monthly_expense_delta)
            });
        let delta = income_delta - expense_delta;

        balance =
            fv_lump_sum(balance, rate, 1) + fv_ordinary_annuity(contribution + delta, rate, 1);
        balance -= cost_at(overrides, period);
        balance = balance.max(0.0);

        points.push(point(
            profile,
            period,
            balance,
            base_income + income_delta,
            base_expenses + expense_delta,
            required,
        ));
    }

    Ok(points)
}

fn validate_overrides(overrides: &ProjectionOverrides) -> Result<(), InvalidInputError> {
    if let Some(rate) = overrides.nominal_return_rate {
        require_rate("nominal_return_rate", rate)?;
    }
    for adj in &overrides.adjustments {
        require_finite("monthly_income_delta", adj.monthly_income_delta)?;
        require_finite("monthly_expense_delta", adj.monthly_expense_delta)?;
    }
    for cost in &overrides.one_time_costs {
        require_non_negative("one_time_cost", cost.amount)?;
    }
    Ok(())
}

fn cost_at(overrides: &ProjectionOverrides, period: u32) -> f64 {
    overrides
        .one_time_costs
        .iter()
        .filter(|c| c.period == period)
        .map(|c| c.amount)
        .sum()
}

fn point(
    profile: &FinancialProfile,
    period: u32,
    balance: f64,
    income: f64,
    expenses: f64,
    required: f64,
) -> ProjectionPoint {
    ProjectionPoint {
        period,
        age: profile.current_age as f64 + period as f64 / PERIODS_PER_YEAR as f64,
        balance,
        income,
        expenses,
        readiness_ratio: readiness_ratio(balance, required),
    }
}

fn readiness_ratio(balance: f64, required: f64) -> f64 {
    if required <= 0.0 {
        1.0
    } else {
        balance / required
    }
}

pub fn terminal_balance(profile: &FinancialProfile) -> Result<f64, InvalidInputError> {
    terminal_balance_with(profile, &ProjectionOverrides::default())
}

/// Balance at the target age. Pure return overrides stay on the closed form.
pub fn terminal_balance_with(
    profile: &FinancialProfile,
    overrides: &ProjectionOverrides,
) -> Result<f64, InvalidInputError> {
    if overrides.has_cashflow_changes() {
        let points = project_with(profile, overrides)?;
        return Ok(points.last().map(|p| p.balance).unwrap_or(0.0));
    }

    validate_profile(profile)?;
    validate_overrides(overrides)?;
    let horizon = profile.horizon_periods() as u32;
    let nominal = overrides
        .nominal_return_rate
        .unwrap_or(profile.nominal_return_rate);
    let rate = periodic_real_rate(nominal, profile.inflation_rate);
    Ok(fv_lump_sum(profile.current_savings, rate, horizon)
        + fv_ordinary_annuity(profile.effective_contribution(), rate, horizon))
}

/// Level contribution at the start of each period that grows to `target`.
///
/// Inverse of the future value of an annuity due. A zero real rate falls
/// back to `target / horizon`.
pub fn required_contribution(
    target_balance: f64,
    horizon: i64,
    real_rate: f64,
) -> Result<f64, InvalidInputError> {
    require_finite("target_balance", target_balance)?;
    require_rate("real_rate", real_rate)?;
    if horizon <= 0 {
        return Err(InvalidInputError::NonPositiveHorizon {
            field: "horizon",
            periods: horizon,
        });
    }

    let n = horizon as f64;
    if real_rate.abs() < ZERO_RATE_EPS {
        return Ok(target_balance / n);
    }

    let growth = (1.0 + real_rate).powf(n) - 1.0;
    Ok(target_balance * real_rate / (growth * (1.0 + real_rate)))
}

/// Nest egg needed at the target age, in today's money.
pub fn required_savings(profile: &FinancialProfile) -> Result<f64, InvalidInputError> {
    validate_profile(profile)?;
    let shortfall = (profile.desired_retirement_income - profile.external_income).max(0.0);
    let monthly = shortfall / PERIODS_PER_YEAR as f64;
    let rate = periodic_real_rate(profile.nominal_return_rate, profile.inflation_rate);
    Ok(pv_annuity_due(
        monthly,
        rate,
        profile.retirement_periods() as u32,
    ))
}

/// End-of-period payment whose ordinary annuity grows to `target`.
fn level_payment(target: f64, rate: f64, periods: u32) -> f64 {
    if periods == 0 {
        return 0.0;
    }
    if rate.abs() < ZERO_RATE_EPS {
        return target / periods as f64;
    }
    target * rate / ((1.0 + rate).powi(periods as i32) - 1.0)
}

/// Retirement readiness on the same end-of-month accumulation as `project`.
pub fn analyze_retirement(
    profile: &FinancialProfile,
) -> Result<RetirementAnalysis, InvalidInputError> {
    validate_profile(profile)?;

    let horizon = profile.horizon_periods();
    let rate = periodic_real_rate(profile.nominal_return_rate, profile.inflation_rate);
    let required = required_savings(profile)?;
    let trajectory = terminal_balance(profile)?;
    let grown_savings = fv_lump_sum(profile.current_savings, rate, horizon as u32);
    let monthly_required =
        level_payment((required - grown_savings).max(0.0), rate, horizon as u32);
    let gap = required - trajectory;

    debug!(
        required,
        trajectory, gap, monthly_required, "retirement analysis"
    );

    Ok(RetirementAnalysis {
        horizon_periods: horizon as u32,
        retirement_periods: profile.retirement_periods() as u32,
        real_rate: rate,
        required_savings: required,
        current_trajectory: trajectory,
        gap,
        monthly_required,
        additional_monthly_required: (monthly_required - profile.effective_contribution())
            .max(0.0),
        on_track: gap <= ON_TRACK_TOLERANCE,
    })
}
