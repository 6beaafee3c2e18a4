use serde::{Deserialize, Serialize};

/// Months per year; one simulation period is one month.
pub const PERIODS_PER_YEAR: u32 = 12;

#[derive(Debug, Clone, PartialEq)]
pub struct FinancialProfile {
    pub current_age: u32,
    pub target_age: u32,
    pub life_expectancy: u32,
    pub annual_income: f64,
    pub annual_expenses: f64,
    pub current_savings: f64,
    pub monthly_contribution: f64,
    pub nominal_return_rate: f64,
    pub inflation_rate: f64,
    pub employer_match: f64,
    pub desired_retirement_income: f64,
    pub external_income: f64,
}

impl FinancialProfile {
    pub fn horizon_periods(&self) -> i64 {
        (self.target_age as i64 - self.current_age as i64) * PERIODS_PER_YEAR as i64
    }

    pub fn retirement_periods(&self) -> i64 {
        (self.life_expectancy as i64 - self.target_age as i64) * PERIODS_PER_YEAR as i64
    }

    /// Monthly contribution including the employer match.
    pub fn effective_contribution(&self) -> f64 {
        self.monthly_contribution * (1.0 + self.employer_match)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionPoint {
    pub period: u32,
    pub age: f64,
    pub balance: f64,
    pub income: f64,
    pub expenses: f64,
    pub readiness_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetirementAnalysis {
    pub horizon_periods: u32,
    pub retirement_periods: u32,
    pub real_rate: f64,
    pub required_savings: f64,
    pub current_trajectory: f64,
    pub gap: f64,
    pub monthly_required: f64,
    pub additional_monthly_required: f64,
    pub on_track: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Debt {
    pub id: String,
    pub name: String,
    pub balance: f64,
    pub annual_rate: f64,
    pub minimum_payment: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DebtPortfolio {
    pub debts: Vec<Debt>,
    pub monthly_budget: f64,
}

impl DebtPortfolio {
    pub fn total_minimums(&self) -> f64 {
        self.debts.iter().map(|d| d.minimum_payment).sum()
    }

    pub fn total_balance(&self) -> f64 {
        self.debts.iter().map(|d| d.balance).sum()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PayoffStrategy {
    Avalanche,
    Snowball,
    #[serde(alias = "minimumOnly", alias = "minimum_only")]
    MinimumOnly,
}

impl PayoffStrategy {
    pub const ALL: [PayoffStrategy; 3] = [
        PayoffStrategy::Avalanche,
        PayoffStrategy::Snowball,
        PayoffStrategy::MinimumOnly,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PayoffStrategy::Avalanche => "avalanche",
            PayoffStrategy::Snowball => "snowball",
            PayoffStrategy::MinimumOnly => "minimum-only",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeFlags {
    pub insufficient_budget: bool,
    pub negative_amortization: bool,
    pub non_convergent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebtPayoff {
    pub id: String,
    pub name: String,
    pub period: u32,
    pub interest_paid: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyOutcome {
    pub strategy: PayoffStrategy,
    pub total_interest_paid: f64,
    pub total_paid: f64,
    pub payoff_periods: u32,
    pub payoff_order: Vec<DebtPayoff>,
    pub remaining_balance: f64,
    pub balance_history: Vec<f64>,
    pub flags: OutcomeFlags,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedOutcome {
    pub rank: usize,
    pub recommended: bool,
    pub outcome: StrategyOutcome,
    pub interest_saved_by_recommended: f64,
    pub periods_saved_by_recommended: i64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbabilityClass {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventImpact {
    pub income_delta_pct: f64,
    pub expense_delta_pct: f64,
    pub one_time_cost: f64,
    pub duration_periods: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioEvent {
    pub name: String,
    pub probability: ProbabilityClass,
    pub impact: EventImpact,
    pub enabled: bool,
    pub activation_period: u32,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StressLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioSummary {
    pub event_name: String,
    pub probability: ProbabilityClass,
    pub baseline_terminal: f64,
    pub stressed_terminal: f64,
    pub savings_impact_percent: f64,
    pub stress_level: StressLevel,
    pub goal_achievement_probability: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationTrial {
    pub trial: u32,
    pub annual_return: f64,
    pub terminal_balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonteCarloResult {
    pub trials: Vec<SimulationTrial>,
    pub target: f64,
    pub baseline_terminal: f64,
    pub success_probability: f64,
    pub mean: f64,
    pub median: f64,
    pub p10: f64,
    pub p90: f64,
}
