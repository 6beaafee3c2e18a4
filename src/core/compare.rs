use super::debt::simulate_all;
use super::error::InvalidInputError;
use super::types::{DebtPortfolio, RankedOutcome, StrategyOutcome};

/// Orders outcomes by total interest, then payoff duration.
///
/// The order comes only from the simulated figures; ties keep the caller's
/// order. Every entry reports what the recommended (rank 0) outcome saves
/// relative to it.
pub fn rank(outcomes: &[StrategyOutcome]) -> Vec<RankedOutcome> {
    let mut sorted: Vec<&StrategyOutcome> = outcomes.iter().collect();
    sorted.sort_by(|a, b| {
        a.total_interest_paid
            .total_cmp(&b.total_interest_paid)
            .then_with(|| a.payoff_periods.cmp(&b.payoff_periods))
    });

    let Some(best) = sorted.first().copied() else {
        return Vec::new();
    };

    sorted
        .iter()
        .enumerate()
        .map(|(rank, outcome)| RankedOutcome {
            rank,
            recommended: rank == 0,
            outcome: (*outcome).clone(),
            interest_saved_by_recommended: outcome.total_interest_paid - best.total_interest_paid,
            periods_saved_by_recommended: outcome.payoff_periods as i64
                - best.payoff_periods as i64,
        })
        .collect()
}

/// Simulates every strategy for `portfolio` and ranks the results.
pub fn compare_strategies(
    portfolio: &DebtPortfolio,
) -> Result<Vec<RankedOutcome>, InvalidInputError> {
    let outcomes = simulate_all(portfolio)?;
    Ok(rank(&outcomes))
}
