use std::collections::HashSet;

use tracing::{debug, warn};

use super::error::{InvalidInputError, require_non_negative};
use super::types::{
    DebtPayoff, DebtPortfolio, OutcomeFlags, PERIODS_PER_YEAR, PayoffStrategy, StrategyOutcome,
};

/// 50 years of monthly periods.
pub const DEFAULT_SAFETY_CAP_PERIODS: u32 = 600;

/// Largest accepted safety cap: 100 years of monthly periods.
pub const MAX_SAFETY_CAP_PERIODS: u32 = 1_200;

/// Residual balances at or below this are treated as paid off.
const PAID_OFF_EPS: f64 = 1e-9;

#[derive(Debug, Clone)]
struct ActiveDebt {
    index: usize,
    balance: f64,
    annual_rate: f64,
    minimum_payment: f64,
    interest_paid: f64,
}

pub fn validate_portfolio(portfolio: &DebtPortfolio) -> Result<(), InvalidInputError> {
    require_non_negative("monthly_budget", portfolio.monthly_budget)?;
    let mut seen = HashSet::with_capacity(portfolio.debts.len());
    for debt in &portfolio.debts {
        if debt.id.trim().is_empty() {
            return Err(InvalidInputError::MissingField("debt.id"));
        }
        if !seen.insert(debt.id.as_str()) {
            return Err(InvalidInputError::DuplicateDebtId(debt.id.clone()));
        }
        require_non_negative("debt.balance", debt.balance)?;
        require_non_negative("debt.annual_rate", debt.annual_rate)?;
        require_non_negative("debt.minimum_payment", debt.minimum_payment)?;
    }
    Ok(())
}

pub fn simulate(
    portfolio: &DebtPortfolio,
    strategy: PayoffStrategy,
) -> Result<StrategyOutcome, InvalidInputError> {
    simulate_with_cap(portfolio, strategy, DEFAULT_SAFETY_CAP_PERIODS)
}

pub fn simulate_all(portfolio: &DebtPortfolio) -> Result<Vec<StrategyOutcome>, InvalidInputError> {
    PayoffStrategy::ALL
        .iter()
        .map(|&strategy| simulate(portfolio, strategy))
        .collect()
}

/// Month-by-month payoff of every debt under `strategy`.
///
/// Priority is recomputed each period over the debts still active, so the
/// target of surplus payments moves as debts are retired. A budget below the
/// sum of minimums degrades to minimum payments on every debt.
pub fn simulate_with_cap(
    portfolio: &DebtPortfolio,
    strategy: PayoffStrategy,
    safety_cap: u32,
) -> Result<StrategyOutcome, InvalidInputError> {
    validate_portfolio(portfolio)?;
    if safety_cap == 0 || safety_cap > MAX_SAFETY_CAP_PERIODS {
        return Err(InvalidInputError::InvalidConfig(format!(
            "safety cap must be between 1 and {MAX_SAFETY_CAP_PERIODS} periods, got {safety_cap}"
        )));
    }

    let mut flags = OutcomeFlags {
        insufficient_budget: portfolio.monthly_budget < portfolio.total_minimums(),
        ..OutcomeFlags::default()
    };
    let allocation = if flags.insufficient_budget {
        warn!(
            budget = portfolio.monthly_budget,
            minimums = portfolio.total_minimums(),
            "budget below minimum payments; paying minimums only"
        );
        PayoffStrategy::MinimumOnly
    } else {
        strategy
    };

    let mut payoff_order = Vec::with_capacity(portfolio.debts.len());
    let mut active = Vec::with_capacity(portfolio.debts.len());
    for (index, debt) in portfolio.debts.iter().enumerate() {
        if debt.balance <= PAID_OFF_EPS {
            payoff_order.push(DebtPayoff {
                id: debt.id.clone(),
                name: debt.name.clone(),
                period: 0,
                interest_paid: 0.0,
            });
        } else {
            active.push(ActiveDebt {
                index,
                balance: debt.balance,
                annual_rate: debt.annual_rate,
                minimum_payment: debt.minimum_payment,
                interest_paid: 0.0,
            });
        }
    }

    let mut total_interest = 0.0;
    let mut total_paid = 0.0;
    let mut balance_history: Vec<f64> = Vec::new();
    let mut period = 0;

    while !active.is_empty() && period < safety_cap {
        period += 1;

        for debt in active.iter_mut() {
            let interest = debt.balance * debt.annual_rate / PERIODS_PER_YEAR as f64;
            debt.balance += interest;
            debt.interest_paid += interest;
            total_interest += interest;
            if debt.minimum_payment < interest {
                flags.negative_amortization = true;
            }
        }

        let mut minimums_paid = 0.0;
        for debt in active.iter_mut() {
            let payment = debt.minimum_payment.min(debt.balance);
            debt.balance -= payment;
            minimums_paid += payment;
        }
        total_paid += minimums_paid;

        if allocation != PayoffStrategy::MinimumOnly {
            let mut leftover = (portfolio.monthly_budget - minimums_paid).max(0.0);
            for slot in priority_order(allocation, &active) {
                if leftover <= 0.0 {
                    break;
                }
                let debt = &mut active[slot];
                let payment = leftover.min(debt.balance);
                debt.balance -= payment;
                leftover -= payment;
                total_paid += payment;
            }
        }

        active.retain(|debt| {
            if debt.balance > PAID_OFF_EPS {
                return true;
            }
            let source = &portfolio.debts[debt.index];
            payoff_order.push(DebtPayoff {
                id: source.id.clone(),
                name: source.name.clone(),
                period,
                interest_paid: debt.interest_paid,
            });
            false
        });

        balance_history.push(active.iter().map(|d| d.balance).sum());
    }

    flags.non_convergent = !active.is_empty();
    let remaining_balance: f64 = active.iter().map(|d| d.balance).sum();
    if flags.non_convergent {
        warn!(
            strategy = strategy.name(),
            safety_cap, remaining_balance, "payoff did not converge within the safety cap"
        );
    }
    debug!(
        strategy = strategy.name(),
        periods = period,
        total_interest,
        "debt payoff simulated"
    );

    Ok(StrategyOutcome {
        strategy,
        total_interest_paid: total_interest,
        total_paid,
        payoff_periods: period,
        payoff_order,
        remaining_balance,
        balance_history,
        flags,
    })
}

/// Slots of `active` in the order surplus payments should target.
fn priority_order(strategy: PayoffStrategy, active: &[ActiveDebt]) -> Vec<usize> {
    let mut slots: Vec<usize> = (0..active.len())
        .filter(|&slot| active[slot].balance > PAID_OFF_EPS)
        .collect();
    match strategy {
        PayoffStrategy::Avalanche => slots.sort_by(|&a, &b| {
            let (a, b) = (&active[a], &active[b]);
            b.annual_rate
                .total_cmp(&a.annual_rate)
                .then_with(|| b.balance.total_cmp(&a.balance))
        }),
        PayoffStrategy::Snowball => slots.sort_by(|&a, &b| {
            let (a, b) = (&active[a], &active[b]);
            a.balance
                .total_cmp(&b.balance)
                .then_with(|| b.annual_rate.total_cmp(&a.annual_rate))
        }),
        PayoffStrategy::MinimumOnly => {}
    }
    slots
}
