//! Balance verification - replays a statement's own arithmetic

use rust_decimal::Decimal;

use crate::domain::result::{BalanceMismatchError, Checkpoint};
use crate::domain::{RawTransaction, StatementSummary};

/// Default tolerance: half of the minor currency unit
pub const DEFAULT_TOLERANCE: Decimal = Decimal::from_parts(5, 0, 0, false, 3);

/// Checks every declared balance against the running total
///
/// Strict: the first divergence fails the import, nothing is corrected.
#[derive(Debug, Clone, Copy)]
pub struct BalanceVerifier {
    tolerance: Decimal,
}

impl Default for BalanceVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

impl BalanceVerifier {
    pub fn new(tolerance: Decimal) -> Self {
        Self {
            tolerance: tolerance.abs(),
        }
    }

    pub fn tolerance(&self) -> Decimal {
        self.tolerance
    }

    /// Seed at the opening balance, add each amount in document order and
    /// compare at every row checkpoint and finally at the closing balance
    pub fn verify(
        &self,
        transactions: &[RawTransaction],
        summary: &StatementSummary,
    ) -> Result<(), BalanceMismatchError> {
        let mut running = summary.opening_balance;

        for (index, tx) in transactions.iter().enumerate() {
            running += tx.amount;
            if let Some(declared) = tx.balance_after {
                if !self.within(running, declared) {
                    return Err(BalanceMismatchError {
                        at_index: index,
                        checkpoint: Checkpoint::Row,
                        expected: declared,
                        actual: running,
                    });
                }
            }
        }

        if !self.within(running, summary.closing_balance) {
            return Err(BalanceMismatchError {
                at_index: transactions.len().saturating_sub(1),
                checkpoint: Checkpoint::Closing,
                expected: summary.closing_balance,
                actual: running,
            });
        }
        Ok(())
    }

    fn within(&self, actual: Decimal, expected: Decimal) -> bool {
        (actual - expected).abs() <= self.tolerance
    }
}
