// ⚖️ Balance Reconciler - validate running balances per account
//
// Within an account, every printed balance must follow from the previous
// one:
//   balance + paid_in - paid_out = next balance
//
// A transition that misses by more than the tolerance points at a dropped,
// duplicated or misread row. The reconciler never edits the ledger; it
// produces a derived view that borrows the records.

use crate::error::LedgerError;
use crate::ledger::Ledger;
use crate::record::{to_cents, Amount, TransactionRecord};
use bigdecimal::BigDecimal;
use serde::Serialize;
use std::collections::BTreeMap;

// ============================================================================
// CHECK STATUS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CheckStatus {
    /// Next balance matches within tolerance
    Consistent,

    /// Next balance is off by more than the tolerance
    Discrepancy,

    /// A balance or amount on either side is missing
    Unavailable { reason: String },

    /// Last record of its account: nothing to compare with
    Closing,
}

impl CheckStatus {
    pub fn label(&self) -> &'static str {
        match self {
            CheckStatus::Consistent => "Consistent",
            CheckStatus::Discrepancy => "Discrepancy",
            CheckStatus::Unavailable { .. } => "Unavailable",
            CheckStatus::Closing => "Closing",
        }
    }
}

// ============================================================================
// RECONCILIATION ROW
// ============================================================================

#[derive(Debug, Clone)]
pub struct ReconciliationRow<'a> {
    pub record: &'a TransactionRecord,

    /// Balance of the next record in the same account
    pub next_balance: Amount,

    /// balance + paid_in - paid_out
    pub expected_next_balance: Amount,

    /// next_balance - expected_next_balance
    pub balance_delta: Amount,

    /// `None` when no comparison was made (closing or unavailable)
    pub has_discrepancy: Option<bool>,

    pub status: CheckStatus,
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountSummary {
    pub account: String,
    pub records: usize,
    pub discrepancies: usize,
    pub unavailable: usize,
    pub opening_balance: Amount,
    pub closing_balance: Amount,
}

#[derive(Debug, Clone)]
pub struct ReconciliationReport<'a> {
    /// One row per ledger record, ordered by account then date
    pub rows: Vec<ReconciliationRow<'a>>,
    pub accounts: Vec<AccountSummary>,
}

impl<'a> ReconciliationReport<'a> {
    fn count(&self, status: fn(&CheckStatus) -> bool) -> usize {
        self.rows.iter().filter(|row| status(&row.status)).count()
    }

    /// Transitions that were actually compared
    pub fn checked(&self) -> usize {
        self.consistent() + self.discrepancies()
    }

    pub fn consistent(&self) -> usize {
        self.count(|s| matches!(s, CheckStatus::Consistent))
    }

    pub fn discrepancies(&self) -> usize {
        self.count(|s| matches!(s, CheckStatus::Discrepancy))
    }

    pub fn unavailable(&self) -> usize {
        self.count(|s| matches!(s, CheckStatus::Unavailable { .. }))
    }

    pub fn is_balanced(&self) -> bool {
        self.discrepancies() == 0
    }

    pub fn summary(&self) -> String {
        format!(
            "Reconciliation over {} accounts: {} transitions checked, {} discrepancies, {} could not be evaluated",
            self.accounts.len(),
            self.checked(),
            self.discrepancies(),
            self.unavailable()
        )
    }
}

// ============================================================================
// BALANCE RECONCILER
// ============================================================================

pub struct BalanceReconciler {
    /// Largest |delta| still considered consistent (default: 0.01)
    pub tolerance: BigDecimal,
}

impl BalanceReconciler {
    pub fn new() -> Self {
        BalanceReconciler {
            tolerance: BigDecimal::new(1.into(), 2),
        }
    }

    pub fn with_tolerance(tolerance: BigDecimal) -> Self {
        BalanceReconciler { tolerance }
    }

    /// Walk each account's records in (date, original_order) order and
    /// compare every expected balance with the next printed one.
    pub fn reconcile<'a>(&self, ledger: &'a Ledger) -> ReconciliationReport<'a> {
        let mut groups: BTreeMap<&str, Vec<&'a TransactionRecord>> = BTreeMap::new();
        for record in ledger.records() {
            groups
                .entry(record.account_number.as_str())
                .or_default()
                .push(record);
        }

        let mut rows = Vec::with_capacity(ledger.len());
        let mut accounts = Vec::with_capacity(groups.len());

        for (account, mut group) in groups {
            group.sort_by(|a, b| {
                a.date
                    .cmp(&b.date)
                    .then(a.original_order.cmp(&b.original_order))
            });

            let mut summary = AccountSummary {
                account: account.to_string(),
                records: group.len(),
                discrepancies: 0,
                unavailable: 0,
                opening_balance: group.first().and_then(|r| r.balance.clone()),
                closing_balance: group.last().and_then(|r| r.balance.clone()),
            };

            for (index, &record) in group.iter().enumerate() {
                let row = match group.get(index + 1) {
                    Some(&next) => self.check_transition(record, next),
                    None => ReconciliationRow {
                        record,
                        next_balance: None,
                        expected_next_balance: record.expected_next_balance(),
                        balance_delta: None,
                        has_discrepancy: None,
                        status: CheckStatus::Closing,
                    },
                };

                match row.status {
                    CheckStatus::Discrepancy => {
                        summary.discrepancies += 1;
                        tracing::debug!(
                            account,
                            date = %record.date,
                            original_order = record.original_order,
                            "balance discrepancy"
                        );
                    }
                    CheckStatus::Unavailable { .. } => summary.unavailable += 1,
                    _ => {}
                }

                rows.push(row);
            }

            accounts.push(summary);
        }

        let report = ReconciliationReport { rows, accounts };
        tracing::info!("{}", report.summary());
        report
    }

    fn check_transition<'a>(
        &self,
        record: &'a TransactionRecord,
        next: &TransactionRecord,
    ) -> ReconciliationRow<'a> {
        let next_balance = next.balance.clone();
        let expected_next_balance = record.expected_next_balance();

        let (next_value, expected) = match (&next_balance, &expected_next_balance) {
            (Some(next_value), Some(expected)) => (next_value, expected),
            _ => {
                let err = LedgerError::ReconciliationUnavailable {
                    account: record.account_number.clone(),
                    date: record.date,
                    missing: missing_field(record, next),
                };
                tracing::debug!("{}", err);
                return ReconciliationRow {
                    record,
                    next_balance,
                    expected_next_balance,
                    balance_delta: None,
                    has_discrepancy: None,
                    status: CheckStatus::Unavailable {
                        reason: err.to_string(),
                    },
                };
            }
        };

        let delta = to_cents(&(next_value - expected));
        let has_discrepancy = delta.abs() > self.tolerance;

        ReconciliationRow {
            record,
            next_balance,
            expected_next_balance,
            balance_delta: Some(delta),
            has_discrepancy: Some(has_discrepancy),
            status: if has_discrepancy {
                CheckStatus::Discrepancy
            } else {
                CheckStatus::Consistent
            },
        }
    }
}

impl Default for BalanceReconciler {
    fn default() -> Self {
        Self::new()
    }
}

fn missing_field(record: &TransactionRecord, next: &TransactionRecord) -> &'static str {
    if record.balance.is_none() {
        "balance"
    } else if record.paid_in.is_none() {
        "paid in"
    } else if record.paid_out.is_none() {
        "paid out"
    } else if next.balance.is_none() {
        "next balance"
    } else {
        "amount"
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{DocumentLedger, LedgerBuilder};
    use crate::normalizer::NormalizationReport;
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use std::str::FromStr;

    fn money(s: &str) -> Amount {
        Some(BigDecimal::from_str(s).unwrap())
    }

    fn create_test_record(
        account: &str,
        day: u32,
        paid_in: &str,
        paid_out: &str,
        balance: &str,
        order: usize,
    ) -> TransactionRecord {
        TransactionRecord::new(
            NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            "BGC".to_string(),
            format!("row {}", order),
            money(paid_in),
            money(paid_out),
            money(balance),
            order,
        )
        .with_provenance("test.pdf", "/test.pdf", account)
    }

    fn ledger(records: Vec<TransactionRecord>) -> Ledger {
        let doc = DocumentLedger {
            source_file: "test.pdf".to_string(),
            source_path: "/test.pdf".to_string(),
            account_number: String::new(),
            records,
            report: NormalizationReport::default(),
        };
        LedgerBuilder::default().merge(&[doc]).ledger
    }

    #[test]
    fn test_second_transition_is_flagged() {
        // expected next balances: 100 + 10 = 110, 110 + 20 = 130
        let ledger = ledger(vec![
            create_test_record("1-2", 1, "10.00", "0.00", "100.00", 0),
            create_test_record("1-2", 2, "20.00", "0.00", "110.00", 1),
            create_test_record("1-2", 3, "0.00", "0.00", "95.00", 2),
        ]);

        let report = BalanceReconciler::new().reconcile(&ledger);

        assert_eq!(report.rows.len(), 3);
        assert_eq!(report.rows[0].has_discrepancy, Some(false));
        assert_eq!(report.rows[0].status, CheckStatus::Consistent);

        assert_eq!(report.rows[1].expected_next_balance, money("130.00"));
        assert_eq!(report.rows[1].next_balance, money("95.00"));
        assert_eq!(report.rows[1].balance_delta, money("-35.00"));
        assert_eq!(report.rows[1].has_discrepancy, Some(true));

        assert_eq!(report.rows[2].status, CheckStatus::Closing);
        assert_eq!(report.rows[2].next_balance, None);
        assert_eq!(report.rows[2].balance_delta, None);
        assert_eq!(report.rows[2].has_discrepancy, None);

        assert_eq!(report.discrepancies(), 1);
        assert!(!report.is_balanced());
        println!("✅ {}", report.summary());
    }

    #[test]
    fn test_tolerance_is_strict() {
        let ledger = ledger(vec![
            create_test_record("1-2", 1, "0.00", "0.00", "100.00", 0),
            create_test_record("1-2", 2, "0.00", "0.00", "100.01", 1),
            create_test_record("1-2", 3, "0.00", "0.00", "100.03", 2),
        ]);

        let report = BalanceReconciler::new().reconcile(&ledger);
        assert_eq!(report.rows[0].has_discrepancy, Some(false), "0.01 is within tolerance");
        assert_eq!(report.rows[1].has_discrepancy, Some(true));
    }

    #[test]
    fn test_accounts_are_checked_separately() {
        let ledger = ledger(vec![
            create_test_record("A", 1, "0.00", "0.00", "100.00", 0),
            create_test_record("B", 1, "0.00", "0.00", "5000.00", 1),
            create_test_record("A", 2, "0.00", "0.00", "100.00", 2),
            create_test_record("B", 2, "0.00", "0.00", "5000.00", 3),
        ]);

        let report = BalanceReconciler::new().reconcile(&ledger);

        assert!(report.is_balanced());
        assert_eq!(report.accounts.len(), 2);
        assert_eq!(report.accounts[0].account, "A");
        assert_eq!(report.accounts[1].opening_balance, money("5000.00"));
        assert_eq!(report.rows[0].record.account_number, "A");
        assert_eq!(report.rows[1].status, CheckStatus::Closing);
        assert_eq!(report.rows[3].status, CheckStatus::Closing);
    }

    #[test]
    fn test_same_day_ties_use_original_order() {
        let ledger = ledger(vec![
            create_test_record("1-2", 5, "0.00", "50.00", "50.00", 7),
            create_test_record("1-2", 5, "0.00", "50.00", "100.00", 3),
        ]);

        let report = BalanceReconciler::new().reconcile(&ledger);

        assert_eq!(report.rows[0].record.original_order, 3);
        assert_eq!(report.rows[0].has_discrepancy, Some(false));
    }

    #[test]
    fn test_missing_amount_is_unavailable_not_discrepancy() {
        let mut broken = create_test_record("1-2", 2, "0.00", "0.00", "100.00", 1);
        broken.paid_out = None;

        let ledger = ledger(vec![
            create_test_record("1-2", 1, "0.00", "0.00", "100.00", 0),
            broken,
            create_test_record("1-2", 3, "0.00", "0.00", "1.00", 2),
        ]);

        let report = BalanceReconciler::new().reconcile(&ledger);

        match &report.rows[1].status {
            CheckStatus::Unavailable { reason } => assert!(reason.contains("paid out")),
            other => panic!("expected Unavailable, got {:?}", other),
        }
        assert_eq!(report.rows[1].has_discrepancy, None);
        assert_eq!(report.unavailable(), 1);
        assert_eq!(report.discrepancies(), 0);
        assert_eq!(report.checked(), 1);
        assert_eq!(report.accounts[0].unavailable, 1);
    }

    #[test]
    fn test_empty_ledger() {
        let empty = Ledger::default();
        let report = BalanceReconciler::new().reconcile(&empty);
        assert!(report.rows.is_empty());
        assert!(report.accounts.is_empty());
        assert!(report.is_balanced());
    }

    proptest! {
        #[test]
        fn chained_balances_never_flag(
            steps in prop::collection::vec((0i64..100_000, 0i64..100_000, -1i64..=1), 1..30),
            opening in -100_000i64..100_000,
        ) {
            let mut records = Vec::new();
            let mut balance = opening;
            for (i, (paid_in, paid_out, jitter)) in steps.iter().enumerate() {
                let mut record = create_test_record("1-2", 1, "0", "0", "0", i);
                record.date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64);
                record.paid_in = Some(BigDecimal::new((*paid_in).into(), 2));
                record.paid_out = Some(BigDecimal::new((*paid_out).into(), 2));
                record.balance = Some(BigDecimal::new(balance.into(), 2));
                records.push(record);
                // the next printed balance is off by at most one cent
                balance = balance + paid_in - paid_out + jitter;
            }

            let ledger = ledger(records);
            let report = BalanceReconciler::new().reconcile(&ledger);
            prop_assert_eq!(report.discrepancies(), 0);
            prop_assert_eq!(report.checked(), steps.len() - 1);
        }
    }
}
