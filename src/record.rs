// 🧾 Transaction Record - the canonical unit of the ledger
//
// Amounts are 2-decimal BigDecimals wrapped in Option: `None` is the missing
// marker for a cell that could not be coerced, never a silent zero.

use bigdecimal::{BigDecimal, RoundingMode, Signed};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of description parts for `DPC` records
pub const DPC_FIELDS: usize = 5;

/// Number of description parts for `POS` records
pub const POS_FIELDS: usize = 4;

pub type Amount = Option<BigDecimal>;

/// Scale an amount to exactly two fractional digits (half-even).
pub fn to_cents(value: &BigDecimal) -> BigDecimal {
    value.with_scale_round(2, RoundingMode::HalfEven)
}

/// Render an amount with two decimals; missing renders empty.
pub fn format_amount(amount: &Amount) -> String {
    match amount {
        Some(value) => {
            let cents = to_cents(value);
            // zero would otherwise render without its fractional digits
            let magnitude = cents.as_bigint_and_exponent().0.magnitude().to_string();
            let digits = format!("{:0>3}", magnitude);
            let (units, fraction) = digits.split_at(digits.len() - 2);
            let sign = if cents.is_negative() { "-" } else { "" };
            format!("{}{}.{}", sign, units, fraction)
        }
        None => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    // ========================================================================
    // STATEMENT FIELDS
    // ========================================================================
    pub date: NaiveDate,

    /// Short type code as printed (e.g. "DPC", "POS", "BGC")
    pub transaction_type: String,

    /// Single-line description
    pub description: String,

    pub paid_in: Amount,
    pub paid_out: Amount,
    pub balance: Amount,

    // ========================================================================
    // PROVENANCE (never part of duplicate comparison)
    // ========================================================================
    pub account_number: String,
    pub source_file: String,
    pub source_path: String,

    /// Position in the document's extracted row sequence
    pub original_order: usize,

    // ========================================================================
    // DESCRIPTION BREAKDOWN
    // ========================================================================
    pub dpc: [String; DPC_FIELDS],
    pub pos: [String; POS_FIELDS],
}

impl TransactionRecord {
    /// Record straight out of normalization: no provenance yet.
    pub fn new(
        date: NaiveDate,
        transaction_type: String,
        description: String,
        paid_in: Amount,
        paid_out: Amount,
        balance: Amount,
        original_order: usize,
    ) -> Self {
        let (dpc, pos) = decompose_description(&transaction_type, &description);

        TransactionRecord {
            date,
            transaction_type,
            description,
            paid_in,
            paid_out,
            balance,
            account_number: String::new(),
            source_file: String::new(),
            source_path: String::new(),
            original_order,
            dpc,
            pos,
        }
    }

    /// Builder pattern: attach document provenance
    pub fn with_provenance(mut self, source_file: &str, source_path: &str, account_number: &str) -> Self {
        self.source_file = source_file.to_string();
        self.source_path = source_path.to_string();
        self.account_number = account_number.to_string();
        self
    }

    /// Duplicate fingerprint over (date, account, description, type, amounts).
    ///
    /// Two records with equal fingerprints are the same transaction no matter
    /// which document they came from.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [
            self.date.format("%Y-%m-%d").to_string(),
            self.account_number.clone(),
            self.description.clone(),
            self.transaction_type.clone(),
            amount_key(&self.paid_in),
            amount_key(&self.paid_out),
            amount_key(&self.balance),
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0x1f]);
        }
        format!("{:x}", hasher.finalize())
    }

    /// balance + paid_in - paid_out, when all three are known
    pub fn expected_next_balance(&self) -> Amount {
        match (&self.balance, &self.paid_in, &self.paid_out) {
            (Some(balance), Some(paid_in), Some(paid_out)) => {
                Some(to_cents(&(balance + paid_in - paid_out)))
            }
            _ => None,
        }
    }
}

// Missing must never collide with any rendered amount.
fn amount_key(amount: &Amount) -> String {
    match amount {
        Some(value) => to_cents(value).to_string(),
        None => "\u{2205}".to_string(),
    }
}

/// Split a description into positional parts for the recognized type codes.
///
/// Parts are comma separated and trimmed. The last slot keeps any remainder,
/// so nothing printed on the statement is lost.
pub fn decompose_description(
    transaction_type: &str,
    description: &str,
) -> ([String; DPC_FIELDS], [String; POS_FIELDS]) {
    let mut dpc: [String; DPC_FIELDS] = Default::default();
    let mut pos: [String; POS_FIELDS] = Default::default();

    match transaction_type.trim() {
        "DPC" => fill_parts(&mut dpc, description),
        "POS" => fill_parts(&mut pos, description),
        _ => {}
    }

    (dpc, pos)
}

fn fill_parts(slots: &mut [String], description: &str) {
    let count = slots.len();
    for (slot, part) in slots.iter_mut().zip(description.splitn(count, ',')) {
        *slot = part.trim().to_string();
    }
}
