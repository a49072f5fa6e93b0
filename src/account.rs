// 🏦 Account Identifier - account id from the statement's file name
//
// Statements are exported as e.g.
//   Transactions--601730-01606158--16-12-2023-10-12-2024.pdf
// where the two groups between the double hyphens are sort code and
// account number.

use crate::error::LedgerError;
use regex::Regex;

/// Returned when the file name does not follow the convention.
pub const UNKNOWN_ACCOUNT: &str = "Unknown";

pub const DEFAULT_ACCOUNT_PATTERN: &str = r"--(\d+)-(\d+)--";

#[derive(Debug, Clone)]
pub struct AccountIdentifier {
    pattern: Regex,
}

impl AccountIdentifier {
    /// Build from a configured pattern. The pattern needs two capture groups.
    pub fn new(pattern: &str) -> Result<Self, LedgerError> {
        let pattern = Regex::new(pattern)
            .map_err(|e| LedgerError::Config(format!("account_pattern: {}", e)))?;

        if pattern.captures_len() < 3 {
            return Err(LedgerError::Config(format!(
                "account_pattern needs two capture groups: {}",
                pattern.as_str()
            )));
        }

        Ok(AccountIdentifier { pattern })
    }

    /// Account id for a file name, or `"Unknown"`. Never fails.
    pub fn identify(&self, file_name: &str) -> String {
        self.pattern
            .captures(file_name)
            .and_then(|caps| {
                let sort_code = caps.get(1)?.as_str();
                let account = caps.get(2)?.as_str();
                Some(format!("{}-{}", sort_code, account))
            })
            .unwrap_or_else(|| UNKNOWN_ACCOUNT.to_string())
    }
}

impl Default for AccountIdentifier {
    fn default() -> Self {
        AccountIdentifier {
            pattern: Regex::new(DEFAULT_ACCOUNT_PATTERN).expect("default account pattern compiles"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conventional_file_name() {
        let identifier = AccountIdentifier::default();
        assert_eq!(
            identifier.identify("Transactions--601730-01606158--16-12-2023-10-12-2024.pdf"),
            "601730-01606158"
        );
    }

    #[test]
    fn test_unconventional_file_name() {
        let identifier = AccountIdentifier::default();
        assert_eq!(identifier.identify("statement.pdf"), "Unknown");
        assert_eq!(identifier.identify(""), "Unknown");
        assert_eq!(identifier.identify("Transactions-601730-01606158-.pdf"), "Unknown");
    }

    #[test]
    fn test_leading_zeros_are_kept() {
        let identifier = AccountIdentifier::default();
        assert_eq!(identifier.identify("x--000123-0042--y.pdf"), "000123-0042");
    }

    #[test]
    fn test_custom_pattern() {
        let identifier = AccountIdentifier::new(r"acct_(\d{2})_(\d{4})").unwrap();
        assert_eq!(identifier.identify("acct_12_3456.pdf"), "12-3456");
        assert_eq!(identifier.identify("acct_1_3456.pdf"), "Unknown");
    }

    #[test]
    fn test_pattern_validation() {
        assert!(AccountIdentifier::new(r"(\d+").is_err());
        assert!(AccountIdentifier::new(r"--(\d+)--").is_err());
    }
}
