// Inventory ledger and its collaborators
pub mod allocation;
pub mod inventory_ledger;
pub mod reservations;
pub mod transfers;

// Order lifecycle
pub mod order_status;
pub mod orders;

// Service container for dependency injection
pub mod factory;

use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};

/// Human-facing document number such as `ORD-20240115-7KQ2M9XA`.
pub(crate) fn document_number(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!(
        "{}-{}-{}",
        prefix,
        Utc::now().format("%Y%m%d"),
        suffix.to_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_numbers_carry_prefix_and_date() {
        let number = document_number("TRF");
        let parts: Vec<&str> = number.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "TRF");
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }
}
