//! Content fingerprints used for duplicate detection.

use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use invoiceflow_invoicing::Invoice;

/// Upper-case alphanumerics only, so `INV-001` and `inv 001` compare equal.
pub fn normalize_invoice_number(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// SHA-256 (lowercase hex) over vendor, invoice number, date, total and currency.
pub fn content_hash(invoice: &Invoice) -> String {
    hash_parts(
        invoice.vendor_ref(),
        invoice.invoice_number(),
        &invoice.invoice_date().to_string(),
        invoice.total(),
        invoice.currency().code(),
    )
}

pub fn hash_parts(vendor: &str, number: &str, date: &str, total: Decimal, currency: &str) -> String {
    let canonical = format!(
        "{}|{}|{}|{}|{}",
        vendor.trim().to_ascii_uppercase(),
        normalize_invoice_number(number),
        date,
        total.normalize(),
        currency.trim().to_ascii_uppercase(),
    );
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn formatting_noise_does_not_change_hash() {
        let a = hash_parts("vend-1", "INV-001", "2026-03-01", dec!(100.00), "usd");
        let b = hash_parts(" VEND-1 ", "inv 001", "2026-03-01", dec!(100), "USD");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn different_amounts_hash_differently() {
        let a = hash_parts("V", "1", "2026-03-01", dec!(100), "USD");
        let b = hash_parts("V", "1", "2026-03-01", dec!(100.01), "USD");
        assert_ne!(a, b);
    }
}
