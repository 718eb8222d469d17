//! Email-to-SMS address resolution.
//!
//! US carriers only. The table is read-only const data; callers that
//! need a different carrier set pass their own resolution, nothing here
//! is process-global mutable state.

use crate::error::NotifyError;

/// Carrier name → email-to-SMS domain suffix (US, as of 2024).
pub const CARRIERS: &[(&str, &str)] = &[
    ("att", "@mms.att.net"),
    ("tmobile", "@tmomail.net"),
    ("verizon", "@vtext.com"),
    ("sprint", "@messaging.sprintpcs.com"),
];

/// Resolve a US phone number and carrier name to an email-to-SMS
/// address. Separators `( ) - . space` are stripped from the number.
pub fn sms_address(number: &str, carrier: &str) -> Result<String, NotifyError> {
    let invalid = |reason: String| NotifyError::InvalidRecipient {
        address: number.to_string(),
        reason,
    };

    let suffix = CARRIERS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(carrier))
        .map(|(_, suffix)| *suffix)
        .ok_or_else(|| {
            let known = CARRIERS
                .iter()
                .map(|(name, _)| *name)
                .collect::<Vec<_>>()
                .join(", ");
            invalid(format!("unknown carrier '{carrier}', valid carriers: {known}"))
        })?;

    let cleaned: String = number
        .chars()
        .filter(|c| !matches!(c, '(' | ')' | '-' | '.' | ' '))
        .collect();
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid(
            "phone number must contain only digits and separators".to_string(),
        ));
    }
    if !matches!(cleaned.len(), 10 | 11) {
        return Err(invalid(format!(
            "expected a 10- or 11-digit US number, got {} digits",
            cleaned.len()
        )));
    }

    Ok(format!("{cleaned}{suffix}"))
}
