//! Input checks run before any network call.  Failures surface inline to the
//! caller and abort the operation.

use crate::consts::MAX_RECORDING_BYTES;
use crate::error::ValidationError;

use time::format_description::well_known::Iso8601;
use time::PrimitiveDateTime;

pub const SUPPORTED_LANGUAGES: [&str; 4] = ["en", "zh", "ms", "ta"];

/// A slot key must be a full ISO date-time without offset.
pub fn parse_slot(slot: &str) -> Option<PrimitiveDateTime> {
    PrimitiveDateTime::parse(slot, &Iso8601::DEFAULT).ok()
}

pub fn check_slot(slot: &str) -> Result<PrimitiveDateTime, ValidationError> {
    parse_slot(slot)
        .ok_or_else(|| ValidationError::new("slot must be an ISO timestamp, e.g. 2024-06-01T10:00:00"))
}

pub fn check_phone(phone: &str) -> Result<(), ValidationError> {
    if (8..=15).contains(&phone.len()) && phone.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::new("phone number must be 8 to 15 digits"))
    }
}

pub fn check_postal_code(postal_code: &str) -> Result<(), ValidationError> {
    if postal_code.len() == 6 && postal_code.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::new("postal code must be exactly 6 digits"))
    }
}

/// Unit numbers are written as two non-empty segments split on a dash,
/// e.g. `05-123`.
pub fn check_unit_number(unit: &str) -> Result<(), ValidationError> {
    let mut parts = unit.split('-');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(floor), Some(door), None) if !floor.is_empty() && !door.is_empty() => Ok(()),
        _ => Err(ValidationError::new("unit number must look like 05-123")),
    }
}

pub fn check_language(language: &str) -> Result<(), ValidationError> {
    if SUPPORTED_LANGUAGES.contains(&language) {
        Ok(())
    } else {
        Err(ValidationError::new("unsupported language"))
    }
}

pub fn check_remarks(remarks: &str) -> Result<(), ValidationError> {
    if remarks.trim().is_empty() {
        Err(ValidationError::new("remarks must not be empty"))
    } else {
        Ok(())
    }
}

pub fn check_recording_size(bytes: &[u8]) -> Result<(), ValidationError> {
    if bytes.len() > MAX_RECORDING_BYTES {
        Err(ValidationError::new("recording exceeds the 5 MB limit"))
    } else {
        Ok(())
    }
}
