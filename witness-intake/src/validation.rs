//! Submit-time validation of the collected form

use chrono::{Months, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{FieldError, ValidationError};
use crate::types::{FieldValue, FormSnapshot};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

pub const MSG_REQUIRED: &str = "Please fill this out.";
pub const MSG_EMAIL: &str = "Please enter a valid email address.";
pub const MSG_DATE_FUTURE: &str = "Incident date cannot be in the future.";
pub const MSG_DATE_STALE: &str = "Incident date must be within the past year.";
pub const MSG_DATE_FORMAT: &str = "Please enter a valid date.";
pub const MSG_RELATIONSHIP: &str = "Please select your relationship to this incident.";
pub const MSG_CONSENT: &str = "You must agree to the privacy policy to submit a report.";

/// Field rules for the incident form
#[derive(Debug, Clone)]
pub struct FormRules {
    /// Text fields that must be non-blank
    pub required: Vec<String>,
    /// Fields checked as email addresses when non-empty
    pub email: Vec<String>,
    /// `YYYY-MM-DD` fields bounded to the past year
    pub dates: Vec<String>,
    /// Radio group that needs a selection, with its message
    pub required_choice: Option<(String, String)>,
    /// Checkbox that must be ticked, with its message
    pub consent: Option<(String, String)>,
}

impl Default for FormRules {
    fn default() -> Self {
        Self {
            required: vec![
                "incidentDate".into(),
                "incidentLocation".into(),
                "incidentDescription".into(),
            ],
            email: vec!["submitterEmail".into()],
            dates: vec!["incidentDate".into()],
            required_choice: Some(("relationship".into(), MSG_RELATIONSHIP.into())),
            consent: Some(("privacyConsent".into(), MSG_CONSENT.into())),
        }
    }
}

impl FormRules {
    /// Check `snapshot` against every rule, reporting all failures at once
    pub fn validate(&self, snapshot: &FormSnapshot, today: NaiveDate) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        for field in &self.required {
            if is_blank(snapshot.get(field)) {
                errors.push(FieldError::new(field, MSG_REQUIRED));
            }
        }

        for field in &self.email {
            if let Some(value) = snapshot.get(field).and_then(FieldValue::as_single) {
                if !value.is_empty() && !is_valid_email(value) {
                    push_once(&mut errors, field, MSG_EMAIL);
                }
            }
        }

        for field in &self.dates {
            if let Some(value) = snapshot.get(field).and_then(FieldValue::as_single) {
                if value.trim().is_empty() {
                    continue;
                }
                if let Err(message) = check_incident_date(value, today) {
                    push_once(&mut errors, field, message);
                }
            }
        }

        if let Some((group, message)) = &self.required_choice {
            if is_blank(snapshot.get(group)) {
                errors.push(FieldError::new(group, message));
            }
        }

        if let Some((checkbox, message)) = &self.consent {
            if is_blank(snapshot.get(checkbox)) {
                errors.push(FieldError::new(checkbox, message));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { errors })
        }
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Incident dates must fall within the past year, today included
pub fn check_incident_date(value: &str, today: NaiveDate) -> Result<(), &'static str> {
    let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| MSG_DATE_FORMAT)?;
    if date > today {
        return Err(MSG_DATE_FUTURE);
    }
    let one_year_ago = today.checked_sub_months(Months::new(12)).unwrap_or(NaiveDate::MIN);
    if date < one_year_ago {
        return Err(MSG_DATE_STALE);
    }
    Ok(())
}

fn is_blank(value: Option<&FieldValue>) -> bool {
    match value {
        None => true,
        Some(FieldValue::Single(v)) => v.trim().is_empty(),
        Some(FieldValue::Multiple(values)) => values.iter().all(|v| v.trim().is_empty()),
    }
}

// A blank required field already carries an error; keep one per field
fn push_once(errors: &mut Vec<FieldError>, field: &str, message: &str) {
    if !errors.iter().any(|e| e.field == field) {
        errors.push(FieldError::new(field, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    fn complete_form() -> FormSnapshot {
        FormSnapshot::from_entries([
            ("incidentDate", "2025-06-01"),
            ("incidentLocation", "Pilsen"),
            ("incidentDescription", "Detained outside the store"),
            ("relationship", "witness"),
            ("privacyConsent", "on"),
            ("submitterEmail", "a@b.com"),
        ])
    }

    #[test]
    fn test_complete_form_passes() {
        assert!(FormRules::default().validate(&complete_form(), today()).is_ok());
    }

    #[test]
    fn test_blank_required_field() {
        let mut form = complete_form();
        form.insert("incidentLocation", "   ");

        let err = FormRules::default().validate(&form, today()).unwrap_err();
        assert_eq!(err.first_field(), Some("incidentLocation"));
        assert_eq!(err.message_for("incidentLocation"), Some(MSG_REQUIRED));
    }

    #[test]
    fn test_missing_relationship_and_consent() {
        let mut form = complete_form();
        form.remove("relationship");
        form.remove("privacyConsent");

        let err = FormRules::default().validate(&form, today()).unwrap_err();
        assert_eq!(err.message_for("relationship"), Some(MSG_RELATIONSHIP));
        assert_eq!(err.message_for("privacyConsent"), Some(MSG_CONSENT));
        assert_eq!(err.errors.len(), 2);
    }

    #[test]
    fn test_email_checked_only_when_present() {
        let mut form = complete_form();
        form.insert("submitterEmail", "");
        assert!(FormRules::default().validate(&form, today()).is_ok());

        form.insert("submitterEmail", "not an email");
        let err = FormRules::default().validate(&form, today()).unwrap_err();
        assert_eq!(err.message_for("submitterEmail"), Some(MSG_EMAIL));
    }

    #[test]
    fn test_email_pattern() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.com"));
        assert!(!is_valid_email("@c.com"));
    }

    #[test]
    fn test_incident_date_bounds() {
        assert_eq!(check_incident_date("2025-06-15", today()), Ok(()));
        assert_eq!(check_incident_date("2024-06-15", today()), Ok(()));
        assert_eq!(check_incident_date("2025-06-16", today()), Err(MSG_DATE_FUTURE));
        assert_eq!(check_incident_date("2024-06-14", today()), Err(MSG_DATE_STALE));
        assert_eq!(check_incident_date("06/01/2025", today()), Err(MSG_DATE_FORMAT));
    }

    #[test]
    fn test_one_error_per_field() {
        let mut form = complete_form();
        form.insert("incidentDate", "2030-01-01");
        let err = FormRules::default().validate(&form, today()).unwrap_err();
        assert_eq!(err.errors.len(), 1);
        assert_eq!(err.message_for("incidentDate"), Some(MSG_DATE_FUTURE));
    }

    #[test]
    fn test_phone_is_not_validated() {
        let mut form = complete_form();
        form.insert("submitterPhone", "5551234");
        assert!(FormRules::default().validate(&form, today()).is_ok());
    }
}
