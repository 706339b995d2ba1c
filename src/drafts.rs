//! Reservation form text typed by the user, kept per device across re-renders.

use std::collections::{HashMap, HashSet};

pub const DEFAULT_HOURS: &str = "1";
pub const DEFAULT_MINUTES: &str = "0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDraft {
    pub owner: String,
    pub hours: String,
    pub minutes: String,
}

impl Default for InputDraft {
    fn default() -> Self {
        Self {
            owner: String::new(),
            hours: DEFAULT_HOURS.to_string(),
            minutes: DEFAULT_MINUTES.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftField {
    Owner,
    Hours,
    Minutes,
}

impl DraftField {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "owner" | "user" => Some(DraftField::Owner),
            "hours" | "hrs" | "h" => Some(DraftField::Hours),
            "minutes" | "mins" | "m" => Some(DraftField::Minutes),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("enter an owner for {0}")]
    MissingOwner(String),
    #[error("reservation length for {0} must be more than zero minutes")]
    EmptyDuration(String),
    #[error("unknown device {0}")]
    UnknownDevice(String),
    #[error("{0} is not free")]
    NotFree(String),
}

/// A draft parsed at submission time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationInput {
    pub owner: String,
    pub hours: u32,
    pub minutes: u32,
}

impl ReservationInput {
    pub fn total_minutes(&self) -> u32 {
        self.hours.saturating_mul(60).saturating_add(self.minutes)
    }
}

/// Reads the leading digits, so `90abc` is 90 and `1.5` is 1. Anything
/// without them, negatives included, counts as zero.
fn parse_count(raw: &str) -> u32 {
    let raw = raw.trim_start();
    let digits = raw.strip_prefix('+').unwrap_or(raw);
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse().unwrap_or(0)
}

impl InputDraft {
    pub fn set(&mut self, field: DraftField, value: impl Into<String>) {
        let value = value.into();
        match field {
            DraftField::Owner => self.owner = value,
            DraftField::Hours => self.hours = value,
            DraftField::Minutes => self.minutes = value,
        }
    }

    pub fn parse(&self, device_id: &str) -> Result<ReservationInput, ValidationError> {
        let owner = self.owner.trim();
        if owner.is_empty() {
            return Err(ValidationError::MissingOwner(device_id.to_string()));
        }
        let input = ReservationInput {
            owner: owner.to_string(),
            hours: parse_count(&self.hours),
            minutes: parse_count(&self.minutes),
        };
        if input.total_minutes() == 0 {
            return Err(ValidationError::EmptyDuration(device_id.to_string()));
        }
        Ok(input)
    }
}

#[derive(Debug, Default)]
pub struct DraftStore {
    drafts: HashMap<String, InputDraft>,
}

impl DraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, device_id: &str) -> Option<&InputDraft> {
        self.drafts.get(device_id)
    }

    /// The draft, or the form defaults when the user hasn't typed anything.
    pub fn get_or_default(&self, device_id: &str) -> InputDraft {
        self.drafts.get(device_id).cloned().unwrap_or_default()
    }

    pub fn edit(&mut self, device_id: &str, field: DraftField, value: impl Into<String>) {
        self.drafts
            .entry(device_id.to_string())
            .or_default()
            .set(field, value);
    }

    pub fn clear(&mut self, device_id: &str) -> Option<InputDraft> {
        self.drafts.remove(device_id)
    }

    pub fn retain(&mut self, keep: &HashSet<&str>) {
        self.drafts.retain(|id, _| keep.contains(id.as_str()));
    }

    pub fn len(&self) -> usize {
        self.drafts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_to_one_hour() {
        let store = DraftStore::new();
        let draft = store.get_or_default("sw1");
        assert_eq!(draft.hours, "1");
        assert_eq!(draft.minutes, "0");
        assert!(store.get("sw1").is_none());
    }

    #[test]
    fn edits_create_and_persist() {
        let mut store = DraftStore::new();
        store.edit("sw1", DraftField::Owner, "ali");
        store.edit("sw1", DraftField::Owner, "alice");
        store.edit("sw1", DraftField::Minutes, "30");
        let draft = store.get("sw1").unwrap();
        assert_eq!(draft.owner, "alice");
        assert_eq!(draft.hours, "1");
        assert_eq!(draft.minutes, "30");
    }

    #[test]
    fn parse_totals_minutes() {
        let draft = InputDraft {
            owner: " alice ".into(),
            hours: "1".into(),
            minutes: "30".into(),
        };
        let input = draft.parse("sw1").unwrap();
        assert_eq!(input.owner, "alice");
        assert_eq!(input.total_minutes(), 90);
    }

    #[test]
    fn counts_read_leading_digits() {
        assert_eq!(parse_count("90abc"), 90);
        assert_eq!(parse_count("1.5"), 1);
        assert_eq!(parse_count(" +2"), 2);
        assert_eq!(parse_count("-5"), 0);
        assert_eq!(parse_count("x"), 0);
        assert_eq!(parse_count(""), 0);

        let draft = InputDraft {
            owner: "alice".into(),
            hours: "1.5".into(),
            minutes: "15min".into(),
        };
        assert_eq!(draft.parse("sw1").unwrap().total_minutes(), 75);
    }

    #[test]
    fn parse_rejects_blank_owner_and_zero_length() {
        let mut draft = InputDraft::default();
        assert_eq!(
            draft.parse("sw1"),
            Err(ValidationError::MissingOwner("sw1".into()))
        );
        draft.set(DraftField::Owner, "bob");
        draft.set(DraftField::Hours, "abc");
        draft.set(DraftField::Minutes, "-5");
        assert_eq!(
            draft.parse("sw1"),
            Err(ValidationError::EmptyDuration("sw1".into()))
        );
    }

    #[test]
    fn retain_drops_missing_devices() {
        let mut store = DraftStore::new();
        store.edit("sw1", DraftField::Owner, "a");
        store.edit("sw2", DraftField::Owner, "b");
        store.retain(&HashSet::from(["sw2"]));
        assert!(store.get("sw1").is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn field_names() {
        assert_eq!(DraftField::parse("Owner"), Some(DraftField::Owner));
        assert_eq!(DraftField::parse("mins"), Some(DraftField::Minutes));
        assert_eq!(DraftField::parse("days"), None);
    }
}
