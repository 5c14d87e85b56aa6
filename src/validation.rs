//! Record validation
//!
//! Validation never touches fields; it produces a [`ValidationReport`] that the
//! validation agent publishes and the save gate may consult.

use crate::codec::riff;
use crate::config::ValidationConfig;
use crate::error::ValidationError;
use crate::record::MetadataRecord;
use crate::types::ChunkId;
use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub path: PathBuf,
    pub checks: Vec<(String, bool)>,
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            checks: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn add_check(&mut self, description: &str, passed: bool) {
        self.checks.push((description.to_string(), passed));
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty() && self.checks.iter().all(|(_, passed)| *passed)
    }

    pub fn total_checks(&self) -> usize {
        self.checks.len()
    }

    pub fn passed_checks(&self) -> usize {
        self.checks.iter().filter(|(_, passed)| *passed).count()
    }

    /// Human-readable findings.
    pub fn issues(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

fn has_control_chars(value: &str) -> bool {
    value
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\t' | '\r' | '\n'))
}

/// Run every rule against `record`.
pub fn validate_record(record: &MetadataRecord, config: &ValidationConfig) -> ValidationReport {
    let mut report = ValidationReport::new(record.path().to_path_buf());
    let fields = record.fields();

    let exists = record.path().is_file();
    report.add_check("file exists on disk", exists);
    if !exists {
        report.add_error(ValidationError::new(None, "file no longer exists on disk"));
    }

    for name in &config.required_fields {
        match fields.get(name) {
            Ok(Some(value)) if !value.trim().is_empty() => report.add_check(name, true),
            Ok(_) => {
                report.add_check(name, false);
                report.add_error(ValidationError::new(Some(name), "required field is empty"));
            }
            Err(err) => {
                report.add_check(name, false);
                report.add_error(ValidationError::new(Some(name), err.to_string()));
            }
        }
    }

    let mut clean_text = true;
    for (name, value) in fields.named_values() {
        if has_control_chars(&value) {
            clean_text = false;
            report.add_error(ValidationError::new(Some(&name), "contains control characters"));
        }
    }
    report.add_check("no control characters", clean_text);

    if let Ok(Some(take)) = fields.get("Take") {
        let numeric = take.is_empty() || take.chars().all(|c| c.is_ascii_digit());
        report.add_check("Take is numeric", numeric);
        if !numeric {
            report.add_error(ValidationError::new(Some("Take"), format!("'{take}' is not numeric")));
        }
    }

    if let Ok(Some(date)) = fields.get("bext:OriginationDate") {
        let ok = NaiveDate::parse_from_str(&date, "%Y-%m-%d").is_ok();
        report.add_check("bext:OriginationDate is YYYY-MM-DD", ok);
        if !ok {
            report.add_error(ValidationError::new(
                Some("bext:OriginationDate"),
                format!("'{date}' is not YYYY-MM-DD"),
            ));
        }
    }

    if let Ok(Some(time)) = fields.get("bext:OriginationTime") {
        let ok = NaiveTime::parse_from_str(&time, "%H:%M:%S").is_ok();
        report.add_check("bext:OriginationTime is HH:MM:SS", ok);
        if !ok {
            report.add_error(ValidationError::new(
                Some("bext:OriginationTime"),
                format!("'{time}' is not HH:MM:SS"),
            ));
        }
    }

    for (id, label) in [(ChunkId::FMT, "fmt "), (ChunkId::DATA, "data")] {
        let present = record.chunks().iter().any(|c| c.id == id);
        report.add_check(&format!("has '{label}' chunk"), present);
        if !present {
            report.add_error(ValidationError::new(None, format!("missing '{label}' chunk")));
        }
    }

    let fits = riff::body_len(&record.rebuilt_chunks());
    report.add_check("chunk sizes fit in u32", fits.is_ok());
    if let Err(err) = fits {
        report.add_error(ValidationError::new(None, err.to_string()));
    }

    report
}
