//! Metadata from file names.
//!
//! Recorders and editors often encode show, category, scene and take in the file
//! name, e.g. `PR2_Allen_Sc5.14D_01.wav`. A [`FilenamePattern`] pulls those parts
//! out; [`extraction_batch`] turns them into one undoable edit.

use super::fields::TypedField;
use super::MetadataRecord;
use crate::command::Command;
use crate::error::FieldError;
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilenamePattern {
    ShowCategorySceneTake,
    ShowSceneTake,
    CategorySceneTake,
    SceneTakeCategory,
}

const SCENE: &str = r"(?:Sc|Scene|S)([^_]+)";
const TAKE: &str = r"(?:T|Take|)(\d+)";
const EXTENSION: &str = r"(?:\.wav|\.wave)?$";

impl FilenamePattern {
    pub const ALL: [FilenamePattern; 4] = [
        FilenamePattern::ShowCategorySceneTake,
        FilenamePattern::ShowSceneTake,
        FilenamePattern::CategorySceneTake,
        FilenamePattern::SceneTakeCategory,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FilenamePattern::ShowCategorySceneTake => "Show_Category_Scene_Take",
            FilenamePattern::ShowSceneTake => "Show_Scene_Take",
            FilenamePattern::CategorySceneTake => "Category_Scene_Take",
            FilenamePattern::SceneTakeCategory => "Scene_Take_Category",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name().eq_ignore_ascii_case(name))
    }

    pub fn example(self) -> &'static str {
        match self {
            FilenamePattern::ShowCategorySceneTake => "PR2_Allen_Sc5.14D_01.wav",
            FilenamePattern::ShowSceneTake => "PR2_Sc5.14D_01.wav",
            FilenamePattern::CategorySceneTake => "Allen_Sc5.14D_01.wav",
            FilenamePattern::SceneTakeCategory => "Sc5.14D_01_Allen.wav",
        }
    }

    /// Fields captured by each group, in order.
    pub fn fields(self) -> &'static [TypedField] {
        use TypedField::*;
        match self {
            FilenamePattern::ShowCategorySceneTake => &[Show, Category, Scene, Take],
            FilenamePattern::ShowSceneTake => &[Show, Scene, Take],
            FilenamePattern::CategorySceneTake => &[Category, Scene, Take],
            FilenamePattern::SceneTakeCategory => &[Scene, Take, Category],
        }
    }

    fn regex(self) -> &'static Regex {
        static COMPILED: OnceLock<Vec<Regex>> = OnceLock::new();
        let compiled = COMPILED.get_or_init(|| {
            let compile = |pattern: String| Regex::new(&pattern).expect("file name regex must compile");
            vec![
                compile(format!(r"(?i)^([^_]+)_([^_]+)_{SCENE}_{TAKE}{EXTENSION}")),
                compile(format!(r"(?i)^([^_]+)_{SCENE}_{TAKE}{EXTENSION}")),
                compile(format!(r"(?i)^([^_]+)_{SCENE}_{TAKE}{EXTENSION}")),
                compile(format!(r"(?i)^{SCENE}_{TAKE}_([^_.]+){EXTENSION}")),
            ]
        });
        let index = Self::ALL.iter().position(|p| *p == self).unwrap_or(0);
        &compiled[index]
    }

    /// Field values found in `filename`. Empty when the name does not match.
    pub fn parse(self, filename: &str) -> Vec<(TypedField, String)> {
        let Some(captures) = self.regex().captures(filename) else {
            return Vec::new();
        };
        self.fields()
            .iter()
            .enumerate()
            .filter_map(|(i, field)| {
                let value = captures.get(i + 1)?.as_str().trim();
                (!value.is_empty()).then(|| (*field, value.to_string()))
            })
            .collect()
    }
}

/// One batch setting every extracted field that differs from the record's current
/// value. `None` when nothing would change.
pub fn extraction_batch<'a>(
    records: impl IntoIterator<Item = &'a MetadataRecord>,
    pattern: FilenamePattern,
) -> Result<Option<Command>, FieldError> {
    let mut members = Vec::new();
    let mut files = 0;
    for record in records {
        let before = members.len();
        for (field, value) in pattern.parse(&record.filename()) {
            let current = record.fields().get(field.label())?;
            if current.as_deref() == Some(value.as_str()) {
                continue;
            }
            members.push(Command::EditField {
                path: record.path().to_path_buf(),
                field: field.label().to_string(),
                old_value: current,
                new_value: Some(value),
            });
        }
        if members.len() > before {
            files += 1;
        }
    }
    if members.is_empty() {
        return Ok(None);
    }
    Ok(Some(Command::Batch {
        description: format!("Extract {} from {files} file names", pattern.name()),
        members,
    }))
}
