//! Display row for a record.
//!
//! Typed fields come from iXML. When a typed field is missing, labels embedded in
//! the bext text fields and INFO `ISBJ`/`ICMT` texts are tried. Fallback values are
//! display-only and never written back.

use super::fields::{MetadataFields, TypedField};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordSummary {
    pub filename: String,
    pub show: Option<String>,
    pub scene: Option<String>,
    pub take: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub note: Option<String>,
    pub circled: Option<String>,
    pub dirty: bool,
}

struct Patterns {
    scene_take: Regex,
    scene: Regex,
    take: Regex,
    show: Regex,
    category: Regex,
    subcategory: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let compile = |pattern: &str| Regex::new(pattern).expect("fallback regex must compile");
        Patterns {
            // SC01_TK02, S01T02, SCENE 3 TAKE 4
            scene_take: compile(r"(?i)\bS(?:C|CNE|CENE)?[_\s]*(\d+)[_\s]*T(?:K|AKE)?[_\s]*(\d+)"),
            scene: compile(r"(?i)\bSC(?:ENE|N)?[:\s]+(\w+)"),
            take: compile(r"(?i)\bT(?:AKE|K)[:\s]+(\w+)"),
            show: compile(r"(?i)\b(?:SHOW|PROGRAM|SERIES)[:\s]+(\w[^,;\r\n]*)"),
            category: compile(r"(?i)\b(?:CAT(?:EGORY)?|TYPE)[:\s]+(\w[^,;\r\n]*)"),
            subcategory: compile(r"(?i)\b(?:SUB(?:CAT(?:EGORY)?)?|SUBTYPE)[:\s]+(\w[^,;\r\n]*)"),
        }
    })
}

fn capture(regex: &Regex, text: &str) -> Option<String> {
    regex
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn present(fields: &MetadataFields, field: TypedField) -> Option<String> {
    fields
        .typed(field)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Build the display row for `fields`.
pub fn summarize(filename: &str, fields: &MetadataFields, dirty: bool) -> RecordSummary {
    let p = patterns();
    let bext_text = [
        fields.bext.description.as_str(),
        fields.bext.originator.as_str(),
        fields.bext.originator_reference.as_str(),
    ]
    .join(" ");
    let info_text = ["ISBJ", "ICMT"]
        .iter()
        .filter_map(|id| fields.info.get(id))
        .collect::<Vec<_>>()
        .join("\n");

    let mut scene = present(fields, TypedField::Scene);
    let mut take = present(fields, TypedField::Take);
    if let Some(pair) = p.scene_take.captures(&bext_text) {
        if scene.is_none() {
            scene = pair.get(1).map(|m| m.as_str().to_string());
        }
        if take.is_none() {
            take = pair.get(2).map(|m| m.as_str().to_string());
        }
    }
    let scene = scene.or_else(|| capture(&p.scene, &bext_text));
    let take = take.or_else(|| capture(&p.take, &bext_text));

    let show = present(fields, TypedField::Show)
        .or_else(|| capture(&p.show, &bext_text))
        .or_else(|| capture(&p.show, &info_text));
    let category = present(fields, TypedField::Category).or_else(|| capture(&p.category, &info_text));
    let subcategory =
        present(fields, TypedField::Subcategory).or_else(|| capture(&p.subcategory, &info_text));

    RecordSummary {
        filename: filename.to_string(),
        show,
        scene,
        take,
        category,
        subcategory,
        note: present(fields, TypedField::Note),
        circled: present(fields, TypedField::Circled),
        dirty,
    }
}
