//! Tracked metadata fields and the names they are addressed by.
//!
//! Names at the API boundary:
//! - `Scene`, `Take`, `Category`, `Subcategory`, `Show`, `Note`, `Circled`: typed iXML
//!   fields resolved through alias paths
//! - `bext:<Field>`: Broadcast-Wave fields
//! - `info:<ID>`: LIST/INFO texts
//! - anything else: a raw iXML path key

use crate::codec::bext::{self, BextFields};
use crate::codec::info::InfoList;
use crate::codec::ixml::IxmlDocument;
use crate::error::FieldError;
use serde::Serialize;

pub const FILENAME: &str = "Filename";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypedField {
    Scene,
    Take,
    Category,
    Subcategory,
    Show,
    Note,
    Circled,
}

impl TypedField {
    pub const ALL: [TypedField; 7] = [
        TypedField::Scene,
        TypedField::Take,
        TypedField::Category,
        TypedField::Subcategory,
        TypedField::Show,
        TypedField::Note,
        TypedField::Circled,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TypedField::Scene => "Scene",
            TypedField::Take => "Take",
            TypedField::Category => "Category",
            TypedField::Subcategory => "Subcategory",
            TypedField::Show => "Show",
            TypedField::Note => "Note",
            TypedField::Circled => "Circled",
        }
    }

    /// iXML paths this field is read from, in priority order. Writes target the
    /// first alias present, else the first entry.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            TypedField::Scene => &["SCENE", "BWFCORE/BWF_SCENE"],
            TypedField::Take => &["TAKE", "BWFCORE/BWF_TAKE"],
            TypedField::Category => &["CATEGORY"],
            TypedField::Subcategory => &["SUBCATEGORY"],
            TypedField::Show => &["PROJECT", "BWFCORE/BWF_SHOW"],
            TypedField::Note => &["NOTE"],
            TypedField::Circled => &["CIRCLED"],
        }
    }

    fn from_label(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.label() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BextField {
    Description,
    Originator,
    OriginatorReference,
    OriginationDate,
    OriginationTime,
    TimeReference,
}

impl BextField {
    fn from_suffix(name: &str) -> Option<Self> {
        match name {
            "Description" => Some(BextField::Description),
            "Originator" => Some(BextField::Originator),
            "OriginatorReference" => Some(BextField::OriginatorReference),
            "OriginationDate" => Some(BextField::OriginationDate),
            "OriginationTime" => Some(BextField::OriginationTime),
            "TimeReference" => Some(BextField::TimeReference),
            _ => None,
        }
    }

    /// Fixed byte width of a text field.
    pub fn width(self) -> Option<usize> {
        match self {
            BextField::Description => Some(bext::DESCRIPTION_LEN),
            BextField::Originator => Some(bext::ORIGINATOR_LEN),
            BextField::OriginatorReference => Some(bext::ORIGINATOR_REFERENCE_LEN),
            BextField::OriginationDate => Some(bext::ORIGINATION_DATE_LEN),
            BextField::OriginationTime => Some(bext::ORIGINATION_TIME_LEN),
            BextField::TimeReference => None,
        }
    }
}

/// A field name resolved against the naming rules above.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldName<'a> {
    Typed(TypedField),
    Bext(BextField),
    Info(&'a str),
    Ixml(&'a str),
}

impl<'a> FieldName<'a> {
    pub fn parse(name: &'a str) -> Result<Self, FieldError> {
        let invalid = |reason: &str| FieldError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        if name == FILENAME {
            return Err(invalid("the file name changes only through a rename"));
        }
        if let Some(typed) = TypedField::from_label(name) {
            return Ok(FieldName::Typed(typed));
        }
        if let Some(suffix) = name.strip_prefix("bext:") {
            return BextField::from_suffix(suffix)
                .map(FieldName::Bext)
                .ok_or_else(|| invalid("unknown bext field"));
        }
        if let Some(id) = name.strip_prefix("info:") {
            if id.len() != 4 || !id.bytes().all(|b| b.is_ascii_alphanumeric()) {
                return Err(invalid("INFO ids are four ASCII letters or digits"));
            }
            return Ok(FieldName::Info(id));
        }
        validate_ixml_path(name).map_err(|reason| invalid(&reason))?;
        Ok(FieldName::Ixml(name))
    }
}

fn validate_ixml_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("empty name".to_string());
    }
    for segment in path.split('/') {
        let (element, index) = match segment.split_once('[') {
            Some((element, rest)) => (element, Some(rest)),
            None => (segment, None),
        };
        let mut chars = element.chars();
        let valid_start = chars
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false);
        if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')) {
            return Err(format!("'{segment}' is not a valid XML element name"));
        }
        if let Some(rest) = index {
            let digits = rest
                .strip_suffix(']')
                .ok_or_else(|| format!("unterminated index in '{segment}'"))?;
            match digits.parse::<usize>() {
                Ok(n) if n >= 2 => {}
                _ => return Err(format!("bad index in '{segment}'")),
            }
        }
    }
    Ok(())
}

/// Label for a stored name; typed-field alias keys read as their field.
pub fn display_name(name: &str) -> &str {
    TypedField::ALL
        .into_iter()
        .find(|field| field.aliases().iter().any(|alias| *alias == name))
        .map(TypedField::label)
        .unwrap_or(name)
}

fn contains_nul(value: &str) -> bool {
    value.contains('\0')
}

/// The editable metadata of one file. Absent chunks decode to empty groups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetadataFields {
    pub ixml: IxmlDocument,
    pub bext: BextFields,
    pub info: InfoList,
}

impl MetadataFields {
    /// Current value of `name`. `None` means absent.
    pub fn get(&self, name: &str) -> Result<Option<String>, FieldError> {
        Ok(match FieldName::parse(name)? {
            FieldName::Typed(field) => self.typed(field).map(str::to_string),
            FieldName::Bext(field) => self.bext_value(field),
            FieldName::Info(id) => self.info.get(id).map(str::to_string),
            FieldName::Ixml(key) => self.ixml.get(key).map(str::to_string),
        })
    }

    /// Typed iXML field through its aliases.
    pub fn typed(&self, field: TypedField) -> Option<&str> {
        field.aliases().iter().find_map(|key| self.ixml.get(key))
    }

    /// The alias a write to `field` lands on.
    fn typed_key(&self, field: TypedField) -> &'static str {
        let aliases = field.aliases();
        aliases
            .iter()
            .copied()
            .find(|key| self.ixml.contains(key))
            .unwrap_or(aliases[0])
    }

    /// The name a value for `name` is stored under: the alias key for typed fields,
    /// `name` itself otherwise.
    pub fn storage_name(&self, name: &str) -> Result<String, FieldError> {
        Ok(match FieldName::parse(name)? {
            FieldName::Typed(field) => self.typed_key(field).to_string(),
            _ => name.to_string(),
        })
    }

    fn bext_value(&self, field: BextField) -> Option<String> {
        let text = match field {
            BextField::TimeReference => return Some(self.bext.time_reference.to_string()),
            BextField::Description => &self.bext.description,
            BextField::Originator => &self.bext.originator,
            BextField::OriginatorReference => &self.bext.originator_reference,
            BextField::OriginationDate => &self.bext.origination_date,
            BextField::OriginationTime => &self.bext.origination_time,
        };
        (!text.is_empty()).then(|| text.clone())
    }

    /// Set or remove (`None`) a field. iXML values are stored trimmed because the
    /// decoder trims element text.
    pub fn set(&mut self, name: &str, value: Option<&str>) -> Result<(), FieldError> {
        let invalid = |reason: &str| FieldError::InvalidValue {
            field: name.to_string(),
            reason: reason.to_string(),
        };
        if value.map(contains_nul).unwrap_or(false) {
            return Err(invalid("NUL characters are not allowed"));
        }
        match FieldName::parse(name)? {
            FieldName::Typed(field) => {
                let key = self.typed_key(field);
                self.set_ixml(key, value);
            }
            FieldName::Ixml(key) => {
                if value.is_some() && !self.ixml.contains(key) {
                    if key.contains('[') {
                        return Err(FieldError::InvalidName {
                            name: name.to_string(),
                            reason: "indexed elements can only be edited, not created".to_string(),
                        });
                    }
                    if self.ixml.shape_conflict(key) {
                        return Err(FieldError::InvalidName {
                            name: name.to_string(),
                            reason: "conflicts with an existing iXML element".to_string(),
                        });
                    }
                }
                self.set_ixml(key, value);
            }
            FieldName::Info(id) => match value {
                Some(text) => self.info.insert(id, text),
                None => {
                    self.info.remove(id);
                }
            },
            FieldName::Bext(BextField::TimeReference) => {
                self.bext.time_reference = match value {
                    Some(text) => text
                        .trim()
                        .parse::<u64>()
                        .map_err(|_| invalid("time reference is a sample count"))?,
                    None => 0,
                };
            }
            FieldName::Bext(field) => {
                let text = value.unwrap_or("").to_string();
                if let Some(max) = field.width() {
                    if text.len() > max {
                        return Err(FieldError::ValueTooLong {
                            field: name.to_string(),
                            len: text.len(),
                            max,
                        });
                    }
                }
                let slot = match field {
                    BextField::Description => &mut self.bext.description,
                    BextField::Originator => &mut self.bext.originator,
                    BextField::OriginatorReference => &mut self.bext.originator_reference,
                    BextField::OriginationDate => &mut self.bext.origination_date,
                    BextField::OriginationTime => &mut self.bext.origination_time,
                    BextField::TimeReference => return Ok(()),
                };
                *slot = text;
            }
        }
        Ok(())
    }

    fn set_ixml(&mut self, key: &str, value: Option<&str>) {
        match value {
            Some(text) => self.ixml.insert(key, text.trim()),
            None => {
                self.ixml.remove(key);
            }
        }
    }

    /// Every present value with its API name, for validation and display.
    pub fn named_values(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .ixml
            .entries()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let bext_fields = [
            ("bext:Description", &self.bext.description),
            ("bext:Originator", &self.bext.originator),
            ("bext:OriginatorReference", &self.bext.originator_reference),
            ("bext:OriginationDate", &self.bext.origination_date),
            ("bext:OriginationTime", &self.bext.origination_time),
        ];
        out.extend(
            bext_fields
                .into_iter()
                .filter(|(_, v)| !v.is_empty())
                .map(|(k, v)| (k.to_string(), v.clone())),
        );
        out.extend(self.info.entries().map(|(id, v)| (format!("info:{id}"), v.to_string())));
        out
    }
}
