//! iXML payload decoding and encoding.
//!
//! Every leaf element becomes one entry keyed by its path below the root element,
//! e.g. `SCENE`, `SPEED/TIMECODE_RATE`, `TRACK_LIST/TRACK[2]/NAME`. Repeated siblings
//! get a `[n]` suffix from the second occurrence on.
//!
//! A decoded document remembers the markup it came from. Encoding replays that
//! markup, so attributes, comments, processing instructions and whitespace come back
//! verbatim and only edited values are rewritten.

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

pub const DEFAULT_ROOT: &str = "BWFXML";

/// Decoded iXML document. Equality ignores entry order and source markup.
#[derive(Debug, Clone, Serialize)]
pub struct IxmlDocument {
    root: String,
    values: BTreeMap<String, String>,
    #[serde(skip)]
    order: Vec<String>,
    #[serde(skip)]
    layout: Option<Arc<Layout>>,
}

impl PartialEq for IxmlDocument {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root && self.values == other.values
    }
}

impl Eq for IxmlDocument {}

impl Default for IxmlDocument {
    fn default() -> Self {
        Self::with_root(DEFAULT_ROOT)
    }
}

impl IxmlDocument {
    pub fn with_root(root: &str) -> Self {
        Self {
            root: root.to_string(),
            values: BTreeMap::new(),
            order: Vec::new(),
            layout: None,
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Insert or replace. New keys go to the end of document order.
    pub fn insert(&mut self, key: &str, value: &str) {
        if self.values.insert(key.to_string(), value.to_string()).is_none() {
            self.order.push(key.to_string());
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let removed = self.values.remove(key)?;
        self.order.retain(|k| k != key);
        Some(removed)
    }

    /// Entries in document order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.order
            .iter()
            .filter_map(|k| self.values.get_key_value(k))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// True when `key` would need an element that is already a leaf, or would turn
    /// an existing parent element into a leaf.
    pub fn shape_conflict(&self, key: &str) -> bool {
        let as_parent = format!("{key}/");
        self.values.keys().any(|existing| {
            existing.starts_with(&as_parent) || key.starts_with(&format!("{existing}/"))
        })
    }
}

/// Markup of a decoded payload.
#[derive(Debug, Clone)]
struct Layout {
    prolog: Vec<Markup>,
    root: Element,
    epilog: Vec<Markup>,
}

impl Layout {
    fn fresh(root: &str) -> Self {
        let mut element = Element::new(root);
        element.self_closing = true;
        Self {
            prolog: vec![
                Markup::Raw("<?xml version=\"1.0\" encoding=\"UTF-8\"?>".to_string()),
                Markup::Text("\n".to_string()),
            ],
            root: element,
            epilog: vec![Markup::Text("\n".to_string())],
        }
    }
}

#[derive(Debug, Clone)]
enum Markup {
    Element(Element),
    /// Escaped character data or a CDATA section.
    Text(String),
    /// Comment, processing instruction, declaration or doctype.
    Raw(String),
}

impl Markup {
    fn write(&self, doc: &IxmlDocument, out: &mut String) {
        match self {
            Markup::Text(text) | Markup::Raw(text) => out.push_str(text),
            Markup::Element(element) => element.write(doc, out),
        }
    }

    fn is_blank_text(&self) -> bool {
        matches!(self, Markup::Text(text) if text.trim().is_empty())
    }
}

#[derive(Debug, Clone)]
struct Element {
    name: String,
    segment: String,
    /// Attribute text as written, leading whitespace included.
    attrs: String,
    self_closing: bool,
    /// Entry key and decoded value, for leaves.
    leaf: Option<(String, String)>,
    children: Vec<Markup>,
}

impl Element {
    fn new(segment: &str) -> Self {
        Self {
            name: element_name(segment).to_string(),
            segment: segment.to_string(),
            attrs: String::new(),
            self_closing: false,
            leaf: None,
            children: Vec::new(),
        }
    }

    fn has_elements(&self) -> bool {
        self.children.iter().any(|c| matches!(c, Markup::Element(_)))
    }

    /// Drop leaves whose key is gone and parents left without elements. Returns
    /// whether `self` survives; kept keys are recorded in `placed`.
    fn retain_entries(&mut self, doc: &IxmlDocument, placed: &mut HashSet<String>) -> bool {
        if let Some((key, _)) = &self.leaf {
            if doc.contains(key) {
                placed.insert(key.clone());
                return true;
            }
            return false;
        }
        let mut kept: Vec<Markup> = Vec::with_capacity(self.children.len());
        for child in std::mem::take(&mut self.children) {
            match child {
                Markup::Element(mut element) => {
                    if element.retain_entries(doc, placed) {
                        kept.push(Markup::Element(element));
                    } else if kept.last().map_or(false, Markup::is_blank_text) {
                        kept.pop();
                    }
                }
                other => kept.push(other),
            }
        }
        self.children = kept;
        self.has_elements()
    }

    /// Add an entry that has no element yet, creating parents as needed.
    fn place(&mut self, key: &str, rest: &str, value: &str, depth: usize) {
        let (segment, below) = match rest.split_once('/') {
            Some((segment, below)) => (segment, Some(below)),
            None => (rest, None),
        };
        match below {
            Some(below) => {
                let existing = self.children.iter().position(|c| {
                    matches!(c, Markup::Element(e) if e.segment == segment && e.leaf.is_none())
                });
                match existing {
                    Some(index) => {
                        if let Markup::Element(parent) = &mut self.children[index] {
                            parent.place(key, below, value, depth + 1);
                        }
                    }
                    None => {
                        let mut parent = Element::new(segment);
                        parent.place(key, below, value, depth + 1);
                        self.append(parent, depth);
                    }
                }
            }
            None => {
                let mut leaf = Element::new(segment);
                leaf.leaf = Some((key.to_string(), value.to_string()));
                leaf.children.push(Markup::Text(escape(value).into_owned()));
                self.append(leaf, depth);
            }
        }
    }

    fn append(&mut self, child: Element, depth: usize) {
        let indent = Markup::Text(format!("\n{}", "\t".repeat(depth + 1)));
        self.self_closing = false;
        if self.children.last().map_or(false, Markup::is_blank_text) {
            let at = self.children.len() - 1;
            self.children.insert(at, Markup::Element(child));
            self.children.insert(at, indent);
        } else {
            self.children.push(indent);
            self.children.push(Markup::Element(child));
            self.children.push(Markup::Text(format!("\n{}", "\t".repeat(depth))));
        }
    }

    fn write(&self, doc: &IxmlDocument, out: &mut String) {
        let edited = self.leaf.as_ref().and_then(|(key, original)| {
            doc.get(key).filter(|value| *value != original.as_str())
        });
        if self.self_closing && self.children.is_empty() && edited.is_none() {
            out.push_str(&format!("<{}{}/>", self.name, self.attrs));
            return;
        }
        out.push_str(&format!("<{}{}>", self.name, self.attrs));
        match edited {
            Some(value) => {
                // Comments inside an edited leaf stay; its text is replaced.
                for child in &self.children {
                    if let Markup::Raw(raw) = child {
                        out.push_str(raw);
                    }
                }
                out.push_str(&escape(value));
            }
            None => {
                for child in &self.children {
                    child.write(doc, out);
                }
            }
        }
        out.push_str(&format!("</{}>", self.name));
    }
}

struct OpenElement {
    element: Element,
    text: String,
    child_counts: HashMap<String, usize>,
}

#[derive(Default)]
struct Decoder {
    stack: Vec<OpenElement>,
    prolog: Vec<Markup>,
    root: Option<Element>,
    epilog: Vec<Markup>,
    doc: IxmlDocument,
}

impl Decoder {
    fn open(&mut self, name: String, attrs: String, self_closing: bool) -> Result<(), String> {
        let segment = match self.stack.last_mut() {
            None => {
                if self.root.is_some() {
                    return Err(format!("second root element <{name}>"));
                }
                self.doc.root = name.clone();
                name.clone()
            }
            Some(parent) => {
                let count = parent.child_counts.entry(name.clone()).or_insert(0);
                *count += 1;
                if *count == 1 {
                    name.clone()
                } else {
                    format!("{name}[{count}]")
                }
            }
        };
        let mut element = Element::new(&segment);
        element.name = name;
        element.attrs = attrs;
        element.self_closing = self_closing;
        self.stack.push(OpenElement {
            element,
            text: String::new(),
            child_counts: HashMap::new(),
        });
        Ok(())
    }

    fn close(&mut self) -> Result<(), String> {
        let open = self.stack.pop().ok_or_else(|| "unbalanced end tag".to_string())?;
        let mut element = open.element;
        // The root's own text is not a field.
        if self.stack.is_empty() {
            self.root = Some(element);
            return Ok(());
        }
        if !element.has_elements() {
            let mut key = self
                .stack
                .iter()
                .skip(1)
                .map(|e| e.element.segment.as_str())
                .collect::<Vec<_>>()
                .join("/");
            if !key.is_empty() {
                key.push('/');
            }
            key.push_str(&element.segment);
            let value = open.text.trim().to_string();
            self.doc.insert(&key, &value);
            element.leaf = Some((key, value));
        }
        if let Some(parent) = self.stack.last_mut() {
            parent.element.children.push(Markup::Element(element));
        }
        Ok(())
    }

    /// Markup outside any leaf value: kept in place but not part of a field.
    fn markup(&mut self, markup: Markup) {
        match self.stack.last_mut() {
            Some(open) => open.element.children.push(markup),
            None if self.root.is_none() => self.prolog.push(markup),
            None => self.epilog.push(markup),
        }
    }

    fn text(&mut self, raw: String, unescaped: &str) -> Result<(), String> {
        match self.stack.last_mut() {
            Some(open) => {
                open.text.push_str(unescaped);
                open.element.children.push(Markup::Text(raw));
                Ok(())
            }
            None if unescaped.trim().is_empty() => {
                self.markup(Markup::Text(raw));
                Ok(())
            }
            None => Err("text outside the root element".to_string()),
        }
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Decode an iXML payload. Trailing NUL padding is ignored.
pub fn decode(payload: &[u8]) -> Result<IxmlDocument, String> {
    let end = payload
        .iter()
        .rposition(|b| *b != 0)
        .map(|i| i + 1)
        .unwrap_or(0);
    let text = std::str::from_utf8(&payload[..end])
        .map_err(|e| format!("payload is not UTF-8: {e}"))?;

    let mut reader = Reader::from_str(text);
    let mut decoder = Decoder::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                decoder.open(lossy(e.name().as_ref()), lossy(e.attributes_raw()), false)?;
            }
            Ok(Event::Empty(e)) => {
                decoder.open(lossy(e.name().as_ref()), lossy(e.attributes_raw()), true)?;
                decoder.close()?;
            }
            Ok(Event::End(_)) => decoder.close()?,
            Ok(Event::Text(t)) => {
                let unescaped = t
                    .unescape()
                    .map_err(|e| format!("bad text at {}: {e}", reader.buffer_position()))?;
                decoder.text(lossy(&t), &unescaped)?;
            }
            Ok(Event::CData(c)) => {
                let content = lossy(&c);
                decoder.text(format!("<![CDATA[{content}]]>"), &content)?;
            }
            Ok(Event::Comment(c)) => decoder.markup(Markup::Raw(format!("<!--{}-->", lossy(&c)))),
            Ok(Event::PI(p)) => decoder.markup(Markup::Raw(format!("<?{}?>", lossy(&p)))),
            Ok(Event::Decl(d)) => decoder.markup(Markup::Raw(format!("<?{}?>", lossy(&d)))),
            Ok(Event::DocType(d)) => {
                decoder.markup(Markup::Raw(format!("<!DOCTYPE {}>", lossy(&d))))
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("{e} at position {}", reader.buffer_position())),
        }
    }

    if let Some(open) = decoder.stack.last() {
        return Err(format!("unclosed element <{}>", open.element.name));
    }
    let root = decoder.root.ok_or_else(|| "no root element".to_string())?;
    let mut doc = decoder.doc;
    doc.layout = Some(Arc::new(Layout {
        prolog: decoder.prolog,
        root,
        epilog: decoder.epilog,
    }));
    Ok(doc)
}

fn element_name(segment: &str) -> &str {
    segment.split('[').next().unwrap_or(segment)
}

/// Encode a document as UTF-8 XML. A decoded document is written back over its own
/// markup: removed entries lose their element, edited entries get their new text,
/// and new entries are appended under their parent path.
pub fn encode(doc: &IxmlDocument) -> Vec<u8> {
    let mut layout = match &doc.layout {
        Some(layout) => Layout::clone(layout),
        None => Layout::fresh(&doc.root),
    };
    let mut placed = HashSet::new();
    layout.root.retain_entries(doc, &mut placed);
    for (key, value) in doc.entries() {
        if !placed.contains(key) {
            layout.root.place(key, key, value, 0);
        }
    }

    let mut out = String::new();
    for markup in &layout.prolog {
        markup.write(doc, &mut out);
    }
    layout.root.write(doc, &mut out);
    for markup in &layout.epilog {
        markup.write(doc, &mut out);
    }
    out.into_bytes()
}
