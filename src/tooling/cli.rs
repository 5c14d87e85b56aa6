//! CLI Tooling
//!
//! `wavmeta <FILE>` prints the decoded metadata of one WAV file. It reads through
//! the same `MetadataRecord::load` path the coordinator uses.

use crate::config::{ConfigLoader, WavMetaConfig};
use crate::error::ApiError;
use crate::logging::LoggingConfig;
use crate::record::{MetadataRecord, TypedField};
use crate::types::ChunkId;
use clap::{Parser, ValueEnum};
use serde_json::json;
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// wavmeta - inspect iXML, bext and INFO metadata in WAV files
#[derive(Debug, Parser)]
#[command(name = "wavmeta", version)]
#[command(about = "Print the iXML, bext and LIST/INFO metadata of a WAV file")]
pub struct Cli {
    /// WAV file to inspect
    pub path: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Logging config with the command-line overrides applied.
    pub fn logging_config(&self, base: &LoggingConfig) -> LoggingConfig {
        let mut config = base.clone();
        if let Some(level) = &self.log_level {
            config.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.format = format.clone();
        }
        if let Some(output) = &self.log_output {
            config.output = output.clone();
        }
        if let Some(file) = &self.log_file {
            config.file = Some(file.clone());
        }
        config
    }
}

/// CLI context for command execution
pub struct CliContext {
    config: WavMetaConfig,
}

impl CliContext {
    pub fn new(cli: &Cli) -> Result<Self, ApiError> {
        let config = match &cli.config {
            Some(path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&cli.path)?,
        };
        Ok(Self { config })
    }

    pub fn config(&self) -> &WavMetaConfig {
        &self.config
    }

    pub fn execute(&self, cli: &Cli) -> Result<String, ApiError> {
        let record = MetadataRecord::load(&cli.path)?;
        info!(path = %cli.path.display(), "Inspecting file");
        Ok(match cli.format {
            OutputFormat::Text => render_text(&record),
            OutputFormat::Json => render_json(&record),
        })
    }
}

fn data_digest(record: &MetadataRecord) -> Option<String> {
    record
        .chunks()
        .iter()
        .find(|c| c.id == ChunkId::DATA)
        .map(|c| hex::encode(blake3::hash(&c.payload).as_bytes()))
}

pub fn render_text(record: &MetadataRecord) -> String {
    let mut out = String::new();
    let summary = record.summary();
    let fields = record.fields();

    let _ = writeln!(out, "File: {}", summary.filename);
    let _ = writeln!(out, "Summary:");
    for field in TypedField::ALL {
        let value = match field {
            TypedField::Show => &summary.show,
            TypedField::Scene => &summary.scene,
            TypedField::Take => &summary.take,
            TypedField::Category => &summary.category,
            TypedField::Subcategory => &summary.subcategory,
            TypedField::Note => &summary.note,
            TypedField::Circled => &summary.circled,
        };
        let _ = writeln!(out, "  {:<12} {}", field.label(), value.as_deref().unwrap_or(""));
    }

    let _ = writeln!(out, "iXML ({}):", fields.ixml.root());
    if fields.ixml.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for (key, value) in fields.ixml.entries() {
        let _ = writeln!(out, "  {key} = {value}");
    }

    let bext = &fields.bext;
    let _ = writeln!(out, "bext:");
    if bext.is_blank() {
        let _ = writeln!(out, "  (none)");
    } else {
        for (label, value) in [
            ("Description", bext.description.as_str()),
            ("Originator", bext.originator.as_str()),
            ("OriginatorReference", bext.originator_reference.as_str()),
            ("OriginationDate", bext.origination_date.as_str()),
            ("OriginationTime", bext.origination_time.as_str()),
        ] {
            let _ = writeln!(out, "  {label:<20} {value}");
        }
        let _ = writeln!(out, "  {:<20} {}", "TimeReference", bext.time_reference);
        let _ = writeln!(out, "  {:<20} {}", "Version", bext.version);
    }

    let _ = writeln!(out, "INFO:");
    if fields.info.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for (id, text) in fields.info.entries() {
        let _ = writeln!(out, "  {id} = {text}");
    }

    let _ = writeln!(out, "Chunks:");
    for chunk in record.chunks() {
        let _ = writeln!(out, "  {:<4} {:>10} bytes", chunk.id, chunk.size());
    }
    if let Some(digest) = data_digest(record) {
        let _ = writeln!(out, "data blake3: {digest}");
    }
    out.trim_end().to_string()
}

pub fn render_json(record: &MetadataRecord) -> String {
    let fields = record.fields();
    let value = json!({
        "summary": record.summary(),
        "ixml": {
            "root": fields.ixml.root(),
            "entries": fields
                .ixml
                .entries()
                .map(|(k, v)| json!({ "key": k, "value": v }))
                .collect::<Vec<_>>(),
        },
        "bext": if fields.bext.is_blank() { serde_json::Value::Null } else { json!(fields.bext) },
        "info": fields
            .info
            .entries()
            .map(|(id, text)| json!({ "id": id, "text": text }))
            .collect::<Vec<_>>(),
        "chunks": record.chunks(),
        "data_blake3": data_digest(record),
    });
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{self, write_riff, ChunkRecord};

    fn record() -> MetadataRecord {
        let bytes = write_riff(&[
            ChunkRecord::new(ChunkId::FMT, vec![0; 16]),
            ChunkRecord::new(
                ChunkId::IXML,
                b"<BWFXML><PROJECT>Night Shoot</PROJECT><SCENE>5.14D</SCENE><TAKE>01</TAKE></BWFXML>"
                    .to_vec(),
            ),
            ChunkRecord::new(ChunkId::DATA, vec![1, 2, 3, 4]),
        ])
        .unwrap();
        MetadataRecord::from_document(PathBuf::from("/takes/5-14D_01.wav"), codec::parse(&bytes).unwrap(), None)
    }

    #[test]
    fn test_parse_arguments() {
        let cli = Cli::try_parse_from(["wavmeta", "take.wav"]).unwrap();
        assert_eq!(cli.path, PathBuf::from("take.wav"));
        assert_eq!(cli.format, OutputFormat::Text);

        let cli = Cli::try_parse_from([
            "wavmeta",
            "take.wav",
            "--format",
            "json",
            "--log-level",
            "debug",
            "--log-output",
            "file",
            "--log-file",
            "/tmp/w.log",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        let logging = cli.logging_config(&LoggingConfig::default());
        assert_eq!(logging.level, "debug");
        assert_eq!(logging.output, "file");
        assert_eq!(logging.file, Some(PathBuf::from("/tmp/w.log")));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(Cli::try_parse_from(["wavmeta"]).is_err());
        assert!(Cli::try_parse_from(["wavmeta", "take.wav", "--format", "xml"]).is_err());
    }

    #[test]
    fn test_render_text() {
        let text = render_text(&record());
        assert!(text.starts_with("File: 5-14D_01.wav"));
        assert!(text.contains(&format!("  {:<12} {}", "Scene", "5.14D")));
        assert!(text.contains("SCENE = 5.14D"));
        assert!(text.contains("data blake3: "));
        let digest = hex::encode(blake3::hash(&[1, 2, 3, 4]).as_bytes());
        assert!(text.ends_with(&digest));
    }

    #[test]
    fn test_render_json() {
        let value: serde_json::Value = serde_json::from_str(&render_json(&record())).unwrap();
        assert_eq!(value["summary"]["scene"], "5.14D");
        assert_eq!(value["summary"]["show"], "Night Shoot");
        assert_eq!(value["ixml"]["root"], "BWFXML");
        assert_eq!(value["bext"], serde_json::Value::Null);
        assert_eq!(value["chunks"][0]["id"], "fmt ");
        assert_eq!(value["chunks"].as_array().unwrap().len(), 3);
    }
}
