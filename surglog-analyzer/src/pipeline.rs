//! End-to-end processing of one log file
//!
//! Decode → analyze → (optionally) project. One [`LogPipeline`] holds the
//! immutable inputs (keys, catalog, device id) and can be shared across
//! threads; every call builds its own [`SurgeryAnalyzer`].

use crate::analyzer::SurgeryAnalyzer;
use crate::decode::{DecodeStats, KeyError, KeyPair, LogDecodeError, LogDecoder};
use crate::explain::{ExplainError, ExplanationCatalog};
use crate::models::{DecodedEvent, Surgery};
use crate::projection::{PostgresProjector, SurgeryRow};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid fallback key: {0}")]
    Key(#[from] KeyError),

    #[error(transparent)]
    Catalog(#[from] ExplainError),

    #[error(transparent)]
    Decode(#[from] LogDecodeError),
}

/// Inputs resolved from CLI, environment and config file
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub key: Option<String>,
    pub fallback_key: String,
    pub explanation_catalog: Option<PathBuf>,
    pub device_id: Option<String>,
}

/// Result for one input
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub source: String,
    pub stats: DecodeStats,
    pub events: Vec<DecodedEvent>,
    pub surgeries: Vec<Surgery>,
}

#[derive(Debug, Clone)]
pub struct LogPipeline {
    decoder: LogDecoder,
    projector: PostgresProjector,
}

impl LogPipeline {
    pub fn new(decoder: LogDecoder, projector: PostgresProjector) -> Self {
        Self { decoder, projector }
    }

    /// Build from resolved options; loads the explanation catalog if set
    pub fn from_options(options: &PipelineOptions) -> Result<Self, PipelineError> {
        let keys = KeyPair::from_strings(options.key.as_deref(), &options.fallback_key)?;
        let mut decoder = LogDecoder::new(keys);

        if let Some(path) = &options.explanation_catalog {
            let catalog = ExplanationCatalog::load(path)?;
            info!("Loaded {} explanation templates from {}", catalog.len(), path.display());
            decoder = decoder.with_catalog(Arc::new(catalog));
        }

        Ok(Self::new(
            decoder,
            PostgresProjector::new(options.device_id.as_deref()),
        ))
    }

    pub fn projector(&self) -> &PostgresProjector {
        &self.projector
    }

    /// Read and process one file.
    ///
    /// Invalid UTF-8 does not fail the file: the affected lines are rejected
    /// as malformed and counted like any other bad line.
    pub fn process_file(&self, path: &Path) -> Result<PipelineReport, PipelineError> {
        let bytes = std::fs::read(path).map_err(|source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let content = String::from_utf8_lossy(&bytes);
        if let Cow::Owned(_) = content {
            warn!("{}: invalid UTF-8, affected lines will be skipped", path.display());
        }
        self.process_str(&path.display().to_string(), &content)
    }

    pub fn process_str(&self, source: &str, content: &str) -> Result<PipelineReport, PipelineError> {
        self.process_at(source, content, surglog_common::time::now())
    }

    /// Like [`process_str`](Self::process_str) with a fixed substitute time
    /// for unparseable timestamps
    pub fn process_at(
        &self,
        source: &str,
        content: &str,
        now: NaiveDateTime,
    ) -> Result<PipelineReport, PipelineError> {
        debug!("Processing {} ({} bytes)", source, content.len());
        let log = self.decoder.decode_at(content, now)?;

        let mut analyzer = SurgeryAnalyzer::new();
        let surgeries = analyzer.analyze(&log.events);
        info!(
            "{}: {} events, {} surgeries",
            source,
            log.events.len(),
            surgeries.len()
        );

        Ok(PipelineReport {
            source: source.to_string(),
            stats: log.stats,
            events: log.events,
            surgeries,
        })
    }

    pub fn rows(&self, report: &PipelineReport) -> Vec<SurgeryRow> {
        self.projector.project_all(&report.surgeries)
    }
}
