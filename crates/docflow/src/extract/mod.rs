//! Structured information extraction from parsed documents.

mod info;
mod openai;

use std::sync::Arc;

use async_trait::async_trait;

pub use info::{DateOfBirth, ExtractedInfo};
pub use openai::OpenAiExtractor;

use crate::config::ExtractionConfig;
use crate::error::{DocflowError, ExtractionError, Result};
use crate::registry::{DocumentRegistry, DocumentStatus};
use crate::secrets::resolve_secret_optional;
use crate::storage;

#[async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &str;

    async fn extract(&self, text: &str) -> std::result::Result<ExtractedInfo, ExtractionError>;
}

/// Stand-in used when extraction is switched off or has no credentials.
pub struct DisabledExtractor {
    reason: String,
}

impl DisabledExtractor {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Extractor for DisabledExtractor {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn extract(&self, _text: &str) -> std::result::Result<ExtractedInfo, ExtractionError> {
        Err(ExtractionError::NotConfigured(self.reason.clone()))
    }
}

/// Builds the configured extractor. Missing credentials disable extraction
/// instead of failing startup.
pub fn extractor_from_config(config: &ExtractionConfig) -> Result<Arc<dyn Extractor>> {
    if !config.enabled {
        return Ok(Arc::new(DisabledExtractor::new("extraction is disabled")));
    }

    let api_key = resolve_secret_optional(
        config.api_key.as_deref(),
        config.api_key_file.as_deref(),
        config.api_key_env_var.as_deref(),
    )
    .map_err(crate::error::ConfigError::from)?;

    match api_key {
        Some(key) => Ok(Arc::new(OpenAiExtractor::new(config, key)?)),
        None => {
            log::warn!("No extraction API key configured, extraction is disabled");
            Ok(Arc::new(DisabledExtractor::new("no API key configured")))
        }
    }
}

/// Runs extraction for parsed documents and records the result.
pub struct ExtractionService {
    registry: Arc<DocumentRegistry>,
    extractor: Arc<dyn Extractor>,
}

impl ExtractionService {
    pub fn new(registry: Arc<DocumentRegistry>, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            registry,
            extractor,
        }
    }

    /// Extracts information from a parsed document, writes
    /// `extracted_info.json` and stores the result on the record.
    ///
    /// Extraction failures leave the document status untouched.
    pub async fn extract(&self, id: &str) -> Result<ExtractedInfo> {
        let record = self.registry.require(id)?;
        if record.status != DocumentStatus::Parsed {
            return Err(DocflowError::InvalidState {
                id: id.to_string(),
                status: record.status,
                operation: "extract information",
            });
        }

        let text = storage::read_rendered(&record).await?;

        let span = tracing::info_span!(
            "extract",
            document_id = %id,
            provider = %self.extractor.name()
        );
        let info = tracing::Instrument::instrument(self.extractor.extract(&text), span)
            .await
            .inspect_err(|e| tracing::warn!(document_id = %id, "Extraction failed: {}", e))?;

        storage::write_extracted_info(&record, &info).await?;
        self.registry.update_extracted_info(id, info.clone())?;

        tracing::info!(document_id = %id, "Extracted information stored");
        Ok(info)
    }

    /// Previously extracted information for a document.
    pub fn extracted(&self, id: &str) -> Result<ExtractedInfo> {
        self.registry
            .require(id)?
            .extracted_info
            .ok_or_else(|| DocflowError::NoExtractedInfo { id: id.to_string() })
    }
}
