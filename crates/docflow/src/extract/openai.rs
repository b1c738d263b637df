//! OpenAI-compatible chat completions provider.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::info::{response_schema, ExtractedInfo};
use super::Extractor;
use crate::config::ExtractionConfig;
use crate::error::ExtractionError;

const SYSTEM_PROMPT: &str = "You extract structured information from medical referral documents. \
Return the patient's full name, date of birth (year, month and day as numbers), \
phone number, the name of the referring physician and the reason for referral. \
Use null for anything the document does not state. Do not guess.";

/// Longest error body kept in [`ExtractionError::Provider`].
const MAX_ERROR_BODY: usize = 512;

pub struct OpenAiExtractor {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: SecretString,
}

impl OpenAiExtractor {
    pub fn new(config: &ExtractionConfig, api_key: SecretString) -> Result<Self, ExtractionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl Extractor for OpenAiExtractor {
    fn name(&self) -> &str {
        &self.model
    }

    async fn extract(&self, text: &str) -> Result<ExtractedInfo, ExtractionError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request_body(&self.model, text))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|i| body.is_char_boundary(*i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            return Err(ExtractionError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletion = response.json().await?;
        parse_completion(completion)
    }
}

pub(crate) fn request_body(model: &str, text: &str) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "temperature": 0,
        "messages": [
            { "role": "system", "content": SYSTEM_PROMPT },
            { "role": "user", "content": text }
        ],
        "response_format": {
            "type": "json_schema",
            "json_schema": {
                "name": "extracted_information",
                "strict": true,
                "schema": response_schema()
            }
        }
    })
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

pub(crate) fn parse_completion(completion: ChatCompletion) -> Result<ExtractedInfo, ExtractionError> {
    let message = completion
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| ExtractionError::MalformedResponse("no choices returned".to_string()))?;

    if let Some(refusal) = message.refusal {
        return Err(ExtractionError::Failed(format!(
            "provider refused: {}",
            refusal
        )));
    }

    let content = message
        .content
        .ok_or_else(|| ExtractionError::MalformedResponse("empty message".to_string()))?;
    serde_json::from_str(&content).map_err(|e| ExtractionError::MalformedResponse(e.to_string()))
}
