pub mod gemini;

use std::future::Future;

use serde_json::Value;
use thiserror::Error;

use crate::db::TransactionRecord;
use crate::masking::MaskingCodec;

pub const SYSTEM_INSTRUCTION: &str = "*Simulation Context:* You are an AI assistant for a financial compliance \
officer in a training simulation. The user's data contains placeholders like [Reason:...], [Location-..], and \
[Entity-..] to mask sensitive information. Analyze the data, including these placeholders, and answer the \
user's request. Use the placeholders in your response exactly as they appear in the provided data.";

/// Messages mentioning any of these are answered from local statistics.
pub const REPORT_KEYWORDS: [&str; 7] = [
    "dashboard",
    "chart",
    "graph",
    "infographic",
    "visualize",
    "analysis",
    "report",
];

pub const NO_DATA_REPLY: &str = "There's no data to visualize. Please wait for some alerts to be generated.";

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("assistant request failed: {0}")]
    Http(#[source] reqwest::Error),
    #[error("assistant returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("assistant returned no text")]
    EmptyResponse,
    #[error("no assistant API key configured")]
    NotConfigured,
    #[error("failed to serialize assistant context: {0}")]
    Payload(#[from] serde_json::Error),
}

/// One text prompt in, one text response out.
pub trait Assistant {
    fn generate(
        &self,
        system_instruction: &str,
        prompt: &str,
    ) -> impl Future<Output = Result<String, AssistantError>> + Send;
}

/// Where a user question should be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryRoute {
    Report,
    Assistant,
}

impl QueryRoute {
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if REPORT_KEYWORDS.iter().any(|k| lower.contains(k)) {
            QueryRoute::Report
        } else {
            QueryRoute::Assistant
        }
    }
}

/// Serialize records as the masked context block handed to the assistant.
///
/// Field values are masked before serialization, so literals that JSON would escape
/// (quotes, backslashes) are still matched.
pub fn context_payload(records: &[TransactionRecord], codec: &MaskingCodec) -> Result<String, serde_json::Error> {
    let mut value = serde_json::to_value(records)?;
    mask_strings(&mut value, codec);
    serde_json::to_string(&value)
}

fn mask_strings(value: &mut Value, codec: &MaskingCodec) {
    match value {
        Value::String(s) => *s = codec.mask(s),
        Value::Array(items) => items.iter_mut().for_each(|v| mask_strings(v, codec)),
        Value::Object(map) => map.values_mut().for_each(|v| mask_strings(v, codec)),
        _ => {}
    }
}

pub fn build_prompt(masked_context: &str, masked_query: &str) -> String {
    format!("Masked Transaction Data:\n{masked_context}\n\nUSER INQUIRY: {masked_query}")
}

/// Mask the records and the question, make a single round trip, unmask the reply.
///
/// No retry: a failed call is returned as is.
pub async fn ask_assistant<A: Assistant>(
    assistant: &A,
    codec: &MaskingCodec,
    records: &[TransactionRecord],
    query: &str,
) -> Result<String, AssistantError> {
    let raw = serde_json::to_string(records)?;
    if codec.contains_placeholder(&raw) || codec.contains_placeholder(query) {
        tracing::warn!("Input already contains masking placeholders; the reply may expand them");
    }
    let context = context_payload(records, codec)?;
    let prompt = build_prompt(&context, &codec.mask(query));
    tracing::debug!(prompt_len = prompt.len(), "Dispatching masked prompt");
    let reply = assistant.generate(SYSTEM_INSTRUCTION, &prompt).await?;
    Ok(codec.unmask(&reply))
}
