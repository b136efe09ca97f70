//! Code generation client.
//!
//! Turns a strategy description into backtest source by streaming a
//! completion from the Google Generative Language API.  The public entry
//! point [`generate_strategy_code`] never fails: every error is folded into a
//! commented `# Error:` line so the caller can still render a page.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::config::Config;
use crate::error::GenerateError;

const NO_CODE: &str = "# Error: No code generated.";

const PROMPT_PREAMBLE: &str = "Convert the following backtesting strategy to ready-to-run Python code. \
    Use yfinance for data and backtrader for backtesting. \
    Import all necessary libraries. \
    After downloading data with yfinance, flatten MultiIndex columns if present. \
    Keep only 'Open', 'High', 'Low', 'Close', 'Volume'. \
    Run the backtest, print statistics, and plot results. \
    Only output Python code, no explanations.\n";

/// Anything that can turn a prompt into raw model text.
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerateError>;
}

pub fn build_prompt(description: &str) -> String {
    format!("{PROMPT_PREAMBLE}{description}\n")
}

/// Remove a leading ```` ```python ```` (or bare ```` ``` ````) fence and a
/// trailing ```` ``` ```` fence.
pub fn strip_code_fences(text: &str) -> String {
    let mut code = text.trim();

    if let Some(rest) = code.strip_prefix("```python") {
        code = rest.trim();
    } else if let Some(rest) = code.strip_prefix("```") {
        // Bare fence, possibly with some other language tag on the same line
        code = match rest.split_once('\n') {
            Some((tag, body)) if !tag.trim().contains(' ') => body,
            Some(_) => rest,
            None if rest.trim().contains(' ') => rest,
            None => "",
        }
        .trim();
    }

    if let Some(rest) = code.strip_suffix("```") {
        code = rest.trim();
    }

    code.to_string()
}

/// Ask `generator` for code implementing `description`.
///
/// Never returns an error: failures come back as a commented `# Error:` block.
pub async fn generate_strategy_code(generator: &dyn CodeGenerator, description: &str) -> String {
    let prompt = build_prompt(description);
    match generator.generate(&prompt).await {
        Ok(raw) => {
            let code = strip_code_fences(&raw);
            if code.is_empty() {
                tracing::warn!("Model returned no code");
                NO_CODE.to_string()
            } else {
                tracing::info!(bytes = code.len(), "Generated strategy code");
                code
            }
        }
        Err(e) => {
            tracing::warn!("Code generation failed: {e}");
            error_comment(&e.to_string())
        }
    }
}

/// `# Error: {message}`, with every further line of the message commented too
/// so the sentinel stays inert when executed.
fn error_comment(message: &str) -> String {
    let mut lines = message.lines();
    let mut out = format!("# Error: {}", lines.next().unwrap_or_default());
    for line in lines {
        out.push_str("\n# ");
        out.push_str(line);
    }
    out
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamChunk {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    parts: Option<Vec<Part>>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
}

impl StreamChunk {
    fn text(&self) -> String {
        self.candidates
            .iter()
            .flatten()
            .filter_map(|c| c.content.as_ref())
            .filter_map(|c| c.parts.as_ref())
            .flatten()
            .filter_map(|p| p.text.as_deref())
            .collect()
    }
}

/// Splits a `text/event-stream` body into `data:` payloads.
///
/// Multi-line `data:` fields are joined with `\n`; an event ends at a blank
/// line or at end of stream.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\r', '\n']);
            if let Some(event) = self.push_line(line) {
                events.push(event);
            }
        }
        events
    }

    pub fn finish(mut self) -> Option<String> {
        if !self.buf.is_empty() {
            let raw = std::mem::take(&mut self.buf);
            let line = String::from_utf8_lossy(&raw).trim_end_matches('\r').to_string();
            if let Some(event) = self.push_line(&line) {
                return Some(event);
            }
        }
        self.flush()
    }

    fn push_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.flush();
        }
        if let Some(value) = line.strip_prefix("data:") {
            self.data
                .push(value.strip_prefix(' ').unwrap_or(value).to_string());
        }
        // event:, id:, retry: and comments carry nothing we need
        None
    }

    fn flush(&mut self) -> Option<String> {
        if self.data.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.data).join("\n"))
        }
    }
}

fn append_payload(code: &mut String, payload: &str) -> Result<(), GenerateError> {
    if payload.trim().is_empty() || payload.trim() == "[DONE]" {
        return Ok(());
    }
    let chunk: StreamChunk = serde_json::from_str(payload)?;
    if let Some(err) = chunk.error {
        return Err(GenerateError::Model(
            err.message.unwrap_or_else(|| "unknown error".to_string()),
        ));
    }
    let text = chunk.text();
    tracing::debug!(bytes = text.len(), "Received stream chunk");
    code.push_str(&text);
    Ok(())
}

// ---------------------------------------------------------------------------
// Gemini client
// ---------------------------------------------------------------------------

pub struct GeminiClient {
    client: Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
    temperature: f64,
}

impl GeminiClient {
    pub fn from_config(config: &Config) -> Result<Self, GenerateError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent",
            self.api_base, self.model
        )
    }
}

#[async_trait]
impl CodeGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerateError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(GenerateError::MissingApiKey)?;

        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": self.temperature,
                "responseMimeType": "text/plain",
            },
        });

        let resp = self
            .client
            .post(self.stream_url())
            .query(&[("alt", "sse")])
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(GenerateError::from_status(status.as_u16(), &text));
        }

        let mut decoder = SseDecoder::default();
        let mut code = String::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            for payload in decoder.feed(&chunk?) {
                append_payload(&mut code, &payload)?;
            }
        }
        if let Some(payload) = decoder.finish() {
            append_payload(&mut code, &payload)?;
        }

        Ok(code)
    }
}
