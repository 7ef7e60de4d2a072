//! Client for a KoboldAI-compatible text-generation endpoint.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::sanitize::fix_code_block;

/// Sampling parameters sent with every generation request.
///
/// Built once at startup and shared; `Default` is the production tuning.
#[derive(Debug, Clone)]
pub struct SamplingParams {
    pub max_context_length: u32,
    pub max_length: u32,
    pub rep_pen: f64,
    pub rep_pen_range: u32,
    pub rep_pen_slope: f64,
    pub temperature: f64,
    pub tfs: f64,
    pub top_p: f64,
    pub top_k: f64,
    pub typical: u32,
    /// Trim an incomplete trailing sentence from the completion.
    pub trim_incomplete: bool,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            max_context_length: 1600,
            max_length: 1800,
            rep_pen: 1.12,
            rep_pen_range: 1024,
            rep_pen_slope: 0.9,
            temperature: 0.6,
            tfs: 0.9,
            top_p: 0.95,
            top_k: 0.6,
            typical: 1,
            trim_incomplete: true,
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    use_story: bool,
    use_authors_note: bool,
    use_world_info: bool,
    use_memory: bool,
    max_context_length: u32,
    max_length: u32,
    rep_pen: f64,
    rep_pen_range: u32,
    rep_pen_slope: f64,
    temperature: f64,
    tfs: f64,
    top_p: f64,
    top_k: f64,
    typical: u32,
    frmttriminc: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequence: Option<&'a [String]>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    results: Vec<GenerateResult>,
}

#[derive(Deserialize)]
struct GenerateResult {
    text: Option<String>,
}

pub struct KoboldClient {
    endpoint: String,
    params: SamplingParams,
    http: reqwest::Client,
}

impl KoboldClient {
    /// `endpoint` is the server base URL, e.g. `http://localhost:5000`.
    pub fn new(endpoint: impl Into<String>, params: SamplingParams) -> Self {
        Self {
            endpoint: endpoint.into(),
            params,
            http: reqwest::Client::new(),
        }
    }

    /// Request a completion for `prompt`.
    ///
    /// When `stop` is given it is forwarded to the server as stop sequences,
    /// and any of them left dangling at the end of the completion is stripped.
    /// The returned text has already been through [`fix_code_block`]. Blocks
    /// for the whole remote call; one attempt, no retries.
    pub async fn generate(
        &self,
        prompt: &str,
        stop: Option<&[String]>,
    ) -> Result<String, Error> {
        let p = &self.params;
        let request = GenerateRequest {
            prompt,
            use_story: false,
            use_authors_note: false,
            use_world_info: false,
            use_memory: false,
            max_context_length: p.max_context_length,
            max_length: p.max_length,
            rep_pen: p.rep_pen,
            rep_pen_range: p.rep_pen_range,
            rep_pen_slope: p.rep_pen_slope,
            temperature: p.temperature,
            tfs: p.tfs,
            top_p: p.top_p,
            top_k: p.top_k,
            typical: p.typical,
            frmttriminc: p.trim_incomplete,
            stop_sequence: stop,
        };

        let response = self
            .http
            .post(format!("{}/api/v1/generate", self.endpoint))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!("{status}: {body}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let text = extract_text(&body, stop)?;
        debug!("kobold reply: {text}");
        Ok(text)
    }
}

/// Pull the generated text out of a response body and finish it: trim, strip
/// dangling stop sequences, repair code fences.
fn extract_text(body: &str, stop: Option<&[String]>) -> Result<String, Error> {
    let parsed: GenerateResponse =
        serde_json::from_str(body).map_err(|e| Error::Format(e.to_string()))?;

    let text = parsed
        .results
        .first()
        .and_then(|r| r.text.as_deref())
        .ok_or_else(|| Error::Format("missing results[0].text".to_string()))?;

    let mut text = text.trim();

    if let Some(stop) = stop {
        for sequence in stop {
            if let Some(stripped) = text.strip_suffix(sequence.as_str()) {
                text = stripped.trim_end();
            }
        }
    }

    // fix_code_block reaches a fixed point in one pass.
    Ok(fix_code_block(text))
}

#[derive(Debug)]
pub enum Error {
    /// The request never completed, or the server answered non-2xx.
    Transport(String),
    /// The response body did not match the expected envelope.
    Format(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Transport(e) => write!(f, "transport error: {e}"),
            Error::Format(e) => write!(f, "unexpected response format: {e}"),
        }
    }
}

impl std::error::Error for Error {}
