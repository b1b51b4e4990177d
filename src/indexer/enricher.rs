//! Enrichment collaborator: attaches a summary and search keywords to each
//! chunk.
//!
//! Two implementations sit behind the [`Enricher`] trait:
//! - [`MockEnricher`]: deterministic, offline, used for tests and `--mock`.
//! - [`LlmEnricher`]: OpenAI-compatible chat-completions client.
//!
//! [`enrich_batch`] fans a flushed buffer out under a counting semaphore.
//! Each item has its own timeout, and an error or panic in one item is
//! replaced by [`fallback_enrichment`] without touching its siblings.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::EnrichmentConfig;
use crate::error::{Result, StructdexError};
use crate::types::{EnrichedChunk, Enrichment, MethodChunk};

/// Keywords kept per chunk.
pub const MAX_KEYWORDS: usize = 5;

const SYSTEM_PROMPT: &str = "You are a Java code analysis expert. Analyze code and provide \
concise summaries and search keywords in JSON format.";

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Produces an [`Enrichment`] for one chunk.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, chunk: &MethodChunk) -> Result<Enrichment>;

    /// Short label for logs.
    fn name(&self) -> &'static str;
}

/// Pick the enricher for a run: the mock when asked for, or when the API
/// key environment variable is unset.
pub fn build_enricher(config: &EnrichmentConfig, mock: bool) -> Result<Arc<dyn Enricher>> {
    if mock {
        tracing::info!("running in mock enrichment mode; no remote calls will be made");
        return Ok(Arc::new(MockEnricher::new(Duration::from_millis(config.mock_delay_ms))));
    }

    match std::env::var(&config.api_key_env) {
        Ok(key) if !key.trim().is_empty() => {
            tracing::info!("enriching with model {} via {}", config.model, config.api_base);
            Ok(Arc::new(LlmEnricher::new(config, key)?))
        }
        _ => {
            tracing::warn!(
                "{} is not set; falling back to mock enrichment",
                config.api_key_env
            );
            Ok(Arc::new(MockEnricher::new(Duration::from_millis(config.mock_delay_ms))))
        }
    }
}

// ---------------------------------------------------------------------------
// Canned enrichments
// ---------------------------------------------------------------------------

/// Substitute used when enriching one chunk fails.
pub fn fallback_enrichment(chunk: &MethodChunk) -> Enrichment {
    Enrichment {
        summary: format!("Method {} - enrichment unavailable", chunk.method_name),
        keywords: vec![chunk.method_name.to_lowercase(), "java".to_string()],
    }
}

/// Cheap result for bodies above the size ceiling.
pub fn large_method_enrichment(chunk: &MethodChunk) -> Enrichment {
    Enrichment {
        summary: format!(
            "Large method: {} (too large for LLM analysis)",
            chunk.method_name
        ),
        keywords: vec![
            chunk.method_name.clone(),
            "large-method".to_string(),
            "auto-generated".to_string(),
        ],
    }
}

// ---------------------------------------------------------------------------
// Mock
// ---------------------------------------------------------------------------

/// Offline enricher with a fixed per-call delay.
#[derive(Debug, Clone)]
pub struct MockEnricher {
    delay: Duration,
}

impl MockEnricher {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// The enrichment this mock returns for `chunk`, without the delay.
    pub fn describe(chunk: &MethodChunk) -> Enrichment {
        let (summary, first_keyword) = if chunk.is_constructor() {
            (
                "Constructor that initializes a new instance with provided parameters".to_string(),
                "constructor".to_string(),
            )
        } else {
            (
                format!("Method {} performs business logic operations", chunk.method_name),
                chunk.method_name.to_lowercase(),
            )
        };

        let mut keywords = vec![first_keyword, "java".to_string(), "method".to_string()];
        keywords.extend(chunk.dependency_types.iter().take(2).map(|d| d.to_lowercase()));
        keywords.truncate(MAX_KEYWORDS);

        Enrichment { summary, keywords }
    }
}

impl Default for MockEnricher {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

#[async_trait]
impl Enricher for MockEnricher {
    async fn enrich(&self, chunk: &MethodChunk) -> Result<Enrichment> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(Self::describe(chunk))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

// ---------------------------------------------------------------------------
// LLM client
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Chat-completions client for any OpenAI-compatible endpoint.
pub struct LlmEnricher {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_body_bytes: usize,
    prompt_body_chars: usize,
}

impl LlmEnricher {
    pub fn new(config: &EnrichmentConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| StructdexError::Enrichment(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_body_bytes: config.max_body_bytes,
            prompt_body_chars: config.prompt_body_chars,
        })
    }

    async fn complete(&self, prompt: String) -> Result<String> {
        let request = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
            "response_format": {"type": "json_object"},
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| StructdexError::Enrichment(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StructdexError::Enrichment(format!(
                "endpoint returned {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| StructdexError::Enrichment(format!("malformed completion: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| StructdexError::Enrichment("completion has no content".into()))
    }
}

#[async_trait]
impl Enricher for LlmEnricher {
    async fn enrich(&self, chunk: &MethodChunk) -> Result<Enrichment> {
        if chunk.body.len() > self.max_body_bytes {
            tracing::warn!(
                "{} is too large ({} bytes); using fallback enrichment",
                chunk.method_name,
                chunk.body.len()
            );
            return Ok(large_method_enrichment(chunk));
        }

        let content = self.complete(build_prompt(chunk, self.prompt_body_chars)).await?;
        let enrichment = parse_enrichment_reply(&content)?;
        tracing::debug!("enriched {}", chunk.method_name);
        Ok(enrichment)
    }

    fn name(&self) -> &'static str {
        "llm"
    }
}

/// User prompt for one chunk; the body is cut to `body_chars` characters.
pub fn build_prompt(chunk: &MethodChunk, body_chars: usize) -> String {
    let dependencies = if chunk.dependency_types.is_empty() {
        "None".to_string()
    } else {
        chunk.dependency_types.join(", ")
    };

    let mut body: String = chunk.body.chars().take(body_chars).collect();
    if chunk.body.chars().count() > body_chars {
        body.push_str("\n... (truncated)");
    }

    format!(
        "You are a senior Java architect. Explain the intent of this method for a semantic search engine.\n\
\n\
--- CONTEXT ---\n\
1. Package: {package}\n\
2. Class Context: {context}\n\
3. Method Signature: {signature}\n\
4. Dependencies: {dependencies}\n\
\n\
--- CODE ---\n\
{body}\n\
\n\
--- TASK ---\n\
1. Summary: one sentence describing the business logic, not the syntax. \
For constructors, describe what the initialization sets up.\n\
2. Keywords: 3 to 5 domain terms, operation verbs or type names a user might search for.\n\
\n\
--- OUTPUT FORMAT ---\n\
Return only raw JSON: {{\"summary\": \"...\", \"keywords\": [\"...\"]}}\n",
        package = chunk.package,
        context = chunk.class_context,
        signature = chunk.signature,
    )
}

fn fence_regex() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*(.*?)\s*```\s*$").ok())
        .as_ref()
}

/// Parse a model reply into an [`Enrichment`].
///
/// Markdown code fences around the JSON are tolerated. `summary` and a
/// `keywords` list are required; keywords are stringified and capped at
/// [`MAX_KEYWORDS`].
pub fn parse_enrichment_reply(content: &str) -> Result<Enrichment> {
    let json = fence_regex()
        .and_then(|re| re.captures(content))
        .and_then(|caps| caps.get(1))
        .map_or(content.trim(), |m| m.as_str());

    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| StructdexError::Enrichment(format!("invalid JSON from model: {e}")))?;

    let summary = value
        .get("summary")
        .and_then(|s| s.as_str())
        .ok_or_else(|| StructdexError::Enrichment("missing 'summary' field".into()))?;
    let keywords = value
        .get("keywords")
        .and_then(|k| k.as_array())
        .ok_or_else(|| StructdexError::Enrichment("'keywords' must be a list".into()))?;

    Ok(Enrichment {
        summary: summary.to_string(),
        keywords: keywords
            .iter()
            .take(MAX_KEYWORDS)
            .map(|k| match k {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
    })
}

// ---------------------------------------------------------------------------
// Batch fan-out
// ---------------------------------------------------------------------------

/// Output of one [`enrich_batch`] call.
#[derive(Debug, Default)]
pub struct EnrichedBatch {
    /// One entry per input chunk, in completion order.
    pub chunks: Vec<EnrichedChunk>,
    /// Entries carrying [`fallback_enrichment`].
    pub fallbacks: usize,
}

/// Enrich `chunks` with at most `max_concurrent` calls in flight.
///
/// Every input chunk appears exactly once in the output.
pub async fn enrich_batch(
    enricher: Arc<dyn Enricher>,
    chunks: Vec<MethodChunk>,
    max_concurrent: usize,
    timeout: Duration,
) -> EnrichedBatch {
    let total = chunks.len();
    tracing::info!("enriching {total} chunks with {} enricher", enricher.name());

    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut tasks: JoinSet<(MethodChunk, Result<Enrichment>)> = JoinSet::new();
    let mut pending: HashMap<tokio::task::Id, MethodChunk> = HashMap::with_capacity(total);

    for chunk in chunks {
        let enricher = Arc::clone(&enricher);
        let semaphore = Arc::clone(&semaphore);
        let task_chunk = chunk.clone();
        let handle = tasks.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    return (task_chunk, Err(StructdexError::Enrichment(e.to_string())));
                }
            };
            let result = match tokio::time::timeout(timeout, enricher.enrich(&task_chunk)).await {
                Ok(result) => result,
                Err(_) => Err(StructdexError::Enrichment(format!(
                    "timed out after {}s",
                    timeout.as_secs_f32()
                ))),
            };
            (task_chunk, result)
        });
        pending.insert(handle.id(), chunk);
    }

    let mut batch = EnrichedBatch {
        chunks: Vec::with_capacity(total),
        fallbacks: 0,
    };

    while let Some(joined) = tasks.join_next_with_id().await {
        match joined {
            Ok((id, (chunk, result))) => {
                pending.remove(&id);
                let enrichment = match result {
                    Ok(enrichment) => enrichment,
                    Err(e) => {
                        tracing::error!("enrichment failed for {}: {e}", chunk.method_name);
                        batch.fallbacks += 1;
                        fallback_enrichment(&chunk)
                    }
                };
                batch.chunks.push(EnrichedChunk::new(chunk, enrichment));
            }
            Err(join_error) => {
                let Some(chunk) = pending.remove(&join_error.id()) else {
                    tracing::error!("enrichment task {} lost: {join_error}", join_error.id());
                    continue;
                };
                tracing::error!("enrichment task for {} aborted: {join_error}", chunk.method_name);
                batch.fallbacks += 1;
                let enrichment = fallback_enrichment(&chunk);
                batch.chunks.push(EnrichedChunk::new(chunk, enrichment));
            }
        }
    }

    tracing::info!(
        "enrichment complete: {} successful, {} fallback",
        batch.chunks.len() - batch.fallbacks,
        batch.fallbacks
    );
    batch
}
