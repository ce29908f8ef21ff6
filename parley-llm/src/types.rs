//! Wire types for the generate endpoint and the reply handed to the host.

use parley_core::config::ConfigSnapshot;
use parley_core::types::{ParticipantId, PendingQuery, QueryContext, QueryId};
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// How long the backend should keep the model resident after a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAlive {
    /// Load and hold until told otherwise (`-1`).
    Indefinite,
    /// Unload immediately (`0`).
    Release,
    /// Hold for this many seconds.
    Seconds(u32),
}

impl KeepAlive {
    /// Value of the `keep_alive` field.
    #[must_use]
    pub fn as_wire(self) -> i64 {
        match self {
            Self::Indefinite => -1,
            Self::Release => 0,
            Self::Seconds(s) => i64::from(s),
        }
    }
}

/// Body of a per-query generate call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateRequest {
    /// Endpoint the body is posted to.
    #[serde(skip)]
    pub url: String,
    /// Model identifier.
    pub model: String,
    /// Full prompt.
    pub prompt: String,
    /// Always `false`; the body is read in one piece.
    pub stream: bool,
    /// Seconds to keep the model loaded afterwards.
    pub keep_alive: i64,
}

impl GenerateRequest {
    /// Build the call for `query` against the active configuration.
    #[must_use]
    pub fn for_query(config: &ConfigSnapshot, query: &PendingQuery) -> Self {
        Self {
            url: config.backend_url.clone(),
            model: config.model.clone(),
            prompt: query.prompt.clone(),
            stream: false,
            keep_alive: config.query_keep_alive,
        }
    }
}

/// Body of a preload/unload directive: a generate call without a prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeepAliveRequest {
    /// Endpoint the body is posted to.
    #[serde(skip)]
    pub url: String,
    /// Model identifier.
    pub model: String,
    /// `-1` to hold indefinitely, `0` to release.
    pub keep_alive: i64,
}

impl KeepAliveRequest {
    /// Build a directive for the configured model.
    #[must_use]
    pub fn new(config: &ConfigSnapshot, keep_alive: KeepAlive) -> Self {
        Self {
            url: config.backend_url.clone(),
            model: config.model.clone(),
            keep_alive: keep_alive.as_wire(),
        }
    }
}

/// A parsed generate response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateResponse {
    /// Generated text, trimmed.
    pub text: String,
    /// Tokens generated, when reported.
    pub tokens_generated: u32,
    /// Wall-clock latency in milliseconds.
    pub latency_ms: u64,
}

/// One JSON object of a generate response. A non-streamed body is a single
/// chunk; a streamed one is many, newline-separated.
#[derive(Debug, Default, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    eval_count: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

/// Parse a generate response body.
///
/// Accepts a single JSON object or newline-delimited chunks, concatenating
/// their `response` fragments. Only the `response`, `eval_count` and
/// `error` fields are read.
///
/// # Errors
///
/// [`LlmError::Backend`] when a chunk carries an `error` field;
/// [`LlmError::MalformedResponse`] when the body is not JSON or contains no
/// generated text.
pub fn parse_generate_body(body: &str) -> Result<(String, u32), LlmError> {
    let chunks: Vec<GenerateChunk> = match serde_json::from_str::<GenerateChunk>(body) {
        Ok(single) => vec![single],
        Err(_) => body
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| {
                serde_json::from_str::<GenerateChunk>(l)
                    .map_err(|e| LlmError::MalformedResponse(format!("{e}: '{}'", truncate(l, 120))))
            })
            .collect::<Result<_, _>>()?,
    };

    if chunks.is_empty() {
        return Err(LlmError::MalformedResponse("empty body".into()));
    }

    let mut text = String::new();
    let mut tokens = 0u64;
    for chunk in chunks {
        if let Some(error) = chunk.error {
            return Err(LlmError::Backend(error));
        }
        if let Some(fragment) = chunk.response {
            text.push_str(&fragment);
        }
        if let Some(count) = chunk.eval_count {
            tokens = count;
        }
    }

    let text = text.trim();
    if text.is_empty() {
        return Err(LlmError::MalformedResponse("no generated text".into()));
    }
    Ok((text.to_string(), u32::try_from(tokens).unwrap_or(u32::MAX)))
}

/// Cut `s` to at most `max` characters.
pub(crate) fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

/// A generated line, ready for the host to post into game chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Query that produced it.
    pub query_id: QueryId,
    /// Who speaks it.
    pub participant: ParticipantId,
    /// Speaker display name.
    pub participant_name: String,
    /// What it answers, and where it goes.
    pub context: QueryContext,
    /// Generated text.
    pub text: String,
    /// Backend latency in milliseconds.
    pub latency_ms: u64,
}

impl Reply {
    /// Pair a backend response with the query it answers.
    #[must_use]
    pub fn new(query: &PendingQuery, response: GenerateResponse) -> Self {
        Self {
            query_id: query.id,
            participant: query.participant,
            participant_name: query.participant_name.clone(),
            context: query.context.clone(),
            text: response.text,
            latency_ms: response.latency_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::{Location, Participant};

    #[test]
    fn keep_alive_wire_values() {
        assert_eq!(KeepAlive::Indefinite.as_wire(), -1);
        assert_eq!(KeepAlive::Release.as_wire(), 0);
        assert_eq!(KeepAlive::Seconds(300).as_wire(), 300);
    }

    #[test]
    fn generate_body_omits_url() {
        let config = ConfigSnapshot::default();
        let bot = Participant::bot(3, "Bot", Location::default());
        let query = PendingQuery::new(&bot, "say hi", QueryContext::Ambient);
        let req = GenerateRequest::for_query(&config, &query);
        let json = serde_json::to_value(&req).expect("serialize");
        assert_eq!(json["model"], "llama3.2:1b");
        assert_eq!(json["prompt"], "say hi");
        assert_eq!(json["stream"], false);
        assert_eq!(json["keep_alive"], 300);
        assert!(json.get("url").is_none());
        assert_eq!(req.url, config.backend_url);
    }

    #[test]
    fn keep_alive_body() {
        let req = KeepAliveRequest::new(&ConfigSnapshot::default(), KeepAlive::Indefinite);
        let json = serde_json::to_value(&req).expect("serialize");
        assert_eq!(json, serde_json::json!({"model": "llama3.2:1b", "keep_alive": -1}));
    }

    #[test]
    fn parses_single_object() {
        let body = r#"{"model":"llama3.2:1b","response":"  Hey there! ","done":true,"eval_count":5}"#;
        assert_eq!(parse_generate_body(body).expect("parse"), ("Hey there!".to_string(), 5));
    }

    #[test]
    fn parses_streamed_chunks() {
        let body = "{\"response\":\"Lok'\",\"done\":false}\n\n{\"response\":\"tar!\",\"done\":false}\n{\"response\":\"\",\"done\":true,\"eval_count\":3}\n";
        assert_eq!(parse_generate_body(body).expect("parse"), ("Lok'tar!".to_string(), 3));
    }

    #[test]
    fn error_field_is_backend_error() {
        let err = parse_generate_body(r#"{"error":"model 'x' not found"}"#).expect_err("error");
        assert!(matches!(err, LlmError::Backend(ref m) if m.contains("not found")));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            parse_generate_body("<html>502</html>"),
            Err(LlmError::MalformedResponse(_))
        ));
        assert!(matches!(parse_generate_body(""), Err(LlmError::MalformedResponse(_))));
        assert!(matches!(
            parse_generate_body(r#"{"response":"   ","done":true}"#),
            Err(LlmError::MalformedResponse(_))
        ));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé…");
        assert_eq!(truncate("hi", 10), "hi");
    }
}
