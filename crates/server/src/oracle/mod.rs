// Oracle client: the language-model backend behind summaries and agent
// analysis.
//
// `OracleClient` is an enum so handlers stay oblivious to which backend is
// wired in: `Http` talks to an OpenAI-compatible chat-completions endpoint,
// `Stub` answers deterministically for tests and offline runs.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use redline_common::lines::split_lines;
use redline_common::types::ProposedEdit;

use crate::error::{CoreError, CoreResult};

const SUMMARY_SYSTEM_PROMPT: &str = "You are a precise editorial assistant. Summarize the \
     document you are given in a few sentences, keeping the author's framing. Respond with \
     plain prose only.";

/// A configured agent persona. The system prompt instructs the model to
/// answer with a JSON object of highlights and line-indexed suggestions.
#[derive(Debug, Clone, Copy)]
pub struct AgentPersona {
    pub agent_type: &'static str,
    pub display_name: &'static str,
    pub system_prompt: &'static str,
}

const PERSONAS: &[AgentPersona] = &[
    AgentPersona {
        agent_type: "content-strategist",
        display_name: "Content Strategist",
        system_prompt: "You are a content strategist reviewing a document line by line. \
             Identify the strongest lines and propose concrete rewrites for weak ones. \
             Respond ONLY with JSON of the shape \
             {\"highlights\": [string], \"suggestions\": [{\"lineNumber\": number, \
             \"originalText\": string, \"proposedText\": string, \"reason\": string}]}. \
             Line numbers are zero-based indices into the document's lines.",
    },
    AgentPersona {
        agent_type: "research-agent",
        display_name: "Research Agent",
        system_prompt: "You are a research assistant reviewing a document line by line. \
             Flag claims that need sourcing and propose more precise phrasings. \
             Respond ONLY with JSON of the shape \
             {\"highlights\": [string], \"suggestions\": [{\"lineNumber\": number, \
             \"originalText\": string, \"proposedText\": string, \"reason\": string}]}. \
             Line numbers are zero-based indices into the document's lines.",
    },
    AgentPersona {
        agent_type: "engagement-optimizer",
        display_name: "Engagement Optimizer",
        system_prompt: "You are an engagement editor reviewing a document line by line. \
             Propose rewrites that make lines clearer and more compelling. \
             Respond ONLY with JSON of the shape \
             {\"highlights\": [string], \"suggestions\": [{\"lineNumber\": number, \
             \"originalText\": string, \"proposedText\": string, \"reason\": string}]}. \
             Line numbers are zero-based indices into the document's lines.",
    },
];

pub fn persona_for(agent_type: &str) -> Option<&'static AgentPersona> {
    PERSONAS.iter().find(|p| p.agent_type == agent_type)
}

pub fn personas() -> &'static [AgentPersona] {
    PERSONAS
}

/// What an agent pass produces: prose observations plus edit suggestions
/// ready to submit to the proposal ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentAnalysis {
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<AgentSuggestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSuggestion {
    pub line_number: u32,
    pub original_text: String,
    pub proposed_text: String,
    #[serde(default)]
    pub reason: Option<String>,
}

impl AgentSuggestion {
    pub fn into_edit(self) -> ProposedEdit {
        ProposedEdit {
            line_number: self.line_number,
            original_text: self.original_text,
            proposed_text: self.proposed_text,
            reason: self.reason,
        }
    }
}

pub enum OracleClient {
    Http(HttpOracle),
    Stub(StubOracle),
}

impl OracleClient {
    pub async fn summarize(&self, body: &str) -> CoreResult<String> {
        match self {
            OracleClient::Http(http) => http.chat(SUMMARY_SYSTEM_PROMPT, body).await,
            OracleClient::Stub(stub) => Ok(stub.summarize(body)),
        }
    }

    pub async fn analyze(&self, persona: &AgentPersona, body: &str) -> CoreResult<AgentAnalysis> {
        let raw = match self {
            OracleClient::Http(http) => http.chat(persona.system_prompt, body).await?,
            OracleClient::Stub(stub) => return Ok(stub.analyze(body)),
        };
        parse_analysis(&raw)
    }
}

/// OpenAI-compatible chat-completions backend.
pub struct HttpOracle {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl HttpOracle {
    pub fn new(base_url: &str, api_key: &str, model: &str, timeout: Duration) -> CoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| CoreError::oracle(format!("failed to build http client: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    async fn chat(&self, system: &str, user: &str) -> CoreResult<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let payload = serde_json::json!({
            "model": self.model,
            "temperature": 0.3,
            "messages": [
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
        });

        debug!(model = %self.model, "dispatching oracle chat request");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| CoreError::oracle(format!("oracle request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(CoreError::oracle(format!(
                "oracle returned {status}: {detail}"
            )));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|err| CoreError::oracle(format!("malformed oracle response: {err}")))?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| CoreError::oracle("oracle response had no choices".to_string()))
    }
}

/// Deterministic backend. Summaries echo document shape; analysis suggests
/// tightening the first non-empty line.
pub struct StubOracle;

impl StubOracle {
    fn summarize(&self, body: &str) -> String {
        let lines = split_lines(body);
        let non_empty = lines.iter().filter(|l| !l.trim().is_empty()).count();
        format!("Document with {non_empty} substantive lines out of {}.", lines.len())
    }

    fn analyze(&self, body: &str) -> AgentAnalysis {
        let lines = split_lines(body);
        let target = lines.iter().position(|l| !l.trim().is_empty());
        let suggestions = target
            .map(|idx| {
                vec![AgentSuggestion {
                    line_number: idx as u32,
                    original_text: lines[idx].to_string(),
                    proposed_text: format!("{} (tightened)", lines[idx].trim()),
                    reason: Some("Tighter phrasing for the opening line".to_string()),
                }]
            })
            .unwrap_or_default();
        AgentAnalysis {
            highlights: vec![format!("Document has {} lines", lines.len())],
            suggestions,
        }
    }
}

/// Models occasionally wrap JSON answers in markdown fences; strip them
/// before parsing.
fn parse_analysis(raw: &str) -> CoreResult<AgentAnalysis> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();
    serde_json::from_str(inner)
        .map_err(|err| CoreError::oracle(format!("oracle returned unparsable analysis: {err}")))
}

#[cfg(test)]
mod tests {
    use super::{parse_analysis, persona_for, OracleClient, StubOracle};

    #[test]
    fn analysis_parses_camel_case_payloads() {
        let raw = r#"{"highlights": ["Line 1 is strong"],
            "suggestions": [{"lineNumber": 2, "originalText": "old",
                             "proposedText": "new", "reason": "clarity"}]}"#;
        let analysis = parse_analysis(raw).expect("parse should succeed");
        assert_eq!(analysis.highlights.len(), 1);
        assert_eq!(analysis.suggestions[0].line_number, 2);
        assert_eq!(analysis.suggestions[0].reason.as_deref(), Some("clarity"));
    }

    #[test]
    fn analysis_tolerates_markdown_fences_and_missing_fields() {
        let raw = "```json\n{\"suggestions\": []}\n```";
        let analysis = parse_analysis(raw).expect("parse should succeed");
        assert!(analysis.highlights.is_empty());
        assert!(analysis.suggestions.is_empty());

        assert!(parse_analysis("not json at all").is_err());
    }

    #[test]
    fn personas_are_registered_by_type() {
        assert!(persona_for("research-agent").is_some());
        assert!(persona_for("content-strategist").is_some());
        assert!(persona_for("unknown-type").is_none());
    }

    #[tokio::test]
    async fn stub_backend_is_deterministic() {
        let oracle = OracleClient::Stub(StubOracle);
        let persona = persona_for("research-agent").expect("persona should exist");

        let analysis =
            oracle.analyze(persona, "\nA first real line\nmore").await.expect("analyze");
        assert_eq!(analysis.suggestions[0].line_number, 1);
        assert_eq!(analysis.suggestions[0].proposed_text, "A first real line (tightened)");

        let summary = oracle.summarize("a\n\nb").await.expect("summarize");
        assert_eq!(summary, "Document with 2 substantive lines out of 3.");
    }
}
