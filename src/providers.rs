//! Adapters connecting the evaluator to model providers.
//!
//! Every target model is reached through one capability, [`ModelAnswering`].
//! Which adapter serves which model is decided once, from configuration,
//! by [`ProviderRegistry`].

use crate::config::{Config, LlmConfig, ProviderKind};
use crate::document::SourceDocument;
use crate::error::{EvalError, Result};
use crate::judge::Arbiter;
use crate::llm::{LlmClient, Message, Prompts, extract_json};
use crate::model::{ModelAnswer, Question};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Produces a model's answer to a question about a document.
///
/// Failures that no retry can fix are reported as
/// [`EvalError::Configuration`].
#[async_trait]
pub trait ModelAnswering: Send + Sync {
    async fn ask(
        &self,
        question: &Question,
        model: &str,
        document: &SourceDocument,
    ) -> Result<ModelAnswer>;
}

/// How the document reaches the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    /// Base64 file content part.
    File,
    /// Document text pasted into the user message.
    InlineText,
}

/// Chat-completion adapter for one model.
pub struct ChatAnswerer {
    client: LlmClient,
    attachment: Attachment,
}

impl ChatAnswerer {
    pub fn new(config: LlmConfig, attachment: Attachment) -> Self {
        Self {
            client: LlmClient::new(config),
            attachment,
        }
    }

    fn build_message(&self, question: &Question, document: &SourceDocument) -> Result<Message> {
        match self.attachment {
            Attachment::File => Ok(Message::user_with_document(question.text.clone(), document)),
            Attachment::InlineText => {
                let text = document.text().ok_or_else(|| {
                    EvalError::Configuration(format!(
                        "document '{}' is not text and cannot be inlined",
                        document.name
                    ))
                })?;
                Ok(Message::user(format!(
                    "Document:\n{}\n\nQuestion:\n{}",
                    text, question.text
                )))
            }
        }
    }
}

#[async_trait]
impl ModelAnswering for ChatAnswerer {
    async fn ask(
        &self,
        question: &Question,
        model: &str,
        document: &SourceDocument,
    ) -> Result<ModelAnswer> {
        let messages = vec![
            Message::system(Prompts::extractor_system()),
            self.build_message(question, document)?,
        ];

        let response = self
            .client
            .chat(messages)
            .await
            .map_err(|e| EvalError::AnswerUnavailable(e.to_string()))?;

        let (text, rationale) = parse_extractor_output(&response.content)?;
        let mut answer = ModelAnswer::new(&question.id, model, text);
        answer.rationale = rationale;
        Ok(answer)
    }
}

/// Parse `{"answer": ..., "rationale": "..."}` from an extractor reply.
///
/// Non-string answers (numbers, lists, objects) are rendered as JSON text.
pub fn parse_extractor_output(raw: &str) -> Result<(String, Option<String>)> {
    let json_str = extract_json(raw);
    let value: Value = serde_json::from_str(&json_str).map_err(|e| {
        EvalError::AnswerUnavailable(format!("extractor returned malformed JSON ({}): {}", e, raw))
    })?;

    let Value::Object(obj) = value else {
        return Err(EvalError::AnswerUnavailable(format!(
            "extractor response must be a JSON object, got: {}",
            raw
        )));
    };

    let answer = match obj.get("answer") {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => {
            return Err(EvalError::AnswerUnavailable(format!(
                "extractor JSON missing 'answer': {}",
                raw
            )));
        }
        Some(other) => other.to_string(),
    };

    let rationale = obj
        .get("rationale")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok((answer, rationale))
}

/// Arbiter backed by a chat-completion model.
pub struct LlmArbiter {
    client: LlmClient,
}

impl LlmArbiter {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: LlmClient::new(config),
        }
    }

    pub fn client(&self) -> &LlmClient {
        &self.client
    }
}

#[async_trait]
impl Arbiter for LlmArbiter {
    fn model_id(&self) -> &str {
        self.client.model()
    }

    async fn judge(&self, prompt: &str) -> Result<String> {
        self.client
            .complete(Some(Prompts::judge_system()), prompt)
            .await
            .map_err(|e| EvalError::ArbiterUnavailable(e.to_string()))
    }
}

/// Model name → adapter, built from configuration.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    adapters: BTreeMap<String, Arc<dyn ModelAnswering>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One adapter per configured model.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        for entry in &config.models {
            let llm = config.model_llm_config(entry);
            let adapter: Arc<dyn ModelAnswering> = match entry.provider {
                ProviderKind::Openrouter | ProviderKind::OpenaiCompatible => {
                    Arc::new(ChatAnswerer::new(llm, Attachment::File))
                }
                ProviderKind::TextInline => {
                    Arc::new(ChatAnswerer::new(llm, Attachment::InlineText))
                }
            };
            registry.register(entry.name.clone(), adapter);
        }
        registry
    }

    pub fn register(&mut self, model: impl Into<String>, adapter: Arc<dyn ModelAnswering>) {
        self.adapters.insert(model.into(), adapter);
    }

    /// Registered model names, sorted.
    pub fn models(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }

    pub fn contains(&self, model: &str) -> bool {
        self.adapters.contains_key(model)
    }
}

#[async_trait]
impl ModelAnswering for ProviderRegistry {
    async fn ask(
        &self,
        question: &Question,
        model: &str,
        document: &SourceDocument,
    ) -> Result<ModelAnswer> {
        let adapter = self.adapters.get(model).ok_or_else(|| {
            EvalError::Configuration(format!("no provider configured for model '{}'", model))
        })?;
        adapter.ask(question, model, document).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelEntry;
    use crate::model::Track;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn llm_config(base: &str, model: &str) -> LlmConfig {
        LlmConfig {
            api_base: base.to_string(),
            api_key: "k".to_string(),
            model: model.to_string(),
            ..Default::default()
        }
    }

    fn completion(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"content": content}}]
        }))
    }

    #[test]
    fn test_parse_extractor_output() {
        let (answer, rationale) =
            parse_extractor_output(r#"{"answer": " 12% ", "rationale": "Table 4"}"#).unwrap();
        assert_eq!(answer, "12%");
        assert_eq!(rationale.as_deref(), Some("Table 4"));

        let (answer, _) =
            parse_extractor_output("```json\n{\"answer\": 42.5, \"rationale\": \"p3\"}\n```")
                .unwrap();
        assert_eq!(answer, "42.5");

        let (answer, rationale) = parse_extractor_output(r#"{"answer": ["a", "b"]}"#).unwrap();
        assert_eq!(answer, r#"["a","b"]"#);
        assert!(rationale.is_none());
    }

    #[test]
    fn test_parse_extractor_output_errors() {
        assert!(matches!(
            parse_extractor_output("I could not open the file"),
            Err(EvalError::AnswerUnavailable(_))
        ));
        assert!(parse_extractor_output(r#"{"rationale": "none"}"#).is_err());
        assert!(parse_extractor_output("[1, 2]").is_err());
    }

    #[tokio::test]
    async fn test_chat_answerer_attaches_document() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(serde_json::json!({"model": "vendor/model-x"})))
            .respond_with(completion(r#"{"answer": "2040", "rationale": "page 3"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let answerer = ChatAnswerer::new(llm_config(&server.uri(), "vendor/model-x"), Attachment::File);
        let question = Question::new("q1", "When is the net-zero target?", Track::ContextualReasoning);
        let doc = SourceDocument::from_text("esg", "Net zero by 2040.");

        let answer = answerer.ask(&question, "vendor/model-x", &doc).await.unwrap();
        assert_eq!(answer.question_id, "q1");
        assert_eq!(answer.model, "vendor/model-x");
        assert_eq!(answer.text, "2040");
        assert_eq!(answer.rationale.as_deref(), Some("page 3"));

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["messages"][1]["content"][1]["type"], "file");
    }

    #[tokio::test]
    async fn test_inline_requires_text_document() {
        let answerer = ChatAnswerer::new(llm_config("http://127.0.0.1:9", "m"), Attachment::InlineText);
        let question = Question::new("q1", "?", Track::StructuralFidelity);
        let doc = SourceDocument {
            name: "scan".to_string(),
            path: None,
            mime_type: "application/pdf".to_string(),
            bytes: vec![0, 1, 2],
        };
        let err = answerer.ask(&question, "m", &doc).await.unwrap_err();
        assert!(matches!(err, EvalError::Configuration(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_llm_arbiter() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(completion(r#"{"verdict": "correct", "justification": "same"}"#))
            .mount(&server)
            .await;

        let arbiter = LlmArbiter::new(llm_config(&server.uri(), "judge-1"));
        assert_eq!(arbiter.model_id(), "judge-1");
        let raw = arbiter.judge("grade this").await.unwrap();
        assert!(raw.contains("correct"));
    }

    #[tokio::test]
    async fn test_llm_arbiter_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let arbiter = LlmArbiter::new(llm_config(&server.uri(), "judge-1"));
        assert!(matches!(
            arbiter.judge("grade this").await,
            Err(EvalError::ArbiterUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_registry_unknown_model() {
        let registry = ProviderRegistry::new();
        let question = Question::new("q1", "?", Track::StructuralFidelity);
        let doc = SourceDocument::from_text("d", "x");
        let err = registry.ask(&question, "ghost", &doc).await.unwrap_err();
        assert!(matches!(err, EvalError::Configuration(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_registry_from_config() {
        let mut config = Config::with_judge("https://example.com", "k", "judge");
        config.models.push(ModelEntry::new("b-model"));
        let mut inline = ModelEntry::new("a-model");
        inline.provider = ProviderKind::TextInline;
        config.models.push(inline);

        let registry = ProviderRegistry::from_config(&config);
        assert_eq!(registry.models(), vec!["a-model", "b-model"]);
        assert!(registry.contains("b-model"));
    }
}
