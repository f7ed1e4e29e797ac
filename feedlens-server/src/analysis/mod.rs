//! Analysis adapter
//!
//! Produces an annotation for every text: from the language model when one
//! is configured and answers sensibly, otherwise from the keyword fallback.
//! Upstream failures are logged and absorbed here; callers never see them.

pub mod fallback;
pub mod llm_client;
pub mod parse;

pub use fallback::fallback_analysis;
pub use llm_client::{ChatRequest, LanguageModel, LlmError, OpenAiClient};
pub use parse::{parse_model_analysis, ParseError};

use feedlens_common::config::LlmConfig;
use feedlens_common::models::Analysis;
use std::sync::Arc;
use tracing::{debug, warn};

const ANALYSIS_SYSTEM_PROMPT: &str = "You analyze customer feedback for a product team. \
Reply with a single JSON object and nothing else, using exactly these fields:\n\
- \"sentiment\": number from 0 (very negative) to 1 (very positive)\n\
- \"urgency\": number from 0 (not urgent) to 1 (drop everything)\n\
- \"business_impact\": integer from 1 (negligible) to 5 (severe)\n\
- \"theme\": short label of at most three words, such as \"Bug Fix\", \"Performance\", \"UI/UX\", \"Feature Request\", \"Pricing\" or \"General\"\n\
- \"insights\": array of at most three short, actionable recommendations";

/// Annotation plus the optional embedding for one text
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub analysis: Analysis,
    pub embedding: Option<Vec<f32>>,
}

/// Model-backed analysis with deterministic fallback
pub struct AnalysisService {
    model: Option<Arc<dyn LanguageModel>>,
    embedding_dimension: usize,
    temperature: f32,
    max_tokens: u32,
}

impl AnalysisService {
    pub fn new(model: Option<Arc<dyn LanguageModel>>, config: &LlmConfig) -> Self {
        Self {
            model,
            embedding_dimension: config.embedding_dimension,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Fallback-only service
    pub fn without_model(config: &LlmConfig) -> Self {
        Self::new(None, config)
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Model handle for other prompt-driven features (clustering)
    pub fn model(&self) -> Option<&Arc<dyn LanguageModel>> {
        self.model.as_ref()
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    /// Annotate `text`; never fails
    pub async fn analyze(&self, text: &str) -> AnalysisOutcome {
        let Some(model) = &self.model else {
            return AnalysisOutcome {
                analysis: fallback_analysis(text),
                embedding: None,
            };
        };

        let request = ChatRequest {
            system: ANALYSIS_SYSTEM_PROMPT.to_string(),
            user: text.to_string(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let (chat, embedding) = tokio::join!(model.chat(&request), self.embed_with(model, text));

        let analysis = match chat {
            Ok(reply) => match parse_model_analysis(&reply) {
                Ok(analysis) => analysis,
                Err(e) => {
                    warn!("Model reply rejected, using keyword fallback: {}", e);
                    debug!(reply = %reply, "Rejected model reply");
                    fallback_analysis(text)
                }
            },
            Err(e) => {
                warn!("Model analysis failed, using keyword fallback: {}", e);
                fallback_analysis(text)
            }
        };

        AnalysisOutcome {
            analysis,
            embedding,
        }
    }

    /// Embedding for a search query or edited text; `None` when unavailable
    pub async fn embed_query(&self, text: &str) -> Option<Vec<f32>> {
        let model = self.model.as_ref()?;
        self.embed_with(model, text).await
    }

    async fn embed_with(&self, model: &Arc<dyn LanguageModel>, text: &str) -> Option<Vec<f32>> {
        match model.embed(text).await {
            Ok(vector) if vector.len() == self.embedding_dimension => Some(vector),
            Ok(vector) => {
                warn!(
                    expected = self.embedding_dimension,
                    actual = vector.len(),
                    "Discarding embedding with unexpected dimension"
                );
                None
            }
            Err(e) => {
                warn!("Embedding request failed: {}", e);
                None
            }
        }
    }
}
