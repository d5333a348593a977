use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::prompts;
use crate::llm::{complete_structured, CompletionRequest, LanguageModel, LlmError, StructuredOutput};
use crate::state::{ResearchConfig, ResearchState};

/// Joins research summaries in the reflection prompt.
const SUMMARY_SEPARATOR: &str = "\n\n---\n\n";

/// The model's verdict on whether the evidence answers the question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reflection {
    pub is_sufficient: bool,
    #[serde(default)]
    pub knowledge_gap: String,
    #[serde(default)]
    pub follow_up_queries: Vec<String>,
}

impl StructuredOutput for Reflection {
    fn response_schema() -> Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "is_sufficient": { "type": "BOOLEAN" },
                "knowledge_gap": { "type": "STRING" },
                "follow_up_queries": {
                    "type": "ARRAY",
                    "items": { "type": "STRING" }
                }
            },
            "required": ["is_sufficient", "knowledge_gap", "follow_up_queries"]
        })
    }
}

/// A reflection verdict plus the counters the loop controller needs.
#[derive(Debug, Clone)]
pub struct ReflectionOutcome {
    pub verdict: Reflection,
    pub research_loop_count: u32,
    pub number_of_ran_queries: usize,
}

/// Judge the accumulated evidence. Counts as one research loop.
///
/// When every result is blank the model is not consulted: the verdict is
/// "insufficient" with the topic itself as the follow-up query.
pub async fn reflect(
    llm: &dyn LanguageModel,
    config: &ResearchConfig,
    state: &mut ResearchState,
    research_topic: &str,
    current_date: &str,
) -> Result<ReflectionOutcome, LlmError> {
    state.research_loop_count += 1;

    let verdict = if state
        .web_research_results
        .iter()
        .all(|r| r.trim().is_empty())
    {
        warn!(
            loop_count = state.research_loop_count,
            "No research results to reflect on"
        );
        Reflection {
            is_sufficient: false,
            knowledge_gap: "no evidence gathered yet".to_string(),
            follow_up_queries: vec![research_topic.trim().to_string()],
        }
    } else {
        let summaries = state.web_research_results.join(SUMMARY_SEPARATOR);
        let prompt = prompts::reflection(research_topic, current_date, &summaries);
        let request = CompletionRequest::new(&config.reflection_model, prompt, 1.0);
        complete_structured(llm, &request).await?
    };

    info!(
        loop_count = state.research_loop_count,
        is_sufficient = verdict.is_sufficient,
        follow_ups = verdict.follow_up_queries.len(),
        "Reflection complete"
    );

    Ok(ReflectionOutcome {
        verdict,
        research_loop_count: state.research_loop_count,
        number_of_ran_queries: state.number_of_ran_queries(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::testing::ScriptedModel;
    use crate::research::web::WebResearchOutput;
    use crate::state::Message;

    fn state_with_results(results: &[&str]) -> ResearchState {
        let mut state = ResearchState::new(vec![Message::user("q")], 3);
        for (i, r) in results.iter().enumerate() {
            state.absorb(WebResearchOutput {
                branch_id: i,
                query: format!("query {}", i),
                result_text: r.to_string(),
                citations: vec![],
            });
        }
        state
    }

    #[tokio::test]
    async fn test_reflect_increments_loop_and_records_queries() {
        let llm = ScriptedModel::new().push_json(
            r#"{"is_sufficient": false, "knowledge_gap": "dates", "follow_up_queries": ["when?"]}"#,
        );
        let mut state = state_with_results(&["one", "two"]);

        let outcome = reflect(&llm, &ResearchConfig::default(), &mut state, "topic", "today")
            .await
            .unwrap();

        assert_eq!(state.research_loop_count, 1);
        assert_eq!(outcome.research_loop_count, 1);
        assert_eq!(outcome.number_of_ran_queries, 2);
        assert!(!outcome.verdict.is_sufficient);
        assert_eq!(outcome.verdict.follow_up_queries, vec!["when?"]);
    }

    #[tokio::test]
    async fn test_reflect_without_evidence_skips_model() {
        let llm = ScriptedModel::new();
        let mut state = state_with_results(&[]);

        let outcome = reflect(&llm, &ResearchConfig::default(), &mut state, "topic", "today")
            .await
            .unwrap();

        assert_eq!(llm.json_calls(), 0);
        assert!(!outcome.verdict.is_sufficient);
        assert_eq!(outcome.verdict.follow_up_queries, vec!["topic"]);
        assert_eq!(outcome.research_loop_count, 1);
    }

    #[tokio::test]
    async fn test_reflect_with_only_blank_results_skips_model() {
        let llm = ScriptedModel::new().push_json(
            r#"{"is_sufficient": true, "knowledge_gap": "", "follow_up_queries": []}"#,
        );
        let mut state = state_with_results(&["", "  ", "\n"]);

        let outcome = reflect(&llm, &ResearchConfig::default(), &mut state, "topic", "today")
            .await
            .unwrap();

        assert_eq!(llm.json_calls(), 0);
        assert!(!outcome.verdict.is_sufficient);
        assert_eq!(outcome.verdict.follow_up_queries, vec!["topic"]);
        assert_eq!(outcome.number_of_ran_queries, 3);
    }

    #[tokio::test]
    async fn test_reflect_schema_violation_is_fatal() {
        let llm = ScriptedModel::new().push_json(r#"{"knowledge_gap": "missing flag"}"#);
        let mut state = state_with_results(&["evidence"]);

        let err = reflect(&llm, &ResearchConfig::default(), &mut state, "topic", "today")
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::SchemaViolation { .. }));
    }
}
