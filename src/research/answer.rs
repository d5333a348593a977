use tracing::info;

use super::citations::{substitute_citations, Citation};
use super::prompts;
use crate::llm::{CompletionRequest, LanguageModel, LlmError};
use crate::state::{ResearchConfig, ResearchState};

/// Joins research summaries in the answer prompt.
const ANSWER_SEPARATOR: &str = "\n---\n\n";

#[derive(Debug, Clone)]
pub struct FinalAnswer {
    pub answer: String,
    pub sources_used: Vec<Citation>,
}

/// Write the final answer and swap short citation ids back to real URLs.
/// Only sources the answer actually cites are kept.
pub async fn finalize_answer(
    llm: &dyn LanguageModel,
    config: &ResearchConfig,
    state: &ResearchState,
    research_topic: &str,
    current_date: &str,
) -> Result<FinalAnswer, LlmError> {
    let summaries = state.web_research_results.join(ANSWER_SEPARATOR);
    let prompt = prompts::answer(research_topic, current_date, &summaries);
    let request = CompletionRequest::new(&config.answer_model, prompt, 0.0);
    let draft = llm.complete(&request).await?;

    let (answer, sources_used) = substitute_citations(&draft, &state.sources_gathered);

    info!(
        answer_len = answer.len(),
        sources_gathered = state.sources_gathered.len(),
        sources_used = sources_used.len(),
        "Answer finalized"
    );

    Ok(FinalAnswer {
        answer,
        sources_used,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::testing::ScriptedModel;
    use crate::research::web::WebResearchOutput;
    use crate::state::Message;

    #[tokio::test]
    async fn test_finalize_replaces_and_filters() {
        let llm = ScriptedModel::new().push_answer("Paris [wiki](short-0) is big.");
        let mut state = ResearchState::new(vec![Message::user("q")], 1);
        state.absorb(WebResearchOutput {
            branch_id: 0,
            query: "q".to_string(),
            result_text: "Paris is the capital [wiki](short-0)".to_string(),
            citations: vec![
                Citation {
                    label: "wiki".to_string(),
                    short_url: "short-0".to_string(),
                    url: "https://en.wikipedia.org/wiki/Paris".to_string(),
                },
                Citation {
                    label: "other".to_string(),
                    short_url: "short-1".to_string(),
                    url: "https://other.example".to_string(),
                },
            ],
        });

        let out = finalize_answer(&llm, &ResearchConfig::default(), &state, "q", "today")
            .await
            .unwrap();

        assert_eq!(out.answer, "Paris [wiki](https://en.wikipedia.org/wiki/Paris) is big.");
        assert_eq!(out.sources_used.len(), 1);
        assert_eq!(out.sources_used[0].label, "wiki");
    }

    #[tokio::test]
    async fn test_answer_prompt_joins_summaries() {
        let llm = ScriptedModel::new().push_answer("done");
        let mut state = ResearchState::new(vec![Message::user("q")], 1);
        for (i, text) in ["first finding", "second finding"].iter().enumerate() {
            state.absorb(WebResearchOutput {
                branch_id: i,
                query: format!("q{}", i),
                result_text: text.to_string(),
                citations: vec![],
            });
        }

        finalize_answer(&llm, &ResearchConfig::default(), &state, "q", "today")
            .await
            .unwrap();

        let prompts = llm.complete_prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("first finding\n---\n\nsecond finding"));
    }
}
