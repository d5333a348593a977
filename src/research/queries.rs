use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::prompts;
use crate::llm::{complete_structured, CompletionRequest, LanguageModel, LlmError, StructuredOutput};
use crate::state::ResearchConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryItem {
    pub query: String,
    #[serde(default)]
    pub rationale: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchQueryList {
    pub queries: Vec<QueryItem>,
}

impl StructuredOutput for SearchQueryList {
    fn response_schema() -> Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "queries": {
                    "type": "ARRAY",
                    "items": {
                        "type": "OBJECT",
                        "properties": {
                            "query": { "type": "STRING" },
                            "rationale": { "type": "STRING" }
                        },
                        "required": ["query", "rationale"]
                    }
                }
            },
            "required": ["queries"]
        })
    }
}

/// Ask the model for the first round of search queries.
///
/// At most `number_of_initial_queries` are kept. Blank queries are dropped,
/// and if nothing usable comes back the topic itself is searched.
pub async fn generate_queries(
    llm: &dyn LanguageModel,
    config: &ResearchConfig,
    research_topic: &str,
    current_date: &str,
) -> Result<Vec<QueryItem>, LlmError> {
    let prompt = prompts::query_writer(
        research_topic,
        current_date,
        config.number_of_initial_queries,
    );
    let request = CompletionRequest::new(&config.query_generator_model, prompt, 1.0);
    let list: SearchQueryList = complete_structured(llm, &request).await?;

    let mut queries: Vec<QueryItem> = list
        .queries
        .into_iter()
        .filter(|q| !q.query.trim().is_empty())
        .collect();

    let limit = config.number_of_initial_queries.max(1);
    if queries.len() > limit {
        debug!(returned = queries.len(), limit, "Truncating generated queries");
        queries.truncate(limit);
    }

    if queries.is_empty() {
        warn!("Query generator returned no queries, searching the topic directly");
        queries.push(QueryItem {
            query: research_topic.trim().to_string(),
            rationale: "fallback to the original question".to_string(),
        });
    }

    Ok(queries)
}
