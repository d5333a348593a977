use tracing::debug;

use super::citations::{insert_citation_markers, referenced_citations, resolve_urls, Citation};
use super::prompts;
use crate::llm::{CompletionRequest, LanguageModel, LlmError};
use crate::state::ResearchConfig;

/// One fan-out branch: a query and its session-unique id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResearchBranch {
    pub id: usize,
    pub query: String,
}

#[derive(Debug, Clone)]
pub struct WebResearchOutput {
    pub branch_id: usize,
    pub query: String,
    pub result_text: String,
    pub citations: Vec<Citation>,
}

/// Run one grounded search and turn its sources into citations.
///
/// The branch id scopes the short identifiers minted here.
pub async fn web_research(
    llm: &dyn LanguageModel,
    config: &ResearchConfig,
    branch: &ResearchBranch,
    current_date: &str,
) -> Result<WebResearchOutput, LlmError> {
    let prompt = prompts::web_searcher(&branch.query, current_date);
    let request = CompletionRequest::new(&config.web_search_model, prompt, 0.0);
    let response = llm.search(&request).await?;

    let resolved = resolve_urls(&response.sources, branch.id);
    let result_text = insert_citation_markers(&response.text, &response.supports, &resolved);
    let citations = referenced_citations(&response.supports, &resolved);

    debug!(
        branch = branch.id,
        query = %branch.query,
        sources = response.sources.len(),
        cited = citations.len(),
        "Web research branch finished"
    );

    Ok(WebResearchOutput {
        branch_id: branch.id,
        query: branch.query.clone(),
        result_text,
        citations,
    })
}
