pub mod answer;
pub mod citations;
pub mod controller;
pub mod prompts;
pub mod queries;
pub mod reflection;
pub mod topic;
pub mod web;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use futures::{stream, StreamExt, TryStreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::llm::{LanguageModel, LlmError};
use crate::state::{Message, ResearchConfig, ResearchState};

use answer::finalize_answer;
use citations::Citation;
use controller::{evaluate_research, initial_branches, NextStep};
use queries::generate_queries;
use reflection::reflect;
use topic::get_research_topic;
use web::{web_research, ResearchBranch, WebResearchOutput};

#[derive(Debug, thiserror::Error)]
pub enum ResearchError {
    #[error("no research question provided")]
    EmptyQuestion,

    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// Activity events emitted while a session runs.
#[derive(Debug, Clone)]
pub enum ResearchProgress {
    GeneratingQueries(Vec<String>),
    WebResearch {
        query: String,
        sources: usize,
        labels: Vec<String>,
    },
    Reflection {
        loop_count: u32,
        is_sufficient: bool,
        follow_ups: usize,
    },
    FinalizingAnswer,
}

impl ResearchProgress {
    pub fn title(&self) -> &'static str {
        match self {
            ResearchProgress::GeneratingQueries(_) => "Generating Search Queries",
            ResearchProgress::WebResearch { .. } => "Web Research",
            ResearchProgress::Reflection { .. } => "Reflection",
            ResearchProgress::FinalizingAnswer => "Finalizing Answer",
        }
    }

    pub fn detail(&self) -> String {
        match self {
            ResearchProgress::GeneratingQueries(queries) => queries.join(", "),
            ResearchProgress::WebResearch {
                query,
                sources,
                labels,
            } => {
                let related = if labels.is_empty() {
                    "N/A".to_string()
                } else {
                    labels.join(", ")
                };
                format!(
                    "\"{}\": gathered {} sources. Related to: {}.",
                    query, sources, related
                )
            }
            ResearchProgress::Reflection {
                loop_count,
                is_sufficient,
                follow_ups,
            } => {
                if *is_sufficient {
                    format!("Loop {}: evidence is sufficient.", loop_count)
                } else {
                    format!(
                        "Loop {}: knowledge gap found, {} follow-up queries.",
                        loop_count, follow_ups
                    )
                }
            }
            ResearchProgress::FinalizingAnswer => {
                "Composing and presenting the final answer.".to_string()
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResearchResponse {
    pub answer: String,
    pub sources: Vec<Citation>,
    pub search_queries: Vec<String>,
    pub research_loops: u32,
}

/// Runs the query -> search -> reflect -> answer pipeline.
pub struct ResearchAgent {
    llm: Arc<dyn LanguageModel>,
    config: ResearchConfig,
    progress_tx: Option<mpsc::UnboundedSender<ResearchProgress>>,
}

impl ResearchAgent {
    pub fn new(llm: Arc<dyn LanguageModel>, config: ResearchConfig) -> Self {
        Self {
            llm,
            config,
            progress_tx: None,
        }
    }

    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<ResearchProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    fn send_progress(&self, progress: ResearchProgress) {
        if let Some(tx) = &self.progress_tx {
            let _ = tx.send(progress);
        }
    }

    /// Research a single question.
    pub async fn query(&self, question: &str) -> Result<ResearchResponse, ResearchError> {
        self.run(vec![Message::user(question)]).await
    }

    /// Research the last turn of a conversation, with earlier turns as context.
    pub async fn run(&self, messages: Vec<Message>) -> Result<ResearchResponse, ResearchError> {
        if messages.last().map_or(true, |m| m.content.trim().is_empty()) {
            return Err(ResearchError::EmptyQuestion);
        }

        let llm = self.llm.as_ref();
        let mut state = ResearchState::new(messages, self.config.max_research_loops);
        let research_topic = get_research_topic(&state.messages);
        let current_date = prompts::current_date();

        info!(
            initial_queries = self.config.number_of_initial_queries,
            max_loops = self.config.max_research_loops,
            "Starting research"
        );

        let queries = generate_queries(llm, &self.config, &research_topic, &current_date).await?;
        for q in &queries {
            debug!(query = %q.query, rationale = %q.rationale, "Generated query");
        }
        self.send_progress(ResearchProgress::GeneratingQueries(
            queries.iter().map(|q| q.query.clone()).collect(),
        ));

        let mut branches = initial_branches(queries.iter().map(|q| q.query.as_str()));
        loop {
            let outputs = self.fan_out(&branches, &current_date).await?;
            for output in outputs {
                self.send_progress(web_progress(&output));
                state.absorb(output);
            }

            let outcome = reflect(llm, &self.config, &mut state, &research_topic, &current_date)
                .await?;
            self.send_progress(ResearchProgress::Reflection {
                loop_count: outcome.research_loop_count,
                is_sufficient: outcome.verdict.is_sufficient,
                follow_ups: outcome.verdict.follow_up_queries.len(),
            });

            match evaluate_research(&outcome, state.max_research_loops) {
                NextStep::FinalizeAnswer => break,
                NextStep::WebResearch(next) => {
                    info!(
                        loop_count = outcome.research_loop_count,
                        knowledge_gap = %outcome.verdict.knowledge_gap,
                        branches = next.len(),
                        "Continuing research"
                    );
                    branches = next;
                }
            }
        }

        self.send_progress(ResearchProgress::FinalizingAnswer);
        let answer =
            finalize_answer(llm, &self.config, &state, &research_topic, &current_date).await?;

        Ok(ResearchResponse {
            answer: answer.answer,
            sources: answer.sources_used,
            search_queries: state.search_queries,
            research_loops: state.research_loop_count,
        })
    }

    /// Run every branch, at most `max_parallel_searches` at a time, and wait
    /// for all of them. Results come back ordered by branch id.
    async fn fan_out(
        &self,
        branches: &[ResearchBranch],
        current_date: &str,
    ) -> Result<Vec<WebResearchOutput>, LlmError> {
        let llm = self.llm.as_ref();
        let config = &self.config;
        debug!(branches = branches.len(), "Dispatching web research");

        let mut outputs: Vec<WebResearchOutput> = stream::iter(branches)
            .map(|branch| web_research(llm, config, branch, current_date))
            .buffer_unordered(config.max_parallel_searches.max(1))
            .try_collect()
            .await?;

        outputs.sort_by_key(|o| o.branch_id);
        Ok(outputs)
    }
}

fn web_progress(output: &WebResearchOutput) -> ResearchProgress {
    let mut labels: Vec<String> = Vec::new();
    for citation in &output.citations {
        if labels.len() == 3 {
            break;
        }
        if !labels.contains(&citation.label) {
            labels.push(citation.label.clone());
        }
    }

    ResearchProgress::WebResearch {
        query: output.query.clone(),
        sources: output.citations.len(),
        labels,
    }
}
