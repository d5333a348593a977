use serde::{Deserialize, Serialize};

use crate::research::citations::Citation;
use crate::research::web::WebResearchOutput;

/// Configurable research parameters.
#[derive(Debug, Clone)]
pub struct ResearchConfig {
    pub number_of_initial_queries: usize,
    pub max_research_loops: u32,
    pub query_generator_model: String,
    pub web_search_model: String,
    pub reflection_model: String,
    pub answer_model: String,
    /// Upper bound on web research branches in flight at once.
    pub max_parallel_searches: usize,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            number_of_initial_queries: 3,
            max_research_loops: 2,
            query_generator_model: "gemini-2.0-flash".to_string(),
            web_search_model: "gemini-2.0-flash".to_string(),
            reflection_model: "gemini-2.5-flash".to_string(),
            answer_model: "gemini-2.5-pro".to_string(),
            max_parallel_searches: 4,
        }
    }
}

impl ResearchConfig {
    /// Defaults with model names overridden from the environment (or `.env`).
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(model) = dotenv::var("RESEARCH_QUERY_MODEL") {
            config.query_generator_model = model;
        }
        if let Ok(model) = dotenv::var("RESEARCH_SEARCH_MODEL") {
            config.web_search_model = model;
        }
        if let Ok(model) = dotenv::var("RESEARCH_REFLECTION_MODEL") {
            config.reflection_model = model;
        }
        if let Ok(model) = dotenv::var("RESEARCH_ANSWER_MODEL") {
            config.answer_model = model;
        }
        config
    }

    pub fn apply_effort(&mut self, effort: Effort) {
        let (queries, loops) = effort.budget();
        self.number_of_initial_queries = queries;
        self.max_research_loops = loops;
    }
}

/// Named presets for how hard the agent digs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Effort {
    Low,
    Medium,
    High,
}

impl Effort {
    /// `(initial queries, max research loops)`
    pub fn budget(self) -> (usize, u32) {
        match self {
            Effort::Low => (1, 1),
            Effort::Medium => (3, 3),
            Effort::High => (5, 10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Everything one research session accumulates.
#[derive(Debug, Clone)]
pub struct ResearchState {
    pub messages: Vec<Message>,
    pub search_queries: Vec<String>,
    pub web_research_results: Vec<String>,
    pub sources_gathered: Vec<Citation>,
    pub research_loop_count: u32,
    pub max_research_loops: u32,
}

impl ResearchState {
    pub fn new(messages: Vec<Message>, max_research_loops: u32) -> Self {
        Self {
            messages,
            search_queries: Vec::new(),
            web_research_results: Vec::new(),
            sources_gathered: Vec::new(),
            research_loop_count: 0,
            max_research_loops,
        }
    }

    /// Merge one finished web research branch.
    pub fn absorb(&mut self, output: WebResearchOutput) {
        self.search_queries.push(output.query);
        self.web_research_results.push(output.result_text);
        self.sources_gathered.extend(output.citations);
    }

    pub fn number_of_ran_queries(&self) -> usize {
        self.search_queries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effort_presets() {
        let mut config = ResearchConfig::default();
        config.apply_effort(Effort::Low);
        assert_eq!(config.number_of_initial_queries, 1);
        assert_eq!(config.max_research_loops, 1);

        config.apply_effort(Effort::High);
        assert_eq!(config.number_of_initial_queries, 5);
        assert_eq!(config.max_research_loops, 10);
    }

    #[test]
    fn test_absorb_appends_in_order() {
        let mut state = ResearchState::new(vec![Message::user("q")], 2);
        for (i, text) in ["first", "second"].iter().enumerate() {
            state.absorb(WebResearchOutput {
                branch_id: i,
                query: format!("query {}", i),
                result_text: text.to_string(),
                citations: vec![Citation {
                    label: format!("Source {}", i),
                    short_url: format!("short-{}", i),
                    url: format!("https://example.com/{}", i),
                }],
            });
        }

        assert_eq!(state.number_of_ran_queries(), 2);
        assert_eq!(state.web_research_results, vec!["first", "second"]);
        assert_eq!(state.sources_gathered.len(), 2);
        assert_eq!(state.research_loop_count, 0);
    }
}
