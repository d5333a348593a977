pub mod ask;

use std::path::PathBuf;

use clap::Parser;
use tracing::Level;

use crate::state::{Effort, ResearchConfig};

/// Answer a question with iterative, cited web research.
#[derive(Debug, Parser)]
#[command(name = "research-agent", version, long_about = None)]
pub struct Cli {
    /// The research question. Read from stdin when omitted.
    pub question: Vec<String>,

    /// Maximum number of reflection passes before answering.
    #[arg(long, alias = "max_loops")]
    pub max_loops: Option<u32>,

    /// Number of search queries generated for the first round.
    #[arg(long)]
    pub initial_queries: Option<usize>,

    /// Preset for queries and loops; explicit flags win over it.
    #[arg(long, value_enum)]
    pub effort: Option<Effort>,

    /// Model used for reflection and the final answer.
    #[arg(long)]
    pub reasoning_model: Option<String>,

    /// Maximum web searches in flight at once.
    #[arg(long)]
    pub parallel: Option<usize>,

    /// JSON file with earlier turns: `[{"role": "user", "content": "..."}, ...]`.
    #[arg(long)]
    pub history: Option<PathBuf>,

    /// Print the result as JSON.
    #[arg(long)]
    pub json: bool,

    /// Hide the activity timeline.
    #[arg(short, long)]
    pub quiet: bool,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Layer the command-line flags over `base`.
    pub fn research_config(&self, mut base: ResearchConfig) -> ResearchConfig {
        if let Some(effort) = self.effort {
            base.apply_effort(effort);
        }
        if let Some(loops) = self.max_loops {
            base.max_research_loops = loops;
        }
        if let Some(queries) = self.initial_queries {
            base.number_of_initial_queries = queries;
        }
        if let Some(model) = &self.reasoning_model {
            base.reflection_model = model.clone();
            base.answer_model = model.clone();
        }
        if let Some(parallel) = self.parallel {
            base.max_parallel_searches = parallel;
        }
        base
    }
}

/// Logs go to stderr so stdout carries only the answer.
pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}
