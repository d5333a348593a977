use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::info;

use super::Cli;
use crate::llm::LlmClient;
use crate::research::{ResearchAgent, ResearchProgress, ResearchResponse};
use crate::state::{Message, ResearchConfig};

/// Research the question from the command line and print the answer.
pub async fn ask(cli: Cli) -> Result<()> {
    let question = read_question(&cli.question).await?;
    if question.is_empty() {
        bail!("No question provided.");
    }

    let mut messages = match &cli.history {
        Some(path) => load_history(path).await?,
        None => Vec::new(),
    };
    messages.push(Message::user(question.clone()));

    let config = cli.research_config(ResearchConfig::from_env());
    let llm = Arc::new(LlmClient::from_env().context("Failed to create LLM client")?);

    info!(
        question = %question,
        history = messages.len() - 1,
        max_loops = config.max_research_loops,
        "Research started"
    );

    let mut agent = ResearchAgent::new(llm, config);
    let printer = if cli.quiet {
        None
    } else {
        let (tx, rx) = mpsc::unbounded_channel();
        agent = agent.with_progress(tx);
        Some(tokio::spawn(print_timeline(rx)))
    };

    let result = agent.run(messages).await;
    // Dropping the agent closes the progress channel so the printer can finish.
    drop(agent);
    if let Some(printer) = printer {
        let _ = printer.await;
    }
    let response = result?;

    info!(
        loops = response.research_loops,
        queries = response.search_queries.len(),
        sources = response.sources.len(),
        "Research complete"
    );

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print!("{}", render(&response));
    }
    Ok(())
}

async fn read_question(words: &[String]) -> Result<String> {
    if !words.is_empty() {
        return Ok(words.join(" ").trim().to_string());
    }

    eprintln!("Enter your research question (end with Ctrl-D):");
    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("Failed to read question from stdin")?;
    Ok(input.trim().to_string())
}

async fn load_history(path: &std::path::Path) -> Result<Vec<Message>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read history file {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid history file {:?}", path))
}

async fn print_timeline(mut rx: mpsc::UnboundedReceiver<ResearchProgress>) {
    while let Some(event) = rx.recv().await {
        eprintln!("[{}] {}", event.title(), event.detail());
    }
}

fn render(response: &ResearchResponse) -> String {
    let mut out = String::new();

    if response.answer.trim().is_empty() {
        out.push_str("No answer generated.\n");
    } else {
        let _ = writeln!(out, "=== FINAL ANSWER ===\n");
        let _ = writeln!(out, "{}\n", response.answer);
    }

    if response.sources.is_empty() {
        out.push_str("No sources found.\n");
    } else {
        let _ = writeln!(out, "=== SOURCES ===\n");
        for source in &response.sources {
            let _ = writeln!(out, "- {}: {}", source.label, source.url);
        }
    }

    out
}
