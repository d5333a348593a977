/// Today's date as it is written into prompts, e.g. "October 16, 2026".
pub fn current_date() -> String {
    chrono::Local::now().format("%B %d, %Y").to_string()
}

pub fn query_writer(research_topic: &str, current_date: &str, number_queries: usize) -> String {
    format!(
        r#"Your goal is to generate sophisticated and diverse web search queries. These queries are intended for an advanced automated web research tool capable of analyzing complex results, following links, and synthesizing information.

Instructions:
- Always prefer a single search query, only add another query if the original question requests multiple aspects or elements and one query is not enough.
- Each query should focus on one specific aspect of the original question.
- Don't produce more than {number_queries} queries.
- Queries should be diverse, if the topic is broad, generate more than 1 query.
- Don't generate multiple similar queries, 1 is enough.
- Queries should ensure that the most current information is gathered. The current date is {current_date}.

Format:
- Respond with a JSON object with a single key "queries": a list of objects, each with
  - "query": the search query
  - "rationale": a brief explanation of why this query is relevant

Context: {research_topic}"#
    )
}

pub fn web_searcher(query: &str, current_date: &str) -> String {
    format!(
        r#"Conduct targeted Google Searches to gather the most recent, credible information on "{query}" and synthesize it into a verifiable text artifact.

Instructions:
- Query should ensure that the most current information is gathered. The current date is {current_date}.
- Conduct multiple, diverse searches to gather comprehensive information.
- Consolidate key findings while meticulously tracking the source(s) for each specific piece of information.
- The output should be a well-written summary or report based on your search findings.
- Only include the information found in the search results, don't make up any information.

Research Topic:
{query}"#
    )
}

pub fn reflection(research_topic: &str, current_date: &str, summaries: &str) -> String {
    format!(
        r#"You are an expert research assistant analyzing summaries about "{research_topic}". The current date is {current_date}.

Instructions:
- Identify knowledge gaps or areas that need deeper exploration and generate follow-up queries (one or more).
- If the provided summaries are sufficient to answer the user's question, don't generate follow-up queries.
- If there is a knowledge gap, generate follow-up queries that would help expand your understanding.
- Focus on technical details, implementation specifics, or emerging trends that weren't fully covered.

Requirements:
- Ensure each follow-up query is self-contained and includes necessary context for web search.

Output Format:
- Respond with a JSON object with these exact keys:
  - "is_sufficient": true or false
  - "knowledge_gap": describe what information is missing or needs clarification (empty if sufficient)
  - "follow_up_queries": a list of specific questions to address the gap (empty if sufficient)

Summaries:
{summaries}"#
    )
}

pub fn answer(research_topic: &str, current_date: &str, summaries: &str) -> String {
    format!(
        r#"Generate a high-quality answer to the user's question based on the provided summaries.

Instructions:
- The current date is {current_date}.
- You are the final step of a multi-step research process, don't mention that you are the final step.
- You have access to all the information gathered from the previous steps.
- You have access to the user's question.
- Generate a high-quality answer to the user's question based on the provided summaries and the user's question.
- Include the sources you used from the summaries in the answer correctly, use markdown format (e.g. [apnews](https://vertexaisearch.cloud.google.com/id/1-0)). THIS IS A MUST.

User Context:
- {research_topic}

Summaries:
{summaries}"#
    )
}
