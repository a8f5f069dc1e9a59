//! `rustscout search`: answer from web search results.

use rustscout_agent::Assistant;

pub async fn run(assistant: &Assistant, query: &str) -> anyhow::Result<()> {
    let outcome = super::render(assistant.search(query).await).await?;
    super::print_outcome(outcome)
}
