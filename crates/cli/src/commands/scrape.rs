//! `rustscout scrape`: summarize a page or answer a question about it.

use rustscout_agent::Assistant;

pub async fn run(assistant: &Assistant, url: &str, question: Option<&str>) -> anyhow::Result<()> {
    let outcome = super::render(assistant.scrape(url, question).await).await?;
    super::print_outcome(outcome)
}
