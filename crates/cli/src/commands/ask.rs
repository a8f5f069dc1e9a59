//! `rustscout ask`: one conversation turn.

use rustscout_agent::Assistant;

pub async fn run(assistant: &Assistant, text: &str) -> anyhow::Result<()> {
    let outcome = super::render(assistant.converse(text).await).await?;
    super::print_outcome(outcome)
}
