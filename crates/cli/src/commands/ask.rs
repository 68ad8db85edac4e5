//! `banter ask`: Answer one question from the terminal.

use banter_agent::{ActivityTracker, Responder};
use banter_knowledge::{IndexConfig, KnowledgeIndex};
use chrono::Utc;
use std::sync::Arc;

pub async fn run(question: String, offline: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;

    let index = if offline {
        Arc::new(KnowledgeIndex::new(IndexConfig::from_config(&config.knowledge)))
    } else {
        super::scan_knowledge(&config).await?
    };

    let provider = super::provider(&config);
    let activity = Arc::new(ActivityTracker::new(Utc::now()));
    let responder = Responder::new(&config, index, provider, activity);

    eprint!("  Thinking...");
    let reply = responder.answer(&question, Utc::now()).await;
    eprint!("\r              \r");

    if !reply.snippets.is_empty() {
        println!("  Knowledge used:");
        for snippet in &reply.snippets {
            println!("    - {snippet}");
        }
        println!();
    }

    println!("{}", reply.text);

    tracing::debug!(
        from_model = reply.from_model,
        before_tokens = reply.budget.before_tokens,
        after_tokens = reply.budget.after_tokens,
        within_budget = reply.budget.within_budget,
        "Answered"
    );

    Ok(())
}
