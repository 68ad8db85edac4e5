//! `banter search`: Show what the retriever finds for a query.

use banter_knowledge::{RetrievalConfig, RetrievalQuery, Retriever, formatter_from_locale};
use chrono::Utc;

pub async fn run(query: String, limit: Option<usize>, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let index = super::scan_knowledge(&config).await?;

    let retriever = Retriever::new(
        RetrievalConfig::from_config(&config.knowledge),
        formatter_from_locale(&config.locale),
    );
    let mut request = RetrievalQuery::from_config(query, &config.knowledge);
    if let Some(k) = limit {
        request.k = k;
    }

    let snapshot = index.current_snapshot();
    let snippets = retriever.retrieve(&snapshot, &request, Utc::now());

    if json {
        println!("{}", serde_json::to_string_pretty(&snippets)?);
        return Ok(());
    }

    if snippets.is_empty() {
        println!("  No matches (min score {}).", request.min_score);
    }
    for (rank, snippet) in snippets.iter().enumerate() {
        println!("  {:>2}. {snippet}", rank + 1);
    }

    Ok(())
}
