use std::path::Path;

use anyhow::Context;
use dotenv::dotenv;

use balance_sheet_normalizer::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let path = std::env::args()
        .nth(1)
        .context("usage: process_report <spreadsheet>")?;
    let bytes = std::fs::read(&path).with_context(|| format!("reading {}", path))?;
    let file_name = Path::new(&path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("report.xlsx")
        .to_string();

    let store = SqliteReportStore::open(Path::new("reports.db"))?;
    store.seed_taxonomy(&Taxonomy::standard())?;

    let config = ExtractionConfig::from_env()?;
    let backend = GeminiClient::new(&config)?;
    let processor = ReportProcessor::new(backend, &config, store);

    let outcome = processor.process(&file_name, &bytes).await?;

    println!(
        "Report {} ({} positions)",
        outcome.report.id,
        outcome.report.positions.len()
    );
    for position in &outcome.report.positions {
        println!(
            "  {:<32} current={:<12} previous={}",
            position.code,
            position
                .current
                .map_or("null".to_string(), |v| v.to_string()),
            position
                .previous
                .map_or("null".to_string(), |v| v.to_string()),
        );
    }

    if !outcome.excluded.is_empty() {
        println!("\nExcluded claims:");
        for claim in &outcome.excluded {
            println!("  {:<32} {}", claim.label, claim.reason);
        }
    }

    Ok(())
}
