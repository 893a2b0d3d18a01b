//! Probe command implementation.
//!
//! Scrapes every configured endpoint and prints the outcome, without
//! starting the HTTP server.

use anyhow::bail;
use prometheus::{Encoder, TextEncoder};

use crate::config::Config;
use crate::state::build_exporters;

/// Scrapes each configured path `iterations` times.
///
/// Fails if any scrape in the last iteration did not succeed.
pub async fn command_probe(iterations: usize, verbose: bool, config: &Config) -> anyhow::Result<()> {
    println!("🧪 Generic JSON Exporter - Probe Mode");
    println!("=====================================");
    println!("Target: {}", config.uri());

    let exporters = build_exporters(config).await?;
    let encoder = TextEncoder::new();
    let mut failed = Vec::new();

    for iteration in 1..=iterations.max(1) {
        println!("\n🔄 Iteration {}/{}:", iteration, iterations.max(1));
        failed.clear();

        for exporter in &exporters {
            let collection = exporter.collect().await;
            let marker = if collection.outcome.is_success() { "✅" } else { "❌" };
            println!(
                "   {} {} [{}] cluster='{}': {} in {:.2}ms",
                marker,
                exporter.endpoint().path(),
                exporter.subsystem(),
                exporter.cluster_name(),
                collection.outcome,
                collection.duration.as_secs_f64() * 1000.0
            );

            if !collection.outcome.is_success() {
                failed.push(exporter.endpoint().path().to_string());
            }

            if verbose {
                let mut buffer = Vec::new();
                encoder.encode(&collection.families, &mut buffer)?;
                print!("{}", String::from_utf8_lossy(&buffer));
            }
        }
    }

    if !failed.is_empty() {
        bail!("scrape failed for: {}", failed.join(", "));
    }

    println!("\n✅ Probe completed successfully");
    Ok(())
}
