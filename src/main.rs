mod cli;

use std::error::Error;
use std::process::ExitCode;

use clap::Parser;
use node2vec_viz::{config::VisualizeConfig, display, display::Target, pipeline};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();
    let result = cli
        .into_config()
        .map_err(|e| -> Box<dyn Error> { format!("invalid configuration: {}", e).into() })
        .and_then(|config| visualize(&config));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {}", e);
            ExitCode::FAILURE
        }
    }
}

fn visualize(config: &VisualizeConfig) -> Result<(), Box<dyn Error>> {
    println!("📂 Loading embedding model: {}", config.model_path.display());
    let (ids, model) = pipeline::load_model(&config.model_path, config.format)?;
    println!(
        "   ✓ {} nodes, {} dimensions",
        model.len(),
        model.vector_size()
    );
    if config.preview > 0 {
        println!("   First nodes: {:?}", model.preview(config.preview));
    }
    println!();

    println!(
        "🔍 Reducing to 2D with t-SNE (perplexity={}, seed={})...",
        config.tsne.perplexity, config.tsne.seed
    );
    let prepared = pipeline::project(&ids, &model, config)?;
    let summary = prepared.summary();
    if summary.perplexity != config.tsne.perplexity {
        println!("   ⚠️  Perplexity lowered to {:.2} for {} nodes", summary.perplexity, summary.nodes);
    }
    println!(
        "   ✓ {} iterations, KL divergence {:.4}",
        summary.iterations, summary.kl_divergence
    );
    for (label, count) in &summary.series {
        println!("   - {}: {} nodes", label, count);
    }
    println!();

    if let Some(path) = &config.export_path {
        pipeline::export_projection(&prepared, config.tsne.seed, path)?;
        println!("💾 Projection saved to: {}", path.display());
    }

    match &config.target {
        Target::File(path) => {
            display::present(&prepared.plot, &config.style, &config.target)?;
            println!("📊 Scatter plot saved to: {}", path.display());
        }
        Target::Window { .. } => {
            println!("🎨 Opening scatter plot...");
            display::present(&prepared.plot, &config.style, &config.target)?;
        }
    }

    Ok(())
}
