//! The load → extract → reduce → plot sequence.
//!
//! Each stage consumes the whole output of the previous one. The stages are
//! separate functions so the binary can report progress between them.

use std::path::Path;

use tracing::info;

use crate::config::VisualizeConfig;
use crate::data::{extract, ExtractedData};
use crate::error::VizError;
use crate::export::ProjectionExport;
use crate::model::{EmbeddingModel, ModelFormat};
use crate::plotting::{group_by_label, ScatterPlot};
use crate::tsne::{Embedding2d, Tsne};

/// Everything computed before the figure is shown.
#[derive(Debug, Clone)]
pub struct PreparedPlot {
    pub data: ExtractedData,
    pub embedding: Embedding2d,
    pub plot: ScatterPlot,
}

/// Node counts and t-SNE statistics of a prepared plot.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub nodes: usize,
    pub dimensions: usize,
    /// `(label, point count)` per series, in drawing order
    pub series: Vec<(String, usize)>,
    pub perplexity: f64,
    pub iterations: usize,
    pub kl_divergence: f64,
}

impl PreparedPlot {
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            nodes: self.data.len(),
            dimensions: self.data.dimensions(),
            series: self
                .plot
                .series
                .iter()
                .map(|s| (s.label.clone(), s.points.len()))
                .collect(),
            perplexity: self.embedding.perplexity,
            iterations: self.embedding.iterations,
            kl_divergence: self.embedding.kl_divergence,
        }
    }

    pub fn to_export(&self, seed: u64) -> ProjectionExport {
        ProjectionExport {
            ids: self.data.ids.clone(),
            labels: self.data.labels.clone(),
            points: self.embedding.points.clone(),
            perplexity: self.embedding.perplexity,
            seed,
            kl_divergence: self.embedding.kl_divergence,
        }
    }
}

/// Ordered identifiers plus the model that serves their vectors.
pub fn load_model(path: &Path, format: ModelFormat) -> Result<(Vec<String>, EmbeddingModel), VizError> {
    let model = EmbeddingModel::load_with_format(path, format)?;
    Ok((model.index_to_key().to_vec(), model))
}

/// Extract, reduce and group; everything short of drawing.
pub fn project(
    ids: &[String],
    model: &EmbeddingModel,
    config: &VisualizeConfig,
) -> Result<PreparedPlot, VizError> {
    config.validate().map_err(VizError::Config)?;

    let data = extract(ids, model, &config.classifier)?;
    info!(nodes = data.len(), dimensions = data.dimensions(), "extracted vectors");

    let embedding = Tsne::new(config.tsne.clone()).fit_transform(&data.matrix)?;

    let series = group_by_label(&embedding.points, &data.labels)?;
    let plot = ScatterPlot::new(
        config.title.clone(),
        config.x_label.clone(),
        config.y_label.clone(),
        series,
    );

    Ok(PreparedPlot {
        data,
        embedding,
        plot,
    })
}

pub fn export_projection(prepared: &PreparedPlot, seed: u64, path: &Path) -> Result<(), VizError> {
    prepared.to_export(seed).save_json(path)?;
    info!(path = %path.display(), "projection exported");
    Ok(())
}
