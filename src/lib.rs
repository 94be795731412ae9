//! Load Node2Vec embeddings, project them to 2D with t-SNE and plot chemical
//! versus protein nodes.

pub mod config;
pub mod data;
pub mod display;
pub mod error;
pub mod export;
pub mod model;
pub mod pipeline;
pub mod plotting;
pub mod tsne;

pub use config::VisualizeConfig;
pub use error::VizError;
pub use pipeline::{PreparedPlot, RunSummary};
