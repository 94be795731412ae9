use std::path::PathBuf;

use crate::data::PrefixClassifier;
use crate::display::Target;
use crate::model::ModelFormat;
use crate::plotting::PlotStyle;
use crate::tsne::TsneConfig;

pub const DEFAULT_MODEL_PATH: &str = "node2vec_full.model";
pub const DEFAULT_TITLE: &str = "t-SNE of Node2Vec Embeddings";
pub const DEFAULT_X_LABEL: &str = "t-SNE 1";
pub const DEFAULT_Y_LABEL: &str = "t-SNE 2";
pub const DEFAULT_PREVIEW: usize = 10;

/// Everything one visualization run needs.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualizeConfig {
    pub model_path: PathBuf,
    pub format: ModelFormat,
    pub tsne: TsneConfig,
    pub classifier: PrefixClassifier,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub style: PlotStyle,
    pub target: Target,
    /// Also write the projection as JSON
    pub export_path: Option<PathBuf>,
    /// Number of identifiers echoed after loading
    pub preview: usize,
}

impl Default for VisualizeConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            format: ModelFormat::Auto,
            tsne: TsneConfig::default(),
            classifier: PrefixClassifier::default(),
            title: DEFAULT_TITLE.to_string(),
            x_label: DEFAULT_X_LABEL.to_string(),
            y_label: DEFAULT_Y_LABEL.to_string(),
            style: PlotStyle::default(),
            target: Target::default(),
            export_path: None,
            preview: DEFAULT_PREVIEW,
        }
    }
}

impl VisualizeConfig {
    /// Checks that do not depend on the model contents.
    pub fn validate(&self) -> Result<(), String> {
        if self.classifier.prefix.is_empty() {
            return Err("classifier prefix must not be empty".to_string());
        }
        if self.classifier.matched == self.classifier.unmatched {
            return Err(format!(
                "both categories are labelled '{}'",
                self.classifier.matched
            ));
        }
        if !(0.0..=1.0).contains(&self.style.alpha) {
            return Err(format!("alpha must be within [0, 1], got {}", self.style.alpha));
        }
        if self.style.width == 0 || self.style.height == 0 {
            return Err(format!(
                "figure size must be non-zero, got {}x{}",
                self.style.width, self.style.height
            ));
        }
        if self.style.marker_size == 0 {
            return Err("marker size must be positive".to_string());
        }
        Ok(())
    }
}
