use std::path::PathBuf;

use clap::Parser;

use node2vec_viz::config::{
    VisualizeConfig, DEFAULT_MODEL_PATH, DEFAULT_PREVIEW, DEFAULT_TITLE, DEFAULT_X_LABEL,
    DEFAULT_Y_LABEL,
};
use node2vec_viz::data::PrefixClassifier;
use node2vec_viz::display::Target;
use node2vec_viz::model::ModelFormat;
use node2vec_viz::tsne::{Initialization, LearningRate, TsneConfig};

/// Every option can also be set through its `NODE2VEC_VIZ_*` variable.
/// With nothing set, the run loads `node2vec_full.model` and opens the plot.
#[derive(Parser, Debug)]
#[command(
    name = "node2vec-viz",
    about = "t-SNE scatter plot of Node2Vec chemical/protein embeddings",
    version
)]
pub struct Cli {
    /// Embedding artifact (word2vec text, word2vec binary or JSON)
    #[arg(value_name = "MODEL", env = "NODE2VEC_VIZ_MODEL", default_value = DEFAULT_MODEL_PATH)]
    pub model: PathBuf,

    /// Artifact layout
    #[arg(long, value_enum, env = "NODE2VEC_VIZ_FORMAT", default_value_t = ModelFormat::Auto)]
    pub format: ModelFormat,

    /// t-SNE perplexity (must be below the node count)
    #[arg(long, env = "NODE2VEC_VIZ_PERPLEXITY", default_value_t = 30.0)]
    pub perplexity: f64,

    /// Lower the perplexity automatically for small models
    #[arg(long, env = "NODE2VEC_VIZ_ADAPT_PERPLEXITY")]
    pub adapt_perplexity: bool,

    /// Random seed for initialisation
    #[arg(long, env = "NODE2VEC_VIZ_SEED", default_value_t = 42)]
    pub seed: u64,

    /// Maximum optimisation iterations (at least 250)
    #[arg(long, env = "NODE2VEC_VIZ_MAX_ITER", default_value_t = 1000)]
    pub max_iter: usize,

    /// Fixed learning rate instead of the size-based default
    #[arg(long, env = "NODE2VEC_VIZ_LEARNING_RATE")]
    pub learning_rate: Option<f64>,

    /// Initial layout
    #[arg(long, value_enum, env = "NODE2VEC_VIZ_INIT", default_value_t = Initialization::Pca)]
    pub init: Initialization,

    /// Identifier prefix of chemical nodes
    #[arg(long, env = "NODE2VEC_VIZ_CHEMICAL_PREFIX", default_value = "CID")]
    pub chemical_prefix: String,

    /// Label for nodes with the prefix
    #[arg(long, env = "NODE2VEC_VIZ_CHEMICAL_LABEL", default_value = "Chemical")]
    pub chemical_label: String,

    /// Label for all other nodes
    #[arg(long, env = "NODE2VEC_VIZ_OTHER_LABEL", default_value = "Protein")]
    pub other_label: String,

    /// Figure title
    #[arg(long, env = "NODE2VEC_VIZ_TITLE", default_value = DEFAULT_TITLE)]
    pub title: String,

    /// Write the figure to this PNG instead of opening a viewer
    #[arg(short, long, value_name = "FILE", env = "NODE2VEC_VIZ_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Image viewer command (platform opener if omitted)
    #[arg(long, env = "NODE2VEC_VIZ_VIEWER")]
    pub viewer: Option<String>,

    /// Also save the 2D coordinates as JSON
    #[arg(long, value_name = "FILE", env = "NODE2VEC_VIZ_EXPORT")]
    pub export: Option<PathBuf>,

    /// How many identifiers to echo after loading
    #[arg(long, env = "NODE2VEC_VIZ_PREVIEW", default_value_t = DEFAULT_PREVIEW)]
    pub preview: usize,
}

impl Cli {
    pub fn into_config(self) -> Result<VisualizeConfig, String> {
        let target = match self.output {
            Some(path) => Target::File(path),
            None => Target::Window {
                viewer: self.viewer,
            },
        };

        let config = VisualizeConfig {
            model_path: self.model,
            format: self.format,
            tsne: TsneConfig {
                perplexity: self.perplexity,
                seed: self.seed,
                max_iter: self.max_iter,
                learning_rate: self
                    .learning_rate
                    .map_or(LearningRate::Auto, LearningRate::Fixed),
                init: self.init,
                adapt_perplexity: self.adapt_perplexity,
                ..TsneConfig::default()
            },
            classifier: PrefixClassifier::new(
                self.chemical_prefix,
                self.chemical_label,
                self.other_label,
            ),
            title: self.title,
            x_label: DEFAULT_X_LABEL.to_string(),
            y_label: DEFAULT_Y_LABEL.to_string(),
            target,
            export_path: self.export,
            preview: self.preview,
            ..VisualizeConfig::default()
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_arguments_reproduces_default_run() {
        let cli = Cli::try_parse_from(["node2vec-viz"]).unwrap();
        let config = cli.into_config().unwrap();
        assert_eq!(config, VisualizeConfig::default());
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "node2vec-viz",
            "embeddings.bin",
            "--format",
            "binary",
            "--perplexity",
            "5",
            "--seed",
            "7",
            "--init",
            "random",
            "--learning-rate",
            "200",
            "--output",
            "tsne.png",
        ])
        .unwrap();
        let config = cli.into_config().unwrap();

        assert_eq!(config.model_path, PathBuf::from("embeddings.bin"));
        assert_eq!(config.format, ModelFormat::Word2VecBinary);
        assert_eq!(config.tsne.perplexity, 5.0);
        assert_eq!(config.tsne.seed, 7);
        assert_eq!(config.tsne.init, Initialization::Random);
        assert_eq!(config.tsne.learning_rate, LearningRate::Fixed(200.0));
        assert_eq!(config.target, Target::File(PathBuf::from("tsne.png")));
    }

    #[test]
    fn test_invalid_classifier_is_rejected() {
        let cli = Cli::try_parse_from([
            "node2vec-viz",
            "--chemical-label",
            "Node",
            "--other-label",
            "Node",
        ])
        .unwrap();
        assert!(cli.into_config().is_err());
    }
}
