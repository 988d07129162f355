use thiserror::Error;

/// Errors raised while validating CLI/config input, before any worker thread
/// is spawned.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("model must be 'lr' or 'fm', got '{0}'")]
    UnknownModel(String),
    #[error(
        "seed {seed} requires train_thread_num == 1 and parse_thread_num == 1 (got tt={tt}, pt={pt})"
    )]
    SeedRequiresSingleThreaded { seed: i64, tt: u32, pt: u32 },
}

/// Errors raised during training, loading, or prediction.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to load model from {path}: {reason}")]
    ModelParse { path: String, reason: String },
}
