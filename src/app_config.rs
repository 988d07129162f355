use crate::error::ConfigError;
use std::path::PathBuf;

/// Which sparse model kernel to train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ModelKind {
    Lr,
    Fm,
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelKind::Lr => write!(f, "lr"),
            ModelKind::Fm => write!(f, "fm"),
        }
    }
}

/// Resolved, validated training configuration. Built from the parsed CLI
/// flags (see `src/main.rs`); mirrors the `Config` struct in the original
/// `main.cpp`, one field per flag in spec §6.
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub model: ModelKind,
    pub train_file: PathBuf,
    pub valid_file: Option<PathBuf>,
    pub test_file: Option<PathBuf>,
    pub test_pred_file: Option<PathBuf>,
    pub load: Option<PathBuf>,
    pub save: Option<PathBuf>,
    pub w_lr: f32,
    pub v_lr: f32,
    pub w_l2: f32,
    pub v_l2: f32,
    pub v_stddev: f32,
    pub epoch: u32,
    pub batch_size: usize,
    pub factor: usize,
    pub train_thread_num: u32,
    pub parse_thread_num: u32,
    pub seed: i64,
    pub debug: bool,
}

impl TrainingConfig {
    /// Validates cross-field constraints not expressible via `clap` alone:
    /// model must be `lr`/`fm` (already guaranteed by `ModelKind` parsing,
    /// kept here for parity with the original `check_args`), and a fixed
    /// seed requires single-threaded parsing and training so that training
    /// order, and therefore the PRNG draw sequence, is reproducible.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.seed != -1 && !(self.train_thread_num == 1 && self.parse_thread_num == 1) {
            return Err(ConfigError::SeedRequiresSingleThreaded {
                seed: self.seed,
                tt: self.train_thread_num,
                pt: self.parse_thread_num,
            });
        }
        Ok(())
    }

    /// Renders the configuration as a padded `field: value` block, mirroring
    /// `Config::str()` in the original `main.cpp`'s startup banner.
    pub fn render(&self) -> String {
        let mut out = String::new();
        macro_rules! line {
            ($name:expr, $val:expr) => {
                out.push_str(&format!("{:>20}: {}\n", $name, $val));
            };
        }
        line!("model", self.model);
        line!("train_file", self.train_file.display());
        line!(
            "valid_file",
            self.valid_file.as_ref().map(|p| p.display().to_string()).unwrap_or_default()
        );
        line!(
            "test_file",
            self.test_file.as_ref().map(|p| p.display().to_string()).unwrap_or_default()
        );
        line!(
            "test_pred_file",
            self.test_pred_file.as_ref().map(|p| p.display().to_string()).unwrap_or_default()
        );
        line!("load", self.load.as_ref().map(|p| p.display().to_string()).unwrap_or_default());
        line!("save", self.save.as_ref().map(|p| p.display().to_string()).unwrap_or_default());
        line!("w_lr", self.w_lr);
        line!("v_lr", self.v_lr);
        line!("w_l2", self.w_l2);
        line!("v_l2", self.v_l2);
        line!("v_stddev", self.v_stddev);
        line!("epoch", self.epoch);
        line!("batch_size", self.batch_size);
        line!("factor", self.factor);
        line!("train_thread_num", self.train_thread_num);
        line!("parse_thread_num", self.parse_thread_num);
        line!("seed", self.seed);
        line!("debug", self.debug);
        out
    }
}
