use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use sgd_ctr::app_config::{ModelKind, TrainingConfig};
use sgd_ctr::pipeline;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Training toolkit for LR/FM on sparse data.", long_about = None)]
struct Cli {
    /// lr or fm
    #[clap(short = 'm', long, value_enum, default_value_t = ModelKind::Lr)]
    model: ModelKind,

    /// training file
    #[clap(long, default_value = "../dataset/train.txt")]
    train: PathBuf,

    /// validation file, empty to disable
    #[clap(long, default_value = "../dataset/valid.txt")]
    valid: String,

    /// testing file, empty to disable
    #[clap(long, default_value = "../dataset/test.txt")]
    test: String,

    /// file to save predictions of the testing file, empty to disable
    #[clap(long, default_value = "../data_output/test_pred.txt")]
    test_pred: String,

    /// file to load model, empty to skip loading
    #[clap(short = 'i', long, default_value = "")]
    load: String,

    /// file to save model, empty to skip saving
    #[clap(short = 'o', long, default_value = "../data_output/model.txt")]
    save: String,

    /// learning rate for the linear part
    #[clap(long, default_value_t = 0.1)]
    w_lr: f32,

    /// learning rate for the embedding part
    #[clap(long, default_value_t = 0.1)]
    v_lr: f32,

    /// l2 regularization for the linear part
    #[clap(long, default_value_t = 0.0)]
    w_l2: f32,

    /// l2 regularization for the embedding part
    #[clap(long, default_value_t = 0.0)]
    v_l2: f32,

    /// stddev for embedding initialization
    #[clap(long, default_value_t = 0.001)]
    v_stddev: f32,

    /// number of epochs
    #[clap(short, long, default_value_t = 10)]
    epoch: u32,

    /// batch size for mini-batch SGD
    #[clap(short, long, default_value_t = 64)]
    batch_size: usize,

    /// dim of embedding (FM only)
    #[clap(short = 'k', long, default_value_t = 4)]
    factor: usize,

    /// train thread num
    #[clap(long, default_value_t = 10)]
    tt: u32,

    /// parse thread num
    #[clap(long, default_value_t = 3)]
    pt: u32,

    /// random seed, use with 1 train_thread and 1 parse_thread; -1: no seed
    #[clap(long, default_value_t = -1)]
    seed: i64,

    /// debug logging
    #[clap(short, long)]
    debug: bool,
}

fn non_empty(s: String) -> Option<PathBuf> {
    if s.is_empty() {
        None
    } else {
        Some(PathBuf::from(s))
    }
}

impl From<Cli> for TrainingConfig {
    fn from(cli: Cli) -> Self {
        TrainingConfig {
            model: cli.model,
            train_file: cli.train,
            valid_file: non_empty(cli.valid),
            test_file: non_empty(cli.test),
            test_pred_file: non_empty(cli.test_pred),
            load: non_empty(cli.load),
            save: non_empty(cli.save),
            w_lr: cli.w_lr,
            v_lr: cli.v_lr,
            w_l2: cli.w_l2,
            v_l2: cli.v_l2,
            v_stddev: cli.v_stddev,
            epoch: cli.epoch,
            batch_size: cli.batch_size,
            factor: cli.factor,
            train_thread_num: cli.tt,
            parse_thread_num: cli.pt,
            seed: cli.seed,
            debug: cli.debug,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if cli.debug {
        std::env::set_var("RUST_LOG", "debug");
    } else if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let cfg: TrainingConfig = cli.into();
    if let Err(e) = cfg.validate() {
        error!("{e}");
        return ExitCode::FAILURE;
    }

    info!("**************** config ****************\n{}", cfg.render());

    match pipeline::build_model(&cfg).and_then(|model| pipeline::run(&cfg, model)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
