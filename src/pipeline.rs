use std::io;
use std::thread;
use std::time::Instant;

use log::{debug, info};

use crate::app_config::{ModelKind, TrainingConfig};
use crate::error::TrainError;
use crate::line_reader::LineReader;
use crate::metric::calc_auc;
use crate::model::fm::FactorizationMachine;
use crate::model::lr::LogisticRegression;
use crate::model::Model;
use crate::queue::BoundedQueue;
use crate::sample::{Sample, SampleParser};

const QUEUE_CAPACITY: usize = 100;
const PROGRESS_STEP: u64 = 1_000_000;

/// Builds the configured, as-yet-untrained model, optionally loading
/// existing weights before it is handed off to the concurrent pipeline.
/// A load that parses zero features (malformed header or token count, per
/// spec §7) is reported as a fatal `TrainError::ModelParse`, matching the
/// original `FM::load`/`LR::load` contract where the caller turns a
/// zero-sized load into a hard failure.
pub fn build_model(cfg: &TrainingConfig) -> Result<Box<dyn Model>, TrainError> {
    let mut model: Box<dyn Model> = match cfg.model {
        ModelKind::Lr => Box::new(LogisticRegression::new(cfg.w_lr, cfg.w_l2)),
        ModelKind::Fm => Box::new(FactorizationMachine::new(
            cfg.factor, cfg.w_lr, cfg.v_lr, cfg.w_l2, cfg.v_l2, cfg.v_stddev, cfg.seed,
        )),
    };

    if let Some(load_path) = &cfg.load {
        info!("**************** load model ****************");
        info!("load from {}", load_path.display());
        let t0 = Instant::now();
        let n = model.load(load_path.to_str().unwrap_or_default())?;
        if n == 0 {
            return Err(TrainError::ModelParse {
                path: load_path.display().to_string(),
                reason: "load produced zero features".to_string(),
            });
        }
        info!("finish, num_feat: {}, costs {:.4} secs", n, t0.elapsed().as_secs_f32());
    }

    Ok(model)
}

/// Runs `cfg.epoch` epochs of mini-batch SGD over `cfg.train_file`, each
/// epoch driven by a fresh pair of bounded queues feeding a pool of parser
/// threads and a pool of trainer threads. Optionally validates with AUC
/// after every epoch, saves the model, and scores a held-out test file.
pub fn run(cfg: &TrainingConfig, model: Box<dyn Model>) -> Result<(), TrainError> {
    let mut reader = LineReader::open(&cfg.train_file)?;

    for epoch in 0..cfg.epoch {
        let epoch_start = Instant::now();
        info!("******************************************************");

        let line_queue: BoundedQueue<Vec<Vec<u8>>> = BoundedQueue::new(QUEUE_CAPACITY);
        let sample_queue: BoundedQueue<Vec<Sample>> = BoundedQueue::new(QUEUE_CAPACITY);
        let model_ref = model.as_ref();

        let mut n_sample: u64 = 0;

        thread::scope(|scope| {
            let parse_handles: Vec<_> = (0..cfg.parse_thread_num)
                .map(|i| {
                    let line_queue = &line_queue;
                    let sample_queue = &sample_queue;
                    scope.spawn(move || parse_worker(i, cfg.debug, line_queue, sample_queue))
                })
                .collect();

            let train_handles: Vec<_> = (0..cfg.train_thread_num)
                .map(|i| {
                    let sample_queue = &sample_queue;
                    scope.spawn(move || train_worker(i, cfg.debug, model_ref, sample_queue))
                })
                .collect();

            let mut last_progress = Instant::now();
            let mut batch: Vec<Vec<u8>> = Vec::with_capacity(cfg.batch_size);
            loop {
                let line = reader.next_line().expect("reading training file");
                let line = match line {
                    Some(line) => line,
                    None => break,
                };
                batch.push(line.to_vec());
                if batch.len() == cfg.batch_size {
                    line_queue.push(Some(std::mem::replace(&mut batch, Vec::with_capacity(cfg.batch_size))));
                }
                n_sample += 1;
                if n_sample % PROGRESS_STEP == 0 {
                    info!(
                        "epoch {:4}: {:8} samples, {:.4} secs",
                        epoch,
                        n_sample,
                        last_progress.elapsed().as_secs_f32()
                    );
                    last_progress = Instant::now();
                }
            }
            if !batch.is_empty() {
                line_queue.push(Some(batch));
            }
            for _ in 0..cfg.parse_thread_num {
                line_queue.push(None);
            }
            for h in parse_handles {
                h.join().expect("parse thread panicked");
            }
            for _ in 0..cfg.train_thread_num {
                sample_queue.push(None);
            }
            for h in train_handles {
                h.join().expect("train thread panicked");
            }
        });

        reader.reset()?;

        info!(
            "epoch {:4}, trained on {} samples, costs {:.4} secs",
            epoch,
            n_sample,
            epoch_start.elapsed().as_secs_f32()
        );

        if let Some(valid_file) = &cfg.valid_file {
            validate(valid_file, model.as_ref(), cfg.debug)?;
        }
    }

    if let Some(save_path) = &cfg.save {
        info!("**************** save model ****************");
        info!("save to {}", save_path.display());
        let t0 = Instant::now();
        model.save(save_path.to_str().unwrap_or_default())?;
        info!("finish, costs {:.4} secs", t0.elapsed().as_secs_f32());
    }

    if let (Some(test_file), Some(test_pred_file)) = (&cfg.test_file, &cfg.test_pred_file) {
        predict(test_file, test_pred_file, model.as_ref())?;
    }

    Ok(())
}

fn parse_worker(
    id: u32,
    debug_on: bool,
    line_queue: &BoundedQueue<Vec<Vec<u8>>>,
    sample_queue: &BoundedQueue<Vec<Sample>>,
) {
    loop {
        let lines = match line_queue.pop() {
            Some(lines) => lines,
            None => break,
        };
        let mut samples = Vec::with_capacity(lines.len());
        for line in lines {
            let sample = SampleParser::parse(&line);
            if debug_on {
                debug!("{id}: SAMPLE\t {sample}");
            }
            samples.push(sample);
        }
        sample_queue.push(Some(samples));
    }
    if debug_on {
        debug!("parse thread {id:4} end");
    }
}

fn train_worker(id: u32, debug_on: bool, model: &dyn Model, sample_queue: &BoundedQueue<Vec<Sample>>) {
    loop {
        let samples = match sample_queue.pop() {
            Some(samples) => samples,
            None => break,
        };
        model.learn(&samples);
    }
    if debug_on {
        debug!("train thread {id:4} end");
    }
}

fn validate(valid_file: &std::path::Path, model: &dyn Model, debug_on: bool) -> io::Result<()> {
    let t0 = Instant::now();
    let mut reader = LineReader::open(valid_file)?;
    let mut y_pred = Vec::new();
    let mut y_true = Vec::new();
    while let Some(line) = reader.next_line()? {
        let sample = SampleParser::parse(line);
        let pred = model.predict_prob(&sample);
        if debug_on {
            debug!("PRED {:.4} {}", pred, sample.y);
        }
        y_pred.push(pred);
        y_true.push(sample.y);
    }
    let auc = calc_auc(&y_pred, &y_true);
    info!(
        "{}, {} samples, AUC: {:.6}, costs {:.4} secs",
        valid_file.display(),
        y_pred.len(),
        auc,
        t0.elapsed().as_secs_f32()
    );
    Ok(())
}

fn predict(test_file: &std::path::Path, test_pred_file: &std::path::Path, model: &dyn Model) -> io::Result<()> {
    use std::io::Write;

    info!("**************** predict ****************");
    info!("input: {}", test_file.display());
    info!("output: {}", test_pred_file.display());
    let t0 = Instant::now();

    let mut reader = LineReader::open(test_file)?;
    let out = std::fs::File::create(test_pred_file)?;
    let mut out = std::io::BufWriter::new(out);
    while let Some(line) = reader.next_line()? {
        let sample = SampleParser::parse(line);
        let pred = model.predict_prob(&sample);
        writeln!(out, "{pred}")?;
    }

    info!("finish, costs {:.4} secs", t0.elapsed().as_secs_f32());
    Ok(())
}
