use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Write};
use std::sync::Mutex;

use log::error;

use super::weight_map::ConcurrentWeightMap;
use super::{sigmoid, Model};
use crate::sample::Sample;

thread_local! {
    /// Per-trainer-thread gradient scratch map, cleared and reused across
    /// batches rather than reallocated (spec §4.5/§5: "Thread-local
    /// reuse… reusable `grad_map`… their lifetime equals the thread's").
    static GRAD_MAP: RefCell<HashMap<u32, f32>> = RefCell::new(HashMap::new());
}

/// Plain logistic regression over a sparse feature vector: `p = sigmoid(bias
/// + sum_i w_i * x_i)`. Weights live in a `ConcurrentWeightMap` so trainer
/// threads can update disjoint (or, racily, overlapping) entries in
/// parallel.
pub struct LogisticRegression {
    lr: f32,
    l2: f32,
    weights: ConcurrentWeightMap<f32>,
    bias: Mutex<f32>,
}

impl LogisticRegression {
    pub fn new(lr: f32, l2: f32) -> Self {
        Self {
            lr,
            l2,
            weights: ConcurrentWeightMap::new(),
            bias: Mutex::new(0.0),
        }
    }

    /// `training = true` makes first sight of a feature materialise a
    /// zero weight entry (so later SGD updates have something to land
    /// on); at inference time an unseen feature simply contributes
    /// nothing to the logit.
    pub fn predict_prob_inner(&self, sample: &Sample, training: bool) -> f32 {
        let mut p = *self.bias.lock().unwrap();
        for &(i, xi) in &sample.x {
            match self.weights.find(i) {
                Some(w) => p += w * xi,
                None => {
                    if training {
                        self.weights.insert_or_assign(i, 0.0);
                    }
                    continue;
                }
            }
        }
        sigmoid(p)
    }

    fn sgd(&self, bias_grad: f32, grad_map: &HashMap<u32, f32>) {
        for (&idx, &val) in grad_map {
            let w = self.weights.find(idx).unwrap_or(0.0);
            self.weights.insert_or_assign(idx, w + self.lr * val);
        }
        *self.bias.lock().unwrap() += self.lr * bias_grad;
    }
}

impl Model for LogisticRegression {
    fn learn(&self, batch: &[Sample]) {
        GRAD_MAP.with(|cell| {
            let mut grad_map = cell.borrow_mut();
            grad_map.clear();

            let size = batch.len() as f32;
            let mut bias_grad = 0.0;

            for sample in batch {
                let p = self.predict_prob_inner(sample, true);
                let t = sample.y as f32 - p;
                for &(i, xi) in &sample.x {
                    let w = self.weights.find(i).unwrap_or(0.0);
                    *grad_map.entry(i).or_insert(0.0) += (t * xi - self.l2 * w) / size;
                }
                bias_grad += t / size;
            }

            self.sgd(bias_grad, &grad_map);
        });
    }

    fn predict_prob(&self, sample: &Sample) -> f32 {
        self.predict_prob_inner(sample, false)
    }

    fn load(&mut self, path: &str) -> io::Result<usize> {
        let file = std::fs::File::open(path)?;
        let mut lines = BufReader::new(file).lines();

        let header = match lines.next() {
            Some(line) => line?,
            None => {
                error!("model parse error.");
                return Ok(0);
            }
        };
        let mut header_fields = header.split('\t');
        let (tag, bias_str) = (header_fields.next(), header_fields.next());
        if tag != Some("bias") {
            error!("model parse error.");
            return Ok(0);
        }
        let bias: f32 = match bias_str.and_then(|s| s.parse().ok()) {
            Some(b) => b,
            None => {
                error!("model parse error.");
                return Ok(0);
            }
        };
        *self.bias.lock().unwrap() = bias;

        for line in lines {
            let line = line?;
            let mut fields = line.split('\t');
            let (idx, val) = (fields.next(), fields.next());
            let (idx, val) = match (idx.and_then(|s| s.parse::<u32>().ok()), val.and_then(|s| s.parse::<f32>().ok())) {
                (Some(idx), Some(val)) => (idx, val),
                _ => continue,
            };
            self.weights.insert(idx, val);
        }

        Ok(self.weights.size())
    }

    fn save(&self, path: &str) -> io::Result<()> {
        let file = std::fs::File::create(path)?;
        let mut w = std::io::BufWriter::new(file);
        writeln!(w, "bias\t{}", *self.bias.lock().unwrap())?;
        let mut err = None;
        self.weights.locked_scan(|idx, val| {
            if err.is_none() {
                if let Err(e) = writeln!(w, "{}\t{}", idx, val) {
                    err = Some(e);
                }
            }
        });
        if let Some(e) = err {
            return Err(e);
        }
        Ok(())
    }
}
