// Concurrent mini-batch SGD trainer for sparse logistic regression and
// factorization-machine click-through-rate models.

pub mod app_config;
pub mod error;
pub mod line_reader;
pub mod metric;
pub mod model;
pub mod pipeline;
pub mod queue;
pub mod sample;
