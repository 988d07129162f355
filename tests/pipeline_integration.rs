use std::io::Write;

use sgd_ctr::app_config::{ModelKind, TrainingConfig};
use sgd_ctr::pipeline;

fn write_dataset(dir: &std::path::Path, name: &str, lines: &[&str]) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    for line in lines {
        writeln!(f, "{line}").unwrap();
    }
    path
}

fn base_config(dir: &std::path::Path, model: ModelKind) -> TrainingConfig {
    TrainingConfig {
        model,
        train_file: dir.join("train.txt"),
        valid_file: None,
        test_file: None,
        test_pred_file: None,
        load: None,
        save: None,
        w_lr: 0.1,
        v_lr: 0.1,
        w_l2: 0.0,
        v_l2: 0.0,
        v_stddev: 0.001,
        epoch: 2,
        batch_size: 4,
        factor: 4,
        train_thread_num: 2,
        parse_thread_num: 2,
        seed: -1,
        debug: false,
    }
}

fn train_lines() -> Vec<&'static str> {
    vec![
        "1 1:1.0 2:0.5",
        "0 1:0.2 3:1.5",
        "1 2:0.9 4:0.3",
        "0 3:0.1 4:0.8",
        "1 1:0.7 3:0.2",
        "0 2:0.3 4:1.1",
    ]
}

#[test]
fn lr_pipeline_trains_saves_and_predicts() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), "train.txt", &train_lines());
    write_dataset(dir.path(), "test.txt", &["0 1:1.0 2:0.5", "1 3:0.3 4:0.7"]);

    let mut cfg = base_config(dir.path(), ModelKind::Lr);
    cfg.save = Some(dir.path().join("model.txt"));
    cfg.test_file = Some(dir.path().join("test.txt"));
    cfg.test_pred_file = Some(dir.path().join("pred.txt"));

    let model = pipeline::build_model(&cfg).unwrap();
    pipeline::run(&cfg, model).unwrap();

    let saved = std::fs::read_to_string(cfg.save.unwrap()).unwrap();
    assert!(saved.starts_with("bias\t"));

    let preds = std::fs::read_to_string(cfg.test_pred_file.unwrap()).unwrap();
    let pred_lines: Vec<&str> = preds.lines().collect();
    assert_eq!(pred_lines.len(), 2);
    for line in &pred_lines {
        let v: f32 = line.parse().unwrap();
        assert!(v >= 0.0 && v <= 1.0);
    }
}

#[test]
fn fm_pipeline_trains_and_saves() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), "train.txt", &train_lines());

    let mut cfg = base_config(dir.path(), ModelKind::Fm);
    cfg.save = Some(dir.path().join("model.txt"));

    let model = pipeline::build_model(&cfg).unwrap();
    pipeline::run(&cfg, model).unwrap();

    let saved = std::fs::read_to_string(cfg.save.unwrap()).unwrap();
    let mut lines = saved.lines();
    assert_eq!(lines.next().unwrap(), "k\t4");
    assert!(lines.next().unwrap().starts_with("bias\t"));
}

#[test]
fn validation_pass_runs_without_error() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), "train.txt", &train_lines());
    write_dataset(dir.path(), "valid.txt", &["1 1:1.0 2:0.5", "0 3:0.2 4:0.9"]);

    let mut cfg = base_config(dir.path(), ModelKind::Lr);
    cfg.epoch = 1;
    cfg.valid_file = Some(dir.path().join("valid.txt"));

    let model = pipeline::build_model(&cfg).unwrap();
    assert!(pipeline::run(&cfg, model).is_ok());
}

#[test]
fn load_of_missing_model_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), "train.txt", &train_lines());

    let mut cfg = base_config(dir.path(), ModelKind::Lr);
    cfg.load = Some(dir.path().join("does_not_exist.txt"));

    assert!(pipeline::build_model(&cfg).is_err());
}

#[test]
fn deterministic_seed_with_single_threads_reproduces_model_file() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), "train.txt", &train_lines());

    let run_once = |out_name: &str| {
        let mut cfg = base_config(dir.path(), ModelKind::Fm);
        cfg.train_thread_num = 1;
        cfg.parse_thread_num = 1;
        cfg.seed = 42;
        cfg.save = Some(dir.path().join(out_name));
        let model = pipeline::build_model(&cfg).unwrap();
        pipeline::run(&cfg, model).unwrap();
        std::fs::read_to_string(dir.path().join(out_name)).unwrap()
    };

    let a = run_once("model_a.txt");
    let b = run_once("model_b.txt");
    assert_eq!(a, b);
}
