/// Sort-based ROC-AUC over a batch of predictions and their true labels.
/// Ties are not rank-averaged — a stable sort by prediction ascending
/// assigns each item its position in that order, exactly matching the
/// original `std::sort` + positional-rank implementation.
///
/// Panics if the two slices differ in length, mirroring the original's
/// `assert`.
pub fn calc_auc(y_pred: &[f32], y_true: &[u32]) -> f64 {
    assert_eq!(
        y_pred.len(),
        y_true.len(),
        "length of y_pred not equal to length of y_true"
    );

    let mut order: Vec<usize> = (0..y_pred.len()).collect();
    order.sort_by(|&a, &b| y_pred[a].partial_cmp(&y_pred[b]).unwrap());

    let mut pos_num = 0.0_f64;
    let mut pos_rank_sum = 0.0_f64;
    for (rank, &i) in order.iter().enumerate() {
        let rank = (rank + 1) as f64;
        if y_true[i] == 1 {
            pos_num += 1.0;
            pos_rank_sum += rank;
        }
    }

    let total = y_pred.len() as f64;
    (pos_rank_sum - pos_num * (pos_num + 1.0) / 2.0) / (pos_num * (total - pos_num))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_ranking_gives_auc_one() {
        let pred = [0.1, 0.2, 0.8, 0.9];
        let truth = [0, 0, 1, 1];
        assert_eq!(calc_auc(&pred, &truth), 1.0);
    }

    #[test]
    fn worst_ranking_gives_auc_zero() {
        let pred = [0.9, 0.8, 0.2, 0.1];
        let truth = [0, 0, 1, 1];
        assert_eq!(calc_auc(&pred, &truth), 0.0);
    }

    #[test]
    fn matches_worked_example() {
        // One inversion (the positive at 0.35 outranks the negative at
        // 0.4): sorted ascending gives positive ranks 2 and 4, so
        // AUC = (6 - 3) / (2 * 2) = 0.75.
        let pred = [0.1, 0.4, 0.35, 0.8];
        let truth = [0, 0, 1, 1];
        let auc = calc_auc(&pred, &truth);
        assert!((auc - 0.75).abs() < 1e-12);
    }

    #[test]
    #[should_panic]
    fn mismatched_lengths_panics() {
        calc_auc(&[0.1, 0.2], &[0]);
    }
}
