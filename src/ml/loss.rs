// ============================================================
// Layer 5 — Triplet Margin Loss
// ============================================================
//   d(x, y) = ‖x − y + ε‖₂
//   L       = mean( max(d(a, p) − d(a, n) + margin, 0) )
//
// The loss is zero once every negative is at least `margin`
// farther from its anchor than the positive is.
//
// Reference: Schroff et al. (2015) FaceNet

use burn::prelude::*;

const PAIRWISE_EPS: f64 = 1e-6;

#[derive(Config, Debug)]
pub struct TripletLossConfig {
    #[config(default = 1.0)]
    pub margin: f64,
}

impl TripletLossConfig {
    pub fn init(&self) -> TripletLoss {
        TripletLoss { margin: self.margin }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TripletLoss {
    pub margin: f64,
}

pub struct TripletOutput<B: Backend> {
    /// Scalar loss, shape [1]
    pub loss:          Tensor<B, 1>,
    pub dist_positive: Tensor<B, 1>,
    pub dist_negative: Tensor<B, 1>,
}

impl TripletLoss {
    pub fn forward<B: Backend>(
        &self,
        anchor:   Tensor<B, 2>,
        positive: Tensor<B, 2>,
        negative: Tensor<B, 2>,
    ) -> TripletOutput<B> {
        let dist_positive = pairwise_distance(anchor.clone(), positive);
        let dist_negative = pairwise_distance(anchor, negative);
        let loss = (dist_positive.clone() - dist_negative.clone())
            .add_scalar(self.margin)
            .clamp_min(0.0)
            .mean();
        TripletOutput { loss, dist_positive, dist_negative }
    }
}

impl<B: Backend> TripletOutput<B> {
    /// Triplets where the positive is strictly closer than the negative.
    pub fn correct_count(&self) -> usize {
        triplet_correct(self.dist_positive.clone(), self.dist_negative.clone())
    }
}

/// Number of triplets with d(a, p) < d(a, n)
pub fn triplet_correct<B: Backend>(dist_positive: Tensor<B, 1>, dist_negative: Tensor<B, 1>) -> usize {
    dist_positive
        .lower(dist_negative)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>() as usize
}

/// Row-wise Euclidean distance: [N, D] × [N, D] → [N]
pub fn pairwise_distance<B: Backend>(x: Tensor<B, 2>, y: Tensor<B, 2>) -> Tensor<B, 1> {
    (x - y)
        .add_scalar(PAIRWISE_EPS)
        .powf_scalar(2.0)
        .sum_dim(1)
        .sqrt()
        .flatten::<1>(0, 1)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn t(rows: Vec<[f32; 2]>) -> Tensor<TestBackend, 2> {
        let n = rows.len();
        let flat: Vec<f32> = rows.into_iter().flatten().collect();
        Tensor::from_data(TensorData::new(flat, [n, 2]), &Default::default())
    }

    fn scalar(x: Tensor<TestBackend, 1>) -> f32 {
        x.into_scalar().elem::<f32>()
    }

    #[test]
    fn test_identical_embeddings_cost_exactly_the_margin() {
        let loss = TripletLossConfig::new().with_margin(0.5).init();
        let out  = loss.forward(t(vec![[1.0, 2.0]]), t(vec![[1.0, 2.0]]), t(vec![[1.0, 2.0]]));
        assert_abs_diff_eq!(scalar(out.loss.clone()), 0.5, epsilon = 1e-6);
        assert_eq!(out.correct_count(), 0);
    }

    #[test]
    fn test_well_separated_negative_costs_nothing() {
        let loss = TripletLossConfig::new().init();
        let out  = loss.forward(t(vec![[0.0, 0.0]]), t(vec![[0.0, 0.0]]), t(vec![[10.0, 0.0]]));
        assert_abs_diff_eq!(scalar(out.loss.clone()), 0.0, epsilon = 1e-6);
        assert_eq!(out.correct_count(), 1);
    }

    #[test]
    fn test_loss_value_and_batch_mean() {
        let loss = TripletLossConfig::new().init();
        // row 0: d_ap = 5, d_an = 1 → 5 − 1 + 1 = 5
        // row 1: d_ap = 0, d_an = 10 → clamped to 0
        let out = loss.forward(
            t(vec![[0.0, 0.0], [0.0, 0.0]]),
            t(vec![[3.0, 4.0], [0.0, 0.0]]),
            t(vec![[0.0, 1.0], [10.0, 0.0]]),
        );
        assert_abs_diff_eq!(scalar(out.loss.clone()), 2.5, epsilon = 1e-4);
        assert_eq!(out.correct_count(), 1);
    }

    #[test]
    fn test_pairwise_distance() {
        let d: Vec<f32> = pairwise_distance(t(vec![[0.0, 0.0], [1.0, 1.0]]), t(vec![[3.0, 4.0], [1.0, 1.0]]))
            .into_data()
            .to_vec()
            .unwrap();
        assert_abs_diff_eq!(d[0], 5.0, epsilon = 1e-4);
        assert_abs_diff_eq!(d[1], 0.0, epsilon = 1e-4);
    }
}
