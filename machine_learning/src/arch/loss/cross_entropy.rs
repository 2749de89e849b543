use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use super::LossFn;

/// Softmax cross-entropy over raw class scores, against one-hot targets.
#[derive(Default, Clone, Copy)]
pub struct SoftmaxCrossEntropy;

impl SoftmaxCrossEntropy {
    /// Returns a new `SoftmaxCrossEntropy`.
    pub fn new() -> Self {
        Self
    }
}

/// Numerically stable row softmax.
fn softmax(logits: ArrayView1<f32>) -> Array1<f32> {
    let max = logits.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
    let exp = logits.mapv(|v| (v - max).exp());
    let sum = exp.sum();
    exp / sum
}

impl LossFn for SoftmaxCrossEntropy {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        let mut total = 0.0;
        for (logits, target) in y_pred.outer_iter().zip(y.outer_iter()) {
            let max = logits.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
            let log_sum = logits.mapv(|v| (v - max).exp()).sum().ln() + max;
            for (&t, &l) in target.iter().zip(logits.iter()) {
                total -= t * (l - log_sum);
            }
        }
        total / y_pred.nrows() as f32
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let n = y_pred.nrows() as f32;
        let mut d = Array2::zeros(y_pred.raw_dim());
        for ((logits, target), mut row) in y_pred
            .outer_iter()
            .zip(y.outer_iter())
            .zip(d.outer_iter_mut())
        {
            let s = softmax(logits);
            for ((dst, &s), &t) in row.iter_mut().zip(s.iter()).zip(target.iter()) {
                *dst = (s - t) / n;
            }
        }
        d
    }
}
