#![cfg(test)]

use std::num::NonZeroUsize;

use ndarray::{Array2, ArrayView2, array};
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    arch::{
        Model, Sequential,
        activations::ActFn,
        layers::Layer,
        loss::{LossFn, Mse, SoftmaxCrossEntropy},
    },
    dataset::Dataset,
    optimization::GradientDescent,
};

fn nz(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

#[test]
fn dense_forward_known_values() {
    let mut model = Sequential::new([Layer::dense((2, 1), None)]);
    // w = [[0.5], [-1.0]], b = [0.25]
    let params = [0.5, -1.0, 0.25];

    let x = array![[2.0, 1.0], [0.0, 4.0]];
    let y = model.forward(&params, x.view()).unwrap();

    assert_eq!(y, array![[0.25], [-3.75]]);
}

#[test]
fn forward_rejects_wrong_param_count() {
    let mut model = Sequential::new([Layer::dense((2, 1), None)]);
    let params = [0.0; 2];

    let x = array![[1.0, 1.0]];
    assert!(model.forward(&params, x.view()).is_err());
}

#[test]
fn softmax_cross_entropy_known_values() {
    let loss_fn = SoftmaxCrossEntropy::new();

    // Uniform logits over 4 classes: loss is ln(4) whatever the target class.
    let y_pred = Array2::zeros((1, 4));
    let y = array![[0.0, 1.0, 0.0, 0.0]];
    let loss = loss_fn.loss(y_pred.view(), y.view());
    assert!((loss - 4.0f32.ln()).abs() < 1e-5);

    // Gradient sums to zero per row and is negative only at the target.
    let d = loss_fn.loss_prime(y_pred.view(), y.view());
    let row_sum: f32 = d.row(0).sum();
    assert!(row_sum.abs() < 1e-6);
    assert!(d[[0, 1]] < 0.0);
    assert!(d[[0, 0]] > 0.0);
}

#[test]
fn and2_gate_convergence() {
    let and2 = [
        0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, //
        1.0, 0.0, 0.0, //
        1.0, 1.0, 1.0, //
    ];

    let mut dataset = Dataset::new(and2.into(), 2, 1);
    let mut model = Sequential::new([
        Layer::dense((2, 3), Some(ActFn::sigmoid(1.0))),
        Layer::dense((3, 1), Some(ActFn::sigmoid(1.0))),
    ]);

    let mut rng = StdRng::seed_from_u64(42);
    let mut params: Vec<f32> = (0..model.size())
        .map(|_| (rand::Rng::random::<f32>(&mut rng) - 0.5) * 2.0)
        .collect();
    let mut grad = vec![0.0; model.size()];
    let mut optimizer = GradientDescent::new(2.0);

    let data = ArrayView2::from_shape((4, 3), &and2).unwrap();
    let (x, y) = data.split_at(ndarray::Axis(1), 2);
    let initial_loss = {
        let y_pred = model.forward(&params, x).unwrap();
        Mse.loss(y_pred.view(), y)
    };

    for _ in 0..2000 {
        dataset.shuffle(&mut rng);
        model
            .backprop(
                &mut params,
                &mut grad,
                &Mse,
                &mut optimizer,
                dataset.batches(nz(4)),
            )
            .unwrap();
    }

    let final_loss = {
        let y_pred = model.forward(&params, x).unwrap();
        Mse.loss(y_pred.view(), y)
    };

    assert!(
        final_loss < initial_loss,
        "loss did not decrease: {initial_loss} -> {final_loss}"
    );
    assert!(final_loss < 0.1, "loss too high: {final_loss}");
}

#[test]
fn classifier_convergence_with_cross_entropy() {
    // Two well-separated 2d clusters, one-hot targets.
    let mut data = Vec::new();
    for i in 0..16 {
        let class = i % 2;
        let base = if class == 0 { 0.0 } else { 1.0 };
        data.extend_from_slice(&[base + 0.01 * i as f32, base]);
        data.extend_from_slice(if class == 0 { &[1.0, 0.0] } else { &[0.0, 1.0] });
    }

    let mut dataset = Dataset::new(data, 2, 2);
    let mut model = Sequential::new([
        Layer::dense((2, 4), Some(ActFn::relu())),
        Layer::dense((4, 2), None),
    ]);

    let mut rng = StdRng::seed_from_u64(7);
    let mut params: Vec<f32> = (0..model.size())
        .map(|_| (rand::Rng::random::<f32>(&mut rng) - 0.5) * 0.5)
        .collect();
    let mut grad = vec![0.0; model.size()];
    let mut optimizer = GradientDescent::new(0.5);

    let mut last = f32::INFINITY;
    for _ in 0..500 {
        dataset.shuffle(&mut rng);
        last = model
            .backprop(
                &mut params,
                &mut grad,
                &SoftmaxCrossEntropy,
                &mut optimizer,
                dataset.batches(nz(8)),
            )
            .unwrap();
    }

    assert!(last < 0.3, "cross-entropy did not converge: {last}");
}
