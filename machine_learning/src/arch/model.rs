use ndarray::{Array2, ArrayView2};

use crate::{arch::loss::LossFn, error::Result, optimization::Optimizer};

pub trait Model {
    /// Returns the amount of parameters in the model.
    fn size(&self) -> usize;

    /// Makes a forward pass through the model.
    ///
    /// # Arguments
    /// * `params` - The model's full parameter slice.
    /// * `x` - The input data, one sample per row.
    ///
    /// # Returns
    /// The prediction for the given input or an error if occurred.
    fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>>;

    /// Computes the gradient of the loss function with respect to the
    /// parameters over the provided batches. **`params` gets updated** after
    /// each batch according to the optimization algorithm.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `grad` - A buffer for writing the computed gradient on each batch pass.
    /// * `loss_fn` - The loss function.
    /// * `optimizer` - Dictates how to update the weights on each gradient calculation.
    /// * `batches` - The batches of data.
    ///
    /// # Returns
    /// The mean epoch loss.
    fn backprop<'a, L, O, I>(
        &mut self,
        params: &mut [f32],
        grad: &mut [f32],
        loss_fn: &L,
        optimizer: &mut O,
        batches: I,
    ) -> Result<f32>
    where
        L: LossFn,
        O: Optimizer,
        I: Iterator<Item = (ArrayView2<'a, f32>, ArrayView2<'a, f32>)>;
}
