use ndarray::{Array2, ArrayView2};

use super::{Model, layers::Layer, loss::LossFn};
use crate::{MlErr, Result, optimization::Optimizer};

/// A sequential model: information flows forward when computing an output and
/// backward when computing the *deltas* of its layers.
///
/// Each layer owns a window of the flat parameter slice, in declaration order.
pub struct Sequential {
    layers: Vec<Layer>,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        Self {
            layers: layers.into_iter().collect(),
        }
    }

    fn check_params(&self, what: &'static str, len: usize) -> Result<()> {
        let expected = self.size();
        if len != expected {
            return Err(MlErr::SizeMismatch {
                what,
                got: len,
                expected,
            });
        }
        Ok(())
    }
}

impl Model for Sequential {
    fn size(&self) -> usize {
        self.layers.iter().map(|layer| layer.size()).sum()
    }

    fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_params("model parameters", params.len())?;

        let mut out = x.to_owned();
        let mut offset = 0;
        for layer in &mut self.layers {
            let size = layer.size();
            out = layer.forward(&params[offset..offset + size], out.view())?;
            offset += size;
        }

        Ok(out)
    }

    // NOTE: getting the exact epoch loss would require forwarding over all
    // batches again once the updates are done; the mean of the per-batch
    // losses is a good approximation.
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
        I: Iterator<Item = (ArrayView2<'a, f32>, ArrayView2<'a, f32>)>,
    {
        self.check_params("gradient buffer", grad.len())?;

        let mut total_loss = 0.0;
        let mut num_batches = 0;

        for (x, y) in batches {
            grad.fill(0.0);

            let y_pred = self.forward(params, x)?;
            total_loss += loss_fn.loss(y_pred.view(), y);
            num_batches += 1;

            let mut d = loss_fn.loss_prime(y_pred.view(), y);
            let mut offset = self.size();
            for layer in self.layers.iter_mut().rev() {
                let size = layer.size();
                offset -= size;
                d = layer.backward(
                    &params[offset..offset + size],
                    &mut grad[offset..offset + size],
                    d,
                )?;
            }

            optimizer.update_params(params, grad);
        }

        if num_batches == 0 {
            return Ok(0.0);
        }
        Ok(total_loss / num_batches as f32)
    }
}
