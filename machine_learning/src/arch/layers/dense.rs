use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2, Axis};

use crate::{MlErr, Result, arch::activations::ActFn};

/// A fully-connected layer over a raw parameter window laid out as the
/// `dim.0 x dim.1` weight matrix followed by the `dim.1` biases.
#[derive(Clone)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: Option<ActFn>,
    size: usize,

    // Forward metadata for the backward pass
    x: Array2<f32>,
    z: Array2<f32>,
}

impl Dense {
    pub fn new(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        let zeros = Array2::zeros((1, 1));

        Self {
            dim,
            size: (dim.0 + 1) * dim.1,
            act_fn,
            x: zeros.clone(),
            z: zeros,
        }
    }

    /// The amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.dim.0 {
            return Err(MlErr::ShapeMismatch {
                what: "dense input",
                got: (x.nrows(), x.ncols()),
                expected: (x.nrows(), self.dim.0),
            });
        }

        let (w, b) = self.view_params(params)?;
        let mut z = x.dot(&w);
        z += &b;

        self.x = x.to_owned();
        self.z = z;

        let out = match &self.act_fn {
            Some(act_fn) => self.z.mapv(|z| act_fn.f(z)),
            None => self.z.clone(),
        };
        Ok(out)
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        mut d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        if let Some(act_fn) = &self.act_fn {
            d.zip_mut_with(&self.z, |d, &z| *d *= act_fn.df(z));
        }

        let (mut dw, mut db) = self.view_grad(grad)?;
        dw.assign(&self.x.t().dot(&d));
        db.assign(&d.sum_axis(Axis(0)));

        let (w, _) = self.view_params(params)?;
        Ok(d.dot(&w.t()))
    }

    /// Gives a view of the raw parameter slice as this layer's weights and
    /// biases.
    fn view_params<'a>(&self, params: &'a [f32]) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        if params.len() != self.size {
            return Err(MlErr::SizeMismatch {
                what: "dense parameter window",
                got: params.len(),
                expected: self.size,
            });
        }

        let w_size = self.size - self.dim.1;
        let w = ArrayView2::from_shape(self.dim, &params[..w_size]).unwrap();
        let b = ArrayView1::from_shape(self.dim.1, &params[w_size..]).unwrap();
        Ok((w, b))
    }

    /// Gives a view of the raw gradient slice as this layer's delta weights
    /// and delta biases.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        if grad.len() != self.size {
            return Err(MlErr::SizeMismatch {
                what: "dense gradient window",
                got: grad.len(),
                expected: self.size,
            });
        }

        let w_size = self.size - self.dim.1;
        let (dw_raw, db_raw) = grad.split_at_mut(w_size);
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw).unwrap();
        let db = ArrayViewMut1::from_shape(self.dim.1, db_raw).unwrap();
        Ok((dw, db))
    }
}
