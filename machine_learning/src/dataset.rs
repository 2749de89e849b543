use std::num::NonZeroUsize;

use ndarray::{ArrayView2, s};
use rand::Rng;

/// A minimal in-memory supervised dataset.
///
/// Rows are stored contiguously as `[x.., y..]`, so a batch of consecutive
/// rows is a zero-copy view. Deterministic and test-friendly: the same data
/// and the same rng seed reproduce the same epoch.
#[derive(Debug, Clone)]
pub struct Dataset {
    data: Vec<f32>,
    x_size: usize,
    y_size: usize,
    len: usize,
}

impl Dataset {
    /// Creates a new dataset from a flat row-major buffer.
    ///
    /// # Panics
    /// - if `x_size + y_size` is zero
    /// - if `data` is empty or not a whole number of rows
    pub fn new(data: Vec<f32>, x_size: usize, y_size: usize) -> Self {
        let row = x_size + y_size;
        assert!(row > 0, "rows must have at least one column");
        assert!(!data.is_empty(), "dataset must be non-empty");
        assert_eq!(data.len() % row, 0, "data must be a whole number of rows");

        let len = data.len() / row;
        Self {
            data,
            x_size,
            y_size,
            len,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn x_size(&self) -> usize {
        self.x_size
    }

    #[inline]
    pub fn y_size(&self) -> usize {
        self.y_size
    }

    /// Permutes the rows in place (Fisher-Yates).
    pub fn shuffle<R: Rng>(&mut self, rng: &mut R) {
        let row = self.x_size + self.y_size;
        for i in (1..self.len).rev() {
            let j = rng.random_range(0..=i);
            if i != j {
                for k in 0..row {
                    self.data.swap(i * row + k, j * row + k);
                }
            }
        }
    }

    /// Iterates the dataset in batches of up to `batch_size` rows, yielding
    /// `(x, y)` views. The last batch may be smaller.
    pub fn batches(
        &self,
        batch_size: NonZeroUsize,
    ) -> impl Iterator<Item = (ArrayView2<'_, f32>, ArrayView2<'_, f32>)> {
        let row = self.x_size + self.y_size;
        let x_size = self.x_size;
        let len = self.len;
        let view = ArrayView2::from_shape((len, row), &self.data).unwrap();

        (0..len).step_by(batch_size.get()).map(move |start| {
            let end = (start + batch_size.get()).min(len);
            let x = view.slice_move(s![start..end, ..x_size]);
            let y = view.slice_move(s![start..end, x_size..]);
            (x, y)
        })
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn batches_have_expected_shapes() {
        let ds = Dataset::new((0..15).map(|v| v as f32).collect(), 2, 1);
        assert_eq!(ds.len(), 5);

        let batches: Vec<_> = ds.batches(nz(2)).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].0.dim(), (2, 2));
        assert_eq!(batches[0].1.dim(), (2, 1));
        // last batch is the single remaining row
        assert_eq!(batches[2].0.dim(), (1, 2));
        assert_eq!(batches[2].0[[0, 0]], 12.0);
        assert_eq!(batches[2].1[[0, 0]], 14.0);
    }

    #[test]
    fn shuffle_preserves_rows() {
        let mut ds = Dataset::new((0..30).map(|v| v as f32).collect(), 2, 1);
        let mut rng = StdRng::seed_from_u64(7);
        ds.shuffle(&mut rng);

        let mut rows: Vec<Vec<u32>> = ds
            .batches(nz(1))
            .map(|(x, y)| {
                x.iter()
                    .chain(y.iter())
                    .map(|v| v.to_bits())
                    .collect()
            })
            .collect();
        rows.sort();

        let expected: Vec<Vec<u32>> = (0..10)
            .map(|r| (0..3).map(|c| ((r * 3 + c) as f32).to_bits()).collect())
            .collect();
        assert_eq!(rows, expected);
    }
}
