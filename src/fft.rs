//! 2D FFT on [`ndarray`] arrays using `rustfft`
//!
//! Rows and columns are transformed in parallel with `rayon`.

use std::sync::Arc;

use ndarray::{Array2, Axis, Zip};
use rayon::prelude::*;
use rustfft::{num_complex::Complex64, Fft, FftPlanner};

/// Cached forward and inverse plans for a given shape
pub struct Fft2 {
    shape: (usize, usize),
    row_fwd: Arc<dyn Fft<f64>>,
    row_inv: Arc<dyn Fft<f64>>,
    col_fwd: Arc<dyn Fft<f64>>,
    col_inv: Arc<dyn Fft<f64>>,
}
impl Fft2 {
    /// Plans for arrays of `(rows, cols)` elements
    pub fn new(rows: usize, cols: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            shape: (rows, cols),
            row_fwd: planner.plan_fft_forward(cols),
            row_inv: planner.plan_fft_inverse(cols),
            col_fwd: planner.plan_fft_forward(rows),
            col_inv: planner.plan_fft_inverse(rows),
        }
    }
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }
    fn process(
        &self,
        data: &mut Array2<Complex64>,
        row: &Arc<dyn Fft<f64>>,
        col: &Arc<dyn Fft<f64>>,
    ) {
        assert_eq!(data.dim(), self.shape, "FFT plan and data shape mismatch");
        data.axis_iter_mut(Axis(0))
            .into_par_iter()
            .for_each(|mut lane| match lane.as_slice_mut() {
                Some(slice) => row.process(slice),
                None => {
                    let mut buffer = lane.to_vec();
                    row.process(&mut buffer);
                    lane.iter_mut().zip(buffer).for_each(|(x, y)| *x = y);
                }
            });
        data.axis_iter_mut(Axis(1))
            .into_par_iter()
            .for_each(|mut lane| {
                let mut buffer = lane.to_vec();
                col.process(&mut buffer);
                lane.iter_mut().zip(buffer).for_each(|(x, y)| *x = y);
            });
    }
    /// In-place forward transform
    pub fn forward(&self, data: &mut Array2<Complex64>) {
        self.process(data, &self.row_fwd, &self.col_fwd);
    }
    /// In-place inverse transform, normalized
    pub fn inverse(&self, data: &mut Array2<Complex64>) {
        self.process(data, &self.row_inv, &self.col_inv);
        let n = (self.shape.0 * self.shape.1) as f64;
        data.par_mapv_inplace(|x| x / n);
    }
    /// Forward transform of a real array
    pub fn forward_real(&self, data: &Array2<f64>) -> Array2<Complex64> {
        let mut spectrum = data.mapv(|x| Complex64::new(x, 0.));
        self.forward(&mut spectrum);
        spectrum
    }
    /// Real part of the inverse transform
    pub fn inverse_real(&self, mut spectrum: Array2<Complex64>) -> Array2<f64> {
        self.inverse(&mut spectrum);
        spectrum.mapv(|x| x.re)
    }
    /// Circular convolution of `data` with the kernel of transfer function `otf`
    pub fn convolve(&self, data: &Array2<f64>, otf: &Array2<Complex64>) -> Array2<f64> {
        let mut spectrum = self.forward_real(data);
        Zip::from(&mut spectrum).and(otf).for_each(|s, &h| *s *= h);
        self.inverse_real(spectrum)
    }
    /// Circular correlation of `data` with the kernel of transfer function `otf`
    pub fn correlate(&self, data: &Array2<f64>, otf: &Array2<Complex64>) -> Array2<f64> {
        let mut spectrum = self.forward_real(data);
        Zip::from(&mut spectrum).and(otf).for_each(|s, &h| *s *= h.conj());
        self.inverse_real(spectrum)
    }
}

/// Signed frequency index of FFT bin `k` out of `n`
pub fn frequency_index(k: usize, n: usize) -> f64 {
    if k < (n + 1) / 2 {
        k as f64
    } else {
        k as f64 - n as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn forward_inverse() {
        let data = Array2::from_shape_fn((6, 10), |(i, j)| ((i * 10 + j) as f64).sin());
        let fft = Fft2::new(6, 10);
        let back = fft.inverse_real(fft.forward_real(&data));
        Zip::from(&back)
            .and(&data)
            .for_each(|&a, &b| assert_abs_diff_eq!(a, b, epsilon = 1e-12));
    }

    #[test]
    fn dc_term() {
        let data = Array2::from_elem((4, 8), 2.);
        let spectrum = Fft2::new(4, 8).forward_real(&data);
        assert_abs_diff_eq!(spectrum[[0, 0]].re, 64.);
        assert_abs_diff_eq!(spectrum[[1, 3]].norm(), 0., epsilon = 1e-12);
    }

    #[test]
    fn delta_convolution_is_identity() {
        let data = Array2::from_shape_fn((8, 8), |(i, j)| (i + 2 * j) as f64);
        let mut delta = Array2::zeros((8, 8));
        delta[[0, 0]] = 1.;
        let fft = Fft2::new(8, 8);
        let otf = fft.forward_real(&delta);
        let conv = fft.convolve(&data, &otf);
        Zip::from(&conv)
            .and(&data)
            .for_each(|&a, &b| assert_abs_diff_eq!(a, b, epsilon = 1e-10));
    }

    #[test]
    fn frequency_indices() {
        assert_eq!(frequency_index(0, 8), 0.);
        assert_eq!(frequency_index(4, 8), -4.);
        assert_eq!(frequency_index(2, 5), 2.);
        assert_eq!(frequency_index(3, 5), -2.);
    }
}
