//! FRC curve fitting
//!
//! The raw ring correlation is noisy, the resolution is read off a fitted
//! curve evaluated on an oversampled frequency grid.

use nalgebra::{DMatrix, DVector};

use super::{FrcError, Result};
use crate::options::CurveFitType;

/// Natural cubic spline through `(x, y)` knots
#[derive(Debug, Clone)]
pub struct CubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    // second derivatives at the knots
    m: Vec<f64>,
}
impl CubicSpline {
    /// Interpolating spline, `x` must be strictly increasing
    pub fn new(x: &[f64], y: &[f64]) -> Result<Self> {
        let n = x.len();
        if n < 2 || y.len() != n {
            return Err(FrcError::Fit(format!("{} knots for {} values", n, y.len())));
        }
        if x.windows(2).any(|w| w[1] <= w[0]) {
            return Err(FrcError::Fit("knots are not strictly increasing".into()));
        }
        let mut m = vec![0f64; n];
        if n > 2 {
            // Thomas algorithm on the interior knots
            let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
            let k = n - 2;
            let mut diag = vec![0f64; k];
            let mut rhs = vec![0f64; k];
            for i in 0..k {
                diag[i] = 2. * (h[i] + h[i + 1]);
                rhs[i] = 6. * ((y[i + 2] - y[i + 1]) / h[i + 1] - (y[i + 1] - y[i]) / h[i]);
            }
            for i in 1..k {
                let w = h[i] / diag[i - 1];
                diag[i] -= w * h[i];
                rhs[i] -= w * rhs[i - 1];
            }
            m[k] = rhs[k - 1] / diag[k - 1];
            for i in (0..k - 1).rev() {
                m[i + 1] = (rhs[i] - h[i + 1] * m[i + 2]) / diag[i];
            }
        }
        Ok(Self {
            x: x.to_vec(),
            y: y.to_vec(),
            m,
        })
    }
    pub fn eval(&self, t: f64) -> f64 {
        let n = self.x.len();
        let i = match self.x.partition_point(|&x| x <= t) {
            0 => 0,
            p if p >= n => n - 2,
            p => p - 1,
        };
        let h = self.x[i + 1] - self.x[i];
        let a = (self.x[i + 1] - t) / h;
        let b = (t - self.x[i]) / h;
        a * self.y[i]
            + b * self.y[i + 1]
            + ((a.powi(3) - a) * self.m[i] + (b.powi(3) - b) * self.m[i + 1]) * h * h / 6.
    }
}

/// Whittaker-Henderson smoother with a second difference penalty of weight `lambda`
pub fn whittaker_smooth(y: &[f64], lambda: f64) -> Result<Vec<f64>> {
    let n = y.len();
    if n < 3 || lambda <= 0. {
        return Ok(y.to_vec());
    }
    let d = DMatrix::from_fn(n - 2, n, |i, j| match j as isize - i as isize {
        0 | 2 => 1.,
        1 => -2.,
        _ => 0.,
    });
    let a = DMatrix::identity(n, n) + d.transpose() * &d * lambda;
    let z = a
        .cholesky()
        .ok_or_else(|| FrcError::Fit("smoothing system is not positive definite".into()))?
        .solve(&DVector::from_column_slice(y));
    Ok(z.as_slice().to_vec())
}

/// Least-squares polynomial coefficients, lowest degree first
pub fn polyfit(x: &[f64], y: &[f64], degree: usize) -> Result<Vec<f64>> {
    let degree = degree.min(x.len().saturating_sub(1));
    let vander = DMatrix::from_fn(x.len(), degree + 1, |i, j| x[i].powi(j as i32));
    vander
        .svd(true, true)
        .solve(&DVector::from_column_slice(y), 1e-12)
        .map(|c| c.as_slice().to_vec())
        .map_err(|e| FrcError::Fit(e.to_string()))
}

pub fn polyval(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0f64, |s, c| s * x + c)
}

/// Evenly spaced grid from `x[0]` to `x[n-1]` with `oversampling` points per interval
pub fn oversample(x: &[f64], oversampling: usize) -> Vec<f64> {
    match (x.first(), x.last()) {
        (Some(&first), Some(&last)) if x.len() > 1 => {
            let n = (x.len() - 1) * oversampling;
            (0..=n)
                .map(|i| first + (last - first) * i as f64 / n as f64)
                .collect()
        }
        _ => x.to_vec(),
    }
}

/// Linear interpolation of `(x, y)` at `t`, clamped to the end values
pub fn interp(x: &[f64], y: &[f64], t: f64) -> f64 {
    let i = x.partition_point(|&x| x <= t);
    if i == 0 {
        return y[0];
    }
    if i >= x.len() {
        return y[y.len() - 1];
    }
    let w = (t - x[i - 1]) / (x[i] - x[i - 1]);
    y[i - 1] * (1. - w) + y[i] * w
}

/// Fits the correlation curve and evaluates the fit at `grid`
pub fn fit_curve(
    fit_type: CurveFitType,
    frequency: &[f64],
    correlation: &[f64],
    grid: &[f64],
    degree: usize,
    smoothing: f64,
) -> Result<Vec<f64>> {
    match fit_type {
        CurveFitType::SmoothSpline => {
            let smoothed = whittaker_smooth(correlation, smoothing)?;
            let spline = CubicSpline::new(frequency, &smoothed)?;
            Ok(grid.iter().map(|&t| spline.eval(t)).collect())
        }
        CurveFitType::Spline => {
            let spline = CubicSpline::new(frequency, correlation)?;
            Ok(grid.iter().map(|&t| spline.eval(t)).collect())
        }
        CurveFitType::Polynomial => {
            let coefficients = polyfit(frequency, correlation, degree)?;
            Ok(grid.iter().map(|&t| polyval(&coefficients, t)).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn spline_interpolates_knots() {
        let x: Vec<f64> = (0..8).map(|i| i as f64 * 0.5).collect();
        let y: Vec<f64> = x.iter().map(|x| x.sin()).collect();
        let spline = CubicSpline::new(&x, &y).unwrap();
        x.iter()
            .zip(&y)
            .for_each(|(&x, &y)| assert_abs_diff_eq!(spline.eval(x), y, epsilon = 1e-12));
        assert_abs_diff_eq!(spline.eval(1.25), 1.25f64.sin(), epsilon = 1e-2);
    }

    #[test]
    fn spline_of_a_line_is_the_line() {
        let x = [0., 1., 3., 4.];
        let y = [1., 3., 7., 9.];
        let spline = CubicSpline::new(&x, &y).unwrap();
        assert_abs_diff_eq!(spline.eval(2.), 5., epsilon = 1e-12);
    }

    #[test]
    fn spline_rejects_unsorted_knots() {
        assert!(CubicSpline::new(&[0., 2., 1.], &[0., 0., 0.]).is_err());
    }

    #[test]
    fn smoother_keeps_lines() {
        let y: Vec<f64> = (0..20).map(|i| 2. - 0.1 * i as f64).collect();
        let z = whittaker_smooth(&y, 100.).unwrap();
        y.iter()
            .zip(&z)
            .for_each(|(&a, &b)| assert_abs_diff_eq!(a, b, epsilon = 1e-9));
    }

    #[test]
    fn smoother_reduces_noise() {
        let y: Vec<f64> = (0..50).map(|i| if i % 2 == 0 { 1. } else { -1. }).collect();
        let z = whittaker_smooth(&y, 10.).unwrap();
        let energy = |v: &[f64]| v.iter().map(|x| x * x).sum::<f64>();
        assert!(energy(&z) < 0.1 * energy(&y));
    }

    #[test]
    fn polynomial_fit() {
        let x: Vec<f64> = (0..10).map(|i| i as f64 / 9.).collect();
        let y: Vec<f64> = x.iter().map(|x| 1. - 2. * x + 0.5 * x * x).collect();
        let c = polyfit(&x, &y, 2).unwrap();
        assert_abs_diff_eq!(c[0], 1., epsilon = 1e-9);
        assert_abs_diff_eq!(c[1], -2., epsilon = 1e-9);
        assert_abs_diff_eq!(c[2], 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(polyval(&c, 0.5), 0.125, epsilon = 1e-9);
    }

    #[test]
    fn grid_and_interpolation() {
        let grid = oversample(&[0., 0.5, 1.], 10);
        assert_eq!(grid.len(), 21);
        assert_abs_diff_eq!(grid[20], 1.);
        assert_abs_diff_eq!(interp(&[0., 1.], &[2., 4.], 0.25), 2.5);
        assert_eq!(interp(&[0., 1.], &[2., 4.], 3.), 4.);
    }
}
