use super::{
    fit::{fit_curve, interp, oversample},
    Correlation, FrcError, Result,
};
use crate::options::{DeconvolutionOptions, ThresholdCriterion};

/// Oversampling of the frequency grid the fitted curves are evaluated on
const OVERSAMPLING: usize = 10;

/// Resolution read from a FRC curve
#[derive(Debug, Clone)]
pub struct FrcResolution {
    /// resolution [um]
    pub resolution: f64,
    /// pixel spacing the resolution was derived from [um]
    pub spacing: f64,
    /// (frequency, correlation) where the fitted curve crosses the threshold
    pub resolution_point: (f64, f64),
    pub criterion: ThresholdCriterion,
    /// oversampled frequency grid
    pub grid: Vec<f64>,
    /// fitted correlation on the grid
    pub curve_fit: Vec<f64>,
    /// threshold on the grid
    pub threshold: Vec<f64>,
}

/// Threshold value of a criterion for a ring of `n` Fourier samples
pub fn threshold(criterion: ThresholdCriterion, n: f64, options: &DeconvolutionOptions) -> f64 {
    let sqrt_n = n.max(1.).sqrt();
    match criterion {
        ThresholdCriterion::Fixed => options.resolution_threshold_value,
        ThresholdCriterion::OneBit => (0.5 + 2.4142 / sqrt_n) / (1.5 + 1.4142 / sqrt_n),
        ThresholdCriterion::HalfBit => (0.2071 + 1.9102 / sqrt_n) / (1.2071 + 0.9102 / sqrt_n),
        ThresholdCriterion::Snr => {
            let snr = options.resolution_snr_value;
            let two_sqrt_snr = 2. * snr.sqrt();
            (snr + two_sqrt_snr / sqrt_n + 1. / sqrt_n) / (snr + two_sqrt_snr / sqrt_n + 1.)
        }
    }
}

/// First downward crossing of `curve` through `threshold`, linearly interpolated
pub fn first_crossing(grid: &[f64], curve: &[f64], threshold: &[f64]) -> Option<(f64, f64)> {
    (1..grid.len()).find_map(|i| {
        let d0 = curve[i - 1] - threshold[i - 1];
        let d1 = curve[i] - threshold[i];
        (d0 >= 0. && d1 < 0.).then(|| {
            let t = d0 / (d0 - d1);
            (
                grid[i - 1] + t * (grid[i] - grid[i - 1]),
                curve[i - 1] + t * (curve[i] - curve[i - 1]),
            )
        })
    })
}

/// Fits a correlation curve and finds where it crosses the resolution threshold
pub struct FourierCorrelationAnalysis<'a> {
    correlation: &'a Correlation,
    spacing: f64,
    options: &'a DeconvolutionOptions,
}
impl<'a> FourierCorrelationAnalysis<'a> {
    pub fn new(
        correlation: &'a Correlation,
        spacing: f64,
        options: &'a DeconvolutionOptions,
    ) -> Self {
        Self {
            correlation,
            spacing,
            options,
        }
    }
    pub fn execute(&self) -> Result<FrcResolution> {
        let Correlation {
            frequency,
            correlation,
            points,
        } = self.correlation;
        if frequency.len() < 3 {
            return Err(FrcError::TooShort(frequency.len()));
        }
        let options = self.options;
        let criterion = options.resolution_threshold_criterion;

        let grid = oversample(frequency, OVERSAMPLING);
        let curve_fit = fit_curve(
            options.frc_curve_fit_type,
            frequency,
            correlation,
            &grid,
            options.frc_curve_fit_degree,
            options.frc_smoothing,
        )?;
        let points: Vec<f64> = points.iter().map(|&n| n as f64).collect();
        let threshold_curve: Vec<f64> = grid
            .iter()
            .map(|&f| threshold(criterion, interp(frequency, &points, f), options))
            .collect();

        let resolution_point =
            first_crossing(&grid, &curve_fit, &threshold_curve)
                .ok_or(FrcError::NoCrossing(criterion))?;
        if resolution_point.0 <= 0. {
            return Err(FrcError::NoCrossing(criterion));
        }
        let resolution = 2. * self.spacing / resolution_point.0;
        log::debug!(
            "FRC {} crossing at {:.4} (correlation {:.4}): {:.4}um",
            criterion,
            resolution_point.0,
            resolution_point.1,
            resolution
        );
        Ok(FrcResolution {
            resolution,
            spacing: self.spacing,
            resolution_point,
            criterion,
            grid,
            curve_fit,
            threshold: threshold_curve,
        })
    }
}
