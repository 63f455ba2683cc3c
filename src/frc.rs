/*!
# Fourier ring correlation

Resolution of a single image from the correlation of its two checkerboard
sub-images, see [`calculate_single_image_frc`].

The measurements of a restoration run are kept in [`FrcMeasurements`], a
two-slot record of the resolution before (`0`) and after (`1`) deconvolution.
*/

use std::{
    ops::Index,
    path::{Path, PathBuf},
};

use crate::{image::Image, options::DeconvolutionOptions, options::ThresholdCriterion};

mod analysis;
pub mod fit;
mod ring;
pub use analysis::{first_crossing, threshold, FourierCorrelationAnalysis, FrcResolution};
pub use ring::{
    checkerboard_split, hamming_window, reverse_checkerboard_split, Correlation,
    FourierRingCorrelation,
};

#[derive(Debug, thiserror::Error)]
pub enum FrcError {
    #[error("images shapes do not match: {0:?} vs {1:?}")]
    Shape((usize, usize), (usize, usize)),
    #[error("FRC requires square images, found {0}x{1}")]
    NotSquare(usize, usize),
    #[error("{0}x{1} image is too small for FRC")]
    TooSmall(usize, usize),
    #[error("FRC curves of different lengths: {0} vs {1}")]
    Mismatch(usize, usize),
    #[error("FRC curve with {0} points is too short to analyze")]
    TooShort(usize),
    #[error("FRC curve fitting failed: {0}")]
    Fit(String),
    #[error("the FRC curve never crosses the {0} threshold")]
    NoCrossing(ThresholdCriterion),
    #[error("measurement slot #{0} does not exist, expected 0 (before) or 1 (after)")]
    Slot(usize),
    #[error("failed to write FRC curve to {1:?}")]
    Csv(#[source] csv::Error, PathBuf),
}
pub type Result<T> = std::result::Result<T, FrcError>;

/// Empirical cut-off correction of single image FRC
///
/// The checkerboard sub-images are offset by one pixel, which lowers their
/// correlation at high frequencies. The correction, a function of the
/// normalized crossing frequency, rescales the resolution accordingly.
pub fn cut_off_correction(frequency: f64) -> f64 {
    const PARAMS: [f64; 4] = [0.95988146, 0.97979108, 13.90441896, 0.55146136];
    let [a, b, c, d] = PARAMS;
    a * (c * (frequency - b)).exp() + d
}

/// FRC curve and the resolution derived from it
#[derive(Debug, Clone)]
pub struct FourierCorrelationData {
    pub correlation: Correlation,
    pub resolution: FrcResolution,
}
impl FourierCorrelationData {
    /// Resolution [um]
    pub fn resolution(&self) -> f64 {
        self.resolution.resolution
    }
    /// Writes the FRC curve to a CSV file
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let csv_err = |e| FrcError::Csv(e, path.to_path_buf());
        let mut wtr = csv::Writer::from_path(path).map_err(csv_err)?;
        for record in self.correlation.records() {
            wtr.serialize(record).map_err(csv_err)?;
        }
        wtr.flush()
            .map_err(|e| FrcError::Csv(e.into(), path.to_path_buf()))?;
        Ok(())
    }
}

/// Single image FRC
///
/// The image is Hamming windowed (unless `disable_hamming` is set) and split
/// twice into checkerboard sub-images. The two FRC curves are averaged and
/// analyzed, then the resolution is corrected for the sub-sampling.
pub fn calculate_single_image_frc(
    image: &Image,
    options: &DeconvolutionOptions,
) -> Result<FourierCorrelationData> {
    let image = if options.disable_hamming {
        image.clone()
    } else {
        hamming_window(image)
    };

    let (image1, image2) = checkerboard_split(&image);
    let frc = FourierRingCorrelation::new(&image1, &image2, options.bin_delta).execute()?;
    let (image1, image2) = reverse_checkerboard_split(&image);
    let reverse_frc =
        FourierRingCorrelation::new(&image1, &image2, options.bin_delta).execute()?;
    let correlation = frc.average(&reverse_frc)?;

    let mut resolution =
        FourierCorrelationAnalysis::new(&correlation, image.spacing()[0], options).execute()?;
    let correction = cut_off_correction(resolution.resolution_point.0);
    resolution.resolution /= correction;
    resolution.spacing /= correction;
    log::info!(
        "single image FRC resolution: {:.4}um (cut-off correction: {:.3})",
        resolution.resolution,
        correction
    );
    Ok(FourierCorrelationData {
        correlation,
        resolution,
    })
}

/// Resolution measurements before and after restoration
#[derive(Debug, Clone, Default)]
pub struct FrcMeasurements {
    before: Option<FourierCorrelationData>,
    after: Option<FourierCorrelationData>,
}
impl FrcMeasurements {
    pub const BEFORE: usize = 0;
    pub const AFTER: usize = 1;

    pub fn new() -> Self {
        Default::default()
    }
    /// Stores a measurement in slot 0 (before) or 1 (after), replacing the previous one
    pub fn insert(&mut self, slot: usize, data: FourierCorrelationData) -> Result<()> {
        match slot {
            Self::BEFORE => self.before = Some(data),
            Self::AFTER => self.after = Some(data),
            _ => return Err(FrcError::Slot(slot)),
        }
        Ok(())
    }
    pub fn get(&self, slot: usize) -> Option<&FourierCorrelationData> {
        match slot {
            Self::BEFORE => self.before.as_ref(),
            Self::AFTER => self.after.as_ref(),
            _ => None,
        }
    }
    pub fn before(&self) -> Option<&FourierCorrelationData> {
        self.before.as_ref()
    }
    pub fn after(&self) -> Option<&FourierCorrelationData> {
        self.after.as_ref()
    }
    /// Number of filled slots
    pub fn len(&self) -> usize {
        self.iter().count()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Filled slots in (before, after) order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &FourierCorrelationData)> {
        [self.before.as_ref(), self.after.as_ref()]
            .into_iter()
            .enumerate()
            .filter_map(|(i, data)| data.map(|data| (i, data)))
    }
}
impl Index<usize> for FrcMeasurements {
    type Output = FourierCorrelationData;

    fn index(&self, slot: usize) -> &Self::Output {
        self.get(slot)
            .unwrap_or_else(|| panic!("no FRC measurement in slot #{slot}"))
    }
}
