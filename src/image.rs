/*!
# Image container

A single channel 2D image, a [`ndarray::Array2`] of `f64` pixels indexed by
(row, column), and its physical pixel spacing in micrometers.

TIFF input and output live in [`read`] and [`write`].
*/

use std::{fmt, path::PathBuf};

use itertools::{Itertools, MinMaxResult};
use ndarray::Array2;

pub mod read;
pub mod write;

pub use read::get_image;
pub use write::{ImageWriter, TiffImageWriter};

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("failed to open {1:?}")]
    Open(#[source] std::io::Error, PathBuf),
    #[error("failed to decode TIFF file {1:?}")]
    Decode(#[source] tiff::TiffError, PathBuf),
    #[error("failed to encode TIFF file {1:?}")]
    Encode(#[source] tiff::TiffError, PathBuf),
    #[error("failed to create {1:?}")]
    Create(#[source] std::io::Error, PathBuf),
    #[error("unsupported TIFF sample format in {0:?}")]
    SampleFormat(PathBuf),
    #[error("channel #{0} is not available ({1} channels)")]
    Channel(usize, usize),
    #[error("the TIFF data size does not match its {0}x{1} dimensions")]
    Shape(u32, u32),
    #[error("image is empty")]
    Empty,
}
pub type Result<T> = std::result::Result<T, ImageError>;

/// 2D image with physical pixel spacing
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    data: Array2<f64>,
    /// pixel spacing (rows, columns) [um]
    spacing: [f64; 2],
}
impl Image {
    pub fn new(data: Array2<f64>, spacing: [f64; 2]) -> Self {
        Self { data, spacing }
    }
    /// Image with unit spacing
    pub fn from_array(data: Array2<f64>) -> Self {
        Self::new(data, [1f64; 2])
    }
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }
    pub fn spacing(&self) -> [f64; 2] {
        self.spacing
    }
    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn min(&self) -> f64 {
        self.data.iter().cloned().fold(f64::INFINITY, f64::min)
    }
    pub fn max(&self) -> f64 {
        self.data.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
    }
    pub fn mean(&self) -> f64 {
        self.data.mean().unwrap_or_default()
    }
    pub fn sum(&self) -> f64 {
        self.data.sum()
    }
    /// Returns a copy of the image with its minimum removed, the copy is non-negative
    pub fn subtract_min(&self) -> Self {
        let min = self.min();
        Self {
            data: self.data.mapv(|x| x - min),
            spacing: self.spacing,
        }
    }
}
impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (rows, cols) = self.shape();
        write!(
            f,
            "{}x{} image, spacing [{:.4}, {:.4}]um",
            rows, cols, self.spacing[0], self.spacing[1]
        )
    }
}

/// Percentile of the sorted values with linear interpolation between ranks
fn percentile(sorted: &[f64], percent: f64) -> f64 {
    let rank = (percent / 100.) * (sorted.len() - 1) as f64;
    let (lo, hi) = (rank.floor() as usize, rank.ceil() as usize);
    let w = rank - lo as f64;
    sorted[lo] * (1. - w) + sorted[hi] * w
}

/// Stretches the image contrast to [0,1]
///
/// `percent_saturated` percent of the pixels, split evenly between the dark and
/// the bright ends of the histogram, are clipped.
pub fn enhance_contrast(image: &Image, percent_saturated: f64) -> Result<Image> {
    if image.is_empty() {
        return Err(ImageError::Empty);
    }
    let mut sorted: Vec<f64> = image.data.iter().cloned().collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let half = 0.5 * percent_saturated.clamp(0., 100.);
    let (lo, hi) = (percentile(&sorted, half), percentile(&sorted, 100. - half));
    let (lo, hi) = if hi > lo {
        (lo, hi)
    } else {
        match image.data.iter().minmax() {
            MinMaxResult::MinMax(&min, &max) if max > min => (min, max),
            _ => return Ok(Image::new(Array2::zeros(image.shape()), image.spacing)),
        }
    };
    let range = hi - lo;
    Ok(Image::new(
        image.data.mapv(|x| ((x - lo) / range).clamp(0., 1.)),
        image.spacing,
    ))
}
