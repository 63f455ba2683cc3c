//! Gaussian PSF parameterized by its full width at half maximum

use ndarray::Array2;

use crate::image::Image;

#[derive(Debug, thiserror::Error)]
pub enum PsfError {
    #[error("FWHM must be finite and positive, found {0:?}")]
    InvalidFwhm([f64; 2]),
    #[error("PSF spacing must be finite and positive, found {0:?}")]
    InvalidSpacing([f64; 2]),
    #[error("no room for a PSF in a {0:?} grid")]
    EmptyGrid((usize, usize)),
}
type Result<T> = std::result::Result<T, PsfError>;

/// FWHM to standard deviation ratio of a Gaussian, `2 sqrt(2 ln 2)`
pub const FWHM_TO_SIGMA: f64 = 2.354_820_045_030_949_3;

/// Isotropic (or elliptical) Gaussian PSF from its FWHM
///
/// By default the PSF is sampled on a 128x128 grid spanning 4x4um. Use
/// [`PsfFromFwhm::on_grid`] to sample it at the spacing of the image it
/// will be applied to.
#[derive(Debug, Clone)]
pub struct PsfFromFwhm {
    /// FWHM (rows, columns) [um]
    fwhm: [f64; 2],
    shape: (usize, usize),
    /// pixel spacing (rows, columns) [um]
    spacing: [f64; 2],
}
impl PsfFromFwhm {
    pub fn new(fwhm: [f64; 2]) -> Result<Self> {
        if fwhm.iter().any(|x| !x.is_finite() || *x <= 0.) {
            return Err(PsfError::InvalidFwhm(fwhm));
        }
        Ok(Self {
            fwhm,
            shape: (128, 128),
            spacing: [4. / 128.; 2],
        })
    }
    /// Samples the PSF at `spacing` on the smallest odd grid covering +/-4 sigma
    ///
    /// The grid is bounded by the largest odd shape fitting in `max_shape`,
    /// the (padded) shape of the image the PSF is applied to.
    pub fn on_grid(self, spacing: [f64; 2], max_shape: (usize, usize)) -> Result<Self> {
        if spacing.iter().any(|x| !x.is_finite() || *x <= 0.) {
            return Err(PsfError::InvalidSpacing(spacing));
        }
        if max_shape.0 == 0 || max_shape.1 == 0 {
            return Err(PsfError::EmptyGrid(max_shape));
        }
        let sigma = self.sigma();
        let max_half = [(max_shape.0 - 1) / 2, (max_shape.1 - 1) / 2];
        let half = |k: usize| {
            let support = (4. * sigma[k] / spacing[k]).ceil();
            if support > max_half[k] as f64 {
                log::warn!(
                    "PSF support of +/-{} px truncated to +/-{} px to fit the {:?} image",
                    support,
                    max_half[k],
                    max_shape
                );
            }
            (support as usize).max(1).min(max_half[k])
        };
        Ok(Self {
            shape: (2 * half(0) + 1, 2 * half(1) + 1),
            spacing,
            ..self
        })
    }
    /// Overrides the grid size
    pub fn shape(self, shape: (usize, usize)) -> Self {
        Self { shape, ..self }
    }
    pub fn fwhm(&self) -> [f64; 2] {
        self.fwhm
    }
    /// Gaussian standard deviations (rows, columns) [um]
    pub fn sigma(&self) -> [f64; 2] {
        self.fwhm.map(|x| x / FWHM_TO_SIGMA)
    }
    /// In-focus PSF, centered and normalized to a unit sum
    pub fn xy(&self) -> Image {
        let (rows, cols) = self.shape;
        let [sy, sx] = self.sigma();
        let [dy, dx] = self.spacing;
        let (cy, cx) = ((rows as f64 - 1.) / 2., (cols as f64 - 1.) / 2.);
        let mut psf = Array2::from_shape_fn((rows, cols), |(i, j)| {
            let y = (i as f64 - cy) * dy;
            let x = (j as f64 - cx) * dx;
            (-0.5 * ((y / sy).powi(2) + (x / sx).powi(2))).exp()
        });
        let sum = psf.sum();
        psf.mapv_inplace(|x| x / sum);
        Image::new(psf, self.spacing)
    }
}
