/*!
# Microscopy image restoration

Restores a 2D fluorescence micrograph by Richardson-Lucy deconvolution with a
Gaussian PSF whose FWHM is the single image Fourier ring correlation (FRC)
resolution of the micrograph, then measures the FRC resolution again.

The [`Restoration`] builder runs the whole workflow, the modules expose each step.
*/

pub mod deconvolution;
pub mod error;
pub mod fetch;
pub mod fft;
pub mod frc;
pub mod image;
pub mod options;
pub mod pipeline;
pub mod plot;
pub mod psf;

pub use error::{Error, Result};
pub use frc::{calculate_single_image_frc, FourierCorrelationData, FrcMeasurements};
pub use image::Image;
pub use options::DeconvolutionOptions;
pub use pipeline::{Restoration, RestorationReport};
pub use psf::PsfFromFwhm;
