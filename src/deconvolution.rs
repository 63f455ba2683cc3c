/*!
# Richardson-Lucy deconvolution

FFT based Richardson-Lucy with optional total variation regularization.

```rust,no_run
use frc_restore::{deconvolution::DeconvolutionRL, image::TiffImageWriter, DeconvolutionOptions};
# fn run(image: frc_restore::Image, psf: frc_restore::Image) -> Result<(), Box<dyn std::error::Error>> {
let options = DeconvolutionOptions::script(50)?;
let writer = TiffImageWriter::new("Temp");
let mut task = DeconvolutionRL::new(image, psf, Some(&writer), &options)?;
task.execute()?;
let result = task.get_result();
# Ok(())
# }
```
*/

use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{s, Array2, Zip};
use rustfft::num_complex::Complex64;

use crate::{
    fft::Fft2,
    image::{Image, ImageError, ImageWriter},
    options::{DeconvolutionOptions, FirstEstimate},
};

#[derive(Debug, thiserror::Error)]
pub enum DeconvolutionError {
    #[error("image and PSF spacings differ: {0:?} vs {1:?}")]
    SpacingMismatch([f64; 2], [f64; 2]),
    #[error("the {0:?} PSF does not fit in the {1:?} padded image")]
    PsfTooLarge((usize, usize), (usize, usize)),
    #[error("block-wise deconvolution is not supported (blocks={0}), use a single block")]
    Blocks(usize),
    #[error("the image to deconvolve has negative pixels, subtract its minimum first")]
    Negative,
    #[error("image is empty")]
    Empty,
    #[error("failed to write a deconvolution estimate")]
    Write(#[from] ImageError),
}
type Result<T> = std::result::Result<T, DeconvolutionError>;

/// Blurred values below this are treated as zero in the RL ratio
const EPSILON: f64 = 1e-12;

/// Reflects index `k` into `0..n` without repeating the edge samples
fn reflect(k: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n as isize - 1);
    let k = k.rem_euclid(period);
    if k < n as isize {
        k as usize
    } else {
        (period - k) as usize
    }
}

/// Reflective padding of `pad` pixels on each side
pub fn pad_reflect(data: &Array2<f64>, pad: usize) -> Array2<f64> {
    let (rows, cols) = data.dim();
    Array2::from_shape_fn((rows + 2 * pad, cols + 2 * pad), |(i, j)| {
        data[[
            reflect(i as isize - pad as isize, rows),
            reflect(j as isize - pad as isize, cols),
        ]]
    })
}

/// Optical transfer function of a PSF for an image of the given shape
///
/// The PSF is zero padded and circularly shifted so that its center lands on
/// the origin.
pub fn psf_to_otf(fft: &Fft2, psf: &Array2<f64>) -> Array2<Complex64> {
    let shape = fft.shape();
    let (rows, cols) = shape;
    let (p_rows, p_cols) = psf.dim();
    let (cy, cx) = (p_rows / 2, p_cols / 2);
    let mut kernel = Array2::<f64>::zeros(shape);
    Zip::indexed(psf).for_each(|(i, j), &v| {
        kernel[[(i + rows - cy) % rows, (j + cols - cx) % cols]] += v;
    });
    fft.forward_real(&kernel)
}

/// Divergence of the normalized gradient, the total variation term
fn tv_divergence(estimate: &Array2<f64>) -> Array2<f64> {
    let (rows, cols) = estimate.dim();
    let mut nx = Array2::<f64>::zeros((rows, cols));
    let mut ny = Array2::<f64>::zeros((rows, cols));
    Zip::indexed(&mut ny)
        .and(&mut nx)
        .for_each(|(i, j), ny, nx| {
            let u = estimate[[i, j]];
            let gy = if i + 1 < rows { estimate[[i + 1, j]] - u } else { 0. };
            let gx = if j + 1 < cols { estimate[[i, j + 1]] - u } else { 0. };
            let norm = (gx * gx + gy * gy + EPSILON).sqrt();
            *ny = gy / norm;
            *nx = gx / norm;
        });
    Array2::from_shape_fn((rows, cols), |(i, j)| {
        let dy = if i > 0 { ny[[i, j]] - ny[[i - 1, j]] } else { ny[[i, j]] };
        let dx = if j > 0 { nx[[i, j]] - nx[[i, j - 1]] } else { nx[[i, j]] };
        dx + dy
    })
}

/// Richardson-Lucy deconvolution task
pub struct DeconvolutionRL<'a> {
    image: Image,
    psf: Image,
    writer: Option<&'a dyn ImageWriter>,
    options: &'a DeconvolutionOptions,
    result: Option<Image>,
    /// relative change of the estimate at each iteration
    history: Vec<f64>,
}
impl<'a> DeconvolutionRL<'a> {
    /// Checks the inputs and sets up the task
    ///
    /// The image must be non-negative and sampled like the PSF.
    pub fn new(
        image: Image,
        psf: Image,
        writer: Option<&'a dyn ImageWriter>,
        options: &'a DeconvolutionOptions,
    ) -> Result<Self> {
        if image.is_empty() || psf.is_empty() {
            return Err(DeconvolutionError::Empty);
        }
        if options.blocks != 1 {
            return Err(DeconvolutionError::Blocks(options.blocks));
        }
        let (si, sp) = (image.spacing(), psf.spacing());
        if si
            .iter()
            .zip(&sp)
            .any(|(a, b)| (a - b).abs() > 1e-6 * a.abs().max(b.abs()))
        {
            return Err(DeconvolutionError::SpacingMismatch(si, sp));
        }
        let (rows, cols) = image.shape();
        let padded = (rows + 2 * options.pad, cols + 2 * options.pad);
        if psf.shape().0 > padded.0 || psf.shape().1 > padded.1 {
            return Err(DeconvolutionError::PsfTooLarge(psf.shape(), padded));
        }
        if image.min() < 0. {
            return Err(DeconvolutionError::Negative);
        }
        Ok(Self {
            image,
            psf,
            writer,
            options,
            result: None,
            history: Vec::new(),
        })
    }
    fn write(&self, name: &str, image: &Image) -> Result<()> {
        if let Some(writer) = self.writer {
            writer.write(name, image)?;
        }
        Ok(())
    }
    /// Crops the padding off an estimate
    fn crop(&self, estimate: &Array2<f64>) -> Image {
        let pad = self.options.pad;
        let (rows, cols) = self.image.shape();
        Image::new(
            estimate
                .slice(s![pad..pad + rows, pad..pad + cols])
                .to_owned(),
            self.image.spacing(),
        )
    }
    /// Runs `max_nof_iterations` Richardson-Lucy iterations
    pub fn execute(&mut self) -> Result<()> {
        let options = self.options;
        let observed = pad_reflect(self.image.data(), options.pad);
        let (rows, cols) = observed.dim();
        let fft = Fft2::new(rows, cols);
        let otf = psf_to_otf(&fft, self.psf.data());

        let mut estimate = match options.first_estimate {
            FirstEstimate::Image => observed.clone(),
            FirstEstimate::Blurred => fft.convolve(&observed, &otf),
            FirstEstimate::Constant => Array2::from_elem((rows, cols), observed.mean().unwrap_or_default()),
        };
        log::info!(
            "Richardson-Lucy: {} iterations on {}x{} ({} estimate, tv-lambda={})",
            options.max_nof_iterations,
            rows,
            cols,
            options.first_estimate,
            options.tv_lambda
        );

        let pb = ProgressBar::new(options.max_nof_iterations as u64);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message("Richardson-Lucy");

        self.history.clear();
        for i in 0..options.max_nof_iterations {
            let blurred = fft.convolve(&estimate, &otf);
            let mut ratio = observed.clone();
            Zip::from(&mut ratio).and(&blurred).for_each(|r, &b| {
                *r = if b > EPSILON { *r / b } else { 0. };
            });
            let correction = fft.correlate(&ratio, &otf);

            let mut update = &estimate * &correction;
            if options.tv_lambda > 0. {
                let div = tv_divergence(&estimate);
                Zip::from(&mut update).and(&div).for_each(|u, &d| {
                    let denominator = 1. - options.tv_lambda * d;
                    if denominator > EPSILON {
                        *u /= denominator;
                    }
                });
            }
            update.mapv_inplace(|x| x.max(0.));

            let total = estimate.sum();
            let change = Zip::from(&update)
                .and(&estimate)
                .fold(0f64, |s, &a, &b| s + (a - b).abs());
            let tau = if total > 0. { change / total } else { 0. };
            log::debug!("iteration #{:03}: relative change {:.6e}", i + 1, tau);
            self.history.push(tau);
            estimate = update;

            if options.save_intermediate_results {
                let name = format!("rl_estimate_{:03}", i + 1);
                self.write(&name, &self.crop(&estimate))?;
            }
            pb.inc(1);
        }
        pb.finish_with_message("Richardson-Lucy complete");

        let result = self.crop(&estimate);
        self.write(&format!("result_rl_{}", options.max_nof_iterations), &result)?;
        self.result = Some(result);
        Ok(())
    }
    /// The deconvolved image, once [`DeconvolutionRL::execute`] has run
    pub fn get_result(&self) -> Option<&Image> {
        self.result.as_ref()
    }
    pub fn into_result(self) -> Option<Image> {
        self.result
    }
    /// Relative change of the estimate at each iteration
    pub fn history(&self) -> &[f64] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{image::TiffImageWriter, psf::PsfFromFwhm};
    use approx::assert_abs_diff_eq;

    fn options(extra: &[&str]) -> DeconvolutionOptions {
        let mut args = vec!["image", "psf"];
        args.extend_from_slice(extra);
        DeconvolutionOptions::from_args_list(args).unwrap()
    }

    /// Two point sources blurred by the PSF
    fn blurred_points(psf: &Image, n: usize) -> Image {
        let mut points = Array2::<f64>::zeros((n, n));
        points[[n / 2, n / 2 - 4]] = 1000.;
        points[[n / 2, n / 2 + 4]] = 1000.;
        let fft = Fft2::new(n, n);
        let otf = psf_to_otf(&fft, psf.data());
        let blurred = fft.convolve(&points, &otf).mapv(|x| x.max(0.));
        Image::new(blurred, psf.spacing())
    }

    #[test]
    fn reflection() {
        assert_eq!(reflect(-1, 4), 1);
        assert_eq!(reflect(-2, 4), 2);
        assert_eq!(reflect(4, 4), 2);
        assert_eq!(reflect(3, 4), 3);
        assert_eq!(reflect(-5, 1), 0);
        let data = Array2::from_shape_fn((3, 3), |(i, j)| (i * 3 + j) as f64);
        let padded = pad_reflect(&data, 2);
        assert_eq!(padded.dim(), (7, 7));
        assert_eq!(padded[[2, 2]], 0.);
        assert_eq!(padded[[0, 2]], data[[2, 0]]);
    }

    #[test]
    fn otf_of_centered_psf_is_real() {
        let psf = PsfFromFwhm::new([0.2; 2]).unwrap().on_grid([0.05; 2], (64, 64)).unwrap().xy();
        let fft = Fft2::new(32, 32);
        let otf = psf_to_otf(&fft, psf.data());
        assert_abs_diff_eq!(otf[[0, 0]].re, 1., epsilon = 1e-12);
        otf.iter()
            .for_each(|h| assert_abs_diff_eq!(h.im, 0., epsilon = 1e-12));
    }

    #[test]
    fn sharpens_point_sources() {
        let psf = PsfFromFwhm::new([0.2; 2]).unwrap().on_grid([0.05; 2], (64, 64)).unwrap().xy();
        let image = blurred_points(&psf, 32);
        let opts = options(&["--max-nof-iterations=30"]);
        let mut task = DeconvolutionRL::new(image.clone(), psf, None, &opts).unwrap();
        assert!(task.get_result().is_none());
        task.execute().unwrap();
        let result = task.get_result().unwrap();
        assert_eq!(result.shape(), image.shape());
        assert!(result.max() > 1.5 * image.max());
        assert!(result.min() >= 0.);
        // RL preserves the flux
        assert_abs_diff_eq!(result.sum(), image.sum(), epsilon = 1e-6 * image.sum());
        assert_eq!(task.history().len(), 30);
        assert!(task.history()[29] < task.history()[0]);
    }

    #[test]
    fn padding_and_tv() {
        let psf = PsfFromFwhm::new([0.2; 2]).unwrap().on_grid([0.05; 2], (64, 64)).unwrap().xy();
        let image = blurred_points(&psf, 24);
        for first_estimate in ["image", "blurred", "constant"] {
            let opts = options(&[
                "--max-nof-iterations=5",
                "--pad=4",
                "--tv-lambda=0.002",
                &format!("--first-estimate={first_estimate}"),
            ]);
            let mut task = DeconvolutionRL::new(image.clone(), psf.clone(), None, &opts).unwrap();
            task.execute().unwrap();
            let result = task.into_result().unwrap();
            assert_eq!(result.shape(), (24, 24));
            assert!(result.data().iter().all(|x| x.is_finite() && *x >= 0.));
        }
    }

    #[test]
    fn writes_result() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TiffImageWriter::new(dir.path());
        let psf = PsfFromFwhm::new([0.2; 2]).unwrap().on_grid([0.05; 2], (64, 64)).unwrap().xy();
        let image = blurred_points(&psf, 16);
        let opts = options(&["--max-nof-iterations=3", "--save-intermediate-results"]);
        let mut task = DeconvolutionRL::new(image, psf, Some(&writer), &opts).unwrap();
        task.execute().unwrap();
        assert!(dir.path().join("result_rl_3.tif").exists());
        assert!(dir.path().join("rl_estimate_001.tif").exists());
        assert!(dir.path().join("rl_estimate_003.tif").exists());
    }

    #[test]
    fn rejected_inputs() {
        let psf = PsfFromFwhm::new([0.2; 2]).unwrap().on_grid([0.05; 2], (64, 64)).unwrap().xy();
        let image = blurred_points(&psf, 16);
        let opts = options(&[]);
        let other = Image::new(psf.data().clone(), [0.1; 2]);
        assert!(matches!(
            DeconvolutionRL::new(image.clone(), other, None, &opts),
            Err(DeconvolutionError::SpacingMismatch(..))
        ));
        let negative = Image::new(image.data().mapv(|x| x - 1.), image.spacing());
        assert!(matches!(
            DeconvolutionRL::new(negative, psf.clone(), None, &opts),
            Err(DeconvolutionError::Negative)
        ));
        let small = Image::new(Array2::zeros((4, 4)), psf.spacing());
        assert!(matches!(
            DeconvolutionRL::new(small, psf.clone(), None, &opts),
            Err(DeconvolutionError::PsfTooLarge(..))
        ));
        let blocks = options(&["--blocks=2"]);
        assert!(matches!(
            DeconvolutionRL::new(image, psf, None, &blocks),
            Err(DeconvolutionError::Blocks(2))
        ));
    }

    #[test]
    fn psf_as_wide_as_the_image() {
        let image = blurred_points(
            &PsfFromFwhm::new([0.2; 2]).unwrap().on_grid([0.05; 2], (64, 64)).unwrap().xy(),
            24,
        );
        // 19 px FWHM, truncated to the 24x24 image
        let psf = PsfFromFwhm::new([0.95; 2])
            .unwrap()
            .on_grid(image.spacing(), image.shape())
            .unwrap()
            .xy();
        assert_eq!(psf.shape(), (23, 23));
        let opts = options(&["--max-nof-iterations=3"]);
        let mut task = DeconvolutionRL::new(image, psf, None, &opts).unwrap();
        task.execute().unwrap();
        assert!(task.get_result().unwrap().data().iter().all(|x| x.is_finite()));
    }
}
