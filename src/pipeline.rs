/*!
# Image restoration workflow

[`Restoration`] chains the steps of a restoration run:
 1. deconvolution options for the set number of iterations,
 2. input resolution, with a download of the sample micrograph if the file is missing,
 3. image loading and background removal,
 4. FRC resolution of the raw image,
 5. Gaussian PSF with a FWHM equal to the FRC resolution,
 6. Richardson-Lucy deconvolution into the output directory,
 7. FRC resolution of the deconvolved image.

```rust,no_run
use frc_restore::Restoration;
# fn main() -> frc_restore::Result<()> {
let report = Restoration::new(".")
    .input("sample.tif")
    .base_dir("data")
    .run()?;
println!("{:.3}um", report.measurements[0].resolution());
# Ok(())
# }
```
*/

use std::path::{Path, PathBuf};

use crate::{
    deconvolution::DeconvolutionRL,
    error::{Error, Result},
    fetch::{ensure_dir, ensure_local, resolve_input, Fetch, HttpFetcher, SAMPLE_URL},
    frc::{calculate_single_image_frc, FrcMeasurements},
    image::{get_image, Image, TiffImageWriter},
    options::DeconvolutionOptions,
    plot::{display_2d_images, FourierDataPlotter},
    psf::PsfFromFwhm,
};

/// Outcome of a restoration run
pub struct RestorationReport {
    /// FRC before (`0`) and after (`1`) deconvolution
    pub measurements: FrcMeasurements,
    pub psf: Image,
    /// deconvolved image
    pub result: Image,
    /// whether the input was downloaded
    pub downloaded: bool,
    /// deconvolution results directory
    pub output_dir: PathBuf,
}

/// Restoration run builder
pub struct Restoration<'a> {
    data_dir: PathBuf,
    base_dir: Option<PathBuf>,
    input: Option<String>,
    url: String,
    iterations: usize,
    output_dir: PathBuf,
    plots: bool,
    fetcher: Box<dyn Fetch + 'a>,
}
impl<'a> Restoration<'a> {
    /// New run with all paths relative to `data_dir`
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            base_dir: None,
            input: None,
            url: SAMPLE_URL.to_string(),
            iterations: 50,
            output_dir: PathBuf::from("Temp"),
            plots: true,
            fetcher: Box::new(HttpFetcher::new()),
        }
    }
    /// Input file name, as typed by the user
    pub fn input<S: Into<String>>(self, input: S) -> Self {
        Self {
            input: Some(input.into()),
            ..self
        }
    }
    pub fn base_dir<P: AsRef<Path>>(self, base_dir: P) -> Self {
        Self {
            base_dir: Some(base_dir.as_ref().to_path_buf()),
            ..self
        }
    }
    /// URL the input is downloaded from if missing
    pub fn url<S: Into<String>>(self, url: S) -> Self {
        Self {
            url: url.into(),
            ..self
        }
    }
    pub fn iterations(self, iterations: usize) -> Self {
        Self { iterations, ..self }
    }
    /// Deconvolution results directory, relative to the data directory
    pub fn output_dir<P: AsRef<Path>>(self, output_dir: P) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            ..self
        }
    }
    /// Enables or disables the figures
    pub fn plots(self, plots: bool) -> Self {
        Self { plots, ..self }
    }
    pub fn fetcher<F: Fetch + 'a>(self, fetcher: F) -> Self {
        Self {
            fetcher: Box::new(fetcher),
            ..self
        }
    }
    /// Resolved input path
    pub fn input_path(&self) -> Result<PathBuf> {
        let input = self.input.as_deref().ok_or(Error::NoInput)?;
        Ok(resolve_input(
            &self.data_dir,
            self.base_dir.as_ref(),
            input,
        )?)
    }
    fn figure(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    pub fn run(self) -> Result<RestorationReport> {
        let options = DeconvolutionOptions::script(self.iterations)?;

        let path = self.input_path()?;
        let downloaded = ensure_local(&path, &self.url, self.fetcher.as_ref())?;

        let image = get_image(&path, 0)?;
        let (rows, cols) = image.shape();
        println!(
            "The image dimensions are ({}, {}) and spacing {:?} um.",
            rows,
            cols,
            image.spacing()
        );
        let image = image.subtract_min();

        let mut measurements = FrcMeasurements::new();
        let frc = calculate_single_image_frc(&image, &options)?;
        let fwhm = frc.resolution();
        measurements.insert(FrcMeasurements::BEFORE, frc)?;
        if self.plots {
            FourierDataPlotter::new(&measurements)
                .plot_one(FrcMeasurements::BEFORE, self.figure("frc_original.svg"))?;
        }

        let psf = PsfFromFwhm::new([fwhm; 2])?
            .on_grid(
                image.spacing(),
                (rows + 2 * options.pad, cols + 2 * options.pad),
            )?
            .xy();
        log::info!("PSF: {}", psf);
        if self.plots {
            display_2d_images(
                &image,
                &psf,
                "Original",
                "PSF",
                self.figure("original_psf.png"),
            )?;
        }

        let output_dir = self.data_dir.join(&self.output_dir);
        ensure_dir(&output_dir).map_err(|e| Error::OutputDir(e, output_dir.clone()))?;
        let writer = TiffImageWriter::new(&output_dir);
        let mut task = DeconvolutionRL::new(image.clone(), psf.clone(), Some(&writer), &options)?;
        task.execute()?;
        let result = task
            .into_result()
            .ok_or(crate::deconvolution::DeconvolutionError::Empty)?;
        if self.plots {
            display_2d_images(
                &image,
                &result,
                "Original",
                "Deconvolved",
                self.figure("original_deconvolved.png"),
            )?;
        }

        measurements.insert(
            FrcMeasurements::AFTER,
            calculate_single_image_frc(&result, &options)?,
        )?;
        if self.plots {
            FourierDataPlotter::new(&measurements)
                .plot_all(&["Original", "Deconvolved"], self.figure("frc.svg"))?;
        }

        Ok(RestorationReport {
            measurements,
            psf,
            result,
            downloaded,
            output_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fetch::tests::MockFetcher, frc::tests::blobs, image::ImageWriter};

    /// A fetcher serving a synthetic micrograph
    fn sample_fetcher() -> MockFetcher {
        let dir = tempfile::tempdir().unwrap();
        let path = TiffImageWriter::new(dir.path())
            .write("blobs", &blobs(128, 2., 5., 11))
            .unwrap();
        MockFetcher {
            contents: std::fs::read(path).unwrap(),
            ..Default::default()
        }
    }

    #[test]
    fn download_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = sample_fetcher();
        let report = Restoration::new(dir.path())
            .input("sample.tif")
            .base_dir("data")
            .iterations(5)
            .plots(false)
            .fetcher(&fetcher)
            .run()
            .unwrap();
        assert!(report.downloaded);
        assert_eq!(*fetcher.requests.borrow(), vec![SAMPLE_URL.to_string()]);
        assert!(dir.path().join("data/sample.tif").exists());

        assert!(dir.path().join("Temp").is_dir());
        assert_eq!(report.output_dir, dir.path().join("Temp"));
        assert!(dir.path().join("Temp/result_rl_5.tif").exists());

        let measurements = &report.measurements;
        assert_eq!(measurements.len(), 2);
        let (before, after) = (measurements[0].resolution(), measurements[1].resolution());
        println!("FRC: {:.4}um -> {:.4}um", before, after);
        assert_ne!(before, after);
        assert_eq!(report.result.shape(), (128, 128));
        assert_eq!(report.psf.shape().0 % 2, 1);
    }

    #[test]
    fn local_file_is_not_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = sample_fetcher();
        std::fs::write(dir.path().join("local.tif"), &fetcher.contents).unwrap();
        std::fs::create_dir(dir.path().join("Temp")).unwrap();
        let report = Restoration::new(dir.path())
            .input("local.tif")
            .iterations(2)
            .plots(false)
            .fetcher(&fetcher)
            .run()
            .unwrap();
        assert!(!report.downloaded);
        assert!(fetcher.requests.borrow().is_empty());
        assert_eq!(report.measurements.len(), 2);
    }

    #[test]
    fn invalid_input() {
        let fetcher = MockFetcher::default();
        let run = Restoration::new(".").input("").fetcher(&fetcher).run();
        assert!(matches!(run, Err(Error::Path(_))));
        assert!(matches!(
            Restoration::new(".").run(),
            Err(Error::NoInput)
        ));
        assert!(fetcher.requests.borrow().is_empty());
    }
}
