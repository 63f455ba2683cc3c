use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use tiff::{
    encoder::{colortype, Rational, TiffEncoder},
    tags::ResolutionUnit,
};

use super::{Image, ImageError, Result};

/// Sink for the images produced by a processing task
pub trait ImageWriter {
    /// Writes `image` under `name`, returning where it went
    fn write(&self, name: &str, image: &Image) -> Result<PathBuf>;
}

/// Writes 32-bit float TIFF files to a directory
#[derive(Debug, Clone)]
pub struct TiffImageWriter {
    dir: PathBuf,
}
impl TiffImageWriter {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

/// Pixels per centimeter as a TIFF rational
fn pixels_per_cm(spacing_um: f64) -> Rational {
    let ppcm = 1e4 / spacing_um;
    let d = if ppcm < 1e6 { 1000 } else { 1 };
    Rational {
        n: (ppcm * d as f64).round().min(u32::MAX as f64) as u32,
        d,
    }
}

impl ImageWriter for TiffImageWriter {
    fn write(&self, name: &str, image: &Image) -> Result<PathBuf> {
        let path = self.dir.join(name).with_extension("tif");
        let file = File::create(&path).map_err(|e| ImageError::Create(e, path.clone()))?;
        let encode_err = |e| ImageError::Encode(e, path.clone());
        let mut tiff = TiffEncoder::new(BufWriter::new(file)).map_err(encode_err)?;
        let (rows, cols) = image.shape();
        let mut encoder = tiff
            .new_image::<colortype::Gray32Float>(cols as u32, rows as u32)
            .map_err(encode_err)?;
        let [dy, dx] = image.spacing();
        encoder.resolution_unit(ResolutionUnit::Centimeter);
        encoder.x_resolution(pixels_per_cm(dx));
        encoder.y_resolution(pixels_per_cm(dy));
        let data: Vec<f32> = image.data().iter().map(|&x| x as f32).collect();
        encoder.write_data(&data).map_err(encode_err)?;
        log::debug!("wrote {:?}", path);
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_rational() {
        let r = pixels_per_cm(0.04);
        assert_eq!(r.n / r.d, 250_000);
        let r = pixels_per_cm(1e-4);
        assert_eq!(r.d, 1);
        assert_eq!(r.n, 100_000_000);
    }

    #[test]
    fn missing_directory() {
        let writer = TiffImageWriter::new("no/such/dir");
        let image = Image::from_array(ndarray::Array2::zeros((2, 2)));
        assert!(matches!(
            writer.write("x", &image),
            Err(ImageError::Create(..))
        ));
    }
}
