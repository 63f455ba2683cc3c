use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use ndarray::Array2;
use tiff::{
    decoder::{ifd::Value, Decoder, DecodingResult, Limits},
    tags::Tag,
    ColorType,
};

use super::{Image, ImageError, Result};

macro_rules! samples_as_f64 {
    ($result:expr, $path:expr, $($variant:ident),+) => {
        match $result {
            $(DecodingResult::$variant(buf) => buf.into_iter().map(|x| x as f64).collect::<Vec<f64>>(),)+
            #[allow(unreachable_patterns)]
            _ => return Err(ImageError::SampleFormat($path)),
        }
    };
}

/// Number of samples per pixel
fn samples_per_pixel(color_type: ColorType) -> Option<usize> {
    match color_type {
        ColorType::Gray(_) => Some(1),
        ColorType::GrayA(_) => Some(2),
        ColorType::RGB(_) => Some(3),
        ColorType::RGBA(_) | ColorType::CMYK(_) => Some(4),
        _ => None,
    }
}

fn rational(value: Value) -> Option<f64> {
    match value {
        Value::Rational(n, d) if n > 0 && d > 0 => Some(n as f64 / d as f64),
        Value::Float(x) if x > 0. => Some(x as f64),
        Value::Double(x) if x > 0. => Some(x),
        _ => None,
    }
}

/// Micrometers per resolution unit
///
/// ImageJ leaves the TIFF resolution unit unset and writes the physical unit in
/// the image description instead.
fn unit_to_um(resolution_unit: Option<u16>, description: Option<&str>) -> f64 {
    match resolution_unit {
        Some(2) => 25_400.,
        Some(3) => 10_000.,
        _ => match description
            .and_then(|d| d.lines().find_map(|line| line.strip_prefix("unit=")))
            .map(str::trim)
        {
            Some("nm") | Some("nanometer") => 1e-3,
            Some("mm") | Some("millimeter") => 1e3,
            _ => 1.,
        },
    }
}

fn read_spacing<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> [f64; 2] {
    let resolution = |decoder: &mut Decoder<R>, tag| {
        decoder.find_tag(tag).ok().flatten().and_then(rational)
    };
    let x_resolution = resolution(decoder, Tag::XResolution);
    let y_resolution = resolution(decoder, Tag::YResolution).or(x_resolution);
    let resolution_unit = decoder
        .find_tag(Tag::ResolutionUnit)
        .ok()
        .flatten()
        .and_then(|v| v.into_u16().ok());
    let description = decoder
        .find_tag(Tag::ImageDescription)
        .ok()
        .flatten()
        .and_then(|v| match v {
            Value::Ascii(s) => Some(s),
            _ => None,
        });
    let um = unit_to_um(resolution_unit, description.as_deref());
    match (y_resolution, x_resolution) {
        (Some(y), Some(x)) => [um / y, um / x],
        _ => {
            log::warn!("no resolution tag, assuming a 1um pixel spacing");
            [1f64; 2]
        }
    }
}

/// Loads the first page of a TIFF file
///
/// For multi-samples images (RGB, ...), only the sample at index `channel` is kept.
pub fn get_image<P: AsRef<Path>>(path: P, channel: usize) -> Result<Image> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| ImageError::Open(e, path.to_path_buf()))?;
    let decode_err = |e| ImageError::Decode(e, path.to_path_buf());
    let mut decoder = Decoder::new(BufReader::new(file))
        .map_err(decode_err)?
        .with_limits(Limits::unlimited());

    let (width, height) = decoder.dimensions().map_err(decode_err)?;
    let n_sample = samples_per_pixel(decoder.colortype().map_err(decode_err)?)
        .ok_or_else(|| ImageError::SampleFormat(path.to_path_buf()))?;
    if channel >= n_sample {
        return Err(ImageError::Channel(channel, n_sample));
    }
    let spacing = read_spacing(&mut decoder);

    let samples = samples_as_f64!(
        decoder.read_image().map_err(decode_err)?,
        PathBuf::from(path),
        U8,
        U16,
        U32,
        U64,
        I8,
        I16,
        I32,
        I64,
        F32,
        F64
    );
    let pixels: Vec<f64> = samples.into_iter().skip(channel).step_by(n_sample).collect();
    let data = Array2::from_shape_vec((height as usize, width as usize), pixels)
        .map_err(|_| ImageError::Shape(width, height))?;
    if data.is_empty() {
        return Err(ImageError::Empty);
    }
    log::info!("loaded {:?}: {}x{} ({} samples/px)", path, height, width, n_sample);
    Ok(Image::new(data, spacing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::write::{ImageWriter, TiffImageWriter};
    use approx::assert_relative_eq;
    use tiff::encoder::{colortype, Rational, TiffEncoder};

    #[test]
    fn read_u16_with_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("u16.tif");
        {
            let file = File::create(&path).unwrap();
            let mut tiff = TiffEncoder::new(file).unwrap();
            let mut image = tiff.new_image::<colortype::Gray16>(4, 3).unwrap();
            // 20 px/cm: 500um pixels
            image.resolution(
                tiff::tags::ResolutionUnit::Centimeter,
                Rational { n: 20, d: 1 },
            );
            let data: Vec<u16> = (0..12).collect();
            image.write_data(&data).unwrap();
        }
        let image = get_image(&path, 0).unwrap();
        assert_eq!(image.shape(), (3, 4));
        assert_eq!(image.data()[[2, 3]], 11.);
        assert_relative_eq!(image.spacing()[0], 500.);
        assert_relative_eq!(image.spacing()[1], 500.);
    }

    #[test]
    fn read_rgb_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rgb.tif");
        {
            let file = File::create(&path).unwrap();
            let mut tiff = TiffEncoder::new(file).unwrap();
            let data: Vec<u8> = (0..2 * 2).flat_map(|i| [i as u8, 100, 200]).collect();
            tiff.write_image::<colortype::RGB8>(2, 2, &data).unwrap();
        }
        assert_eq!(get_image(&path, 0).unwrap().data()[[1, 1]], 3.);
        assert_eq!(get_image(&path, 2).unwrap().data()[[0, 0]], 200.);
        assert!(matches!(get_image(&path, 3), Err(ImageError::Channel(3, 3))));
    }

    #[test]
    fn written_image_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let image = Image::new(
            Array2::from_shape_fn((5, 7), |(i, j)| (i * 7 + j) as f64 * 0.5),
            [0.04, 0.04],
        );
        let writer = TiffImageWriter::new(dir.path());
        let path = writer.write("sample", &image).unwrap();
        let read_back = get_image(path, 0).unwrap();
        assert_eq!(read_back.shape(), (5, 7));
        assert_relative_eq!(read_back.data()[[4, 6]], 17.);
        assert_relative_eq!(read_back.spacing()[0], 0.04, max_relative = 1e-4);
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            get_image("does/not/exist.tif", 0),
            Err(ImageError::Open(..))
        ));
    }
}
