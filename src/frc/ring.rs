use ndarray::{s, Array2, Zip};
use serde::Serialize;

use super::{FrcError, Result};
use crate::{
    fft::{frequency_index, Fft2},
    image::Image,
};

/// Ring correlation curve
#[derive(Debug, Clone, Default)]
pub struct Correlation {
    /// ring frequencies normalized to the Nyquist frequency
    pub frequency: Vec<f64>,
    /// ring correlation coefficients
    pub correlation: Vec<f64>,
    /// number of Fourier samples in each ring
    pub points: Vec<usize>,
}
#[derive(Serialize)]
pub(crate) struct Record {
    #[serde(rename = "Frequency")]
    pub frequency: f64,
    #[serde(rename = "Correlation")]
    pub correlation: f64,
    #[serde(rename = "Points")]
    pub points: usize,
}
impl Correlation {
    pub fn len(&self) -> usize {
        self.frequency.len()
    }
    pub fn is_empty(&self) -> bool {
        self.frequency.is_empty()
    }
    pub(crate) fn records(&self) -> impl Iterator<Item = Record> + '_ {
        self.frequency
            .iter()
            .zip(&self.correlation)
            .zip(&self.points)
            .map(|((&frequency, &correlation), &points)| Record {
                frequency,
                correlation,
                points,
            })
    }
    /// Averages two curves sampled at the same frequencies
    pub fn average(&self, other: &Self) -> Result<Self> {
        if self.frequency.len() != other.frequency.len() {
            return Err(FrcError::Mismatch(self.len(), other.len()));
        }
        Ok(Self {
            frequency: self.frequency.clone(),
            correlation: self
                .correlation
                .iter()
                .zip(&other.correlation)
                .map(|(a, b)| 0.5 * (a + b))
                .collect(),
            points: self.points.clone(),
        })
    }
}

/// Fourier ring correlation between two square images of identical size
pub struct FourierRingCorrelation<'a> {
    image1: &'a Image,
    image2: &'a Image,
    bin_delta: usize,
}
impl<'a> FourierRingCorrelation<'a> {
    pub fn new(image1: &'a Image, image2: &'a Image, bin_delta: usize) -> Self {
        Self {
            image1,
            image2,
            bin_delta: bin_delta.max(1),
        }
    }
    /// Correlates the two spectra over rings `bin_delta` pixels wide, up to Nyquist
    pub fn execute(&self) -> Result<Correlation> {
        let shape = self.image1.shape();
        if shape != self.image2.shape() {
            return Err(FrcError::Shape(shape, self.image2.shape()));
        }
        let (rows, cols) = shape;
        if rows != cols {
            return Err(FrcError::NotSquare(rows, cols));
        }
        let nyquist = rows / 2;
        let n_ring = nyquist / self.bin_delta;
        if n_ring < 2 {
            return Err(FrcError::TooSmall(rows, cols));
        }

        let fft = Fft2::new(rows, cols);
        let f1 = fft.forward_real(self.image1.data());
        let f2 = fft.forward_real(self.image2.data());

        let mut cross = vec![0f64; n_ring];
        let mut power1 = vec![0f64; n_ring];
        let mut power2 = vec![0f64; n_ring];
        let mut points = vec![0usize; n_ring];
        Zip::indexed(&f1).and(&f2).for_each(|(i, j), a, b| {
            let (fy, fx) = (frequency_index(i, rows), frequency_index(j, cols));
            let ring = ((fy * fy + fx * fx).sqrt() / self.bin_delta as f64) as usize;
            if ring < n_ring {
                cross[ring] += (a * b.conj()).re;
                power1[ring] += a.norm_sqr();
                power2[ring] += b.norm_sqr();
                points[ring] += 1;
            }
        });

        let correlation = cross
            .iter()
            .zip(power1.iter().zip(&power2))
            .map(|(&c, (&p1, &p2))| {
                let norm = (p1 * p2).sqrt();
                if norm > 0. {
                    c / norm
                } else {
                    0.
                }
            })
            .collect();
        let frequency = (0..n_ring)
            .map(|k| (k * self.bin_delta) as f64 / nyquist as f64)
            .collect();
        Ok(Correlation {
            frequency,
            correlation,
            points,
        })
    }
}

/// Crops to even dimensions
fn even(image: &Image) -> Array2<f64> {
    let (rows, cols) = image.shape();
    image
        .data()
        .slice(s![..rows - rows % 2, ..cols - cols % 2])
        .to_owned()
}

/// Crops the two sub-images to the same square
fn square_pair(a: Array2<f64>, b: Array2<f64>, spacing: [f64; 2]) -> (Image, Image) {
    let (rows, cols) = a.dim();
    let n = rows.min(cols);
    (
        Image::new(a.slice(s![..n, ..n]).to_owned(), spacing),
        Image::new(b.slice(s![..n, ..n]).to_owned(), spacing),
    )
}

/// Splits the image into its (odd rows, odd columns) and (even rows, even columns) pixels
pub fn checkerboard_split(image: &Image) -> (Image, Image) {
    let data = even(image);
    square_pair(
        data.slice(s![1..;2, 1..;2]).to_owned(),
        data.slice(s![0..;2, 0..;2]).to_owned(),
        image.spacing(),
    )
}

/// Splits the image into its (odd rows, even columns) and (even rows, odd columns) pixels
pub fn reverse_checkerboard_split(image: &Image) -> (Image, Image) {
    let data = even(image);
    square_pair(
        data.slice(s![1..;2, 0..;2]).to_owned(),
        data.slice(s![0..;2, 1..;2]).to_owned(),
        image.spacing(),
    )
}

/// Applies a separable Hamming window
pub fn hamming_window(image: &Image) -> Image {
    let (rows, cols) = image.shape();
    let hamming = |k: usize, n: usize| {
        if n > 1 {
            0.54 - 0.46 * (2. * std::f64::consts::PI * k as f64 / (n - 1) as f64).cos()
        } else {
            1.
        }
    };
    let wy: Vec<f64> = (0..rows).map(|i| hamming(i, rows)).collect();
    let wx: Vec<f64> = (0..cols).map(|j| hamming(j, cols)).collect();
    let mut data = image.data().clone();
    Zip::indexed(&mut data).for_each(|(i, j), x| *x *= wy[i] * wx[j]);
    Image::new(data, image.spacing())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn noise(n: usize, seed: u64) -> Image {
        let mut rng = StdRng::seed_from_u64(seed);
        Image::from_array(Array2::from_shape_fn((n, n), |_| rng.gen::<f64>()))
    }

    #[test]
    fn identical_images_correlate() {
        let image = noise(32, 1);
        let frc = FourierRingCorrelation::new(&image, &image, 1).execute().unwrap();
        assert_eq!(frc.len(), 16);
        frc.correlation
            .iter()
            .for_each(|&c| assert_abs_diff_eq!(c, 1., epsilon = 1e-9));
        assert_abs_diff_eq!(frc.frequency[8], 0.5);
        assert_eq!(frc.points[0], 1);
    }

    #[test]
    fn independent_noise_decorrelates() {
        let (a, b) = (noise(128, 1), noise(128, 2));
        let frc = FourierRingCorrelation::new(&a, &b, 1).execute().unwrap();
        let tail: Vec<f64> = frc.correlation[10..].to_vec();
        let mean = tail.iter().sum::<f64>() / tail.len() as f64;
        assert!(mean.abs() < 0.05, "mean correlation: {mean}");
    }

    #[test]
    fn ring_width() {
        let image = noise(64, 3);
        let frc = FourierRingCorrelation::new(&image, &image, 4).execute().unwrap();
        assert_eq!(frc.len(), 8);
        assert_abs_diff_eq!(frc.frequency[1], 0.125);
    }

    #[test]
    fn shape_errors() {
        let (a, b) = (noise(16, 1), noise(32, 1));
        assert!(matches!(
            FourierRingCorrelation::new(&a, &b, 1).execute(),
            Err(FrcError::Shape(..))
        ));
        let c = Image::from_array(Array2::zeros((16, 8)));
        assert!(matches!(
            FourierRingCorrelation::new(&c, &c, 1).execute(),
            Err(FrcError::NotSquare(16, 8))
        ));
    }

    #[test]
    fn splits() {
        let image = Image::from_array(Array2::from_shape_fn((7, 10), |(i, j)| (i * 10 + j) as f64));
        let (a, b) = checkerboard_split(&image);
        assert_eq!(a.shape(), (3, 3));
        assert_eq!(b.shape(), (3, 3));
        assert_eq!(a.data()[[0, 0]], 11.);
        assert_eq!(b.data()[[1, 1]], 22.);
        let (c, d) = reverse_checkerboard_split(&image);
        assert_eq!(c.data()[[0, 0]], 10.);
        assert_eq!(d.data()[[0, 0]], 1.);
    }

    #[test]
    fn hamming() {
        let image = Image::from_array(Array2::from_elem((5, 5), 1.));
        let windowed = hamming_window(&image);
        assert_abs_diff_eq!(windowed.data()[[2, 2]], 1.);
        assert_abs_diff_eq!(windowed.data()[[0, 0]], 0.08 * 0.08, epsilon = 1e-12);
    }
}
