//! FRC curve charts and side by side image renderings

use std::path::Path;

use plotters::prelude::*;

use crate::{
    frc::{FourierCorrelationData, FrcMeasurements},
    image::{enhance_contrast, Image, ImageError},
};

#[derive(Debug, thiserror::Error)]
pub enum PlotError {
    #[error("no FRC measurement #{0} to plot")]
    Missing(usize),
    #[error("nothing to plot")]
    Empty,
    #[error("failed to draw {0}: {1}")]
    Drawing(String, String),
    #[error("failed to prepare the image for display")]
    Image(#[from] ImageError),
}
type Result<T> = std::result::Result<T, PlotError>;

/// Saturated pixels of the displayed images [%]
const PERCENT_SATURATED: f64 = 0.3;

fn drawing_err<P: AsRef<Path>, E: std::fmt::Display>(path: P) -> impl Fn(E) -> PlotError {
    let path = path.as_ref().display().to_string();
    move |e| PlotError::Drawing(path.clone(), e.to_string())
}

fn tableau(i: usize) -> RGBColor {
    let color = colorous::TABLEAU10[i % colorous::TABLEAU10.len()];
    RGBColor(color.r, color.g, color.b)
}

/// Plots the FRC curves of a set of measurements
pub struct FourierDataPlotter<'a> {
    measurements: &'a FrcMeasurements,
}
impl<'a> FourierDataPlotter<'a> {
    pub fn new(measurements: &'a FrcMeasurements) -> Self {
        Self { measurements }
    }
    /// Correlation range of all the curves, padded and including the threshold
    fn yrange<'b>(data: impl Iterator<Item = &'b FourierCorrelationData>) -> (f64, f64) {
        let (lo, hi) = data
            .flat_map(|d| {
                d.correlation
                    .correlation
                    .iter()
                    .chain(&d.resolution.curve_fit)
                    .chain(&d.resolution.threshold)
            })
            .filter(|x| x.is_finite())
            .fold((0f64, 1f64), |(lo, hi), &x| (lo.min(x), hi.max(x)));
        (lo - 0.05, hi + 0.05)
    }
    /// Plots the measured curve, its fit and the threshold of measurement `index`
    pub fn plot_one<P: AsRef<Path>>(&self, index: usize, path: P) -> Result<()> {
        let data = self
            .measurements
            .get(index)
            .ok_or(PlotError::Missing(index))?;
        let path = path.as_ref();
        let err = drawing_err(path);

        let plot = SVGBackend::new(path, (768, 512)).into_drawing_area();
        plot.fill(&WHITE).map_err(&err)?;
        let (ymin, ymax) = Self::yrange(std::iter::once(data));
        let mut chart = ChartBuilder::on(&plot)
            .caption(
                format!("FRC resolution: {:.3}um", data.resolution()),
                ("sans-serif", 20),
            )
            .set_label_area_size(LabelAreaPosition::Left, 50)
            .set_label_area_size(LabelAreaPosition::Bottom, 40)
            .margin(10)
            .build_cartesian_2d(0f64..1f64, ymin..ymax)
            .map_err(&err)?;
        chart
            .configure_mesh()
            .x_desc("Normalized frequency")
            .y_desc("Correlation")
            .draw()
            .map_err(&err)?;

        let correlation = &data.correlation;
        let resolution = &data.resolution;
        let rgb = tableau(0);
        chart
            .draw_series(
                correlation
                    .frequency
                    .iter()
                    .zip(&correlation.correlation)
                    .map(|(&x, &y)| Circle::new((x, y), 2, rgb.filled())),
            )
            .map_err(&err)?
            .label("FRC")
            .legend(move |(x, y)| Circle::new((x + 10, y), 3, rgb.filled()));
        let rgb = tableau(1);
        chart
            .draw_series(LineSeries::new(
                resolution
                    .grid
                    .iter()
                    .cloned()
                    .zip(resolution.curve_fit.iter().cloned()),
                &rgb,
            ))
            .map_err(&err)?
            .label("fit")
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &rgb));
        let rgb = tableau(2);
        chart
            .draw_series(LineSeries::new(
                resolution
                    .grid
                    .iter()
                    .cloned()
                    .zip(resolution.threshold.iter().cloned()),
                &rgb,
            ))
            .map_err(&err)?
            .label(format!("{} threshold", resolution.criterion))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &rgb));
        chart
            .draw_series(std::iter::once(Cross::new(
                resolution.resolution_point,
                6,
                BLACK.stroke_width(2),
            )))
            .map_err(&err)?;

        chart
            .configure_series_labels()
            .border_style(&BLACK)
            .background_style(&WHITE.mix(0.8))
            .position(SeriesLabelPosition::UpperRight)
            .draw()
            .map_err(&err)?;
        plot.present().map_err(&err)?;
        log::info!("FRC curve #{} plotted in {:?}", index, path);
        Ok(())
    }
    /// Plots the fitted curves of all measurements, labelled with `titles`
    pub fn plot_all<P: AsRef<Path>>(&self, titles: &[&str], path: P) -> Result<()> {
        if self.measurements.is_empty() {
            return Err(PlotError::Empty);
        }
        let path = path.as_ref();
        let err = drawing_err(path);

        let plot = SVGBackend::new(path, (768, 512)).into_drawing_area();
        plot.fill(&WHITE).map_err(&err)?;
        let (ymin, ymax) = Self::yrange(self.measurements.iter().map(|(_, d)| d));
        let mut chart = ChartBuilder::on(&plot)
            .set_label_area_size(LabelAreaPosition::Left, 50)
            .set_label_area_size(LabelAreaPosition::Bottom, 40)
            .margin(10)
            .build_cartesian_2d(0f64..1f64, ymin..ymax)
            .map_err(&err)?;
        chart
            .configure_mesh()
            .x_desc("Normalized frequency")
            .y_desc("Correlation")
            .draw()
            .map_err(&err)?;

        for (k, (index, data)) in self.measurements.iter().enumerate() {
            let rgb = tableau(k);
            let title = titles
                .get(k)
                .map(|t| t.to_string())
                .unwrap_or_else(|| format!("#{}", index));
            let resolution = &data.resolution;
            chart
                .draw_series(LineSeries::new(
                    resolution
                        .grid
                        .iter()
                        .cloned()
                        .zip(resolution.curve_fit.iter().cloned()),
                    &rgb,
                ))
                .map_err(&err)?
                .label(format!("{}: {:.3}um", title, data.resolution()))
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &rgb));
            chart
                .draw_series(std::iter::once(Cross::new(
                    resolution.resolution_point,
                    6,
                    rgb.stroke_width(2),
                )))
                .map_err(&err)?;
        }
        if let Some((_, data)) = self.measurements.iter().next() {
            let resolution = &data.resolution;
            chart
                .draw_series(LineSeries::new(
                    resolution
                        .grid
                        .iter()
                        .cloned()
                        .zip(resolution.threshold.iter().cloned()),
                    BLACK.stroke_width(1),
                ))
                .map_err(&err)?
                .label(format!("{} threshold", resolution.criterion))
                .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLACK));
        }

        chart
            .configure_series_labels()
            .border_style(&BLACK)
            .background_style(&WHITE.mix(0.8))
            .position(SeriesLabelPosition::UpperRight)
            .draw()
            .map_err(&err)?;
        plot.present().map_err(&err)?;
        log::info!("FRC curves plotted in {:?}", path);
        Ok(())
    }
}

/// Nearest neighbour sample of `image` at panel pixel (x, y) of a `width`x`height` panel
fn sample(image: &Image, x: u32, y: u32, width: u32, height: u32) -> f64 {
    let (rows, cols) = image.shape();
    let i = ((y as usize * rows) / height.max(1) as usize).min(rows - 1);
    let j = ((x as usize * cols) / width.max(1) as usize).min(cols - 1);
    image.data()[[i, j]]
}

/// Renders two images side by side in a PNG file, in grey levels
pub fn display_2d_images<P: AsRef<Path>>(
    image1: &Image,
    image2: &Image,
    title1: &str,
    title2: &str,
    path: P,
) -> Result<()> {
    if image1.is_empty() || image2.is_empty() {
        return Err(PlotError::Empty);
    }
    let path = path.as_ref();
    let err = drawing_err(path);

    let root = BitMapBackend::new(path, (1024, 540)).into_drawing_area();
    root.fill(&WHITE).map_err(&err)?;
    let panels = root.split_evenly((1, 2));
    for (panel, (image, title)) in panels
        .iter()
        .zip([(image1, title1), (image2, title2)])
    {
        let image = enhance_contrast(image, PERCENT_SATURATED)?;
        let area = panel
            .titled(title, ("sans-serif", 20))
            .map_err(&err)?
            .margin(5, 5, 5, 5);
        let (width, height) = area.dim_in_pixel();
        // keep the aspect ratio of the image
        let (rows, cols) = image.shape();
        let scale = (width as f64 / cols as f64).min(height as f64 / rows as f64);
        let (w, h) = ((cols as f64 * scale) as u32, (rows as f64 * scale) as u32);
        for y in 0..h {
            for x in 0..w {
                let v = sample(&image, x, y, w, h).clamp(0., 1.);
                let c = colorous::GREYS.eval_continuous(1. - v);
                area.draw_pixel((x as i32, y as i32), &RGBColor(c.r, c.g, c.b))
                    .map_err(&err)?;
            }
        }
    }
    root.present().map_err(&err)?;
    log::info!("{} & {} displayed in {:?}", title1, title2, path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{frc::calculate_single_image_frc, options::DeconvolutionOptions};
    use ndarray::Array2;

    #[test]
    fn nearest_neighbour_sampling() {
        let image = Image::from_array(Array2::from_shape_fn((4, 8), |(i, j)| (i * 8 + j) as f64));
        assert_eq!(sample(&image, 0, 0, 16, 8), 0.);
        assert_eq!(sample(&image, 15, 7, 16, 8), 31.);
        assert_eq!(sample(&image, 2, 2, 16, 8), 9.);
    }

    #[test]
    fn display_saturation() {
        // 0.15% of the pixels clipped at each end of the histogram
        let image = Image::from_array(Array2::from_shape_fn((100, 100), |(i, j)| (i * 100 + j) as f64));
        let display = enhance_contrast(&image, PERCENT_SATURATED).unwrap();
        assert_eq!(display.data()[[0, 14]], 0.);
        assert!(display.data()[[0, 15]] > 0.);
        assert_eq!(display.data()[[99, 85]], 1.);
        assert!(display.data()[[99, 84]] < 1.);
    }

    #[test]
    fn missing_measurement() {
        let measurements = FrcMeasurements::new();
        let plotter = FourierDataPlotter::new(&measurements);
        assert!(matches!(
            plotter.plot_one(1, "frc.svg"),
            Err(PlotError::Missing(1))
        ));
        assert!(matches!(
            plotter.plot_all(&["before"], "frc.svg"),
            Err(PlotError::Empty)
        ));
    }

    #[test]
    #[ignore = "needs system fonts"]
    fn frc_charts() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let options = DeconvolutionOptions::script(50)?;
        let mut measurements = FrcMeasurements::new();
        let data = calculate_single_image_frc(&crate::frc::tests::blobs(64, 2., 5., 3), &options)?;
        measurements.insert(FrcMeasurements::BEFORE, data.clone())?;
        measurements.insert(FrcMeasurements::AFTER, data)?;
        let dir = tempfile::tempdir()?;
        let plotter = FourierDataPlotter::new(&measurements);
        plotter.plot_one(0, dir.path().join("frc_0.svg"))?;
        plotter.plot_all(&["Original", "Deconvolved"], dir.path().join("frc.svg"))?;
        let svg = std::fs::read_to_string(dir.path().join("frc.svg"))?;
        println!("{} bytes of SVG", svg.len());
        assert!(svg.contains("Deconvolved"));
        Ok(())
    }

    #[test]
    #[ignore = "needs system fonts"]
    fn side_by_side() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let image = crate::frc::tests::blobs(64, 2., 5., 3);
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("images.png");
        display_2d_images(&image, &image.subtract_min(), "Original", "Shifted", &path)?;
        assert!(path.exists());
        Ok(())
    }
}
