use structopt::StructOpt;
use strum::VariantNames;
use strum_macros::{Display, EnumString, VariantNames};

#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    #[error("failed to parse the deconvolution options {1:?}")]
    Parse(#[source] structopt::clap::Error, String),
    #[error("the number of iterations must be positive")]
    NoIteration,
}
type Result<T> = std::result::Result<T, OptionsError>;

/// Deconvolution first estimate
#[derive(Debug, Clone, Copy, PartialEq, EnumString, Display, VariantNames)]
#[strum(serialize_all = "kebab-case")]
pub enum FirstEstimate {
    /// A copy of the observed image
    Image,
    /// The observed image blurred by the PSF
    Blurred,
    /// A constant image at the observed mean
    Constant,
}

/// FRC resolution threshold criterion
#[derive(Debug, Clone, Copy, PartialEq, EnumString, Display, VariantNames)]
#[strum(serialize_all = "kebab-case")]
pub enum ThresholdCriterion {
    Fixed,
    OneBit,
    HalfBit,
    Snr,
}

/// FRC curve fitting method
#[derive(Debug, Clone, Copy, PartialEq, EnumString, Display, VariantNames)]
#[strum(serialize_all = "kebab-case")]
pub enum CurveFitType {
    SmoothSpline,
    Spline,
    Polynomial,
}

/// Deconvolution and FRC configuration
///
/// The options are parsed once from a fixed argument list (see
/// [`deconvolve_script_args`]) and shared read-only with the FRC and
/// deconvolution tasks.
#[derive(Debug, Clone, StructOpt)]
#[structopt(name = "deconvolve", about = "Richardson-Lucy deconvolution options")]
pub struct DeconvolutionOptions {
    /// Image placeholder
    pub image: String,
    /// PSF placeholder
    pub psf: String,
    /// Number of Richardson-Lucy iterations
    #[structopt(long, default_value = "20")]
    pub max_nof_iterations: usize,
    /// First estimate of the deconvolution
    #[structopt(long, default_value = "image", possible_values = FirstEstimate::VARIANTS)]
    pub first_estimate: FirstEstimate,
    /// Number of blocks the image is split into along each axis
    #[structopt(long, default_value = "1")]
    pub blocks: usize,
    /// Reflective padding [px] on each side of the image
    #[structopt(long, default_value = "0")]
    pub pad: usize,
    /// FRC resolution threshold criterion
    #[structopt(long, default_value = "fixed", possible_values = ThresholdCriterion::VARIANTS)]
    pub resolution_threshold_criterion: ThresholdCriterion,
    /// FRC threshold of the `fixed` criterion
    #[structopt(long, default_value = "0.142857")]
    pub resolution_threshold_value: f64,
    /// SNR of the `snr` criterion
    #[structopt(long, default_value = "0.25")]
    pub resolution_snr_value: f64,
    /// Total variation regularization weight
    #[structopt(long, default_value = "0")]
    pub tv_lambda: f64,
    /// FRC ring width [px]
    #[structopt(long, default_value = "1")]
    pub bin_delta: usize,
    /// FRC curve fitting method
    #[structopt(long, default_value = "smooth-spline", possible_values = CurveFitType::VARIANTS)]
    pub frc_curve_fit_type: CurveFitType,
    /// Degree of the `polynomial` FRC curve fit
    #[structopt(long, default_value = "8")]
    pub frc_curve_fit_degree: usize,
    /// Smoothing weight of the `smooth-spline` FRC curve fit
    #[structopt(long, default_value = "5")]
    pub frc_smoothing: f64,
    /// Skip the Hamming window applied before computing the FRC
    #[structopt(long)]
    pub disable_hamming: bool,
    /// Write every deconvolution estimate
    #[structopt(long)]
    pub save_intermediate_results: bool,
}

/// The argument list of the restoration script for `n_iterations` iterations
pub fn deconvolve_script_args(n_iterations: usize) -> Vec<String> {
    format!(
        "image psf \
         --max-nof-iterations={}  --first-estimate=image \
         --blocks=1 --pad=0 --resolution-threshold-criterion=fixed \
         --tv-lambda=0 --bin-delta=1  --frc-curve-fit-type=smooth-spline",
        n_iterations
    )
    .split_whitespace()
    .map(String::from)
    .collect()
}

impl DeconvolutionOptions {
    /// Parses the options from an argument list, never from the process arguments
    pub fn from_args_list<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();
        let opts =
            Self::from_iter_safe(std::iter::once("deconvolve".to_string()).chain(args.clone()))
                .map_err(|e| OptionsError::Parse(e, args.join(" ")))?;
        if opts.max_nof_iterations == 0 {
            return Err(OptionsError::NoIteration);
        }
        log::debug!("deconvolution options: {:?}", opts);
        Ok(opts)
    }
    /// The options of the restoration script with `n_iterations` iterations
    pub fn script(n_iterations: usize) -> Result<Self> {
        Self::from_args_list(deconvolve_script_args(n_iterations))
    }
}
