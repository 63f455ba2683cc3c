use std::path::PathBuf;

use crate::{
    deconvolution::DeconvolutionError,
    fetch::{FetchError, PathError},
    frc::FrcError,
    image::ImageError,
    options::OptionsError,
    plot::PlotError,
    psf::PsfError,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Error in the `options` module")]
    Options(#[from] OptionsError),
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("Error in the `fetch` module")]
    Fetch(#[from] FetchError),
    #[error("Error in the `image` module")]
    Image(#[from] ImageError),
    #[error("Error in the `frc` module")]
    Frc(#[from] FrcError),
    #[error("Error in the `psf` module")]
    Psf(#[from] PsfError),
    #[error("Error in the `deconvolution` module")]
    Deconvolution(#[from] DeconvolutionError),
    #[error("Error in the `plot` module")]
    Plot(#[from] PlotError),
    #[error("failed to create the output directory {1:?}")]
    OutputDir(#[source] std::io::Error, PathBuf),
    #[error("no input file given")]
    NoInput,
}
pub type Result<T> = std::result::Result<T, Error>;
