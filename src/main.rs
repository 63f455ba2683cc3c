use std::{
    io::{self, Write},
    path::PathBuf,
    process,
};

use frc_restore::{Error, FrcMeasurements, Restoration};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "frc-restore",
    about = "FRC based Richardson-Lucy restoration of a microscopy image"
)]
struct Opt {
    /// Data directory the input path is relative to
    #[structopt(long, parse(from_os_str), env = "FRC_RESTORE_DATA_DIR", default_value = ".")]
    data_dir: PathBuf,
    /// Sub-directory of the data directory holding the input
    #[structopt(long, parse(from_os_str))]
    base_dir: Option<PathBuf>,
    /// URL of the image downloaded when the input file is missing
    #[structopt(long, default_value = "https://ndownloader.figshare.com/files/15202565")]
    url: String,
    /// Number of Richardson-Lucy iterations
    #[structopt(short, long, default_value = "50")]
    iterations: usize,
    /// Deconvolution results directory, relative to the data directory
    #[structopt(long, parse(from_os_str), default_value = "Temp")]
    output_dir: PathBuf,
    /// Skip the figures
    #[structopt(long)]
    no_plots: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::from_args();
    log::debug!("{:?}", opt);

    print!("Please enter the path to a tif file: ");
    io::stdout().flush()?;
    let mut filename = String::new();
    io::stdin().read_line(&mut filename)?;
    let filename = filename.trim_end_matches(['\r', '\n']);

    let mut restoration = Restoration::new(&opt.data_dir)
        .input(filename)
        .url(opt.url)
        .iterations(opt.iterations)
        .output_dir(&opt.output_dir)
        .plots(!opt.no_plots);
    if let Some(base_dir) = &opt.base_dir {
        restoration = restoration.base_dir(base_dir);
    }

    let report = match restoration.run() {
        Ok(report) => report,
        Err(Error::Path(e)) => {
            println!("Error: {}", e);
            process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    let measurements = &report.measurements;
    println!(
        "FRC resolution: {:.3}um (original) -> {:.3}um (deconvolved)",
        measurements[FrcMeasurements::BEFORE].resolution(),
        measurements[FrcMeasurements::AFTER].resolution()
    );
    println!(
        "Deconvolution results written to {}",
        report.output_dir.display()
    );
    Ok(())
}
