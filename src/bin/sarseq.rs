//! sarseq CLI - sequential omnibus change detection on a polarimetric SAR series

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use sarseq::{
    CollisionPolicy, DetectorParams, ExecutionStrategy, GdalRaster, PixelWindow,
    SequentialChangeDetector,
};

#[derive(Parser, Debug)]
#[command(name = "sarseq")]
#[command(version, about = "Sequential change detection for multi-temporal polarimetric SAR")]
#[command(after_help = "Example: sarseq -m -d 0,0,400,400 -s 0.01 \
    /data/s1/img1.tif,/data/s1/img2.tif,/data/s1/img3.tif sarseq.tif 4.4")]
struct Cli {
    /// Median filter the p-values (3x3) before thresholding
    #[arg(short = 'm', long = "median")]
    median: bool,

    /// Spatial subset as x0,y0,cols,rows; other images are co-registered to it
    #[arg(short = 'd', long = "dims", value_name = "x0,y0,cols,rows")]
    dims: Option<PixelWindow>,

    /// Significance level for the omnibus test
    #[arg(short = 's', long = "significance", default_value_t = 0.01)]
    significance: f64,

    /// Policy when an output file already exists
    #[arg(long = "on-exists", default_value = "overwrite", value_name = "fail|overwrite|version")]
    on_exists: CollisionPolicy,

    /// Run every batch on the calling thread
    #[arg(long)]
    sequential: bool,

    /// Comma-separated list of co-registered input images
    infiles: String,

    /// Output file name, written to the directory of the first input
    outfile: String,

    /// Equivalent number of looks
    enl: f64,
}

impl Cli {
    fn files(&self) -> Vec<PathBuf> {
        self.infiles
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(PathBuf::from)
            .collect()
    }

    fn params(&self) -> DetectorParams {
        DetectorParams {
            significance: self.significance,
            median_filter: self.median,
            execution: if self.sequential {
                ExecutionStrategy::Sequential
            } else {
                ExecutionStrategy::default()
            },
            collision_policy: self.on_exists,
            ..DetectorParams::with_enl(self.enl)
        }
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let files = cli.files();
    let io = GdalRaster::new();
    let detector = SequentialChangeDetector::new(&io, cli.params())?;

    let output = detector
        .run(&files, cli.dims, None, &cli.outfile)
        .context("Change detection failed")?;

    log::info!(
        "{} of {} pixels changed over {} images",
        output.maps.changed_pixels(),
        output.series.extent().pixel_count(),
        output.series.len()
    );
    Ok(())
}
