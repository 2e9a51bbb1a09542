mod opt_common;

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ewkino::systematics::{BandSettings, HistogramStore, UncertaintyBand};
use log::{debug, info, warn};

use crate::opt_common::*;

/// Combine systematic uncertainties into a total uncertainty band
#[derive(Debug, Parser)]
#[clap(about, author, version)]
struct Opt {
    /// YAML file with a list of band settings
    band_config: PathBuf,

    /// Output YAML file
    output: PathBuf,

    /// Histogram files
    #[clap(required = true)]
    histograms: Vec<PathBuf>,

    /// Verbosity level
    #[clap(short, long, default_value = "Info")]
    loglevel: String,
}

fn main() -> Result<()> {
    let opt: Opt = parse_args();
    init_logging(&opt.loglevel);
    starting();
    debug!("settings: {opt:#?}");

    let file = File::open(&opt.band_config)
        .with_context(|| format!("Failed to open {:?}", opt.band_config))?;
    let settings: Vec<BandSettings> = serde_yaml::from_reader(file)
        .with_context(|| format!("Failed to parse {:?}", opt.band_config))?;

    let mut store = HistogramStore::new();
    for path in &opt.histograms {
        match HistogramStore::from_file(path) {
            Ok(hists) => store.merge(hists)?,
            Err(err) => {
                warn!("{err}");
                eprintln!("Cannot read histogram file {path:?}: {err}");
                std::process::exit(EXIT_BAD_INPUT)
            }
        }
    }
    info!("Read {} histograms", store.len());

    let bands = settings
        .iter()
        .map(|settings| {
            UncertaintyBand::from_settings(&store, settings).with_context(|| {
                format!(
                    "Failed to combine uncertainties for {} in {}",
                    settings.distribution, settings.region
                )
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let out = File::create(&opt.output)
        .with_context(|| format!("Failed to create {:?}", opt.output))?;
    serde_yaml::to_writer(BufWriter::new(out), &bands)?;
    info!("Wrote {} uncertainty bands to {:?}", bands.len(), opt.output);
    done();
    Ok(())
}
