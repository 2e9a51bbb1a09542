mod opt_common;

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ewkino::cutflow::Cutflow;
use ewkino::progress_bar::ProgressBar;
use ewkino::selection::{
    parse_selection_type, parse_variation, prepare_event, region,
    SelectionContext,
};
use log::{debug, info};

use crate::opt_common::*;

/// Count how many selection stages events pass
#[derive(Debug, Parser)]
#[clap(about, author, version)]
struct Opt {
    /// Input event file
    input: PathBuf,

    /// Output file for the cutflow table
    output: PathBuf,

    /// Name of the selection region, e.g. 'signalregion'
    event_selection: String,

    /// Lepton selection: 'tight', 'prompt' or 'fakerate'
    selection_type: String,

    /// Calibration variation, e.g. 'nominal' or 'JECUp'
    variation: String,

    /// Number of events to process, 0 for all
    n_events: usize,

    /// Largest expected cutflow value
    max_cutflow_value: usize,

    #[clap(flatten)]
    common: CommonOpt,
}

fn main() -> Result<()> {
    let opt: Opt = parse_args();
    init_logging(&opt.common.loglevel);
    starting();
    debug!("settings: {opt:#?}");

    let config = load_config(opt.common.config.as_deref())?;
    let region = region(&opt.event_selection, &config)?;
    let selection_type = parse_selection_type(&opt.selection_type)?;
    let variation = parse_variation(&opt.variation)?;
    let events = open_events(&opt.input);
    let norm = events.info().norm(&config)?;

    let ctx = SelectionContext::new(&config, selection_type, variation);
    let mut cutflow = Cutflow::new(opt.max_cutflow_value, &region.pipeline);
    let nevents = events_to_process(opt.n_events, events.number_of_entries());
    let mut progress = ProgressBar::new(nevents as u64, "Evaluating cutflow:");
    for idx in 0..nevents {
        let mut event = events.build_event(idx)?;
        prepare_event(&mut event, variation, &config);
        let value = region.pipeline.cutflow_value(&event, &ctx)?;
        cutflow.record(value, event.weight() * norm)?;
        progress.inc(1);
    }
    progress.finish();

    let file = File::create(&opt.output)
        .with_context(|| format!("Failed to create {:?}", opt.output))?;
    cutflow.write(BufWriter::new(file))?;
    info!(
        "{} of {nevents} events pass all {} stages of {}",
        cutflow.passed_at_least(region.pipeline.len()),
        region.pipeline.len(),
        region.name
    );
    done();
    Ok(())
}
