mod opt_common;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ewkino::event_file::EventFileWriter;
use ewkino::progress_bar::ProgressBar;
use ewkino::selection::{
    parse_selection_type, parse_variation, region, select_event,
};
use log::{debug, info};

use crate::opt_common::*;

/// Write all events passing a selection to a new event file
#[derive(Debug, Parser)]
#[clap(about, author, version)]
struct Opt {
    /// Input event file
    input: PathBuf,

    /// Output event file
    output: PathBuf,

    /// Name of the selection region, e.g. 'signalregion'
    event_selection: String,

    /// Lepton selection: 'tight', 'prompt' or 'fakerate'
    selection_type: String,

    /// Calibration variation, e.g. 'nominal' or 'JECUp'
    variation: String,

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
    let mut writer = EventFileWriter::create(
        &opt.output,
        events.info(),
        opt.common.compression,
    )
    .with_context(|| format!("Failed to create {:?}", opt.output))?;

    let nevents = events.number_of_entries();
    let mut progress = ProgressBar::new(nevents as u64, "Selecting events:");
    let mut nselected = 0;
    for idx in 0..nevents {
        let mut event = events.build_event(idx)?;
        if select_event(&mut event, &region, &config, selection_type, variation)? {
            if let Some(record) = events.record(idx) {
                writer.write_record(record)?;
            }
            nselected += 1;
        }
        progress.inc(1);
    }
    progress.finish();
    writer
        .finish()
        .with_context(|| format!("Failed to write {:?}", opt.output))?;
    info!(
        "{nselected} of {nevents} events pass {} ({selection_type}, {variation})",
        region.name
    );
    done();
    Ok(())
}
