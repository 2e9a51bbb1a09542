mod opt_common;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ewkino::config::AnalysisConfig;
use ewkino::event_file::EventFile;
use ewkino::flatten::{Flatten, FlattenContext, TzqFlattener, WdFlattener};
use ewkino::mva::BoostedDecisionTrees;
use ewkino::progress_bar::ProgressBar;
use ewkino::reweight::{Reweighter, NO_REWEIGHTING};
use ewkino::selection::{
    parse_selection_type, parse_variation, region, select_event, Analysis,
    Region, SelectionType,
};
use ewkino::variation::Variation;
use ewkino::writer::FlatTreeWriter;
use log::{debug, info, warn};

use crate::opt_common::*;

/// Write the observables of selected events as a flat tree
#[derive(Debug, Parser)]
#[clap(about, author, version)]
struct Opt {
    /// Input event file
    input: PathBuf,

    /// Output file with tab-separated values
    output: PathBuf,

    /// Name of the selection region, e.g. 'signalregion'
    event_selection: String,

    /// Lepton selection: 'tight', 'prompt' or 'fakerate'
    selection_type: String,

    /// Calibration variation, e.g. 'nominal' or 'JECUp'
    variation: String,

    /// Boosted decision tree model for the event classifier
    #[clap(long)]
    bdt: Option<PathBuf>,

    #[clap(flatten)]
    weights: WeightOpt,

    #[clap(flatten)]
    common: CommonOpt,
}

struct Job<'a> {
    opt: &'a Opt,
    config: &'a AnalysisConfig,
    region: &'a Region,
    selection_type: SelectionType,
    variation: Variation,
    events: &'a EventFile,
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

    let job = Job {
        opt: &opt,
        config: &config,
        region: &region,
        selection_type,
        variation,
        events: &events,
    };
    match region.analysis {
        Analysis::Tzq => run::<TzqFlattener>(job),
        Analysis::Wd => run::<WdFlattener>(job),
    }?;
    done();
    Ok(())
}

fn run<F: Flatten>(job: Job) -> Result<()> {
    let Job {
        opt,
        config,
        region,
        selection_type,
        variation,
        events,
    } = job;

    let mva = match &opt.bdt {
        Some(file) => {
            let bdt = BoostedDecisionTrees::from_file(file)?;
            info!("Using BDT {}", bdt.name);
            Some(bdt.bind::<F::Variable>()?)
        }
        None => None,
    };
    let flattener = F::new(mva);

    let scale_factors = opt.weights.reweighter()?;
    let reweighter: &dyn Reweighter = match &scale_factors {
        Some(sf) => sf,
        None => &NO_REWEIGHTING,
    };
    let fake_rates = opt.weights.fake_rates()?;
    if selection_type == SelectionType::FakeRate && fake_rates.is_none() {
        warn!("No fake-rate maps given, events will not get fake-rate weights");
    }

    let info = events.info();
    let norm = info.norm(config)?;
    debug!("Normalisation of {}: {norm}", info.name);
    let ctx = FlattenContext {
        config,
        variation,
        selection_type,
        norm,
        reweighter,
        fake_rates: fake_rates.as_ref(),
    };

    let mut writer = FlatTreeWriter::<_, F::Variable>::create(
        &opt.output,
        info,
        opt.common.compression,
    )
    .with_context(|| format!("Failed to create {:?}", opt.output))?;
    let nevents = events.number_of_entries();
    let mut progress = ProgressBar::new(nevents as u64, "Flattening events:");
    for idx in 0..nevents {
        let mut event = events.build_event(idx)?;
        if select_event(&mut event, region, config, selection_type, variation)? {
            let vars = flattener.flatten(&event, &ctx)?;
            writer.write(&vars)?;
        }
        progress.inc(1);
    }
    progress.finish();
    let nselected = writer.nentries();
    writer
        .finish()
        .with_context(|| format!("Failed to write {:?}", opt.output))?;
    info!("Wrote {nselected} of {nevents} events to {:?}", opt.output);
    Ok(())
}
