mod opt_common;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ewkino::config::AnalysisConfig;
use ewkino::event_file::EventFile;
use ewkino::fake_rate::FakeRateMaps;
use ewkino::flatten::{Flatten, TzqFlattener, WdFlattener};
use ewkino::histogram::{read_variables, HistogramVariable};
use ewkino::progress_bar::ProgressBar;
use ewkino::reweight::{Reweighter, NO_REWEIGHTING};
use ewkino::selection::{
    parse_selection_type, region, Analysis, Region, SelectionType,
};
use ewkino::systematics::{HistogramStore, Systematic, SystematicsFiller};
use log::{debug, info};

use crate::opt_common::*;

/// Fill nominal and systematically shifted histograms
#[derive(Debug, Parser)]
#[clap(about, author, version)]
struct Opt {
    /// Input event file
    input: PathBuf,

    /// Output histogram file
    output: PathBuf,

    /// Histogram declarations, one variable per line
    variables: PathBuf,

    /// Comma-separated selection regions
    event_selection: String,

    /// Lepton selection: 'tight', 'prompt' or 'fakerate'
    selection_type: String,

    /// Comma-separated uncertainty sources, e.g. 'JEC,pileup,pdf'
    #[clap(long, value_delimiter = ',')]
    systematics: Vec<Systematic>,

    #[clap(flatten)]
    weights: WeightOpt,

    #[clap(flatten)]
    common: CommonOpt,
}

struct Inputs<'a> {
    opt: &'a Opt,
    config: &'a AnalysisConfig,
    events: &'a EventFile,
    variables: &'a [HistogramVariable],
    selection_type: SelectionType,
    norm: f64,
    reweighter: &'a dyn Reweighter,
    fake_rates: Option<&'a FakeRateMaps>,
}

fn main() -> Result<()> {
    let opt: Opt = parse_args();
    init_logging(&opt.common.loglevel);
    starting();
    debug!("settings: {opt:#?}");

    let config = load_config(opt.common.config.as_deref())?;
    let regions = opt
        .event_selection
        .split(',')
        .map(|name| region(name.trim(), &config))
        .collect::<Result<Vec<_>, _>>()?;
    let selection_type = parse_selection_type(&opt.selection_type)?;
    let variables = read_variables(&opt.variables)?;

    let scale_factors = opt.weights.reweighter()?;
    let reweighter: &dyn Reweighter = match &scale_factors {
        Some(sf) => sf,
        None => &NO_REWEIGHTING,
    };
    let fake_rates = opt.weights.fake_rates()?;

    let events = open_events(&opt.input);
    let norm = events.info().norm(&config)?;
    let inputs = Inputs {
        opt: &opt,
        config: &config,
        events: &events,
        variables: &variables,
        selection_type,
        norm,
        reweighter,
        fake_rates: fake_rates.as_ref(),
    };

    let mut store = HistogramStore::new();
    for region in &regions {
        let nselected = match region.analysis {
            Analysis::Tzq => fill::<TzqFlattener>(&inputs, region, &mut store),
            Analysis::Wd => fill::<WdFlattener>(&inputs, region, &mut store),
        }?;
        info!(
            "{nselected} of {} events pass {}",
            events.number_of_entries(),
            region.name
        );
    }
    store
        .write_to_file(&opt.output)
        .with_context(|| format!("Failed to write {:?}", opt.output))?;
    info!("Wrote {} histograms to {:?}", store.len(), opt.output);
    done();
    Ok(())
}

fn fill<F: Flatten>(
    inputs: &Inputs,
    region: &Region,
    store: &mut HistogramStore,
) -> Result<usize> {
    let flattener = F::new(None);
    let sample = &inputs.events.info().name;
    let mut filler =
        SystematicsFiller::new(&flattener, region, inputs.config, &**sample);
    filler
        .selection_type(inputs.selection_type)
        .norm(inputs.norm)
        .reweighter(inputs.reweighter)
        .systematics(&inputs.opt.systematics)
        .variables(inputs.variables)?;
    if let Some(maps) = inputs.fake_rates {
        filler.fake_rates(maps);
    }

    let nevents = inputs.events.number_of_entries();
    let mut progress = ProgressBar::new(
        nevents as u64,
        &format!("Filling {}:", region.name),
    );
    for idx in 0..nevents {
        let event = inputs.events.build_event(idx)?;
        filler.fill(&event, store)?;
        progress.inc(1);
    }
    progress.finish();
    Ok(filler.finish(store))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_arguments() {
        let opt = Opt::try_parse_from([
            "ewkino-fill",
            "events.yaml",
            "hists.yaml",
            "vars.txt",
            "signalregion,wzcontrolregion",
            "prompt",
            "--systematics",
            "JEC,pdf",
        ])
        .unwrap();
        assert_eq!(opt.event_selection, "signalregion,wzcontrolregion");
        assert_eq!(opt.selection_type, "prompt");
        assert_eq!(opt.systematics, [Systematic::Jec, Systematic::Pdf]);

        let missing = Opt::try_parse_from([
            "ewkino-fill",
            "events.yaml",
            "hists.yaml",
            "vars.txt",
            "signalregion",
        ]);
        assert!(missing.is_err());
    }
}
