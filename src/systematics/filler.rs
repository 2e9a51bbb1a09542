use log::{debug, trace};
use strum::IntoEnumIterator;
use thiserror::Error;

use crate::config::AnalysisConfig;
use crate::event::Event;
use crate::fake_rate::FakeRateMaps;
use crate::flatten::{Flatten, FlattenContext, FlattenError, Schema, VariableMap};
use crate::histogram::{Histogram, HistogramVariable};
use crate::reweight::{Reweighter, NO_REWEIGHTING};
use crate::selection::{select_event, Region, SelectionError, SelectionType};
use crate::variation::{Direction, Variation};

use super::{HistKey, HistogramStore, Shift, Systematic, SystematicKind};

#[derive(Debug, Error)]
pub enum FillError {
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error(transparent)]
    Flatten(#[from] FlattenError),
}

/// Index of a scale variation in the generator scale weights
///
/// Weights are ordered as `3 * i + j` where `i` (`j`) labels a
/// renormalisation (factorisation) scale factor of 0.5, 1, 2.
fn scale_index(syst: Systematic, dir: Direction) -> Option<usize> {
    use Direction::*;
    match (syst, dir) {
        (Systematic::ScaleMuR, Up) => Some(7),
        (Systematic::ScaleMuR, Down) => Some(1),
        (Systematic::ScaleMuF, Up) => Some(5),
        (Systematic::ScaleMuF, Down) => Some(3),
        (Systematic::ScaleMuRMuF, Up) => Some(8),
        (Systematic::ScaleMuRMuF, Down) => Some(0),
        _ => None,
    }
}

/// Index of a parton-shower variation in the generator shower weights
fn shower_index(syst: Systematic, dir: Direction) -> Option<usize> {
    use Direction::*;
    match (syst, dir) {
        (Systematic::Isr, Up) => Some(0),
        (Systematic::Fsr, Up) => Some(1),
        (Systematic::Isr, Down) => Some(2),
        (Systematic::Fsr, Down) => Some(3),
        _ => None,
    }
}

/// Relative weight of a generator-level variation
///
/// Missing weights leave the event weight unchanged.
fn generator_factor(event: &Event, syst: Systematic, dir: Direction) -> f64 {
    let Some(gen) = event.gen() else {
        return 1.;
    };
    let weight = if let Some(idx) = scale_index(syst, dir) {
        gen.scale_weights.get(idx)
    } else if let Some(idx) = shower_index(syst, dir) {
        gen.ps_weights.get(idx)
    } else {
        None
    };
    weight.copied().unwrap_or(1.)
}

/// Fills nominal and shifted histograms for one region and sample
pub struct SystematicsFiller<'a, F: Flatten> {
    flattener: &'a F,
    region: &'a Region,
    config: &'a AnalysisConfig,
    sample: String,
    selection_type: SelectionType,
    norm: f64,
    reweighter: &'a dyn Reweighter,
    fake_rates: Option<&'a FakeRateMaps>,
    variables: Vec<(F::Variable, Histogram)>,
    systematics: Vec<Systematic>,
    nselected: usize,
    seen_mc: bool,
}

impl<'a, F: Flatten> SystematicsFiller<'a, F> {
    pub fn new(
        flattener: &'a F,
        region: &'a Region,
        config: &'a AnalysisConfig,
        sample: impl Into<String>,
    ) -> Self {
        Self {
            flattener,
            region,
            config,
            sample: sample.into(),
            selection_type: SelectionType::Tight,
            norm: 1.,
            reweighter: &NO_REWEIGHTING,
            fake_rates: None,
            variables: Vec::new(),
            systematics: Vec::new(),
            nselected: 0,
            seen_mc: false,
        }
    }

    pub fn selection_type(&mut self, selection_type: SelectionType) -> &mut Self {
        self.selection_type = selection_type;
        self
    }

    pub fn norm(&mut self, norm: f64) -> &mut Self {
        self.norm = norm;
        self
    }

    pub fn reweighter(&mut self, reweighter: &'a dyn Reweighter) -> &mut Self {
        self.reweighter = reweighter;
        self
    }

    pub fn fake_rates(&mut self, maps: &'a FakeRateMaps) -> &mut Self {
        self.fake_rates = Some(maps);
        self
    }

    /// Set the distributions to fill
    ///
    /// Every name has to be a variable of the analysis.
    pub fn variables(
        &mut self,
        variables: &[HistogramVariable],
    ) -> Result<&mut Self, FlattenError> {
        self.variables = variables
            .iter()
            .map(|v| Ok((F::Variable::from_name(&v.name)?, v.histogram(&*v.name))))
            .collect::<Result<_, FlattenError>>()?;
        Ok(self)
    }

    /// Set the uncertainty sources
    ///
    /// Sources needed to derive the requested ones are added.
    pub fn systematics(&mut self, systematics: &[Systematic]) -> &mut Self {
        let mut all = Vec::new();
        for &syst in systematics {
            for &input in syst.inputs() {
                if !all.contains(&input) {
                    all.push(input)
                }
            }
            if !all.contains(&syst) {
                all.push(syst)
            }
        }
        debug!("Systematics for {}: {all:?}", self.region.name);
        self.systematics = all;
        self
    }

    /// Number of events passing the nominal selection so far
    pub fn nselected(&self) -> usize {
        self.nselected
    }

    fn context(&self, variation: Variation) -> FlattenContext<'a> {
        FlattenContext {
            config: self.config,
            variation,
            selection_type: self.selection_type,
            norm: self.norm,
            reweighter: self.reweighter,
            fake_rates: self.fake_rates,
        }
    }

    fn fill_shift(
        &self,
        store: &mut HistogramStore,
        shift: Shift,
        vars: &VariableMap<F::Variable>,
        weight: f64,
    ) {
        for (var, template) in &self.variables {
            let key = HistKey::new(shift, &*self.region.name, template.name(), &*self.sample);
            store.entry(key, template).fill(vars[*var], weight);
        }
    }

    fn fill_pdf_replicas(
        &self,
        store: &mut HistogramStore,
        event: &Event,
        vars: &VariableMap<F::Variable>,
        weight: f64,
    ) {
        let Some(gen) = event.gen() else {
            return;
        };
        for (idx, w) in gen.pdf_weights.iter().enumerate() {
            self.fill_shift(store, Shift::PdfReplica(idx), vars, weight * w);
        }
    }

    /// Fill all histograms for one event
    ///
    /// Returns whether the event passes the nominal selection.
    pub fn fill(
        &mut self,
        event: &Event,
        store: &mut HistogramStore,
    ) -> Result<bool, FillError> {
        let systematics = self.systematics.clone();

        let mut nominal_event = event.clone();
        let passes = select_event(
            &mut nominal_event,
            self.region,
            self.config,
            self.selection_type,
            Variation::Nominal,
        )?;
        if passes {
            trace!("Event {} passes {}", event.number(), self.region.name);
            self.nselected += 1;
            let ctx = self.context(Variation::Nominal);
            let vars = self.flattener.flatten(&nominal_event, &ctx)?;
            let weights = ctx.weights(&nominal_event);
            let total = weights.total();
            self.fill_shift(store, Shift::Nominal, &vars, total);
            if nominal_event.is_mc() {
                for &syst in &systematics {
                    match syst.kind() {
                        SystematicKind::Reselection => {}
                        SystematicKind::Reweighting(correction) => {
                            for dir in Direction::iter() {
                                let w = self.reweighter.total_weight_shifted(
                                    &nominal_event,
                                    correction,
                                    dir,
                                );
                                let w = weights.with_reweighting(w).total();
                                self.fill_shift(store, Shift::Varied(syst, dir), &vars, w);
                            }
                        }
                        SystematicKind::GeneratorWeight => {
                            for dir in Direction::iter() {
                                let w = total * generator_factor(&nominal_event, syst, dir);
                                self.fill_shift(store, Shift::Varied(syst, dir), &vars, w);
                            }
                        }
                        SystematicKind::Derived => {
                            if syst == Systematic::Pdf {
                                self.fill_pdf_replicas(store, &nominal_event, &vars, total);
                            }
                        }
                    }
                }
            }
        }

        if event.is_mc() {
            self.seen_mc = true;
            for &syst in &systematics {
                for dir in Direction::iter() {
                    let Some(variation) = syst.variation(dir) else {
                        continue;
                    };
                    let mut varied = event.clone();
                    let passes = select_event(
                        &mut varied,
                        self.region,
                        self.config,
                        self.selection_type,
                        variation,
                    )?;
                    if passes {
                        let ctx = self.context(variation);
                        let vars = self.flattener.flatten(&varied, &ctx)?;
                        let w = ctx.weights(&varied).total();
                        self.fill_shift(store, Shift::Varied(syst, dir), &vars, w);
                    }
                }
            }
        }
        Ok(passes)
    }

    /// Derive the remaining shifted histograms once all events are filled
    ///
    /// Returns the number of events passing the nominal selection.
    pub fn finish(self, store: &mut HistogramStore) -> usize {
        let key = |distribution: &str, shift| {
            HistKey::new(shift, &*self.region.name, distribution, &*self.sample)
        };
        // shifts without any selected event still get an empty histogram
        for (_, template) in &self.variables {
            store.entry(key(template.name(), Shift::Nominal), template);
            if !self.seen_mc {
                continue;
            }
            let nominal = key(template.name(), Shift::Nominal);
            // inputs of derived systematics come first
            for &syst in &self.systematics {
                if syst.kind() == SystematicKind::Derived {
                    store.derive(&nominal, syst);
                    continue;
                }
                for dir in Direction::iter() {
                    store.entry(nominal.with_shift(Shift::Varied(syst, dir)), template);
                }
            }
        }
        debug!(
            "{} events of {} pass {}",
            self.nselected, self.sample, self.region.name
        );
        self.nselected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventBuilder, GenInfo, Triggers};
    use crate::flatten::WdFlattener;
    use crate::four_vector::FourVector;
    use crate::objects::{Jet, Lepton, Met, PtPhi};
    use crate::selection::region;
    use approx::assert_abs_diff_eq;
    use particle_id::ParticleID;

    fn log_init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn event() -> Event {
        let mut b = EventBuilder::new(1, 1, 1);
        let mut met = Met::new(40., -1.5);
        met.jec_down = PtPhi::new(10., -1.5);
        b.weight(2.)
            .triggers(Triggers {
                single_muon: true,
                ..Default::default()
            })
            .add_lepton(Lepton::new(
                FourVector::from_pt_eta_phi_m(60., 0.5, 0.1, 0.),
                ParticleID::new(-13),
            ))
            .add_jet(Jet::new(FourVector::from_pt_eta_phi_m(60., 0.3, 2.5, 5.), 0.9))
            .met(met)
            .gen(GenInfo {
                scale_weights: vec![0.85, 1.1, 1.5, 0.95, 1., 1.05, 0.6, 0.9, 0.8],
                pdf_weights: vec![1.1, 0.9],
                ps_weights: vec![1.3, 1., 0.7, 1.],
                ..Default::default()
            });
        b.build()
    }

    fn variables() -> Vec<HistogramVariable> {
        vec![HistogramVariable {
            name: "_leptonPt".to_owned(),
            title: "lepton pt".to_owned(),
            nbins: 2,
            xlow: 0.,
            xhigh: 100.,
        }]
    }

    #[test]
    fn fill_shifts() {
        log_init();
        let config = AnalysisConfig::default();
        let region = region("wd_signalregion", &config).unwrap();
        let flattener = WdFlattener::default();
        let mut filler = SystematicsFiller::new(&flattener, &region, &config, "WH");
        filler
            .norm(0.5)
            .systematics(&[Systematic::Jec, Systematic::Isr, Systematic::Pileup])
            .variables(&variables())
            .unwrap();
        let mut store = HistogramStore::new();
        assert!(filler.fill(&event(), &mut store).unwrap());
        assert_eq!(filler.finish(&mut store), 1);

        let key = |shift| HistKey::new(shift, "wd_signalregion", "_leptonPt", "WH");
        let content = |store: &HistogramStore, shift| {
            store.get(&key(shift)).map(|h| h.bin_content(2)).unwrap_or(0.)
        };
        assert_abs_diff_eq!(content(&store, Shift::Nominal), 1.);
        let isr_up = Shift::Varied(Systematic::Isr, Direction::Up);
        assert_abs_diff_eq!(content(&store, isr_up), 1.3);
        let pu_down = Shift::Varied(Systematic::Pileup, Direction::Down);
        assert_abs_diff_eq!(content(&store, pu_down), 1.);
        // missing momentum is below threshold when shifted down
        let jec_up = Shift::Varied(Systematic::Jec, Direction::Up);
        let jec_down = Shift::Varied(Systematic::Jec, Direction::Down);
        assert_abs_diff_eq!(content(&store, jec_up), 1.);
        assert_abs_diff_eq!(content(&store, jec_down), 0.);
    }

    #[test]
    fn derived_shifts() {
        let config = AnalysisConfig::default();
        let region = region("wd_signalregion", &config).unwrap();
        let flattener = WdFlattener::default();
        let mut filler = SystematicsFiller::new(&flattener, &region, &config, "WH");
        filler
            .systematics(&[Systematic::ScaleEnvelope, Systematic::Pdf])
            .variables(&variables())
            .unwrap();
        let mut store = HistogramStore::new();
        assert!(filler.fill(&event(), &mut store).unwrap());
        filler.finish(&mut store);

        let key = |shift| HistKey::new(shift, "wd_signalregion", "_leptonPt", "WH");
        let content = |shift| store.get(&key(shift)).unwrap().bin_content(2);
        let up = |s| Shift::Varied(s, Direction::Up);
        let down = |s| Shift::Varied(s, Direction::Down);
        // nominal weight 2, anti-correlated variations are ignored
        assert_abs_diff_eq!(content(up(Systematic::ScaleEnvelope)), 2. * 1.1);
        assert_abs_diff_eq!(content(down(Systematic::ScaleEnvelope)), 2. * 0.8);
        // replicas 2.2 and 1.8 around 2
        assert_abs_diff_eq!(content(up(Systematic::Pdf)), 2.2, epsilon = 1e-12);
        assert_abs_diff_eq!(content(down(Systematic::Pdf)), 1.8, epsilon = 1e-12);
    }
}
