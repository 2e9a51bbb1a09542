use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::objects::{DMeson, Jet, Lepton, Met};

/// Data-taking period
#[derive(
    Deserialize,
    Serialize,
    Copy,
    Clone,
    Debug,
    Default,
    Display,
    EnumIter,
    EnumString,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
)]
pub enum Year {
    #[serde(rename = "2016PreVFP")]
    #[strum(serialize = "2016PreVFP")]
    Y2016PreVfp,
    #[serde(rename = "2016PostVFP")]
    #[strum(serialize = "2016PostVFP")]
    Y2016PostVfp,
    #[serde(rename = "2017")]
    #[strum(serialize = "2017")]
    Y2017,
    #[default]
    #[serde(rename = "2018")]
    #[strum(serialize = "2018")]
    Y2018,
}

/// Trigger decisions, grouped by lepton content
#[derive(Deserialize, Serialize, Copy, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Triggers {
    pub single_electron: bool,
    pub single_muon: bool,
    pub double_electron: bool,
    pub double_muon: bool,
    pub electron_muon: bool,
    pub trilepton: bool,
}

impl Triggers {
    pub fn single_lepton(&self) -> bool {
        self.single_electron || self.single_muon
    }

    pub fn any(&self) -> bool {
        self.single_lepton()
            || self.double_electron
            || self.double_muon
            || self.electron_muon
            || self.trilepton
    }
}

/// Prefiring probability weights
#[derive(Deserialize, Serialize, Copy, Clone, Debug, PartialEq)]
pub struct PrefireWeights {
    pub nominal: f64,
    pub up: f64,
    pub down: f64,
}

impl Default for PrefireWeights {
    fn default() -> Self {
        Self {
            nominal: 1.,
            up: 1.,
            down: 1.,
        }
    }
}

/// Simulation-only information
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct GenInfo {
    /// The nine LHE renormalisation/factorisation scale weights
    ///
    /// Ordering as in NanoAOD: index 3 * i + j with i (j) labelling
    /// μR (μF) = 0.5, 1, 2.
    pub scale_weights: Vec<f64>,
    /// PDF replica weights relative to the nominal weight
    pub pdf_weights: Vec<f64>,
    /// Parton-shower weights: ISR up, FSR up, ISR down, FSR down
    pub ps_weights: Vec<f64>,
    pub n_true_interactions: f64,
    pub prefire: PrefireWeights,
    /// Event lies in phase space covered by a dedicated sample
    pub overlap_veto: bool,
}

/// A single reconstructed collision event
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Event {
    run: u32,
    lumi_block: u32,
    number: u64,
    weight: f64,
    is_data: bool,
    pub year: Year,
    pub triggers: Triggers,
    pub passes_met_filters: bool,
    pub n_vertices: u32,
    pub leptons: Vec<Lepton>,
    pub jets: Vec<Jet>,
    pub d_mesons: Vec<DMeson>,
    pub met: Met,
    gen: Option<GenInfo>,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run(&self) -> u32 {
        self.run
    }

    pub fn lumi_block(&self) -> u32 {
        self.lumi_block
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    /// Generator weight, always 1 for data
    pub fn weight(&self) -> f64 {
        if self.is_data {
            1.
        } else {
            self.weight
        }
    }

    pub fn is_data(&self) -> bool {
        self.is_data
    }

    pub fn is_mc(&self) -> bool {
        !self.is_data
    }

    pub fn gen(&self) -> Option<&GenInfo> {
        self.gen.as_ref()
    }

    pub fn n_loose_leptons(&self) -> usize {
        self.leptons.iter().filter(|l| l.is_loose()).count()
    }

    pub fn n_fo_leptons(&self) -> usize {
        self.leptons.iter().filter(|l| l.is_fo()).count()
    }

    pub fn n_tight_leptons(&self) -> usize {
        self.leptons.iter().filter(|l| l.is_tight()).count()
    }
}

/// Incremental construction of an [Event]
#[derive(Clone, Debug, Default)]
pub struct EventBuilder {
    event: Event,
}

impl EventBuilder {
    pub fn new(run: u32, lumi_block: u32, number: u64) -> Self {
        Self {
            event: Event {
                run,
                lumi_block,
                number,
                weight: 1.,
                passes_met_filters: true,
                ..Default::default()
            },
        }
    }

    pub fn weight(&mut self, weight: f64) -> &mut Self {
        self.event.weight = weight;
        self
    }

    pub fn data(&mut self, is_data: bool) -> &mut Self {
        self.event.is_data = is_data;
        self
    }

    pub fn year(&mut self, year: Year) -> &mut Self {
        self.event.year = year;
        self
    }

    pub fn triggers(&mut self, triggers: Triggers) -> &mut Self {
        self.event.triggers = triggers;
        self
    }

    pub fn met_filters(&mut self, pass: bool) -> &mut Self {
        self.event.passes_met_filters = pass;
        self
    }

    pub fn n_vertices(&mut self, n: u32) -> &mut Self {
        self.event.n_vertices = n;
        self
    }

    pub fn add_lepton(&mut self, lepton: Lepton) -> &mut Self {
        self.event.leptons.push(lepton);
        self
    }

    pub fn add_jet(&mut self, jet: Jet) -> &mut Self {
        self.event.jets.push(jet);
        self
    }

    pub fn add_d_meson(&mut self, d: DMeson) -> &mut Self {
        self.event.d_mesons.push(d);
        self
    }

    pub fn met(&mut self, met: Met) -> &mut Self {
        self.event.met = met;
        self
    }

    pub fn gen(&mut self, gen: GenInfo) -> &mut Self {
        self.event.gen = Some(gen);
        self
    }

    pub fn build(self) -> Event {
        let mut event = self.event;
        if event.is_data {
            event.gen = None;
        }
        event
    }
}

impl From<EventBuilder> for Event {
    fn from(b: EventBuilder) -> Self {
        b.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_weight_is_one() {
        let mut builder = EventBuilder::new(1, 2, 3);
        builder.weight(0.3).data(true).gen(GenInfo::default());
        let ev = builder.build();
        assert_eq!(ev.weight(), 1.);
        assert!(ev.gen().is_none());
        assert_eq!((ev.run(), ev.lumi_block(), ev.number()), (1, 2, 3));
    }

    #[test]
    fn mc_weight_is_kept() {
        let mut builder = EventBuilder::new(1, 1, 1);
        builder.weight(-0.3);
        assert_eq!(builder.build().weight(), -0.3);
    }
}
