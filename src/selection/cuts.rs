use log::trace;
use serde::{Deserialize, Serialize};

use crate::candidates::best_ossf_z_pair;
use crate::config::{AnalysisConfig, ConfigError, WorkingPoint};
use crate::event::Event;
use crate::four_vector::FourVector;
use crate::masses::Z_MASS;
use crate::objects::Lepton;
use crate::variation::Variation;

use super::SelectionType;

/// Which triggers may have fired
#[derive(Deserialize, Serialize, Copy, Clone, Debug, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerRequirement {
    /// Any single-, di- or trilepton trigger
    Any,
    SingleLepton,
}

/// A single selection requirement
///
/// Cuts are evaluated on events already processed with
/// [prepare_event](super::prepare_event).
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Cut {
    /// At least one fakeable lepton survives the object cleaning
    ObjectCleaning,
    MetFilters,
    Trigger(TriggerRequirement),
    /// Exact number of fakeable leptons
    LeptonCount(usize),
    /// Minimum cone pt of the leading fakeable leptons, in order
    PtThresholds(Vec<f64>),
    /// Remove simulated events covered by a dedicated sample
    OverlapRemoval,
    /// Minimum missing transverse momentum
    MetThreshold(f64),
    /// An opposite-sign same-flavour pair inside the Z mass window
    ZCandidate { window: f64 },
    /// No opposite-sign same-flavour pair inside the Z mass window
    ZVeto { window: f64 },
    /// Two disjoint opposite-sign same-flavour pairs inside the Z window
    TwoZCandidates { window: f64 },
    /// Three-lepton mass inside the Z mass window
    TrileptonMass { window: f64 },
    JetCount { min: usize, max: Option<usize> },
    BJetCount {
        min: usize,
        max: Option<usize>,
        working_point: WorkingPoint,
    },
    /// At least one selected D meson candidate
    DMeson,
    /// Lepton identification according to the [SelectionType]
    SelectionType,
}

/// Everything a cut may depend on apart from the event itself
#[derive(Copy, Clone, Debug)]
pub struct SelectionContext<'a> {
    pub config: &'a AnalysisConfig,
    pub selection_type: SelectionType,
    pub variation: Variation,
}

impl<'a> SelectionContext<'a> {
    pub fn new(
        config: &'a AnalysisConfig,
        selection_type: SelectionType,
        variation: Variation,
    ) -> Self {
        Self {
            config,
            selection_type,
            variation,
        }
    }
}

impl Cut {
    /// Label used in logs and cutflow histograms
    pub fn label(&self) -> &'static str {
        match self {
            Cut::ObjectCleaning => "pass-object-cleaning",
            Cut::MetFilters => "pass-MET-filters",
            Cut::Trigger(_) => "pass-trigger",
            Cut::LeptonCount(_) => "pass-lepton-count",
            Cut::PtThresholds(_) => "pass-pt-thresholds",
            Cut::OverlapRemoval => "pass-overlap-removal",
            Cut::MetThreshold(_) => "pass-MET-threshold",
            Cut::ZCandidate { .. } => "pass-Z-candidate",
            Cut::ZVeto { .. } => "pass-Z-veto",
            Cut::TwoZCandidates { .. } => "pass-two-Z-candidates",
            Cut::TrileptonMass { .. } => "pass-trilepton-mass",
            Cut::JetCount { .. } => "pass-jet-count",
            Cut::BJetCount { .. } => "pass-b-jet-count",
            Cut::DMeson => "pass-D-meson",
            Cut::SelectionType => "pass-selection-type",
        }
    }

    pub fn passes(
        &self,
        event: &Event,
        ctx: &SelectionContext,
    ) -> Result<bool, ConfigError> {
        let pass = match self {
            Cut::ObjectCleaning => event.n_fo_leptons() > 0,
            Cut::MetFilters => event.passes_met_filters,
            Cut::Trigger(TriggerRequirement::Any) => event.triggers.any(),
            Cut::Trigger(TriggerRequirement::SingleLepton) => {
                event.triggers.single_lepton()
            }
            Cut::LeptonCount(n) => event.n_fo_leptons() == *n,
            Cut::PtThresholds(thresholds) => {
                let fo = fo_leptons(event);
                fo.len() >= thresholds.len()
                    && fo
                        .iter()
                        .zip(thresholds)
                        .all(|(l, min)| l.cone_pt() > *min)
            }
            Cut::OverlapRemoval => {
                event.gen().map(|g| !g.overlap_veto).unwrap_or(true)
            }
            Cut::MetThreshold(min) => {
                event.met.for_variation(ctx.variation).pt > *min
            }
            Cut::ZCandidate { window } => z_in_window(event, *window),
            Cut::ZVeto { window } => !z_in_window(event, *window),
            Cut::TwoZCandidates { window } => two_z_in_window(event, *window),
            Cut::TrileptonMass { window } => {
                let fo = fo_leptons(event);
                fo.len() >= 3 && {
                    let p: FourVector = fo[..3].iter().map(|l| *l.p4()).sum();
                    (p.m() - Z_MASS).abs() < *window
                }
            }
            Cut::JetCount { min, max } => {
                in_range(event.jets.len(), *min, *max)
            }
            Cut::BJetCount {
                min,
                max,
                working_point,
            } => {
                let threshold = ctx
                    .config
                    .btag_threshold(event.year, *working_point)?;
                let max_eta = ctx.config.jets.btag_max_abs_eta;
                let nb = event
                    .jets
                    .iter()
                    .filter(|j| j.is_btagged(threshold, max_eta))
                    .count();
                in_range(nb, *min, *max)
            }
            Cut::DMeson => !event.d_mesons.is_empty(),
            Cut::SelectionType => passes_selection_type(event, ctx.selection_type),
        };
        trace!("{}: {pass}", self.label());
        Ok(pass)
    }
}

fn in_range(n: usize, min: usize, max: Option<usize>) -> bool {
    n >= min && max.map(|max| n <= max).unwrap_or(true)
}

fn fo_leptons(event: &Event) -> Vec<Lepton> {
    event.leptons.iter().filter(|l| l.is_fo()).cloned().collect()
}

fn z_in_window(event: &Event, window: f64) -> bool {
    best_ossf_z_pair(&fo_leptons(event))
        .map(|z| (z.mass - Z_MASS).abs() < window)
        .unwrap_or(false)
}

fn two_z_in_window(event: &Event, window: f64) -> bool {
    let leptons = fo_leptons(event);
    let Some(first) = best_ossf_z_pair(&leptons) else {
        return false;
    };
    if (first.mass - Z_MASS).abs() >= window {
        return false;
    }
    let rest: Vec<_> = leptons
        .iter()
        .enumerate()
        .filter(|(idx, _)| !first.contains(*idx))
        .map(|(_, l)| l.clone())
        .collect();
    best_ossf_z_pair(&rest)
        .map(|z| (z.mass - Z_MASS).abs() < window)
        .unwrap_or(false)
}

fn passes_selection_type(event: &Event, selection_type: SelectionType) -> bool {
    let mut fo = event.leptons.iter().filter(|l| l.is_fo());
    match selection_type {
        SelectionType::Tight => fo.all(|l| l.is_tight()),
        SelectionType::Prompt => fo.all(|l| {
            l.is_tight() && (event.is_data() || l.is_prompt())
        }),
        SelectionType::FakeRate => fo.any(|l| !l.is_tight()),
    }
}
