use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use crate::binned::{from_yaml_file, BinnedMap1D, BinnedMap2D, BinnedMapError};
use crate::event::Event;
use crate::variation::Direction;

/// Simulation-to-data corrections applied as event weights
#[derive(
    Deserialize,
    Serialize,
    Copy,
    Clone,
    Debug,
    Display,
    EnumIter,
    EnumString,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
)]
pub enum Correction {
    #[strum(serialize = "pileup")]
    Pileup,
    #[strum(serialize = "muonID")]
    MuonId,
    #[strum(serialize = "electronID")]
    ElectronId,
    #[strum(serialize = "bTag_heavy")]
    BTagHeavy,
    #[strum(serialize = "bTag_light")]
    BTagLight,
    #[strum(serialize = "prefire")]
    Prefire,
}

/// Event weights from simulation-to-data corrections
///
/// Data events are never reweighted.
pub trait Reweighter {
    /// Weight of a single correction for a simulated event
    fn weight(&self, event: &Event, correction: Correction) -> f64;

    /// Weight of a single correction shifted by its uncertainty
    fn shifted_weight(
        &self,
        event: &Event,
        correction: Correction,
        direction: Direction,
    ) -> f64;

    /// Product of all corrections
    fn total_weight(&self, event: &Event) -> f64 {
        if event.is_data() {
            return 1.;
        }
        Correction::iter().map(|c| self.weight(event, c)).product()
    }

    /// Product of all corrections with one of them shifted
    fn total_weight_shifted(
        &self,
        event: &Event,
        shifted: Correction,
        direction: Direction,
    ) -> f64 {
        if event.is_data() {
            return 1.;
        }
        Correction::iter()
            .map(|c| {
                if c == shifted {
                    self.shifted_weight(event, c, direction)
                } else {
                    self.weight(event, c)
                }
            })
            .product()
    }
}

pub struct NoReweighter {}
impl Reweighter for NoReweighter {
    fn weight(&self, _event: &Event, _correction: Correction) -> f64 {
        1.
    }

    fn shifted_weight(
        &self,
        _event: &Event,
        _correction: Correction,
        _direction: Direction,
    ) -> f64 {
        1.
    }
}

/// Apply no corrections
pub const NO_REWEIGHTING: NoReweighter = NoReweighter {};

/// Scale factors read from binned maps
///
/// - pile-up: in the true number of interactions
/// - lepton identification: in pt and |η| of each fakeable lepton
/// - b-tagging: in pt and DeepFlavour score of each jet, separately
///   for heavy- and light-flavour jets
/// - prefiring: taken from the event itself
///
/// Missing maps correspond to unit weights.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct ScaleFactorReweighter {
    pub pileup: Option<BinnedMap1D>,
    pub muon_id: Option<BinnedMap2D>,
    pub electron_id: Option<BinnedMap2D>,
    pub btag_heavy: Option<BinnedMap2D>,
    pub btag_light: Option<BinnedMap2D>,
}

impl ScaleFactorReweighter {
    pub fn from_file(file: impl AsRef<Path>) -> Result<Self, BinnedMapError> {
        let reweighter = from_yaml_file(file.as_ref())?;
        debug!("Read scale factors from {:?}", file.as_ref());
        Ok(reweighter)
    }

    fn evaluate(
        &self,
        event: &Event,
        correction: Correction,
        direction: Option<Direction>,
    ) -> f64 {
        let lookup_1d = |map: &BinnedMap1D, x| match direction {
            None => map.value(x),
            Some(dir) => map.shifted(x, dir),
        };
        let lookup_2d = |map: &BinnedMap2D, x, y| match direction {
            None => map.value(x, y),
            Some(dir) => map.shifted(x, y, dir),
        };
        match correction {
            Correction::Pileup => match (&self.pileup, event.gen()) {
                (Some(map), Some(gen)) => lookup_1d(map, gen.n_true_interactions),
                _ => 1.,
            },
            Correction::MuonId | Correction::ElectronId => {
                let muons = correction == Correction::MuonId;
                let map = if muons { &self.muon_id } else { &self.electron_id };
                let Some(map) = map else { return 1. };
                event
                    .leptons
                    .iter()
                    .filter(|l| l.is_fo())
                    .filter(|l| if muons { l.is_muon() } else { l.is_electron() })
                    .map(|l| lookup_2d(map, l.pt(), l.eta().abs()))
                    .product()
            }
            Correction::BTagHeavy | Correction::BTagLight => {
                let heavy = correction == Correction::BTagHeavy;
                let map = if heavy { &self.btag_heavy } else { &self.btag_light };
                let Some(map) = map else { return 1. };
                event
                    .jets
                    .iter()
                    .filter(|j| j.is_heavy_flavour() == heavy)
                    .map(|j| lookup_2d(map, j.pt(), j.deep_flavour))
                    .product()
            }
            Correction::Prefire => {
                let Some(gen) = event.gen() else { return 1. };
                match direction {
                    None => gen.prefire.nominal,
                    Some(Direction::Up) => gen.prefire.up,
                    Some(Direction::Down) => gen.prefire.down,
                }
            }
        }
    }
}

impl Reweighter for ScaleFactorReweighter {
    fn weight(&self, event: &Event, correction: Correction) -> f64 {
        self.evaluate(event, correction, None)
    }

    fn shifted_weight(
        &self,
        event: &Event,
        correction: Correction,
        direction: Direction,
    ) -> f64 {
        self.evaluate(event, correction, Some(direction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventBuilder, GenInfo, PrefireWeights};
    use crate::four_vector::FourVector;
    use crate::objects::{Jet, Lepton};
    use approx::assert_abs_diff_eq;
    use particle_id::ParticleID;

    fn reweighter() -> ScaleFactorReweighter {
        let yaml = "
pileup:
  edges: [0, 20, 40, 80]
  values: [1.1, 1.0, 0.8]
  errors: [0.1, 0.05, 0.1]
muon_id:
  x_edges: [10, 200]
  y_edges: [0, 2.4]
  values: [[0.98]]
  errors: [[0.01]]
btag_heavy:
  x_edges: [20, 1000]
  y_edges: [0, 1]
  values: [[0.9]]
";
        serde_yaml::from_str(yaml).unwrap()
    }

    fn event(is_data: bool) -> Event {
        let mut builder = EventBuilder::new(1, 1, 1);
        builder
            .data(is_data)
            .weight(2.)
            .add_lepton(Lepton::new(
                FourVector::from_pt_eta_phi_m(40., 0.5, 0., 0.),
                ParticleID::new(13),
            ))
            .add_lepton(Lepton::new(
                FourVector::from_pt_eta_phi_m(30., 0.5, 2., 0.),
                ParticleID::new(-11),
            ))
            .gen(GenInfo {
                n_true_interactions: 30.,
                prefire: PrefireWeights {
                    nominal: 0.99,
                    up: 1.,
                    down: 0.98,
                },
                ..Default::default()
            });
        let mut b = Jet::new(FourVector::from_pt_eta_phi_m(50., 0., 1., 5.), 0.8);
        b.hadron_flavour = 5;
        builder.add_jet(b);
        builder.add_jet(Jet::new(FourVector::from_pt_eta_phi_m(30., 1., 1., 5.), 0.1));
        builder.build()
    }

    #[test]
    fn total_weight() {
        let rw = reweighter();
        let ev = event(false);
        assert_abs_diff_eq!(rw.total_weight(&ev), 1.0 * 0.98 * 0.9 * 0.99);
        assert_abs_diff_eq!(
            rw.total_weight_shifted(&ev, Correction::MuonId, Direction::Up),
            1.0 * 0.99 * 0.9 * 0.99
        );
        assert_abs_diff_eq!(
            rw.shifted_weight(&ev, Correction::Pileup, Direction::Down),
            0.95
        );
        assert_eq!(rw.total_weight(&event(true)), 1.);
        assert_eq!(NO_REWEIGHTING.total_weight(&ev), 1.);

        let shared: &dyn Reweighter = &rw;
        assert_eq!(shared.total_weight(&ev), rw.total_weight(&ev));
    }

    #[test]
    fn correction_names() {
        assert_eq!(Correction::BTagHeavy.to_string(), "bTag_heavy");
        assert_eq!("muonID".parse::<Correction>().unwrap(), Correction::MuonId);
    }
}
