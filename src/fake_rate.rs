use std::path::Path;

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::binned::{from_yaml_file, BinnedMap2D, BinnedMapError};
use crate::event::Event;
use crate::objects::{Flavour, Lepton};

/// Fake rates in bins of cone pt and |η|
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct FakeRateMaps {
    pub muon: BinnedMap2D,
    pub electron: BinnedMap2D,
}

impl FakeRateMaps {
    pub fn from_file(file: impl AsRef<Path>) -> Result<Self, BinnedMapError> {
        let maps: Self = from_yaml_file(file.as_ref())?;
        maps.validate()?;
        debug!("Read fake-rate maps from {:?}", file.as_ref());
        Ok(maps)
    }

    /// Check that all fake rates lie in [0, 1)
    pub fn validate(&self) -> Result<(), BinnedMapError> {
        let all = self.muon.values().chain(self.electron.values());
        for f in all {
            if !(0. ..1.).contains(&f) {
                return Err(BinnedMapError::Invalid(format!(
                    "Fake rate {f} outside [0, 1)"
                )));
            }
        }
        Ok(())
    }

    /// Fake rate for a lepton, zero for taus
    pub fn fake_rate(&self, lepton: &Lepton) -> f64 {
        let map = match lepton.flavour() {
            Flavour::Muon => &self.muon,
            Flavour::Electron => &self.electron,
            Flavour::Tau => return 0.,
        };
        map.value(lepton.cone_pt(), lepton.eta().abs())
    }
}

/// Weight of an event in the fake-rate application region
///
/// Starts at -1 and picks up a factor -f/(1-f) for every fakeable
/// lepton failing the tight identification. Events without such
/// leptons keep a weight of -1.
pub fn fake_rate_weight(event: &Event, maps: &FakeRateMaps) -> f64 {
    let mut weight = -1.;
    for lepton in event.leptons.iter().filter(|l| l.is_fo() && !l.is_tight()) {
        let f = maps.fake_rate(lepton);
        weight *= -f / (1. - f);
    }
    trace!("Fake-rate weight: {weight}");
    weight
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventBuilder;
    use crate::four_vector::FourVector;
    use crate::objects::LeptonQuality;
    use approx::assert_abs_diff_eq;
    use particle_id::ParticleID;

    fn maps() -> FakeRateMaps {
        let yaml = "
muon:
  x_edges: [10, 30, 100]
  y_edges: [0, 1.2, 2.4]
  values: [[0.2, 0.25], [0.1, 0.15]]
electron:
  x_edges: [10, 100]
  y_edges: [0, 2.5]
  values: [[0.5]]
";
        serde_yaml::from_str(yaml).unwrap()
    }

    fn fo(pdg: i32, cone_pt: f64, eta: f64) -> Lepton {
        Lepton::new(
            FourVector::from_pt_eta_phi_m(0.7 * cone_pt, eta, 0., 0.),
            ParticleID::new(pdg),
        )
        .with_quality(LeptonQuality::Fakeable)
        .with_cone_pt(cone_pt)
    }

    #[test]
    fn lookup() {
        let maps = maps();
        maps.validate().unwrap();
        assert_eq!(maps.fake_rate(&fo(13, 20., 1.5)), 0.25);
        assert_eq!(maps.fake_rate(&fo(-13, 50., -0.3)), 0.1);
        assert_eq!(maps.fake_rate(&fo(11, 500., 0.)), 0.5);
        assert_eq!(maps.fake_rate(&fo(15, 50., 0.)), 0.);
    }

    #[test]
    fn weight_per_failing_lepton() {
        let maps = maps();
        let mut builder = EventBuilder::new(1, 1, 1);
        builder
            .add_lepton(fo(13, 50., 0.))
            .add_lepton(fo(11, 20., 0.))
            .add_lepton(Lepton::new(
                FourVector::from_pt_eta_phi_m(40., 0., 1., 0.),
                ParticleID::new(-11),
            ));
        let ev = builder.build();
        // -1 * (-0.1/0.9) * (-0.5/0.5)
        assert_abs_diff_eq!(fake_rate_weight(&ev, &maps), -1. / 9.);
    }

    #[test]
    fn empty_product_stays_negative() {
        let mut builder = EventBuilder::new(1, 1, 1);
        builder.add_lepton(Lepton::new(
            FourVector::from_pt_eta_phi_m(40., 0., 1., 0.),
            ParticleID::new(13),
        ));
        assert_eq!(fake_rate_weight(&builder.build(), &maps()), -1.);
    }

    #[test]
    fn invalid_rate() {
        let mut maps = maps();
        maps.electron =
            BinnedMap2D::new(vec![10., 100.], vec![0., 2.5], vec![vec![1.]], vec![])
                .unwrap();
        assert!(maps.validate().is_err());
    }
}
