use particle_id::{
    sm_elementary_particles::{electron, muon},
    ParticleID,
};
use serde::{Deserialize, Serialize};

use crate::four_vector::FourVector;
use crate::variation::Variation;

/// Lepton flavour
#[derive(
    Deserialize, Serialize, Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash,
)]
pub enum Flavour {
    Electron,
    Muon,
    Tau,
}

impl Flavour {
    /// Numeric code used in flat output (electron 0, muon 1, tau 2)
    pub fn code(self) -> f64 {
        match self {
            Flavour::Electron => 0.,
            Flavour::Muon => 1.,
            Flavour::Tau => 2.,
        }
    }
}

/// Lepton identification level
///
/// The levels are nested: a tight lepton is also fakeable and loose.
#[derive(
    Deserialize,
    Serialize,
    Copy,
    Clone,
    Debug,
    Default,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
)]
pub enum LeptonQuality {
    #[default]
    None,
    Loose,
    Fakeable,
    Tight,
}

/// A calibrated, identified charged lepton
#[derive(Clone, Debug, PartialEq)]
pub struct Lepton {
    p: FourVector,
    id: ParticleID,
    quality: LeptonQuality,
    cone_pt: f64,
    is_prompt: bool,
}

impl Lepton {
    /// A tight, prompt lepton with the given momentum and PDG id
    pub fn new(p: FourVector, id: ParticleID) -> Self {
        Self {
            p,
            id,
            quality: LeptonQuality::Tight,
            cone_pt: p.pt(),
            is_prompt: true,
        }
    }

    pub fn with_quality(mut self, quality: LeptonQuality) -> Self {
        self.quality = quality;
        self
    }

    /// Cone-corrected transverse momentum
    ///
    /// Only relevant for fakeable leptons failing the tight
    /// identification, for all others this should equal `pt`.
    pub fn with_cone_pt(mut self, cone_pt: f64) -> Self {
        self.cone_pt = cone_pt;
        self
    }

    pub fn with_prompt(mut self, is_prompt: bool) -> Self {
        self.is_prompt = is_prompt;
        self
    }

    pub fn p4(&self) -> &FourVector {
        &self.p
    }

    pub fn pt(&self) -> f64 {
        self.p.pt()
    }

    pub fn eta(&self) -> f64 {
        self.p.eta()
    }

    pub fn phi(&self) -> f64 {
        self.p.phi()
    }

    pub fn pdg_id(&self) -> ParticleID {
        self.id
    }

    pub fn flavour(&self) -> Flavour {
        let abs = self.id.abs();
        if abs == electron {
            Flavour::Electron
        } else if abs == muon {
            Flavour::Muon
        } else {
            Flavour::Tau
        }
    }

    pub fn is_electron(&self) -> bool {
        self.flavour() == Flavour::Electron
    }

    pub fn is_muon(&self) -> bool {
        self.flavour() == Flavour::Muon
    }

    pub fn is_tau(&self) -> bool {
        self.flavour() == Flavour::Tau
    }

    /// Electric charge in units of e
    pub fn charge(&self) -> i32 {
        if self.id.is_anti_particle() {
            1
        } else {
            -1
        }
    }

    pub fn quality(&self) -> LeptonQuality {
        self.quality
    }

    pub fn is_loose(&self) -> bool {
        self.quality >= LeptonQuality::Loose
    }

    pub fn is_fo(&self) -> bool {
        self.quality >= LeptonQuality::Fakeable
    }

    pub fn is_tight(&self) -> bool {
        self.quality >= LeptonQuality::Tight
    }

    /// Transverse momentum used for thresholds and fake rates
    pub fn cone_pt(&self) -> f64 {
        if self.is_tight() {
            self.pt()
        } else {
            self.cone_pt
        }
    }

    /// Generator-level matching to a prompt lepton (always true for data)
    pub fn is_prompt(&self) -> bool {
        self.is_prompt
    }

    /// Whether `self` and `other` form an opposite-sign same-flavour pair
    pub fn is_ossf_with(&self, other: &Lepton) -> bool {
        self.flavour() == other.flavour() && self.charge() != other.charge()
    }
}

/// A calibrated jet
#[derive(Clone, Debug, PartialEq)]
pub struct Jet {
    p: FourVector,
    pub deep_flavour: f64,
    pub hadron_flavour: i32,
    pub is_tight: bool,
    pub pt_jec_up: f64,
    pub pt_jec_down: f64,
    pub pt_jer_up: f64,
    pub pt_jer_down: f64,
}

impl Jet {
    /// A jet passing the tight identification without calibration shifts
    pub fn new(p: FourVector, deep_flavour: f64) -> Self {
        let pt = p.pt();
        Self {
            p,
            deep_flavour,
            hadron_flavour: 0,
            is_tight: true,
            pt_jec_up: pt,
            pt_jec_down: pt,
            pt_jer_up: pt,
            pt_jer_down: pt,
        }
    }

    pub fn p4(&self) -> &FourVector {
        &self.p
    }

    pub fn pt(&self) -> f64 {
        self.p.pt()
    }

    pub fn eta(&self) -> f64 {
        self.p.eta()
    }

    /// Transverse momentum after applying the given variation
    pub fn pt_for(&self, variation: Variation) -> f64 {
        match variation {
            Variation::JecUp => self.pt_jec_up,
            Variation::JecDown => self.pt_jec_down,
            Variation::JerUp => self.pt_jer_up,
            Variation::JerDown => self.pt_jer_down,
            Variation::Nominal | Variation::UnclUp | Variation::UnclDown => {
                self.pt()
            }
        }
    }

    /// Four-momentum scaled to the varied transverse momentum
    pub fn p4_for(&self, variation: Variation) -> FourVector {
        let pt = self.pt();
        if pt > 0. {
            self.p * (self.pt_for(variation) / pt)
        } else {
            self.p
        }
    }

    /// Whether the jet is b-tagged at a given DeepFlavour threshold
    ///
    /// b-tagging is only defined inside the tracker acceptance.
    pub fn is_btagged(&self, working_point: f64, max_abs_eta: f64) -> bool {
        self.eta().abs() < max_abs_eta && self.deep_flavour > working_point
    }

    /// True heavy-flavour (b or c) jet
    pub fn is_heavy_flavour(&self) -> bool {
        self.hadron_flavour == 5 || self.hadron_flavour == 4
    }
}

/// A reconstructed D meson candidate
#[derive(Clone, Debug, PartialEq)]
pub struct DMeson {
    p: FourVector,
    pub isolation: f64,
    pub delta_r_daughters: f64,
    pub has_gen_match: bool,
}

impl DMeson {
    pub fn new(p: FourVector, isolation: f64, delta_r_daughters: f64) -> Self {
        Self {
            p,
            isolation,
            delta_r_daughters,
            has_gen_match: false,
        }
    }

    pub fn p4(&self) -> &FourVector {
        &self.p
    }

    pub fn pt(&self) -> f64 {
        self.p.pt()
    }

    pub fn mass(&self) -> f64 {
        self.p.m()
    }
}

/// Transverse magnitude and azimuth
#[derive(Deserialize, Serialize, Copy, Clone, Debug, Default, PartialEq)]
pub struct PtPhi {
    pub pt: f64,
    pub phi: f64,
}

impl PtPhi {
    pub fn new(pt: f64, phi: f64) -> Self {
        Self { pt, phi }
    }
}

/// Missing transverse momentum with its calibration shifts
#[derive(Deserialize, Serialize, Copy, Clone, Debug, Default, PartialEq)]
pub struct Met {
    pub nominal: PtPhi,
    pub jec_up: PtPhi,
    pub jec_down: PtPhi,
    pub jer_up: PtPhi,
    pub jer_down: PtPhi,
    pub uncl_up: PtPhi,
    pub uncl_down: PtPhi,
}

impl Met {
    /// Missing momentum without any calibration shifts
    pub fn new(pt: f64, phi: f64) -> Self {
        let nominal = PtPhi::new(pt, phi);
        Self {
            nominal,
            jec_up: nominal,
            jec_down: nominal,
            jer_up: nominal,
            jer_down: nominal,
            uncl_up: nominal,
            uncl_down: nominal,
        }
    }

    pub fn for_variation(&self, variation: Variation) -> PtPhi {
        match variation {
            Variation::Nominal => self.nominal,
            Variation::JecUp => self.jec_up,
            Variation::JecDown => self.jec_down,
            Variation::JerUp => self.jer_up,
            Variation::JerDown => self.jer_down,
            Variation::UnclUp => self.uncl_up,
            Variation::UnclDown => self.uncl_down,
        }
    }

    /// Massless transverse four-vector for the given variation
    pub fn p4_for(&self, variation: Variation) -> FourVector {
        let PtPhi { pt, phi } = self.for_variation(variation);
        FourVector::from_pt_phi(pt, phi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn lepton_charge_and_flavour() {
        let p = FourVector::from_pt_eta_phi_m(30., 0., 0., 0.);
        let mu_minus = Lepton::new(p, muon);
        assert_eq!(mu_minus.charge(), -1);
        assert_eq!(mu_minus.flavour(), Flavour::Muon);
        let e_plus = Lepton::new(p, ParticleID::new(-11));
        assert_eq!(e_plus.charge(), 1);
        assert!(e_plus.is_electron());
        assert!(!mu_minus.is_ossf_with(&e_plus));
        let mu_plus = Lepton::new(p, ParticleID::new(-13));
        assert!(mu_minus.is_ossf_with(&mu_plus));
    }

    #[test]
    fn quality_levels_are_nested() {
        let p = FourVector::from_pt_eta_phi_m(30., 0., 0., 0.);
        let l = Lepton::new(p, muon)
            .with_quality(LeptonQuality::Fakeable)
            .with_cone_pt(40.);
        assert!(l.is_loose() && l.is_fo() && !l.is_tight());
        assert_abs_diff_eq!(l.cone_pt(), 40.);
        let t = l.with_quality(LeptonQuality::Tight);
        assert_abs_diff_eq!(t.cone_pt(), 30., epsilon = 1e-9);
    }

    #[test]
    fn varied_jet_momentum() {
        let mut jet =
            Jet::new(FourVector::from_pt_eta_phi_m(40., 1., 0.3, 5.), 0.9);
        jet.pt_jec_up = 44.;
        let up = jet.p4_for(Variation::JecUp);
        assert_abs_diff_eq!(up.pt(), 44., epsilon = 1e-9);
        assert_abs_diff_eq!(up.eta(), 1., epsilon = 1e-9);
        assert_abs_diff_eq!(jet.pt(), 40., epsilon = 1e-9);
        assert_abs_diff_eq!(jet.pt_for(Variation::UnclUp), 40., epsilon = 1e-9);
    }
}
