use itertools::Itertools;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::candidates::{best_ossf_z_pair, tag_top};
use crate::config::WorkingPoint;
use crate::event::Event;
use crate::four_vector::FourVector;
use crate::masses::W_MASS;
use crate::mva::BoundMva;
use crate::neutrino::solve_neutrino_pz;
use crate::objects::Lepton;

use super::{Flatten, FlattenContext, FlattenError, Schema, VariableMap};

/// Observables of the tZq analysis
#[derive(
    Copy,
    Clone,
    Debug,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
)]
pub enum TzqVariable {
    #[strum(serialize = "_runNb")]
    RunNb,
    #[strum(serialize = "_lumiBlock")]
    LumiBlock,
    #[strum(serialize = "_eventNb")]
    EventNb,
    #[strum(serialize = "_eventWeight")]
    EventWeight,
    #[strum(serialize = "_xsecNorm")]
    XsecNorm,
    #[strum(serialize = "_reweightingWeight")]
    ReweightingWeight,
    #[strum(serialize = "_fakeRateWeight")]
    FakeRateWeight,
    #[strum(serialize = "_totWeight")]
    TotWeight,
    #[strum(serialize = "_nLeptons")]
    NLeptons,
    #[strum(serialize = "_nJets")]
    NJets,
    #[strum(serialize = "_nBJets")]
    NBJets,
    #[strum(serialize = "_nVertices")]
    NVertices,
    #[strum(serialize = "_leptonPtLeading")]
    LeptonPtLeading,
    #[strum(serialize = "_leptonPtSubLeading")]
    LeptonPtSubLeading,
    #[strum(serialize = "_leptonPtTrailing")]
    LeptonPtTrailing,
    #[strum(serialize = "_leptonEtaLeading")]
    LeptonEtaLeading,
    #[strum(serialize = "_leptonEtaSubLeading")]
    LeptonEtaSubLeading,
    #[strum(serialize = "_leptonEtaTrailing")]
    LeptonEtaTrailing,
    /// Scalar sum of the lepton transverse momenta
    #[strum(serialize = "_LT")]
    Lt,
    #[strum(serialize = "_M3l")]
    M3l,
    #[strum(serialize = "_hasValidZ")]
    HasValidZ,
    #[strum(serialize = "_Zmass")]
    ZMass,
    #[strum(serialize = "_Zpt")]
    ZPt,
    #[strum(serialize = "_Zeta")]
    ZEta,
    /// Leading lepton not assigned to the Z boson
    #[strum(serialize = "_lW_pt")]
    LWPt,
    #[strum(serialize = "_lW_eta")]
    LWEta,
    #[strum(serialize = "_lW_charge")]
    LWCharge,
    #[strum(serialize = "_MET_pt")]
    Met,
    #[strum(serialize = "_MET_phi")]
    MetPhi,
    #[strum(serialize = "_mTW")]
    MtW,
    #[strum(serialize = "_hasValidNeutrino")]
    HasValidNeutrino,
    #[strum(serialize = "_nuPz")]
    NuPz,
    #[strum(serialize = "_hasValidTop")]
    HasValidTop,
    #[strum(serialize = "_topMass")]
    TopMass,
    #[strum(serialize = "_topPt")]
    TopPt,
    #[strum(serialize = "_topEta")]
    TopEta,
    #[strum(serialize = "_taggedBJetPt")]
    TaggedBJetPt,
    #[strum(serialize = "_taggedBJetEta")]
    TaggedBJetEta,
    #[strum(serialize = "_taggedBJetBTag")]
    TaggedBJetBTag,
    #[strum(serialize = "_recoilingJetPt")]
    RecoilJetPt,
    #[strum(serialize = "_recoilingJetEta")]
    RecoilJetEta,
    #[strum(serialize = "_recoilingJetBTag")]
    RecoilJetBTag,
    #[strum(serialize = "_jetPtLeading")]
    JetPtLeading,
    #[strum(serialize = "_jetEtaLeading")]
    JetEtaLeading,
    #[strum(serialize = "_jetPtSubLeading")]
    JetPtSubLeading,
    #[strum(serialize = "_jetEtaSubLeading")]
    JetEtaSubLeading,
    #[strum(serialize = "_bjetPtLeading")]
    BJetPtLeading,
    #[strum(serialize = "_bjetEtaLeading")]
    BJetEtaLeading,
    #[strum(serialize = "_HT")]
    Ht,
    /// Largest dijet mass
    #[strum(serialize = "_MjjMax")]
    MjjMax,
    #[strum(serialize = "_deepFlavor_max")]
    DeepFlavourMax,
    #[strum(serialize = "_dRlWrecoil")]
    DeltaRLWRecoil,
    #[strum(serialize = "_dRlWbtagged")]
    DeltaRLWTagged,
    #[strum(serialize = "_dEtaTaggedRecoil")]
    DeltaEtaTaggedRecoil,
    #[strum(serialize = "_dPhiZMET")]
    DeltaPhiZMet,
    #[strum(serialize = "_eventBDT")]
    EventBdt,
}

impl Schema for TzqVariable {
    fn index(self) -> usize {
        self as usize
    }

    fn default_value(self) -> f64 {
        use TzqVariable::*;
        match self {
            EventWeight | XsecNorm | ReweightingWeight | FakeRateWeight
            | TotWeight => 1.,
            TaggedBJetBTag | RecoilJetBTag | DeltaRLWRecoil | DeltaRLWTagged
            | DeltaEtaTaggedRecoil | DeltaPhiZMet => -1.,
            _ => 0.,
        }
    }

    fn name(self) -> &'static str {
        self.into()
    }
}

/// Observables for three-lepton events
#[derive(Debug, Default)]
pub struct TzqFlattener {
    mva: Option<BoundMva<TzqVariable>>,
}

/// The W boson lepton: leading lepton outside the Z candidate
fn w_lepton<'a>(leptons: &[&'a Lepton], z: Option<(usize, usize)>) -> Option<&'a Lepton> {
    let (first, second) = z.unzip();
    leptons
        .iter()
        .enumerate()
        .find(|(idx, _)| Some(*idx) != first && Some(*idx) != second)
        .map(|(_, l)| *l)
}

impl Flatten for TzqFlattener {
    type Variable = TzqVariable;

    fn new(mva: Option<BoundMva<TzqVariable>>) -> Self {
        Self { mva }
    }

    fn flatten(
        &self,
        event: &Event,
        ctx: &FlattenContext,
    ) -> Result<VariableMap<TzqVariable>, FlattenError> {
        use TzqVariable::*;
        let variation = ctx.variation;
        let mut vars = VariableMap::new();

        vars[RunNb] = event.run() as f64;
        vars[LumiBlock] = event.lumi_block() as f64;
        vars[EventNb] = event.number() as f64;

        let weights = ctx.weights(event);
        vars[EventWeight] = weights.event;
        vars[XsecNorm] = weights.norm;
        vars[ReweightingWeight] = weights.reweighting;
        vars[FakeRateWeight] = weights.fake_rate;
        vars[TotWeight] = weights.total();

        let leptons: Vec<&Lepton> =
            event.leptons.iter().filter(|l| l.is_fo()).collect();
        let jets: Vec<FourVector> =
            event.jets.iter().map(|j| j.p4_for(variation)).collect();
        let bjets = ctx.btagged_jets(event, WorkingPoint::Medium)?;
        vars[NLeptons] = leptons.len() as f64;
        vars[NJets] = jets.len() as f64;
        vars[NBJets] = bjets.len() as f64;
        vars[NVertices] = event.n_vertices as f64;

        let lepton_vars = [
            (LeptonPtLeading, LeptonEtaLeading),
            (LeptonPtSubLeading, LeptonEtaSubLeading),
            (LeptonPtTrailing, LeptonEtaTrailing),
        ];
        for ((pt, eta), l) in lepton_vars.into_iter().zip(&leptons) {
            vars[pt] = l.pt();
            vars[eta] = l.eta();
        }
        vars[Lt] = leptons.iter().map(|l| l.pt()).sum();
        if leptons.len() >= 3 {
            let sum: FourVector = leptons[..3].iter().map(|l| *l.p4()).sum();
            vars[M3l] = sum.m();
        }

        let met = event.met.p4_for(variation);
        vars[Met] = met.pt();
        vars[MetPhi] = met.phi();

        let owned: Vec<Lepton> = leptons.iter().map(|l| (*l).clone()).collect();
        let z = best_ossf_z_pair(&owned);
        if let Some(z) = z {
            let p = *leptons[z.first].p4() + *leptons[z.second].p4();
            vars.set_flag(HasValidZ, true);
            vars[ZMass] = z.mass;
            vars[ZPt] = p.pt();
            vars[ZEta] = p.eta();
            vars[DeltaPhiZMet] = p.delta_phi(&met);
        }

        if let Some(first) = jets.first() {
            vars[JetPtLeading] = first.pt();
            vars[JetEtaLeading] = first.eta();
        }
        if let Some(second) = jets.get(1) {
            vars[JetPtSubLeading] = second.pt();
            vars[JetEtaSubLeading] = second.eta();
        }
        if let Some(&b) = bjets.first() {
            vars[BJetPtLeading] = jets[b].pt();
            vars[BJetEtaLeading] = jets[b].eta();
        }
        vars[Ht] = jets.iter().map(|j| j.pt()).sum();
        vars[MjjMax] = jets
            .iter()
            .tuple_combinations()
            .map(|(a, b)| (*a + *b).m())
            .fold(0., f64::max);
        vars[DeepFlavourMax] = event
            .jets
            .iter()
            .map(|j| j.deep_flavour)
            .fold(0., f64::max);

        let lw = w_lepton(&leptons, z.map(|z| (z.first, z.second)));
        if let Some(lw) = lw {
            vars[LWPt] = lw.pt();
            vars[LWEta] = lw.eta();
            vars[LWCharge] = lw.charge() as f64;
            vars[MtW] = lw.p4().mt(&met);

            let solution = solve_neutrino_pz(lw.p4(), &met, W_MASS);
            vars.set_flag(HasValidNeutrino, solution.valid);
            let neutrinos = solution.neutrinos(&met);
            let top = tag_top(lw.p4(), &neutrinos, &jets, &bjets);
            vars[NuPz] = neutrinos[top.root].pz();
            if let Some(tagged) = top.tagged {
                vars.set_flag(HasValidTop, true);
                vars[TopMass] = top.top.m();
                vars[TopPt] = top.top.pt();
                vars[TopEta] = top.top.eta();
                vars[TaggedBJetPt] = jets[tagged].pt();
                vars[TaggedBJetEta] = jets[tagged].eta();
                vars[TaggedBJetBTag] = event.jets[tagged].deep_flavour;
                vars[DeltaRLWTagged] = lw.p4().delta_r(&jets[tagged]);
            }
            if let Some(recoil) = top.recoil {
                vars[RecoilJetPt] = jets[recoil].pt();
                vars[RecoilJetEta] = jets[recoil].eta();
                vars[RecoilJetBTag] = event.jets[recoil].deep_flavour;
                vars[DeltaRLWRecoil] = lw.p4().delta_r(&jets[recoil]);
            }
            if let (Some(tagged), Some(recoil)) = (top.tagged, top.recoil) {
                vars[DeltaEtaTaggedRecoil] =
                    (jets[tagged].eta() - jets[recoil].eta()).abs();
            }
        }

        if let Some(mva) = &self.mva {
            vars[EventBdt] = mva.evaluate(&vars);
        }
        Ok(vars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::event::{EventBuilder, Triggers};
    use crate::objects::{Jet, Met};
    use crate::reweight::NO_REWEIGHTING;
    use crate::selection::{region, select_event, SelectionType};
    use crate::variation::Variation;
    use approx::assert_abs_diff_eq;
    use particle_id::ParticleID;
    use std::f64::consts::PI;

    fn log_init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn p(pt: f64, eta: f64, phi: f64) -> FourVector {
        FourVector::from_pt_eta_phi_m(pt, eta, phi, 0.)
    }

    fn tzq_event() -> Event {
        let mut builder = EventBuilder::new(1, 1, 1);
        builder
            .weight(0.25)
            .triggers(Triggers {
                trilepton: true,
                ..Default::default()
            })
            .add_lepton(Lepton::new(p(30., 1., 1.5), ParticleID::new(11)))
            .add_lepton(Lepton::new(p(45., 0., 0.), ParticleID::new(13)))
            .add_lepton(Lepton::new(p(45., 0., PI), ParticleID::new(-13)))
            .add_jet(Jet::new(p(40., 2.8, 2.2), 0.05))
            .add_jet(Jet::new(p(60., 0.5, -1.5), 0.9))
            .met(Met::new(50., 1.));
        builder.build()
    }

    #[test]
    fn signal_region_event() {
        log_init();
        let config = AnalysisConfig::default();
        let region = region("signalregion", &config).unwrap();
        let mut event = tzq_event();
        assert!(select_event(
            &mut event,
            &region,
            &config,
            SelectionType::Tight,
            Variation::Nominal
        )
        .unwrap());

        let mut ctx = FlattenContext::new(&config, &NO_REWEIGHTING);
        ctx.norm = 8.;
        let vars = TzqFlattener::default().flatten(&event, &ctx).unwrap();
        use TzqVariable::*;
        assert_eq!(vars[NLeptons], 3.);
        assert_eq!(vars[NJets], 2.);
        assert_eq!(vars[NBJets], 1.);
        assert_abs_diff_eq!(vars[TotWeight], 2.);
        assert_eq!(vars[HasValidZ], 1.);
        assert_abs_diff_eq!(vars[ZMass], 90., epsilon = 1e-9);
        assert_abs_diff_eq!(vars[LWPt], 30., epsilon = 1e-9);
        assert_eq!(vars[LWCharge], -1.);
        assert_eq!(vars[HasValidTop], 1.);
        assert_abs_diff_eq!(vars[TaggedBJetPt], 60., epsilon = 1e-9);
        assert_abs_diff_eq!(vars[RecoilJetPt], 40., epsilon = 1e-9);
        assert_eq!(vars[TaggedBJetBTag], 0.9);
        assert_abs_diff_eq!(vars[LeptonPtTrailing], 30., epsilon = 1e-9);
        assert_abs_diff_eq!(vars[Lt], 120., epsilon = 1e-9);
        let mjj = (p(40., 2.8, 2.2) + p(60., 0.5, -1.5)).m();
        assert_abs_diff_eq!(vars[MjjMax], mjj, epsilon = 1e-9);
    }

    #[test]
    fn defaults_without_jets() {
        log_init();
        let config = AnalysisConfig::default();
        let ctx = FlattenContext::new(&config, &NO_REWEIGHTING);
        let mut builder = EventBuilder::new(1, 1, 1);
        builder.add_lepton(Lepton::new(p(30., 1., 1.5), ParticleID::new(11)));
        let vars = TzqFlattener::default()
            .flatten(&builder.build(), &ctx)
            .unwrap();
        use TzqVariable::*;
        assert_eq!(vars[HasValidZ], 0.);
        assert_eq!(vars[HasValidTop], 0.);
        assert_eq!(vars[TaggedBJetBTag], -1.);
        assert_eq!(vars[DeltaRLWRecoil], -1.);
        assert_abs_diff_eq!(vars[LWPt], 30., epsilon = 1e-9);
        assert_eq!(vars[LeptonPtSubLeading], 0.);
    }
}
