use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::candidates::build_candidate;
use crate::config::WorkingPoint;
use crate::event::Event;
use crate::masses::{HIGGS_MASS, W_MASS};
use crate::mva::BoundMva;
use crate::neutrino::solve_neutrino_pz;

use super::{Flatten, FlattenContext, FlattenError, Schema, VariableMap};

/// Observables of the H→W+D analysis
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
pub enum WdVariable {
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
    #[strum(serialize = "_nDMesons")]
    NDMesons,
    #[strum(serialize = "_nVertices")]
    NVertices,
    #[strum(serialize = "_hasValidLepton")]
    HasValidLepton,
    #[strum(serialize = "_leptonPt")]
    LeptonPt,
    #[strum(serialize = "_leptonEta")]
    LeptonEta,
    #[strum(serialize = "_leptonPhi")]
    LeptonPhi,
    #[strum(serialize = "_leptonCharge")]
    LeptonCharge,
    /// 0 for electrons, 1 for muons, -1 without lepton
    #[strum(serialize = "_leptonFlavour")]
    LeptonFlavour,
    #[strum(serialize = "_leptonIsTight")]
    LeptonIsTight,
    #[strum(serialize = "_MET")]
    Met,
    #[strum(serialize = "_METPhi")]
    MetPhi,
    /// Transverse mass of lepton and missing momentum
    #[strum(serialize = "_WMT")]
    WMt,
    #[strum(serialize = "_hasValidNeutrino")]
    HasValidNeutrino,
    #[strum(serialize = "_nuPz")]
    NuPz,
    #[strum(serialize = "_WPt")]
    WPt,
    #[strum(serialize = "_jetPtLeading")]
    JetPtLeading,
    #[strum(serialize = "_jetEtaLeading")]
    JetEtaLeading,
    #[strum(serialize = "_bjetPtLeading")]
    BJetPtLeading,
    #[strum(serialize = "_bjetEtaLeading")]
    BJetEtaLeading,
    #[strum(serialize = "_HT")]
    Ht,
    #[strum(serialize = "_hasValidDMeson")]
    HasValidDMeson,
    #[strum(serialize = "_DMesonPt")]
    DMesonPt,
    #[strum(serialize = "_DMesonEta")]
    DMesonEta,
    #[strum(serialize = "_DMesonPhi")]
    DMesonPhi,
    #[strum(serialize = "_DMesonMass")]
    DMesonMass,
    #[strum(serialize = "_DMesonIsolation")]
    DMesonIsolation,
    #[strum(serialize = "_DMesonDeltaRDaughters")]
    DMesonDeltaRDaughters,
    #[strum(serialize = "_DMesonHasGenMatch")]
    DMesonHasGenMatch,
    #[strum(serialize = "_leptonDMesonDeltaR")]
    LeptonDMesonDeltaR,
    #[strum(serialize = "_leptonDMesonMass")]
    LeptonDMesonMass,
    #[strum(serialize = "_hasValidHiggs")]
    HasValidHiggs,
    #[strum(serialize = "_HiggsPt")]
    HiggsPt,
    #[strum(serialize = "_HiggsEta")]
    HiggsEta,
    #[strum(serialize = "_HiggsMass")]
    HiggsMass,
    #[strum(serialize = "_eventBDT")]
    EventBdt,
}

impl Schema for WdVariable {
    fn index(self) -> usize {
        self as usize
    }

    fn default_value(self) -> f64 {
        use WdVariable::*;
        match self {
            EventWeight | XsecNorm | ReweightingWeight | FakeRateWeight
            | TotWeight => 1.,
            LeptonFlavour | LeptonDMesonDeltaR => -1.,
            _ => 0.,
        }
    }

    fn name(self) -> &'static str {
        self.into()
    }
}

/// Observables for single-lepton events with a D meson candidate
#[derive(Debug, Default)]
pub struct WdFlattener {
    mva: Option<BoundMva<WdVariable>>,
}

impl Flatten for WdFlattener {
    type Variable = WdVariable;

    fn new(mva: Option<BoundMva<WdVariable>>) -> Self {
        Self { mva }
    }

    fn flatten(
        &self,
        event: &Event,
        ctx: &FlattenContext,
    ) -> Result<VariableMap<WdVariable>, FlattenError> {
        use WdVariable::*;
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

        let bjets = ctx.btagged_jets(event, WorkingPoint::Medium)?;
        vars[NLeptons] = event.n_fo_leptons() as f64;
        vars[NJets] = event.jets.len() as f64;
        vars[NBJets] = bjets.len() as f64;
        vars[NDMesons] = event.d_mesons.len() as f64;
        vars[NVertices] = event.n_vertices as f64;

        let met = event.met.p4_for(variation);
        vars[Met] = met.pt();
        vars[MetPhi] = met.phi();

        vars[Ht] = event.jets.iter().map(|j| j.pt_for(variation)).sum();
        if let Some(jet) = event.jets.first() {
            vars[JetPtLeading] = jet.pt_for(variation);
            vars[JetEtaLeading] = jet.eta();
        }
        if let Some(&idx) = bjets.first() {
            vars[BJetPtLeading] = event.jets[idx].pt_for(variation);
            vars[BJetEtaLeading] = event.jets[idx].eta();
        }

        let lepton = event.leptons.iter().find(|l| l.is_fo());
        let solution = lepton.map(|l| solve_neutrino_pz(l.p4(), &met, W_MASS));
        if let (Some(l), Some(solution)) = (lepton, solution) {
            vars.set_flag(HasValidLepton, true);
            vars[LeptonPt] = l.pt();
            vars[LeptonEta] = l.eta();
            vars[LeptonPhi] = l.phi();
            vars[LeptonCharge] = l.charge() as f64;
            vars[LeptonFlavour] = l.flavour().code();
            vars.set_flag(LeptonIsTight, l.is_tight());
            vars[WMt] = l.p4().mt(&met);
            vars.set_flag(HasValidNeutrino, solution.valid);
            // without a D meson, pick the root closest to the W mass
            let w = build_candidate(Some(l.p4()), &solution, &met, None, W_MASS);
            vars[NuPz] = w.neutrino.pz();
            vars[WPt] = w.p4.pt();
        }

        if let Some(d) = event.d_mesons.first() {
            vars.set_flag(HasValidDMeson, true);
            vars[DMesonPt] = d.pt();
            vars[DMesonEta] = d.p4().eta();
            vars[DMesonPhi] = d.p4().phi();
            vars[DMesonMass] = d.mass();
            vars[DMesonIsolation] = d.isolation;
            vars[DMesonDeltaRDaughters] = d.delta_r_daughters;
            vars.set_flag(DMesonHasGenMatch, d.has_gen_match);

            if let (Some(l), Some(solution)) = (lepton, solution) {
                vars[LeptonDMesonDeltaR] = l.p4().delta_r(d.p4());
                vars[LeptonDMesonMass] = (*l.p4() + *d.p4()).m();
                let higgs = build_candidate(
                    Some(l.p4()),
                    &solution,
                    &met,
                    Some(d.p4()),
                    HIGGS_MASS,
                );
                vars.set_flag(HasValidHiggs, true);
                vars[NuPz] = higgs.neutrino.pz();
                vars[WPt] = (*l.p4() + higgs.neutrino).pt();
                vars[HiggsPt] = higgs.p4.pt();
                vars[HiggsEta] = higgs.p4.eta();
                vars[HiggsMass] = higgs.mass();
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
    use crate::four_vector::FourVector;
    use crate::binned::BinnedMap2D;
    use crate::fake_rate::FakeRateMaps;
    use crate::objects::{DMeson, Jet, Lepton, LeptonQuality, Met};
    use crate::reweight::NO_REWEIGHTING;
    use crate::selection::{region, select_event, SelectionType};
    use crate::variation::Variation;
    use approx::assert_abs_diff_eq;
    use particle_id::ParticleID;

    fn log_init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn single_lepton_event(is_data: bool) -> Event {
        let mut builder = EventBuilder::new(1, 2, 3);
        builder
            .data(is_data)
            .weight(0.7)
            .triggers(Triggers {
                single_muon: true,
                ..Default::default()
            })
            .add_lepton(Lepton::new(
                FourVector::from_pt_eta_phi_m(50., 0.5, 0., 0.1057),
                ParticleID::new(-13),
            ))
            .add_jet(Jet::new(FourVector::from_pt_eta_phi_m(60., 0., 2.5, 5.), 0.9))
            .met(Met::new(40., -1.5));
        builder.build()
    }

    #[test]
    fn selected_single_lepton_event() {
        log_init();
        let config = AnalysisConfig::default();
        let region = region("wd_signalregion", &config).unwrap();
        for is_data in [false, true] {
            let mut event = single_lepton_event(is_data);
            let pass = select_event(
                &mut event,
                &region,
                &config,
                SelectionType::Tight,
                Variation::Nominal,
            )
            .unwrap();
            assert!(pass);

            let mut ctx = FlattenContext::new(&config, &NO_REWEIGHTING);
            ctx.norm = if is_data { 1. } else { 2. };
            let vars = WdFlattener::default().flatten(&event, &ctx).unwrap();
            use WdVariable::*;
            assert_eq!(vars[HasValidLepton], 1.);
            assert_abs_diff_eq!(vars[LeptonPt], 50., epsilon = 1e-9);
            assert!(vars[NBJets] >= 1.);
            assert_abs_diff_eq!(vars[TotWeight], event.weight() * ctx.norm);
            assert_eq!(vars[LeptonCharge], 1.);
            assert_eq!(vars[LeptonFlavour], 1.);
            assert_eq!(vars[HasValidDMeson], 0.);
            assert_eq!(vars[LeptonDMesonDeltaR], -1.);
        }
    }

    #[test]
    fn fake_rate_weight() {
        log_init();
        let config = AnalysisConfig::default();
        let flat = |rate| {
            BinnedMap2D::new(vec![10., 100.], vec![0., 2.5], vec![vec![rate]], vec![])
                .unwrap()
        };
        let maps = FakeRateMaps {
            muon: flat(0.2),
            electron: flat(0.5),
        };
        let mut builder = EventBuilder::new(1, 1, 1);
        builder.weight(0.7).add_lepton(
            Lepton::new(
                FourVector::from_pt_eta_phi_m(35., 0.5, 0., 0.1057),
                ParticleID::new(13),
            )
            .with_quality(LeptonQuality::Fakeable)
            .with_cone_pt(50.),
        );
        let event = builder.build();

        let mut ctx = FlattenContext::new(&config, &NO_REWEIGHTING);
        ctx.norm = 2.;
        ctx.selection_type = SelectionType::FakeRate;
        ctx.fake_rates = Some(&maps);
        let vars = WdFlattener::default().flatten(&event, &ctx).unwrap();
        // -1 * (-0.2 / 0.8)
        assert_abs_diff_eq!(vars[WdVariable::FakeRateWeight], 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(vars[WdVariable::TotWeight], 0.7 * 2. * 0.25, epsilon = 1e-12);

        // other selection types ignore the maps
        ctx.selection_type = SelectionType::Tight;
        let vars = WdFlattener::default().flatten(&event, &ctx).unwrap();
        assert_eq!(vars[WdVariable::FakeRateWeight], 1.);
        assert_abs_diff_eq!(vars[WdVariable::TotWeight], 0.7 * 2., epsilon = 1e-12);
    }

    #[test]
    fn defaults_without_objects() {
        log_init();
        let config = AnalysisConfig::default();
        let ctx = FlattenContext::new(&config, &NO_REWEIGHTING);
        let event = EventBuilder::new(1, 1, 1).build();
        let vars = WdFlattener::default().flatten(&event, &ctx).unwrap();
        use WdVariable::*;
        assert_eq!(vars[HasValidLepton], 0.);
        assert_eq!(vars[LeptonPt], 0.);
        assert_eq!(vars[LeptonFlavour], -1.);
        assert_eq!(vars[HasValidHiggs], 0.);
        assert_eq!(vars[HiggsMass], 0.);
        assert_eq!(vars[TotWeight], 1.);
    }

    #[test]
    fn higgs_candidate() {
        log_init();
        let config = AnalysisConfig::default();
        let ctx = FlattenContext::new(&config, &NO_REWEIGHTING);
        let mut builder = EventBuilder::new(1, 1, 1);
        builder
            .add_lepton(Lepton::new(
                FourVector::from_pt_eta_phi_m(45., 0.3, 0.2, 0.),
                ParticleID::new(11),
            ))
            .add_d_meson(DMeson::new(
                FourVector::from_pt_eta_phi_m(25., -0.4, 2.8, 1.97),
                0.1,
                0.05,
            ))
            .met(Met::new(35., -1.));
        let event = builder.build();
        let vars = WdFlattener::default().flatten(&event, &ctx).unwrap();
        assert_eq!(vars[WdVariable::HasValidHiggs], 1.);
        assert_eq!(vars[WdVariable::LeptonFlavour], 0.);
        assert!(vars[WdVariable::HiggsMass] > 0.);
        assert!(vars[WdVariable::LeptonDMesonDeltaR] > 0.);
    }
}
