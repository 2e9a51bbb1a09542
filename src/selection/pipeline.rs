use log::trace;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::event::Event;

use super::{Cut, SelectionContext};

/// Outcome of a selection pipeline
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SelectionResult {
    Passed,
    /// Failed at the given stage, counting from 1
    Failed { stage: usize, label: &'static str },
}

impl SelectionResult {
    pub fn passed(&self) -> bool {
        matches!(self, SelectionResult::Passed)
    }

    pub fn failed_stage(&self) -> Option<usize> {
        match self {
            SelectionResult::Passed => None,
            SelectionResult::Failed { stage, .. } => Some(*stage),
        }
    }
}

/// An ordered sequence of cuts
///
/// Cuts are evaluated strictly in order and evaluation stops at the
/// first failing cut.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Pipeline {
    name: String,
    cuts: Vec<Cut>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, cuts: Vec<Cut>) -> Self {
        Self {
            name: name.into(),
            cuts,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cuts(&self) -> &[Cut] {
        &self.cuts
    }

    /// Number of stages
    pub fn len(&self) -> usize {
        self.cuts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cuts.is_empty()
    }

    /// Stage labels in evaluation order
    pub fn labels(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.cuts.iter().map(|c| c.label())
    }

    /// Evaluate all stages
    pub fn evaluate(
        &self,
        event: &Event,
        ctx: &SelectionContext,
    ) -> Result<SelectionResult, ConfigError> {
        self.evaluate_up_to(event, ctx, self.len())
    }

    /// Evaluate at most the first `max_stages` stages
    pub fn evaluate_up_to(
        &self,
        event: &Event,
        ctx: &SelectionContext,
        max_stages: usize,
    ) -> Result<SelectionResult, ConfigError> {
        for (idx, cut) in self.cuts.iter().take(max_stages).enumerate() {
            if !cut.passes(event, ctx)? {
                let stage = idx + 1;
                trace!("{}: failed stage {stage} ({})", self.name, cut.label());
                return Ok(SelectionResult::Failed {
                    stage,
                    label: cut.label(),
                });
            }
        }
        Ok(SelectionResult::Passed)
    }

    /// Number of stages passed before the first failure
    ///
    /// 0 means that not even the first stage was passed.
    pub fn cutflow_value(
        &self,
        event: &Event,
        ctx: &SelectionContext,
    ) -> Result<usize, ConfigError> {
        let res = self.evaluate(event, ctx)?;
        Ok(res.failed_stage().map(|s| s - 1).unwrap_or(self.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::event::{EventBuilder, Triggers};
    use crate::four_vector::FourVector;
    use crate::objects::Lepton;
    use crate::selection::{SelectionType, TriggerRequirement};
    use crate::variation::Variation;
    use particle_id::ParticleID;

    fn log_init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn six_stages() -> Pipeline {
        Pipeline::new(
            "test",
            vec![
                Cut::ObjectCleaning,
                Cut::MetFilters,
                Cut::Trigger(TriggerRequirement::SingleLepton),
                Cut::LeptonCount(1),
                Cut::PtThresholds(vec![30.]),
                Cut::SelectionType,
            ],
        )
    }

    fn one_lepton(triggers: Triggers) -> Event {
        let mut builder = EventBuilder::new(1, 1, 1);
        builder.triggers(triggers).add_lepton(Lepton::new(
            FourVector::from_pt_eta_phi_m(50., 0.5, 0., 0.),
            ParticleID::new(13),
        ));
        builder.build()
    }

    #[test]
    fn failing_trigger() {
        log_init();
        let config = AnalysisConfig::default();
        let ctx =
            SelectionContext::new(&config, SelectionType::Tight, Variation::Nominal);
        let pipeline = six_stages();
        let ev = one_lepton(Triggers::default());

        let res = pipeline.evaluate(&ev, &ctx).unwrap();
        assert_eq!(
            res,
            SelectionResult::Failed {
                stage: 3,
                label: "pass-trigger"
            }
        );
        assert!(!res.passed());
        assert_eq!(pipeline.cutflow_value(&ev, &ctx).unwrap(), 2);

        for max in 3..=pipeline.len() {
            let res = pipeline.evaluate_up_to(&ev, &ctx, max).unwrap();
            assert_eq!(res.failed_stage(), Some(3));
        }
        assert!(pipeline.evaluate_up_to(&ev, &ctx, 2).unwrap().passed());
    }

    #[test]
    fn passing_all() {
        log_init();
        let config = AnalysisConfig::default();
        let ctx =
            SelectionContext::new(&config, SelectionType::Tight, Variation::Nominal);
        let pipeline = six_stages();
        let ev = one_lepton(Triggers {
            single_muon: true,
            ..Default::default()
        });
        assert!(pipeline.evaluate(&ev, &ctx).unwrap().passed());
        assert_eq!(pipeline.cutflow_value(&ev, &ctx).unwrap(), 6);
        let labels: Vec<_> = pipeline.labels().collect();
        assert_eq!(labels[0], "pass-object-cleaning");
        assert_eq!(labels[5], "pass-selection-type");
    }
}
