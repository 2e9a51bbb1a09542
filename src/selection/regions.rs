use log::debug;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::config::{AnalysisConfig, WorkingPoint};

use super::{Cut, Pipeline, SelectionError, TriggerRequirement};

/// The analysis a selection region belongs to
///
/// This determines which variables are computed for selected events.
#[derive(
    Deserialize,
    Serialize,
    Copy,
    Clone,
    Debug,
    Display,
    EnumString,
    Eq,
    PartialEq,
    Hash,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Analysis {
    /// tZq production in the three-lepton final state
    Tzq,
    /// H→W+D in the single-lepton final state
    Wd,
}

/// User-defined selection from the configuration file
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct RegionDefinition {
    pub analysis: Analysis,
    pub cuts: Vec<Cut>,
}

/// A named event selection
#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    pub name: String,
    pub analysis: Analysis,
    pub pipeline: Pipeline,
}

pub const BUILTIN_REGIONS: [&str; 8] = [
    "signalregion",
    "wzcontrolregion",
    "zzcontrolregion",
    "zgcontrolregion",
    "ttzcontrolregion",
    "signalsideband_noz",
    "wd_signalregion",
    "wd_dmesonregion",
];

/// Look up a selection region by name
///
/// Regions defined in the configuration take precedence over the
/// built-in ones.
pub fn region(
    name: &str,
    config: &AnalysisConfig,
) -> Result<Region, SelectionError> {
    if let Some(def) = config.regions.get(name) {
        debug!("Using selection {name} from configuration");
        return Ok(Region {
            name: name.to_owned(),
            analysis: def.analysis,
            pipeline: Pipeline::new(name, def.cuts.clone()),
        });
    }
    let (analysis, cuts) = builtin(name, config)
        .ok_or_else(|| SelectionError::UnknownSelection(name.to_owned()))?;
    debug!("Using built-in selection {name}");
    Ok(Region {
        name: name.to_owned(),
        analysis,
        pipeline: Pipeline::new(name, cuts),
    })
}

fn multilepton_preselection(n: usize, config: &AnalysisConfig) -> Vec<Cut> {
    vec![
        Cut::ObjectCleaning,
        Cut::MetFilters,
        Cut::Trigger(TriggerRequirement::Any),
        Cut::LeptonCount(n),
        Cut::PtThresholds(config.leptons.pt_thresholds.clone()),
        Cut::OverlapRemoval,
    ]
}

fn single_lepton_preselection(config: &AnalysisConfig) -> Vec<Cut> {
    vec![
        Cut::ObjectCleaning,
        Cut::MetFilters,
        Cut::Trigger(TriggerRequirement::SingleLepton),
        Cut::LeptonCount(1),
        Cut::PtThresholds(vec![config.leptons.single_lepton_pt]),
        Cut::OverlapRemoval,
    ]
}

fn builtin(name: &str, config: &AnalysisConfig) -> Option<(Analysis, Vec<Cut>)> {
    use Analysis::*;
    let window = config.z_window;
    let bjets = |min, max, working_point| Cut::BJetCount {
        min,
        max,
        working_point,
    };
    let (analysis, mut cuts, specific) = match name {
        "signalregion" => (
            Tzq,
            multilepton_preselection(3, config),
            vec![
                Cut::ZCandidate { window },
                Cut::JetCount { min: 2, max: None },
                bjets(1, Some(1), WorkingPoint::Medium),
            ],
        ),
        "wzcontrolregion" => (
            Tzq,
            multilepton_preselection(3, config),
            vec![
                Cut::ZCandidate { window },
                Cut::MetThreshold(config.met.wz_min),
                bjets(0, Some(0), WorkingPoint::Loose),
            ],
        ),
        "zzcontrolregion" => (
            Tzq,
            multilepton_preselection(4, config),
            vec![Cut::TwoZCandidates { window }],
        ),
        "zgcontrolregion" => (
            Tzq,
            multilepton_preselection(3, config),
            vec![Cut::ZVeto { window }, Cut::TrileptonMass { window }],
        ),
        "ttzcontrolregion" => (
            Tzq,
            multilepton_preselection(3, config),
            vec![
                Cut::ZCandidate { window },
                Cut::JetCount { min: 4, max: None },
                bjets(2, None, WorkingPoint::Medium),
            ],
        ),
        "signalsideband_noz" => (
            Tzq,
            multilepton_preselection(3, config),
            vec![
                Cut::ZVeto { window },
                Cut::JetCount { min: 2, max: None },
                bjets(1, None, WorkingPoint::Medium),
            ],
        ),
        "wd_signalregion" => (
            Wd,
            single_lepton_preselection(config),
            vec![Cut::MetThreshold(config.met.wd_min)],
        ),
        "wd_dmesonregion" => (
            Wd,
            single_lepton_preselection(config),
            vec![Cut::MetThreshold(config.met.wd_min), Cut::DMeson],
        ),
        _ => return None,
    };
    cuts.extend(specific);
    cuts.push(Cut::SelectionType);
    Some((analysis, cuts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_regions_exist() {
        let config = AnalysisConfig::default();
        for name in BUILTIN_REGIONS {
            let region = region(name, &config).unwrap();
            assert_eq!(region.name, name);
            assert_eq!(region.pipeline.cuts().last(), Some(&Cut::SelectionType));
        }
        assert!(matches!(
            region("nosuchregion", &config),
            Err(SelectionError::UnknownSelection(_))
        ));
    }

    #[test]
    fn wd_signal_region_stages() {
        let config = AnalysisConfig::default();
        let region = region("wd_signalregion", &config).unwrap();
        assert_eq!(region.analysis, Analysis::Wd);
        let labels: Vec<_> = region.pipeline.labels().collect();
        assert_eq!(
            labels,
            [
                "pass-object-cleaning",
                "pass-MET-filters",
                "pass-trigger",
                "pass-lepton-count",
                "pass-pt-thresholds",
                "pass-overlap-removal",
                "pass-MET-threshold",
                "pass-selection-type",
            ]
        );
    }

    #[test]
    fn configured_region_takes_precedence() {
        let yaml = r#"
regions:
  signalregion:
    analysis: wd
    cuts:
      - object_cleaning
      - !lepton_count 2
"#;
        let config: AnalysisConfig = serde_yaml::from_str(yaml).unwrap();
        let region = region("signalregion", &config).unwrap();
        assert_eq!(region.analysis, Analysis::Wd);
        assert_eq!(region.pipeline.len(), 2);
    }
}
