use std::collections::BTreeMap;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::Year;
use crate::masses::DS_MASS;
use crate::selection::RegionDefinition;

/// Lepton thresholds
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LeptonCuts {
    /// Cone-pt thresholds of the leading, subleading, ... multilepton
    /// candidates
    pub pt_thresholds: Vec<f64>,
    /// Threshold for the single-lepton selections
    pub single_lepton_pt: f64,
    /// Electrons closer than this to a loose muon are removed
    pub electron_muon_min_dr: f64,
}

impl Default for LeptonCuts {
    fn default() -> Self {
        Self {
            pt_thresholds: vec![25., 15., 10.],
            single_lepton_pt: 30.,
            electron_muon_min_dr: 0.05,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct JetCuts {
    pub min_pt: f64,
    pub max_abs_eta: f64,
    /// Acceptance for b-tagging
    pub btag_max_abs_eta: f64,
    /// Jets closer than this to a fakeable lepton are removed
    pub lepton_min_dr: f64,
}

impl Default for JetCuts {
    fn default() -> Self {
        Self {
            min_pt: 25.,
            max_abs_eta: 5.,
            btag_max_abs_eta: 2.4,
            lepton_min_dr: 0.4,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct MetCuts {
    /// Minimum missing momentum in the WZ control region
    pub wz_min: f64,
    /// Minimum missing momentum in the H→W+D selections
    pub wd_min: f64,
}

impl Default for MetCuts {
    fn default() -> Self {
        Self {
            wz_min: 50.,
            wd_min: 20.,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DMesonCuts {
    pub nominal_mass: f64,
    pub mass_window: f64,
    pub min_pt: f64,
    pub max_isolation: f64,
    pub max_dr_daughters: f64,
}

impl Default for DMesonCuts {
    fn default() -> Self {
        Self {
            nominal_mass: DS_MASS,
            mass_window: 0.05,
            min_pt: 10.,
            max_isolation: 0.4,
            max_dr_daughters: 0.15,
        }
    }
}

/// b-tagging working point
#[derive(
    Deserialize, Serialize, Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum WorkingPoint {
    Loose,
    Medium,
    Tight,
}

/// DeepFlavour thresholds
#[derive(Deserialize, Serialize, Copy, Clone, Debug, PartialEq)]
pub struct BTagThresholds {
    pub loose: f64,
    pub medium: f64,
    pub tight: f64,
}

impl BTagThresholds {
    pub fn get(&self, wp: WorkingPoint) -> f64 {
        match wp {
            WorkingPoint::Loose => self.loose,
            WorkingPoint::Medium => self.medium,
            WorkingPoint::Tight => self.tight,
        }
    }
}

/// Analysis-wide settings
///
/// Every field has a default, so a configuration file only needs to
/// list what differs.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub leptons: LeptonCuts,
    pub jets: JetCuts,
    pub met: MetCuts,
    pub d_mesons: DMesonCuts,
    /// Half-width of the Z mass window
    pub z_window: f64,
    pub btag: BTreeMap<Year, BTagThresholds>,
    /// Integrated luminosity in pb⁻¹
    pub luminosity: BTreeMap<Year, f64>,
    /// Additional user-defined selections
    pub regions: BTreeMap<String, RegionDefinition>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        use Year::*;
        let btag = BTreeMap::from([
            (Y2016PreVfp, BTagThresholds { loose: 0.0508, medium: 0.2598, tight: 0.6502 }),
            (Y2016PostVfp, BTagThresholds { loose: 0.0480, medium: 0.2489, tight: 0.6377 }),
            (Y2017, BTagThresholds { loose: 0.0532, medium: 0.3040, tight: 0.7476 }),
            (Y2018, BTagThresholds { loose: 0.0490, medium: 0.2783, tight: 0.7100 }),
        ]);
        let luminosity = BTreeMap::from([
            (Y2016PreVfp, 19520.),
            (Y2016PostVfp, 16810.),
            (Y2017, 41480.),
            (Y2018, 59830.),
        ]);
        Self {
            leptons: Default::default(),
            jets: Default::default(),
            met: Default::default(),
            d_mesons: Default::default(),
            z_window: 10.,
            btag,
            luminosity,
            regions: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("No b-tagging thresholds for {0}")]
    MissingBTag(Year),
    #[error("No luminosity for {0}")]
    MissingLuminosity(Year),
}

impl AnalysisConfig {
    /// Read settings from a YAML file, using defaults for missing entries
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = std::fs::File::open(path.as_ref())?;
        let config: Self = serde_yaml::from_reader(file)?;
        debug!("Read configuration from {:?}", path.as_ref());
        Ok(config)
    }

    /// DeepFlavour threshold for the given year and working point
    pub fn btag_threshold(
        &self,
        year: Year,
        wp: WorkingPoint,
    ) -> Result<f64, ConfigError> {
        self.btag
            .get(&year)
            .map(|t| t.get(wp))
            .ok_or(ConfigError::MissingBTag(year))
    }

    pub fn luminosity(&self, year: Year) -> Result<f64, ConfigError> {
        self.luminosity
            .get(&year)
            .copied()
            .ok_or(ConfigError::MissingLuminosity(year))
    }
}
