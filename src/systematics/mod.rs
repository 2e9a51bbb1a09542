//! Systematic uncertainties
//!
//! For every uncertainty source and direction, [SystematicsFiller]
//! fills histograms parallel to the nominal ones into a
//! [HistogramStore]. [UncertaintyBand::combine] reduces the stored
//! histograms to one total uncertainty per bin.
mod band;
mod filler;
mod store;
mod tables;

pub use band::{BandError, BandSettings, UncertaintyBand};
pub use filler::{FillError, SystematicsFiller};
pub use store::{HistKey, HistogramStore, StoreError};
pub use tables::{read_table, UncertaintyTable};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use thiserror::Error;

use crate::reweight::Correction;
use crate::variation::{Direction, Variation};

/// Source of a systematic uncertainty
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
pub enum Systematic {
    #[serde(rename = "JEC")]
    #[strum(serialize = "JEC")]
    Jec,
    #[serde(rename = "JER")]
    #[strum(serialize = "JER")]
    Jer,
    #[serde(rename = "Uncl")]
    #[strum(serialize = "Uncl")]
    Uncl,
    #[serde(rename = "pileup")]
    #[strum(serialize = "pileup")]
    Pileup,
    #[serde(rename = "muonID")]
    #[strum(serialize = "muonID")]
    MuonId,
    #[serde(rename = "electronID")]
    #[strum(serialize = "electronID")]
    ElectronId,
    #[serde(rename = "bTag_heavy")]
    #[strum(serialize = "bTag_heavy")]
    BTagHeavy,
    #[serde(rename = "bTag_light")]
    #[strum(serialize = "bTag_light")]
    BTagLight,
    #[serde(rename = "prefire")]
    #[strum(serialize = "prefire")]
    Prefire,
    #[serde(rename = "scale_muR")]
    #[strum(serialize = "scale_muR")]
    ScaleMuR,
    #[serde(rename = "scale_muF")]
    #[strum(serialize = "scale_muF")]
    ScaleMuF,
    #[serde(rename = "scale_muRmuF")]
    #[strum(serialize = "scale_muRmuF")]
    ScaleMuRMuF,
    #[serde(rename = "scale_envelope")]
    #[strum(serialize = "scale_envelope")]
    ScaleEnvelope,
    #[serde(rename = "pdf")]
    #[strum(serialize = "pdf")]
    Pdf,
    #[serde(rename = "isr")]
    #[strum(serialize = "isr")]
    Isr,
    #[serde(rename = "fsr")]
    #[strum(serialize = "fsr")]
    Fsr,
}

/// How the shifted histograms of a systematic are obtained
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SystematicKind {
    /// Cleaning, selection and flattening are repeated with shifted
    /// jets and missing momentum
    Reselection,
    /// The event weight changes through a shifted correction
    Reweighting(Correction),
    /// The event weight changes by a generator weight
    GeneratorWeight,
    /// Derived from other histograms once all events are filled
    Derived,
}

impl Systematic {
    pub fn kind(self) -> SystematicKind {
        use Systematic::*;
        use SystematicKind::*;
        match self {
            Jec | Jer | Uncl => Reselection,
            Pileup => Reweighting(Correction::Pileup),
            MuonId => Reweighting(Correction::MuonId),
            ElectronId => Reweighting(Correction::ElectronId),
            BTagHeavy => Reweighting(Correction::BTagHeavy),
            BTagLight => Reweighting(Correction::BTagLight),
            Prefire => Reweighting(Correction::Prefire),
            ScaleMuR | ScaleMuF | ScaleMuRMuF | Isr | Fsr => GeneratorWeight,
            ScaleEnvelope | Pdf => Derived,
        }
    }

    /// Whether shifts in different processes are fully correlated
    ///
    /// Detector-level sources are correlated, theory sources are not.
    pub fn is_correlated(self) -> bool {
        !matches!(
            self,
            Systematic::ScaleMuR
                | Systematic::ScaleMuF
                | Systematic::ScaleMuRMuF
                | Systematic::ScaleEnvelope
                | Systematic::Pdf
                | Systematic::Isr
                | Systematic::Fsr
        )
    }

    /// Calibration variation for re-selection systematics
    pub fn variation(self, direction: Direction) -> Option<Variation> {
        use Direction::*;
        let variation = match (self, direction) {
            (Systematic::Jec, Up) => Variation::JecUp,
            (Systematic::Jec, Down) => Variation::JecDown,
            (Systematic::Jer, Up) => Variation::JerUp,
            (Systematic::Jer, Down) => Variation::JerDown,
            (Systematic::Uncl, Up) => Variation::UnclUp,
            (Systematic::Uncl, Down) => Variation::UnclDown,
            _ => return None,
        };
        Some(variation)
    }

    /// Systematics whose histograms are needed to derive this one
    pub fn inputs(self) -> &'static [Systematic] {
        match self {
            Systematic::ScaleEnvelope => &[
                Systematic::ScaleMuR,
                Systematic::ScaleMuF,
                Systematic::ScaleMuRMuF,
            ],
            _ => &[],
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown systematic shift: {0}")]
pub struct ParseShiftError(String);

/// Nominal or shifted histograms
///
/// The text form is `nominal`, the systematic followed by `Up` or
/// `Down`, e.g. `JECUp`, or `pdfReplica` with the replica index.
#[derive(
    Deserialize, Serialize, Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash,
)]
#[serde(try_from = "String", into = "String")]
pub enum Shift {
    Nominal,
    Varied(Systematic, Direction),
    /// One PDF replica, input for the [Systematic::Pdf] shifts
    PdfReplica(usize),
}

impl Shift {
    /// Whether the histograms are derived from other shifts
    pub fn is_derived(self) -> bool {
        matches!(self, Shift::Varied(syst, _) if syst.kind() == SystematicKind::Derived)
    }
}

impl fmt::Display for Shift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shift::Nominal => write!(f, "nominal"),
            Shift::Varied(syst, dir) => write!(f, "{syst}{dir}"),
            Shift::PdfReplica(idx) => write!(f, "pdfReplica{idx}"),
        }
    }
}

impl FromStr for Shift {
    type Err = ParseShiftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "nominal" {
            return Ok(Shift::Nominal);
        }
        if let Some(idx) = s.strip_prefix("pdfReplica") {
            return idx
                .parse()
                .map(Shift::PdfReplica)
                .map_err(|_| ParseShiftError(s.to_owned()));
        }
        let (syst, dir) = if let Some(syst) = s.strip_suffix("Up") {
            (syst, Direction::Up)
        } else if let Some(syst) = s.strip_suffix("Down") {
            (syst, Direction::Down)
        } else {
            return Err(ParseShiftError(s.to_owned()));
        };
        let syst = syst.parse().map_err(|_| ParseShiftError(s.to_owned()))?;
        Ok(Shift::Varied(syst, dir))
    }
}

impl TryFrom<String> for Shift {
    type Error = ParseShiftError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Shift> for String {
    fn from(shift: Shift) -> Self {
        shift.to_string()
    }
}
