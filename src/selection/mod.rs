//! Event selection
//!
//! Selecting an event happens in two steps. First, [prepare_event]
//! cleans the object collections for a given [Variation]. Then a
//! [Pipeline] of named [Cut]s is evaluated in order, stopping at the
//! first failing cut.
mod cleaning;
mod cuts;
mod pipeline;
mod regions;

pub use cleaning::prepare_event;
pub use cuts::{Cut, SelectionContext, TriggerRequirement};
pub use pipeline::{Pipeline, SelectionResult};
pub use regions::{region, Analysis, Region, RegionDefinition, BUILTIN_REGIONS};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use thiserror::Error;

use crate::config::{AnalysisConfig, ConfigError};
use crate::event::Event;
use crate::variation::Variation;

/// Which lepton identification the selected leptons have to pass
#[derive(
    Deserialize,
    Serialize,
    Copy,
    Clone,
    Debug,
    Default,
    Display,
    EnumIter,
    EnumString,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
)]
pub enum SelectionType {
    /// All leptons tight
    #[default]
    #[strum(to_string = "tight", serialize = "3tight")]
    Tight,
    /// All leptons tight and, in simulation, prompt
    #[strum(to_string = "prompt", serialize = "3prompt")]
    Prompt,
    /// All leptons fakeable and at least one of them not tight
    #[strum(to_string = "fakerate")]
    FakeRate,
}

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("Unknown event selection: {0}")]
    UnknownSelection(String),
    #[error("Unknown selection type: {0}")]
    UnknownSelectionType(String),
    #[error("Unknown variation: {0}")]
    UnknownVariation(String),
    #[error("Cutflow value {value} exceeds the maximum of {max}; increase the maximum cutflow value")]
    CutflowOverflow { value: usize, max: usize },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Parse a selection type name
pub fn parse_selection_type(s: &str) -> Result<SelectionType, SelectionError> {
    s.parse()
        .map_err(|_| SelectionError::UnknownSelectionType(s.to_owned()))
}

/// Parse a variation name
pub fn parse_variation(s: &str) -> Result<Variation, SelectionError> {
    s.parse()
        .map_err(|_| SelectionError::UnknownVariation(s.to_owned()))
}

/// Clean `event` and evaluate the selection of `region`
///
/// Returns whether the event passes. The collections of `event` are
/// filtered in place for the given variation, whatever the outcome.
pub fn select_event(
    event: &mut Event,
    region: &Region,
    config: &AnalysisConfig,
    selection_type: SelectionType,
    variation: Variation,
) -> Result<bool, SelectionError> {
    prepare_event(event, variation, config);
    let ctx = SelectionContext::new(config, selection_type, variation);
    Ok(region.pipeline.evaluate(event, &ctx)?.passed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_type_names() {
        assert_eq!(parse_selection_type("3tight").unwrap(), SelectionType::Tight);
        assert_eq!(parse_selection_type("tight").unwrap(), SelectionType::Tight);
        assert_eq!(SelectionType::Prompt.to_string(), "prompt");
        assert!(matches!(
            parse_selection_type("4tight"),
            Err(SelectionError::UnknownSelectionType(_))
        ));
        assert!(matches!(
            parse_variation("JESUp"),
            Err(SelectionError::UnknownVariation(_))
        ));
    }
}
