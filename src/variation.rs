use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Up or down shift of an uncertainty source
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
pub enum Direction {
    Up,
    Down,
}

/// Shift of the jet and missing-momentum calibration
///
/// Selections, jet counting and missing momentum depend on the
/// variation. The objects themselves keep their nominal values.
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
pub enum Variation {
    #[default]
    #[strum(serialize = "nominal")]
    Nominal,
    #[strum(serialize = "JECUp")]
    JecUp,
    #[strum(serialize = "JECDown")]
    JecDown,
    #[strum(serialize = "JERUp")]
    JerUp,
    #[strum(serialize = "JERDown")]
    JerDown,
    #[strum(serialize = "UnclUp")]
    UnclUp,
    #[strum(serialize = "UnclDown")]
    UnclDown,
}

impl Variation {
    pub fn is_nominal(self) -> bool {
        self == Variation::Nominal
    }

    /// Variations that shift jets (and thereby the missing momentum)
    pub fn affects_jets(self) -> bool {
        !matches!(
            self,
            Variation::Nominal | Variation::UnclUp | Variation::UnclDown
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn names() {
        assert_eq!(Variation::from_str("JECUp").unwrap(), Variation::JecUp);
        assert_eq!(Variation::UnclDown.to_string(), "UnclDown");
        assert!(Variation::from_str("JESUp").is_err());
        assert!(!Variation::UnclUp.affects_jets());
        assert!(Variation::JerDown.affects_jets());
    }
}
