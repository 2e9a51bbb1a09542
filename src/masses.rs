//! Nominal resonance masses in GeV

pub const W_MASS: f64 = 80.379;
pub const Z_MASS: f64 = 91.1876;
pub const TOP_MASS: f64 = 173.1;
pub const HIGGS_MASS: f64 = 125.;
/// D_s meson
pub const DS_MASS: f64 = 1.96835;
