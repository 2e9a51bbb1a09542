//! `ewkino` selects and flattens collision events for two CMS analyses
//! sharing a single-lepton/multilepton object model:
//!
//! - tZq production in the three-lepton final state
//! - H→W+D with a leptonically decaying W boson
//!
//! # How to use
//!
//! The binaries `ewkino-select`, `ewkino-flatten`, `ewkino-cutflow`,
//! `ewkino-fill` and `ewkino-band` cover the usual processing chain. When
//! using the library directly, the typical sequence is
//!
//! 1. read events with [event_file::EventFile]
//! 2. look up a selection with [selection::region]
//! 3. clean and select events with [selection::select_event]
//! 4. compute observables with one of the [flatten::Flatten] implementations
//! 5. fill histograms, optionally including systematic shifts with
//!    [systematics::SystematicsFiller]
//!
//! ## Most relevant modules
//!
//! - [event] and [objects] for the internal event format
//! - [selection] for object cleaning, cuts and selection regions
//! - [flatten] for the observables of each analysis
//! - [systematics] for shifted histograms and uncertainty bands
//!

/// Binned correction maps
pub mod binned;
/// Resonance candidates
pub mod candidates;
/// Output compression
pub mod compression;
/// Analysis settings
pub mod config;
/// Cutflow histograms
pub mod cutflow;
/// Collision event class
pub mod event;
/// Event file input and output
pub mod event_file;
/// Weights for the fake-rate method
pub mod fake_rate;
pub mod flatten;
/// Four-vector class
pub mod four_vector;
/// Histograms and histogram declarations
pub mod histogram;
pub mod masses;
/// Boosted decision trees
pub mod mva;
/// Neutrino momentum reconstruction
pub mod neutrino;
/// Physics objects
pub mod objects;
/// Parsing of line-oriented text files
pub mod parsing;
/// Progress bar
pub mod progress_bar;
/// Simulation-to-data corrections
pub mod reweight;
pub mod selection;
pub mod systematics;
/// Common traits
pub mod traits;
/// Calibration variations
pub mod variation;
/// Flat tree writer
pub mod writer;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_REV: Option<&str> = option_env!("VERGEN_GIT_SHA");
pub const GIT_BRANCH: Option<&str> = option_env!("VERGEN_GIT_BRANCH");
