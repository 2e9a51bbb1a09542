//! Conversion of selected events into flat sets of observables
//!
//! Each analysis defines a [Schema]: a fieldless enum listing its
//! observables, their exported names and their default values. A
//! [VariableMap] holds exactly one value per schema entry, so a map is
//! always complete. Names are only used when exporting or when binding
//! external inputs such as histogram declarations or BDT models.
mod tzq;
mod wd;

pub use tzq::{TzqFlattener, TzqVariable};
pub use wd::{WdFlattener, WdVariable};

use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

use strum::IntoEnumIterator;
use thiserror::Error;

use crate::config::{AnalysisConfig, ConfigError, WorkingPoint};
use crate::event::Event;
use crate::fake_rate::{fake_rate_weight, FakeRateMaps};
use crate::mva::BoundMva;
use crate::reweight::Reweighter;
use crate::selection::SelectionType;
use crate::variation::Variation;

#[derive(Debug, Error)]
pub enum FlattenError {
    #[error("Unknown variable {0}")]
    UnknownVariable(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A fixed set of named observables
pub trait Schema:
    Copy + Debug + Display + Eq + Hash + Ord + IntoEnumIterator + 'static
{
    /// Position of the variable in a [VariableMap]
    fn index(self) -> usize;

    /// Value if the underlying physics object is absent
    fn default_value(self) -> f64;

    /// Exported name of the variable
    fn name(self) -> &'static str;

    /// Look up a variable by its exported name
    fn from_name(name: &str) -> Result<Self, FlattenError> {
        Self::iter()
            .find(|v| v.name() == name)
            .ok_or_else(|| FlattenError::UnknownVariable(name.to_owned()))
    }
}

/// One value for each variable of a [Schema]
#[derive(Clone, Debug, PartialEq)]
pub struct VariableMap<S> {
    values: Vec<f64>,
    schema: PhantomData<S>,
}

impl<S: Schema> Default for VariableMap<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Schema> VariableMap<S> {
    /// A map with every variable set to its default
    pub fn new() -> Self {
        Self {
            values: S::iter().map(|v| v.default_value()).collect(),
            schema: PhantomData,
        }
    }

    pub fn get(&self, var: S) -> f64 {
        self.values[var.index()]
    }

    pub fn set(&mut self, var: S, value: f64) {
        self.values[var.index()] = value;
    }

    pub fn set_flag(&mut self, var: S, flag: bool) {
        self.set(var, if flag { 1. } else { 0. })
    }

    /// Value of the variable with the given exported name
    pub fn get_by_name(&self, name: &str) -> Result<f64, FlattenError> {
        Ok(self.get(S::from_name(name)?))
    }

    pub fn iter(&self) -> impl Iterator<Item = (S, f64)> + '_ {
        S::iter().map(|v| (v, self.get(v)))
    }

    /// Exported names in schema order
    pub fn names() -> impl Iterator<Item = &'static str> {
        S::iter().map(|v| v.name())
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<S: Schema> Index<S> for VariableMap<S> {
    type Output = f64;

    fn index(&self, var: S) -> &Self::Output {
        &self.values[var.index()]
    }
}

impl<S: Schema> IndexMut<S> for VariableMap<S> {
    fn index_mut(&mut self, var: S) -> &mut Self::Output {
        &mut self.values[var.index()]
    }
}

/// Factors entering the total event weight
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct WeightBreakdown {
    /// Generator weight, 1 for data
    pub event: f64,
    /// Cross-section normalisation of the sample
    pub norm: f64,
    pub reweighting: f64,
    /// 1 unless the fake-rate selection is used
    pub fake_rate: f64,
}

impl Default for WeightBreakdown {
    fn default() -> Self {
        Self {
            event: 1.,
            norm: 1.,
            reweighting: 1.,
            fake_rate: 1.,
        }
    }
}

impl WeightBreakdown {
    pub fn total(&self) -> f64 {
        self.event * self.norm * self.reweighting * self.fake_rate
    }

    /// The same weight with a different reweighting factor
    pub fn with_reweighting(&self, reweighting: f64) -> Self {
        Self {
            reweighting,
            ..*self
        }
    }
}

/// Everything flattening needs apart from the event
pub struct FlattenContext<'a> {
    pub config: &'a AnalysisConfig,
    pub variation: Variation,
    pub selection_type: SelectionType,
    /// Sample normalisation
    pub norm: f64,
    pub reweighter: &'a dyn Reweighter,
    /// Needed for the fake-rate selection type
    pub fake_rates: Option<&'a FakeRateMaps>,
}

impl<'a> FlattenContext<'a> {
    pub fn new(
        config: &'a AnalysisConfig,
        reweighter: &'a dyn Reweighter,
    ) -> Self {
        Self {
            config,
            variation: Variation::Nominal,
            selection_type: SelectionType::Tight,
            norm: 1.,
            reweighter,
            fake_rates: None,
        }
    }

    /// Weight factors for `event`
    ///
    /// Fake-rate weights are only applied for the fake-rate selection
    /// type and when maps are available.
    pub fn weights(&self, event: &Event) -> WeightBreakdown {
        let fake_rate = match (self.selection_type, self.fake_rates) {
            (SelectionType::FakeRate, Some(maps)) => fake_rate_weight(event, maps),
            _ => 1.,
        };
        WeightBreakdown {
            event: event.weight(),
            norm: self.norm,
            reweighting: self.reweighter.total_weight(event),
            fake_rate,
        }
    }

    /// Indices of b-tagged jets at the given working point
    pub fn btagged_jets(
        &self,
        event: &Event,
        wp: WorkingPoint,
    ) -> Result<Vec<usize>, ConfigError> {
        let threshold = self.config.btag_threshold(event.year, wp)?;
        let max_eta = self.config.jets.btag_max_abs_eta;
        Ok(event
            .jets
            .iter()
            .enumerate()
            .filter(|(_, j)| j.is_btagged(threshold, max_eta))
            .map(|(idx, _)| idx)
            .collect())
    }
}

/// Computation of the observables of one analysis
pub trait Flatten {
    type Variable: Schema;

    fn new(mva: Option<BoundMva<Self::Variable>>) -> Self
    where
        Self: Sized;

    /// Observables for an event that has been cleaned and selected
    /// with the variation of `ctx`
    fn flatten(
        &self,
        event: &Event,
        ctx: &FlattenContext,
    ) -> Result<VariableMap<Self::Variable>, FlattenError>;
}
