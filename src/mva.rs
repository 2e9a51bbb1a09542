use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::flatten::{FlattenError, Schema, VariableMap};

#[derive(Debug, Error)]
pub enum MvaError {
    #[error("Failed to read {file:?}: {source}")]
    Io {
        file: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse {file:?}: {source}")]
    Parse {
        file: std::path::PathBuf,
        source: serde_yaml::Error,
    },
    #[error("Tree {tree} refers to input {input}, but there are only {ninputs} inputs")]
    InputIndex {
        tree: usize,
        input: usize,
        ninputs: usize,
    },
    #[error("Expected {expected} inputs, got {found}")]
    InputCount { expected: usize, found: usize },
    #[error("Failed to bind BDT input: {0}")]
    Bind(#[from] FlattenError),
}

/// How the tree responses are combined
#[derive(Deserialize, Serialize, Copy, Clone, Debug, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum BoostType {
    /// Weighted average of the tree responses
    Adaptive,
    /// Sum of the tree responses mapped to (-1, 1)
    Gradient,
}

/// A node of a binary decision tree
///
/// Cut nodes send inputs below the threshold to the left.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Leaf(f64),
    Cut {
        input: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn response(&self, inputs: &[f64]) -> f64 {
        let mut node = self;
        loop {
            match node {
                Node::Leaf(value) => return *value,
                Node::Cut {
                    input,
                    threshold,
                    left,
                    right,
                } => {
                    node = if inputs[*input] < *threshold { left } else { right };
                }
            }
        }
    }

    fn max_input(&self) -> Option<usize> {
        match self {
            Node::Leaf(_) => None,
            Node::Cut {
                input, left, right, ..
            } => [Some(*input), left.max_input(), right.max_input()]
                .into_iter()
                .flatten()
                .max(),
        }
    }
}

fn unit_weight() -> f64 {
    1.
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Tree {
    #[serde(default = "unit_weight")]
    pub weight: f64,
    pub root: Node,
}

/// A trained boosted decision tree forest
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct BoostedDecisionTrees {
    pub name: String,
    /// Names of the input variables, in input order
    pub inputs: Vec<String>,
    pub boost_type: BoostType,
    pub trees: Vec<Tree>,
}

impl BoostedDecisionTrees {
    pub fn from_file(file: impl AsRef<Path>) -> Result<Self, MvaError> {
        let file = file.as_ref();
        let reader = std::fs::File::open(file).map_err(|source| MvaError::Io {
            file: file.to_owned(),
            source,
        })?;
        let bdt: Self =
            serde_yaml::from_reader(reader).map_err(|source| MvaError::Parse {
                file: file.to_owned(),
                source,
            })?;
        bdt.validate()?;
        debug!(
            "Read BDT {} with {} trees and {} inputs from {file:?}",
            bdt.name,
            bdt.trees.len(),
            bdt.inputs.len()
        );
        Ok(bdt)
    }

    /// Check that all cuts refer to existing inputs
    pub fn validate(&self) -> Result<(), MvaError> {
        let ninputs = self.inputs.len();
        for (tree, t) in self.trees.iter().enumerate() {
            if let Some(input) = t.root.max_input() {
                if input >= ninputs {
                    return Err(MvaError::InputIndex {
                        tree,
                        input,
                        ninputs,
                    });
                }
            }
        }
        Ok(())
    }

    /// Classifier output for the given inputs
    pub fn evaluate(&self, inputs: &[f64]) -> Result<f64, MvaError> {
        if inputs.len() != self.inputs.len() {
            return Err(MvaError::InputCount {
                expected: self.inputs.len(),
                found: inputs.len(),
            });
        }
        Ok(self.evaluate_unchecked(inputs))
    }

    fn evaluate_unchecked(&self, inputs: &[f64]) -> f64 {
        match self.boost_type {
            BoostType::Adaptive => {
                let norm: f64 = self.trees.iter().map(|t| t.weight).sum();
                if norm == 0. {
                    return 0.;
                }
                self.trees
                    .iter()
                    .map(|t| t.weight * t.root.response(inputs))
                    .sum::<f64>()
                    / norm
            }
            BoostType::Gradient => {
                let sum: f64 = self
                    .trees
                    .iter()
                    .map(|t| t.weight * t.root.response(inputs))
                    .sum();
                2. / (1. + (-2. * sum).exp()) - 1.
            }
        }
    }

    /// Resolve the input names to variables of a schema
    ///
    /// Unknown names are an error.
    pub fn bind<S: Schema>(self) -> Result<BoundMva<S>, MvaError> {
        let inputs = self
            .inputs
            .iter()
            .map(|name| S::from_name(name))
            .collect::<Result<_, _>>()?;
        Ok(BoundMva { bdt: self, inputs })
    }
}

/// A BDT reading its inputs from a [VariableMap]
#[derive(Clone, Debug, PartialEq)]
pub struct BoundMva<S> {
    bdt: BoostedDecisionTrees,
    inputs: Vec<S>,
}

impl<S: Schema> BoundMva<S> {
    pub fn name(&self) -> &str {
        &self.bdt.name
    }

    pub fn evaluate(&self, vars: &VariableMap<S>) -> f64 {
        let inputs: Vec<_> = self.inputs.iter().map(|v| vars[*v]).collect();
        self.bdt.evaluate_unchecked(&inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::WdVariable;
    use approx::assert_abs_diff_eq;

    const MODEL: &str = "
name: test
inputs: [_leptonPt, _MET]
boost_type: adaptive
trees:
  - weight: 2
    root: !cut
      input: 0
      threshold: 40
      left: !leaf -1
      right: !cut
        input: 1
        threshold: 30
        left: !leaf 0.5
        right: !leaf 1
  - root: !leaf 1
";

    #[test]
    fn adaptive_forest() {
        let bdt: BoostedDecisionTrees = serde_yaml::from_str(MODEL).unwrap();
        bdt.validate().unwrap();
        assert_abs_diff_eq!(bdt.evaluate(&[30., 50.]).unwrap(), (-2. + 1.) / 3.);
        assert_abs_diff_eq!(bdt.evaluate(&[50., 20.]).unwrap(), (1. + 1.) / 3.);
        assert_abs_diff_eq!(bdt.evaluate(&[50., 50.]).unwrap(), 1.);
        assert!(matches!(
            bdt.evaluate(&[1.]),
            Err(MvaError::InputCount { .. })
        ));
    }

    #[test]
    fn gradient_forest() {
        let mut bdt: BoostedDecisionTrees = serde_yaml::from_str(MODEL).unwrap();
        bdt.boost_type = BoostType::Gradient;
        let sum: f64 = 2. * 1. + 1.;
        assert_abs_diff_eq!(bdt.evaluate(&[50., 50.]).unwrap(), sum.tanh(), epsilon = 1e-12);
    }

    #[test]
    fn binding() {
        let bdt: BoostedDecisionTrees = serde_yaml::from_str(MODEL).unwrap();
        let bound = bdt.clone().bind::<WdVariable>().unwrap();
        let mut vars = VariableMap::new();
        vars[WdVariable::LeptonPt] = 50.;
        vars[WdVariable::Met] = 20.;
        assert_abs_diff_eq!(bound.evaluate(&vars), 2. / 3.);

        let mut unknown = bdt;
        unknown.inputs[1] = "_noSuchVariable".to_owned();
        assert!(matches!(
            unknown.bind::<WdVariable>(),
            Err(MvaError::Bind(FlattenError::UnknownVariable(_)))
        ));
    }

    #[test]
    fn out_of_range_input() {
        let mut bdt: BoostedDecisionTrees = serde_yaml::from_str(MODEL).unwrap();
        bdt.inputs.pop();
        assert!(matches!(
            bdt.validate(),
            Err(MvaError::InputIndex { tree: 0, input: 1, ninputs: 1 })
        ));
    }
}
