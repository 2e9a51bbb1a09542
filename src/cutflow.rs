use std::io::Write;

use serde::Serialize;

use crate::selection::{Pipeline, SelectionError};

/// Distribution of how far events get in a selection pipeline
///
/// Bin `k` counts events that passed exactly the first `k` stages. Bin
/// 0 has no label, bin `k >= 1` is labelled with the `k`-th stage.
#[derive(Clone, Debug, PartialEq)]
pub struct Cutflow {
    labels: Vec<String>,
    entries: Vec<u64>,
    weights: Vec<f64>,
}

#[derive(Serialize)]
struct CutflowRow<'a> {
    bin: usize,
    label: &'a str,
    entries: u64,
    weight: f64,
}

impl Cutflow {
    /// Empty cutflow accepting values up to `max_value`
    pub fn new(max_value: usize, pipeline: &Pipeline) -> Self {
        let labels = std::iter::once(String::new())
            .chain(pipeline.labels().map(|l| l.to_owned()))
            .chain(std::iter::repeat(String::new()))
            .take(max_value + 1)
            .collect();
        Self {
            labels,
            entries: vec![0; max_value + 1],
            weights: vec![0.; max_value + 1],
        }
    }

    pub fn max_value(&self) -> usize {
        self.entries.len() - 1
    }

    /// Record an event with the given cutflow value
    ///
    /// Values above the maximum are an error: the maximum has to be
    /// raised, nothing is silently dropped.
    pub fn record(
        &mut self,
        value: usize,
        weight: f64,
    ) -> Result<(), SelectionError> {
        if value > self.max_value() {
            return Err(SelectionError::CutflowOverflow {
                value,
                max: self.max_value(),
            });
        }
        self.entries[value] += 1;
        self.weights[value] += weight;
        Ok(())
    }

    pub fn label(&self, bin: usize) -> &str {
        &self.labels[bin]
    }

    pub fn entries(&self, bin: usize) -> u64 {
        self.entries[bin]
    }

    pub fn weight(&self, bin: usize) -> f64 {
        self.weights[bin]
    }

    /// Number of events that passed at least `stage` stages
    pub fn passed_at_least(&self, stage: usize) -> u64 {
        self.entries.iter().skip(stage).sum()
    }

    /// Write the cutflow as a tab-separated table
    pub fn write<W: Write>(&self, out: W) -> Result<(), csv::Error> {
        let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_writer(out);
        for bin in 0..=self.max_value() {
            writer.serialize(CutflowRow {
                bin,
                label: &self.labels[bin],
                entries: self.entries[bin],
                weight: self.weights[bin],
            })?;
        }
        writer.flush()?;
        Ok(())
    }
}
