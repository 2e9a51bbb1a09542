use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use thiserror::Error;

use crate::histogram::Histogram;
use crate::parsing::TextFileError;
use crate::variation::Direction;

use super::{read_table, HistKey, HistogramStore, Shift, Systematic, UncertaintyTable};

#[derive(Debug, Error)]
pub enum BandError {
    #[error("No nominal histogram for {0}")]
    MissingNominal(HistKey),
    #[error("No processes for {distribution} in {region}")]
    NoProcesses {
        region: String,
        distribution: String,
    },
    #[error("Histogram {0} has a different binning than the nominal one")]
    Binning(HistKey),
    #[error(transparent)]
    Table(#[from] TextFileError),
}

/// What enters the uncertainty band of one distribution
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct BandSettings {
    pub region: String,
    pub distribution: String,
    /// Processes to combine; all samples if empty
    #[serde(default)]
    pub processes: Vec<String>,
    /// Uncertainty sources; if empty, all stored ones except those
    /// entering a stored derived source
    #[serde(default)]
    pub systematics: Vec<Systematic>,
    /// Systematics treated as uncorrelated across processes in addition
    /// to the theory ones
    #[serde(default)]
    pub uncorrelated: Vec<Systematic>,
    /// Relative uncertainties on the total normalisation, e.g. luminosity
    #[serde(default)]
    pub flat: BTreeMap<String, f64>,
    /// Relative normalisation uncertainty of single processes
    #[serde(default)]
    pub process_norm: BTreeMap<String, f64>,
    /// Table of relative per-bin parton-shower uncertainties
    #[serde(default)]
    pub parton_shower: Option<PathBuf>,
    /// Category in the parton-shower table, defaults to the region
    #[serde(default)]
    pub category: Option<String>,
    /// Include the statistical uncertainty of the simulation
    #[serde(default)]
    pub stat: bool,
}

impl BandSettings {
    fn is_correlated(&self, syst: Systematic) -> bool {
        syst.is_correlated() && !self.uncorrelated.contains(&syst)
    }

    fn category(&self) -> &str {
        self.category.as_deref().unwrap_or(&self.region)
    }
}

/// Total prediction and its uncertainty for each regular bin
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct UncertaintyBand {
    pub region: String,
    pub distribution: String,
    pub nominal: Vec<f64>,
    pub uncertainty: Vec<f64>,
}

fn clipped(mut hist: Histogram) -> Histogram {
    hist.clip_negative();
    hist
}

/// Nominal and shifted histograms of one process
struct ProcessHistograms {
    name: String,
    nominal: Histogram,
    shifted: BTreeMap<Shift, Histogram>,
}

impl ProcessHistograms {
    /// Deviation from nominal in a bin; missing shifts do not deviate
    fn deviation(&self, syst: Systematic, dir: Direction, bin: usize) -> f64 {
        self.shifted
            .get(&Shift::Varied(syst, dir))
            .map(|h| h.bin_content(bin) - self.nominal.bin_content(bin))
            .unwrap_or(0.)
    }

    fn max_deviation(&self, syst: Systematic, bin: usize) -> f64 {
        Direction::iter()
            .map(|dir| self.deviation(syst, dir, bin).abs())
            .fold(0., f64::max)
    }
}

impl UncertaintyBand {
    /// Combine all uncertainties of a distribution
    ///
    /// Negative bin contents are set to zero first. The squared
    /// contributions per bin are
    ///
    /// - correlated sources: the larger of the summed up and down
    ///   deviations over all processes
    /// - uncorrelated sources: the larger deviation of each process,
    ///   summed over processes
    /// - flat and per-process normalisation uncertainties
    /// - parton-shower uncertainties from a table, if given
    /// - the statistical uncertainty, if requested
    pub fn combine(
        store: &HistogramStore,
        settings: &BandSettings,
        parton_shower: Option<&UncertaintyTable>,
    ) -> Result<Self, BandError> {
        let region = &settings.region;
        let distribution = &settings.distribution;
        let processes = if settings.processes.is_empty() {
            store.samples(region, distribution)
        } else {
            settings.processes.clone()
        };
        if processes.is_empty() {
            return Err(BandError::NoProcesses {
                region: region.clone(),
                distribution: distribution.clone(),
            });
        }

        let mut histograms = Vec::with_capacity(processes.len());
        for name in processes {
            let key = HistKey::new(Shift::Nominal, &**region, &**distribution, &*name);
            let nominal = store
                .get(&key)
                .cloned()
                .map(clipped)
                .ok_or_else(|| BandError::MissingNominal(key.clone()))?;
            let mut shifted = BTreeMap::new();
            for k in store
                .keys()
                .filter(|k| matches!(k.shift, Shift::Varied(..)) && k.same_slot(&key))
            {
                let Some(hist) = store.get(k) else { continue };
                if !hist.same_binning(&nominal) {
                    return Err(BandError::Binning(k.clone()));
                }
                shifted.insert(k.shift, clipped(hist.clone()));
            }
            histograms.push(ProcessHistograms {
                name,
                nominal,
                shifted,
            });
        }

        let systematics: Vec<Systematic> = if settings.systematics.is_empty() {
            let found: BTreeSet<_> = histograms
                .iter()
                .flat_map(|p| p.shifted.keys())
                .filter_map(|s| match s {
                    Shift::Varied(syst, _) => Some(*syst),
                    _ => None,
                })
                .collect();
            // inputs are already contained in the derived uncertainty
            let inputs: BTreeSet<_> =
                found.iter().flat_map(|s| s.inputs()).copied().collect();
            found.difference(&inputs).copied().collect()
        } else {
            settings.systematics.clone()
        };
        debug!(
            "Uncertainty band for {distribution} in {region} from {} processes and sources {systematics:?}",
            histograms.len()
        );

        let nbins = histograms[0].nominal.nbins();
        let mut nominal = Vec::with_capacity(nbins);
        let mut uncertainty = Vec::with_capacity(nbins);
        for bin in 1..=nbins {
            let total: f64 = histograms.iter().map(|p| p.nominal.bin_content(bin)).sum();
            let mut var = 0.;
            for &syst in &systematics {
                let contribution = if settings.is_correlated(syst) {
                    Direction::iter()
                        .map(|dir| {
                            histograms
                                .iter()
                                .map(|p| p.deviation(syst, dir, bin))
                                .sum::<f64>()
                                .abs()
                        })
                        .fold(0., f64::max)
                        .powi(2)
                } else {
                    histograms
                        .iter()
                        .map(|p| p.max_deviation(syst, bin).powi(2))
                        .sum()
                };
                trace!("bin {bin}: {syst} contributes {contribution}");
                var += contribution;
            }
            var += settings
                .flat
                .values()
                .map(|rel| (rel * total).powi(2))
                .sum::<f64>();
            for p in &histograms {
                let nom = p.nominal.bin_content(bin);
                if let Some(rel) = settings.process_norm.get(&p.name) {
                    var += (rel * nom).powi(2);
                }
                if let Some(table) = parton_shower {
                    if let Some(rel) = table.get(&p.name, settings.category(), bin) {
                        var += (rel * nom).powi(2);
                    }
                }
                if settings.stat {
                    var += p.nominal.bin_error(bin).powi(2);
                }
            }
            nominal.push(total);
            uncertainty.push(var.sqrt());
        }
        Ok(Self {
            region: region.clone(),
            distribution: distribution.clone(),
            nominal,
            uncertainty,
        })
    }

    /// Combine with the parton-shower table named in the settings, if any
    pub fn from_settings(
        store: &HistogramStore,
        settings: &BandSettings,
    ) -> Result<Self, BandError> {
        let table = settings.parton_shower.as_ref().map(read_table).transpose()?;
        Self::combine(store, settings, table.as_ref())
    }
}
