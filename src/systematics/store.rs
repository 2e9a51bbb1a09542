use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use audec::auto_decompress;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use thiserror::Error;

use crate::histogram::{Histogram, HistogramError};
use crate::variation::Direction;

use super::{Shift, Systematic};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access {file:?}: {source}")]
    Io {
        file: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to (de)serialise {file:?}: {source}")]
    Yaml {
        file: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("Duplicate histogram {0}")]
    Duplicate(HistKey),
    #[error(transparent)]
    Histogram(#[from] HistogramError),
}

/// Identifies one histogram of the analysis
#[derive(
    Deserialize, Serialize, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash,
)]
pub struct HistKey {
    pub shift: Shift,
    pub region: String,
    pub distribution: String,
    pub sample: String,
}

impl HistKey {
    pub fn new(
        shift: Shift,
        region: impl Into<String>,
        distribution: impl Into<String>,
        sample: impl Into<String>,
    ) -> Self {
        Self {
            shift,
            region: region.into(),
            distribution: distribution.into(),
            sample: sample.into(),
        }
    }

    /// The same histogram with a different shift
    pub fn with_shift(&self, shift: Shift) -> Self {
        Self {
            shift,
            ..self.clone()
        }
    }

    /// Whether the keys agree in everything but the shift
    pub fn same_slot(&self, other: &HistKey) -> bool {
        self.region == other.region
            && self.distribution == other.distribution
            && self.sample == other.sample
    }
}

/// Up and down histograms from the RMS over PDF replicas
fn pdf_band(nominal: &Histogram, replicas: &[&Histogram]) -> (Histogram, Histogram) {
    let mut up = nominal.empty_like(nominal.name());
    let mut down = nominal.empty_like(nominal.name());
    let n = replicas.len();
    for bin in 0..nominal.nbins() + 2 {
        let nom = nominal.bin_content(bin);
        let rms = if n == 0 {
            0.
        } else {
            let sum_sq: f64 = replicas
                .iter()
                .map(|r| (r.bin_content(bin) - nom).powi(2))
                .sum();
            (sum_sq / n as f64).sqrt()
        };
        up.set_bin_content(bin, nom + rms);
        down.set_bin_content(bin, nom - rms);
    }
    (up, down)
}

/// Bin-wise maximum and minimum over a set of variations
fn envelope(
    nominal: &Histogram,
    variations: &[&Histogram],
) -> (Histogram, Histogram) {
    let mut up = nominal.empty_like(nominal.name());
    let mut down = nominal.empty_like(nominal.name());
    for bin in 0..nominal.nbins() + 2 {
        let contents = variations.iter().map(|h| h.bin_content(bin));
        let max = contents.clone().fold(f64::NEG_INFINITY, f64::max);
        let min = contents.fold(f64::INFINITY, f64::min);
        let nom = nominal.bin_content(bin);
        up.set_bin_content(bin, if max.is_finite() { max } else { nom });
        down.set_bin_content(bin, if min.is_finite() { min } else { nom });
    }
    (up, down)
}

impl std::fmt::Display for HistKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.region, self.distribution, self.sample, self.shift
        )
    }
}

#[derive(Deserialize, Serialize)]
struct StoredHistogram {
    #[serde(flatten)]
    key: HistKey,
    histogram: Histogram,
}

#[derive(Deserialize, Serialize, Default)]
struct StoreData {
    histograms: Vec<StoredHistogram>,
}

/// All histograms of an analysis, by shift, region, distribution and
/// sample
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(try_from = "StoreData", into = "StoreData")]
pub struct HistogramStore {
    histograms: BTreeMap<HistKey, Histogram>,
}

impl TryFrom<StoreData> for HistogramStore {
    type Error = StoreError;

    fn try_from(data: StoreData) -> Result<Self, Self::Error> {
        let mut store = Self::new();
        for StoredHistogram { key, histogram } in data.histograms {
            if store.histograms.contains_key(&key) {
                return Err(StoreError::Duplicate(key));
            }
            store.histograms.insert(key, histogram);
        }
        Ok(store)
    }
}

impl From<HistogramStore> for StoreData {
    fn from(store: HistogramStore) -> Self {
        let histograms = store
            .histograms
            .into_iter()
            .map(|(key, histogram)| StoredHistogram { key, histogram })
            .collect();
        Self { histograms }
    }
}

impl HistogramStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.histograms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histograms.is_empty()
    }

    pub fn get(&self, key: &HistKey) -> Option<&Histogram> {
        self.histograms.get(key)
    }

    pub fn get_mut(&mut self, key: &HistKey) -> Option<&mut Histogram> {
        self.histograms.get_mut(key)
    }

    pub fn insert(&mut self, key: HistKey, histogram: Histogram) -> Option<Histogram> {
        self.histograms.insert(key, histogram)
    }

    pub fn remove(&mut self, key: &HistKey) -> Option<Histogram> {
        self.histograms.remove(key)
    }

    /// The histogram for `key`, created from `template` if missing
    pub fn entry(&mut self, key: HistKey, template: &Histogram) -> &mut Histogram {
        self.histograms.entry(key).or_insert_with_key(|key| {
            template.empty_like(format!(
                "{}_{}_{}_{}",
                key.region, key.distribution, key.sample, key.shift
            ))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HistKey, &Histogram)> {
        self.histograms.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &HistKey> {
        self.histograms.keys()
    }

    /// Names of all samples with histograms for the given region and
    /// distribution
    pub fn samples(&self, region: &str, distribution: &str) -> Vec<String> {
        let mut samples: Vec<_> = self
            .keys()
            .filter(|k| k.region == region && k.distribution == distribution)
            .map(|k| k.sample.clone())
            .collect();
        samples.sort();
        samples.dedup();
        samples
    }

    /// (Re)compute the shifts of a derived systematic
    ///
    /// `nominal` is the key of the nominal histogram. The scale envelope
    /// is taken over the stored scale variations, the PDF shifts are the
    /// RMS over the stored replicas. Nothing happens without a nominal
    /// histogram or for systematics that are not derived.
    pub fn derive(&mut self, nominal: &HistKey, syst: Systematic) {
        let Some(nom) = self.get(nominal) else {
            return;
        };
        let (up, down) = match syst {
            Systematic::ScaleEnvelope => {
                let variations: Vec<_> = syst
                    .inputs()
                    .iter()
                    .flat_map(|&s| Direction::iter().map(move |dir| Shift::Varied(s, dir)))
                    .filter_map(|shift| self.get(&nominal.with_shift(shift)))
                    .collect();
                envelope(nom, &variations)
            }
            Systematic::Pdf => {
                let replicas: Vec<_> = self
                    .iter()
                    .filter(|(k, _)| {
                        matches!(k.shift, Shift::PdfReplica(_)) && k.same_slot(nominal)
                    })
                    .map(|(_, h)| h)
                    .collect();
                trace!("{} PDF replicas for {nominal}", replicas.len());
                pdf_band(nom, &replicas)
            }
            _ => return,
        };
        self.insert(nominal.with_shift(Shift::Varied(syst, Direction::Up)), up);
        self.insert(nominal.with_shift(Shift::Varied(syst, Direction::Down)), down);
    }

    /// Add the histograms of `other`
    ///
    /// Histograms with the same key are summed, all others are copied.
    /// Derived shifts are not additive, so they are recomputed from the
    /// merged inputs.
    pub fn merge(&mut self, other: HistogramStore) -> Result<(), StoreError> {
        let derived: BTreeSet<_> = self
            .keys()
            .chain(other.keys())
            .filter_map(|k| match k.shift {
                Shift::Varied(syst, _) if k.shift.is_derived() => {
                    Some((k.with_shift(Shift::Nominal), syst))
                }
                _ => None,
            })
            .collect();
        for (key, hist) in other.histograms {
            if key.shift.is_derived() {
                continue;
            }
            match self.histograms.get_mut(&key) {
                Some(existing) => existing.add(&hist)?,
                None => {
                    self.histograms.insert(key, hist);
                }
            }
        }
        for (nominal, syst) in derived {
            self.derive(&nominal, syst);
        }
        Ok(())
    }

    /// Read histograms from a (possibly compressed) YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| StoreError::Io {
            file: path.to_owned(),
            source,
        })?;
        let store: Self = serde_yaml::from_reader(auto_decompress(BufReader::new(file)))
            .map_err(|source| StoreError::Yaml {
                file: path.to_owned(),
                source,
            })?;
        debug!("Read {} histograms from {path:?}", store.len());
        Ok(store)
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| StoreError::Io {
            file: path.to_owned(),
            source,
        })?;
        serde_yaml::to_writer(BufWriter::new(file), self).map_err(|source| {
            StoreError::Yaml {
                file: path.to_owned(),
                source,
            }
        })?;
        debug!("Wrote {} histograms to {path:?}", self.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn store() -> HistogramStore {
        let template = Histogram::new("h", "lepton pt", 2, 0., 100.);
        let mut store = HistogramStore::new();
        let key = HistKey::new(Shift::Nominal, "signalregion", "_leptonPt", "WZ");
        store.entry(key.clone(), &template).fill(30., 1.);
        let up = key.with_shift(Shift::Varied(Systematic::Jec, Direction::Up));
        store.entry(up, &template).fill(70., 2.);
        store
    }

    #[test]
    fn round_trip_and_merge() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hists.yaml");
        let mut orig = store();
        orig.write_to_file(&path).unwrap();
        let read = HistogramStore::from_file(&path).unwrap();
        assert_eq!(read, orig);

        orig.merge(read).unwrap();
        assert_eq!(orig.len(), 2);
        let key = HistKey::new(Shift::Nominal, "signalregion", "_leptonPt", "WZ");
        assert_eq!(orig.get(&key).unwrap().bin_content(1), 2.);
        assert_eq!(orig.samples("signalregion", "_leptonPt"), vec!["WZ"]);
        assert!(orig.samples("wzcontrolregion", "_leptonPt").is_empty());
    }

    #[test]
    fn shift_serialised_by_name() {
        let yaml = serde_yaml::to_string(&store()).unwrap();
        assert!(yaml.contains("shift: JECUp"));
        assert!(yaml.contains("shift: nominal"));
    }

    fn nominal_key() -> HistKey {
        HistKey::new(Shift::Nominal, "signalregion", "_leptonPt", "tZq")
    }

    /// Store with a nominal content of 10 and one scale variation at 11
    fn scale_store(varied: Systematic) -> HistogramStore {
        let template = Histogram::new("h", "", 1, 0., 1.);
        let mut store = HistogramStore::new();
        let key = nominal_key();
        store.entry(key.clone(), &template).fill(0.5, 10.);
        for &syst in Systematic::ScaleEnvelope.inputs() {
            for dir in Direction::iter() {
                let w = if syst == varied && dir == Direction::Up { 11. } else { 10. };
                store
                    .entry(key.with_shift(Shift::Varied(syst, dir)), &template)
                    .fill(0.5, w);
            }
        }
        store.derive(&key, Systematic::ScaleEnvelope);
        store
    }

    #[test]
    fn merge_recomputes_envelope() {
        let up = nominal_key().with_shift(Shift::Varied(Systematic::ScaleEnvelope, Direction::Up));
        let down =
            nominal_key().with_shift(Shift::Varied(Systematic::ScaleEnvelope, Direction::Down));
        let mut store = scale_store(Systematic::ScaleMuR);
        assert_eq!(store.get(&up).unwrap().bin_content(1), 11.);
        assert_eq!(store.get(&down).unwrap().bin_content(1), 10.);

        store.merge(scale_store(Systematic::ScaleMuF)).unwrap();
        assert_eq!(store.get(&nominal_key()).unwrap().bin_content(1), 20.);
        assert_eq!(store.get(&up).unwrap().bin_content(1), 21.);
        assert_eq!(store.get(&down).unwrap().bin_content(1), 20.);
    }

    fn replica_store(replicas: &[f64]) -> HistogramStore {
        let template = Histogram::new("h", "", 1, 0., 1.);
        let mut store = HistogramStore::new();
        let key = nominal_key();
        store.entry(key.clone(), &template).fill(0.5, 10.);
        for (idx, &w) in replicas.iter().enumerate() {
            store
                .entry(key.with_shift(Shift::PdfReplica(idx)), &template)
                .fill(0.5, w);
        }
        store.derive(&key, Systematic::Pdf);
        store
    }

    #[test]
    fn pdf_rms() {
        let up = nominal_key().with_shift(Shift::Varied(Systematic::Pdf, Direction::Up));
        let down = nominal_key().with_shift(Shift::Varied(Systematic::Pdf, Direction::Down));
        let store = replica_store(&[9., 11., 13., 7.]);
        let rms = ((1. + 1. + 9. + 9.) / 4f64).sqrt();
        assert_abs_diff_eq!(store.get(&up).unwrap().bin_content(1), 10. + rms);
        assert_abs_diff_eq!(store.get(&down).unwrap().bin_content(1), 10. - rms);

        // replicas are summed before the RMS is taken
        let mut store = replica_store(&[9., 11.]);
        store.merge(replica_store(&[13., 7.])).unwrap();
        assert_abs_diff_eq!(store.get(&up).unwrap().bin_content(1), 22.);
        assert_abs_diff_eq!(store.get(&down).unwrap().bin_content(1), 18.);
    }

    #[test]
    fn replicas_serialised_by_index() {
        let store = replica_store(&[9., 11.]);
        let yaml = serde_yaml::to_string(&store).unwrap();
        assert!(yaml.contains("shift: pdfReplica1"));
        let read: HistogramStore = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(read, store);
    }
}
