//! Reading and writing event files
//!
//! An event file is a YAML stream, optionally compressed with any of the
//! formats understood by [audec]. The first document is a [SampleInfo]
//! header describing the sample, each following document is one
//! [EventRecord].
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use audec::auto_decompress;
use log::{debug, info, warn};
use particle_id::ParticleID;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::compression::{CompressedWriter, Compression};
use crate::config::{AnalysisConfig, ConfigError};
use crate::event::{Event, EventBuilder, GenInfo, Triggers, Year};
use crate::four_vector::FourVector;
use crate::objects::{DMeson, Jet, Lepton, LeptonQuality, Met, PtPhi};
use crate::traits::TryConvert;

/// Description of the sample an event file belongs to
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct SampleInfo {
    pub name: String,
    #[serde(default)]
    pub is_data: bool,
    #[serde(default)]
    pub year: Year,
    /// Cross section in pb
    #[serde(default)]
    pub xsec: f64,
    /// Sum of generator weights before any selection
    #[serde(default)]
    pub sum_of_weights: f64,
}

impl SampleInfo {
    /// Normalisation to the integrated luminosity of the sample's year
    ///
    /// This is `xsec · luminosity / sum_of_weights` for simulation and 1
    /// for data.
    pub fn norm(&self, config: &AnalysisConfig) -> Result<f64, ConfigError> {
        if self.is_data {
            return Ok(1.);
        }
        let lumi = config.luminosity(self.year)?;
        if self.sum_of_weights == 0. {
            warn!("Sample {} has a vanishing sum of weights", self.name);
            return Ok(0.);
        }
        Ok(self.xsec * lumi / self.sum_of_weights)
    }
}

fn default_weight() -> f64 {
    1.
}

fn default_true() -> bool {
    true
}

fn default_quality() -> LeptonQuality {
    LeptonQuality::Tight
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct LeptonRecord {
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
    #[serde(default)]
    pub mass: f64,
    pub pdg_id: i32,
    #[serde(default = "default_quality")]
    pub quality: LeptonQuality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cone_pt: Option<f64>,
    #[serde(default = "default_true")]
    pub is_prompt: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct JetRecord {
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
    #[serde(default)]
    pub mass: f64,
    pub deep_flavour: f64,
    #[serde(default)]
    pub hadron_flavour: i32,
    #[serde(default = "default_true")]
    pub is_tight: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pt_jec_up: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pt_jec_down: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pt_jer_up: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pt_jer_down: Option<f64>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct DMesonRecord {
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
    pub mass: f64,
    pub isolation: f64,
    pub delta_r_daughters: f64,
    #[serde(default)]
    pub has_gen_match: bool,
}

/// Missing momentum; shifts that are not given equal the nominal value
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct MetRecord {
    pub pt: f64,
    pub phi: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jec_up: Option<PtPhi>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jec_down: Option<PtPhi>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jer_up: Option<PtPhi>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jer_down: Option<PtPhi>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uncl_up: Option<PtPhi>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uncl_down: Option<PtPhi>,
}

impl From<&MetRecord> for Met {
    fn from(r: &MetRecord) -> Self {
        let nominal = PtPhi::new(r.pt, r.phi);
        Met {
            nominal,
            jec_up: r.jec_up.unwrap_or(nominal),
            jec_down: r.jec_down.unwrap_or(nominal),
            jer_up: r.jer_up.unwrap_or(nominal),
            jer_down: r.jer_down.unwrap_or(nominal),
            uncl_up: r.uncl_up.unwrap_or(nominal),
            uncl_down: r.uncl_down.unwrap_or(nominal),
        }
    }
}

/// One event as stored in an event file
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct EventRecord {
    pub run: u32,
    pub lumi_block: u32,
    pub number: u64,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub triggers: Triggers,
    #[serde(default = "default_true")]
    pub passes_met_filters: bool,
    #[serde(default)]
    pub n_vertices: u32,
    #[serde(default)]
    pub leptons: Vec<LeptonRecord>,
    #[serde(default)]
    pub jets: Vec<JetRecord>,
    #[serde(default)]
    pub d_mesons: Vec<DMesonRecord>,
    #[serde(default)]
    pub met: MetRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gen: Option<GenInfo>,
}

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("Failed to read {file:?}: {source}")]
    Io {
        file: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse {file:?}: {source}")]
    Parse {
        file: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("{0:?} contains no sample header")]
    MissingHeader(PathBuf),
    #[error("Event {index} is out of range; there are {nentries} events")]
    Index { index: usize, nentries: usize },
    #[error("Event {event}: {pdg_id} is not the PDG id of a charged lepton")]
    PdgId { event: u64, pdg_id: i32 },
}

/// Conversion from stored records to [Event]s
///
/// Information shared by all events of a sample is taken from its
/// [SampleInfo].
#[derive(Clone, Debug)]
pub struct RecordConverter {
    is_data: bool,
    year: Year,
}

impl RecordConverter {
    pub fn new(info: &SampleInfo) -> Self {
        Self {
            is_data: info.is_data,
            year: info.year,
        }
    }
}

fn is_charged_lepton(id: i32) -> bool {
    matches!(id.abs(), 11 | 13 | 15)
}

impl EventRecord {
    /// Check that the record describes a valid [Event]
    pub fn validate(&self) -> Result<(), ReadError> {
        match self.leptons.iter().find(|l| !is_charged_lepton(l.pdg_id)) {
            Some(l) => Err(ReadError::PdgId {
                event: self.number,
                pdg_id: l.pdg_id,
            }),
            None => Ok(()),
        }
    }
}

impl TryConvert<&EventRecord, Event> for RecordConverter {
    type Error = ReadError;

    fn try_convert(&mut self, record: &EventRecord) -> Result<Event, Self::Error> {
        record.validate()?;
        let mut builder =
            EventBuilder::new(record.run, record.lumi_block, record.number);
        builder
            .weight(record.weight)
            .data(self.is_data)
            .year(self.year)
            .triggers(record.triggers)
            .met_filters(record.passes_met_filters)
            .n_vertices(record.n_vertices)
            .met((&record.met).into());
        for l in &record.leptons {
            let p = FourVector::from_pt_eta_phi_m(l.pt, l.eta, l.phi, l.mass);
            let lepton = Lepton::new(p, ParticleID::new(l.pdg_id))
                .with_quality(l.quality)
                .with_cone_pt(l.cone_pt.unwrap_or(l.pt))
                .with_prompt(l.is_prompt);
            builder.add_lepton(lepton);
        }
        for j in &record.jets {
            let p = FourVector::from_pt_eta_phi_m(j.pt, j.eta, j.phi, j.mass);
            let mut jet = Jet::new(p, j.deep_flavour);
            jet.hadron_flavour = j.hadron_flavour;
            jet.is_tight = j.is_tight;
            jet.pt_jec_up = j.pt_jec_up.unwrap_or(j.pt);
            jet.pt_jec_down = j.pt_jec_down.unwrap_or(j.pt);
            jet.pt_jer_up = j.pt_jer_up.unwrap_or(j.pt);
            jet.pt_jer_down = j.pt_jer_down.unwrap_or(j.pt);
            builder.add_jet(jet);
        }
        for d in &record.d_mesons {
            let p = FourVector::from_pt_eta_phi_m(d.pt, d.eta, d.phi, d.mass);
            let mut meson = DMeson::new(p, d.isolation, d.delta_r_daughters);
            meson.has_gen_match = d.has_gen_match;
            builder.add_d_meson(meson);
        }
        if let Some(gen) = &record.gen {
            builder.gen(gen.clone());
        }
        Ok(builder.build())
    }
}

/// An event file loaded into memory
#[derive(Clone, Debug)]
pub struct EventFile {
    info: SampleInfo,
    records: Vec<EventRecord>,
    converter: RecordConverter,
}

impl EventFile {
    /// Read the header and all event records
    ///
    /// Fails if any record cannot be converted to an event.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ReadError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ReadError::Io {
            file: path.to_owned(),
            source,
        })?;
        let reader = auto_decompress(BufReader::new(file));
        let parse_err = |source| ReadError::Parse {
            file: path.to_owned(),
            source,
        };
        let mut documents = serde_yaml::Deserializer::from_reader(reader);
        let info = match documents.next() {
            Some(doc) => SampleInfo::deserialize(doc).map_err(parse_err)?,
            None => return Err(ReadError::MissingHeader(path.to_owned())),
        };
        let records = documents
            .map(EventRecord::deserialize)
            .collect::<Result<Vec<_>, _>>()
            .map_err(parse_err)?;
        records.iter().try_for_each(EventRecord::validate)?;
        info!(
            "Read {} events of sample {} ({}) from {path:?}",
            records.len(),
            info.name,
            info.year
        );
        let converter = RecordConverter::new(&info);
        Ok(Self {
            info,
            records,
            converter,
        })
    }

    pub fn info(&self) -> &SampleInfo {
        &self.info
    }

    pub fn number_of_entries(&self) -> usize {
        self.records.len()
    }

    pub fn record(&self, index: usize) -> Option<&EventRecord> {
        self.records.get(index)
    }

    /// Construct the event with the given index
    pub fn build_event(&self, index: usize) -> Result<Event, ReadError> {
        let record = self.records.get(index).ok_or(ReadError::Index {
            index,
            nentries: self.records.len(),
        })?;
        self.converter.clone().try_convert(record)
    }
}

/// Writer for event files
pub struct EventFileWriter<W: Write> {
    writer: CompressedWriter<W>,
    nevents: usize,
}

fn write_document<T: Serialize, W: Write>(
    writer: &mut W,
    doc: &T,
) -> Result<(), std::io::Error> {
    writer.write_all(b"---\n")?;
    serde_yaml::to_writer(&mut *writer, doc)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))
}

impl EventFileWriter<BufWriter<File>> {
    /// Create a file and write the sample header
    pub fn create(
        path: impl AsRef<Path>,
        info: &SampleInfo,
        compression: Option<Compression>,
    ) -> Result<Self, std::io::Error> {
        let file = File::create(path.as_ref())?;
        debug!("Writing events to {:?}", path.as_ref());
        Self::new(BufWriter::new(file), info, compression)
    }
}

impl<W: Write> EventFileWriter<W> {
    pub fn new(
        writer: W,
        info: &SampleInfo,
        compression: Option<Compression>,
    ) -> Result<Self, std::io::Error> {
        let mut writer = CompressedWriter::new(writer, compression)?;
        write_document(&mut writer, info)?;
        Ok(Self { writer, nevents: 0 })
    }

    pub fn write_record(
        &mut self,
        record: &EventRecord,
    ) -> Result<(), std::io::Error> {
        self.nevents += 1;
        write_document(&mut self.writer, record)
    }

    /// Complete the output, returning the underlying writer
    pub fn finish(self) -> Result<W, std::io::Error> {
        debug!("Wrote {} events", self.nevents);
        self.writer.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn log_init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    const FILE: &str = "
name: WZ
year: '2017'
xsec: 4.4
sum_of_weights: 200.0
---
run: 1
lumi_block: 7
number: 42
weight: 0.5
triggers: {single_muon: true}
leptons:
  - {pt: 50, eta: 0.5, phi: 0.1, pdg_id: 13}
  - {pt: 12, eta: -1.5, phi: 2.0, pdg_id: -11, quality: Fakeable, cone_pt: 18.0}
jets:
  - {pt: 60, eta: 1.0, phi: -2.0, mass: 10, deep_flavour: 0.9, hadron_flavour: 5, pt_jec_up: 63}
met: {pt: 40, phi: -1.5, jec_up: {pt: 42, phi: -1.5}}
gen:
  n_true_interactions: 31
---
run: 1
lumi_block: 7
number: 43
";

    #[test]
    fn read_events() {
        log_init();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.yaml");
        std::fs::write(&path, FILE).unwrap();
        let file = EventFile::open(&path).unwrap();
        assert_eq!(file.number_of_entries(), 2);
        assert_eq!(file.info().year, Year::Y2017);

        let ev = file.build_event(0).unwrap();
        assert!(ev.is_mc());
        assert_eq!(ev.year, Year::Y2017);
        assert_eq!(ev.number(), 42);
        assert_eq!(ev.weight(), 0.5);
        assert!(ev.triggers.single_muon);
        assert!(ev.passes_met_filters);
        assert_eq!(ev.leptons.len(), 2);
        assert!(ev.leptons[0].is_muon() && ev.leptons[0].is_tight());
        assert_eq!(ev.leptons[0].charge(), -1);
        assert!(ev.leptons[1].is_electron() && !ev.leptons[1].is_tight());
        assert_eq!(ev.leptons[1].charge(), 1);
        assert_eq!(ev.leptons[1].cone_pt(), 18.);
        assert_abs_diff_eq!(ev.jets[0].pt(), 60., epsilon = 1e-9);
        assert_eq!(ev.jets[0].pt_jec_up, 63.);
        assert_eq!(ev.jets[0].pt_jer_down, 60.);
        assert_eq!(ev.met.jec_up.pt, 42.);
        assert_eq!(ev.met.uncl_down.pt, 40.);
        assert_eq!(ev.gen().unwrap().n_true_interactions, 31.);

        let ev = file.build_event(1).unwrap();
        assert_eq!(ev.weight(), 1.);
        assert!(ev.leptons.is_empty());
        assert!(matches!(
            file.build_event(2),
            Err(ReadError::Index { index: 2, nentries: 2 })
        ));
    }

    #[test]
    fn normalisation() {
        let mut info: SampleInfo =
            serde_yaml::from_str("{name: WZ, year: '2017', xsec: 4.4, sum_of_weights: 200.0}")
                .unwrap();
        let config = AnalysisConfig::default();
        let lumi = config.luminosity(Year::Y2017).unwrap();
        assert_abs_diff_eq!(info.norm(&config).unwrap(), 4.4 * lumi / 200.);
        info.is_data = true;
        assert_eq!(info.norm(&config).unwrap(), 1.);
    }

    #[test]
    fn invalid_pdg_id() {
        let info = SampleInfo {
            name: "test".to_owned(),
            is_data: false,
            year: Year::Y2018,
            xsec: 1.,
            sum_of_weights: 1.,
        };
        let record: EventRecord = serde_yaml::from_str(
            "{run: 1, lumi_block: 1, number: 5, leptons: [{pt: 10, eta: 0, phi: 0, pdg_id: 22}]}",
        )
        .unwrap();
        let res = RecordConverter::new(&info).try_convert(&record);
        assert!(matches!(res, Err(ReadError::PdgId { event: 5, pdg_id: 22 })));
    }

    #[test]
    fn missing_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.yaml");
        std::fs::write(&path, "").unwrap();
        assert!(EventFile::open(&path).is_err());
    }

    #[test]
    fn invalid_record_rejected_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photon.yaml");
        let text = format!(
            "{FILE}---\nrun: 1\nlumi_block: 7\nnumber: 44\n\
             leptons:\n  - {{pt: 20, eta: 0, phi: 0, pdg_id: 22}}\n"
        );
        std::fs::write(&path, text).unwrap();
        assert!(matches!(
            EventFile::open(&path),
            Err(ReadError::PdgId { event: 44, pdg_id: 22 })
        ));
    }

    #[test]
    fn write_and_read_back() {
        log_init();
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.yaml");
        std::fs::write(&input, FILE).unwrap();
        let file = EventFile::open(&input).unwrap();

        let output = dir.path().join("out.yaml.zst");
        let mut writer = EventFileWriter::create(
            &output,
            file.info(),
            Some(Compression::Zstd(0)),
        )
        .unwrap();
        for idx in 0..file.number_of_entries() {
            writer.write_record(file.record(idx).unwrap()).unwrap();
        }
        writer.finish().unwrap();

        let read = EventFile::open(&output).unwrap();
        assert_eq!(read.info(), file.info());
        assert_eq!(read.number_of_entries(), 2);
        for idx in 0..2 {
            assert_eq!(read.record(idx), file.record(idx));
        }
        let orig = file.build_event(0).unwrap();
        let ev = read.build_event(0).unwrap();
        assert_eq!(ev.number(), orig.number());
        assert_eq!(ev.leptons.len(), orig.leptons.len());
        for (a, b) in ev.leptons.iter().zip(&orig.leptons) {
            assert_abs_diff_eq!(a.pt(), b.pt());
            assert_abs_diff_eq!(a.cone_pt(), b.cone_pt());
            assert_eq!(a.quality(), b.quality());
            assert_eq!(a.pdg_id(), b.pdg_id());
        }
        assert_abs_diff_eq!(ev.jets[0].p4().m(), 10., epsilon = 1e-6);
        assert_eq!(ev.met, orig.met);
        assert_eq!(ev.gen(), orig.gen());
    }
}
