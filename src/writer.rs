use std::fs::File;
use std::io::{BufWriter, Write};
use std::marker::PhantomData;
use std::path::Path;

use log::debug;
use thiserror::Error;

use crate::compression::{CompressedWriter, Compression};
use crate::event_file::SampleInfo;
use crate::flatten::{Schema, VariableMap};

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to write record: {0}")]
    Csv(#[from] csv::Error),
    #[error("Failed to serialise sample information: {0}")]
    Header(#[from] serde_yaml::Error),
}

/// Writer for flat trees of event variables
///
/// The output is tab-separated text with one row per event and one
/// column per variable of the schema `S`. It starts with the sample
/// information as `#` comment lines, followed by a row with the variable
/// names.
pub struct FlatTreeWriter<W: Write, S> {
    writer: csv::Writer<CompressedWriter<W>>,
    nentries: usize,
    schema: PhantomData<S>,
}

impl<S: Schema> FlatTreeWriter<BufWriter<File>, S> {
    pub fn create(
        path: impl AsRef<Path>,
        info: &SampleInfo,
        compression: Option<Compression>,
    ) -> Result<Self, WriteError> {
        let file = File::create(path.as_ref())?;
        debug!("Writing flat tree to {:?}", path.as_ref());
        Self::new(BufWriter::new(file), info, compression)
    }
}

impl<W: Write, S: Schema> FlatTreeWriter<W, S> {
    pub fn new(
        writer: W,
        info: &SampleInfo,
        compression: Option<Compression>,
    ) -> Result<Self, WriteError> {
        let mut writer = CompressedWriter::new(writer, compression)?;
        let header = serde_yaml::to_string(info)?;
        for line in header.lines() {
            writeln!(writer, "# {line}")?;
        }
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(writer);
        writer.write_record(VariableMap::<S>::names())?;
        Ok(Self {
            writer,
            nentries: 0,
            schema: PhantomData,
        })
    }

    pub fn write(&mut self, vars: &VariableMap<S>) -> Result<(), WriteError> {
        self.writer
            .write_record(vars.values().iter().map(|v| v.to_string()))?;
        self.nentries += 1;
        Ok(())
    }

    pub fn nentries(&self) -> usize {
        self.nentries
    }

    /// Complete the output, returning the underlying writer
    pub fn finish(self) -> Result<W, WriteError> {
        debug!("Wrote {} entries", self.nentries);
        let writer = self
            .writer
            .into_inner()
            .map_err(|err| WriteError::Io(err.into_error()))?;
        Ok(writer.finish()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Year;
    use crate::flatten::WdVariable;

    #[test]
    fn header_and_rows() {
        let info = SampleInfo {
            name: "WZ".to_owned(),
            is_data: false,
            year: Year::Y2017,
            xsec: 4.4,
            sum_of_weights: 200.,
        };
        let mut writer =
            FlatTreeWriter::<_, WdVariable>::new(Vec::new(), &info, None).unwrap();
        let mut vars = VariableMap::new();
        vars[WdVariable::LeptonPt] = 50.;
        writer.write(&vars).unwrap();
        assert_eq!(writer.nentries(), 1);
        let out = String::from_utf8(writer.finish().unwrap()).unwrap();

        let comments: String = out
            .lines()
            .take_while(|l| l.starts_with('#'))
            .map(|l| format!("{}\n", &l[2..]))
            .collect();
        let read: SampleInfo = serde_yaml::from_str(&comments).unwrap();
        assert_eq!(read, info);

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .comment(Some(b'#'))
            .from_reader(out.as_bytes());
        let header = reader.headers().unwrap().clone();
        assert_eq!(header.len(), vars.len());
        let pos = header.iter().position(|h| h == "_leptonPt").unwrap();
        let rows: Vec<_> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][pos].parse::<f64>().unwrap(), 50.);
    }
}
