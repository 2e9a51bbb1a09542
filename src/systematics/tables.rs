use std::collections::BTreeMap;
use std::path::Path;

use log::debug;

use crate::parsing::{
    blank_separated, content_lines, double_value, read_to_string, u32_value,
    Location, TextFileError,
};

/// Per-bin numbers for processes and categories
///
/// Used both for post-fit yields and for parton-shower uncertainties.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UncertaintyTable {
    entries: BTreeMap<(String, String, usize), f64>,
}

impl UncertaintyTable {
    /// Parse lines of `process category bin value`, separated by blanks
    pub fn parse(text: &str, file: &Path) -> Result<Self, TextFileError> {
        let mut entries = BTreeMap::new();
        for (line, content) in content_lines(text) {
            let loc = Location::new(file, line);
            let cols = loc.columns(blank_separated, content, 4)?;
            let bin = loc.value(u32_value, cols[2], "bin number")? as usize;
            let value = loc.value(double_value, cols[3], "number")?;
            let key = (cols[0].to_owned(), cols[1].to_owned(), bin);
            if entries.insert(key, value).is_some() {
                return Err(loc.invalid(format!(
                    "duplicate entry for {} {} bin {bin}",
                    cols[0], cols[1]
                )));
            }
        }
        Ok(Self { entries })
    }

    pub fn get(&self, process: &str, category: &str, bin: usize) -> Option<f64> {
        self.entries
            .get(&(process.to_owned(), category.to_owned(), bin))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn read_table(
    file: impl AsRef<Path>,
) -> Result<UncertaintyTable, TextFileError> {
    let file = file.as_ref();
    let text = read_to_string(file)?;
    let table = UncertaintyTable::parse(&text, file)?;
    debug!("Read {} table entries from {file:?}", table.len());
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_table() {
        let text = "# process category bin value\n\
                    tZq\tsignalregion\t1\t0.05\n\
                    WZ  signalregion  2  0.1  # comment\n\
                    \n";
        let table = UncertaintyTable::parse(text, Path::new("ps.txt")).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("tZq", "signalregion", 1), Some(0.05));
        assert_eq!(table.get("WZ", "signalregion", 2), Some(0.1));
        assert_eq!(table.get("WZ", "signalregion", 1), None);
    }

    #[test]
    fn wrong_column_count() {
        let text = "tZq signalregion 1 0.05\ntZq signalregion 2\n";
        let err = UncertaintyTable::parse(text, Path::new("ps.txt")).unwrap_err();
        assert!(matches!(
            err,
            TextFileError::ColumnCount { line: 2, expected: 4, found: 3, .. }
        ));
    }

    #[test]
    fn bad_value() {
        let text = "tZq signalregion 1 large\n";
        let err = UncertaintyTable::parse(text, Path::new("ps.txt")).unwrap_err();
        assert!(matches!(err, TextFileError::Value { line: 1, .. }));
    }
}
