use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::parsing::{
    declaration_lines, double_value, read_to_string, tab_separated, u32_value,
    Location, TextFileError,
};

#[derive(Debug, Error)]
pub enum HistogramError {
    #[error("Cannot combine histograms {0} and {1} with different binning")]
    BinningMismatch(String, String),
}

/// A one-dimensional histogram with uniform bins
///
/// Bin 0 is the underflow and bin `nbins + 1` the overflow bin. Sums of
/// squared weights are tracked for every bin.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Histogram {
    name: String,
    title: String,
    nbins: usize,
    xlow: f64,
    xhigh: f64,
    contents: Vec<f64>,
    sumw2: Vec<f64>,
}

impl Histogram {
    pub fn new(
        name: impl Into<String>,
        title: impl Into<String>,
        nbins: usize,
        xlow: f64,
        xhigh: f64,
    ) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            nbins,
            xlow,
            xhigh,
            contents: vec![0.; nbins + 2],
            sumw2: vec![0.; nbins + 2],
        }
    }

    /// Empty histogram with the same binning and title
    pub fn empty_like(&self, name: impl Into<String>) -> Self {
        Self::new(name, self.title.clone(), self.nbins, self.xlow, self.xhigh)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn nbins(&self) -> usize {
        self.nbins
    }

    pub fn xlow(&self) -> f64 {
        self.xlow
    }

    pub fn xhigh(&self) -> f64 {
        self.xhigh
    }

    /// Index of the bin containing `x`
    ///
    /// NaN ends up in the underflow bin.
    pub fn find_bin(&self, x: f64) -> usize {
        if !(x >= self.xlow) {
            return 0;
        }
        if x >= self.xhigh {
            return self.nbins + 1;
        }
        let width = (self.xhigh - self.xlow) / self.nbins as f64;
        let bin = ((x - self.xlow) / width) as usize + 1;
        bin.min(self.nbins)
    }

    pub fn fill(&mut self, x: f64, weight: f64) {
        let bin = self.find_bin(x);
        self.contents[bin] += weight;
        self.sumw2[bin] += weight * weight;
    }

    pub fn bin_content(&self, bin: usize) -> f64 {
        self.contents[bin]
    }

    pub fn bin_error(&self, bin: usize) -> f64 {
        self.sumw2[bin].sqrt()
    }

    pub fn set_bin_content(&mut self, bin: usize, content: f64) {
        self.contents[bin] = content;
    }

    /// Contents of all bins including under- and overflow
    pub fn contents(&self) -> &[f64] {
        &self.contents
    }

    pub fn bin_low_edge(&self, bin: usize) -> f64 {
        let width = (self.xhigh - self.xlow) / self.nbins as f64;
        self.xlow + (bin as f64 - 1.) * width
    }

    /// Sum of the contents of all regular bins
    pub fn integral(&self) -> f64 {
        self.contents[1..=self.nbins].iter().sum()
    }

    pub fn same_binning(&self, other: &Histogram) -> bool {
        self.nbins == other.nbins
            && self.xlow == other.xlow
            && self.xhigh == other.xhigh
    }

    /// Add the contents of `other`, scaled by `factor`
    pub fn add_scaled(
        &mut self,
        other: &Histogram,
        factor: f64,
    ) -> Result<(), HistogramError> {
        if !self.same_binning(other) {
            return Err(HistogramError::BinningMismatch(
                self.name.clone(),
                other.name.clone(),
            ));
        }
        for (c, o) in self.contents.iter_mut().zip(&other.contents) {
            *c += factor * o;
        }
        for (w2, o) in self.sumw2.iter_mut().zip(&other.sumw2) {
            *w2 += factor * factor * o;
        }
        Ok(())
    }

    pub fn add(&mut self, other: &Histogram) -> Result<(), HistogramError> {
        self.add_scaled(other, 1.)
    }

    pub fn scale(&mut self, factor: f64) {
        self.contents.iter_mut().for_each(|c| *c *= factor);
        self.sumw2.iter_mut().for_each(|w2| *w2 *= factor * factor);
    }

    /// Set negative bin contents and their errors to zero
    pub fn clip_negative(&mut self) {
        for (c, w2) in self.contents.iter_mut().zip(self.sumw2.iter_mut()) {
            if *c < 0. {
                *c = 0.;
                *w2 = 0.;
            }
        }
    }
}

/// Declaration of a histogrammed variable
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct HistogramVariable {
    pub name: String,
    pub title: String,
    pub nbins: usize,
    pub xlow: f64,
    pub xhigh: f64,
}

impl HistogramVariable {
    pub fn histogram(&self, name: impl Into<String>) -> Histogram {
        Histogram::new(name, &*self.title, self.nbins, self.xlow, self.xhigh)
    }
}

/// Read variable declarations
///
/// Each line holds `name`, `title`, `nbins`, `xlow` and `xhigh`,
/// separated by tabs. Text after `#` is ignored.
pub fn read_variables(
    file: impl AsRef<Path>,
) -> Result<Vec<HistogramVariable>, TextFileError> {
    let file = file.as_ref();
    let text = read_to_string(file)?;
    let vars = parse_variables(&text, file)?;
    debug!("Read {} histogram variables from {file:?}", vars.len());
    Ok(vars)
}

pub fn parse_variables(
    text: &str,
    file: &Path,
) -> Result<Vec<HistogramVariable>, TextFileError> {
    let mut vars = Vec::new();
    for (line, content) in declaration_lines(text) {
        let loc = Location::new(file, line);
        let cols = loc.columns(tab_separated, content.trim_end_matches(' '), 5)?;
        let nbins = loc.value(u32_value, cols[2], "number of bins")? as usize;
        let xlow = loc.value(double_value, cols[3], "lower edge")?;
        let xhigh = loc.value(double_value, cols[4], "upper edge")?;
        if nbins == 0 || !(xlow < xhigh) {
            return Err(loc.invalid(format!(
                "invalid binning {nbins} bins in [{xlow}, {xhigh}]"
            )));
        }
        vars.push(HistogramVariable {
            name: cols[0].trim().to_owned(),
            title: cols[1].trim().to_owned(),
            nbins,
            xlow,
            xhigh,
        });
    }
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn fill_and_flow() {
        let mut h = Histogram::new("h", "", 4, 0., 2.);
        h.fill(-1., 1.);
        h.fill(0., 2.);
        h.fill(0.6, 1.);
        h.fill(1.99, -0.5);
        h.fill(2., 1.);
        h.fill(f64::NAN, 1.);
        assert_eq!(h.contents(), &[2., 2., 1., 0., -0.5, 1.]);
        assert_abs_diff_eq!(h.integral(), 2.5);
        assert_abs_diff_eq!(h.bin_error(1), 2.);
        assert_abs_diff_eq!(h.bin_low_edge(3), 1.);
    }

    #[test]
    fn clip_add_scale() {
        let mut h = Histogram::new("h", "", 2, 0., 2.);
        h.fill(0.5, 3.);
        h.fill(1.5, -1.);
        h.clip_negative();
        assert_eq!(h.bin_content(2), 0.);
        assert_eq!(h.bin_error(2), 0.);

        let mut sum = h.empty_like("sum");
        sum.add(&h).unwrap();
        sum.add_scaled(&h, -0.5).unwrap();
        sum.scale(2.);
        assert_abs_diff_eq!(sum.bin_content(1), 3.);

        let other = Histogram::new("o", "", 3, 0., 2.);
        assert!(sum.add(&other).is_err());
    }

    #[test]
    fn variable_file() {
        let text = "# name\ttitle\tnbins\txlow\txhigh\n\
                    _leptonPt\tlepton p_{T} (GeV)\t10\t0\t200\n\
                    \n\
                    _nJets\tnumber of jets\t6\t-0.5\t5.5\n";
        let vars = parse_variables(text, Path::new("vars.txt")).unwrap();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[0].title, "lepton p_{T} (GeV)");
        assert_eq!(vars[1].nbins, 6);
        assert_eq!(vars[1].xlow, -0.5);

        let text = "  # comment\n_leptonEta\tlepton #eta\t10\t-2.5\t2.5\n";
        let vars = parse_variables(text, Path::new("vars.txt")).unwrap();
        assert_eq!(vars.len(), 1);
        assert_eq!(vars[0].title, "lepton #eta");

        let err = parse_variables("a\tb\t10\t0\n", Path::new("v")).unwrap_err();
        assert!(matches!(
            err,
            TextFileError::ColumnCount {
                line: 1,
                expected: 5,
                found: 4,
                ..
            }
        ));
        let err = parse_variables("a\tb\tten\t0\t1\n", Path::new("v")).unwrap_err();
        assert!(matches!(err, TextFileError::Value { line: 1, .. }));
        let err = parse_variables("a\tb\t1\t1\t0\n", Path::new("v")).unwrap_err();
        assert!(matches!(err, TextFileError::Invalid { line: 1, .. }));
    }
}
