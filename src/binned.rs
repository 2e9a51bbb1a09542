use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::variation::Direction;

#[derive(Debug, Error)]
pub enum BinnedMapError {
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
    #[error("Bin edges have to be strictly increasing and at least two")]
    Edges,
    #[error("Expected {expected} values, found {found}")]
    Shape { expected: usize, found: usize },
    #[error("{0}")]
    Invalid(String),
}

/// Read a YAML file into a map type
pub fn from_yaml_file<T: for<'de> Deserialize<'de>>(
    file: impl AsRef<Path>,
) -> Result<T, BinnedMapError> {
    let file = file.as_ref();
    let reader = std::fs::File::open(file).map_err(|source| BinnedMapError::Io {
        file: file.to_owned(),
        source,
    })?;
    serde_yaml::from_reader(reader).map_err(|source| BinnedMapError::Parse {
        file: file.to_owned(),
        source,
    })
}

fn check_edges(edges: &[f64]) -> Result<(), BinnedMapError> {
    if edges.len() < 2 || edges.windows(2).any(|e| !(e[0] < e[1])) {
        Err(BinnedMapError::Edges)
    } else {
        Ok(())
    }
}

fn check_len(expected: usize, found: usize) -> Result<(), BinnedMapError> {
    if expected == found {
        Ok(())
    } else {
        Err(BinnedMapError::Shape { expected, found })
    }
}

/// Bin index for `x`, clamped to the first and last bin
fn clamped_bin(edges: &[f64], x: f64) -> usize {
    let nbins = edges.len() - 1;
    edges
        .partition_point(|e| *e <= x)
        .saturating_sub(1)
        .min(nbins - 1)
}

#[derive(Deserialize)]
struct BinnedMap1DData {
    edges: Vec<f64>,
    values: Vec<f64>,
    #[serde(default)]
    errors: Vec<f64>,
}

/// Values with uncertainties in bins of one variable
///
/// Lookups outside the binning use the first or last bin.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(try_from = "BinnedMap1DData")]
pub struct BinnedMap1D {
    edges: Vec<f64>,
    values: Vec<f64>,
    errors: Vec<f64>,
}

impl TryFrom<BinnedMap1DData> for BinnedMap1D {
    type Error = BinnedMapError;

    fn try_from(data: BinnedMap1DData) -> Result<Self, Self::Error> {
        let BinnedMap1DData {
            edges,
            values,
            mut errors,
        } = data;
        check_edges(&edges)?;
        check_len(edges.len() - 1, values.len())?;
        if errors.is_empty() {
            errors = vec![0.; values.len()];
        }
        check_len(values.len(), errors.len())?;
        Ok(Self {
            edges,
            values,
            errors,
        })
    }
}

impl BinnedMap1D {
    pub fn new(
        edges: Vec<f64>,
        values: Vec<f64>,
        errors: Vec<f64>,
    ) -> Result<Self, BinnedMapError> {
        BinnedMap1DData {
            edges,
            values,
            errors,
        }
        .try_into()
    }

    pub fn value(&self, x: f64) -> f64 {
        self.values[clamped_bin(&self.edges, x)]
    }

    pub fn error(&self, x: f64) -> f64 {
        self.errors[clamped_bin(&self.edges, x)]
    }

    /// Value shifted by one standard deviation
    pub fn shifted(&self, x: f64, direction: Direction) -> f64 {
        let bin = clamped_bin(&self.edges, x);
        match direction {
            Direction::Up => self.values[bin] + self.errors[bin],
            Direction::Down => self.values[bin] - self.errors[bin],
        }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

#[derive(Deserialize)]
struct BinnedMap2DData {
    x_edges: Vec<f64>,
    y_edges: Vec<f64>,
    values: Vec<Vec<f64>>,
    #[serde(default)]
    errors: Vec<Vec<f64>>,
}

/// Values with uncertainties in bins of two variables
///
/// `values[i][j]` belongs to the `i`-th bin in x and the `j`-th bin in
/// y. Lookups outside the binning use the closest bin.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(try_from = "BinnedMap2DData")]
pub struct BinnedMap2D {
    x_edges: Vec<f64>,
    y_edges: Vec<f64>,
    values: Vec<Vec<f64>>,
    errors: Vec<Vec<f64>>,
}

impl TryFrom<BinnedMap2DData> for BinnedMap2D {
    type Error = BinnedMapError;

    fn try_from(data: BinnedMap2DData) -> Result<Self, Self::Error> {
        let BinnedMap2DData {
            x_edges,
            y_edges,
            values,
            mut errors,
        } = data;
        check_edges(&x_edges)?;
        check_edges(&y_edges)?;
        let ny = y_edges.len() - 1;
        check_len(x_edges.len() - 1, values.len())?;
        for row in &values {
            check_len(ny, row.len())?;
        }
        if errors.is_empty() {
            errors = vec![vec![0.; ny]; values.len()];
        }
        check_len(values.len(), errors.len())?;
        for row in &errors {
            check_len(ny, row.len())?;
        }
        Ok(Self {
            x_edges,
            y_edges,
            values,
            errors,
        })
    }
}

impl BinnedMap2D {
    pub fn new(
        x_edges: Vec<f64>,
        y_edges: Vec<f64>,
        values: Vec<Vec<f64>>,
        errors: Vec<Vec<f64>>,
    ) -> Result<Self, BinnedMapError> {
        BinnedMap2DData {
            x_edges,
            y_edges,
            values,
            errors,
        }
        .try_into()
    }

    fn bin(&self, x: f64, y: f64) -> (usize, usize) {
        (clamped_bin(&self.x_edges, x), clamped_bin(&self.y_edges, y))
    }

    pub fn value(&self, x: f64, y: f64) -> f64 {
        let (i, j) = self.bin(x, y);
        self.values[i][j]
    }

    pub fn error(&self, x: f64, y: f64) -> f64 {
        let (i, j) = self.bin(x, y);
        self.errors[i][j]
    }

    pub fn shifted(&self, x: f64, y: f64, direction: Direction) -> f64 {
        let (i, j) = self.bin(x, y);
        match direction {
            Direction::Up => self.values[i][j] + self.errors[i][j],
            Direction::Down => self.values[i][j] - self.errors[i][j],
        }
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().flatten().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn clamped_lookup() {
        let map =
            BinnedMap1D::new(vec![0., 10., 20.], vec![1., 2.], vec![0.1, 0.2])
                .unwrap();
        assert_eq!(map.value(-5.), 1.);
        assert_eq!(map.value(0.), 1.);
        assert_eq!(map.value(10.), 2.);
        assert_eq!(map.value(1e6), 2.);
        assert_eq!(map.value(f64::NAN), 1.);
        assert_abs_diff_eq!(map.shifted(15., Direction::Down), 1.8);
    }

    #[test]
    fn shape_checks() {
        assert!(matches!(
            BinnedMap1D::new(vec![0., 10.], vec![1., 2.], vec![]),
            Err(BinnedMapError::Shape { .. })
        ));
        assert!(matches!(
            BinnedMap1D::new(vec![10., 0.], vec![1.], vec![]),
            Err(BinnedMapError::Edges)
        ));
        let yaml = "x_edges: [0, 1, 2]\ny_edges: [0, 2.5]\nvalues: [[1], [2, 3]]\n";
        assert!(serde_yaml::from_str::<BinnedMap2D>(yaml).is_err());
    }

    #[test]
    fn map_2d_from_yaml() {
        let yaml = "x_edges: [10, 20, 50]\ny_edges: [0, 1.2, 2.5]\n\
                    values: [[0.1, 0.2], [0.3, 0.4]]\n";
        let map: BinnedMap2D = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(map.value(15., 2.), 0.2);
        assert_eq!(map.value(100., 0.5), 0.3);
        assert_eq!(map.error(100., 0.5), 0.);
    }
}
