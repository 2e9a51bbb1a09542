use std::path::{Path, PathBuf};

use nom::{
    bytes::complete::{take_while, take_while1},
    character::complete::{char, space0, space1, u32},
    combinator::all_consuming,
    multi::{separated_list0, separated_list1},
    number::complete::double,
    sequence::delimited,
    IResult,
};
use thiserror::Error;

/// Error in a line-oriented text file
#[derive(Debug, Error)]
pub enum TextFileError {
    #[error("Failed to read {file:?}: {source}")]
    Io {
        file: PathBuf,
        source: std::io::Error,
    },
    #[error("{file:?}, line {line}: expected {expected} columns, found {found}")]
    ColumnCount {
        file: PathBuf,
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("{file:?}, line {line}: failed to parse `{content}` as {what}")]
    Value {
        file: PathBuf,
        line: usize,
        content: String,
        what: &'static str,
    },
    #[error("{file:?}, line {line}: {reason}")]
    Invalid {
        file: PathBuf,
        line: usize,
        reason: String,
    },
}

pub(crate) fn read_to_string(file: &Path) -> Result<String, TextFileError> {
    std::fs::read_to_string(file).map_err(|source| TextFileError::Io {
        file: file.to_owned(),
        source,
    })
}

/// Non-empty lines with comments stripped, numbered from 1
pub(crate) fn content_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(n, line)| {
            let line = line.find('#').map(|pos| &line[..pos]).unwrap_or(line);
            (n + 1, line)
        })
        .filter(|(_, line)| !line.trim().is_empty())
}

/// Non-empty lines that do not start with `#`, numbered from 1
///
/// A `#` later in the line is content, e.g. in ROOT-style titles.
pub(crate) fn declaration_lines(
    text: &str,
) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(n, line)| (n + 1, line))
        .filter(|(_, line)| {
            let line = line.trim_start();
            !line.is_empty() && !line.starts_with('#')
        })
}

pub(crate) fn non_space(line: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_ascii_whitespace())(line)
}

/// Columns separated by any amount of blanks
pub(crate) fn blank_separated(line: &str) -> IResult<&str, Vec<&str>> {
    all_consuming(delimited(
        space0,
        separated_list0(space1, non_space),
        space0,
    ))(line)
}

/// Columns separated by single tabs, possibly containing spaces
pub(crate) fn tab_separated(line: &str) -> IResult<&str, Vec<&str>> {
    all_consuming(separated_list1(char('\t'), take_while(|c| c != '\t')))(
        line,
    )
}

pub(crate) fn double_value(s: &str) -> IResult<&str, f64> {
    all_consuming(delimited(space0, double, space0))(s)
}

pub(crate) fn u32_value(s: &str) -> IResult<&str, u32> {
    all_consuming(delimited(space0, u32, space0))(s)
}

/// Position in a text file, for error reporting
#[derive(Copy, Clone, Debug)]
pub(crate) struct Location<'a> {
    pub(crate) file: &'a Path,
    pub(crate) line: usize,
}

impl<'a> Location<'a> {
    pub(crate) fn new(file: &'a Path, line: usize) -> Self {
        Self { file, line }
    }

    pub(crate) fn columns<'b>(
        &self,
        parser: impl Fn(&'b str) -> IResult<&'b str, Vec<&'b str>>,
        content: &'b str,
        expected: usize,
    ) -> Result<Vec<&'b str>, TextFileError> {
        let found = parser(content).map(|(_, c)| c).unwrap_or_default();
        if found.len() == expected {
            Ok(found)
        } else {
            Err(TextFileError::ColumnCount {
                file: self.file.to_owned(),
                line: self.line,
                expected,
                found: found.len(),
            })
        }
    }

    pub(crate) fn value<T>(
        &self,
        parser: impl Fn(&str) -> IResult<&str, T>,
        content: &str,
        what: &'static str,
    ) -> Result<T, TextFileError> {
        parser(content)
            .map(|(_, v)| v)
            .map_err(|_| TextFileError::Value {
                file: self.file.to_owned(),
                line: self.line,
                content: content.to_owned(),
                what,
            })
    }

    pub(crate) fn invalid(&self, reason: impl Into<String>) -> TextFileError {
        TextFileError::Invalid {
            file: self.file.to_owned(),
            line: self.line,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns() {
        assert_eq!(
            blank_separated("  ttZ \tsignalregion  3 12.5 ").unwrap().1,
            vec!["ttZ", "signalregion", "3", "12.5"]
        );
        assert_eq!(
            tab_separated("_leptonPt\tlepton p_T (GeV)\t10").unwrap().1,
            vec!["_leptonPt", "lepton p_T (GeV)", "10"]
        );
        assert!(double_value(" 1.5e2 ").is_ok());
        assert!(double_value("1.5x").is_err());
        assert_eq!(u32_value("12").unwrap().1, 12);
    }

    #[test]
    fn comments_and_blank_lines() {
        let text = "# header\n\na b # trailing\n  \nc\n";
        let lines: Vec<_> = content_lines(text).collect();
        assert_eq!(lines, vec![(3, "a b "), (5, "c")]);
    }

    #[test]
    fn leading_comments_only() {
        let text = "  # header\n_eta\t#eta\n\n";
        let lines: Vec<_> = declaration_lines(text).collect();
        assert_eq!(lines, vec![(2, "_eta\t#eta")]);
    }
}
