use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use env_logger::Env;
use ewkino::compression::Compression;
use ewkino::config::AnalysisConfig;
use ewkino::event_file::EventFile;
use ewkino::fake_rate::FakeRateMaps;
use ewkino::reweight::ScaleFactorReweighter;
use ewkino::{GIT_BRANCH, GIT_REV, VERSION};
use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use thiserror::Error;

const GZIP_DEFAULT_LEVEL: u8 = 6;
const LZ4_DEFAULT_LEVEL: u8 = 0;
const ZSTD_DEFAULT_LEVEL: u8 = 0;

/// Exit code for unreadable input and wrong arguments
pub(crate) const EXIT_BAD_INPUT: i32 = -1;

lazy_static! {
    static ref COMPRESSION_RE: Regex =
        Regex::new(r"^(?P<algo>[[:alnum:]]+)(?P<lvl>_\d+)?$").unwrap();
}

#[derive(Debug, Clone, Error)]
pub(crate) enum ParseCompressionErr {
    #[error("Unknown compression algorithm: {0}")]
    UnknownAlgorithm(String),
    #[error("Level {1} not supported for {0} compression")]
    UnsupportedLevel(String, String),
}

fn parse_level(
    algo: &str,
    lvl: Option<regex::Match<'_>>,
    default: u8,
    max: u8,
) -> Result<u8, ParseCompressionErr> {
    let Some(lvl) = lvl else {
        return Ok(default);
    };
    match lvl.as_str()[1..].parse::<u8>() {
        Ok(l) if l <= max => Ok(l),
        _ => Err(ParseCompressionErr::UnsupportedLevel(
            algo.to_owned(),
            lvl.as_str().to_owned(),
        )),
    }
}

pub(crate) fn parse_compr(s: &str) -> Result<Compression, ParseCompressionErr> {
    use ParseCompressionErr::*;

    let lower_case = s.to_ascii_lowercase();
    let Some(captures) = COMPRESSION_RE.captures(&lower_case) else {
        return Err(UnknownAlgorithm(s.to_owned()));
    };
    let algo = &captures["algo"];
    let lvl = captures.name("lvl");
    match algo {
        "bzip2" | "bz2" => match lvl {
            Some(lvl) => Err(UnsupportedLevel(algo.into(), lvl.as_str().to_owned())),
            None => Ok(Compression::Bzip2),
        },
        "gzip" | "gz" => {
            parse_level(algo, lvl, GZIP_DEFAULT_LEVEL, 9).map(Compression::Gzip)
        }
        "lz4" => parse_level(algo, lvl, LZ4_DEFAULT_LEVEL, 16).map(Compression::Lz4),
        "zstd" | "zstandard" => {
            parse_level(algo, lvl, ZSTD_DEFAULT_LEVEL, 19).map(Compression::Zstd)
        }
        _ => Err(UnknownAlgorithm(s.to_owned())),
    }
}

/// Options shared by all executables
#[derive(Debug, Parser)]
pub(crate) struct CommonOpt {
    /// Analysis configuration overriding the default settings
    #[clap(long)]
    pub(crate) config: Option<PathBuf>,

    #[clap(long, value_parser = parse_compr,
                help = "Compress output file.
Possible settings are 'bzip2', 'gzip', 'zstd', 'lz4'.
Compression levels can be set with algorithm_level e.g. 'zstd_5'.
Maximum levels are 'gzip_9', 'zstd_19', 'lz4_16'.")]
    pub(crate) compression: Option<Compression>,

    /// Verbosity level
    #[clap(
        short,
        long,
        default_value = "Info",
        help = "Verbosity level.
Possible values with increasing amount of output are
'off', 'error', 'warn', 'info', 'debug', 'trace'.\n"
    )]
    pub(crate) loglevel: String,
}

/// Options for event weights
#[derive(Debug, Parser)]
pub(crate) struct WeightOpt {
    /// Scale factor maps for simulation-to-data corrections
    #[clap(long)]
    pub(crate) reweighting: Option<PathBuf>,

    /// Fake-rate maps, needed for the 'fakerate' selection type
    #[clap(long)]
    pub(crate) fake_rates: Option<PathBuf>,
}

impl WeightOpt {
    pub(crate) fn reweighter(&self) -> Result<Option<ScaleFactorReweighter>> {
        self.reweighting
            .as_ref()
            .map(|file| {
                ScaleFactorReweighter::from_file(file).with_context(|| {
                    format!("Failed to read scale factors from {file:?}")
                })
            })
            .transpose()
    }

    pub(crate) fn fake_rates(&self) -> Result<Option<FakeRateMaps>> {
        self.fake_rates
            .as_ref()
            .map(|file| {
                FakeRateMaps::from_file(file).with_context(|| {
                    format!("Failed to read fake rates from {file:?}")
                })
            })
            .transpose()
    }
}

/// Parse the command line, expanding argument files
///
/// Wrong arguments terminate the process with exit code -1.
pub(crate) fn parse_args<T: Parser>() -> T {
    let args: Vec<OsString> = match argfile::expand_args_from(
        std::env::args_os(),
        argfile::parse_fromfile,
        argfile::PREFIX,
    ) {
        Ok(args) => args,
        Err(err) => {
            eprintln!("Failed to read argument file: {err}");
            std::process::exit(EXIT_BAD_INPUT)
        }
    };
    match T::try_parse_from(args) {
        Ok(opt) => opt,
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => err.exit(),
            _ => {
                let _ = err.print();
                std::process::exit(EXIT_BAD_INPUT)
            }
        },
    }
}

pub(crate) fn init_logging(loglevel: &str) {
    let env = Env::default().filter_or("EWKINO_LOG", loglevel);
    env_logger::init_from_env(env);

    if let (Some(rev), Some(branch)) = (GIT_REV, GIT_BRANCH) {
        info!("ewkino {VERSION} rev {rev} ({branch})");
    } else {
        info!("ewkino {VERSION}");
    }
}

pub(crate) fn starting() {
    eprintln!("###starting###");
}

pub(crate) fn done() {
    eprintln!("###done###");
}

pub(crate) fn load_config(file: Option<&Path>) -> Result<AnalysisConfig> {
    let config = match file {
        Some(file) => AnalysisConfig::from_file(file)
            .with_context(|| format!("Failed to load configuration {file:?}"))?,
        None => AnalysisConfig::default(),
    };
    debug!("Configuration: {config:#?}");
    Ok(config)
}

/// Read an event file
///
/// If the file cannot be read, a warning is printed and the process
/// terminates with exit code -1.
pub(crate) fn open_events(file: &Path) -> EventFile {
    match EventFile::open(file) {
        Ok(events) => events,
        Err(err) => {
            warn!("{err}");
            eprintln!("Cannot read input file {file:?}: {err}");
            std::process::exit(EXIT_BAD_INPUT)
        }
    }
}

/// Number of events to process, where 0 means all
pub(crate) fn events_to_process(requested: usize, available: usize) -> usize {
    if requested == 0 || requested > available {
        available
    } else {
        requested
    }
}
