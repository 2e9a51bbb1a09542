use itertools::Itertools;
use log::trace;
use noisy_float::prelude::*;

use crate::four_vector::FourVector;
use crate::masses::{TOP_MASS, Z_MASS};
use crate::neutrino::NeutrinoSolution;
use crate::objects::Lepton;

/// A pair of lepton indices forming a Z boson candidate
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ZPair {
    pub first: usize,
    pub second: usize,
    pub mass: f64,
}

impl ZPair {
    pub fn contains(&self, idx: usize) -> bool {
        self.first == idx || self.second == idx
    }
}

/// Lepton pair with invariant mass closest to the Z mass
///
/// All unordered pairs are considered in index order. For equal
/// distances the first pair wins. Returns `None` for fewer than two
/// leptons.
pub fn best_z_pair(leptons: &[FourVector]) -> Option<ZPair> {
    best_pair_where(leptons, |_, _| true)
}

/// Like [best_z_pair], restricted to opposite-sign same-flavour pairs
pub fn best_ossf_z_pair(leptons: &[Lepton]) -> Option<ZPair> {
    let p: Vec<_> = leptons.iter().map(|l| *l.p4()).collect();
    best_pair_where(&p, |i, j| leptons[i].is_ossf_with(&leptons[j]))
}

fn best_pair_where(
    leptons: &[FourVector],
    accept: impl Fn(usize, usize) -> bool,
) -> Option<ZPair> {
    let best = (0..leptons.len())
        .tuple_combinations()
        .filter(|&(i, j)| accept(i, j))
        .map(|(first, second)| ZPair {
            first,
            second,
            mass: (leptons[first] + leptons[second]).m(),
        })
        .min_by_key(|pair| n64((pair.mass - Z_MASS).abs()));
    trace!("Best Z candidate: {best:?}");
    best
}

/// Result of the top quark reconstruction
///
/// `tagged` is the index of the jet assigned to the top decay,
/// `recoil` the leading other jet and `root` the index of the chosen
/// neutrino solution. `None` means no suitable object was found.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct TopTag {
    pub tagged: Option<usize>,
    pub recoil: Option<usize>,
    pub root: usize,
    pub top: FourVector,
}

/// Assign jets to the top quark decay and the recoil
///
/// `jets` have to be sorted by decreasing transverse momentum and
/// `bjets` holds indices into `jets`. The b-jet and neutrino
/// combination with mass closest to the top mass is chosen. Without
/// b-jets the leading jet is used instead.
pub fn tag_top(
    lepton: &FourVector,
    neutrinos: &[FourVector; 2],
    jets: &[FourVector],
    bjets: &[usize],
) -> TopTag {
    let top_of = |jet: usize, root: usize| *lepton + neutrinos[root] + jets[jet];
    let candidates = match (bjets.is_empty(), jets.is_empty()) {
        (false, _) => bjets.to_vec(),
        (true, false) => vec![0],
        (true, true) => Vec::new(),
    };
    let best = candidates
        .iter()
        .cartesian_product(0..neutrinos.len())
        .map(|(&jet, root)| (jet, root, top_of(jet, root)))
        .min_by_key(|(_, _, top)| n64((top.m() - TOP_MASS).abs()));
    let Some((tagged, root, top)) = best else {
        return TopTag::default();
    };
    let recoil = (0..jets.len()).find(|&idx| idx != tagged);
    TopTag {
        tagged: Some(tagged),
        recoil,
        root,
        top,
    }
}

/// A resonance candidate built from a lepton, a neutrino and a third object
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Candidate {
    pub p4: FourVector,
    pub neutrino: FourVector,
    /// Which neutrino solution was used (0 or 1)
    pub root: usize,
}

impl Candidate {
    pub fn mass(&self) -> f64 {
        self.p4.m()
    }
}

/// Combine lepton, neutrino and a third object into a resonance candidate
///
/// One candidate is formed for each neutrino solution and the one with
/// mass closest to `nominal_mass` is returned, preferring the first
/// solution on ties. Missing objects count as zero vectors; callers
/// are expected to check validity flags before using the result.
pub fn build_candidate(
    lepton: Option<&FourVector>,
    solution: &NeutrinoSolution,
    met: &FourVector,
    third: Option<&FourVector>,
    nominal_mass: f64,
) -> Candidate {
    let lepton = lepton.copied().unwrap_or_default();
    let third = third.copied().unwrap_or_default();
    solution
        .neutrinos(met)
        .into_iter()
        .enumerate()
        .map(|(root, neutrino)| Candidate {
            p4: lepton + neutrino + third,
            neutrino,
            root,
        })
        .min_by_key(|c| n64((c.mass() - nominal_mass).abs()))
        .unwrap_or_default()
}
