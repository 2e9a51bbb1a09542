use log::trace;

use crate::config::AnalysisConfig;
use crate::event::Event;
use crate::four_vector::FourVector;
use crate::variation::Variation;

/// Select and clean the physics objects of `event`
///
/// - remove taus and leptons failing the loose identification
/// - remove electrons close to loose muons
/// - sort leptons by decreasing cone pt
/// - keep tight-ID jets above threshold for the given variation
/// - remove jets close to fakeable leptons
/// - sort jets by decreasing varied pt
/// - keep D meson candidates inside the mass window, sorted by pt
///
/// Only the collections are modified, never individual objects.
pub fn prepare_event(
    event: &mut Event,
    variation: Variation,
    config: &AnalysisConfig,
) {
    event.leptons.retain(|l| !l.is_tau() && l.is_loose());

    let muons: Vec<FourVector> = event
        .leptons
        .iter()
        .filter(|l| l.is_muon())
        .map(|l| *l.p4())
        .collect();
    let min_dr = config.leptons.electron_muon_min_dr;
    event.leptons.retain(|l| {
        !l.is_electron() || muons.iter().all(|mu| mu.delta_r(l.p4()) >= min_dr)
    });
    event
        .leptons
        .sort_by(|a, b| b.cone_pt().total_cmp(&a.cone_pt()));

    let jet_cuts = &config.jets;
    event.jets.retain(|j| {
        j.is_tight
            && j.pt_for(variation) > jet_cuts.min_pt
            && j.eta().abs() < jet_cuts.max_abs_eta
    });
    let fo_leptons: Vec<FourVector> = event
        .leptons
        .iter()
        .filter(|l| l.is_fo())
        .map(|l| *l.p4())
        .collect();
    event.jets.retain(|j| {
        fo_leptons
            .iter()
            .all(|l| l.delta_r(j.p4()) >= jet_cuts.lepton_min_dr)
    });
    event
        .jets
        .sort_by(|a, b| b.pt_for(variation).total_cmp(&a.pt_for(variation)));

    let d_cuts = &config.d_mesons;
    event.d_mesons.retain(|d| {
        (d.mass() - d_cuts.nominal_mass).abs() < d_cuts.mass_window
            && d.pt() > d_cuts.min_pt
            && d.isolation < d_cuts.max_isolation
            && d.delta_r_daughters < d_cuts.max_dr_daughters
    });
    event.d_mesons.sort_by(|a, b| b.pt().total_cmp(&a.pt()));

    trace!(
        "After cleaning: {} leptons, {} jets, {} D mesons",
        event.leptons.len(),
        event.jets.len(),
        event.d_mesons.len()
    );
}
