use log::trace;

use crate::four_vector::FourVector;

/// Longitudinal neutrino momenta compatible with a W mass constraint
///
/// If the constraint has no real solution, `valid` is false and both
/// entries of `pz` are zero. Callers have to check `valid` before
/// trusting the pair.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct NeutrinoSolution {
    pub valid: bool,
    pub pz: (f64, f64),
}

impl NeutrinoSolution {
    /// The two massless neutrino four-vectors with the transverse
    /// components of `met`
    pub fn neutrinos(&self, met: &FourVector) -> [FourVector; 2] {
        let (pz1, pz2) = self.pz;
        [neutrino(met, pz1), neutrino(met, pz2)]
    }
}

fn neutrino(met: &FourVector, pz: f64) -> FourVector {
    let (px, py) = (met.px(), met.py());
    let e = (px * px + py * py + pz * pz).sqrt();
    [e, px, py, pz].into()
}

/// Solve (L + ν)² = m_W² for the longitudinal neutrino momentum
///
/// The transverse neutrino momentum is taken from `met`. Squaring the
/// constraint gives a·pz² + b·pz + c = 0 with
///
///   μ = (m_W² - m_ℓ²)/2 + pT(ℓ)·pT(ν)
///   a = E_ℓ² - pz_ℓ²
///   b = -2 μ pz_ℓ
///   c = E_ℓ² pT(ν)² - μ²
///
/// Whenever the discriminant is non-negative μ ≥ 0 and both roots
/// also solve the unsquared constraint.
pub fn solve_neutrino_pz(
    lepton: &FourVector,
    met: &FourVector,
    w_mass: f64,
) -> NeutrinoSolution {
    let m_l_sq = lepton.m_sq().max(0.);
    let pt_nu_sq = met.px() * met.px() + met.py() * met.py();
    let mu = 0.5 * (w_mass * w_mass - m_l_sq)
        + lepton.px() * met.px()
        + lepton.py() * met.py();
    let e_l = lepton.e();
    let pz_l = lepton.pz();
    let a = e_l * e_l - pz_l * pz_l;
    let b = -2. * mu * pz_l;
    let c = e_l * e_l * pt_nu_sq - mu * mu;
    if a <= 0. {
        trace!("Degenerate lepton momentum, no neutrino solution");
        return NeutrinoSolution::default();
    }
    let discriminant = b * b - 4. * a * c;
    if discriminant < 0. {
        trace!("Negative discriminant {discriminant}, no neutrino solution");
        return NeutrinoSolution::default();
    }
    let sqrt_d = discriminant.sqrt();
    NeutrinoSolution {
        valid: true,
        pz: ((-b + sqrt_d) / (2. * a), (-b - sqrt_d) / (2. * a)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::masses::W_MASS;
    use approx::assert_relative_eq;

    #[test]
    fn roots_satisfy_constraint() {
        let cases = [
            ((50., 0.5, 0.1, 0.), (40., 1.5)),
            ((35., -1.7, -2.9, 0.105), (22., 0.3)),
            ((120., 2.1, 1.0, 0.000511), (15., -1.2)),
            ((28., 0.0, 0.0, 0.), (30., 3.1)),
        ];
        for ((pt, eta, phi, m), (met_pt, met_phi)) in cases {
            let lepton = FourVector::from_pt_eta_phi_m(pt, eta, phi, m);
            let met = FourVector::from_pt_phi(met_pt, met_phi);
            let sol = solve_neutrino_pz(&lepton, &met, W_MASS);
            assert!(sol.valid);
            for nu in sol.neutrinos(&met) {
                assert_relative_eq!(
                    (lepton + nu).m(),
                    W_MASS,
                    max_relative = 1e-6
                );
            }
        }
    }

    #[test]
    fn no_real_solution() {
        // transverse mass far above m_W
        let lepton = FourVector::from_pt_eta_phi_m(200., 0.3, 0., 0.);
        let met = FourVector::from_pt_phi(200., std::f64::consts::PI);
        assert!(lepton.mt(&met) > W_MASS);
        let sol = solve_neutrino_pz(&lepton, &met, W_MASS);
        assert!(!sol.valid);
        assert_eq!(sol.pz, (0., 0.));
    }

    #[test]
    fn degenerate_roots_for_central_lepton() {
        // pz_ℓ = 0 makes b vanish, roots are symmetric
        let lepton = FourVector::from_pt_eta_phi_m(40., 0., 0., 0.);
        let met = FourVector::from_pt_phi(30., 1.);
        let sol = solve_neutrino_pz(&lepton, &met, W_MASS);
        assert!(sol.valid);
        assert_relative_eq!(sol.pz.0, -sol.pz.1, max_relative = 1e-12);
    }
}
