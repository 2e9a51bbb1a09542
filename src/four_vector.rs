use std::f64::consts::PI;
use std::iter::Sum;

use serde::{Deserialize, Serialize};

/// A basic four-vector
///
/// The zero component is the energy. The remainder are the spatial
/// components (px, py, pz), all in GeV.
#[derive(Deserialize, Serialize, PartialEq, Debug, Clone, Copy, Default)]
pub struct FourVector {
    p: [f64; 4],
}

impl FourVector {
    /// Construct a new (zero) four-vector
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct from transverse momentum, pseudorapidity, azimuth and energy
    pub fn from_pt_eta_phi_e(pt: f64, eta: f64, phi: f64, e: f64) -> Self {
        [e, pt * phi.cos(), pt * phi.sin(), pt * eta.sinh()].into()
    }

    /// Construct from transverse momentum, pseudorapidity, azimuth and mass
    pub fn from_pt_eta_phi_m(pt: f64, eta: f64, phi: f64, m: f64) -> Self {
        let pz = pt * eta.sinh();
        let e = (pt * pt + pz * pz + m * m).sqrt();
        [e, pt * phi.cos(), pt * phi.sin(), pz].into()
    }

    /// A purely transverse, massless vector (e.g. missing transverse momentum)
    pub fn from_pt_phi(pt: f64, phi: f64) -> Self {
        [pt, pt * phi.cos(), pt * phi.sin(), 0.].into()
    }

    pub fn e(&self) -> f64 {
        self.p[0]
    }

    pub fn px(&self) -> f64 {
        self.p[1]
    }

    pub fn py(&self) -> f64 {
        self.p[2]
    }

    pub fn pz(&self) -> f64 {
        self.p[3]
    }

    /// The spatial norm \sqrt{\sum v_i^2} with i = 1,2,3
    pub fn spatial_norm(&self) -> f64 {
        self.spatial_norm_sq().sqrt()
    }

    /// The square \sum v_i^2 with i = 1,2,3 of the spatial norm
    pub fn spatial_norm_sq(&self) -> f64 {
        self.p.iter().skip(1).map(|e| e * e).sum()
    }

    /// The scalar transverse momentum
    pub fn pt(&self) -> f64 {
        self.p[1].hypot(self.p[2])
    }

    /// The azimuthal angle in (-π, π]
    pub fn phi(&self) -> f64 {
        if self.p[1] == 0. && self.p[2] == 0. {
            0.
        } else {
            self.p[2].atan2(self.p[1])
        }
    }

    /// The pseudorapidity
    ///
    /// Vectors along the beam axis get ±10^10, zero vectors 0.
    pub fn eta(&self) -> f64 {
        let pt = self.pt();
        if pt > 0. {
            (self.p[3] / pt).asinh()
        } else if self.p[3] > 0. {
            1e10
        } else if self.p[3] < 0. {
            -1e10
        } else {
            0.
        }
    }

    /// The invariant mass square v_0^2 - \sum v_i^2 with i = 1,2,3
    pub fn m_sq(&self) -> f64 {
        self.p[0] * self.p[0] - self.spatial_norm_sq()
    }

    /// The invariant mass
    ///
    /// Space-like vectors get a negative mass -\sqrt{-m^2}
    pub fn m(&self) -> f64 {
        let m_sq = self.m_sq();
        if m_sq < 0. {
            -(-m_sq).sqrt()
        } else {
            m_sq.sqrt()
        }
    }

    /// Azimuthal distance to `other`, in [0, π]
    pub fn delta_phi(&self, other: &FourVector) -> f64 {
        let mut dphi = (self.phi() - other.phi()).abs();
        if dphi > PI {
            dphi = 2. * PI - dphi;
        }
        dphi
    }

    /// Distance to `other` in the (η, φ) plane
    pub fn delta_r(&self, other: &FourVector) -> f64 {
        let deta = self.eta() - other.eta();
        deta.hypot(self.delta_phi(other))
    }

    /// Transverse mass of the system formed with `other`,
    /// treating both as massless
    pub fn mt(&self, other: &FourVector) -> f64 {
        let mt_sq =
            2. * self.pt() * other.pt() * (1. - self.delta_phi(other).cos());
        mt_sq.max(0.).sqrt()
    }

    const fn len() -> usize {
        4
    }
}

impl std::convert::From<[f64; 4]> for FourVector {
    fn from(p: [f64; 4]) -> FourVector {
        FourVector { p }
    }
}

impl std::ops::Index<usize> for FourVector {
    type Output = f64;

    fn index(&self, i: usize) -> &Self::Output {
        &self.p[i]
    }
}

impl std::ops::AddAssign for FourVector {
    fn add_assign(&mut self, rhs: FourVector) {
        for i in 0..Self::len() {
            self.p[i] += rhs[i]
        }
    }
}

impl std::ops::SubAssign for FourVector {
    fn sub_assign(&mut self, rhs: FourVector) {
        for i in 0..Self::len() {
            self.p[i] -= rhs[i]
        }
    }
}

impl std::ops::Add for FourVector {
    type Output = Self;

    fn add(mut self, rhs: FourVector) -> Self::Output {
        self += rhs;
        self
    }
}

impl std::ops::Sub for FourVector {
    type Output = Self;

    fn sub(mut self, rhs: FourVector) -> Self::Output {
        self -= rhs;
        self
    }
}

impl std::ops::Neg for FourVector {
    type Output = Self;

    fn neg(self) -> Self::Output {
        let [e, px, py, pz] = self.p;
        [-e, -px, -py, -pz].into()
    }
}

impl std::ops::Mul<f64> for FourVector {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self::Output {
        let [e, px, py, pz] = self.p;
        [e * rhs, px * rhs, py * rhs, pz * rhs].into()
    }
}

impl Sum for FourVector {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(FourVector::new(), |acc, p| acc + p)
    }
}

impl<'a> Sum<&'a FourVector> for FourVector {
    fn sum<I: Iterator<Item = &'a FourVector>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn pt_eta_phi_round_trip() {
        let p = FourVector::from_pt_eta_phi_m(50., 0.5, -2.1, 4.2);
        assert_abs_diff_eq!(p.pt(), 50., epsilon = 1e-9);
        assert_abs_diff_eq!(p.eta(), 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(p.phi(), -2.1, epsilon = 1e-9);
        assert_abs_diff_eq!(p.m(), 4.2, epsilon = 1e-9);
    }

    #[test]
    fn spacelike_mass_is_negative() {
        let p = FourVector::from([1., 2., 0., 0.]);
        assert_abs_diff_eq!(p.m(), -(3f64.sqrt()), epsilon = 1e-12);
    }

    #[test]
    fn delta_phi_wraps() {
        let a = FourVector::from_pt_phi(10., 3.0);
        let b = FourVector::from_pt_phi(10., -3.0);
        assert_abs_diff_eq!(a.delta_phi(&b), 2. * PI - 6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(a.delta_r(&b), 2. * PI - 6.0, epsilon = 1e-12);
    }

    #[test]
    fn transverse_mass_back_to_back() {
        let a = FourVector::from_pt_phi(40., 0.);
        let b = FourVector::from_pt_phi(40., PI);
        assert_abs_diff_eq!(a.mt(&b), 80., epsilon = 1e-9);
    }
}
