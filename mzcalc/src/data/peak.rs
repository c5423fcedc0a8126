use std::fmt::{self, Display, Formatter};

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::chemistry::formulas::{mz, Agent, MassType};

/// A centroided peak.
///
/// `ai` is the apex intensity and `base` the baseline under it, the reported intensity is
/// their difference. Charge and isotope stay `None` until the peak list is deisotoped.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize, Encode, Decode)]
pub struct Peak {
    pub mz: f64,
    pub ai: f64,
    pub base: f64,
    pub sn: Option<f64>,
    pub charge: Option<i32>,
    /// Position inside the isotope cluster, 0 for the monoisotopic peak.
    pub isotope: Option<i32>,
    pub fwhm: Option<f64>,
    pub group: String,
}

impl Peak {
    pub fn new(mz: f64, ai: f64) -> Self {
        Peak {
            mz,
            ai,
            base: 0.0,
            sn: None,
            charge: None,
            isotope: None,
            fwhm: None,
            group: String::new(),
        }
    }

    pub fn with_base(mut self, base: f64) -> Self {
        self.base = base;
        self
    }

    pub fn with_sn(mut self, sn: f64) -> Self {
        self.sn = Some(sn);
        self
    }

    pub fn with_charge(mut self, charge: i32) -> Self {
        self.charge = Some(charge);
        self
    }

    pub fn with_fwhm(mut self, fwhm: f64) -> Self {
        self.fwhm = Some(fwhm);
        self
    }

    /// Baseline corrected intensity.
    pub fn intensity(&self) -> f64 {
        self.ai - self.base
    }

    /// m/z over fwhm, `None` without a (non-zero) width.
    pub fn resolution(&self) -> Option<f64> {
        match self.fwhm {
            Some(fwhm) if fwhm != 0.0 => Some(self.mz / fwhm),
            _ => None,
        }
    }

    /// neutral mass of a charged peak
    ///
    /// # Examples
    ///
    /// ```
    /// use mzcalc::data::peak::Peak;
    ///
    /// let peak = Peak::new(501.0073, 100.0).with_charge(2);
    /// assert!((peak.mass().unwrap() - 1000.0).abs() < 1e-3);
    /// assert_eq!(Peak::new(500.0, 1.0).mass(), None);
    /// ```
    pub fn mass(&self) -> Option<f64> {
        self.charge
            .map(|charge| mz(self.mz, 0, charge, &Agent::proton(), 1, MassType::Monoisotopic))
    }
}

impl From<(f64, f64)> for Peak {
    fn from((mz, ai): (f64, f64)) -> Self {
        Peak::new(mz, ai)
    }
}

impl Display for Peak {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "Peak(mz: {}, intensity: {}", self.mz, self.intensity())?;
        if let Some(charge) = self.charge {
            write!(f, ", charge: {}", charge)?;
        }
        if let Some(isotope) = self.isotope {
            write!(f, ", isotope: {}", isotope)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_values() {
        let peak = Peak::new(1000.0, 150.0).with_base(50.0).with_fwhm(0.05);
        assert_eq!(peak.intensity(), 100.0);
        assert!((peak.resolution().unwrap() - 20000.0).abs() < 1e-6);
        assert_eq!(Peak::new(1000.0, 1.0).with_fwhm(0.0).resolution(), None);
    }

    #[test]
    fn test_neutral_mass() {
        let proton = Agent::proton().mass(1).0;
        let peak = Peak::new(400.0, 1.0).with_charge(3);
        assert!((peak.mass().unwrap() - (400.0 * 3.0 - 3.0 * proton)).abs() < 1e-9);
        let negative = Peak::new(400.0, 1.0).with_charge(-1);
        assert!((negative.mass().unwrap() - (400.0 + proton)).abs() < 1e-9);
    }

    #[test]
    fn test_display() {
        let mut peak = Peak::new(500.25, 10.0).with_charge(1);
        peak.isotope = Some(0);
        assert_eq!(peak.to_string(), "Peak(mz: 500.25, intensity: 10, charge: 1, isotope: 0)");
    }

    #[test]
    fn test_bincode_round_trip() {
        let peak = Peak::new(500.25, 10.0).with_sn(12.5).with_charge(2);
        let bytes = bincode::encode_to_vec(&peak, bincode::config::standard()).unwrap();
        let (decoded, _): (Peak, usize) = bincode::decode_from_slice(&bytes, bincode::config::standard()).unwrap();
        assert_eq!(decoded, peak);
    }
}
