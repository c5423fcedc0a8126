use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::algorithm::least_squares::{least_squares_fit, DerivVar, FitConfig};
use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationKind {
    /// `x * a + b`
    Linear,
    /// `x² * a + x * b + c`
    Quadratic,
}

impl CalibrationKind {
    fn initial(&self) -> &'static [f64] {
        match self {
            CalibrationKind::Linear => &[0.5, 0.0],
            CalibrationKind::Quadratic => &[1.0, 0.0, 0.0],
        }
    }
}

impl FromStr for CalibrationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "linear" => Ok(CalibrationKind::Linear),
            "quadratic" => Ok(CalibrationKind::Quadratic),
            other => Err(Error::unknown("calibration", other)),
        }
    }
}

impl Display for CalibrationKind {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            CalibrationKind::Linear => write!(f, "linear"),
            CalibrationKind::Quadratic => write!(f, "quadratic"),
        }
    }
}

/// Fitted mapping from measured to corrected m/z.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationModel {
    pub kind: CalibrationKind,
    pub params: Vec<f64>,
    pub chi_square: f64,
}

impl CalibrationModel {
    /// corrected value of a measured m/z
    pub fn apply(&self, x: f64) -> f64 {
        match self.kind {
            CalibrationKind::Linear => x * self.params[0] + self.params[1],
            CalibrationKind::Quadratic => x * x * self.params[0] + x * self.params[1] + self.params[2],
        }
    }
}

fn model(kind: CalibrationKind) -> impl Fn(&[DerivVar], f64) -> DerivVar {
    move |params: &[DerivVar], x: f64| match kind {
        CalibrationKind::Linear => &params[0] * x + &params[1],
        CalibrationKind::Quadratic => &params[0] * (x * x) + &params[1] * x + &params[2],
    }
}

// the fit runs on t = (x - center) / scale, parameters are mapped back to x afterwards
fn unscale(kind: CalibrationKind, params: &[f64], center: f64, scale: f64) -> Vec<f64> {
    match kind {
        CalibrationKind::Linear => {
            let a = params[0] / scale;
            vec![a, params[1] - a * center]
        }
        CalibrationKind::Quadratic => {
            let a = params[0] / (scale * scale);
            let b = params[1] / scale;
            vec![a, b - 2.0 * a * center, a * center * center - b * center + params[2]]
        }
    }
}

/// fit a calibration from matched (measured, reference) pairs
///
/// A single linear pair yields a pure shift with chi-square 1.
///
/// Arguments:
///
/// * `points` - (measured, reference) m/z pairs
/// * `kind` - model to fit
///
/// Returns:
///
/// * `CalibrationModel` - fitted parameters and chi-square
///
/// # Examples
///
/// ```
/// use mzcalc::{calibration, CalibrationKind};
///
/// let points = vec![(1000.1, 1000.0), (2000.2, 2000.0), (3000.3, 3000.0)];
/// let model = calibration(&points, CalibrationKind::Linear).unwrap();
/// assert!((model.apply(1500.15) - 1500.0).abs() < 1e-3);
/// ```
pub fn calibration(points: &[(f64, f64)], kind: CalibrationKind) -> Result<CalibrationModel> {
    if points.is_empty() {
        return Err(Error::Input("calibration needs at least one point".to_string()));
    }

    if kind == CalibrationKind::Linear && points.len() == 1 {
        let (measured, reference) = points[0];
        return Ok(CalibrationModel {
            kind,
            params: vec![1.0, reference - measured],
            chi_square: 1.0,
        });
    }

    let center = points.iter().map(|point| point.0).sum::<f64>() / points.len() as f64;
    let spread = points.iter().map(|point| (point.0 - center).abs()).fold(0.0, f64::max);
    let scale = if spread > 0.0 { spread } else { 1.0 };
    let scaled: Vec<(f64, f64)> = points
        .iter()
        .map(|&(measured, reference)| ((measured - center) / scale, reference))
        .collect();

    let (params, chi_square) = least_squares_fit(model(kind), kind.initial(), &scaled, &FitConfig::default())?;
    log::debug!("{} calibration from {} points, chi-square {:e}", kind, points.len(), chi_square);

    Ok(CalibrationModel {
        kind,
        params: unscale(kind, &params, center, scale),
        chi_square,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_calibration() {
        let points: Vec<(f64, f64)> = [800.0, 1200.0, 1800.0, 2400.0]
            .iter()
            .map(|&reference| (reference * 1.0001 + 0.02, reference))
            .collect();
        let model = calibration(&points, CalibrationKind::Linear).unwrap();
        for &(measured, reference) in &points {
            assert!((model.apply(measured) - reference).abs() < 1e-4);
        }
        assert!(model.chi_square < 1e-6);
    }

    #[test]
    fn test_quadratic_calibration() {
        let points: Vec<(f64, f64)> = [500.0, 1000.0, 1500.0, 2000.0, 2500.0]
            .iter()
            .map(|&measured| (measured, 1e-7 * measured * measured + 0.9999 * measured + 0.05))
            .collect();
        let model = calibration(&points, CalibrationKind::Quadratic).unwrap();
        for &(measured, reference) in &points {
            assert!((model.apply(measured) - reference).abs() < 1e-3);
        }
    }

    #[test]
    fn test_single_point_and_empty() {
        let model = calibration(&[(1000.5, 1000.0)], CalibrationKind::Linear).unwrap();
        assert_eq!(model.params, vec![1.0, -0.5]);
        assert_eq!(model.chi_square, 1.0);
        assert!((model.apply(2000.5) - 2000.0).abs() < 1e-12);
        assert!(calibration(&[], CalibrationKind::Linear).is_err());
    }

    #[test]
    fn test_kind_keywords() {
        assert_eq!("quadratic".parse::<CalibrationKind>().unwrap(), CalibrationKind::Quadratic);
        assert_eq!(CalibrationKind::Linear.to_string(), "linear");
        assert!(matches!("cubic".parse::<CalibrationKind>(), Err(Error::UnknownKeyword { .. })));
    }
}
