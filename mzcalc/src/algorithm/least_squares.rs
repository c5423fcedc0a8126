use std::cmp::Ordering;
use std::ops::{Add, Div, Mul, Neg, Sub};

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::stopper;

/// A value carrying its gradient with respect to the fit parameters.
///
/// Arithmetic propagates first derivatives, so a model written with `DerivVar` parameters
/// yields both its value and its Jacobian row. Comparisons look at the value only.
///
/// # Examples
///
/// ```
/// use mzcalc::algorithm::least_squares::DerivVar;
///
/// let a = DerivVar::variable(3.0, 0);
/// let b = DerivVar::variable(2.0, 1);
/// let f = &a * &b + a.powi(2);
/// assert_eq!(f.value, 15.0);
/// assert_eq!(f.deriv, vec![8.0, 3.0]);
/// ```
#[derive(Clone, Debug, Default)]
pub struct DerivVar {
    pub value: f64,
    pub deriv: Vec<f64>,
}

impl DerivVar {
    /// The `index`-th independent variable.
    pub fn variable(value: f64, index: usize) -> Self {
        let mut deriv = vec![0.0; index + 1];
        deriv[index] = 1.0;
        DerivVar { value, deriv }
    }

    pub fn constant(value: f64) -> Self {
        DerivVar { value, deriv: Vec::new() }
    }

    pub fn powi(&self, n: i32) -> DerivVar {
        let lower = self.value.powi(n - 1);
        let factor = lower * n as f64;
        DerivVar {
            value: lower * self.value,
            deriv: self.deriv.iter().map(|d| d * factor).collect(),
        }
    }

    pub fn abs(&self) -> DerivVar {
        let sign = if self.value == 0.0 { 0.0 } else { self.value.signum() };
        DerivVar {
            value: self.value.abs(),
            deriv: self.deriv.iter().map(|d| d * sign).collect(),
        }
    }

    fn scaled(&self, factor: f64) -> Vec<f64> {
        self.deriv.iter().map(|d| d * factor).collect()
    }
}

// element-wise combination, the shorter gradient is padded with zeros
fn zip_deriv(a: &[f64], b: &[f64], f: impl Fn(f64, f64) -> f64) -> Vec<f64> {
    (0..a.len().max(b.len()))
        .map(|i| f(a.get(i).copied().unwrap_or(0.0), b.get(i).copied().unwrap_or(0.0)))
        .collect()
}

impl PartialEq for DerivVar {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl PartialOrd for DerivVar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.value.partial_cmp(&other.value)
    }
}

impl PartialEq<f64> for DerivVar {
    fn eq(&self, other: &f64) -> bool {
        self.value == *other
    }
}

impl PartialOrd<f64> for DerivVar {
    fn partial_cmp(&self, other: &f64) -> Option<Ordering> {
        self.value.partial_cmp(other)
    }
}

impl Neg for &DerivVar {
    type Output = DerivVar;

    fn neg(self) -> DerivVar {
        DerivVar {
            value: -self.value,
            deriv: self.scaled(-1.0),
        }
    }
}

impl Neg for DerivVar {
    type Output = DerivVar;

    fn neg(self) -> DerivVar {
        -&self
    }
}

impl<'a> Add<&'a DerivVar> for &'a DerivVar {
    type Output = DerivVar;

    fn add(self, other: &DerivVar) -> DerivVar {
        DerivVar {
            value: self.value + other.value,
            deriv: zip_deriv(&self.deriv, &other.deriv, |a, b| a + b),
        }
    }
}

impl<'a> Sub<&'a DerivVar> for &'a DerivVar {
    type Output = DerivVar;

    fn sub(self, other: &DerivVar) -> DerivVar {
        DerivVar {
            value: self.value - other.value,
            deriv: zip_deriv(&self.deriv, &other.deriv, |a, b| a - b),
        }
    }
}

impl<'a> Mul<&'a DerivVar> for &'a DerivVar {
    type Output = DerivVar;

    fn mul(self, other: &DerivVar) -> DerivVar {
        DerivVar {
            value: self.value * other.value,
            deriv: zip_deriv(&other.scaled(self.value), &self.scaled(other.value), |a, b| a + b),
        }
    }
}

impl<'a> Div<&'a DerivVar> for &'a DerivVar {
    type Output = DerivVar;

    fn div(self, other: &DerivVar) -> DerivVar {
        let inverse = 1.0 / other.value;
        DerivVar {
            value: self.value * inverse,
            deriv: zip_deriv(
                &self.scaled(inverse),
                &other.scaled(self.value * inverse * inverse),
                |a, b| a - b,
            ),
        }
    }
}

impl Add<f64> for &DerivVar {
    type Output = DerivVar;

    fn add(self, other: f64) -> DerivVar {
        DerivVar {
            value: self.value + other,
            deriv: self.deriv.clone(),
        }
    }
}

impl Sub<f64> for &DerivVar {
    type Output = DerivVar;

    fn sub(self, other: f64) -> DerivVar {
        self + (-other)
    }
}

impl Mul<f64> for &DerivVar {
    type Output = DerivVar;

    fn mul(self, other: f64) -> DerivVar {
        DerivVar {
            value: self.value * other,
            deriv: self.scaled(other),
        }
    }
}

impl Div<f64> for &DerivVar {
    type Output = DerivVar;

    fn div(self, other: f64) -> DerivVar {
        self * (1.0 / other)
    }
}

impl Add<&DerivVar> for f64 {
    type Output = DerivVar;

    fn add(self, other: &DerivVar) -> DerivVar {
        other + self
    }
}

impl Sub<&DerivVar> for f64 {
    type Output = DerivVar;

    fn sub(self, other: &DerivVar) -> DerivVar {
        &(-other) + self
    }
}

impl Mul<&DerivVar> for f64 {
    type Output = DerivVar;

    fn mul(self, other: &DerivVar) -> DerivVar {
        other * self
    }
}

impl Div<&DerivVar> for f64 {
    type Output = DerivVar;

    fn div(self, other: &DerivVar) -> DerivVar {
        &DerivVar::constant(self) / other
    }
}

// owned operands forward to the reference implementations
macro_rules! forward_owned {
    ($($trait:ident $method:ident),*) => {$(
        impl $trait<DerivVar> for DerivVar {
            type Output = DerivVar;
            fn $method(self, other: DerivVar) -> DerivVar {
                (&self).$method(&other)
            }
        }

        impl<'a> $trait<&'a DerivVar> for DerivVar {
            type Output = DerivVar;
            fn $method(self, other: &DerivVar) -> DerivVar {
                (&self).$method(other)
            }
        }

        impl<'a> $trait<DerivVar> for &'a DerivVar {
            type Output = DerivVar;
            fn $method(self, other: DerivVar) -> DerivVar {
                self.$method(&other)
            }
        }

        impl $trait<f64> for DerivVar {
            type Output = DerivVar;
            fn $method(self, other: f64) -> DerivVar {
                (&self).$method(other)
            }
        }

        impl $trait<DerivVar> for f64 {
            type Output = DerivVar;
            fn $method(self, other: DerivVar) -> DerivVar {
                self.$method(&other)
            }
        }
    )*};
}

forward_owned!(Add add, Sub sub, Mul mul, Div div);

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FitConfig {
    /// Stop once an accepted step improves chi-square by less than this.
    pub limit: f64,
    pub max_iterations: Option<usize>,
}

impl Default for FitConfig {
    fn default() -> Self {
        FitConfig {
            limit: 1e-7,
            max_iterations: None,
        }
    }
}

impl FitConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

// chi-square with gradient and the approximated curvature matrix
fn chi_square<F>(model: &F, params: &[DerivVar], data: &[(f64, f64)]) -> (DerivVar, DMatrix<f64>)
where
    F: Fn(&[DerivVar], f64) -> DerivVar,
{
    let n = params.len();
    let mut chi = DerivVar::constant(0.0);
    let mut alpha = DMatrix::<f64>::zeros(n, n);
    for &(x, y) in data {
        let f = model(params, x);
        chi = chi + (&f - y).powi(2);
        let d = DVector::from_iterator(n, (0..n).map(|i| f.deriv.get(i).copied().unwrap_or(0.0)));
        alpha += &d * d.transpose();
    }
    (chi, alpha)
}

// solves (alpha + lambda * diag(alpha)) delta = -gradient / 2
fn marquardt_step(alpha: &DMatrix<f64>, gradient: &DVector<f64>, lambda: f64) -> Result<DVector<f64>> {
    let mut lhs = alpha.clone();
    for i in 0..lhs.nrows() {
        lhs[(i, i)] += lambda * alpha[(i, i)];
    }
    lhs.lu()
        .solve(&(gradient * -0.5))
        .ok_or_else(|| Error::Numeric("singular normal equations in least-squares fit".to_string()))
}

/// non-linear least-squares fit
///
/// Levenberg-Marquardt iterations with derivatives propagated through [`DerivVar`]. The
/// damping factor starts at 0.001, grows tenfold on a rejected step and shrinks tenfold on
/// an accepted one.
///
/// Arguments:
///
/// * `model` - function of the parameters and x
/// * `initial` - starting parameter values
/// * `data` - (x, y) points
/// * `config` - convergence limit and optional iteration cap
///
/// Returns:
///
/// * `(Vec<f64>, f64)` - fitted parameters and their chi-square
///
/// # Examples
///
/// ```
/// use mzcalc::algorithm::least_squares::{least_squares_fit, DerivVar, FitConfig};
///
/// let data = vec![(1.0, 3.0), (2.0, 5.0), (3.0, 7.0)];
/// let line = |p: &[DerivVar], x: f64| &p[0] * x + &p[1];
/// let (params, chi) = least_squares_fit(line, &[0.5, 0.0], &data, &FitConfig::default()).unwrap();
/// assert!((params[0] - 2.0).abs() < 1e-4);
/// assert!((params[1] - 1.0).abs() < 1e-4);
/// assert!(chi < 1e-6);
/// ```
pub fn least_squares_fit<F>(model: F, initial: &[f64], data: &[(f64, f64)], config: &FitConfig) -> Result<(Vec<f64>, f64)>
where
    F: Fn(&[DerivVar], f64) -> DerivVar,
{
    if initial.is_empty() || data.is_empty() {
        return Err(Error::Input("least-squares fit needs parameters and data".to_string()));
    }

    let n = initial.len();
    let mut params: Vec<DerivVar> = initial.iter().enumerate().map(|(i, &value)| DerivVar::variable(value, i)).collect();
    let (mut chi, mut alpha) = chi_square(&model, &params, data);
    let mut lambda = 0.001;
    let mut iteration = 0;

    loop {
        stopper::check()?;
        iteration += 1;

        let gradient = DVector::from_iterator(n, (0..n).map(|i| chi.deriv.get(i).copied().unwrap_or(0.0)));
        let delta = marquardt_step(&alpha, &gradient, lambda)?;
        let next: Vec<DerivVar> = params
            .iter()
            .zip(delta.iter())
            .enumerate()
            .map(|(i, (param, step))| DerivVar::variable(param.value + step, i))
            .collect();
        let (next_chi, next_alpha) = chi_square(&model, &next, data);
        log::trace!("iteration {}: chi-square {:e}, lambda {:e}", iteration, next_chi.value, lambda);

        if !next_chi.value.is_finite() || next_chi > chi {
            lambda *= 10.0;
            if !lambda.is_finite() {
                log::warn!("least-squares damping overflowed after {} iterations", iteration);
                break;
            }
        } else if chi.value - next_chi.value < config.limit {
            log::debug!("least-squares fit converged after {} iterations", iteration);
            return Ok((next.iter().map(|p| p.value).collect(), next_chi.value));
        } else {
            lambda *= 0.1;
            params = next;
            chi = next_chi;
            alpha = next_alpha;
        }

        if config.max_iterations == Some(iteration) {
            log::warn!("least-squares fit stopped at the iteration cap {}", iteration);
            break;
        }
    }

    Ok((params.iter().map(|p| p.value).collect(), chi.value))
}

// (chi-square, gradient, curvature) of a non-negative linear mixture
fn mixture_chi_square(data: &[f64], models: &DMatrix<f64>, params: &DVector<f64>) -> (f64, DVector<f64>, DMatrix<f64>) {
    let differences = models.transpose() * params - DVector::from_column_slice(data);
    let chi = differences.norm_squared();
    let gradient = models * &differences * 2.0;
    let alpha = models * models.transpose();
    (chi, gradient, alpha)
}

/// non-negative weights of a linear mixture of model profiles
///
/// Fits `data ≈ Σ weight_i · models_i` with Levenberg-Marquardt steps clamped at zero. The data
/// are scaled to a maximum of 100 for the fit and the weights scaled back. The damping factor
/// grows fivefold on a rejected step and halves on an accepted one.
///
/// Arguments:
///
/// * `data` - observed intensities
/// * `models` - one row per model, sampled at the same points as `data`
/// * `max_iterations` - optional iteration cap
/// * `chi_limit` - convergence limit on the chi-square improvement
///
/// Returns:
///
/// * `Vec<f64>` - one weight per model
pub fn fit_mixture(data: &[f64], models: &[Vec<f64>], max_iterations: Option<usize>, chi_limit: f64) -> Result<Vec<f64>> {
    if models.is_empty() {
        return Ok(Vec::new());
    }
    if models.iter().any(|model| model.len() != data.len()) {
        return Err(Error::Input("model profiles and data differ in length".to_string()));
    }
    let maximum = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if maximum <= 0.0 {
        return Err(Error::Numeric("mixture fit needs a positive data maximum".to_string()));
    }

    let norm = 100.0 / maximum;
    let data: Vec<f64> = data.iter().map(|value| value * norm).collect();
    let matrix = DMatrix::from_fn(models.len(), data.len(), |row, col| models[row][col]);

    let mut params = DVector::from_element(models.len(), 50.0);
    let (mut chi, mut gradient, alpha) = mixture_chi_square(&data, &matrix, &params);
    let mut lambda = 0.001;
    let mut iteration = 0;

    let result = loop {
        stopper::check()?;
        iteration += 1;

        let delta = marquardt_step(&alpha, &gradient, lambda)?;
        let next = (&params + delta).map(|value| value.max(0.0));
        let (next_chi, next_gradient, _) = mixture_chi_square(&data, &matrix, &next);
        log::trace!("mixture iteration {}: chi-square {:e}", iteration, next_chi);

        if !next_chi.is_finite() || next_chi > chi {
            lambda *= 5.0;
            if !lambda.is_finite() {
                break params;
            }
        } else if chi - next_chi < chi_limit {
            break next;
        } else {
            lambda *= 0.5;
            params = next;
            chi = next_chi;
            gradient = next_gradient;
        }

        if max_iterations == Some(iteration) {
            break params;
        }
    };

    log::debug!("mixture fit of {} models finished after {} iterations", models.len(), iteration);
    Ok(result.iter().map(|weight| weight / norm).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deriv_var_arithmetic() {
        let x = DerivVar::variable(2.0, 0);
        let y = DerivVar::variable(4.0, 1);

        let quotient = &x / &y;
        assert_eq!(quotient.value, 0.5);
        assert_eq!(quotient.deriv, vec![0.25, -0.125]);

        let shifted = 1.0 - &x * 3.0;
        assert_eq!(shifted.value, -5.0);
        assert_eq!(shifted.deriv, vec![-3.0]);

        let reciprocal = 1.0 / &y;
        assert_eq!(reciprocal.value, 0.25);
        assert_eq!(reciprocal.deriv, vec![0.0, -1.0 / 16.0]);

        let negative = (-x.clone()).abs();
        assert_eq!(negative.value, 2.0);
        assert_eq!(negative.deriv, vec![1.0]);

        assert!(x < y);
        assert!(y > 3.0);
        assert_eq!(x.powi(3).deriv, vec![12.0]);
    }

    #[test]
    fn test_quadratic_fit() {
        let data: Vec<(f64, f64)> = (0..10).map(|i| {
            let x = i as f64;
            (x, 0.5 * x * x - 2.0 * x + 3.0)
        }).collect();
        let model = |p: &[DerivVar], x: f64| &p[0] * (x * x) + &p[1] * x + &p[2];
        let (params, chi) = least_squares_fit(model, &[1.0, 0.0, 0.0], &data, &FitConfig::default()).unwrap();
        assert!((params[0] - 0.5).abs() < 1e-4);
        assert!((params[1] + 2.0).abs() < 1e-3);
        assert!((params[2] - 3.0).abs() < 1e-3);
        assert!(chi < 1e-6);
    }

    #[test_log::test]
    fn test_iteration_cap_and_inputs() {
        let data = vec![(1.0, 2.0), (2.0, 4.0)];
        let model = |p: &[DerivVar], x: f64| &p[0] * x;
        let config = FitConfig { max_iterations: Some(1), ..FitConfig::default() };
        let (params, _) = least_squares_fit(model, &[0.0], &data, &config).unwrap();
        assert_eq!(params.len(), 1);
        assert!(least_squares_fit(model, &[], &data, &config).is_err());
        assert!(least_squares_fit(model, &[1.0], &[], &config).is_err());
    }

    #[test]
    fn test_mixture_weights() {
        let a = vec![1.0, 0.5, 0.0, 0.0];
        let b = vec![0.0, 0.5, 1.0, 0.2];
        let data: Vec<f64> = a.iter().zip(&b).map(|(x, y)| 3.0 * x + 1.0 * y).collect();
        let weights = fit_mixture(&data, &[a, b], None, 1e-9).unwrap();
        assert!((weights[0] - 3.0).abs() < 1e-3);
        assert!((weights[1] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_mixture_clamps_negative_weights() {
        let a = vec![1.0, 1.0, 0.0];
        let b = vec![0.0, 1.0, 1.0];
        let data = vec![2.0, 1.0, 0.0];
        let weights = fit_mixture(&data, &[a, b], None, 1e-9).unwrap();
        assert!(weights.iter().all(|&w| w >= 0.0));
        assert!(fit_mixture(&[0.0, 0.0, 0.0], &[vec![1.0, 1.0, 1.0]], None, 1e-3).is_err());
        assert!(fit_mixture(&data, &[], None, 1e-3).unwrap().is_empty());
    }
}
