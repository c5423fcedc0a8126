use std::str::FromStr;

use rand::distributions::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use crate::data::peak::Peak;
use crate::data::signal::{Baseline, BaselinePoint, Signal};
use crate::error::{Error, Result};

/// Peak shape used to render sticks as a continuous profile.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeakShape {
    #[default]
    Gaussian,
    Lorentzian,
    /// Gaussian left of the apex, Lorentzian right of it.
    GaussLorentzian,
}

impl FromStr for PeakShape {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gaussian" => Ok(PeakShape::Gaussian),
            "lorentzian" => Ok(PeakShape::Lorentzian),
            "gausslorentzian" => Ok(PeakShape::GaussLorentzian),
            other => Err(Error::unknown("peak shape", other)),
        }
    }
}

fn gaussian_term(x: f64, center: f64, fwhm: f64) -> f64 {
    let f = (fwhm / 1.66).powi(2);
    (-(x - center).powi(2) / f).exp()
}

fn lorentzian_term(x: f64, center: f64, fwhm: f64) -> f64 {
    let f = (fwhm / 2.0).powi(2);
    1.0 / (1.0 + (x - center).powi(2) / f)
}

// evenly spaced samples over [min_x, max_x) using `term` for every point
fn sample_shape<F>(min_x: f64, max_x: f64, points: usize, min_y: f64, max_y: f64, term: F) -> Signal
where
    F: Fn(f64) -> f64,
{
    let step = (max_x - min_x) / points as f64;
    let amplitude = max_y - min_y;
    let mut mz = Vec::with_capacity(points);
    let mut intensity = Vec::with_capacity(points);
    let mut x = min_x;
    for _ in 0..points {
        mz.push(x);
        intensity.push(min_y + amplitude * term(x));
        x += step;
    }
    Signal::new(mz, intensity)
}

/// generate a Gaussian peak
///
/// Arguments:
///
/// * `x` - peak center
/// * `min_y` - baseline intensity
/// * `max_y` - apex intensity
/// * `fwhm` - full width at half maximum
/// * `points` - number of samples over `x ± 5 * fwhm`
///
/// Returns:
///
/// * `Signal` - sampled peak
///
/// # Examples
///
/// ```
/// use mzcalc::algorithm::profile::gaussian;
///
/// let peak = gaussian(500.0, 0.0, 100.0, 0.1, 500);
/// assert_eq!(peak.len(), 500);
/// let apex = peak.basepeak().unwrap();
/// assert!((peak.mz[apex] - 500.0).abs() < 0.002);
/// ```
pub fn gaussian(x: f64, min_y: f64, max_y: f64, fwhm: f64, points: usize) -> Signal {
    sample_shape(x - 5.0 * fwhm, x + 5.0 * fwhm, points, min_y, max_y, |value| {
        gaussian_term(value, x, fwhm)
    })
}

/// Lorentzian peak sampled over `x ± 10 * fwhm`.
pub fn lorentzian(x: f64, min_y: f64, max_y: f64, fwhm: f64, points: usize) -> Signal {
    sample_shape(x - 10.0 * fwhm, x + 10.0 * fwhm, points, min_y, max_y, |value| {
        lorentzian_term(value, x, fwhm)
    })
}

/// Half Gaussian, half Lorentzian peak sampled over `x - 5 * fwhm .. x + 10 * fwhm`.
pub fn gauss_lorentzian(x: f64, min_y: f64, max_y: f64, fwhm: f64, points: usize) -> Signal {
    let min_x = x - 5.0 * fwhm;
    let step = (x + 10.0 * fwhm - min_x) / points as f64;
    let mut mz = Vec::with_capacity(points);
    let mut intensity = Vec::with_capacity(points);
    let mut current = min_x;
    let mut lorentzian_part = false;
    for _ in 0..points {
        let term = if lorentzian_part {
            lorentzian_term(current, x, fwhm)
        } else {
            gaussian_term(current, x, fwhm)
        };
        mz.push(current);
        intensity.push(min_y + (max_y - min_y) * term);
        current += step;
        if current >= x {
            lorentzian_part = true;
        }
    }
    Signal::new(mz, intensity)
}

/// Stick peak rendered into a profile.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProfilePeak {
    pub mz: f64,
    pub intensity: f64,
    /// Peak width, the default width is used when missing.
    pub fwhm: Option<f64>,
    /// Baseline added back below the peak.
    pub base: f64,
}

impl ProfilePeak {
    pub fn new(mz: f64, intensity: f64) -> Self {
        ProfilePeak { mz, intensity, fwhm: None, base: 0.0 }
    }
}

impl From<(f64, f64)> for ProfilePeak {
    fn from((mz, intensity): (f64, f64)) -> Self {
        ProfilePeak::new(mz, intensity)
    }
}

impl From<&Peak> for ProfilePeak {
    fn from(peak: &Peak) -> Self {
        ProfilePeak {
            mz: peak.mz,
            intensity: peak.intensity(),
            fwhm: peak.fwhm,
            base: peak.base,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Default peak width.
    pub fwhm: f64,
    /// Raster points per peak width, ignored when a raster is given.
    pub points: usize,
    /// Width of the uniform random noise added to every point.
    pub noise: f64,
    /// Use the default width for every peak.
    pub force_fwhm: bool,
    pub shape: PeakShape,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        ProfileConfig {
            fwhm: 0.1,
            points: 10,
            noise: 0.0,
            force_fwhm: false,
            shape: PeakShape::Gaussian,
        }
    }
}

impl ProfileConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// adaptive raster for a set of (mz, intensity, fwhm) peaks
///
/// The raster covers all peaks extended by `5 * max_fwhm` on both sides; its step grows
/// linearly from `min_fwhm / points` at the low end to `max_fwhm / points` at the high end.
///
/// # Examples
///
/// ```
/// use mzcalc::algorithm::profile::profile_raster;
///
/// let raster = profile_raster(&[(100.0, 1.0, 0.1)], 10).unwrap();
/// assert!((raster[0] - 99.5).abs() < 1e-9);
/// assert!((raster[1] - raster[0] - 0.01).abs() < 1e-9);
/// ```
pub fn profile_raster(peaks: &[(f64, f64, f64)], points: usize) -> Result<Vec<f64>> {
    if peaks.is_empty() {
        return Err(Error::Input("no peaks to make a raster for".to_string()));
    }
    if points == 0 || peaks.iter().any(|peak| peak.2 <= 0.0 || !peak.2.is_finite()) {
        return Err(Error::Input("raster needs positive peak widths and points".to_string()));
    }

    let (mut min_x, mut max_x) = (peaks[0].0, peaks[0].0);
    let (mut min_fwhm, mut max_fwhm) = (peaks[0].2, peaks[0].2);
    for &(mz, _, fwhm) in peaks {
        min_x = min_x.min(mz);
        max_x = max_x.max(mz);
        min_fwhm = min_fwhm.min(fwhm);
        max_fwhm = max_fwhm.max(fwhm);
    }
    min_x -= 5.0 * max_fwhm;
    max_x += 5.0 * max_fwhm;

    let points = points as f64;
    let size = ((max_x - min_x) / (min_fwhm / points)) as usize;
    let a = (max_fwhm / points - min_fwhm / points) / (max_x - min_x);
    let b = min_fwhm / points - a * min_x;

    let mut raster = Vec::new();
    let mut x = min_x;
    while x < max_x && raster.len() < size {
        raster.push(x);
        x += a * x + b;
    }
    Ok(raster)
}

/// render (mz, intensity, fwhm) peaks onto a given raster
///
/// Arguments:
///
/// * `peaks` - peaks to render
/// * `raster` - ascending m/z values
/// * `noise` - width of uniform noise added to every point, 0 for none
/// * `shape` - peak shape
///
/// Returns:
///
/// * `Signal` - summed profile
pub fn profile_to_raster(peaks: &[(f64, f64, f64)], raster: &[f64], noise: f64, shape: PeakShape) -> Result<Signal> {
    if peaks.is_empty() || raster.is_empty() {
        return Err(Error::Input("profile needs peaks and a raster".to_string()));
    }

    let locate = |x: f64| raster.partition_point(|&value| value <= x);
    let mut intensity = vec![0.0; raster.len()];

    for &(mz, height, fwhm) in peaks {
        match shape {
            PeakShape::Gaussian => {
                for j in locate(mz - 5.0 * fwhm)..locate(mz + 5.0 * fwhm) {
                    intensity[j] += height * gaussian_term(raster[j], mz, fwhm);
                }
            }
            PeakShape::Lorentzian => {
                for j in locate(mz - 10.0 * fwhm)..locate(mz + 10.0 * fwhm) {
                    intensity[j] += height * lorentzian_term(raster[j], mz, fwhm);
                }
            }
            PeakShape::GaussLorentzian => {
                let end = locate(mz + 10.0 * fwhm);
                let mut j = locate(mz - 5.0 * fwhm);
                while j < end {
                    intensity[j] += height * gaussian_term(raster[j], mz, fwhm);
                    if raster[j] >= mz {
                        break;
                    }
                    j += 1;
                }
                for k in (j + 1)..end {
                    intensity[k] += height * lorentzian_term(raster[k], mz, fwhm);
                }
            }
        }
    }

    if noise != 0.0 {
        let half = noise.abs() / 2.0;
        let distribution = Uniform::new_inclusive(-half, half);
        let mut rng = rand::thread_rng();
        intensity.iter_mut().for_each(|value| *value += distribution.sample(&mut rng));
    }

    Ok(Signal::new(raster.to_vec(), intensity))
}

// (mz, intensity, fwhm) with default widths applied, plus the per-peak baseline
fn resolve(peaks: &[ProfilePeak], config: &ProfileConfig) -> (Vec<(f64, f64, f64)>, Baseline) {
    let mut sorted = peaks.to_vec();
    sorted.sort_by(|a, b| a.mz.total_cmp(&b.mz));

    let resolved = sorted
        .iter()
        .map(|peak| {
            let fwhm = match peak.fwhm {
                Some(fwhm) if fwhm != 0.0 && !config.force_fwhm => fwhm,
                _ => config.fwhm,
            };
            (peak.mz, peak.intensity, fwhm)
        })
        .collect();

    let mut rows: Vec<BaselinePoint> = Vec::new();
    for peak in &sorted {
        if rows.last().map_or(true, |row| row.x != peak.mz) {
            rows.push(BaselinePoint { x: peak.mz, level: -peak.base, width: 0.0 });
        }
    }

    (resolved, Baseline::new(rows))
}

/// make a profile signal for a list of peaks
///
/// Arguments:
///
/// * `peaks` - stick peaks
/// * `config` - widths, raster density, noise and shape
///
/// Returns:
///
/// * `Signal` - profile on an adaptive raster with peak baselines added back
///
/// # Examples
///
/// ```
/// use mzcalc::algorithm::profile::{profile, ProfileConfig, ProfilePeak};
///
/// let peaks = vec![ProfilePeak::new(500.0, 100.0)];
/// let signal = profile(&peaks, &ProfileConfig::default()).unwrap();
/// let apex = signal.basepeak().unwrap();
/// assert!((signal.mz[apex] - 500.0).abs() < 0.01);
/// assert!((signal.intensity[apex] - 100.0).abs() < 1.0);
/// ```
pub fn profile(peaks: &[ProfilePeak], config: &ProfileConfig) -> Result<Signal> {
    let (resolved, baseline) = resolve(peaks, config);
    let raster = profile_raster(&resolved, config.points)?;
    let signal = profile_to_raster(&resolved, &raster, config.noise, config.shape)?;
    Ok(signal.subbase(&baseline))
}

/// Same as [`profile`] on a caller supplied raster.
pub fn profile_on_raster(peaks: &[ProfilePeak], raster: &[f64], config: &ProfileConfig) -> Result<Signal> {
    let (resolved, baseline) = resolve(peaks, config);
    let signal = profile_to_raster(&resolved, raster, config.noise, config.shape)?;
    Ok(signal.subbase(&baseline))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shapes_peak_at_center() {
        for shape in [
            gaussian(100.0, 0.0, 1.0, 0.1, 1000),
            lorentzian(100.0, 0.0, 1.0, 0.1, 1000),
            gauss_lorentzian(100.0, 0.0, 1.0, 0.1, 1500),
        ] {
            let apex = shape.basepeak().unwrap();
            assert!((shape.mz[apex] - 100.0).abs() < 0.002);
            assert!(shape.intensity[apex] > 0.99);
            let width = shape.width(100.0, 0.5).unwrap();
            assert!((width - 0.1).abs() < 0.01, "width {}", width);
        }
    }

    #[test]
    fn test_gauss_lorentzian_tail() {
        let shape = gauss_lorentzian(100.0, 0.0, 1.0, 0.1, 1500);
        // Lorentzian tail decays slower than the Gaussian front
        let front = shape.intensity(99.75).unwrap();
        let tail = shape.intensity(100.25).unwrap();
        assert!(tail > front);
        assert!((shape.mz[0] - 99.5).abs() < 1e-9);
    }

    #[test]
    fn test_raster_step_grows() {
        let peaks = [(100.0, 1.0, 0.1), (200.0, 1.0, 0.2)];
        let raster = profile_raster(&peaks, 10).unwrap();
        let first_step = raster[1] - raster[0];
        let last_step = raster[raster.len() - 1] - raster[raster.len() - 2];
        assert!((first_step - 0.01).abs() < 1e-6);
        assert!(last_step > 0.019 && last_step < 0.0201);
        assert!(raster[raster.len() - 1] < 201.0);
        assert!(profile_raster(&[(100.0, 1.0, 0.0)], 10).is_err());
    }

    #[test]
    fn test_profile_sums_and_adds_base() {
        let peaks = vec![
            ProfilePeak { mz: 100.0, intensity: 10.0, fwhm: Some(0.05), base: 2.0 },
            ProfilePeak { mz: 101.0, intensity: 20.0, fwhm: None, base: 2.0 },
        ];
        let config = ProfileConfig { points: 50, ..ProfileConfig::default() };
        let signal = profile(&peaks, &config).unwrap();
        assert!((signal.intensity(100.0).unwrap() - 12.0).abs() < 0.1);
        assert!((signal.intensity(101.0).unwrap() - 22.0).abs() < 0.1);
        // first peak keeps its own width
        assert!((signal.width(100.0, 7.0).unwrap() - 0.05).abs() < 0.005);
        assert!((signal.width(101.0, 12.0).unwrap() - 0.1).abs() < 0.01);
    }

    #[test]
    fn test_profile_on_raster_and_noise() {
        let raster: Vec<f64> = (0..200).map(|i| 99.0 + i as f64 * 0.01).collect();
        let peaks = vec![ProfilePeak::new(100.0, 10.0)];
        let config = ProfileConfig { noise: 0.5, ..ProfileConfig::default() };
        let signal = profile_on_raster(&peaks, &raster, &config).unwrap();
        assert_eq!(*signal.mz, raster);
        // noise stays within half its width and negative values are clipped
        assert!(signal.intensity.iter().all(|&y| (0.0..=10.25).contains(&y)));
        assert!(signal.intensity[100] > 9.7);
        assert!(profile_on_raster(&[], &raster, &config).is_err());
        assert!("triangle".parse::<PeakShape>().is_err());
    }
}
