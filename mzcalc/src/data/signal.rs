use std::fmt::{self, Display, Formatter};
use std::iter::repeat;
use std::str::FromStr;
use std::sync::Arc;

use bincode::{Decode, Encode};
use itertools::Itertools;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median};

use crate::error::{Error, Result};
use crate::stopper;

/// linear interpolation of x for a given y between two points
///
/// Arguments:
///
/// * `p1` - first point (x, y)
/// * `p2` - second point (x, y)
/// * `y` - y-value to solve for
///
/// Returns:
///
/// * `f64` - x-value, or `p1.0` if both points share the same x
///
/// # Examples
///
/// ```
/// use mzcalc::data::signal::interpolate_x;
///
/// assert_eq!(interpolate_x((1.0, 0.0), (2.0, 10.0), 5.0), 1.5);
/// ```
pub fn interpolate_x(p1: (f64, f64), p2: (f64, f64), y: f64) -> f64 {
    if p1.0 == p2.0 {
        return p1.0;
    }
    let a = (p2.1 - p1.1) / (p2.0 - p1.0);
    let b = p1.1 - a * p1.0;
    (y - b) / a
}

/// linear interpolation of y for a given x between two points
///
/// # Examples
///
/// ```
/// use mzcalc::data::signal::interpolate_y;
///
/// assert_eq!(interpolate_y((1.0, 0.0), (2.0, 10.0), 1.5), 5.0);
/// ```
pub fn interpolate_y(p1: (f64, f64), p2: (f64, f64), x: f64) -> f64 {
    if p1.1 == p2.1 {
        return p1.1;
    }
    let a = (p2.1 - p1.1) / (p2.0 - p1.0);
    let b = p1.1 - a * p1.0;
    a * x + b
}

// (median, 2 * median absolute deviation), (0, 0) for no values
pub(crate) fn noise_of(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let level = Data::new(values.to_vec()).median();
    let deviations: Vec<f64> = values.iter().map(|value| (value - level).abs()).collect();
    let width = Data::new(deviations).median() * 2.0;
    (level, width)
}

/// Part of a signal used for noise estimation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NoiseRange {
    Whole,
    /// Explicit x-range.
    Range(f64, f64),
    /// `x ± x * window`
    Around { x: f64, window: f64 },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovingAverageStyle {
    #[default]
    Flat,
    Gaussian,
}

/// Smoothing filters; keyword forms are `MA`, `GA` and `SG`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmoothingMethod {
    MovingAverage,
    Gaussian,
    SavitzkyGolay,
}

impl FromStr for SmoothingMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "MA" => Ok(SmoothingMethod::MovingAverage),
            "GA" => Ok(SmoothingMethod::Gaussian),
            "SG" => Ok(SmoothingMethod::SavitzkyGolay),
            other => Err(Error::unknown("smoothing method", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BaselinePoint {
    pub x: f64,
    pub level: f64,
    pub width: f64,
}

/// Piecewise linear noise level and noise width of a signal, sorted by x.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    points: Vec<BaselinePoint>,
}

impl Baseline {
    pub fn new(mut points: Vec<BaselinePoint>) -> Self {
        points.sort_by(|a, b| a.x.total_cmp(&b.x));
        Baseline { points }
    }

    /// A single level subtracted everywhere.
    pub fn constant(level: f64) -> Self {
        Baseline {
            points: vec![BaselinePoint { x: 0.0, level, width: 0.0 }],
        }
    }

    pub fn points(&self) -> &[BaselinePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Interpolated (level, width) at `x`, `None` outside the baseline range.
    ///
    /// # Examples
    ///
    /// ```
    /// use mzcalc::data::signal::{Baseline, BaselinePoint};
    ///
    /// let baseline = Baseline::new(vec![
    ///     BaselinePoint { x: 100.0, level: 10.0, width: 2.0 },
    ///     BaselinePoint { x: 200.0, level: 20.0, width: 4.0 },
    /// ]);
    /// assert_eq!(baseline.at(150.0), Some((15.0, 3.0)));
    /// assert_eq!(baseline.at(250.0), None);
    /// ```
    pub fn at(&self, x: f64) -> Option<(f64, f64)> {
        let idx = self.points.partition_point(|point| point.x <= x);
        if idx == 0 || idx == self.points.len() {
            return None;
        }
        let (p1, p2) = (self.points[idx - 1], self.points[idx]);
        Some((
            interpolate_y((p1.x, p1.level), (p2.x, p2.level), x),
            interpolate_y((p1.x, p1.width), (p2.x, p2.width), x),
        ))
    }
}

/// A sampled profile: m/z values in ascending order with their intensities.
///
/// Uses `Arc<Vec<f64>>` columns so clones and transforms that keep one axis are cheap.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Signal {
    pub mz: Arc<Vec<f64>>,
    pub intensity: Arc<Vec<f64>>,
}

// Manual bincode implementation for Arc compatibility
impl Encode for Signal {
    fn encode<E: bincode::enc::Encoder>(&self, encoder: &mut E) -> std::result::Result<(), bincode::error::EncodeError> {
        bincode::Encode::encode(&*self.mz, encoder)?;
        bincode::Encode::encode(&*self.intensity, encoder)?;
        Ok(())
    }
}

impl<Context> Decode<Context> for Signal {
    fn decode<D: bincode::de::Decoder<Context = Context>>(decoder: &mut D) -> std::result::Result<Self, bincode::error::DecodeError> {
        let mz: Vec<f64> = bincode::Decode::decode(decoder)?;
        let intensity: Vec<f64> = bincode::Decode::decode(decoder)?;
        Ok(Signal::new(mz, intensity))
    }
}

impl<'de, Context> bincode::BorrowDecode<'de, Context> for Signal {
    fn borrow_decode<D: bincode::de::BorrowDecoder<'de, Context = Context>>(decoder: &mut D) -> std::result::Result<Self, bincode::error::DecodeError> {
        let mz: Vec<f64> = bincode::BorrowDecode::borrow_decode(decoder)?;
        let intensity: Vec<f64> = bincode::BorrowDecode::borrow_decode(decoder)?;
        Ok(Signal::new(mz, intensity))
    }
}

impl Signal {
    /// Creates a signal without validating the columns.
    ///
    /// # Examples
    ///
    /// ```
    /// use mzcalc::data::signal::Signal;
    ///
    /// let signal = Signal::new(vec![100.0, 100.1], vec![1.0, 2.0]);
    /// assert_eq!(signal.len(), 2);
    /// assert_eq!(signal.point(1), (100.1, 2.0));
    /// ```
    pub fn new(mz: Vec<f64>, intensity: Vec<f64>) -> Self {
        Signal {
            mz: Arc::new(mz),
            intensity: Arc::new(intensity),
        }
    }

    /// Creates a signal, checking column lengths and the m/z order.
    pub fn try_new(mz: Vec<f64>, intensity: Vec<f64>) -> Result<Self> {
        if mz.len() != intensity.len() {
            return Err(Error::Input(format!(
                "m/z and intensity lengths differ ({} != {})",
                mz.len(),
                intensity.len()
            )));
        }
        if mz.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err(Error::Input("m/z values must be in ascending order".to_string()));
        }
        Ok(Signal::new(mz, intensity))
    }

    pub fn from_pairs(points: &[(f64, f64)]) -> Self {
        let (mz, intensity) = points.iter().copied().unzip();
        Signal::new(mz, intensity)
    }

    pub fn len(&self) -> usize {
        self.mz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mz.is_empty()
    }

    pub fn point(&self, index: usize) -> (f64, f64) {
        (self.mz[index], self.intensity[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.mz.iter().copied().zip(self.intensity.iter().copied())
    }

    fn ensure_not_empty(&self) -> Result<()> {
        if self.is_empty() {
            Err(Error::Input("signal contains no data".to_string()))
        } else {
            Ok(())
        }
    }

    /// index of the first point with m/z greater than `x`
    ///
    /// Arguments:
    ///
    /// * `x` - searched m/z value
    ///
    /// Returns:
    ///
    /// * `usize` - insertion index, `len()` if every point lies at or below `x`
    ///
    /// # Examples
    ///
    /// ```
    /// use mzcalc::data::signal::Signal;
    ///
    /// let signal = Signal::new(vec![1.0, 2.0, 3.0], vec![0.0, 1.0, 0.0]);
    /// assert_eq!(signal.locate(0.5), 0);
    /// assert_eq!(signal.locate(2.5), 2);
    /// assert_eq!(signal.locate(5.0), 3);
    /// ```
    pub fn locate(&self, x: f64) -> usize {
        self.mz.partition_point(|&value| value <= x)
    }

    /// Index of the most intense point.
    pub fn basepeak(&self) -> Result<usize> {
        self.ensure_not_empty()?;
        let mut index = 0;
        for (i, &value) in self.intensity.iter().enumerate() {
            if value > self.intensity[index] {
                index = i;
            }
        }
        Ok(index)
    }

    /// (min m/z, min intensity, max m/z, max intensity)
    pub fn boundaries(&self) -> Result<(f64, f64, f64, f64)> {
        self.ensure_not_empty()?;
        let (min_y, max_y) = self
            .intensity
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &y| (lo.min(y), hi.max(y)));
        Ok((self.mz[0], min_y, self.mz[self.len() - 1], max_y))
    }

    /// Local maxima as (m/z, intensity). Plateaus report their first point.
    pub fn maxima(&self) -> Vec<(f64, f64)> {
        let mut maxima = Vec::new();
        if self.is_empty() {
            return maxima;
        }
        let mut rising = false;
        let mut current = self.point(0);
        for point in self.iter() {
            if point.1 > current.1 {
                rising = true;
            } else if point.1 < current.1 && rising {
                maxima.push(current);
                rising = false;
            }
            current = point;
        }
        maxima
    }

    /// Interpolated intensity at `x`, 0 outside the sampled range.
    ///
    /// # Examples
    ///
    /// ```
    /// use mzcalc::data::signal::Signal;
    ///
    /// let signal = Signal::new(vec![1.0, 2.0, 3.0], vec![0.0, 10.0, 0.0]);
    /// assert_eq!(signal.intensity(1.5).unwrap(), 5.0);
    /// assert_eq!(signal.intensity(0.5).unwrap(), 0.0);
    /// ```
    pub fn intensity(&self, x: f64) -> Result<f64> {
        self.ensure_not_empty()?;
        let idx = self.locate(x);
        if idx == 0 || idx == self.len() {
            return Ok(0.0);
        }
        Ok(interpolate_y(self.point(idx - 1), self.point(idx), x))
    }

    // walk outwards from idx while the intensity stays above height
    pub(crate) fn walk(&self, idx: usize, height: f64) -> (usize, usize) {
        let mut left = idx - 1;
        while left > 0 && self.intensity[left] > height {
            left -= 1;
        }
        let mut right = idx;
        while right < self.len() - 1 && self.intensity[right] > height {
            right += 1;
        }
        (left, right)
    }

    // interpolated m/z where the walk bounds cross height
    pub(crate) fn crossings(&self, left: usize, right: usize, height: f64) -> (f64, f64) {
        (
            interpolate_x(self.point(left), self.point(left + 1), height),
            interpolate_x(self.point(right - 1), self.point(right), height),
        )
    }

    /// centroid of the peak around `x` measured at `height`
    ///
    /// Arguments:
    ///
    /// * `x` - m/z value inside the peak
    /// * `height` - intensity at which the peak is cut
    ///
    /// Returns:
    ///
    /// * `f64` - mean of both crossing m/z values, 0 if `x` is outside the signal
    ///
    /// # Examples
    ///
    /// ```
    /// use mzcalc::data::signal::Signal;
    ///
    /// let signal = Signal::new(vec![0.0, 1.0, 2.0, 3.0, 4.0], vec![0.0, 5.0, 10.0, 5.0, 0.0]);
    /// assert!((signal.centroid(2.0, 7.5).unwrap() - 2.0).abs() < 1e-12);
    /// ```
    pub fn centroid(&self, x: f64, height: f64) -> Result<f64> {
        self.ensure_not_empty()?;
        let idx = self.locate(x);
        if idx == 0 || idx == self.len() {
            return Ok(0.0);
        }
        let (left, right) = self.walk(idx, height);
        if left == right {
            return Ok(self.mz[left]);
        }
        let (left_mz, right_mz) = self.crossings(left, right, height);
        Ok((left_mz + right_mz) / 2.0)
    }

    /// Width of the peak around `x` measured at `height`.
    pub fn width(&self, x: f64, height: f64) -> Result<f64> {
        self.ensure_not_empty()?;
        let idx = self.locate(x);
        if idx == 0 || idx == self.len() {
            return Ok(0.0);
        }
        let (left, right) = self.walk(idx, height);
        if left == right {
            return Ok(0.0);
        }
        let (left_mz, right_mz) = self.crossings(left, right, height);
        Ok((right_mz - left_mz).abs())
    }

    /// Trapezoid area, optionally cropped and baseline corrected first.
    pub fn area(&self, range: Option<(f64, f64)>, baseline: Option<&Baseline>) -> f64 {
        if let Some((min_x, max_x)) = range {
            if min_x == max_x {
                return 0.0;
            }
        }
        let cropped = match range {
            Some((min_x, max_x)) => self.crop(min_x, max_x),
            None => self.clone(),
        };
        let signal = match baseline {
            Some(baseline) => cropped.subbase(baseline),
            None => cropped,
        };
        signal
            .iter()
            .tuple_windows()
            .map(|((x1, y1), (x2, y2))| y1 * (x2 - x1) + (y2 - y1) * (x2 - x1) / 2.0)
            .sum()
    }

    /// noise level and width of the signal
    ///
    /// Arguments:
    ///
    /// * `range` - part of the signal to use
    ///
    /// Returns:
    ///
    /// * `(f64, f64)` - median intensity and twice the median absolute deviation
    ///
    /// # Examples
    ///
    /// ```
    /// use mzcalc::data::signal::{NoiseRange, Signal};
    ///
    /// let signal = Signal::new(vec![1.0, 2.0, 3.0, 4.0, 5.0], vec![1.0, 2.0, 3.0, 4.0, 100.0]);
    /// assert_eq!(signal.noise(NoiseRange::Whole), (3.0, 2.0));
    /// ```
    pub fn noise(&self, range: NoiseRange) -> (f64, f64) {
        let (i1, i2) = match range {
            NoiseRange::Whole => (0, self.len()),
            NoiseRange::Range(min_x, max_x) => (self.locate(min_x), self.locate(max_x)),
            NoiseRange::Around { x, window } => {
                let window = x * window;
                (self.locate(x - window), self.locate(x + window))
            }
        };
        if i1 >= i2 {
            return (0.0, 0.0);
        }
        noise_of(&self.intensity[i1..i2])
    }

    /// noise baseline of the signal
    ///
    /// Arguments:
    ///
    /// * `window` - relative noise window; `None` gives one segment over the whole signal
    /// * `offset` - level shift relative to the noise width
    ///
    /// Returns:
    ///
    /// * `Baseline` - rows of (x, level, width)
    pub fn baseline(&self, window: Option<f64>, offset: f64) -> Result<Baseline> {
        self.ensure_not_empty()?;
        let (first, last) = (self.mz[0], self.mz[self.len() - 1]);

        let Some(window) = window else {
            let (level, width) = self.noise(NoiseRange::Whole);
            let level = level - width * offset;
            return Ok(Baseline::new(vec![
                BaselinePoint { x: first, level, width },
                BaselinePoint { x: last, level, width },
            ]));
        };

        let minimum = first.max(0.0);
        let mut raster = Vec::new();
        let mut x = last;
        while x > minimum {
            raster.push(x);
            x -= (x * window).max(50.0);
        }
        raster.push(minimum);
        raster.reverse();

        let mut levels = Vec::with_capacity(raster.len());
        let mut widths = Vec::with_capacity(raster.len());
        for &x in &raster {
            let i1 = self.locate(x - x * window);
            let i2 = self.locate(x + x * window);
            let (level, width) = if i1 == i2 {
                (self.intensity[i1.min(self.len() - 1)], 0.0)
            } else if i1 > i2 {
                (0.0, 0.0)
            } else {
                noise_of(&self.intensity[i1..i2])
            };
            levels.push(level);
            widths.push(width);
        }

        let smoothing = 5.0 * window * (last - first);
        let levels = Signal::new(raster.clone(), levels).movaver(smoothing, 2, MovingAverageStyle::Gaussian)?;
        let widths = Signal::new(raster.clone(), widths).movaver(smoothing, 2, MovingAverageStyle::Gaussian)?;

        let points = raster
            .iter()
            .zip(levels.intensity.iter().zip(widths.intensity.iter()))
            .map(|(&x, (&level, &width))| {
                let width = width.abs();
                BaselinePoint { x, level: (level - width * offset).max(0.0), width }
            })
            .collect();
        Ok(Baseline { points })
    }

    /// crop the signal to an m/z range, interpolating the edges
    ///
    /// # Examples
    ///
    /// ```
    /// use mzcalc::data::signal::Signal;
    ///
    /// let signal = Signal::new(vec![0.0, 1.0, 2.0, 3.0], vec![0.0, 5.0, 10.0, 5.0]);
    /// let cropped = signal.crop(2.5, 0.5);
    /// assert_eq!(*cropped.mz, vec![0.5, 1.0, 2.0, 2.5]);
    /// assert_eq!(*cropped.intensity, vec![2.5, 5.0, 10.0, 7.5]);
    /// ```
    pub fn crop(&self, min_x: f64, max_x: f64) -> Signal {
        let (min_x, max_x) = if min_x > max_x { (max_x, min_x) } else { (min_x, max_x) };
        if self.is_empty() || self.mz[self.len() - 1] < min_x || self.mz[0] > max_x {
            return Signal::default();
        }

        let idx1 = self.locate(min_x);
        let idx2 = self.locate(max_x);
        let mut mz = Vec::with_capacity(idx2 - idx1 + 2);
        let mut intensity = Vec::with_capacity(idx2 - idx1 + 2);

        if idx1 > 0 && idx1 < self.len() {
            mz.push(min_x);
            intensity.push(interpolate_y(self.point(idx1 - 1), self.point(idx1), min_x));
        }
        mz.extend_from_slice(&self.mz[idx1..idx2]);
        intensity.extend_from_slice(&self.intensity[idx1..idx2]);
        if idx2 > 0 && idx2 < self.len() && self.mz[idx2 - 1] != max_x {
            mz.push(max_x);
            intensity.push(interpolate_y(self.point(idx2 - 1), self.point(idx2), max_x));
        }

        Signal::new(mz, intensity)
    }

    pub fn offset(&self, x: f64, y: f64) -> Signal {
        Signal::new(
            self.mz.iter().map(|value| value + x).collect(),
            self.intensity.iter().map(|value| value + y).collect(),
        )
    }

    pub fn multiply(&self, x: f64, y: f64) -> Signal {
        Signal::new(
            self.mz.iter().map(|value| value * x).collect(),
            self.intensity.iter().map(|value| value * y).collect(),
        )
    }

    /// Scales intensities so the maximum becomes 1.
    pub fn normalize(&self) -> Result<Signal> {
        if self.is_empty() {
            return Ok(Signal::default());
        }
        let maximum = self.intensity.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if maximum == 0.0 {
            return Err(Error::Numeric("cannot normalize signal with zero maximum".to_string()));
        }
        Ok(Signal {
            mz: self.mz.clone(),
            intensity: Arc::new(self.intensity.iter().map(|value| value / maximum).collect()),
        })
    }

    /// smooth the signal
    ///
    /// Arguments:
    ///
    /// * `method` - smoothing filter
    /// * `window` - window size in m/z units
    /// * `cycles` - number of repeated passes
    ///
    /// Returns:
    ///
    /// * `Signal` - smoothed copy with the same m/z raster
    pub fn smooth(&self, method: SmoothingMethod, window: f64, cycles: usize) -> Result<Signal> {
        match method {
            SmoothingMethod::MovingAverage => self.movaver(window, cycles, MovingAverageStyle::Flat),
            SmoothingMethod::Gaussian => self.movaver(window, cycles, MovingAverageStyle::Gaussian),
            SmoothingMethod::SavitzkyGolay => self.savgol(window, cycles, 3),
        }
    }

    // m/z window converted to a number of points, a single point without m/z span
    fn window_points(&self, window: f64) -> usize {
        let span = match (self.mz.first(), self.mz.last()) {
            (Some(first), Some(last)) => last - first,
            _ => return 1,
        };
        if span <= 0.0 || !span.is_finite() {
            return 1;
        }
        (window * self.len() as f64 / span) as usize
    }

    /// Moving average with reflected edges.
    pub fn movaver(&self, window: f64, cycles: usize, style: MovingAverageStyle) -> Result<Signal> {
        if self.len() < 3 {
            return Ok(self.clone());
        }
        let n = self.len();
        let mut points = self.window_points(window).min(n);
        if points < 3 {
            return Ok(self.clone());
        }
        if points % 2 == 0 {
            points -= 1;
        }

        let weights: Vec<f64> = match style {
            MovingAverageStyle::Flat => vec![1.0; points],
            MovingAverageStyle::Gaussian => {
                let spread = (points as f64 / 4.0).powi(2);
                (0..points)
                    .map(|i| {
                        let r = i as f64 - (points - 1) as f64 / 2.0;
                        (-(r * r / spread)).exp()
                    })
                    .collect()
            }
        };
        let total: f64 = weights.iter().sum();
        let weights: Vec<f64> = weights.iter().map(|weight| weight / total).collect();
        let half = (points - 1) / 2;

        let mut values = self.intensity.to_vec();
        for _ in 0..cycles {
            stopper::check()?;
            let padded: Vec<f64> = values[1..points]
                .iter()
                .rev()
                .chain(values.iter())
                .chain(values[n - points..n - 1].iter().rev())
                .copied()
                .collect();
            values = (0..n)
                .map(|i| {
                    weights
                        .iter()
                        .zip(&padded[i + half..i + half + points])
                        .map(|(weight, value)| weight * value)
                        .sum()
                })
                .collect();
        }

        Ok(Signal {
            mz: self.mz.clone(),
            intensity: Arc::new(values),
        })
    }

    /// Savitzky-Golay filter, edges padded with the first and last intensity.
    pub fn savgol(&self, window: f64, cycles: usize, order: usize) -> Result<Signal> {
        if self.len() < 2 {
            return Ok(self.clone());
        }
        let points = self.window_points(window);
        if points <= order {
            return Ok(self.clone());
        }

        let half = (points - 1) / 2;
        let size = 2 * half + 1;
        let vandermonde = DMatrix::from_fn(size, order + 1, |row, col| {
            (row as f64 - half as f64).powi(col as i32)
        });
        let inverse = vandermonde
            .pseudo_inverse(1e-12)
            .map_err(|e| Error::Numeric(format!("Savitzky-Golay coefficients: {}", e)))?;
        let coefficients: Vec<f64> = inverse.row(0).iter().copied().collect();

        let mut values = self.intensity.to_vec();
        for _ in 0..cycles {
            stopper::check()?;
            let (first, last) = (values[0], values[values.len() - 1]);
            let padded: Vec<f64> = repeat(first)
                .take(half)
                .chain(values.iter().copied())
                .chain(repeat(last).take(half))
                .collect();
            values = (0..values.len())
                .map(|i| {
                    coefficients
                        .iter()
                        .zip(&padded[i..i + size])
                        .map(|(weight, value)| weight * value)
                        .sum()
                })
                .collect();
        }

        Ok(Signal {
            mz: self.mz.clone(),
            intensity: Arc::new(values),
        })
    }

    // merge two rasters; `both` combines (a, b) where both are known, `lone` maps an uncovered b
    fn merge<F, G>(&self, other: &Signal, both: F, lone: G) -> Signal
    where
        F: Fn(f64, f64) -> f64,
        G: Fn(f64) -> f64,
    {
        let (len_a, len_b) = (self.len(), other.len());
        let mut mz = Vec::with_capacity(len_a + len_b);
        let mut intensity = Vec::with_capacity(len_a + len_b);
        let (mut i, mut j) = (0, 0);

        while i < len_a || j < len_b {
            if i < len_a && j < len_b {
                let (xa, ya) = self.point(i);
                let (xb, yb) = other.point(j);
                if xa < xb {
                    mz.push(xa);
                    intensity.push(if j > 0 {
                        both(ya, interpolate_y(other.point(j - 1), other.point(j), xa))
                    } else {
                        ya
                    });
                    i += 1;
                } else if xa > xb {
                    mz.push(xb);
                    intensity.push(if i > 0 {
                        both(interpolate_y(self.point(i - 1), self.point(i), xb), yb)
                    } else {
                        lone(yb)
                    });
                    j += 1;
                } else {
                    mz.push(xa);
                    intensity.push(both(ya, yb));
                    i += 1;
                    j += 1;
                }
            } else if i < len_a {
                mz.push(self.mz[i]);
                intensity.push(self.intensity[i]);
                i += 1;
            } else {
                mz.push(other.mz[j]);
                intensity.push(lone(other.intensity[j]));
                j += 1;
            }
        }

        Signal::new(mz, intensity)
    }

    /// Unified raster with summed intensities.
    pub fn combine(&self, other: &Signal) -> Signal {
        self.merge(other, |a, b| a + b, |b| b)
    }

    /// Unified raster with the higher intensity.
    pub fn overlay(&self, other: &Signal) -> Signal {
        self.merge(other, f64::max, |b| b)
    }

    /// Unified raster with `self - other`.
    pub fn subtract(&self, other: &Signal) -> Signal {
        self.merge(other, |a, b| a - b, |b| -b)
    }

    /// subtract a baseline without changing the raster
    ///
    /// Negative intensities are clipped to 0.
    ///
    /// # Examples
    ///
    /// ```
    /// use mzcalc::data::signal::{Baseline, Signal};
    ///
    /// let signal = Signal::new(vec![1.0, 2.0, 3.0], vec![2.0, 4.0, 6.0]);
    /// let corrected = signal.subbase(&Baseline::constant(3.0));
    /// assert_eq!(*corrected.intensity, vec![0.0, 1.0, 3.0]);
    /// ```
    pub fn subbase(&self, baseline: &Baseline) -> Signal {
        if self.is_empty() || baseline.is_empty() {
            return self.clone();
        }

        let rows = baseline.points();
        let mut values = self.intensity.to_vec();
        if rows.len() == 1 {
            values.iter_mut().for_each(|value| *value -= rows[0].level);
        } else {
            let segment = |j: usize| {
                let (p1, p2) = (rows[j - 1], rows[j]);
                let a = (p2.level - p1.level) / (p2.x - p1.x);
                (a, p1.level - a * p1.x)
            };
            let mut j = 1;
            let (mut a, mut b) = segment(j);
            for (value, &x) in values.iter_mut().zip(self.mz.iter()) {
                if x > rows[j].x && j < rows.len() - 1 {
                    j += 1;
                    (a, b) = segment(j);
                }
                *value -= a * x + b;
            }
        }
        values.iter_mut().filter(|value| **value < 0.0).for_each(|value| *value = 0.0);

        Signal {
            mz: self.mz.clone(),
            intensity: Arc::new(values),
        }
    }
}

impl Display for Signal {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self.basepeak() {
            Ok(index) => write!(
                f,
                "Signal(data points: {}, max by intensity: ({:.4}, {}))",
                self.len(),
                self.mz[index],
                self.intensity[index]
            ),
            Err(_) => write!(f, "Signal(data points: 0)"),
        }
    }
}

impl std::ops::Add for Signal {
    type Output = Self;
    fn add(self, other: Self) -> Signal {
        self.combine(&other)
    }
}

impl std::ops::Sub for Signal {
    type Output = Self;
    fn sub(self, other: Self) -> Signal {
        self.subtract(&other)
    }
}

impl std::ops::Mul<f64> for Signal {
    type Output = Self;
    fn mul(self, scale: f64) -> Self::Output {
        let scaled: Vec<f64> = self.intensity.iter().map(|i| scale * i).collect();
        Signal { mz: self.mz.clone(), intensity: Arc::new(scaled) }
    }
}
