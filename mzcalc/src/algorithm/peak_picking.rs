use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::algorithm::isotope::{pattern, PatternConfig};
use crate::chemistry::compound::Compound;
use crate::chemistry::constants::{AVERAGE_AMINO, ISOTOPE_DISTANCE};
use crate::chemistry::elements::table;
use crate::chemistry::formulas::{mz, Agent, MassType};
use crate::data::peak::Peak;
use crate::data::peak_list::PeakList;
use crate::data::signal::{Baseline, NoiseRange, Signal};
use crate::error::{Error, FormulaError, Result};
use crate::stopper;

/// Thresholds and centroiding height used by [`label_scan`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Fraction of the peak height at which the centroid is taken, 1 keeps the raw maxima.
    pub picking_height: f64,
    pub abs_threshold: f64,
    pub rel_threshold: f64,
    pub sn_threshold: f64,
    /// Optional (min, max) m/z window, the relative threshold then refers to its basepeak.
    #[serde(default)]
    pub range: Option<(f64, f64)>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            picking_height: 0.75,
            abs_threshold: 0.0,
            rel_threshold: 0.0,
            sn_threshold: 0.0,
            range: None,
        }
    }
}

impl ScanConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeisotopeConfig {
    /// Highest charge tried, a negative value searches negative charges.
    pub max_charge: i32,
    /// Absolute m/z tolerance of the isotope spacing.
    pub mz_tolerance: f64,
    /// Relative intensity tolerance against the averagine ratios.
    pub int_tolerance: f64,
    /// Correction added to the isotope distance (neutral mass).
    pub isotope_shift: f64,
}

impl Default for DeisotopeConfig {
    fn default() -> Self {
        DeisotopeConfig {
            max_charge: 1,
            mz_tolerance: 0.15,
            int_tolerance: 0.5,
            isotope_shift: 0.0,
        }
    }
}

impl DeisotopeConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Intensity reported for a whole isotope envelope.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvelopeIntensity {
    #[default]
    Maximum,
    Sum,
    Average,
}

impl FromStr for EnvelopeIntensity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "maximum" => Ok(EnvelopeIntensity::Maximum),
            "sum" => Ok(EnvelopeIntensity::Sum),
            "average" => Ok(EnvelopeIntensity::Average),
            other => Err(Error::unknown("envelope intensity", other)),
        }
    }
}

/// label a single point of the signal
///
/// Arguments:
///
/// * `signal` - profile data
/// * `mz` - m/z value to label
/// * `baseline` - optional baseline, the local noise around `mz` is used without it
///
/// Returns:
///
/// * `Option<Peak>` - `None` if the interpolated intensity does not exceed the baseline
///
/// # Examples
///
/// ```
/// use mzcalc::algorithm::peak_picking::label_point;
/// use mzcalc::data::signal::{Baseline, Signal};
///
/// let signal = Signal::new(vec![99.0, 100.0, 101.0], vec![2.0, 10.0, 2.0]);
/// let peak = label_point(&signal, 100.0, Some(&Baseline::default())).unwrap();
/// assert_eq!(peak.intensity(), 10.0);
/// assert_eq!(peak.fwhm, Some(1.25));
/// ```
pub fn label_point(signal: &Signal, mz: f64, baseline: Option<&Baseline>) -> Option<Peak> {
    if signal.is_empty() || mz <= 0.0 {
        return None;
    }

    let ai = signal.intensity(mz).ok()?;
    if ai == 0.0 {
        return None;
    }

    let (base, noise) = match baseline {
        None => signal.noise(NoiseRange::Around { x: mz, window: 0.1 }),
        Some(baseline) => baseline.at(mz).unwrap_or((0.0, 0.0)),
    };
    if ai <= base {
        return None;
    }

    let mut peak = Peak::new(mz, ai).with_base(base);
    if noise != 0.0 {
        peak.sn = Some((ai - base) / noise);
    }
    let fwhm = signal.width(mz, base + (ai - base) * 0.5).ok()?;
    if fwhm != 0.0 {
        peak.fwhm = Some(fwhm);
    }
    Some(peak)
}

#[derive(Clone, Copy)]
enum Target {
    Point(f64),
    Range(f64, f64),
}

fn pick(signal: &Signal, target: Target, picking_height: f64, baseline: Option<&Baseline>) -> Option<Peak> {
    if signal.is_empty() {
        return None;
    }

    let imax = match target {
        Target::Point(mz) if mz > 0.0 => signal.locate(mz),
        Target::Range(min_x, max_x) if min_x > 0.0 => {
            let (i1, i2) = (signal.locate(min_x), signal.locate(max_x));
            if i1 < i2 {
                i1 + argmax(&signal.intensity[i1..i2])
            } else {
                i1
            }
        }
        _ => return None,
    };
    if imax == 0 || imax == signal.len() {
        return None;
    }

    let apex = signal.point(imax);
    let height = match baseline.and_then(|baseline| baseline.at(apex.0)) {
        Some((base, _)) => (apex.1 - base) * picking_height + base,
        None => apex.1 * picking_height,
    };

    let (left, right) = signal.walk(imax, height);
    let (left_mz, right_mz) = signal.crossings(left, right, height);

    match target {
        Target::Range(min_x, max_x) if left_mz != right_mz && (left_mz < min_x || right_mz > max_x) => None,
        Target::Point(_) if left_mz != right_mz => {
            pick(signal, Target::Range(left_mz, right_mz), picking_height, baseline)
        }
        _ => label_point(signal, (left_mz + right_mz) / 2.0, baseline),
    }
}

fn argmax(values: &[f64]) -> usize {
    let mut index = 0;
    for (i, &value) in values.iter().enumerate() {
        if value > values[index] {
            index = i;
        }
    }
    index
}

/// centroid the peak found at `mz`
///
/// The peak region is first found by walking from `mz`, its maximum is then centroided at
/// `picking_height` of the apex above the baseline.
///
/// Arguments:
///
/// * `signal` - profile data
/// * `mz` - m/z value inside the peak
/// * `picking_height` - centroiding height, 0.75 is the usual choice
/// * `baseline` - optional baseline
///
/// Returns:
///
/// * `Option<Peak>` - labelled peak or `None` if nothing was found
///
/// # Examples
///
/// ```
/// use mzcalc::algorithm::peak_picking::label_peak;
/// use mzcalc::data::signal::{Baseline, Signal};
///
/// let signal = Signal::new(vec![1.0, 2.0, 3.0, 4.0, 5.0], vec![0.0, 5.0, 10.0, 5.0, 0.0]);
/// let peak = label_peak(&signal, 2.2, 0.75, Some(&Baseline::default())).unwrap();
/// assert!((peak.mz - 3.0).abs() < 1e-12);
/// ```
pub fn label_peak(signal: &Signal, mz: f64, picking_height: f64, baseline: Option<&Baseline>) -> Option<Peak> {
    pick(signal, Target::Point(mz), picking_height, baseline)
}

/// Same as [`label_peak`] for the most intense point inside `min_x..max_x`.
pub fn label_range(
    signal: &Signal,
    min_x: f64,
    max_x: f64,
    picking_height: f64,
    baseline: Option<&Baseline>,
) -> Option<Peak> {
    pick(signal, Target::Range(min_x, max_x), picking_height, baseline)
}

// sets base and s/n from the baseline, returns the highest corrected intensity
fn apply_baseline(peaks: &mut [Peak], baseline: Option<&Baseline>) -> f64 {
    let mut basepeak = 0.0;
    let Some(baseline) = baseline else {
        return basepeak;
    };
    for peak in peaks.iter_mut() {
        if let Some((level, width)) = baseline.at(peak.mz) {
            peak.base = level;
            let intensity = peak.intensity();
            if width != 0.0 {
                peak.sn = Some(intensity / width);
            }
            if intensity > basepeak {
                basepeak = intensity;
            }
        }
    }
    basepeak
}

fn passes(peak: &Peak, threshold: f64, sn_threshold: f64) -> bool {
    let sn_ok = match peak.sn {
        Some(sn) if sn != 0.0 => sn >= sn_threshold,
        _ => true,
    };
    peak.mz > 0.0 && peak.intensity() >= threshold && sn_ok
}

/// centroid every peak of a signal
///
/// Local maxima passing the thresholds are centroided at `config.picking_height`; centroids
/// whose windows overlap are merged keeping the taller one.
///
/// Arguments:
///
/// * `signal` - profile data
/// * `config` - thresholds and picking height
/// * `baseline` - optional baseline used for peak bases and s/n
///
/// Returns:
///
/// * `PeakList` - centroided peaks with fwhm measured at half height
pub fn label_scan(signal: &Signal, config: &ScanConfig, baseline: Option<&Baseline>) -> Result<PeakList> {
    let cropped;
    let signal = match config.range {
        Some((min_x, max_x)) => {
            let i1 = signal.locate(min_x);
            let i2 = signal.locate(max_x).max(i1);
            cropped = Signal::new(signal.mz[i1..i2].to_vec(), signal.intensity[i1..i2].to_vec());
            &cropped
        }
        None => signal,
    };
    if signal.is_empty() {
        return Ok(PeakList::default());
    }

    let apex = signal.intensity[signal.basepeak()?];
    let threshold = (apex * config.rel_threshold).max(config.abs_threshold);
    let mut candidates: Vec<Peak> = signal
        .maxima()
        .into_iter()
        .filter(|point| point.1 >= threshold)
        .map(Peak::from)
        .collect();
    stopper::check()?;

    let basepeak = apply_baseline(&mut candidates, baseline);
    stopper::check()?;

    let threshold = (basepeak * config.rel_threshold).max(config.abs_threshold);
    candidates.retain(|peak| passes(peak, threshold, config.sn_threshold));

    if config.picking_height < 1.0 {
        let mut centroids: Vec<Peak> = Vec::with_capacity(candidates.len());
        let mut previous: Option<f64> = None;
        for mut peak in candidates {
            stopper::check()?;

            let height = peak.intensity() * config.picking_height + peak.base;
            let idx = signal.locate(peak.mz);
            if idx == 0 || idx == signal.len() {
                continue;
            }
            let (left, right) = signal.walk(idx, height);
            let (left_mz, right_mz) = signal.crossings(left, right, height);
            peak.mz = (left_mz + right_mz) / 2.0;

            let intensity = signal.intensity(peak.mz)?;
            if intensity == 0.0 || intensity > peak.ai {
                continue;
            }
            peak.ai = intensity;

            match (previous, centroids.last_mut()) {
                (Some(previous_right), Some(last)) if left_mz < previous_right => {
                    if peak.ai > last.ai {
                        *last = peak;
                        previous = Some(right_mz);
                    }
                }
                _ => {
                    centroids.push(peak);
                    previous = Some(right_mz);
                }
            }
        }
        candidates = centroids;
    }
    stopper::check()?;

    let basepeak = apply_baseline(&mut candidates, baseline);
    stopper::check()?;

    let threshold = (basepeak * config.rel_threshold).max(config.abs_threshold);
    let mut peaks = Vec::with_capacity(candidates.len());
    for mut peak in candidates {
        if !passes(&peak, threshold, config.sn_threshold) {
            continue;
        }
        let fwhm = signal.width(peak.mz, peak.base + peak.intensity() * 0.5)?;
        peak.fwhm = Some(fwhm).filter(|&fwhm| fwhm != 0.0);
        peaks.push(peak);
    }

    log::debug!("labelled {} peaks in {} points", peaks.len(), signal.len());
    Ok(PeakList::new(peaks))
}

// ai and s/n of an envelope peak scaled from its most intense isotope
fn envelope_intensity(isotopes: &PeakList, basepeak: &Peak, intensity: EnvelopeIntensity) -> (f64, Option<f64>) {
    let sum: f64 = isotopes.iter().map(|isotope| isotope.intensity()).sum();
    let ai = match intensity {
        EnvelopeIntensity::Sum => basepeak.base + sum,
        EnvelopeIntensity::Average => basepeak.base + sum / isotopes.len() as f64,
        EnvelopeIntensity::Maximum => basepeak.ai,
    };
    let sn = match basepeak.sn {
        Some(sn) if sn != 0.0 => Some((ai - basepeak.base) * sn / basepeak.intensity()),
        other => other,
    };
    (ai, sn)
}

/// Intensity weighted centroid of an isotope envelope.
///
/// The envelope width at `picking_height` of the most intense isotope becomes the fwhm.
///
/// # Examples
///
/// ```
/// use mzcalc::algorithm::peak_picking::{env_centroid, EnvelopeIntensity};
/// use mzcalc::data::peak_list::PeakList;
///
/// let isotopes = PeakList::from_pairs(&[(1000.0, 50.0), (1001.0, 100.0), (1002.0, 50.0)]);
/// let peak = env_centroid(&isotopes, 0.5, EnvelopeIntensity::Sum).unwrap().unwrap();
/// assert!((peak.mz - 1001.0).abs() < 1e-9);
/// assert_eq!(peak.ai, 200.0);
/// assert_eq!(peak.fwhm, Some(2.0));
/// ```
pub fn env_centroid(isotopes: &PeakList, picking_height: f64, intensity: EnvelopeIntensity) -> Result<Option<Peak>> {
    let Some(basepeak) = isotopes.basepeak() else {
        return Ok(None);
    };
    if isotopes.len() == 1 {
        return Ok(Some(basepeak.clone()));
    }

    let (sum_mz, sum_intensity) = isotopes.iter().fold((0.0, 0.0), |(mz, total), isotope| {
        (mz + isotope.mz * isotope.intensity(), total + isotope.intensity())
    });
    if sum_intensity == 0.0 {
        return Err(Error::Numeric("isotope envelope has no intensity".to_string()));
    }

    let (ai, sn) = envelope_intensity(isotopes, basepeak, intensity);

    let min_intensity = basepeak.intensity() * picking_height;
    let above: Vec<usize> = (0..isotopes.len())
        .filter(|&i| isotopes[i].intensity() >= min_intensity)
        .collect();
    let mut fwhm = basepeak.fwhm;
    if let (Some(&i1), Some(&i2)) = (above.first(), above.last()) {
        let point = |i: usize| (isotopes[i].mz, isotopes[i].intensity());
        let mut mz1 = isotopes[i1].mz;
        let mut mz2 = isotopes[i2].mz;
        if i1 != 0 {
            mz1 = crate::data::signal::interpolate_x(point(i1 - 1), point(i1), min_intensity);
        }
        if i2 < isotopes.len() - 1 {
            mz2 = crate::data::signal::interpolate_x(point(i2), point(i2 + 1), min_intensity);
        }
        if mz1 != mz2 {
            fwhm = Some((mz2 - mz1).abs());
        }
    }

    let mut peak = Peak::new(sum_mz / sum_intensity, ai).with_base(basepeak.base);
    peak.sn = sn;
    peak.fwhm = fwhm;
    Ok(Some(peak))
}

/// monoisotopic peak of an isotope envelope
///
/// An averagine pattern of the same m/z and charge is aligned to the envelope by their
/// centroids; the isotope closest to the aligned averagine basepeak is shifted back to the
/// averagine monoisotopic position.
///
/// Arguments:
///
/// * `isotopes` - envelope peaks
/// * `charge` - envelope charge
/// * `intensity` - reported envelope intensity
///
/// Returns:
///
/// * `Option<Peak>` - monoisotopic peak with isotope index 0, `None` for an empty envelope
pub fn env_mono(isotopes: &PeakList, charge: i32, intensity: EnvelopeIntensity) -> Result<Option<Peak>> {
    let Some(basepeak) = isotopes.basepeak() else {
        return Ok(None);
    };

    let formula = averagine(basepeak.mz, charge, &AVERAGE_AMINO)?;
    let config = PatternConfig {
        fwhm: 0.1,
        threshold: 0.001,
        charge,
        ..PatternConfig::default()
    };
    let model = PeakList::from_pairs(pattern(&formula, &config)?.entries());
    let Some(model_basepeak) = model.basepeak() else {
        return Ok(None);
    };

    let envelope = Signal::from_pairs(&isotopes.iter().map(|p| (p.mz, p.intensity())).collect::<Vec<_>>());
    let centroid = label_peak(&envelope, basepeak.mz, 0.8, None).map_or(basepeak.mz, |peak| peak.mz);
    let model_signal = Signal::from_pairs(&model.iter().map(|p| (p.mz, p.intensity())).collect::<Vec<_>>());
    let model_centroid =
        label_peak(&model_signal, model_basepeak.mz, 0.8, None).map_or(model_basepeak.mz, |peak| peak.mz);

    let shift = centroid - model_centroid;
    let closest = isotopes
        .iter()
        .map(|p| ((p.mz - model_basepeak.mz - shift).abs(), p.mz))
        .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)))
        .map_or(basepeak.mz, |(_, mz)| mz);
    let mono = formula.mz(charge, &Agent::proton(), 1).0;

    let (ai, sn) = envelope_intensity(isotopes, basepeak, intensity);
    let mut peak = Peak::new(closest - (model_basepeak.mz - mono), ai).with_base(basepeak.base);
    peak.sn = sn;
    peak.fwhm = basepeak.fwhm;
    peak.isotope = Some(0);
    Ok(Some(peak))
}

/// assign charges and isotope indices
///
/// Peaks are walked in m/z order. For every unassigned peak the charges from `max_charge`
/// towards 1 are tried: a cluster of peaks spaced by the isotope distance over the charge is
/// collected and its intensities are checked against the averagine lookup ratios.
///
/// Arguments:
///
/// * `peaklist` - centroided peaks
/// * `config` - charge range and tolerances
///
/// Returns:
///
/// * `PeakList` - copy of the peaks with `charge` and `isotope` assigned where found
pub fn deisotope(peaklist: &PeakList, config: &DeisotopeConfig) -> Result<PeakList> {
    let mut peaks: Vec<Peak> = peaklist
        .iter()
        .cloned()
        .map(|mut peak| {
            peak.charge = None;
            peak.isotope = None;
            peak
        })
        .collect();

    let charges: Vec<i32> = if config.max_charge < 0 {
        (config.max_charge..=-1).collect()
    } else {
        (1..=config.max_charge).rev().collect()
    };
    let proton = Agent::proton();

    for x in 0..peaks.len() {
        stopper::check()?;

        if peaks[x].isotope.is_some() {
            continue;
        }

        for &z in &charges {
            let difference = (ISOTOPE_DISTANCE + config.isotope_shift) / z.abs() as f64;
            let mut cluster = vec![x];
            for y in x + 1..peaks.len() {
                let last = cluster[cluster.len() - 1];
                let error = peaks[y].mz - peaks[last].mz - difference;
                if error.abs() <= config.mz_tolerance {
                    cluster.push(y);
                } else if error > config.mz_tolerance {
                    break;
                }
            }
            if cluster.len() == 1 {
                continue;
            }

            let mass = mz(peaks[x].mz, 0, z, &proton, 1, MassType::Monoisotopic);
            let expected = lookup_pattern(mass);
            let minimum = expected.iter().filter(|&&abundance| abundance >= 0.33).count();
            if cluster.len() < minimum && z.abs() > 1 {
                continue;
            }

            let mut valid = true;
            for isotope in 1..expected.len().min(cluster.len()) {
                let theoretical = peaks[cluster[isotope - 1]].intensity() / expected[isotope - 1] * expected[isotope];
                let error = peaks[cluster[isotope]].intensity() - theoretical;
                if error.abs() <= theoretical * config.int_tolerance {
                    let member = &mut peaks[cluster[isotope]];
                    member.isotope = Some(isotope as i32);
                    member.charge = Some(z);
                } else if error < 0.0 && isotope == 1 {
                    valid = false;
                    break;
                }
            }

            if valid {
                peaks[x].isotope = Some(0);
                peaks[x].charge = Some(z);
                log::debug!("peak {:.4} assigned charge {}", peaks[x].mz, z);
                break;
            }
        }
    }

    Ok(PeakList::new(peaks))
}

/// recalculate charged peaks to singly charged m/z
///
/// Uncharged peaks are dropped, singly charged ones kept. Bases and s/n are reset since they
/// no longer describe the recalculated positions.
///
/// # Examples
///
/// ```
/// use mzcalc::algorithm::peak_picking::deconvolute;
/// use mzcalc::chemistry::formulas::MassType;
/// use mzcalc::data::peak::Peak;
/// use mzcalc::data::peak_list::PeakList;
///
/// let peaks = PeakList::new(vec![Peak::new(500.5, 10.0).with_charge(2), Peak::new(700.0, 5.0)]);
/// let singly = deconvolute(&peaks, MassType::Monoisotopic).unwrap();
/// assert_eq!(singly.len(), 1);
/// assert_eq!(singly[0].charge, Some(1));
/// assert!((singly[0].mz - 999.9927).abs() < 1e-3);
/// ```
pub fn deconvolute(peaklist: &PeakList, mass_type: MassType) -> Result<PeakList> {
    let proton = Agent::proton();
    let mut peaks = Vec::with_capacity(peaklist.len());
    for peak in peaklist.iter() {
        stopper::check()?;

        let charge = match peak.charge {
            Some(charge) if charge != 0 => charge,
            _ => continue,
        };

        let mut peak = peak.clone();
        if charge.abs() != 1 {
            if let Some(fwhm) = peak.fwhm.filter(|&fwhm| fwhm != 0.0) {
                peak.fwhm = Some((fwhm * charge as f64).abs());
            }
            let target = charge.signum();
            peak.mz = mz(peak.mz, target, charge, &proton, 1, mass_type);
            peak.charge = Some(target);
        }
        peaks.push(peak);
    }

    for peak in peaks.iter_mut() {
        peak.sn = None;
        peak.ai = peak.intensity();
        peak.base = 0.0;
    }
    Ok(PeakList::new(peaks))
}

/// average formula for a given m/z
///
/// Arguments:
///
/// * `mz` - peak m/z
/// * `charge` - peak charge, 0 for a neutral mass
/// * `composition` - building block, e.g. [`AVERAGE_AMINO`]
///
/// Returns:
///
/// * `Compound` - whole building blocks padded with hydrogens to the neutral average mass
///
/// # Examples
///
/// ```
/// use mzcalc::algorithm::peak_picking::averagine;
/// use mzcalc::chemistry::constants::AVERAGE_AMINO;
///
/// let formula = averagine(1000.0, 0, &AVERAGE_AMINO).unwrap();
/// assert!((formula.avg_mass() - 1000.0).abs() < 1.0);
/// ```
pub fn averagine(mz_value: f64, charge: i32, composition: &[(&str, f64)]) -> Result<Compound> {
    let elements = table();
    let average = |symbol: &str| {
        elements
            .get(symbol)
            .map(|element| element.avg_mass())
            .ok_or_else(|| FormulaError::UnknownElement {
                symbol: symbol.to_string(),
                formula: symbol.to_string(),
            })
    };

    let mut block_mass = 0.0;
    for &(symbol, count) in composition {
        block_mass += average(symbol)? * count;
    }

    let neutral_mass = mz(mz_value, 0, charge, &Agent::proton(), 1, MassType::Average);
    let count = (neutral_mass / block_mass).max(1.0);

    let expression: String = composition
        .iter()
        .map(|&(symbol, atoms)| format!("{}{}", symbol, (atoms * count) as i64))
        .collect();
    let mut formula = Compound::new(&expression)?;

    let hydrogen = average("H")?;
    let hydrogens = (((neutral_mass - formula.avg_mass()) / hydrogen).round() as i32).max(-formula.count("H", false));
    if hydrogens != 0 {
        formula.append(&format!("H{}", hydrogens))?;
    }
    Ok(formula)
}

/// Relative averagine isotope abundances for a neutral mass, 200 Da buckets up to 15 kDa.
pub fn lookup_pattern(mass: f64) -> &'static [f64] {
    let bucket = (mass.max(0.0) as usize).min(15000) / 200;
    PATTERN_LOOKUP[bucket]
}

// amino averagine patterns, fwhm 0.1 and threshold 0.001, one row per 200 Da
static PATTERN_LOOKUP: [&[f64]; 76] = [
    &[1.000, 0.059, 0.003], // 0
    &[1.000, 0.122, 0.013], // 200
    &[1.000, 0.241, 0.040, 0.005], // 400
    &[1.000, 0.303, 0.059, 0.008], // 600
    &[1.000, 0.426, 0.109, 0.020, 0.003], // 800
    &[1.000, 0.533, 0.166, 0.038, 0.006], // 1000
    &[1.000, 0.655, 0.244, 0.066, 0.014, 0.002], // 1200
    &[1.000, 0.786, 0.388, 0.143, 0.042, 0.009, 0.001], // 1400
    &[1.000, 0.845, 0.441, 0.171, 0.053, 0.013, 0.002], // 1600
    &[1.000, 0.967, 0.557, 0.236, 0.080, 0.021, 0.005], // 1800
    &[0.921, 1.000, 0.630, 0.291, 0.107, 0.032, 0.007, 0.001], // 2000
    &[0.828, 1.000, 0.687, 0.343, 0.136, 0.044, 0.011, 0.002], // 2200
    &[0.752, 1.000, 0.744, 0.400, 0.171, 0.060, 0.017, 0.004], // 2400
    &[0.720, 1.000, 0.772, 0.428, 0.188, 0.068, 0.020, 0.005], // 2600
    &[0.667, 1.000, 0.825, 0.487, 0.228, 0.088, 0.028, 0.007], // 2800
    &[0.616, 1.000, 0.884, 0.556, 0.276, 0.113, 0.039, 0.010, 0.002], // 3000
    &[0.574, 1.000, 0.941, 0.628, 0.330, 0.143, 0.052, 0.015, 0.003], // 3200
    &[0.536, 0.999, 1.000, 0.706, 0.392, 0.179, 0.069, 0.022, 0.005], // 3400
    &[0.506, 0.972, 1.000, 0.725, 0.412, 0.193, 0.077, 0.025, 0.006], // 3600
    &[0.449, 0.919, 1.000, 0.764, 0.457, 0.226, 0.094, 0.033, 0.009, 0.001], // 3800
    &[0.392, 0.853, 1.000, 0.831, 0.543, 0.295, 0.136, 0.053, 0.017, 0.004], // 4000
    &[0.353, 0.812, 1.000, 0.869, 0.593, 0.336, 0.162, 0.067, 0.023, 0.006], // 4200
    &[0.321, 0.776, 1.000, 0.907, 0.644, 0.379, 0.190, 0.082, 0.030, 0.009], // 4400
    &[0.308, 0.760, 1.000, 0.924, 0.669, 0.401, 0.205, 0.090, 0.033, 0.011, 0.001], // 4600
    &[0.282, 0.729, 1.000, 0.962, 0.723, 0.451, 0.239, 0.110, 0.042, 0.014, 0.003], // 4800
    &[0.258, 0.699, 1.000, 1.000, 0.780, 0.504, 0.277, 0.132, 0.053, 0.018, 0.004], // 5000
    &[0.228, 0.645, 0.962, 1.000, 0.809, 0.542, 0.308, 0.153, 0.065, 0.023, 0.007], // 5200
    &[0.203, 0.598, 0.927, 1.000, 0.839, 0.581, 0.343, 0.176, 0.078, 0.029, 0.010], // 5400
    &[0.192, 0.577, 0.911, 1.000, 0.854, 0.602, 0.361, 0.189, 0.086, 0.033, 0.011], // 5600
    &[0.171, 0.536, 0.880, 1.000, 0.884, 0.644, 0.399, 0.216, 0.102, 0.040, 0.014, 0.003], // 5800
    &[0.154, 0.501, 0.851, 1.000, 0.912, 0.686, 0.439, 0.244, 0.120, 0.050, 0.018, 0.004], // 6000
    &[0.139, 0.468, 0.823, 1.000, 0.942, 0.730, 0.482, 0.278, 0.141, 0.062, 0.023, 0.007], // 6200
    &[0.126, 0.441, 0.799, 1.000, 0.969, 0.772, 0.524, 0.310, 0.162, 0.073, 0.028, 0.009], // 6400
    &[0.121, 0.427, 0.787, 1.000, 0.983, 0.794, 0.547, 0.328, 0.174, 0.080, 0.031, 0.011], // 6600
    &[0.104, 0.381, 0.732, 0.971, 1.000, 0.848, 0.614, 0.390, 0.219, 0.109, 0.045, 0.016, 0.004], // 6800
    &[0.092, 0.349, 0.691, 0.944, 1.000, 0.872, 0.648, 0.422, 0.244, 0.125, 0.054, 0.020, 0.006], // 7000
    &[0.082, 0.321, 0.654, 0.919, 1.000, 0.894, 0.682, 0.456, 0.270, 0.143, 0.063, 0.024, 0.008], // 7200
    &[0.073, 0.296, 0.620, 0.895, 1.000, 0.917, 0.718, 0.492, 0.299, 0.162, 0.077, 0.030, 0.011], // 7400
    &[0.069, 0.284, 0.604, 0.884, 1.000, 0.929, 0.735, 0.509, 0.313, 0.172, 0.084, 0.033, 0.012], // 7600
    &[0.062, 0.262, 0.573, 0.861, 1.000, 0.952, 0.772, 0.548, 0.345, 0.195, 0.098, 0.040, 0.015, 0.003], // 7800
    &[0.056, 0.243, 0.544, 0.839, 1.000, 0.976, 0.811, 0.589, 0.380, 0.220, 0.114, 0.049, 0.019, 0.005], // 8000
    &[0.051, 0.227, 0.521, 0.821, 1.000, 0.997, 0.846, 0.628, 0.413, 0.244, 0.130, 0.058, 0.022, 0.007], // 8200
    &[0.045, 0.206, 0.486, 0.786, 0.980, 1.000, 0.869, 0.660, 0.444, 0.268, 0.147, 0.070, 0.027, 0.010], // 8400
    &[0.042, 0.196, 0.468, 0.767, 0.968, 1.000, 0.879, 0.676, 0.460, 0.281, 0.156, 0.075, 0.030, 0.011], // 8600
    &[0.038, 0.179, 0.437, 0.733, 0.947, 1.000, 0.899, 0.705, 0.491, 0.307, 0.173, 0.086, 0.036, 0.013, 0.002], // 8800
    &[0.033, 0.163, 0.408, 0.701, 0.926, 1.000, 0.919, 0.736, 0.524, 0.335, 0.193, 0.099, 0.043, 0.016, 0.004], // 9000
    &[0.030, 0.149, 0.382, 0.670, 0.906, 1.000, 0.938, 0.768, 0.558, 0.364, 0.215, 0.113, 0.051, 0.020, 0.006], // 9200
    &[0.026, 0.132, 0.348, 0.629, 0.877, 1.000, 0.971, 0.823, 0.620, 0.420, 0.258, 0.143, 0.069, 0.028, 0.010], // 9400
    &[0.024, 0.126, 0.337, 0.616, 0.868, 1.000, 0.981, 0.839, 0.638, 0.437, 0.271, 0.153, 0.074, 0.031, 0.011], // 9600
    &[0.022, 0.116, 0.317, 0.592, 0.851, 1.000, 1.000, 0.872, 0.676, 0.472, 0.298, 0.172, 0.087, 0.037, 0.014, 0.002], // 9800
    &[0.020, 0.106, 0.294, 0.561, 0.822, 0.983, 1.000, 0.888, 0.700, 0.498, 0.320, 0.188, 0.099, 0.043, 0.017, 0.004], // 10000
    &[0.017, 0.096, 0.272, 0.529, 0.790, 0.965, 1.000, 0.905, 0.727, 0.526, 0.346, 0.207, 0.113, 0.050, 0.020, 0.006], // 10200
    &[0.015, 0.087, 0.251, 0.499, 0.761, 0.946, 1.000, 0.922, 0.755, 0.556, 0.373, 0.227, 0.126, 0.061, 0.024, 0.008], // 10400
    &[0.014, 0.083, 0.242, 0.486, 0.747, 0.937, 1.000, 0.930, 0.768, 0.570, 0.385, 0.237, 0.134, 0.065, 0.026, 0.009], // 10600
    &[0.013, 0.075, 0.225, 0.459, 0.720, 0.920, 1.000, 0.947, 0.796, 0.602, 0.415, 0.260, 0.149, 0.075, 0.032, 0.012, 0.001], // 10800
    &[0.012, 0.069, 0.208, 0.435, 0.695, 0.904, 1.000, 0.963, 0.824, 0.633, 0.443, 0.284, 0.165, 0.085, 0.037, 0.015, 0.002], // 11000
    &[0.010, 0.063, 0.194, 0.412, 0.669, 0.888, 1.000, 0.980, 0.852, 0.667, 0.475, 0.309, 0.184, 0.098, 0.044, 0.018, 0.005], // 11200
    &[0.009, 0.057, 0.180, 0.391, 0.646, 0.872, 1.000, 0.997, 0.882, 0.702, 0.509, 0.336, 0.204, 0.113, 0.052, 0.021, 0.006], // 11400
    &[0.009, 0.054, 0.173, 0.379, 0.631, 0.861, 0.995, 1.000, 0.892, 0.717, 0.523, 0.350, 0.214, 0.119, 0.057, 0.023, 0.008], // 11600
    &[0.008, 0.049, 0.160, 0.355, 0.602, 0.834, 0.980, 1.000, 0.906, 0.739, 0.548, 0.373, 0.231, 0.132, 0.066, 0.026, 0.010], // 11800
    &[0.007, 0.042, 0.141, 0.321, 0.557, 0.791, 0.953, 1.000, 0.931, 0.781, 0.596, 0.417, 0.268, 0.158, 0.082, 0.037, 0.014, 0.002], // 12000
    &[0.006, 0.038, 0.130, 0.301, 0.531, 0.767, 0.939, 1.000, 0.945, 0.805, 0.624, 0.443, 0.289, 0.174, 0.093, 0.043, 0.017, 0.004], // 12200
    &[0.005, 0.035, 0.120, 0.283, 0.507, 0.744, 0.925, 1.000, 0.960, 0.830, 0.653, 0.470, 0.312, 0.191, 0.106, 0.051, 0.020, 0.006], // 12400
    &[0.005, 0.033, 0.115, 0.274, 0.495, 0.732, 0.918, 1.000, 0.967, 0.842, 0.668, 0.485, 0.324, 0.200, 0.112, 0.054, 0.023, 0.007], // 12600
    &[0.004, 0.030, 0.107, 0.257, 0.472, 0.710, 0.904, 1.000, 0.982, 0.868, 0.699, 0.515, 0.351, 0.219, 0.126, 0.063, 0.027, 0.010], // 12800
    &[0.004, 0.027, 0.098, 0.242, 0.450, 0.689, 0.890, 1.000, 0.997, 0.894, 0.731, 0.547, 0.378, 0.241, 0.141, 0.072, 0.032, 0.012, 0.002], // 13000
    &[0.003, 0.025, 0.090, 0.224, 0.426, 0.661, 0.867, 0.989, 1.000, 0.911, 0.756, 0.574, 0.402, 0.260, 0.155, 0.082, 0.037, 0.014, 0.003], // 13200
    &[0.003, 0.022, 0.082, 0.208, 0.402, 0.633, 0.843, 0.975, 1.000, 0.925, 0.777, 0.598, 0.425, 0.279, 0.169, 0.092, 0.043, 0.017, 0.005], // 13400
    &[0.003, 0.021, 0.079, 0.202, 0.392, 0.621, 0.833, 0.969, 1.000, 0.930, 0.786, 0.609, 0.435, 0.288, 0.176, 0.097, 0.046, 0.018, 0.006], // 13600
    &[0.003, 0.019, 0.073, 0.188, 0.370, 0.595, 0.810, 0.955, 1.000, 0.943, 0.808, 0.634, 0.460, 0.309, 0.191, 0.108, 0.053, 0.022, 0.007], // 13800
    &[0.002, 0.017, 0.067, 0.175, 0.350, 0.570, 0.787, 0.942, 1.000, 0.956, 0.831, 0.662, 0.487, 0.331, 0.209, 0.121, 0.062, 0.026, 0.010], // 14000
    &[0.002, 0.016, 0.061, 0.163, 0.330, 0.547, 0.765, 0.929, 1.000, 0.968, 0.855, 0.690, 0.515, 0.356, 0.227, 0.135, 0.070, 0.031, 0.012, 0.002], // 14200
    &[0.002, 0.014, 0.056, 0.151, 0.312, 0.524, 0.743, 0.916, 1.000, 0.982, 0.878, 0.718, 0.544, 0.382, 0.247, 0.149, 0.079, 0.037, 0.014, 0.003], // 14400
    &[0.002, 0.013, 0.054, 0.146, 0.304, 0.514, 0.733, 0.909, 1.000, 0.989, 0.890, 0.733, 0.559, 0.395, 0.257, 0.156, 0.084, 0.039, 0.016, 0.004], // 14600
    &[0.001, 0.012, 0.047, 0.131, 0.276, 0.478, 0.697, 0.881, 0.989, 1.000, 0.920, 0.777, 0.605, 0.437, 0.292, 0.182, 0.102, 0.051, 0.022, 0.007], // 14800
    &[0.001, 0.010, 0.043, 0.121, 0.259, 0.454, 0.671, 0.859, 0.977, 1.000, 0.932, 0.797, 0.629, 0.460, 0.312, 0.197, 0.114, 0.058, 0.025, 0.008, 0.001], // 15000
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::profile::{profile, ProfileConfig, ProfilePeak};
    use crate::data::signal::BaselinePoint;

    fn flat_baseline(level: f64, width: f64) -> Baseline {
        Baseline::new(vec![
            BaselinePoint { x: 0.0, level, width },
            BaselinePoint { x: 10000.0, level, width },
        ])
    }

    #[test]
    fn test_label_point_rejects_below_baseline() {
        let signal = Signal::new(vec![99.0, 100.0, 101.0], vec![2.0, 10.0, 2.0]);
        assert!(label_point(&signal, 100.0, Some(&flat_baseline(12.0, 1.0))).is_none());
        assert!(label_point(&signal, 0.0, None).is_none());
        assert!(label_point(&signal, 150.0, None).is_none());

        let peak = label_point(&signal, 100.0, Some(&flat_baseline(2.0, 2.0))).unwrap();
        assert_eq!(peak.base, 2.0);
        assert_eq!(peak.sn, Some(4.0));
    }

    #[test]
    fn test_label_peak_on_asymmetric_sampling() {
        let peaks = vec![ProfilePeak::new(500.0, 100.0)];
        let signal = profile(&peaks, &ProfileConfig { fwhm: 0.1, points: 7, ..ProfileConfig::default() }).unwrap();
        let peak = label_peak(&signal, 499.97, 0.75, None).unwrap();
        assert!((peak.mz - 500.0).abs() < 0.002);
        assert!((peak.intensity() - 100.0).abs() < 3.0);
        assert!((peak.fwhm.unwrap() - 0.1).abs() < 0.01);

        let ranged = label_range(&signal, 499.9, 500.1, 0.75, None).unwrap();
        assert!((ranged.mz - peak.mz).abs() < 1e-9);
        // the peak is wider than the requested window
        assert!(label_range(&signal, 499.99, 500.01, 0.5, None).is_none());
    }

    #[test]
    fn test_label_scan_thresholds_and_merging() {
        let peaks = vec![
            ProfilePeak::new(400.0, 100.0),
            ProfilePeak::new(401.0, 50.0),
            ProfilePeak::new(402.0, 4.0),
        ];
        let signal = profile(&peaks, &ProfileConfig { fwhm: 0.05, points: 20, ..ProfileConfig::default() }).unwrap();

        let all = label_scan(&signal, &ScanConfig::default(), None).unwrap();
        assert_eq!(all.len(), 3);

        let config = ScanConfig { rel_threshold: 0.1, ..ScanConfig::default() };
        let strong = label_scan(&signal, &config, None).unwrap();
        assert_eq!(strong.len(), 2);
        assert!((strong[1].mz - 401.0).abs() < 0.0025);
        assert!((strong.relative_intensity(1).unwrap() - 0.5).abs() < 0.01);

        let raw = label_scan(&signal, &ScanConfig { picking_height: 1.0, ..ScanConfig::default() }, None).unwrap();
        assert_eq!(raw.len(), 3);
    }

    #[test]
    fn test_label_scan_range() {
        let peaks = vec![
            ProfilePeak::new(400.0, 100.0),
            ProfilePeak::new(401.0, 50.0),
            ProfilePeak::new(402.0, 4.0),
        ];
        let signal = profile(&peaks, &ProfileConfig { fwhm: 0.05, points: 20, ..ProfileConfig::default() }).unwrap();

        let window = ScanConfig { range: Some((400.5, 402.5)), ..ScanConfig::default() };
        let ranged = label_scan(&signal, &window, None).unwrap();
        assert_eq!(ranged.len(), 2);
        assert!((ranged[0].mz - 401.0).abs() < 0.0025);

        // relative threshold against the basepeak inside the window
        let config = ScanConfig { rel_threshold: 0.1, ..window };
        assert_eq!(label_scan(&signal, &config, None).unwrap().len(), 1);

        let outside = ScanConfig { range: Some((600.0, 700.0)), ..ScanConfig::default() };
        assert!(label_scan(&signal, &outside, None).unwrap().is_empty());

        let parsed = ScanConfig::from_json_str(
            r#"{"picking_height": 0.75, "abs_threshold": 0.0, "rel_threshold": 0.0, "sn_threshold": 0.0}"#,
        )
        .unwrap();
        assert!(parsed.range.is_none());
    }

    #[test]
    fn test_label_scan_with_baseline() {
        let peaks = vec![ProfilePeak::new(400.0, 100.0), ProfilePeak::new(401.0, 10.0)];
        let signal = profile(&peaks, &ProfileConfig { fwhm: 0.05, points: 20, ..ProfileConfig::default() }).unwrap();
        let baseline = flat_baseline(0.0, 5.0);
        let config = ScanConfig { sn_threshold: 3.0, ..ScanConfig::default() };
        let labelled = label_scan(&signal, &config, Some(&baseline)).unwrap();
        assert_eq!(labelled.len(), 1);
        assert!((labelled[0].sn.unwrap() - 20.0).abs() < 0.5);
        assert!(label_scan(&Signal::default(), &config, None).unwrap().is_empty());
    }

    #[test]
    fn test_deisotope_assigns_charge_two() {
        let peaks = PeakList::from_pairs(&[
            (1000.0, 100.0),
            (1000.50144, 96.7),
            (1001.00287, 55.7),
            (1200.0, 30.0),
        ]);
        let config = DeisotopeConfig { max_charge: 2, ..DeisotopeConfig::default() };
        let result = deisotope(&peaks, &config).unwrap();
        let charges: Vec<Option<i32>> = result.iter().map(|peak| peak.charge).collect();
        let isotopes: Vec<Option<i32>> = result.iter().map(|peak| peak.isotope).collect();
        assert_eq!(charges, vec![Some(2), Some(2), Some(2), None]);
        assert_eq!(isotopes, vec![Some(0), Some(1), Some(2), None]);
    }

    #[test]
    fn test_deisotope_rejects_low_first_isotope() {
        let peaks = PeakList::from_pairs(&[(1000.0, 100.0), (1001.00287, 10.0)]);
        let result = deisotope(&peaks, &DeisotopeConfig::default()).unwrap();
        assert!(result.iter().all(|peak| peak.charge.is_none()));

        let negative = PeakList::from_pairs(&[(1000.0, 100.0), (1001.00287, 55.0)]);
        let config = DeisotopeConfig { max_charge: -2, ..DeisotopeConfig::default() };
        let result = deisotope(&negative, &config).unwrap();
        assert_eq!(result[0].charge, Some(-1));
        assert_eq!(result[1].isotope, Some(1));
    }

    #[test]
    fn test_deconvolute_keeps_intensity() {
        let mut charged = Peak::new(400.0, 120.0).with_base(20.0).with_charge(-3).with_fwhm(0.02);
        charged.sn = Some(10.0);
        let peaks = PeakList::new(vec![charged, Peak::new(300.0, 50.0).with_charge(1)]);
        let result = deconvolute(&peaks, MassType::Monoisotopic).unwrap();
        assert_eq!(result.len(), 2);
        let proton = Agent::proton().mass(1).0;
        let recalculated = &result[1];
        assert!((recalculated.mz - (400.0 * 3.0 + 2.0 * proton)).abs() < 1e-9);
        assert_eq!(recalculated.charge, Some(-1));
        assert_eq!((recalculated.ai, recalculated.base, recalculated.sn), (100.0, 0.0, None));
        assert!((recalculated.fwhm.unwrap() - 0.06).abs() < 1e-12);
    }

    #[test]
    fn test_averagine_and_envelopes() {
        let formula = averagine(2000.0, 2, &AVERAGE_AMINO).unwrap();
        let neutral = mz(2000.0, 0, 2, &Agent::proton(), 1, MassType::Average);
        assert!((formula.avg_mass() - neutral).abs() < 1.0);
        assert!(formula.count("S", false) > 0);

        let peptide = averagine(1200.0, 1, &AVERAGE_AMINO).unwrap();
        let config = PatternConfig { charge: 1, ..PatternConfig::default() };
        let sticks = pattern(&peptide, &config).unwrap();
        let isotopes = PeakList::from_pairs(&sticks.entries().iter().map(|&(m, a)| (m, a * 1000.0)).collect::<Vec<_>>());
        let mono = env_mono(&isotopes, 1, EnvelopeIntensity::Maximum).unwrap().unwrap();
        assert!((mono.mz - isotopes[0].mz).abs() < 0.02);
        assert_eq!(mono.isotope, Some(0));
        assert_eq!(mono.ai, 1000.0);

        let centroid = env_centroid(&isotopes, 0.5, EnvelopeIntensity::Average).unwrap().unwrap();
        assert!(centroid.mz > isotopes[0].mz && centroid.mz < isotopes[isotopes.len() - 1].mz);
        assert!(env_centroid(&PeakList::default(), 0.5, EnvelopeIntensity::Sum).unwrap().is_none());
    }

    #[test]
    fn test_lookup_pattern_buckets() {
        assert_eq!(lookup_pattern(1999.0), &[1.000, 0.967, 0.557, 0.236, 0.080, 0.021, 0.005]);
        assert_eq!(lookup_pattern(-5.0).len(), 3);
        assert_eq!(lookup_pattern(1e6), PATTERN_LOOKUP[75]);
        assert_eq!("sum".parse::<EnvelopeIntensity>().unwrap(), EnvelopeIntensity::Sum);
        assert!("median".parse::<EnvelopeIntensity>().is_err());
    }
}
