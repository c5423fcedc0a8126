use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::algorithm::calibration::{calibration, CalibrationKind};
use crate::algorithm::isotope::{IsotopePattern, PatternConfig};
use crate::algorithm::least_squares::fit_mixture;
use crate::algorithm::peak_picking::{label_scan, ScanConfig};
use crate::algorithm::profile::{profile, profile_on_raster, PeakShape, ProfileConfig, ProfilePeak};
use crate::chemistry::compound::Compound;
use crate::chemistry::formulas::Agent;
use crate::data::peak_list::PeakList;
use crate::data::signal::{Baseline, Signal};
use crate::error::{Error, Result};
use crate::stopper;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvelopeFitConfig {
    /// Group removed once per exchange step.
    pub loss: String,
    /// Group added once per exchange step.
    pub gain: String,
    pub shape: PeakShape,
    /// Default peak width.
    pub fwhm: f64,
    /// Keep the default width instead of taking it from the base peak.
    pub force_fwhm: bool,
    /// Recalibrate the data against the theoretical envelope before the final fit.
    pub auto_align: bool,
    pub iter_limit: Option<usize>,
    pub rel_threshold: f64,
    pub picking_height: f64,
}

impl Default for EnvelopeFitConfig {
    fn default() -> Self {
        EnvelopeFitConfig {
            loss: "H".to_string(),
            gain: "H{2}".to_string(),
            shape: PeakShape::Gaussian,
            fwhm: 0.1,
            force_fwhm: true,
            auto_align: true,
            iter_limit: None,
            rel_threshold: 0.0,
            picking_height: 0.9,
        }
    }
}

impl EnvelopeFitConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

const CHI_LIMIT: f64 = 1e-3;

#[derive(Clone, Debug)]
struct ExchangeModel {
    compound: Compound,
    pattern: Option<IsotopePattern>,
    abundance: f64,
    relative: f64,
}

/// Fit of a mixture of exchange variants of one compound to measured data.
///
/// Every scale `x` stands for the compound with `x` loss groups replaced by `x` gain groups,
/// for example hydrogen-deuterium exchange with the default groups. The fitted weights give
/// the abundance of each variant and the average number of exchanged groups.
///
/// # Examples
///
/// ```
/// use mzcalc::algorithm::envelope_fit::{EnvelopeFit, EnvelopeFitConfig};
///
/// let fit = EnvelopeFit::new("C20H30N5O6", 1, &[0, 1, 2], &EnvelopeFitConfig::default()).unwrap();
/// assert_eq!(fit.scales(), vec![0, 1, 2]);
/// let (low, high) = fit.mz_range();
/// assert!(low < 437.0 && high > 439.0);
/// ```
#[derive(Clone, Debug)]
pub struct EnvelopeFit {
    charge: i32,
    config: EnvelopeFitConfig,
    fwhm: f64,
    mz_range: (f64, f64),
    models: BTreeMap<u32, ExchangeModel>,
    spectrum: Signal,
    data: Vec<(f64, f64)>,
    model: Vec<(f64, f64)>,
    composition: BTreeMap<u32, f64>,
    ncomposition: BTreeMap<u32, f64>,
    average: f64,
}

impl EnvelopeFit {
    /// prepare the exchange models of a compound
    ///
    /// Arguments:
    ///
    /// * `formula` - base compound
    /// * `charge` - ion charge, protons are the charging agent
    /// * `scales` - numbers of exchanged groups to model
    /// * `config` - exchange groups and fit settings
    ///
    /// Returns:
    ///
    /// * `EnvelopeFit` - ready to fit, fails when no scale gives a valid ion
    pub fn new(formula: &str, charge: i32, scales: &[u32], config: &EnvelopeFitConfig) -> Result<Self> {
        let mut loss = Compound::new(&config.loss)?;
        loss.negate();
        Compound::new(&config.gain)?;

        let mut models = BTreeMap::new();
        for &scale in scales {
            stopper::check()?;
            let expression = format!("{}({}){}({}){}", formula, loss.formula(), scale, config.gain, scale);
            let compound = Compound::new(&expression)?;
            if !compound.is_valid_ion(charge, &Agent::proton(), 1) {
                log::debug!("skipping exchange scale {}, {} is not a valid ion", scale, expression);
                continue;
            }
            models.insert(
                scale,
                ExchangeModel {
                    compound,
                    pattern: None,
                    abundance: 0.0,
                    relative: 0.0,
                },
            );
        }

        let mut fit = EnvelopeFit {
            charge,
            config: config.clone(),
            fwhm: config.fwhm,
            mz_range: (0.0, f64::INFINITY),
            models,
            spectrum: Signal::default(),
            data: Vec::new(),
            model: Vec::new(),
            composition: BTreeMap::new(),
            ncomposition: BTreeMap::new(),
            average: 0.0,
        };
        fit.mz_range = fit.relevant_range()?;
        Ok(fit)
    }

    // m/z span of the lightest and heaviest model, widened by 0.1 %
    fn relevant_range(&self) -> Result<(f64, f64)> {
        let (Some(lightest), Some(heaviest)) = (self.models.values().next(), self.models.values().next_back()) else {
            return Err(Error::Input("no valid exchange model to fit".to_string()));
        };

        let config = PatternConfig {
            fwhm: 0.5,
            charge: self.charge,
            ..PatternConfig::default()
        };
        let mut bounds = Vec::with_capacity(4);
        for model in [lightest, heaviest] {
            let pattern = model.compound.pattern(&config)?;
            let (Some(first), Some(last)) = (pattern.entries().first(), pattern.entries().last()) else {
                return Err(Error::Input(format!("empty isotope pattern for {}", model.compound)));
            };
            bounds.extend([first.0, last.0]);
        }

        let low = bounds.iter().copied().fold(f64::INFINITY, f64::min);
        let high = bounds.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Ok((low - low * 0.001, high + high * 0.001))
    }

    /// fit to a profile spectrum
    ///
    /// The signal is cropped to the relevant range, centroided with the configured picking
    /// height and threshold, cleaned of shoulder peaks and passed to [`EnvelopeFit::to_peaklist`].
    /// The cropped and baseline corrected signal is kept as [`EnvelopeFit::spectrum`].
    pub fn to_spectrum(&mut self, signal: &Signal, baseline: Option<&Baseline>) -> Result<bool> {
        let (low, high) = self.mz_range;
        let i1 = signal.locate(low);
        let i2 = signal.locate(high).max(i1);
        let cropped = Signal::new(signal.mz[i1..i2].to_vec(), signal.intensity[i1..i2].to_vec());

        let scan = ScanConfig {
            picking_height: self.config.picking_height,
            rel_threshold: self.config.rel_threshold,
            ..ScanConfig::default()
        };
        let mut peaklist = label_scan(&cropped, &scan, baseline)?;
        peaklist.remove_shoulders(2.5, 0.05, self.config.fwhm);

        self.spectrum = match baseline {
            Some(baseline) => cropped.subbase(baseline),
            None => cropped,
        };

        self.to_peaklist(&peaklist)
    }

    /// fit to centroided peaks
    ///
    /// Peaks outside the relevant range or below the relative threshold are ignored. Unless the
    /// width is forced, the base peak width replaces the default one.
    pub fn to_peaklist(&mut self, peaklist: &PeakList) -> Result<bool> {
        let mut peaklist = peaklist.clone();
        peaklist.crop(self.mz_range.0, self.mz_range.1);
        peaklist.remove_threshold(0.0, self.config.rel_threshold, 0.0);

        let fwhm = match peaklist.basepeak().and_then(|peak| peak.fwhm) {
            Some(width) if !self.config.force_fwhm && width != 0.0 => width,
            _ => self.config.fwhm,
        };

        let points: Vec<(f64, f64)> = peaklist.iter().map(|peak| (peak.mz, peak.intensity())).collect();
        self.fit_points(&points, fwhm)
    }

    /// fit to (mz, intensity) points using the default width
    ///
    /// Returns `false` when nothing inside the relevant range could be fitted.
    pub fn to_points(&mut self, points: &[(f64, f64)]) -> Result<bool> {
        self.fit_points(points, self.config.fwhm)
    }

    fn fit_points(&mut self, points: &[(f64, f64)], fwhm: f64) -> Result<bool> {
        self.fwhm = fwhm;
        self.composition.clear();
        self.ncomposition.clear();
        self.average = 0.0;
        self.model.clear();
        for model in self.models.values_mut() {
            model.abundance = 0.0;
            model.relative = 0.0;
        }

        let i1 = points.partition_point(|point| point.0 <= self.mz_range.0);
        let i2 = points.partition_point(|point| point.0 <= self.mz_range.1).max(i1);
        self.data = points[i1..i2].to_vec();
        if self.data.is_empty() {
            return Ok(false);
        }

        if self.config.auto_align {
            self.align()?;
        }

        let (raster, intensities): (Vec<f64>, Vec<f64>) = self.data.iter().copied().unzip();
        let (profiles, exchanged) = self.make_models(&raster, false)?;
        if profiles.is_empty() || intensities.iter().all(|&value| value <= 0.0) {
            return Ok(false);
        }

        let weights = fit_mixture(&intensities, &profiles, self.config.iter_limit, CHI_LIMIT)?;
        let total: f64 = weights.iter().sum();
        if total == 0.0 {
            return Ok(false);
        }

        for (scale, &weight) in exchanged.iter().zip(&weights) {
            if let Some(model) = self.models.get_mut(scale) {
                model.abundance = weight;
                model.relative = weight / total;
            }
        }
        for (&scale, model) in &self.models {
            self.average += scale as f64 * model.relative;
            self.composition.insert(scale, model.abundance);
            self.ncomposition.insert(scale, model.relative);
        }

        self.model = raster
            .iter()
            .enumerate()
            .map(|(j, &x)| (x, profiles.iter().zip(&weights).map(|(row, weight)| row[j] * weight).sum()))
            .collect();

        log::debug!("envelope fit over {} points, average exchange {:.3}", self.data.len(), self.average);
        Ok(true)
    }

    // model profiles on the raster, models with nothing inside it are skipped
    fn make_models(&mut self, raster: &[f64], reset: bool) -> Result<(Vec<Vec<f64>>, Vec<u32>)> {
        let (Some(&first), Some(&last)) = (raster.first(), raster.last()) else {
            return Ok((Vec::new(), Vec::new()));
        };
        let (raster_min, raster_max) = (first - self.fwhm, last + self.fwhm);

        let pattern_config = PatternConfig {
            fwhm: self.fwhm,
            charge: self.charge,
            real: false,
            ..PatternConfig::default()
        };
        let profile_config = ProfileConfig {
            fwhm: self.fwhm,
            shape: self.config.shape,
            ..ProfileConfig::default()
        };

        let mut profiles = Vec::new();
        let mut exchanged = Vec::new();
        for (&scale, model) in self.models.iter_mut() {
            stopper::check()?;

            let (mono, average) = model.compound.mz(self.charge, &Agent::proton(), 1);
            if mono > raster_max || average < raster_min {
                continue;
            }

            if reset || model.pattern.is_none() {
                model.pattern = Some(model.compound.pattern(&pattern_config)?);
            }
            let peaks: Vec<ProfilePeak> = model
                .pattern
                .iter()
                .flat_map(|pattern| pattern.iter().map(|&entry| ProfilePeak::from(entry)))
                .collect();
            if peaks.is_empty() {
                continue;
            }

            let rendered = profile_on_raster(&peaks, raster, &profile_config)?;
            if rendered.intensity.iter().any(|&value| value != 0.0) {
                profiles.push(rendered.intensity.to_vec());
                exchanged.push(scale);
            }
        }

        Ok((profiles, exchanged))
    }

    // recalibrates data and spectrum against the maxima of a first quick fit
    fn align(&mut self) -> Result<()> {
        let (raster, intensities): (Vec<f64>, Vec<f64>) = self.data.iter().copied().unzip();
        let (profiles, exchanged) = self.make_models(&raster, true)?;
        if profiles.is_empty() || intensities.iter().all(|&value| value <= 0.0) {
            return Ok(());
        }

        let weights = fit_mixture(&intensities, &profiles, Some(self.models.len()), CHI_LIMIT)?;

        let mut isotopes = Vec::new();
        for (scale, &weight) in exchanged.iter().zip(&weights) {
            if let Some(pattern) = self.models.get(scale).and_then(|model| model.pattern.as_ref()) {
                isotopes.extend(pattern.iter().map(|&(mz, abundance)| ProfilePeak::new(mz, abundance * weight)));
            }
        }
        if isotopes.is_empty() {
            return Ok(());
        }

        let envelope = profile(
            &isotopes,
            &ProfileConfig {
                fwhm: self.fwhm,
                points: 10,
                shape: self.config.shape,
                ..ProfileConfig::default()
            },
        )?;
        let scan = ScanConfig {
            picking_height: 0.95,
            rel_threshold: 0.01,
            ..ScanConfig::default()
        };
        let peaklist = label_scan(&envelope, &scan, None)?;

        // the most intense data point within tolerance of each theoretical maximum
        let tolerance = self.fwhm / 1.5;
        let mut calibrants: Vec<(f64, f64)> = Vec::new();
        for peak in peaklist.iter() {
            let mut best: Option<(f64, f64)> = None;
            for &(x, y) in &self.data {
                let error = x - peak.mz;
                if error > tolerance {
                    break;
                }
                if error.abs() <= tolerance && best.map_or(true, |(_, intensity)| y > intensity) {
                    best = Some((x, y));
                }
            }
            if let Some((x, _)) = best {
                calibrants.push((x, peak.mz));
            }
        }

        let kind = match calibrants.len() {
            n if n > 3 => CalibrationKind::Quadratic,
            n if n > 1 => CalibrationKind::Linear,
            _ => {
                log::warn!("no calibrants found to align the envelope, data left as measured");
                return Ok(());
            }
        };
        let model = calibration(&calibrants, kind)?;
        log::debug!("envelope aligned with {} {} calibrants", calibrants.len(), kind);

        for point in self.data.iter_mut() {
            point.0 = model.apply(point.0);
        }
        if !self.spectrum.is_empty() {
            let mz = self.spectrum.mz.iter().map(|&x| model.apply(x)).collect();
            self.spectrum = Signal::new(mz, self.spectrum.intensity.to_vec());
        }
        Ok(())
    }

    /// profile of the fitted mixture
    ///
    /// Arguments:
    ///
    /// * `points` - raster points per peak width
    ///
    /// Returns:
    ///
    /// * `Signal` - summed isotope patterns weighted by the fitted abundances
    pub fn envelope(&self, points: usize) -> Result<Signal> {
        let isotopes: Vec<ProfilePeak> = self
            .models
            .values()
            .filter_map(|model| model.pattern.as_ref().map(|pattern| (pattern, model.abundance)))
            .flat_map(|(pattern, abundance)| {
                pattern.iter().map(move |&(mz, value)| ProfilePeak::new(mz, value * abundance))
            })
            .collect();

        profile(
            &isotopes,
            &ProfileConfig {
                fwhm: self.fwhm,
                points,
                shape: self.config.shape,
                ..ProfileConfig::default()
            },
        )
    }

    pub fn scales(&self) -> Vec<u32> {
        self.models.keys().copied().collect()
    }

    pub fn mz_range(&self) -> (f64, f64) {
        self.mz_range
    }

    /// Width used by the last fit.
    pub fn fwhm(&self) -> f64 {
        self.fwhm
    }

    /// Absolute abundance per exchange scale.
    pub fn composition(&self) -> &BTreeMap<u32, f64> {
        &self.composition
    }

    /// Abundance per exchange scale normalized to a sum of 1.
    pub fn ncomposition(&self) -> &BTreeMap<u32, f64> {
        &self.ncomposition
    }

    /// Mean number of exchanged groups.
    pub fn average(&self) -> f64 {
        self.average
    }

    /// Fitted intensities on the data raster.
    pub fn model(&self) -> &[(f64, f64)] {
        &self.model
    }

    /// Data points used by the last fit, after alignment.
    pub fn data(&self) -> &[(f64, f64)] {
        &self.data
    }

    pub fn spectrum(&self) -> &Signal {
        &self.spectrum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEPTIDE: &str = "C20H30N5O6";

    fn exchanged_profile(weights: &[(u32, f64)], shift: f64) -> Signal {
        let config = PatternConfig {
            fwhm: 0.1,
            charge: 1,
            real: false,
            ..PatternConfig::default()
        };
        let mut peaks = Vec::new();
        for &(scale, weight) in weights {
            let compound = Compound::new(&format!("{}(H-1){}(H{{2}}){}", PEPTIDE, scale, scale)).unwrap();
            let pattern = compound.pattern(&config).unwrap();
            peaks.extend(pattern.iter().map(|&(mz, abundance)| ProfilePeak::new(mz + shift, abundance * weight)));
        }
        profile(&peaks, &ProfileConfig::default()).unwrap()
    }

    #[test]
    fn test_models_and_range() {
        let fit = EnvelopeFit::new(PEPTIDE, 1, &[3, 0, 1, 1], &EnvelopeFitConfig::default()).unwrap();
        assert_eq!(fit.scales(), vec![0, 1, 3]);
        assert!(fit.composition().is_empty());

        // only 30 hydrogens can be exchanged
        let limited = EnvelopeFit::new(PEPTIDE, 0, &[30, 31], &EnvelopeFitConfig::default()).unwrap();
        assert_eq!(limited.scales(), vec![30]);
        assert!(EnvelopeFit::new(PEPTIDE, 0, &[40], &EnvelopeFitConfig::default()).is_err());
        assert!(EnvelopeFit::new("Xx", 0, &[0], &EnvelopeFitConfig::default()).is_err());
    }

    #[test]
    fn test_fit_points_mixture() {
        let config = EnvelopeFitConfig {
            auto_align: false,
            ..EnvelopeFitConfig::default()
        };
        let mut fit = EnvelopeFit::new(PEPTIDE, 1, &[0, 1, 2, 3], &config).unwrap();
        let signal = exchanged_profile(&[(0, 500.0), (2, 500.0)], 0.0);
        let points: Vec<(f64, f64)> = signal.iter().collect();

        assert!(fit.to_points(&points).unwrap());
        let ncomposition = fit.ncomposition();
        assert!((ncomposition[&0] - 0.5).abs() < 0.01, "{:?}", ncomposition);
        assert!((ncomposition[&2] - 0.5).abs() < 0.01, "{:?}", ncomposition);
        assert!(ncomposition[&1] < 0.01 && ncomposition[&3] < 0.01);
        assert!((fit.average() - 1.0).abs() < 0.02);
        assert!((fit.composition()[&0] - 500.0).abs() < 5.0);
        assert_eq!(fit.model().len(), fit.data().len());

        let envelope = fit.envelope(10).unwrap();
        let apex = envelope.basepeak().unwrap();
        assert!(envelope.intensity[apex] > 0.0);
    }

    #[test_log::test]
    fn test_fit_spectrum_with_alignment() {
        let mut fit = EnvelopeFit::new(PEPTIDE, 1, &[0, 1, 2], &EnvelopeFitConfig::default()).unwrap();
        let signal = exchanged_profile(&[(0, 1000.0)], 0.02);

        assert!(fit.to_spectrum(&signal, None).unwrap());
        assert!(!fit.spectrum().is_empty());
        assert!(fit.ncomposition()[&0] > 0.9, "{:?}", fit.ncomposition());
        assert!(fit.average() < 0.2);
    }

    #[test]
    fn test_nothing_to_fit() {
        let mut fit = EnvelopeFit::new(PEPTIDE, 1, &[0, 1], &EnvelopeFitConfig::default()).unwrap();
        assert!(!fit.to_points(&[(100.0, 10.0), (101.0, 20.0)]).unwrap());
        assert!(!fit.to_peaklist(&PeakList::default()).unwrap());
        assert!(fit.ncomposition().is_empty());
    }
}
