use serde::{Deserialize, Serialize};

use crate::algorithm::peak_picking::label_peak;
use crate::algorithm::profile::{profile, PeakShape, ProfileConfig, ProfilePeak};
use crate::chemistry::compound::{split_atom, Compound};
use crate::chemistry::constants::ELECTRON_MASS;
use crate::chemistry::elements::table;
use crate::chemistry::formulas::Agent;
use crate::data::signal::{Baseline, Signal};
use crate::error::{Error, FormulaError, Result};
use crate::stopper;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PatternConfig {
    /// Peak width, also sets the isotope grouping window (fwhm / 4).
    pub fwhm: f64,
    /// Relative abundance cutoff of the final pattern.
    pub threshold: f64,
    pub charge: i32,
    /// Charging agent formula, `e` for electrons.
    pub agent: String,
    pub agent_charge: i32,
    /// Replace sticks by the maxima of the rendered profile.
    pub real: bool,
    pub shape: PeakShape,
}

impl Default for PatternConfig {
    fn default() -> Self {
        PatternConfig {
            fwhm: 0.1,
            threshold: 0.01,
            charge: 0,
            agent: "H".to_string(),
            agent_charge: 1,
            real: true,
            shape: PeakShape::Gaussian,
        }
    }
}

impl PatternConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Isotopic stick pattern as (mass, relative abundance), sorted by mass with a maximum of 1.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IsotopePattern(Vec<(f64, f64)>);

impl IsotopePattern {
    pub fn new(entries: Vec<(f64, f64)>) -> Self {
        IsotopePattern(entries)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(f64, f64)> {
        self.0.iter()
    }

    pub fn entries(&self) -> &[(f64, f64)] {
        &self.0
    }

    pub fn masses(&self) -> Vec<f64> {
        self.0.iter().map(|entry| entry.0).collect()
    }

    pub fn abundances(&self) -> Vec<f64> {
        self.0.iter().map(|entry| entry.1).collect()
    }

    /// Most abundant entry.
    pub fn basepeak(&self) -> Option<(f64, f64)> {
        self.0.iter().copied().reduce(|best, entry| if entry.1 > best.1 { entry } else { best })
    }
}

impl From<IsotopePattern> for Vec<(f64, f64)> {
    fn from(pattern: IsotopePattern) -> Self {
        pattern.0
    }
}

/// group entries closer than `window`
///
/// Entries are sorted by mass; neighbours within the window are merged into one entry at the
/// abundance weighted mass carrying the summed abundance.
///
/// # Examples
///
/// ```
/// use mzcalc::algorithm::isotope::consolidate;
///
/// let grouped = consolidate(vec![(101.0, 1.0), (100.0, 1.0), (100.02, 3.0)], 0.025);
/// assert_eq!(grouped.len(), 2);
/// assert!((grouped[0].0 - 100.015).abs() < 1e-9);
/// assert_eq!(grouped[0].1, 4.0);
/// ```
pub fn consolidate(mut entries: Vec<(f64, f64)>, window: f64) -> Vec<(f64, f64)> {
    entries.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    let mut grouped: Vec<(f64, f64)> = Vec::with_capacity(entries.len());
    for current in entries {
        match grouped.last_mut() {
            Some(previous) if previous.0 + window >= current.0 => {
                let abundance = previous.1 + current.1;
                previous.0 = (previous.0 * previous.1 + current.0 * current.1) / abundance;
                previous.1 = abundance;
            }
            _ => grouped.push(current),
        }
    }
    grouped
}

fn normalize(mut entries: Vec<(f64, f64)>) -> Vec<(f64, f64)> {
    let maximum = entries.iter().map(|entry| entry.1).fold(f64::NEG_INFINITY, f64::max);
    if maximum > 0.0 {
        entries.iter_mut().for_each(|entry| entry.1 /= maximum);
    }
    entries
}

// isotope distribution of one composition key, a tagged isotope is a single line
fn atom_distribution(atom: &str, formula: &str) -> Result<Vec<(f64, f64)>> {
    let elements = table();
    let (symbol, mass_number) = split_atom(atom);
    let element = elements.get(symbol).ok_or_else(|| FormulaError::UnknownElement {
        symbol: symbol.to_string(),
        formula: formula.to_string(),
    })?;
    let distribution = match mass_number {
        Some(mass_number) => {
            let isotope = element.isotope(mass_number).ok_or_else(|| FormulaError::UnknownIsotope {
                symbol: symbol.to_string(),
                mass_number: mass_number.to_string(),
                formula: formula.to_string(),
            })?;
            vec![(isotope.mass, 1.0)]
        }
        None => element.distribution(),
    };
    if distribution.is_empty() {
        return Err(Error::Input(format!("element {} has no natural isotopes", symbol)));
    }
    Ok(distribution)
}

/// calculate the isotopic pattern of a compound
///
/// Arguments:
///
/// * `compound` - neutral compound
/// * `config` - peak width, threshold, charge, charging agent and profile options
///
/// Returns:
///
/// * `IsotopePattern` - normalized pattern with entries at or above `config.threshold`
///
/// # Examples
///
/// ```
/// use mzcalc::algorithm::isotope::{pattern, PatternConfig};
/// use mzcalc::chemistry::compound::Compound;
///
/// let config = PatternConfig { real: false, ..PatternConfig::default() };
/// let carbon = pattern(&Compound::new("C").unwrap(), &config).unwrap();
/// assert_eq!(carbon.len(), 2);
/// assert_eq!(carbon.entries()[0], (12.0, 1.0));
/// assert!((carbon.entries()[1].1 - 0.0107 / 0.9893).abs() < 1e-9);
/// ```
pub fn pattern(compound: &Compound, config: &PatternConfig) -> Result<IsotopePattern> {
    let agent = Agent::parse(&config.agent)?;
    let ion = if config.charge != 0 {
        compound.ion(config.charge, &agent, config.agent_charge)
    } else {
        compound.clone()
    };

    let composition = ion.composition();
    if composition.values().any(|&count| count < 0) {
        return Err(Error::Input(format!(
            "pattern cannot be calculated for formula {}",
            ion.formula()
        )));
    }

    let internal_threshold = config.threshold / 100.0;
    let window = config.fwhm / 4.0;

    let mut result: Vec<(f64, f64)> = Vec::new();
    for (atom, &count) in composition {
        let distribution = atom_distribution(atom, ion.formula())?;
        for _ in 0..count {
            stopper::check()?;
            if result.is_empty() {
                result = normalize(distribution.clone());
                continue;
            }
            let mut combined = Vec::with_capacity(result.len() * distribution.len());
            for &(mass, abundance) in result.iter().filter(|entry| entry.1 >= internal_threshold) {
                for &(atom_mass, atom_abundance) in &distribution {
                    combined.push((mass + atom_mass, abundance * atom_abundance));
                }
            }
            result = normalize(consolidate(combined, window));
        }
    }

    if config.charge != 0 {
        let charge = config.charge as f64;
        for entry in result.iter_mut() {
            entry.0 = (entry.0 - ELECTRON_MASS * charge) / charge.abs();
        }
    }
    result = consolidate(result, window);

    if config.real && !result.is_empty() {
        let peaks: Vec<ProfilePeak> = result.iter().copied().map(ProfilePeak::from).collect();
        let profile_config = ProfileConfig {
            fwhm: config.fwhm,
            points: 100,
            shape: config.shape,
            ..ProfileConfig::default()
        };
        let signal = profile(&peaks, &profile_config)?;
        result = signal
            .maxima()
            .into_iter()
            .map(|(mz, abundance)| {
                let centroid = signal.centroid(mz, abundance * 0.99)?;
                Ok(if (centroid - mz).abs() < config.fwhm / 100.0 {
                    (centroid, abundance)
                } else {
                    (mz, abundance)
                })
            })
            .collect::<Result<Vec<_>>>()?;
    }

    let mut result = normalize(result);
    result.retain(|entry| entry.1 >= config.threshold);
    log::debug!("isotope pattern of {} has {} entries", ion.formula(), result.len());
    Ok(IsotopePattern(result))
}

/// compare a signal with a theoretical isotope pattern
///
/// Arguments:
///
/// * `signal` - profile data
/// * `pattern` - theoretical pattern
/// * `picking_height` - centroiding height used to label each isotope
/// * `baseline` - optional signal baseline
///
/// Returns:
///
/// * `Option<f64>` - root mean square of the abundance differences, `None` if the pattern has
///   fewer than two isotopes or no isotope is found in the signal
pub fn match_pattern(
    signal: &Signal,
    pattern: &IsotopePattern,
    picking_height: f64,
    baseline: Option<&Baseline>,
) -> Option<f64> {
    if signal.is_empty() || pattern.len() < 2 {
        return None;
    }

    let mut found = Vec::with_capacity(pattern.len());
    for &(mass, _) in pattern.iter() {
        let intensity = label_peak(signal, mass, picking_height, baseline)
            .map(|peak| peak.intensity())
            .unwrap_or(0.0);
        found.push(intensity);
    }

    let basepeak = found.iter().copied().fold(0.0, f64::max);
    if basepeak == 0.0 {
        return None;
    }

    let sum: f64 = pattern
        .iter()
        .zip(&found)
        .map(|(&(_, abundance), &intensity)| (abundance - intensity / basepeak).powi(2))
        .sum();
    Some((sum / (pattern.len() - 1) as f64).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::profile::profile;

    fn sticks(formula: &str, config: &PatternConfig) -> IsotopePattern {
        pattern(&Compound::new(formula).unwrap(), config).unwrap()
    }

    #[test]
    fn test_normalized_and_thresholded() {
        let config = PatternConfig { threshold: 0.05, ..PatternConfig::default() };
        for formula in ["C6H12O6", "C254H377N65O75S6", "Fe2S2", "C{13}6H6"] {
            let result = sticks(formula, &config);
            let maximum = result.abundances().into_iter().fold(0.0, f64::max);
            assert!((maximum - 1.0).abs() < 1e-9, "{}", formula);
            assert!(result.iter().all(|entry| entry.1 >= 0.05));
            assert!(result.masses().windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_monoisotopic_peak_of_small_molecule() {
        let config = PatternConfig { real: false, ..PatternConfig::default() };
        let glucose = Compound::new("C6H12O6").unwrap();
        let result = pattern(&glucose, &config).unwrap();
        let (mass, abundance) = result.entries()[0];
        assert!((mass - glucose.mono_mass()).abs() < 1e-3);
        assert_eq!(abundance, 1.0);
        // M+1 is roughly 6.7 % for six carbons
        assert!((result.entries()[1].1 - 0.067).abs() < 0.01);
    }

    #[test]
    fn test_charged_pattern_is_shifted() {
        let neutral_config = PatternConfig { real: false, ..PatternConfig::default() };
        let charged_config = PatternConfig { real: false, charge: 2, agent: "e".to_string(), agent_charge: -1, ..PatternConfig::default() };
        let neutral = sticks("C20H30N5O6", &neutral_config);
        let charged = sticks("C20H30N5O6", &charged_config);
        assert_eq!(neutral.len(), charged.len());
        for (n, c) in neutral.iter().zip(charged.iter()) {
            assert!((c.0 - (n.0 - 2.0 * ELECTRON_MASS) / 2.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_protonated_pattern() {
        let config = PatternConfig { real: false, charge: 1, ..PatternConfig::default() };
        let water = Compound::new("H2O").unwrap();
        let result = pattern(&water, &config).unwrap();
        let expected = water.mz(1, &Agent::proton(), 1).0;
        assert!((result.entries()[0].0 - expected).abs() < 1e-6);
    }

    #[test]
    fn test_real_pattern_merges_unresolved() {
        let wide = PatternConfig { fwhm: 2.0, ..PatternConfig::default() };
        // isotopes 1 Da apart are not resolved at 2 Da width
        let result = sticks("C100H200", &wide);
        assert_eq!(result.len(), 1);
        let narrow = sticks("C100H200", &PatternConfig::default());
        assert!(narrow.len() > 3);
    }

    #[test]
    fn test_invalid_inputs() {
        let config = PatternConfig::default();
        let loss = Compound::new("CH4H-5").unwrap();
        assert!(matches!(pattern(&loss, &config), Err(Error::Input(_))));
        let bad_agent = PatternConfig { agent: "Xx".to_string(), charge: 1, ..PatternConfig::default() };
        assert!(matches!(pattern(&loss, &bad_agent), Err(Error::Formula(_))));
        assert!(sticks("", &config).is_empty());
    }

    #[test]
    fn test_match_pattern() {
        let config = PatternConfig { real: false, ..PatternConfig::default() };
        let theoretical = sticks("C50H80N10O12", &config);
        let peaks: Vec<ProfilePeak> = theoretical.iter().map(|&(m, a)| ProfilePeak::new(m, a * 1000.0)).collect();
        let signal = profile(&peaks, &ProfileConfig { fwhm: 0.05, points: 20, ..ProfileConfig::default() }).unwrap();
        let rms = match_pattern(&signal, &theoretical, 0.75, None).unwrap();
        assert!(rms < 0.01, "rms {}", rms);

        let single = IsotopePattern::new(vec![(100.0, 1.0)]);
        assert_eq!(match_pattern(&signal, &single, 0.75, None), None);
    }
}
