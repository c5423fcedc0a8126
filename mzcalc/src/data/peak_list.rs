use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::ops::{Add, Index, Mul};

use bincode::{Decode, Encode};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::algorithm::calibration::CalibrationModel;
use crate::algorithm::peak_picking::{deconvolute, deisotope, DeisotopeConfig};
use crate::chemistry::formulas::MassType;
use crate::data::peak::Peak;
use crate::error::{Error, Result};

/// Peaks kept sorted by m/z.
///
/// The basepeak and relative intensities are derived on every call, so edits through
/// [`PeakList::set`] or [`PeakList::update_intensity`] can never leave them stale.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct PeakList {
    peaks: Vec<Peak>,
}

impl PeakList {
    pub fn new(mut peaks: Vec<Peak>) -> Self {
        peaks.sort_by(canonical_order);
        PeakList { peaks }
    }

    /// Peaks from (m/z, intensity) pairs.
    ///
    /// # Examples
    ///
    /// ```
    /// use mzcalc::data::peak_list::PeakList;
    ///
    /// let peaks = PeakList::from_pairs(&[(200.0, 5.0), (100.0, 10.0)]);
    /// assert_eq!(peaks[0].mz, 100.0);
    /// assert_eq!(peaks.relative_intensities(), vec![1.0, 0.5]);
    /// ```
    pub fn from_pairs(pairs: &[(f64, f64)]) -> Self {
        PeakList::new(pairs.iter().copied().map(Peak::from).collect())
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Peak> {
        self.peaks.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peak> {
        self.peaks.iter()
    }

    pub fn peaks(&self) -> &[Peak] {
        &self.peaks
    }

    pub fn into_vec(self) -> Vec<Peak> {
        self.peaks
    }

    /// Insert a peak at its sorted position.
    pub fn push(&mut self, peak: Peak) {
        let index = self.peaks.partition_point(|existing| canonical_order(existing, &peak) != Ordering::Greater);
        self.peaks.insert(index, peak);
    }

    pub fn remove(&mut self, index: usize) -> Option<Peak> {
        if index < self.peaks.len() {
            Some(self.peaks.remove(index))
        } else {
            None
        }
    }

    /// Remove all peaks at the given indexes, unknown indexes are ignored.
    pub fn delete(&mut self, indexes: &[usize]) {
        let mut index = 0;
        self.peaks.retain(|_| {
            let keep = !indexes.contains(&index);
            index += 1;
            keep
        });
    }

    pub fn clear(&mut self) {
        self.peaks.clear();
    }

    /// Replace the peak at `index` and restore the m/z order.
    pub fn set(&mut self, index: usize, peak: Peak) -> Result<()> {
        let slot = self.slot(index)?;
        *slot = peak;
        self.sort();
        Ok(())
    }

    pub fn update_intensity(&mut self, index: usize, ai: f64, base: f64) -> Result<()> {
        let slot = self.slot(index)?;
        slot.ai = ai;
        slot.base = base;
        self.sort();
        Ok(())
    }

    fn slot(&mut self, index: usize) -> Result<&mut Peak> {
        let len = self.peaks.len();
        self.peaks
            .get_mut(index)
            .ok_or_else(|| Error::Input(format!("peak index {} out of range for {} peaks", index, len)))
    }

    fn sort(&mut self) {
        self.peaks.sort_by(canonical_order);
    }

    /// First peak with the highest intensity.
    pub fn basepeak(&self) -> Option<&Peak> {
        let mut basepeak = self.peaks.first()?;
        for peak in &self.peaks[1..] {
            if peak.intensity() > basepeak.intensity() {
                basepeak = peak;
            }
        }
        Some(basepeak)
    }

    /// Intensity relative to the basepeak, 1 for every peak if the basepeak intensity is 0.
    pub fn relative_intensity(&self, index: usize) -> Option<f64> {
        let peak = self.peaks.get(index)?;
        let maximum = self.basepeak()?.intensity();
        Some(if maximum != 0.0 { peak.intensity() / maximum } else { 1.0 })
    }

    pub fn relative_intensities(&self) -> Vec<f64> {
        let maximum = self.basepeak().map_or(0.0, |peak| peak.intensity());
        self.peaks
            .iter()
            .map(|peak| if maximum != 0.0 { peak.intensity() / maximum } else { 1.0 })
            .collect()
    }

    /// Keep peaks with `min_x <= mz <= max_x`.
    pub fn crop(&mut self, min_x: f64, max_x: f64) {
        self.peaks.retain(|peak| peak.mz >= min_x && peak.mz <= max_x);
    }

    /// Scale apex and baseline intensities.
    pub fn multiply(&mut self, factor: f64) {
        for peak in self.peaks.iter_mut() {
            peak.ai *= factor;
            peak.base *= factor;
        }
    }

    pub fn combine(&mut self, other: &PeakList) {
        self.peaks.extend(other.peaks.iter().cloned());
        self.sort();
    }

    /// Apply a calibration to every m/z value.
    pub fn recalibrate(&mut self, model: &CalibrationModel) {
        for peak in self.peaks.iter_mut() {
            peak.mz = model.apply(peak.mz);
        }
        self.sort();
    }

    /// merge neighbouring peaks
    ///
    /// Two peaks are merged when the second one lies closer than the window to the first.
    /// The window is `(fwhm1 + fwhm2) / 8` if both peaks carry a width and `force_window` is
    /// not set, `window` otherwise. Merged peaks get the summed intensity at the intensity
    /// weighted m/z and width. Group names are cleared.
    ///
    /// # Examples
    ///
    /// ```
    /// use mzcalc::data::peak_list::PeakList;
    ///
    /// let mut peaks = PeakList::from_pairs(&[(100.0, 10.0), (100.05, 30.0), (101.0, 5.0)]);
    /// peaks.consolidate(0.1, false);
    /// assert_eq!(peaks.len(), 2);
    /// assert!((peaks[0].mz - 100.0375).abs() < 1e-9);
    /// assert_eq!(peaks[0].intensity(), 40.0);
    /// ```
    pub fn consolidate(&mut self, window: f64, force_window: bool) {
        let mut grouped: Vec<Peak> = Vec::with_capacity(self.peaks.len());
        for current in self.peaks.drain(..) {
            let Some(previous) = grouped.last_mut() else {
                grouped.push(current);
                continue;
            };

            let window = match (previous.fwhm, current.fwhm) {
                (Some(a), Some(b)) if !force_window && a != 0.0 && b != 0.0 => (a + b) / 8.0,
                _ => window,
            };

            if previous.mz + window > current.mz {
                let intensity = previous.intensity() + current.intensity();
                if intensity != 0.0 {
                    previous.mz = (previous.mz * previous.intensity() + current.mz * current.intensity()) / intensity;
                    if let (Some(a), Some(b)) = (previous.fwhm, current.fwhm) {
                        previous.fwhm = Some((a * previous.intensity() + b * current.intensity()) / intensity);
                    }
                }
                previous.ai = intensity + previous.base;
            } else {
                grouped.push(current);
            }
        }

        grouped.iter_mut().for_each(|peak| peak.group.clear());
        self.peaks = grouped;
        self.sort();
    }

    /// Remove peaks below an absolute, relative or s/n threshold.
    pub fn remove_threshold(&mut self, abs_threshold: f64, rel_threshold: f64, sn_threshold: f64) {
        let Some(basepeak) = self.basepeak() else {
            return;
        };
        let threshold = (basepeak.intensity() * rel_threshold).max(abs_threshold);
        self.peaks.retain(|peak| {
            peak.intensity() >= threshold && peak.sn.map_or(true, |sn| sn >= sn_threshold)
        });
    }

    /// remove FT shoulder peaks
    ///
    /// Arguments:
    ///
    /// * `window` - peak width multiplier giving the search window around a parent peak
    /// * `rel_threshold` - highest shoulder intensity relative to the parent
    /// * `fwhm` - width used for parents without one
    pub fn remove_shoulders(&mut self, window: f64, rel_threshold: f64, fwhm: f64) {
        let mut shoulders = vec![false; self.peaks.len()];

        let parents = self
            .peaks
            .iter()
            .filter(|peak| peak.sn.map_or(true, |sn| sn == 0.0 || sn * rel_threshold > 3.0));
        for parent in parents {
            let width = match parent.fwhm {
                Some(width) if width != 0.0 => width,
                _ if fwhm != 0.0 => fwhm,
                _ => continue,
            };
            let (low_mz, high_mz) = (parent.mz - width * window, parent.mz + width * window);
            let threshold = parent.intensity() * rel_threshold;

            for (x, peak) in self.peaks.iter().enumerate() {
                if low_mz < peak.mz && peak.mz < high_mz && peak.intensity() < threshold {
                    shoulders[x] = true;
                }
                if peak.mz > high_mz {
                    break;
                }
            }
        }

        let mut flags = shoulders.into_iter();
        self.peaks.retain(|_| !flags.next().unwrap_or(false));
    }

    /// Remove every assigned isotope that is not a monoisotopic peak.
    pub fn remove_isotopes(&mut self) {
        self.peaks
            .retain(|peak| peak.charge.is_none() || peak.isotope == Some(0));
    }

    pub fn remove_uncharged(&mut self) {
        self.peaks.retain(|peak| peak.charge.is_some());
    }

    /// Assign charges and isotopes, see [`deisotope`].
    pub fn deisotope(&mut self, config: &DeisotopeConfig) -> Result<()> {
        *self = deisotope(self, config)?;
        Ok(())
    }

    /// Recalculate to singly charged peaks, see [`deconvolute`].
    pub fn deconvolute(&mut self, mass_type: MassType) -> Result<()> {
        *self = deconvolute(self, mass_type)?;
        Ok(())
    }
}

// m/z first, remaining fields break ties so the order never depends on insertion order
fn canonical_order(a: &Peak, b: &Peak) -> Ordering {
    OrderedFloat(a.mz)
        .cmp(&OrderedFloat(b.mz))
        .then_with(|| OrderedFloat(a.intensity()).cmp(&OrderedFloat(b.intensity())))
        .then_with(|| a.fwhm.map(OrderedFloat).cmp(&b.fwhm.map(OrderedFloat)))
        .then_with(|| OrderedFloat(a.ai).cmp(&OrderedFloat(b.ai)))
        .then_with(|| a.sn.map(OrderedFloat).cmp(&b.sn.map(OrderedFloat)))
        .then_with(|| a.charge.cmp(&b.charge))
        .then_with(|| a.isotope.cmp(&b.isotope))
        .then_with(|| a.group.cmp(&b.group))
}

impl Index<usize> for PeakList {
    type Output = Peak;

    fn index(&self, index: usize) -> &Peak {
        &self.peaks[index]
    }
}

impl<'a> IntoIterator for &'a PeakList {
    type Item = &'a Peak;
    type IntoIter = std::slice::Iter<'a, Peak>;

    fn into_iter(self) -> Self::IntoIter {
        self.peaks.iter()
    }
}

impl From<Vec<Peak>> for PeakList {
    fn from(peaks: Vec<Peak>) -> Self {
        PeakList::new(peaks)
    }
}

impl Add for PeakList {
    type Output = PeakList;

    fn add(mut self, other: PeakList) -> PeakList {
        self.combine(&other);
        self
    }
}

impl Mul<f64> for PeakList {
    type Output = PeakList;

    fn mul(mut self, factor: f64) -> PeakList {
        self.multiply(factor);
        self
    }
}

impl Display for PeakList {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let preview: Vec<String> = self.peaks.iter().take(5).map(|peak| format!("({}, {})", peak.mz, peak.intensity())).collect();
        write!(f, "PeakList(len: {}, peaks: [{}", self.len(), preview.join(", "))?;
        if self.len() > 5 {
            write!(f, ", ...")?;
        }
        write!(f, "])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peaks() -> PeakList {
        PeakList::from_pairs(&[(300.0, 30.0), (100.0, 10.0), (200.0, 60.0)])
    }

    #[test]
    fn test_sorted_edits() {
        let mut list = peaks();
        assert_eq!(list.iter().map(|p| p.mz).collect::<Vec<_>>(), vec![100.0, 200.0, 300.0]);

        list.push(Peak::new(150.0, 5.0));
        assert_eq!(list[1].mz, 150.0);

        list.set(0, Peak::new(400.0, 120.0)).unwrap();
        assert_eq!(list[3].mz, 400.0);
        assert_eq!(list.basepeak().unwrap().mz, 400.0);
        assert!(list.set(10, Peak::new(1.0, 1.0)).is_err());

        list.delete(&[0, 3, 42]);
        assert_eq!(list.iter().map(|p| p.mz).collect::<Vec<_>>(), vec![200.0, 300.0]);
        assert_eq!(list.remove(1).unwrap().mz, 300.0);
        assert!(list.remove(1).is_none());
    }

    #[test]
    fn test_order_independent_of_insertion() {
        let peaks = vec![
            Peak::new(100.0, 10.0).with_fwhm(0.2),
            Peak::new(100.0, 30.0),
            Peak::new(100.0, 10.0).with_fwhm(0.1),
            Peak::new(200.0, 30.0),
            Peak::new(100.0, 30.0).with_charge(2),
        ];
        let forward = PeakList::new(peaks.clone());
        let reversed = PeakList::new(peaks.iter().rev().cloned().collect());
        assert_eq!(forward, reversed);
        assert_eq!(forward.basepeak(), reversed.basepeak());

        let mut pushed = PeakList::default();
        for peak in peaks.iter().rev() {
            pushed.push(peak.clone());
        }
        assert_eq!(pushed, forward);

        let (mut a, mut b) = (forward.clone(), reversed.clone());
        a.consolidate(0.5, true);
        b.consolidate(0.5, true);
        assert_eq!(a, b);

        let mut updated = forward.clone();
        updated.update_intensity(0, 50.0, 0.0).unwrap();
        assert_eq!(updated[updated.len() - 2].intensity(), 50.0);
    }

    #[test]
    fn test_relative_intensities_follow_updates() {
        let mut list = peaks();
        assert_eq!(list.relative_intensity(0), Some(10.0 / 60.0));
        list.update_intensity(1, 20.0, 10.0).unwrap();
        assert_eq!(list.basepeak().unwrap().mz, 300.0);
        assert_eq!(list.relative_intensities(), vec![1.0 / 3.0, 1.0 / 3.0, 1.0]);

        let zero = PeakList::from_pairs(&[(1.0, 0.0), (2.0, 0.0)]);
        assert_eq!(zero.relative_intensities(), vec![1.0, 1.0]);
        assert_eq!(PeakList::default().relative_intensity(0), None);
    }

    #[test]
    fn test_crop_multiply_combine() {
        let mut list = peaks();
        list.crop(150.0, 300.0);
        assert_eq!(list.len(), 2);

        let scaled = list.clone() * 2.0;
        assert_eq!(scaled[0].intensity(), 120.0);

        let combined = scaled + PeakList::from_pairs(&[(250.0, 1.0)]);
        assert_eq!(combined.iter().map(|p| p.mz).collect::<Vec<_>>(), vec![200.0, 250.0, 300.0]);
    }

    #[test]
    fn test_consolidate_uses_peak_widths() {
        let mut list = PeakList::new(vec![
            Peak::new(100.0, 10.0).with_fwhm(0.4),
            Peak::new(100.08, 10.0).with_fwhm(0.4),
            Peak::new(100.2, 10.0),
        ]);
        list.consolidate(0.01, false);
        assert_eq!(list.len(), 2);
        assert!((list[0].mz - 100.04).abs() < 1e-9);
        assert!((list[0].fwhm.unwrap() - 0.4).abs() < 1e-12);

        let mut forced = PeakList::new(vec![
            Peak::new(100.0, 10.0).with_fwhm(0.4),
            Peak::new(100.08, 10.0).with_fwhm(0.4),
        ]);
        forced.consolidate(0.01, true);
        assert_eq!(forced.len(), 2);
    }

    #[test]
    fn test_threshold_and_shoulders() {
        let mut list = PeakList::new(vec![
            Peak::new(100.0, 100.0).with_sn(100.0),
            Peak::new(100.02, 2.0).with_sn(1.0),
            Peak::new(101.0, 40.0).with_sn(20.0),
            Peak::new(102.0, 8.0).with_sn(4.0),
        ]);
        let mut thresholded = list.clone();
        thresholded.remove_threshold(0.0, 0.05, 3.0);
        assert_eq!(thresholded.iter().map(|p| p.mz).collect::<Vec<_>>(), vec![100.0, 101.0, 102.0]);

        list.remove_shoulders(2.5, 0.05, 0.01);
        assert_eq!(list.iter().map(|p| p.mz).collect::<Vec<_>>(), vec![100.0, 101.0, 102.0]);
    }

    #[test]
    fn test_charge_filters() {
        let mut monoisotopic = Peak::new(100.0, 10.0).with_charge(1);
        monoisotopic.isotope = Some(0);
        let mut isotope = Peak::new(101.0, 5.0).with_charge(1);
        isotope.isotope = Some(1);
        let list = PeakList::new(vec![monoisotopic, isotope, Peak::new(150.0, 3.0)]);

        let mut without_isotopes = list.clone();
        without_isotopes.remove_isotopes();
        assert_eq!(without_isotopes.iter().map(|p| p.mz).collect::<Vec<_>>(), vec![100.0, 150.0]);

        let mut charged = list.clone();
        charged.remove_uncharged();
        assert_eq!(charged.len(), 2);
    }

    #[test]
    fn test_bincode_round_trip() {
        let list = peaks();
        let bytes = bincode::encode_to_vec(&list, bincode::config::standard()).unwrap();
        let (decoded, _): (PeakList, usize) = bincode::decode_from_slice(&bytes, bincode::config::standard()).unwrap();
        assert_eq!(decoded, list);
    }
}
