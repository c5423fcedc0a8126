use mzcalc::algorithm::peak_picking::{averagine, deisotope, label_scan, DeisotopeConfig, ScanConfig};
use mzcalc::algorithm::profile::{profile, ProfileConfig, ProfilePeak};
use mzcalc::chemistry::constants::AVERAGE_AMINO;
use mzcalc::{calibration, pattern, CalibrationKind, MassType, Peak, PeakList, PatternConfig};

#[test]
fn profile_peaks_are_recovered_by_label_scan() {
    let sticks = [(500.0, 100.0), (501.5, 50.0), (700.0, 80.0)];
    let peaks: Vec<ProfilePeak> = sticks.iter().map(|&stick| ProfilePeak::from(stick)).collect();
    let fwhm = 0.05;
    let signal = profile(&peaks, &ProfileConfig { fwhm, points: 50, ..ProfileConfig::default() }).unwrap();

    let labelled = label_scan(&signal, &ScanConfig::default(), None).unwrap();
    assert_eq!(labelled.len(), sticks.len());
    for (peak, &(mz, intensity)) in labelled.iter().zip(&sticks) {
        assert!((peak.mz - mz).abs() < fwhm / 20.0, "{} vs {}", peak.mz, mz);
        assert!((peak.intensity() - intensity).abs() < intensity * 0.01, "{} vs {}", peak.intensity(), intensity);
        assert!((peak.fwhm.unwrap() - fwhm).abs() < fwhm * 0.05);
    }
}

#[test]
fn averagine_cluster_is_deisotoped_and_deconvoluted() {
    let peptide = averagine(800.0, 2, &AVERAGE_AMINO).unwrap();
    let config = PatternConfig { charge: 2, real: false, ..PatternConfig::default() };
    let isotopes = pattern(&peptide, &config).unwrap();
    assert!(isotopes.len() >= 4);

    let peaks: Vec<Peak> = isotopes.iter().map(|&(mz, abundance)| Peak::new(mz, abundance * 1000.0)).collect();
    let mut peaklist = PeakList::new(peaks);
    let deisotoped = deisotope(&peaklist, &DeisotopeConfig { max_charge: 3, ..DeisotopeConfig::default() }).unwrap();

    assert_eq!(deisotoped[0].charge, Some(2));
    assert_eq!(deisotoped[0].isotope, Some(0));
    assert_eq!(deisotoped[1].isotope, Some(1));
    assert_eq!(deisotoped[2].isotope, Some(2));

    peaklist.deisotope(&DeisotopeConfig { max_charge: 3, ..DeisotopeConfig::default() }).unwrap();
    peaklist.remove_isotopes();
    peaklist.deconvolute(MassType::Monoisotopic).unwrap();
    assert_eq!(peaklist.len(), 1);
    assert_eq!(peaklist[0].charge, Some(1));
    let expected = peptide.mz(1, &mzcalc::Agent::proton(), 1).0;
    assert!((peaklist[0].mz - expected).abs() < 0.01, "{} vs {}", peaklist[0].mz, expected);
}

#[test]
fn calibration_of_exact_points() {
    let model = calibration(&[(100.0, 100.0), (200.0, 200.0)], CalibrationKind::Linear).unwrap();
    assert!((model.params[0] - 1.0).abs() < 1e-6);
    assert!(model.params[1].abs() < 1e-4);
    assert!(model.chi_square < 1e-8);

    let shift = calibration(&[(300.0, 305.0)], CalibrationKind::Linear).unwrap();
    assert_eq!(shift.params, vec![1.0, 5.0]);
    assert_eq!(shift.chi_square, 1.0);
}

#[test]
fn linear_calibration_corrects_a_ppm_error() {
    let references = [569.3, 1046.5, 1296.7, 1672.9, 2093.1];
    let measured: Vec<(f64, f64)> = references.iter().map(|&mz| (mz * (1.0 + 50e-6) + 0.002, mz)).collect();
    let model = calibration(&measured, CalibrationKind::Linear).unwrap();

    let mut peaklist = PeakList::from_pairs(&measured.iter().map(|&(mz, _)| (mz, 100.0)).collect::<Vec<_>>());
    peaklist.recalibrate(&model);
    for (peak, reference) in peaklist.iter().zip(references) {
        assert!((peak.mz - reference).abs() < 1e-4, "{} vs {}", peak.mz, reference);
    }
}
