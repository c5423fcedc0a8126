use mzcalc::stopper;
use mzcalc::{pattern, Compound, Error, PatternConfig};

// the stop flag is process-wide, so every step runs inside one test
#[test]
fn stop_aborts_one_operation() {
    let compound = Compound::new("C200H320N50O60S2").unwrap();
    let config = PatternConfig::default();

    stopper::stop();
    assert!(stopper::is_stopped());
    assert!(matches!(pattern(&compound, &config), Err(Error::Cancelled)));
    assert!(!stopper::is_stopped());

    let isotopes = pattern(&compound, &config).unwrap();
    assert!(!isotopes.is_empty());

    stopper::stop();
    stopper::start();
    assert!(pattern(&compound, &config).is_ok());
}
