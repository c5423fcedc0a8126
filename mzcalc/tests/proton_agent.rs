use mzcalc::chemistry::elements::{self, ElementTable};
use mzcalc::Agent;

// installs a table without hydrogen, so it runs in its own binary
#[test_log::test]
fn proton_does_not_depend_on_the_element_table() {
    let carbon_only = ElementTable::from_json_str(
        r#"[{"symbol": "C", "name": "Carbon", "atomic_number": 6, "valence": 4,
             "isotopes": [{"mass_number": 12, "mass": 12.0, "abundance": 0.9893}]}]"#,
    )
    .unwrap();
    elements::install(carbon_only);

    assert!(Agent::parse("H").is_err());
    match Agent::proton() {
        Agent::Formula(compound) => {
            assert_eq!(compound.composition().get("H"), Some(&1));
            assert_eq!(compound.composition().len(), 1);
        }
        Agent::Electron => panic!("proton fell back to the electron agent"),
    }

    elements::install(ElementTable::builtin());
    assert_eq!(Agent::proton(), Agent::parse("H").unwrap());
}
