use mzcalc::chemistry::elements::{self, ElementTable};
use mzcalc::Compound;

#[test]
fn installed_elements_are_used_by_new_compounds() {
    assert!(Compound::new("Zq2").is_err());

    let overrides = ElementTable::from_json_str(
        r#"[{"symbol": "Zq", "name": "Testium", "atomic_number": 250,
             "isotopes": [{"mass_number": 300, "mass": 300.0, "abundance": 1.0}]}]"#,
    )
    .unwrap();
    elements::extend(overrides);

    let compound = Compound::new("Zq2H2").unwrap();
    assert!((compound.mono_mass() - (600.0 + 2.0 * 1.00782503207)).abs() < 1e-6);
    assert!(elements::table().contains("C"));
}
