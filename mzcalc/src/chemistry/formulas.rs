use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::chemistry::compound::{split_atom, Compound};
use crate::chemistry::constants::ELECTRON_MASS;
use crate::chemistry::elements::table;
use crate::error::{Error, Result};

/// Selects the monoisotopic or the average mass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MassType {
    #[default]
    Monoisotopic,
    Average,
}

impl MassType {
    pub fn select(&self, masses: (f64, f64)) -> f64 {
        match self {
            MassType::Monoisotopic => masses.0,
            MassType::Average => masses.1,
        }
    }
}

/// Units for mass errors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Units {
    #[default]
    Ppm,
    Da,
    Percent,
}

impl FromStr for Units {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ppm" => Ok(Units::Ppm),
            "Da" => Ok(Units::Da),
            "%" => Ok(Units::Percent),
            other => Err(Error::unknown("units", other)),
        }
    }
}

/// calculate the error between a measured and a calculated mass
///
/// Arguments:
///
/// * `measured` - measured mass
/// * `counted` - calculated (reference) mass
/// * `units` - error units
///
/// Returns:
///
/// * `f64` - mass error
///
/// # Examples
///
/// ```
/// use mzcalc::chemistry::formulas::{delta, Units};
///
/// assert!((delta(1000.01, 1000.0, Units::Ppm) - 10.0).abs() < 1e-6);
/// assert!((delta(1000.01, 1000.0, Units::Da) - 0.01).abs() < 1e-9);
/// ```
pub fn delta(measured: f64, counted: f64, units: Units) -> f64 {
    match units {
        Units::Ppm => (measured - counted) / counted * 1_000_000.0,
        Units::Da => measured - counted,
        Units::Percent => (measured - counted) / counted * 100.0,
    }
}

/// Charging agent used to form ions.
#[derive(Clone, Debug, PartialEq)]
pub enum Agent {
    Electron,
    Formula(Compound),
}

impl Agent {
    /// A proton agent (`H` with unit charge).
    ///
    /// Built from its composition, so it does not depend on the installed element table.
    pub fn proton() -> Agent {
        Agent::Formula(Compound::from_composition(&BTreeMap::from([("H".to_string(), 1)])))
    }

    /// `e` is the electron, anything else a formula.
    pub fn parse(agent: &str) -> Result<Agent> {
        match agent {
            "e" => Ok(Agent::Electron),
            formula => Ok(Agent::Formula(Compound::new(formula)?)),
        }
    }

    /// (mono, avg) mass carried by one agent of charge `agent_charge`.
    pub fn mass(&self, agent_charge: i32) -> (f64, f64) {
        match self {
            Agent::Electron => (ELECTRON_MASS, ELECTRON_MASS),
            Agent::Formula(compound) => {
                let (mono, avg) = compound.mass();
                let electrons = agent_charge as f64 * ELECTRON_MASS;
                (mono - electrons, avg - electrons)
            }
        }
    }
}

impl Default for Agent {
    fn default() -> Self {
        Agent::proton()
    }
}

impl FromStr for Agent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Agent::parse(s)
    }
}

fn recharge(mass: f64, agent_mass: f64, charge: i32, current_charge: i32, agent_charge: i32) -> f64 {
    let mut mass = mass;
    if current_charge != 0 {
        mass = mass * current_charge.abs() as f64 - agent_mass * (current_charge as f64 / agent_charge as f64);
    }
    if charge == 0 {
        return mass;
    }
    (mass + agent_mass * (charge as f64 / agent_charge as f64)) / charge.abs() as f64
}

/// calculate the m/z of a (mono, avg) mass pair
///
/// Arguments:
///
/// * `mass` - (monoisotopic, average) mass, charged with `current_charge`
/// * `charge` - final charge, 0 gives the neutral mass
/// * `current_charge` - charge of the given mass
/// * `agent` - charging agent
/// * `agent_charge` - charge of one agent unit
///
/// Returns:
///
/// * `(f64, f64)` - (monoisotopic, average) m/z
///
/// # Examples
///
/// ```
/// use mzcalc::chemistry::formulas::{mz_pair, Agent};
/// use mzcalc::chemistry::constants::MASS_PROTON;
///
/// let (mono, _) = mz_pair((1000.0, 1000.6), 2, 0, &Agent::proton(), 1);
/// assert!((mono - (1000.0 + 2.0 * MASS_PROTON) / 2.0).abs() < 1e-6);
/// ```
pub fn mz_pair(mass: (f64, f64), charge: i32, current_charge: i32, agent: &Agent, agent_charge: i32) -> (f64, f64) {
    let agent_mass = agent.mass(agent_charge);
    (
        recharge(mass.0, agent_mass.0, charge, current_charge, agent_charge),
        recharge(mass.1, agent_mass.1, charge, current_charge, agent_charge),
    )
}

/// m/z of a single mass value, the agent mass is taken as `mass_type`.
pub fn mz(mass: f64, charge: i32, current_charge: i32, agent: &Agent, agent_charge: i32, mass_type: MassType) -> f64 {
    let agent_mass = mass_type.select(agent.mass(agent_charge));
    recharge(mass, agent_mass, charge, current_charge, agent_charge)
}

/// Rounding used to derive nominal masses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rounding {
    #[default]
    Floor,
    Ceil,
    Round,
}

impl FromStr for Rounding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "floor" => Ok(Rounding::Floor),
            "ceil" => Ok(Rounding::Ceil),
            "round" => Ok(Rounding::Round),
            other => Err(Error::unknown("rounding", other)),
        }
    }
}

pub fn nominal_mass(mass: f64, rounding: Rounding) -> f64 {
    match rounding {
        Rounding::Floor => mass.floor(),
        Rounding::Ceil => mass.ceil(),
        Rounding::Round => mass.round(),
    }
}

/// Mass defect flavours.
#[derive(Clone, Debug, PartialEq)]
pub enum MassDefect {
    Fraction,
    Standard,
    Relative,
    /// Kendrick mass defect relative to a repeating group, usually CH2.
    Kendrick(Compound),
}

impl MassDefect {
    pub fn kendrick() -> Result<MassDefect> {
        Ok(MassDefect::Kendrick(Compound::new("CH2")?))
    }
}

impl FromStr for MassDefect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fraction" => Ok(MassDefect::Fraction),
            "standard" => Ok(MassDefect::Standard),
            "relative" => Ok(MassDefect::Relative),
            "kendrick" => MassDefect::kendrick(),
            other => Err(Error::unknown("mass defect type", other)),
        }
    }
}

/// calculate the mass defect of a monoisotopic mass
///
/// # Examples
///
/// ```
/// use mzcalc::chemistry::formulas::{mass_defect, MassDefect, Rounding};
///
/// assert!((mass_defect(1000.4, &MassDefect::Standard, Rounding::Floor) - 0.4).abs() < 1e-9);
/// assert!((mass_defect(1000.4, &MassDefect::Relative, Rounding::Floor) - 400.0 / 1.0004).abs() < 1e-6);
/// ```
pub fn mass_defect(mass: f64, defect: &MassDefect, rounding: Rounding) -> f64 {
    match defect {
        MassDefect::Fraction => mass - mass.floor(),
        MassDefect::Standard => mass - nominal_mass(mass, rounding),
        MassDefect::Relative => 1e6 * (mass - nominal_mass(mass, rounding)) / mass,
        MassDefect::Kendrick(group) => {
            let factor = group.nominal_mass() as f64 / group.mono_mass();
            nominal_mass(mass * factor, rounding) - mass * factor
        }
    }
}

/// Ring and double bond equivalents.
///
/// # Examples
///
/// ```
/// use mzcalc::chemistry::compound::Compound;
/// use mzcalc::chemistry::formulas::rdbe;
///
/// assert_eq!(rdbe(&Compound::new("C6H6").unwrap()), 4.0);
/// ```
pub fn rdbe(compound: &Compound) -> f64 {
    let elements = table();
    let mut symbols: Vec<&str> = compound.composition().keys().map(|atom| split_atom(atom).0).collect();
    symbols.sort_unstable();
    symbols.dedup();

    let mut value = 0.0;
    for symbol in symbols {
        let valence = elements.get(symbol).and_then(|element| element.valence).unwrap_or(0);
        if valence != 0 {
            value += (valence - 2) as f64 * compound.count(symbol, true) as f64;
        }
    }
    value / 2.0 + 1.0
}

/// Heuristic formula plausibility rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormulaRule {
    /// H/C ratio within limits.
    HC,
    /// N/C, O/C, P/C and S/C ratios below limits.
    NOPSC,
    /// Element count combinations of N, O, P and S.
    NOPS,
    /// RDBE within limits.
    RDBE,
    /// RDBE must be an integer.
    RDBEInt,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FormulaRules {
    pub rules: Vec<FormulaRule>,
    pub hc: (f64, f64),
    pub nopsc: (f64, f64, f64, f64),
    pub rdbe: (f64, f64),
}

impl Default for FormulaRules {
    fn default() -> Self {
        FormulaRules {
            rules: vec![FormulaRule::HC, FormulaRule::NOPSC, FormulaRule::NOPS, FormulaRule::RDBE],
            hc: (0.1, 3.0),
            nopsc: (4.0, 3.0, 2.0, 3.0),
            rdbe: (-1.0, 40.0),
        }
    }
}

/// check a compound against formula rules
///
/// Arguments:
///
/// * `compound` - compound to check
/// * `rules` - rules and their limits
///
/// Returns:
///
/// * `bool` - true if all selected rules pass
pub fn frules(compound: &Compound, rules: &FormulaRules) -> bool {
    let active = |rule: FormulaRule| rules.rules.contains(&rule);
    let count = |symbol: &str| compound.count(symbol, true) as f64;

    let (c, h, n, o, p, s) = (count("C"), count("H"), count("N"), count("O"), count("P"), count("S"));
    let value = rdbe(compound);

    if c != 0.0 {
        if active(FormulaRule::HC) && (h / c < rules.hc.0 || h / c > rules.hc.1) {
            return false;
        }
        let (max_n, max_o, max_p, max_s) = rules.nopsc;
        if active(FormulaRule::NOPSC) && (n / c > max_n || o / c > max_o || p / c > max_p || s / c > max_s) {
            return false;
        }
    }

    if active(FormulaRule::NOPS) {
        let all_above = |counts: &[f64], min: f64| counts.iter().all(|&count| count > min);
        if all_above(&[n, o, p, s], 1.0) && (n >= 10.0 || o >= 20.0 || p >= 4.0 || s >= 3.0) {
            return false;
        }
        if all_above(&[n, o, p], 3.0) && (n >= 11.0 || o >= 22.0 || p >= 6.0) {
            return false;
        }
        if all_above(&[n, o, s], 1.0) && (n >= 19.0 || o >= 14.0 || s >= 8.0) {
            return false;
        }
        if all_above(&[n, p, s], 1.0) && (n >= 3.0 || p >= 3.0 || s >= 3.0) {
            return false;
        }
        if all_above(&[o, p, s], 1.0) && (o >= 14.0 || p >= 3.0 || s >= 3.0) {
            return false;
        }
    }

    if active(FormulaRule::RDBE) && (value < rules.rdbe.0 || value > rules.rdbe.1) {
        return false;
    }

    if active(FormulaRule::RDBEInt) && value.fract() != 0.0 {
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chemistry::constants::MASS_PROTON;

    #[test]
    fn test_delta_units() {
        assert!((delta(101.0, 100.0, Units::Percent) - 1.0).abs() < 1e-9);
        assert_eq!("%".parse::<Units>().unwrap(), Units::Percent);
        assert!(matches!("mmu".parse::<Units>(), Err(Error::UnknownKeyword { kind: "units", .. })));
    }

    #[test]
    fn test_mz_charge_states() {
        let agent = Agent::proton();
        let proton = agent.mass(1).0;
        assert!((proton - MASS_PROTON).abs() < 1e-6);

        let neutral = 1998.0;
        let doubly = mz(neutral, 2, 0, &agent, 1, MassType::Monoisotopic);
        assert!((doubly - (neutral + 2.0 * proton) / 2.0).abs() < 1e-9);

        // back to neutral and over to a singly charged ion
        let back = mz(doubly, 0, 2, &agent, 1, MassType::Monoisotopic);
        assert!((back - neutral).abs() < 1e-9);
        let single = mz(doubly, 1, 2, &agent, 1, MassType::Monoisotopic);
        assert!((single - (neutral + proton)).abs() < 1e-9);

        let negative = mz(neutral, -1, 0, &agent, 1, MassType::Monoisotopic);
        assert!((negative - (neutral - proton)).abs() < 1e-9);
    }

    #[test]
    fn test_electron_agent() {
        let radical = mz(500.0, 1, 0, &Agent::Electron, -1, MassType::Monoisotopic);
        assert!((radical - (500.0 - ELECTRON_MASS)).abs() < 1e-12);
        assert_eq!("e".parse::<Agent>().unwrap(), Agent::Electron);
    }

    #[test]
    fn test_proton_is_hydrogen() {
        assert_eq!(Agent::proton(), Agent::parse("H").unwrap());
        assert_eq!(Agent::default(), Agent::proton());
    }

    #[test]
    fn test_kendrick_mass_defect() {
        let defect = "kendrick".parse::<MassDefect>().unwrap();
        // CH2 itself has Kendrick mass 14.000
        let ch2 = Compound::new("CH2").unwrap().mono_mass();
        assert!(mass_defect(ch2, &defect, Rounding::Round).abs() < 1e-9);
        assert!("weird".parse::<MassDefect>().is_err());
        assert!("floor".parse::<Rounding>().is_ok());
    }

    #[test]
    fn test_rdbe_groups_isotopes() {
        let benzene = Compound::new("C{13}6H6").unwrap();
        assert_eq!(rdbe(&benzene), 4.0);
        let radical = Compound::new("CH3").unwrap();
        assert_eq!(rdbe(&radical), 0.5);
    }

    #[test]
    fn test_formula_rules() {
        let rules = FormulaRules::default();
        assert!(frules(&Compound::new("C6H12O6").unwrap(), &rules));
        // too many hydrogens per carbon
        assert!(!frules(&Compound::new("CH8").unwrap(), &rules));
        // too many oxygens per carbon
        assert!(!frules(&Compound::new("CH2O4").unwrap(), &rules));

        let strict = FormulaRules { rules: vec![FormulaRule::RDBEInt], ..FormulaRules::default() };
        assert!(!frules(&Compound::new("CH3").unwrap(), &strict));
        assert!(frules(&Compound::new("CH4").unwrap(), &strict));
    }
}
