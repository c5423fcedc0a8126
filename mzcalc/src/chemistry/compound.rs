use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::ops::AddAssign;
use std::str::FromStr;
use std::sync::{LazyLock, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::algorithm::isotope::{pattern, IsotopePattern, PatternConfig};
use crate::chemistry::elements::{table, ElementTable};
use crate::chemistry::formulas::{frules, mz_pair, rdbe, Agent, FormulaRules, MassType};
use crate::error::{FormulaError, Result};

static FORMULA_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^((\()*(([A-Z][a-z]{0,2})(\{\d+\})?((-\d+)|\d*))+(\)\d*)*)*$").expect("valid formula pattern")
});

static ELEMENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Z][a-z]{0,2})(?:\{(\d+)\})?(-?\d*)").expect("valid element pattern")
});

// atoms listed first in the canonical formula
const LEADING_ATOMS: [&str; 8] = ["C", "C{12}", "C{13}", "C{14}", "H", "H{1}", "H{2}", "H{3}"];

/// Splits an atom key like `C{13}` into its symbol and optional mass number.
///
/// # Examples
///
/// ```
/// use mzcalc::chemistry::compound::split_atom;
///
/// assert_eq!(split_atom("C{13}"), ("C", Some(13)));
/// assert_eq!(split_atom("Na"), ("Na", None));
/// ```
pub fn split_atom(atom: &str) -> (&str, Option<u32>) {
    match atom.find('{') {
        Some(start) => {
            let mass_number = atom[start + 1..].trim_end_matches('}').parse().ok();
            (&atom[..start], mass_number)
        }
        None => (atom, None),
    }
}

/// A chemical compound described by a formula expression.
///
/// The expression may contain isotope tags (`C{13}`), negative counts (`H-1`) and nested
/// bracket groups with multipliers (`(CH2)3`). The elemental composition is resolved when
/// the compound is created, formula string and masses are computed on first use and
/// cached until the expression changes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Compound {
    expression: String,
    composition: BTreeMap<String, i32>,
    formula: OnceLock<String>,
    mass: OnceLock<(f64, f64)>,
    nominal_mass: OnceLock<i64>,
}

impl Compound {
    /// Parse and validate a formula expression.
    ///
    /// Arguments:
    ///
    /// * `expression` - formula expression, e.g. `C6H12O6` or `(CH2)3C{13}H-1`
    ///
    /// Returns:
    ///
    /// * `Compound` - or a [`FormulaError`] naming the offending token
    ///
    /// # Examples
    ///
    /// ```
    /// use mzcalc::chemistry::compound::Compound;
    ///
    /// let compound = Compound::new("(CH2)3O").unwrap();
    /// assert_eq!(compound.count("C", false), 3);
    /// assert_eq!(compound.formula(), "C3H6O");
    /// assert!(Compound::new("C6H12Xy").is_err());
    /// ```
    pub fn new(expression: &str) -> Result<Self> {
        let elements = table();
        check_formula(expression, &elements)?;
        Ok(Compound {
            expression: expression.to_string(),
            composition: unfold_composition(expression)?,
            formula: OnceLock::new(),
            mass: OnceLock::new(),
            nominal_mass: OnceLock::new(),
        })
    }

    pub(crate) fn from_composition(composition: &BTreeMap<String, i32>) -> Self {
        let expression: String = composition.iter().map(|(atom, count)| format!("{}{}", atom, count)).collect();
        Compound {
            expression,
            composition: composition.iter().filter(|(_, &count)| count != 0).map(|(atom, &count)| (atom.clone(), count)).collect(),
            formula: OnceLock::new(),
            mass: OnceLock::new(),
            nominal_mass: OnceLock::new(),
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Atom counts keyed by symbol, isotope-tagged atoms are separate keys (`C{13}`).
    pub fn composition(&self) -> &BTreeMap<String, i32> {
        &self.composition
    }

    /// Number of atoms of `item`, optionally including all its isotope-tagged forms.
    pub fn count(&self, item: &str, group_isotopes: bool) -> i32 {
        let mut count = self.composition.get(item).copied().unwrap_or(0);
        if group_isotopes && split_atom(item).1.is_none() {
            count += self
                .composition
                .iter()
                .filter(|(atom, _)| {
                    let (symbol, mass_number) = split_atom(atom);
                    symbol == item && mass_number.is_some()
                })
                .map(|(_, &count)| count)
                .sum::<i32>();
        }
        count
    }

    /// Canonical formula, carbon and hydrogen first and the rest in lexical order.
    pub fn formula(&self) -> &str {
        self.formula.get_or_init(|| {
            let mut formula = String::new();
            let mut push = |atom: &str, count: i32| {
                formula.push_str(atom);
                if count != 1 {
                    formula.push_str(&count.to_string());
                }
            };
            for atom in LEADING_ATOMS {
                if let Some(&count) = self.composition.get(atom) {
                    push(atom, count);
                }
            }
            for (atom, &count) in &self.composition {
                if !LEADING_ATOMS.contains(&atom.as_str()) {
                    push(atom, count);
                }
            }
            formula
        })
    }

    /// Monoisotopic and average mass.
    ///
    /// # Examples
    ///
    /// ```
    /// use mzcalc::chemistry::compound::Compound;
    ///
    /// let water = Compound::new("H2O").unwrap();
    /// let (mono, avg) = water.mass();
    /// assert!((mono - 18.010565).abs() < 1e-6);
    /// assert!((avg - 18.01528).abs() < 1e-3);
    /// ```
    pub fn mass(&self) -> (f64, f64) {
        *self.mass.get_or_init(|| {
            let elements = table();
            self.atoms(&elements).fold((0.0, 0.0), |(mono, avg), (masses, count)| {
                (mono + masses.0 * count as f64, avg + masses.1 * count as f64)
            })
        })
    }

    pub fn mass_of(&self, mass_type: MassType) -> f64 {
        mass_type.select(self.mass())
    }

    pub fn mono_mass(&self) -> f64 {
        self.mass().0
    }

    pub fn avg_mass(&self) -> f64 {
        self.mass().1
    }

    /// Sum of the rounded monoisotopic atom masses.
    pub fn nominal_mass(&self) -> i64 {
        *self.nominal_mass.get_or_init(|| {
            let elements = table();
            self.atoms(&elements)
                .map(|(masses, count)| masses.0.round() as i64 * count as i64)
                .sum()
        })
    }

    // (mono, avg) atom masses with counts, tagged isotopes use their exact mass for both
    fn atoms<'a>(&'a self, elements: &'a ElementTable) -> impl Iterator<Item = ((f64, f64), i32)> + 'a {
        self.composition.iter().filter_map(move |(atom, &count)| {
            let (symbol, mass_number) = split_atom(atom);
            let element = elements.get(symbol);
            if element.is_none() {
                log::warn!("element {} missing from the element table", symbol);
            }
            let masses = match mass_number {
                Some(mass_number) => element?.isotope(mass_number).map(|isotope| (isotope.mass, isotope.mass))?,
                None => element?.masses(),
            };
            Some((masses, count))
        })
    }

    /// Ion m/z as (monoisotopic, average) for the given charge and charging agent.
    pub fn mz(&self, charge: i32, agent: &Agent, agent_charge: i32) -> (f64, f64) {
        mz_pair(self.mass(), charge, 0, agent, agent_charge)
    }

    /// Composition of the ion formed by `charge / agent_charge` agents.
    pub fn ion_composition(&self, charge: i32, agent: &Agent, agent_charge: i32) -> BTreeMap<String, i32> {
        let mut composition = self.composition.clone();
        if let (Agent::Formula(agent), true) = (agent, charge != 0 && agent_charge != 0) {
            let multiplier = charge / agent_charge;
            for (atom, count) in agent.composition() {
                *composition.entry(atom.clone()).or_insert(0) += count * multiplier;
            }
        }
        composition.retain(|_, count| *count != 0);
        composition
    }

    /// Checks that the ion has no negative atom counts.
    ///
    /// # Examples
    ///
    /// ```
    /// use mzcalc::chemistry::compound::Compound;
    /// use mzcalc::chemistry::formulas::Agent;
    ///
    /// let loss = Compound::new("CH4H-5").unwrap();
    /// assert!(!loss.is_valid_ion(0, &Agent::proton(), 1));
    /// assert!(loss.is_valid_ion(1, &Agent::proton(), 1));
    /// ```
    pub fn is_valid_ion(&self, charge: i32, agent: &Agent, agent_charge: i32) -> bool {
        self.ion_composition(charge, agent, agent_charge).values().all(|&count| count >= 0)
    }

    /// The ion as a new compound.
    pub fn ion(&self, charge: i32, agent: &Agent, agent_charge: i32) -> Compound {
        Compound::from_composition(&self.ion_composition(charge, agent, agent_charge))
    }

    /// Flip the sign of every atom count.
    pub fn negate(&mut self) {
        let expression: String = self
            .composition
            .iter()
            .map(|(atom, count)| format!("{}{}", atom, -count))
            .collect();
        self.composition.values_mut().for_each(|count| *count = -*count);
        self.expression = expression;
        self.reset();
    }

    /// Append a formula expression.
    pub fn append(&mut self, expression: &str) -> Result<()> {
        let elements = table();
        check_formula(expression, &elements)?;
        let combined = format!("{}{}", self.expression, expression);
        self.composition = unfold_composition(&combined)?;
        self.expression = combined;
        self.reset();
        Ok(())
    }

    fn reset(&mut self) {
        self.formula = OnceLock::new();
        self.mass = OnceLock::new();
        self.nominal_mass = OnceLock::new();
    }

    pub fn rdbe(&self) -> f64 {
        rdbe(self)
    }

    pub fn frules(&self, rules: &FormulaRules) -> bool {
        frules(self, rules)
    }

    pub fn pattern(&self, config: &PatternConfig) -> Result<IsotopePattern> {
        pattern(self, config)
    }
}

impl PartialEq for Compound {
    fn eq(&self, other: &Self) -> bool {
        self.composition == other.composition
    }
}

impl FromStr for Compound {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        Compound::new(s)
    }
}

impl TryFrom<String> for Compound {
    type Error = crate::error::Error;

    fn try_from(value: String) -> Result<Self> {
        Compound::new(&value)
    }
}

impl From<Compound> for String {
    fn from(compound: Compound) -> Self {
        compound.expression
    }
}

impl AddAssign<&Compound> for Compound {
    fn add_assign(&mut self, other: &Compound) {
        self.expression.push_str(&other.expression);
        for (atom, count) in &other.composition {
            *self.composition.entry(atom.clone()).or_insert(0) += count;
        }
        self.composition.retain(|_, count| *count != 0);
        self.reset();
    }
}

impl Display for Compound {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formula())
    }
}

fn check_formula(formula: &str, elements: &ElementTable) -> std::result::Result<(), FormulaError> {
    if !FORMULA_PATTERN.is_match(formula) {
        return Err(FormulaError::Syntax(formula.to_string()));
    }

    for captures in ELEMENT_PATTERN.captures_iter(formula) {
        let symbol = &captures[1];
        let element = elements.get(symbol).ok_or_else(|| FormulaError::UnknownElement {
            symbol: symbol.to_string(),
            formula: formula.to_string(),
        })?;
        if let Some(mass_number) = captures.get(2) {
            let known = mass_number
                .as_str()
                .parse::<u32>()
                .ok()
                .and_then(|mass_number| element.isotope(mass_number))
                .is_some();
            if !known {
                return Err(FormulaError::UnknownIsotope {
                    symbol: symbol.to_string(),
                    mass_number: mass_number.as_str().to_string(),
                    formula: formula.to_string(),
                });
            }
        }
    }

    let mut depth: i32 = 0;
    for c in formula.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return Err(FormulaError::UnbalancedBrackets(formula.to_string()));
        }
    }
    if depth != 0 {
        return Err(FormulaError::UnbalancedBrackets(formula.to_string()));
    }

    Ok(())
}

// parses a count, i32::MIN is rejected so every count can be negated
fn parse_count(digits: &str, expression: &str) -> std::result::Result<i32, FormulaError> {
    digits
        .parse::<i32>()
        .ok()
        .filter(|&count| count != i32::MIN)
        .ok_or_else(|| overflow(digits, expression))
}

fn overflow(count: &str, expression: &str) -> FormulaError {
    FormulaError::CountOverflow {
        count: count.to_string(),
        formula: expression.to_string(),
    }
}

fn add_count(
    target: &mut BTreeMap<String, i32>,
    atom: String,
    count: i32,
    expression: &str,
) -> std::result::Result<(), FormulaError> {
    let entry = target.entry(atom).or_insert(0);
    *entry = entry
        .checked_add(count)
        .filter(|&total| total != i32::MIN)
        .ok_or_else(|| overflow(&count.to_string(), expression))?;
    Ok(())
}

// counts atoms of a validated expression, bracket groups are multiplied by their trailing count
fn unfold_composition(expression: &str) -> std::result::Result<BTreeMap<String, i32>, FormulaError> {
    let mut stack: Vec<BTreeMap<String, i32>> = vec![BTreeMap::new()];
    let mut i = 0;

    while i < expression.len() {
        let rest = &expression[i..];
        if rest.starts_with('(') {
            stack.push(BTreeMap::new());
            i += 1;
        } else if rest.starts_with(')') {
            let digits: String = rest[1..].chars().take_while(|c| c.is_ascii_digit()).collect();
            let multiplier = match digits.as_str() {
                "" => 1,
                digits => parse_count(digits, expression)?,
            };
            i += 1 + digits.len();
            let group = stack.pop().unwrap_or_default();
            if stack.is_empty() {
                stack.push(BTreeMap::new());
            }
            if let Some(parent) = stack.last_mut() {
                for (atom, count) in group {
                    let total = count
                        .checked_mul(multiplier)
                        .ok_or_else(|| overflow(&format!("{}*{}", count, multiplier), expression))?;
                    add_count(parent, atom, total, expression)?;
                }
            }
        } else if let Some(captures) = ELEMENT_PATTERN.captures(rest).filter(|c| c.get(0).map_or(false, |m| m.start() == 0)) {
            let atom = match captures.get(2) {
                Some(mass_number) => format!("{}{{{}}}", &captures[1], mass_number.as_str()),
                None => captures[1].to_string(),
            };
            let count = match &captures[3] {
                "" => 1,
                digits => parse_count(digits, expression)?,
            };
            if let Some(current) = stack.last_mut() {
                add_count(current, atom, count, expression)?;
            }
            i += captures[0].len();
        } else {
            i += rest.chars().next().map_or(1, char::len_utf8);
        }
    }

    let mut composition = BTreeMap::new();
    for group in stack {
        for (atom, count) in group {
            add_count(&mut composition, atom, count, expression)?;
        }
    }
    composition.retain(|_, count| *count != 0);
    Ok(composition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_composition_with_brackets_and_isotopes() {
        let compound = Compound::new("C{13}2(CH2(OH)2)3H-1").unwrap();
        let composition = compound.composition();
        assert_eq!(composition.get("C{13}"), Some(&2));
        assert_eq!(composition.get("C"), Some(&3));
        assert_eq!(composition.get("H"), Some(&11));
        assert_eq!(composition.get("O"), Some(&6));
        assert_eq!(compound.count("C", true), 5);
        assert_eq!(compound.count("C", false), 3);
    }

    #[test]
    fn test_zero_counts_removed() {
        let compound = Compound::new("CH4H-4").unwrap();
        assert_eq!(compound.composition().len(), 1);
        assert_eq!(compound.formula(), "C");
        let empty = Compound::new("").unwrap();
        assert!(empty.composition().is_empty());
        assert_eq!(empty.mass(), (0.0, 0.0));
    }

    #[test]
    fn test_formula_errors() {
        assert!(matches!(Compound::new("C6h12"), Err(Error::Formula(FormulaError::Syntax(_)))));
        assert!(matches!(
            Compound::new("C6Xx12"),
            Err(Error::Formula(FormulaError::UnknownElement { ref symbol, .. })) if symbol == "Xx"
        ));
        assert!(matches!(Compound::new("C{15}H4"), Err(Error::Formula(FormulaError::UnknownIsotope { .. }))));
        assert!(matches!(Compound::new("((CH2)3"), Err(Error::Formula(FormulaError::UnbalancedBrackets(_)))));
        assert!(matches!(Compound::new("C)(H"), Err(Error::Formula(FormulaError::UnbalancedBrackets(_)))));
    }

    #[test]
    fn test_counts_out_of_range() {
        assert!(matches!(
            Compound::new("C99999999999"),
            Err(Error::Formula(FormulaError::CountOverflow { ref count, .. })) if count == "99999999999"
        ));
        assert!(matches!(
            Compound::new("(C100000)100000"),
            Err(Error::Formula(FormulaError::CountOverflow { .. }))
        ));
        assert!(matches!(
            Compound::new("C2147483647C"),
            Err(Error::Formula(FormulaError::CountOverflow { .. }))
        ));
        assert!(matches!(
            Compound::new("H-2147483648"),
            Err(Error::Formula(FormulaError::CountOverflow { .. }))
        ));
        let mut water = Compound::new("H2O").unwrap();
        assert!(water.append("(H1000000)1000000").is_err());

        let large = Compound::new("(C1000)1000").unwrap();
        assert_eq!(large.count("C", false), 1_000_000);
    }

    #[test]
    fn test_formula_ordering() {
        let compound = Compound::new("NaClOH{2}C{13}H3C2").unwrap();
        assert_eq!(compound.formula(), "C2C{13}H3H{2}ClNaO");
    }

    #[test]
    fn test_masses() {
        let glucose = Compound::new("C6H12O6").unwrap();
        assert!((glucose.mono_mass() - 180.0633881).abs() < 1e-6);
        assert!((glucose.avg_mass() - 180.156).abs() < 0.01);
        assert_eq!(glucose.nominal_mass(), 180);

        let labelled = Compound::new("C{13}6H12O6").unwrap();
        assert!((labelled.mono_mass() - glucose.mono_mass() - 6.0 * 1.0033548378).abs() < 1e-6);
        assert_eq!(labelled.mono_mass(), labelled.mass_of(MassType::Monoisotopic));
    }

    #[test]
    fn test_negate_and_append() {
        let mut compound = Compound::new("H2O").unwrap();
        let mass = compound.mono_mass();
        compound.negate();
        assert_eq!(compound.expression(), "H-2O-1");
        assert!((compound.mono_mass() + mass).abs() < 1e-9);

        compound.append("H2O").unwrap();
        assert!(compound.composition().is_empty());
        assert!(compound.append("Qq").is_err());

        let mut water = Compound::new("H2O").unwrap();
        water += &Compound::new("H").unwrap();
        assert_eq!(water.formula(), "H3O");
    }

    #[test]
    fn test_ion_validity() {
        let compound = Compound::new("C2H5OH").unwrap();
        assert!(compound.is_valid_ion(1, &Agent::proton(), 1));
        assert!(compound.is_valid_ion(-6, &Agent::proton(), 1));
        assert!(!compound.is_valid_ion(-7, &Agent::proton(), 1));
        assert!(compound.is_valid_ion(-7, &Agent::Electron, 1));
        assert_eq!(compound.ion(2, &Agent::proton(), 1).formula(), "C2H8O");
    }

    #[test]
    fn test_serde_uses_expression() {
        let compound = Compound::new("(CH2)2").unwrap();
        let json = serde_json::to_string(&compound).unwrap();
        assert_eq!(json, "\"(CH2)2\"");
        let parsed: Compound = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, compound);
        assert!(serde_json::from_str::<Compound>("\"Zz\"").is_err());
    }
}
