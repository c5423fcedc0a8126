use thiserror::Error;

/// Problems found while validating a chemical formula expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    #[error("Wrong formula: {0}")]
    Syntax(String),
    #[error("Unknown element {symbol} in formula {formula}")]
    UnknownElement { symbol: String, formula: String },
    #[error("Unknown isotope {symbol}{{{mass_number}}} in formula {formula}")]
    UnknownIsotope {
        symbol: String,
        mass_number: String,
        formula: String,
    },
    #[error("Wrong number of brackets in formula: {0}")]
    UnbalancedBrackets(String),
    #[error("Atom count {count} out of range in formula {formula}")]
    CountOverflow { count: String, formula: String },
}

/// Errors raised by the numeric core.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Formula(#[from] FormulaError),

    /// Empty or degenerate input where at least one sample or peak is required.
    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Numeric failure: {0}")]
    Numeric(String),

    #[error("Unknown {kind}: {value}")]
    UnknownKeyword { kind: &'static str, value: String },

    /// Raised when the process-wide stop flag was observed.
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration could not be parsed: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn unknown(kind: &'static str, value: &str) -> Self {
        Error::UnknownKeyword {
            kind,
            value: value.to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formula_error_message() {
        let err: Error = FormulaError::UnknownIsotope {
            symbol: "C".to_string(),
            mass_number: "15".to_string(),
            formula: "C{15}H4".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Unknown isotope C{15} in formula C{15}H4");
    }

    #[test]
    fn test_unknown_keyword() {
        let err = Error::unknown("units", "mmu");
        assert_eq!(err.to_string(), "Unknown units: mmu");
        assert!(!err.is_cancelled());
        assert!(Error::Cancelled.is_cancelled());
    }
}
