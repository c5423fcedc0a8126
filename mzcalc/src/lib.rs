pub mod error;
pub mod stopper;

// chemistry module
pub mod chemistry {
    pub mod constants;
    pub mod elements;
    pub mod compound;
    pub mod formulas;
}

// algorithm module
pub mod algorithm {
    pub mod isotope;
    pub mod profile;
    pub mod peak_picking;
    pub mod least_squares;
    pub mod calibration;
    pub mod envelope_fit;
}

// data module
pub mod data {
    pub mod signal;
    pub mod peak;
    pub mod peak_list;
}

pub use crate::algorithm::calibration::{calibration, CalibrationKind, CalibrationModel};
pub use crate::algorithm::isotope::{pattern, IsotopePattern, PatternConfig};
pub use crate::chemistry::compound::Compound;
pub use crate::chemistry::formulas::{Agent, MassType};
pub use crate::data::peak::Peak;
pub use crate::data::peak_list::PeakList;
pub use crate::data::signal::{Baseline, Signal};
pub use crate::error::{Error, FormulaError, Result};
