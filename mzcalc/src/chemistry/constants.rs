// Physical constants used throughout the crate, in unified atomic mass units
pub const ELECTRON_MASS: f64 = 0.00054857990924;
pub const MASS_PROTON: f64 = 1.007276466621;
pub const MASS_NEUTRON: f64 = 1.00866491595;

// Average spacing of isotope peaks in peptides and proteins
pub const ISOTOPE_DISTANCE: f64 = 1.00287;

// Averagine building blocks, average atom counts per residue
pub const AVERAGE_AMINO: [(&str, f64); 5] = [
    ("C", 4.9384),
    ("H", 7.7583),
    ("N", 1.3577),
    ("O", 1.4773),
    ("S", 0.0417),
];

pub const AVERAGE_BASE: [(&str, f64); 5] = [
    ("C", 9.75),
    ("H", 12.25),
    ("N", 3.75),
    ("O", 6.0),
    ("P", 1.0),
];
