use std::collections::BTreeMap;
use std::io::Read;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single isotope of an element.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Isotope {
    pub mass_number: u32,
    pub mass: f64,
    pub abundance: f64,
}

/// Chemical element with its natural isotope distribution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub symbol: String,
    pub name: String,
    pub atomic_number: u32,
    pub isotopes: Vec<Isotope>,
    #[serde(default)]
    pub valence: Option<i32>,
}

impl Element {
    /// Creates a new element, isotopes are kept sorted by mass number.
    ///
    /// # Examples
    ///
    /// ```
    /// use mzcalc::chemistry::elements::{Element, Isotope};
    ///
    /// let boron = Element::new("B", "Boron", 5, vec![
    ///     Isotope { mass_number: 11, mass: 11.0093055, abundance: 0.801 },
    ///     Isotope { mass_number: 10, mass: 10.012937, abundance: 0.199 },
    /// ], Some(3));
    /// assert_eq!(boron.isotopes[0].mass_number, 10);
    /// assert_eq!(boron.mono_mass(), 11.0093055);
    /// ```
    pub fn new(symbol: &str, name: &str, atomic_number: u32, mut isotopes: Vec<Isotope>, valence: Option<i32>) -> Self {
        isotopes.sort_by_key(|isotope| isotope.mass_number);
        Element {
            symbol: symbol.to_string(),
            name: name.to_string(),
            atomic_number,
            isotopes,
            valence,
        }
    }

    pub fn isotope(&self, mass_number: u32) -> Option<&Isotope> {
        self.isotopes.iter().find(|isotope| isotope.mass_number == mass_number)
    }

    /// Monoisotopic and average mass.
    ///
    /// The monoisotopic mass is the mass of the most abundant isotope, the average mass is
    /// weighted by natural abundance. Elements without any natural abundance (synthetic ones)
    /// use the mass of their first isotope for both.
    pub fn masses(&self) -> (f64, f64) {
        let mut mono = 0.0;
        let mut average = 0.0;
        let mut max_abundance = 0.0;

        for isotope in &self.isotopes {
            average += isotope.mass * isotope.abundance;
            if max_abundance < isotope.abundance {
                mono = isotope.mass;
                max_abundance = isotope.abundance;
            }
        }

        if mono == 0.0 || average == 0.0 {
            let first = self.isotopes.first().map(|isotope| isotope.mass).unwrap_or(0.0);
            return (first, first);
        }

        (mono, average)
    }

    pub fn mono_mass(&self) -> f64 {
        self.masses().0
    }

    pub fn avg_mass(&self) -> f64 {
        self.masses().1
    }

    /// Isotopes present in nature as (mass, abundance) pairs.
    pub fn distribution(&self) -> Vec<(f64, f64)> {
        self.isotopes
            .iter()
            .filter(|isotope| isotope.abundance > 0.0)
            .map(|isotope| (isotope.mass, isotope.abundance))
            .collect()
    }
}

/// Lookup table of elements by symbol.
///
/// Serialized as a JSON array of elements, which is also the format accepted by
/// [`ElementTable::from_json_str`] to extend or override the built-in table.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Element>", into = "Vec<Element>")]
pub struct ElementTable {
    elements: BTreeMap<String, Element>,
}

impl From<Vec<Element>> for ElementTable {
    fn from(elements: Vec<Element>) -> Self {
        let elements = elements
            .into_iter()
            .map(|mut element| {
                element.isotopes.sort_by_key(|isotope| isotope.mass_number);
                (element.symbol.clone(), element)
            })
            .collect();
        ElementTable { elements }
    }
}

impl From<ElementTable> for Vec<Element> {
    fn from(table: ElementTable) -> Self {
        table.elements.into_values().collect()
    }
}

impl ElementTable {
    /// Built-in table with natural isotope compositions and common valences.
    ///
    /// # Examples
    ///
    /// ```
    /// use mzcalc::chemistry::elements::ElementTable;
    ///
    /// let table = ElementTable::builtin();
    /// let carbon = table.get("C").unwrap();
    /// assert_eq!(carbon.mono_mass(), 12.0);
    /// assert!((carbon.avg_mass() - 12.0107).abs() < 1e-3);
    /// ```
    pub fn builtin() -> Self {
        ElementTable::from(builtin_elements())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn get(&self, symbol: &str) -> Option<&Element> {
        self.elements.get(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.elements.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.elements.keys().map(|symbol| symbol.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }

    /// Adds the elements of `other`, replacing existing entries with the same symbol.
    pub fn merge(&mut self, other: ElementTable) {
        for (symbol, element) in other.elements {
            if self.elements.contains_key(&symbol) {
                log::warn!("element {} overridden from configuration", symbol);
            }
            self.elements.insert(symbol, element);
        }
    }
}

static TABLE: LazyLock<RwLock<Arc<ElementTable>>> =
    LazyLock::new(|| RwLock::new(Arc::new(ElementTable::builtin())));

/// Snapshot of the process-wide element table.
pub fn table() -> Arc<ElementTable> {
    TABLE.read().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Replace the process-wide element table.
///
/// Intended for start-up configuration; compounds parsed before the swap keep their composition
/// but compute masses from the table current at the time of the query.
pub fn install(table: ElementTable) {
    log::debug!("installing element table with {} elements", table.len());
    *TABLE.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(table);
}

/// Merge `overrides` into the process-wide element table.
pub fn extend(overrides: ElementTable) {
    let mut current = (*table()).clone();
    current.merge(overrides);
    install(current);
}

fn element(symbol: &str, name: &str, atomic_number: u32, valence: Option<i32>, isotopes: &[(u32, f64, f64)]) -> Element {
    let isotopes = isotopes
        .iter()
        .map(|&(mass_number, mass, abundance)| Isotope { mass_number, mass, abundance })
        .collect();
    Element::new(symbol, name, atomic_number, isotopes, valence)
}

fn builtin_elements() -> Vec<Element> {
    vec![
        element("Ac", "Actinium", 89, Some(3), &[(227, 227.027747, 1.0)]),
        element("Ag", "Silver", 47, Some(1), &[(107, 106.905093, 0.51839), (109, 108.904756, 0.48161)]),
        element("Al", "Aluminium", 13, Some(3), &[(27, 26.98153844, 1.0)]),
        element("Am", "Americium", 95, Some(3), &[(241, 241.0568229, 0.0), (243, 243.0613727, 1.0)]),
        element("Ar", "Argon", 18, Some(0), &[(36, 35.96754628, 0.003365), (38, 37.9627322, 0.000632), (40, 39.962383123, 0.996003)]),
        element("As", "Arsenic", 33, Some(3), &[(75, 74.9215964, 1.0)]),
        element("At", "Astatine", 85, Some(1), &[(210, 209.987131, 0.0), (211, 210.987481, 1.0)]),
        element("Au", "Gold", 79, Some(1), &[(197, 196.966552, 1.0)]),
        element("B", "Boron", 5, Some(3), &[(10, 10.012937, 0.199), (11, 11.0093055, 0.801)]),
        element("Ba", "Barium", 56, Some(2), &[(130, 129.90631, 0.00106), (132, 131.905056, 0.00101), (134, 133.904503, 0.02417), (135, 134.905683, 0.06592), (136, 135.90457, 0.07854), (137, 136.905821, 0.11232), (138, 137.905241, 0.71698)]),
        element("Be", "Beryllium", 4, Some(2), &[(9, 9.0121821, 1.0)]),
        element("Bh", "Bohrium", 107, Some(0), &[(264, 264.12473, 1.0)]),
        element("Bi", "Bismuth", 83, Some(5), &[(209, 208.980383, 1.0)]),
        element("Bk", "Berkelium", 97, Some(3), &[(247, 247.070299, 1.0), (249, 249.07498, 0.0)]),
        element("Br", "Bromine", 35, Some(1), &[(79, 78.9183376, 0.5069), (81, 80.916291, 0.4931)]),
        element("C", "Carbon", 6, Some(4), &[(12, 12.0, 0.9893), (13, 13.0033548378, 0.0107), (14, 14.003241988, 0.0)]),
        element("Ca", "Calcium", 20, Some(2), &[(40, 39.9625912, 0.96941), (42, 41.9586183, 0.00647), (43, 42.9587668, 0.00135), (44, 43.9554811, 0.02086), (46, 45.9536928, 4e-05), (48, 47.952534, 0.00187)]),
        element("Cd", "Cadmium", 48, Some(2), &[(106, 105.906458, 0.0125), (108, 107.904183, 0.0089), (110, 109.903006, 0.1249), (111, 110.904182, 0.128), (112, 111.9027572, 0.2413), (113, 112.9044009, 0.1222), (114, 113.9033581, 0.2873), (116, 115.904755, 0.0749)]),
        element("Ce", "Cerium", 58, Some(4), &[(136, 135.90714, 0.00185), (138, 137.905986, 0.00251), (140, 139.905434, 0.8845), (142, 141.90924, 0.11114)]),
        element("Cf", "Californium", 98, Some(3), &[(249, 249.074847, 0.0), (250, 250.0764, 0.0), (251, 251.07958, 1.0), (252, 252.08162, 0.0)]),
        element("Cl", "Chlorine", 17, Some(1), &[(35, 34.96885271, 0.7578), (37, 36.9659026, 0.2422)]),
        element("Cm", "Curium", 96, Some(3), &[(243, 243.0613822, 0.0), (244, 244.0627463, 0.0), (245, 245.0654856, 0.0), (246, 246.0672176, 0.0), (247, 247.070347, 1.0), (248, 248.072342, 0.0)]),
        element("Co", "Cobalt", 27, Some(2), &[(59, 58.9332002, 1.0)]),
        element("Cr", "Chromium", 24, Some(3), &[(50, 49.9460496, 0.04345), (52, 51.9405119, 0.83789), (53, 52.9406538, 0.09501), (54, 53.9388849, 0.02365)]),
        element("Cs", "Caesium", 55, Some(1), &[(133, 132.905447, 1.0)]),
        element("Cu", "Copper", 29, Some(1), &[(63, 62.9296011, 0.6917), (65, 64.9277937, 0.3083)]),
        element("Db", "Dubnium", 105, Some(0), &[(262, 262.11415, 1.0)]),
        element("Dy", "Dysprosium", 66, Some(3), &[(156, 155.924278, 0.0006), (158, 157.924405, 0.001), (160, 159.925194, 0.0234), (161, 160.92693, 0.1891), (162, 161.926795, 0.2551), (163, 162.928728, 0.249), (164, 163.929171, 0.2818)]),
        element("Er", "Erbium", 68, Some(3), &[(162, 161.928775, 0.0014), (164, 163.929197, 0.0161), (166, 165.93029, 0.3361), (167, 166.932045, 0.2293), (168, 167.932368, 0.2678), (170, 169.93546, 0.1493)]),
        element("Es", "Einsteinium", 99, Some(3), &[(252, 252.08297, 1.0)]),
        element("Eu", "Europium", 63, Some(2), &[(151, 150.919846, 0.4781), (153, 152.921226, 0.5219)]),
        element("F", "Fluorine", 9, Some(1), &[(19, 18.9984032, 1.0)]),
        element("Fe", "Iron", 26, Some(2), &[(54, 53.9396148, 0.05845), (56, 55.9349421, 0.91754), (57, 56.9353987, 0.02119), (58, 57.9332805, 0.00282)]),
        element("Fm", "Fermium", 100, Some(3), &[(257, 257.095099, 1.0)]),
        element("Fr", "Francium", 87, Some(1), &[(223, 223.0197307, 1.0)]),
        element("Ga", "Gallium", 31, Some(3), &[(69, 68.925581, 0.60108), (71, 70.924705, 0.39892)]),
        element("Gd", "Gadolinium", 64, Some(3), &[(152, 151.919788, 0.002), (154, 153.920862, 0.0218), (155, 154.922619, 0.148), (156, 155.92212, 0.2047), (157, 156.923957, 0.1565), (158, 157.924101, 0.2484), (160, 159.927051, 0.2186)]),
        element("Ge", "Germanium", 32, Some(4), &[(70, 69.9242504, 0.2084), (72, 71.9220762, 0.2754), (73, 72.9234594, 0.0773), (74, 73.9211782, 0.3628), (76, 75.9214027, 0.0761)]),
        element("H", "Hydrogen", 1, Some(1), &[(1, 1.0078250321, 0.999885), (2, 2.014101778, 0.000115), (3, 3.0160492675, 0.0)]),
        element("He", "Helium", 2, Some(0), &[(3, 3.0160293097, 1.37e-06), (4, 4.0026032497, 0.99999863)]),
        element("Hf", "Hafnium", 72, Some(4), &[(174, 173.94004, 0.0016), (176, 175.9414018, 0.0526), (177, 176.94322, 0.186), (178, 177.9436977, 0.2728), (179, 178.9458151, 0.1362), (180, 179.9465488, 0.3508)]),
        element("Hg", "Mercury", 80, Some(2), &[(196, 195.965815, 0.0015), (198, 197.966752, 0.0997), (199, 198.968262, 0.1687), (200, 199.968309, 0.231), (201, 200.970285, 0.1318), (202, 201.970626, 0.2986), (204, 203.973476, 0.0687)]),
        element("Ho", "Holmium", 67, Some(3), &[(165, 164.930319, 1.0)]),
        element("I", "Iodine", 53, Some(1), &[(127, 126.904468, 1.0)]),
        element("In", "Indium", 49, Some(3), &[(113, 112.904061, 0.0429), (115, 114.903878, 0.9571)]),
        element("Ir", "Iridium", 77, Some(3), &[(191, 190.960591, 0.373), (193, 192.962924, 0.627)]),
        element("K", "Potassium", 19, Some(1), &[(39, 38.9637069, 0.932581), (40, 39.96399867, 0.000117), (41, 40.96182597, 0.067302)]),
        element("Kr", "Krypton", 36, Some(0), &[(78, 77.920386, 0.0035), (80, 79.916378, 0.0228), (82, 81.9134846, 0.1158), (83, 82.914136, 0.1149), (84, 83.911507, 0.57), (86, 85.9106103, 0.173)]),
        element("La", "Lanthanum", 57, Some(3), &[(138, 137.907107, 0.0009), (139, 138.906348, 0.9991)]),
        element("Li", "Lithium", 3, Some(1), &[(6, 6.0151223, 0.0759), (7, 7.016004, 0.9241)]),
        element("Lr", "Lawrencium", 103, Some(3), &[(262, 262.10969, 1.0)]),
        element("Lu", "Lutetium", 71, Some(3), &[(175, 174.9407679, 0.9741), (176, 175.9426824, 0.0259)]),
        element("Md", "Mendelevium", 101, Some(3), &[(256, 256.09405, 0.0), (258, 258.098425, 1.0)]),
        element("Mg", "Magnesium", 12, Some(2), &[(24, 23.9850419, 0.7899), (25, 24.98583702, 0.1), (26, 25.98259304, 0.1101)]),
        element("Mn", "Manganese", 25, Some(2), &[(55, 54.9380496, 1.0)]),
        element("Mo", "Molybdenum", 42, Some(6), &[(92, 91.90681, 0.1484), (94, 93.9050876, 0.0925), (95, 94.9058415, 0.1592), (96, 95.9046789, 0.1668), (97, 96.906021, 0.0955), (98, 97.9054078, 0.2413), (100, 99.907477, 0.0963)]),
        element("Mt", "Meitnerium", 109, Some(0), &[(268, 268.13882, 1.0)]),
        element("N", "Nitrogen", 7, Some(3), &[(14, 14.0030740052, 0.99632), (15, 15.0001088984, 0.00368)]),
        element("Na", "Sodium", 11, Some(1), &[(23, 22.98976967, 1.0)]),
        element("Nb", "Niobium", 41, Some(5), &[(93, 92.9063775, 1.0)]),
        element("Nd", "Neodymium", 60, Some(3), &[(142, 141.907719, 0.272), (143, 142.90981, 0.122), (144, 143.910083, 0.238), (145, 144.912569, 0.083), (146, 145.913112, 0.172), (148, 147.916889, 0.057), (150, 149.920887, 0.056)]),
        element("Ne", "Neon", 10, Some(0), &[(20, 19.9924401759, 0.9048), (21, 20.99384674, 0.0027), (22, 21.99138551, 0.0925)]),
        element("Ni", "Nickel", 28, Some(2), &[(58, 57.9353479, 0.680769), (60, 59.9307906, 0.262231), (61, 60.9310604, 0.011399), (62, 61.9283488, 0.036345), (64, 63.9279696, 0.009256)]),
        element("No", "Nobelium", 102, Some(2), &[(259, 259.10102, 1.0)]),
        element("Np", "Neptunium", 93, Some(3), &[(237, 237.0481673, 1.0), (239, 239.0529314, 0.0)]),
        element("O", "Oxygen", 8, Some(2), &[(16, 15.9949146221, 0.99757), (17, 16.9991315, 0.00038), (18, 17.9991604, 0.00205)]),
        element("Os", "Osmium", 76, Some(3), &[(184, 183.952491, 0.0002), (186, 185.953838, 0.0159), (187, 186.9557479, 0.0196), (188, 187.955836, 0.1324), (189, 188.9581449, 0.1615), (190, 189.958445, 0.2626), (192, 191.961479, 0.4078)]),
        element("P", "Phosphorus", 15, Some(3), &[(31, 30.97376151, 1.0)]),
        element("Pa", "Protactinium", 91, Some(4), &[(231, 231.0358789, 1.0)]),
        element("Pb", "Lead", 82, Some(4), &[(204, 203.973029, 0.014), (206, 205.974449, 0.241), (207, 206.975881, 0.221), (208, 207.976636, 0.524)]),
        element("Pd", "Palladium", 46, Some(2), &[(102, 101.905608, 0.0102), (104, 103.904035, 0.1114), (105, 104.905084, 0.2233), (106, 105.903483, 0.2733), (108, 107.903894, 0.2646), (110, 109.905152, 0.1172)]),
        element("Pm", "Promethium", 61, Some(3), &[(145, 144.912744, 1.0), (147, 146.915134, 0.0)]),
        element("Po", "Polonium", 84, Some(2), &[(209, 208.982416, 1.0), (210, 209.982857, 0.0)]),
        element("Pr", "Praseodymium", 59, Some(3), &[(141, 140.907648, 1.0)]),
        element("Pt", "Platinum", 78, Some(2), &[(190, 189.95993, 0.00014), (192, 191.961035, 0.00782), (194, 193.962664, 0.32967), (195, 194.964774, 0.33832), (196, 195.964935, 0.25242), (198, 197.967876, 0.07163)]),
        element("Pu", "Plutonium", 94, Some(3), &[(238, 238.0495534, 0.0), (239, 239.0521565, 0.0), (240, 240.0538075, 0.0), (241, 241.0568453, 0.0), (242, 242.0587368, 0.0), (244, 244.064198, 1.0)]),
        element("Ra", "Radium", 88, Some(2), &[(223, 223.018497, 0.0), (224, 224.020202, 0.0), (226, 226.0254026, 1.0), (228, 228.0310641, 0.0)]),
        element("Rb", "Rubidium", 37, Some(1), &[(85, 84.9117893, 0.7217), (87, 86.9091835, 0.2783)]),
        element("Re", "Rhenium", 75, Some(4), &[(185, 184.9529557, 0.374), (187, 186.9557508, 0.626)]),
        element("Rf", "Rutherfordium", 104, Some(0), &[(261, 261.10875, 1.0)]),
        element("Rh", "Rhodium", 45, Some(3), &[(103, 102.905504, 1.0)]),
        element("Rn", "Radon", 86, Some(0), &[(211, 210.990585, 0.0), (220, 220.0113841, 0.0), (222, 222.0175705, 1.0)]),
        element("Ru", "Ruthenium", 44, Some(3), &[(96, 95.907598, 0.0554), (98, 97.905287, 0.0187), (99, 98.9059393, 0.1276), (100, 99.9042197, 0.126), (101, 100.9055822, 0.1706), (102, 101.9043495, 0.3155), (104, 103.90543, 0.1862)]),
        element("S", "Sulfur", 16, Some(2), &[(32, 31.97207069, 0.9493), (33, 32.9714585, 0.0076), (34, 33.96786683, 0.0429), (36, 35.96708088, 0.0002)]),
        element("Sb", "Antimony", 51, Some(5), &[(121, 120.903818, 0.5721), (123, 122.9042157, 0.4279)]),
        element("Sc", "Scandium", 21, Some(3), &[(45, 44.9559102, 1.0)]),
        element("Se", "Selenium", 34, Some(2), &[(74, 73.9224766, 0.0089), (76, 75.9192141, 0.0937), (77, 76.9199146, 0.0763), (78, 77.9173095, 0.2377), (80, 79.9165218, 0.4961), (82, 81.9167, 0.0873)]),
        element("Sg", "Seaborgium", 106, Some(0), &[(266, 266.12193, 1.0)]),
        element("Si", "Silicon", 14, Some(4), &[(28, 27.9769265327, 0.922297), (29, 28.97649472, 0.046832), (30, 29.97377022, 0.030872)]),
        element("Sm", "Samarium", 62, Some(2), &[(144, 143.911995, 0.0307), (147, 146.914893, 0.1499), (148, 147.914818, 0.1124), (149, 148.91718, 0.1382), (150, 149.917271, 0.0738), (152, 151.919728, 0.2675), (154, 153.922205, 0.2275)]),
        element("Sn", "Tin", 50, Some(4), &[(112, 111.904821, 0.0097), (114, 113.902782, 0.0066), (115, 114.903346, 0.0034), (116, 115.901744, 0.1454), (117, 116.902954, 0.0768), (118, 117.901606, 0.2422), (119, 118.903309, 0.0859), (120, 119.9021966, 0.3258), (122, 121.9034401, 0.0463), (124, 123.9052746, 0.0579)]),
        element("Sr", "Strontium", 38, Some(2), &[(84, 83.913425, 0.0056), (86, 85.9092624, 0.0986), (87, 86.9088793, 0.07), (88, 87.9056143, 0.8258)]),
        element("Ta", "Tantalum", 73, Some(5), &[(180, 179.947466, 0.00012), (181, 180.947996, 0.99988)]),
        element("Tb", "Terbium", 65, Some(3), &[(159, 158.925343, 1.0)]),
        element("Tc", "Technetium", 43, Some(4), &[(97, 96.906365, 0.0), (98, 97.907216, 1.0), (99, 98.9062546, 0.0)]),
        element("Te", "Tellurium", 52, Some(2), &[(120, 119.90402, 0.0009), (122, 121.9030471, 0.0255), (123, 122.904273, 0.0089), (124, 123.9028195, 0.0474), (125, 124.9044247, 0.0707), (126, 125.9033055, 0.1884), (128, 127.9044614, 0.3174), (130, 129.9062228, 0.3408)]),
        element("Th", "Thorium", 90, Some(4), &[(230, 230.0331266, 2.320381), (232, 232.0380504, 1.0)]),
        element("Ti", "Titanium", 22, Some(4), &[(46, 45.9526295, 0.0825), (47, 46.9517638, 0.0744), (48, 47.9479471, 0.7372), (49, 48.9478708, 0.0541), (50, 49.9447921, 0.0518)]),
        element("Tl", "Thallium", 81, Some(3), &[(203, 202.972329, 0.29524), (205, 204.974412, 0.70476)]),
        element("Tm", "Thulium", 69, Some(3), &[(169, 168.934211, 1.0)]),
        element("U", "Uranium", 92, Some(3), &[(233, 233.039628, 2.3802891), (234, 234.0409456, 5.5e-05), (235, 235.0439231, 0.0072), (236, 236.0455619, 0.0), (238, 238.0507826, 0.992745)]),
        element("V", "Vanadium", 23, Some(5), &[(50, 49.9471628, 0.0025), (51, 50.9439637, 0.9975)]),
        element("W", "Tungsten", 74, Some(6), &[(180, 179.946706, 0.0012), (182, 181.948206, 0.265), (183, 182.9502245, 0.1431), (184, 183.9509326, 0.3064), (186, 185.954362, 0.2843)]),
        element("Xe", "Xenon", 54, Some(0), &[(124, 123.9058958, 0.0009), (126, 125.904269, 0.0009), (128, 127.9035304, 0.0192), (129, 128.9047795, 0.2644), (130, 129.9035079, 0.0408), (131, 130.9050819, 0.2118), (132, 131.9041545, 0.2689), (134, 133.9053945, 0.1044), (136, 135.90722, 0.0887)]),
        element("Y", "Yttrium", 39, Some(3), &[(89, 88.9058479, 1.0)]),
        element("Yb", "Ytterbium", 70, Some(2), &[(168, 167.933894, 0.0013), (170, 169.934759, 0.0304), (171, 170.936322, 0.1428), (172, 171.9363777, 0.2183), (173, 172.9382068, 0.1613), (174, 173.9388581, 0.3183), (176, 175.942568, 0.1276)]),
        element("Zn", "Zinc", 30, Some(2), &[(64, 63.9291466, 0.4863), (66, 65.9260368, 0.279), (67, 66.9271309, 0.041), (68, 67.9248476, 0.1875), (70, 69.925325, 0.0062)]),
        element("Zr", "Zirconium", 40, Some(4), &[(90, 89.9047037, 0.5145), (91, 90.905645, 0.1122), (92, 91.9050401, 0.1715), (94, 93.9063158, 0.1738), (96, 95.908276, 0.028)]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table() {
        let table = ElementTable::builtin();
        assert_eq!(table.len(), 108);

        let hydrogen = table.get("H").unwrap();
        assert_eq!(hydrogen.atomic_number, 1);
        assert_eq!(hydrogen.valence, Some(1));
        assert!((hydrogen.mono_mass() - 1.0078250321).abs() < 1e-10);
        assert_eq!(hydrogen.isotope(2).unwrap().mass, 2.014101778);
        assert!(hydrogen.isotope(4).is_none());
    }

    #[test]
    fn test_distribution_skips_absent_isotopes() {
        let table = ElementTable::builtin();
        let carbon = table.get("C").unwrap();
        assert_eq!(carbon.isotopes.len(), 3);
        assert_eq!(carbon.distribution(), vec![(12.0, 0.9893), (13.0033548378, 0.0107)]);
    }

    #[test]
    fn test_synthetic_element_masses() {
        let technetium = element("Tc", "Technetium", 43, Some(7), &[(97, 96.906365, 0.0), (98, 97.907216, 0.0)]);
        assert_eq!(technetium.masses(), (96.906365, 96.906365));
    }

    #[test]
    fn test_json_override() {
        let json = r#"[
            {"symbol": "Xq", "name": "Testium", "atomic_number": 200,
             "isotopes": [{"mass_number": 300, "mass": 300.1, "abundance": 1.0}]},
            {"symbol": "H", "name": "Hydrogen", "atomic_number": 1, "valence": 1,
             "isotopes": [{"mass_number": 1, "mass": 1.0, "abundance": 1.0}]}
        ]"#;
        let overrides = ElementTable::from_json_str(json).unwrap();
        assert_eq!(overrides.len(), 2);
        assert_eq!(overrides.get("Xq").unwrap().valence, None);

        let mut table = ElementTable::builtin();
        table.merge(overrides);
        assert_eq!(table.len(), 109);
        assert_eq!(table.get("H").unwrap().mono_mass(), 1.0);
        assert_eq!(table.get("Xq").unwrap().avg_mass(), 300.1);
    }

    #[test]
    fn test_json_roundtrip_and_errors() {
        let table = ElementTable::builtin();
        let json = table.to_json().unwrap();
        let parsed = ElementTable::from_json_str(&json).unwrap();
        assert_eq!(parsed.len(), table.len());
        assert_eq!(parsed.get("Fe").unwrap().isotopes.len(), table.get("Fe").unwrap().isotopes.len());
        assert!(ElementTable::from_json_str("{\"symbol\": 1}").is_err());
    }
}
