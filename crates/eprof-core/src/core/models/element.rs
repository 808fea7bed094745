use phf::{Map, phf_map};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Standard atomic masses (u), keyed by chemical symbol.
static ATOMIC_MASSES: Map<&'static str, f64> = phf_map! {
    "H" => 1.008, "He" => 4.0026,
    "Li" => 6.94, "Be" => 9.0122, "B" => 10.81, "C" => 12.011, "N" => 14.007,
    "O" => 15.999, "F" => 18.998, "Ne" => 20.180,
    "Na" => 22.990, "Mg" => 24.305, "Al" => 26.982, "Si" => 28.085, "P" => 30.974,
    "S" => 32.06, "Cl" => 35.45, "Ar" => 39.948,
    "K" => 39.098, "Ca" => 40.078, "Sc" => 44.956, "Ti" => 47.867, "V" => 50.942,
    "Cr" => 51.996, "Mn" => 54.938, "Fe" => 55.845, "Co" => 58.933, "Ni" => 58.693,
    "Cu" => 63.546, "Zn" => 65.38, "Ga" => 69.723, "Ge" => 72.630, "As" => 74.922,
    "Se" => 78.971, "Br" => 79.904, "Kr" => 83.798,
    "Rb" => 85.468, "Sr" => 87.62, "Y" => 88.906, "Zr" => 91.224, "Nb" => 92.906,
    "Mo" => 95.95, "Tc" => 98.0, "Ru" => 101.07, "Rh" => 102.91, "Pd" => 106.42,
    "Ag" => 107.87, "Cd" => 112.41, "In" => 114.82, "Sn" => 118.71, "Sb" => 121.76,
    "Te" => 127.60, "I" => 126.90, "Xe" => 131.29,
    "Cs" => 132.91, "Ba" => 137.33, "La" => 138.91, "Ce" => 140.12, "Pr" => 140.91,
    "Nd" => 144.24, "Pm" => 145.0, "Sm" => 150.36, "Eu" => 151.96, "Gd" => 157.25,
    "Tb" => 158.93, "Dy" => 162.50, "Ho" => 164.93, "Er" => 167.26, "Tm" => 168.93,
    "Yb" => 173.05, "Lu" => 174.97, "Hf" => 178.49, "Ta" => 180.95, "W" => 183.84,
    "Re" => 186.21, "Os" => 190.23, "Ir" => 192.22, "Pt" => 195.08, "Au" => 196.97,
    "Hg" => 200.59, "Tl" => 204.38, "Pb" => 207.2, "Bi" => 208.98, "Po" => 209.0,
    "At" => 210.0, "Rn" => 222.0,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("'{0}' is not a valid chemical symbol")]
pub struct ElementParseError(pub String);

/// A chemical element, identified by its (case-sensitive) symbol.
///
/// Only symbols present in the built-in element table can be constructed, so every
/// `Element` in a structure is guaranteed to be a valid chemical symbol.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Element(&'static str);

impl Element {
    pub const H: Element = Element("H");
    pub const B: Element = Element("B");
    pub const C: Element = Element("C");
    pub const N: Element = Element("N");
    pub const O: Element = Element("O");
    pub const F: Element = Element("F");
    pub const NA: Element = Element("Na");

    pub fn symbol(&self) -> &'static str {
        self.0
    }

    /// Standard atomic mass in atomic mass units.
    pub fn mass(&self) -> f64 {
        ATOMIC_MASSES.get(self.0).copied().unwrap_or(0.0)
    }
}

impl FromStr for Element {
    type Err = ElementParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ATOMIC_MASSES
            .get_entry(s.trim())
            .map(|(symbol, _)| Element(symbol))
            .ok_or_else(|| ElementParseError(s.to_string()))
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Element({})", self.0)
    }
}

impl Serialize for Element {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

impl<'de> Deserialize<'de> for Element {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let symbol = String::deserialize(deserializer)?;
        symbol.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_symbols() {
        let au: Element = "Au".parse().unwrap();
        assert_eq!(au.symbol(), "Au");
        assert!((au.mass() - 196.97).abs() < 1e-9);
        assert_eq!(" Na ".parse::<Element>().unwrap(), Element::NA);
    }

    #[test]
    fn symbols_are_case_sensitive() {
        assert!("au".parse::<Element>().is_err());
        assert!("CO".parse::<Element>().is_err());
    }

    #[test]
    fn rejects_unknown_symbols() {
        let err = "Xx".parse::<Element>().unwrap_err();
        assert_eq!(err.to_string(), "'Xx' is not a valid chemical symbol");
    }

    #[test]
    fn builtin_constants_are_in_table() {
        for element in [
            Element::H,
            Element::B,
            Element::C,
            Element::N,
            Element::O,
            Element::F,
            Element::NA,
        ] {
            assert!(element.mass() > 0.0, "{} missing from table", element);
        }
    }

    #[test]
    fn serializes_as_plain_symbol() {
        let json = serde_json::to_string(&Element::O).unwrap();
        assert_eq!(json, "\"O\"");
        let back: Element = serde_json::from_str("\"Pt\"").unwrap();
        assert_eq!(back.symbol(), "Pt");
        assert!(serde_json::from_str::<Element>("\"Qq\"").is_err());
    }
}
