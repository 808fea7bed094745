use super::element::Element;
use nalgebra::{Point3, Vector3};

/// A single atom: a chemical element at a Cartesian position.
///
/// Positions are expressed in Angstroms in the same frame as the periodic cell of the
/// structure that owns the atom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Atom {
    /// The chemical element of this atom.
    pub element: Element,
    /// Cartesian position in Angstroms.
    pub position: Point3<f64>,
}

impl Atom {
    /// Creates a new atom.
    ///
    /// # Arguments
    ///
    /// * `element` - The chemical element.
    /// * `position` - The Cartesian position in Angstroms.
    pub fn new(element: Element, position: Point3<f64>) -> Self {
        Self { element, position }
    }

    /// Returns a copy of this atom displaced by `offset`.
    pub fn translated(&self, offset: &Vector3<f64>) -> Self {
        Self {
            element: self.element,
            position: self.position + offset,
        }
    }
}
