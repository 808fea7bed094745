use super::atom::Atom;
use super::element::Element;
use nalgebra::{Matrix3, Vector3};
use thiserror::Error;

const MIN_CELL_VOLUME: f64 = 1e-9;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StructureError {
    #[error("Periodic cell is degenerate (volume {volume:.3e} Å³)")]
    DegenerateCell { volume: f64 },
}

/// A periodic simulation cell.
///
/// The three lattice vectors are stored as the rows of a 3x3 matrix, in Angstroms.
/// A `Cell` can only be constructed with a non-zero volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    matrix: Matrix3<f64>,
}

impl Cell {
    pub fn new(matrix: Matrix3<f64>) -> Result<Self, StructureError> {
        let volume = matrix.determinant().abs();
        if !volume.is_finite() || volume < MIN_CELL_VOLUME {
            return Err(StructureError::DegenerateCell { volume });
        }
        Ok(Self { matrix })
    }

    pub fn from_vectors(
        a: Vector3<f64>,
        b: Vector3<f64>,
        c: Vector3<f64>,
    ) -> Result<Self, StructureError> {
        Self::new(Matrix3::from_rows(&[
            a.transpose(),
            b.transpose(),
            c.transpose(),
        ]))
    }

    pub fn orthorhombic(a: f64, b: f64, c: f64) -> Result<Self, StructureError> {
        Self::new(Matrix3::from_diagonal(&Vector3::new(a, b, c)))
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// The `i`-th lattice vector (0, 1 or 2).
    pub fn vector(&self, i: usize) -> Vector3<f64> {
        self.matrix.row(i).transpose()
    }

    pub fn volume(&self) -> f64 {
        self.matrix.determinant().abs()
    }

    /// Area spanned by the first two lattice vectors, |a × b|.
    pub fn in_plane_area(&self) -> f64 {
        self.vector(0).cross(&self.vector(1)).norm()
    }

    pub fn rows(&self) -> [[f64; 3]; 3] {
        let m = &self.matrix;
        [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
            [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
        ]
    }
}

/// An ordered, immutable set of atoms with an optional periodic cell.
///
/// Atom order is significant: combining a surface with an adsorbant always places the
/// surface atoms first, and backends that are index-sensitive rely on this ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct Structure {
    atoms: Vec<Atom>,
    cell: Option<Cell>,
    pbc: [bool; 3],
}

impl Structure {
    /// Creates a non-periodic structure.
    pub fn new(atoms: Vec<Atom>) -> Self {
        Self {
            atoms,
            cell: None,
            pbc: [false; 3],
        }
    }

    /// Creates a structure bound to a periodic cell.
    pub fn periodic(atoms: Vec<Atom>, cell: Cell, pbc: [bool; 3]) -> Self {
        Self {
            atoms,
            cell: Some(cell),
            pbc,
        }
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn cell(&self) -> Option<&Cell> {
        self.cell.as_ref()
    }

    pub fn pbc(&self) -> [bool; 3] {
        self.pbc
    }

    /// Unique elements in order of first appearance.
    pub fn elements(&self) -> Vec<Element> {
        let mut seen = Vec::new();
        for atom in &self.atoms {
            if !seen.contains(&atom.element) {
                seen.push(atom.element);
            }
        }
        seen
    }

    /// Builds a new structure holding `self`'s atoms followed by `other`'s atoms.
    ///
    /// The cell and periodicity of `self` are kept; `other` is treated as a
    /// non-periodic fragment placed inside that cell.
    pub fn combined_with(&self, other: &Structure) -> Structure {
        let mut atoms = Vec::with_capacity(self.atoms.len() + other.atoms.len());
        atoms.extend_from_slice(&self.atoms);
        atoms.extend_from_slice(&other.atoms);
        Structure {
            atoms,
            cell: self.cell,
            pbc: self.pbc,
        }
    }

    /// Minimum and maximum z coordinate, or `None` for an empty structure.
    pub fn z_range(&self) -> Option<(f64, f64)> {
        self.atoms.iter().map(|a| a.position.z).fold(None, |acc, z| {
            Some(match acc {
                None => (z, z),
                Some((lo, hi)) => (lo.min(z), hi.max(z)),
            })
        })
    }

    pub fn top_z(&self) -> Option<f64> {
        self.z_range().map(|(_, hi)| hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn atom(element: Element, x: f64, y: f64, z: f64) -> Atom {
        Atom::new(element, Point3::new(x, y, z))
    }

    #[test]
    fn cell_rejects_zero_volume() {
        let flat = Cell::from_vectors(
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(1.0, 1.0, 0.0),
        );
        assert!(matches!(flat, Err(StructureError::DegenerateCell { .. })));
    }

    #[test]
    fn cell_reports_volume_and_area() {
        let cell = Cell::from_vectors(
            Vector3::new(2.0, 0.0, 0.0),
            Vector3::new(1.0, 3.0, 0.0),
            Vector3::new(0.0, 0.0, 10.0),
        )
        .unwrap();
        assert!((cell.volume() - 60.0).abs() < 1e-9);
        assert!((cell.in_plane_area() - 6.0).abs() < 1e-9);
        assert_eq!(cell.rows()[1], [1.0, 3.0, 0.0]);
    }

    #[test]
    fn combined_keeps_surface_atoms_first_and_surface_cell() {
        let cell = Cell::orthorhombic(10.0, 10.0, 20.0).unwrap();
        let surface = Structure::periodic(
            vec![atom(Element::C, 0.0, 0.0, 5.0), atom(Element::C, 1.0, 0.0, 5.0)],
            cell,
            [true; 3],
        );
        let adsorbant = Structure::new(vec![atom(Element::H, 5.0, 5.0, 7.0)]);

        let combined = surface.combined_with(&adsorbant);

        assert_eq!(combined.len(), 3);
        assert_eq!(combined.atoms()[2].element, Element::H);
        assert_eq!(combined.cell(), Some(&cell));
        assert_eq!(combined.pbc(), [true; 3]);
        assert_eq!(surface.len(), 2);
    }

    #[test]
    fn elements_are_unique_in_first_appearance_order() {
        let s = Structure::new(vec![
            atom(Element::O, 0.0, 0.0, 0.0),
            atom(Element::H, 0.0, 0.0, 1.0),
            atom(Element::H, 0.0, 1.0, 0.0),
            atom(Element::C, 1.0, 0.0, 0.0),
        ]);
        assert_eq!(s.elements(), vec![Element::O, Element::H, Element::C]);
    }

    #[test]
    fn z_range_and_top_z() {
        let s = Structure::new(vec![
            atom(Element::O, 0.0, 0.0, 2.5),
            atom(Element::H, 0.0, 0.0, -1.0),
            atom(Element::H, 0.0, 1.0, 4.0),
        ]);
        assert_eq!(s.z_range(), Some((-1.0, 4.0)));
        assert_eq!(s.top_z(), Some(4.0));
        assert_eq!(Structure::new(Vec::new()).top_z(), None);
    }
}
