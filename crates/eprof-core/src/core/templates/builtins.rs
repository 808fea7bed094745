use crate::core::models::atom::Atom;
use crate::core::models::element::Element;
use nalgebra::{Point3, Vector3};
use phf::{Map, phf_map};

pub(super) type GeometryBuilder = fn(&Point3<f64>) -> Vec<Atom>;

pub(super) struct BuiltinSpecies {
    pub description: &'static str,
    pub elements: &'static [Element],
    pub multiplicity: u8,
    pub orientations: &'static [(&'static str, GeometryBuilder)],
}

pub(super) static BUILTIN_SPECIES: Map<&'static str, BuiltinSpecies> = phf_map! {
    "H2O" => BuiltinSpecies {
        description: "Water molecule",
        elements: &[Element::O, Element::H, Element::H],
        multiplicity: 1,
        orientations: &[("flat", water_flat), ("vertical", water_vertical)],
    },
    "H2" => BuiltinSpecies {
        description: "Hydrogen molecule",
        elements: &[Element::H, Element::H],
        multiplicity: 1,
        orientations: &[("parallel", h2_parallel), ("perpendicular", h2_perpendicular)],
    },
    "O2" => BuiltinSpecies {
        description: "Oxygen molecule",
        elements: &[Element::O, Element::O],
        multiplicity: 3,
        orientations: &[("parallel", o2_parallel), ("perpendicular", o2_perpendicular)],
    },
    "N2" => BuiltinSpecies {
        description: "Nitrogen molecule",
        elements: &[Element::N, Element::N],
        multiplicity: 1,
        orientations: &[("parallel", n2_parallel), ("perpendicular", n2_perpendicular)],
    },
    "CO" => BuiltinSpecies {
        description: "Carbon monoxide",
        elements: &[Element::C, Element::O],
        multiplicity: 1,
        orientations: &[
            ("parallel", co_parallel),
            ("perpendicular", co_perpendicular),
            ("c_down", co_c_down),
            ("o_down", co_o_down),
        ],
    },
    "CO2" => BuiltinSpecies {
        description: "Carbon dioxide",
        elements: &[Element::C, Element::O, Element::O],
        multiplicity: 1,
        orientations: &[("parallel", co2_parallel), ("perpendicular", co2_perpendicular)],
    },
    "NH3" => BuiltinSpecies {
        description: "Ammonia",
        elements: &[Element::N, Element::H, Element::H, Element::H],
        multiplicity: 1,
        orientations: &[("n_down", nh3_n_down), ("n_up", nh3_n_up)],
    },
    "CH4" => BuiltinSpecies {
        description: "Methane",
        elements: &[Element::C, Element::H, Element::H, Element::H, Element::H],
        multiplicity: 1,
        orientations: &[("tetrahedral", ch4_tetrahedral)],
    },
    "H" => BuiltinSpecies {
        description: "Hydrogen atom",
        elements: &[Element::H],
        multiplicity: 2,
        orientations: &[("default", h_atom)],
    },
    "O" => BuiltinSpecies {
        description: "Oxygen atom",
        elements: &[Element::O],
        multiplicity: 3,
        orientations: &[("default", o_atom)],
    },
    "C" => BuiltinSpecies {
        description: "Carbon atom",
        elements: &[Element::C],
        multiplicity: 3,
        orientations: &[("default", c_atom)],
    },
    "N" => BuiltinSpecies {
        description: "Nitrogen atom",
        elements: &[Element::N],
        multiplicity: 4,
        orientations: &[("default", n_atom)],
    },
    "F" => BuiltinSpecies {
        description: "Fluorine atom",
        elements: &[Element::F],
        multiplicity: 2,
        orientations: &[("default", f_atom)],
    },
    "Na" => BuiltinSpecies {
        description: "Sodium atom",
        elements: &[Element::NA],
        multiplicity: 2,
        orientations: &[("default", na_atom)],
    },
};

// Bond lengths in Angstroms, angles in degrees.
const O_H_BOND: f64 = 0.96;
const H_O_H_ANGLE: f64 = 104.5;
const H_H_BOND: f64 = 0.74;
const O_O_BOND: f64 = 1.21;
const N_N_BOND: f64 = 1.10;
const C_O_BOND: f64 = 1.13;
const CO2_C_O_BOND: f64 = 1.16;
const N_H_BOND: f64 = 1.01;
const H_N_H_ANGLE: f64 = 106.8;
const C_H_BOND: f64 = 1.09;
const TETRAHEDRAL_COMPONENT: f64 = 0.577;

#[inline]
fn at(element: Element, origin: &Point3<f64>, dx: f64, dy: f64, dz: f64) -> Atom {
    Atom::new(element, origin + Vector3::new(dx, dy, dz))
}

fn water_flat(p: &Point3<f64>) -> Vec<Atom> {
    let half = (H_O_H_ANGLE / 2.0).to_radians();
    let (dx, dy) = (O_H_BOND * half.cos(), O_H_BOND * half.sin());
    vec![
        at(Element::O, p, 0.0, 0.0, 0.0),
        at(Element::H, p, dx, dy, 0.0),
        at(Element::H, p, dx, -dy, 0.0),
    ]
}

fn water_vertical(p: &Point3<f64>) -> Vec<Atom> {
    let half = (H_O_H_ANGLE / 2.0).to_radians();
    let (dx, dz) = (O_H_BOND * half.cos(), O_H_BOND * half.sin());
    vec![
        at(Element::O, p, 0.0, 0.0, 0.0),
        at(Element::H, p, dx, 0.0, dz),
        at(Element::H, p, dx, 0.0, -dz),
    ]
}

fn diatomic_parallel(first: Element, second: Element, bond: f64, p: &Point3<f64>) -> Vec<Atom> {
    vec![
        at(first, p, -bond / 2.0, 0.0, 0.0),
        at(second, p, bond / 2.0, 0.0, 0.0),
    ]
}

fn diatomic_perpendicular(
    first: Element,
    second: Element,
    bond: f64,
    p: &Point3<f64>,
) -> Vec<Atom> {
    vec![
        at(first, p, 0.0, 0.0, -bond / 2.0),
        at(second, p, 0.0, 0.0, bond / 2.0),
    ]
}

fn h2_parallel(p: &Point3<f64>) -> Vec<Atom> {
    diatomic_parallel(Element::H, Element::H, H_H_BOND, p)
}

fn h2_perpendicular(p: &Point3<f64>) -> Vec<Atom> {
    diatomic_perpendicular(Element::H, Element::H, H_H_BOND, p)
}

fn o2_parallel(p: &Point3<f64>) -> Vec<Atom> {
    diatomic_parallel(Element::O, Element::O, O_O_BOND, p)
}

fn o2_perpendicular(p: &Point3<f64>) -> Vec<Atom> {
    diatomic_perpendicular(Element::O, Element::O, O_O_BOND, p)
}

fn n2_parallel(p: &Point3<f64>) -> Vec<Atom> {
    diatomic_parallel(Element::N, Element::N, N_N_BOND, p)
}

fn n2_perpendicular(p: &Point3<f64>) -> Vec<Atom> {
    diatomic_perpendicular(Element::N, Element::N, N_N_BOND, p)
}

fn co_parallel(p: &Point3<f64>) -> Vec<Atom> {
    diatomic_parallel(Element::C, Element::O, C_O_BOND, p)
}

fn co_perpendicular(p: &Point3<f64>) -> Vec<Atom> {
    diatomic_perpendicular(Element::C, Element::O, C_O_BOND, p)
}

fn co_c_down(p: &Point3<f64>) -> Vec<Atom> {
    vec![
        at(Element::C, p, 0.0, 0.0, 0.0),
        at(Element::O, p, 0.0, 0.0, C_O_BOND),
    ]
}

fn co_o_down(p: &Point3<f64>) -> Vec<Atom> {
    vec![
        at(Element::C, p, 0.0, 0.0, C_O_BOND),
        at(Element::O, p, 0.0, 0.0, 0.0),
    ]
}

fn co2_parallel(p: &Point3<f64>) -> Vec<Atom> {
    vec![
        at(Element::C, p, 0.0, 0.0, 0.0),
        at(Element::O, p, -CO2_C_O_BOND, 0.0, 0.0),
        at(Element::O, p, CO2_C_O_BOND, 0.0, 0.0),
    ]
}

fn co2_perpendicular(p: &Point3<f64>) -> Vec<Atom> {
    vec![
        at(Element::C, p, 0.0, 0.0, 0.0),
        at(Element::O, p, 0.0, 0.0, -CO2_C_O_BOND),
        at(Element::O, p, 0.0, 0.0, CO2_C_O_BOND),
    ]
}

/// `z_sign` selects which side of the nitrogen the hydrogens sit on.
fn nh3(p: &Point3<f64>, z_sign: f64) -> Vec<Atom> {
    let angle = H_N_H_ANGLE.to_radians();
    let dz = z_sign * N_H_BOND * angle.cos();
    let (side_x, side_y) = (
        N_H_BOND * (angle / 2.0).sin(),
        N_H_BOND * (angle / 2.0).cos(),
    );
    vec![
        at(Element::N, p, 0.0, 0.0, 0.0),
        at(Element::H, p, N_H_BOND * angle.sin(), 0.0, dz),
        at(Element::H, p, -side_x, side_y, dz),
        at(Element::H, p, -side_x, -side_y, dz),
    ]
}

fn nh3_n_down(p: &Point3<f64>) -> Vec<Atom> {
    nh3(p, 1.0)
}

fn nh3_n_up(p: &Point3<f64>) -> Vec<Atom> {
    nh3(p, -1.0)
}

fn ch4_tetrahedral(p: &Point3<f64>) -> Vec<Atom> {
    let d = C_H_BOND * TETRAHEDRAL_COMPONENT;
    vec![
        at(Element::C, p, 0.0, 0.0, 0.0),
        at(Element::H, p, d, d, d),
        at(Element::H, p, -d, -d, d),
        at(Element::H, p, -d, d, -d),
        at(Element::H, p, d, -d, -d),
    ]
}

fn h_atom(p: &Point3<f64>) -> Vec<Atom> {
    vec![Atom::new(Element::H, *p)]
}

fn o_atom(p: &Point3<f64>) -> Vec<Atom> {
    vec![Atom::new(Element::O, *p)]
}

fn c_atom(p: &Point3<f64>) -> Vec<Atom> {
    vec![Atom::new(Element::C, *p)]
}

fn n_atom(p: &Point3<f64>) -> Vec<Atom> {
    vec![Atom::new(Element::N, *p)]
}

fn f_atom(p: &Point3<f64>) -> Vec<Atom> {
    vec![Atom::new(Element::F, *p)]
}

fn na_atom(p: &Point3<f64>) -> Vec<Atom> {
    vec![Atom::new(Element::NA, *p)]
}
