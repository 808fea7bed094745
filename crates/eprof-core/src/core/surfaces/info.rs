use super::Surface;
use crate::core::models::element::Element;
use itertools::Itertools;
use nalgebra::Point3;

const LAYER_TOLERANCE: f64 = 0.1;
const TOP_LAYER_TOLERANCE: f64 = 0.5;
const SITE_HEIGHT: f64 = 2.0;
const BRIDGE_RANGE: (f64, f64) = (2.0, 4.0);
const HOLLOW_RANGE: (f64, f64) = (2.0, 5.0);

/// Atoms whose z coordinates lie within the layer tolerance of the running layer mean.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub index: usize,
    pub z_average: f64,
    pub elements: Vec<Element>,
    pub atom_indices: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceInfo {
    pub name: String,
    pub n_atoms: usize,
    pub elements: Vec<Element>,
    pub cell: Option<[[f64; 3]; 3]>,
    pub z_min: f64,
    pub z_max: f64,
    /// |a1 × a2|, present only for periodic surfaces.
    pub surface_area: Option<f64>,
    pub layers: Vec<Layer>,
}

impl SurfaceInfo {
    pub fn z_range(&self) -> f64 {
        self.z_max - self.z_min
    }
}

/// High-symmetry candidate sites, each [`SITE_HEIGHT`] Angstroms above the top atom.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdsorptionSites {
    pub top: Vec<Point3<f64>>,
    pub bridge: Vec<Point3<f64>>,
    pub hollow: Vec<Point3<f64>>,
}

impl Surface {
    /// Summarizes the composition and geometry of the surface.
    pub fn info(&self) -> SurfaceInfo {
        let structure = self.structure();
        let (z_min, z_max) = structure.z_range().unwrap_or((self.top_z(), self.top_z()));
        SurfaceInfo {
            name: self.name().to_string(),
            n_atoms: structure.len(),
            elements: structure.elements(),
            cell: structure.cell().map(|c| c.rows()),
            z_min,
            z_max,
            surface_area: structure.cell().map(|c| c.in_plane_area()),
            layers: identify_layers(self),
        }
    }

    /// Top, bridge and hollow sites built from the atoms of the outermost layer.
    ///
    /// Bridge sites join pairs of top-layer atoms 2 to 4 Angstroms apart in-plane; hollow
    /// sites are centroids of triangles whose three in-plane sides are all 2 to 5 Angstroms.
    pub fn adsorption_sites(&self) -> AdsorptionSites {
        let top_z = self.top_z();
        let site_z = top_z + SITE_HEIGHT;
        let top_atoms: Vec<Point3<f64>> = self
            .structure()
            .atoms()
            .iter()
            .map(|a| a.position)
            .filter(|p| p.z >= top_z - TOP_LAYER_TOLERANCE)
            .collect();

        let in_plane = |a: &Point3<f64>, b: &Point3<f64>| (a.xy() - b.xy()).norm();
        let within = |d: f64, (lo, hi): (f64, f64)| d > lo && d < hi;

        let top = top_atoms
            .iter()
            .map(|p| Point3::new(p.x, p.y, site_z))
            .collect();

        let bridge = top_atoms
            .iter()
            .tuple_combinations()
            .filter(|&(a, b)| within(in_plane(a, b), BRIDGE_RANGE))
            .map(|(a, b)| {
                let mid = nalgebra::center(a, b);
                Point3::new(mid.x, mid.y, site_z)
            })
            .collect();

        let hollow = top_atoms
            .iter()
            .tuple_combinations()
            .filter(|&(a, b, c)| {
                [in_plane(a, b), in_plane(a, c), in_plane(b, c)]
                    .into_iter()
                    .all(|d| within(d, HOLLOW_RANGE))
            })
            .map(|(a, b, c)| {
                let x = (a.x + b.x + c.x) / 3.0;
                let y = (a.y + b.y + c.y) / 3.0;
                Point3::new(x, y, site_z)
            })
            .collect();

        AdsorptionSites {
            top,
            bridge,
            hollow,
        }
    }
}

fn identify_layers(surface: &Surface) -> Vec<Layer> {
    let atoms = surface.structure().atoms();
    let order: Vec<usize> = (0..atoms.len())
        .sorted_by(|&i, &j| atoms[i].position.z.total_cmp(&atoms[j].position.z))
        .collect();

    let mut layers: Vec<Layer> = Vec::new();
    for idx in order {
        let atom = &atoms[idx];
        let z = atom.position.z;
        match layers.last_mut() {
            Some(layer) if (z - layer.z_average).abs() <= LAYER_TOLERANCE => {
                let n = layer.atom_indices.len() as f64;
                layer.z_average = (layer.z_average * n + z) / (n + 1.0);
                layer.atom_indices.push(idx);
                if !layer.elements.contains(&atom.element) {
                    layer.elements.push(atom.element);
                }
            }
            _ => layers.push(Layer {
                index: layers.len(),
                z_average: z,
                elements: vec![atom.element],
                atom_indices: vec![idx],
            }),
        }
    }
    layers
}
