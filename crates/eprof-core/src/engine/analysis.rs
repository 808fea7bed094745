use super::profile::{EnergySeries, ProfileResult};
use std::collections::BTreeMap;
use std::fmt;

/// The first minimum over the valid points of a series, as `(height, energy)`.
fn minimum(series: &EnergySeries) -> Option<(f64, f64)> {
    series
        .valid_points()
        .fold(None, |best: Option<(f64, f64)>, (h, e)| match best {
            Some((_, best_e)) if best_e <= e => best,
            _ => Some((h, e)),
        })
}

/// Binding energy (negated minimum normalized energy) per method with valid points.
pub fn binding_energies(result: &ProfileResult) -> BTreeMap<String, f64> {
    result
        .series
        .iter()
        .filter_map(|(method, series)| minimum(series).map(|(_, e)| (method.clone(), -e)))
        .collect()
}

/// Height of the minimum normalized energy per method with valid points.
///
/// Ties resolve to the lowest height.
pub fn optimal_heights(result: &ProfileResult) -> BTreeMap<String, f64> {
    result
        .series
        .iter()
        .filter_map(|(method, series)| minimum(series).map(|(h, _)| (method.clone(), h)))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodSummary {
    pub binding_energy: f64,
    pub optimal_height: f64,
    /// Spread between the highest and lowest valid normalized energy.
    pub energy_range: f64,
    pub valid_points: usize,
    pub total_points: usize,
}

/// Per-method binding statistics derived from a normalized profile.
///
/// Methods without a single valid point appear only in [`BindingSummary::failed`].
#[derive(Debug, Clone, PartialEq)]
pub struct BindingSummary {
    pub species: String,
    pub surface: String,
    pub methods: BTreeMap<String, MethodSummary>,
    pub failed: Vec<String>,
}

impl BindingSummary {
    pub fn from_profile(result: &ProfileResult) -> Self {
        let mut methods = BTreeMap::new();
        let mut failed = Vec::new();
        for (method, series) in &result.series {
            let Some((optimal_height, min_energy)) = minimum(series) else {
                failed.push(method.clone());
                continue;
            };
            let max_energy = series
                .valid_points()
                .map(|(_, e)| e)
                .fold(f64::NEG_INFINITY, f64::max);
            methods.insert(
                method.clone(),
                MethodSummary {
                    binding_energy: -min_energy,
                    optimal_height,
                    energy_range: max_energy - min_energy,
                    valid_points: series.valid_count(),
                    total_points: series.len(),
                },
            );
        }
        Self {
            species: result.species.clone(),
            surface: result.surface.clone(),
            methods,
            failed,
        }
    }

    /// The method with the largest binding energy.
    pub fn strongest(&self) -> Option<(&str, &MethodSummary)> {
        self.methods
            .iter()
            .max_by(|a, b| a.1.binding_energy.total_cmp(&b.1.binding_energy))
            .map(|(m, s)| (m.as_str(), s))
    }
}

impl fmt::Display for BindingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Binding summary: {} on {}", self.species, self.surface)?;
        writeln!(
            f,
            "{:<10} {:>14} {:>14} {:>12} {:>8}",
            "Method", "E_bind (eV)", "Height (Å)", "Range (eV)", "Valid"
        )?;
        writeln!(f, "{}", "-".repeat(62))?;
        for (method, s) in &self.methods {
            writeln!(
                f,
                "{:<10} {:>14.4} {:>14.2} {:>12.4} {:>8}",
                method,
                s.binding_energy,
                s.optimal_height,
                s.energy_range,
                format!("{}/{}", s.valid_points, s.total_points)
            )?;
        }
        for method in &self.failed {
            writeln!(f, "{method:<10} {:>14}", "no valid points")?;
        }
        Ok(())
    }
}
