use super::profile::ProfileResult;
use tracing::{debug, warn};

/// Rebases `energies` on its last (highest-height) finite entry.
///
/// Missing entries stay missing and the reference entry becomes exactly zero. A series
/// without any finite entry is left untouched. Returns the subtracted reference.
pub fn normalize(energies: &mut [f64]) -> Option<f64> {
    let reference = energies.iter().rev().copied().find(|e| e.is_finite())?;
    for energy in energies.iter_mut() {
        *energy -= reference;
    }
    Some(reference)
}

/// Normalizes every series of `result` independently.
pub fn normalize_profile(result: &mut ProfileResult) {
    for (method, series) in result.series.iter_mut() {
        series.normalize();
        match series.reference {
            Some(reference) => debug!(method, reference, "Series normalized."),
            None => warn!(method, "No valid points; series left unnormalized."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::profile::{EnergySeries, SamplingRecord};
    use std::collections::BTreeMap;

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            if e.is_nan() {
                assert!(a.is_nan(), "expected NaN, got {a}");
            } else {
                assert!((a - e).abs() < 1e-12, "expected {e}, got {a}");
            }
        }
    }

    #[test]
    fn rebases_on_last_point() {
        let mut energies = [-1.0, -3.0, -0.5, 0.1];
        assert_eq!(normalize(&mut energies), Some(0.1));
        assert_close(&energies, &[-1.1, -3.1, -0.6, 0.0]);
        assert_eq!(energies[3], 0.0);
    }

    #[test]
    fn rebases_on_last_valid_point_and_keeps_gaps() {
        let mut energies = [-1.0, f64::NAN, -0.5];
        normalize(&mut energies);
        assert_close(&energies, &[-0.5, f64::NAN, 0.0]);

        let mut trailing_gap = [-2.0, -1.0, f64::NAN];
        assert_eq!(normalize(&mut trailing_gap), Some(-1.0));
        assert_close(&trailing_gap, &[-1.0, 0.0, f64::NAN]);
    }

    #[test]
    fn all_missing_series_is_a_no_op() {
        let mut energies = [f64::NAN, f64::NAN];
        assert_eq!(normalize(&mut energies), None);
        assert!(energies.iter().all(|e| e.is_nan()));
        assert_eq!(normalize(&mut []), None);
    }

    #[test]
    fn normalizing_twice_is_idempotent() {
        let mut once = [-1.0, -3.0, f64::NAN, -0.5, 0.1];
        normalize(&mut once);
        let mut twice = once;
        normalize(&mut twice);
        assert_close(&twice, &once);
    }

    #[test]
    fn profile_series_are_normalized_independently() {
        let mut series = BTreeMap::new();
        series.insert(
            "omat".to_string(),
            EnergySeries::new("omat", vec![2.0, 3.0], vec![-2.0, -1.0]),
        );
        series.insert(
            "dft".to_string(),
            EnergySeries::new("pbe", vec![2.0], vec![f64::NAN]),
        );
        let mut result = ProfileResult {
            species: "H".to_string(),
            surface: "Au(1,1,1)".to_string(),
            heights: vec![2.0, 3.0],
            series,
            config: SamplingRecord {
                orientation: "default".to_string(),
                range: None,
                dft_height_stride: None,
            },
        };
        normalize_profile(&mut result);
        assert_close(&result.series["omat"].energies, &[-1.0, 0.0]);
        assert!(result.series["dft"].energies[0].is_nan());
        assert_eq!(result.series["dft"].reference, None);
    }
}
