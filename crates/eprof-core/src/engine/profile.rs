use super::grid::HeightRange;
use super::normalize;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Energies of one method over its own height subset.
///
/// Failed evaluations are stored as `NaN` and serialized as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergySeries {
    /// Task label (ML) or functional (DFT) the energies were evaluated under.
    pub task: String,
    pub heights: Vec<f64>,
    /// Energies exactly as returned by the backend, in eV.
    #[serde(with = "nan_as_null")]
    pub raw: Vec<f64>,
    /// Energies rebased on the reference point; equal to `raw` until normalized.
    #[serde(with = "nan_as_null")]
    pub energies: Vec<f64>,
    /// The raw energy subtracted during normalization, if any valid point existed.
    #[serde(default)]
    pub reference: Option<f64>,
}

impl EnergySeries {
    pub fn new(task: impl Into<String>, heights: Vec<f64>, raw: Vec<f64>) -> Self {
        Self {
            task: task.into(),
            heights,
            energies: raw.clone(),
            raw,
            reference: None,
        }
    }

    pub fn len(&self) -> usize {
        self.heights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heights.is_empty()
    }

    pub fn valid_count(&self) -> usize {
        self.energies.iter().filter(|e| e.is_finite()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.len() - self.valid_count()
    }

    /// Share of missing points, `0.0` for an empty series.
    pub fn missing_fraction(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.failed_count() as f64 / self.len() as f64
        }
    }

    /// `(height, energy)` pairs of the successfully evaluated points.
    pub fn valid_points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.heights
            .iter()
            .copied()
            .zip(self.energies.iter().copied())
            .filter(|(_, e)| e.is_finite())
    }

    /// Recomputes `energies` from `raw`, rebased on the last valid raw point.
    pub fn normalize(&mut self) {
        self.energies.clone_from(&self.raw);
        self.reference = normalize::normalize(&mut self.energies);
    }

    /// Energy at `height`, if the series sampled it.
    pub fn energy_at(&self, height: f64) -> Option<f64> {
        self.heights
            .iter()
            .position(|&h| (h - height).abs() < 1e-9)
            .map(|i| self.energies[i])
    }
}

/// Sampling parameters recorded alongside the energies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingRecord {
    pub orientation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<HeightRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dft_height_stride: Option<usize>,
}

/// The outcome of one sampler invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileResult {
    pub species: String,
    pub surface: String,
    /// Sorted union of every method's heights.
    pub heights: Vec<f64>,
    /// Keyed by method id.
    pub series: BTreeMap<String, EnergySeries>,
    pub config: SamplingRecord,
}

impl ProfileResult {
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn get(&self, method: &str) -> Option<&EnergySeries> {
        self.series.get(method)
    }
}

mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        values
            .iter()
            .map(|v| v.is_finite().then_some(*v))
            .collect::<Vec<Option<f64>>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let values = Vec::<Option<f64>>::deserialize(deserializer)?;
        Ok(values
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect())
    }
}
