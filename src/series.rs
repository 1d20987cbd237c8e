use crate::schema::ConsolidatedTotals;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Time series for one statement type, index-aligned with `periods`.
///
/// Every series always has exactly `periods.len()` entries: a field first seen in a later
/// group is front-filled with zeros, and a field missing from a group gets a zero there.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SeriesPayload {
    #[serde(rename = "periodos")]
    #[schemars(description = "Ordered group keys (YYYY-MM, YYYY-Qn or N-(N+1)).")]
    pub periods: Vec<String>,

    #[schemars(description = "Field name -> values, one per entry in periodos.")]
    pub series: BTreeMap<String, Vec<f64>>,
}

impl SeriesPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one group's totals under `label`, keeping every series aligned.
    pub fn push_group(&mut self, label: impl Into<String>, totals: &ConsolidatedTotals) {
        let previous_len = self.periods.len();
        self.periods.push(label.into());

        for (field, &value) in totals {
            self.series
                .entry(field.clone())
                .or_insert_with(|| vec![0.0; previous_len])
                .push(value);
        }

        let target = self.periods.len();
        for values in self.series.values_mut() {
            if values.len() < target {
                values.push(0.0);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[f64]> {
        self.series.get(field).map(Vec::as_slice)
    }

    /// Value of `field` in the group labelled `period`, if both exist.
    pub fn value_at(&self, field: &str, period: &str) -> Option<f64> {
        let idx = self.periods.iter().position(|p| p == period)?;
        self.series.get(field).and_then(|values| values.get(idx)).copied()
    }

    /// Sums each series end-to-end.
    pub fn totals(&self) -> ConsolidatedTotals {
        self.series
            .iter()
            .map(|(field, values)| (field.clone(), values.iter().sum()))
            .collect()
    }

    pub fn is_aligned(&self) -> bool {
        self.series.values().all(|v| v.len() == self.periods.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totals(pairs: &[(&str, f64)]) -> ConsolidatedTotals {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_late_field_is_front_filled() {
        let mut payload = SeriesPayload::new();
        payload.push_group("2024-01", &totals(&[("A", 1.0)]));
        payload.push_group("2024-02", &totals(&[("A", 2.0), ("X", 5.0)]));
        payload.push_group("2024-03", &totals(&[("A", 3.0)]));

        assert_eq!(payload.len(), 3);
        assert_eq!(payload.get("X").unwrap(), &[0.0, 5.0, 0.0]);
        assert_eq!(payload.get("A").unwrap(), &[1.0, 2.0, 3.0]);
        assert!(payload.is_aligned());
    }

    #[test]
    fn test_empty_group_keeps_alignment() {
        let mut payload = SeriesPayload::new();
        payload.push_group("2024-Q1", &totals(&[("A", 10.0)]));
        payload.push_group("2024-Q2", &ConsolidatedTotals::new());

        assert_eq!(payload.get("A").unwrap(), &[10.0, 0.0]);
        assert_eq!(payload.value_at("A", "2024-Q2"), Some(0.0));
        assert_eq!(payload.value_at("A", "2024-Q3"), None);
    }

    #[test]
    fn test_totals_sum_end_to_end() {
        let mut payload = SeriesPayload::new();
        payload.push_group("2024-01", &totals(&[("VENTAS_NETAS", 100.0)]));
        payload.push_group("2024-02", &totals(&[("VENTAS_NETAS", 50.0)]));

        let flat = payload.totals();
        assert!((flat["VENTAS_NETAS"] - 150.0).abs() < 0.01);
    }

    #[test]
    fn test_wire_shape() {
        let mut payload = SeriesPayload::new();
        payload.push_group("2024-01", &totals(&[("A", 1.5)]));
        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(json, r#"{"periodos":["2024-01"],"series":{"A":[1.5]}}"#);
    }
}
