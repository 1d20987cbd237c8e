use crate::schema::ConsolidatedTotals;
use log::trace;
use serde_json::Value;

/// One company's statement for one elementary month, as returned by the store.
///
/// Numeric line items sit next to metadata columns (`ID_*`, `NOMBRE_EMPRESA`, `ANO`, `MES`,
/// `periodo`). Values may arrive as JSON numbers or as numeric strings (decimal columns).
pub type RawStatementRecord = serde_json::Map<String, Value>;

const METADATA_FIELDS: [&str; 5] = ["NOMBRE_EMPRESA", "ID_EMPRESA", "ANO", "MES", "periodo"];

pub fn is_metadata_field(field: &str) -> bool {
    field.starts_with("ID_") || METADATA_FIELDS.contains(&field)
}

/// Reads a finite number out of a record value.
///
/// Numbers and numeric strings are accepted; everything else (null, booleans, text,
/// NaN/infinity) yields `None` and contributes nothing to a total.
pub fn numeric_value(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok()?
        }
        _ => return None,
    };

    n.is_finite().then_some(n)
}

/// Sums every non-metadata numeric field across `rows`.
///
/// The output holds the union of fields seen; a field missing from one row simply does not
/// contribute. Non-numeric values are skipped, never an error.
pub fn sum_rows<'a, I>(rows: I) -> ConsolidatedTotals
where
    I: IntoIterator<Item = &'a RawStatementRecord>,
{
    let mut totals = ConsolidatedTotals::new();

    for row in rows {
        for (key, value) in row {
            if is_metadata_field(key) {
                continue;
            }

            match numeric_value(value) {
                Some(n) => *totals.entry(key.clone()).or_insert(0.0) += n,
                None => trace!("Skipping non-numeric value for {}: {}", key, value),
            }
        }
    }

    totals
}

/// Adds `other` into `totals` field by field.
pub fn accumulate(totals: &mut ConsolidatedTotals, other: &ConsolidatedTotals) {
    for (key, value) in other {
        *totals.entry(key.clone()).or_insert(0.0) += value;
    }
}
