use crate::period::ElementaryPeriod;
use crate::schema::{CompanyId, StatementKind};
use crate::summation::RawStatementRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Read side of the statement store, one call per statement type and month.
///
/// Implementations must return an empty list (not an error) when no company has data for the
/// month, and must include `ID_EMPRESA` / `NOMBRE_EMPRESA` next to the numeric columns.
#[async_trait]
pub trait StatementStore: Send + Sync {
    async fn get_for_consolidation(
        &self,
        kind: StatementKind,
        company_ids: &[CompanyId],
        period: ElementaryPeriod,
    ) -> std::result::Result<Vec<RawStatementRecord>, StoreError>;
}

/// One company's figures for one statement and month.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyMonthRow {
    pub company_id: CompanyId,
    pub company_name: String,
    pub statement: StatementKind,
    pub period: ElementaryPeriod,
    pub fields: BTreeMap<String, f64>,
}

/// Statement store held in memory, shaped like the relational store's consolidation query.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: BTreeMap<(StatementKind, ElementaryPeriod, CompanyId), RawStatementRecord>,
    company_names: BTreeMap<CompanyId, String>,
    fetches: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: &[CompanyMonthRow]) -> Self {
        let mut store = Self::new();
        for row in rows {
            let fields = row
                .fields
                .iter()
                .filter_map(|(k, v)| {
                    serde_json::Number::from_f64(*v).map(|n| (k.clone(), Value::Number(n)))
                })
                .collect();
            store.insert(
                row.company_id,
                &row.company_name,
                row.statement,
                row.period,
                fields,
            );
        }
        store
    }

    /// Stores a record, adding the metadata columns the consolidation query joins in.
    pub fn insert(
        &mut self,
        company_id: CompanyId,
        company_name: &str,
        statement: StatementKind,
        period: ElementaryPeriod,
        mut fields: RawStatementRecord,
    ) {
        self.company_names
            .insert(company_id, company_name.to_string());

        fields.insert("ID_EMPRESA".to_string(), Value::from(company_id));
        fields.insert(
            "NOMBRE_EMPRESA".to_string(),
            Value::from(company_name.to_string()),
        );
        fields.insert("ANO".to_string(), Value::from(period.year));
        fields.insert("MES".to_string(), Value::from(period.month));

        self.records.insert((statement, period, company_id), fields);
    }

    /// Number of `get_for_consolidation` calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatementStore for InMemoryStore {
    async fn get_for_consolidation(
        &self,
        kind: StatementKind,
        company_ids: &[CompanyId],
        period: ElementaryPeriod,
    ) -> std::result::Result<Vec<RawStatementRecord>, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let mut matches: Vec<(&str, &RawStatementRecord)> = company_ids
            .iter()
            .filter_map(|id| {
                let record = self.records.get(&(kind, period, *id))?;
                let name = self.company_names.get(id).map(String::as_str).unwrap_or("");
                Some((name, record))
            })
            .collect();

        // ORDER BY NOMBRE_EMPRESA
        matches.sort_by(|a, b| a.0.cmp(b.0));

        Ok(matches.into_iter().map(|(_, r)| r.clone()).collect())
    }
}
