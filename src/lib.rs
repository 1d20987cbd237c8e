//! # Financial Consolidation
//!
//! A library for consolidating the monthly financial statements of several companies into
//! one multi-period report, at monthly, quarterly or fiscal-year granularity.
//!
//! ## Core Concepts
//!
//! - **Statements**: Income Statement, Balance Sheet, Operating Flow and Corporate Flow, fetched
//!   per month from a [`StatementStore`]
//! - **Flow statements**: Summed across the months of a group
//! - **Stock statements**: The Balance Sheet is a point-in-time snapshot; a group reports its
//!   last month, never a sum
//! - **Fiscal year**: Runs April through March and is labelled `"YYYY-YYYY+1"`
//!
//! ## Example
//!
//! ```rust,ignore
//! use financial_consolidation::*;
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryStore::new());
//! let processor = ConsolidationProcessor::new(store, ConsolidationConfig::default())?;
//!
//! let request = ConsolidationRequest::from_json(
//!     r#"{"empresas": [1, 2], "desde": "2024-01", "hasta": "2024-06", "tipo": "trimestral"}"#,
//! )?;
//! let response = processor.handle_request(&request).await;
//! println!("{}", response.to_json()?);
//! ```

pub mod chart_of_accounts;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod ingestion;
pub mod period;
pub mod schema;
pub mod series;
pub mod summation;
pub mod utils;

pub use chart_of_accounts::{catalog_for, AccountEntry, ChartOfAccounts, LineItemCatalog};
pub use config::ConsolidationConfig;
pub use context::RequestContext;
pub use engine::{group_months, Consolidator, GroupedSeries, MonthGroup};
pub use error::{ConsolidationError, Result};
pub use ingestion::*;
pub use period::{ElementaryPeriod, GroupKey, PeriodRange};
pub use schema::*;
pub use series::SeriesPayload;
pub use summation::{sum_rows, RawStatementRecord};
pub use utils::*;

use log::{debug, info, warn};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Message returned for any failure that is not the caller's fault.
pub const GENERIC_FAILURE_MESSAGE: &str = "Error while consolidating data";

pub struct ConsolidationProcessor {
    consolidator: Consolidator,
}

impl ConsolidationProcessor {
    pub fn new(store: Arc<dyn StatementStore>, config: ConsolidationConfig) -> Result<Self> {
        Ok(Self {
            consolidator: Consolidator::new(store, config)?,
        })
    }

    pub fn config(&self) -> &ConsolidationConfig {
        self.consolidator.config()
    }

    pub async fn consolidate(
        &self,
        company_ids: &[CompanyId],
        range: &PeriodRange,
        granularity: Granularity,
    ) -> Result<ConsolidationData> {
        let mut ctx = RequestContext::new(self.config());
        self.consolidate_with_context(&mut ctx, company_ids, range, granularity)
            .await
    }

    /// Same as [`consolidate`](Self::consolidate), under a caller-owned cancellation/deadline context.
    pub async fn consolidate_with_context(
        &self,
        ctx: &mut RequestContext,
        company_ids: &[CompanyId],
        range: &PeriodRange,
        granularity: Granularity,
    ) -> Result<ConsolidationData> {
        let companies = validate_company_ids(company_ids)?;

        info!(
            "Consolidating {} for companies {:?} from {} to {}",
            granularity,
            companies,
            range.start(),
            range.end()
        );

        let grouped = self
            .consolidator
            .consolidate(ctx, &companies, range, granularity)
            .await?;

        let income_statement = grouped.income_statement.totals();
        debug!(
            "Income statement summary carries {} fields",
            income_statement.len()
        );

        let range_total = |kind: StatementKind| {
            grouped
                .range_totals
                .get(&kind)
                .cloned()
                .unwrap_or_else(|| catalog_for(kind).zeroed())
        };

        Ok(ConsolidationData {
            operating_flow: range_total(StatementKind::OperatingFlow),
            corporate_flow: range_total(StatementKind::CorporateFlow),
            balance_sheet: grouped.closing_balance_sheet.clone(),
            income_statement,
            income_statement_series: grouped.income_statement,
            balance_sheet_series: grouped.balance_sheet,
            operating_flow_series: grouped.operating_flow,
            corporate_flow_series: grouped.corporate_flow,
        })
    }

    /// Runs a wire request end to end and never fails: errors become a `success: false` body.
    pub async fn handle_request(&self, request: &ConsolidationRequest) -> ConsolidationResponse {
        let mut ctx = RequestContext::new(self.config());
        self.handle_request_with_context(&mut ctx, request).await
    }

    pub async fn handle_request_with_context(
        &self,
        ctx: &mut RequestContext,
        request: &ConsolidationRequest,
    ) -> ConsolidationResponse {
        match self.try_handle(ctx, request).await {
            Ok(response) => response,
            Err(e) if e.is_invalid_input() => {
                info!("Rejected consolidation request: {}", e);
                ConsolidationResponse::failure(e.status_code(), e.to_string())
            }
            Err(e) => {
                warn!("Consolidation failed: {}", e);
                ConsolidationResponse::failure(e.status_code(), GENERIC_FAILURE_MESSAGE)
            }
        }
    }

    async fn try_handle(
        &self,
        ctx: &mut RequestContext,
        request: &ConsolidationRequest,
    ) -> Result<ConsolidationResponse> {
        let companies = normalize_companies(&request.empresas)?;
        let range = build_month_range(&request.desde, &request.hasta)?;
        let granularity = match request.tipo.as_deref() {
            Some(tipo) => tipo.parse::<Granularity>()?,
            None => Granularity::default(),
        };

        let data = self
            .consolidate_with_context(ctx, &companies, &range, granularity)
            .await?;

        Ok(ConsolidationResponse {
            status: 200,
            success: true,
            message: None,
            periodo: Some(RequestedPeriod {
                desde: request.desde.clone(),
                hasta: request.hasta.clone(),
            }),
            meta: Some(ResponseMeta {
                empresas_count: companies.len(),
                periodos_count: data.income_statement_series.len(),
                fecha_corte: range.end().month_end(),
            }),
            empresas: Some(companies),
            tipo: Some(granularity),
            data: Some(data),
        })
    }
}

/// Normalizes the wire company list: integers or numeric strings are kept, anything else dropped.
pub fn normalize_companies(raw: &[Value]) -> Result<Vec<CompanyId>> {
    if raw.is_empty() {
        return Err(ConsolidationError::invalid(
            "at least one company must be selected",
        ));
    }

    let parsed: Vec<i64> = raw
        .iter()
        .filter_map(|v| match v {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        })
        .collect();

    if parsed.is_empty() {
        return Err(ConsolidationError::invalid("invalid company list"));
    }

    let ids = parsed
        .into_iter()
        .map(|id| {
            CompanyId::try_from(id)
                .ok()
                .filter(|id| *id > 0)
                .ok_or_else(|| {
                    ConsolidationError::invalid(format!("company id {} must be positive", id))
                })
        })
        .collect::<Result<Vec<_>>>()?;

    validate_company_ids(&ids)
}

/// Rejects an empty or non-positive company set; returns it sorted without duplicates.
fn validate_company_ids(company_ids: &[CompanyId]) -> Result<Vec<CompanyId>> {
    if company_ids.is_empty() {
        return Err(ConsolidationError::invalid(
            "at least one company must be selected",
        ));
    }
    if company_ids.contains(&0) {
        return Err(ConsolidationError::invalid("company id 0 must be positive"));
    }

    let unique: BTreeSet<CompanyId> = company_ids.iter().copied().collect();
    Ok(unique.into_iter().collect())
}

pub async fn consolidate(
    store: Arc<dyn StatementStore>,
    company_ids: &[CompanyId],
    range: &PeriodRange,
    granularity: Granularity,
) -> Result<ConsolidationData> {
    ConsolidationProcessor::new(store, ConsolidationConfig::default())?
        .consolidate(company_ids, range, granularity)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn p(year: i32, month: u32) -> ElementaryPeriod {
        ElementaryPeriod { year, month }
    }

    fn fields(value: Value) -> RawStatementRecord {
        value.as_object().cloned().unwrap()
    }

    fn sample_store() -> Arc<InMemoryStore> {
        let mut store = InMemoryStore::new();
        for month in 1..=3 {
            store.insert(
                1,
                "Alfa",
                StatementKind::IncomeStatement,
                p(2024, month),
                fields(json!({"VENTAS_NETAS": 100.0 * month as f64, "COSTO_VENTAS": 40})),
            );
            store.insert(
                2,
                "Beta",
                StatementKind::IncomeStatement,
                p(2024, month),
                fields(json!({"VENTAS_NETAS": 50})),
            );
            store.insert(
                1,
                "Alfa",
                StatementKind::OperatingFlow,
                p(2024, month),
                fields(json!({"VENTAS": 10})),
            );
        }
        store.insert(
            1,
            "Alfa",
            StatementKind::BalanceSheet,
            p(2024, 3),
            fields(json!({"DISPONIBLE": 500})),
        );
        Arc::new(store)
    }

    #[test]
    fn test_normalize_companies() {
        let ids = normalize_companies(&[json!(3), json!("1"), json!("x"), json!(null), json!(3)])
            .unwrap();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_normalize_companies_accepts_integral_floats() {
        let ids = normalize_companies(&[json!(1.0), json!(2.5), json!(4)]).unwrap();
        assert_eq!(ids, vec![1, 4]);
    }

    #[test]
    fn test_normalize_companies_errors() {
        let empty = normalize_companies(&[]).unwrap_err();
        assert!(empty.to_string().contains("at least one company"));

        let garbage = normalize_companies(&[json!("abc"), json!(true)]).unwrap_err();
        assert!(garbage.to_string().contains("invalid company list"));

        let negative = normalize_companies(&[json!(-4)]).unwrap_err();
        assert!(negative.is_invalid_input());
    }

    #[tokio::test]
    async fn test_flat_totals() {
        let processor =
            ConsolidationProcessor::new(sample_store(), ConsolidationConfig::default()).unwrap();
        let range = build_month_range("2024-01", "2024-03").unwrap();

        let data = processor
            .consolidate(&[1, 2], &range, Granularity::Monthly)
            .await
            .unwrap();

        assert_eq!(data.income_statement_series.len(), 3);
        assert!((data.income_statement["VENTAS_NETAS"] - 750.0).abs() < 0.01);
        assert!((data.operating_flow["VENTAS"] - 30.0).abs() < 0.01);
        assert!((data.balance_sheet["DISPONIBLE"] - 500.0).abs() < 0.01);
        assert!((data.corporate_flow.values().sum::<f64>()).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_empty_company_set_rejected() {
        let processor =
            ConsolidationProcessor::new(sample_store(), ConsolidationConfig::default()).unwrap();
        let range = build_month_range("2024-01", "2024-03").unwrap();

        let err = processor
            .consolidate(&[], &range, Granularity::Monthly)
            .await
            .unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[tokio::test]
    async fn test_handle_request_success_envelope() {
        let processor =
            ConsolidationProcessor::new(sample_store(), ConsolidationConfig::default()).unwrap();
        let request = ConsolidationRequest::from_json(
            r#"{"empresas": ["2", 1], "desde": "2024-01", "hasta": "2024-03", "tipo": "trimestral"}"#,
        )
        .unwrap();

        let response = processor.handle_request(&request).await;
        assert_eq!(response.status, 200);
        assert!(response.success);
        assert_eq!(response.empresas, Some(vec![1, 2]));
        assert_eq!(response.tipo, Some(Granularity::Quarterly));

        let meta = response.meta.unwrap();
        assert_eq!(meta.periodos_count, 1);
        assert_eq!(meta.fecha_corte.unwrap().to_string(), "2024-03-31");
    }

    #[tokio::test]
    async fn test_handle_request_defaults_to_monthly() {
        let processor =
            ConsolidationProcessor::new(sample_store(), ConsolidationConfig::default()).unwrap();
        let request = ConsolidationRequest::from_json(
            r#"{"empresas": [1], "desde": "2024-01", "hasta": "2024-02"}"#,
        )
        .unwrap();

        let response = processor.handle_request(&request).await;
        assert_eq!(response.tipo, Some(Granularity::Monthly));
        assert_eq!(response.data.unwrap().income_statement_series.periods, vec!["2024-01", "2024-02"]);
    }

    #[tokio::test]
    async fn test_handle_request_validation_failures() {
        let processor =
            ConsolidationProcessor::new(sample_store(), ConsolidationConfig::default()).unwrap();

        for body in [
            r#"{"empresas": [1], "desde": "2024-13", "hasta": "2024-12"}"#,
            r#"{"empresas": [1], "desde": "2024-05", "hasta": "2024-01"}"#,
            r#"{"empresas": [1], "desde": "2024-01", "hasta": "2024-02", "tipo": "semanal"}"#,
            r#"{"empresas": [], "desde": "2024-01", "hasta": "2024-02"}"#,
        ] {
            let request = ConsolidationRequest::from_json(body).unwrap();
            let response = processor.handle_request(&request).await;
            assert_eq!(response.status, 400, "body {}", body);
            assert!(!response.success);
            assert!(response.data.is_none());
            assert!(response.message.is_some());
        }
    }
}
