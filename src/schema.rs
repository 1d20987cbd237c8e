use crate::error::{ConsolidationError, Result};
use crate::series::SeriesPayload;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub type CompanyId = u32;

/// Field name -> summed value.
pub type ConsolidatedTotals = BTreeMap<String, f64>;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
pub enum Granularity {
    #[default]
    #[serde(rename = "mensual")]
    #[schemars(description = "One bucket per calendar month, keyed YYYY-MM.")]
    Monthly,

    #[serde(rename = "trimestral")]
    #[schemars(description = "Calendar quarters, keyed YYYY-Qn.")]
    Quarterly,

    #[serde(rename = "anual-fiscal")]
    #[schemars(description = "April to March fiscal years, keyed N-(N+1).")]
    FiscalYear,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Monthly => "mensual",
            Granularity::Quarterly => "trimestral",
            Granularity::FiscalYear => "anual-fiscal",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = ConsolidationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mensual" => Ok(Granularity::Monthly),
            "trimestral" => Ok(Granularity::Quarterly),
            "anual-fiscal" => Ok(Granularity::FiscalYear),
            other => Err(ConsolidationError::InvalidInput(format!(
                "Unknown consolidation type '{}'. Expected mensual, trimestral or anual-fiscal",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum AccountBehavior {
    #[schemars(
        description = "Flow statements represent activity over a period (income, expenses, cash movements). Values are summed across the months of a group."
    )]
    Flow,

    #[schemars(
        description = "Stock statements represent a balance at a point in time. A group takes the snapshot of its last month; values are never summed across months."
    )]
    Stock,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum StatementKind {
    IncomeStatement,
    BalanceSheet,
    OperatingFlow,
    CorporateFlow,
}

impl StatementKind {
    pub const ALL: [StatementKind; 4] = [
        StatementKind::IncomeStatement,
        StatementKind::BalanceSheet,
        StatementKind::OperatingFlow,
        StatementKind::CorporateFlow,
    ];

    pub fn behavior(&self) -> AccountBehavior {
        match self {
            StatementKind::BalanceSheet => AccountBehavior::Stock,
            _ => AccountBehavior::Flow,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StatementKind::IncomeStatement => "Income Statement",
            StatementKind::BalanceSheet => "Balance Sheet",
            StatementKind::OperatingFlow => "Operating Cash Flow",
            StatementKind::CorporateFlow => "Corporate Cash Flow",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConsolidationRequest {
    #[schemars(
        description = "Company ids to consolidate. Integers or numeric strings; anything else is dropped."
    )]
    pub empresas: Vec<serde_json::Value>,

    #[schemars(description = "First month of the range, YYYY-MM (inclusive).")]
    pub desde: String,

    #[schemars(description = "Last month of the range, YYYY-MM (inclusive).")]
    pub hasta: String,

    #[serde(default)]
    #[schemars(description = "mensual | trimestral | anual-fiscal. Defaults to mensual.")]
    pub tipo: Option<String>,
}

impl ConsolidationRequest {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ConsolidationError::InvalidInput(format!("Malformed request: {}", e)))
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ConsolidationRequest)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

/// Multi-series payload plus the flat totals kept for single-number consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConsolidationData {
    #[serde(rename = "datosPorPeriodo")]
    pub income_statement_series: SeriesPayload,

    #[serde(rename = "datosPorPeriodoBG")]
    pub balance_sheet_series: SeriesPayload,

    #[serde(rename = "datosPorPeriodoFO")]
    pub operating_flow_series: SeriesPayload,

    #[serde(rename = "datosPorPeriodoFC")]
    pub corporate_flow_series: SeriesPayload,

    #[serde(rename = "estadoResultados")]
    #[schemars(description = "Income statement fields summed over every group.")]
    pub income_statement: ConsolidatedTotals,

    #[serde(rename = "balanceGeneral")]
    #[schemars(description = "Balance sheet snapshot at the last month of the range.")]
    pub balance_sheet: ConsolidatedTotals,

    #[serde(rename = "flujoOperativo")]
    pub operating_flow: ConsolidatedTotals,

    #[serde(rename = "flujoCorporativo")]
    pub corporate_flow: ConsolidatedTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RequestedPeriod {
    pub desde: String,
    pub hasta: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    pub empresas_count: usize,
    pub periodos_count: usize,
    #[schemars(description = "Calendar date the balance sheet snapshot refers to.")]
    pub fecha_corte: Option<chrono::NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConsolidationResponse {
    /// HTTP-equivalent status; not part of the body.
    #[serde(skip)]
    pub status: u16,

    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub periodo: Option<RequestedPeriod>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empresas: Option<Vec<CompanyId>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tipo: Option<Granularity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ConsolidationData>,
}

impl ConsolidationResponse {
    pub fn failure(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            success: false,
            message: Some(message.into()),
            periodo: None,
            empresas: None,
            tipo: None,
            meta: None,
            data: None,
        }
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ConsolidationResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_granularity_wire_names() {
        assert_eq!(
            serde_json::to_string(&Granularity::FiscalYear).unwrap(),
            "\"anual-fiscal\""
        );
        assert_eq!(
            "trimestral".parse::<Granularity>().unwrap(),
            Granularity::Quarterly
        );
        assert!("semanal".parse::<Granularity>().unwrap_err().is_invalid_input());
    }

    #[test]
    fn test_granularity_defaults_to_monthly() {
        assert_eq!(Granularity::default(), Granularity::Monthly);
    }

    #[test]
    fn test_statement_behavior() {
        assert_eq!(StatementKind::BalanceSheet.behavior(), AccountBehavior::Stock);
        assert_eq!(StatementKind::IncomeStatement.behavior(), AccountBehavior::Flow);
        assert_eq!(StatementKind::OperatingFlow.behavior(), AccountBehavior::Flow);
        assert_eq!(StatementKind::CorporateFlow.behavior(), AccountBehavior::Flow);
    }

    #[test]
    fn test_request_parsing_defaults_tipo() {
        let request = ConsolidationRequest::from_json(
            r#"{"empresas": [1, "2"], "desde": "2024-01", "hasta": "2024-03"}"#,
        )
        .unwrap();
        assert_eq!(request.empresas.len(), 2);
        assert!(request.tipo.is_none());

        assert!(ConsolidationRequest::from_json("{\"desde\": 1}")
            .unwrap_err()
            .is_invalid_input());
    }

    #[test]
    fn test_schema_generation() {
        let schema_json = ConsolidationRequest::schema_as_json().unwrap();
        assert!(schema_json.contains("empresas"));
        assert!(schema_json.contains("desde"));
        assert!(schema_json.contains("hasta"));

        let response_schema =
            serde_json::to_string(&ConsolidationResponse::generate_json_schema()).unwrap();
        assert!(response_schema.contains("datosPorPeriodoBG"));
    }

    #[test]
    fn test_failure_body_shape() {
        let response = ConsolidationResponse::failure(400, "bad range");
        let json = response.to_json().unwrap();
        assert_eq!(json, r#"{"success":false,"message":"bad range"}"#);
        assert_eq!(response.status, 400);
    }
}
