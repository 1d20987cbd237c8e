use crate::schema::{AccountBehavior, ConsolidatedTotals, StatementKind};
use crate::summation::{numeric_value, RawStatementRecord};
use log::trace;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What to do with a non-metadata field that is not in a statement's catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnknownFieldPolicy {
    Ignore,
    Keep,
}

/// A subtotal computed from other line items when a record does not carry it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedField {
    pub name: &'static str,
    pub plus: &'static [&'static str],
    pub minus: &'static [&'static str],
}

impl DerivedField {
    fn evaluate(&self, record: &RawStatementRecord) -> f64 {
        let value_of = |field: &&str| record.get(*field).and_then(numeric_value).unwrap_or(0.0);
        let added: f64 = self.plus.iter().map(value_of).sum();
        let subtracted: f64 = self.minus.iter().map(value_of).sum();
        added - subtracted
    }

    pub fn formula(&self) -> String {
        let mut formula = self.plus.join(" + ");
        for field in self.minus {
            formula.push_str(" - ");
            formula.push_str(field);
        }
        formula
    }
}

/// Closed set of line items for one statement type.
#[derive(Debug)]
pub struct LineItemCatalog {
    pub kind: StatementKind,
    pub inputs: &'static [&'static str],
    /// Evaluated in order, so a later entry may reference an earlier one.
    pub derived: &'static [DerivedField],
    pub unknown_fields: UnknownFieldPolicy,
}

static INCOME_STATEMENT: LineItemCatalog = LineItemCatalog {
    kind: StatementKind::IncomeStatement,
    inputs: &[
        "VENTAS_NETAS",
        "COSTO_VENTAS",
        "GASTO_ADMINISTRATIVO",
        "GASTO_COMERCIALIZACION",
        "GASTO_SIG",
        "GASTO_TRIBUTARIO",
        "GASTO_FINANCIERO",
        "OTROS_INGRESOS",
        "OTROS_EGRESOS",
    ],
    derived: &[
        DerivedField {
            name: "UTILIDAD_VENTAS",
            plus: &["VENTAS_NETAS"],
            minus: &["COSTO_VENTAS"],
        },
        DerivedField {
            name: "GASTO_OPERATIVO",
            plus: &["GASTO_ADMINISTRATIVO", "GASTO_COMERCIALIZACION", "GASTO_SIG"],
            minus: &[],
        },
        DerivedField {
            name: "EBIT",
            plus: &["UTILIDAD_VENTAS"],
            minus: &["GASTO_OPERATIVO"],
        },
        DerivedField {
            name: "UTILIDAD_DESPUES_IMPUESTOS",
            plus: &["EBIT"],
            minus: &["GASTO_TRIBUTARIO", "GASTO_FINANCIERO"],
        },
        DerivedField {
            name: "UTILIDAD_NETA",
            plus: &["UTILIDAD_DESPUES_IMPUESTOS", "OTROS_INGRESOS"],
            minus: &["OTROS_EGRESOS"],
        },
    ],
    unknown_fields: UnknownFieldPolicy::Ignore,
};

static BALANCE_SHEET: LineItemCatalog = LineItemCatalog {
    kind: StatementKind::BalanceSheet,
    inputs: &[
        "DISPONIBLE",
        "EXIGIBLE",
        "REALIZABLE",
        "ACTIVO_FIJO_TANGIBLE",
        "ACTIVO_DIFERIDO",
        "OTROS_ACTIVOS",
        "PASIVO_CORRIENTE",
        "PREVISION_BENEFICIOS_SOCIALES",
        "OBLIGACIONES_BANCARIAS",
        "INTERESES_POR_PAGAR",
        "PROCESOS_LEGALES",
        "PATRIMONIO",
    ],
    derived: &[
        DerivedField {
            name: "ACTIVO_CORRIENTE",
            plus: &["DISPONIBLE", "EXIGIBLE", "REALIZABLE"],
            minus: &[],
        },
        DerivedField {
            name: "ACTIVO_NO_CORRIENTE",
            plus: &["ACTIVO_FIJO_TANGIBLE", "ACTIVO_DIFERIDO", "OTROS_ACTIVOS"],
            minus: &[],
        },
        DerivedField {
            name: "TOTAL_ACTIVO",
            plus: &["ACTIVO_CORRIENTE", "ACTIVO_NO_CORRIENTE"],
            minus: &[],
        },
        DerivedField {
            name: "PASIVO_NO_CORRIENTE",
            plus: &[
                "PREVISION_BENEFICIOS_SOCIALES",
                "OBLIGACIONES_BANCARIAS",
                "INTERESES_POR_PAGAR",
                "PROCESOS_LEGALES",
            ],
            minus: &[],
        },
        DerivedField {
            name: "TOTAL_PASIVO",
            plus: &["PASIVO_CORRIENTE", "PASIVO_NO_CORRIENTE"],
            minus: &[],
        },
        DerivedField {
            name: "TOTAL_PASIVO_PATRIMONIO",
            plus: &["TOTAL_PASIVO", "PATRIMONIO"],
            minus: &[],
        },
    ],
    unknown_fields: UnknownFieldPolicy::Keep,
};

static OPERATING_FLOW: LineItemCatalog = LineItemCatalog {
    kind: StatementKind::OperatingFlow,
    inputs: &[
        "VENTAS",
        "VENTAS_EXPORTACION",
        "CARTERA",
        "TRANSPORTES_ING",
        "OTROS_INGRESOS",
        "GASTOS_ADMINISTRATIVOS",
        "GASTOS_COMERCIALES",
        "GASTOS_PRODUCCION",
        "ENVIOS_CTA_CORP",
        "IMPUESTOS",
        "TRANSPORTES_EGR",
        "CUENTAS_POR_PAGAR",
        "INVERSIONES",
        "OTROS_GASTOS",
        "SALDO_ANTERIOR",
    ],
    derived: &[
        DerivedField {
            name: "TOTAL_INGRESOS",
            plus: &[
                "VENTAS",
                "VENTAS_EXPORTACION",
                "CARTERA",
                "TRANSPORTES_ING",
                "OTROS_INGRESOS",
            ],
            minus: &[],
        },
        DerivedField {
            name: "TOTAL_EGRESOS",
            plus: &[
                "GASTOS_ADMINISTRATIVOS",
                "GASTOS_COMERCIALES",
                "GASTOS_PRODUCCION",
                "ENVIOS_CTA_CORP",
                "IMPUESTOS",
                "TRANSPORTES_EGR",
                "CUENTAS_POR_PAGAR",
                "INVERSIONES",
                "OTROS_GASTOS",
            ],
            minus: &[],
        },
        DerivedField {
            name: "SALDO_ACTUAL",
            plus: &["SALDO_ANTERIOR", "TOTAL_INGRESOS"],
            minus: &["TOTAL_EGRESOS"],
        },
    ],
    unknown_fields: UnknownFieldPolicy::Keep,
};

static CORPORATE_FLOW: LineItemCatalog = LineItemCatalog {
    kind: StatementKind::CorporateFlow,
    inputs: &[
        "TRANSFERENCIA_FONDOS",
        "DESEMBOLSOS_BANCARIOS",
        "OTROS_INGRESOS",
        "PRESTAMOS_BANCARIOS",
        "INVERSIONES",
        "RPR_CONSULTORES",
        "BONOS_PLRS",
        "DIVIDENDOS_PAGAR",
        "CUENTAS_PAGAR",
        "AGUINALDOS",
        "FINIQUITOS",
        "PRIMAS",
        "RETROACTIVOS",
        "IUE",
        "OTROS_GASTOS",
        "SALDO_ANTERIOR",
    ],
    derived: &[
        DerivedField {
            name: "TOTAL_INGRESOS",
            plus: &["TRANSFERENCIA_FONDOS", "DESEMBOLSOS_BANCARIOS", "OTROS_INGRESOS"],
            minus: &[],
        },
        DerivedField {
            name: "TOTAL_EGRESOS",
            plus: &[
                "PRESTAMOS_BANCARIOS",
                "INVERSIONES",
                "RPR_CONSULTORES",
                "BONOS_PLRS",
                "DIVIDENDOS_PAGAR",
                "CUENTAS_PAGAR",
                "AGUINALDOS",
                "FINIQUITOS",
                "PRIMAS",
                "RETROACTIVOS",
                "IUE",
                "OTROS_GASTOS",
            ],
            minus: &[],
        },
        DerivedField {
            name: "SALDO_ACTUAL",
            plus: &["SALDO_ANTERIOR", "TOTAL_INGRESOS"],
            minus: &["TOTAL_EGRESOS"],
        },
    ],
    unknown_fields: UnknownFieldPolicy::Keep,
};

pub fn catalog_for(kind: StatementKind) -> &'static LineItemCatalog {
    match kind {
        StatementKind::IncomeStatement => &INCOME_STATEMENT,
        StatementKind::BalanceSheet => &BALANCE_SHEET,
        StatementKind::OperatingFlow => &OPERATING_FLOW,
        StatementKind::CorporateFlow => &CORPORATE_FLOW,
    }
}

impl LineItemCatalog {
    /// Input fields followed by derived fields.
    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.inputs
            .iter()
            .copied()
            .chain(self.derived.iter().map(|d| d.name))
    }

    pub fn is_known(&self, field: &str) -> bool {
        self.field_names().any(|name| name == field)
    }

    /// Every catalog field at zero.
    pub fn zeroed(&self) -> ConsolidatedTotals {
        self.field_names().map(|f| (f.to_string(), 0.0)).collect()
    }

    /// Fills derived fields the record lacks (absent or non-numeric). Stored values win.
    pub fn complete_record(&self, record: &mut RawStatementRecord) {
        for derived in self.derived {
            let present = record.get(derived.name).and_then(numeric_value).is_some();
            if present {
                continue;
            }

            let value = derived.evaluate(record);
            if let Some(number) = serde_json::Number::from_f64(value) {
                record.insert(derived.name.to_string(), Value::Number(number));
            }
        }
    }

    /// Projects raw totals onto the catalog: all known fields present, unknown fields kept
    /// or dropped according to the policy.
    pub fn normalize(&self, totals: &ConsolidatedTotals) -> ConsolidatedTotals {
        let mut normalized = self.zeroed();

        for (field, &value) in totals {
            if self.is_known(field) {
                normalized.insert(field.clone(), value);
                continue;
            }

            match self.unknown_fields {
                UnknownFieldPolicy::Keep => {
                    trace!("Keeping uncatalogued {} field {}", self.kind, field);
                    normalized.insert(field.clone(), value);
                }
                UnknownFieldPolicy::Ignore => {
                    trace!("Ignoring uncatalogued {} field {}", self.kind, field);
                }
            }
        }

        normalized
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountEntry {
    pub name: String,
    pub statement: StatementKind,
    pub behavior: AccountBehavior,
    /// `Some` for subtotals, e.g. `"VENTAS_NETAS - COSTO_VENTAS"`.
    pub formula: Option<String>,
}

/// Published list of every line item the consolidation understands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartOfAccounts {
    pub income_statement: Vec<AccountEntry>,
    pub balance_sheet: Vec<AccountEntry>,
    pub operating_flow: Vec<AccountEntry>,
    pub corporate_flow: Vec<AccountEntry>,
}

impl ChartOfAccounts {
    pub fn standard() -> Self {
        Self {
            income_statement: Self::entries(StatementKind::IncomeStatement),
            balance_sheet: Self::entries(StatementKind::BalanceSheet),
            operating_flow: Self::entries(StatementKind::OperatingFlow),
            corporate_flow: Self::entries(StatementKind::CorporateFlow),
        }
    }

    fn entries(kind: StatementKind) -> Vec<AccountEntry> {
        let catalog = catalog_for(kind);
        let inputs = catalog.inputs.iter().map(|name| AccountEntry {
            name: name.to_string(),
            statement: kind,
            behavior: kind.behavior(),
            formula: None,
        });
        let derived = catalog.derived.iter().map(|d| AccountEntry {
            name: d.name.to_string(),
            statement: kind,
            behavior: kind.behavior(),
            formula: Some(d.formula()),
        });
        inputs.chain(derived).collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> RawStatementRecord {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_income_statement_derived_chain() {
        let mut row = record(json!({
            "VENTAS_NETAS": 1000,
            "COSTO_VENTAS": 400,
            "GASTO_ADMINISTRATIVO": 100,
            "GASTO_COMERCIALIZACION": 50,
            "GASTO_SIG": 50,
            "GASTO_TRIBUTARIO": 30,
            "GASTO_FINANCIERO": 20,
            "OTROS_INGRESOS": 10,
            "OTROS_EGRESOS": 5
        }));

        catalog_for(StatementKind::IncomeStatement).complete_record(&mut row);

        let get = |f: &str| row.get(f).and_then(numeric_value).unwrap();
        assert!((get("UTILIDAD_VENTAS") - 600.0).abs() < 0.01);
        assert!((get("GASTO_OPERATIVO") - 200.0).abs() < 0.01);
        assert!((get("EBIT") - 400.0).abs() < 0.01);
        assert!((get("UTILIDAD_DESPUES_IMPUESTOS") - 350.0).abs() < 0.01);
        assert!((get("UTILIDAD_NETA") - 355.0).abs() < 0.01);
    }

    #[test]
    fn test_stored_derived_value_wins() {
        let mut row = record(json!({"VENTAS_NETAS": 100, "COSTO_VENTAS": 40, "EBIT": "75"}));
        catalog_for(StatementKind::IncomeStatement).complete_record(&mut row);

        assert_eq!(row.get("EBIT"), Some(&json!("75")));
        assert!((row.get("UTILIDAD_VENTAS").and_then(numeric_value).unwrap() - 60.0).abs() < 0.01);
    }

    #[test]
    fn test_balance_sheet_totals() {
        let mut row = record(json!({
            "DISPONIBLE": 100,
            "EXIGIBLE": 50,
            "ACTIVO_FIJO_TANGIBLE": 200,
            "PASIVO_CORRIENTE": 80,
            "OBLIGACIONES_BANCARIAS": 70,
            "PATRIMONIO": 200
        }));
        catalog_for(StatementKind::BalanceSheet).complete_record(&mut row);

        let get = |f: &str| row.get(f).and_then(numeric_value).unwrap();
        assert!((get("TOTAL_ACTIVO") - 350.0).abs() < 0.01);
        assert!((get("TOTAL_PASIVO") - 150.0).abs() < 0.01);
        assert!((get("TOTAL_PASIVO_PATRIMONIO") - 350.0).abs() < 0.01);
    }

    #[test]
    fn test_cash_flow_closing_balance() {
        let mut row = record(json!({
            "SALDO_ANTERIOR": 500,
            "TRANSFERENCIA_FONDOS": 300,
            "PRESTAMOS_BANCARIOS": 100,
            "IUE": 25
        }));
        catalog_for(StatementKind::CorporateFlow).complete_record(&mut row);

        let get = |f: &str| row.get(f).and_then(numeric_value).unwrap();
        assert!((get("TOTAL_INGRESOS") - 300.0).abs() < 0.01);
        assert!((get("TOTAL_EGRESOS") - 125.0).abs() < 0.01);
        assert!((get("SALDO_ACTUAL") - 675.0).abs() < 0.01);
    }

    #[test]
    fn test_normalize_policies() {
        let mut raw = ConsolidatedTotals::new();
        raw.insert("VENTAS_NETAS".to_string(), 10.0);
        raw.insert("CAMPO_NUEVO".to_string(), 3.0);

        let income = catalog_for(StatementKind::IncomeStatement).normalize(&raw);
        assert!(!income.contains_key("CAMPO_NUEVO"));
        assert_eq!(income.get("COSTO_VENTAS"), Some(&0.0));
        assert_eq!(income.get("UTILIDAD_NETA"), Some(&0.0));

        let operating = catalog_for(StatementKind::OperatingFlow).normalize(&raw);
        assert_eq!(operating.get("CAMPO_NUEVO"), Some(&3.0));
        assert_eq!(operating.get("SALDO_ACTUAL"), Some(&0.0));
    }

    #[test]
    fn test_chart_of_accounts_lists_formulas() {
        let chart = ChartOfAccounts::standard();
        let ebit = chart
            .income_statement
            .iter()
            .find(|e| e.name == "EBIT")
            .unwrap();
        assert_eq!(ebit.formula.as_deref(), Some("UTILIDAD_VENTAS - GASTO_OPERATIVO"));
        assert_eq!(chart.balance_sheet[0].behavior, AccountBehavior::Stock);

        let json = chart.to_json().unwrap();
        assert!(json.contains("TOTAL_PASIVO_PATRIMONIO"));
    }
}
