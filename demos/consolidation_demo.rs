use financial_consolidation::*;
use serde_json::json;
use std::sync::Arc;

fn record(value: serde_json::Value) -> RawStatementRecord {
    value.as_object().cloned().unwrap_or_default()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("📊 Group Consolidation Demo\n");
    println!("Two companies, one fiscal year, reported quarterly.");
    println!("Flows are summed per quarter; the balance sheet is the quarter's last month.\n");

    let mut store = InMemoryStore::new();
    for (year, month) in (4..=12).map(|m| (2023, m)).chain((1..=3).map(|m| (2024, m))) {
        let period = ElementaryPeriod { year, month };
        let step = month as f64;

        store.insert(
            1,
            "Comercial Andina",
            StatementKind::IncomeStatement,
            period,
            record(json!({
                "VENTAS_NETAS": 120_000.0 + 5_000.0 * step,
                "COSTO_VENTAS": 70_000,
                "GASTO_ADMINISTRATIVO": 18_000,
            })),
        );
        store.insert(
            2,
            "Logistica del Valle",
            StatementKind::IncomeStatement,
            period,
            record(json!({ "VENTAS_NETAS": 45_000, "COSTO_VENTAS": 21_000 })),
        );
        store.insert(
            1,
            "Comercial Andina",
            StatementKind::BalanceSheet,
            period,
            record(json!({
                "DISPONIBLE": 80_000.0 + 2_500.0 * step,
                "EXIGIBLE": 40_000,
                "PASIVO_CORRIENTE": 35_000,
                "PATRIMONIO": 85_000,
            })),
        );
        store.insert(
            2,
            "Logistica del Valle",
            StatementKind::OperatingFlow,
            period,
            record(json!({ "VENTAS": 44_000, "CUENTAS_POR_PAGAR": 20_500 })),
        );
    }

    let processor = ConsolidationProcessor::new(Arc::new(store), ConsolidationConfig::default())?;

    let request = ConsolidationRequest::from_json(
        r#"{"empresas": [1, "2"], "desde": "2023-04", "hasta": "2024-03", "tipo": "trimestral"}"#,
    )?;
    let response = processor.handle_request(&request).await;

    let Some(data) = response.data.as_ref() else {
        println!("❌ Consolidation failed: {:?}", response.message);
        return Ok(());
    };

    println!("{:<10} {:>14} {:>14} {:>14}", "Period", "Net sales", "Cash", "Total assets");
    for period in &data.income_statement_series.periods {
        println!(
            "{:<10} {:>14.2} {:>14.2} {:>14.2}",
            period,
            data.income_statement_series
                .value_at("VENTAS_NETAS", period)
                .unwrap_or_default(),
            data.balance_sheet_series
                .value_at("DISPONIBLE", period)
                .unwrap_or_default(),
            data.balance_sheet_series
                .value_at("TOTAL_ACTIVO", period)
                .unwrap_or_default(),
        );
    }

    println!(
        "\nNet sales for the range: {:.2}",
        data.income_statement.get("VENTAS_NETAS").copied().unwrap_or_default()
    );
    if let Some(meta) = &response.meta {
        println!(
            "Companies: {}, periods: {}, cut-off: {:?}",
            meta.empresas_count, meta.periodos_count, meta.fecha_corte
        );
    }

    std::fs::write("consolidation_output.json", serde_json::to_string_pretty(&response)?)?;
    println!("\n✓ Full response written to consolidation_output.json");

    Ok(())
}
