use crate::chart_of_accounts::catalog_for;
use crate::config::ConsolidationConfig;
use crate::context::{FetchedRows, RequestContext};
use crate::error::{ConsolidationError, Result};
use crate::ingestion::StatementStore;
use crate::period::{ElementaryPeriod, GroupKey, PeriodRange};
use crate::schema::{AccountBehavior, CompanyId, ConsolidatedTotals, Granularity, StatementKind};
use crate::series::SeriesPayload;
use crate::summation::{accumulate, sum_rows, RawStatementRecord};
use futures::future::try_join_all;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Months sharing one group key, in calendar order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthGroup {
    pub key: GroupKey,
    pub months: Vec<ElementaryPeriod>,
}

impl MonthGroup {
    /// The month whose balance sheet stands for the whole group.
    pub fn closing_month(&self) -> Option<ElementaryPeriod> {
        self.months.last().copied()
    }
}

/// Partitions contiguous months into ordered groups using `key_of`.
pub fn group_months<F>(months: &[ElementaryPeriod], key_of: F) -> Vec<MonthGroup>
where
    F: Fn(ElementaryPeriod) -> GroupKey,
{
    let mut groups: Vec<MonthGroup> = Vec::new();

    for &month in months {
        let key = key_of(month);
        match groups.iter_mut().find(|g| g.key == key) {
            Some(group) => group.months.push(month),
            None => groups.push(MonthGroup {
                key,
                months: vec![month],
            }),
        }
    }

    groups
}

/// Output of one grouped consolidation: four index-aligned series plus range-wide figures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupedSeries {
    pub income_statement: SeriesPayload,
    pub balance_sheet: SeriesPayload,
    pub operating_flow: SeriesPayload,
    pub corporate_flow: SeriesPayload,
    /// Balance sheet at the last month of the whole range.
    pub closing_balance_sheet: ConsolidatedTotals,
    /// Flow statements summed over every month and company of the range.
    pub range_totals: BTreeMap<StatementKind, ConsolidatedTotals>,
}

impl GroupedSeries {
    fn series_mut(&mut self, kind: StatementKind) -> &mut SeriesPayload {
        match kind {
            StatementKind::IncomeStatement => &mut self.income_statement,
            StatementKind::BalanceSheet => &mut self.balance_sheet,
            StatementKind::OperatingFlow => &mut self.operating_flow,
            StatementKind::CorporateFlow => &mut self.corporate_flow,
        }
    }

    pub fn period_count(&self) -> usize {
        self.income_statement.len()
    }
}

/// Per-group accumulator: flows add up month by month, the stock keeps the closing month.
struct GroupAccumulator {
    flows: BTreeMap<StatementKind, ConsolidatedTotals>,
    stock: ConsolidatedTotals,
}

impl GroupAccumulator {
    fn new() -> Self {
        Self {
            flows: BTreeMap::new(),
            stock: ConsolidatedTotals::new(),
        }
    }

    fn add(&mut self, kind: StatementKind, month_totals: ConsolidatedTotals) {
        match kind.behavior() {
            AccountBehavior::Flow => {
                accumulate(self.flows.entry(kind).or_default(), &month_totals);
            }
            AccountBehavior::Stock => self.stock = month_totals,
        }
    }

    fn totals_for(&self, kind: StatementKind) -> ConsolidatedTotals {
        match kind.behavior() {
            AccountBehavior::Flow => self.flows.get(&kind).cloned().unwrap_or_default(),
            AccountBehavior::Stock => self.stock.clone(),
        }
    }
}

/// Company-summed totals for one statement and one month, with derived fields filled per row.
pub fn month_totals(kind: StatementKind, rows: &[RawStatementRecord]) -> ConsolidatedTotals {
    let catalog = catalog_for(kind);
    let completed: Vec<_> = rows
        .iter()
        .map(|row| {
            let mut row = row.clone();
            catalog.complete_record(&mut row);
            row
        })
        .collect();
    sum_rows(&completed)
}

/// Drives fetch, summation and grouping against a statement store.
pub struct Consolidator {
    store: Arc<dyn StatementStore>,
    config: ConsolidationConfig,
    permits: Arc<Semaphore>,
}

impl Consolidator {
    pub fn new(store: Arc<dyn StatementStore>, config: ConsolidationConfig) -> Result<Self> {
        config.validate()?;
        let permits = Arc::new(Semaphore::new(config.max_concurrent_fetches));
        Ok(Self {
            store,
            config,
            permits,
        })
    }

    pub fn config(&self) -> &ConsolidationConfig {
        &self.config
    }

    pub async fn consolidate(
        &self,
        ctx: &mut RequestContext,
        company_ids: &[CompanyId],
        range: &PeriodRange,
        granularity: Granularity,
    ) -> Result<GroupedSeries> {
        let groups = group_months(range.months(), |m| GroupKey::for_period(granularity, m));
        info!(
            "Consolidating {} companies over {} months into {} {} groups",
            company_ids.len(),
            range.len(),
            groups.len(),
            granularity
        );

        let mut result = GroupedSeries::default();

        for group in &groups {
            let closing = group.closing_month();
            let mut acc = GroupAccumulator::new();

            for &month in &group.months {
                if ctx.is_cancelled() {
                    return Err(ConsolidationError::Cancelled);
                }

                let kinds: Vec<StatementKind> = StatementKind::ALL
                    .into_iter()
                    .filter(|k| k.behavior() == AccountBehavior::Flow || Some(month) == closing)
                    .collect();

                let fetched = self.fetch_month(ctx, company_ids, month, &kinds).await?;

                for (kind, rows) in fetched {
                    debug!("{} {}: {} records", month, kind, rows.len());
                    let totals = month_totals(kind, &rows);
                    if kind.behavior() == AccountBehavior::Flow {
                        accumulate(result.range_totals.entry(kind).or_default(), &totals);
                    }
                    acc.add(kind, totals);
                }
            }

            let label = group.key.to_string();
            for kind in StatementKind::ALL {
                let normalized = catalog_for(kind).normalize(&acc.totals_for(kind));
                result.series_mut(kind).push_group(label.clone(), &normalized);
            }
        }

        let closing_rows = self
            .fetch_month(ctx, company_ids, range.end(), &[StatementKind::BalanceSheet])
            .await?;
        let closing_raw = closing_rows
            .first()
            .map(|(kind, rows)| month_totals(*kind, rows))
            .unwrap_or_default();
        result.closing_balance_sheet = catalog_for(StatementKind::BalanceSheet).normalize(&closing_raw);

        for (kind, totals) in result.range_totals.iter_mut() {
            *totals = catalog_for(*kind).normalize(totals);
        }

        info!("Consolidation produced {} periods", result.period_count());
        Ok(result)
    }

    /// Fetches the requested statements for one month, concurrently, reusing cached rows.
    async fn fetch_month(
        &self,
        ctx: &mut RequestContext,
        company_ids: &[CompanyId],
        month: ElementaryPeriod,
        kinds: &[StatementKind],
    ) -> Result<Vec<(StatementKind, FetchedRows)>> {
        let mut ready = Vec::with_capacity(kinds.len());
        let mut missing = Vec::new();

        for &kind in kinds {
            match ctx.cached(kind, month) {
                Some(rows) => ready.push((kind, rows)),
                None => missing.push(kind),
            }
        }

        let fetched = {
            let ctx: &RequestContext = ctx;
            try_join_all(missing.iter().map(|&kind| async move {
                let rows = self.fetch_one(ctx, kind, company_ids, month).await?;
                Ok::<_, ConsolidationError>((kind, Arc::new(rows)))
            }))
            .await?
        };

        for (kind, rows) in fetched {
            ctx.remember(kind, month, Arc::clone(&rows));
            ready.push((kind, rows));
        }

        ready.sort_by_key(|(kind, _)| *kind);
        Ok(ready)
    }

    async fn fetch_one(
        &self,
        ctx: &RequestContext,
        kind: StatementKind,
        company_ids: &[CompanyId],
        month: ElementaryPeriod,
    ) -> Result<Vec<RawStatementRecord>> {
        let deadline_error = || ConsolidationError::Timeout {
            statement: kind.to_string(),
            period: month.to_string(),
            after_ms: ctx
                .deadline_budget()
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default(),
        };

        let _permit = tokio::select! {
            permit = self.permits.acquire() => permit.map_err(|_| ConsolidationError::Cancelled)?,
            _ = ctx.cancelled() => return Err(ConsolidationError::Cancelled),
            _ = ctx.deadline_reached() => return Err(deadline_error()),
        };

        let call = self.store.get_for_consolidation(kind, company_ids, month);
        let fetch = async {
            let response = match self.config.fetch_timeout() {
                Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                    ConsolidationError::Timeout {
                        statement: kind.to_string(),
                        period: month.to_string(),
                        after_ms: self.config.fetch_timeout_ms,
                    }
                })?,
                None => call.await,
            };
            response.map_err(|e| ConsolidationError::StoreFailure {
                statement: kind.to_string(),
                period: month.to_string(),
                details: e.to_string(),
            })
        };

        let outcome = tokio::select! {
            result = fetch => result,
            _ = ctx.cancelled() => Err(ConsolidationError::Cancelled),
            _ = ctx.deadline_reached() => Err(deadline_error()),
        };

        if let Err(e) = &outcome {
            warn!("Fetch of {} for {} failed: {}", kind, month, e);
        }
        outcome
    }
}
