use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use revpulse_core::domain::numeric::parse_decimal;
use revpulse_core::domain::period::{FiscalQuarter, ReportPeriod};
use revpulse_core::domain::renewal::{
    ContractRecord, CurrencyTable, RenewalOpportunity, RenewalTarget,
};
use revpulse_core::domain::segment::{ActionItem, AttainmentRow, SourceAttainmentRow};

use super::memory::{open_contracts, quarter_opportunities};
use super::{CrmSource, SourceError, WarehouseSource};

const SNAPSHOT: &str = "snapshot";

/// Warehouse rows captured for one report period.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodSnapshot {
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default)]
    pub attainment: Vec<AttainmentRow>,
    #[serde(default)]
    pub sources: Vec<SourceAttainmentRow>,
}

/// An offline export of everything one dashboard run reads.
///
/// `contracts` and `renewalOpportunities` are optional: leaving either out
/// replays a run where that CRM query failed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
    #[serde(default)]
    pub periods: Vec<PeriodSnapshot>,
    #[serde(default)]
    pub action_items: Vec<ActionItem>,
    #[serde(default)]
    pub renewal_targets: Vec<RenewalTarget>,
    #[serde(default)]
    pub currency_rates: CurrencyTable,
    #[serde(default)]
    pub contracts: Option<Vec<ContractRecord>>,
    #[serde(default)]
    pub renewal_opportunities: Option<Vec<RenewalOpportunity>>,
    /// Rows dropped while decoding, one message each.
    #[serde(skip)]
    pub rejected_rows: Vec<String>,
}

impl Snapshot {
    /// Decodes an export row by row. The document shape must be valid, but a
    /// row that fails to decode (an unknown region, say) is dropped and noted
    /// in `rejected_rows` instead of failing the load.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let raw: RawSnapshot = serde_json::from_str(raw)?;
        let mut rejected = Vec::new();

        let periods = raw
            .periods
            .into_iter()
            .map(|period| {
                let label = format!("periods[{}..{}]", period.start, period.end);
                PeriodSnapshot {
                    start: period.start,
                    end: period.end,
                    attainment: decode_rows(
                        &format!("{label}.attainment"),
                        period.attainment,
                        &mut rejected,
                    ),
                    sources: decode_rows(&format!("{label}.sources"), period.sources, &mut rejected),
                }
            })
            .collect();
        let action_items = decode_rows("actionItems", raw.action_items, &mut rejected);
        let renewal_targets = decode_rows("renewalTargets", raw.renewal_targets, &mut rejected);
        let currency_rates = decode_rates(raw.currency_rates, &mut rejected);
        let contracts = raw.contracts.map(|rows| decode_rows("contracts", rows, &mut rejected));
        let renewal_opportunities = raw
            .renewal_opportunities
            .map(|rows| decode_rows("renewalOpportunities", rows, &mut rejected));

        Ok(Self {
            as_of: raw.as_of,
            periods,
            action_items,
            renewal_targets,
            currency_rates,
            contracts,
            renewal_opportunities,
            rejected_rows: rejected,
        })
    }

    pub fn period(&self, period: &ReportPeriod) -> Option<&PeriodSnapshot> {
        self.periods.iter().find(|entry| entry.start == period.start && entry.end == period.end)
    }

    /// The most recent captured period, used when no dates are requested.
    pub fn latest_period(&self) -> Option<ReportPeriod> {
        self.periods
            .iter()
            .max_by_key(|entry| entry.end)
            .map(|entry| ReportPeriod::new(entry.start, entry.end))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPeriod {
    start: NaiveDate,
    end: NaiveDate,
    #[serde(default)]
    attainment: Vec<Value>,
    #[serde(default)]
    sources: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSnapshot {
    #[serde(default)]
    as_of: Option<NaiveDate>,
    #[serde(default)]
    periods: Vec<RawPeriod>,
    #[serde(default)]
    action_items: Vec<Value>,
    #[serde(default)]
    renewal_targets: Vec<Value>,
    #[serde(default)]
    currency_rates: BTreeMap<String, Value>,
    #[serde(default)]
    contracts: Option<Vec<Value>>,
    #[serde(default)]
    renewal_opportunities: Option<Vec<Value>>,
}

fn decode_rows<T: DeserializeOwned>(
    section: &str,
    rows: Vec<Value>,
    rejected: &mut Vec<String>,
) -> Vec<T> {
    rows.into_iter()
        .enumerate()
        .filter_map(|(index, row)| match serde_json::from_value(row) {
            Ok(decoded) => Some(decoded),
            Err(error) => {
                rejected.push(format!("{section}[{index}] dropped: {error}"));
                None
            }
        })
        .collect()
}

fn decode_rates(rates: BTreeMap<String, Value>, rejected: &mut Vec<String>) -> CurrencyTable {
    CurrencyTable::new(rates.into_iter().filter_map(|(code, rate)| match parse_decimal(&rate) {
        Some(rate) => Some((code, rate)),
        None => {
            rejected.push(format!("currencyRates.{code} dropped: not a number"));
            None
        }
    }))
}

/// Serves both warehouse and CRM queries from a snapshot file.
#[derive(Clone, Debug)]
pub struct JsonSnapshotSource {
    path: PathBuf,
    snapshot: Snapshot,
}

impl JsonSnapshotSource {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let raw = tokio::fs::read_to_string(&path).await?;
        let snapshot = Snapshot::from_json(&raw)
            .map_err(|error| SourceError::Decode(format!("{}: {error}", path.display())))?;
        for rejection in &snapshot.rejected_rows {
            tracing::warn!(
                event_name = "source.snapshot.row_rejected",
                snapshot = %path.display(),
                rejection = %rejection,
                "snapshot row dropped"
            );
        }
        Ok(Self { path, snapshot })
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self { path: PathBuf::from("<memory>"), snapshot }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    fn period_rows(&self, period: &ReportPeriod) -> Result<&PeriodSnapshot, SourceError> {
        self.snapshot.period(period).ok_or_else(|| SourceError::NotFound {
            source_name: SNAPSHOT,
            what: format!("period {} to {}", period.start, period.end),
        })
    }
}

#[async_trait::async_trait]
impl WarehouseSource for JsonSnapshotSource {
    fn ingest_warnings(&self) -> Vec<String> {
        self.snapshot.rejected_rows.clone()
    }

    async fn attainment_rows(
        &self,
        period: &ReportPeriod,
    ) -> Result<Vec<AttainmentRow>, SourceError> {
        Ok(self.period_rows(period)?.attainment.clone())
    }

    async fn source_attainment_rows(
        &self,
        period: &ReportPeriod,
    ) -> Result<Vec<SourceAttainmentRow>, SourceError> {
        Ok(self.period_rows(period)?.sources.clone())
    }

    async fn action_items(&self) -> Result<Vec<ActionItem>, SourceError> {
        Ok(self.snapshot.action_items.clone())
    }

    async fn renewal_targets(&self) -> Result<Vec<RenewalTarget>, SourceError> {
        Ok(self.snapshot.renewal_targets.clone())
    }

    async fn currency_rates(&self) -> Result<CurrencyTable, SourceError> {
        Ok(self.snapshot.currency_rates.clone())
    }
}

#[async_trait::async_trait]
impl CrmSource for JsonSnapshotSource {
    fn ingest_warnings(&self) -> Vec<String> {
        self.snapshot.rejected_rows.clone()
    }

    async fn renewal_contracts(&self, as_of: NaiveDate) -> Result<Vec<ContractRecord>, SourceError> {
        match &self.snapshot.contracts {
            Some(contracts) => Ok(open_contracts(contracts, as_of)),
            None => Err(SourceError::Unavailable {
                source_name: SNAPSHOT,
                message: "snapshot has no contract export".to_string(),
            }),
        }
    }

    async fn renewal_opportunities(
        &self,
        quarter: &FiscalQuarter,
    ) -> Result<Vec<RenewalOpportunity>, SourceError> {
        match &self.snapshot.renewal_opportunities {
            Some(opportunities) => Ok(quarter_opportunities(opportunities, quarter)),
            None => Err(SourceError::Unavailable {
                source_name: SNAPSHOT,
                message: "snapshot has no renewal opportunity export".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    use revpulse_core::domain::dimension::{Category, Product, Region};
    use revpulse_core::domain::period::ReportPeriod;

    use crate::sources::{CrmSource, JsonSnapshotSource, SourceError, WarehouseSource};

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    #[tokio::test]
    async fn load_tolerates_malformed_numbers() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("snapshot.json");
        fs::write(
            &path,
            r#"{
  "asOf": "2026-02-14",
  "periods": [{
    "start": "2026-01-01",
    "end": "2026-02-14",
    "attainment": [{
      "product": "POR", "region": "AMER", "category": "NEW LOGO",
      "targetAmount": "100000", "qtdTargetAmount": null, "actualAmount": 95000.0,
      "pipelineAmount": "n/a", "lostDealCount": -2, "winRatePercent": 41.5
    }]
  }],
  "currencyRates": { "GBP": 0.79 }
}"#,
        )
        .expect("write snapshot");

        let source = JsonSnapshotSource::load(&path).await.expect("snapshot loads");
        let period = ReportPeriod::new(date(2026, 1, 1), date(2026, 2, 14));
        let rows = source.attainment_rows(&period).await.expect("rows present");

        assert_eq!(rows.len(), 1);
        let measures = &rows[0].measures;
        assert_eq!(measures.target_amount, Decimal::from(100_000));
        assert_eq!(measures.qtd_target_amount, Decimal::ZERO);
        assert_eq!(measures.pipeline_amount, Decimal::ZERO);
        assert_eq!(measures.lost_deal_count, 0);
        assert_eq!(measures.win_rate_percent, Some(Decimal::new(415, 1)));
        assert_eq!(rows[0].product, Product::Por);
        assert_eq!(rows[0].region, Region::Amer);
        assert_eq!(source.snapshot().latest_period(), Some(period));
    }

    #[tokio::test]
    async fn missing_exports_surface_as_unavailable() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("snapshot.json");
        fs::write(&path, "{}").expect("write snapshot");

        let source = JsonSnapshotSource::load(&path).await.expect("snapshot loads");
        let contracts = source.renewal_contracts(date(2026, 2, 14)).await;

        assert!(matches!(contracts, Err(SourceError::Unavailable { .. })));
        assert!(source.renewal_targets().await.expect("targets").is_empty());
    }

    #[tokio::test]
    async fn crm_spellings_decode_and_unknown_rows_are_dropped() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("snapshot.json");
        fs::write(
            &path,
            r#"{
  "periods": [{
    "start": "2026-01-01",
    "end": "2026-02-14",
    "attainment": [
      { "product": "POR", "region": "AMER", "category": "NEW_LOGO", "actualAmount": 10 },
      { "product": "POR", "region": "AMER", "category": "STRATEGIC", "actualAmount": 20 },
      { "product": "POR", "region": "AMER", "category": "BILLBOARDS", "actualAmount": 30 }
    ]
  }],
  "currencyRates": { "EUR": 1.2, "GBP": "n/a" },
  "contracts": [{
    "contractId": "C-1", "accountId": "A-1", "endDate": "2026-03-01",
    "currentAcv": 1000, "currencyCode": "USD", "product": "POR", "region": "US"
  }]
}"#,
        )
        .expect("write snapshot");

        let source = JsonSnapshotSource::load(&path).await.expect("snapshot still loads");
        let period = ReportPeriod::new(date(2026, 1, 1), date(2026, 2, 14));

        let rows = source.attainment_rows(&period).await.expect("rows present");
        let categories: Vec<Category> = rows.iter().map(|row| row.category).collect();
        assert_eq!(categories, vec![Category::NewLogo, Category::Strategic]);

        let contracts = source.renewal_contracts(date(2026, 2, 14)).await.expect("contracts");
        assert_eq!(contracts.len(), 1);
        assert_eq!(contracts[0].region, Region::Amer);

        let rejected = WarehouseSource::ingest_warnings(&source);
        assert_eq!(rejected.len(), 2);
        assert!(rejected[0].contains("attainment[2]"));
        assert!(rejected[0].contains("BILLBOARDS"));
        assert!(rejected[1].starts_with("currencyRates.GBP"));
        assert_eq!(source.currency_rates().await.expect("rates").rate_for("GBP"), Decimal::ONE);
    }

    #[tokio::test]
    async fn unreadable_snapshot_is_a_decode_error() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("snapshot.json");
        fs::write(&path, "{ not json").expect("write snapshot");

        let error = JsonSnapshotSource::load(&path).await.err();
        assert!(matches!(error, Some(SourceError::Decode(_))));
    }
}
