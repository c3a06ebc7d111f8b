//! Stock and sales reports, and the CSV export of deal lines.

use std::collections::BTreeMap;
use std::io;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use depot_core::Money;
use depot_inventory::ItemId;

use crate::deal_ledger::{DealLedger, DealLedgerError};
use crate::event_store::EventStore;
use crate::stock_ledger::{ItemSnapshot, LedgerError, StockLedger};

/// Column delimiter of the sales export.
pub const CSV_DELIMITER: u8 = b';';

const CSV_HEADER: [&str; 11] = [
    "date",
    "doc_number",
    "counterparty",
    "line",
    "item",
    "code",
    "quantity",
    "price",
    "amount",
    "cost",
    "profit",
];

#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Deals(#[from] DealLedgerError),

    #[error("invalid period: {0}")]
    InvalidPeriod(String),

    #[error("csv export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("csv export failed: {0}")]
    Io(#[from] io::Error),
}

/// Reporting period. Calendar periods are taken in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Period {
    Today,
    /// Monday through Sunday.
    ThisWeek,
    ThisMonth,
    Day { date: NaiveDate },
    /// Both dates inclusive.
    Range { from: NaiveDate, to: NaiveDate },
}

impl Period {
    /// Half-open `[start, end)` instant bounds of the period as seen at `now`.
    pub fn bounds(&self, now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>), ReportError> {
        let today = now.date_naive();
        let (first, last) = match *self {
            Period::Today => (today, today),
            Period::ThisWeek => {
                let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
                (monday, monday + Duration::days(6))
            }
            Period::ThisMonth => {
                let first = today.with_day(1).ok_or_else(|| invalid("no first day of month"))?;
                let next = if first.month() == 12 {
                    NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
                } else {
                    NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
                }
                .ok_or_else(|| invalid("month out of range"))?;
                (first, next - Duration::days(1))
            }
            Period::Day { date } => (date, date),
            Period::Range { from, to } => {
                if from > to {
                    return Err(invalid(format!("{from} is after {to}")));
                }
                (from, to)
            }
        };

        let end = last
            .succ_opt()
            .ok_or_else(|| invalid(format!("{last} has no following day")))?;
        Ok((midnight(first), midnight(end)))
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

fn invalid(message: impl Into<String>) -> ReportError {
    ReportError::InvalidPeriod(message.into())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockReport {
    pub items: Vec<ItemSnapshot>,
    pub total_on_hand: u64,
    pub total_reserved: u64,
    pub total_valuation: Money,
}

/// Per item on-hand, holds and cost basis, ordered by catalogue code.
pub fn stock_report<S: EventStore>(ledger: &StockLedger<S>) -> Result<StockReport, ReportError> {
    let items = ledger.list()?;
    Ok(StockReport {
        total_on_hand: items.iter().map(|i| i.on_hand).sum(),
        total_reserved: items.iter().map(|i| i.reserved).sum(),
        total_valuation: items.iter().map(|i| i.valuation).sum(),
        items,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemSales {
    pub item_id: ItemId,
    pub code: u32,
    pub name: String,
    pub quantity: u64,
    pub revenue: Money,
    pub cost: Money,
    pub profit: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SalesReport {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub deal_count: usize,
    pub revenue: Money,
    pub cost: Money,
    pub profit: Money,
    pub by_item: Vec<ItemSales>,
}

pub fn sales_report<D>(deals: &D, period: Period, now: DateTime<Utc>) -> Result<SalesReport, ReportError>
where
    D: DealLedger + ?Sized,
{
    let (from, to) = period.bounds(now)?;
    let deals = deals.between(from, to)?;

    let mut by_item: BTreeMap<(u32, ItemId), ItemSales> = BTreeMap::new();
    for line in deals.iter().flat_map(|d| d.lines()) {
        let entry = by_item
            .entry((line.item_code, line.item_id))
            .or_insert_with(|| ItemSales {
                item_id: line.item_id,
                code: line.item_code,
                name: line.item_name.clone(),
                quantity: 0,
                revenue: Money::ZERO,
                cost: Money::ZERO,
                profit: Money::ZERO,
            });
        entry.quantity += line.quantity;
        entry.revenue = entry.revenue + line.revenue();
        entry.cost = entry.cost + line.cost();
        entry.profit = entry.profit + line.profit;
    }

    Ok(SalesReport {
        from,
        to,
        deal_count: deals.len(),
        revenue: deals.iter().map(|d| d.total_revenue()).sum(),
        cost: deals.iter().map(|d| d.total_cost()).sum(),
        profit: deals.iter().map(|d| d.total_profit()).sum(),
        by_item: by_item.into_values().collect(),
    })
}

/// Write every deal line of the period as `;`-separated CSV; returns the number of
/// data rows written.
pub fn write_sales_csv<D, W>(
    deals: &D,
    period: Period,
    now: DateTime<Utc>,
    out: W,
) -> Result<usize, ReportError>
where
    D: DealLedger + ?Sized,
    W: io::Write,
{
    let (from, to) = period.bounds(now)?;
    let deals = deals.between(from, to)?;

    let mut writer = csv::WriterBuilder::new()
        .delimiter(CSV_DELIMITER)
        .from_writer(out);
    writer.write_record(CSV_HEADER)?;

    let mut rows = 0;
    for deal in &deals {
        let date = deal.created_at().format("%d.%m.%Y").to_string();
        for line in deal.lines() {
            writer.write_record([
                date.clone(),
                deal.doc_number().to_string(),
                deal.counterparty_name().to_string(),
                line.line_no.to_string(),
                line.item_name.clone(),
                line.item_code.to_string(),
                line.quantity.to_string(),
                line.unit_price.to_string(),
                line.revenue().to_string(),
                line.cost().to_string(),
                line.profit.to_string(),
            ])?;
            rows += 1;
        }
    }
    writer.flush()?;

    tracing::debug!(%from, %to, deals = deals.len(), rows, "sales csv written");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use depot_core::{AggregateId, OperatorId};
    use depot_inventory::{CostPolicy, ItemDetails};
    use depot_parties::CounterpartyId;
    use depot_shipping::{DealLine, DraftId, PendingDeal};

    use crate::deal_ledger::InMemoryDealLedger;
    use crate::event_store::InMemoryEventStore;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(ledger: &InMemoryDealLedger, at: DateTime<Utc>, lines: &[(ItemId, u32, u64, i64, i64)]) {
        let mut deal = PendingDeal::new(
            DraftId::new(AggregateId::new()),
            CounterpartyId::new(AggregateId::new()),
            "Arif",
            OperatorId::new("op").unwrap(),
            at,
        );
        for (i, (item, code, qty, price, cost)) in lines.iter().enumerate() {
            deal.lines.push(
                DealLine::new(
                    i as u32 + 1,
                    *item,
                    *code,
                    format!("item {code}"),
                    *qty,
                    Money::from_minor(*price),
                    Money::from_minor(*cost),
                )
                .unwrap(),
            );
        }
        ledger.append(deal).unwrap();
    }

    #[test]
    fn calendar_periods_are_half_open_days() {
        // Wednesday
        let now = at(2024, 12, 18, 15);

        assert_eq!(
            Period::Today.bounds(now).unwrap(),
            (at(2024, 12, 18, 0), at(2024, 12, 19, 0))
        );
        assert_eq!(
            Period::ThisWeek.bounds(now).unwrap(),
            (at(2024, 12, 16, 0), at(2024, 12, 23, 0))
        );
        assert_eq!(
            Period::ThisMonth.bounds(now).unwrap(),
            (at(2024, 12, 1, 0), at(2025, 1, 1, 0))
        );
    }

    #[test]
    fn custom_range_includes_its_last_day() {
        let period = Period::Range {
            from: date(2024, 2, 27),
            to: date(2024, 2, 29),
        };
        assert_eq!(
            period.bounds(Utc::now()).unwrap(),
            (at(2024, 2, 27, 0), at(2024, 3, 1, 0))
        );

        let reversed = Period::Range {
            from: date(2024, 3, 2),
            to: date(2024, 3, 1),
        };
        assert!(matches!(reversed.bounds(Utc::now()), Err(ReportError::InvalidPeriod(_))));
    }

    #[test]
    fn period_deserializes_from_tagged_json() {
        let period: Period =
            serde_json::from_str(r#"{"kind":"range","from":"2024-01-01","to":"2024-01-31"}"#).unwrap();
        assert_eq!(
            period,
            Period::Range {
                from: date(2024, 1, 1),
                to: date(2024, 1, 31)
            }
        );
        let today: Period = serde_json::from_str(r#"{"kind":"today"}"#).unwrap();
        assert_eq!(today, Period::Today);
    }

    #[test]
    fn sales_report_totals_and_groups_by_item() {
        let ledger = InMemoryDealLedger::new();
        let (salmon, trout) = (ItemId::new(AggregateId::new()), ItemId::new(AggregateId::new()));
        record(&ledger, at(2024, 5, 6, 9), &[(salmon, 23, 3, 1000, 700), (trout, 40, 2, 500, 450)]);
        record(&ledger, at(2024, 5, 6, 17), &[(salmon, 23, 1, 1100, 700)]);
        record(&ledger, at(2024, 5, 7, 9), &[(salmon, 23, 9, 1, 1)]);

        let report = sales_report(&ledger, Period::Day { date: date(2024, 5, 6) }, Utc::now()).unwrap();

        assert_eq!(report.deal_count, 2);
        assert_eq!(report.revenue, Money::from_minor(3000 + 1000 + 1100));
        assert_eq!(report.cost, Money::from_minor(2100 + 900 + 700));
        assert_eq!(report.profit, Money::from_minor(900 + 100 + 400));
        assert_eq!(report.by_item.len(), 2);
        assert_eq!(report.by_item[0].code, 23);
        assert_eq!(report.by_item[0].quantity, 4);
        assert_eq!(report.by_item[0].profit, Money::from_minor(1300));
    }

    #[test]
    fn csv_export_uses_semicolons_and_one_row_per_line() {
        let ledger = InMemoryDealLedger::new();
        let item = ItemId::new(AggregateId::new());
        record(&ledger, at(2024, 5, 6, 9), &[(item, 23, 2, 131150, 130000)]);

        let mut out = Vec::new();
        let rows = write_sales_csv(&ledger, Period::Day { date: date(2024, 5, 6) }, Utc::now(), &mut out)
            .unwrap();

        assert_eq!(rows, 1);
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "date;doc_number;counterparty;line;item;code;quantity;price;amount;cost;profit");
        assert_eq!(lines[1], "06.05.2024;1;Arif;1;item 23;23;2;1311.50;2623.00;2600.00;23.00");
    }

    #[test]
    fn stock_report_sums_valuation() {
        let ledger = StockLedger::new(Arc::new(InMemoryEventStore::new()), CostPolicy::Fifo);
        for (code, qty, cost) in [(23, 2, 130000), (40, 3, 96018)] {
            let item = ledger
                .create_item(
                    ItemDetails {
                        code,
                        name: format!("item {code}"),
                        retail_price: Money::ZERO,
                    },
                    Utc::now(),
                )
                .unwrap();
            ledger.restock(item, qty, Money::from_minor(cost), Utc::now()).unwrap();
        }

        let report = stock_report(&ledger).unwrap();

        assert_eq!(report.items.len(), 2);
        assert_eq!(report.total_on_hand, 5);
        assert_eq!(report.total_reserved, 0);
        assert_eq!(report.total_valuation, Money::from_minor(2 * 130000 + 3 * 96018));
    }
}
