//! Canonicalizing heterogeneous broker rows into legs and executions.

use crate::domain::{
    ComboLegDef, Decimal, ExecutionRecord, Leg, OpenClose, Right, SecType, Side, TimeMs,
    Underlying,
};
use crate::error::RowError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

const UNDERLYING: &[&str] = &["underlying", "symbol", "underlying_symbol", "root", "ticker"];
const SEC_TYPE: &[&str] = &["sec_type", "sectype", "asset_class", "assetcategory", "type"];
const EXPIRY: &[&str] = &[
    "expiry",
    "expiration",
    "expiration_date",
    "lasttradedateorcontractmonth",
    "exp",
];
const RIGHT: &[&str] = &["right", "put_call", "putcall", "option_type", "cp"];
const STRIKE: &[&str] = &["strike", "strike_price"];
const QTY: &[&str] = &["position", "qty", "quantity", "shares", "size"];
const SIDE: &[&str] = &["side", "action", "buy_sell"];
const MULTIPLIER: &[&str] = &["multiplier", "mult"];
const BROKER_ID: &[&str] = &["conid", "con_id", "contract_id", "broker_id"];
const AVG_COST: &[&str] = &["avg_cost", "avgcost", "average_cost", "cost_basis_price"];
const MARKET_PRICE: &[&str] = &["market_price", "marketprice", "mark_price", "mark"];
const UNREALIZED: &[&str] = &["unrealized_pnl", "unrealizedpnl", "upnl"];

const TIME: &[&str] = &["time_ms", "time", "timestamp", "datetime", "date_time", "exec_time"];
const PRICE: &[&str] = &["price", "fill_price", "trade_price", "avg_price"];
const COMMISSION: &[&str] = &["commission", "fees", "fee", "comm"];
const ORDER_ID: &[&str] = &["order_id", "orderid"];
const PERM_ID: &[&str] = &["perm_id", "permid"];
const EXEC_ID: &[&str] = &["exec_id", "execid", "execution_id", "trade_id"];
const ORDER_REF: &[&str] = &["order_ref", "orderref", "order_reference"];
const OPEN_CLOSE: &[&str] = &["open_close", "openclose", "position_effect"];
const COMBO_LEGS: &[&str] = &["combo_legs", "legs"];

/// A raw input row: field names lower-cased, values as received.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow(BTreeMap<String, String>);

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K: AsRef<str>, V: Into<String>>(
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        let mut row = Self::new();
        for (k, v) in pairs {
            row.insert(k, v);
        }
        row
    }

    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.0
            .insert(key.as_ref().trim().to_ascii_lowercase(), value.into());
    }

    /// First non-empty value among the aliases.
    pub fn get(&self, aliases: &[&str]) -> Option<&str> {
        aliases
            .iter()
            .filter_map(|k| self.0.get(*k))
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
    }

    /// Read every record of a headed CSV export.
    pub fn from_csv_reader<R: std::io::Read>(reader: R) -> Result<Vec<RawRow>, csv::Error> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = rdr.headers()?.clone();
        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            rows.push(RawRow::from_pairs(
                headers.iter().zip(record.iter()).map(|(k, v)| (k, v.to_string())),
            ));
        }
        Ok(rows)
    }
}

/// A row left out of processing, passed through unmodified with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    pub row: RawRow,
    pub error: RowError,
}

/// Result of normalizing a batch: accepted records plus the rows that were set aside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized<T> {
    pub records: Vec<T>,
    pub rejected: Vec<RejectedRow>,
}

impl<T> Default for Normalized<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            rejected: Vec::new(),
        }
    }
}

pub struct PositionNormalizer;

impl PositionNormalizer {
    /// Normalize position rows. Bad rows are rejected individually; never aborts.
    pub fn normalize_positions(rows: &[RawRow]) -> Normalized<Leg> {
        collect(rows, Self::leg_from_row)
    }

    /// Normalize execution rows. Bad rows are rejected individually; never aborts.
    pub fn normalize_executions(rows: &[RawRow]) -> Normalized<ExecutionRecord> {
        collect(rows, Self::execution_from_row)
    }

    pub fn leg_from_row(row: &RawRow) -> Result<Leg, RowError> {
        let underlying = parse_underlying(row)?;
        let expiry = parse_opt(row, EXPIRY, "expiry", parse_date)?;
        let right = parse_opt(row, RIGHT, "right", Right::parse)?;
        let strike = parse_opt(row, STRIKE, "strike", parse_decimal)?;
        let sec_type = infer_sec_type(row, expiry, right, strike);

        let raw_qty = row.get(QTY).ok_or(RowError::MissingField("qty"))?;
        let qty = parse_decimal(raw_qty).ok_or_else(|| RowError::invalid("qty", raw_qty))?;
        let qty = match parse_opt(row, SIDE, "side", Side::parse)? {
            Some(Side::Buy) => qty.abs(),
            Some(Side::Sell) => -qty.abs(),
            None => qty,
        };

        let multiplier = parse_opt(row, MULTIPLIER, "multiplier", parse_decimal)?
            .filter(|m| m.is_positive())
            .unwrap_or_else(|| Decimal::from_i64(sec_type.default_multiplier()));
        let broker_id = row.get(BROKER_ID).map(str::to_string);

        let mut leg = Leg::new(
            underlying, sec_type, expiry, right, strike, qty, multiplier, broker_id,
        )?;
        leg.avg_cost = parse_opt(row, AVG_COST, "avg_cost", parse_decimal)?;
        leg.market_price = parse_opt(row, MARKET_PRICE, "market_price", parse_decimal)?;
        leg.unrealized_pnl = parse_opt(row, UNREALIZED, "unrealized_pnl", parse_decimal)?;
        Ok(leg)
    }

    pub fn execution_from_row(row: &RawRow) -> Result<ExecutionRecord, RowError> {
        let underlying = parse_underlying(row)?;

        let raw_time = row.get(TIME).ok_or(RowError::MissingField("time"))?;
        let time_ms = parse_time(raw_time).ok_or_else(|| RowError::invalid("time", raw_time))?;

        let raw_qty = row.get(QTY).ok_or(RowError::MissingField("qty"))?;
        let qty = parse_decimal(raw_qty).ok_or_else(|| RowError::invalid("qty", raw_qty))?;
        let side = match parse_opt(row, SIDE, "side", Side::parse)? {
            Some(side) => side,
            None if qty.is_positive() => Side::Buy,
            None if qty.is_negative() => Side::Sell,
            None => return Err(RowError::MissingField("side")),
        };

        let raw_price = row.get(PRICE).ok_or(RowError::MissingField("price"))?;
        let price = parse_decimal(raw_price).ok_or_else(|| RowError::invalid("price", raw_price))?;

        let expiry = parse_opt(row, EXPIRY, "expiry", parse_date)?;
        let right = parse_opt(row, RIGHT, "right", Right::parse)?;
        let strike = parse_opt(row, STRIKE, "strike", parse_decimal)?;
        let combo_legs: Vec<ComboLegDef> = match row.get(COMBO_LEGS) {
            Some(raw) => {
                serde_json::from_str(raw).map_err(|_| RowError::invalid("combo_legs", raw))?
            }
            None => Vec::new(),
        };
        let sec_type = if combo_legs.is_empty() {
            infer_sec_type(row, expiry, right, strike)
        } else {
            row.get(SEC_TYPE).map(SecType::parse).unwrap_or(SecType::Option)
        };

        let mut exec = ExecutionRecord::new(time_ms, underlying, sec_type, side, qty, price)
            .with_combo_legs(combo_legs);
        exec.expiry = expiry;
        exec.right = right;
        exec.strike = strike;
        exec.commission = parse_opt(row, COMMISSION, "commission", parse_decimal)?;
        exec.order_id = parse_opt(row, ORDER_ID, "order_id", |s| s.parse::<i64>().ok())?;
        exec.perm_id = parse_opt(row, PERM_ID, "perm_id", |s| s.parse::<i64>().ok())?;
        exec.exec_id = row.get(EXEC_ID).map(str::to_string);
        exec.broker_id = row
            .get(BROKER_ID)
            .filter(|s| *s != "0")
            .map(str::to_string);
        exec.order_ref = row.get(ORDER_REF).map(str::to_string);
        exec.open_close = row.get(OPEN_CLOSE).and_then(OpenClose::parse);
        if let Some(multiplier) =
            parse_opt(row, MULTIPLIER, "multiplier", parse_decimal)?.filter(|m| m.is_positive())
        {
            exec.multiplier = multiplier;
        }
        Ok(exec)
    }
}

fn collect<T>(rows: &[RawRow], f: impl Fn(&RawRow) -> Result<T, RowError>) -> Normalized<T> {
    let mut out = Normalized::default();
    for (idx, row) in rows.iter().enumerate() {
        match f(row) {
            Ok(record) => out.records.push(record),
            Err(error) => {
                warn!(row = idx, error = %error, "Rejected input row");
                out.rejected.push(RejectedRow {
                    row: row.clone(),
                    error,
                });
            }
        }
    }
    out
}

fn parse_underlying(row: &RawRow) -> Result<Underlying, RowError> {
    row.get(UNDERLYING)
        .map(Underlying::new)
        .ok_or(RowError::MissingField("underlying"))
}

/// Optional field: absent is fine, present but unparseable is an error.
fn parse_opt<T>(
    row: &RawRow,
    aliases: &[&str],
    field: &'static str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>, RowError> {
    match row.get(aliases) {
        None => Ok(None),
        Some(raw) => parse(raw)
            .map(Some)
            .ok_or_else(|| RowError::invalid(field, raw)),
    }
}

fn infer_sec_type(
    row: &RawRow,
    expiry: Option<NaiveDate>,
    right: Option<Right>,
    strike: Option<Decimal>,
) -> SecType {
    match row.get(SEC_TYPE) {
        Some(raw) => SecType::parse(raw),
        None if expiry.is_some() || right.is_some() || strike.is_some() => SecType::Option,
        None => SecType::Stock,
    }
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    Decimal::from_str_canonical(raw.trim_start_matches('$')).ok()
}

/// Accepts `YYYYMMDD`, `YYYY-MM-DD` and `YYYY/MM/DD`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    ["%Y%m%d", "%Y-%m-%d", "%Y/%m/%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw.trim(), fmt).ok())
}

/// Accepts epoch milliseconds or seconds, RFC 3339, and broker local formats (read as UTC).
pub fn parse_time(raw: &str) -> Option<TimeMs> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<i64>() {
        // Anything below 10^11 is taken as seconds (that is before 1973 in ms).
        return Some(TimeMs::new(if n.abs() < 100_000_000_000 { n * 1000 } else { n }));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(TimeMs::from(dt.with_timezone(&Utc)));
    }
    [
        "%Y%m%d %H:%M:%S",
        "%Y%m%d;%H%M%S",
        "%Y%m%d-%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
    ]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    .map(|naive| TimeMs::from(naive.and_utc()))
}
