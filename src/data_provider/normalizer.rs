//! 供應商資料列正規化
//!
//! 將鬆散型別的 [`RawRow`] 轉為 [`ObservationRecord`]：
//! - 未知欄位直接丟棄
//! - 無法解析的數值視為缺省，而不是 0
//! - 日期無法解析或代碼與請求不符的整列丟棄

use super::vendor::RawRow;
use crate::domain_types::{InstrumentId, ObservationField, ObservationRecord};
use crate::utils::parse_date_value;
use rust_decimal::prelude::*;
use serde_json::Value;
use tracing::debug;

/// 視為缺值的字串
const NULL_MARKERS: [&str; 7] = ["", "--", "-", "None", "none", "null", "NaN"];

const DATE_KEYS: [&str; 3] = ["date", "trade_date", "trading_date"];
const CODE_KEYS: [&str; 3] = ["code", "symbol", "bs_code"];

/// 估值因子的合理範圍上限（不含）
const FACTOR_UPPER_BOUND: i64 = 1_000_000;

/// 單次正規化的統計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub rows_in: usize,
    pub rows_out: usize,
    /// 因日期或代碼無效而丟棄的列
    pub dropped_rows: usize,
    /// 存在但無法解析、或超出合理範圍的數值
    pub rejected_values: usize,
}

#[derive(Debug, Clone)]
pub struct RowNormalizer {
    clean_factors: bool,
}

impl Default for RowNormalizer {
    fn default() -> Self {
        Self { clean_factors: true }
    }
}

impl RowNormalizer {
    pub fn new(clean_factors: bool) -> Self {
        Self { clean_factors }
    }

    pub fn normalize(
        &self,
        instrument: &InstrumentId,
        rows: &[RawRow],
    ) -> (Vec<ObservationRecord>, NormalizeStats) {
        let mut stats = NormalizeStats {
            rows_in: rows.len(),
            ..Default::default()
        };
        let mut records = Vec::with_capacity(rows.len());

        for row in rows {
            match self.normalize_row(instrument, row, &mut stats) {
                Some(record) => records.push(record),
                None => stats.dropped_rows += 1,
            }
        }
        stats.rows_out = records.len();

        if stats.dropped_rows > 0 || stats.rejected_values > 0 {
            debug!(
                symbol = %instrument,
                dropped_rows = stats.dropped_rows,
                rejected_values = stats.rejected_values,
                "正規化過程丟棄部分資料"
            );
        }
        (records, stats)
    }

    fn normalize_row(
        &self,
        instrument: &InstrumentId,
        row: &RawRow,
        stats: &mut NormalizeStats,
    ) -> Option<ObservationRecord> {
        let trade_date = DATE_KEYS
            .iter()
            .filter_map(|k| row.get(*k))
            .find_map(parse_date_value)?;

        // 帶有代碼欄位時必須與請求的標的一致
        if let Some(raw_code) = CODE_KEYS.iter().find_map(|k| row.get(*k).and_then(Value::as_str)) {
            match InstrumentId::parse(raw_code) {
                Ok(id) if &id == instrument => {}
                _ => return None,
            }
        }

        let mut record = ObservationRecord::new(instrument.clone(), trade_date);
        for field in ObservationField::ALL {
            let mut seen = false;
            let value = field
                .vendor_aliases()
                .iter()
                .filter_map(|alias| row.get(*alias))
                .inspect(|v| seen |= !is_null(v))
                .find_map(parse_decimal);

            let value = match value {
                Some(v) if !storable(field, v) => None,
                Some(v) if self.clean_factors && field.is_factor() && !factor_in_range(v) => None,
                other => other,
            };
            if value.is_none() && seen {
                stats.rejected_values += 1;
            }
            record.set(field, value);
        }
        Some(record)
    }
}

fn is_null(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => NULL_MARKERS.contains(&s.trim()),
        _ => false,
    }
}

/// 解析數值；缺值標記、布林、陣列與無法解析的字串都回傳 `None`
pub fn parse_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Decimal::from(i))
            } else {
                n.as_f64().and_then(Decimal::from_f64)
            }
        }
        Value::String(s) => {
            let s = s.trim();
            if NULL_MARKERS.contains(&s) {
                return None;
            }
            let s = s.replace(',', "");
            Decimal::from_str(&s)
                .or_else(|_| Decimal::from_scientific(&s))
                .ok()
        }
        _ => None,
    }
}

/// 數值能否寫入對應欄位而不溢位；價格與成交量不可為負
fn storable(field: ObservationField, value: Decimal) -> bool {
    use ObservationField::*;

    // 與 stock_daily_data 的 NUMERIC 精度一致
    let integer_digits = match field {
        Open | High | Low | Close | PreClose => 16,
        Volume => 22,
        Amount => 20,
        ChangePercent | TurnoverRate => 6,
        TradeStatus => 4,
        PeTtm | Pb | PsTtm | PcfTtm => 14,
    };
    let non_negative = matches!(
        field,
        Open | High | Low | Close | PreClose | Volume | Amount | TradeStatus
    );
    if non_negative && value.is_sign_negative() && !value.is_zero() {
        return false;
    }
    value.abs() < Decimal::from_i128_with_scale(10_i128.pow(integer_digits), 0)
}

/// 估值因子必須落在 (0, 1e6)
fn factor_in_range(value: Decimal) -> bool {
    value > Decimal::ZERO && value < Decimal::from(FACTOR_UPPER_BOUND)
}
