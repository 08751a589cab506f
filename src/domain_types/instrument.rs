//! 標的代碼定義
//!
//! 所有外部代碼字串（`600519.SH`、`sh.600519`、`600519` 等）都必須經由
//! [`InstrumentId::parse`] 轉為唯一的規範形式 `sh600519`。

use super::types::{DomainError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// 交易所
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Market {
    /// 上海證券交易所
    Sh,
    /// 深圳證券交易所
    Sz,
    /// 北京證券交易所
    Bj,
}

impl Market {
    pub fn as_str(&self) -> &'static str {
        match self {
            Market::Sh => "sh",
            Market::Sz => "sz",
            Market::Bj => "bj",
        }
    }

    /// 依據 A 股代碼區段推斷所屬交易所
    pub fn infer_from_code(code: u32) -> Option<Self> {
        match code {
            600_000..=603_999 | 605_000..=605_999 | 688_000..=689_999 => Some(Market::Sh),
            0..=399_999 => Some(Market::Sz),
            430_000..=439_999 | 830_000..=899_999 | 920_000..=920_999 => Some(Market::Bj),
            _ => None,
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Market {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SH" => Ok(Market::Sh),
            "SZ" => Ok(Market::Sz),
            "BJ" => Ok(Market::Bj),
            other => Err(DomainError::InvalidMarket(other.to_string())),
        }
    }
}

const CODE_LEN: usize = 6;

/// 規範化標的代碼（交易所 + 6 位數字代碼），建立後不可變
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrumentId {
    market: Market,
    code: String,
}

impl InstrumentId {
    /// 以已知交易所與代碼建立
    pub fn new(market: Market, code: &str) -> Result<Self> {
        let code = code.trim();
        if code.len() != CODE_LEN || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::invalid_instrument(code, "代碼必須為 6 位數字"));
        }
        Ok(Self {
            market,
            code: code.to_string(),
        })
    }

    /// 解析任意格式的原始代碼
    ///
    /// 支援：
    /// - `sh600519` / `SZ000858` / `sh.600519`（前綴市場）
    /// - `600519.SH` / `000001.sz`（後綴市場）
    /// - `600519` / `300750`（依代碼區段推斷市場）
    ///
    /// 數字部分必須剛好 6 位，不容許夾雜其他字元；前後綴市場同時出現時必須一致。
    pub fn parse(raw: &str) -> Result<Self> {
        let upper = raw.trim().to_ascii_uppercase();
        if upper.is_empty() {
            return Err(DomainError::invalid_instrument(raw, "空白代碼"));
        }
        let invalid = |reason: &str| DomainError::invalid_instrument(raw, reason);

        let (prefix, rest) = match upper.get(..2).map(str::parse::<Market>) {
            Some(Ok(market)) => {
                let rest = &upper[2..];
                (Some(market), rest.strip_prefix('.').unwrap_or(rest))
            }
            _ => (None, upper.as_str()),
        };

        let (number, suffix) = match rest.split_once('.') {
            Some((number, suffix)) => {
                let market = suffix
                    .parse::<Market>()
                    .map_err(|_| invalid("無法辨識的市場後綴"))?;
                (number, Some(market))
            }
            None => (rest, None),
        };

        if number.is_empty() {
            return Err(invalid("缺少數字代碼"));
        }
        if number.len() != CODE_LEN || !number.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("代碼必須為 6 位數字"));
        }

        let market = match (prefix, suffix) {
            (Some(p), Some(s)) if p != s => return Err(invalid("前綴與後綴市場不一致")),
            (Some(market), _) | (None, Some(market)) => market,
            (None, None) => {
                let code: u32 = number.parse().map_err(|_| invalid("無效的數字代碼"))?;
                Market::infer_from_code(code)
                    .ok_or_else(|| invalid("無法從代碼區段判斷市場"))?
            }
        };
        Self::new(market, number)
    }

    pub fn market(&self) -> Market {
        self.market
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// 供應商常用的點分隔形式，例如 `sh.600519`
    pub fn dotted(&self) -> String {
        format!("{}.{}", self.market, self.code)
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.market, self.code)
    }
}

impl FromStr for InstrumentId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for InstrumentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for InstrumentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
