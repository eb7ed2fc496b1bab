//! Core data model shared across the indicator and signal engines.
//!
//! Everything that crosses the crate boundary (candles in, `MarketState` and
//! signals out) lives here. The outbound types serialize to camelCase JSON so
//! the advisory payload can be handed to an external decision service as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single OHLCV bar. `time` is the bar-open timestamp in milliseconds.
///
/// The most recent bar in a series is mutable while its period is open
/// (high/low/close/volume update in place); `time` and `open` are fixed for
/// the bar's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// Absolute body size (|close - open|).
    pub fn body_size(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// Bar-open time as a UTC datetime, for logging and display.
    pub fn time_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.time).unwrap_or_default()
    }
}

/// Observation timeframe for a candle series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
}

impl Timeframe {
    /// Bar period in milliseconds.
    pub fn period_ms(&self) -> i64 {
        match self {
            Timeframe::M1 => 60_000,
            Timeframe::M5 => 300_000,
            Timeframe::M15 => 900_000,
            Timeframe::M30 => 1_800_000,
            Timeframe::H1 => 3_600_000,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Timeframe::M1 => write!(f, "1m"),
            Timeframe::M5 => write!(f, "5m"),
            Timeframe::M15 => write!(f, "15m"),
            Timeframe::M30 => write!(f, "30m"),
            Timeframe::H1 => write!(f, "1h"),
        }
    }
}

/// Derived market-wide context metrics fed into the composite score.
///
/// Explicit struct with safe neutral defaults; a missing upstream value never
/// turns into a runtime field-presence check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedMetrics {
    /// Cumulative volume delta (taker buy - taker sell) since stream start.
    pub cvd: f64,
    pub open_interest: f64,
    pub funding_rate: f64,
    /// -1 (longs getting liquidated) to 1 (shorts getting liquidated).
    pub liquidation_heat: f64,
    pub btc_dominance: f64,
}

impl Default for AdvancedMetrics {
    fn default() -> Self {
        Self {
            cvd: 0.0,
            open_interest: 0.0,
            funding_rate: 0.0,
            liquidation_heat: 0.0,
            btc_dominance: 54.0,
        }
    }
}

/// Swing-structure classification over a rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketStructure {
    Bullish,
    Bearish,
    Ranging,
}

/// Volume-price-analysis classification of the current bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VpaStatus {
    /// High volume confirming a real body move.
    Strong,
    /// Low-volume drift.
    Weak,
    Neutral,
    /// High volume with no body progress (churn, possible reversal).
    Anomaly,
}

/// CVD/price divergence classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CvdDivergence {
    None,
    /// Price made a new low but CVD did not (absorption).
    Bullish,
    /// Price made a new high but CVD did not (distribution).
    Bearish,
}

/// Liquidity-sweep ("stop hunt") classification of the current bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopHunt {
    None,
    /// Undercut a prior low and closed back above it.
    BullishSweep,
    /// Pierced a prior high and closed back below it.
    BearishSweep,
}

/// Order-flow proxy metrics derived from candles and CVD history.
///
/// These are heuristics, not order-book ground truth: buy/sell volume is
/// approximated with a 70/30 split by candle direction, so the accuracy
/// ceiling is bounded by that approximation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFlowMetrics {
    /// Buy/sell imbalance ratio in [-1, 1]; +1 = all buying.
    pub imbalance: f64,
    pub divergence: CvdDivergence,
    pub stop_hunt: StopHunt,
    /// Composite buying-pressure score in [0, 100]; 50 = neutral.
    pub pressure: f64,
}

impl OrderFlowMetrics {
    /// The zero-signal result returned when history is too short.
    pub fn neutral() -> Self {
        Self {
            imbalance: 0.0,
            divergence: CvdDivergence::None,
            stop_hunt: StopHunt::None,
            pressure: 50.0,
        }
    }
}

/// Rule-based directional bias derived from the composite score.
///
/// This is the fallback verdict the host can use when the external advisory
/// service is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalBias {
    StrongLong,
    WeakLong,
    Neutral,
    WeakShort,
    StrongShort,
}

/// Full indicator snapshot for one candle series at one point in time.
///
/// Pure value object: recomputed wholesale on every update, never patched
/// incrementally, so it carries no hidden state and cannot drift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorSnapshot {
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub ema_macro: f64,
    pub rsi: f64,
    /// MACD proxy: fast EMA minus slow EMA.
    pub macd: f64,
    pub volume_sma: f64,
    pub bollinger_upper: f64,
    pub bollinger_middle: f64,
    pub bollinger_lower: f64,
    /// Nearest unmitigated fair-value-gap midpoint, if any.
    pub fvg_price: Option<f64>,
    pub market_structure: MarketStructure,
    pub vpa_status: VpaStatus,
    pub order_flow: OrderFlowMetrics,

    // Per-factor directional sub-scores, each in [-1, 1].
    pub trend_score: f64,
    pub momentum_score: f64,
    pub smart_money_score: f64,
    pub liquidation_score: f64,
    pub funding_score: f64,
    pub oi_score: f64,
    /// Weighted composite of the sub-scores, in [-1, 1].
    pub composite_score: f64,
}

impl IndicatorSnapshot {
    /// Map the composite score to a coarse directional bias.
    pub fn bias(&self) -> SignalBias {
        match self.composite_score {
            s if s > 0.5 => SignalBias::StrongLong,
            s if s > 0.15 => SignalBias::WeakLong,
            s if s < -0.5 => SignalBias::StrongShort,
            s if s < -0.15 => SignalBias::WeakShort,
            _ => SignalBias::Neutral,
        }
    }
}

/// Direction of an emitted trade signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalKind {
    Buy,
    Sell,
}

/// Why a signal fired. Closed set; the display label is derived from the
/// variant, never parsed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalReason {
    /// Close crossed the anchor EMA with momentum confirming.
    TrendStart,
    /// Exit that immediately reversed into the opposite intent.
    TrendFlip,
    /// Exit back to flat without a reversal.
    TakeProfit,
}

impl std::fmt::Display for SignalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalReason::TrendStart => write!(f, "Trend Start"),
            SignalReason::TrendFlip => write!(f, "Trend Flip"),
            SignalReason::TakeProfit => write!(f, "Take Profit"),
        }
    }
}

/// A discrete point-in-time trade entry/exit event. Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChartSignal {
    pub time: i64,
    #[serde(rename = "type")]
    pub kind: SignalKind,
    pub price: f64,
    pub reason: SignalReason,
}

/// The published per-pair aggregate. Replaced (never mutated) on every
/// update; subscribers must treat it as an immutable snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketState {
    pub pair: String,
    pub price: f64,
    pub change24h: f64,
    pub candles: Vec<Candle>,
    pub metrics: AdvancedMetrics,
    pub indicators: IndicatorSnapshot,
    pub timeframe: Timeframe,
    pub is_realtime: bool,
}

impl MarketState {
    /// Serialize the snapshot into the plain payload consumed by the
    /// external advisory service.
    pub fn advisory_payload(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}
