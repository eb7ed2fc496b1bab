//! Composite indicator calculator.
//!
//! One pure function combining series math, market-structure and VPA
//! classification, fair-value-gap detection and order-flow metrics into an
//! [`IndicatorSnapshot`] with a weighted composite directional score. The
//! snapshot is recomputed wholesale on every call; nothing here is patched
//! incrementally, so repeated calls over the same history cannot drift.

use crate::config::IndicatorConfig;
use crate::order_flow::analyze_order_flow;
use crate::series::{bollinger_bands, ema, rsi, sma};
use crate::types::{
    AdvancedMetrics, Candle, IndicatorSnapshot, MarketStructure, OrderFlowMetrics, VpaStatus,
};

/// Bars in the market-structure window, split into a 7/8 half comparison.
const STRUCTURE_WINDOW: usize = 15;
const STRUCTURE_SPLIT: usize = 7;

/// Minimum candles before structure classification is attempted.
const STRUCTURE_MIN_CANDLES: usize = 20;

/// Volume multiples marking high/low volume for the VPA classifier.
const VPA_HIGH_VOLUME_MULT: f64 = 1.5;
const VPA_LOW_VOLUME_MULT: f64 = 0.5;

/// Body size as a fraction of price below which a high-volume bar is churn.
const VPA_BODY_THRESHOLD: f64 = 0.0005;

/// Minimum candles before the 3-bar FVG scan runs.
const FVG_MIN_CANDLES: usize = 6;

/// Extra lookback supplied to the trailing EMAs beyond their period, so the
/// first-sample seed has room to wash out.
const EMA_TREND_MARGIN: usize = 10;
const EMA_MACRO_MARGIN: usize = 50;

/// Compute a fresh snapshot for the given candle series and context metrics.
///
/// `cvd_history` must be aligned 1:1 with `candles`; shorter histories
/// degrade the order-flow section to its neutral result. An empty candle
/// series yields a fully neutral snapshot.
pub fn compute_indicators(
    candles: &[Candle],
    metrics: &AdvancedMetrics,
    cvd_history: &[f64],
    cfg: &IndicatorConfig,
) -> IndicatorSnapshot {
    if candles.is_empty() {
        return neutral_snapshot();
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
    let price = closes[closes.len() - 1];

    let ema_fast = ema(tail(&closes, cfg.ema_fast_period + EMA_TREND_MARGIN), cfg.ema_fast_period);
    let ema_slow = ema(tail(&closes, cfg.ema_slow_period + EMA_TREND_MARGIN), cfg.ema_slow_period);
    let ema_macro = ema(
        tail(&closes, cfg.ema_macro_period + EMA_MACRO_MARGIN),
        cfg.ema_macro_period,
    );
    let rsi_value = rsi(&closes, cfg.rsi_period);
    let volume_sma = sma(tail(&volumes, cfg.volume_sma_period));
    let bb = bollinger_bands(&closes, cfg.bollinger_period, cfg.bollinger_mult);

    let market_structure = classify_structure(candles);
    let vpa_status = classify_vpa(candles, volume_sma, price);
    let fvg_price = detect_fvg(candles);
    let order_flow = analyze_order_flow(candles, cvd_history);

    // Sub-scores, each in [-1, 1].
    let mut trend_score = 0.0;
    if price > ema_macro {
        trend_score += 0.5;
    }
    if price > ema_slow {
        trend_score += 0.5;
    }
    if price < ema_macro {
        trend_score -= 0.5;
    }
    if price < ema_slow {
        trend_score -= 0.5;
    }

    let momentum_score = if rsi_value > 70.0 {
        -0.8
    } else if rsi_value < 30.0 {
        0.8
    } else if rsi_value > 50.0 {
        0.2
    } else {
        -0.2
    };

    let smart_money_score = if metrics.cvd > 0.0 { 0.8 } else { -0.8 };
    let liquidation_score = metrics.liquidation_heat.clamp(-1.0, 1.0);
    let funding_score = if metrics.funding_rate < 0.0 { 1.0 } else { -1.0 };
    let oi_score = if metrics.open_interest > 0.0 { 0.5 } else { -0.5 };

    let w = &cfg.weights;
    let composite_score = trend_score * w.trend
        + momentum_score * w.momentum
        + smart_money_score * w.smart_money
        + liquidation_score * w.liquidation
        + funding_score * w.funding
        + oi_score * w.open_interest;

    IndicatorSnapshot {
        ema_fast,
        ema_slow,
        ema_macro,
        rsi: rsi_value,
        macd: ema_fast - ema_slow,
        volume_sma,
        bollinger_upper: bb.upper,
        bollinger_middle: bb.middle,
        bollinger_lower: bb.lower,
        fvg_price,
        market_structure,
        vpa_status,
        order_flow,
        trend_score,
        momentum_score,
        smart_money_score,
        liquidation_score,
        funding_score,
        oi_score,
        composite_score,
    }
}

fn neutral_snapshot() -> IndicatorSnapshot {
    IndicatorSnapshot {
        ema_fast: 0.0,
        ema_slow: 0.0,
        ema_macro: 0.0,
        rsi: 50.0,
        macd: 0.0,
        volume_sma: 0.0,
        bollinger_upper: 0.0,
        bollinger_middle: 0.0,
        bollinger_lower: 0.0,
        fvg_price: None,
        market_structure: MarketStructure::Ranging,
        vpa_status: VpaStatus::Neutral,
        order_flow: OrderFlowMetrics::neutral(),
        trend_score: 0.0,
        momentum_score: 0.0,
        smart_money_score: 0.0,
        liquidation_score: 0.0,
        funding_score: 0.0,
        oi_score: 0.0,
        composite_score: 0.0,
    }
}

fn tail(data: &[f64], n: usize) -> &[f64] {
    &data[data.len().saturating_sub(n)..]
}

/// Swing-structure heuristic: split the trailing window into two halves and
/// compare their extremes. Both higher is bullish, both lower bearish,
/// anything else ranging. Deliberately simpler than pivot-based structure
/// detection.
fn classify_structure(candles: &[Candle]) -> MarketStructure {
    if candles.len() < STRUCTURE_MIN_CANDLES {
        return MarketStructure::Ranging;
    }

    let window = &candles[candles.len() - STRUCTURE_WINDOW..];
    let (first, second) = window.split_at(STRUCTURE_SPLIT);

    let first_high = first.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let second_high = second.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let first_low = first.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    let second_low = second.iter().map(|c| c.low).fold(f64::MAX, f64::min);

    if second_high > first_high && second_low > first_low {
        MarketStructure::Bullish
    } else if second_high < first_high && second_low < first_low {
        MarketStructure::Bearish
    } else {
        MarketStructure::Ranging
    }
}

/// Volume-price analysis of the current bar against its volume SMA.
fn classify_vpa(candles: &[Candle], volume_sma: f64, price: f64) -> VpaStatus {
    let current = &candles[candles.len() - 1];

    if current.volume > volume_sma * VPA_HIGH_VOLUME_MULT {
        if current.body_size() > price * VPA_BODY_THRESHOLD {
            VpaStatus::Strong
        } else {
            VpaStatus::Anomaly
        }
    } else if current.volume < volume_sma * VPA_LOW_VOLUME_MULT {
        VpaStatus::Weak
    } else {
        VpaStatus::Neutral
    }
}

/// Scan the last three bars for a 3-bar fair-value gap and return the gap
/// midpoint. Most recent gap wins; older gaps are not tracked across calls.
fn detect_fvg(candles: &[Candle]) -> Option<f64> {
    if candles.len() < FVG_MIN_CANDLES {
        return None;
    }

    for i in (candles.len() - 3..candles.len()).rev() {
        let c1 = &candles[i - 2];
        let c2 = &candles[i - 1];
        let c3 = &candles[i];

        // Bullish gap: strong middle bar leaves a vacuum between bar 1's
        // high and bar 3's low.
        if c2.is_bullish() && c1.high < c3.low {
            return Some((c1.high + c3.low) / 2.0);
        }
        if !c2.is_bullish() && c1.low > c3.high {
            return Some((c1.low + c3.high) / 2.0);
        }
    }

    None
}
