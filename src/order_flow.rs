//! Order-flow analysis: buy/sell imbalance, CVD/price divergence,
//! liquidity-sweep detection and a composite buying-pressure score.
//!
//! All of it is a derived proxy, not order-book ground truth. True depth is
//! unavailable to this core, so buy volume is approximated as 70% of a
//! candle's volume when it closed up and 30% when it closed down; the
//! accuracy ceiling of everything downstream is bounded by that split.

use crate::types::{Candle, CvdDivergence, OrderFlowMetrics, StopHunt};

/// Minimum candles and CVD points before anything other than the neutral
/// result is produced.
pub const MIN_FLOW_HISTORY: usize = 20;

/// Candles in the imbalance window.
const IMBALANCE_WINDOW: usize = 5;

/// Bars scanned for CVD/price divergence.
const DIVERGENCE_LOOKBACK: usize = 20;

/// Reference bars for sweep detection, taken before the excluded recent bars.
const SWEEP_REFERENCE_BARS: usize = 8;

/// Most recent bars excluded from the sweep reference window.
const SWEEP_EXCLUDED_RECENT: usize = 2;

/// Assumed taker-buy share of volume for an up-close candle.
pub const BULLISH_BUY_SHARE: f64 = 0.7;

// Buying-pressure contributions, applied to the 50 baseline.
const PRESSURE_IMBALANCE_WEIGHT: f64 = 30.0;
const PRESSURE_DIVERGENCE_WEIGHT: f64 = 20.0;
const PRESSURE_SWEEP_WEIGHT: f64 = 15.0;

/// Analyze a candle window plus aligned CVD history.
///
/// Returns [`OrderFlowMetrics::neutral`] whenever either input is shorter
/// than [`MIN_FLOW_HISTORY`].
pub fn analyze_order_flow(candles: &[Candle], cvd_history: &[f64]) -> OrderFlowMetrics {
    if candles.len() < MIN_FLOW_HISTORY || cvd_history.len() < MIN_FLOW_HISTORY {
        return OrderFlowMetrics::neutral();
    }

    let imbalance = imbalance_ratio(&candles[candles.len() - IMBALANCE_WINDOW..]);
    let divergence = detect_divergence(candles, cvd_history);
    let stop_hunt = detect_stop_hunt(candles);

    let mut pressure = 50.0 + imbalance * PRESSURE_IMBALANCE_WEIGHT;
    pressure += match divergence {
        CvdDivergence::Bullish => PRESSURE_DIVERGENCE_WEIGHT,
        CvdDivergence::Bearish => -PRESSURE_DIVERGENCE_WEIGHT,
        CvdDivergence::None => 0.0,
    };
    pressure += match stop_hunt {
        StopHunt::BullishSweep => PRESSURE_SWEEP_WEIGHT,
        StopHunt::BearishSweep => -PRESSURE_SWEEP_WEIGHT,
        StopHunt::None => 0.0,
    };

    OrderFlowMetrics {
        imbalance,
        divergence,
        stop_hunt,
        pressure: pressure.clamp(0.0, 100.0),
    }
}

/// Net buy/sell ratio over the window, normalized to [-1, 1].
fn imbalance_ratio(window: &[Candle]) -> f64 {
    let mut buy = 0.0;
    let mut sell = 0.0;
    for c in window {
        let share = if c.is_bullish() {
            BULLISH_BUY_SHARE
        } else {
            1.0 - BULLISH_BUY_SHARE
        };
        buy += c.volume * share;
        sell += c.volume * (1.0 - share);
    }
    let total = buy + sell;
    if total > 0.0 {
        (buy - sell) / total
    } else {
        0.0
    }
}

/// CVD/price divergence over the lookback window.
///
/// Only the most recent bar is eligible to trigger a call, which prevents
/// stale retroactive signals: a bullish divergence means price printed its
/// window low on the current bar while the CVD low happened earlier and CVD
/// has since recovered above it (sellers absorbed). Bearish is symmetric on
/// the high side.
fn detect_divergence(candles: &[Candle], cvd_history: &[f64]) -> CvdDivergence {
    let prices = &candles[candles.len() - DIVERGENCE_LOOKBACK..];
    let cvd = &cvd_history[cvd_history.len() - DIVERGENCE_LOOKBACK..];
    let last = DIVERGENCE_LOOKBACK - 1;

    let price_low_idx = extreme_index(prices, |c| c.close, f64::lt);
    let cvd_low_idx = extreme_index_f(cvd, f64::lt);
    if price_low_idx == last && cvd_low_idx < last && cvd[last] > cvd[cvd_low_idx] {
        return CvdDivergence::Bullish;
    }

    let price_high_idx = extreme_index(prices, |c| c.close, f64::gt);
    let cvd_high_idx = extreme_index_f(cvd, f64::gt);
    if price_high_idx == last && cvd_high_idx < last && cvd[last] < cvd[cvd_high_idx] {
        return CvdDivergence::Bearish;
    }

    CvdDivergence::None
}

/// Liquidity-sweep detection against the prior reference window.
///
/// The reference excludes the two most recent bars so the sweep bar is
/// compared to the range it actually swept, not to itself.
fn detect_stop_hunt(candles: &[Candle]) -> StopHunt {
    let needed = SWEEP_REFERENCE_BARS + SWEEP_EXCLUDED_RECENT;
    if candles.len() < needed {
        return StopHunt::None;
    }

    let end = candles.len() - SWEEP_EXCLUDED_RECENT;
    let reference = &candles[end - SWEEP_REFERENCE_BARS..end];
    let ref_low = reference.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    let ref_high = reference.iter().map(|c| c.high).fold(f64::MIN, f64::max);

    let current = &candles[candles.len() - 1];
    if current.low < ref_low && current.close > ref_low {
        StopHunt::BullishSweep
    } else if current.high > ref_high && current.close < ref_high {
        StopHunt::BearishSweep
    } else {
        StopHunt::None
    }
}

/// Index of the extreme element under `better` (strict, first wins ties).
fn extreme_index<F>(candles: &[Candle], key: F, better: fn(&f64, &f64) -> bool) -> usize
where
    F: Fn(&Candle) -> f64,
{
    let mut idx = 0;
    let mut best = key(&candles[0]);
    for (i, c) in candles.iter().enumerate().skip(1) {
        let v = key(c);
        if better(&v, &best) {
            best = v;
            idx = i;
        }
    }
    idx
}

fn extreme_index_f(values: &[f64], better: fn(&f64, &f64) -> bool) -> usize {
    let mut idx = 0;
    let mut best = values[0];
    for (i, &v) in values.iter().enumerate().skip(1) {
        if better(&v, &best) {
            best = v;
            idx = i;
        }
    }
    idx
}
