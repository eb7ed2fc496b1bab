//! Trend-following signal detector.
//!
//! A single position-intent state machine walked over the full candle
//! history on every call. The detector holds no state across invocations, so
//! the emitted list is a pure function of its inputs: re-running on an
//! extended history reproduces every earlier signal identically, with at
//! most one new trailing signal.
//!
//! Entries fire on a close crossing the anchor EMA with RSI confirming;
//! exits fire on the close falling back through the anchor, either flipping
//! straight into the opposite intent (momentum agrees) or going flat. A
//! cooldown in bars suppresses fresh entries after any signal to keep choppy
//! markets from chattering; flips are exempt by design.

use crate::config::DetectorConfig;
use crate::series::ema_series;
use crate::types::{Candle, ChartSignal, SignalKind, SignalReason};

/// Position intent while walking the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    Flat,
    Long,
    Short,
}

/// Derive the chronological signal list for a candle history.
///
/// `rsi_series` must be aligned 1:1 with `candles` (see
/// [`crate::series::rsi_series`]). Histories shorter than
/// `cfg.min_history` produce no signals.
pub fn detect_signals(
    candles: &[Candle],
    rsi_series: &[f64],
    cfg: &DetectorConfig,
) -> Vec<ChartSignal> {
    let mut signals = Vec::new();
    if candles.len() < cfg.min_history || rsi_series.len() != candles.len() {
        debug_assert!(
            rsi_series.len() == candles.len() || candles.len() < cfg.min_history,
            "rsi series misaligned with candles"
        );
        return signals;
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let anchor = ema_series(&closes, cfg.anchor_ema_period);

    let mut intent = Intent::Flat;
    let mut last_signal_idx: Option<usize> = None;

    for i in 1..candles.len() {
        let c = &candles[i];
        let close = closes[i];
        let prev_close = closes[i - 1];
        let ema = anchor[i];
        let prev_ema = anchor[i - 1];
        let rsi = rsi_series[i];

        let crossed_above = prev_close <= prev_ema && close > ema;
        let crossed_below = prev_close >= prev_ema && close < ema;

        match intent {
            Intent::Flat => {
                let cooled =
                    last_signal_idx.map_or(true, |last| i - last >= cfg.cooldown_bars);
                if !cooled {
                    continue;
                }
                if crossed_above && rsi > cfg.long_rsi_gate {
                    signals.push(ChartSignal {
                        time: c.time,
                        kind: SignalKind::Buy,
                        price: c.low,
                        reason: SignalReason::TrendStart,
                    });
                    intent = Intent::Long;
                    last_signal_idx = Some(i);
                } else if crossed_below && rsi < cfg.short_rsi_gate {
                    signals.push(ChartSignal {
                        time: c.time,
                        kind: SignalKind::Sell,
                        price: c.high,
                        reason: SignalReason::TrendStart,
                    });
                    intent = Intent::Short;
                    last_signal_idx = Some(i);
                }
            }
            Intent::Long => {
                if close < ema {
                    // Exit; momentum decides between a flat take-profit and
                    // an immediate flip short.
                    let flip = rsi < cfg.long_rsi_gate;
                    signals.push(ChartSignal {
                        time: c.time,
                        kind: SignalKind::Sell,
                        price: c.high,
                        reason: if flip {
                            SignalReason::TrendFlip
                        } else {
                            SignalReason::TakeProfit
                        },
                    });
                    intent = if flip { Intent::Short } else { Intent::Flat };
                    last_signal_idx = Some(i);
                }
            }
            Intent::Short => {
                if close > ema {
                    let flip = rsi > cfg.short_rsi_gate;
                    signals.push(ChartSignal {
                        time: c.time,
                        kind: SignalKind::Buy,
                        price: c.low,
                        reason: if flip {
                            SignalReason::TrendFlip
                        } else {
                            SignalReason::TakeProfit
                        },
                    });
                    intent = if flip { Intent::Long } else { Intent::Flat };
                    last_signal_idx = Some(i);
                }
            }
        }
    }

    signals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::rsi_series;

    const BAR_MS: i64 = 60_000;

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let open = if i == 0 { close } else { closes[i - 1] };
                Candle {
                    time: i as i64 * BAR_MS,
                    open,
                    high: open.max(close) + 0.1,
                    low: open.min(close) - 0.1,
                    close,
                    volume: 1000.0,
                }
            })
            .collect()
    }

    fn run(closes: &[f64], cfg: &DetectorConfig) -> Vec<ChartSignal> {
        let candles = candles_from_closes(closes);
        let rsi = rsi_series(closes, 14);
        detect_signals(&candles, &rsi, cfg)
    }

    #[test]
    fn short_history_produces_nothing() {
        let closes: Vec<f64> = (0..49).map(|i| 100.0 + i as f64).collect();
        assert!(run(&closes, &DetectorConfig::default()).is_empty());
    }

    #[test]
    fn steady_uptrend_emits_one_buy_and_no_sell() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let signals = run(&closes, &DetectorConfig::default());

        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].kind, SignalKind::Buy);
        assert_eq!(signals[0].reason, SignalReason::TrendStart);
        // Fires near the start of the run, once the close clears the seeded
        // anchor EMA.
        assert!(signals[0].time <= 3 * BAR_MS);
    }

    #[test]
    fn breakdown_after_rally_flips_short() {
        // Flat base, breakout long, then a hard breakdown with weak RSI.
        let mut closes = vec![100.0; 60];
        closes.extend(vec![105.0; 10]); // cross above at bar 60
        closes.extend(vec![95.0; 30]); // breakdown at bar 70
        let signals = run(&closes, &DetectorConfig::default());

        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].kind, SignalKind::Buy);
        assert_eq!(signals[0].reason, SignalReason::TrendStart);
        assert_eq!(signals[0].time, 60 * BAR_MS);
        assert_eq!(signals[1].kind, SignalKind::Sell);
        assert_eq!(signals[1].reason, SignalReason::TrendFlip);
        assert_eq!(signals[1].time, 70 * BAR_MS);
    }

    #[test]
    fn detector_is_deterministic() {
        let closes: Vec<f64> = (0..300)
            .map(|i| 100.0 + (i as f64 * std::f64::consts::TAU / 60.0).sin() * 8.0)
            .collect();
        let a = run(&closes, &DetectorConfig::default());
        let b = run(&closes, &DetectorConfig::default());
        assert_eq!(a, b);
        assert!(
            a.len() >= 2,
            "oscillating fixture should produce repeated signals"
        );
    }

    #[test]
    fn entries_respect_cooldown() {
        let cfg = DetectorConfig::default();
        let closes: Vec<f64> = (0..400)
            .map(|i| 100.0 + (i as f64 * std::f64::consts::TAU / 50.0).sin() * 6.0)
            .collect();
        let signals = run(&closes, &cfg);

        for pair in signals.windows(2) {
            let bars_apart = (pair[1].time - pair[0].time) / BAR_MS;
            // Entries never fire inside the cooldown window; only an exit
            // (flip or take-profit) may follow sooner.
            if pair[1].reason == SignalReason::TrendStart {
                assert!(
                    bars_apart >= cfg.cooldown_bars as i64,
                    "entry {} bars after previous signal",
                    bars_apart
                );
            }
            // Same-direction signals never stack inside the cooldown.
            if pair[1].kind == pair[0].kind {
                assert!(bars_apart >= cfg.cooldown_bars as i64);
            }
        }
    }

    #[test]
    fn extending_history_preserves_earlier_signals() {
        let closes: Vec<f64> = (0..300)
            .map(|i| 100.0 + (i as f64 * std::f64::consts::TAU / 60.0).sin() * 8.0)
            .collect();
        let full = run(&closes, &DetectorConfig::default());
        let truncated = run(&closes[..260], &DetectorConfig::default());

        // Signals derived from the shared prefix match exactly. The anchor
        // EMA is seeded from the first bar, so prefixes are stable.
        for (a, b) in truncated.iter().zip(&full) {
            assert_eq!(a, b);
        }
    }
}
