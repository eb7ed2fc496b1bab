//! Configuration for the indicator, detector and session layers.
//!
//! Every tunable the system recognizes is a named field with a documented
//! default; nothing is a magic literal buried in computation code.

/// Weights for the composite directional score.
///
/// The canonical policy table: trend 30%, momentum 20%, smart money 15%,
/// liquidation 10%, funding 10%, open interest 15%. The weights sum to 1 so
/// the composite stays in [-1, 1] when every sub-score does.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub trend: f64,
    pub momentum: f64,
    pub smart_money: f64,
    pub liquidation: f64,
    pub funding: f64,
    pub open_interest: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            trend: 0.30,
            momentum: 0.20,
            smart_money: 0.15,
            liquidation: 0.10,
            funding: 0.10,
            open_interest: 0.15,
        }
    }
}

impl ScoreWeights {
    pub fn sum(&self) -> f64 {
        self.trend
            + self.momentum
            + self.smart_money
            + self.liquidation
            + self.funding
            + self.open_interest
    }
}

/// Periods and thresholds for the composite indicator calculator.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorConfig {
    /// Fast trend EMA period (default: 20)
    pub ema_fast_period: usize,
    /// Slow trend EMA period (default: 50)
    pub ema_slow_period: usize,
    /// Macro trend EMA period (default: 200)
    pub ema_macro_period: usize,
    /// RSI period (default: 14)
    pub rsi_period: usize,
    /// Bollinger Band lookback (default: 20)
    pub bollinger_period: usize,
    /// Bollinger Band width in standard deviations (default: 2.0)
    pub bollinger_mult: f64,
    /// Volume SMA lookback used by the VPA classifier (default: 20)
    pub volume_sma_period: usize,
    pub weights: ScoreWeights,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            ema_fast_period: 20,
            ema_slow_period: 50,
            ema_macro_period: 200,
            rsi_period: 14,
            bollinger_period: 20,
            bollinger_mult: 2.0,
            volume_sma_period: 20,
            weights: ScoreWeights::default(),
        }
    }
}

/// Configuration for the signal-detector state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    /// Trend-anchor EMA period (default: 50)
    pub anchor_ema_period: usize,
    /// Bars to suppress new entries after any emitted signal (default: 8).
    /// Hysteresis against chop; trend flips are exempt.
    pub cooldown_bars: usize,
    /// RSI must exceed this for a long entry; a long exit below it flips
    /// straight to short (default: 45)
    pub long_rsi_gate: f64,
    /// RSI must be under this for a short entry; a short exit above it flips
    /// straight to long (default: 55)
    pub short_rsi_gate: f64,
    /// Minimum candle history before any signal is produced (default: 50)
    pub min_history: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            anchor_ema_period: 50,
            cooldown_bars: 8,
            long_rsi_gate: 45.0,
            short_rsi_gate: 55.0,
            min_history: 50,
        }
    }
}

/// Configuration for the per-pair market session manager.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Maximum candles (and aligned CVD points) retained per pair
    /// (default: 200). Oldest bars are evicted FIFO past the cap.
    pub series_cap: usize,
    /// Damping factor applied to per-tick CVD deltas on the live path
    /// (default: 0.05). Backfill accumulates full deltas.
    pub cvd_damping: f64,
    /// Lookback bars for the volatility index behind the liquidation-heat
    /// proxy (default: 20)
    pub volatility_lookback: usize,
    pub indicators: IndicatorConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            series_cap: 200,
            cvd_damping: 0.05,
            volatility_lookback: 20,
            indicators: IndicatorConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_sum_to_one() {
        assert!((ScoreWeights::default().sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn defaults_match_documented_values() {
        let ind = IndicatorConfig::default();
        assert_eq!(ind.ema_fast_period, 20);
        assert_eq!(ind.ema_slow_period, 50);
        assert_eq!(ind.ema_macro_period, 200);
        assert_eq!(ind.rsi_period, 14);

        let det = DetectorConfig::default();
        assert_eq!(det.anchor_ema_period, 50);
        assert_eq!(det.cooldown_bars, 8);

        let sess = SessionConfig::default();
        assert_eq!(sess.series_cap, 200);
    }
}
