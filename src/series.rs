//! Stateless series math: EMA, SMA, standard deviation, RSI, Bollinger
//! Bands and MACD, as single trailing values and as full series.
//!
//! Every function degrades to a neutral/sentinel value on short input rather
//! than erroring; a live feed cannot always guarantee warm-up length. The EMA
//! seeds with the first sample (not an SMA seed), so early-series values are
//! biased toward that sample; callers should supply at least the period in
//! lookback, ideally three times it, before trusting the output.

/// Neutral RSI returned while the series is still warming up.
pub const RSI_NEUTRAL: f64 = 50.0;

/// Trailing exponential moving average with smoothing `k = 2 / (period + 1)`.
///
/// Returns the last raw value if fewer than `period` points are available,
/// and 0.0 for an empty series.
pub fn ema(data: &[f64], period: usize) -> f64 {
    let Some(&last) = data.last() else {
        return 0.0;
    };
    if data.len() < period {
        return last;
    }
    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = data[0];
    for &v in &data[1..] {
        ema = v * k + ema * (1.0 - k);
    }
    ema
}

/// Full EMA series, same length as the input, seeded with the first sample.
pub fn ema_series(data: &[f64], period: usize) -> Vec<f64> {
    let Some(&first) = data.first() else {
        return Vec::new();
    };
    let k = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(data.len());
    out.push(first);
    for &v in &data[1..] {
        let prev = out[out.len() - 1];
        out.push(v * k + prev * (1.0 - k));
    }
    out
}

/// Simple moving average of the whole slice; 0.0 when empty.
pub fn sma(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Population standard deviation around a supplied mean; 0.0 when empty.
pub fn std_dev(data: &[f64], mean: f64) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let avg_sq = data.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / data.len() as f64;
    avg_sq.sqrt()
}

/// Relative Strength Index with Wilder smoothing.
///
/// Average gain/loss are seeded from the first `period` deltas and then
/// updated with `avg = (avg * (period - 1) + new) / period`. Returns the
/// neutral 50 if fewer than `period + 1` points are available and 100 when
/// the average loss is exactly zero.
pub fn rsi(closes: &[f64], period: usize) -> f64 {
    if period == 0 || closes.len() < period + 1 {
        return RSI_NEUTRAL;
    }

    let mut gains = 0.0;
    let mut losses = 0.0;
    for i in 1..=period {
        let change = closes[i] - closes[i - 1];
        if change > 0.0 {
            gains += change;
        } else {
            losses -= change;
        }
    }

    let mut avg_gain = gains / period as f64;
    let mut avg_loss = losses / period as f64;

    for i in (period + 1)..closes.len() {
        let change = closes[i] - closes[i - 1];
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
    }

    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// Full RSI series using the same recurrence as [`rsi`], with a constant
/// neutral-50 fill for indices before the warm-up point.
pub fn rsi_series(closes: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![RSI_NEUTRAL; closes.len()];
    if period == 0 || closes.len() <= period {
        return out;
    }

    let mut gains = 0.0;
    let mut losses = 0.0;
    for i in 1..=period {
        let change = closes[i] - closes[i - 1];
        if change > 0.0 {
            gains += change;
        } else {
            losses -= change;
        }
    }

    let mut avg_gain = gains / period as f64;
    let mut avg_loss = losses / period as f64;

    for i in (period + 1)..closes.len() {
        let change = closes[i] - closes[i - 1];
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;

        out[i] = if avg_loss == 0.0 {
            100.0
        } else if avg_gain == 0.0 {
            0.0
        } else {
            let rs = avg_gain / avg_loss;
            100.0 - 100.0 / (1.0 + rs)
        };
    }

    out
}

/// Bollinger Bands: trailing SMA plus/minus `mult` population standard
/// deviations over the last `period` values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Returns a degenerate band (upper = middle = lower = last value) when
/// fewer than `period` points are available.
pub fn bollinger_bands(data: &[f64], period: usize, mult: f64) -> BollingerBands {
    let last = data.last().copied().unwrap_or(0.0);
    if period == 0 || data.len() < period {
        return BollingerBands {
            upper: last,
            middle: last,
            lower: last,
        };
    }

    let window = &data[data.len() - period..];
    let middle = sma(window);
    let dev = std_dev(window, middle);
    BollingerBands {
        upper: middle + dev * mult,
        middle,
        lower: middle - dev * mult,
    }
}

/// MACD line, signal line and histogram as full series.
#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub macd_line: Vec<f64>,
    pub signal_line: Vec<f64>,
    pub histogram: Vec<f64>,
}

/// Fast EMA minus slow EMA as the MACD line, its EMA as the signal line,
/// their difference as the histogram.
pub fn macd_series(data: &[f64], fast: usize, slow: usize, signal: usize) -> MacdSeries {
    let fast_ema = ema_series(data, fast);
    let slow_ema = ema_series(data, slow);
    let macd_line: Vec<f64> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = ema_series(&macd_line, signal);
    let histogram: Vec<f64> = macd_line
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| m - s)
        .collect();
    MacdSeries {
        macd_line,
        signal_line,
        histogram,
    }
}
