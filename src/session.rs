//! Market session manager: per-pair candle history, CVD state, snapshot
//! recomputation and synchronous publication to subscribers.
//!
//! One manager owns all mutable per-pair state. Every mutation happens on
//! the sequential event-delivery path (backfill or tick), so indicator
//! recomputation always observes a consistent series. Timeframe switches are
//! staged through a generation-counted refetch ticket: a backfill carrying a
//! superseded ticket is discarded, never applied out of order, and a
//! subscriber never sees old-timeframe candles paired with new-timeframe
//! indicators.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{DetectorConfig, SessionConfig};
use crate::indicators::compute_indicators;
use crate::order_flow::BULLISH_BUY_SHARE;
use crate::series::rsi_series;
use crate::signals::detect_signals;
use crate::types::{AdvancedMetrics, Candle, ChartSignal, MarketState, Timeframe};

/// BTC dominance placeholder until a real macro feed supplies it.
const BTC_DOMINANCE_DEFAULT: f64 = 54.2;

/// Volatility-index offsets behind the liquidation-heat proxy.
const LIQUIDATION_HEAT_OFFSET: f64 = 20.0;
const LIQUIDATION_HEAT_SCALE: f64 = 50.0;

/// Handle for one registered subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

type SubscriberFn = dyn Fn(&str, &Arc<MarketState>) + Send + Sync;

/// Shared subscriber list, clonable so a callback can unsubscribe itself
/// (or others) while a notification is in flight.
#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    inner: Arc<Mutex<Vec<(SubscriptionId, Arc<SubscriberFn>)>>>,
}

impl SubscriberRegistry {
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&str, &Arc<MarketState>) + Send + Sync + 'static,
    {
        let id = SubscriptionId(Uuid::new_v4());
        let callback: Arc<SubscriberFn> = Arc::new(callback);
        self.lock().push((id, callback));
        id
    }

    /// Remove a subscriber. Safe to call from inside a notification; the
    /// in-flight notification still sees the snapshot it started with.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.lock();
        let before = subs.len();
        subs.retain(|(sub_id, _)| *sub_id != id);
        subs.len() != before
    }

    fn notify(&self, pair: &str, state: &Arc<MarketState>) {
        // Snapshot outside the lock so callbacks may re-enter the registry.
        let snapshot: Vec<Arc<SubscriberFn>> =
            self.lock().iter().map(|(_, cb)| Arc::clone(cb)).collect();
        for cb in snapshot {
            cb(pair, state);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(SubscriptionId, Arc<SubscriberFn>)>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Token tying a history refetch to the timeframe generation that requested
/// it. Last write wins: only the ticket from the most recent
/// [`SessionManager::switch_timeframe`] call is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefetchTicket {
    pub generation: u64,
    pub timeframe: Timeframe,
}

/// Per-pair mutable state: capped candle series plus aligned CVD history.
struct PairSession {
    candles: VecDeque<Candle>,
    cvd: f64,
    cvd_history: VecDeque<f64>,
}

impl PairSession {
    fn new() -> Self {
        Self {
            candles: VecDeque::new(),
            cvd: 0.0,
            cvd_history: VecDeque::new(),
        }
    }
}

/// Owns candle/CVD state for every tracked pair and publishes a fresh
/// [`MarketState`] after each applied event.
pub struct SessionManager {
    cfg: SessionConfig,
    timeframe: Timeframe,
    generation: u64,
    sessions: HashMap<String, PairSession>,
    latest: HashMap<String, Arc<MarketState>>,
    registry: SubscriberRegistry,
}

impl SessionManager {
    pub fn new(cfg: SessionConfig, timeframe: Timeframe) -> Self {
        Self {
            cfg,
            timeframe,
            generation: 0,
            sessions: HashMap::new(),
            latest: HashMap::new(),
            registry: SubscriberRegistry::default(),
        }
    }

    /// The currently published timeframe.
    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// Clonable handle to the subscriber list.
    pub fn registry(&self) -> SubscriberRegistry {
        self.registry.clone()
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&str, &Arc<MarketState>) + Send + Sync + 'static,
    {
        self.registry.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.registry.unsubscribe(id)
    }

    /// Latest published state for a pair, for late subscribers and UI pair
    /// switches; synchronous, no waiting for the next tick.
    pub fn market_state(&self, pair: &str) -> Option<Arc<MarketState>> {
        self.latest.get(pair).cloned()
    }

    /// Ticket for backfilling the current timeframe (initial history load).
    pub fn refetch_ticket(&self) -> RefetchTicket {
        RefetchTicket {
            generation: self.generation,
            timeframe: self.timeframe,
        }
    }

    /// Request a timeframe switch. Bumps the generation counter and returns
    /// the ticket the host must present with the refetched history. The
    /// published timeframe does not change until that backfill lands, so
    /// subscribers keep seeing internally consistent snapshots.
    pub fn switch_timeframe(&mut self, timeframe: Timeframe) -> RefetchTicket {
        self.generation += 1;
        info!(generation = self.generation, %timeframe, "timeframe switch requested");
        RefetchTicket {
            generation: self.generation,
            timeframe,
        }
    }

    /// Replace a pair's history wholesale from a refetch.
    ///
    /// `taker_buy_volumes` aligns with `candles` where available; missing
    /// entries fall back to the 70/30 direction split. Returns `false` (and
    /// applies nothing) when the ticket has been superseded by a newer
    /// timeframe switch.
    pub fn apply_backfill(
        &mut self,
        pair: &str,
        ticket: RefetchTicket,
        candles: Vec<Candle>,
        taker_buy_volumes: &[f64],
    ) -> bool {
        if ticket.generation != self.generation {
            debug!(
                pair,
                stale = ticket.generation,
                current = self.generation,
                "discarding superseded backfill"
            );
            return false;
        }

        debug_assert!(
            candles.windows(2).all(|w| w[0].time < w[1].time),
            "backfill candles must be strictly time-ordered"
        );

        let mut session = PairSession::new();
        for (i, candle) in candles.iter().enumerate() {
            debug_assert_candle(candle);
            let buy = taker_buy_volumes
                .get(i)
                .copied()
                .unwrap_or_else(|| estimate_buy_volume(candle));
            let delta = buy - (candle.volume - buy);
            session.cvd += delta;
            session.candles.push_back(*candle);
            session.cvd_history.push_back(session.cvd);
            while session.candles.len() > self.cfg.series_cap {
                session.candles.pop_front();
                session.cvd_history.pop_front();
            }
        }

        self.timeframe = ticket.timeframe;
        info!(
            pair,
            bars = session.candles.len(),
            timeframe = %ticket.timeframe,
            "backfill applied"
        );
        self.sessions.insert(pair.to_string(), session);
        self.publish(pair, false);
        true
    }

    /// Apply a live tick: merge into the open bar when the bar-open time
    /// matches the held tail, otherwise append a new bar and evict past the
    /// cap. Recomputes and publishes afterwards.
    pub fn apply_tick(&mut self, pair: &str, candle: Candle, taker_buy_volume: f64) {
        debug_assert_candle(&candle);

        let damping = self.cfg.cvd_damping;
        let cap = self.cfg.series_cap;
        let session = self
            .sessions
            .entry(pair.to_string())
            .or_insert_with(PairSession::new);

        let delta = taker_buy_volume - (candle.volume - taker_buy_volume);
        session.cvd += delta * damping;

        match session.candles.back_mut() {
            Some(last) if last.time == candle.time => {
                *last = candle;
                if let Some(tail) = session.cvd_history.back_mut() {
                    *tail = session.cvd;
                }
            }
            _ => {
                debug_assert!(
                    session
                        .candles
                        .back()
                        .map_or(true, |last| last.time < candle.time),
                    "tick time must not go backwards"
                );
                session.candles.push_back(candle);
                session.cvd_history.push_back(session.cvd);
                while session.candles.len() > cap {
                    session.candles.pop_front();
                    session.cvd_history.pop_front();
                }
            }
        }

        self.publish(pair, true);
    }

    /// Re-derive the full signal overlay for a pair's held history.
    pub fn signals(&self, pair: &str, cfg: &DetectorConfig) -> Vec<ChartSignal> {
        let Some(session) = self.sessions.get(pair) else {
            return Vec::new();
        };
        let candles: Vec<Candle> = session.candles.iter().copied().collect();
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let rsi = rsi_series(&closes, self.cfg.indicators.rsi_period);
        detect_signals(&candles, &rsi, cfg)
    }

    /// Build and publish a fresh `MarketState` for the pair.
    fn publish(&mut self, pair: &str, is_realtime: bool) {
        let Some(session) = self.sessions.get(pair) else {
            return;
        };
        let candles: Vec<Candle> = session.candles.iter().copied().collect();
        let (Some(&first), Some(&last)) = (candles.first(), candles.last()) else {
            return;
        };

        let change24h = if first.close != 0.0 {
            (last.close - first.close) / first.close * 100.0
        } else {
            0.0
        };

        let volatility = volatility_index(&candles, self.cfg.volatility_lookback);
        let metrics = AdvancedMetrics {
            cvd: session.cvd,
            open_interest: volatility * 1000.0,
            funding_rate: change24h * 0.001,
            liquidation_heat: ((volatility - LIQUIDATION_HEAT_OFFSET) / LIQUIDATION_HEAT_SCALE)
                .clamp(-1.0, 1.0),
            btc_dominance: BTC_DOMINANCE_DEFAULT,
        };

        let cvd_history: Vec<f64> = session.cvd_history.iter().copied().collect();
        let indicators = compute_indicators(&candles, &metrics, &cvd_history, &self.cfg.indicators);

        let state = Arc::new(MarketState {
            pair: pair.to_string(),
            price: last.close,
            change24h,
            candles,
            metrics,
            indicators,
            timeframe: self.timeframe,
            is_realtime,
        });

        debug!(pair, price = state.price, at = %last.time_utc(), "state published");
        self.latest.insert(pair.to_string(), Arc::clone(&state));
        self.registry.notify(pair, &state);
    }
}

/// Average bar range relative to close over the lookback, scaled by 1000.
fn volatility_index(candles: &[Candle], lookback: usize) -> f64 {
    if candles.is_empty() || lookback == 0 {
        return 0.0;
    }
    let window = &candles[candles.len().saturating_sub(lookback)..];
    let sum: f64 = window
        .iter()
        .filter(|c| c.close != 0.0)
        .map(|c| (c.high - c.low) / c.close)
        .sum();
    sum / lookback as f64 * 1000.0
}

fn estimate_buy_volume(candle: &Candle) -> f64 {
    let share = if candle.is_bullish() {
        BULLISH_BUY_SHARE
    } else {
        1.0 - BULLISH_BUY_SHARE
    };
    candle.volume * share
}

fn debug_assert_candle(candle: &Candle) {
    debug_assert!(
        candle.low <= candle.open.min(candle.close)
            && candle.open.max(candle.close) <= candle.high,
        "malformed candle at {}: o={} h={} l={} c={}",
        candle.time,
        candle.open,
        candle.high,
        candle.low,
        candle.close
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MarketStructure, SignalKind};

    const BAR_MS: i64 = 60_000;

    fn uptrend_tick(i: usize) -> (Candle, f64) {
        let open = 100.0 + i as f64;
        let candle = Candle {
            time: i as i64 * BAR_MS,
            open,
            high: open + 1.0,
            low: open,
            close: open + 1.0,
            volume: 1000.0,
        };
        (candle, 700.0)
    }

    fn manager() -> SessionManager {
        SessionManager::new(SessionConfig::default(), Timeframe::M1)
    }

    #[test]
    fn uptrend_end_to_end() {
        let mut mgr = manager();
        for i in 0..60 {
            let (candle, buy) = uptrend_tick(i);
            mgr.apply_tick("BTC/USDT", candle, buy);
        }

        let state = mgr.market_state("BTC/USDT").expect("state published");
        assert_eq!(state.indicators.market_structure, MarketStructure::Bullish);
        assert!(state.indicators.rsi > 50.0);
        assert!(state.indicators.composite_score > 0.0);
        assert!(state.metrics.cvd > 0.0);
        assert!(state.is_realtime);

        let signals = mgr.signals("BTC/USDT", &DetectorConfig::default());
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].kind, SignalKind::Buy);
        assert!(signals[0].time <= 3 * BAR_MS, "entry near the start");
    }

    #[test]
    fn published_state_derives_price_and_change_from_series_ends() {
        let mut mgr = manager();
        for i in 0..30 {
            let (candle, buy) = uptrend_tick(i);
            mgr.apply_tick("BTC/USDT", candle, buy);
        }

        let state = mgr.market_state("BTC/USDT").unwrap();
        let first = state.candles.first().unwrap();
        let last = state.candles.last().unwrap();
        assert_eq!(state.price, last.close);
        let expected = (last.close - first.close) / first.close * 100.0;
        assert!((state.change24h - expected).abs() < 1e-12);
    }

    #[test]
    fn tick_merges_open_bar_and_appends_on_close() {
        let mut mgr = manager();
        let (mut candle, buy) = uptrend_tick(0);
        mgr.apply_tick("ETH/USDT", candle, buy);

        // Same bar-open time: update in place.
        candle.close = candle.open + 0.5;
        candle.high = candle.open + 0.6;
        mgr.apply_tick("ETH/USDT", candle, buy);
        let state = mgr.market_state("ETH/USDT").unwrap();
        assert_eq!(state.candles.len(), 1);
        assert_eq!(state.candles[0].close, candle.close);

        // New bar-open time: append.
        let (next, buy) = uptrend_tick(1);
        mgr.apply_tick("ETH/USDT", next, buy);
        let state = mgr.market_state("ETH/USDT").unwrap();
        assert_eq!(state.candles.len(), 2);
    }

    #[test]
    fn series_cap_evicts_oldest_and_keeps_cvd_aligned() {
        let cfg = SessionConfig {
            series_cap: 5,
            ..Default::default()
        };
        let mut mgr = SessionManager::new(cfg, Timeframe::M1);
        for i in 0..10 {
            let (candle, buy) = uptrend_tick(i);
            mgr.apply_tick("SOL/USDT", candle, buy);
        }

        let state = mgr.market_state("SOL/USDT").unwrap();
        assert_eq!(state.candles.len(), 5);
        assert_eq!(state.candles[0].time, 5 * BAR_MS);

        let session = mgr.sessions.get("SOL/USDT").unwrap();
        assert_eq!(session.cvd_history.len(), session.candles.len());
    }

    #[test]
    fn subscribers_receive_each_publication() {
        let mut mgr = manager();
        let seen: Arc<Mutex<Vec<(String, Timeframe)>>> = Arc::default();
        let sink = Arc::clone(&seen);
        mgr.subscribe(move |pair, state| {
            sink.lock().unwrap().push((pair.to_string(), state.timeframe));
        });

        for i in 0..3 {
            let (candle, buy) = uptrend_tick(i);
            mgr.apply_tick("BTC/USDT", candle, buy);
        }

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|(p, tf)| p == "BTC/USDT" && *tf == Timeframe::M1));
    }

    #[test]
    fn unsubscribe_during_notification_is_safe() {
        let mut mgr = manager();
        let registry = mgr.registry();
        let calls = Arc::new(Mutex::new(0usize));
        let id_cell: Arc<Mutex<Option<SubscriptionId>>> = Arc::default();

        let counter = Arc::clone(&calls);
        let cell = Arc::clone(&id_cell);
        let id = mgr.subscribe(move |_, _| {
            *counter.lock().unwrap() += 1;
            if let Some(own_id) = *cell.lock().unwrap() {
                registry.unsubscribe(own_id);
            }
        });
        *id_cell.lock().unwrap() = Some(id);

        let (candle, buy) = uptrend_tick(0);
        mgr.apply_tick("BTC/USDT", candle, buy);
        let (candle, buy) = uptrend_tick(1);
        mgr.apply_tick("BTC/USDT", candle, buy);

        assert_eq!(*calls.lock().unwrap(), 1, "self-removed after first notify");
    }

    #[test]
    fn superseded_backfill_is_discarded() {
        let mut mgr = manager();
        let published: Arc<Mutex<Vec<Timeframe>>> = Arc::default();
        let sink = Arc::clone(&published);
        mgr.subscribe(move |_, state| {
            assert_eq!(
                state.candles.is_empty(),
                false,
                "published state always carries candles"
            );
            sink.lock().unwrap().push(state.timeframe);
        });

        // Two rapid switches; the first refetch completes late.
        let stale = mgr.switch_timeframe(Timeframe::M5);
        let current = mgr.switch_timeframe(Timeframe::M15);

        let m5_candles: Vec<Candle> = (0..30).map(|i| uptrend_tick(i).0).collect();
        assert!(!mgr.apply_backfill("BTC/USDT", stale, m5_candles, &[]));
        assert!(mgr.market_state("BTC/USDT").is_none(), "stale data not applied");

        let m15_candles: Vec<Candle> = (0..30)
            .map(|i| {
                let (mut c, _) = uptrend_tick(i);
                c.time = i as i64 * Timeframe::M15.period_ms();
                c
            })
            .collect();
        assert!(mgr.apply_backfill("BTC/USDT", current, m15_candles, &[]));

        assert_eq!(mgr.timeframe(), Timeframe::M15);
        let state = mgr.market_state("BTC/USDT").unwrap();
        assert_eq!(state.timeframe, Timeframe::M15);
        assert_eq!(state.candles.len(), 30);
        assert!(!state.is_realtime);

        // No subscriber ever saw a 5m snapshot.
        let published = published.lock().unwrap();
        assert!(published.iter().all(|tf| *tf == Timeframe::M15));
    }

    #[test]
    fn backfill_seeds_cvd_with_full_deltas() {
        let mut mgr = manager();
        let ticket = mgr.refetch_ticket();
        let candles: Vec<Candle> = (0..25).map(|i| uptrend_tick(i).0).collect();
        let buys = vec![700.0; 25];
        assert!(mgr.apply_backfill("BTC/USDT", ticket, candles, &buys));

        // 25 bars of +400 delta each, undamped.
        let state = mgr.market_state("BTC/USDT").unwrap();
        assert!((state.metrics.cvd - 25.0 * 400.0).abs() < 1e-9);
    }

    #[test]
    fn advisory_payload_is_camel_case_json() {
        let mut mgr = manager();
        for i in 0..30 {
            let (candle, buy) = uptrend_tick(i);
            mgr.apply_tick("BTC/USDT", candle, buy);
        }
        let state = mgr.market_state("BTC/USDT").unwrap();
        let payload = state.advisory_payload().unwrap();
        assert_eq!(payload["pair"], "BTC/USDT");
        assert_eq!(payload["timeframe"], "1m");
        assert!(payload["indicators"]["compositeScore"].is_number());
        assert!(payload["metrics"]["liquidationHeat"].is_number());
        assert!(payload["isRealtime"].as_bool().unwrap());
    }
}
