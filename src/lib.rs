//! Sniper signal core: streaming indicator derivation and discrete trade
//! signal detection over multi-pair OHLCV candle feeds.
//!
//! The crate is a library consumed by a host process. It owns no wire
//! protocol: candles come in through [`session::SessionManager`] (or the
//! [`feed`] driver), indicator snapshots and signals go out as immutable
//! published values. All computation is synchronous and deterministic for a
//! given candle history.

pub mod config;
pub mod feed;
pub mod indicators;
pub mod order_flow;
pub mod series;
pub mod session;
pub mod signals;
pub mod types;

// Re-export commonly used types
pub use config::{DetectorConfig, IndicatorConfig, ScoreWeights, SessionConfig};
pub use feed::{run_feed, FeedEvent};
pub use indicators::compute_indicators;
pub use order_flow::analyze_order_flow;
pub use session::{RefetchTicket, SessionManager, SubscriberRegistry, SubscriptionId};
pub use signals::detect_signals;
pub use types::{
    AdvancedMetrics, Candle, ChartSignal, CvdDivergence, IndicatorSnapshot, MarketState,
    MarketStructure, OrderFlowMetrics, SignalBias, SignalKind, SignalReason, StopHunt, Timeframe,
    VpaStatus,
};
