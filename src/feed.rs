//! Feed event driver.
//!
//! The external feed connection lives in the host; this driver consumes its
//! events over a channel and applies them to a [`SessionManager`] it owns.
//! One receiver, one owner: the sequential loop is what guarantees the
//! single-writer model for all per-pair state.

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::session::{RefetchTicket, SessionManager};
use crate::types::Candle;

/// An event from the external market-data feed.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// Bulk historical backfill, ordered oldest to newest, carrying the
    /// refetch ticket that requested it.
    Backfill {
        pair: String,
        ticket: RefetchTicket,
        candles: Vec<Candle>,
        taker_buy_volumes: Vec<f64>,
    },
    /// Incremental live update for the currently open (or a newly opened)
    /// bar.
    Tick {
        pair: String,
        candle: Candle,
        taker_buy_volume: f64,
    },
}

/// Drive a session manager from a feed channel until the sender side closes.
///
/// Returns the manager so the host can keep reading cached state after the
/// stream ends.
pub async fn run_feed(
    mut manager: SessionManager,
    mut events: mpsc::Receiver<FeedEvent>,
) -> Result<SessionManager> {
    info!("feed driver started");
    while let Some(event) = events.recv().await {
        match event {
            FeedEvent::Backfill {
                pair,
                ticket,
                candles,
                taker_buy_volumes,
            } => {
                let applied =
                    manager.apply_backfill(&pair, ticket, candles, &taker_buy_volumes);
                if !applied {
                    debug!(pair, "backfill superseded, dropped");
                }
            }
            FeedEvent::Tick {
                pair,
                candle,
                taker_buy_volume,
            } => {
                manager.apply_tick(&pair, candle, taker_buy_volume);
            }
        }
    }
    info!("feed channel closed, driver stopping");
    Ok(manager)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::types::Timeframe;

    fn candle(i: usize) -> Candle {
        let open = 100.0 + i as f64;
        Candle {
            time: i as i64 * 60_000,
            open,
            high: open + 1.0,
            low: open,
            close: open + 1.0,
            volume: 1000.0,
        }
    }

    #[tokio::test]
    async fn driver_applies_backfill_then_ticks() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("sniper_core=debug")
            .try_init();

        let manager = SessionManager::new(SessionConfig::default(), Timeframe::M1);
        let ticket = manager.refetch_ticket();
        let (tx, rx) = mpsc::channel(16);
        let handle = tokio::spawn(run_feed(manager, rx));

        tx.send(FeedEvent::Backfill {
            pair: "BTC/USDT".into(),
            ticket,
            candles: (0..30).map(candle).collect(),
            taker_buy_volumes: vec![700.0; 30],
        })
        .await
        .unwrap();
        for i in 30..33 {
            tx.send(FeedEvent::Tick {
                pair: "BTC/USDT".into(),
                candle: candle(i),
                taker_buy_volume: 700.0,
            })
            .await
            .unwrap();
        }
        drop(tx);

        let manager = handle.await.unwrap().unwrap();
        let state = manager.market_state("BTC/USDT").expect("state cached");
        assert_eq!(state.candles.len(), 33);
        assert!(state.is_realtime);
    }
}
