//! Diagnostics - logs every bridge event and a periodic statistics line.

use defmt::{debug, info, warn};
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pubsub::WaitResult;
use embassy_time::{Duration, Ticker};

use usbnet::bridge::{BridgeEvent, EventSubscriber, StatsSnapshot};
use usbnet::config::STATS_LOG_PERIOD_SECS;

use crate::Adapter;

pub type Events = EventSubscriber<'static, CriticalSectionRawMutex>;

fn log_event(event: BridgeEvent) {
    match event {
        BridgeEvent::LinkUp => info!("network: link up"),
        BridgeEvent::LinkDown => info!("network: link down"),
        BridgeEvent::AddressAcquired(addressing) => info!("network: address {}", addressing),
        BridgeEvent::Congested => debug!("network: frame dropped, queue full"),
        BridgeEvent::MalformedFrame => debug!("network: frame dropped, malformed"),
    }
}

fn log_stats(stats: &StatsSnapshot) {
    info!(
        "stats: rx {} tx {} busy {} dropped {}",
        stats.rx_frames,
        stats.tx_frames,
        stats.tx_busy_retries,
        stats.total_dropped()
    );
}

pub async fn run(mut events: Events, adapter: &'static Adapter) -> ! {
    let mut ticker = Ticker::every(Duration::from_secs(STATS_LOG_PERIOD_SECS));
    let mut last = StatsSnapshot::default();
    loop {
        match select(events.next_message(), ticker.next()).await {
            Either::First(WaitResult::Message(event)) => log_event(event),
            Either::First(WaitResult::Lagged(missed)) => {
                warn!("diagnostics: missed {} events", missed)
            }
            Either::Second(()) => {
                // Quiet while nothing moves.
                let stats = adapter.stats();
                if stats != last {
                    log_stats(&stats);
                    last = stats;
                }
            }
        }
    }
}
