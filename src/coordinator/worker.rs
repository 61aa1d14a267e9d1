use super::service::Inner;
use crate::position::PositionUpdate;
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Reasons to run a validation pass
#[derive(Debug)]
pub(super) enum Trigger {
    Update(PositionUpdate),
    Tick,
    GeofenceChanged,
}

enum Event {
    Trigger(Trigger),
    WatchClosed,
    Cancelled,
}

async fn next_update(
    updates: &mut Option<mpsc::UnboundedReceiver<PositionUpdate>>,
) -> Option<PositionUpdate> {
    match updates {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

/// Single consumer of watch updates, control triggers and the backup timer.
///
/// Triggers are handled one at a time in arrival order; the timer has the
/// lowest priority so a queued watch update always goes first.
pub(super) async fn run(
    inner: Weak<Inner>,
    generation: u64,
    mut updates: Option<mpsc::UnboundedReceiver<PositionUpdate>>,
    mut triggers: mpsc::UnboundedReceiver<Trigger>,
    cancel: CancellationToken,
    period: Duration,
) {
    // First tick completes immediately and performs the initial validation
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => Event::Cancelled,
            Some(trigger) = triggers.recv() => Event::Trigger(trigger),
            update = next_update(&mut updates) => match update {
                Some(update) => Event::Trigger(Trigger::Update(update)),
                None => Event::WatchClosed,
            },
            _ = ticker.tick() => Event::Trigger(Trigger::Tick),
        };

        let trigger = match event {
            Event::Cancelled => break,
            Event::WatchClosed => {
                warn!("Position watch closed, continuing on the revalidation timer");
                updates = None;
                continue;
            }
            Event::Trigger(trigger) => trigger,
        };

        let Some(inner) = inner.upgrade() else {
            break;
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = inner.handle(generation, trigger) => {}
        }
    }

    debug!("Validation worker of session {} exited", generation);
}
