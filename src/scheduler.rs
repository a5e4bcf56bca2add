use std::time::Duration;

use async_trait::async_trait;
use tokio::{
    sync::watch,
    time::{Instant, MissedTickBehavior},
};

/// One unit of periodic work.
#[async_trait]
pub trait TickHandler: Send {
    /// Returns an extra pause to take before the next regular tick.
    async fn on_tick(&mut self) -> Option<Duration>;
}

// resolves once shutdown is requested, never if the sender is gone
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Drives `handler` every `period` until `shutdown` turns true, then hands it back.
///
/// Ticks never overlap: a tick running past its slot delays the next one, and missed
/// slots are not made up for. The first tick fires one full period after start.
pub async fn run<H: TickHandler>(
    period: Duration,
    mut handler: H,
    mut shutdown: watch::Receiver<bool>,
) -> H {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    log::info!("ticking every {}s", period.as_secs_f64());

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stopped(&mut shutdown) => break,
        }
        if *shutdown.borrow() {
            break;
        }

        let pause = tokio::select! {
            pause = handler.on_tick() => pause,
            _ = stopped(&mut shutdown) => {
                log::info!("abandoning tick in progress");
                break;
            }
        };

        if let Some(pause) = pause {
            log::info!("pausing {}s before the next tick", pause.as_secs_f64());
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = stopped(&mut shutdown) => break,
            }
            ticker.reset();
        }
    }

    log::info!("scheduler stopped");
    handler
}
