use std::future::Future;

use log::{info, warn};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};

#[derive(Debug)]
pub enum PeriodicEvent {
    /// Run the job now, without waiting for the next tick.
    RunNow,
    Stop,
}

/// Spawns a task running `job` every `period`, first run immediately.
/// The task ends on [`PeriodicEvent::Stop`], when every sender is dropped,
/// or on Ctrl-C. A run is never interrupted; the stop takes effect between
/// runs. The handle resolves to the number of completed runs.
pub fn spawn_periodic_task<F, Fut>(
    period: Duration,
    mut job: F,
) -> (mpsc::Sender<PeriodicEvent>, tokio::task::JoinHandle<u64>)
where
    F: FnMut(u64) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let (tx, mut rx) = mpsc::channel::<PeriodicEvent>(8);

    let handle = tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut runs = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = ticker.tick() => {}
                event = rx.recv() => match event {
                    Some(PeriodicEvent::RunNow) => {}
                    Some(PeriodicEvent::Stop) | None => {
                        info!("Stopping periodic task after {} runs", runs);
                        break;
                    }
                },
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        warn!("Failed to listen for Ctrl-C: {}", e);
                    }
                    info!("Received Ctrl-C");
                    break;
                }
            }
            runs += 1;
            job(runs).await;
        }
        runs
    });

    (tx, handle)
}
