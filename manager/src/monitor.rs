use std::time::{Duration, Instant};

use tokio::{
    sync::mpsc,
    time::{interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::scheduler::ManagerEvent;

/// Loop del monitor de fallos: cada `every` le pide al scheduler un barrido
/// del registro. El scheduler es quien marca muertos y reencola tareas.
pub async fn run_fault_monitor(
    events: mpsc::Sender<ManagerEvent>,
    every: Duration,
    shutdown: CancellationToken,
) {
    let mut tick = interval(every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tick.tick() => {
                let sweep = ManagerEvent::Sweep { at: Instant::now() };
                if events.send(sweep).await.is_err() {
                    break;
                }
            }
        }
    }

    info!("monitor de fallos detenido");
}
