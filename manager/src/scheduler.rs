//! Actor dueño de todo el estado mutable del manager. Los listeners y el
//! monitor le hablan sólo por el canal de eventos; él arranca jobs, cambia
//! de etapa, despacha tareas y coordina el apagado.

use std::time::Instant;

use common::{net, JobRequest, Message, TaskId, WorkerId};
use futures::future::join_all;
use tokio::{
    sync::{mpsc, oneshot},
    time::{interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ManagerConfig;
use crate::state::{Assignment, ManagerState};

#[derive(Debug)]
pub enum ManagerEvent {
    /// `ack` se completa cuando el registro ya quedó aplicado
    Register {
        worker: WorkerId,
        ack: oneshot::Sender<()>,
    },
    NewJob(JobRequest),
    Finished {
        worker: WorkerId,
        task_id: TaskId,
    },
    Heartbeat {
        worker: WorkerId,
        at: Instant,
    },
    Sweep {
        at: Instant,
    },
    /// `done` se completa cuando ya se avisó a todos los workers
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

pub struct Scheduler {
    state: ManagerState,
    config: ManagerConfig,
    events: mpsc::Receiver<ManagerEvent>,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(
        config: ManagerConfig,
        events: mpsc::Receiver<ManagerEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            state: ManagerState::new(config.shared_dir.clone()),
            config,
            events,
            shutdown,
        }
    }

    /// Loop principal del driver. Despacha después de cada evento, y además
    /// en un tick corto por si algún job quedó esperando.
    pub async fn run(mut self) {
        let mut tick = interval(self.config.dispatch_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                event = self.events.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => break,
                },
                _ = tick.tick() => {}
            }

            self.drive().await;
        }

        info!("scheduler detenido");
    }

    async fn handle(&mut self, event: ManagerEvent) {
        match event {
            ManagerEvent::Register { worker, ack } => {
                self.state.register_worker(&worker);
                let _ = ack.send(());
            }
            ManagerEvent::NewJob(request) => {
                if let Err(e) = self.state.submit_job(request) {
                    warn!("job rechazado: {}", e);
                }
            }
            ManagerEvent::Finished { worker, task_id } => {
                self.state.finished(&worker, task_id);
            }
            ManagerEvent::Heartbeat { worker, at } => {
                self.state.heartbeat(&worker, at);
            }
            ManagerEvent::Sweep { at } => {
                self.state.sweep(at, self.config.heartbeat_timeout);
            }
            ManagerEvent::Shutdown { done } => {
                self.shutdown_workers().await;
                self.shutdown.cancel();
                let _ = done.send(());
            }
        }
    }

    /// Avanza el job y manda las tareas asignadas. Si un worker no responde
    /// se marca DEAD, su tarea vuelve a la cola y se reintenta con otro.
    async fn drive(&mut self) {
        loop {
            self.state.advance();
            let assignments = self.state.dispatch();
            if assignments.is_empty() {
                return;
            }

            let timeout = self.config.io_timeout;
            let sends = assignments.iter().map(|a| async move {
                let res = net::send_message(&a.worker.addr(), &a.message, timeout).await;
                (a, res)
            });

            let mut any_failed = false;
            for (assignment, res) in join_all(sends).await {
                match res {
                    Ok(()) => log_assignment(assignment),
                    Err(e) => {
                        warn!(
                            "no se pudo mandar la tarea {} al worker {}: {}; marcando DEAD",
                            assignment.task.task_id, assignment.worker, e
                        );
                        self.state.mark_dead(&assignment.worker);
                        any_failed = true;
                    }
                }
            }

            if !any_failed {
                return;
            }
        }
    }

    async fn shutdown_workers(&mut self) {
        let live = self.state.shutdown();
        info!("apagando: avisando a {} workers", live.len());

        let timeout = self.config.io_timeout;
        let notices = live.iter().map(|worker| async move {
            match net::send_message(&worker.addr(), &Message::Shutdown, timeout).await {
                Ok(()) => debug!("shutdown enviado a {}", worker),
                Err(e) if e.is_unreachable() => debug!("worker {} ya no estaba: {}", worker, e),
                Err(e) => warn!("error avisando shutdown a {}: {}", worker, e),
            }
        });
        join_all(notices).await;
    }

    pub fn state(&self) -> &ManagerState {
        &self.state
    }
}

fn log_assignment(assignment: &Assignment) {
    info!(
        "tarea {} ({}, {} entradas) enviada al worker {}",
        assignment.task.task_id,
        assignment.task.stage,
        assignment.task.input_paths.len(),
        assignment.worker
    );
}
