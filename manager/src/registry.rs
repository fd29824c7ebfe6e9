// manager/src/registry.rs

use common::{Stage, TaskId, WorkerId};
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Ready,
    Busy,
    Dead,
}

/// Tarea que un worker Busy tiene en vuelo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeldTask {
    pub task_id: TaskId,
    pub stage: Stage,
}

#[derive(Debug, Clone)]
pub struct WorkerMeta {
    pub status: WorkerStatus,
    /// Sólo es `Some` mientras el worker está Busy
    pub current: Option<HeldTask>,
    /// `None` = todavía no mandó ningún heartbeat
    pub last_heartbeat: Option<Instant>,
}

impl WorkerMeta {
    fn ready() -> Self {
        Self {
            status: WorkerStatus::Ready,
            current: None,
            last_heartbeat: None,
        }
    }
}

/// Resultado de un `register`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    New,
    /// Estaba Dead; su tarea ya fue recuperada por el monitor
    Revived,
    /// Estaba Busy: se reinició sin que lo detectáramos, hay que recuperar su tarea
    Restarted(HeldTask),
    /// Ya estaba Ready
    Repeated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    Unknown,
    Alive,
    Resurrected,
}

/// Registro de workers. Las identidades nunca se borran, sólo cambian de estado.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: HashMap<WorkerId, WorkerMeta>,
    // orden de registro, para desempatar entre workers Ready
    worker_order: Vec<WorkerId>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: &WorkerId) -> Registration {
        let Some(meta) = self.workers.get_mut(id) else {
            self.workers.insert(id.clone(), WorkerMeta::ready());
            self.worker_order.push(id.clone());
            return Registration::New;
        };

        let previous = meta.status;
        let held = meta.current.take();
        *meta = WorkerMeta::ready();

        match (previous, held) {
            (WorkerStatus::Busy, Some(task)) => Registration::Restarted(task),
            (WorkerStatus::Dead, _) => Registration::Revived,
            _ => Registration::Repeated,
        }
    }

    /// Sólo válido desde Ready.
    pub fn assign(&mut self, id: &WorkerId, task_id: TaskId, stage: Stage) -> bool {
        match self.workers.get_mut(id) {
            Some(meta) if meta.status == WorkerStatus::Ready => {
                meta.status = WorkerStatus::Busy;
                meta.current = Some(HeldTask { task_id, stage });
                true
            }
            _ => false,
        }
    }

    /// Sólo válido desde Busy y con la misma tarea que el worker tiene asignada.
    /// Devuelve la tarea completada, o `None` si el reporte es viejo o desconocido.
    pub fn complete(&mut self, id: &WorkerId, task_id: TaskId) -> Option<HeldTask> {
        let meta = self.workers.get_mut(id)?;
        if meta.status != WorkerStatus::Busy {
            return None;
        }
        match meta.current {
            Some(held) if held.task_id == task_id => {
                meta.status = WorkerStatus::Ready;
                meta.current = None;
                Some(held)
            }
            _ => None,
        }
    }

    /// Marca al worker como Dead. Si estaba Busy devuelve la tarea que hay que recuperar.
    pub fn mark_dead(&mut self, id: &WorkerId) -> Option<HeldTask> {
        let meta = self.workers.get_mut(id)?;
        let held = match meta.status {
            WorkerStatus::Busy => meta.current.take(),
            _ => None,
        };
        meta.status = WorkerStatus::Dead;
        meta.current = None;
        held
    }

    pub fn heartbeat(&mut self, id: &WorkerId, now: Instant) -> HeartbeatOutcome {
        let Some(meta) = self.workers.get_mut(id) else {
            return HeartbeatOutcome::Unknown;
        };
        meta.last_heartbeat = Some(now);

        if meta.status == WorkerStatus::Dead {
            // vuelve sin tarea: la suya ya se reencoló
            meta.status = WorkerStatus::Ready;
            meta.current = None;
            HeartbeatOutcome::Resurrected
        } else {
            HeartbeatOutcome::Alive
        }
    }

    /// Primer worker Ready en orden de registro
    pub fn first_ready(&self) -> Option<&WorkerId> {
        self.worker_order.iter().find(|id| {
            self.workers
                .get(*id)
                .is_some_and(|m| m.status == WorkerStatus::Ready)
        })
    }

    /// Workers vivos cuyo último heartbeat es más viejo que `timeout`.
    /// Sin heartbeat registrado todavía no toca chequearlos.
    pub fn overdue(&self, now: Instant, timeout: Duration) -> Vec<WorkerId> {
        self.worker_order
            .iter()
            .filter(|id| match self.workers.get(*id) {
                Some(meta) if meta.status != WorkerStatus::Dead => meta
                    .last_heartbeat
                    .is_some_and(|hb| now.saturating_duration_since(hb) > timeout),
                _ => false,
            })
            .cloned()
            .collect()
    }

    /// Workers que no están Dead, en orden de registro
    pub fn live_workers(&self) -> Vec<WorkerId> {
        self.worker_order
            .iter()
            .filter(|id| {
                self.workers
                    .get(*id)
                    .is_some_and(|m| m.status != WorkerStatus::Dead)
            })
            .cloned()
            .collect()
    }

    /// Workers Busy que dicen tener esta tarea
    pub fn holders_of(&self, stage: Stage, task_id: TaskId) -> Vec<WorkerId> {
        let wanted = Some(HeldTask { task_id, stage });
        self.worker_order
            .iter()
            .filter(|id| {
                self.workers
                    .get(*id)
                    .is_some_and(|m| m.status == WorkerStatus::Busy && m.current == wanted)
            })
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &WorkerId) -> Option<&WorkerMeta> {
        self.workers.get(id)
    }

    pub fn contains(&self, id: &WorkerId) -> bool {
        self.workers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.worker_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.worker_order.is_empty()
    }
}
