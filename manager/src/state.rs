// manager/src/state.rs

use chrono::Utc;
use common::{
    Job, JobId, JobRequest, MapTaskMessage, Message, ReduceTaskMessage, Stage, Task, TaskId,
    WorkerId,
};
use std::{
    collections::VecDeque,
    fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use tempfile::TempDir;
use tracing::{debug, error, info, warn};

use crate::jobs::JobQueue;
use crate::registry::{HeartbeatOutcome, HeldTask, Registration, WorkerRegistry};
use crate::stage::{self, StageSnapshot};

/// Cuántos `finished` llegaron para el job activo, y en qué etapa está
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageProgress {
    pub stage: Stage,
    pub finished: u32,
}

/// El único job en ejecución
#[derive(Debug)]
pub struct ActiveJob {
    pub job: Job,
    pub progress: StageProgress,
    snapshot: StageSnapshot,
    // directorio intermedio privado del job; se borra al soltarlo
    workdir: TempDir,
}

impl ActiveJob {
    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }
}

/// Tarea ya marcada como asignada en el registro, lista para mandar al worker
#[derive(Debug, Clone)]
pub struct Assignment {
    pub worker: WorkerId,
    pub task: Task,
    pub message: Message,
}

/// Estado completo del manager. Tiene un único dueño (el scheduler), y todas
/// las mutaciones pasan por estos métodos.
#[derive(Debug)]
pub struct ManagerState {
    registry: WorkerRegistry,
    jobs: JobQueue,
    active: Option<ActiveJob>,
    // tareas pendientes de asignar en la etapa actual
    pending: VecDeque<Task>,
    shared_dir: PathBuf,
    shutting_down: bool,
}

impl ManagerState {
    pub fn new(shared_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry: WorkerRegistry::new(),
            jobs: JobQueue::new(),
            active: None,
            pending: VecDeque::new(),
            shared_dir: shared_dir.into(),
            shutting_down: false,
        }
    }

    /* ---------------- workers ---------------- */

    pub fn register_worker(&mut self, id: &WorkerId) -> Registration {
        let outcome = self.registry.register(id);
        match outcome {
            Registration::New => info!("worker registrado: {}", id),
            Registration::Revived => info!("worker {} volvió a registrarse tras estar DEAD", id),
            Registration::Restarted(held) => {
                warn!(
                    "worker {} se re-registró estando BUSY con la tarea {} ({}), se recupera",
                    id, held.task_id, held.stage
                );
                self.recover(id, held);
            }
            Registration::Repeated => debug!("worker {} ya estaba registrado", id),
        }
        outcome
    }

    pub fn heartbeat(&mut self, id: &WorkerId, now: Instant) -> HeartbeatOutcome {
        let outcome = self.registry.heartbeat(id, now);
        match outcome {
            HeartbeatOutcome::Unknown => debug!("heartbeat de worker desconocido {}, se ignora", id),
            HeartbeatOutcome::Resurrected => info!("worker {} revivió por heartbeat", id),
            HeartbeatOutcome::Alive => {}
        }
        outcome
    }

    /// Un worker reporta que terminó. Devuelve false si el reporte se ignoró.
    pub fn finished(&mut self, id: &WorkerId, task_id: TaskId) -> bool {
        let Some(held) = self.registry.complete(id, task_id) else {
            debug!(
                "finished de {} para la tarea {} ignorado (no está BUSY con esa tarea)",
                id, task_id
            );
            return false;
        };

        match self.active.as_mut() {
            Some(active) => {
                active.progress.finished += 1;
                info!(
                    "worker {} terminó la tarea {} ({}) del job {} ({}/{})",
                    id,
                    held.task_id,
                    held.stage,
                    active.job.job_id,
                    active.progress.finished,
                    active.job.total_tasks()
                );
            }
            None => warn!("finished de {} sin job activo", id),
        }
        true
    }

    /// Marca al worker como muerto y reencola su tarea si tenía una
    pub fn mark_dead(&mut self, id: &WorkerId) -> Option<HeldTask> {
        let held = self.registry.mark_dead(id);
        if let Some(held) = held {
            self.recover(id, held);
        }
        held
    }

    /// Una pasada del monitor de fallos: declara muertos a los que no
    /// mandan heartbeat hace más de `timeout`.
    pub fn sweep(&mut self, now: Instant, timeout: Duration) -> Vec<WorkerId> {
        let overdue = self.registry.overdue(now, timeout);
        for id in &overdue {
            warn!("marcando worker {} como DEAD (sin heartbeat hace más de {:?})", id, timeout);
            self.mark_dead(id);
        }
        overdue
    }

    /// Vuelve a poner la tarea al final de la cola, con las entradas originales
    /// del snapshot de la etapa.
    fn recover(&mut self, id: &WorkerId, held: HeldTask) {
        let task = self
            .active
            .as_ref()
            .filter(|active| active.snapshot.stage() == held.stage)
            .and_then(|active| active.snapshot.task(held.task_id));

        match task {
            Some(task) => {
                info!(
                    "reencolando tarea {} ({}) por caída del worker {}",
                    task.task_id, task.stage, id
                );
                self.pending.push_back(task);
            }
            None => warn!(
                "tarea {} ({}) del worker {} no pertenece a la etapa activa, no se reencola",
                held.task_id, held.stage, id
            ),
        }
    }

    /* ---------------- jobs y etapas ---------------- */

    pub fn submit_job(&mut self, request: JobRequest) -> Result<JobId, String> {
        let job_id = self.jobs.submit(request)?;
        info!("job {} encolado ({} en cola)", job_id, self.jobs.len());
        Ok(job_id)
    }

    /// Avanza el job activo: arranca el siguiente de la cola, pasa de Mapping
    /// a Reducing, o da el job por terminado.
    pub fn advance(&mut self) {
        if self.shutting_down {
            return;
        }

        if let Some(active) = self.active.as_ref() {
            let StageProgress { stage, finished } = active.progress;
            let job_id = active.job.job_id;
            let maps_done = finished >= active.job.request.num_mappers;
            let all_done = u64::from(finished) >= active.job.total_tasks();

            if stage == Stage::Mapping && maps_done {
                if let Err(e) = self.start_reduce_stage() {
                    error!("job {} abortado al armar la etapa reduce: {:#}", job_id, e);
                    self.abandon_job();
                }
            } else if stage == Stage::Reducing && all_done {
                self.finish_job();
            }
        }

        if self.active.is_none() {
            while let Some(job) = self.jobs.pop() {
                let job_id = job.job_id;
                match self.start_job(job) {
                    Ok(()) => break,
                    Err(e) => error!("no se pudo arrancar el job {}, se descarta: {:#}", job_id, e),
                }
            }
        }
    }

    fn start_job(&mut self, job: Job) -> anyhow::Result<()> {
        let request = &job.request;
        info!("arrancando job {}", job.job_id);

        let inputs = stage::list_files(&request.input_directory)?;

        // borrar y recrear el directorio de salida
        if request.output_directory.exists() {
            fs::remove_dir_all(&request.output_directory)?;
            info!("borrado directorio de salida {}", request.output_directory.display());
        }
        fs::create_dir_all(&request.output_directory)?;

        fs::create_dir_all(&self.shared_dir)?;
        let workdir = tempfile::Builder::new()
            .prefix(&format!("mapreduce-shared-job{:05}-", job.job_id))
            .tempdir_in(&self.shared_dir)?;
        info!("creado directorio intermedio {}", workdir.path().display());

        let tasks = stage::partition_map_inputs(&inputs, request.num_mappers);
        let snapshot = StageSnapshot::capture(Stage::Mapping, &tasks);
        info!(
            "job {}: {} archivos de entrada en {} tareas map",
            job.job_id,
            inputs.len(),
            tasks.len()
        );

        self.pending = tasks.into();
        self.active = Some(ActiveJob {
            job,
            progress: StageProgress {
                stage: Stage::Mapping,
                finished: 0,
            },
            snapshot,
            workdir,
        });
        Ok(())
    }

    fn start_reduce_stage(&mut self) -> anyhow::Result<()> {
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };

        let intermediate = stage::list_files(active.workdir.path())?;
        let tasks = stage::partition_reduce_inputs(&intermediate, active.job.request.num_reducers);
        info!(
            "job {}: etapa map completa, {} archivos intermedios en {} tareas reduce",
            active.job.job_id,
            intermediate.len(),
            tasks.len()
        );

        // el snapshot de map ya no hace falta
        active.snapshot = StageSnapshot::capture(Stage::Reducing, &tasks);
        active.progress.stage = Stage::Reducing;
        self.pending = tasks.into();
        Ok(())
    }

    fn finish_job(&mut self) {
        if let Some(active) = self.active.take() {
            let elapsed = Utc::now() - active.job.submitted_at;
            info!(
                "job {} terminado en {} ms, limpiando {}",
                active.job.job_id,
                elapsed.num_milliseconds(),
                active.workdir.path().display()
            );
        }
        self.pending.clear();
    }

    fn abandon_job(&mut self) {
        self.active = None;
        self.pending.clear();
    }

    /// Ofrece la cabeza de la cola al primer worker Ready (en orden de
    /// registro) mientras haya tareas y workers libres.
    pub fn dispatch(&mut self) -> Vec<Assignment> {
        let mut out = Vec::new();
        if self.shutting_down {
            return out;
        }
        let Some(active) = self.active.as_ref() else {
            return out;
        };

        while !self.pending.is_empty() {
            let Some(worker) = self.registry.first_ready().cloned() else {
                break;
            };
            let Some(task) = self.pending.pop_front() else {
                break;
            };

            if !self.registry.assign(&worker, task.task_id, task.stage) {
                self.pending.push_front(task);
                break;
            }

            let message = task_message(active, &task);
            debug!(
                "asignando tarea {} ({}) del job {} al worker {}",
                task.task_id, task.stage, active.job.job_id, worker
            );
            out.push(Assignment {
                worker,
                task,
                message,
            });
        }
        out
    }

    /// Empieza el apagado: marca Dead a todos los vivos y los devuelve para
    /// avisarles.
    pub fn shutdown(&mut self) -> Vec<WorkerId> {
        self.shutting_down = true;
        let live = self.registry.live_workers();
        for id in &live {
            self.mark_dead(id);
        }
        live
    }

    /* ---------------- lectura ---------------- */

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    pub fn pending(&self) -> impl Iterator<Item = &Task> {
        self.pending.iter()
    }

    pub fn active(&self) -> Option<&ActiveJob> {
        self.active.as_ref()
    }

    pub fn queued_jobs(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }
}

fn task_message(active: &ActiveJob, task: &Task) -> Message {
    let request = &active.job.request;
    match task.stage {
        Stage::Mapping => Message::NewMapTask(MapTaskMessage {
            task_id: task.task_id,
            input_paths: task.input_paths.clone(),
            executable: request.mapper_executable.clone(),
            output_directory: active.workdir().to_path_buf(),
            num_partitions: request.num_reducers,
        }),
        Stage::Reducing => Message::NewReduceTask(ReduceTaskMessage {
            task_id: task.task_id,
            executable: request.reducer_executable.clone(),
            input_paths: task.input_paths.clone(),
            output_directory: request.output_directory.clone(),
        }),
    }
}
