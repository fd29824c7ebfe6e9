use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::path::PathBuf;

pub type JobId = u64;

/// Lo que manda el cliente en un `new_manager_job`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Directorio con los archivos de entrada, ej: "/data/input"
    pub input_directory: PathBuf,

    /// Directorio final de salida; se borra y se recrea al arrancar el job
    pub output_directory: PathBuf,

    pub mapper_executable: PathBuf,
    pub reducer_executable: PathBuf,

    pub num_mappers: u32,
    pub num_reducers: u32,
}

/// Job ya aceptado por el manager. Inmutable una vez creado.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,

    #[serde(flatten)]
    pub request: JobRequest,

    pub submitted_at: DateTime<Utc>,
}

impl Job {
    pub fn new(job_id: JobId, request: JobRequest) -> Self {
        Self {
            job_id,
            request,
            submitted_at: Utc::now(),
        }
    }

    /// Cantidad total de tareas (map + reduce) que deben reportar `finished`
    pub fn total_tasks(&self) -> u64 {
        u64::from(self.request.num_mappers) + u64::from(self.request.num_reducers)
    }
}
