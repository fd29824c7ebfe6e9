use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Para Mapping es el índice de bucket; para Reducing, el número de partición.
pub type TaskId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Mapping,
    Reducing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Mapping => write!(f, "mapping"),
            Stage::Reducing => write!(f, "reducing"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub stage: Stage,

    /// Rutas de entrada, en orden
    pub input_paths: Vec<PathBuf>,
}

impl Task {
    pub fn new(task_id: TaskId, stage: Stage, input_paths: Vec<PathBuf>) -> Self {
        Self {
            task_id,
            stage,
            input_paths,
        }
    }
}
