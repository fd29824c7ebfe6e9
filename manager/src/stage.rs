use anyhow::{Context, Result};
use common::{Stage, Task, TaskId};
use glob::{glob, Pattern};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use tracing::warn;

/// Ancho del sufijo numérico de partición en los archivos intermedios,
/// ej: "maptask00001-part00002" -> partición 2
pub const PARTITION_SUFFIX_WIDTH: usize = 5;

/// Archivos regulares dentro de `dir`, ordenados por nombre.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        anyhow::bail!("{} no es un directorio", dir.display());
    }

    let pattern = format!("{}/*", Pattern::escape(&dir.to_string_lossy()));
    let mut files = Vec::new();

    for entry in glob(&pattern).with_context(|| format!("patrón inválido {}", pattern))? {
        let path = entry.with_context(|| format!("no se pudo leer {}", dir.display()))?;
        if path.is_file() {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// El archivo en la posición i (ya ordenado) va al bucket i mod num_mappers.
/// Siempre devuelve `num_mappers` tareas, aunque alguna quede vacía.
pub fn partition_map_inputs(files: &[PathBuf], num_mappers: u32) -> Vec<Task> {
    let mut buckets: Vec<Vec<PathBuf>> = vec![Vec::new(); num_mappers as usize];

    if num_mappers > 0 {
        for (i, file) in files.iter().enumerate() {
            buckets[i % num_mappers as usize].push(file.clone());
        }
    }

    buckets
        .into_iter()
        .enumerate()
        .map(|(bucket, inputs)| Task::new(bucket as TaskId, Stage::Mapping, inputs))
        .collect()
}

/// Número de partición según el sufijo fijo del nombre del archivo
pub fn partition_number(file_name: &str) -> Option<u32> {
    let start = file_name.len().checked_sub(PARTITION_SUFFIX_WIDTH)?;
    let suffix = file_name.get(start..)?;

    if !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

/// Agrupa los archivos intermedios (ordenados) por partición.
/// Hay una tarea por cada partición 0..num_reducers, tenga o no archivos.
pub fn partition_reduce_inputs(files: &[PathBuf], num_reducers: u32) -> Vec<Task> {
    let mut groups: Vec<Vec<PathBuf>> = vec![Vec::new(); num_reducers as usize];

    for file in files {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        match partition_number(&name) {
            Some(p) if p < num_reducers => groups[p as usize].push(file.clone()),
            Some(p) => warn!(
                "archivo intermedio {} apunta a la partición {} pero sólo hay {} reducers, se ignora",
                file.display(),
                p,
                num_reducers
            ),
            None => warn!(
                "archivo intermedio {} sin sufijo de partición, se ignora",
                file.display()
            ),
        }
    }

    groups
        .into_iter()
        .enumerate()
        .map(|(p, inputs)| Task::new(p as TaskId, Stage::Reducing, inputs))
        .collect()
}

/// Definición original de las tareas de una etapa, tomada antes de asignar nada.
/// Sólo se lee, para recuperar tareas de workers muertos.
#[derive(Debug, Clone)]
pub struct StageSnapshot {
    stage: Stage,
    tasks: BTreeMap<TaskId, Vec<PathBuf>>,
}

impl StageSnapshot {
    pub fn capture(stage: Stage, tasks: &[Task]) -> Self {
        Self {
            stage,
            tasks: tasks
                .iter()
                .map(|t| (t.task_id, t.input_paths.clone()))
                .collect(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Tarea nueva con la lista de entradas original
    pub fn task(&self, task_id: TaskId) -> Option<Task> {
        self.tasks
            .get(&task_id)
            .map(|inputs| Task::new(task_id, self.stage, inputs.clone()))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
