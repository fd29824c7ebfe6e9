use serde::{Deserialize, Serialize};
use std::fmt;

/// Identidad de un worker: el par (host, puerto) donde escucha sus tareas.
/// Nunca cambia y nunca se borra del registro una vez visto.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId {
    pub host: String,
    pub port: u16,
}

impl WorkerId {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Dirección "host:puerto" para abrir conexiones hacia el worker
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
