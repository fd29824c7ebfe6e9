use std::path::PathBuf;
use std::time::Duration;

/// Tiempo máximo sin heartbeat antes de declarar muerto a un worker
pub const WORKER_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(10);
/// Cada cuánto corre el barrido del monitor de fallos
pub const FAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(100);
/// Tick de respaldo del driver, además del despacho por eventos
pub const DISPATCH_INTERVAL: Duration = Duration::from_millis(100);
/// Timeout de cada lectura/escritura/conexión de socket
pub const SOCKET_IO_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub host: String,
    pub port: u16,

    /// Raíz para los directorios intermedios de cada job
    pub shared_dir: PathBuf,

    pub heartbeat_timeout: Duration,
    pub sweep_interval: Duration,
    pub dispatch_interval: Duration,
    pub io_timeout: Duration,
}

impl ManagerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            shared_dir: std::env::temp_dir(),
            heartbeat_timeout: WORKER_HEARTBEAT_TIMEOUT,
            sweep_interval: FAULT_SWEEP_INTERVAL,
            dispatch_interval: DISPATCH_INTERVAL,
            io_timeout: SOCKET_IO_TIMEOUT,
        }
    }

    pub fn with_shared_dir(mut self, shared_dir: impl Into<PathBuf>) -> Self {
        self.shared_dir = shared_dir.into();
        self
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::new("localhost", 6000)
    }
}
