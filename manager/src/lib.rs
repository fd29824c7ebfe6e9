pub mod config;
pub mod handlers;
pub mod heartbeat;
pub mod jobs;
pub mod monitor;
pub mod registry;
pub mod scheduler;
pub mod stage;
pub mod state;

use std::net::SocketAddr;

use anyhow::Context;
use futures::future::{join_all, select_all};
use tokio::{
    net::{TcpListener, UdpSocket},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub use config::ManagerConfig;
use scheduler::Scheduler;

const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Manager ya escuchando: canal de control (TCP) y heartbeats (UDP) en el
/// mismo host y puerto.
pub struct Manager {
    config: ManagerConfig,
    control: TcpListener,
    heartbeats: UdpSocket,
    shutdown: CancellationToken,
}

impl Manager {
    /// Único error fatal: no poder bindear los sockets
    pub async fn bind(config: ManagerConfig) -> anyhow::Result<Self> {
        let control = TcpListener::bind(config.bind_addr())
            .await
            .with_context(|| format!("no se pudo bindear TCP en {}", config.bind_addr()))?;
        let addr = control.local_addr()?;
        let heartbeats = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("no se pudo bindear UDP en {}", addr))?;

        Ok(Self {
            config,
            control,
            heartbeats,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.control.local_addr()
    }

    /// Cancelarlo apaga todos los loops sin avisar a los workers
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Corre los cuatro loops y espera a que terminen todos
    pub async fn run(self) -> anyhow::Result<()> {
        info!(
            "manager arrancando en {} (shared_dir={})",
            self.local_addr()?,
            self.config.shared_dir.display()
        );

        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let scheduler = Scheduler::new(self.config.clone(), events_rx, self.shutdown.clone());

        let loops = vec![
            tokio::spawn(scheduler.run()),
            tokio::spawn(handlers::run_control_listener(
                self.control,
                events_tx.clone(),
                self.shutdown.clone(),
                self.config.io_timeout,
            )),
            tokio::spawn(heartbeat::run_heartbeat_listener(
                self.heartbeats,
                events_tx.clone(),
                self.shutdown.clone(),
            )),
            tokio::spawn(monitor::run_fault_monitor(
                events_tx,
                self.config.sweep_interval,
                self.shutdown.clone(),
            )),
        ];

        supervise(loops, &self.shutdown).await?;

        info!("manager apagado");
        Ok(())
    }
}

/// Espera al primer loop que termine y cancela el resto, así un loop caído
/// no deja a los demás corriendo sin driver.
async fn supervise(loops: Vec<JoinHandle<()>>, shutdown: &CancellationToken) -> anyhow::Result<()> {
    if loops.is_empty() {
        return Ok(());
    }

    let (first, _, rest) = select_all(loops).await;
    if !shutdown.is_cancelled() {
        error!("un loop del manager terminó antes del apagado, cancelando el resto");
        shutdown.cancel();
    }

    let mut results = vec![first];
    results.extend(join_all(rest).await);
    for res in results {
        res.context("un loop del manager terminó con panic")?;
    }
    Ok(())
}
