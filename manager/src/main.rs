use std::{fs::File, path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use manager::{Manager, ManagerConfig};

#[derive(Parser)]
#[command(name = "manager")]
#[command(about = "Coordinador MapReduce: recibe jobs y reparte tareas a los workers")]
struct Cli {
    #[arg(long, env = "MAPREDUCE_MANAGER_HOST", default_value = "localhost")]
    host: String,

    #[arg(long, env = "MAPREDUCE_MANAGER_PORT", default_value_t = 6000)]
    port: u16,

    /// Archivo de log; si no se indica se escribe en stderr
    #[arg(long, env = "MAPREDUCE_MANAGER_LOGFILE")]
    logfile: Option<PathBuf>,

    /// Nivel o filtro de tracing, ej: "info" o "manager=debug"
    #[arg(long, env = "MAPREDUCE_MANAGER_LOGLEVEL", default_value = "info")]
    loglevel: String,

    /// Raíz para los directorios intermedios de cada job
    #[arg(long, env = "MAPREDUCE_MANAGER_SHARED_DIR")]
    shared_dir: Option<PathBuf>,
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(&cli.loglevel)
        .with_context(|| format!("nivel de log inválido: {}", cli.loglevel))?;

    match &cli.logfile {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("no se pudo abrir {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Arc::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let mut config = ManagerConfig::new(cli.host.clone(), cli.port);
    if let Some(dir) = &cli.shared_dir {
        config = config.with_shared_dir(dir);
    }

    let manager = Manager::bind(config).await?;
    manager.run().await
}
