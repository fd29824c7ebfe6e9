use anyhow::Result;
use clap::{Parser, Subcommand};
use common::{net, JobRequest, Message};
use std::{path::PathBuf, time::Duration};

const IO_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "CLI simple para hablar con el manager")]
struct Cli {
    #[arg(long, env = "MAPREDUCE_MANAGER_HOST", default_value = "localhost")]
    host: String,

    #[arg(long, env = "MAPREDUCE_MANAGER_PORT", default_value_t = 6000)]
    port: u16,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Envía un job nuevo
    Submit {
        #[arg(long, short, default_value = "tests/testdata/input")]
        input: PathBuf,

        #[arg(long, short, default_value = "output")]
        output: PathBuf,

        #[arg(long, short, default_value = "tests/testdata/exec/wc_map.sh")]
        mapper: PathBuf,

        #[arg(long, short, default_value = "tests/testdata/exec/wc_reduce.sh")]
        reducer: PathBuf,

        #[arg(long, default_value_t = 2)]
        nmappers: u32,

        #[arg(long, default_value_t = 2)]
        nreducers: u32,
    },
    /// Apaga el manager y todos sus workers
    Shutdown,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let addr = format!("{}:{}", cli.host, cli.port);

    match cli.command {
        Commands::Submit {
            input,
            output,
            mapper,
            reducer,
            nmappers,
            nreducers,
        } => {
            let request = JobRequest {
                input_directory: input,
                output_directory: output,
                mapper_executable: mapper,
                reducer_executable: reducer,
                num_mappers: nmappers,
                num_reducers: nreducers,
            };
            println!("Enviando job a {}:", addr);
            println!("{}", serde_json::to_string_pretty(&request)?);

            net::send_message(&addr, &Message::NewManagerJob(request), IO_TIMEOUT).await?;
            println!("Job enviado");
        }
        Commands::Shutdown => {
            net::send_message(&addr, &Message::Shutdown, IO_TIMEOUT).await?;
            println!("Shutdown enviado a {}", addr);
        }
    }

    Ok(())
}
