//! CLI entrypoint. The launcher CLI described in spec §1/§6 (worktree
//! creation, terminal spawning, persona templating) is an external
//! collaborator; this binary only starts the coordination kernel.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use aiswarm_kernel::composition::Kernel;
use aiswarm_kernel::config::Config;
use aiswarm_kernel::logging;

#[derive(Parser)]
#[command(name = "aiswarm-kernel", about = "Coordination kernel for a local AI agent swarm")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server (stdio + HTTP transports).
    Serve {
        #[arg(long, env = "AISWARM_WORKING_DIRECTORY", default_value = ".")]
        working_directory: PathBuf,
        #[arg(long, env = "AISWARM_HTTP_PORT")]
        port: Option<u16>,
        #[arg(long, env = "AISWARM_EVENT_BUS_CAPACITY")]
        event_bus_capacity: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            working_directory,
            port,
            event_bus_capacity,
        } => {
            let mut config = Config::load(&working_directory)?;
            config.working_directory = working_directory;
            if let Some(port) = port {
                config.http.port = port;
            }
            if let Some(capacity) = event_bus_capacity {
                config.event_bus.capacity = capacity;
            }

            let kernel = Kernel::build(config).await?;
            kernel.run().await?;
        }
    }

    Ok(())
}
