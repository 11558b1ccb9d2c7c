mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "lifeos")]
#[command(about = "Personal assistant message orchestration backend", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway (long-running daemon)
    Serve {
        /// Port to listen on (overrides config gateway.port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides config gateway.host)
        #[arg(long)]
        host: Option<String>,
    },

    /// Send one message through the pipeline and print the reply
    Chat {
        /// Message text
        message: String,

        /// Existing session ID (a new session is created if omitted)
        #[arg(short, long)]
        session: Option<String>,

        /// Route to a specific agent instead of classifying
        #[arg(short, long)]
        agent: Option<String>,

        /// User ID recorded on the session and audit trail
        #[arg(short, long)]
        user: Option<String>,
    },

    /// List known sessions
    Sessions {
        /// Filter by user ID
        #[arg(short, long)]
        user: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Serve { port, host } => {
            commands::serve::run(host, port).await?;
        }
        Commands::Chat {
            message,
            session,
            agent,
            user,
        } => {
            commands::chat::run(message, session, agent, user).await?;
        }
        Commands::Sessions { user } => {
            commands::sessions::run(user).await?;
        }
    }

    Ok(())
}
