use clap::Parser;
use tracing_subscriber::EnvFilter;

use ctgov_mcp::cli::{Cli, Commands};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn exit_with(result: anyhow::Result<()>) -> std::process::ExitCode {
    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::ExitCode::from(1)
        }
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    init_tracing();

    let cli = Cli::parse();
    let timeout = cli.timeout;
    match cli.command {
        Commands::Mcp | Commands::Serve => exit_with(ctgov_mcp::mcp::run_stdio(timeout).await),
        Commands::ServeHttp { host, port } => {
            exit_with(ctgov_mcp::mcp::run_http(&host, port, timeout).await)
        }
        _ => match ctgov_mcp::cli::run(cli).await {
            Ok(output) => {
                println!("{output}");
                std::process::ExitCode::SUCCESS
            }
            Err(err) => {
                if let Some(ct_err) = err.downcast_ref::<ctgov_mcp::error::CtGovError>() {
                    eprintln!("Error [{}]: {ct_err}", ct_err.kind().as_str());
                } else {
                    eprintln!("Error: {err}");
                }
                std::process::ExitCode::from(1)
            }
        },
    }
}
