use clap::Parser;
use coverage_audit::cli::{self, Args};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("coverage_audit=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let code = cli::execute(&args, std::io::stdout(), std::io::stderr()).await;
    ExitCode::from(code)
}
