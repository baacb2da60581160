use clap::Parser;
use std::env;
use tracing_subscriber::EnvFilter;

use sparplan::api::{Cli, run_http_server, run_simulation};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    let raw_args: Vec<String> = env::args().collect();
    match raw_args.get(1).map(|s| s.as_str()) {
        Some("serve") => {
            let port = raw_args
                .get(2)
                .and_then(|s| s.parse::<u16>().ok())
                .unwrap_or(8080);
            if let Err(e) = run_http_server(port).await {
                tracing::error!(error = %e, "server error");
                std::process::exit(1);
            }
        }
        Some("simulate") => {
            let cli = Cli::parse_from(&raw_args[1..]);
            match run_simulation(&cli) {
                Ok(response) => match serde_json::to_string_pretty(&response) {
                    Ok(json) => println!("{json}"),
                    Err(e) => {
                        tracing::error!(error = %e, "failed to serialize results");
                        std::process::exit(1);
                    }
                },
                Err(errors) => {
                    for error in &errors {
                        eprintln!("error: {error}");
                    }
                    std::process::exit(2);
                }
            }
        }
        _ => {
            eprintln!("Usage: sparplan serve [port] | sparplan simulate [flags]");
            std::process::exit(1);
        }
    }
}
