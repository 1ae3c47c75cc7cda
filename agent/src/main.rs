mod handler;
mod io;
mod protocol;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_usage() {
    eprintln!("Usage: pimark-agent --stdio");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --stdio     Run in stdio mode (NDJSON over stdin/stdout)");
    eprintln!("  --version   Print version and exit");
    eprintln!("  --help      Print this help message");
}

/// Cancel `shutdown` on Ctrl-C or SIGTERM.
fn spawn_signal_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C"),
                        _ = term.recv() => info!("Received SIGTERM"),
                    }
                }
                Err(e) => {
                    warn!("Cannot listen for SIGTERM: {e}");
                    let _ = tokio::signal::ctrl_c().await;
                    info!("Received Ctrl-C");
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl-C");
        }
        shutdown.cancel();
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    match args[1].as_str() {
        "--version" => {
            println!("pimark-agent {}", VERSION);
            Ok(())
        }
        "--help" => {
            print_usage();
            Ok(())
        }
        "--stdio" => {
            // Configure tracing to stderr so it doesn't interfere with the protocol on stdout
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new("info")),
                )
                .with_writer(std::io::stderr)
                .init();

            info!("pimark-agent {} starting in stdio mode", VERSION);
            let shutdown = CancellationToken::new();
            spawn_signal_listener(shutdown.clone());
            let result = io::stdio::run_stdio_loop(shutdown).await;
            if let Err(ref e) = result {
                error!("Stdio loop failed: {e:#}");
            }
            // A pending stdin read would otherwise keep the runtime alive
            std::process::exit(if result.is_ok() { 0 } else { 1 })
        }
        other => {
            eprintln!("Unknown option: {}", other);
            print_usage();
            std::process::exit(1);
        }
    }
}
