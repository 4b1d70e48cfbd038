//! EmberKV server entry point: configuration, logging, listener setup, and
//! the accept loop.

use emberkv::connection::{handle_connection, ConnectionStats, SharedKeyspace};
use emberkv::storage::Keyspace;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpSocket};
use tokio::signal;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Server configuration.
struct Config {
    /// Address to bind to.
    address: String,
    /// Port to listen on.
    port: u16,
    /// Listen backlog.
    backlog: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: emberkv::DEFAULT_HOST.to_string(),
            port: emberkv::DEFAULT_PORT,
            backlog: 1024,
        }
    }
}

impl Config {
    /// Parse configuration overrides from command-line arguments.
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    config.address = take_value(&args, i, "--host");
                    i += 2;
                }
                "--port" | "-p" => {
                    config.port = take_value(&args, i, "--port").parse().unwrap_or_else(|_| {
                        eprintln!("Error: invalid port number");
                        std::process::exit(1);
                    });
                    i += 2;
                }
                "--backlog" => {
                    config.backlog =
                        take_value(&args, i, "--backlog").parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid backlog");
                            std::process::exit(1);
                        });
                    i += 2;
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("EmberKV version {}", emberkv::VERSION);
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {}", other);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    fn bind_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

fn take_value(args: &[String], i: usize, flag: &str) -> String {
    match args.get(i + 1) {
        Some(v) => v.clone(),
        None => {
            eprintln!("Error: {} requires a value", flag);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"EmberKV - an in-memory RESP key-value server

USAGE:
    emberkv [OPTIONS]

OPTIONS:
    -h, --host <HOST>        Address to bind to (default: 0.0.0.0)
    -p, --port <PORT>        Port to listen on (default: 6379)
        --backlog <N>        Listen backlog (default: 1024)
    -v, --version            Print version information
        --help               Print this help message

CONNECTING:
    Any RESP client works:
    $ redis-cli -p 6379
    127.0.0.1:6379> PING
    PONG
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args();

    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    // Shared state: one keyspace behind one mutex, counters for logging.
    let keyspace: SharedKeyspace = Arc::new(Mutex::new(Keyspace::new()));
    let stats = Arc::new(ConnectionStats::new());

    let listener = bind_listener(&config)?;
    info!(
        address = %config.bind_address(),
        version = emberkv::VERSION,
        "EmberKV listening"
    );

    let shutdown = async {
        signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
        info!("shutdown signal received, stopping server");
    };

    tokio::select! {
        _ = accept_loop(listener, keyspace, stats) => {}
        _ = shutdown => {}
    }

    info!("server shutdown complete");
    Ok(())
}

/// Binds the listening socket with `SO_REUSEADDR` and the configured
/// backlog. Failure here is fatal and surfaces as a non-zero exit.
fn bind_listener(config: &Config) -> anyhow::Result<TcpListener> {
    let addr: SocketAddr = config.bind_address().parse()?;
    let socket = TcpSocket::new_v4()?;
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    Ok(socket.listen(config.backlog)?)
}

/// Accepts connections forever, spawning one handler task each.
async fn accept_loop(
    listener: TcpListener,
    keyspace: SharedKeyspace,
    stats: Arc<ConnectionStats>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let keyspace = Arc::clone(&keyspace);
                let stats = Arc::clone(&stats);
                tokio::spawn(async move {
                    handle_connection(stream, addr, keyspace, stats).await;
                });
            }
            Err(e) => {
                error!(error = %e, "failed to accept connection");
            }
        }
    }
}
