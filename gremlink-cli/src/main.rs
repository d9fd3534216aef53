//! gremlink-cli - Command-line client for Gremlin Server
//!
//! Provides both a REPL and one-shot query execution.

mod commands;
mod repl;

use clap::{Parser, Subcommand};
use colored::Colorize;
use gremlink_client::{Client, DialOption, TlsClientConfig};
use gremlink_protocol::{ProtocolVersion, DEFAULT_PATH, DEFAULT_PORT};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gremlink-cli")]
#[command(about = "Command-line client for Gremlin Server")]
#[command(version)]
struct Cli {
    /// Server URL
    #[arg(short, long, default_value_t = default_server(), env = "GREMLINK_SERVER")]
    server: String,

    /// Username for SASL authentication
    #[arg(short, long, env = "GREMLINK_USERNAME")]
    username: Option<String>,

    /// Password for SASL authentication
    #[arg(short, long, env = "GREMLINK_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// GraphSON protocol version (2 or 3)
    #[arg(long, default_value = "3")]
    protocol: ProtocolVersion,

    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    timeout: u64,

    /// Print results with GraphSON type wrappers intact
    #[arg(long)]
    raw: bool,

    // ===== TLS Options =====
    /// Path to CA certificate for server verification
    #[arg(long, env = "GREMLINK_CA_CERT")]
    ca_cert: Option<PathBuf>,

    /// Path to client certificate (for mTLS)
    #[arg(long, env = "GREMLINK_CLIENT_CERT")]
    client_cert: Option<PathBuf>,

    /// Path to client private key (for mTLS)
    #[arg(long, env = "GREMLINK_CLIENT_KEY")]
    client_key: Option<PathBuf>,

    /// Skip server certificate verification (INSECURE)
    #[arg(long, short = 'k')]
    insecure: bool,

    /// Server name for TLS SNI (defaults to the URL host)
    #[arg(long)]
    server_name: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start interactive REPL
    Repl,

    /// Execute a Gremlin script
    Query {
        /// Script text (or @file.groovy to read from file)
        script: String,

        /// Parameter bindings as a JSON object (or @file.json)
        #[arg(short, long)]
        bindings: Option<String>,
    },

    /// Execute a counting script and print the count
    Count {
        /// Script text, e.g. "g.V().count()"
        script: String,
    },

    /// Execute a script returning vertices
    Vertices {
        script: String,
    },

    /// Execute a script returning edges
    Edges {
        script: String,
    },

    /// Add a vertex
    AddVertex {
        /// Vertex label
        label: String,

        /// Properties as key=value
        properties: Vec<String>,
    },

    /// Add an edge between two vertices
    AddEdge {
        /// Edge label
        label: String,

        /// Outgoing vertex id
        #[arg(long)]
        from: String,

        /// Incoming vertex id
        #[arg(long)]
        to: String,

        /// Properties as key=value
        properties: Vec<String>,
    },

    /// Drop a vertex by id
    DropVertex {
        id: String,
    },

    /// Drop an edge by id
    DropEdge {
        id: String,
    },
}

fn default_server() -> String {
    format!("ws://127.0.0.1:{}{}", DEFAULT_PORT, DEFAULT_PATH)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut options = vec![
        DialOption::ProtocolVersion(cli.protocol),
        DialOption::RequestTimeout(Duration::from_secs(cli.timeout)),
    ];

    match (&cli.username, &cli.password) {
        (Some(username), Some(password)) => {
            options.push(DialOption::credentials(username, password));
        }
        (None, None) => {}
        _ => {
            eprintln!(
                "{}: --username and --password must be used together",
                "Error".red()
            );
            std::process::exit(1);
        }
    }

    // Build TLS config if any TLS option is set
    if cli.ca_cert.is_some() || cli.client_cert.is_some() || cli.insecure {
        let mut tls = TlsClientConfig::new();
        tls.ca_cert_path = cli.ca_cert.clone();
        if let (Some(cert), Some(key)) = (&cli.client_cert, &cli.client_key) {
            tls = tls.with_client_cert(cert, key);
        } else if cli.client_cert.is_some() || cli.client_key.is_some() {
            eprintln!(
                "{}: --client-cert and --client-key must be used together",
                "Error".red()
            );
            std::process::exit(1);
        }
        tls.insecure = cli.insecure;
        tls.server_name = cli.server_name.clone();
        options.push(DialOption::Tls(tls));
    }

    tracing::debug!("Dialing {}", cli.server);
    let client = Client::dial(&cli.server, options).await.map_err(|e| {
        eprintln!("{}: {}", "Connection failed".red(), e);
        e
    })?;

    match cli.command {
        Some(Commands::Repl) | None => {
            repl::run(client, &cli.server, cli.raw).await?;
        }
        Some(cmd) => {
            let result = commands::execute(&client, cmd, cli.raw).await;
            let _ = client.close().await;

            match result {
                Ok(output) => println!("{}", output),
                Err(e) => {
                    eprintln!("{}: {}", "Error".red(), e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
