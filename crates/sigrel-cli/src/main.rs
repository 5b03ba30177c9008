use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sigrel_core::{generate_self_signed_pem, Listener, Server, ServerConfig};

#[derive(Parser)]
#[command(name = "sigrel")]
#[command(about = "Low-latency signaling relay")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the relay server.
    Serve {
        #[arg(long, default_value = "0.0.0.0:62443")]
        addr: String,
        /// PEM private key; enables TLS together with --cert-file.
        #[arg(long, requires = "cert_file")]
        key_file: Option<PathBuf>,
        /// PEM certificate; enables TLS together with --key-file.
        #[arg(long, requires = "key_file")]
        cert_file: Option<PathBuf>,
        /// Outbound queue capacity per connection, in frames.
        #[arg(long, default_value_t = 100)]
        queue_frames: usize,
    },
    /// Generate a self-signed key/certificate pair for TLS deployments.
    GenCert {
        #[arg(long, default_value = "localhost")]
        hostname: String,
        #[arg(long, default_value = "sigrel_key.pem")]
        key_out: PathBuf,
        #[arg(long, default_value = "sigrel_cert.pem")]
        cert_out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sigrel_core=info,sigrel=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            addr,
            key_file,
            cert_file,
            queue_frames,
        } => {
            let listener =
                Listener::bind(&addr, key_file.as_deref(), cert_file.as_deref()).await?;
            let server = Server::new(ServerConfig {
                outbound_queue_frames: queue_frames,
            });
            server.serve(listener).await
        }
        Command::GenCert {
            hostname,
            key_out,
            cert_out,
        } => {
            let (key_pem, cert_pem) = generate_self_signed_pem(&hostname)?;
            std::fs::write(&key_out, key_pem)
                .with_context(|| format!("write {}", key_out.display()))?;
            std::fs::write(&cert_out, cert_pem)
                .with_context(|| format!("write {}", cert_out.display()))?;
            println!("key:  {}", key_out.display());
            println!("cert: {}", cert_out.display());
            Ok(())
        }
    }
}
