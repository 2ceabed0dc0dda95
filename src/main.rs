use clap::{Parser, Subcommand};
use tracing::{error, info};

use topicbus::config::{ClientSettings, ServerSettings, load_config};
use topicbus::utils::error::{BrokerError, TransportError};
use topicbus::utils::logging;
use topicbus::{Client, ClientEvent, Server, Value};

#[derive(Debug, Parser)]
#[command(name = "topicbus", version, about = "Topic based publish/subscribe broker")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the broker until Ctrl-C.
    Server,
    /// Subscribe to a topic, publish one image to it and print what arrives.
    Client {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long, default_value = "TEST")]
        topic: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!(error = %BrokerError::from(e), "could not load configuration");
            std::process::exit(1);
        }
    };
    logging::init(&settings.logging.level);

    match cli.command {
        Command::Server => {
            if let Err(e) = run_server(&settings.server).await {
                error!(error = %e, "server failed");
                std::process::exit(1);
            }
        }
        Command::Client { host, port, topic } => {
            let mut client_settings = settings.client;
            if let Some(host) = host {
                client_settings.host = host;
            }
            if let Some(port) = port {
                client_settings.port = port;
            }
            if let Err(e) = run_client(&client_settings, &topic).await {
                error!(error = %e, "client failed");
                std::process::exit(1);
            }
        }
    }
}

async fn run_server(settings: &ServerSettings) -> Result<(), BrokerError> {
    let server = Server::start(settings).await?;
    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}

async fn run_client(settings: &ClientSettings, topic: &str) -> Result<(), TransportError> {
    let (client, mut events) = Client::connect(settings).await?;
    client.add_subscription(topic)?;

    let image: Value = [
        ("greeting".to_string(), Value::from("hello")),
        ("sent_at".to_string(), Value::Date(chrono::Utc::now())),
    ]
    .into_iter()
    .collect();
    client.publish(topic, true, &image)?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ClientEvent::Data { topic, data, is_image }) => {
                    info!(%topic, is_image, %data, "data");
                }
                Some(ClientEvent::ForwardedSubscription { client_id, topic, is_add }) => {
                    info!(client_id, %topic, is_add, "forwarded subscription");
                }
                Some(ClientEvent::Closed { abnormal }) => {
                    info!(abnormal, "connection closed");
                    break;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                client.close();
            }
        }
    }
    Ok(())
}
