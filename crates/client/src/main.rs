//! # Data Model Client
//!
//! Consulta e altera data models de um provider pelo bus local.
//!
//! ## Uso
//! ```bash
//! datamodel_client get Device.DeviceInfo.UpTime
//! datamodel_client set Device.Test.Property string hello
//! datamodel_client list
//! datamodel_client watch Device.Test.Property
//! ```

mod connection;

use anyhow::Context;
use clap::{Parser, Subcommand};
use connection::BusClient;
use datamodel_core::config::AppConfig;
use datamodel_core::protocol::{BusRequest, BusResponse};
use datamodel_core::{AccessMode, ElementInfo, TypedValue, ValueKind};
use datamodel_core::ChangeRecord;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "datamodel_client",
    version,
    about = "Cliente de linha de comando do provider de data models"
)]
struct Cli {
    /// Endereço do provider (ip:porta); padrão: client.provider_addr do config
    #[arg(short, long)]
    addr: Option<String>,

    /// Arquivo de configuração TOML
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log em nível debug
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Lê o valor de uma propriedade
    Get { name: String },
    /// Grava um valor (tipo: string, int32, uint32, bool, ...)
    Set {
        name: String,
        kind: ValueKind,
        value: String,
    },
    /// Lista as propriedades registradas
    List,
    /// Acompanha mudanças de uma propriedade até ser interrompido
    Watch {
        name: String,
        /// Filtro repassado ao provider
        #[arg(long)]
        filter: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Logging ──
    let fallback = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .init();

    // ── Carregar config ──
    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load(&config_path).client;
    let provider = cli.addr.clone().unwrap_or(config.provider_addr.clone());

    let mut client = BusClient::connect(&provider, config.timeout())?;
    info!("Conectando a {provider}");

    match cli.command {
        Command::Get { name } => {
            let response = client.request(&BusRequest::Get { name })?;
            println!("{}", render(&response));
        }
        Command::Set { name, kind, value } => {
            let value = TypedValue::parse(kind, &value)
                .with_context(|| format!("Valor inválido para {name}"))?;
            client.request(&BusRequest::Set { name, value })?;
            println!("OK");
        }
        Command::List => {
            let response = client.request(&BusRequest::List)?;
            println!("{}", render(&response));
        }
        Command::Watch { name, filter } => {
            let running = Arc::new(AtomicBool::new(true));
            {
                let running = Arc::clone(&running);
                ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
                    .context("Falha ao instalar handler de sinal")?;
            }
            println!("Acompanhando {name} (Ctrl+C para sair)");
            watch(&mut client, &name, filter, &running, |record| {
                println!("{}", render(&BusResponse::Event(record)));
            })?;
        }
    }

    Ok(())
}

/// Assina `name` e repassa eventos até `running` virar `false`.
///
/// A assinatura é desfeita na saída, mesmo quando a recepção falha.
fn watch(
    client: &mut BusClient,
    name: &str,
    filter: Option<String>,
    running: &AtomicBool,
    mut on_event: impl FnMut(ChangeRecord),
) -> anyhow::Result<()> {
    client.request(&BusRequest::Subscribe {
        name: name.to_string(),
        filter,
    })?;

    let mut outcome = Ok(());
    while running.load(Ordering::SeqCst) {
        match client.next_event() {
            Ok(Some(record)) => on_event(record),
            Ok(None) => {}
            Err(e) => {
                outcome = Err(e);
                break;
            }
        }
    }

    if let Err(e) = client.request(&BusRequest::Unsubscribe { name: name.to_string() }) {
        warn!("Falha ao cancelar assinatura de {name}: {e}");
    }
    outcome
}

// ──────────────────────────────────────────────
// Formatação
// ──────────────────────────────────────────────

fn render(response: &BusResponse) -> String {
    match response {
        BusResponse::Value(value) => value.to_string(),
        BusResponse::Ack => "OK".into(),
        BusResponse::Elements(elements) => render_elements(elements),
        BusResponse::Event(record) => format!("Value changed for {}: {}", record.name, record.new),
        BusResponse::Error { status, message } => format!("{status:?}: {message}"),
    }
}

fn render_elements(elements: &[ElementInfo]) -> String {
    let width = elements.iter().map(|e| e.name.len()).max().unwrap_or(0);
    elements
        .iter()
        .map(|e| {
            let access = match e.access {
                AccessMode::ReadOnly => "ro",
                AccessMode::ReadWrite => "rw",
            };
            format!("{:<width$}  {:<8}  {access}", e.name, e.kind.name())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::fake_provider;
    use std::time::Duration;

    #[test]
    fn parse_set_command() {
        let cli = Cli::try_parse_from([
            "datamodel_client",
            "--addr",
            "127.0.0.1:6000",
            "set",
            "Device.Test.Counter",
            "uint32",
            "42",
        ])
        .unwrap();
        assert_eq!(cli.addr.as_deref(), Some("127.0.0.1:6000"));
        match cli.command {
            Command::Set { name, kind, value } => {
                assert_eq!(name, "Device.Test.Counter");
                assert_eq!(kind, ValueKind::UInt32);
                assert_eq!(TypedValue::parse(kind, &value).unwrap(), TypedValue::UInt32(42));
            }
            other => panic!("comando inesperado: {other:?}"),
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(Cli::try_parse_from(["datamodel_client", "set", "Device.X", "matrix", "1"]).is_err());
    }

    #[test]
    fn parse_watch_with_filter() {
        let cli = Cli::try_parse_from([
            "datamodel_client",
            "watch",
            "Device.Test.Property",
            "--filter",
            "x",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Watch { ref name, filter: Some(ref f) } if name == "Device.Test.Property" && f == "x"
        ));
    }

    #[test]
    fn watch_unsubscribes_when_stopped() {
        let record = ChangeRecord::new(
            "Device.Test.Property",
            TypedValue::from("init"),
            TypedValue::from("hello"),
        );
        let (addr, server) = fake_provider(vec![
            vec![BusResponse::Ack, BusResponse::Event(record)],
            vec![BusResponse::Ack],
        ]);
        let mut client = BusClient::connect(&addr.to_string(), Duration::from_secs(2)).unwrap();

        // Interrompe após o primeiro evento, como um Ctrl+C
        let running = AtomicBool::new(true);
        let mut seen = Vec::new();
        watch(&mut client, "Device.Test.Property", None, &running, |record| {
            seen.push(record.new.clone());
            running.store(false, Ordering::SeqCst);
        })
        .unwrap();

        assert_eq!(seen, vec![TypedValue::from("hello")]);
        assert_eq!(
            server.join().unwrap(),
            vec![
                BusRequest::Subscribe {
                    name: "Device.Test.Property".into(),
                    filter: None,
                },
                BusRequest::Unsubscribe { name: "Device.Test.Property".into() },
            ]
        );
    }

    #[test]
    fn renders_change_event() {
        let record = ChangeRecord::new(
            "Device.Test.Property",
            TypedValue::from("init"),
            TypedValue::from("hello"),
        );
        assert_eq!(
            render(&BusResponse::Event(record)),
            "Value changed for Device.Test.Property: hello"
        );
        assert_eq!(render(&BusResponse::Value(TypedValue::Bool(true))), "true");
    }

    #[test]
    fn renders_element_table() {
        let elements = vec![
            ElementInfo {
                name: "Device.A".into(),
                kind: ValueKind::Int32,
                access: AccessMode::ReadWrite,
            },
            ElementInfo {
                name: "Device.DeviceInfo.UpTime".into(),
                kind: ValueKind::String,
                access: AccessMode::ReadOnly,
            },
        ];
        let table = render_elements(&elements);
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Device.A "));
        assert!(lines[0].ends_with("rw"));
        assert!(lines[1].contains("string"));
        assert!(lines[1].ends_with("ro"));
    }
}
