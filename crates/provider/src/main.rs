//! # Data Model Provider
//!
//! Carrega o schema JSON, registra as propriedades `Device.*` (do schema e
//! embutidas) e atende get / set / assinaturas via bus UDP local.
//!
//! ## Uso
//! ```bash
//! datamodel_provider                      # usa provider.schema_path do config.toml
//! datamodel_provider /etc/datamodels.json # schema explícito
//! datamodel_provider --port 5100 -v       # porta alternativa, log em debug
//! ```

mod bus;
mod subscriptions;

use anyhow::{Context, bail};
use bus::UdpBus;
use clap::Parser;
use datamodel_core::config::AppConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "datamodel_provider",
    version,
    about = "Expõe data models Device.* tipados no bus local"
)]
struct Cli {
    /// Schema JSON (padrão: provider.schema_path do config)
    schema: Option<PathBuf>,

    /// Arquivo de configuração TOML
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// IP local para bind do bus
    #[arg(long)]
    bind: Option<String>,

    /// Porta UDP do bus
    #[arg(short, long)]
    port: Option<u16>,

    /// Threads atendendo requisições
    #[arg(short, long)]
    workers: Option<usize>,

    /// Log em nível debug
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Aplica os argumentos de linha de comando sobre o config carregado.
    fn apply(&self, config: &mut AppConfig) {
        if let Some(schema) = &self.schema {
            config.provider.schema_path = schema.clone();
        }
        if let Some(bind) = &self.bind {
            config.provider.bind_addr = bind.clone();
        }
        if let Some(port) = self.port {
            config.provider.port = port;
        }
        if let Some(workers) = self.workers {
            config.provider.workers = workers;
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Logging ──
    let fallback = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .init();

    // ── Carregar config ──
    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load(&config_path);

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    cli.apply(&mut config);
    let errors = config.validate();
    if !errors.is_empty() {
        bail!("Configuração inválida: {}", errors.join("; "));
    }
    let provider_cfg = &config.provider;

    // ── Registro de data models ──
    // Qualquer erro de schema aborta antes de abrir o bus
    let dispatcher = match datamodel_core::build_dispatcher(&provider_cfg.schema_path, provider_cfg) {
        Ok(dispatcher) => Arc::new(dispatcher),
        Err(e) => {
            error!(class = ?e.class(), "Nenhum data model registrado");
            return Err(e).with_context(|| {
                format!("Falha ao carregar {}", provider_cfg.schema_path.display())
            });
        }
    };
    info!(
        "{} data models registrados como {}",
        dispatcher.len(),
        provider_cfg.component_name
    );

    let events = dispatcher.notifier().subscribe();

    // ── Sinais ──
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            info!("Sinal recebido, encerrando provider...");
            running.store(false, Ordering::SeqCst);
        })
        .context("Falha ao instalar handler de sinal")?;
    }

    // ── Bus ──
    let listen_addr = provider_cfg.listen_addr();
    let bus = UdpBus::bind(&listen_addr, dispatcher.clone(), Arc::clone(&running))
        .with_context(|| format!("Falha ao abrir bus em {listen_addr}"))?;

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   ⚡ DATA MODEL PROVIDER – ATIVO (Rust)");
    println!("══════════════════════════════════════════════");
    println!("  Componente: {}", provider_cfg.component_name);
    println!("  Schema:     {}", provider_cfg.schema_path.display());
    println!("  Bus:        {}", bus.local_addr()?);
    println!("  Workers:    {}", provider_cfg.workers);
    println!("  Protocolo:  bincode v{}", datamodel_core::PROTOCOL_VERSION);
    println!("══════════════════════════════════════════════");
    println!();

    bus.serve(provider_cfg.workers, events)
        .context("Erro no bus")?;

    info!("Provider encerrado");
    Ok(())
}
