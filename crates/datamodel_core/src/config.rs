//! Configuração unificada via TOML (`config.toml`).

use crate::live::MEMORY_CACHE_TTL;
use crate::schema::DEFAULT_SCHEMA_FILE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Erros de leitura/escrita do `config.toml`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Erro de E/S em {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML inválido: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Falha ao gerar TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Configuração do provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Schema JSON (relativo ao diretório de trabalho)
    pub schema_path: PathBuf,
    /// IP local para bind do bus
    pub bind_addr: String,
    /// Porta UDP do bus
    pub port: u16,
    /// Threads atendendo requisições
    pub workers: usize,
    /// Validade do cache de memória (segundos)
    pub memory_cache_ttl_secs: u64,
    /// Nome do componente registrado no bus
    pub component_name: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            schema_path: PathBuf::from(DEFAULT_SCHEMA_FILE),
            bind_addr: "127.0.0.1".into(),
            port: 5006,
            workers: 4,
            memory_cache_ttl_secs: MEMORY_CACHE_TTL.as_secs(),
            component_name: "rbus-datamodels".into(),
        }
    }
}

impl ProviderConfig {
    pub fn memory_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.memory_cache_ttl_secs)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

/// Configuração do cliente de linha de comando.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Endereço do provider (ip:porta)
    pub provider_addr: String,
    /// Tempo máximo de espera por resposta (ms)
    pub timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            provider_addr: "127.0.0.1:5006".into(),
            timeout_ms: 2000,
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Configuração raiz do aplicativo (provider e cliente).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub client: ClientConfig,
}

impl AppConfig {
    /// Lê e interpreta o arquivo, sem fallback.
    pub fn try_load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Carrega o arquivo se existir; qualquer falha cai na configuração padrão.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            info!("{} ausente, usando configuração padrão", path.display());
            return AppConfig::default();
        }
        match Self::try_load(path) {
            Ok(config) => {
                info!("Configuração carregada de {}", path.display());
                config
            }
            Err(e) => {
                warn!("{e}; usando configuração padrão");
                AppConfig::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml (ao lado do executável).
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.provider.port == 0 {
            errors.push("Porta do provider não pode ser 0".into());
        }
        if self.provider.workers == 0 || self.provider.workers > 64 {
            errors.push(format!(
                "Número de workers inválido: {} (1–64)",
                self.provider.workers
            ));
        }
        if self.provider.memory_cache_ttl_secs == 0 {
            errors.push("TTL do cache de memória não pode ser 0".into());
        }
        if self.provider.schema_path.as_os_str().is_empty() {
            errors.push("Caminho do schema vazio".into());
        }
        if self.client.timeout_ms == 0 {
            errors.push("Timeout do cliente não pode ser 0".into());
        }

        errors
    }
}
