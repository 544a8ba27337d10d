//! # Data Model Core
//!
//! Crate compartilhada que define o modelo tipado de propriedades
//! (`Device.*`), o carregamento do schema, a telemetria live do host e o
//! dispatcher de get/set usado pelo transporte do bus.
//!
//! ## Módulos
//! - [`value`] – Valores tipados e tipos declarados
//! - [`schema`] – Carga tudo-ou-nada do schema JSON
//! - [`live`] – Propriedades embutidas servidas pelo host, cache de memória
//! - [`registry`] – Registro de data models indexado por nome
//! - [`dispatcher`] – Contrato de callbacks get / set / assinatura
//! - [`notify`] – Registros de mudança de valor
//! - [`protocol`] – Frames binários do bus local
//! - [`config`] – Configuração unificada via TOML

pub mod value;
pub mod schema;
pub mod live;
pub mod registry;
pub mod dispatcher;
pub mod notify;
pub mod protocol;
pub mod config;

// Re-exports convenientes
pub use config::{AppConfig, ClientConfig, ConfigError, ProviderConfig};
pub use dispatcher::{DispatchError, Dispatcher, PropertyHandler, SubscriptionAction};
pub use live::{HostTelemetry, LiveMetric, ProviderError, builtin_definitions};
pub use notify::{ChangeNotifier, ChangeRecord};
pub use protocol::{BusRequest, BusResponse, PROTOCOL_VERSION, StatusCode};
pub use registry::{AccessMode, ElementInfo, PropertyDefinition, PropertyRegistry};
pub use schema::SchemaError;
pub use value::{TypedValue, ValueKind};

use std::path::Path;

/// Carrega o schema e monta o [`Dispatcher`] com a telemetria real do host.
///
/// Qualquer erro aqui é fatal: o provider não deve registrar nada no bus.
pub fn build_dispatcher(
    schema_path: &Path,
    config: &ProviderConfig,
) -> Result<Dispatcher, SchemaError> {
    let schema = schema::load_file(schema_path)?;
    let registry = PropertyRegistry::build(schema, builtin_definitions())?;
    Ok(Dispatcher::new(
        registry,
        HostTelemetry::system(config.memory_cache_ttl()),
    ))
}
