//! Dispatcher – ponte entre as chamadas do bus e o registro.
//!
//! O transporte enxerga apenas o trait [`PropertyHandler`] (get / set /
//! mudança de assinatura). [`Dispatcher`] guarda o registro e a telemetria do
//! host atrás de uma única trava, então leituras nunca veem escrita parcial e
//! o cache de memória é atualizado uma vez por janela.

use crate::live::{HostTelemetry, ProviderError};
use crate::notify::{ChangeNotifier, ChangeRecord};
use crate::registry::{Accessor, ElementInfo, PropertyRegistry};
use crate::value::{TypedValue, ValueError};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Erros devolvidos ao transporte por chamada. Nunca são fatais.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    #[error("Propriedade não encontrada: {0}")]
    PropertyNotFound(String),

    #[error("Propriedade somente leitura: {0}")]
    PermissionDenied(String),

    #[error("Valor inválido para {name}: {source}")]
    InvalidValue {
        name: String,
        #[source]
        source: ValueError,
    },

    #[error("Falha ao consultar {name}: {source}")]
    Provider {
        name: String,
        #[source]
        source: ProviderError,
    },
}

/// Ação de assinatura de eventos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionAction {
    Subscribe,
    Unsubscribe,
}

impl SubscriptionAction {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionAction::Subscribe => "subscribe",
            SubscriptionAction::Unsubscribe => "unsubscribe",
        }
    }
}

/// Contrato de callbacks que o transporte invoca por nome de propriedade.
///
/// Implementações devem aceitar chamadas concorrentes.
pub trait PropertyHandler: Send + Sync {
    fn get(&self, name: &str) -> Result<TypedValue, DispatchError>;

    fn set(&self, name: &str, value: TypedValue) -> Result<(), DispatchError>;

    /// Gancho observacional; não valida a existência da propriedade.
    fn subscription_changed(
        &self,
        name: &str,
        action: SubscriptionAction,
        filter: Option<&str>,
    ) -> Result<(), DispatchError>;

    /// Elementos a registrar no bus, na ordem do registro.
    fn elements(&self) -> Vec<ElementInfo>;
}

struct DispatchState {
    registry: PropertyRegistry,
    host: HostTelemetry,
}

/// Implementação de [`PropertyHandler`] sobre um [`PropertyRegistry`].
pub struct Dispatcher {
    state: Mutex<DispatchState>,
    notifier: ChangeNotifier,
}

impl Dispatcher {
    pub fn new(registry: PropertyRegistry, host: HostTelemetry) -> Self {
        Self {
            state: Mutex::new(DispatchState { registry, host }),
            notifier: ChangeNotifier::new(),
        }
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    pub fn len(&self) -> usize {
        self.lock().registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().registry.is_empty()
    }

    // Valores são sempre substituídos inteiros, então um guard envenenado
    // ainda contém estado consistente.
    fn lock(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PropertyHandler for Dispatcher {
    fn get(&self, name: &str) -> Result<TypedValue, DispatchError> {
        let mut guard = self.lock();
        let state = &mut *guard;

        let def = state
            .registry
            .lookup(name)
            .ok_or_else(|| DispatchError::PropertyNotFound(name.to_string()))?;

        match &def.accessor {
            Accessor::Stored(value) => Ok(value.clone()),
            Accessor::Live(metric) => {
                let metric = *metric;
                state.host.read(metric).map_err(|source| {
                    warn!("Falha no provedor de {name}: {source}");
                    DispatchError::Provider {
                        name: name.to_string(),
                        source,
                    }
                })
            }
        }
    }

    fn set(&self, name: &str, value: TypedValue) -> Result<(), DispatchError> {
        let mut state = self.lock();
        let def = state
            .registry
            .lookup_mut(name)
            .ok_or_else(|| DispatchError::PropertyNotFound(name.to_string()))?;
        let kind = def.kind;

        let Accessor::Stored(current) = &mut def.accessor else {
            return Err(DispatchError::PermissionDenied(name.to_string()));
        };

        let coerced = value
            .coerce_to(kind)
            .map_err(|source| DispatchError::InvalidValue {
                name: name.to_string(),
                source,
            })?;

        if *current == coerced {
            debug!("{name}: valor inalterado");
            return Ok(());
        }
        let old = std::mem::replace(current, coerced.clone());
        // Publicado ainda sob a trava: a ordem dos eventos segue a das escritas
        self.notifier.emit(ChangeRecord::new(name, old, coerced));
        Ok(())
    }

    fn subscription_changed(
        &self,
        name: &str,
        action: SubscriptionAction,
        filter: Option<&str>,
    ) -> Result<(), DispatchError> {
        info!(
            property = name,
            action = action.as_str(),
            filter = filter.unwrap_or("-"),
            "Assinatura alterada"
        );
        Ok(())
    }

    fn elements(&self) -> Vec<ElementInfo> {
        self.lock().registry.elements()
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
