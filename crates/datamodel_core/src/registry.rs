//! Registro de data models.
//!
//! Concatena as definições do schema com as embutidas, preservando a ordem
//! para enumeração e indexando por nome para lookup O(1). Não há trava
//! interna: o [`Dispatcher`](crate::dispatcher::Dispatcher) serializa o acesso.

use crate::live::LiveMetric;
use crate::schema::SchemaError;
use crate::value::{TypedValue, ValueKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Tamanho máximo do nome de uma propriedade, em bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Modo de acesso exposto no bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

/// Fonte autoritativa do valor de uma propriedade.
#[derive(Debug, Clone, PartialEq)]
pub enum Accessor {
    /// Valor guardado, alterado por `set`.
    Stored(TypedValue),
    /// Valor calculado a cada `get`; nunca armazenado.
    Live(LiveMetric),
}

/// Definição de um data model.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDefinition {
    pub name: String,
    pub kind: ValueKind,
    pub accessor: Accessor,
}

impl PropertyDefinition {
    /// Propriedade com valor guardado (vinda do schema).
    pub fn stored(name: impl Into<String>, kind: ValueKind, value: TypedValue) -> Self {
        Self {
            name: name.into(),
            kind,
            accessor: Accessor::Stored(value),
        }
    }

    /// Propriedade embutida servida pelo host.
    pub fn live(metric: LiveMetric) -> Self {
        Self {
            name: metric.property_name().to_string(),
            kind: metric.kind(),
            accessor: Accessor::Live(metric),
        }
    }

    /// Só propriedades com valor guardado aceitam escrita.
    pub fn access(&self) -> AccessMode {
        match self.accessor {
            Accessor::Stored(_) => AccessMode::ReadWrite,
            Accessor::Live(_) => AccessMode::ReadOnly,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self.accessor, Accessor::Live(_))
    }

    pub fn info(&self) -> ElementInfo {
        ElementInfo {
            name: self.name.clone(),
            kind: self.kind,
            access: self.access(),
        }
    }
}

/// Descrição pública de um elemento registrado no bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementInfo {
    pub name: String,
    pub kind: ValueKind,
    pub access: AccessMode,
}

// ──────────────────────────────────────────────
// Registro
// ──────────────────────────────────────────────

/// Coleção imutável (em estrutura) de data models.
#[derive(Debug, Default)]
pub struct PropertyRegistry {
    entries: Vec<PropertyDefinition>,
    index: HashMap<String, usize>,
}

impl PropertyRegistry {
    /// Monta o registro: entradas do schema primeiro, depois as embutidas.
    ///
    /// Nomes repetidos (no schema ou colidindo com embutidos) abortam a
    /// construção.
    pub fn build(
        schema: Vec<PropertyDefinition>,
        builtins: Vec<PropertyDefinition>,
    ) -> Result<Self, SchemaError> {
        Self::from_definitions(schema.into_iter().chain(builtins))
    }

    pub fn from_definitions(
        definitions: impl IntoIterator<Item = PropertyDefinition>,
    ) -> Result<Self, SchemaError> {
        let mut registry = Self::default();
        for def in definitions {
            if registry.index.contains_key(&def.name) {
                return Err(SchemaError::DuplicateName(def.name));
            }
            registry.index.insert(def.name.clone(), registry.entries.len());
            registry.entries.push(def);
        }
        Ok(registry)
    }

    pub fn lookup(&self, name: &str) -> Option<&PropertyDefinition> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub(crate) fn lookup_mut(&mut self, name: &str) -> Option<&mut PropertyDefinition> {
        match self.index.get(name) {
            Some(&i) => self.entries.get_mut(i),
            None => None,
        }
    }

    /// Definições na ordem de inserção.
    pub fn enumerate(&self) -> impl Iterator<Item = &PropertyDefinition> {
        self.entries.iter()
    }

    pub fn elements(&self) -> Vec<ElementInfo> {
        self.entries.iter().map(PropertyDefinition::info).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
