//! Tabela de assinantes por propriedade.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};

/// Endereços inscritos em eventos de cada propriedade.
#[derive(Debug, Default)]
pub struct SubscriberTable {
    inner: Mutex<HashMap<String, Vec<SocketAddr>>>,
}

impl SubscriberTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inscreve `addr`; retorna `false` se já estava inscrito.
    pub fn add(&self, name: &str, addr: SocketAddr) -> bool {
        let mut table = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let subscribers = table.entry(name.to_string()).or_default();
        if subscribers.contains(&addr) {
            return false;
        }
        subscribers.push(addr);
        true
    }

    /// Remove `addr`; retorna `false` se não estava inscrito.
    pub fn remove(&self, name: &str, addr: SocketAddr) -> bool {
        let mut table = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(subscribers) = table.get_mut(name) else {
            return false;
        };
        let before = subscribers.len();
        subscribers.retain(|a| *a != addr);
        let removed = subscribers.len() != before;
        if subscribers.is_empty() {
            table.remove(name);
        }
        removed
    }

    pub fn targets(&self, name: &str) -> Vec<SocketAddr> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Total de pares (propriedade, assinante).
    pub fn count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }
}
