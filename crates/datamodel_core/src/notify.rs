//! Notificação de mudanças de valor.
//!
//! Cada `set` que altera um valor gera um [`ChangeRecord`], registrado no log
//! e repassado a todos os receptores inscritos (ex: a entrega de eventos do
//! transporte).

use crate::value::TypedValue;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

/// Capacidade do canal de cada receptor.
pub const EVENT_BUFFER: usize = 64;

/// Registro de uma mudança de valor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub name: String,
    pub old: TypedValue,
    pub new: TypedValue,
    /// Hora local da mudança (RFC 3339).
    pub changed_at: String,
}

impl ChangeRecord {
    pub fn new(name: impl Into<String>, old: TypedValue, new: TypedValue) -> Self {
        Self {
            name: name.into(),
            old,
            new,
            changed_at: chrono::Local::now().to_rfc3339(),
        }
    }
}

impl fmt::Display for ChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Value changed for {}: old=\"{}\", new=\"{}\"",
            self.name, self.old, self.new
        )
    }
}

/// Distribui [`ChangeRecord`]s para os receptores inscritos.
#[derive(Debug, Default)]
pub struct ChangeNotifier {
    sinks: Mutex<Vec<Sender<ChangeRecord>>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inscreve um novo receptor.
    pub fn subscribe(&self) -> Receiver<ChangeRecord> {
        let (tx, rx) = bounded(EVENT_BUFFER);
        self.sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Registra a mudança e entrega a cada receptor sem bloquear.
    ///
    /// Receptor lento perde o registro; receptor desconectado é removido.
    pub fn emit(&self, record: ChangeRecord) {
        info!("{record}");

        let mut sinks = self.sinks.lock().unwrap_or_else(PoisonError::into_inner);
        sinks.retain(|tx| match tx.try_send(record.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("Canal de eventos cheio, descartando mudança de {}", record.name);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_format() {
        let record = ChangeRecord::new(
            "Device.Test.Property",
            TypedValue::from("init"),
            TypedValue::from("hello"),
        );
        assert_eq!(
            record.to_string(),
            "Value changed for Device.Test.Property: old=\"init\", new=\"hello\""
        );
        assert!(chrono::DateTime::parse_from_rfc3339(&record.changed_at).is_ok());
    }

    #[test]
    fn every_subscriber_receives_the_record() {
        let notifier = ChangeNotifier::new();
        let a = notifier.subscribe();
        let b = notifier.subscribe();

        notifier.emit(ChangeRecord::new("Device.X", TypedValue::Int32(1), TypedValue::Int32(2)));

        assert_eq!(a.try_recv().unwrap().new, TypedValue::Int32(2));
        assert_eq!(b.try_recv().unwrap().old, TypedValue::Int32(1));
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let notifier = ChangeNotifier::new();
        let kept = notifier.subscribe();
        drop(notifier.subscribe());
        assert_eq!(notifier.sink_count(), 2);

        notifier.emit(ChangeRecord::new("Device.X", TypedValue::Bool(false), TypedValue::Bool(true)));

        assert_eq!(notifier.sink_count(), 1);
        assert!(kept.try_recv().is_ok());
    }

    #[test]
    fn full_channel_drops_without_blocking() {
        let notifier = ChangeNotifier::new();
        let rx = notifier.subscribe();
        for i in 0..(EVENT_BUFFER as i32 + 10) {
            notifier.emit(ChangeRecord::new("Device.X", TypedValue::Int32(i), TypedValue::Int32(i + 1)));
        }
        assert_eq!(rx.len(), EVENT_BUFFER);
        assert_eq!(notifier.sink_count(), 1);
    }
}
