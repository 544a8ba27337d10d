//! Propriedades "live" – valores calculados sob demanda a partir do host.
//!
//! Nenhum destes data models guarda valor: cada `get` consulta o sistema.
//! As três métricas de memória compartilham um [`MemoryCache`] com TTL, de
//! modo que uma única consulta ao host atende aos três `get` dentro da janela.
//!
//! A coleta usa `sysinfo` (memória, uptime, interfaces de rede) e `chrono`
//! (hora local). A consulta ao host fica atrás do trait [`HostProbe`].

use crate::registry::PropertyDefinition;
use crate::value::{TypedValue, ValueKind};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use sysinfo::{MemoryRefreshKind, Networks, RefreshKind, System};
use tracing::debug;

/// Janela de validade do cache de memória.
pub const MEMORY_CACHE_TTL: Duration = Duration::from_secs(5);

/// Erro de uma consulta ao host.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("Nenhuma fonte de identidade estável disponível")]
    NoIdentity,

    #[error("Nenhuma interface de rede não-loopback encontrada")]
    NoInterface,

    #[error("Relógio do sistema inválido: {0}")]
    Clock(String),

    #[error("Estatísticas de memória indisponíveis: {0}")]
    Memory(String),
}

// ──────────────────────────────────────────────
// Métricas embutidas
// ──────────────────────────────────────────────

/// Data models embutidos, servidos por consulta ao host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiveMetric {
    SerialNumber,
    SystemTime,
    UpTime,
    MacAddress,
    MemoryTotal,
    MemoryUsed,
    MemoryFree,
    LocalTime,
}

impl LiveMetric {
    pub const ALL: [LiveMetric; 8] = [
        LiveMetric::SerialNumber,
        LiveMetric::SystemTime,
        LiveMetric::UpTime,
        LiveMetric::MacAddress,
        LiveMetric::MemoryTotal,
        LiveMetric::MemoryUsed,
        LiveMetric::MemoryFree,
        LiveMetric::LocalTime,
    ];

    pub fn property_name(self) -> &'static str {
        match self {
            LiveMetric::SerialNumber => "Device.DeviceInfo.SerialNumber",
            LiveMetric::SystemTime => "Device.DeviceInfo.X_RDKCENTRAL-COM_SystemTime",
            LiveMetric::UpTime => "Device.DeviceInfo.UpTime",
            LiveMetric::MacAddress => "Device.DeviceInfo.X_COMCAST-COM_CM_MAC",
            LiveMetric::MemoryTotal => "Device.DeviceInfo.MemoryStatus.Total",
            LiveMetric::MemoryUsed => "Device.DeviceInfo.MemoryStatus.Used",
            LiveMetric::MemoryFree => "Device.DeviceInfo.MemoryStatus.Free",
            LiveMetric::LocalTime => "Device.Time.CurrentLocalTime",
        }
    }

    pub fn kind(self) -> ValueKind {
        match self {
            LiveMetric::MemoryTotal | LiveMetric::MemoryUsed | LiveMetric::MemoryFree => {
                ValueKind::UInt32
            }
            LiveMetric::LocalTime => ValueKind::DateTime,
            _ => ValueKind::String,
        }
    }
}

/// Definições embutidas, na ordem em que entram no registro.
pub fn builtin_definitions() -> Vec<PropertyDefinition> {
    LiveMetric::ALL
        .iter()
        .map(|&metric| PropertyDefinition::live(metric))
        .collect()
}

// ──────────────────────────────────────────────
// Consulta ao host
// ──────────────────────────────────────────────

/// Snapshot de memória em KiB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemorySnapshot {
    pub total_kib: u64,
    pub free_kib: u64,
    pub used_kib: u64,
}

/// Fonte de dados do host para as métricas embutidas.
pub trait HostProbe: Send {
    fn serial_number(&mut self) -> Result<String, ProviderError>;
    /// Segundos desde o boot, como o sistema reporta (0 incluso).
    fn uptime_secs(&mut self) -> u64;
    /// MAC da primeira interface não-loopback.
    fn mac_address(&mut self) -> Result<[u8; 6], ProviderError>;
    fn memory(&mut self) -> Result<MemorySnapshot, ProviderError>;
}

/// [`HostProbe`] real, baseado em `sysinfo`.
pub struct SysinfoProbe {
    sys: System,
    networks: Networks,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let sys = System::new_with_specifics(
            RefreshKind::nothing().with_memory(MemoryRefreshKind::everything()),
        );
        Self {
            sys,
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HostProbe for SysinfoProbe {
    /// Número de série DMI; sem ele, o MAC sem pontuação.
    fn serial_number(&mut self) -> Result<String, ProviderError> {
        if let Some(serial) = read_dmi_serial() {
            return Ok(serial);
        }
        match self.mac_address() {
            Ok(mac) => Ok(format_mac(&mac, MacStyle::Compact)),
            Err(_) => Err(ProviderError::NoIdentity),
        }
    }

    fn uptime_secs(&mut self) -> u64 {
        System::uptime()
    }

    fn mac_address(&mut self) -> Result<[u8; 6], ProviderError> {
        self.networks.refresh(true);

        let mut candidates: Vec<(&str, [u8; 6])> = self
            .networks
            .iter()
            .filter(|(name, _)| !is_loopback(name))
            .map(|(name, data)| (name.as_str(), data.mac_address().0))
            .filter(|(_, mac)| mac.iter().any(|&b| b != 0))
            .collect();

        // HashMap não tem ordem estável; ordena por nome da interface
        candidates.sort_by(|a, b| a.0.cmp(b.0));

        candidates
            .first()
            .map(|(name, mac)| {
                debug!("MAC de {name}: {}", format_mac(mac, MacStyle::Colon));
                *mac
            })
            .ok_or(ProviderError::NoInterface)
    }

    fn memory(&mut self) -> Result<MemorySnapshot, ProviderError> {
        self.sys.refresh_memory();

        let total_kib = self.sys.total_memory() / 1024;
        if total_kib == 0 {
            return Err(ProviderError::Memory("total de memória zerado".into()));
        }
        // "Livre" inclui buffers/cache recuperáveis
        let free_kib = self.sys.available_memory() / 1024;

        Ok(MemorySnapshot {
            total_kib,
            free_kib,
            used_kib: total_kib.saturating_sub(free_kib),
        })
    }
}

#[cfg(target_os = "linux")]
fn read_dmi_serial() -> Option<String> {
    const PLACEHOLDERS: [&str; 5] = [
        "none",
        "default string",
        "to be filled by o.e.m.",
        "system serial number",
        "0",
    ];

    let raw = std::fs::read_to_string("/sys/class/dmi/id/product_serial").ok()?;
    let serial = raw.trim();
    if serial.is_empty() || PLACEHOLDERS.contains(&serial.to_lowercase().as_str()) {
        None
    } else {
        Some(serial.to_string())
    }
}

#[cfg(not(target_os = "linux"))]
fn read_dmi_serial() -> Option<String> {
    None
}

fn is_loopback(interface: &str) -> bool {
    interface.starts_with("lo")
}

/// Formato de saída do MAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacStyle {
    /// `aa:bb:cc:dd:ee:ff`
    Colon,
    /// `AABBCCDDEEFF`
    Compact,
}

pub fn format_mac(mac: &[u8; 6], style: MacStyle) -> String {
    match style {
        MacStyle::Colon => mac
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(":"),
        MacStyle::Compact => mac.iter().map(|b| format!("{b:02X}")).collect(),
    }
}

// ──────────────────────────────────────────────
// Cache de memória
// ──────────────────────────────────────────────

/// Cache com TTL para o grupo de métricas de memória.
#[derive(Debug)]
pub struct MemoryCache {
    ttl: Duration,
    snapshot: Option<(MemorySnapshot, Instant)>,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            snapshot: None,
        }
    }

    /// Retorna o snapshot em cache ou consulta o host se expirado.
    ///
    /// Falha na consulta não invalida o snapshot anterior; só o `get`
    /// atual falha.
    pub fn read(
        &mut self,
        now: Instant,
        probe: &mut dyn HostProbe,
    ) -> Result<MemorySnapshot, ProviderError> {
        if let Some((snapshot, refreshed_at)) = self.snapshot {
            if now.saturating_duration_since(refreshed_at) < self.ttl {
                return Ok(snapshot);
            }
        }

        let fresh = probe.memory()?;
        debug!(
            "Cache de memória atualizado: total {} KiB, livre {} KiB, usado {} KiB",
            fresh.total_kib, fresh.free_kib, fresh.used_kib
        );
        self.snapshot = Some((fresh, now));
        Ok(fresh)
    }
}

// ──────────────────────────────────────────────
// Avaliação das métricas
// ──────────────────────────────────────────────

/// Estado de telemetria do host: a sonda e o cache de memória.
pub struct HostTelemetry {
    probe: Box<dyn HostProbe>,
    memory: MemoryCache,
}

impl HostTelemetry {
    pub fn new(probe: Box<dyn HostProbe>, memory_ttl: Duration) -> Self {
        Self {
            probe,
            memory: MemoryCache::new(memory_ttl),
        }
    }

    /// Telemetria real do sistema, com o TTL informado.
    pub fn system(memory_ttl: Duration) -> Self {
        Self::new(Box::new(SysinfoProbe::new()), memory_ttl)
    }

    pub fn read(&mut self, metric: LiveMetric) -> Result<TypedValue, ProviderError> {
        self.read_at(metric, Instant::now())
    }

    pub fn read_at(&mut self, metric: LiveMetric, now: Instant) -> Result<TypedValue, ProviderError> {
        let value = match metric {
            LiveMetric::SerialNumber => TypedValue::String(self.probe.serial_number()?),
            LiveMetric::SystemTime => TypedValue::String(system_time_string()?),
            LiveMetric::UpTime => TypedValue::String(self.probe.uptime_secs().to_string()),
            LiveMetric::MacAddress => {
                TypedValue::String(format_mac(&self.probe.mac_address()?, MacStyle::Colon))
            }
            LiveMetric::MemoryTotal => kib(self.memory.read(now, self.probe.as_mut())?.total_kib),
            LiveMetric::MemoryUsed => kib(self.memory.read(now, self.probe.as_mut())?.used_kib),
            LiveMetric::MemoryFree => kib(self.memory.read(now, self.probe.as_mut())?.free_kib),
            LiveMetric::LocalTime => TypedValue::String(local_time_string()),
        };
        Ok(value)
    }
}

/// KiB como UInt32; hosts acima de 4 TiB saturam.
fn kib(value: u64) -> TypedValue {
    TypedValue::UInt32(u32::try_from(value).unwrap_or(u32::MAX))
}

/// Segundos.microssegundos desde a epoch.
fn system_time_string() -> Result<String, ProviderError> {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| ProviderError::Clock(e.to_string()))?;
    Ok(format!(
        "{}.{:06}",
        since_epoch.as_secs(),
        since_epoch.subsec_micros()
    ))
}

/// Hora local no formato `YYYY-MM-DDTHH:MM:SS`.
fn local_time_string() -> String {
    chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

// ──────────────────────────────────────────────
// Sonda fake para testes
// ──────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Sonda programável; `memory_results` é consumida em ordem e repete o
    /// último resultado quando esgota.
    pub(crate) struct FakeProbe {
        pub serial: Result<String, ProviderError>,
        pub mac: Result<[u8; 6], ProviderError>,
        pub uptime: u64,
        pub memory_results: Arc<Mutex<Vec<Result<MemorySnapshot, ProviderError>>>>,
        pub memory_calls: Arc<AtomicUsize>,
    }

    impl FakeProbe {
        pub(crate) fn with_memory(results: Vec<Result<MemorySnapshot, ProviderError>>) -> Self {
            Self {
                serial: Ok("SN-0001".into()),
                mac: Ok([0x00, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e]),
                uptime: 3600,
                memory_results: Arc::new(Mutex::new(results)),
                memory_calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl HostProbe for FakeProbe {
        fn serial_number(&mut self) -> Result<String, ProviderError> {
            self.serial.clone()
        }

        fn uptime_secs(&mut self) -> u64 {
            self.uptime
        }

        fn mac_address(&mut self) -> Result<[u8; 6], ProviderError> {
            self.mac.clone()
        }

        fn memory(&mut self) -> Result<MemorySnapshot, ProviderError> {
            self.memory_calls.fetch_add(1, Ordering::SeqCst);
            let mut results = self.memory_results.lock().unwrap();
            if results.len() > 1 {
                results.remove(0)
            } else {
                results
                    .first()
                    .cloned()
                    .unwrap_or(Err(ProviderError::Memory("sem dados".into())))
            }
        }
    }

    pub(crate) fn snapshot(total: u64, free: u64) -> MemorySnapshot {
        MemorySnapshot {
            total_kib: total,
            free_kib: free,
            used_kib: total - free,
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
