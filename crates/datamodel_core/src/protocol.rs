//! Protocolo binário do bus local.
//!
//! Formato do frame:
//!
//! ```text
//! ┌──────────┬─────────┬──────────────┐
//! │ Magic(1) │ Ver.(1) │ Payload (N)  │
//! └──────────┴─────────┴──────────────┘
//! ```
//!
//! - Magic byte `0x44` ('D') identifica pacotes de data model
//! - Versão do protocolo (1 byte)
//! - [`BusRequest`] ou [`BusResponse`] serializado com bincode

use crate::dispatcher::DispatchError;
use crate::notify::ChangeRecord;
use crate::registry::ElementInfo;
use crate::value::TypedValue;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Magic byte que identifica pacotes do bus de data models.
pub const MAGIC_BYTE: u8 = 0x44; // 'D'

/// Versão atual do protocolo.
pub const PROTOCOL_VERSION: u8 = 1;

/// Tamanho do header (magic + version).
const HEADER_SIZE: usize = 2;

/// Tamanho máximo de pacote UDP seguro (sem fragmentação).
pub const MAX_UDP_PAYLOAD: usize = 65507;

/// Erros do protocolo.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Pacote muito curto ({0} bytes, mínimo {HEADER_SIZE})")]
    TooShort(usize),

    #[error("Magic byte inválido: 0x{0:02X} (esperado 0x{MAGIC_BYTE:02X})")]
    InvalidMagic(u8),

    #[error("Versão incompatível: {0} (suportada: {PROTOCOL_VERSION})")]
    VersionMismatch(u8),

    #[error("Frame excede {MAX_UDP_PAYLOAD} bytes ({0})")]
    TooLarge(usize),

    #[error("Erro de serialização: {0}")]
    Serialize(String),

    #[error("Erro de deserialização: {0}")]
    Deserialize(String),
}

// ──────────────────────────────────────────────
// Mensagens
// ──────────────────────────────────────────────

/// Requisição de um cliente ao provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BusRequest {
    Get { name: String },
    Set { name: String, value: TypedValue },
    Subscribe { name: String, filter: Option<String> },
    Unsubscribe { name: String },
    List,
}

impl BusRequest {
    /// Nome da propriedade alvo, se houver.
    pub fn property(&self) -> Option<&str> {
        match self {
            BusRequest::Get { name }
            | BusRequest::Set { name, .. }
            | BusRequest::Subscribe { name, .. }
            | BusRequest::Unsubscribe { name } => Some(name),
            BusRequest::List => None,
        }
    }
}

/// Código de status devolvido ao cliente em caso de erro.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    NotFound,
    PermissionDenied,
    InvalidValue,
    ProviderFailure,
    BadRequest,
}

impl From<&DispatchError> for StatusCode {
    fn from(err: &DispatchError) -> Self {
        match err {
            DispatchError::PropertyNotFound(_) => StatusCode::NotFound,
            DispatchError::PermissionDenied(_) => StatusCode::PermissionDenied,
            DispatchError::InvalidValue { .. } => StatusCode::InvalidValue,
            DispatchError::Provider { .. } => StatusCode::ProviderFailure,
        }
    }
}

/// Resposta do provider (ou evento empurrado a um assinante).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BusResponse {
    Value(TypedValue),
    Ack,
    Elements(Vec<ElementInfo>),
    Event(ChangeRecord),
    Error { status: StatusCode, message: String },
}

impl From<DispatchError> for BusResponse {
    fn from(err: DispatchError) -> Self {
        BusResponse::Error {
            status: StatusCode::from(&err),
            message: err.to_string(),
        }
    }
}

// ──────────────────────────────────────────────
// Codec
// ──────────────────────────────────────────────

/// Codifica uma mensagem no formato `[MAGIC][VERSION][bincode...]`.
pub fn encode_frame<T: Serialize>(message: &T) -> Result<Vec<u8>, ProtocolError> {
    let body = bincode::serialize(message).map_err(|e| ProtocolError::Serialize(e.to_string()))?;

    let total = HEADER_SIZE + body.len();
    if total > MAX_UDP_PAYLOAD {
        return Err(ProtocolError::TooLarge(total));
    }

    let mut frame = Vec::with_capacity(total);
    frame.push(MAGIC_BYTE);
    frame.push(PROTOCOL_VERSION);
    frame.extend_from_slice(&body);

    Ok(frame)
}

/// Decodifica um frame, validando magic byte e versão antes do corpo.
pub fn decode_frame<T: DeserializeOwned>(data: &[u8]) -> Result<T, ProtocolError> {
    if data.len() < HEADER_SIZE {
        return Err(ProtocolError::TooShort(data.len()));
    }

    let magic = data[0];
    if magic != MAGIC_BYTE {
        return Err(ProtocolError::InvalidMagic(magic));
    }

    let version = data[1];
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::VersionMismatch(version));
    }

    bincode::deserialize(&data[HEADER_SIZE..]).map_err(|e| ProtocolError::Deserialize(e.to_string()))
}

pub fn encode_request(request: &BusRequest) -> Result<Vec<u8>, ProtocolError> {
    encode_frame(request)
}

pub fn decode_request(data: &[u8]) -> Result<BusRequest, ProtocolError> {
    decode_frame(data)
}

pub fn encode_response(response: &BusResponse) -> Result<Vec<u8>, ProtocolError> {
    encode_frame(response)
}

pub fn decode_response(data: &[u8]) -> Result<BusResponse, ProtocolError> {
    decode_frame(data)
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{AccessMode, MAX_NAME_LEN};
    use crate::value::{MAX_STRING_LEN, ValueError, ValueKind};

    #[test]
    fn request_roundtrip() {
        let request = BusRequest::Set {
            name: "Device.Test.Property".into(),
            value: TypedValue::UInt64(u64::MAX),
        };
        let frame = encode_request(&request).unwrap();
        assert_eq!(frame[0], MAGIC_BYTE);
        assert_eq!(frame[1], PROTOCOL_VERSION);
        assert_eq!(decode_request(&frame).unwrap(), request);
    }

    #[test]
    fn elements_response_roundtrip() {
        let response = BusResponse::Elements(vec![ElementInfo {
            name: "Device.DeviceInfo.UpTime".into(),
            kind: ValueKind::String,
            access: AccessMode::ReadOnly,
        }]);
        let frame = encode_response(&response).unwrap();
        assert_eq!(decode_response(&frame).unwrap(), response);
    }

    #[test]
    fn rejects_invalid_magic() {
        let mut frame = encode_request(&BusRequest::List).unwrap();
        frame[0] = 0xFF;
        assert!(matches!(
            decode_request(&frame),
            Err(ProtocolError::InvalidMagic(0xFF))
        ));
    }

    #[test]
    fn rejects_short_packet() {
        assert!(matches!(
            decode_request(&[MAGIC_BYTE]),
            Err(ProtocolError::TooShort(1))
        ));
    }

    #[test]
    fn rejects_wrong_version() {
        let mut frame = encode_request(&BusRequest::List).unwrap();
        frame[1] = 99;
        assert!(matches!(
            decode_request(&frame),
            Err(ProtocolError::VersionMismatch(99))
        ));
    }

    #[test]
    fn rejects_garbage_body() {
        let frame = [MAGIC_BYTE, PROTOCOL_VERSION, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        assert!(matches!(
            decode_request(&frame),
            Err(ProtocolError::Deserialize(_))
        ));
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let request = BusRequest::Set {
            name: "Device.Big".into(),
            value: TypedValue::String("x".repeat(MAX_UDP_PAYLOAD)),
        };
        assert!(matches!(
            encode_request(&request),
            Err(ProtocolError::TooLarge(_))
        ));
    }

    #[test]
    fn largest_change_event_fits_one_datagram() {
        let big = TypedValue::String("x".repeat(MAX_STRING_LEN));
        let name = format!("Device.{}", "N".repeat(MAX_NAME_LEN - 7));
        let event = BusResponse::Event(ChangeRecord::new(name, big.clone(), big));
        let frame = encode_response(&event).unwrap();
        assert!(frame.len() <= MAX_UDP_PAYLOAD);
    }

    #[test]
    fn dispatch_errors_map_to_status() {
        let response = BusResponse::from(DispatchError::PermissionDenied("Device.X".into()));
        assert!(matches!(
            response,
            BusResponse::Error {
                status: StatusCode::PermissionDenied,
                ..
            }
        ));

        let invalid = DispatchError::InvalidValue {
            name: "Device.X".into(),
            source: ValueError::UnknownKind("x".into()),
        };
        assert_eq!(StatusCode::from(&invalid), StatusCode::InvalidValue);
    }

    #[test]
    fn request_target() {
        assert_eq!(
            BusRequest::Get { name: "Device.A".into() }.property(),
            Some("Device.A")
        );
        assert_eq!(BusRequest::List.property(), None);
    }
}
