//! Valores tipados dos data models.
//!
//! [`TypedValue`] é a união fechada de representações que trafegam no bus.
//! [`ValueKind`] é o tipo *declarado* de uma propriedade: inclui os dois tipos
//! lógicos `DateTime` e `Base64`, que compartilham a representação string.

use crate::protocol::MAX_UDP_PAYLOAD;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tamanho máximo (bytes) de um valor string.
///
/// Um evento de mudança leva o valor antigo e o novo no mesmo datagrama,
/// então cada um cabe em metade do payload UDP, descontado o cabeçalho.
pub const MAX_STRING_LEN: usize = (MAX_UDP_PAYLOAD - 1024) / 2;

// ──────────────────────────────────────────────
// Tipo declarado
// ──────────────────────────────────────────────

/// Tipo declarado de uma propriedade, com o código numérico do schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    String = 0,
    Int32 = 1,
    UInt32 = 2,
    Bool = 3,
    DateTime = 4,
    Base64 = 5,
    Int64 = 6,
    UInt64 = 7,
    Float32 = 8,
    Float64 = 9,
    Byte = 10,
}

impl ValueKind {
    /// Todos os tipos, na ordem dos códigos do schema.
    pub const ALL: [ValueKind; 11] = [
        ValueKind::String,
        ValueKind::Int32,
        ValueKind::UInt32,
        ValueKind::Bool,
        ValueKind::DateTime,
        ValueKind::Base64,
        ValueKind::Int64,
        ValueKind::UInt64,
        ValueKind::Float32,
        ValueKind::Float64,
        ValueKind::Byte,
    ];

    /// Converte o código do schema (0..=10).
    pub fn from_code(code: u64) -> Option<Self> {
        Self::ALL.get(usize::try_from(code).ok()?).copied()
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Int32 => "int32",
            ValueKind::UInt32 => "uint32",
            ValueKind::Bool => "bool",
            ValueKind::DateTime => "datetime",
            ValueKind::Base64 => "base64",
            ValueKind::Int64 => "int64",
            ValueKind::UInt64 => "uint64",
            ValueKind::Float32 => "float32",
            ValueKind::Float64 => "float64",
            ValueKind::Byte => "byte",
        }
    }

    /// `String`, `DateTime` e `Base64` são armazenados como string.
    pub fn is_string_encoded(self) -> bool {
        matches!(
            self,
            ValueKind::String | ValueKind::DateTime | ValueKind::Base64
        )
    }

    /// Valor zero/vazio usado quando o schema não traz `value`.
    pub fn default_value(self) -> TypedValue {
        match self {
            ValueKind::String | ValueKind::DateTime | ValueKind::Base64 => {
                TypedValue::String(String::new())
            }
            ValueKind::Int32 => TypedValue::Int32(0),
            ValueKind::UInt32 => TypedValue::UInt32(0),
            ValueKind::Bool => TypedValue::Bool(false),
            ValueKind::Int64 => TypedValue::Int64(0),
            ValueKind::UInt64 => TypedValue::UInt64(0),
            ValueKind::Float32 => TypedValue::Float32(0.0),
            ValueKind::Float64 => TypedValue::Float64(0.0),
            ValueKind::Byte => TypedValue::Byte(0),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ValueKind {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.name() == wanted)
            .ok_or(ValueError::UnknownKind(s.to_string()))
    }
}

// ──────────────────────────────────────────────
// Erros
// ──────────────────────────────────────────────

/// Erros de conversão entre representações.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValueError {
    #[error("Tipo incompatível: esperado {expected}, recebido {found}")]
    TypeMismatch {
        expected: ValueKind,
        found: &'static str,
    },

    #[error("Valor {value} fora do intervalo de {kind}")]
    OutOfRange { kind: ValueKind, value: String },

    #[error("Não foi possível interpretar '{text}' como {kind}")]
    Parse { kind: ValueKind, text: String },

    #[error("Tipo desconhecido: {0}")]
    UnknownKind(String),

    #[error("String com {len} bytes excede o limite de {max}")]
    TooLong { len: usize, max: usize },
}

// ──────────────────────────────────────────────
// Valor
// ──────────────────────────────────────────────

/// Valor tipado de uma propriedade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypedValue {
    String(String),
    Int32(i32),
    UInt32(u32),
    Bool(bool),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Byte(u8),
}

impl TypedValue {
    /// Nome da representação (não do tipo declarado).
    pub fn type_name(&self) -> &'static str {
        match self {
            TypedValue::String(_) => "string",
            TypedValue::Int32(_) => "int32",
            TypedValue::UInt32(_) => "uint32",
            TypedValue::Bool(_) => "bool",
            TypedValue::Int64(_) => "int64",
            TypedValue::UInt64(_) => "uint64",
            TypedValue::Float32(_) => "float32",
            TypedValue::Float64(_) => "float64",
            TypedValue::Byte(_) => "byte",
        }
    }

    /// `true` se a representação é exatamente a do tipo declarado.
    pub fn matches_kind(&self, kind: ValueKind) -> bool {
        match self {
            TypedValue::String(_) => kind.is_string_encoded(),
            TypedValue::Int32(_) => kind == ValueKind::Int32,
            TypedValue::UInt32(_) => kind == ValueKind::UInt32,
            TypedValue::Bool(_) => kind == ValueKind::Bool,
            TypedValue::Int64(_) => kind == ValueKind::Int64,
            TypedValue::UInt64(_) => kind == ValueKind::UInt64,
            TypedValue::Float32(_) => kind == ValueKind::Float32,
            TypedValue::Float64(_) => kind == ValueKind::Float64,
            TypedValue::Byte(_) => kind == ValueKind::Byte,
        }
    }

    fn as_integer(&self) -> Option<i128> {
        match *self {
            TypedValue::Int32(v) => Some(v.into()),
            TypedValue::UInt32(v) => Some(v.into()),
            TypedValue::Int64(v) => Some(v.into()),
            TypedValue::UInt64(v) => Some(v.into()),
            TypedValue::Byte(v) => Some(v.into()),
            _ => None,
        }
    }

    /// Converte para o tipo declarado `kind`.
    ///
    /// Inteiros convertem entre larguras com checagem de intervalo e floats
    /// entre precisões; qualquer outra troca de representação é rejeitada.
    pub fn coerce_to(self, kind: ValueKind) -> Result<TypedValue, ValueError> {
        if self.matches_kind(kind) {
            return self.within_limits();
        }

        let mismatch = ValueError::TypeMismatch {
            expected: kind,
            found: self.type_name(),
        };

        match kind {
            ValueKind::Int32
            | ValueKind::UInt32
            | ValueKind::Int64
            | ValueKind::UInt64
            | ValueKind::Byte => match self.as_integer() {
                Some(n) => integer_of_kind(kind, n),
                None => Err(mismatch),
            },
            ValueKind::Float32 => match self {
                TypedValue::Float64(v) => float32_from(v),
                _ => Err(mismatch),
            },
            ValueKind::Float64 => match self {
                TypedValue::Float32(v) => Ok(TypedValue::Float64(v.into())),
                _ => Err(mismatch),
            },
            _ => Err(mismatch),
        }
    }

    /// Rejeita strings acima de [`MAX_STRING_LEN`].
    pub fn within_limits(self) -> Result<TypedValue, ValueError> {
        match &self {
            TypedValue::String(s) if s.len() > MAX_STRING_LEN => Err(ValueError::TooLong {
                len: s.len(),
                max: MAX_STRING_LEN,
            }),
            _ => Ok(self),
        }
    }

    /// Interpreta texto livre (CLI) como valor do tipo `kind`.
    pub fn parse(kind: ValueKind, text: &str) -> Result<TypedValue, ValueError> {
        let parse_err = || ValueError::Parse {
            kind,
            text: text.to_string(),
        };
        let trimmed = text.trim();

        match kind {
            ValueKind::String | ValueKind::DateTime | ValueKind::Base64 => {
                Ok(TypedValue::String(text.to_string()))
            }
            ValueKind::Bool => match trimmed {
                "true" => Ok(TypedValue::Bool(true)),
                "false" => Ok(TypedValue::Bool(false)),
                _ => Err(parse_err()),
            },
            ValueKind::Float32 | ValueKind::Float64 => {
                let v: f64 = trimmed.parse().map_err(|_| parse_err())?;
                TypedValue::Float64(v).coerce_to(kind)
            }
            _ => {
                let n: i128 = trimmed.parse().map_err(|_| parse_err())?;
                integer_of_kind(kind, n)
            }
        }
    }
}

/// Constrói um inteiro do tipo `kind`, rejeitando valores fora do intervalo.
pub(crate) fn integer_of_kind(kind: ValueKind, n: i128) -> Result<TypedValue, ValueError> {
    let out_of_range = || ValueError::OutOfRange {
        kind,
        value: n.to_string(),
    };
    match kind {
        ValueKind::Int32 => i32::try_from(n).map(TypedValue::Int32).map_err(|_| out_of_range()),
        ValueKind::UInt32 => u32::try_from(n).map(TypedValue::UInt32).map_err(|_| out_of_range()),
        ValueKind::Int64 => i64::try_from(n).map(TypedValue::Int64).map_err(|_| out_of_range()),
        ValueKind::UInt64 => u64::try_from(n).map(TypedValue::UInt64).map_err(|_| out_of_range()),
        ValueKind::Byte => u8::try_from(n).map(TypedValue::Byte).map_err(|_| out_of_range()),
        other => Err(ValueError::TypeMismatch {
            expected: other,
            found: "integer",
        }),
    }
}

/// Estreita f64 → f32; valores finitos além de `f32::MAX` são rejeitados.
pub(crate) fn float32_from(v: f64) -> Result<TypedValue, ValueError> {
    if v.is_finite() && v.abs() > f64::from(f32::MAX) {
        return Err(ValueError::OutOfRange {
            kind: ValueKind::Float32,
            value: v.to_string(),
        });
    }
    Ok(TypedValue::Float32(v as f32))
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::String(s) => f.write_str(s),
            TypedValue::Int32(v) => write!(f, "{v}"),
            TypedValue::UInt32(v) => write!(f, "{v}"),
            TypedValue::Bool(v) => write!(f, "{v}"),
            TypedValue::Int64(v) => write!(f, "{v}"),
            TypedValue::UInt64(v) => write!(f, "{v}"),
            TypedValue::Float32(v) => write!(f, "{v:.6}"),
            TypedValue::Float64(v) => write!(f, "{v:.6}"),
            TypedValue::Byte(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for TypedValue {
    fn from(s: &str) -> Self {
        TypedValue::String(s.to_string())
    }
}

impl From<String> for TypedValue {
    fn from(s: String) -> Self {
        TypedValue::String(s)
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
