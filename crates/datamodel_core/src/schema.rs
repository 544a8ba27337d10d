//! Carregamento do schema de data models (JSON).
//!
//! Formato:
//!
//! ```text
//! [ { "name": "Device.X.Y", "type": 0..10, "value": <opcional> }, ... ]
//! ```
//!
//! A carga é tudo-ou-nada: qualquer registro inválido aborta o arquivo inteiro
//! e nenhuma definição é devolvida.

use crate::registry::{MAX_NAME_LEN, PropertyDefinition};
use crate::value::{TypedValue, ValueError, ValueKind, float32_from, integer_of_kind};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Nome padrão do schema, relativo ao diretório de trabalho.
pub const DEFAULT_SCHEMA_FILE: &str = "datamodels.json";

/// Erros de carga do schema. Todos são fatais na inicialização.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Falha ao ler {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON inválido: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Raiz do JSON não é um array")]
    NotAnArray,

    #[error("Nenhum data model encontrado no JSON")]
    Empty,

    #[error("Item {index} não é um objeto")]
    NotAnObject { index: usize },

    #[error("Nome inválido no item {index}: {reason}")]
    InvalidName { index: usize, reason: String },

    #[error("Tipo inválido no item {index}: {found}")]
    InvalidType { index: usize, found: String },

    #[error("Valor inválido no item {index} ({name}): {source}")]
    InvalidValue {
        index: usize,
        name: String,
        #[source]
        source: ValueError,
    },

    #[error("Nome duplicado no registro: {0}")]
    DuplicateName(String),
}

/// Classe do erro: documento ilegível ou conteúdo inválido.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorClass {
    Parse,
    Validation,
}

impl SchemaError {
    pub fn class(&self) -> SchemaErrorClass {
        match self {
            SchemaError::Io { .. } | SchemaError::Parse(_) => SchemaErrorClass::Parse,
            _ => SchemaErrorClass::Validation,
        }
    }
}

// ──────────────────────────────────────────────
// Carga
// ──────────────────────────────────────────────

/// Lê e valida o schema em `path`.
pub fn load_file(path: &Path) -> Result<Vec<PropertyDefinition>, SchemaError> {
    let content = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let definitions = load_str(&content)?;
    info!(
        "Schema carregado de {}: {} data models",
        path.display(),
        definitions.len()
    );
    Ok(definitions)
}

pub fn load_str(document: &str) -> Result<Vec<PropertyDefinition>, SchemaError> {
    let root: Value = serde_json::from_str(document)?;
    load_value(&root)
}

/// Valida um documento já parseado.
pub fn load_value(root: &Value) -> Result<Vec<PropertyDefinition>, SchemaError> {
    let items = root.as_array().ok_or(SchemaError::NotAnArray)?;
    if items.is_empty() {
        return Err(SchemaError::Empty);
    }

    items
        .iter()
        .enumerate()
        .map(|(index, item)| parse_record(index, item))
        .collect()
}

fn parse_record(index: usize, item: &Value) -> Result<PropertyDefinition, SchemaError> {
    let record = item
        .as_object()
        .ok_or(SchemaError::NotAnObject { index })?;

    let name = match record.get("name") {
        Some(Value::String(name)) => name,
        Some(other) => {
            return Err(SchemaError::InvalidName {
                index,
                reason: format!("esperado string, recebido {}", json_type(other)),
            });
        }
        None => {
            return Err(SchemaError::InvalidName {
                index,
                reason: "campo ausente".into(),
            });
        }
    };
    validate_name(index, name)?;

    let kind = match record.get("type") {
        Some(code) => code
            .as_u64()
            .and_then(ValueKind::from_code)
            .ok_or_else(|| SchemaError::InvalidType {
                index,
                found: code.to_string(),
            })?,
        None => {
            return Err(SchemaError::InvalidType {
                index,
                found: "ausente".into(),
            });
        }
    };

    let value = value_for_kind(kind, record.get("value")).map_err(|source| {
        SchemaError::InvalidValue {
            index,
            name: name.clone(),
            source,
        }
    })?;

    debug!("Item {index}: {name} ({kind}) = {value}");
    Ok(PropertyDefinition::stored(name.as_str(), kind, value))
}

fn validate_name(index: usize, name: &str) -> Result<(), SchemaError> {
    if name.is_empty() {
        return Err(SchemaError::InvalidName {
            index,
            reason: "nome vazio".into(),
        });
    }
    if name.len() > MAX_NAME_LEN {
        return Err(SchemaError::InvalidName {
            index,
            reason: format!("{} bytes (máximo {MAX_NAME_LEN})", name.len()),
        });
    }
    Ok(())
}

/// Converte o `value` do JSON para o tipo declarado; ausente ou `null` usa
/// o valor padrão do tipo.
fn value_for_kind(kind: ValueKind, raw: Option<&Value>) -> Result<TypedValue, ValueError> {
    let raw = match raw {
        None | Some(Value::Null) => return Ok(kind.default_value()),
        Some(raw) => raw,
    };

    let mismatch = || ValueError::TypeMismatch {
        expected: kind,
        found: json_type(raw),
    };

    match kind {
        ValueKind::String | ValueKind::DateTime | ValueKind::Base64 => match raw {
            Value::String(s) => TypedValue::String(s.clone()).within_limits(),
            _ => Err(mismatch()),
        },
        ValueKind::Bool => raw.as_bool().map(TypedValue::Bool).ok_or_else(mismatch),
        ValueKind::Float32 => raw.as_f64().ok_or_else(mismatch).and_then(float32_from),
        ValueKind::Float64 => raw.as_f64().map(TypedValue::Float64).ok_or_else(mismatch),
        ValueKind::Int32
        | ValueKind::UInt32
        | ValueKind::Int64
        | ValueKind::UInt64
        | ValueKind::Byte => {
            let Value::Number(number) = raw else {
                return Err(mismatch());
            };
            if let Some(n) = number.as_i64() {
                integer_of_kind(kind, n.into())
            } else if let Some(n) = number.as_u64() {
                integer_of_kind(kind, n.into())
            } else {
                integral_float(kind, number.as_f64().unwrap_or(f64::NAN))
            }
        }
    }
}

/// Números em notação de ponto flutuante (`1e3`, `5000000000.0`) só são
/// aceitos para tipos inteiros se forem inteiros exatos.
fn integral_float(kind: ValueKind, v: f64) -> Result<TypedValue, ValueError> {
    if !v.is_finite() || v.fract() != 0.0 || v.abs() > 1e38 {
        return Err(ValueError::OutOfRange {
            kind,
            value: v.to_string(),
        });
    }
    integer_of_kind(kind, v as i128)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{AccessMode, Accessor};
    use std::io::Write;

    fn stored_value(def: &PropertyDefinition) -> &TypedValue {
        match &def.accessor {
            Accessor::Stored(v) => v,
            Accessor::Live(_) => panic!("{} não deveria ser live", def.name),
        }
    }

    #[test]
    fn loads_every_kind() {
        let doc = r#"[
            {"name": "Device.S",   "type": 0,  "value": "init"},
            {"name": "Device.I",   "type": 1,  "value": -2147483648},
            {"name": "Device.U",   "type": 2,  "value": 4294967295},
            {"name": "Device.B",   "type": 3,  "value": true},
            {"name": "Device.DT",  "type": 4,  "value": "2024-02-07T23:52:32"},
            {"name": "Device.B64", "type": 5,  "value": "aGVsbG8="},
            {"name": "Device.L",   "type": 6,  "value": -9000000000},
            {"name": "Device.UL",  "type": 7,  "value": 18446744073709551615},
            {"name": "Device.F",   "type": 8,  "value": 1.5},
            {"name": "Device.D",   "type": 9,  "value": 2.25},
            {"name": "Device.Y",   "type": 10, "value": 255}
        ]"#;
        let defs = load_str(doc).unwrap();

        let expected = [
            TypedValue::from("init"),
            TypedValue::Int32(i32::MIN),
            TypedValue::UInt32(u32::MAX),
            TypedValue::Bool(true),
            TypedValue::from("2024-02-07T23:52:32"),
            TypedValue::from("aGVsbG8="),
            TypedValue::Int64(-9_000_000_000),
            TypedValue::UInt64(u64::MAX),
            TypedValue::Float32(1.5),
            TypedValue::Float64(2.25),
            TypedValue::Byte(255),
        ];
        assert_eq!(defs.len(), expected.len());
        for (def, want) in defs.iter().zip(expected.iter()) {
            assert_eq!(stored_value(def), want, "{}", def.name);
            assert_eq!(def.access(), AccessMode::ReadWrite);
        }
        assert_eq!(defs[4].kind, ValueKind::DateTime);
        assert_eq!(defs[5].kind, ValueKind::Base64);
    }

    #[test]
    fn missing_value_uses_defaults() {
        let doc = r#"[
            {"name": "Device.S", "type": 0},
            {"name": "Device.B", "type": 3},
            {"name": "Device.U", "type": 7, "value": null}
        ]"#;
        let defs = load_str(doc).unwrap();
        assert_eq!(stored_value(&defs[0]), &TypedValue::from(""));
        assert_eq!(stored_value(&defs[1]), &TypedValue::Bool(false));
        assert_eq!(stored_value(&defs[2]), &TypedValue::UInt64(0));
    }

    #[test]
    fn invalid_type_code_aborts_whole_load() {
        let doc = r#"[
            {"name": "Device.Ok", "type": 0, "value": "x"},
            {"name": "Device.Bad", "type": 99}
        ]"#;
        let err = load_str(doc).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidType { index: 1, .. }));
        assert_eq!(err.class(), SchemaErrorClass::Validation);
    }

    #[test]
    fn fractional_or_negative_type_code_is_rejected() {
        assert!(matches!(
            load_str(r#"[{"name": "Device.X", "type": 1.5}]"#),
            Err(SchemaError::InvalidType { .. })
        ));
        assert!(matches!(
            load_str(r#"[{"name": "Device.X", "type": -1}]"#),
            Err(SchemaError::InvalidType { .. })
        ));
        assert!(matches!(
            load_str(r#"[{"name": "Device.X", "type": "0"}]"#),
            Err(SchemaError::InvalidType { .. })
        ));
    }

    #[test]
    fn int32_out_of_range_aborts_load() {
        let doc = r#"[
            {"name": "Device.Ok", "type": 0},
            {"name": "Device.Big", "type": 1, "value": 5000000000}
        ]"#;
        match load_str(doc) {
            Err(SchemaError::InvalidValue { index, name, source }) => {
                assert_eq!(index, 1);
                assert_eq!(name, "Device.Big");
                assert!(matches!(source, ValueError::OutOfRange { kind: ValueKind::Int32, .. }));
            }
            other => panic!("esperado InvalidValue, recebido {other:?}"),
        }
    }

    #[test]
    fn oversized_string_value_aborts_load() {
        let doc = serde_json::json!([
            {"name": "Device.Blob", "type": 5, "value": "A".repeat(crate::value::MAX_STRING_LEN + 1)}
        ]);
        assert!(matches!(
            load_value(&doc),
            Err(SchemaError::InvalidValue { source: ValueError::TooLong { .. }, .. })
        ));
    }

    #[test]
    fn numeric_ranges_are_enforced() {
        let cases = [
            r#"[{"name": "Device.X", "type": 2, "value": -1}]"#,
            r#"[{"name": "Device.X", "type": 10, "value": 256}]"#,
            r#"[{"name": "Device.X", "type": 7, "value": -5}]"#,
            r#"[{"name": "Device.X", "type": 1, "value": 1.5}]"#,
            r#"[{"name": "Device.X", "type": 8, "value": 1e300}]"#,
        ];
        for doc in cases {
            assert!(
                matches!(load_str(doc), Err(SchemaError::InvalidValue { .. })),
                "{doc}"
            );
        }
    }

    #[test]
    fn integral_float_notation_is_accepted() {
        let defs = load_str(r#"[{"name": "Device.X", "type": 6, "value": 1e3}]"#).unwrap();
        assert_eq!(stored_value(&defs[0]), &TypedValue::Int64(1000));
    }

    #[test]
    fn value_of_wrong_json_type_is_rejected() {
        let cases = [
            r#"[{"name": "Device.X", "type": 1, "value": "12"}]"#,
            r#"[{"name": "Device.X", "type": 3, "value": 1}]"#,
            r#"[{"name": "Device.X", "type": 0, "value": 12}]"#,
        ];
        for doc in cases {
            assert!(
                matches!(load_str(doc), Err(SchemaError::InvalidValue { .. })),
                "{doc}"
            );
        }
    }

    #[test]
    fn structural_errors() {
        assert!(matches!(load_str("{}"), Err(SchemaError::NotAnArray)));
        assert!(matches!(load_str("[]"), Err(SchemaError::Empty)));
        assert!(matches!(
            load_str(r#"[{"name": "Device.X", "type": 0}, 42]"#),
            Err(SchemaError::NotAnObject { index: 1 })
        ));
        assert!(matches!(
            load_str(r#"[{"type": 0}]"#),
            Err(SchemaError::InvalidName { index: 0, .. })
        ));
        assert!(matches!(
            load_str(r#"[{"name": 7, "type": 0}]"#),
            Err(SchemaError::InvalidName { .. })
        ));
        assert!(matches!(
            load_str(r#"[{"name": "", "type": 0}]"#),
            Err(SchemaError::InvalidName { .. })
        ));
    }

    #[test]
    fn overlong_name_is_rejected() {
        let name = format!("Device.{}", "x".repeat(MAX_NAME_LEN));
        let doc = format!(r#"[{{"name": "{name}", "type": 0}}]"#);
        assert!(matches!(load_str(&doc), Err(SchemaError::InvalidName { .. })));

        let exact = "y".repeat(MAX_NAME_LEN);
        let doc = format!(r#"[{{"name": "{exact}", "type": 0}}]"#);
        assert_eq!(load_str(&doc).unwrap()[0].name.len(), MAX_NAME_LEN);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = load_str("[{\"name\": ").unwrap_err();
        assert!(matches!(err, SchemaError::Parse(_)));
        assert_eq!(err.class(), SchemaErrorClass::Parse);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"name": "Device.Test.Property", "type": 0, "value": "init"}}]"#
        )
        .unwrap();

        let defs = load_file(file.path()).unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "Device.Test.Property");
    }

    #[test]
    fn missing_file_is_a_parse_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = load_file(&dir.path().join(DEFAULT_SCHEMA_FILE)).unwrap_err();
        assert!(matches!(err, SchemaError::Io { .. }));
        assert_eq!(err.class(), SchemaErrorClass::Parse);
    }
}
