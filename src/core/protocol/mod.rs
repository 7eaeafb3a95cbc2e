//! Connector control protocol.
//!
//! Connectors write one JSON object per line to stdout. Every object carries a
//! `type` tag and, depending on the tag, one payload field. The decoding
//! pipeline is two spawned stages joined by bounded channels:
//!
//! - [`read_messages`]: raw lines -> [`ProtocolMessage`], skipping lines that
//!   do not decode
//! - [`read_records`]: messages -> [`Record`], keeping only data-bearing
//!   `RECORD` messages

mod filter;
mod reader;

pub use filter::read_records;
pub use reader::{read_messages, split_lines};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Record,
    Log,
    ConnectionStatus,
    #[serde(alias = "SCHEMA")]
    Catalog,
    State,
    Validate,
    Spec,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Record => "RECORD",
            MessageType::Log => "LOG",
            MessageType::ConnectionStatus => "CONNECTION_STATUS",
            MessageType::Catalog => "CATALOG",
            MessageType::State => "STATE",
            MessageType::Validate => "VALIDATE",
            MessageType::Spec => "SPEC",
        }
    }
}

/// One row of personal data emitted by a connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub schema_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_group: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// A table/collection discovered in a silo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default)]
    pub json_schema: Value,
}

impl Schema {
    /// Top-level property names declared by the JSON schema, sorted.
    pub fn property_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .json_schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names.dedup();
        names
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemasMessage {
    #[serde(default)]
    pub schemas: Vec<Schema>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateMessage {
    pub status: ValidationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiloSpecMessage {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub spec: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMessage {
    #[serde(default)]
    pub level: Option<String>,
    pub message: String,
}

/// One decoded line of connector output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Record>,
    #[serde(default, alias = "catalog", skip_serializing_if = "Option::is_none")]
    pub schema_msg: Option<SchemasMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validate_msg: Option<ValidateMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<SiloSpecMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<LogMessage>,
    // Flat VALIDATE form: `{"type":"VALIDATE","status":"SUCCESS","message":...}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ValidationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProtocolMessage {
    pub fn record(record: Record) -> Self {
        Self::empty(MessageType::Record).with_record(record)
    }

    fn empty(kind: MessageType) -> Self {
        Self {
            kind,
            record: None,
            schema_msg: None,
            validate_msg: None,
            spec: None,
            log: None,
            status: None,
            message: None,
        }
    }

    fn with_record(mut self, record: Record) -> Self {
        self.record = Some(record);
        self
    }

    /// Validation report carried by a VALIDATE message, in either the nested
    /// (`validate_msg`) or flat (`status`/`message`) form.
    pub fn validation(&self) -> Option<ValidateMessage> {
        if self.kind != MessageType::Validate {
            return None;
        }
        if let Some(report) = &self.validate_msg {
            return Some(report.clone());
        }
        self.status.map(|status| ValidateMessage {
            status,
            message: self.message.clone(),
        })
    }

    /// Schemas carried by a CATALOG (or SCHEMA) message.
    pub fn schemas(&self) -> Option<&[Schema]> {
        if self.kind != MessageType::Catalog {
            return None;
        }
        self.schema_msg.as_ref().map(|m| m.schemas.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_record_message() {
        let line = r#"{"type":"RECORD","record":{"schema_name":"users","schema_group":"public","data":{"email":"a@b.c"}}}"#;
        let msg: ProtocolMessage = serde_json::from_str(line).unwrap();
        assert_eq!(msg.kind, MessageType::Record);
        let record = msg.record.unwrap();
        assert_eq!(record.schema_name, "users");
        assert_eq!(record.schema_group.as_deref(), Some("public"));
        assert_eq!(record.data["email"], "a@b.c");
    }

    #[test]
    fn schema_type_is_an_alias_of_catalog() {
        let line = r#"{"type":"SCHEMA","schema_msg":{"schemas":[{"name":"users","json_schema":{"properties":{"id":{},"email":{}}}}]}}"#;
        let msg: ProtocolMessage = serde_json::from_str(line).unwrap();
        assert_eq!(msg.kind, MessageType::Catalog);
        let schemas = msg.schemas().unwrap();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].property_names(), vec!["email", "id"]);
    }

    #[test]
    fn validation_reads_nested_and_flat_forms() {
        let nested: ProtocolMessage = serde_json::from_str(
            r#"{"type":"VALIDATE","validate_msg":{"status":"FAILURE","message":"bad password"}}"#,
        )
        .unwrap();
        assert_eq!(
            nested.validation(),
            Some(ValidateMessage {
                status: ValidationStatus::Failure,
                message: Some("bad password".to_string()),
            })
        );

        let flat: ProtocolMessage =
            serde_json::from_str(r#"{"type":"VALIDATE","status":"SUCCESS"}"#).unwrap();
        assert_eq!(flat.validation().unwrap().status, ValidationStatus::Success);
    }

    #[test]
    fn validation_is_none_for_other_types() {
        let msg: ProtocolMessage =
            serde_json::from_str(r#"{"type":"LOG","status":"SUCCESS"}"#).unwrap();
        assert!(msg.validation().is_none());
    }

    #[test]
    fn unknown_type_does_not_decode() {
        assert!(serde_json::from_str::<ProtocolMessage>(r#"{"type":"TRACE"}"#).is_err());
        assert!(serde_json::from_str::<ProtocolMessage>(r#"{"record":{}}"#).is_err());
    }

    #[test]
    fn schema_without_properties_has_no_property_names() {
        let schema = Schema {
            name: "events".to_string(),
            group: None,
            json_schema: serde_json::json!({"type": "object"}),
        };
        assert!(schema.property_names().is_empty());
    }
}
