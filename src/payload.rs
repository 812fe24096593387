use crate::error::{ Error, Result };

use serde::{ Deserialize, Serialize };
use serde_json::{ json, Value };
use std::path::Path;

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Field that receives a fresh session id in the default chat payload.
pub const DEFAULT_SESSION_FIELD: &str = "sessionId";

/// Key fragments (lowercase) whose values never reach a snapshot.
const SENSITIVE_KEYS: [&str; 6] = ["token", "secret", "password", "apikey", "api_key", "authorization"];
const MASK: &str = "***";

/// The JSON body sent with every request of a run.
///
/// When `session_field` is set, each request gets its own session id written
/// into that field of the template's top-level object (or of every object in a
/// top-level array), so the target never sees two requests share a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub content_type: String,
    pub template: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_field: Option<String>,
}

impl Default for Payload {
    fn default() -> Self {
        Payload {
            content_type: JSON_CONTENT_TYPE.to_string(),
            template: json!([{ "action": "sendMessage", "chatInput": "Hi" }]),
            session_field: Some(DEFAULT_SESSION_FIELD.to_string()),
        }
    }
}

impl Payload {
    /// Build a payload from an inline JSON document.
    pub fn from_json(raw: &str, session_field: Option<String>) -> Result<Self> {
        let template: Value = serde_json
            ::from_str(raw)
            .map_err(|e| Error::input(format!("payload is not valid JSON: {e}")))?;
        Self::with_template(template, session_field)
    }

    /// Build a payload from a JSON file on disk.
    pub fn from_file(path: &Path, session_field: Option<String>) -> Result<Self> {
        let raw = std::fs
            ::read_to_string(path)
            .map_err(|e| Error::input(format!("cannot read payload {}: {e}", path.display())))?;
        Self::from_json(&raw, session_field)
    }

    fn with_template(template: Value, session_field: Option<String>) -> Result<Self> {
        if let Some(field) = &session_field {
            let injectable = match &template {
                Value::Object(_) => true,
                Value::Array(items) => items.iter().all(Value::is_object),
                _ => false,
            };
            if !injectable {
                return Err(
                    Error::input(
                        format!("session field \"{field}\" needs an object or an array of objects as payload")
                    )
                );
            }
        }
        Ok(Payload {
            content_type: JSON_CONTENT_TYPE.to_string(),
            template,
            session_field,
        })
    }

    /// Allocate a session id for one request, if this payload uses them.
    pub fn new_session_id(&self) -> Option<String> {
        self.session_field.as_ref().map(|_| uuid::Uuid::new_v4().simple().to_string())
    }

    /// Copy suitable for persisting: values under credential-like keys are masked.
    pub fn redacted(&self) -> Payload {
        let mut template = self.template.clone();
        mask_sensitive(&mut template);
        Payload { template, ..self.clone() }
    }

    /// Serialize the body for one request.
    pub fn render(&self, session_id: Option<&str>) -> Vec<u8> {
        let body = match (&self.session_field, session_id) {
            (Some(field), Some(id)) => {
                let mut body = self.template.clone();
                inject(&mut body, field, id);
                body
            }
            _ => self.template.clone(),
        };
        // Value -> bytes cannot fail: keys are always strings.
        serde_json::to_vec(&body).unwrap_or_default()
    }
}

fn mask_sensitive(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, item) in map.iter_mut() {
                let key = key.to_ascii_lowercase();
                if SENSITIVE_KEYS.iter().any(|k| key.contains(k)) {
                    *item = Value::String(MASK.to_string());
                } else {
                    mask_sensitive(item);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(mask_sensitive),
        _ => {}
    }
}

fn inject(value: &mut Value, field: &str, id: &str) {
    match value {
        Value::Object(map) => {
            map.insert(field.to_string(), Value::String(id.to_string()));
        }
        Value::Array(items) => {
            for item in items {
                inject(item, field, id);
            }
        }
        _ => {}
    }
}
