//! Manifest-keyed polymorphic (de)serialization.
//!
//! Every command, event and response travels as a [`ManifestWrapper`]: the
//! manifest names the concrete type and the content is its [`Value`] form.
//! A [`ManifestRegistry`] is an explicit map from manifest to decoder,
//! filled once at startup and read-only afterwards.

use crate::value::Value;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Errors raised while encoding or decoding messages.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SerializationError {
    #[error("unknown manifest '{manifest}' in {registry} registry")]
    UnknownManifest {
        manifest: String,
        registry: &'static str,
    },
    #[error("manifest '{manifest}' is registered twice in {registry} registry")]
    DuplicateManifest {
        manifest: String,
        registry: &'static str,
    },
    #[error("cannot decode '{manifest}': {message}")]
    Decode { manifest: String, message: String },
    #[error("cannot encode '{manifest}': {message}")]
    Encode { manifest: String, message: String },
}

/// A message with the type tag it is registered under.
pub trait Manifested {
    fn manifest(&self) -> &'static str;
}

/// Wire envelope: manifest plus content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestWrapper {
    pub manifest: String,
    pub content: Value,
}

impl ManifestWrapper {
    /// Wraps a message using its own manifest.
    pub fn wrap<T: Serialize + Manifested>(message: &T) -> Result<Self, SerializationError> {
        let manifest = message.manifest();
        let content = Value::from_serde(message).map_err(|e| SerializationError::Encode {
            manifest: manifest.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            manifest: manifest.to_string(),
            content,
        })
    }

    /// Wire form as a single value with a top-level `manifest` field.
    pub fn to_value(&self) -> Value {
        Value::Map(
            crate::value::ValueMap::new()
                .with("manifest", self.manifest.as_str())
                .with("content", self.content.clone()),
        )
    }

    /// Reads the wire form produced by [`ManifestWrapper::to_value`].
    pub fn from_value(value: &Value) -> Result<Self, SerializationError> {
        let manifest = value
            .get("manifest")
            .and_then(Value::as_str)
            .ok_or_else(|| SerializationError::Decode {
                manifest: String::new(),
                message: "message has no manifest field".to_string(),
            })?;
        Ok(Self {
            manifest: manifest.to_string(),
            content: value.get("content").cloned().unwrap_or_default(),
        })
    }
}

/// Decoder for one manifest.
pub type Decoder<T> = fn(Value) -> Result<T, SerializationError>;

/// Decodes a value with serde. Used as the decoder for serde-tagged families.
pub fn decode_serde<T: DeserializeOwned>(value: Value) -> Result<T, SerializationError> {
    value.to_serde().map_err(|e| SerializationError::Decode {
        manifest: String::new(),
        message: e.to_string(),
    })
}

/// String-keyed decoder table.
pub struct ManifestRegistry<T> {
    name: &'static str,
    decoders: HashMap<&'static str, Decoder<T>>,
}

impl<T> ManifestRegistry<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            decoders: HashMap::new(),
        }
    }

    /// Registers a decoder. A manifest can only be registered once.
    pub fn register(
        &mut self,
        manifest: &'static str,
        decoder: Decoder<T>,
    ) -> Result<&mut Self, SerializationError> {
        if self.decoders.insert(manifest, decoder).is_some() {
            return Err(SerializationError::DuplicateManifest {
                manifest: manifest.to_string(),
                registry: self.name,
            });
        }
        Ok(self)
    }

    /// Registers the same decoder under several manifests.
    pub fn register_all(
        &mut self,
        manifests: &[&'static str],
        decoder: Decoder<T>,
    ) -> Result<&mut Self, SerializationError> {
        for manifest in manifests {
            self.register(manifest, decoder)?;
        }
        Ok(self)
    }

    pub fn contains(&self, manifest: &str) -> bool {
        self.decoders.contains_key(manifest)
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Decodes content registered under `manifest`.
    pub fn decode(&self, manifest: &str, content: Value) -> Result<T, SerializationError> {
        let decoder = self
            .decoders
            .get(manifest)
            .ok_or_else(|| SerializationError::UnknownManifest {
                manifest: manifest.to_string(),
                registry: self.name,
            })?;
        decoder(content).map_err(|e| match e {
            SerializationError::Decode { message, .. } => SerializationError::Decode {
                manifest: manifest.to_string(),
                message,
            },
            other => other,
        })
    }

    pub fn decode_wrapper(&self, wrapper: ManifestWrapper) -> Result<T, SerializationError> {
        self.decode(&wrapper.manifest, wrapper.content)
    }
}

#[cfg(test)]
#[path = "tests/serialization_tests.rs"]
mod tests;
