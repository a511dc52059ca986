//! Schema descriptors served by the HTTP endpoint.
//!
//! The engine never reflects over the entry type; whoever constructs the
//! stream supplies the descriptor (typically generated offline) and the
//! endpoint serves it verbatim.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Schema of a stream's entry type, with optional per-language renderings
/// keyed by the `schema_format` query value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub type_id: String,
    pub type_name: String,
    pub language: BTreeMap<String, String>,
}

impl SchemaDescriptor {
    pub fn new(type_id: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            type_name: type_name.into(),
            language: BTreeMap::new(),
        }
    }

    /// Descriptor derived from the Rust type name alone; the default when
    /// the stream owner supplies nothing richer.
    pub fn for_entry<E>() -> Self {
        Self::new("", std::any::type_name::<E>())
    }

    pub fn with_language(mut self, key: impl Into<String>, text: impl Into<String>) -> Self {
        self.language.insert(key.into(), text.into());
        self
    }
}

/// The compact schema shape returned for `schema_format=simple`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribableSchema {
    pub type_id: String,
    pub entry_name: String,
    pub namespace_name: String,
}

/// Body of the 404 answer for an unknown `schema_format` key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct SchemaFormatNotFound {
    pub error: String,
    pub unsupported_format_requested: Option<String>,
}

impl SchemaFormatNotFound {
    pub(crate) fn new(format: impl Into<String>) -> Self {
        Self {
            error: "Unsupported schema format requested.".to_string(),
            unsupported_format_requested: Some(format.into()),
        }
    }
}
