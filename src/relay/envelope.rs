use std::fmt;

use serde_json::Value;

use crate::config::{EnvelopeShape, RelaySettings};

const NESTED_CONTAINER: &str = "payload";

/// Locates the target identity inside an event, for one fixed shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    shape: EnvelopeShape,
    field: String,
}

impl Envelope {
    pub fn new(shape: EnvelopeShape, field: impl Into<String>) -> Self {
        Self {
            shape,
            field: field.into(),
        }
    }

    pub fn from_settings(settings: &RelaySettings) -> Self {
        Self::new(settings.envelope, settings.identity_field.clone())
    }

    /// The target identity, if the event has the configured shape and the
    /// field is a non-empty string.
    pub fn target<'a>(&self, event: &'a Value) -> Option<&'a str> {
        let container = match self.shape {
            EnvelopeShape::Flat => event,
            EnvelopeShape::Nested => event.get(NESTED_CONTAINER)?,
        };
        container
            .get(&self.field)?
            .as_str()
            .filter(|target| !target.is_empty())
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shape {
            EnvelopeShape::Flat => write!(f, "`{}`", self.field),
            EnvelopeShape::Nested => write!(f, "`{NESTED_CONTAINER}.{}`", self.field),
        }
    }
}
