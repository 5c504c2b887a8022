use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::core::error::RoamError;

/// Placeholder values the controller reports for a station with no association.
const UNKNOWN_AP_VALUES: &[&str] = &["NA", "NOT-ASSOCIATED"];

/// A client station, flattened from its `shelf.resource.port` triple.
#[derive(Debug, Display, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[display("{_0}")]
#[serde(transparent)]
pub struct StationId(String);

impl StationId {
    /// Parse and validate a `shelf.resource.port` identifier such as `1.1.sta0000`.
    pub fn parse(raw: &str) -> Result<Self, RoamError> {
        let id = Self(raw.trim().to_string());
        id.parts()?;
        Ok(id)
    }

    /// Split into `(shelf, resource, port)`.
    pub fn parts(&self) -> Result<(&str, &str, &str), RoamError> {
        let mut it = self.0.splitn(3, '.');
        match (it.next(), it.next(), it.next()) {
            (Some(shelf), Some(resource), Some(port))
                if !shelf.is_empty() && !resource.is_empty() && !port.is_empty() =>
            {
                Ok((shelf, resource, port))
            }
            _ => Err(RoamError::InvalidStation {
                id: self.0.clone(),
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Serial (optionally `shelf.resource.serial`) of an attenuator device.
#[derive(Debug, Display, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[display("{_0}")]
#[serde(transparent)]
pub struct AttenuatorId(String);

impl AttenuatorId {
    pub fn new(serial: impl Into<String>) -> Self {
        Self(serial.into().trim().to_string())
    }

    /// Split into `(shelf, resource, serial)`, defaulting shelf and resource to 1
    /// when only the bare serial was configured.
    pub fn parts(&self) -> (&str, &str, &str) {
        let mut it = self.0.splitn(3, '.');
        match (it.next(), it.next(), it.next()) {
            (Some(shelf), Some(resource), Some(serial)) => (shelf, resource, serial),
            _ => ("1", "1", self.0.as_str()),
        }
    }

    /// Whether both ids name the same device once shelf and resource defaults are applied.
    pub fn same_device(&self, other: &AttenuatorId) -> bool {
        self.parts() == other.parts()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// An upper-cased, colon-separated access point identifier.
#[derive(Debug, Display, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[display("{_0}")]
#[serde(transparent)]
pub struct Bssid(String);

impl Bssid {
    /// Normalize the controller's textual BSSID.
    ///
    /// Values that are not 17 characters long get every colon-delimited group
    /// shorter than two characters left-padded with a zero. Returns `None` for
    /// empty or placeholder values and for anything that does not have six groups.
    pub fn normalize(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() || UNKNOWN_AP_VALUES.contains(&raw.to_ascii_uppercase().as_str()) {
            return None;
        }

        let joined = if raw.len() == 17 {
            raw.to_string()
        } else {
            raw.split(':')
                .map(|group| {
                    if group.len() < 2 {
                        format!("{group:0>2}")
                    } else {
                        group.to_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(":")
        };

        if joined.split(':').count() != 6 {
            return None;
        }
        Some(Self(joined.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
