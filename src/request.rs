//! Validation of incoming "generate a scenario" request bodies.

use crate::selector::{RaritySelection, UnknownRarity};
use serde::Deserialize;

/// Longest accepted domain name, in characters.
pub const MAX_DOMAIN_LEN: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("malformed request body: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error(transparent)]
    UnknownRarity(#[from] UnknownRarity),
    #[error("domain is longer than {} characters", MAX_DOMAIN_LEN)]
    DomainTooLong,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRequest {
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    rarity: Option<String>,
}

/// A validated generation request.
///
/// `domain: None` means no preference; umbrella names such as `"General"` are
/// kept as given and resolved by the selector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioRequest {
    pub domain: Option<String>,
    pub rarity: RaritySelection,
}

impl ScenarioRequest {
    pub fn new(domain: Option<&str>, rarity: RaritySelection) -> Self {
        Self { domain: domain.map(str::to_string), rarity }
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Self, RequestError> {
        let raw = RawRequest::deserialize(value)?;
        Self::from_raw(raw)
    }

    pub fn from_json_str(body: &str) -> Result<Self, RequestError> {
        let raw: RawRequest = serde_json::from_str(body)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawRequest) -> Result<Self, RequestError> {
        let domain = raw.domain.map(|d| d.trim().to_string()).filter(|d| !d.is_empty());
        if domain.as_ref().is_some_and(|d| d.chars().count() > MAX_DOMAIN_LEN) {
            return Err(RequestError::DomainTooLong);
        }
        let rarity = match raw.rarity {
            Some(label) => label.parse()?,
            None => RaritySelection::Any,
        };
        Ok(Self { domain, rarity })
    }
}
