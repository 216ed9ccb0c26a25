//! Disease catalog: domain name to the diseases that can be chosen in it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// How often a disease is seen in practice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Rarity {
    VeryCommon,
    Common,
    Uncommon,
    Rare,
    VeryRare,
}

impl Rarity {
    pub const ALL: [Rarity; 5] =
        [Rarity::VeryCommon, Rarity::Common, Rarity::Uncommon, Rarity::Rare, Rarity::VeryRare];

    pub fn as_str(&self) -> &'static str {
        match self {
            Rarity::VeryCommon => "VeryCommon",
            Rarity::Common => "Common",
            Rarity::Uncommon => "Uncommon",
            Rarity::Rare => "Rare",
            Rarity::VeryRare => "VeryRare",
        }
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rarity label that is not one of the five known levels.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown rarity '{0}'")]
pub struct UnknownRarity(pub String);

impl FromStr for Rarity {
    type Err = UnknownRarity;

    /// Accepts `"Very Common"`, `"VeryCommon"`, `"very_common"`, `"very-common"`
    /// and the like.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .flat_map(char::to_lowercase)
            .collect();
        match folded.as_str() {
            "verycommon" => Ok(Rarity::VeryCommon),
            "common" => Ok(Rarity::Common),
            "uncommon" => Ok(Rarity::Uncommon),
            "rare" => Ok(Rarity::Rare),
            "veryrare" => Ok(Rarity::VeryRare),
            _ => Err(UnknownRarity(s.to_string())),
        }
    }
}

impl TryFrom<String> for Rarity {
    type Error = UnknownRarity;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One selectable disease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiseaseEntry {
    pub name: String,
    pub rarity: Rarity,
}

impl DiseaseEntry {
    pub fn new(name: impl Into<String>, rarity: Rarity) -> Self {
        Self { name: name.into(), rarity }
    }
}

/// Read-only mapping from domain to diseases.
///
/// Domains iterate in sorted order, so a seeded random source always sees the
/// same sequence of keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    domains: BTreeMap<String, Vec<DiseaseEntry>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a catalog document: `{"Cardiology": [{"name": ..., "rarity": ...}], ...}`.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Builder-style insert, replacing any existing entries for `domain`.
    pub fn with_domain(
        mut self,
        domain: impl Into<String>,
        diseases: impl IntoIterator<Item = DiseaseEntry>,
    ) -> Self {
        self.insert(domain, diseases);
        self
    }

    pub fn insert(
        &mut self,
        domain: impl Into<String>,
        diseases: impl IntoIterator<Item = DiseaseEntry>,
    ) {
        self.domains.insert(domain.into(), diseases.into_iter().collect());
    }

    /// Domain names in sorted order.
    pub fn domains(&self) -> impl Iterator<Item = &str> + '_ {
        self.domains.keys().map(String::as_str)
    }

    /// Diseases for an exact domain key.
    pub fn diseases(&self, domain: &str) -> Option<&[DiseaseEntry]> {
        self.domains.get(domain).map(Vec::as_slice)
    }

    pub fn contains_domain(&self, domain: &str) -> bool {
        self.domains.contains_key(domain)
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}
