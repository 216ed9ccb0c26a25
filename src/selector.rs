//! Weighted, recency-aware scenario selection.
//!
//! Selection runs four steps against a read-only [`Catalog`]:
//!
//! 1. Resolve the domain. An umbrella request (`General`, `Any`, empty) or an
//!    unknown domain is replaced by a uniformly chosen catalog domain.
//! 2. Drop diseases the session saw recently. If that leaves nothing, use the
//!    whole domain again.
//! 3. Resolve rarity. `Any` draws a [`RarityBand`] by weight (60/30/5/5) over the
//!    bands that have candidates, then a disease uniformly within it. A specific
//!    rarity filters to that rarity, widening back if nothing matches.
//! 4. Remember the pick in the session's [`RecentHistory`].
//!
//! Every narrowing step uses [`filter_with_fallback`], so selection only fails
//! when the catalog itself has nothing to offer.
//!
//! ```
//! use rand::{rngs::StdRng, SeedableRng};
//! use scenario_governor::selector::{
//!     pick_with_rng, Catalog, DiseaseEntry, Rarity, RaritySelection, RecentHistory,
//! };
//!
//! let catalog = Catalog::new().with_domain(
//!     "Cardiology",
//!     [
//!         DiseaseEntry::new("Myocardial Infarction", Rarity::Common),
//!         DiseaseEntry::new("Pericarditis", Rarity::Rare),
//!     ],
//! );
//! let mut history = RecentHistory::new();
//! let mut rng = StdRng::seed_from_u64(7);
//! let pick = pick_with_rng(
//!     &catalog,
//!     Some("Cardiology"),
//!     RaritySelection::Exactly(Rarity::Common),
//!     &mut history,
//!     &mut rng,
//! )
//! .unwrap();
//! assert_eq!(pick.disease_name, "Myocardial Infarction");
//! assert!(history.contains("Myocardial Infarction"));
//! ```

use rand::seq::IndexedRandom;
use rand::Rng;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, trace};

pub mod catalog;
pub mod fallback;
pub mod history;

pub use catalog::{Catalog, DiseaseEntry, Rarity, UnknownRarity};
pub use fallback::{filter_with_fallback, Narrowed};
pub use history::{RecentHistory, RECENT_HISTORY_CAPACITY};

/// Domain names that mean "no preference".
const UMBRELLA_DOMAINS: [&str; 2] = ["general", "any"];

/// Requested rarity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RaritySelection {
    /// Weighted draw across rarity bands.
    #[default]
    Any,
    /// Prefer exactly this rarity.
    Exactly(Rarity),
}

impl FromStr for RaritySelection {
    type Err = UnknownRarity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("any") {
            return Ok(RaritySelection::Any);
        }
        trimmed.parse().map(RaritySelection::Exactly)
    }
}

impl fmt::Display for RaritySelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaritySelection::Any => f.write_str("Any"),
            RaritySelection::Exactly(rarity) => fmt::Display::fmt(rarity, f),
        }
    }
}

/// Weighted groups used for `Any` draws. Very common and common share a band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RarityBand {
    Frequent,
    Uncommon,
    Rare,
    VeryRare,
}

impl RarityBand {
    /// Bands in draw order.
    pub const ALL: [RarityBand; 4] =
        [RarityBand::Frequent, RarityBand::Uncommon, RarityBand::Rare, RarityBand::VeryRare];

    pub fn weight(&self) -> f64 {
        match self {
            RarityBand::Frequent => 0.60,
            RarityBand::Uncommon => 0.30,
            RarityBand::Rare => 0.05,
            RarityBand::VeryRare => 0.05,
        }
    }

    pub fn of(rarity: Rarity) -> Self {
        match rarity {
            Rarity::VeryCommon | Rarity::Common => RarityBand::Frequent,
            Rarity::Uncommon => RarityBand::Uncommon,
            Rarity::Rare => RarityBand::Rare,
            Rarity::VeryRare => RarityBand::VeryRare,
        }
    }
}

/// The chosen scenario subject, forwarded as-is to prompt construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub domain: String,
    pub disease_name: String,
    pub disease_rarity: Rarity,
}

/// Catalog defects that make selection impossible.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("catalog domain '{domain}' has no diseases")]
    EmptyDomain { domain: String },
    #[error("catalog has no domains")]
    EmptyCatalog,
}

/// Whether `requested` asks for no particular domain.
pub fn is_umbrella(requested: &str) -> bool {
    let trimmed = requested.trim();
    trimmed.is_empty() || UMBRELLA_DOMAINS.iter().any(|u| trimmed.eq_ignore_ascii_case(u))
}

/// [`pick_with_rng`] using the thread-local generator.
pub fn pick(
    catalog: &Catalog,
    requested_domain: Option<&str>,
    rarity: RaritySelection,
    history: &mut RecentHistory,
) -> Result<Selection, SelectionError> {
    pick_with_rng(catalog, requested_domain, rarity, history, &mut rand::rng())
}

/// Choose a disease and record it in `history`.
pub fn pick_with_rng<R: Rng + ?Sized>(
    catalog: &Catalog,
    requested_domain: Option<&str>,
    rarity: RaritySelection,
    history: &mut RecentHistory,
    rng: &mut R,
) -> Result<Selection, SelectionError> {
    let domain = resolve_domain(catalog, requested_domain, rng)?;
    let diseases = catalog
        .diseases(domain)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| SelectionError::EmptyDomain { domain: domain.to_string() })?;

    let fresh = filter_with_fallback(diseases, |d| !history.contains(&d.name));
    if fresh.widened {
        debug!(target: "scenario_governor::selector", domain, "history covers domain; ignoring recency");
    }

    let chosen = match rarity {
        RaritySelection::Any => draw_weighted(&fresh.items, rng),
        RaritySelection::Exactly(wanted) => {
            let matching = filter_with_fallback(&fresh.items, |d| d.rarity == wanted);
            if matching.widened {
                debug!(
                    target: "scenario_governor::selector",
                    domain,
                    rarity = %wanted,
                    "no eligible disease with requested rarity; widening"
                );
            }
            matching.items.choose(rng).cloned()
        }
    }
    .ok_or_else(|| SelectionError::EmptyDomain { domain: domain.to_string() })?;

    history.push(chosen.name.clone());
    trace!(
        target: "scenario_governor::selector",
        domain,
        disease = %chosen.name,
        rarity = %chosen.rarity,
        "scenario picked"
    );
    Ok(Selection {
        domain: domain.to_string(),
        disease_name: chosen.name,
        disease_rarity: chosen.rarity,
    })
}

fn resolve_domain<'c, R: Rng + ?Sized>(
    catalog: &'c Catalog,
    requested: Option<&str>,
    rng: &mut R,
) -> Result<&'c str, SelectionError> {
    if let Some(requested) = requested.filter(|r| !is_umbrella(r)) {
        if let Some(key) = catalog.domains().find(|key| *key == requested) {
            return Ok(key);
        }
        debug!(target: "scenario_governor::selector", requested, "unknown domain; choosing at random");
    }
    if catalog.is_empty() {
        return Err(SelectionError::EmptyCatalog);
    }
    let index = rng.random_range(0..catalog.len());
    catalog.domains().nth(index).ok_or(SelectionError::EmptyCatalog)
}

/// Weighted band draw over the bands that have candidates, then uniform within
/// the band. `None` only when `eligible` is empty.
fn draw_weighted<R: Rng + ?Sized>(eligible: &[DiseaseEntry], rng: &mut R) -> Option<DiseaseEntry> {
    let bands: Vec<(RarityBand, Vec<&DiseaseEntry>)> = RarityBand::ALL
        .iter()
        .map(|band| (*band, eligible.iter().filter(|d| RarityBand::of(d.rarity) == *band).collect()))
        .collect();
    let live = filter_with_fallback(&bands, |(_, members)| !members.is_empty()).items;

    let total: f64 = live.iter().map(|(band, _)| band.weight()).sum();
    let r = rng.random::<f64>() * total;

    // Lower bound inclusive, upper exclusive; rounding past the end lands on the last band.
    let mut cumulative = 0.0;
    let (_, members) = live
        .iter()
        .find(|(band, _)| {
            cumulative += band.weight();
            r < cumulative
        })
        .or_else(|| live.last())?;
    members.choose(rng).map(|d| (*d).clone())
}

/// Catalog-owning selector shared by request handlers.
#[derive(Debug, Clone)]
pub struct ScenarioSelector {
    catalog: Arc<Catalog>,
}

impl ScenarioSelector {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog: Arc::new(catalog) }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn pick(
        &self,
        requested_domain: Option<&str>,
        rarity: RaritySelection,
        history: &mut RecentHistory,
    ) -> Result<Selection, SelectionError> {
        pick(&self.catalog, requested_domain, rarity, history)
    }

    pub fn pick_with_rng<R: Rng + ?Sized>(
        &self,
        requested_domain: Option<&str>,
        rarity: RaritySelection,
        history: &mut RecentHistory,
        rng: &mut R,
    ) -> Result<Selection, SelectionError> {
        pick_with_rng(&self.catalog, requested_domain, rarity, history, rng)
    }
}
