mod common;

use common::test_helpers::{balanced_catalog, cardiology_catalog};
use rand::rngs::StdRng;
use rand::SeedableRng;
use scenario_governor::selector::{
    pick_with_rng, Catalog, DiseaseEntry, Rarity, RarityBand, RaritySelection, RecentHistory,
    ScenarioSelector, RECENT_HISTORY_CAPACITY,
};
use std::collections::HashMap;

#[test]
fn cardiology_common_picks_myocardial_infarction() {
    let mut rng = StdRng::seed_from_u64(2024);
    let mut history = RecentHistory::new();
    let pick = pick_with_rng(
        &cardiology_catalog(),
        Some("Cardiology"),
        RaritySelection::Exactly(Rarity::Common),
        &mut history,
        &mut rng,
    )
    .unwrap();

    assert_eq!(pick.domain, "Cardiology");
    assert_eq!(pick.disease_name, "Myocardial Infarction");
    assert_eq!(pick.disease_rarity, Rarity::Common);
    assert_eq!(history.iter().collect::<Vec<_>>(), vec!["Myocardial Infarction"]);
}

#[test]
fn history_covering_the_domain_falls_back_to_full_list() {
    let mut rng = StdRng::seed_from_u64(5);
    let mut history = RecentHistory::from(vec![
        "Myocardial Infarction".to_string(),
        "Pericarditis".to_string(),
    ]);

    let pick = pick_with_rng(
        &cardiology_catalog(),
        Some("Cardiology"),
        RaritySelection::Any,
        &mut history,
        &mut rng,
    )
    .unwrap();
    assert!(["Myocardial Infarction", "Pericarditis"].contains(&pick.disease_name.as_str()));
    assert_eq!(history.len(), 3);
}

#[test]
fn missing_rarity_falls_back_to_eligible() {
    let catalog = Catalog::new().with_domain(
        "Dermatology",
        [DiseaseEntry::new("Acne", Rarity::VeryCommon), DiseaseEntry::new("Psoriasis", Rarity::Common)],
    );
    let mut rng = StdRng::seed_from_u64(11);
    let mut history = RecentHistory::new();

    let pick = pick_with_rng(
        &catalog,
        Some("Dermatology"),
        RaritySelection::Exactly(Rarity::Rare),
        &mut history,
        &mut rng,
    )
    .unwrap();
    assert!(["Acne", "Psoriasis"].contains(&pick.disease_name.as_str()));
}

#[test]
fn recency_is_applied_before_rarity() {
    // The only rare disease was just seen, so the rare filter widens to what is eligible.
    let mut rng = StdRng::seed_from_u64(13);
    let mut history = RecentHistory::from(vec!["Pericarditis".to_string()]);

    let pick = pick_with_rng(
        &cardiology_catalog(),
        Some("Cardiology"),
        RaritySelection::Exactly(Rarity::Rare),
        &mut history,
        &mut rng,
    )
    .unwrap();
    assert_eq!(pick.disease_name, "Myocardial Infarction");
}

#[test]
fn any_rarity_matches_band_weights() {
    const TRIALS: usize = 100_000;
    let catalog = balanced_catalog();
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    let mut counts: HashMap<&'static str, usize> = HashMap::new();

    for _ in 0..TRIALS {
        let mut history = RecentHistory::new();
        let pick = pick_with_rng(&catalog, None, RaritySelection::Any, &mut history, &mut rng)
            .unwrap();
        let band = match RarityBand::of(pick.disease_rarity) {
            RarityBand::Frequent => "frequent",
            RarityBand::Uncommon => "uncommon",
            RarityBand::Rare => "rare",
            RarityBand::VeryRare => "very_rare",
        };
        *counts.entry(band).or_default() += 1;
    }

    for (band, expected) in [("frequent", 0.60), ("uncommon", 0.30), ("rare", 0.05), ("very_rare", 0.05)] {
        let observed = counts.get(band).copied().unwrap_or(0) as f64 / TRIALS as f64;
        assert!(
            (observed - expected).abs() <= 0.02,
            "{band}: observed {observed:.4}, expected {expected:.2}"
        );
    }
}

#[test]
fn empty_bands_are_renormalized_away() {
    let catalog = Catalog::new().with_domain(
        "Rheumatology",
        [DiseaseEntry::new("Lupus", Rarity::Uncommon), DiseaseEntry::new("Behcet Disease", Rarity::Rare)],
    );
    let mut rng = StdRng::seed_from_u64(99);
    let mut uncommon = 0usize;
    const TRIALS: usize = 20_000;

    for _ in 0..TRIALS {
        let mut history = RecentHistory::new();
        let pick = pick_with_rng(&catalog, None, RaritySelection::Any, &mut history, &mut rng)
            .unwrap();
        if pick.disease_rarity == Rarity::Uncommon {
            uncommon += 1;
        }
    }

    // 0.30 / (0.30 + 0.05)
    let observed = uncommon as f64 / TRIALS as f64;
    assert!((observed - 0.857).abs() < 0.02, "observed {observed:.4}");
}

#[test]
fn history_stays_bounded_and_avoids_recent_picks() {
    let diseases = (0..20).map(|i| DiseaseEntry::new(format!("D{i}"), Rarity::ALL[i % 5]));
    let selector = ScenarioSelector::new(Catalog::new().with_domain("Mixed", diseases));
    let mut rng = StdRng::seed_from_u64(77);
    let mut history = RecentHistory::new();

    for _ in 0..200 {
        let before: Vec<String> = history.iter().map(str::to_string).collect();
        let pick = selector
            .pick_with_rng(Some("Mixed"), RaritySelection::Any, &mut history, &mut rng)
            .unwrap();
        assert!(!before.contains(&pick.disease_name), "{} repeated within window", pick.disease_name);
        assert!(history.len() <= RECENT_HISTORY_CAPACITY);
        assert_eq!(history.iter().last(), Some(pick.disease_name.as_str()));
        if before.len() == RECENT_HISTORY_CAPACITY {
            assert!(!history.contains(&before[0]), "oldest entry must be evicted first");
        }
    }
}

#[test]
fn umbrella_domain_spreads_across_catalog() {
    let catalog = cardiology_catalog()
        .with_domain("Neurology", [DiseaseEntry::new("Migraine", Rarity::Common)]);
    let mut rng = StdRng::seed_from_u64(3);
    let mut seen = HashMap::new();

    for requested in ["General", "any", "Unknown Specialty"].iter().cycle().take(300) {
        let mut history = RecentHistory::new();
        let pick =
            pick_with_rng(&catalog, Some(*requested), RaritySelection::Any, &mut history, &mut rng)
                .unwrap();
        *seen.entry(pick.domain).or_insert(0usize) += 1;
    }

    assert_eq!(seen.len(), 2);
    assert!(seen.values().all(|n| *n > 100));
}
