//! Device-type classification
//!
//! Scores discovered hardware facts against the catalog and returns the
//! best-matching device type with a confidence bucket. Pure and
//! deterministic: identical facts against an identical snapshot always
//! produce the identical result.

use metalforge_domain::{Classification, Confidence, HardwareFacts, MatchCriterion};

use crate::catalog::{Catalog, DeviceType};

// Criterion weights, in percent. Total 100.
const WEIGHT_VENDOR: u32 = 40;
const WEIGHT_MOTHERBOARD: u32 = 30;
const WEIGHT_CPU: u32 = 20;
const WEIGHT_CORES: u32 = 10;

/// Vendor name equivalences recognized in manufacturer strings
const VENDOR_ALIASES: &[(&str, &str)] = &[
    ("hpe", "hewlett-packard"),
    ("supermicro", "super micro computer"),
];

/// Classify hardware facts against a catalog snapshot
#[must_use]
pub fn classify(facts: &HardwareFacts, catalog: &Catalog) -> Classification {
    let Some(manufacturer) = facts.manufacturer.as_deref() else {
        return Classification::no_match();
    };

    // Phase 1: restrict to vendors the manufacturer string recognizes.
    let candidates: Vec<DeviceType> = catalog
        .vendors()
        .iter()
        .filter(|(_, vendor)| {
            let mut names: Vec<&str> = vec![vendor.display_name.as_str()];
            names.extend(vendor.aliases.iter().map(String::as_str));
            names.iter().any(|name| vendor_matches(manufacturer, name))
        })
        .flat_map(|(vendor_id, _)| catalog.by_vendor(vendor_id))
        .collect();

    if candidates.is_empty() {
        return Classification::no_match();
    }

    // Phase 2: score each candidate on the weighted criteria.
    let mut scored: Vec<(u32, Vec<MatchCriterion>, DeviceType)> = candidates
        .into_iter()
        .map(|dt| {
            let (score, matched) = score_candidate(facts, &dt);
            (score, matched, dt)
        })
        .collect();

    // A vendor+motherboard match outranks any cpu/cores-only match.
    let has_board_match = scored.iter().any(|(_, matched, _)| {
        matched.contains(&MatchCriterion::Motherboard)
    });
    if has_board_match {
        scored.retain(|(_, matched, _)| matched.contains(&MatchCriterion::Motherboard));
    }

    // Highest score wins; ties break on lexicographic device-type id.
    scored.sort_by(|(score_a, _, dt_a), (score_b, _, dt_b)| {
        score_b.cmp(score_a).then_with(|| dt_a.id.cmp(&dt_b.id))
    });

    let Some((score, matched, winner)) = scored.into_iter().next() else {
        return Classification::no_match();
    };
    let score = f64::from(score) / 100.0;

    Classification {
        device_type: Some(winner.id),
        confidence: Confidence::from_score(score),
        matched,
        score,
    }
}

/// Case-insensitive substring match between a manufacturer string and a
/// vendor name, widened through the alias table
fn vendor_matches(manufacturer: &str, vendor_name: &str) -> bool {
    let manufacturer = manufacturer.to_lowercase();
    let vendor_name = vendor_name.to_lowercase();

    if contains_either(&manufacturer, &vendor_name) {
        return true;
    }

    VENDOR_ALIASES.iter().any(|(a, b)| {
        (contains_either(&manufacturer, a) && contains_either(&vendor_name, b))
            || (contains_either(&manufacturer, b) && contains_either(&vendor_name, a))
    })
}

fn contains_either(a: &str, b: &str) -> bool {
    a.contains(b) || b.contains(a)
}

fn score_candidate(facts: &HardwareFacts, dt: &DeviceType) -> (u32, Vec<MatchCriterion>) {
    // Vendor matched by construction of the candidate set.
    let mut score = WEIGHT_VENDOR;
    let mut matched = vec![MatchCriterion::Vendor];

    if let Some(product) = facts.product_name.as_deref() {
        if contains_either(&product.to_lowercase(), &dt.motherboard.to_lowercase()) {
            score += WEIGHT_MOTHERBOARD;
            matched.push(MatchCriterion::Motherboard);
        }
    }

    if let (Some(cpu), Some(spec_cpu)) =
        (facts.cpu_model.as_deref(), dt.hardware_spec.cpu_model.as_deref())
    {
        if contains_either(&cpu.to_lowercase(), &spec_cpu.to_lowercase()) {
            score += WEIGHT_CPU;
            matched.push(MatchCriterion::Cpu);
        }
    }

    if let (Some(cores), Some(spec_cores)) = (facts.cpu_cores, dt.hardware_spec.cpu_cores) {
        if cores == spec_cores {
            score += WEIGHT_CORES;
            matched.push(MatchCriterion::Cores);
        }
    }

    (score, matched)
}
