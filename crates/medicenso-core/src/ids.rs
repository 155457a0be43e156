//! Identifier migration map.
//!
//! Early builds of the app keyed census fields by short slugs such as
//! `total_pop`. The remote schema requires UUID primary keys, so every field
//! identifier that crosses a persistence boundary goes through [`canonicalize`].

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::models::FieldValue;

/// Legacy slug to canonical id for the built-in census fields.
const LEGACY_FIELD_IDS: [(&str, &str); 10] = [
    ("total_houses", "2b9d3e42-7c70-4a2a-b425-9c9e843e9e51"),
    ("houses_visited", "6f9c8d32-2b1a-4d9e-8c7a-5b4a3c2d1e0f"),
    ("total_pop", "a1b2c3d4-e5f6-4a5b-b6c7-d8e9f0a1b2c3"),
    ("over_80", "f1a2b3c4-d5e6-4f5a-8b7c-0d9e8f7a6b5c"),
    ("over_60", "e5d4c3b2-a1b0-4c9d-8e7f-6a5b4c3d2e1f"),
    ("pregnant", "b9a8c7d6-e5f4-3d2c-1b0a-9d8c7b6a5e4d"),
    ("infants", "d1e2f3a4-b5c6-7d8e-9f0a-1b2c3d4e5f6a"),
    ("sick", "c3d4e5f6-a1b2-0c9d-8e7f-6a5b4c3d2e1f"),
    ("vulnerable", "0f9e8d7c-6b5a-4e3d-2c1b-0a1b2c3d4e5f"),
    ("elderly_alone", "7a6b5c4d-3e2f-1a0b-9c8d-7e6f5a4b3c2d"),
];

/// Namespace for ids minted from operator-created slugs.
const CUSTOM_FIELD_NAMESPACE: Uuid = Uuid::from_u128(0x5c1d_0f3e_8a4b_4c2d_9e7f_6a5b_4c3d_2e1f);

/// Namespace for ids given to reports saved by the local-only app.
const LEGACY_REPORT_NAMESPACE: Uuid = Uuid::from_u128(0x3e8a_71c2_5d04_4b9f_a6e1_0c7d_92f4_b583);

/// Canonical id of the "total population" field summed by the dashboard.
pub const TOTAL_POPULATION_FIELD_ID: &str = "a1b2c3d4-e5f6-4a5b-b6c7-d8e9f0a1b2c3";

/// Whether `id` is a hyphenated 36-character UUID accepted as a remote primary key.
pub fn is_canonical(id: &str) -> bool {
    id.len() == 36 && Uuid::try_parse(id).is_ok()
}

/// Mint a fresh canonical id for a new record (time-sortable UUID v7).
pub fn mint_id() -> String {
    Uuid::now_v7().to_string()
}

/// Canonical id for a report saved by the local-only app.
///
/// Derived from the legacy id, so a migration that is retried after a
/// partial upload writes the same rows again instead of new ones.
pub fn legacy_report_id(legacy: &str) -> String {
    if is_canonical(legacy) {
        return legacy.to_string();
    }
    Uuid::new_v5(&LEGACY_REPORT_NAMESPACE, legacy.as_bytes()).to_string()
}

/// Translate a field identifier to its canonical form.
///
/// Canonical ids pass through unchanged, known legacy slugs map to the
/// built-in field ids, and anything else gets an id derived from the slug.
/// The derived id is stable on one install; two devices are not required to
/// agree on it since only operator-created fields take this path.
pub fn canonicalize(id: &str) -> String {
    if is_canonical(id) {
        return id.to_string();
    }

    LEGACY_FIELD_IDS
        .iter()
        .find(|(legacy, _)| *legacy == id)
        .map_or_else(
            || Uuid::new_v5(&CUSTOM_FIELD_NAMESPACE, id.as_bytes()).to_string(),
            |(_, canonical)| (*canonical).to_string(),
        )
}

/// Canonicalize every key of a report payload.
///
/// Returns the rewritten payload and whether any key changed. When a legacy
/// key and its canonical counterpart are both present, the canonical value wins.
pub fn canonicalize_data(
    data: BTreeMap<String, FieldValue>,
) -> (BTreeMap<String, FieldValue>, bool) {
    let mut canonical = BTreeMap::new();
    let mut translated = Vec::new();

    for (key, value) in data {
        let mapped = canonicalize(&key);
        if mapped == key {
            canonical.insert(key, value);
        } else {
            translated.push((mapped, value));
        }
    }

    let changed = !translated.is_empty();
    for (key, value) in translated {
        canonical.entry(key).or_insert(value);
    }

    (canonical, changed)
}
