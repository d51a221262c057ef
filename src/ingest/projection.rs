//! Textual projections of upstream records, used as embedding input.
//!
//! The rendering is deterministic with a canonical field order, so
//! re-ingesting an unchanged record embeds the same text.

use std::fmt::Write;

use serde_json::Value;

use crate::pokeapi::Record;

use super::types::DocumentType;

/// Render the embedding text for a record of the given kind.
pub fn render(doc_type: DocumentType, record: &Record) -> String {
    match doc_type {
        DocumentType::Pokemon => pokemon_text(record),
        DocumentType::Move => move_text(record),
    }
}

/// Pokemon projection: name, id, types, abilities, moves, stats, height,
/// weight, in that order.
fn pokemon_text(record: &Record) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Pokemon: {} (ID: {})", record.identifier, record.id);

    let types = named_list(record, "types", "type");
    if !types.is_empty() {
        let _ = writeln!(out, "Types: {}", types.join(", "));
    }

    let abilities = named_list(record, "abilities", "ability");
    if !abilities.is_empty() {
        let _ = writeln!(out, "Abilities: {}", abilities.join(", "));
    }

    let moves = named_list(record, "moves", "move");
    if !moves.is_empty() {
        let _ = writeln!(out, "Moves: {}", moves.join(", "));
    }

    let stats: Vec<String> = record
        .metadata
        .get("stats")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    let name = entry.get("stat")?.get("name")?.as_str()?;
                    let base = entry.get("base_stat")?.as_i64()?;
                    Some(format!("{}: {}", name, base))
                })
                .collect()
        })
        .unwrap_or_default();
    if !stats.is_empty() {
        let _ = writeln!(out, "Stats: {}", stats.join(", "));
    }

    if let Some(height) = record.metadata.get("height").and_then(Value::as_i64) {
        let _ = writeln!(out, "Height: {}", height);
    }
    if let Some(weight) = record.metadata.get("weight").and_then(Value::as_i64) {
        let _ = writeln!(out, "Weight: {}", weight);
    }

    out
}

/// Move projection: name, id, type, damage class, power/pp/accuracy, effect.
fn move_text(record: &Record) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Move: {} (ID: {})", record.identifier, record.id);

    if let Some(type_name) = record
        .metadata
        .get("type")
        .and_then(|t| t.get("name"))
        .and_then(Value::as_str)
    {
        let _ = writeln!(out, "Type: {}", type_name);
    }

    if let Some(class) = record
        .metadata
        .get("damage_class")
        .and_then(|c| c.get("name"))
        .and_then(Value::as_str)
    {
        let _ = writeln!(out, "Damage class: {}", class);
    }

    for (label, key) in [("Power", "power"), ("PP", "pp"), ("Accuracy", "accuracy")] {
        if let Some(v) = record.metadata.get(key).and_then(Value::as_i64) {
            let _ = writeln!(out, "{}: {}", label, v);
        }
    }

    let effects: Vec<&str> = record
        .metadata
        .get("effect_entries")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.get("effect").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();
    if !effects.is_empty() {
        let _ = writeln!(out, "Effect: {}", effects.join(" "));
    }

    out
}

/// Collect `entries[i].<inner>.name` strings from a list field, the shape
/// PokeAPI uses for types, abilities, and moves.
fn named_list(record: &Record, field: &str, inner: &str) -> Vec<String> {
    record
        .metadata
        .get(field)
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    entry
                        .get(inner)
                        .and_then(|v| v.get("name"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(metadata: serde_json::Value) -> Record {
        let map = metadata.as_object().cloned().unwrap_or_default();
        Record {
            id: "25".into(),
            identifier: "pikachu".into(),
            raw_json: metadata.to_string(),
            metadata: map,
        }
    }

    #[test]
    fn pokemon_projection_renders_fields_in_canonical_order() {
        let rec = record(json!({
            "name": "pikachu",
            "types": [{"type": {"name": "electric"}}],
            "abilities": [{"ability": {"name": "static"}}, {"ability": {"name": "lightning-rod"}}],
            "moves": [{"move": {"name": "thunderbolt"}}],
            "stats": [{"stat": {"name": "speed"}, "base_stat": 90}],
            "height": 4,
            "weight": 60,
        }));

        let text = render(DocumentType::Pokemon, &rec);
        assert_eq!(
            text,
            "Pokemon: pikachu (ID: 25)\n\
             Types: electric\n\
             Abilities: static, lightning-rod\n\
             Moves: thunderbolt\n\
             Stats: speed: 90\n\
             Height: 4\n\
             Weight: 60\n"
        );
    }

    #[test]
    fn pokemon_projection_skips_missing_sections() {
        let rec = record(json!({"name": "pikachu"}));
        let text = render(DocumentType::Pokemon, &rec);
        assert_eq!(text, "Pokemon: pikachu (ID: 25)\n");
    }

    #[test]
    fn projection_is_deterministic() {
        let rec = record(json!({
            "name": "pikachu",
            "types": [{"type": {"name": "electric"}}],
        }));
        assert_eq!(
            render(DocumentType::Pokemon, &rec),
            render(DocumentType::Pokemon, &rec)
        );
    }

    #[test]
    fn move_projection_renders_effect_and_numbers() {
        let mut rec = record(json!({
            "name": "thunderbolt",
            "type": {"name": "electric"},
            "damage_class": {"name": "special"},
            "power": 90,
            "pp": 15,
            "accuracy": 100,
            "effect_entries": [{"effect": "Has a 10% chance to paralyze the target."}],
        }));
        rec.id = "85".into();
        rec.identifier = "thunderbolt".into();

        let text = render(DocumentType::Move, &rec);
        assert_eq!(
            text,
            "Move: thunderbolt (ID: 85)\n\
             Type: electric\n\
             Damage class: special\n\
             Power: 90\n\
             PP: 15\n\
             Accuracy: 100\n\
             Effect: Has a 10% chance to paralyze the target.\n"
        );
    }
}
