//! Offline keyword intent provider.
//!
//! Deterministic heuristics over the utterance text: verb keywords pick the
//! action, noun keywords pick the entity type, and simple extractors pull
//! names, emails, and phone numbers into the entity map. Used as the default
//! provider and in tests, where a hosted model would make runs flaky.

use serde_json::Value;

use std::collections::BTreeMap;

use crmpilot_core::inference::IntentProvider;
use crmpilot_types::error::InferenceError;
use crmpilot_types::intent::RawIntent;
use crmpilot_types::turn::Turn;

/// Rule-based intent provider with no network dependency.
#[derive(Default)]
pub struct KeywordIntentProvider;

impl KeywordIntentProvider {
    pub fn new() -> Self {
        Self
    }
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

/// The word following "named" or "called", joined with a second capitalized
/// word when one follows (handles "named Li Si").
fn extract_name(utterance: &str) -> Option<String> {
    let words: Vec<&str> = utterance.split_whitespace().collect();
    let pos = words
        .iter()
        .position(|w| w.eq_ignore_ascii_case("named") || w.eq_ignore_ascii_case("called"))?;
    let first = words.get(pos + 1)?.trim_matches(|c: char| !c.is_alphanumeric());
    if first.is_empty() {
        return None;
    }
    let mut name = first.to_string();
    if let Some(second) = words.get(pos + 2) {
        let second = second.trim_matches(|c: char| !c.is_alphanumeric());
        if second.chars().next().is_some_and(char::is_uppercase) {
            name.push(' ');
            name.push_str(second);
        }
    }
    Some(name)
}

fn extract_email(utterance: &str) -> Option<String> {
    utterance
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !(c.is_alphanumeric() || "@._+-".contains(c))))
        .find(|w| {
            let at = w.find('@');
            at.is_some_and(|i| i > 0 && w[i + 1..].contains('.'))
        })
        .map(str::to_string)
}

/// Longest contiguous digit run of at least seven digits.
fn extract_phone(utterance: &str) -> Option<String> {
    let mut best: Option<String> = None;
    let mut current = String::new();
    for c in utterance.chars().chain(std::iter::once(' ')) {
        if c.is_ascii_digit() {
            current.push(c);
        } else {
            if current.len() >= 7 && best.as_ref().is_none_or(|b| current.len() > b.len()) {
                best = Some(current.clone());
            }
            current.clear();
        }
    }
    best
}

/// Trailing free text after a search verb, used as the product query.
fn extract_query(utterance: &str, markers: &[&str]) -> Option<String> {
    let lower = utterance.to_lowercase();
    for marker in markers {
        if let Some(pos) = lower.find(marker) {
            let rest = utterance[pos + marker.len()..].trim();
            if !rest.is_empty() {
                return Some(rest.trim_matches(|c: char| c.is_ascii_punctuation()).to_string());
            }
        }
    }
    None
}

impl IntentProvider for KeywordIntentProvider {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn infer(&self, utterance: &str, _window: &[Turn]) -> Result<RawIntent, InferenceError> {
        let lower = utterance.to_lowercase();
        let mut entities = BTreeMap::new();

        let creating = contains_any(&lower, &["create", "add", "new", "register"]);
        let searching = contains_any(&lower, &["find", "search", "look up", "list", "show"]);
        let updating = contains_any(&lower, &["update", "change", "modify", "set "]);
        let about_customer = contains_any(&lower, &["customer", "client", "contact"]);
        let about_order = contains_any(&lower, &["order", "purchase"]);
        let about_product = contains_any(&lower, &["product", "catalog", "price"]);

        let (action, entity_type, confidence) = if about_order && (creating || !searching) {
            ("create", "order", 0.8)
        } else if about_product {
            ("search", "product", 0.85)
        } else if about_customer && updating {
            ("update", "customer", 0.8)
        } else if about_customer && creating {
            ("create", "customer", 0.9)
        } else if about_customer && searching {
            ("search", "customer", 0.85)
        } else {
            ("unknown", "unknown", 0.0)
        };

        if let Some(name) = extract_name(utterance) {
            entities.insert("name".to_string(), Value::from(name));
        }
        if let Some(email) = extract_email(utterance) {
            entities.insert("email".to_string(), Value::from(email));
        }
        if let Some(phone) = extract_phone(utterance) {
            entities.insert("phone".to_string(), Value::from(phone));
        }
        if entity_type == "product"
            && let Some(query) = extract_query(utterance, &["search for", "find", "show"])
        {
            entities.insert("query".to_string(), Value::from(query));
        }

        Ok(RawIntent {
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entities,
            confidence,
        })
    }
}
