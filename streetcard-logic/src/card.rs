use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A point of interest close to the card's location
#[derive(Debug, Clone, Serialize, Deserialize, specta::Type)]
pub struct NearbyItem {
    /// Generated locally on every decode, never sent by the server. Don't use this to match items
    /// between two fetches.
    #[serde(skip_deserializing, default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub distance_m: u32,
}

impl NearbyItem {
    pub fn new(name: impl Into<String>, category: impl Into<String>, distance_m: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            category: category.into(),
            distance_m,
        }
    }

    /// One line summary for list rendering
    pub fn display_line(&self) -> String {
        format!("{} ({}) – {}m", self.name, self.category, self.distance_m)
    }
}

// `id` is excluded, it's regenerated per decode
impl PartialEq for NearbyItem {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.category == other.category
            && self.distance_m == other.distance_m
    }
}

/// Where a card's trivia came from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, specta::Type)]
pub struct FactSource {
    pub label: String,
    pub url: Option<String>,
}

/// Descriptive card for a location, as computed by the card server.
///
/// Only `mode` is required, everything else may be missing from the response and newer servers
/// are free to send fields this client doesn't know about.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, specta::Type)]
pub struct Card {
    pub canonical_street: Option<String>,
    pub cross_street: Option<String>,
    pub borough: Option<String>,
    pub neighborhood: Option<String>,
    /// How the card was derived (`NAMED_STREET`, `NUMBERED_STREET`, `NEAR`, ...)
    pub mode: String,
    pub did_you_know: Option<String>,
    #[serde(default)]
    pub nearby: Vec<NearbyItem>,
    /// How far the position was snapped to reach the street, in meters
    pub snap_distance_m: Option<f64>,
    pub fact_source_label: Option<String>,
    pub fact_source_url: Option<String>,
    /// 0.0 to 1.0
    pub fact_confidence: Option<f64>,
    #[serde(default)]
    pub sources: Vec<FactSource>,
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|s| !s.is_empty())
}

impl Card {
    /// A card with only the required fields set
    pub fn with_mode(mode: impl Into<String>) -> Self {
        Self {
            canonical_street: None,
            cross_street: None,
            borough: None,
            neighborhood: None,
            mode: mode.into(),
            did_you_know: None,
            nearby: vec![],
            snap_distance_m: None,
            fact_source_label: None,
            fact_source_url: None,
            fact_confidence: None,
            sources: vec![],
        }
    }

    pub fn title(&self) -> &str {
        self.canonical_street.as_deref().unwrap_or("Unknown street")
    }

    /// Secondary line under the title, `None` if there's nothing worth showing
    pub fn subtitle(&self) -> Option<String> {
        if let Some(street) = non_empty(&self.canonical_street) {
            return Some(format!("Near {street}"));
        }

        let parts = [non_empty(&self.neighborhood), non_empty(&self.borough)]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" • "))
        }
    }

    /// URL to open for the trivia's source, prefers the dedicated field over the source list
    pub fn fact_url(&self) -> Option<&str> {
        non_empty(&self.fact_source_url)
            .or_else(|| self.sources.iter().find_map(|s| non_empty(&s.url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_minimal() {
        let card: Card = serde_json::from_str(r#"{"mode": "NEAR"}"#).expect("Failed to decode");
        assert_eq!(card, Card::with_mode("NEAR"));
    }

    #[test]
    fn test_decode_missing_mode() {
        let res = serde_json::from_str::<Card>(r#"{"canonical_street": "Broadway", "nearby": []}"#);
        assert!(res.is_err(), "Card without mode decoded");
    }

    #[test]
    fn test_decode_ignores_unknown_and_null() {
        let card: Card = serde_json::from_str(
            r#"{
                "canonical_street": "Bleecker St",
                "cross_street": null,
                "mode": "NAMED_STREET",
                "snap_distance_m": 12,
                "fact_confidence": 0.8,
                "nearby": [{"name": "Cafe", "category": "food", "distance_m": 40, "rating": 5}],
                "something_new": {"nested": true}
            }"#,
        )
        .expect("Failed to decode");

        assert_eq!(card.canonical_street.as_deref(), Some("Bleecker St"));
        assert_eq!(card.cross_street, None);
        assert_eq!(card.snap_distance_m, Some(12.0));
        assert_eq!(card.nearby, vec![NearbyItem::new("Cafe", "food", 40)]);
    }

    #[test]
    fn test_nearby_ids_fresh_per_decode() {
        let raw = r#"{"mode": "NEAR", "nearby": [{"name": "Park", "category": "park", "distance_m": 100}]}"#;
        let a: Card = serde_json::from_str(raw).unwrap();
        let b: Card = serde_json::from_str(raw).unwrap();
        assert_ne!(a.nearby[0].id, b.nearby[0].id);
        assert_eq!(a, b);
    }

    #[test]
    fn test_nearby_id_not_read_back() {
        let item = NearbyItem::new("Park", "park", 100);
        let raw = serde_json::to_string(&item).unwrap();
        let decoded: NearbyItem = serde_json::from_str(&raw).unwrap();
        assert_ne!(item.id, decoded.id);
    }

    #[test]
    fn test_subtitle() {
        let mut card = Card::with_mode("NEAR");
        assert_eq!(card.subtitle(), None);
        assert_eq!(card.title(), "Unknown street");

        card.borough = Some("Manhattan".to_string());
        card.neighborhood = Some("SoHo".to_string());
        assert_eq!(card.subtitle().as_deref(), Some("SoHo • Manhattan"));

        card.neighborhood = Some(String::new());
        assert_eq!(card.subtitle().as_deref(), Some("Manhattan"));

        card.canonical_street = Some("Spring St".to_string());
        assert_eq!(card.subtitle().as_deref(), Some("Near Spring St"));
        assert_eq!(card.title(), "Spring St");
    }

    #[test]
    fn test_fact_url() {
        let mut card = Card::with_mode("NAMED_STREET");
        assert_eq!(card.fact_url(), None);

        card.sources.push(FactSource {
            label: "wiki".to_string(),
            url: Some("https://example.org/a".to_string()),
        });
        assert_eq!(card.fact_url(), Some("https://example.org/a"));

        card.fact_source_url = Some("https://example.org/b".to_string());
        assert_eq!(card.fact_url(), Some("https://example.org/b"));
    }

    #[test]
    fn test_display_line() {
        let item = NearbyItem::new("Film Forum", "cinema", 120);
        assert_eq!(item.display_line(), "Film Forum (cinema) – 120m");
    }
}
