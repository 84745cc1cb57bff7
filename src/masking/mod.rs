//! Reversible literal substitution applied to text leaving the process.
//!
//! Sensitive literals (sanctioned entities, high-risk locations and the two rule
//! reasons that name them) are swapped for bracketed placeholders before text is sent
//! to the external assistant, and swapped back in the reply. This is plain text
//! substitution, not redaction: anything not in the table passes through untouched.

use thiserror::Error;

use crate::signals::rules::{RISKY_GEOLOCATION, SANCTIONED_ENTITY};

pub const SANCTIONED_REASON_PLACEHOLDER: &str = "[Reason: Monitored Entity]";
pub const RISKY_LOCATION_REASON_PLACEHOLDER: &str = "[Reason: High-Risk Location]";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MaskingError {
    #[error("masking literals must not be empty")]
    EmptyLiteral,
    #[error("literal {0:?} appears more than once in the masking table")]
    DuplicateLiteral(String),
    #[error("placeholder {placeholder:?} overlaps placeholder {other:?}")]
    PlaceholderCollision { placeholder: String, other: String },
    #[error("placeholder {placeholder:?} overlaps literal {literal:?}")]
    LiteralCollision { placeholder: String, literal: String },
}

/// One reversible substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskingEntry {
    pub original: String,
    pub placeholder: String,
}

impl MaskingEntry {
    pub fn new(original: impl Into<String>, placeholder: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            placeholder: placeholder.into(),
        }
    }
}

/// Bidirectional literal/placeholder table.
#[derive(Debug, Clone)]
pub struct MaskingCodec {
    entries: Vec<MaskingEntry>,
    /// Indices into `entries`, longest original first.
    forward: Vec<usize>,
    /// Indices into `entries`, longest placeholder first.
    reverse: Vec<usize>,
}

/// Spreadsheet-style position tag: A..Z, AA, AB, ...
fn index_label(mut i: usize) -> String {
    let mut label = Vec::new();
    loop {
        label.push(b'A' + (i % 26) as u8);
        if i < 26 {
            break;
        }
        i = i / 26 - 1;
    }
    label.reverse();
    String::from_utf8_lossy(&label).into_owned()
}

impl MaskingCodec {
    /// Build the standard table: the two rule reasons, then each location, then each entity.
    pub fn new(
        sanctioned_entities: &[String],
        high_risk_locations: &[String],
    ) -> Result<Self, MaskingError> {
        let mut entries = vec![
            MaskingEntry::new(SANCTIONED_ENTITY, SANCTIONED_REASON_PLACEHOLDER),
            MaskingEntry::new(RISKY_GEOLOCATION, RISKY_LOCATION_REASON_PLACEHOLDER),
        ];
        entries.extend(
            high_risk_locations
                .iter()
                .enumerate()
                .map(|(i, loc)| MaskingEntry::new(loc.clone(), format!("[Location-{}]", index_label(i)))),
        );
        entries.extend(
            sanctioned_entities
                .iter()
                .enumerate()
                .map(|(i, ent)| MaskingEntry::new(ent.clone(), format!("[Entity-{}]", index_label(i)))),
        );
        Self::from_entries(entries)
    }

    /// Validate an arbitrary table.
    ///
    /// Originals and placeholders must be non-empty and unique, no placeholder may contain
    /// another placeholder, and no placeholder may contain or sit inside any original.
    pub fn from_entries(entries: Vec<MaskingEntry>) -> Result<Self, MaskingError> {
        if entries.iter().any(|e| e.original.is_empty() || e.placeholder.is_empty()) {
            return Err(MaskingError::EmptyLiteral);
        }
        for (i, a) in entries.iter().enumerate() {
            for (j, b) in entries.iter().enumerate() {
                if a.placeholder.contains(b.original.as_str()) || b.original.contains(a.placeholder.as_str()) {
                    return Err(MaskingError::LiteralCollision {
                        placeholder: a.placeholder.clone(),
                        literal: b.original.clone(),
                    });
                }
                if i == j {
                    continue;
                }
                if a.original == b.original {
                    return Err(MaskingError::DuplicateLiteral(a.original.clone()));
                }
                if a.placeholder.contains(b.placeholder.as_str()) {
                    return Err(MaskingError::PlaceholderCollision {
                        placeholder: a.placeholder.clone(),
                        other: b.placeholder.clone(),
                    });
                }
            }
        }

        let mut forward: Vec<usize> = (0..entries.len()).collect();
        forward.sort_by(|&a, &b| entries[b].original.len().cmp(&entries[a].original.len()));
        let mut reverse: Vec<usize> = (0..entries.len()).collect();
        reverse.sort_by(|&a, &b| entries[b].placeholder.len().cmp(&entries[a].placeholder.len()));

        tracing::debug!("Masking table built with {} entries", entries.len());
        Ok(Self {
            entries,
            forward,
            reverse,
        })
    }

    #[cfg(test)]
    pub fn entries(&self) -> &[MaskingEntry] {
        &self.entries
    }

    #[cfg(test)]
    pub fn placeholder_for(&self, original: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.original == original)
            .map(|e| e.placeholder.as_str())
    }

    /// Replace every known original with its placeholder.
    pub fn mask(&self, text: &str) -> String {
        substitute(text, &self.entries, &self.forward, |e| {
            (e.original.as_str(), e.placeholder.as_str())
        })
    }

    /// True if `text` already holds one of the table's placeholders.
    pub fn contains_placeholder(&self, text: &str) -> bool {
        self.entries.iter().any(|e| text.contains(e.placeholder.as_str()))
    }

    /// Replace every known placeholder with its original. Unknown tokens are left as they are.
    ///
    /// A placeholder that was already in the text before masking cannot be told apart from
    /// one `mask` emitted, so it is expanded as well. Check inputs with
    /// [`contains_placeholder`](Self::contains_placeholder) first.
    pub fn unmask(&self, text: &str) -> String {
        substitute(text, &self.entries, &self.reverse, |e| {
            (e.placeholder.as_str(), e.original.as_str())
        })
    }
}

/// Single left-to-right pass. At each position the first (longest) matching key wins and
/// replaced output is never rescanned.
fn substitute(
    text: &str,
    entries: &[MaskingEntry],
    order: &[usize],
    pair: fn(&MaskingEntry) -> (&str, &str),
) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    'scan: while !rest.is_empty() {
        for &i in order {
            let (from, to) = pair(&entries[i]);
            if let Some(tail) = rest.strip_prefix(from) {
                out.push_str(to);
                rest = tail;
                continue 'scan;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WatchlistConfig;

    fn codec() -> MaskingCodec {
        let w = WatchlistConfig::default();
        MaskingCodec::new(&w.sanctioned_entities, &w.high_risk_locations).unwrap()
    }

    #[test]
    fn index_labels() {
        assert_eq!(index_label(0), "A");
        assert_eq!(index_label(25), "Z");
        assert_eq!(index_label(26), "AA");
        assert_eq!(index_label(27), "AB");
        assert_eq!(index_label(701), "ZZ");
        assert_eq!(index_label(702), "AAA");
    }

    #[test]
    fn standard_table() {
        let c = codec();
        assert_eq!(c.entries().len(), 8);
        assert_eq!(c.placeholder_for("Sanctioned Entity"), Some(SANCTIONED_REASON_PLACEHOLDER));
        assert_eq!(c.placeholder_for("Risky Geolocation"), Some(RISKY_LOCATION_REASON_PLACEHOLDER));
        assert_eq!(c.placeholder_for("Moscow"), Some("[Location-A]"));
        assert_eq!(c.placeholder_for("Cayman Islands"), Some("[Location-B]"));
        assert_eq!(c.placeholder_for("Monitored Entity Alpha"), Some("[Entity-A]"));
        assert_eq!(c.placeholder_for("Global Oversight Ltd."), Some("[Entity-D]"));
    }

    #[test]
    fn entity_placeholders_are_distinct() {
        let c = codec();
        let mut placeholders: Vec<&str> = c.entries().iter().map(|e| e.placeholder.as_str()).collect();
        let len = placeholders.len();
        placeholders.sort();
        placeholders.dedup();
        assert_eq!(placeholders.len(), len);
    }

    #[test]
    fn no_placeholder_overlaps_anything() {
        let c = codec();
        for a in c.entries() {
            for b in c.entries() {
                assert!(!a.placeholder.contains(b.original.as_str()));
                assert!(!b.original.contains(a.placeholder.as_str()));
                if a != b {
                    assert!(!a.placeholder.contains(b.placeholder.as_str()));
                    assert!(!a.placeholder.starts_with(b.placeholder.as_str()));
                    assert!(!a.placeholder.ends_with(b.placeholder.as_str()));
                }
            }
        }
    }

    #[test]
    fn masks_entity_in_payload() {
        let c = codec();
        let payload = r#"[{"description":"Payment to High-Risk Corp Beta from user123","flag_reason":"Sanctioned Entity"}]"#;
        let masked = c.mask(payload);
        assert!(!masked.contains("High-Risk Corp Beta"));
        assert!(masked.contains("Payment to [Entity-B] from user123"));
        assert!(masked.contains(SANCTIONED_REASON_PLACEHOLDER));
        assert_eq!(c.unmask(&masked), payload);
    }

    #[test]
    fn round_trip_all_literals() {
        let c = codec();
        let text = "Moscow, Cayman Islands; Monitored Entity Alpha / High-Risk Corp Beta / \
                    Watchlist Inc. Gamma / Global Oversight Ltd. -> Sanctioned Entity, Risky Geolocation";
        let masked = c.mask(text);
        for e in c.entries() {
            assert!(!masked.contains(e.original.as_str()), "{} leaked", e.original);
        }
        assert_eq!(c.unmask(&masked), text);
    }

    #[test]
    fn mask_is_idempotent() {
        let c = codec();
        let once = c.mask("Transfer from Cayman Islands to Monitored Entity Alpha flagged Risky Geolocation");
        assert_eq!(c.mask(&once), once);
    }

    #[test]
    fn longest_literal_wins() {
        let c = MaskingCodec::new(&[], &["York".to_string(), "New York".to_string()]).unwrap();
        let masked = c.mask("New York and York");
        assert_eq!(masked, "[Location-B] and [Location-A]");
        assert_eq!(c.unmask(&masked), "New York and York");
    }

    #[test]
    fn reply_placeholders_are_restored() {
        let c = codec();
        let reply = "The [Entity-B] payment was routed through [Location-B] ([Reason: High-Risk Location]).";
        assert_eq!(
            c.unmask(reply),
            "The High-Risk Corp Beta payment was routed through Cayman Islands (Risky Geolocation)."
        );
    }

    #[test]
    fn unknown_tokens_pass_through() {
        let c = codec();
        let reply = "See [Entity-Q], [Entity B], [Location-a] and [Reason: Other].";
        assert_eq!(c.unmask(reply), reply);
    }

    #[test]
    fn text_without_literals_unchanged() {
        let c = codec();
        let text = "Payment to GoodCorp from user456 in London: 42.00 USD";
        assert_eq!(c.mask(text), text);
    }

    #[test]
    fn empty_literal_rejected() {
        let err = MaskingCodec::new(&[String::new()], &[]).unwrap_err();
        assert_eq!(err, MaskingError::EmptyLiteral);
    }

    #[test]
    fn duplicate_literal_rejected() {
        let err = MaskingCodec::new(&["Acme".to_string(), "Acme".to_string()], &[]).unwrap_err();
        assert_eq!(err, MaskingError::DuplicateLiteral("Acme".to_string()));
    }

    #[test]
    fn literal_inside_placeholder_rejected() {
        let err = MaskingCodec::new(&["Entity".to_string()], &[]).unwrap_err();
        assert!(matches!(err, MaskingError::LiteralCollision { .. }));
    }

    #[test]
    fn nested_placeholders_rejected() {
        let err = MaskingCodec::from_entries(vec![
            MaskingEntry::new("alpha", "[X]"),
            MaskingEntry::new("beta", "[X]]"),
        ])
        .unwrap_err();
        assert!(matches!(err, MaskingError::PlaceholderCollision { .. }));
    }

    #[test]
    fn placeholder_already_in_input_is_detected() {
        let c = codec();
        let text = "memo: see [Entity-A]";
        assert!(c.contains_placeholder(text));
        assert!(!c.contains_placeholder("memo: see Entity A"));
        // mask leaves it alone, unmask cannot tell it from an emitted one
        assert_eq!(c.mask(text), text);
        assert_eq!(c.unmask(&c.mask(text)), "memo: see Monitored Entity Alpha");
    }
}
