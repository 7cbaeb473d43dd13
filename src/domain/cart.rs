//! Cart lines and duplicate-line merging.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One (name, value) pair as chosen by the buyer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedAttribute {
    pub name: String,
    pub value: String,
}

/// An unordered buyer attribute selection, held in canonical trimmed form.
///
/// Merging compares selections case-insensitively; variant resolution keeps
/// value labels case-sensitive as stored. Both work off this one type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSelection(Vec<SelectedAttribute>);

impl AttributeSelection {
    /// Canonicalize: trim names and values, drop pairs with empty names,
    /// sort so equal unordered selections compare equal.
    pub fn new(pairs: Vec<SelectedAttribute>) -> Self {
        let mut pairs: Vec<SelectedAttribute> = pairs
            .into_iter()
            .map(|p| SelectedAttribute {
                name: p.name.trim().to_string(),
                value: p.value.trim().to_string(),
            })
            .filter(|p| !p.name.is_empty())
            .collect();
        pairs.sort_by(|a, b| {
            (a.name.to_lowercase(), a.value.to_lowercase())
                .cmp(&(b.name.to_lowercase(), b.value.to_lowercase()))
        });
        Self(pairs)
    }

    pub fn pairs(&self) -> &[SelectedAttribute] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Case-insensitive key: two cart lines with the same product and the
    /// same key are the same line.
    pub fn merge_key(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .map(|p| (p.name.to_lowercase(), p.value.to_lowercase()))
            .collect()
    }

    /// True if the selection contains this pair, matching the name
    /// case-insensitively and the value exactly as stored.
    pub fn contains(&self, name: &str, value: &str) -> bool {
        let name = name.trim().to_lowercase();
        self.0
            .iter()
            .any(|p| p.name.to_lowercase() == name && p.value == value)
    }
}

/// One buyer-submitted request line. Display fields are what the storefront
/// showed the buyer; they are never trusted for the commit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub quantity: u32,
    pub selection: AttributeSelection,
    pub display_price: Option<i64>,
    pub display_name: Option<String>,
    pub display_image: Option<String>,
}

/// Collapse lines referencing the same product and the same selection into
/// one line with summed quantity. The first-seen line's display metadata is
/// kept. Never discards a line.
pub fn merge_lines(lines: Vec<CartLine>) -> Vec<CartLine> {
    let mut merged: Vec<CartLine> = Vec::with_capacity(lines.len());
    for line in lines {
        let existing = merged.iter_mut().find(|m| {
            m.product_id == line.product_id && m.selection.merge_key() == line.selection.merge_key()
        });
        match existing {
            Some(m) => m.quantity = m.quantity.saturating_add(line.quantity),
            None => merged.push(line),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(name: &str, value: &str) -> SelectedAttribute {
        SelectedAttribute {
            name: name.into(),
            value: value.into(),
        }
    }

    fn line(product_id: Uuid, qty: u32, pairs: Vec<SelectedAttribute>) -> CartLine {
        CartLine {
            product_id,
            quantity: qty,
            selection: AttributeSelection::new(pairs),
            display_price: None,
            display_name: None,
            display_image: None,
        }
    }

    #[test]
    fn test_merge_same_selection_sums_quantities() {
        let pid = Uuid::new_v4();
        let merged = merge_lines(vec![
            line(pid, 2, vec![pair("Color", "Red")]),
            line(pid, 3, vec![pair("Color", "Red")]),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].quantity, 5);
    }

    #[test]
    fn test_merge_is_order_and_case_insensitive() {
        let pid = Uuid::new_v4();
        let merged = merge_lines(vec![
            line(pid, 1, vec![pair("Color", "Red"), pair("Size", "M")]),
            line(pid, 1, vec![pair(" size ", "m"), pair("color", "RED")]),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].quantity, 2);
    }

    #[test]
    fn test_different_values_do_not_merge() {
        let pid = Uuid::new_v4();
        let merged = merge_lines(vec![
            line(pid, 1, vec![pair("Color", "Red")]),
            line(pid, 1, vec![pair("Color", "Blue")]),
        ]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_different_products_do_not_merge() {
        let merged = merge_lines(vec![
            line(Uuid::new_v4(), 1, vec![pair("Color", "Red")]),
            line(Uuid::new_v4(), 1, vec![pair("Color", "Red")]),
        ]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_first_seen_display_metadata_is_kept() {
        let pid = Uuid::new_v4();
        let mut first = line(pid, 1, vec![]);
        first.display_name = Some("Shown first".into());
        let mut second = line(pid, 1, vec![]);
        second.display_name = Some("Shown later".into());
        let merged = merge_lines(vec![first, second]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].display_name.as_deref(), Some("Shown first"));
    }

    #[test]
    fn test_selection_contains_is_value_case_sensitive() {
        let s = AttributeSelection::new(vec![pair("Color", "Red")]);
        assert!(s.contains("color", "Red"));
        assert!(!s.contains("Color", "red"));
    }
}
