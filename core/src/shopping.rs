//! Shopping list consolidation.
//!
//! Turns the ingredient lines of a few meals into one entry per ingredient,
//! each carrying a human-readable combined quantity, ordered by the walk
//! through the store. Pure: no store access happens here.

use std::collections::HashMap;

use crate::models::{Ingredient, IngredientLine, NO_QUANTITY, StoreSection};

/// Unit string that shares the bucket of unit-less quantities.
const COUNT_UNIT: &str = "count";

const FRAGMENT_SEPARATOR: &str = " + ";

/// One ingredient line with its ingredient resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Amount {
    pub ingredient_id: String,
    pub name: String,
    pub display_name: String,
    pub store_section: StoreSection,
    pub is_common_item: bool,
    pub quantity: Option<f64>,
    pub unit: String,
    pub note: Option<String>,
}

impl Amount {
    /// Attach `ingredient` to `line`. A line whose ingredient is missing from
    /// the catalog gets a stand-in named after the raw reference, filed under
    /// pantry and never treated as a common item.
    #[must_use]
    pub fn resolve(line: &IngredientLine, ingredient: Option<&Ingredient>) -> Self {
        let (name, display_name, store_section, is_common_item) = match ingredient {
            Some(i) => (
                i.name.clone(),
                i.display_name.clone(),
                i.store_section,
                i.is_common_item,
            ),
            None => (
                line.ingredient_id.clone(),
                line.ingredient_id.clone(),
                StoreSection::Pantry,
                false,
            ),
        };
        Amount {
            ingredient_id: line.ingredient_id.clone(),
            name,
            display_name,
            store_section,
            is_common_item,
            quantity: line.quantity,
            unit: line.unit.trim().to_string(),
            note: line
                .note
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(String::from),
        }
    }

    fn is_combinable(&self) -> bool {
        self.quantity.is_some() && self.note.is_none()
    }
}

/// One line of a generated shopping list, before ids are minted.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidatedItem {
    pub ingredient_id: String,
    pub ingredient_name: String,
    pub store_section: StoreSection,
    pub combined_quantity: String,
    pub display_order: u32,
}

struct Group<'a> {
    first: &'a Amount,
    /// (unit, running total) in order of first appearance. Empty unit is the
    /// count bucket.
    buckets: Vec<(&'a str, f64)>,
    annotated: Vec<String>,
}

impl<'a> Group<'a> {
    fn new(first: &'a Amount) -> Self {
        Group {
            first,
            buckets: Vec::new(),
            annotated: Vec::new(),
        }
    }

    fn add(&mut self, amount: &'a Amount) {
        if amount.is_combinable() {
            let unit = bucket_unit(&amount.unit);
            let quantity = amount.quantity.unwrap_or_default();
            match self.buckets.iter_mut().find(|(u, _)| *u == unit) {
                Some((_, total)) => *total += quantity,
                None => self.buckets.push((unit, quantity)),
            }
        } else if let Some(note) = &amount.note {
            self.annotated
                .push(annotated_fragment(amount.quantity, &amount.unit, note));
        }
    }

    fn combined_quantity(&self) -> String {
        let fragments: Vec<String> = self
            .buckets
            .iter()
            .map(|(unit, total)| bucket_fragment(*total, unit))
            .chain(self.annotated.iter().cloned())
            .collect();
        if fragments.is_empty() {
            NO_QUANTITY.to_string()
        } else {
            fragments.join(FRAGMENT_SEPARATOR)
        }
    }
}

fn bucket_unit(unit: &str) -> &str {
    if unit.eq_ignore_ascii_case(COUNT_UNIT) {
        ""
    } else {
        unit
    }
}

fn bucket_fragment(total: f64, unit: &str) -> String {
    let qty = format_quantity(total);
    if unit.is_empty() {
        qty
    } else {
        format!("{qty} {unit}")
    }
}

fn annotated_fragment(quantity: Option<f64>, unit: &str, note: &str) -> String {
    match quantity {
        Some(q) if unit.is_empty() => format!("{} ({note})", format_quantity(q)),
        Some(q) => format!("{} {unit} ({note})", format_quantity(q)),
        None => format!("({note})"),
    }
}

/// Two decimals at most, no trailing zeros: `3`, `0.25`, `1.5`.
#[must_use]
pub fn format_quantity(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    let text = format!("{rounded:.2}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

/// Merge `amounts` into one item per ingredient id, sorted by store walk
/// order and numbered from 0.
///
/// Amounts are grouped by id only, so two ingredients sharing a name stay
/// separate. Within an ingredient, note-free amounts are summed per unit
/// string (no conversion between units); every amount carrying a note
/// becomes its own fragment. With `exclude_common_items`, common
/// ingredients are dropped outright.
#[must_use]
pub fn consolidate(amounts: &[Amount], exclude_common_items: bool) -> Vec<ConsolidatedItem> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<Group<'_>> = Vec::new();

    for amount in amounts {
        if exclude_common_items && amount.is_common_item {
            continue;
        }
        let slot = *index
            .entry(amount.ingredient_id.as_str())
            .or_insert_with(|| {
                groups.push(Group::new(amount));
                groups.len() - 1
            });
        groups[slot].add(amount);
    }

    groups.sort_by(|a, b| {
        a.first
            .store_section
            .walk_rank()
            .cmp(&b.first.store_section.walk_rank())
            .then_with(|| {
                a.first
                    .display_name
                    .to_lowercase()
                    .cmp(&b.first.display_name.to_lowercase())
            })
            .then_with(|| a.first.ingredient_id.cmp(&b.first.ingredient_id))
    });

    groups
        .iter()
        .zip(0u32..)
        .map(|(group, display_order)| ConsolidatedItem {
            ingredient_id: group.first.ingredient_id.clone(),
            ingredient_name: group.first.display_name.clone(),
            store_section: group.first.store_section,
            combined_quantity: group.combined_quantity(),
            display_order,
        })
        .collect()
}
