use std::cmp::Reverse;
use std::collections::HashMap;

use crate::models::{Ingredient, IngredientMatch, canonical_name};

pub const DEFAULT_LIMIT: usize = 10;

/// How well `query` (already canonical) matches `candidate`. Higher is
/// better; `None` means no match.
fn score(query: &str, candidate: &str) -> Option<u32> {
    if candidate == query {
        return Some(100);
    }
    if candidate.starts_with(query) {
        return Some(80);
    }
    if candidate.split(' ').any(|word| word.starts_with(query)) {
        return Some(60);
    }
    if candidate.contains(query) {
        return Some(40);
    }
    let mut rest = candidate.chars();
    if query.chars().filter(|c| *c != ' ').all(|q| rest.any(|c| c == q)) {
        return Some(20);
    }
    None
}

/// Autocomplete over the ingredient catalog.
///
/// Matches against both the canonical and the display name. Ties are broken
/// by how many meal lines use the ingredient, then alphabetically. An empty
/// query returns the most used ingredients.
#[must_use]
pub fn rank_ingredients(
    query: &str,
    ingredients: Vec<Ingredient>,
    use_counts: &HashMap<String, usize>,
    limit: usize,
) -> Vec<IngredientMatch> {
    let query = canonical_name(query);

    let mut scored: Vec<(u32, IngredientMatch)> = ingredients
        .into_iter()
        .filter_map(|ingredient| {
            let best = if query.is_empty() {
                Some(0)
            } else {
                score(&query, &ingredient.name)
                    .max(score(&query, &canonical_name(&ingredient.display_name)))
            }?;
            let use_count = use_counts.get(&ingredient.id).copied().unwrap_or(0);
            Some((
                best,
                IngredientMatch {
                    ingredient,
                    use_count,
                },
            ))
        })
        .collect();

    scored.sort_by_key(|(score, m)| {
        (
            Reverse(*score),
            Reverse(m.use_count),
            m.ingredient.display_name.to_lowercase(),
        )
    });

    scored.into_iter().take(limit).map(|(_, m)| m).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StoreSection;
    use chrono::Utc;

    fn ingredient(id: &str, display: &str) -> Ingredient {
        Ingredient {
            id: id.to_string(),
            name: canonical_name(display),
            display_name: display.to_string(),
            store_section: StoreSection::Other,
            default_unit: String::new(),
            is_common_item: false,
            created_at: Utc::now(),
        }
    }

    fn catalog() -> Vec<Ingredient> {
        vec![
            ingredient("1", "Olive Oil"),
            ingredient("2", "Onion"),
            ingredient("3", "Green Onion"),
            ingredient("4", "Oil"),
            ingredient("5", "Brown Sugar"),
        ]
    }

    fn names(matches: &[IngredientMatch]) -> Vec<&str> {
        matches
            .iter()
            .map(|m| m.ingredient.display_name.as_str())
            .collect()
    }

    #[test]
    fn test_score_tiers() {
        assert_eq!(score("oil", "oil"), Some(100));
        assert_eq!(score("oli", "olive oil"), Some(80));
        assert_eq!(score("oni", "green onion"), Some(60));
        assert_eq!(score("nio", "green onion"), Some(40));
        assert_eq!(score("gon", "green onion"), Some(20));
        assert_eq!(score("xyz", "green onion"), None);
    }

    #[test]
    fn test_exact_beats_prefix() {
        let results = rank_ingredients("oil", catalog(), &HashMap::new(), 10);
        assert_eq!(names(&results)[0], "Oil");
        assert!(names(&results).contains(&"Olive Oil"));
    }

    #[test]
    fn test_case_insensitive() {
        let results = rank_ingredients("ONION", catalog(), &HashMap::new(), 10);
        assert_eq!(names(&results)[0], "Onion");
        assert_eq!(names(&results)[1], "Green Onion");
    }

    #[test]
    fn test_use_count_breaks_ties() {
        let mut counts = HashMap::new();
        counts.insert("3".to_string(), 5);
        // "Onion" and "Green Onion" both contain a word starting with "on",
        // but "Onion" is also a prefix match, so it still wins.
        let results = rank_ingredients("on", catalog(), &counts, 10);
        assert_eq!(names(&results)[0], "Onion");

        let mut counts = HashMap::new();
        counts.insert("4".to_string(), 3);
        let results = rank_ingredients("", catalog(), &counts, 2);
        assert_eq!(results[0].ingredient.display_name, "Oil");
        assert_eq!(results[0].use_count, 3);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_no_match_is_empty() {
        assert!(rank_ingredients("zzz", catalog(), &HashMap::new(), 10).is_empty());
    }

    #[test]
    fn test_limit_applies() {
        let results = rank_ingredients("o", catalog(), &HashMap::new(), 2);
        assert_eq!(results.len(), 2);
    }
}
