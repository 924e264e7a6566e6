use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MealbookError, Result};

/// Most meals a single shopping list may be generated from.
pub const MAX_LIST_MEALS: usize = 4;

/// Shopping lists expire this many days after generation.
pub const LIST_LIFETIME_DAYS: i64 = 28;

/// Combined quantity shown when an ingredient has no usable amounts.
pub const NO_QUANTITY: &str = "-";

// --- Enumerations ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreSection {
    Produce,
    Dairy,
    Meat,
    Pantry,
    Frozen,
    Bakery,
    Beverages,
    Other,
}

impl StoreSection {
    /// The order a shopper walks the store in. Shopping lists are grouped
    /// by section in exactly this order.
    pub const WALK_ORDER: [StoreSection; 8] = [
        StoreSection::Produce,
        StoreSection::Meat,
        StoreSection::Dairy,
        StoreSection::Bakery,
        StoreSection::Frozen,
        StoreSection::Pantry,
        StoreSection::Beverages,
        StoreSection::Other,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Produce => "produce",
            Self::Dairy => "dairy",
            Self::Meat => "meat",
            Self::Pantry => "pantry",
            Self::Frozen => "frozen",
            Self::Bakery => "bakery",
            Self::Beverages => "beverages",
            Self::Other => "other",
        }
    }

    /// Position of this section in [`StoreSection::WALK_ORDER`].
    #[must_use]
    pub fn walk_rank(self) -> usize {
        Self::WALK_ORDER
            .iter()
            .position(|s| *s == self)
            .unwrap_or(Self::WALK_ORDER.len())
    }
}

impl fmt::Display for StoreSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreSection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let lower = s.trim().to_lowercase();
        match Self::WALK_ORDER.iter().find(|sec| sec.as_str() == lower) {
            Some(section) => Ok(*section),
            None => bail!(
                "Invalid store section '{s}'. Must be one of: {}",
                Self::WALK_ORDER.map(Self::as_str).join(", ")
            ),
        }
    }
}

/// Where a meal was eaten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealKind {
    Homemade,
    Restaurant,
    Friends,
}

impl MealKind {
    pub const ALL: [MealKind; 3] = [Self::Homemade, Self::Restaurant, Self::Friends];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Homemade => "homemade",
            Self::Restaurant => "restaurant",
            Self::Friends => "friends",
        }
    }
}

impl fmt::Display for MealKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MealKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let lower = s.trim().to_lowercase();
        match Self::ALL.iter().find(|k| k.as_str() == lower) {
            Some(kind) => Ok(*kind),
            None => bail!(
                "Invalid meal kind '{s}'. Must be one of: {}",
                Self::ALL.map(Self::as_str).join(", ")
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effort {
    Easy,
    Medium,
    Hard,
}

impl Effort {
    pub const ALL: [Effort; 3] = [Self::Easy, Self::Medium, Self::Hard];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

impl FromStr for Effort {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let lower = s.trim().to_lowercase();
        match Self::ALL.iter().find(|e| e.as_str() == lower) {
            Some(effort) => Ok(*effort),
            None => bail!(
                "Invalid effort '{s}'. Must be one of: {}",
                Self::ALL.map(Self::as_str).join(", ")
            ),
        }
    }
}

/// Calendar slot a meal is placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealSlot {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

impl MealSlot {
    pub const ALL: [MealSlot; 4] = [Self::Breakfast, Self::Lunch, Self::Dinner, Self::Snack];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
            Self::Snack => "snack",
        }
    }
}

impl fmt::Display for MealSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MealSlot {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let lower = s.trim().to_lowercase();
        match Self::ALL.iter().find(|m| m.as_str() == lower) {
            Some(slot) => Ok(*slot),
            None => bail!(
                "Invalid meal slot '{s}'. Must be one of: {}",
                Self::ALL.map(Self::as_str).join(", ")
            ),
        }
    }
}

// --- Ingredients ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingredient {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub store_section: StoreSection,
    pub default_unit: String,
    pub is_common_item: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIngredient {
    pub display_name: String,
    pub store_section: Option<StoreSection>,
    #[serde(default)]
    pub default_unit: String,
    #[serde(default)]
    pub is_common_item: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateIngredient {
    pub display_name: Option<String>,
    pub store_section: Option<StoreSection>,
    pub default_unit: Option<String>,
    pub is_common_item: Option<bool>,
}

/// An autocomplete hit.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngredientMatch {
    #[serde(flatten)]
    pub ingredient: Ingredient,
    pub use_count: usize,
}

/// One meal's use of an ingredient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngredientLine {
    pub id: String,
    pub meal_id: String,
    pub ingredient_id: String,
    /// `None` means "to taste".
    pub quantity: Option<f64>,
    /// Empty for a plain count.
    pub unit: String,
    pub note: Option<String>,
}

/// A line as submitted when creating or editing a meal. Either
/// `ingredient_id` points at an existing ingredient, or `name` is matched
/// against the catalog (and created when missing).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIngredientLine {
    pub ingredient_id: Option<String>,
    pub name: Option<String>,
    pub quantity: Option<f64>,
    #[serde(default)]
    pub unit: String,
    pub note: Option<String>,
    /// Section for an ingredient created from this line.
    pub store_section: Option<StoreSection>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MealLine {
    #[serde(flatten)]
    pub line: IngredientLine,
    pub ingredient_name: String,
    pub store_section: StoreSection,
}

// --- Meals ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meal {
    pub id: String,
    pub name: String,
    pub kind: MealKind,
    pub location: Option<String>,
    pub rating: Option<u8>,
    pub effort: Option<Effort>,
    pub notes: Option<String>,
    pub leftover_notes: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMeal {
    pub name: String,
    pub kind: MealKind,
    pub location: Option<String>,
    pub rating: Option<u8>,
    pub effort: Option<Effort>,
    pub notes: Option<String>,
    pub leftover_notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub ingredients: Vec<NewIngredientLine>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMeal {
    pub name: Option<String>,
    pub kind: Option<MealKind>,
    pub location: Option<String>,
    pub rating: Option<u8>,
    pub effort: Option<Effort>,
    pub notes: Option<String>,
    pub leftover_notes: Option<String>,
    pub tags: Option<Vec<String>>,
    /// Replaces every line of the meal when present.
    pub ingredients: Option<Vec<NewIngredientLine>>,
}

impl UpdateMeal {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.kind.is_none()
            && self.location.is_none()
            && self.rating.is_none()
            && self.effort.is_none()
            && self.notes.is_none()
            && self.leftover_notes.is_none()
            && self.tags.is_none()
            && self.ingredients.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MealDetail {
    #[serde(flatten)]
    pub meal: Meal,
    pub ingredients: Vec<MealLine>,
}

// --- Calendar ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEntry {
    pub id: String,
    pub date: NaiveDate,
    pub slot: MealSlot,
    pub meal_id: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCalendarEntry {
    pub date: NaiveDate,
    pub slot: MealSlot,
    pub meal_id: String,
}

/// Calendar entry joined with its meal's name.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDay {
    #[serde(flatten)]
    pub entry: CalendarEntry,
    pub meal_name: String,
}

// --- Shopping lists ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingList {
    pub id: String,
    pub name: Option<String>,
    pub meal_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(default)]
    pub items: Vec<ShoppingListItem>,
}

impl ShoppingList {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingListItem {
    pub id: String,
    pub list_id: String,
    pub ingredient_id: String,
    pub combined_quantity: String,
    pub store_section: StoreSection,
    pub is_checked: bool,
    pub display_order: u32,
    pub ingredient_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateListRequest {
    pub meal_ids: Vec<String>,
    #[serde(default)]
    pub exclude_common_items: bool,
    #[serde(default)]
    pub name: Option<String>,
}

// --- Validation ---

/// Trim, lowercase and collapse internal whitespace.
#[must_use]
pub fn canonical_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Treat blank strings as absent.
#[must_use]
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn validate_meal_ids(meal_ids: &[String]) -> Result<()> {
    if meal_ids.is_empty() {
        return Err(MealbookError::validation("At least one meal must be selected"));
    }
    if meal_ids.len() > MAX_LIST_MEALS {
        return Err(MealbookError::validation(format!(
            "At most {MAX_LIST_MEALS} meals can be combined into a shopping list, got {}",
            meal_ids.len()
        )));
    }
    for (i, id) in meal_ids.iter().enumerate() {
        if id.trim().is_empty() {
            return Err(MealbookError::validation("Meal ids must not be blank"));
        }
        if meal_ids[..i].contains(id) {
            return Err(MealbookError::validation(format!(
                "Meal '{id}' is selected more than once"
            )));
        }
    }
    Ok(())
}

pub fn validate_rating(rating: u8) -> Result<()> {
    if (1..=5).contains(&rating) {
        Ok(())
    } else {
        Err(MealbookError::validation(format!(
            "Rating must be between 1 and 5, got {rating}"
        )))
    }
}

pub fn validate_quantity(quantity: Option<f64>) -> Result<()> {
    match quantity {
        Some(q) if !q.is_finite() || q < 0.0 => Err(MealbookError::validation(format!(
            "Quantity must be a non-negative number, got {q}"
        ))),
        _ => Ok(()),
    }
}

pub fn validate_name(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(MealbookError::validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}
