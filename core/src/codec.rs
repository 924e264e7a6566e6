//! Typed records ⇄ string rows.
//!
//! Each record type owns its sheet name, header and column layout; nothing
//! outside this module refers to a column by position.

use std::str::FromStr;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, NaiveDate, Utc};

use crate::models::{
    CalendarEntry, Effort, Ingredient, IngredientLine, MAX_LIST_MEALS, Meal, ShoppingList,
    ShoppingListItem,
};

/// Every record's id sits in the first column.
pub const ID_COLUMN: usize = 0;

const TRUE_CELL: &str = "TRUE";
const FALSE_CELL: &str = "FALSE";

/// A record stored as one row of one sheet.
pub trait Record: Sized {
    const SHEET: &'static str;
    const HEADERS: &'static [&'static str];

    fn id(&self) -> &str;
    fn to_row(&self) -> Vec<String>;
    fn from_cells(cells: &Cells<'_>) -> Result<Self>;

    fn from_row(row: &[String]) -> Result<Self> {
        Self::from_cells(&Cells::new(Self::HEADERS, row))
    }
}

/// Read access to a row's cells with the parsing rules of the sheet format.
///
/// Spreadsheet APIs drop trailing empty cells, so columns past the end of
/// the row read as empty.
pub struct Cells<'a> {
    headers: &'static [&'static str],
    cells: &'a [String],
}

impl<'a> Cells<'a> {
    #[must_use]
    pub fn new(headers: &'static [&'static str], cells: &'a [String]) -> Self {
        Self { headers, cells }
    }

    fn column_name(&self, col: usize) -> &'static str {
        self.headers.get(col).copied().unwrap_or("?")
    }

    #[must_use]
    pub fn text(&self, col: usize) -> &'a str {
        self.cells.get(col).map_or("", |c| c.trim())
    }

    pub fn required(&self, col: usize) -> Result<String> {
        let value = self.text(col);
        if value.is_empty() {
            bail!("column '{}' is empty", self.column_name(col));
        }
        Ok(value.to_string())
    }

    #[must_use]
    pub fn optional(&self, col: usize) -> Option<String> {
        let value = self.text(col);
        (!value.is_empty()).then(|| value.to_string())
    }

    pub fn number(&self, col: usize) -> Result<Option<f64>> {
        let value = self.text(col);
        if value.is_empty() {
            return Ok(None);
        }
        value
            .parse::<f64>()
            .map(Some)
            .with_context(|| format!("column '{}' is not a number: '{value}'", self.column_name(col)))
    }

    /// Only the literal `TRUE` (any casing) is true.
    #[must_use]
    pub fn boolean(&self, col: usize) -> bool {
        self.text(col).eq_ignore_ascii_case(TRUE_CELL)
    }

    #[must_use]
    pub fn list(&self, col: usize) -> Vec<String> {
        self.text(col)
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn parse<T>(&self, col: usize) -> Result<T>
    where
        T: FromStr<Err = anyhow::Error>,
    {
        let value = self.required(col)?;
        value
            .parse()
            .with_context(|| format!("column '{}'", self.column_name(col)))
    }

    pub fn parse_optional<T>(&self, col: usize) -> Result<Option<T>>
    where
        T: FromStr<Err = anyhow::Error>,
    {
        self.optional(col)
            .map(|v| {
                v.parse()
                    .with_context(|| format!("column '{}'", self.column_name(col)))
            })
            .transpose()
    }

    pub fn timestamp(&self, col: usize) -> Result<DateTime<Utc>> {
        let value = self.required(col)?;
        DateTime::parse_from_rfc3339(&value)
            .map(|t| t.with_timezone(&Utc))
            .with_context(|| format!("column '{}' is not a timestamp: '{value}'", self.column_name(col)))
    }

    pub fn date(&self, col: usize) -> Result<NaiveDate> {
        let value = self.required(col)?;
        NaiveDate::parse_from_str(&value, "%Y-%m-%d")
            .with_context(|| format!("column '{}' is not a date: '{value}'", self.column_name(col)))
    }

    pub fn count(&self, col: usize) -> Result<u32> {
        let value = self.required(col)?;
        value
            .parse()
            .with_context(|| format!("column '{}' is not a whole number: '{value}'", self.column_name(col)))
    }
}

// --- Cell writers ---

#[must_use]
pub fn bool_cell(value: bool) -> String {
    let cell = if value { TRUE_CELL } else { FALSE_CELL };
    cell.to_string()
}

#[must_use]
pub fn number_cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[must_use]
pub fn list_cell(values: &[String]) -> String {
    values.join(",")
}

#[must_use]
pub fn timestamp_cell(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

#[must_use]
pub fn opt_cell(value: Option<&str>) -> String {
    value.unwrap_or_default().to_string()
}

// --- Records ---

impl Record for Ingredient {
    const SHEET: &'static str = "Ingredients";
    const HEADERS: &'static [&'static str] = &[
        "id",
        "name",
        "displayName",
        "storeSection",
        "defaultUnit",
        "isCommonItem",
        "createdAt",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.name.clone(),
            self.display_name.clone(),
            self.store_section.to_string(),
            self.default_unit.clone(),
            bool_cell(self.is_common_item),
            timestamp_cell(self.created_at),
        ]
    }

    fn from_cells(c: &Cells<'_>) -> Result<Self> {
        Ok(Ingredient {
            id: c.required(0)?,
            name: c.required(1)?,
            display_name: c.required(2)?,
            store_section: c.parse(3)?,
            default_unit: c.text(4).to_string(),
            is_common_item: c.boolean(5),
            created_at: c.timestamp(6)?,
        })
    }
}

impl Record for IngredientLine {
    const SHEET: &'static str = "MealIngredients";
    const HEADERS: &'static [&'static str] =
        &["id", "mealId", "ingredientId", "quantity", "unit", "note"];

    fn id(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.meal_id.clone(),
            self.ingredient_id.clone(),
            number_cell(self.quantity),
            self.unit.clone(),
            opt_cell(self.note.as_deref()),
        ]
    }

    fn from_cells(c: &Cells<'_>) -> Result<Self> {
        Ok(IngredientLine {
            id: c.required(0)?,
            meal_id: c.required(1)?,
            ingredient_id: c.required(2)?,
            quantity: c.number(3)?,
            unit: c.text(4).to_string(),
            note: c.optional(5),
        })
    }
}

impl Record for Meal {
    const SHEET: &'static str = "Meals";
    const HEADERS: &'static [&'static str] = &[
        "id",
        "name",
        "kind",
        "location",
        "rating",
        "effort",
        "notes",
        "leftoverNotes",
        "tags",
        "createdAt",
        "updatedAt",
        "createdBy",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.name.clone(),
            self.kind.to_string(),
            opt_cell(self.location.as_deref()),
            self.rating.map(|r| r.to_string()).unwrap_or_default(),
            opt_cell(self.effort.map(Effort::as_str)),
            opt_cell(self.notes.as_deref()),
            opt_cell(self.leftover_notes.as_deref()),
            list_cell(&self.tags),
            timestamp_cell(self.created_at),
            timestamp_cell(self.updated_at),
            self.created_by.clone(),
        ]
    }

    fn from_cells(c: &Cells<'_>) -> Result<Self> {
        let rating = c
            .optional(4)
            .map(|r| {
                r.parse::<u8>()
                    .map_err(|_| anyhow!("column 'rating' is not a rating: '{r}'"))
            })
            .transpose()?;
        Ok(Meal {
            id: c.required(0)?,
            name: c.required(1)?,
            kind: c.parse(2)?,
            location: c.optional(3),
            rating,
            effort: c.parse_optional(5)?,
            notes: c.optional(6),
            leftover_notes: c.optional(7),
            tags: c.list(8),
            created_at: c.timestamp(9)?,
            updated_at: c.timestamp(10)?,
            created_by: c.text(11).to_string(),
        })
    }
}

impl Record for CalendarEntry {
    const SHEET: &'static str = "Calendar";
    const HEADERS: &'static [&'static str] =
        &["id", "date", "slot", "mealId", "createdBy", "createdAt"];

    fn id(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.date.format("%Y-%m-%d").to_string(),
            self.slot.to_string(),
            self.meal_id.clone(),
            self.created_by.clone(),
            timestamp_cell(self.created_at),
        ]
    }

    fn from_cells(c: &Cells<'_>) -> Result<Self> {
        Ok(CalendarEntry {
            id: c.required(0)?,
            date: c.date(1)?,
            slot: c.parse(2)?,
            meal_id: c.required(3)?,
            created_by: c.text(4).to_string(),
            created_at: c.timestamp(5)?,
        })
    }
}

/// Header row of a shopping list. Items live in their own sheet and are
/// attached by the repository.
impl Record for ShoppingList {
    const SHEET: &'static str = "ShoppingLists";
    const HEADERS: &'static [&'static str] =
        &["id", "name", "mealIds", "createdAt", "expiresAt", "createdBy"];

    fn id(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            opt_cell(self.name.as_deref()),
            list_cell(&self.meal_ids),
            timestamp_cell(self.created_at),
            timestamp_cell(self.expires_at),
            self.created_by.clone(),
        ]
    }

    fn from_cells(c: &Cells<'_>) -> Result<Self> {
        let meal_ids = c.list(2);
        if !(1..=MAX_LIST_MEALS).contains(&meal_ids.len()) {
            bail!(
                "column 'mealIds' must list 1 to {MAX_LIST_MEALS} meals, got {}",
                meal_ids.len()
            );
        }
        Ok(ShoppingList {
            id: c.required(0)?,
            name: c.optional(1),
            meal_ids,
            created_at: c.timestamp(3)?,
            expires_at: c.timestamp(4)?,
            created_by: c.text(5).to_string(),
            items: Vec::new(),
        })
    }
}

impl Record for ShoppingListItem {
    const SHEET: &'static str = "ShoppingListItems";
    const HEADERS: &'static [&'static str] = &[
        "id",
        "listId",
        "ingredientId",
        "combinedQuantity",
        "storeSection",
        "isChecked",
        "displayOrder",
        "ingredientName",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.list_id.clone(),
            self.ingredient_id.clone(),
            self.combined_quantity.clone(),
            self.store_section.to_string(),
            bool_cell(self.is_checked),
            self.display_order.to_string(),
            self.ingredient_name.clone(),
        ]
    }

    fn from_cells(c: &Cells<'_>) -> Result<Self> {
        Ok(ShoppingListItem {
            id: c.required(0)?,
            list_id: c.required(1)?,
            ingredient_id: c.required(2)?,
            combined_quantity: c.text(3).to_string(),
            store_section: c.parse(4)?,
            is_checked: c.boolean(5),
            display_order: c.count(6)?,
            ingredient_name: c.text(7).to_string(),
        })
    }
}

// --- Sheet lookup (used by CSV interchange) ---

pub const SHEETS: &[&str] = &[
    Ingredient::SHEET,
    IngredientLine::SHEET,
    Meal::SHEET,
    CalendarEntry::SHEET,
    ShoppingList::SHEET,
    ShoppingListItem::SHEET,
];

#[must_use]
pub fn headers_for(sheet: &str) -> Option<&'static [&'static str]> {
    match sheet {
        s if s == Ingredient::SHEET => Some(Ingredient::HEADERS),
        s if s == IngredientLine::SHEET => Some(IngredientLine::HEADERS),
        s if s == Meal::SHEET => Some(Meal::HEADERS),
        s if s == CalendarEntry::SHEET => Some(CalendarEntry::HEADERS),
        s if s == ShoppingList::SHEET => Some(ShoppingList::HEADERS),
        s if s == ShoppingListItem::SHEET => Some(ShoppingListItem::HEADERS),
        _ => None,
    }
}

/// Decode `row` with the codec of `sheet`, discarding the result.
pub fn check_row(sheet: &str, row: &[String]) -> Result<()> {
    match sheet {
        s if s == Ingredient::SHEET => Ingredient::from_row(row).map(drop),
        s if s == IngredientLine::SHEET => IngredientLine::from_row(row).map(drop),
        s if s == Meal::SHEET => Meal::from_row(row).map(drop),
        s if s == CalendarEntry::SHEET => CalendarEntry::from_row(row).map(drop),
        s if s == ShoppingList::SHEET => ShoppingList::from_row(row).map(drop),
        s if s == ShoppingListItem::SHEET => ShoppingListItem::from_row(row).map(drop),
        _ => bail!(
            "Unknown sheet '{sheet}'. Known sheets: {}",
            SHEETS.join(", ")
        ),
    }
}
