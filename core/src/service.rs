use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::SqliteRowStore;
use crate::error::{MealbookError, Result};
use crate::models::{
    CalendarDay, CalendarEntry, GenerateListRequest, Ingredient, IngredientLine, IngredientMatch,
    LIST_LIFETIME_DAYS, Meal, MealDetail, MealKind, MealLine, NewCalendarEntry, NewIngredient,
    NewIngredientLine, NewMeal, ShoppingList, ShoppingListItem, StoreSection, UpdateIngredient,
    UpdateMeal, canonical_name, non_blank, validate_meal_ids, validate_name, validate_quantity,
    validate_rating,
};
use crate::repo::Repository;
use crate::search::rank_ingredients;
use crate::shopping::{Amount, consolidate};
use crate::store::RowStore;

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn clean_tags(tags: &[String]) -> Vec<String> {
    tags.iter()
        .map(|t| t.trim().replace(',', " "))
        .filter(|t| !t.is_empty())
        .collect()
}

/// Every operation of the meal log. The row store is injected; the service
/// owns no other state.
pub struct MealbookService {
    repo: Repository,
}

impl MealbookService {
    pub fn new(store: Box<dyn RowStore>) -> Self {
        Self {
            repo: Repository::new(store),
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let store = SqliteRowStore::open(path)?;
        Ok(Self::new(Box::new(store)))
    }

    pub fn new_in_memory() -> Result<Self> {
        let store = SqliteRowStore::open_in_memory()?;
        Ok(Self::new(Box::new(store)))
    }

    #[must_use]
    pub fn store(&self) -> &dyn RowStore {
        self.repo.store()
    }

    // --- Ingredients ---

    pub fn create_ingredient(&self, new: &NewIngredient) -> Result<Ingredient> {
        let display_name = validate_name("displayName", &new.display_name)?;
        let name = canonical_name(&display_name);

        let catalog: Vec<Ingredient> = self.repo.all()?;
        if catalog.iter().any(|i| i.name == name) {
            return Err(MealbookError::validation(format!(
                "Ingredient '{display_name}' already exists"
            )));
        }

        let ingredient = Ingredient {
            id: new_id(),
            name,
            display_name,
            store_section: new.store_section.unwrap_or(StoreSection::Other),
            default_unit: new.default_unit.trim().to_string(),
            is_common_item: new.is_common_item,
            created_at: Utc::now(),
        };
        self.repo.insert(&ingredient)?;
        Ok(ingredient)
    }

    pub fn get_ingredient(&self, id: &str) -> Result<Ingredient> {
        self.repo
            .get(id)?
            .ok_or_else(|| MealbookError::not_found(format!("Ingredient {id} not found")))
    }

    pub fn list_ingredients(&self) -> Result<Vec<Ingredient>> {
        let mut ingredients: Vec<Ingredient> = self.repo.all()?;
        ingredients.sort_by_key(|i| i.display_name.to_lowercase());
        Ok(ingredients)
    }

    /// Edits apply to future shopping lists only; generated items keep the
    /// section they were created with.
    pub fn update_ingredient(&self, id: &str, update: &UpdateIngredient) -> Result<Ingredient> {
        let mut ingredient = self.get_ingredient(id)?;

        if let Some(display_name) = &update.display_name {
            let display_name = validate_name("displayName", display_name)?;
            let name = canonical_name(&display_name);
            let catalog: Vec<Ingredient> = self.repo.all()?;
            if catalog.iter().any(|i| i.name == name && i.id != id) {
                return Err(MealbookError::validation(format!(
                    "Ingredient '{display_name}' already exists"
                )));
            }
            ingredient.name = name;
            ingredient.display_name = display_name;
        }
        if let Some(section) = update.store_section {
            ingredient.store_section = section;
        }
        if let Some(unit) = &update.default_unit {
            ingredient.default_unit = unit.trim().to_string();
        }
        if let Some(common) = update.is_common_item {
            ingredient.is_common_item = common;
        }

        self.repo.replace(&ingredient)?;
        Ok(ingredient)
    }

    pub fn search_ingredients(&self, query: &str, limit: usize) -> Result<Vec<IngredientMatch>> {
        let ingredients: Vec<Ingredient> = self.repo.all()?;
        let counts = self.use_counts()?;
        Ok(rank_ingredients(query, ingredients, &counts, limit))
    }

    /// Number of meal lines referencing each ingredient.
    fn use_counts(&self) -> Result<HashMap<String, usize>> {
        let lines: Vec<IngredientLine> = self.repo.all()?;
        let mut counts = HashMap::new();
        for line in lines {
            *counts.entry(line.ingredient_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    // --- Meals ---

    pub fn create_meal(&self, new: &NewMeal, created_by: &str) -> Result<MealDetail> {
        let name = validate_name("name", &new.name)?;
        if let Some(rating) = new.rating {
            validate_rating(rating)?;
        }
        validate_lines(&new.ingredients)?;
        self.check_line_ingredients(&new.ingredients)?;

        let now = Utc::now();
        let meal = Meal {
            id: new_id(),
            name,
            kind: new.kind,
            location: non_blank(new.location.clone()),
            rating: new.rating,
            effort: new.effort,
            notes: non_blank(new.notes.clone()),
            leftover_notes: non_blank(new.leftover_notes.clone()),
            tags: clean_tags(&new.tags),
            created_at: now,
            updated_at: now,
            created_by: created_by.to_string(),
        };
        self.repo.insert(&meal)?;
        self.write_lines(&meal.id, &new.ingredients)?;

        info!(meal_id = %meal.id, lines = new.ingredients.len(), "created meal");
        self.get_meal(&meal.id)
    }

    pub fn get_meal(&self, id: &str) -> Result<MealDetail> {
        let meal: Meal = self
            .repo
            .get(id)?
            .ok_or_else(|| MealbookError::not_found(format!("Meal {id} not found")))?;

        let catalog = self.catalog_by_id()?;
        let lines: Vec<IngredientLine> = self.repo.all()?;
        let ingredients = lines
            .into_iter()
            .filter(|l| l.meal_id == meal.id)
            .map(|line| {
                let (ingredient_name, store_section) = match catalog.get(&line.ingredient_id) {
                    Some(i) => (i.display_name.clone(), i.store_section),
                    None => (line.ingredient_id.clone(), StoreSection::Pantry),
                };
                MealLine {
                    line,
                    ingredient_name,
                    store_section,
                }
            })
            .collect();

        Ok(MealDetail { meal, ingredients })
    }

    /// Newest first.
    pub fn list_meals(&self, kind: Option<MealKind>) -> Result<Vec<Meal>> {
        let mut meals: Vec<Meal> = self.repo.all()?;
        if let Some(kind) = kind {
            meals.retain(|m| m.kind == kind);
        }
        meals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(meals)
    }

    pub fn update_meal(&self, id: &str, update: &UpdateMeal) -> Result<MealDetail> {
        if update.is_empty() {
            return Err(MealbookError::validation(
                "At least one field must be provided",
            ));
        }
        if let Some(rating) = update.rating {
            validate_rating(rating)?;
        }
        if let Some(lines) = &update.ingredients {
            validate_lines(lines)?;
        }
        let name = update
            .name
            .as_deref()
            .map(|n| validate_name("name", n))
            .transpose()?;

        let mut meal: Meal = self
            .repo
            .get(id)?
            .ok_or_else(|| MealbookError::not_found(format!("Meal {id} not found")))?;
        if let Some(lines) = &update.ingredients {
            self.check_line_ingredients(lines)?;
        }

        if let Some(name) = name {
            meal.name = name;
        }
        if let Some(kind) = update.kind {
            meal.kind = kind;
        }
        if update.location.is_some() {
            meal.location = non_blank(update.location.clone());
        }
        if update.rating.is_some() {
            meal.rating = update.rating;
        }
        if update.effort.is_some() {
            meal.effort = update.effort;
        }
        if update.notes.is_some() {
            meal.notes = non_blank(update.notes.clone());
        }
        if update.leftover_notes.is_some() {
            meal.leftover_notes = non_blank(update.leftover_notes.clone());
        }
        if let Some(tags) = &update.tags {
            meal.tags = clean_tags(tags);
        }
        meal.updated_at = Utc::now();
        self.repo.replace(&meal)?;

        if let Some(lines) = &update.ingredients {
            self.repo
                .remove_where::<IngredientLine>(|l| l.meal_id == meal.id)?;
            self.write_lines(&meal.id, lines)?;
        }

        self.get_meal(&meal.id)
    }

    pub fn rate_meal(&self, id: &str, rating: u8) -> Result<Meal> {
        let update = UpdateMeal {
            rating: Some(rating),
            ..UpdateMeal::default()
        };
        self.update_meal(id, &update).map(|detail| detail.meal)
    }

    /// Removes the meal, its lines and its calendar entries. Shopping lists
    /// already generated from it are left alone.
    pub fn delete_meal(&self, id: &str) -> Result<()> {
        if !self.repo.remove::<Meal>(id)? {
            return Err(MealbookError::not_found(format!("Meal {id} not found")));
        }
        let lines = self
            .repo
            .remove_where::<IngredientLine>(|l| l.meal_id == id)?;
        let entries = self
            .repo
            .remove_where::<CalendarEntry>(|e| e.meal_id == id)?;
        info!(meal_id = %id, lines, calendar_entries = entries, "deleted meal");
        Ok(())
    }

    /// Every `ingredient_id` given on a line must already be in the catalog.
    /// Runs before a meal is written so a bad reference changes nothing.
    fn check_line_ingredients(&self, lines: &[NewIngredientLine]) -> Result<()> {
        if lines.iter().all(|l| non_blank(l.ingredient_id.clone()).is_none()) {
            return Ok(());
        }
        let catalog = self.catalog_by_id()?;
        for id in lines.iter().filter_map(|l| non_blank(l.ingredient_id.clone())) {
            if !catalog.contains_key(&id) {
                return Err(MealbookError::validation(format!(
                    "Ingredient {id} not found"
                )));
            }
        }
        Ok(())
    }

    /// Append `lines` to `meal_id`, creating catalog entries for names that
    /// do not match an existing ingredient.
    fn write_lines(&self, meal_id: &str, lines: &[NewIngredientLine]) -> Result<()> {
        let mut catalog: Vec<Ingredient> = self.repo.all()?;

        for new_line in lines {
            let ingredient_id = self.resolve_line_ingredient(new_line, &mut catalog)?;
            let line = IngredientLine {
                id: new_id(),
                meal_id: meal_id.to_string(),
                ingredient_id,
                quantity: new_line.quantity,
                unit: new_line.unit.trim().to_string(),
                note: non_blank(new_line.note.clone()),
            };
            self.repo.insert(&line)?;
        }
        Ok(())
    }

    fn resolve_line_ingredient(
        &self,
        line: &NewIngredientLine,
        catalog: &mut Vec<Ingredient>,
    ) -> Result<String> {
        if let Some(id) = non_blank(line.ingredient_id.clone()) {
            return if catalog.iter().any(|i| i.id == id) {
                Ok(id)
            } else {
                Err(MealbookError::validation(format!(
                    "Ingredient {id} not found"
                )))
            };
        }

        let display_name = line.name.as_deref().unwrap_or_default().trim().to_string();
        let name = canonical_name(&display_name);
        if let Some(existing) = catalog.iter().find(|i| i.name == name) {
            return Ok(existing.id.clone());
        }

        let ingredient = Ingredient {
            id: new_id(),
            name,
            display_name,
            store_section: line.store_section.unwrap_or(StoreSection::Other),
            default_unit: line.unit.trim().to_string(),
            is_common_item: false,
            created_at: Utc::now(),
        };
        self.repo.insert(&ingredient)?;
        let id = ingredient.id.clone();
        catalog.push(ingredient);
        Ok(id)
    }

    fn catalog_by_id(&self) -> Result<HashMap<String, Ingredient>> {
        let ingredients: Vec<Ingredient> = self.repo.all()?;
        Ok(ingredients
            .into_iter()
            .map(|i| (i.id.clone(), i))
            .collect())
    }

    fn require_meal(&self, id: &str) -> Result<Meal> {
        self.repo
            .get(id)?
            .ok_or_else(|| MealbookError::not_found(format!("Meal {id} not found")))
    }

    // --- Calendar ---

    pub fn schedule_meal(&self, new: &NewCalendarEntry, created_by: &str) -> Result<CalendarDay> {
        let meal = self.require_meal(&new.meal_id)?;
        let entry = CalendarEntry {
            id: new_id(),
            date: new.date,
            slot: new.slot,
            meal_id: meal.id,
            created_by: created_by.to_string(),
            created_at: Utc::now(),
        };
        self.repo.insert(&entry)?;
        Ok(CalendarDay {
            entry,
            meal_name: meal.name,
        })
    }

    /// Entries between `start` and `end` inclusive, by date then slot.
    pub fn calendar_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<CalendarDay>> {
        if start > end {
            return Err(MealbookError::validation(format!(
                "Start date {start} is after end date {end}"
            )));
        }
        let meals: HashMap<String, String> = self
            .repo
            .all::<Meal>()?
            .into_iter()
            .map(|m| (m.id, m.name))
            .collect();

        let mut entries: Vec<CalendarEntry> = self.repo.all()?;
        entries.retain(|e| e.date >= start && e.date <= end);
        entries.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then(a.slot.cmp(&b.slot))
                .then(a.created_at.cmp(&b.created_at))
        });

        Ok(entries
            .into_iter()
            .map(|entry| {
                let meal_name = meals
                    .get(&entry.meal_id)
                    .cloned()
                    .unwrap_or_else(|| entry.meal_id.clone());
                CalendarDay { entry, meal_name }
            })
            .collect())
    }

    pub fn remove_calendar_entry(&self, id: &str) -> Result<()> {
        if self.repo.remove::<CalendarEntry>(id)? {
            Ok(())
        } else {
            Err(MealbookError::not_found(format!(
                "Calendar entry {id} not found"
            )))
        }
    }

    // --- Shopping lists ---

    pub fn generate_shopping_list(
        &self,
        request: &GenerateListRequest,
        created_by: &str,
    ) -> Result<ShoppingList> {
        self.generate_shopping_list_at(request, created_by, Utc::now())
    }

    /// Build, persist and return a consolidated list for up to four meals.
    ///
    /// The whole item set is materialized before the first write. Writes are
    /// not atomic across rows: a store failure part-way through can leave a
    /// list with only some of its items.
    pub fn generate_shopping_list_at(
        &self,
        request: &GenerateListRequest,
        created_by: &str,
        now: DateTime<Utc>,
    ) -> Result<ShoppingList> {
        validate_meal_ids(&request.meal_ids)?;

        for meal_id in &request.meal_ids {
            self.require_meal(meal_id)?;
        }

        let lines: Vec<IngredientLine> = self.repo.all()?;
        let catalog = self.catalog_by_id()?;

        let mut amounts = Vec::new();
        for meal_id in &request.meal_ids {
            for line in lines.iter().filter(|l| &l.meal_id == meal_id) {
                let ingredient = catalog.get(&line.ingredient_id);
                if ingredient.is_none() {
                    warn!(
                        meal_id = %meal_id,
                        ingredient_id = %line.ingredient_id,
                        "ingredient missing from catalog, using fallback"
                    );
                }
                amounts.push(Amount::resolve(line, ingredient));
            }
        }
        if request.exclude_common_items {
            amounts.retain(|a| !a.is_common_item);
        }
        if amounts.is_empty() {
            return Err(MealbookError::validation(
                "Selected meals have no ingredients",
            ));
        }

        let list_id = new_id();
        let items: Vec<ShoppingListItem> = consolidate(&amounts, request.exclude_common_items)
            .into_iter()
            .map(|item| ShoppingListItem {
                id: new_id(),
                list_id: list_id.clone(),
                ingredient_id: item.ingredient_id,
                combined_quantity: item.combined_quantity,
                store_section: item.store_section,
                is_checked: false,
                display_order: item.display_order,
                ingredient_name: item.ingredient_name,
            })
            .collect();

        let list = ShoppingList {
            id: list_id,
            name: non_blank(request.name.clone()),
            meal_ids: request.meal_ids.clone(),
            created_at: now,
            expires_at: now + Duration::days(LIST_LIFETIME_DAYS),
            created_by: created_by.to_string(),
            items,
        };

        self.repo.insert(&list)?;
        for item in &list.items {
            self.repo.insert(item)?;
        }

        info!(
            list_id = %list.id,
            meals = list.meal_ids.len(),
            items = list.items.len(),
            "generated shopping list"
        );
        Ok(list)
    }

    pub fn list_shopping_lists(&self) -> Result<Vec<ShoppingList>> {
        self.list_shopping_lists_at(Utc::now())
    }

    /// Lists not yet expired at `now`, newest first, items attached.
    pub fn list_shopping_lists_at(&self, now: DateTime<Utc>) -> Result<Vec<ShoppingList>> {
        let mut lists: Vec<ShoppingList> = self.repo.all()?;
        lists.retain(|l| !l.is_expired(now));
        lists.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut items_by_list: HashMap<String, Vec<ShoppingListItem>> = HashMap::new();
        for item in self.repo.all::<ShoppingListItem>()? {
            items_by_list
                .entry(item.list_id.clone())
                .or_default()
                .push(item);
        }

        for list in &mut lists {
            let mut items = items_by_list.remove(&list.id).unwrap_or_default();
            items.sort_by_key(|i| i.display_order);
            list.items = items;
        }
        Ok(lists)
    }

    /// Fetch one list by id, expired or not.
    pub fn get_shopping_list(&self, id: &str) -> Result<ShoppingList> {
        let mut list: ShoppingList = self
            .repo
            .get(id)?
            .ok_or_else(|| MealbookError::not_found(format!("Shopping list {id} not found")))?;
        let mut items: Vec<ShoppingListItem> = self.repo.all()?;
        items.retain(|i| i.list_id == list.id);
        items.sort_by_key(|i| i.display_order);
        list.items = items;
        Ok(list)
    }

    /// Set an item's checked flag. Last write wins.
    pub fn set_item_checked(
        &self,
        list_id: &str,
        item_id: &str,
        is_checked: bool,
    ) -> Result<ShoppingListItem> {
        if self.repo.get::<ShoppingList>(list_id)?.is_none() {
            return Err(MealbookError::not_found(format!(
                "Shopping list {list_id} not found"
            )));
        }
        let mut item: ShoppingListItem = self
            .repo
            .get(item_id)?
            .filter(|i: &ShoppingListItem| i.list_id == list_id)
            .ok_or_else(|| {
                MealbookError::not_found(format!(
                    "Item {item_id} not found in shopping list {list_id}"
                ))
            })?;

        item.is_checked = is_checked;
        self.repo.replace(&item)?;
        Ok(item)
    }

    pub fn delete_shopping_list(&self, id: &str) -> Result<()> {
        if !self.repo.remove::<ShoppingList>(id)? {
            return Err(MealbookError::not_found(format!(
                "Shopping list {id} not found"
            )));
        }
        self.repo
            .remove_where::<ShoppingListItem>(|i| i.list_id == id)?;
        Ok(())
    }

    pub fn purge_expired_lists(&self) -> Result<usize> {
        self.purge_expired_lists_at(Utc::now())
    }

    /// Hard-delete lists expired at `now` together with their items.
    pub fn purge_expired_lists_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let expired: HashSet<String> = self
            .repo
            .all::<ShoppingList>()?
            .into_iter()
            .filter(|l| l.is_expired(now))
            .map(|l| l.id)
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }
        self.repo
            .remove_where::<ShoppingListItem>(|i| expired.contains(&i.list_id))?;
        let removed = self
            .repo
            .remove_where::<ShoppingList>(|l| expired.contains(&l.id))?;
        info!(removed, "purged expired shopping lists");
        Ok(removed)
    }
}

fn validate_lines(lines: &[NewIngredientLine]) -> Result<()> {
    for line in lines {
        let has_id = line
            .ingredient_id
            .as_deref()
            .is_some_and(|id| !id.trim().is_empty());
        let has_name = line
            .name
            .as_deref()
            .is_some_and(|name| !name.trim().is_empty());
        if !has_id && !has_name {
            return Err(MealbookError::validation(
                "Each ingredient needs an ingredientId or a name",
            ));
        }
        validate_quantity(line.quantity)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const USER: &str = "cook@example.com";

    /// Counts every call that reaches the store.
    struct CountingStore {
        inner: SqliteRowStore,
        calls: Arc<AtomicUsize>,
    }

    impl RowStore for CountingStore {
        fn read_all_rows(&self, table: &str) -> anyhow::Result<Vec<Vec<String>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.read_all_rows(table)
        }
        fn append_row(&self, table: &str, values: &[String]) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.append_row(table, values)
        }
        fn update_row(&self, table: &str, row_index: usize, values: &[String]) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.update_row(table, row_index, values)
        }
        fn delete_row(&self, table: &str, row_index: usize) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.delete_row(table, row_index)
        }
    }

    fn service() -> MealbookService {
        MealbookService::new_in_memory().unwrap()
    }

    fn line(name: &str, qty: Option<f64>, unit: &str) -> NewIngredientLine {
        NewIngredientLine {
            name: Some(name.to_string()),
            quantity: qty,
            unit: unit.to_string(),
            ..NewIngredientLine::default()
        }
    }

    fn meal(name: &str, ingredients: Vec<NewIngredientLine>) -> NewMeal {
        NewMeal {
            name: name.to_string(),
            kind: MealKind::Homemade,
            location: None,
            rating: None,
            effort: None,
            notes: None,
            leftover_notes: None,
            tags: Vec::new(),
            ingredients,
        }
    }

    fn request(meal_ids: &[&str], exclude_common_items: bool) -> GenerateListRequest {
        GenerateListRequest {
            meal_ids: meal_ids.iter().map(|s| (*s).to_string()).collect(),
            exclude_common_items,
            name: None,
        }
    }

    fn ingredient(svc: &MealbookService, name: &str, section: StoreSection, common: bool) -> Ingredient {
        svc.create_ingredient(&NewIngredient {
            display_name: name.to_string(),
            store_section: Some(section),
            default_unit: String::new(),
            is_common_item: common,
        })
        .unwrap()
    }

    /// Meals A (flour 2 cup, salt 1 tsp) and B (flour 1 cup, eggs 2).
    fn flour_salt_eggs(svc: &MealbookService) -> (String, String) {
        ingredient(svc, "Flour", StoreSection::Pantry, false);
        ingredient(svc, "Salt", StoreSection::Pantry, true);
        ingredient(svc, "Eggs", StoreSection::Dairy, false);
        let a = svc
            .create_meal(
                &meal(
                    "Pancakes",
                    vec![line("flour", Some(2.0), "cup"), line("salt", Some(1.0), "tsp")],
                ),
                USER,
            )
            .unwrap();
        let b = svc
            .create_meal(
                &meal(
                    "Crepes",
                    vec![line("Flour", Some(1.0), "cup"), line("eggs", Some(2.0), "")],
                ),
                USER,
            )
            .unwrap();
        (a.meal.id, b.meal.id)
    }

    // --- Ingredients ---

    #[test]
    fn test_create_ingredient_canonicalizes() {
        let svc = service();
        let i = ingredient(&svc, "  Olive   Oil ", StoreSection::Pantry, false);
        assert_eq!(i.name, "olive oil");
        assert_eq!(i.display_name, "Olive   Oil");
        assert_eq!(svc.get_ingredient(&i.id).unwrap(), i);
    }

    #[test]
    fn test_create_ingredient_rejects_duplicate_name() {
        let svc = service();
        ingredient(&svc, "Salt", StoreSection::Pantry, true);
        let err = svc
            .create_ingredient(&NewIngredient {
                display_name: "SALT".to_string(),
                store_section: None,
                default_unit: String::new(),
                is_common_item: false,
            })
            .unwrap_err();
        assert!(matches!(err, MealbookError::Validation(_)));
    }

    #[test]
    fn test_get_ingredient_not_found() {
        let svc = service();
        assert!(matches!(
            svc.get_ingredient("missing"),
            Err(MealbookError::NotFound(_))
        ));
    }

    #[test]
    fn test_update_ingredient() {
        let svc = service();
        let i = ingredient(&svc, "Tofu", StoreSection::Other, false);
        let updated = svc
            .update_ingredient(
                &i.id,
                &UpdateIngredient {
                    store_section: Some(StoreSection::Produce),
                    is_common_item: Some(true),
                    ..UpdateIngredient::default()
                },
            )
            .unwrap();
        assert_eq!(updated.store_section, StoreSection::Produce);
        assert!(updated.is_common_item);
        assert_eq!(svc.get_ingredient(&i.id).unwrap(), updated);
    }

    #[test]
    fn test_list_ingredients_sorted() {
        let svc = service();
        ingredient(&svc, "zucchini", StoreSection::Produce, false);
        ingredient(&svc, "Apple", StoreSection::Produce, false);
        let names: Vec<String> = svc
            .list_ingredients()
            .unwrap()
            .into_iter()
            .map(|i| i.display_name)
            .collect();
        assert_eq!(names, vec!["Apple", "zucchini"]);
    }

    #[test]
    fn test_search_ranks_by_use_count() {
        let svc = service();
        flour_salt_eggs(&svc);
        let results = svc.search_ingredients("", 10).unwrap();
        assert_eq!(results[0].ingredient.display_name, "Flour");
        assert_eq!(results[0].use_count, 2);

        let results = svc.search_ingredients("eg", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].ingredient.display_name, "Eggs");
    }

    // --- Meals ---

    #[test]
    fn test_create_meal_reuses_and_creates_ingredients() {
        let svc = service();
        let flour = ingredient(&svc, "Flour", StoreSection::Pantry, false);

        let detail = svc
            .create_meal(
                &meal(
                    "Bread",
                    vec![line("FLOUR", Some(500.0), "g"), line("Yeast", Some(7.0), "g")],
                ),
                USER,
            )
            .unwrap();

        assert_eq!(detail.ingredients.len(), 2);
        assert_eq!(detail.ingredients[0].line.ingredient_id, flour.id);
        assert_eq!(detail.ingredients[1].ingredient_name, "Yeast");
        assert_eq!(detail.ingredients[1].store_section, StoreSection::Other);
        assert_eq!(detail.meal.created_by, USER);
        assert_eq!(svc.list_ingredients().unwrap().len(), 2);
    }

    #[test]
    fn test_create_meal_same_new_name_twice_creates_once() {
        let svc = service();
        svc.create_meal(
            &meal(
                "Salad",
                vec![line("Lettuce", Some(1.0), ""), line("lettuce", Some(1.0), "")],
            ),
            USER,
        )
        .unwrap();
        assert_eq!(svc.list_ingredients().unwrap().len(), 1);
    }

    #[test]
    fn test_create_meal_validation() {
        let svc = service();
        assert!(matches!(
            svc.create_meal(&meal("  ", vec![]), USER),
            Err(MealbookError::Validation(_))
        ));

        let mut rated = meal("Soup", vec![]);
        rated.rating = Some(9);
        assert!(matches!(
            svc.create_meal(&rated, USER),
            Err(MealbookError::Validation(_))
        ));

        let nameless = NewIngredientLine {
            quantity: Some(1.0),
            ..NewIngredientLine::default()
        };
        assert!(matches!(
            svc.create_meal(&meal("Soup", vec![nameless]), USER),
            Err(MealbookError::Validation(_))
        ));

        assert!(matches!(
            svc.create_meal(&meal("Soup", vec![line("water", Some(-1.0), "l")]), USER),
            Err(MealbookError::Validation(_))
        ));
        assert!(svc.list_meals(None).unwrap().is_empty());
    }

    #[test]
    fn test_create_meal_unknown_ingredient_id() {
        let svc = service();
        let bad = NewIngredientLine {
            ingredient_id: Some("nope".to_string()),
            quantity: Some(1.0),
            ..NewIngredientLine::default()
        };
        let lines = vec![line("Carrot", Some(2.0), ""), bad];
        assert!(matches!(
            svc.create_meal(&meal("Soup", lines), USER),
            Err(MealbookError::Validation(_))
        ));

        // Nothing was written, including the earlier carrot line
        assert!(svc.list_meals(None).unwrap().is_empty());
        assert!(svc.list_ingredients().unwrap().is_empty());
    }

    #[test]
    fn test_update_meal_unknown_ingredient_id_keeps_lines() {
        let svc = service();
        let stew = svc
            .create_meal(
                &meal(
                    "Stew",
                    vec![line("Beef", Some(500.0), "g"), line("Onion", Some(1.0), "")],
                ),
                USER,
            )
            .unwrap();
        let id = stew.meal.id;

        let update = UpdateMeal {
            name: Some("Beef Stew".to_string()),
            ingredients: Some(vec![NewIngredientLine {
                ingredient_id: Some("nope".to_string()),
                ..NewIngredientLine::default()
            }]),
            ..UpdateMeal::default()
        };
        assert!(matches!(
            svc.update_meal(&id, &update),
            Err(MealbookError::Validation(_))
        ));

        let after = svc.get_meal(&id).unwrap();
        assert_eq!(after.meal.name, "Stew");
        assert_eq!(after.ingredients.len(), 2);
    }

    #[test]
    fn test_list_meals_filters_by_kind() {
        let svc = service();
        svc.create_meal(&meal("Home", vec![]), USER).unwrap();
        let mut out = meal("Out", vec![]);
        out.kind = MealKind::Restaurant;
        out.location = Some("Noodle Bar".to_string());
        svc.create_meal(&out, USER).unwrap();

        assert_eq!(svc.list_meals(None).unwrap().len(), 2);
        let restaurants = svc.list_meals(Some(MealKind::Restaurant)).unwrap();
        assert_eq!(restaurants.len(), 1);
        assert_eq!(restaurants[0].location.as_deref(), Some("Noodle Bar"));
    }

    #[test]
    fn test_update_meal_replaces_lines() {
        let svc = service();
        let detail = svc
            .create_meal(&meal("Stew", vec![line("beef", Some(1.0), "lb")]), USER)
            .unwrap();

        let updated = svc
            .update_meal(
                &detail.meal.id,
                &UpdateMeal {
                    name: Some("Veggie Stew".to_string()),
                    ingredients: Some(vec![
                        line("carrot", Some(3.0), ""),
                        line("potato", Some(2.0), ""),
                    ]),
                    ..UpdateMeal::default()
                },
            )
            .unwrap();

        assert_eq!(updated.meal.name, "Veggie Stew");
        let names: Vec<&str> = updated
            .ingredients
            .iter()
            .map(|l| l.ingredient_name.as_str())
            .collect();
        assert_eq!(names, vec!["carrot", "potato"]);
    }

    #[test]
    fn test_update_meal_requires_a_field() {
        let svc = service();
        let detail = svc.create_meal(&meal("Stew", vec![]), USER).unwrap();
        assert!(matches!(
            svc.update_meal(&detail.meal.id, &UpdateMeal::default()),
            Err(MealbookError::Validation(_))
        ));
    }

    #[test]
    fn test_rate_meal() {
        let svc = service();
        let detail = svc.create_meal(&meal("Tacos", vec![]), USER).unwrap();
        let rated = svc.rate_meal(&detail.meal.id, 5).unwrap();
        assert_eq!(rated.rating, Some(5));
        assert!(svc.rate_meal(&detail.meal.id, 0).is_err());
        assert!(matches!(
            svc.rate_meal("missing", 3),
            Err(MealbookError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_meal_cascades() {
        let svc = service();
        let detail = svc
            .create_meal(&meal("Chili", vec![line("beans", Some(2.0), "can")]), USER)
            .unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        svc.schedule_meal(
            &NewCalendarEntry {
                date,
                slot: crate::models::MealSlot::Dinner,
                meal_id: detail.meal.id.clone(),
            },
            USER,
        )
        .unwrap();

        svc.delete_meal(&detail.meal.id).unwrap();

        assert!(matches!(
            svc.get_meal(&detail.meal.id),
            Err(MealbookError::NotFound(_))
        ));
        assert!(svc.calendar_range(date, date).unwrap().is_empty());
        assert!(svc.repo.all::<IngredientLine>().unwrap().is_empty());
        // Catalog entries outlive the meal
        assert_eq!(svc.list_ingredients().unwrap().len(), 1);
        assert!(matches!(
            svc.delete_meal(&detail.meal.id),
            Err(MealbookError::NotFound(_))
        ));
    }

    // --- Calendar ---

    #[test]
    fn test_calendar_range_orders_by_date_and_slot() {
        use crate::models::MealSlot;

        let svc = service();
        let soup = svc.create_meal(&meal("Soup", vec![]), USER).unwrap().meal;
        let oats = svc.create_meal(&meal("Oats", vec![]), USER).unwrap().meal;
        let d1 = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let d3 = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();

        for (date, slot, meal_id) in [
            (d2, MealSlot::Dinner, &soup.id),
            (d2, MealSlot::Breakfast, &oats.id),
            (d1, MealSlot::Lunch, &soup.id),
            (d3, MealSlot::Lunch, &soup.id),
        ] {
            svc.schedule_meal(
                &NewCalendarEntry {
                    date,
                    slot,
                    meal_id: meal_id.clone(),
                },
                USER,
            )
            .unwrap();
        }

        let days = svc.calendar_range(d1, d2).unwrap();
        let summary: Vec<(NaiveDate, MealSlot, &str)> = days
            .iter()
            .map(|d| (d.entry.date, d.entry.slot, d.meal_name.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (d1, MealSlot::Lunch, "Soup"),
                (d2, MealSlot::Breakfast, "Oats"),
                (d2, MealSlot::Dinner, "Soup"),
            ]
        );

        assert!(svc.calendar_range(d2, d1).is_err());
    }

    #[test]
    fn test_schedule_unknown_meal() {
        let svc = service();
        let err = svc
            .schedule_meal(
                &NewCalendarEntry {
                    date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
                    slot: crate::models::MealSlot::Lunch,
                    meal_id: "ghost".to_string(),
                },
                USER,
            )
            .unwrap_err();
        assert!(matches!(err, MealbookError::NotFound(_)));
    }

    #[test]
    fn test_remove_calendar_entry() {
        let svc = service();
        let soup = svc.create_meal(&meal("Soup", vec![]), USER).unwrap().meal;
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let day = svc
            .schedule_meal(
                &NewCalendarEntry {
                    date,
                    slot: crate::models::MealSlot::Lunch,
                    meal_id: soup.id,
                },
                USER,
            )
            .unwrap();
        svc.remove_calendar_entry(&day.entry.id).unwrap();
        assert!(svc.calendar_range(date, date).unwrap().is_empty());
        assert!(svc.remove_calendar_entry(&day.entry.id).is_err());
    }

    // --- Shopping lists ---

    #[test]
    fn test_generate_worked_example() {
        let svc = service();
        let (a, b) = flour_salt_eggs(&svc);

        let list = svc
            .generate_shopping_list(&request(&[&a, &b], true), USER)
            .unwrap();

        assert_eq!(list.items.len(), 2);
        // Dairy comes before pantry in the walk
        assert_eq!(list.items[0].ingredient_name, "Eggs");
        assert_eq!(list.items[0].combined_quantity, "2");
        assert_eq!(list.items[0].store_section, StoreSection::Dairy);
        assert_eq!(list.items[1].ingredient_name, "Flour");
        assert_eq!(list.items[1].combined_quantity, "3 cup");
        assert!(list.items.iter().all(|i| !i.is_checked));
        assert!(list.items.iter().all(|i| i.list_id == list.id));
        assert_eq!(list.meal_ids, vec![a, b]);
        assert_eq!(list.created_by, USER);
    }

    #[test]
    fn test_generate_keeps_common_items_by_default() {
        let svc = service();
        let (a, b) = flour_salt_eggs(&svc);
        let list = svc
            .generate_shopping_list(&request(&[&a, &b], false), USER)
            .unwrap();
        let names: Vec<&str> = list
            .items
            .iter()
            .map(|i| i.ingredient_name.as_str())
            .collect();
        assert_eq!(names, vec!["Eggs", "Flour", "Salt"]);
        assert_eq!(list.items[2].combined_quantity, "1 tsp");
    }

    #[test]
    fn test_generate_expires_after_four_weeks() {
        let svc = service();
        let (a, _) = flour_salt_eggs(&svc);
        let now = Utc::now();
        let list = svc
            .generate_shopping_list_at(&request(&[&a], false), USER, now)
            .unwrap();
        assert_eq!(list.created_at, now);
        assert_eq!(list.expires_at, now + Duration::weeks(4));
    }

    #[test]
    fn test_generate_persists_list_and_items() {
        let svc = service();
        let (a, b) = flour_salt_eggs(&svc);
        let list = svc
            .generate_shopping_list(&request(&[&a, &b], false), USER)
            .unwrap();

        let stored = svc.get_shopping_list(&list.id).unwrap();
        assert_eq!(stored.items, list.items);
        assert_eq!(stored.meal_ids, list.meal_ids);
    }

    #[test]
    fn test_generate_rejects_too_many_meals_before_store_access() {
        let calls = Arc::new(AtomicUsize::new(0));
        let svc = MealbookService::new(Box::new(CountingStore {
            inner: SqliteRowStore::open_in_memory().unwrap(),
            calls: Arc::clone(&calls),
        }));

        let err = svc
            .generate_shopping_list(&request(&["a", "b", "c", "d", "e"], false), USER)
            .unwrap_err();
        assert!(matches!(err, MealbookError::Validation(_)));

        let err = svc
            .generate_shopping_list(&request(&[], false), USER)
            .unwrap_err();
        assert!(matches!(err, MealbookError::Validation(_)));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_generate_unknown_meal_is_not_found() {
        let svc = service();
        let err = svc
            .generate_shopping_list(&request(&["ghost"], false), USER)
            .unwrap_err();
        assert!(matches!(err, MealbookError::NotFound(_)));
    }

    #[test]
    fn test_generate_meal_without_ingredients() {
        let svc = service();
        let empty = svc.create_meal(&meal("Toast", vec![]), USER).unwrap().meal;
        let err = svc
            .generate_shopping_list(&request(&[&empty.id], false), USER)
            .unwrap_err();
        assert!(matches!(err, MealbookError::Validation(_)));
        assert!(svc.list_shopping_lists().unwrap().is_empty());
    }

    #[test]
    fn test_generate_only_common_items_excluded_is_validation_error() {
        let svc = service();
        ingredient(&svc, "Salt", StoreSection::Pantry, true);
        let seasoning = svc
            .create_meal(&meal("Seasoning", vec![line("salt", Some(1.0), "tsp")]), USER)
            .unwrap()
            .meal;
        let err = svc
            .generate_shopping_list(&request(&[&seasoning.id], true), USER)
            .unwrap_err();
        assert!(matches!(err, MealbookError::Validation(_)));
    }

    #[test]
    fn test_generate_falls_back_for_missing_ingredient() {
        let svc = service();
        let detail = svc
            .create_meal(&meal("Mystery", vec![line("thing", Some(1.0), "")]), USER)
            .unwrap();
        let ingredient_id = detail.ingredients[0].line.ingredient_id.clone();
        svc.repo.remove::<Ingredient>(&ingredient_id).unwrap();

        let list = svc
            .generate_shopping_list(&request(&[&detail.meal.id], false), USER)
            .unwrap();
        assert_eq!(list.items.len(), 1);
        assert_eq!(list.items[0].ingredient_name, ingredient_id);
        assert_eq!(list.items[0].store_section, StoreSection::Pantry);
    }

    #[test]
    fn test_generated_sections_are_a_snapshot() {
        let svc = service();
        let (a, b) = flour_salt_eggs(&svc);
        let list = svc
            .generate_shopping_list(&request(&[&a, &b], true), USER)
            .unwrap();

        let eggs = svc
            .list_ingredients()
            .unwrap()
            .into_iter()
            .find(|i| i.name == "eggs")
            .unwrap();
        svc.update_ingredient(
            &eggs.id,
            &UpdateIngredient {
                store_section: Some(StoreSection::Frozen),
                ..UpdateIngredient::default()
            },
        )
        .unwrap();

        let stored = svc.get_shopping_list(&list.id).unwrap();
        assert_eq!(stored.items[0].store_section, StoreSection::Dairy);
    }

    #[test]
    fn test_toggle_round_trip() {
        let svc = service();
        let (a, b) = flour_salt_eggs(&svc);
        let list = svc
            .generate_shopping_list(&request(&[&a, &b], false), USER)
            .unwrap();
        let item = &list.items[1];

        let checked = svc.set_item_checked(&list.id, &item.id, true).unwrap();
        assert!(checked.is_checked);
        let unchecked = svc.set_item_checked(&list.id, &item.id, false).unwrap();
        assert_eq!(&unchecked, item);

        // Other items untouched
        let stored = svc.get_shopping_list(&list.id).unwrap();
        assert!(stored.items.iter().all(|i| !i.is_checked));
    }

    #[test]
    fn test_toggle_is_idempotent() {
        let svc = service();
        let (a, _) = flour_salt_eggs(&svc);
        let list = svc
            .generate_shopping_list(&request(&[&a], false), USER)
            .unwrap();
        let item_id = &list.items[0].id;
        svc.set_item_checked(&list.id, item_id, true).unwrap();
        svc.set_item_checked(&list.id, item_id, true).unwrap();
        let stored = svc.get_shopping_list(&list.id).unwrap();
        assert!(stored.items[0].is_checked);
    }

    #[test]
    fn test_toggle_wrong_list_is_not_found() {
        let svc = service();
        let (a, b) = flour_salt_eggs(&svc);
        let first = svc
            .generate_shopping_list(&request(&[&a], false), USER)
            .unwrap();
        let second = svc
            .generate_shopping_list(&request(&[&b], false), USER)
            .unwrap();

        let err = svc
            .set_item_checked(&second.id, &first.items[0].id, true)
            .unwrap_err();
        assert!(matches!(err, MealbookError::NotFound(_)));
        assert!(matches!(
            svc.set_item_checked("ghost", &first.items[0].id, true),
            Err(MealbookError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_excludes_expired() {
        let svc = service();
        let (a, b) = flour_salt_eggs(&svc);
        let now = Utc::now();
        let old = svc
            .generate_shopping_list_at(&request(&[&a], false), USER, now - Duration::days(29))
            .unwrap();
        let fresh = svc
            .generate_shopping_list_at(&request(&[&a, &b], false), USER, now)
            .unwrap();

        let lists = svc.list_shopping_lists_at(now).unwrap();
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].id, fresh.id);
        assert_eq!(lists[0].items.len(), fresh.items.len());

        // Soft expiry: still retrievable directly
        assert_eq!(svc.get_shopping_list(&old.id).unwrap().id, old.id);
    }

    #[test]
    fn test_list_newest_first_with_ordered_items() {
        let svc = service();
        let (a, b) = flour_salt_eggs(&svc);
        let now = Utc::now();
        let older = svc
            .generate_shopping_list_at(&request(&[&a], false), USER, now - Duration::days(1))
            .unwrap();
        let newer = svc
            .generate_shopping_list_at(&request(&[&b], false), USER, now)
            .unwrap();

        let lists = svc.list_shopping_lists_at(now).unwrap();
        assert_eq!(lists[0].id, newer.id);
        assert_eq!(lists[1].id, older.id);
        for list in &lists {
            let orders: Vec<u32> = list.items.iter().map(|i| i.display_order).collect();
            let mut sorted = orders.clone();
            sorted.sort_unstable();
            assert_eq!(orders, sorted);
        }
    }

    #[test]
    fn test_delete_shopping_list_removes_items() {
        let svc = service();
        let (a, b) = flour_salt_eggs(&svc);
        let keep = svc
            .generate_shopping_list(&request(&[&a], false), USER)
            .unwrap();
        let doomed = svc
            .generate_shopping_list(&request(&[&a, &b], false), USER)
            .unwrap();

        svc.delete_shopping_list(&doomed.id).unwrap();

        assert!(matches!(
            svc.get_shopping_list(&doomed.id),
            Err(MealbookError::NotFound(_))
        ));
        let items: Vec<ShoppingListItem> = svc.repo.all().unwrap();
        assert!(items.iter().all(|i| i.list_id == keep.id));
        assert_eq!(items.len(), keep.items.len());
        assert!(svc.delete_shopping_list(&doomed.id).is_err());
    }

    #[test]
    fn test_purge_expired_lists() {
        let svc = service();
        let (a, _) = flour_salt_eggs(&svc);
        let now = Utc::now();
        svc.generate_shopping_list_at(&request(&[&a], false), USER, now - Duration::days(40))
            .unwrap();
        let live = svc
            .generate_shopping_list_at(&request(&[&a], false), USER, now)
            .unwrap();

        assert_eq!(svc.purge_expired_lists_at(now).unwrap(), 1);
        assert_eq!(svc.purge_expired_lists_at(now).unwrap(), 0);

        let lists: Vec<ShoppingList> = svc.repo.all().unwrap();
        assert_eq!(lists.len(), 1);
        let items: Vec<ShoppingListItem> = svc.repo.all().unwrap();
        assert!(items.iter().all(|i| i.list_id == live.id));
    }

    #[test]
    fn test_deleting_source_meal_keeps_list() {
        let svc = service();
        let (a, b) = flour_salt_eggs(&svc);
        let list = svc
            .generate_shopping_list(&request(&[&a, &b], false), USER)
            .unwrap();
        svc.delete_meal(&a).unwrap();
        assert_eq!(svc.get_shopping_list(&list.id).unwrap().items.len(), 3);
    }
}
