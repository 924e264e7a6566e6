use anyhow::{Result, bail};
use tabled::{Table, Tabled, settings::Style};

use mealbook_core::models::{
    Ingredient, IngredientMatch, NewIngredient, StoreSection, UpdateIngredient,
};
use mealbook_core::service::MealbookService;

use super::helpers::{found, truncate};

pub(crate) fn cmd_ingredient_add(
    svc: &MealbookService,
    name: &str,
    section: Option<&str>,
    unit: Option<String>,
    common: bool,
    json: bool,
) -> Result<()> {
    let store_section = section.map(str::parse::<StoreSection>).transpose()?;
    let ingredient = svc.create_ingredient(&NewIngredient {
        display_name: name.to_string(),
        store_section,
        default_unit: unit.unwrap_or_default(),
        is_common_item: common,
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ingredient)?);
    } else {
        let name = &ingredient.display_name;
        let section = ingredient.store_section;
        let id = &ingredient.id;
        println!("Added ingredient: {name} ({section}) [{id}]");
    }
    Ok(())
}

pub(crate) fn cmd_ingredient_list(svc: &MealbookService, json: bool) -> Result<()> {
    let ingredients = svc.list_ingredients()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ingredients)?);
        return Ok(());
    }
    if ingredients.is_empty() {
        println!("No ingredients yet. They are added with meals or via: mealbook ingredient add");
        return Ok(());
    }
    print_ingredient_table(&ingredients, None);
    Ok(())
}

pub(crate) fn cmd_ingredient_search(
    svc: &MealbookService,
    query: &str,
    limit: usize,
    json: bool,
) -> Result<()> {
    let matches = svc.search_ingredients(query, limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&matches)?);
        return Ok(());
    }
    if matches.is_empty() {
        println!("No ingredients match '{query}'");
        return Ok(());
    }
    let counts: Vec<usize> = matches.iter().map(|m| m.use_count).collect();
    let ingredients: Vec<Ingredient> = matches
        .into_iter()
        .map(|IngredientMatch { ingredient, .. }| ingredient)
        .collect();
    print_ingredient_table(&ingredients, Some(&counts));
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_ingredient_update(
    svc: &MealbookService,
    id: &str,
    name: Option<String>,
    section: Option<&str>,
    unit: Option<String>,
    common: Option<bool>,
    json: bool,
) -> Result<()> {
    if name.is_none() && section.is_none() && unit.is_none() && common.is_none() {
        bail!("Nothing to update. Provide at least one of --name, --section, --unit, or --common");
    }
    let store_section = section.map(str::parse::<StoreSection>).transpose()?;

    let ingredient = found(
        svc.update_ingredient(
            id,
            &UpdateIngredient {
                display_name: name,
                store_section,
                default_unit: unit,
                is_common_item: common,
            },
        ),
        json,
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ingredient)?);
    } else {
        let name = &ingredient.display_name;
        let section = ingredient.store_section;
        let common = if ingredient.is_common_item {
            ", common"
        } else {
            ""
        };
        println!("Updated ingredient: {name} ({section}{common})");
    }
    Ok(())
}

fn print_ingredient_table(ingredients: &[Ingredient], use_counts: Option<&[usize]>) {
    #[derive(Tabled)]
    struct IngredientRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Section")]
        section: String,
        #[tabled(rename = "Unit")]
        unit: String,
        #[tabled(rename = "Common")]
        common: String,
        #[tabled(rename = "Used")]
        used: String,
    }

    let rows: Vec<IngredientRow> = ingredients
        .iter()
        .enumerate()
        .map(|(i, ing)| IngredientRow {
            id: ing.id.clone(),
            name: truncate(&ing.display_name, 30),
            section: ing.store_section.to_string(),
            unit: ing.default_unit.clone(),
            common: if ing.is_common_item { "yes" } else { "" }.to_string(),
            used: use_counts
                .and_then(|c| c.get(i))
                .map_or_else(String::new, ToString::to_string),
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_update_ingredient() {
        let svc = MealbookService::new_in_memory().unwrap();
        cmd_ingredient_add(&svc, "Salt", Some("pantry"), None, true, true).unwrap();

        let salt = svc.list_ingredients().unwrap().remove(0);
        assert!(salt.is_common_item);
        assert_eq!(salt.store_section, StoreSection::Pantry);

        cmd_ingredient_update(&svc, &salt.id, None, Some("other"), None, Some(false), true)
            .unwrap();
        let salt = svc.get_ingredient(&salt.id).unwrap();
        assert!(!salt.is_common_item);
        assert_eq!(salt.store_section, StoreSection::Other);
    }

    #[test]
    fn test_add_rejects_unknown_section() {
        let svc = MealbookService::new_in_memory().unwrap();
        assert!(cmd_ingredient_add(&svc, "Ham", Some("deli"), None, false, true).is_err());
        assert!(svc.list_ingredients().unwrap().is_empty());
    }

    #[test]
    fn test_update_requires_a_field() {
        let svc = MealbookService::new_in_memory().unwrap();
        assert!(cmd_ingredient_update(&svc, "x", None, None, None, None, true).is_err());
    }

    #[test]
    fn test_search_runs() {
        let svc = MealbookService::new_in_memory().unwrap();
        cmd_ingredient_add(&svc, "Olive Oil", None, Some("tbsp".to_string()), false, true)
            .unwrap();
        cmd_ingredient_search(&svc, "oil", 10, false).unwrap();
        cmd_ingredient_list(&svc, false).unwrap();
    }
}
