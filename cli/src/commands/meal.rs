use anyhow::{Context, Result, bail};
use std::path::Path;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use mealbook_core::models::{
    Effort, MealDetail, MealKind, NewIngredientLine, NewMeal, non_blank,
};
use mealbook_core::service::MealbookService;

use super::helpers::{CLI_USER, format_amount, found, parse_ingredient_spec, truncate};

pub(crate) struct MealArgs {
    pub name: String,
    pub kind: String,
    pub location: Option<String>,
    pub rating: Option<u8>,
    pub effort: Option<String>,
    pub notes: Option<String>,
    pub leftovers: Option<String>,
    pub tags: Vec<String>,
    pub ingredients: Vec<String>,
}

pub(crate) fn cmd_meal_add(svc: &MealbookService, args: MealArgs, json: bool) -> Result<()> {
    let kind: MealKind = args.kind.parse()?;
    let effort = args
        .effort
        .as_deref()
        .map(str::parse::<Effort>)
        .transpose()?;
    let ingredients = args
        .ingredients
        .iter()
        .map(|s| parse_ingredient_spec(s))
        .collect::<Result<Vec<_>>>()?;

    let detail = svc.create_meal(
        &NewMeal {
            name: args.name,
            kind,
            location: args.location,
            rating: args.rating,
            effort,
            notes: args.notes,
            leftover_notes: args.leftovers,
            tags: args.tags,
            ingredients,
        },
        CLI_USER,
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
    } else {
        let name = &detail.meal.name;
        let id = &detail.meal.id;
        let count = detail.ingredients.len();
        println!("Added meal: {name} ({count} ingredients) [{id}]");
    }
    Ok(())
}

/// Create a homemade meal from a Cooklang recipe file.
pub(crate) fn cmd_meal_import(
    svc: &MealbookService,
    file: &Path,
    name_override: Option<String>,
    json: bool,
) -> Result<()> {
    let input = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;

    let (recipe_data, _report) = cooklang::parse(&input)
        .into_result()
        .map_err(|e| anyhow::anyhow!("Failed to parse Cooklang file: {e}"))?;

    let name = name_override
        .or_else(|| recipe_data.metadata.title().map(String::from))
        .or_else(|| file.file_stem().and_then(|s| s.to_str()).map(String::from))
        .context("Could not determine meal name. Use --name to specify one")?;

    let notes = recipe_data
        .metadata
        .servings()
        .and_then(|s| s.as_number())
        .map(|n| format!("Serves {n}"));

    let converter = cooklang::Converter::default();
    let grouped = recipe_data.group_ingredients(&converter);

    let ingredients: Vec<NewIngredientLine> =
        grouped.iter().flat_map(cooklang_ingredient_lines).collect();

    if ingredients.is_empty() {
        bail!("No ingredients found in recipe");
    }

    let detail = svc.create_meal(
        &NewMeal {
            name,
            kind: MealKind::Homemade,
            location: None,
            rating: None,
            effort: None,
            notes,
            leftover_notes: None,
            tags: Vec::new(),
            ingredients,
        },
        CLI_USER,
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
    } else {
        let name = &detail.meal.name;
        let count = detail.ingredients.len();
        let id = &detail.meal.id;
        println!("Imported meal: {name} ({count} ingredient lines) [{id}]");
    }
    Ok(())
}

/// One line per unit the recipe uses the ingredient in. Ranges and text
/// quantities that are not numbers become the line's note, unit included.
fn cooklang_ingredient_lines(
    gi: &cooklang::ingredient_list::GroupedIngredient<'_>,
) -> Vec<NewIngredientLine> {
    let name = gi.ingredient.display_name().to_string();
    let note = non_blank(gi.ingredient.note.clone());

    let mut lines: Vec<NewIngredientLine> = gi
        .quantity
        .iter()
        .map(|qty: &cooklang::Quantity| {
            let unit = qty.unit().unwrap_or_default();
            let text = match qty.value() {
                cooklang::Value::Number(n) => {
                    return line_with(&name, Some(n.value()), unit, note.clone());
                }
                cooklang::Value::Range { start, end } => {
                    format!("{}-{}", start.value(), end.value())
                }
                cooklang::Value::Text(t) => match t.trim().parse::<f64>() {
                    Ok(v) => return line_with(&name, Some(v), unit, note.clone()),
                    Err(_) => t.trim().to_string(),
                },
            };
            let text = format!("{text} {unit}").trim().to_string();
            let text = match &note {
                Some(n) => format!("{text}, {n}"),
                None => text,
            };
            line_with(&name, None, "", Some(text))
        })
        .collect();

    if lines.is_empty() {
        lines.push(NewIngredientLine {
            name: Some(name),
            note,
            ..NewIngredientLine::default()
        });
    }
    lines
}

fn line_with(name: &str, quantity: Option<f64>, unit: &str, note: Option<String>) -> NewIngredientLine {
    NewIngredientLine {
        name: Some(name.to_string()),
        quantity,
        unit: unit.to_string(),
        note,
        ..NewIngredientLine::default()
    }
}

pub(crate) fn cmd_meal_list(svc: &MealbookService, kind: Option<&str>, json: bool) -> Result<()> {
    let kind = kind.map(str::parse::<MealKind>).transpose()?;
    let meals = svc.list_meals(kind)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&meals)?);
        return Ok(());
    }

    if meals.is_empty() {
        println!("No meals logged yet. Add one with: mealbook meal add <name>");
        return Ok(());
    }

    #[derive(Tabled)]
    struct MealRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Kind")]
        kind: String,
        #[tabled(rename = "Where")]
        location: String,
        #[tabled(rename = "Rating")]
        rating: String,
        #[tabled(rename = "Date")]
        date: String,
    }

    let rows: Vec<MealRow> = meals
        .iter()
        .map(|m| MealRow {
            id: m.id.clone(),
            name: truncate(&m.name, 35),
            kind: m.kind.to_string(),
            location: m
                .location
                .as_deref()
                .map(|l| truncate(l, 20))
                .unwrap_or_default(),
            rating: m.rating.map_or("-".into(), |r| "*".repeat(usize::from(r))),
            date: m.created_at.format("%Y-%m-%d").to_string(),
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_meal_show(svc: &MealbookService, id: &str, json: bool) -> Result<()> {
    let detail = found(svc.get_meal(id), json)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
    } else {
        print_meal(&detail);
    }
    Ok(())
}

fn print_meal(detail: &MealDetail) {
    let meal = &detail.meal;
    println!("{} ({})", meal.name, meal.kind);
    if let Some(location) = &meal.location {
        println!("  Where:     {location}");
    }
    if let Some(rating) = meal.rating {
        println!("  Rating:    {rating}/5");
    }
    if let Some(effort) = meal.effort {
        println!("  Effort:    {}", effort.as_str());
    }
    if !meal.tags.is_empty() {
        println!("  Tags:      {}", meal.tags.join(", "));
    }
    if let Some(notes) = &meal.notes {
        println!("  Notes:     {notes}");
    }
    if let Some(leftovers) = &meal.leftover_notes {
        println!("  Leftovers: {leftovers}");
    }

    if detail.ingredients.is_empty() {
        return;
    }

    #[derive(Tabled)]
    struct LineRow {
        #[tabled(rename = "Ingredient")]
        name: String,
        #[tabled(rename = "Amount")]
        amount: String,
        #[tabled(rename = "Note")]
        note: String,
        #[tabled(rename = "Section")]
        section: String,
    }

    let rows: Vec<LineRow> = detail
        .ingredients
        .iter()
        .map(|l| LineRow {
            name: truncate(&l.ingredient_name, 30),
            amount: format_amount(l.line.quantity, &l.line.unit),
            note: l.line.note.clone().unwrap_or_default(),
            section: l.store_section.to_string(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(1)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn cmd_meal_rate(svc: &MealbookService, id: &str, rating: u8, json: bool) -> Result<()> {
    let meal = found(svc.rate_meal(id, rating), json)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&meal)?);
    } else {
        let name = &meal.name;
        println!("Rated {name}: {rating}/5");
    }
    Ok(())
}

pub(crate) fn cmd_meal_delete(svc: &MealbookService, id: &str, json: bool) -> Result<()> {
    found(svc.delete_meal(id), json)?;
    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted meal {id}");
    }
    Ok(())
}
