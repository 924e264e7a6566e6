use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use mealbook_core::models::{GenerateListRequest, ShoppingList};
use mealbook_core::service::MealbookService;

use super::helpers::{CLI_USER, found, truncate};

pub(crate) fn cmd_shop_generate(
    svc: &MealbookService,
    meal_ids: Vec<String>,
    exclude_common: bool,
    name: Option<String>,
    json: bool,
) -> Result<()> {
    let list = svc.generate_shopping_list(
        &GenerateListRequest {
            meal_ids,
            exclude_common_items: exclude_common,
            name,
        },
        CLI_USER,
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&list)?);
    } else {
        print_list(&list);
    }
    Ok(())
}

pub(crate) fn cmd_shop_list(svc: &MealbookService, json: bool) -> Result<()> {
    let lists = svc.list_shopping_lists()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&lists)?);
        return Ok(());
    }
    if lists.is_empty() {
        println!("No active shopping lists. Create one with: mealbook shop generate <meal-id>...");
        return Ok(());
    }

    #[derive(Tabled)]
    struct ListRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Meals")]
        meals: usize,
        #[tabled(rename = "Items")]
        items: String,
        #[tabled(rename = "Created")]
        created: String,
        #[tabled(rename = "Expires")]
        expires: String,
    }

    let rows: Vec<ListRow> = lists
        .iter()
        .map(|l| {
            let checked = l.items.iter().filter(|i| i.is_checked).count();
            ListRow {
                id: l.id.clone(),
                name: l.name.as_deref().map(|n| truncate(n, 25)).unwrap_or_default(),
                meals: l.meal_ids.len(),
                items: format!("{checked}/{}", l.items.len()),
                created: l.created_at.format("%Y-%m-%d").to_string(),
                expires: l.expires_at.format("%Y-%m-%d").to_string(),
            }
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_shop_show(svc: &MealbookService, id: &str, json: bool) -> Result<()> {
    let list = found(svc.get_shopping_list(id), json)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&list)?);
    } else {
        print_list(&list);
    }
    Ok(())
}

pub(crate) fn cmd_shop_check(
    svc: &MealbookService,
    list_id: &str,
    item_id: &str,
    checked: bool,
    json: bool,
) -> Result<()> {
    let item = found(svc.set_item_checked(list_id, item_id, checked), json)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        let name = &item.ingredient_name;
        let state = if item.is_checked { "checked" } else { "unchecked" };
        println!("{name}: {state}");
    }
    Ok(())
}

pub(crate) fn cmd_shop_delete(svc: &MealbookService, id: &str, json: bool) -> Result<()> {
    found(svc.delete_shopping_list(id), json)?;
    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted shopping list {id}");
    }
    Ok(())
}

pub(crate) fn cmd_shop_purge(svc: &MealbookService, json: bool) -> Result<()> {
    let removed = svc.purge_expired_lists()?;
    if json {
        println!("{}", serde_json::json!({ "purged": removed }));
    } else {
        println!("Purged {removed} expired shopping list(s)");
    }
    Ok(())
}

/// Items grouped under a heading per store section, in walk order.
fn print_list(list: &ShoppingList) {
    let title = list.name.as_deref().unwrap_or("Shopping list");
    println!("{title} [{}]", list.id);
    println!(
        "  {} meal(s), expires {}",
        list.meal_ids.len(),
        list.expires_at.format("%Y-%m-%d")
    );

    #[derive(Tabled)]
    struct ItemRow {
        #[tabled(rename = "")]
        check: &'static str,
        #[tabled(rename = "Section")]
        section: String,
        #[tabled(rename = "Item")]
        name: String,
        #[tabled(rename = "Quantity")]
        quantity: String,
        #[tabled(rename = "Item ID")]
        id: String,
    }

    let mut previous = None;
    let rows: Vec<ItemRow> = list
        .items
        .iter()
        .map(|item| {
            let section = if previous == Some(item.store_section) {
                String::new()
            } else {
                previous = Some(item.store_section);
                item.store_section.to_string()
            };
            ItemRow {
                check: if item.is_checked { "[x]" } else { "[ ]" },
                section,
                name: truncate(&item.ingredient_name, 30),
                quantity: item.combined_quantity.clone(),
                id: item.id.clone(),
            }
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}
