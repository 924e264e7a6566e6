use anyhow::{Result, bail};
use tabled::{Table, Tabled, settings::Style};

use mealbook_core::models::{MealSlot, NewCalendarEntry};
use mealbook_core::service::MealbookService;

use super::helpers::{CLI_USER, found, parse_date, truncate};

pub(crate) fn cmd_calendar_add(
    svc: &MealbookService,
    meal_id: &str,
    date: Option<String>,
    slot: &str,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let slot: MealSlot = slot.parse()?;

    let day = found(
        svc.schedule_meal(
            &NewCalendarEntry {
                date,
                slot,
                meal_id: meal_id.to_string(),
            },
            CLI_USER,
        ),
        json,
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&day)?);
    } else {
        let name = &day.meal_name;
        println!("Planned {name} for {slot} on {date}");
    }
    Ok(())
}

pub(crate) fn cmd_calendar_show(
    svc: &MealbookService,
    start: Option<String>,
    days: u32,
    json: bool,
) -> Result<()> {
    if days == 0 {
        bail!("--days must be at least 1");
    }
    let start = parse_date(start)?;
    let Some(end) = start.checked_add_signed(chrono::Duration::days(i64::from(days) - 1)) else {
        bail!("{days} days from {start} is past the last supported date");
    };
    let entries = svc.calendar_range(start, end)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("Nothing planned between {start} and {end}");
        return Ok(());
    }

    #[derive(Tabled)]
    struct DayRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Slot")]
        slot: String,
        #[tabled(rename = "Meal")]
        meal: String,
        #[tabled(rename = "Entry ID")]
        id: String,
    }

    let rows: Vec<DayRow> = entries
        .iter()
        .map(|d| DayRow {
            date: d.entry.date.format("%a %Y-%m-%d").to_string(),
            slot: d.entry.slot.to_string(),
            meal: truncate(&d.meal_name, 35),
            id: d.entry.id.clone(),
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_calendar_remove(svc: &MealbookService, id: &str, json: bool) -> Result<()> {
    found(svc.remove_calendar_entry(id), json)?;
    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Removed calendar entry {id}");
    }
    Ok(())
}
