use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::process;

use mealbook_core::error::MealbookError;
use mealbook_core::models::{NewIngredientLine, non_blank};

/// `created_by` recorded for changes made from the command line.
pub(crate) const CLI_USER: &str = "local";

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// Parse "2", "0.5" or "1/2".
pub(crate) fn parse_quantity(s: &str) -> Result<f64> {
    let s = s.trim();
    let value = if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num
            .trim()
            .parse()
            .with_context(|| format!("Invalid quantity: '{s}'"))?;
        let den: f64 = den
            .trim()
            .parse()
            .with_context(|| format!("Invalid quantity: '{s}'"))?;
        if den == 0.0 {
            bail!("Invalid quantity: '{s}'");
        }
        num / den
    } else {
        s.parse()
            .with_context(|| format!("Invalid quantity: '{s}'"))?
    };
    if !value.is_finite() || value < 0.0 {
        bail!("Quantity must be a non-negative number, got '{s}'");
    }
    Ok(value)
}

/// Split "500ml" or "2.5tbsp" into ("500", "ml") or ("2.5", "tbsp").
fn split_number_unit(s: &str) -> Option<(&str, &str)> {
    let idx = s.find(|c: char| c.is_alphabetic())?;
    if idx == 0 {
        return None;
    }
    let (num_part, unit_part) = s.split_at(idx);
    Some((num_part.trim(), unit_part.trim()))
}

/// Parse an ingredient line given on the command line.
///
/// Accepts `name`, `name:qty`, `name:qty unit`, `name:qtyunit`, optionally
/// followed by a parenthesized note: `salt:(to taste)`, `basil:1 cup (fresh)`.
pub(crate) fn parse_ingredient_spec(s: &str) -> Result<NewIngredientLine> {
    let (name, amount) = match s.split_once(':') {
        Some((name, amount)) => (name.trim(), amount.trim()),
        None => (s.trim(), ""),
    };
    if name.is_empty() {
        bail!("Invalid ingredient '{s}'. Use 'name:quantity unit (note)'");
    }

    let (amount, note) = match amount.find('(') {
        Some(open) if amount.ends_with(')') => (
            amount[..open].trim(),
            non_blank(Some(amount[open + 1..amount.len() - 1].to_string())),
        ),
        _ => (amount, None),
    };

    let (quantity, unit) = if amount.is_empty() {
        (None, String::new())
    } else if let Some((qty, unit)) = amount.split_once(char::is_whitespace) {
        (Some(parse_quantity(qty)?), unit.trim().to_string())
    } else if let Some((qty, unit)) = split_number_unit(amount) {
        (Some(parse_quantity(qty)?), unit.to_string())
    } else {
        (Some(parse_quantity(amount)?), String::new())
    };

    Ok(NewIngredientLine {
        name: Some(name.to_string()),
        quantity,
        unit,
        note,
        ..NewIngredientLine::default()
    })
}

/// "2 cup", "3", or "-" when there is no amount.
pub(crate) fn format_amount(quantity: Option<f64>, unit: &str) -> String {
    match quantity {
        Some(q) if unit.is_empty() => mealbook_core::shopping::format_quantity(q),
        Some(q) => format!("{} {unit}", mealbook_core::shopping::format_quantity(q)),
        None => "-".to_string(),
    }
}

/// Unwrap a service result, turning a missing record into exit status 2.
pub(crate) fn found<T>(result: mealbook_core::error::Result<T>, json: bool) -> Result<T> {
    match result {
        Err(MealbookError::NotFound(msg)) => {
            if json {
                println!("{}", json_error(&msg));
            } else {
                eprintln!("{msg}");
            }
            process::exit(2);
        }
        other => Ok(other?),
    }
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
