use std::collections::HashSet;
use std::io::{Read, Write};

use anyhow::{Context, Result, bail};

use crate::codec::{ID_COLUMN, check_row, headers_for};
use crate::store::RowStore;

fn known_headers(sheet: &str) -> Result<&'static [&'static str]> {
    match headers_for(sheet) {
        Some(headers) => Ok(headers),
        None => bail!(
            "Unknown sheet '{sheet}'. Known sheets: {}",
            crate::codec::SHEETS.join(", ")
        ),
    }
}

/// Write `sheet` as CSV with its header row. Returns the number of data rows.
pub fn export_sheet<W: Write>(store: &dyn RowStore, sheet: &str, writer: W) -> Result<usize> {
    let headers = known_headers(sheet)?;
    let rows = store.read_all_rows(sheet)?;

    let mut wtr = csv::WriterBuilder::new().flexible(true).from_writer(writer);
    wtr.write_record(headers)
        .context("Failed to write CSV header")?;
    for row in &rows {
        wtr.write_record(row).context("Failed to write CSV row")?;
    }
    wtr.flush().context("Failed to flush CSV output")?;
    Ok(rows.len())
}

/// Append the rows of a CSV file to `sheet`.
///
/// The header must match the sheet's header exactly (case-insensitive) and
/// every row must decode before anything is written. Ids must be unique
/// within the file and must not already exist in the sheet.
pub fn import_sheet<R: Read>(store: &dyn RowStore, sheet: &str, reader: R) -> Result<usize> {
    let expected = known_headers(sheet)?;

    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().context("Failed to read CSV headers")?.clone();
    let matches = headers.len() == expected.len()
        && headers
            .iter()
            .zip(expected.iter())
            .all(|(got, want)| got.eq_ignore_ascii_case(want));
    if !matches {
        bail!(
            "CSV header does not match sheet '{sheet}'. Expected: {}",
            expected.join(",")
        );
    }

    let mut seen: HashSet<String> = store
        .read_all_rows(sheet)?
        .into_iter()
        .filter_map(|row| row.into_iter().nth(ID_COLUMN))
        .collect();

    let mut rows = Vec::new();
    for (line_num, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("Failed to parse CSV row {}", line_num + 2))?;
        let row: Vec<String> = record.iter().map(String::from).collect();
        if row.iter().all(String::is_empty) {
            continue;
        }
        check_row(sheet, &row).with_context(|| format!("Invalid CSV row {}", line_num + 2))?;
        let id = row.get(ID_COLUMN).cloned().unwrap_or_default();
        if !seen.insert(id.clone()) {
            bail!(
                "Invalid CSV row {}: id '{id}' already exists in sheet '{sheet}'",
                line_num + 2
            );
        }
        rows.push(row);
    }

    for row in &rows {
        store.append_row(sheet, row)?;
    }
    Ok(rows.len())
}
