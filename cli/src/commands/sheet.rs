use anyhow::{Context, Result};
use std::path::Path;

use mealbook_core::service::MealbookService;
use mealbook_core::sheet_csv::{export_sheet, import_sheet};

/// Export a sheet as CSV to `output`, or stdout when absent.
pub(crate) fn cmd_sheet_export(
    svc: &MealbookService,
    sheet: &str,
    output: Option<&Path>,
) -> Result<()> {
    match output {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let count = export_sheet(svc.store(), sheet, file)?;
            eprintln!("Exported {count} rows from {sheet} to {}", path.display());
        }
        None => {
            export_sheet(svc.store(), sheet, std::io::stdout().lock())?;
        }
    }
    Ok(())
}

pub(crate) fn cmd_sheet_import(
    svc: &MealbookService,
    sheet: &str,
    file: &Path,
    json: bool,
) -> Result<()> {
    let reader = std::fs::File::open(file)
        .with_context(|| format!("Failed to open {}", file.display()))?;
    let count = import_sheet(svc.store(), sheet, reader)?;

    if json {
        println!("{}", serde_json::json!({ "sheet": sheet, "imported": count }));
    } else {
        println!("Imported {count} rows into {sheet}");
    }
    Ok(())
}
