use anyhow::{Context, Result};

use crate::codec::{ID_COLUMN, Record};
use crate::store::RowStore;

/// Typed access to the sheets of a [`RowStore`].
pub struct Repository {
    store: Box<dyn RowStore>,
}

impl Repository {
    pub fn new(store: Box<dyn RowStore>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &dyn RowStore {
        self.store.as_ref()
    }

    /// Every record of `R`'s sheet in row order. Blank rows are skipped.
    pub fn all<R: Record>(&self) -> Result<Vec<R>> {
        let rows = self
            .store
            .read_all_rows(R::SHEET)
            .with_context(|| format!("failed to read sheet '{}'", R::SHEET))?;

        let mut records = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            if is_blank(row) {
                continue;
            }
            let record = R::from_row(row)
                .with_context(|| format!("malformed row {i} in sheet '{}'", R::SHEET))?;
            records.push(record);
        }
        Ok(records)
    }

    pub fn get<R: Record>(&self, id: &str) -> Result<Option<R>> {
        self.locate::<R>(id)
            .map(|found| found.map(|(_, record)| record))
    }

    pub fn insert<R: Record>(&self, record: &R) -> Result<()> {
        self.store
            .append_row(R::SHEET, &record.to_row())
            .with_context(|| format!("failed to append to sheet '{}'", R::SHEET))
    }

    /// Overwrite the row holding `record.id()`. Returns false when absent.
    pub fn replace<R: Record>(&self, record: &R) -> Result<bool> {
        let Some((index, _)) = self.locate::<R>(record.id())? else {
            return Ok(false);
        };
        self.store
            .update_row(R::SHEET, index, &record.to_row())
            .with_context(|| format!("failed to update sheet '{}'", R::SHEET))?;
        Ok(true)
    }

    /// Delete the row holding `id`. Returns false when absent.
    pub fn remove<R: Record>(&self, id: &str) -> Result<bool> {
        let Some((index, _)) = self.locate::<R>(id)? else {
            return Ok(false);
        };
        self.store
            .delete_row(R::SHEET, index)
            .with_context(|| format!("failed to delete from sheet '{}'", R::SHEET))?;
        Ok(true)
    }

    /// Delete every record matching `predicate`, returning how many went.
    pub fn remove_where<R: Record>(&self, predicate: impl Fn(&R) -> bool) -> Result<usize> {
        let rows = self.store.read_all_rows(R::SHEET)?;
        let mut doomed = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            if is_blank(row) {
                continue;
            }
            let record = R::from_row(row)
                .with_context(|| format!("malformed row {i} in sheet '{}'", R::SHEET))?;
            if predicate(&record) {
                doomed.push(i);
            }
        }

        // Bottom-up so earlier positions stay valid
        for index in doomed.iter().rev() {
            self.store
                .delete_row(R::SHEET, *index)
                .with_context(|| format!("failed to delete from sheet '{}'", R::SHEET))?;
        }
        Ok(doomed.len())
    }

    fn locate<R: Record>(&self, id: &str) -> Result<Option<(usize, R)>> {
        let found = self
            .store
            .find_row_by_column(R::SHEET, ID_COLUMN, id)
            .with_context(|| format!("failed to search sheet '{}'", R::SHEET))?;
        found
            .map(|(index, row)| {
                R::from_row(&row)
                    .map(|record| (index, record))
                    .with_context(|| format!("malformed row {index} in sheet '{}'", R::SHEET))
            })
            .transpose()
    }
}

fn is_blank(row: &[String]) -> bool {
    row.iter().all(|cell| cell.trim().is_empty())
}
