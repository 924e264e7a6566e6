use anyhow::Result;

/// Tabular storage shaped like a spreadsheet: one sheet per table, rows of
/// string cells, addressed by 0-based position among the data rows.
///
/// Deleting a row shifts every later row up by one, so positions are only
/// stable until the next delete on the same sheet. Implementations are
/// injected into [`crate::service::MealbookService`]; nothing in the crate
/// holds a global client.
pub trait RowStore: Send {
    fn read_all_rows(&self, table: &str) -> Result<Vec<Vec<String>>>;

    fn append_row(&self, table: &str, values: &[String]) -> Result<()>;

    fn update_row(&self, table: &str, row_index: usize, values: &[String]) -> Result<()>;

    fn delete_row(&self, table: &str, row_index: usize) -> Result<()>;

    /// First row whose cell at `column` equals `value`, with its position.
    fn find_row_by_column(
        &self,
        table: &str,
        column: usize,
        value: &str,
    ) -> Result<Option<(usize, Vec<String>)>> {
        Ok(self
            .read_all_rows(table)?
            .into_iter()
            .enumerate()
            .find(|(_, row)| row.get(column).is_some_and(|cell| cell == value)))
    }
}
