use std::path::Path;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OptionalExtension, params};

use crate::store::RowStore;

/// A [`RowStore`] kept in a local `SQLite` file.
///
/// Every sheet lives in one `sheet_rows` table; a row's position is its
/// rank by insertion id within its sheet, which gives the same
/// shift-on-delete behaviour as a spreadsheet without renumbering.
pub struct SqliteRowStore {
    conn: Connection,
}

impl SqliteRowStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let store = SqliteRowStore { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteRowStore { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS sheet_rows (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    sheet TEXT NOT NULL,
                    cells TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_sheet_rows_sheet ON sheet_rows(sheet, id);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    /// Storage id of the row at `row_index` in `table`.
    fn row_id_at(&self, table: &str, row_index: usize) -> Result<i64> {
        let offset = i64::try_from(row_index).context("row index too large")?;
        let id: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM sheet_rows WHERE sheet = ?1 ORDER BY id LIMIT 1 OFFSET ?2",
                params![table, offset],
                |row| row.get(0),
            )
            .optional()?;
        match id {
            Some(id) => Ok(id),
            None => bail!("Row {row_index} does not exist in sheet '{table}'"),
        }
    }

    fn encode(values: &[String]) -> Result<String> {
        serde_json::to_string(values).context("failed to encode row cells")
    }
}

impl RowStore for SqliteRowStore {
    fn read_all_rows(&self, table: &str) -> Result<Vec<Vec<String>>> {
        let mut stmt = self
            .conn
            .prepare("SELECT cells FROM sheet_rows WHERE sheet = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![table], |row| row.get::<_, String>(0))?;

        let mut results = Vec::new();
        for (i, row) in rows.enumerate() {
            let raw = row?;
            let cells: Vec<String> = serde_json::from_str(&raw)
                .with_context(|| format!("Corrupt cells in sheet '{table}' row {i}"))?;
            results.push(cells);
        }
        Ok(results)
    }

    fn append_row(&self, table: &str, values: &[String]) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sheet_rows (sheet, cells) VALUES (?1, ?2)",
            params![table, Self::encode(values)?],
        )?;
        Ok(())
    }

    fn update_row(&self, table: &str, row_index: usize, values: &[String]) -> Result<()> {
        let id = self.row_id_at(table, row_index)?;
        self.conn.execute(
            "UPDATE sheet_rows SET cells = ?1 WHERE id = ?2",
            params![Self::encode(values)?, id],
        )?;
        Ok(())
    }

    fn delete_row(&self, table: &str, row_index: usize) -> Result<()> {
        let id = self.row_id_at(table, row_index)?;
        self.conn
            .execute("DELETE FROM sheet_rows WHERE id = ?1", params![id])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| (*c).to_string()).collect()
    }

    #[test]
    fn test_append_and_read() {
        let store = SqliteRowStore::open_in_memory().unwrap();
        store.append_row("Meals", &row(&["a", "Pasta"])).unwrap();
        store.append_row("Meals", &row(&["b", "Curry"])).unwrap();

        let rows = store.read_all_rows("Meals").unwrap();
        assert_eq!(rows, vec![row(&["a", "Pasta"]), row(&["b", "Curry"])]);
    }

    #[test]
    fn test_sheets_are_isolated() {
        let store = SqliteRowStore::open_in_memory().unwrap();
        store.append_row("Meals", &row(&["a"])).unwrap();
        store.append_row("Ingredients", &row(&["x"])).unwrap();

        assert_eq!(store.read_all_rows("Meals").unwrap().len(), 1);
        assert_eq!(store.read_all_rows("Ingredients").unwrap().len(), 1);
        assert!(store.read_all_rows("Calendar").unwrap().is_empty());
    }

    #[test]
    fn test_update_row() {
        let store = SqliteRowStore::open_in_memory().unwrap();
        store.append_row("Meals", &row(&["a", "Pasta"])).unwrap();
        store.append_row("Meals", &row(&["b", "Curry"])).unwrap();

        store.update_row("Meals", 1, &row(&["b", "Green Curry"])).unwrap();

        let rows = store.read_all_rows("Meals").unwrap();
        assert_eq!(rows[0], row(&["a", "Pasta"]));
        assert_eq!(rows[1], row(&["b", "Green Curry"]));
    }

    #[test]
    fn test_delete_row_shifts_later_rows() {
        let store = SqliteRowStore::open_in_memory().unwrap();
        for id in ["a", "b", "c"] {
            store.append_row("Meals", &row(&[id])).unwrap();
        }

        store.delete_row("Meals", 0).unwrap();

        let rows = store.read_all_rows("Meals").unwrap();
        assert_eq!(rows, vec![row(&["b"]), row(&["c"])]);

        // "c" now sits at position 1
        store.delete_row("Meals", 1).unwrap();
        assert_eq!(store.read_all_rows("Meals").unwrap(), vec![row(&["b"])]);
    }

    #[test]
    fn test_out_of_range_index_errors() {
        let store = SqliteRowStore::open_in_memory().unwrap();
        store.append_row("Meals", &row(&["a"])).unwrap();

        assert!(store.update_row("Meals", 1, &row(&["z"])).is_err());
        assert!(store.delete_row("Meals", 5).is_err());
        assert!(store.delete_row("Empty", 0).is_err());
    }

    #[test]
    fn test_find_row_by_column() {
        let store = SqliteRowStore::open_in_memory().unwrap();
        store.append_row("Meals", &row(&["a", "Pasta"])).unwrap();
        store.append_row("Meals", &row(&["b", "Curry"])).unwrap();

        let (idx, found) = store
            .find_row_by_column("Meals", 1, "Curry")
            .unwrap()
            .unwrap();
        assert_eq!(idx, 1);
        assert_eq!(found[0], "b");

        assert!(store.find_row_by_column("Meals", 1, "Soup").unwrap().is_none());
        assert!(store.find_row_by_column("Meals", 9, "a").unwrap().is_none());
    }

    #[test]
    fn test_cells_preserve_commas_and_quotes() {
        let store = SqliteRowStore::open_in_memory().unwrap();
        let cells = row(&["a", "Mac \"n\" cheese", "one,two"]);
        store.append_row("Meals", &cells).unwrap();
        assert_eq!(store.read_all_rows("Meals").unwrap()[0], cells);
    }

    #[test]
    fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mealbook.db");
        {
            let store = SqliteRowStore::open(&path).unwrap();
            store.append_row("Meals", &row(&["a", "Pasta"])).unwrap();
        }
        let reopened = SqliteRowStore::open(&path).unwrap();
        assert_eq!(reopened.read_all_rows("Meals").unwrap().len(), 1);
    }

    #[test]
    fn test_migration_sets_user_version() {
        let store = SqliteRowStore::open_in_memory().unwrap();
        let version: i64 = store
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
        // Migrating twice is a no-op
        store.migrate().unwrap();
    }
}
