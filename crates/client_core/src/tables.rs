use shared::domain::{Table, MAX_TABLE_COLS, MAX_TABLE_ROWS};
use thiserror::Error;
use tracing::debug;

use crate::dialogs::Dialogs;

pub const DEFAULT_ROWS: usize = 3;
pub const DEFAULT_COLS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableLimits {
    pub max_rows: usize,
    pub max_cols: usize,
    pub max_tables: usize,
}

impl Default for TableLimits {
    fn default() -> Self {
        Self {
            max_rows: MAX_TABLE_ROWS,
            max_cols: MAX_TABLE_COLS,
            max_tables: 5,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("لا يمكن حفظ جدول فارغ")]
    Empty,
    #[error("الحد الأقصى {max} جداول")]
    LimitReached { max: usize },
    #[error("الخلية ({row}, {col}) خارج حدود الجدول")]
    CellOutOfRange { row: usize, col: usize },
    #[error("لا يوجد جدول في الموضع {0}")]
    NoSuchTable(usize),
}

/// Editor state for one table of a draft: a fresh grid or a copy of an
/// existing table being edited.
#[derive(Debug, Clone)]
pub struct TableBuilder {
    limits: TableLimits,
    editing: Option<usize>,
    title: Option<String>,
    cells: Vec<Vec<String>>,
}

impl TableBuilder {
    /// Row and column limits below one are raised to one.
    pub fn new(limits: TableLimits) -> Self {
        let limits = TableLimits {
            max_rows: limits.max_rows.max(1),
            max_cols: limits.max_cols.max(1),
            ..limits
        };
        Self {
            limits,
            editing: None,
            title: None,
            cells: blank_grid(
                DEFAULT_ROWS.min(limits.max_rows),
                DEFAULT_COLS.min(limits.max_cols),
            ),
        }
    }

    pub fn limits(&self) -> TableLimits {
        self.limits
    }

    pub fn rows(&self) -> usize {
        self.cells.len()
    }

    pub fn cols(&self) -> usize {
        self.cells.first().map_or(0, Vec::len)
    }

    pub fn cells(&self) -> &[Vec<String>] {
        &self.cells
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn editing_index(&self) -> Option<usize> {
        self.editing
    }

    /// Loads `tables[index]` for editing, or resets to a blank default grid.
    pub fn open(&mut self, tables: &[Table], existing: Option<usize>) -> Result<(), TableError> {
        let Some(index) = existing else {
            *self = Self::new(self.limits);
            return Ok(());
        };
        let table = tables.get(index).ok_or(TableError::NoSuchTable(index))?;
        self.editing = Some(index);
        self.title = table.title.clone();
        let rows = table.rows.clamp(1, self.limits.max_rows);
        let cols = table.cols.clamp(1, self.limits.max_cols);
        self.cells = (0..rows)
            .map(|r| {
                (0..cols)
                    .map(|c| table.cell(r, c).unwrap_or_default().to_string())
                    .collect()
            })
            .collect();
        Ok(())
    }

    /// Reallocates the grid, keeping overlapping cells. Sizes are clamped to
    /// the configured limits.
    pub fn resize(&mut self, rows: usize, cols: usize) {
        let rows = rows.clamp(1, self.limits.max_rows);
        let cols = cols.clamp(1, self.limits.max_cols);
        let mut cells = blank_grid(rows, cols);
        for (r, row) in self.cells.iter().enumerate().take(rows) {
            for (c, value) in row.iter().enumerate().take(cols) {
                cells[r][c] = value.clone();
            }
        }
        self.cells = cells;
    }

    pub fn set_cell(&mut self, row: usize, col: usize, value: impl Into<String>) -> Result<(), TableError> {
        let cell = self
            .cells
            .get_mut(row)
            .and_then(|cells| cells.get_mut(col))
            .ok_or(TableError::CellOutOfRange { row, col })?;
        *cell = value.into();
        Ok(())
    }

    pub fn set_title(&mut self, title: Option<String>) {
        self.title = title
            .map(|title| title.trim().to_string())
            .filter(|title| !title.is_empty());
    }

    /// Writes the grid into `tables`, replacing the table being edited or
    /// appending a new one, and returns its index. Fully blank rows are
    /// dropped. The builder resets afterwards.
    pub fn save(&mut self, tables: &mut Vec<Table>) -> Result<usize, TableError> {
        let cells: Vec<Vec<String>> = self
            .cells
            .iter()
            .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
            .cloned()
            .collect();
        if cells.is_empty() {
            return Err(TableError::Empty);
        }

        match self.editing {
            Some(index) if index >= tables.len() => return Err(TableError::NoSuchTable(index)),
            None if tables.len() >= self.limits.max_tables => {
                return Err(TableError::LimitReached {
                    max: self.limits.max_tables,
                })
            }
            _ => {}
        }

        let mut table = Table {
            title: self.title.clone(),
            rows: cells.len(),
            cols: self.cols(),
            cells,
            html: String::new(),
        };
        table.html = render_html(&table);

        let index = match self.editing {
            Some(index) => {
                tables[index] = table;
                index
            }
            None => {
                tables.push(table);
                tables.len() - 1
            }
        };
        debug!(index, rows = tables[index].rows, cols = tables[index].cols, "table saved");
        *self = Self::new(self.limits);
        Ok(index)
    }

    /// Asks first, then removes `tables[index]`. Returns whether it was
    /// removed.
    pub async fn remove(
        &mut self,
        tables: &mut Vec<Table>,
        index: usize,
        dialogs: &dyn Dialogs,
    ) -> Result<bool, TableError> {
        let table = tables.get(index).ok_or(TableError::NoSuchTable(index))?;
        let prompt = format!("هل تريد حذف {}؟", table.display_title(index));
        if !dialogs.confirm("حذف الجدول", &prompt).await {
            return Ok(false);
        }
        tables.remove(index);
        match self.editing {
            Some(editing) if editing == index => *self = Self::new(self.limits),
            Some(editing) if editing > index => self.editing = Some(editing - 1),
            _ => {}
        }
        Ok(true)
    }
}

/// Static HTML for a table, as embedded in the description.
pub fn render_html(table: &Table) -> String {
    let mut html = String::from("<table border=\"1\" style=\"border-collapse: collapse; width: 100%;\">");
    if let Some(title) = table.title.as_deref().filter(|title| !title.trim().is_empty()) {
        html.push_str("<caption>");
        html.push_str(&escape_html(title));
        html.push_str("</caption>");
    }
    html.push_str("<tbody>");
    for row in &table.cells {
        html.push_str("<tr>");
        for cell in row {
            html.push_str("<td>");
            html.push_str(&escape_html(cell));
            html.push_str("</td>");
        }
        html.push_str("</tr>");
    }
    html.push_str("</tbody></table>");
    html
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn blank_grid(rows: usize, cols: usize) -> Vec<Vec<String>> {
    vec![vec![String::new(); cols]; rows]
}

#[cfg(test)]
#[path = "tests/tables_tests.rs"]
mod tests;
