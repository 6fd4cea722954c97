// src/heuristics/grid.rs

use std::collections::BTreeMap;
use std::io::Cursor;

use calamine::{Data, Range, Reader, open_workbook_auto_from_rs};
use tracing::info;

use super::ExtractError;

/// Sparse view of one worksheet: `(row, col) -> trimmed cell text`.
///
/// Empty cells are never stored, so `get` returning `Some` means there is
/// something to read there. Keys are ordered `(row, col)`, which makes
/// [`CellGrid::cells`] a row-major scan.
#[derive(Debug, Clone, Default)]
pub struct CellGrid {
    name: String,
    cells: BTreeMap<(u32, u32), String>,
}

impl CellGrid {
    /// Build a grid from plain rows. Blank strings are treated as empty cells.
    pub fn from_rows<R, C, S>(name: &str, rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut grid = Self {
            name: name.to_string(),
            cells: BTreeMap::new(),
        };
        for (r, row) in rows.into_iter().enumerate() {
            for (c, cell) in row.into_iter().enumerate() {
                grid.insert(r as u32, c as u32, cell.as_ref());
            }
        }
        grid
    }

    /// Build a grid from a calamine worksheet range, keeping absolute positions.
    pub fn from_range(name: &str, range: &Range<Data>) -> Self {
        let mut grid = Self {
            name: name.to_string(),
            cells: BTreeMap::new(),
        };
        let (row0, col0) = range.start().unwrap_or((0, 0));
        for (r, c, data) in range.cells() {
            if let Some(text) = render_cell(data) {
                grid.insert(row0 + r as u32, col0 + c as u32, &text);
            }
        }
        grid
    }

    fn insert(&mut self, row: u32, col: u32, text: &str) {
        let text = text.trim();
        if !text.is_empty() {
            self.cells.insert((row, col), text.to_string());
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, row: u32, col: u32) -> Option<&str> {
        self.cells.get(&(row, col)).map(String::as_str)
    }

    /// Row-major iteration over non-empty cells.
    pub fn cells(&self) -> impl Iterator<Item = (u32, u32, &str)> {
        self.cells.iter().map(|(&(r, c), text)| (r, c, text.as_str()))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Parse any workbook format calamine understands and return one grid per sheet,
/// in workbook order.
pub fn load_workbook(bytes: &[u8]) -> Result<Vec<CellGrid>, ExtractError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;

    let mut grids = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook.worksheet_range(&name)?;
        let grid = CellGrid::from_range(&name, &range);
        info!(sheet = %name, cells = grid.len(), "Loaded worksheet");
        grids.push(grid);
    }
    Ok(grids)
}

fn render_cell(data: &Data) -> Option<String> {
    let text = match data {
        Data::Empty | Data::Error(_) => return None,
        Data::String(s) | Data::DateTimeIso(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => render_number(*f),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ts) => ts.date().format("%Y-%m-%d").to_string(),
            None => render_number(dt.as_f64()),
        },
        other => other.to_string(),
    };
    Some(text)
}

/// Integral floats render without the trailing `.0` so "1001" stays "1001".
fn render_number(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows_skips_blank_cells() {
        let grid = CellGrid::from_rows("s", [vec!["  a ", ""], vec!["", "b"]]);
        assert_eq!(grid.len(), 2);
        assert_eq!(grid.get(0, 0), Some("a"));
        assert_eq!(grid.get(0, 1), None);
        assert_eq!(grid.get(1, 1), Some("b"));
    }

    #[test]
    fn test_cells_are_row_major() {
        let grid = CellGrid::from_rows("s", [vec!["", "b"], vec!["c", "d"]]);
        let order: Vec<&str> = grid.cells().map(|(_, _, t)| t).collect();
        assert_eq!(order, vec!["b", "c", "d"]);
    }

    #[test]
    fn test_render_number() {
        assert_eq!(render_number(1001.0), "1001");
        assert_eq!(render_number(12.5), "12.5");
    }

    #[test]
    fn test_date_cells_render_as_iso() {
        use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        let date = ExcelDateTime::from_ymd(2025, 3, 14).unwrap();
        let format = Format::new().set_num_format("dd/mm/yyyy");
        sheet.write_string(0, 0, "Invoice Date").unwrap();
        sheet.write_datetime_with_format(0, 1, &date, &format).unwrap();
        sheet.write_number(1, 1, 1001.0).unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let grids = load_workbook(&bytes).unwrap();
        assert_eq!(grids[0].get(0, 1), Some("2025-03-14"));
        assert_eq!(grids[0].get(1, 1), Some("1001"));
    }

    #[test]
    fn test_garbage_bytes() {
        assert!(load_workbook(b"this is not a spreadsheet").is_err());
    }
}
