//! Reader for the tabular text files a paradigm is written in.
//!
//! Mapping, block and program files share one format: a header row, comma-separated cells,
//! `#`-prefixed comment lines and blank lines ignored. A [`Table`] keeps every cell as trimmed text;
//! typed interpretation (times, counts, identifiers) is left to the loaders in
//! [`mapping`](crate::mapping), [`block`](crate::block) and [`program`](crate::program).
//!
//! Empty cells read as absent. Rows shorter than the header are padded with absent cells, rows
//! longer than the header are rejected.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, Trim};

use crate::error::{ParadigmError, Result};

#[derive(Clone, Debug)]
pub struct Table {
    source_name: String,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Reads a table from any reader. `source_name` is only used in error messages.
    ///
    /// ```
    /// use pdcompiler_backend::table::Table;
    ///
    /// let text = "# pins of the left arena\npin_id,name\n\n1,led_a\n2,led_b\n";
    /// let table = Table::from_reader("mapping", text.as_bytes()).unwrap();
    /// assert_eq!(table.len(), 2);
    /// assert_eq!(table.cell(1, table.column_index("name")), Some("led_b"));
    /// ```
    pub fn from_reader<R: Read>(source_name: &str, reader: R) -> Result<Self> {
        let csv_err = |source| ParadigmError::Csv {
            source_name: source_name.to_string(),
            source,
        };
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .comment(Some(b'#'))
            .trim(Trim::All)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()
            .map_err(csv_err)?
            .iter()
            .map(|h| h.to_string())
            .collect();
        for (i, header) in headers.iter().enumerate() {
            if header.is_empty() {
                return Err(ParadigmError::configuration(format!(
                    "Table {} has an unnamed column at position {}",
                    source_name, i
                )));
            }
            if headers[..i].contains(header) {
                return Err(ParadigmError::configuration(format!(
                    "Table {} declares column {} more than once",
                    source_name, header
                )));
            }
        }

        let mut rows = Vec::new();
        for (line, record) in rdr.records().enumerate() {
            let record = record.map_err(csv_err)?;
            // Whitespace-only lines survive the csv reader as a single empty cell
            if record.iter().all(|cell| cell.is_empty()) {
                continue;
            }
            if record.len() > headers.len() {
                return Err(ParadigmError::format(format!(
                    "Table {} row {} has {} cells but the header declares {} columns",
                    source_name,
                    line + 1,
                    record.len(),
                    headers.len()
                )));
            }
            let mut row: Vec<String> = record.iter().map(|cell| cell.to_string()).collect();
            row.resize(headers.len(), String::new());
            rows.push(row);
        }

        Ok(Table {
            source_name: source_name.to_string(),
            headers,
            rows,
        })
    }

    pub fn parse_str(source_name: &str, text: &str) -> Result<Self> {
        Self::from_reader(source_name, text.as_bytes())
    }

    pub fn read_path(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| ParadigmError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(&path.display().to_string(), file)
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Like [`Table::column_index`], but a missing column is a configuration error
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name).ok_or_else(|| {
            ParadigmError::configuration(format!(
                "Table {} is missing required column {}. Columns are {:?}",
                self.source_name, name, self.headers
            ))
        })
    }

    /// Cell at `row` in column `col`, `None` when the column is absent or the cell is blank
    pub fn cell(&self, row: usize, col: Option<usize>) -> Option<&str> {
        let col = col?;
        self.rows
            .get(row)
            .and_then(|cells| cells.get(col))
            .map(|cell| cell.as_str())
            .filter(|cell| !cell.is_empty())
    }

    /// `(header, cell)` pairs of a row for every column not listed in `reserved`,
    /// skipping blank cells.
    pub fn extra_cells<'a>(
        &'a self,
        row: usize,
        reserved: &'a [&'a str],
    ) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.headers
            .iter()
            .enumerate()
            .filter(move |(_, h)| !reserved.contains(&h.as_str()))
            .filter_map(move |(col, h)| self.cell(row, Some(col)).map(|cell| (h.as_str(), cell)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_blank_lines_and_padding() {
        let text = "\
# block used for conditioning
pin_id,start,end,on,off

1,0,1/2
# a trailing comment
2,0,1,0.1,0.1

";
        let table = Table::parse_str("conditioning", text).unwrap();
        assert_eq!(table.len(), 2);
        let on = table.column_index("on");
        assert_eq!(table.cell(0, on), None);
        assert_eq!(table.cell(1, on), Some("0.1"));
        assert_eq!(table.cell(0, table.column_index("end")), Some("1/2"));
        assert_eq!(table.cell(0, table.column_index("missing")), None);
    }

    #[test]
    fn missing_required_column() {
        let table = Table::parse_str("program", "block,times\nclean,1\n").unwrap();
        assert!(table.require_column("block").is_ok());
        assert!(table.require_column("duration").unwrap_err().is_configuration());
    }

    #[test]
    fn duplicate_header_is_rejected() {
        let err = Table::parse_str("mapping", "pin_id,name,name\n1,a,b\n").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn long_rows_are_rejected() {
        let err = Table::parse_str("mapping", "pin_id,name\n1,a,b\n").unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn extra_cells_skip_reserved_and_blank() {
        let table = Table::parse_str("mapping", "pin_id,name,pin_number,x\n1,led_a,13,\n").unwrap();
        let extra: Vec<_> = table.extra_cells(0, &["pin_id", "name"]).collect();
        assert_eq!(extra, vec![("pin_number", "13")]);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Table::read_path(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, ParadigmError::Io { .. }));
    }
}
