use crate::errors::SplitterError;
use indexmap::IndexMap;

/// Rows of a worksheet sharing one header. Cell `i` of every row belongs to
/// column `i`; rows always have exactly as many cells as there are columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Builds a table from raw worksheet values, treating the first row as
    /// the header. Requires at least one data row.
    pub fn from_values(values: Vec<Vec<String>>) -> Result<Self, SplitterError> {
        if values.len() < 2 {
            return Err(SplitterError::InsufficientData);
        }

        let mut values = values.into_iter();
        let columns = values.next().unwrap_or_default();
        Ok(Table::new(columns, values.collect()))
    }

    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(i, mut row)| {
                if row.len() > width {
                    tracing::warn!(
                        row = i + 1,
                        cells = row.len(),
                        width,
                        "dropping cells beyond the header"
                    );
                }
                row.resize(width, String::new());
                row
            })
            .collect();

        Table { columns, rows }
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of data rows, header excluded.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of the first column whose trimmed name equals `name`.
    pub fn column_index(&self, name: &str) -> Result<usize, SplitterError> {
        self.columns
            .iter()
            .position(|column| column.trim() == name)
            .ok_or_else(|| SplitterError::MissingColumn(name.to_string()))
    }

    /// Groups row indices by the trimmed value of `column`, in order of first
    /// appearance. Rows with an empty value belong to no group.
    pub fn partition(&self, column: usize) -> IndexMap<String, Vec<usize>> {
        let mut groups: IndexMap<String, Vec<usize>> = IndexMap::new();

        for (i, row) in self.rows.iter().enumerate() {
            let key = row[column].trim();
            if key.is_empty() {
                continue;
            }
            match groups.get_mut(key) {
                Some(indices) => indices.push(i),
                None => {
                    groups.insert(key.to_string(), vec![i]);
                }
            }
        }

        groups
    }

    /// Sub-table of the rows at `indices`, in the order given.
    pub fn select(&self, indices: &[usize]) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    /// Header followed by every row, ready to be written back to a worksheet.
    pub fn to_values(&self) -> Vec<Vec<String>> {
        std::iter::once(self.columns.clone())
            .chain(self.rows.iter().cloned())
            .collect()
    }
}
