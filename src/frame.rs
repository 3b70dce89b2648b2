use std::fmt;

use anyhow::{bail, Context, Result};
use serde_json::{Map, Number, Value};

/// An in-memory table of named `f32` columns. Requests decode into one,
/// predictions come back out as one.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    columns: Vec<String>,
    index: Vec<String>,
    /// Column-major; `data[c][r]` pairs with `columns[c]` / `index[r]`.
    data: Vec<Vec<f32>>,
}

impl Frame {
    pub fn from_parts(columns: Vec<String>, index: Vec<String>, data: Vec<Vec<f32>>) -> Result<Self> {
        if columns.len() != data.len() {
            bail!(
                "{} column names for {} data columns",
                columns.len(),
                data.len()
            );
        }
        for (name, column) in columns.iter().zip(&data) {
            if column.len() != index.len() {
                bail!(
                    "column \"{}\" has {} rows, expected {}",
                    name,
                    column.len(),
                    index.len()
                );
            }
        }
        Ok(Self { columns, index, data })
    }

    /// Decodes a JSON table in either of the orientations the service
    /// accepts: an array of row objects, or an object of columns (each
    /// column an index-keyed object or a plain array).
    pub fn from_json(body: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(body).context("request body is not valid JSON")?;
        match value {
            Value::Array(rows) => Self::from_records(&rows),
            Value::Object(columns) => Self::from_columns(&columns),
            _ => bail!("request body must be a JSON array or object"),
        }
    }

    fn from_records(rows: &[Value]) -> Result<Self> {
        let columns: Vec<String> = match rows.first() {
            Some(Value::Object(first)) => first.keys().cloned().collect(),
            Some(_) => bail!("row 0 is not a JSON object"),
            None => Vec::new(),
        };
        let index: Vec<String> = (0..rows.len()).map(|r| r.to_string()).collect();

        let mut data: Vec<Vec<f32>> = columns
            .iter()
            .map(|_| Vec::with_capacity(rows.len()))
            .collect();
        for (r, row) in rows.iter().enumerate() {
            let cells = match row {
                Value::Object(cells) => cells,
                _ => bail!("row {} is not a JSON object", r),
            };
            if cells.len() != columns.len() {
                bail!(
                    "row {} has {} columns, expected {}",
                    r,
                    cells.len(),
                    columns.len()
                );
            }
            for (c, name) in columns.iter().enumerate() {
                let cell = cells
                    .get(name)
                    .with_context(|| format!("row {} is missing column \"{}\"", r, name))?;
                data[c].push(cell_value(name, &index[r], cell)?);
            }
        }
        Ok(Self { columns, index, data })
    }

    fn from_columns(columns_json: &Map<String, Value>) -> Result<Self> {
        let columns: Vec<String> = columns_json.keys().cloned().collect();
        // Row labels come from the first column; the rest must agree.
        let index: Vec<String> = match columns_json.values().next() {
            Some(Value::Object(cells)) => cells.keys().cloned().collect(),
            Some(Value::Array(cells)) => (0..cells.len()).map(|r| r.to_string()).collect(),
            Some(_) => bail!(
                "column \"{}\" is neither a JSON object nor an array",
                columns[0]
            ),
            None => Vec::new(),
        };

        let mut data = Vec::with_capacity(columns.len());
        for (name, cells) in columns_json {
            let mut column = Vec::with_capacity(index.len());
            match cells {
                Value::Object(cells) => {
                    if cells.len() != index.len() {
                        bail!(
                            "column \"{}\" has {} rows, expected {}",
                            name,
                            cells.len(),
                            index.len()
                        );
                    }
                    for label in &index {
                        let cell = cells.get(label).with_context(|| {
                            format!("column \"{}\" is missing row \"{}\"", name, label)
                        })?;
                        column.push(cell_value(name, label, cell)?);
                    }
                }
                Value::Array(cells) => {
                    if cells.len() != index.len() {
                        bail!(
                            "column \"{}\" has {} rows, expected {}",
                            name,
                            cells.len(),
                            index.len()
                        );
                    }
                    for (label, cell) in index.iter().zip(cells) {
                        column.push(cell_value(name, label, cell)?);
                    }
                }
                _ => bail!("column \"{}\" is neither a JSON object nor an array", name),
            }
            data.push(column);
        }
        Ok(Self { columns, index, data })
    }

    /// Column-oriented encoding: `{"col": {"row": value, ...}, ...}`.
    pub fn to_json(&self) -> String {
        let mut table = Map::with_capacity(self.columns.len());
        for (name, column) in self.columns.iter().zip(&self.data) {
            let mut cells = Map::with_capacity(self.index.len());
            for (label, value) in self.index.iter().zip(column) {
                let cell = Number::from_f64(f64::from(*value))
                    .map(Value::Number)
                    .unwrap_or(Value::Null);
                cells.insert(label.clone(), cell);
            }
            table.insert(name.clone(), Value::Object(cells));
        }
        Value::Object(table).to_string()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn index(&self) -> &[String] {
        &self.index
    }

    pub fn n_rows(&self) -> usize {
        self.index.len()
    }

    pub fn column(&self, name: &str) -> Option<&[f32]> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|c| self.data[c].as_slice())
    }
}

fn cell_value(column: &str, row: &str, cell: &Value) -> Result<f32> {
    match cell.as_f64() {
        Some(v) => Ok(v as f32),
        None => bail!(
            "column \"{}\" row \"{}\" holds a non-numeric value: {}",
            column,
            row,
            cell
        ),
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>6}", "")?;
        for name in &self.columns {
            write!(f, " {:>12}", name)?;
        }
        for (r, label) in self.index.iter().enumerate() {
            write!(f, "\n{:>6}", label)?;
            for column in &self.data {
                write!(f, " {:>12}", column[r])?;
            }
        }
        Ok(())
    }
}
