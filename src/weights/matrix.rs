//! Sparse interpolation weights: loading `(row, col, S)` triples and grouping them
//! by destination row.

use std::{fs::File, path::Path};

use polars::{frame::DataFrame, io::SerReader, prelude::{CsvReader, DataType}};
use tracing::debug;

use crate::{
    error::{Error, Result},
    io::Dataset,
};

/// One sparse weight: 1-based destination row, 1-based source column, factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightTriple {
    pub row: i64,
    pub col: i64,
    pub value: f64,
}

impl WeightTriple {
    #[inline] pub fn new(row: i64, col: i64, value: f64) -> Self { Self { row, col, value } }
}

/// Read the triples from a weight container: `row`, `col` and `S` over `n_s`.
pub fn triples_from_dataset(ds: &Dataset) -> Result<Vec<WeightTriple>> {
    for name in ["row", "col", "S"] {
        if ds.var(name)?.dims != ["n_s"] {
            return Err(Error::artifact("weights", format!("{name} must be defined over n_s")));
        }
    }

    let rows = ds.ints("row")?;
    let cols = ds.ints("col")?;
    let values = ds.floats("S")?;
    Ok(rows.iter().zip(cols).zip(values)
        .map(|((&row, &col), value)| WeightTriple { row, col, value })
        .collect())
}

/// Read the triples from a CSV table with a `row,col,S` header.
pub fn triples_from_csv(path: &Path) -> Result<Vec<WeightTriple>> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let df = CsvReader::new(file).finish()?;
    triples_from_frame(&df)
}

fn triples_from_frame(df: &DataFrame) -> Result<Vec<WeightTriple>> {
    let rows = df.column("row")?.cast(&DataType::Int64)?;
    let cols = df.column("col")?.cast(&DataType::Int64)?;
    let values = df.column("S")?.cast(&DataType::Float64)?;

    rows.i64()?.into_iter()
        .zip(cols.i64()?.into_iter())
        .zip(values.f64()?.into_iter())
        .enumerate()
        .map(|(line, ((row, col), value))| match (row, col, value) {
            (Some(row), Some(col), Some(value)) => Ok(WeightTriple { row, col, value }),
            _ => Err(Error::artifact("weights", format!("CSV line {} has an empty cell", line + 1))),
        })
        .collect()
}

/// Load triples from either a `.csv` table or a weight container.
pub fn read_triples(path: &Path) -> Result<Vec<WeightTriple>> {
    let triples = match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => triples_from_csv(path)?,
        _ => triples_from_dataset(&Dataset::read(path)?)?,
    };
    debug!(path = %path.display(), nnz = triples.len(), "read weights");
    Ok(triples)
}

/// Weights grouped by destination row (compressed sparse row), 0-based inside.
///
/// Entries of one row keep their file order, so a dot product accumulates in the
/// same order the weights were produced.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightMatrix {
    indptr: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<f64>,
}

impl WeightMatrix {
    /// Group triples into `n_rows` destination rows. Rows must lie in `1..=n_rows`
    /// and columns must be at least 1.
    pub fn from_triples(triples: &[WeightTriple], n_rows: usize) -> Result<Self> {
        let mut counts = vec![0usize; n_rows];
        for triple in triples {
            if triple.row < 1 || triple.row as usize > n_rows {
                return Err(Error::artifact(
                    "weights",
                    format!("row {} is outside 1..={n_rows}", triple.row),
                ));
            }
            if triple.col < 1 {
                return Err(Error::artifact("weights", format!("col {} is not a 1-based index", triple.col)));
            }
            counts[triple.row as usize - 1] += 1;
        }

        let mut indptr = Vec::with_capacity(n_rows + 1);
        indptr.push(0);
        for count in &counts {
            indptr.push(indptr[indptr.len() - 1] + count);
        }

        let mut next = indptr[..n_rows].to_vec();
        let mut cols = vec![0; triples.len()];
        let mut values = vec![0.0; triples.len()];
        for triple in triples {
            let slot = &mut next[triple.row as usize - 1];
            cols[*slot] = triple.col as usize - 1;
            values[*slot] = triple.value;
            *slot += 1;
        }

        Ok(Self { indptr, cols, values })
    }

    #[inline] pub fn n_rows(&self) -> usize { self.indptr.len() - 1 }

    #[inline] pub fn nnz(&self) -> usize { self.values.len() }

    /// 0-based source columns and factors of 0-based destination `row`.
    pub fn row(&self, row: usize) -> (&[usize], &[f64]) {
        let range = self.indptr[row]..self.indptr[row + 1];
        (&self.cols[range.clone()], &self.values[range])
    }

    #[inline] pub fn row_sum(&self, row: usize) -> f64 { self.row(row).1.iter().sum() }

    /// Largest 0-based source column, if any weight exists.
    #[inline] pub fn max_col(&self) -> Option<usize> { self.cols.iter().copied().max() }
}
