use std::{collections::BTreeMap, path::Path};

use ndarray::{Array2, ArrayView1};

use crate::{
    error::{Error, Result},
    io::{AttrValue, Dataset, Values},
};

pub const TIME: &str = "time";

/// A time-varying source field, flattened to `[time, cells]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceField {
    pub name: String,
    pub values: Array2<f64>,
    /// Time coordinate values, copied verbatim into the output.
    pub time: Values,
    pub time_attrs: BTreeMap<String, AttrValue>,
}

impl SourceField {
    /// Extract variable `name` from a field container. Its first dimension must be
    /// `time`; the trailing dimensions are flattened row-major into cells.
    pub fn from_dataset(ds: &Dataset, name: &str) -> Result<Self> {
        let variable = ds.var(name)?;
        if variable.dims.first().map(String::as_str) != Some(TIME) {
            return Err(Error::artifact("field", format!("{name} must have {TIME:?} as its first dimension")));
        }

        let shape = ds.shape(name)?;
        let n_time = shape[0];
        let cells = shape[1..].iter().product::<usize>();
        let values = Array2::from_shape_vec((n_time, cells), variable.values.to_f64())
            .map_err(|e| Error::artifact("field", e.to_string()))?;

        let (time, time_attrs) = match ds.var(TIME) {
            Ok(time) if time.values.len() == n_time => (time.values.clone(), time.attrs.clone()),
            Ok(_) => return Err(Error::artifact("field", format!("{TIME} variable does not match the {TIME} dimension"))),
            Err(_) => (Values::Int((0..n_time as i64).collect()), BTreeMap::new()),
        };

        Ok(Self { name: name.to_string(), values, time, time_attrs })
    }

    pub fn read(path: &Path, name: &str) -> Result<Self> {
        Self::from_dataset(&Dataset::read(path)?, name)
    }

    #[inline] pub fn n_time(&self) -> usize { self.values.nrows() }

    #[inline] pub fn cells(&self) -> usize { self.values.ncols() }

    /// All cells at one time step.
    #[inline] pub fn at(&self, time: usize) -> ArrayView1<'_, f64> { self.values.row(time) }
}
