//! Distributed weight application.
//!
//! Every rank loads the weights and the source field, computes the destination
//! columns of its section, then writes them into the shared output in rank
//! order, one rank per turn, with a barrier after every turn.

use std::path::{Path, PathBuf};

use ndarray::Array2;
use tracing::{debug, info, instrument, warn};

use crate::{
    comm::{compute_sections, Communicator, Section},
    config::ApplyConfig,
    context::Context,
    error::{Error, Result},
    io::{Dataset, Values},
    mesh::esmf::ELEMENT_COUNT,
};

use super::{
    field::{SourceField, TIME},
    matrix::{read_triples, WeightMatrix},
};

/// A destination whose weights do not sum to one within tolerance.
/// Reported, never fatal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConservationWarning {
    /// 0-based destination element position.
    pub destination: usize,
    pub sum: f64,
}

/// Weighted values of one rank's destinations, `[time, section.len()]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalWeighted {
    pub section: Section,
    pub values: Array2<f64>,
    pub warnings: Vec<ConservationWarning>,
}

/// Weighted sums for every destination in `section` and every time step.
pub fn compute_local(
    section: Section,
    weights: &WeightMatrix,
    field: &SourceField,
    tolerance: f64,
) -> Result<LocalWeighted> {
    if section.stop > weights.n_rows() {
        return Err(Error::artifact(
            "weights",
            format!("section {}..{} exceeds {} destination rows", section.start, section.stop, weights.n_rows()),
        ));
    }

    let mut values = Array2::<f64>::zeros((field.n_time(), section.len()));
    let mut warnings = Vec::new();

    for (local, destination) in section.range().enumerate() {
        let (cols, factors) = weights.row(destination);
        if let Some(&col) = cols.iter().find(|&&col| col >= field.cells()) {
            return Err(Error::artifact(
                "weights",
                format!("destination {destination} references source cell {} of {}", col + 1, field.cells()),
            ));
        }

        let sum = factors.iter().sum::<f64>();
        if (sum - 1.0).abs() > tolerance {
            warn!(destination, sum, "weights do not sum to one");
            warnings.push(ConservationWarning { destination, sum });
        }

        for time in 0..field.n_time() {
            let source = field.at(time);
            values[[time, local]] = cols.iter().zip(factors).map(|(&col, &factor)| factor * source[col]).sum::<f64>();
        }
    }

    Ok(LocalWeighted { section, values, warnings })
}

/// Artifacts read and written by [`apply_weights`].
#[derive(Debug, Clone)]
pub struct ApplyPaths {
    pub source: PathBuf,
    pub weights: PathBuf,
    pub mesh: PathBuf,
    pub output: PathBuf,
}

/// Copy the mesh, add the time coordinate and a zeroed `[time, elementCount]`
/// field variable.
fn create_output(mesh: &Dataset, field: &SourceField) -> Result<Dataset> {
    if mesh.has_var(&field.name) || mesh.has_var(TIME) {
        return Err(Error::artifact("output", format!("mesh already has a {:?} or {TIME:?} variable", field.name)));
    }
    let elements = mesh.require_dim(ELEMENT_COUNT)?;

    let mut output = mesh.clone();
    output.add_dim(TIME, field.n_time())?;
    let time = output.add_variable(TIME, &[TIME], field.time.clone())?;
    time.attrs = field.time_attrs.clone();
    output.add_variable(
        &field.name,
        &[TIME, ELEMENT_COUNT],
        Values::Float(vec![0.0; field.n_time() * elements]),
    )?;
    Ok(output)
}

/// Write one rank's columns into the output.
fn write_columns(output: &mut Dataset, name: &str, local: &LocalWeighted) -> Result<()> {
    let elements = output.require_dim(ELEMENT_COUNT)?;
    let data = output.floats_mut(name)?;
    for (time, row) in local.values.rows().into_iter().enumerate() {
        let offset = time * elements + local.section.start;
        data[offset..offset + row.len()]
            .iter_mut()
            .zip(row)
            .for_each(|(cell, &value)| *cell = value);
    }
    Ok(())
}

/// Apply the weights on every rank. Returns this rank's result; the output file
/// is complete once any rank returns `Ok`.
#[instrument(skip_all, fields(output = %paths.output.display()))]
pub fn apply_weights<C: Communicator>(ctx: &Context<C, ApplyConfig>, paths: &ApplyPaths) -> Result<LocalWeighted> {
    let _enter = ctx.span().enter();
    let config = ctx.config();
    config.validate()?;

    let mesh = if ctx.is_coordinator() { Some(Dataset::read(&paths.mesh)?) } else { None };
    let assignment = match &mesh {
        Some(mesh) => {
            let destinations = mesh.require_dim(ELEMENT_COUNT)?;
            let sections = compute_sections(destinations, ctx.size())?;
            info!(destinations, workers = ctx.size(), "partitioned destinations");
            Some(sections.into_iter().map(|section| (section, destinations)).collect())
        }
        None => None,
    };
    let (section, destinations) = ctx.comm().scatter(assignment)?;
    debug!(start = section.start, stop = section.stop, "assigned section");

    let weights = WeightMatrix::from_triples(&read_triples(&paths.weights)?, destinations)?;
    let field = SourceField::read(&paths.source, &config.variable)?;
    let local = compute_local(section, &weights, &field, config.conservation_tolerance)?;

    if let Some(mesh) = &mesh {
        create_output(mesh, &field)?.write(&paths.output)?;
        info!(times = field.n_time(), "created output");
    }
    ctx.comm().barrier()?;

    for turn in 0..ctx.size() {
        if turn == ctx.rank() {
            write_turn(&paths.output, &config.variable, &local)?;
        }
        ctx.comm().barrier()?;
    }

    let warnings = ctx.comm().gather(local.warnings.len())?;
    if let Some(warnings) = warnings {
        info!(warnings = warnings.iter().sum::<usize>(), "applied weights");
    }
    Ok(local)
}

fn write_turn(output: &Path, name: &str, local: &LocalWeighted) -> Result<()> {
    let mut ds = Dataset::read(output)?;
    write_columns(&mut ds, name, local)?;
    ds.write(output)?;
    debug!(start = local.section.start, stop = local.section.stop, "wrote section");
    Ok(())
}
