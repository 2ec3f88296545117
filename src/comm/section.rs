use std::ops::Range;

use crate::error::ConfigurationError;

/// Half-open index range `[start, stop)` owned by one rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Section {
    pub start: usize,
    pub stop: usize,
}

impl Section {
    pub fn new(start: usize, stop: usize) -> Self {
        debug_assert!(start <= stop, "section start must not exceed stop");
        Self { start, stop }
    }

    #[inline] pub fn len(&self) -> usize { self.stop - self.start }

    #[inline] pub fn is_empty(&self) -> bool { self.start == self.stop }

    #[inline] pub fn range(&self) -> Range<usize> { self.start..self.stop }

    #[inline] pub fn contains(&self, index: usize) -> bool { self.range().contains(&index) }
}

/// Split `[0, n)` into `workers` contiguous sections ordered by rank, using
/// `step = ceil(n / workers)`. Trailing sections may be shorter, or empty when
/// `n` is not much larger than `workers`.
pub fn compute_sections(n: usize, workers: usize) -> Result<Vec<Section>, ConfigurationError> {
    if workers == 0 {
        return Err(ConfigurationError::NoWorkers);
    }
    if n < workers {
        return Err(ConfigurationError::TooFewRecords { records: n, workers });
    }

    let step = n.div_ceil(workers);
    Ok((0..workers)
        .map(|rank| Section::new((rank * step).min(n), ((rank + 1) * step).min(n)))
        .collect())
}
