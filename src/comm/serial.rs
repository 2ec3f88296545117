use crate::error::CollectiveError;

use super::Communicator;

/// Single-rank communicator for serial runs and unit tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialComm;

impl Communicator for SerialComm {
    #[inline] fn rank(&self) -> usize { 0 }

    #[inline] fn size(&self) -> usize { 1 }

    fn scatter<T: Send + 'static>(&self, values: Option<Vec<T>>) -> Result<T, CollectiveError> {
        let mut values = values.unwrap_or_default();
        if values.len() != 1 {
            return Err(CollectiveError::ScatterLength { expected: 1, found: values.len() });
        }
        Ok(values.remove(0))
    }

    fn gather<T: Send + 'static>(&self, value: T) -> Result<Option<Vec<T>>, CollectiveError> {
        Ok(Some(vec![value]))
    }

    fn barrier(&self) -> Result<(), CollectiveError> { Ok(()) }
}
