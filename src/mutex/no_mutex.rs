use crate::error::Result;
use crate::mutex::Mutex;

/// A mutex that never locks anything.
///
/// Stands in where the [`Mutex`] contract is required but no exclusion is,
/// e.g. single-process setups and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMutex;

impl Mutex for NoMutex {
    type Guard = ();

    fn acquire(&self) -> Result<()> {
        Ok(())
    }

    fn release(&self, _guard: ()) -> Result<()> {
        Ok(())
    }
}
