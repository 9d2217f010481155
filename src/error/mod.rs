mod types;

pub use types::{CodeResult, LockError, Result, TimeoutError};

// Re-export for convenience
pub use LockError as Error;
