mod acquisition;
mod flock;
mod path;

pub use acquisition::{
    block, busy, deadline_blocked, ExclusiveResource, LockStrategy, ResourceGuard, TimeoutConfig,
};
pub use flock::FlockMutex;
pub use path::{derive_lock_path, get_lock_cache_dir, lock_file_name};
