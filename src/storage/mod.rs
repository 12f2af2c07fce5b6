pub mod file;
pub mod kv;
pub mod memory;
pub mod status;

pub use file::FileKvStore;
pub use kv::{KvStore, StoreError};
pub use memory::MemoryKvStore;
pub use status::{
    LoadedStatus, StatusStore, Transition, LAST_RUN_TIMESTAMP_KEY, RENEWAL_EMAIL_KEY,
    STATUS_KEY_PREFIX,
};
