pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use record::{Record, RecordError};
pub use store::{FindOptions, Session, Store, StoreError, StoredDocument};
