//! Persistence seams. Import planning only needs [`RecordLookup`]; applying
//! mutations and the CLI use the full [`ToolingStore`].

pub mod schema;
pub mod sqlite;

use crate::error::Result;
use crate::model::{ToolingId, ToolingRecord, same_supplier};

pub use schema::SchemaState;
pub use sqlite::SqliteStore;

/// Finds a stored record that belongs to a supplier.
pub trait RecordLookup {
    fn find_for_supplier(&self, id: ToolingId, supplier: &str) -> Result<Option<ToolingRecord>>;
}

/// Storage of tooling records and per-supplier metadata.
pub trait ToolingStore: RecordLookup {
    /// Inserts a record and returns the id storage assigned to it.
    fn insert(&self, record: &ToolingRecord) -> Result<ToolingId>;
    fn update(&self, record: &ToolingRecord) -> Result<()>;
    fn get(&self, id: ToolingId) -> Result<Option<ToolingRecord>>;
    fn list_for_supplier(&self, supplier: &str) -> Result<Vec<ToolingRecord>>;
    fn last_import(&self, supplier: &str) -> Result<Option<String>>;
    fn record_import(&self, supplier: &str, timestamp: &str) -> Result<()>;
}

impl RecordLookup for [ToolingRecord] {
    fn find_for_supplier(&self, id: ToolingId, supplier: &str) -> Result<Option<ToolingRecord>> {
        Ok(self
            .iter()
            .find(|record| record.id == id && same_supplier(&record.supplier, supplier))
            .cloned())
    }
}

impl RecordLookup for Vec<ToolingRecord> {
    fn find_for_supplier(&self, id: ToolingId, supplier: &str) -> Result<Option<ToolingRecord>> {
        self.as_slice().find_for_supplier(id, supplier)
    }
}
