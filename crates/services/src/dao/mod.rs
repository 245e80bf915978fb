pub mod base;
pub mod credit;
pub mod memory;

pub use base::{DaoError, DaoResult};
pub use credit::{BatchRow, CreditBatch, CreditStore, GroupCreditBatch, MongoCreditStore, NewSegmentMatch};
pub use memory::MemoryCreditStore;
