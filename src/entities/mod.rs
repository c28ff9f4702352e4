pub mod bill;
pub mod bill_item;

pub use bill::{BillStatus, TransactionType};
