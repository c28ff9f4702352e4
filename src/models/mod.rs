pub mod bill;
pub mod extraction;

pub use bill::{BillDownload, BillItemView, BillStats, BillView, BillWithItems, IngestedBill};
pub use extraction::{
    ExtractedBill, ExtractedItem, ExtractionResponse, ExtractionShapeError, Party,
};
