pub mod donations;
pub mod receipts;
pub mod reports;
