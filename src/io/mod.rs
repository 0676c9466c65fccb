//! Workbook adapters: [`excel_write`] produces supplier workbooks and
//! [`excel_read`] reads them back after structural verification.

pub mod excel_read;
pub mod excel_write;
