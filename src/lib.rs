pub mod adapt;
pub mod conversion;
pub mod format;
