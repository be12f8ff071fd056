pub mod import;
pub mod scrape;
pub mod status;
