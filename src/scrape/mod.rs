pub mod discover;
pub mod extract;
pub mod fetch;
