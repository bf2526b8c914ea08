pub mod cover_letter;
pub mod job;
pub mod resume;
pub mod user;
