pub mod command;
pub mod file;
pub mod summary;
pub mod system;
