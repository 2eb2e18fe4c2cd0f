pub mod fanout;
pub mod input;
pub mod report;
pub mod single;
pub mod tophat2;
