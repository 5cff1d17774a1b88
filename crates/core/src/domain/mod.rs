pub mod bar;
pub mod signal;
pub mod ticker;
