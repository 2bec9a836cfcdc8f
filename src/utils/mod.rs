pub mod jsonic;
pub mod template;
