pub mod lbo;
pub mod scenarios;
