pub mod credit_metrics;
pub mod debt_schedule;
pub mod lbo;
pub mod projection;
pub mod returns;
pub mod sources_uses;
pub mod waterfall;
