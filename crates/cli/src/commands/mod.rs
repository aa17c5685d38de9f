//! Command implementations.

mod extract;
mod output;
mod run;
mod validate;

pub use extract::run_extract;
pub use run::run_config;
pub use validate::run_validate;
