//! Command implementations.

mod info;
mod reconstruct;
mod run;
mod validate;

pub use info::run_info;
pub use reconstruct::run_reconstruct;
pub use run::run_pipeline;
pub use validate::run_validate;
