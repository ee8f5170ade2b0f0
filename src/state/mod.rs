mod interface;
pub mod models;

pub use interface::{StateInterface, TRIAL_INSERT_BATCH};
