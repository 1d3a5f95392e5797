//! Steps, transactions and the mappings they produce.

mod mapping;
mod step;
mod transaction;

pub use mapping::{Bias, MapRange, MapResult, Mapping, StepMap};
pub use step::{Step, StepResult};
pub use transaction::{APPENDED_META, Transaction};
