pub mod config;
pub mod error;
pub mod types;

pub use error::{ParcryptError, ParcryptResult};
pub use types::Direction;
