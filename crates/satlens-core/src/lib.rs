pub mod accelerate;
pub mod broadcast;
pub mod classify;
pub mod confirm;
pub mod enrich;
pub mod error;
pub mod guard;
pub mod price;
pub mod session;
pub mod source;
pub mod types;

#[cfg(test)]
pub(crate) mod test_util;

pub use error::CoreError;
pub use session::{Selected, Session, SessionRegistry};
