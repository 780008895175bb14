//! Action types, validation (E), and dispatch (F).

pub mod dispatch;
pub mod types;
pub mod validate;

pub use dispatch::{ActionDispatcher, ActionHandler};
pub use types::{Action, ActionKind, ActionResult};
pub use validate::{ActionValidator, ValidationReport, ValidatorConfig};
