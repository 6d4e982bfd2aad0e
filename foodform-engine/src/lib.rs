//! # Foodform Engine
//!
//! Field fill & provenance reconciliation for a nutrition-record form.
//!
//! **Pipeline:**
//! 1. Scan output for an image enters the [`aggregator`] and becomes
//!    per-attribute candidates (two-column labels wait for a column choice)
//! 2. The [`session`] auto-fills fields that accept machine values
//! 3. [`options`] computes the value-distinct alternatives a field can offer
//! 4. User actions (accept, type, discard, remove barcode) change fills;
//!    [`images`] then prunes images no field can reach
//!
//! Recognition, crop rendering and prefill lookup are collaborators
//! ([`collaborators`]); the [`actor`] runs them as tasks that report back to
//! the single task owning the session.

pub mod actor;
pub mod aggregator;
pub mod collaborators;
pub mod error;
pub mod field;
pub mod fill;
pub mod images;
pub mod options;
pub mod prefill;
pub mod replay;
pub mod scan;
pub mod session;
pub mod snapshot;
pub mod types;
pub mod validation;
pub mod value;

pub use actor::{Collaborators, SessionHandle};
pub use error::{EngineError, EngineResult};
pub use field::Field;
pub use fill::Fill;
pub use session::FormSession;
pub use types::{Attribute, FieldId, ImageId};
pub use value::FieldValue;
