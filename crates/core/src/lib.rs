//! `agencyhub-core`: shared building blocks.
//!
//! Identifiers, the domain error model, and the clock abstraction. No IO lives
//! here.

pub mod clock;
pub mod error;
pub mod id;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{DomainError, DomainResult};
pub use id::{ContentId, TargetId, TenantId};
