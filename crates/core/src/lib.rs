//! Building blocks shared by the domain crates: identifiers, money, the aggregate
//! traits and the domain error. No IO.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, OperatorId};
pub use value_object::{Money, ValueObject};
