//! Survey data model for the quantab engine
//!
//! This crate defines the entity model (types, instances, value
//! combinations), response field descriptors, raw response records, the
//! polymorphic variable definition/component model and the collaborator
//! traits through which the engine consumes the field catalog and the
//! entity repository.

mod entity;
mod field;
mod repository;
mod response;
mod variable;

pub use entity::*;
pub use field::*;
pub use repository::*;
pub use response::*;
pub use variable::*;
