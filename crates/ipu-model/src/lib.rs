//! IPU Message Models
//!
//! Typed records exchanged between upgrade actors.
//!
//! # Core Concepts
//!
//! - [`Model`]: Trait for Rust types that travel over the message bus
//! - [`ModelSchema`]: Declared fields and topic of a message type
//! - [`ModelRegistry`]: Validated set of known schemas
//! - [`Message`]: A produced, immutable record on the bus
//! - [`Report`]: Structured finding; the `inhibitor` group gates the workflow
//! - [`Tag`]: Capability marker matching actors to workflows and phases
//!
//! # Example
//!
//! ```rust,ignore
//! use ipu_model::{Field, FieldKind, Model};
//!
//! #[derive(Serialize, Deserialize)]
//! struct OsInfo { version: String }
//!
//! impl Model for OsInfo {
//!     const NAME: &'static str = "OSInfo";
//!     const TOPIC: &'static str = "SystemInfoTopic";
//!
//!     fn fields() -> Vec<Field> {
//!         vec![Field::required("version", FieldKind::String)]
//!     }
//! }
//! ```

mod error;
mod message;
mod model;
mod registry;
mod report;
mod schema;
mod tag;

pub use error::ModelError;
pub use message::{Message, MessageType, Topic};
pub use model::Model;
pub use registry::ModelRegistry;
pub use report::{Group, Report, Severity};
pub use schema::{Field, FieldKind, ModelSchema};
pub use tag::Tag;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
