//! Restmap Config
//!
//! This crate contains the serializable template types for restmap. These
//! types describe endpoints, parameters, resolvers and outputs exactly as the
//! user wrote them: every cross-reference is still a name, and every `kind`
//! is still a raw string. The resolver turns them into a typed graph.
//!
//! Templates can be loaded from:
//! - YAML files (`.yaml`, `.yml`, or no extension)
//! - JSON files (`.json`)

mod declarations;
mod error;
mod load;
mod template;

pub use declarations::{EndpointDef, OutputDef, ParamDef, ParamRef, ResolverDef};
pub use error::ParseError;
pub use load::{TemplateFormat, load_template};
pub use template::{ConfigDef, Metadata, TemplateDef};
