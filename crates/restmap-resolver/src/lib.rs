mod declaration;
mod error;
mod resolver;

pub use declaration::Category;
pub use error::ResolutionError;
pub use resolver::{Resolver, StandardResolver};
