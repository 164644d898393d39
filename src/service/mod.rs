//! CrudEngine: create/read/update over any registered schema model.

use std::future::Future;
use std::pin::Pin;

mod crud;
mod resolver;
mod serializer;
mod validation;
pub use crud::CrudEngine;
pub use serializer::{Include, Serializer};
pub use validation::RequestValidator;

/// Boxed future for the recursive walks over nested relations.
pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
