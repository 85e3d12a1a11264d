//! Schema binding for rustyhdf5 stores.
//!
//! Declare the shape of an object (fields with element type, rank, extent
//! and metadata) and bind it onto a group of an [`ObjectStore`]. Nodes that
//! exist are opened, missing ones are created, and each field comes back as
//! a typed, resizable [`Dataset`] view backed by the store.
//!
//! ```text
//! Container ─► root Group ─► BindingEngine ─► BoundObject
//!                                               ├─ Dataset<T, R> per field
//!                                               └─ Attribute per binding
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use rustyhdf5_bind::{
//!     AttributeBinding, BindingEngine, Container, FieldOptions, NativeStore, OpenMode, Schema,
//! };
//!
//! let store = Arc::new(NativeStore::volatile());
//! let file = Container::open(store, "weather", OpenMode::CreateExclusive).unwrap();
//!
//! let mut b = Schema::builder();
//! let temps = b.field::<f64, 2>("temperature", FieldOptions::new().shape(&[200, 5]));
//! let names = b.field::<String, 1>("names", FieldOptions::new().shape(&[5]));
//! b.attribute(AttributeBinding::new("counter").with_default(42i32));
//! let schema = b.build().unwrap();
//!
//! let bound = BindingEngine::default().bind(&schema, file.root()).unwrap();
//! let names = bound.get(&names).unwrap();
//! names.set(1, "Chicago".to_string()).unwrap();
//! assert_eq!(names.get(1).unwrap(), "Chicago");
//! assert_eq!(bound.get(&temps).unwrap().row(0).unwrap().len(), 5);
//! assert_eq!(bound.attribute("counter").unwrap().read::<i32>().unwrap(), 42);
//! ```

pub mod attribute;
pub mod binding;
pub mod config;
pub mod container;
pub mod dataset;
pub mod error;
pub mod extent;
pub mod group;
pub mod handle;
#[cfg(feature = "async")]
pub mod offload;
pub mod schema;
pub mod selector;
pub mod types;

pub use attribute::{Attribute, AttributeOwner};
pub use binding::{BindState, BindingEngine, BoundObject};
pub use config::{BindConfig, MissingPolicy};
pub use container::Container;
pub use dataset::{Dataset, Dataset1, Dataset2, Dataset3, DatasetHandle};
pub use error::{Error, Result};
pub use extent::Extent;
pub use group::{Child, Group, Subgroups};
pub use handle::{live_handles, Handle, HandleKind};
#[cfg(feature = "async")]
pub use offload::offload;
pub use schema::{AttributeBinding, FieldDescriptor, FieldKey, FieldOptions, Schema, SchemaBuilder};
pub use selector::Selector;
pub use types::{AttrValue, Element, ElementType};

pub use rustyhdf5_store::{NativeStore, ObjectStore, OpenMode, UNLIMITED};
