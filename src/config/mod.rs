//! Configuration binding subsystem.
//!
//! # Data Flow
//! ```text
//! component tree
//!     → Binder walks leaf fields (value.rs, options.rs)
//!     → names derived from the field path (naming.rs)
//!     → flag > environment (env.rs) > declared default
//!     → Bindings (binding.rs) for help, listings and manifests
//! ```
//!
//! # Design Decisions
//! - Components describe their own fields through `Component::walk`
//! - Defaults live on the component (`Defaulter`) or on the field options
//! - Secret values are masked before they ever reach a `Binding`

pub mod binder;
pub mod binding;
pub mod env;
pub mod naming;
pub mod options;
pub mod value;

pub use binder::{Binder, Sources};
pub use binding::{ArgSpec, Binding, Bindings};
pub use env::EnvVars;
pub use options::FieldOptions;
pub use value::{FieldValue, TextValue};
