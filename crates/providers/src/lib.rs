//! Text generation backends for RustScout.
//!
//! All backends implement the `rustscout_core::Generator` trait.
//! [`build_from_config`] picks one based on configuration.

pub mod completion;
#[cfg(feature = "local")]
pub mod local;
pub mod router;

pub use completion::CompletionServerGenerator;
#[cfg(feature = "local")]
pub use local::{LocalGenerator, LocalModelOptions};
pub use router::build_from_config;
