//! # larix-view
//!
//! Blade-style templates for larix. Sources are compiled to tera by
//! [`TemplateCompiler`], cached in a [`TemplateCache`] and rendered by the
//! [`ViewEngine`]; the [`ViewFactory`] adds shared data, composers and
//! request context on top.

pub mod cache;
pub mod compiler;
pub mod components;
pub mod engine;
pub mod error;
pub mod factory;

pub use cache::TemplateCache;
pub use compiler::{template_name, translate_expression, TemplateCompiler};
pub use components::{Component, ComponentRegistry, Props, Slot, TemplateComponent};
pub use engine::{UrlGenerator, ViewConfig, ViewEngine};
pub use error::{ViewError, ViewResult};
pub use factory::{View, ViewAuth, ViewFactory};
pub use tera::Context;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
