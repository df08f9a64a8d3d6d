//! JSON Form WASM API
//!
//! This module provides the JavaScript-facing API of the form engine.
//! It includes shared utilities for serialization, error conversion and
//! console logging, the browser presentation substrate, and the `JsonForm`
//! class wrapping a form session.
//!
//! # Module Structure
//!
//! - `helpers`: Shared utilities for serialization, error handling, and logging
//! - `dom`: `DomPresenter`, the `web-sys` implementation of `Presenter`
//! - `form`: The `JsonForm` class (build, render, values, arrays, validate, submit)

pub mod helpers;
pub mod dom;
pub mod form;

pub use dom::DomPresenter;
pub use form::JsonForm;
