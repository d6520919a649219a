//! Procedural macros for flatdoc.
//!
//! # `Model`
//!
//! Derives [`flatdoc::document::Model`] for a struct with named fields.
//!
//! - **Container attribute**: `#[model(collection = "...")]` names the collection
//!   (defaults to the struct name)
//! - **Field attribute**: `#[model(id)]` marks the identity field (defaults to a field
//!   named `id`); the field must be a `flatdoc::identity::Identity`
//!
//! The identity field still needs `#[serde(rename = "_id")]` so documents store it under
//! the identity key.
//!
//! ```rust,ignore
//! use flatdoc::{Identity, Model};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Model)]
//! #[model(collection = "User")]
//! pub struct User {
//!     #[serde(rename = "_id")]
//!     #[model(id)]
//!     pub key: Identity,
//!     pub email: String,
//! }
//! ```

extern crate proc_macro;
mod model;

use proc_macro::TokenStream;
use syn::{Data, DeriveInput, parse_macro_input};

use crate::model::generate_model_for_struct;

#[proc_macro_derive(Model, attributes(model))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);

    let result = match ast.data {
        Data::Struct(ref data) => generate_model_for_struct(&ast, data),
        _ => Err(syn::Error::new_spanned(
            &ast.ident,
            "Model can only be derived for structs with named fields",
        )),
    };

    result
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}
