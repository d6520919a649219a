use proc_macro2::TokenStream;
use quote::quote;
use syn::{DataStruct, DeriveInput, Fields, Ident, LitStr, Result};

pub(crate) fn generate_model_for_struct(ast: &DeriveInput, data: &DataStruct) -> Result<TokenStream> {
    let name = &ast.ident;
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();

    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new_spanned(
            name,
            "Model can only be derived for structs with named fields",
        ));
    };

    let mut collection = name.to_string();
    for attr in &ast.attrs {
        if attr.path().is_ident("model") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("collection") {
                    let value: LitStr = meta.value()?.parse()?;
                    if value.value().is_empty() {
                        return Err(meta.error("collection name must not be empty"));
                    }
                    collection = value.value();
                    Ok(())
                } else {
                    Err(meta.error("Unknown model attribute"))
                }
            })?;
        }
    }

    let mut id_field: Option<&Ident> = None;
    for field in &fields.named {
        for attr in &field.attrs {
            if attr.path().is_ident("model") {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("id") {
                        if id_field.is_some() {
                            return Err(meta.error("Multiple id fields are not allowed"));
                        }
                        id_field = field.ident.as_ref();
                        Ok(())
                    } else {
                        Err(meta.error("Unknown model field attribute"))
                    }
                })?;
            }
        }
    }

    let id_field = match id_field {
        Some(ident) => ident,
        None => fields
            .named
            .iter()
            .filter_map(|field| field.ident.as_ref())
            .find(|ident| *ident == "id")
            .ok_or_else(|| {
                syn::Error::new_spanned(
                    name,
                    "Model needs an identity field: mark one with #[model(id)] or name it `id`",
                )
            })?,
    };

    Ok(quote! {
        impl #impl_generics ::flatdoc::document::Model for #name #ty_generics #where_clause {
            fn id(&self) -> &::flatdoc::identity::Identity {
                &self.#id_field
            }

            fn collection_name() -> &'static str {
                #collection
            }
        }
    })
}
