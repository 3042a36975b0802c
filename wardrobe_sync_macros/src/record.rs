use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Ident, LitStr};

enum KeyField {
    /// `id: String`, server-assigned; the record can carry a placeholder.
    Id(Ident),
    /// Field marked `#[record(key)]`; never rewritten by the engine.
    Natural(Ident),
}

pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let collection = match collection_attr(input)? {
        Some(collection) => collection,
        None => default_collection(name),
    };

    let record_impl = |field: &Ident| {
        quote! {
            impl wardrobe_sync::Record for #name {
                const COLLECTION: &'static str = #collection;

                fn key(&self) -> &str {
                    &self.#field
                }
            }
        }
    };

    Ok(match key_field(input)? {
        KeyField::Id(field) => {
            let record = record_impl(&field);
            quote! {
                #record

                impl wardrobe_sync::Identified for #name {
                    fn assign_id(&mut self, id: String) {
                        self.#field = id;
                    }
                }
            }
        }
        KeyField::Natural(field) => record_impl(&field),
    })
}

/// `#[record(collection = "...")]` on the struct. Any other key is an error.
fn collection_attr(input: &DeriveInput) -> syn::Result<Option<String>> {
    let mut collection = None;
    for attr in input.attrs.iter().filter(|a| a.path().is_ident("record")) {
        attr.parse_nested_meta(|meta| {
            if !meta.path.is_ident("collection") {
                return Err(meta.error("unsupported record attribute, expected `collection`"));
            }
            if collection.is_some() {
                return Err(meta.error("`collection` given more than once"));
            }
            let value: LitStr = meta.value()?.parse()?;
            collection = Some(value.value());
            Ok(())
        })?;
    }
    Ok(collection)
}

/// `TripPlan` -> `trip_plans`.
fn default_collection(ident: &Ident) -> String {
    let name = ident.to_string();
    let mut words: Vec<String> = Vec::new();
    for ch in name.chars() {
        if ch.is_uppercase() || words.is_empty() {
            words.push(ch.to_lowercase().collect());
        } else if let Some(word) = words.last_mut() {
            word.push(ch);
        }
    }
    words.join("_") + "s"
}

fn key_field(input: &DeriveInput) -> syn::Result<KeyField> {
    let Data::Struct(data_struct) = &input.data else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "Record derive: only structs with named fields are supported",
        ));
    };
    let Fields::Named(fields) = &data_struct.fields else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "Record derive: only structs with named fields are supported",
        ));
    };

    for field in &fields.named {
        for attr in &field.attrs {
            if !attr.path().is_ident("record") {
                continue;
            }
            let mut is_key = false;
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("key") {
                    is_key = true;
                    Ok(())
                } else {
                    Err(meta.error("unsupported field attribute, expected `key`"))
                }
            })?;
            if is_key {
                if let Some(ident) = &field.ident {
                    return Ok(KeyField::Natural(ident.clone()));
                }
            }
        }
    }

    fields
        .named
        .iter()
        .filter_map(|field| field.ident.as_ref())
        .find(|ident| *ident == "id")
        .map(|ident| KeyField::Id(ident.clone()))
        .ok_or_else(|| {
            syn::Error::new_spanned(
                &input.ident,
                "Record derive: no field marked with #[record(key)] and no field named `id`",
            )
        })
}
