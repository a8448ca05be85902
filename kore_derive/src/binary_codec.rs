//! Derive macro for automatic binary serialization.
//!
//! Generates `Encode` and `Decode` implementations for structs, targeting the
//! traits in `crate::types::encoding` of the kore crate. Fields are written in
//! declaration order.
//!
//! Enums and unions are rejected; the module format has no tagged records.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, parse_macro_input};

pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let result = match &input.data {
        Data::Struct(data_struct) => Ok(struct_impl(&input, &data_struct.fields)),
        Data::Enum(_) | Data::Union(_) => Err(syn::Error::new_spanned(
            &input,
            "BinaryCodec derive only supports structs",
        )),
    };

    match result {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Wraps encode/decode bodies into the two trait impls.
fn wrap_impls(input: &DeriveInput, encode_body: TokenStream2, decode_body: TokenStream2) -> TokenStream2 {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    quote! {
        impl #impl_generics crate::types::encoding::Encode for #name #ty_generics #where_clause {
            #[allow(unused_variables)]
            fn encode<S: crate::types::encoding::EncodeSink>(&self, out: &mut S) {
                #encode_body
            }
        }

        impl #impl_generics crate::types::encoding::Decode for #name #ty_generics #where_clause {
            #[allow(unused_variables)]
            fn decode(input: &mut &[u8]) -> ::std::result::Result<Self, crate::types::encoding::DecodeError> {
                #decode_body
            }
        }
    }
}

fn struct_impl(input: &DeriveInput, fields: &Fields) -> TokenStream2 {
    let (encode_body, decode_body) = match fields {
        Fields::Named(named) => {
            let names: Vec<_> = named.named.iter().map(|f| &f.ident).collect();
            (
                quote! { #( crate::types::encoding::Encode::encode(&self.#names, out); )* },
                quote! { Ok(Self { #( #names: crate::types::encoding::Decode::decode(input)?, )* }) },
            )
        }
        Fields::Unnamed(unnamed) => {
            let indices: Vec<_> = (0..unnamed.unnamed.len()).map(syn::Index::from).collect();
            let decodes = indices
                .iter()
                .map(|_| quote! { crate::types::encoding::Decode::decode(input)?, });
            (
                quote! { #( crate::types::encoding::Encode::encode(&self.#indices, out); )* },
                quote! { Ok(Self( #(#decodes)* )) },
            )
        }
        Fields::Unit => (quote! {}, quote! { Ok(Self) }),
    };

    wrap_impls(input, encode_body, decode_body)
}
