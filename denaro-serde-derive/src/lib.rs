//! Derive macros for the canonical Denaro wire format.
//!
//! The derived impls write and read struct fields in declaration order, which
//! is exactly the order the consensus encoding is defined in. Only structs are
//! supported; the handful of enums on the wire have hand-written impls.
extern crate proc_macro;
use proc_macro::TokenStream;

mod deserialize;
mod serialize;

#[proc_macro_derive(DenaroSerialize)]
pub fn serializable(input: TokenStream) -> TokenStream {
    let ast = syn::parse(input).unwrap();
    serialize::impl_serialize_macro(&ast)
}

#[proc_macro_derive(DenaroDeserialize)]
pub fn deserializable(input: TokenStream) -> TokenStream {
    let ast = syn::parse(input).unwrap();
    deserialize::impl_deserialize_macro(&ast)
}
