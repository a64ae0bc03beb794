use proc_macro::TokenStream;
use quote::quote;

pub fn impl_deserialize_macro(ast: &syn::DeriveInput) -> TokenStream {
    let name = ast.ident.clone();
    let data = match ast.data {
        syn::Data::Struct(ref data) => data,
        _ => panic!("DenaroDeserialize can only be derived for structs"),
    };
    let is_tuple_struct = matches!(data.fields, syn::Fields::Unnamed(_));

    let statements: Vec<_> = data.fields.iter().map(deserialize_field).collect();

    let expanded = if is_tuple_struct {
        quote! {
            impl DenaroDeserialize for #name {
                fn denaro_deserialize<R: std::io::Read>(mut target: R) -> Result<Self, SerializationError>
                {
                    Ok(#name (
                        #(#statements)*
                    ))
                }
            }
        }
    } else {
        quote! {
            impl DenaroDeserialize for #name {
                fn denaro_deserialize<R: std::io::Read>(mut target: R) -> Result<Self, SerializationError>
                {
                    Ok(#name {
                        #(#statements)*
                    })
                }
            }
        }
    };

    TokenStream::from(expanded)
}

fn deserialize_field(field: &syn::Field) -> quote::__private::TokenStream {
    let ty = field.ty.clone();
    match field.ident.clone() {
        Some(name) => {
            quote! { #name: <#ty as DenaroDeserialize>::denaro_deserialize(&mut target)?, }
        }
        None => quote! { <#ty as DenaroDeserialize>::denaro_deserialize(&mut target)?, },
    }
}
