//! Procedural macros for rowgraph.
//!
//! - `#[derive(Entity)]` describes a struct's fields so rows can be
//!   materialized into it and relation fields can be located by name or type
//! - `#[derive(SqlEnum)]` parses an enum from integer or string column values

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{DeriveInput, parse_macro_input};

mod parse;

use parse::{EntityDef, EnumDef, FieldRole, parse_entity, parse_enum};

/// Derive the `Entity` trait for a struct.
///
/// # Attributes
///
/// Struct-level:
/// - `#[rowgraph(name = "...")]`: entity name used for default column names
///
/// Field-level:
/// - `#[rowgraph(column = "...")]`: alternate column name
/// - `#[rowgraph(primary_key)]`: parent key for primary-key relations
///   (a column field named `id` is used when none is marked)
/// - `#[rowgraph(skip)]`: never bound to a column
/// - `#[rowgraph(relation)]`: hold related entities; implied for
///   `Shared<..>` and `ParentRef<..>` types
///
/// # Example
///
/// ```ignore
/// #[derive(Entity, Default)]
/// struct ManagerItem {
///     id: i64,
///     #[rowgraph(column = "ManagerId")]
///     manager_id: i64,
///     manager: ParentRef<Manager>,
/// }
/// ```
#[proc_macro_derive(Entity, attributes(rowgraph))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let def = match parse_entity(&input) {
        Ok(def) => def,
        Err(e) => return e.to_compile_error().into(),
    };

    generate_entity_impl(&def).into()
}

fn generate_entity_impl(def: &EntityDef) -> TokenStream2 {
    let name = &def.name;
    let entity_name = &def.entity_name;

    let field_infos = def.fields.iter().map(|f| {
        let field_name = f.name_str();
        let type_str = f.type_str();
        let ty = &f.ty;
        let column = f.column.as_ref().map(|c| quote! { .column(#c) });
        let kind = match f.role {
            FieldRole::Column => quote! { rowgraph_core::FieldKind::Column },
            FieldRole::Relation => quote! { rowgraph_core::FieldKind::Relation },
            FieldRole::Skipped => quote! { rowgraph_core::FieldKind::Skipped },
        };
        let primary_key = f.primary_key;
        quote! {
            rowgraph_core::FieldInfo::new(
                #field_name,
                #type_str,
                ::std::any::TypeId::of::<#ty>,
            )
            #column
            .kind(#kind)
            .primary_key(#primary_key)
        }
    });

    let set_arms = def
        .fields
        .iter()
        .enumerate()
        .filter(|(_, f)| f.role == FieldRole::Column)
        .map(|(idx, f)| {
            let ident = &f.name;
            let ty = &f.ty;
            quote! {
                #idx => {
                    self.#ident = <#ty as rowgraph_core::FromValue>::from_value(value)?;
                    Ok(())
                }
            }
        });

    let any_arms = def.fields.iter().enumerate().map(|(idx, f)| {
        let ident = &f.name;
        quote! {
            #idx => Some(&mut self.#ident as &mut dyn ::std::any::Any),
        }
    });

    let primary_key_fn = def.primary_key().map(|pk| {
        let ident = &pk.name;
        quote! {
            fn primary_key_value(&self) -> Option<rowgraph_core::Value> {
                Some(rowgraph_core::Value::from(
                    ::core::clone::Clone::clone(&self.#ident),
                ))
            }
        }
    });

    quote! {
        impl rowgraph_core::Entity for #name {
            const ENTITY_NAME: &'static str = #entity_name;

            fn fields() -> &'static [rowgraph_core::FieldInfo] {
                static FIELDS: &[rowgraph_core::FieldInfo] = &[
                    #(#field_infos),*
                ];
                FIELDS
            }

            #[allow(unused_variables)]
            fn set_column(
                &mut self,
                field: usize,
                value: &rowgraph_core::Value,
            ) -> rowgraph_core::Result<()> {
                match field {
                    #(#set_arms)*
                    _ => Err(rowgraph_core::Error::Custom(format!(
                        "{}: field index {} is not a column field",
                        #entity_name, field
                    ))),
                }
            }

            fn field_any_mut(&mut self, field: usize) -> Option<&mut dyn ::std::any::Any> {
                match field {
                    #(#any_arms)*
                    _ => None,
                }
            }

            #primary_key_fn
        }
    }
}

/// Derive `SqlEnum` and `FromValue` for a fieldless enum.
///
/// Values are matched by integer discriminant, then by variant name
/// (ignoring ASCII case), then by `#[rowgraph(description = "...")]`.
///
/// ```ignore
/// #[derive(SqlEnum, Default)]
/// enum Status {
///     #[default]
///     Active,
///     #[rowgraph(description = "On leave")]
///     Away = 5,
/// }
/// ```
#[proc_macro_derive(SqlEnum, attributes(rowgraph))]
pub fn derive_sql_enum(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let def = match parse_enum(&input) {
        Ok(def) => def,
        Err(e) => return e.to_compile_error().into(),
    };

    generate_sql_enum_impl(&def).into()
}

fn generate_sql_enum_impl(def: &EnumDef) -> TokenStream2 {
    let name = &def.name;
    let type_name = name.to_string();
    let variant_names: Vec<String> = def.variants.iter().map(|v| v.name.to_string()).collect();

    let discriminant_checks = def.variants.iter().map(|v| {
        let ident = &v.name;
        quote! {
            if value == (#name::#ident as i64) {
                return Some(#name::#ident);
            }
        }
    });

    let label_checks = def.variants.iter().map(|v| {
        let ident = &v.name;
        let label = ident.to_string();
        let description = v
            .description
            .as_ref()
            .map(|d| quote! { || text.eq_ignore_ascii_case(#d) });
        quote! {
            if text.eq_ignore_ascii_case(#label) #description {
                return Some(#name::#ident);
            }
        }
    });

    quote! {
        impl rowgraph_core::SqlEnum for #name {
            const VARIANTS: &'static [&'static str] = &[#(#variant_names),*];
            const TYPE_NAME: &'static str = #type_name;

            fn from_discriminant(value: i64) -> Option<Self> {
                #(#discriminant_checks)*
                None
            }

            fn from_label(text: &str) -> Option<Self> {
                #(#label_checks)*
                None
            }
        }

        impl rowgraph_core::FromValue for #name {
            fn from_value(value: &rowgraph_core::Value) -> rowgraph_core::Result<Self> {
                rowgraph_core::parse_sql_enum(value)
            }
        }
    }
}
