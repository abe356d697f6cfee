//! Parsing logic for the Entity and SqlEnum derive macros.
//!
//! Extracts struct-, field- and variant-level `#[rowgraph(...)]` attributes
//! into `EntityDef` / `EnumDef` structures used for code generation.

use proc_macro2::Span;
use quote::ToTokens;
use syn::ext::IdentExt;
use syn::{Attribute, Data, DeriveInput, Error, Field, Fields, Ident, LitStr, Result, Type};

/// Parsed entity definition from a struct with `#[derive(Entity)]`.
#[derive(Debug)]
pub struct EntityDef {
    /// The struct name.
    pub name: Ident,
    /// Name exposed as `Entity::ENTITY_NAME`.
    pub entity_name: String,
    pub fields: Vec<FieldDef>,
}

/// How a field takes part in materialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    Column,
    Relation,
    Skipped,
}

/// Parsed field definition.
#[derive(Debug)]
pub struct FieldDef {
    pub name: Ident,
    pub ty: Type,
    /// Alternate column name from `#[rowgraph(column = "...")]`.
    pub column: Option<String>,
    pub role: FieldRole,
    pub primary_key: bool,
}

impl FieldDef {
    /// Field name without a raw-identifier prefix.
    pub fn name_str(&self) -> String {
        self.name.unraw().to_string()
    }

    /// Type as written, whitespace removed.
    pub fn type_str(&self) -> String {
        normalized_type(&self.ty)
    }
}

impl EntityDef {
    /// The primary key field, if any.
    pub fn primary_key(&self) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.primary_key)
    }
}

/// Parsed enum definition from `#[derive(SqlEnum)]`.
#[derive(Debug)]
pub struct EnumDef {
    pub name: Ident,
    pub variants: Vec<VariantDef>,
}

#[derive(Debug)]
pub struct VariantDef {
    pub name: Ident,
    /// Alternate label from `#[rowgraph(description = "...")]`.
    pub description: Option<String>,
}

pub fn parse_entity(input: &DeriveInput) -> Result<EntityDef> {
    let name = input.ident.clone();

    if !input.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &input.generics,
            "Entity cannot be derived for generic structs",
        ));
    }

    let entity_name = parse_struct_attrs(&input.attrs)?.unwrap_or_else(|| name.to_string());

    let mut fields = match &input.data {
        Data::Struct(data) => parse_fields(&data.fields)?,
        Data::Enum(_) => {
            return Err(Error::new_spanned(
                input,
                "Entity can only be derived for structs, not enums",
            ));
        }
        Data::Union(_) => {
            return Err(Error::new_spanned(
                input,
                "Entity can only be derived for structs, not unions",
            ));
        }
    };

    let explicit: Vec<&FieldDef> = fields.iter().filter(|f| f.primary_key).collect();
    if explicit.len() > 1 {
        return Err(Error::new_spanned(
            &explicit[1].name,
            "only one field can be marked #[rowgraph(primary_key)]",
        ));
    }
    if let Some(pk) = explicit.first() {
        if pk.role != FieldRole::Column {
            return Err(Error::new_spanned(
                &pk.name,
                "primary_key field must be a column field",
            ));
        }
    } else if let Some(id) = fields
        .iter_mut()
        .find(|f| f.role == FieldRole::Column && f.name_str().eq_ignore_ascii_case("id"))
    {
        // Implicit primary key: a column field named `id`.
        id.primary_key = true;
    }

    Ok(EntityDef {
        name,
        entity_name,
        fields,
    })
}

/// Parse struct-level `#[rowgraph(name = "...")]`.
fn parse_struct_attrs(attrs: &[Attribute]) -> Result<Option<String>> {
    let mut entity_name = None;
    for attr in attrs {
        if !attr.path().is_ident("rowgraph") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let lit: LitStr = meta.value()?.parse()?;
                entity_name = Some(lit.value());
                Ok(())
            } else {
                Err(meta.error("unknown rowgraph struct attribute; expected `name`"))
            }
        })?;
    }
    Ok(entity_name)
}

fn parse_fields(fields: &Fields) -> Result<Vec<FieldDef>> {
    match fields {
        Fields::Named(named) => named.named.iter().map(parse_field).collect(),
        Fields::Unnamed(_) => Err(Error::new(
            Span::call_site(),
            "Entity requires a struct with named fields, not a tuple struct",
        )),
        Fields::Unit => Err(Error::new(
            Span::call_site(),
            "Entity requires a struct with fields, not a unit struct",
        )),
    }
}

fn parse_field(field: &Field) -> Result<FieldDef> {
    let name = field
        .ident
        .clone()
        .ok_or_else(|| Error::new_spanned(field, "expected named field"))?;

    let mut column = None;
    let mut primary_key = false;
    let mut skip = false;
    let mut relation = false;

    for attr in &field.attrs {
        if !attr.path().is_ident("rowgraph") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            let path = &meta.path;
            if path.is_ident("column") {
                let lit: LitStr = meta.value()?.parse()?;
                column = Some(lit.value());
            } else if path.is_ident("primary_key") {
                primary_key = true;
            } else if path.is_ident("skip") {
                skip = true;
            } else if path.is_ident("relation") {
                relation = true;
            } else {
                return Err(meta.error(
                    "unknown rowgraph field attribute; expected one of \
                     `column`, `primary_key`, `skip`, `relation`",
                ));
            }
            Ok(())
        })?;
    }

    if skip && relation {
        return Err(Error::new_spanned(
            &name,
            "a field cannot be both `skip` and `relation`",
        ));
    }

    let role = if skip {
        FieldRole::Skipped
    } else if relation || is_relation_type(&field.ty) {
        FieldRole::Relation
    } else {
        FieldRole::Column
    };

    Ok(FieldDef {
        name,
        ty: field.ty.clone(),
        column,
        role,
        primary_key,
    })
}

/// Whether a field type holds related entities rather than a column value.
///
/// Matches `Shared<..>` anywhere in the type (child lists such as
/// `Vec<Shared<T>>` or `Option<Vec<Shared<T>>>`), `ParentRef<..>`, and the
/// spelled-out `Arc<RwLock<..>>` form.
pub fn is_relation_type(ty: &Type) -> bool {
    let normalized = normalized_type(ty);
    normalized.starts_with("Shared<")
        || normalized.contains("<Shared<")
        || normalized.contains("::Shared<")
        || normalized.starts_with("ParentRef<")
        || normalized.contains("::ParentRef<")
        || normalized.contains("Arc<RwLock<")
        || normalized.contains("Arc<parking_lot::RwLock<")
}

fn normalized_type(ty: &Type) -> String {
    ty.to_token_stream().to_string().replace(' ', "")
}

pub fn parse_enum(input: &DeriveInput) -> Result<EnumDef> {
    let Data::Enum(data) = &input.data else {
        return Err(Error::new_spanned(
            input,
            "SqlEnum can only be derived for enums",
        ));
    };
    if !input.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &input.generics,
            "SqlEnum cannot be derived for generic enums",
        ));
    }

    let mut variants = Vec::with_capacity(data.variants.len());
    for variant in &data.variants {
        if !variant.fields.is_empty() {
            return Err(Error::new_spanned(
                variant,
                "SqlEnum variants must be unit variants (no fields)",
            ));
        }

        let mut description = None;
        for attr in &variant.attrs {
            if attr.path().is_ident("rowgraph") {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("description") {
                        let s: LitStr = meta.value()?.parse()?;
                        description = Some(s.value());
                        Ok(())
                    } else {
                        Err(meta.error("unknown rowgraph variant attribute; expected `description`"))
                    }
                })?;
            }
        }

        variants.push(VariantDef {
            name: variant.ident.clone(),
            description,
        });
    }

    Ok(EnumDef {
        name: input.ident.clone(),
        variants,
    })
}
