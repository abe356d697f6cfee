//! Default link functions built from entity field metadata.
//!
//! When a relationship is registered without an explicit link function, one
//! is assembled from the two entity shapes: the parent's child-list field and
//! the child's back-reference field. Each is found by name first, then by
//! being the only field of the right type.

use crate::bucket::LinkFn;
use rowgraph_core::{ConfigErrorKind, Entity, Error, FieldInfo, ParentRef, Result, Shared};
use std::any::Any;
use std::sync::Arc;

/// Convert an entity name to snake_case (`ManagerItem` -> `manager_item`).
pub(crate) fn to_snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    let chars: Vec<char> = s.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                let prev = chars[i - 1];
                let next = chars.get(i + 1).copied();

                // New word after a lowercase letter, or the last capital of an
                // acronym that starts a new word ("HTTPServer" -> "http_server").
                let should_underscore = prev.is_lowercase()
                    || prev.is_ascii_digit()
                    || (prev.is_uppercase() && next.is_some_and(|n| n.is_lowercase()));

                if should_underscore {
                    result.push('_');
                }
            }
            result.extend(c.to_lowercase());
        } else {
            result.push(c);
        }
    }

    result
}

/// Default child-list field name: the child name in snake_case plus `s`.
pub(crate) fn default_child_list_field(child: &str) -> String {
    format!("{}s", to_snake_case(child))
}

/// Default back-reference field name: the parent name in snake_case.
pub(crate) fn default_parent_field(parent: &str) -> String {
    to_snake_case(parent)
}

/// Shape of the parent's child-list field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListSlot {
    /// `Vec<Shared<C>>`
    Plain,
    /// `Option<Vec<Shared<C>>>`, allocated on first link
    Lazy,
}

impl ListSlot {
    fn of<C: Entity>(field: &FieldInfo) -> Option<Self> {
        if field.is_type::<Vec<Shared<C>>>() {
            Some(ListSlot::Plain)
        } else if field.is_type::<Option<Vec<Shared<C>>>>() {
            Some(ListSlot::Lazy)
        } else {
            None
        }
    }

    fn push<C: Entity>(self, field: &mut dyn Any, child: Shared<C>) {
        match self {
            ListSlot::Plain => {
                if let Some(list) = field.downcast_mut::<Vec<Shared<C>>>() {
                    list.push(child);
                }
            }
            ListSlot::Lazy => {
                if let Some(list) = field.downcast_mut::<Option<Vec<Shared<C>>>>() {
                    list.get_or_insert_with(Vec::new).push(child);
                }
            }
        }
    }
}

/// Find a field on `owner` by name, or as the only field `accepts` admits.
fn locate_field(
    owner: &'static str,
    fields: &'static [FieldInfo],
    name: &str,
    wanted: &str,
    accepts: impl Fn(&FieldInfo) -> bool,
) -> Result<usize> {
    if let Some(index) = fields.iter().position(|f| f.name == name) {
        if accepts(&fields[index]) {
            return Ok(index);
        }
        return Err(Error::config(
            ConfigErrorKind::IncompatibleField,
            format!(
                "{}.{} is of type {} but {} was expected",
                owner, name, fields[index].rust_type, wanted
            ),
        ));
    }

    let mut candidates = fields
        .iter()
        .enumerate()
        .filter(|(_, f)| accepts(f))
        .map(|(i, _)| i);
    match (candidates.next(), candidates.next()) {
        (Some(index), None) => Ok(index),
        (Some(_), Some(_)) => Err(Error::config(
            ConfigErrorKind::AmbiguousField,
            format!(
                "found multiple fields of type {} on {}; cannot choose between them, \
                 name the field explicitly",
                wanted, owner
            ),
        )),
        (None, _) => Err(Error::config(
            ConfigErrorKind::MissingField,
            format!(
                "no field named {} or of type {} found on {}",
                name, wanted, owner
            ),
        )),
    }
}

/// Build the default link function for `P` -> `C`.
///
/// The returned function sets the child's back-reference and appends the
/// child to the parent's list. Calling it again for a child that already
/// points at the same parent does nothing.
pub(crate) fn synthesize_link<P: Entity, C: Entity>(
    child_list_field: Option<&str>,
    parent_field: Option<&str>,
) -> Result<LinkFn<P, C>> {
    let list_name =
        child_list_field.map_or_else(|| default_child_list_field(C::ENTITY_NAME), str::to_string);
    let list_index = locate_field(
        P::ENTITY_NAME,
        P::fields(),
        &list_name,
        &format!("Vec<Shared<{}>>", C::ENTITY_NAME),
        |f| ListSlot::of::<C>(f).is_some(),
    )?;
    let Some(slot) = ListSlot::of::<C>(&P::fields()[list_index]) else {
        return Err(Error::Custom(format!(
            "{}: child list field changed shape",
            P::ENTITY_NAME
        )));
    };

    let back_name = parent_field.map_or_else(|| default_parent_field(P::ENTITY_NAME), str::to_string);
    let back_index = locate_field(
        C::ENTITY_NAME,
        C::fields(),
        &back_name,
        &format!("ParentRef<{}>", P::ENTITY_NAME),
        |f| f.is_type::<ParentRef<P>>(),
    )?;

    tracing::trace!(
        parent = P::ENTITY_NAME,
        child = C::ENTITY_NAME,
        list_field = P::fields()[list_index].name,
        parent_field = C::fields()[back_index].name,
        "Synthesized link function"
    );

    Ok(Arc::new(move |parent: &Shared<P>, child: &Shared<C>| {
        {
            let mut child_guard = child.write();
            if let Some(back) = child_guard
                .field_any_mut(back_index)
                .and_then(|f| f.downcast_mut::<ParentRef<P>>())
            {
                if back.points_to(parent) {
                    return;
                }
                back.set(parent);
            }
        }
        let mut parent_guard = parent.write();
        if let Some(field) = parent_guard.field_any_mut(list_index) {
            slot.push(field, Arc::clone(child));
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowgraph_core::share;
    use rowgraph_macros::Entity;

    #[derive(Entity, Default)]
    struct Manager {
        id: i64,
        manager_items: Vec<Shared<ManagerItem>>,
    }

    #[derive(Entity, Default)]
    struct ManagerItem {
        id: i64,
        manager_id: i64,
        manager: ParentRef<Manager>,
    }

    #[derive(Entity, Default)]
    struct Team {
        id: i64,
        members: Option<Vec<Shared<Player>>>,
    }

    #[derive(Entity, Default)]
    struct Player {
        id: i64,
        squad: ParentRef<Team>,
    }

    #[derive(Entity, Default)]
    struct TwoLists {
        id: i64,
        first: Vec<Shared<Player>>,
        second: Vec<Shared<Player>>,
    }

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("Manager"), "manager");
        assert_eq!(to_snake_case("ManagerItem"), "manager_item");
        assert_eq!(to_snake_case("HTTPServer"), "http_server");
        assert_eq!(to_snake_case("Item2Detail"), "item2_detail");
        assert_eq!(default_child_list_field("ManagerItem"), "manager_items");
        assert_eq!(default_parent_field("Manager"), "manager");
    }

    #[test]
    fn test_default_names_link_both_sides() {
        let link = synthesize_link::<Manager, ManagerItem>(None, None).unwrap();
        let manager = share(Manager {
            id: 1,
            ..Manager::default()
        });
        let item = share(ManagerItem::default());

        link(&manager, &item);
        link(&manager, &item);

        assert_eq!(manager.read().manager_items.len(), 1);
        assert!(Arc::ptr_eq(&manager.read().manager_items[0], &item));
        assert!(item.read().manager.points_to(&manager));
    }

    #[test]
    fn test_structural_match_and_lazy_list() {
        let link = synthesize_link::<Team, Player>(None, None).unwrap();
        let team = share(Team::default());
        assert!(team.read().members.is_none());

        let a = share(Player::default());
        let b = share(Player::default());
        link(&team, &a);
        link(&team, &b);

        let team_ref = team.read();
        let members = team_ref.members.as_ref().unwrap();
        assert_eq!(members.len(), 2);
        assert!(Arc::ptr_eq(&members[1], &b));
        assert!(a.read().squad.points_to(&team));
    }

    #[test]
    fn test_ambiguous_list_field() {
        let Err(err) = synthesize_link::<TwoLists, Player>(None, Some("squad")) else {
            panic!("expected an ambiguity error");
        };
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::AmbiguousField));

        // Naming the list resolves it; the back-reference is then looked up
        // and Player has none pointing at TwoLists.
        let Err(err) = synthesize_link::<TwoLists, Player>(Some("second"), None) else {
            panic!("expected a missing back-reference");
        };
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::MissingField));
        assert!(err.to_string().contains("ParentRef<TwoLists>"));
    }

    #[test]
    fn test_missing_and_incompatible_fields() {
        let Err(missing) = synthesize_link::<Manager, Player>(None, None) else {
            panic!("expected a missing-field error");
        };
        assert_eq!(missing.config_kind(), Some(ConfigErrorKind::MissingField));
        assert!(missing.to_string().contains("Manager"));

        let Err(wrong) = synthesize_link::<Manager, ManagerItem>(Some("id"), None) else {
            panic!("expected an incompatible-field error");
        };
        assert_eq!(wrong.config_kind(), Some(ConfigErrorKind::IncompatibleField));
        assert!(wrong.to_string().contains("Manager.id"));
    }
}
