//! Combining caller parameters with per-operation defaults
//!
//! Caller values always win. Merging is shallow: a nested set supplied by the
//! caller replaces the default nested set wholesale, unless the operation
//! merges that sub-object on its own via [`merge_sub_object`].

use serde::Deserialize;

use crate::value::{ParameterSet, Value};

/// How an operation applies its defaults tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergePolicy {
    /// Defaults and caller keys share the top level of the request
    #[default]
    Shallow,
    /// Each sub-object (`Ticket`, `Article`) is merged against its own table
    PerSubObject,
}

/// Every key of `defaults` and `overrides`, the override winning on collision.
///
/// Default keys keep their position; keys only present in `overrides` follow
/// in their own order.
pub fn merge(defaults: &ParameterSet, overrides: &ParameterSet) -> ParameterSet {
    let mut out = defaults.clone();
    for (key, value) in overrides {
        out.insert(key.clone(), value.clone());
    }
    out
}

/// Merge the `key` sub-object of `params` against `defaults` in place.
///
/// A missing sub-object becomes a copy of the defaults. A value under `key`
/// that is not a set is left as the caller supplied it.
pub fn merge_sub_object(params: &mut ParameterSet, key: &str, defaults: &ParameterSet) {
    match params.get_mut(key) {
        Some(Value::Map(sub)) => *sub = merge(defaults, sub),
        Some(_) => {}
        None => {
            params.insert(key.to_string(), Value::Map(defaults.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::params;
    use crate::testing::scalar_params;

    /// Few enough distinct keys that defaults and overrides often collide
    const SHARED_KEYS: &str = "[A-D][a-b]?";

    fn create_defaults() -> ParameterSet {
        params! { "QueueID" => 2, "LockID" => 1, "PriorityID" => 3, "State" => "new" }
    }

    #[test]
    fn overrides_win_and_defaults_survive() {
        let merged = merge(&create_defaults(), &params! { "State" => "open", "Title" => "Hi" });
        assert_eq!(merged["State"], Value::from("open"));
        assert_eq!(merged["QueueID"], Value::Int(2));
        assert_eq!(merged["Title"], Value::from("Hi"));
        let keys: Vec<&str> = merged.keys().map(String::as_str).collect();
        assert_eq!(keys, ["QueueID", "LockID", "PriorityID", "State", "Title"]);
    }

    #[test]
    fn merge_leaves_inputs_untouched() {
        let defaults = create_defaults();
        let overrides = params! { "QueueID" => 9 };
        let _ = merge(&defaults, &overrides);
        assert_eq!(defaults, create_defaults());
        assert_eq!(overrides, params! { "QueueID" => 9 });
    }

    #[test]
    fn nested_sets_are_replaced_not_merged() {
        let defaults = params! { "Ticket" => create_defaults() };
        let overrides = params! { "Ticket" => params! { "Title" => "Hi" } };
        let merged = merge(&defaults, &overrides);
        let ticket = merged["Ticket"].as_map().unwrap();
        assert_eq!(ticket, &params! { "Title" => "Hi" });
        assert!(!ticket.contains_key("QueueID"));
    }

    #[test]
    fn sub_object_merge_fills_missing_fields() {
        let mut request = params! { "Ticket" => params! { "Title" => "Hi", "QueueID" => 5 } };
        merge_sub_object(&mut request, "Ticket", &create_defaults());
        let ticket = request["Ticket"].as_map().unwrap();
        assert_eq!(ticket["QueueID"], Value::Int(5));
        assert_eq!(ticket["State"], Value::from("new"));
        assert_eq!(ticket["Title"], Value::from("Hi"));
    }

    proptest! {
        #[test]
        fn overrides_take_precedence_over_defaults(
            defaults in scalar_params(SHARED_KEYS),
            overrides in scalar_params(SHARED_KEYS),
        ) {
            let merged = merge(&defaults, &overrides);
            for (key, value) in &merged {
                let expected = overrides.get(key).or_else(|| defaults.get(key));
                prop_assert_eq!(Some(value), expected);
            }
            for key in defaults.keys().chain(overrides.keys()) {
                prop_assert!(merged.contains_key(key));
            }
            prop_assert!(merged.keys().take(defaults.len()).eq(defaults.keys()));
        }
    }

    #[test]
    fn sub_object_merge_inserts_defaults_when_absent() {
        let mut request = ParameterSet::new();
        merge_sub_object(&mut request, "Article", &params! { "ContentType" => "text/plain" });
        assert_eq!(
            request,
            params! { "Article" => params! { "ContentType" => "text/plain" } }
        );
    }

    #[test]
    fn sub_object_merge_respects_non_set_values() {
        let mut request = params! { "Article" => Value::Null };
        merge_sub_object(&mut request, "Article", &params! { "ContentType" => "text/plain" });
        assert_eq!(request["Article"], Value::Null);
    }

    #[test]
    fn policy_parses_kebab_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            merge: MergePolicy,
        }
        let w: Wrapper = toml::from_str(r#"merge = "per-sub-object""#).unwrap();
        assert_eq!(w.merge, MergePolicy::PerSubObject);
    }
}
