//! Keyed state threaded through the experiment hook chain.

use crate::error::{HarnessError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Mutable, deep-copyable mapping of condition/participant-scoped state.
///
/// `prepare_condition` fills a fresh `Context` once per condition. Every
/// participant under that condition then receives its own clone, which
/// `prepare_participant` and the run hooks may mutate freely.
///
/// Values are stored as JSON values, so a clone never shares anything with
/// the original. Typed access goes through serde:
///
/// ```ignore
/// context.set("c", condition * 3)?;
/// let c: i64 = context.get("c")?;
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    entries: Map<String, Value>,
}

/// Extra named parameters forwarded from `run_with` to `prepare_experiment`.
pub type Params = Context;

impl Context {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> Result<()> {
        let key = key.into();
        let value = serde_json::to_value(value)
            .map_err(|e| HarnessError::context(format!("cannot store '{}': {}", key, e)))?;
        self.entries.insert(key, value);
        Ok(())
    }

    /// Reads the value under `key` as `T`.
    ///
    /// Fails if the key is missing or holds a value of another shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .entries
            .get(key)
            .ok_or_else(|| HarnessError::context(format!("missing key '{}'", key)))?;
        T::deserialize(value)
            .map_err(|e| HarnessError::context(format!("cannot read '{}': {}", key, e)))
    }

    /// Reads the value under `key` as `T`, or `None` if the key is absent.
    pub fn get_opt<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.entries.get(key) {
            Some(_) => self.get(key).map(Some),
            None => Ok(None),
        }
    }

    /// Returns the raw JSON value under `key`.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Stores a raw JSON value.
    pub fn insert_value(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    /// Removes and returns the raw value under `key`.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterates over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Copies every entry of `other` into `self`, overwriting on key clashes.
    pub fn merge(&mut self, other: &Context) {
        for (key, value) in &other.entries {
            self.entries.insert(key.clone(), value.clone());
        }
    }
}

impl FromIterator<(String, Value)> for Context {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_set_and_get_typed() {
        let mut ctx = Context::new();
        ctx.set("c", 12_i64).unwrap();
        ctx.set("label", "abc").unwrap();
        ctx.set("pair", (1_u32, 2.5_f64)).unwrap();

        assert_eq!(ctx.get::<i64>("c").unwrap(), 12);
        assert_eq!(ctx.get::<String>("label").unwrap(), "abc");
        assert_eq!(ctx.get::<(u32, f64)>("pair").unwrap(), (1, 2.5));
        assert_eq!(ctx.len(), 3);
    }

    #[test]
    fn test_missing_and_mistyped_keys() {
        let mut ctx = Context::new();
        ctx.set("c", "not a number").unwrap();

        assert!(matches!(ctx.get::<i64>("p"), Err(HarnessError::Context(_))));
        assert!(matches!(ctx.get::<i64>("c"), Err(HarnessError::Context(_))));
        assert_eq!(ctx.get_opt::<i64>("p").unwrap(), None);
    }

    #[test]
    fn test_null_values_round_trip() {
        let mut ctx = Context::new();
        ctx.set("c", Option::<i64>::None).unwrap();

        assert!(ctx.contains_key("c"));
        assert_eq!(ctx.get::<Option<i64>>("c").unwrap(), None);
    }

    #[test]
    fn test_clone_is_independent() {
        let mut base = Context::new();
        base.set("items", vec![1, 2, 3]).unwrap();

        let mut copy = base.clone();
        copy.set("items", vec![9]).unwrap();
        copy.set("p", 7).unwrap();

        assert_eq!(base.get::<Vec<i32>>("items").unwrap(), vec![1, 2, 3]);
        assert!(!base.contains_key("p"));
    }

    #[test]
    fn test_merge_and_from_iter() {
        let mut a: Context = vec![("x".to_string(), json!(1)), ("y".to_string(), json!(2))]
            .into_iter()
            .collect();
        let b: Context = vec![("y".to_string(), json!(20))].into_iter().collect();

        a.merge(&b);

        assert_eq!(a.get::<i32>("x").unwrap(), 1);
        assert_eq!(a.get::<i32>("y").unwrap(), 20);
        assert_eq!(a.keys().collect::<Vec<_>>(), vec!["x", "y"]);
    }

    proptest! {
        #[test]
        fn prop_participant_copies_never_leak(count in 1usize..40) {
            let mut base = Context::new();
            base.set("c", 3).unwrap();

            let copies: Vec<Context> = (0..count)
                .map(|p| {
                    let mut ctx = base.clone();
                    ctx.set("p", p * 7).unwrap();
                    ctx
                })
                .collect();

            for (p, ctx) in copies.iter().enumerate() {
                prop_assert_eq!(ctx.get::<usize>("p").unwrap(), p * 7);
                prop_assert_eq!(ctx.get::<i32>("c").unwrap(), 3);
            }
            prop_assert!(!base.contains_key("p"));
        }
    }
}
