//! Functional building blocks shared by every resource client
//!
//! - **Predicate**: boolean test over an object, composable with [`Predicate::all`]
//! - **Mutator**: in-place edit that may fail, chained with [`MutatorList`]
//! - **Merger**: any `Fn(&new, &old) -> merged`, used by upserts
//! - **Status helpers**: read `status.conditions` without knowing the kind's schema

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use kube::ResourceExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Bounds every object handled by the framework must satisfy
pub trait Object:
    kube::Resource + Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> Object for T where
    T: kube::Resource + Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// A boolean function over an object
pub struct Predicate<R>(Arc<dyn Fn(&R) -> bool + Send + Sync>);

impl<R> Clone for Predicate<R> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<R> fmt::Debug for Predicate<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Predicate(..)")
    }
}

impl<R: 'static> Predicate<R> {
    /// Create a predicate from a closure
    pub fn new(f: impl Fn(&R) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Evaluate the predicate
    pub fn test(&self, obj: &R) -> bool {
        (self.0)(obj)
    }

    /// A predicate that passes only if all children pass.
    ///
    /// Evaluation stops at the first failing child; an empty set passes.
    pub fn all(children: impl IntoIterator<Item = Predicate<R>>) -> Self {
        let children: Vec<_> = children.into_iter().collect();
        Self::new(move |obj| children.iter().all(|p| p.test(obj)))
    }

    /// Both this predicate and `other` must pass
    pub fn and(self, other: Predicate<R>) -> Self {
        Self::all([self, other])
    }

    /// Invert the predicate
    pub fn not(self) -> Self {
        Self::new(move |obj| !self.test(obj))
    }
}

/// A function that edits an object in place
pub struct Mutator<R>(Arc<dyn Fn(&mut R) -> Result<()> + Send + Sync>);

impl<R> Clone for Mutator<R> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<R> fmt::Debug for Mutator<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Mutator(..)")
    }
}

impl<R: 'static> Mutator<R> {
    /// Create a mutator from a closure
    pub fn new(f: impl Fn(&mut R) -> Result<()> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Run the mutator against an object
    pub fn apply(&self, obj: &mut R) -> Result<()> {
        (self.0)(obj)
    }
}

/// An ordered list of mutators
pub struct MutatorList<R>(Vec<Mutator<R>>);

impl<R> Clone for MutatorList<R> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<R> Default for MutatorList<R> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<R> fmt::Debug for MutatorList<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MutatorList({} mutators)", self.0.len())
    }
}

impl<R: 'static> MutatorList<R> {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a mutator
    pub fn push(&mut self, mutator: Mutator<R>) {
        self.0.push(mutator);
    }

    /// Number of mutators
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Pass the object to each mutator in order, stopping at the first error
    pub fn apply(&self, obj: &mut R) -> Result<()> {
        for mutator in &self.0 {
            mutator.apply(obj)?;
        }
        Ok(())
    }
}

impl<R> From<Vec<Mutator<R>>> for MutatorList<R> {
    fn from(mutators: Vec<Mutator<R>>) -> Self {
        Self(mutators)
    }
}

impl<R> FromIterator<Mutator<R>> for MutatorList<R> {
    fn from_iter<I: IntoIterator<Item = Mutator<R>>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Keep only the items the predicate accepts
pub fn filter<R: 'static>(items: Vec<R>, predicate: &Predicate<R>) -> Vec<R> {
    items.into_iter().filter(|item| predicate.test(item)).collect()
}

/// Merger that replaces the stored object with the desired one
pub fn replace<R: Clone>(new: &R, _old: &R) -> R {
    new.clone()
}

// ========== Labels ==========

/// Mutator that sets the given labels on the object
pub fn label_set_mutator<R: Object>(labels: BTreeMap<String, String>) -> Mutator<R> {
    Mutator::new(move |obj: &mut R| {
        let target = obj.labels_mut();
        for (key, value) in &labels {
            target.insert(key.clone(), value.clone());
        }
        Ok(())
    })
}

/// Predicate that passes if the label exists with exactly this value
pub fn label_equals_predicate<R: Object>(
    key: impl Into<String>,
    value: impl Into<String>,
) -> Predicate<R> {
    let key = key.into();
    let value = value.into();
    Predicate::new(move |obj: &R| obj.labels().get(&key) == Some(&value))
}

/// Predicate that passes if the label exists
pub fn labels_contains_predicate<R: Object>(key: impl Into<String>) -> Predicate<R> {
    let key = key.into();
    Predicate::new(move |obj: &R| obj.labels().contains_key(&key))
}

// ========== Status ==========

/// A status condition, reduced to the fields every Kubernetes kind shares
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,

    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub reason: String,

    #[serde(default)]
    pub message: String,
}

impl Condition {
    pub fn is_true(&self) -> bool {
        self.status == "True"
    }

    pub fn is_false(&self) -> bool {
        self.status == "False"
    }

    pub fn is_unknown(&self) -> bool {
        self.status == "Unknown"
    }
}

/// Read `status.conditions` from any serializable object
pub fn extract_conditions<R: Serialize>(obj: &R) -> Vec<Condition> {
    let Ok(value) = serde_json::to_value(obj) else {
        return Vec::new();
    };

    value
        .pointer("/status/conditions")
        .and_then(|c| c.as_array())
        .map(|conditions| {
            conditions
                .iter()
                .filter_map(|c| serde_json::from_value(c.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Whether the controller has observed the object's latest generation.
///
/// Objects without `metadata.generation` or `status.observedGeneration`
/// count as observed.
pub fn observed_generation_matches<R: Object>(obj: &R) -> bool {
    let Some(generation) = obj.meta().generation else {
        return true;
    };

    let observed = serde_json::to_value(obj).ok().and_then(|value| {
        value
            .pointer("/status/observedGeneration")
            .and_then(|g| g.as_i64())
    });

    observed.is_none_or(|observed| observed == generation)
}
