//! Layered attribute computation.
//!
//! An [`AttrData`] turns a base value plus four ordered modifier buckets
//! (static/dynamic x fixed/percentage) into final numeric values. Static
//! modifiers are permanent or equipment-derived; dynamic modifiers are
//! transient (buff-derived) and always layer *on top of* static -- the
//! dynamic views include the static contributions, never replace them.
//!
//! Core formula:
//!
//! ```text
//! dynamic_total = floor(base * (1 + (static_pct + dynamic_pct) / 100)
//!                       + (static_fixed + dynamic_fixed))
//! ```
//!
//! The static total uses only the static buckets and is not floored.
//!
//! Computation is pure and uncached: every call walks the current modifier
//! lists, so the result always reflects the latest modifier set. Cost is
//! O(number of modifiers).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::CoreError;

// ---------------------------------------------------------------------------
// Contribution
// ---------------------------------------------------------------------------

/// A single `(value, source)` entry in a base-value list or modifier bucket.
///
/// The `source` identifies who added the entry (an equipment id, a buff id)
/// so it can later be removed exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub value: f64,
    pub source: String,
}

impl Contribution {
    pub fn new(value: f64, source: impl Into<String>) -> Self {
        Self {
            value,
            source: source.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// BaseValue
// ---------------------------------------------------------------------------

/// The base of an attribute: either a plain scalar or an ordered list of
/// contributions summed together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BaseValue {
    Scalar(f64),
    Contributions(Vec<Contribution>),
}

impl BaseValue {
    /// The effective base value.
    pub fn value(&self) -> f64 {
        match self {
            BaseValue::Scalar(v) => *v,
            BaseValue::Contributions(list) => list.iter().map(|c| c.value).sum(),
        }
    }
}

// ---------------------------------------------------------------------------
// ModifierBucket
// ---------------------------------------------------------------------------

/// Which of the four modifier buckets a contribution belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModifierBucket {
    StaticFixed,
    StaticPercent,
    DynamicFixed,
    DynamicPercent,
}

// ---------------------------------------------------------------------------
// Influence
// ---------------------------------------------------------------------------

/// A declared effect this attribute has on another named attribute.
///
/// Pure data: resolution happens in the effect executor, which evaluates the
/// expression against the owning member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Influence {
    /// The attribute being influenced.
    pub attribute: String,
    /// Formula computing the influenced amount.
    pub expression: String,
}

// ---------------------------------------------------------------------------
// AttrData
// ---------------------------------------------------------------------------

/// One attribute: base value, four modifier buckets, declared influences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttrData {
    pub name: String,
    pub base: BaseValue,
    pub static_fixed: Vec<Contribution>,
    pub static_percent: Vec<Contribution>,
    pub dynamic_fixed: Vec<Contribution>,
    pub dynamic_percent: Vec<Contribution>,
    pub influences: Vec<Influence>,
}

impl AttrData {
    /// Create an attribute with a scalar base and no modifiers.
    pub fn new(name: impl Into<String>, base: f64) -> Self {
        Self {
            name: name.into(),
            base: BaseValue::Scalar(base),
            static_fixed: Vec::new(),
            static_percent: Vec::new(),
            dynamic_fixed: Vec::new(),
            dynamic_percent: Vec::new(),
            influences: Vec::new(),
        }
    }

    /// The effective base value (scalar or summed contributions).
    pub fn base_value(&self) -> f64 {
        self.base.value()
    }

    /// Sum of the static fixed bucket.
    pub fn static_fixed_value(&self) -> f64 {
        self.static_fixed.iter().map(|c| c.value).sum()
    }

    /// Static fixed plus the dynamic fixed bucket -- dynamic extends static.
    pub fn dynamic_fixed_value(&self) -> f64 {
        self.static_fixed_value() + self.dynamic_fixed.iter().map(|c| c.value).sum::<f64>()
    }

    /// Sum of the static percentage bucket.
    pub fn static_percent_value(&self) -> f64 {
        self.static_percent.iter().map(|c| c.value).sum()
    }

    /// Static percentage plus the dynamic percentage bucket.
    pub fn dynamic_percent_value(&self) -> f64 {
        self.static_percent_value() + self.dynamic_percent.iter().map(|c| c.value).sum::<f64>()
    }

    /// Total from the static buckets only. Not floored.
    pub fn static_total_value(&self) -> f64 {
        self.base_value() * (1.0 + self.static_percent_value() / 100.0)
            + self.static_fixed_value()
    }

    /// Total including the dynamic buckets, floored to a whole number.
    pub fn dynamic_total_value(&self) -> f64 {
        self.dynamic_total_raw().floor()
    }

    /// The unfloored dynamic total. Used for continuous attributes such as
    /// speeds, where whole-number flooring would destroy the value.
    pub fn dynamic_total_raw(&self) -> f64 {
        self.base_value() * (1.0 + self.dynamic_percent_value() / 100.0)
            + self.dynamic_fixed_value()
    }

    /// Append a contribution to the given bucket. Order is preserved.
    pub fn add_contribution(&mut self, bucket: ModifierBucket, contribution: Contribution) {
        self.bucket_mut(bucket).push(contribution);
    }

    /// Remove every contribution in `bucket` whose source matches.
    ///
    /// Returns the number of entries removed.
    pub fn remove_contributions(&mut self, bucket: ModifierBucket, source: &str) -> usize {
        let list = self.bucket_mut(bucket);
        let before = list.len();
        list.retain(|c| c.source != source);
        before - list.len()
    }

    fn bucket_mut(&mut self, bucket: ModifierBucket) -> &mut Vec<Contribution> {
        match bucket {
            ModifierBucket::StaticFixed => &mut self.static_fixed,
            ModifierBucket::StaticPercent => &mut self.static_percent,
            ModifierBucket::DynamicFixed => &mut self.dynamic_fixed,
            ModifierBucket::DynamicPercent => &mut self.dynamic_percent,
        }
    }
}

// ---------------------------------------------------------------------------
// AttributeSet
// ---------------------------------------------------------------------------

/// The named attributes of one member.
///
/// Lookups of undefined attributes are data errors: they are reported to the
/// caller and leave the set untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AttributeSet {
    attributes: BTreeMap<String, AttrData>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an attribute, keyed by its name.
    pub fn insert(&mut self, attr: AttrData) {
        self.attributes.insert(attr.name.clone(), attr);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Look up an attribute.
    ///
    /// # Errors
    ///
    /// [`CoreError::UndefinedAttribute`] if no attribute with this name
    /// exists.
    pub fn get(&self, name: &str) -> Result<&AttrData, CoreError> {
        self.attributes
            .get(name)
            .ok_or_else(|| CoreError::UndefinedAttribute {
                name: name.to_owned(),
            })
    }

    /// Mutable lookup, same error contract as [`get`](Self::get).
    pub fn get_mut(&mut self, name: &str) -> Result<&mut AttrData, CoreError> {
        self.attributes
            .get_mut(name)
            .ok_or_else(|| CoreError::UndefinedAttribute {
                name: name.to_owned(),
            })
    }

    /// Convenience: the floored dynamic total of a named attribute.
    pub fn dynamic_total(&self, name: &str) -> Result<f64, CoreError> {
        Ok(self.get(name)?.dynamic_total_value())
    }

    /// Attribute names in deterministic (sorted) order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
