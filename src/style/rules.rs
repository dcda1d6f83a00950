//! Compiled stylesheet: rules, selectors and conditions

use crate::geo::{GeometryKind, LodRange, TagSet};

/// What a matched record is turned into
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Directive {
    AsMesh,
    AsElement(String),
}

impl Directive {
    /// Map a `builder` declaration value to a directive
    pub fn from_builder(value: &str) -> Self {
        if value == "mesh" {
            Directive::AsMesh
        } else {
            Directive::AsElement(value.to_string())
        }
    }
}

/// Geometry category a selector applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorTarget {
    /// Points
    Node,
    /// Lines and polygons
    Way,
    /// Polygons only
    Area,
    Any,
}

impl SelectorTarget {
    pub fn accepts(&self, kind: GeometryKind) -> bool {
        match self {
            SelectorTarget::Node => kind == GeometryKind::Point,
            SelectorTarget::Way => matches!(kind, GeometryKind::Line | GeometryKind::Polygon),
            SelectorTarget::Area => kind == GeometryKind::Polygon,
            SelectorTarget::Any => true,
        }
    }
}

/// Tag predicate inside `[...]`
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Exists(String),
    NotExists(String),
    Equals(String, String),
    NotEquals(String, String),
    Less(String, f64),
    Greater(String, f64),
}

impl Condition {
    pub fn matches(&self, tags: &TagSet) -> bool {
        match self {
            Condition::Exists(key) => tags.contains_key(key),
            Condition::NotExists(key) => !tags.contains_key(key),
            Condition::Equals(key, value) => tags.get(key) == Some(value.as_str()),
            Condition::NotEquals(key, value) => tags.get(key) != Some(value.as_str()),
            Condition::Less(key, bound) => numeric_tag(tags, key).is_some_and(|v| v < *bound),
            Condition::Greater(key, bound) => numeric_tag(tags, key).is_some_and(|v| v > *bound),
        }
    }
}

fn numeric_tag(tags: &TagSet, key: &str) -> Option<f64> {
    tags.get(key).and_then(|v| v.trim().parse::<f64>().ok())
}

/// One selector of a rule: target, LOD span and conditions
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    pub target: SelectorTarget,
    pub lods: LodRange,
    pub conditions: Vec<Condition>,
}

impl Selector {
    pub fn specificity(&self) -> usize {
        self.conditions.len()
    }

    pub fn matches(&self, kind: GeometryKind, tags: &TagSet, lod: u8) -> bool {
        self.lods.contains(lod) && self.matches_feature(kind, tags)
    }

    /// Whether the selector could match at any LOD in `range`
    pub fn matches_within(&self, kind: GeometryKind, tags: &TagSet, range: &LodRange) -> bool {
        self.lods.overlaps(range) && self.matches_feature(kind, tags)
    }

    fn matches_feature(&self, kind: GeometryKind, tags: &TagSet) -> bool {
        self.target.accepts(kind) && self.conditions.iter().all(|c| c.matches(tags))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub key: String,
    pub value: String,
}

/// A selector group with its declaration block
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub selectors: Vec<Selector>,
    pub declarations: Vec<Declaration>,
}

impl Rule {
    /// Directive named by the rule's `builder` declaration, if any
    pub fn directive(&self) -> Option<Directive> {
        self.declarations
            .iter()
            .rev()
            .find(|d| d.key == "builder")
            .map(|d| Directive::from_builder(&d.value))
    }

    /// Highest specificity among selectors matching at `lod`
    pub fn match_specificity(&self, kind: GeometryKind, tags: &TagSet, lod: u8) -> Option<usize> {
        self.selectors
            .iter()
            .filter(|s| s.matches(kind, tags, lod))
            .map(Selector::specificity)
            .max()
    }
}

/// Rules in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleSheet {
    pub rules: Vec<Rule>,
}

impl StyleSheet {
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
