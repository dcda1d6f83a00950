//! Rule cascade over a compiled stylesheet

use super::attributes::AttributeSet;
use super::parser::{load_stylesheet, parse_stylesheet};
use super::rules::{Directive, Rule, StyleSheet};
use crate::error::StyleError;
use crate::geo::{GeometryRecord, LodRange};
use std::path::Path;

/// One directive a record produces, with its merged attributes
#[derive(Debug, Clone, PartialEq)]
pub struct StyleMatch {
    pub directive: Directive,
    pub attributes: AttributeSet,
}

#[derive(Debug, Clone, Default)]
pub struct StyleEngine {
    sheet: StyleSheet,
}

impl StyleEngine {
    pub fn new(sheet: StyleSheet) -> Self {
        Self { sheet }
    }

    pub fn load(path: &Path) -> Result<Self, StyleError> {
        load_stylesheet(path).map(Self::new)
    }

    pub fn from_source(source: &str) -> Result<Self, StyleError> {
        parse_stylesheet(source).map(Self::new)
    }

    pub fn stylesheet(&self) -> &StyleSheet {
        &self.sheet
    }

    /// Resolve every directive `record` produces at `lod`
    ///
    /// Participating rules are applied in (specificity, declaration index)
    /// order. Rules without a `builder` declaration contribute to every
    /// directive; an empty result means nothing styles the record.
    pub fn match_record(&self, record: &GeometryRecord, lod: u8) -> Vec<StyleMatch> {
        let kind = record.kind();
        let mut participating: Vec<(usize, usize, &Rule)> = self
            .sheet
            .rules
            .iter()
            .enumerate()
            .filter_map(|(index, rule)| {
                rule.match_specificity(kind, &record.tags, lod)
                    .map(|specificity| (specificity, index, rule))
            })
            .collect();
        participating.sort_by_key(|&(specificity, index, _)| (specificity, index));

        let mut directives: Vec<Directive> = Vec::new();
        for (_, _, rule) in &participating {
            if let Some(directive) = rule.directive() {
                if !directives.contains(&directive) {
                    directives.push(directive);
                }
            }
        }

        directives
            .into_iter()
            .map(|directive| {
                let mut attributes = AttributeSet::new();
                for (_, _, rule) in &participating {
                    let targets = match rule.directive() {
                        Some(d) => d == directive,
                        None => true,
                    };
                    if !targets {
                        continue;
                    }
                    for decl in rule.declarations.iter().filter(|d| d.key != "builder") {
                        attributes.set(decl.key.as_str(), decl.value.as_str());
                    }
                }
                StyleMatch { directive, attributes }
            })
            .collect()
    }

    /// Whether some directive-bearing rule could match `record` at a LOD in `range`
    pub fn applies_within(&self, record: &GeometryRecord, range: &LodRange) -> bool {
        let kind = record.kind();
        self.sheet.rules.iter().any(|rule| {
            rule.directive().is_some()
                && rule
                    .selectors
                    .iter()
                    .any(|s| s.matches_within(kind, &record.tags, range))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{Geometry, Point, TagSet};

    fn square_record(tags: &[(&str, &str)]) -> GeometryRecord {
        let ring = vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        ];
        GeometryRecord::new(
            Some(1),
            tags.iter().copied().collect::<TagSet>(),
            Geometry::polygon(ring, vec![]),
        )
    }

    const SHEET: &str = r#"
        area|z1-16[natural=water][!covered] { builder: mesh; fill-color: #0000ff; mesh-name: water; }
        area|z1-16[natural] { builder: mesh; fill-color: #00ff00; width: 2; }
        area|z10-16[natural=water][name] { builder: place; label-tag: name; }
        *[name] { font-size: 12; }
    "#;

    #[test]
    fn test_more_specific_rule_wins_regardless_of_order() {
        let engine = StyleEngine::from_source(SHEET).unwrap();
        let record = square_record(&[("natural", "water")]);
        let matches = engine.match_record(&record, 5);

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].directive, Directive::AsMesh);
        let attrs = &matches[0].attributes;
        assert_eq!(attrs.get("fill-color"), Some("#0000ff"));
        assert_eq!(attrs.get("width"), Some("2"));
        assert!(!attrs.contains("builder"));
    }

    #[test]
    fn test_later_rule_overrides_at_equal_specificity() {
        let engine = StyleEngine::from_source(
            "area[natural] { builder: mesh; fill-color: red; }\n\
             area[natural] { fill-color: blue; }",
        )
        .unwrap();
        let matches = engine.match_record(&square_record(&[("natural", "wood")]), 3);
        assert_eq!(matches[0].attributes.get("fill-color"), Some("blue"));
    }

    #[test]
    fn test_distinct_directives_accumulate_independently() {
        let engine = StyleEngine::from_source(SHEET).unwrap();
        let record = square_record(&[("natural", "water"), ("name", "Spree")]);
        let matches = engine.match_record(&record, 12);

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].directive, Directive::AsMesh);
        assert_eq!(matches[1].directive, Directive::AsElement("place".into()));
        assert_eq!(matches[1].attributes.get("label-tag"), Some("name"));
        assert!(matches[1].attributes.get("fill-color").is_none());
        // shared rule reaches both
        assert_eq!(matches[0].attributes.get("font-size"), Some("12"));
        assert_eq!(matches[1].attributes.get("font-size"), Some("12"));
    }

    #[test]
    fn test_no_match_is_empty() {
        let engine = StyleEngine::from_source(SHEET).unwrap();
        assert!(engine.match_record(&square_record(&[("natural", "water")]), 18).is_empty());
        assert!(engine.match_record(&square_record(&[("landuse", "farm")]), 5).is_empty());
        // a shared rule alone produces nothing
        assert!(engine.match_record(&square_record(&[("name", "x")]), 5).is_empty());
    }

    #[test]
    fn test_applies_within() {
        let engine = StyleEngine::from_source(SHEET).unwrap();
        let water = square_record(&[("natural", "water")]);
        assert!(engine.applies_within(&water, &LodRange::new(14, 20).unwrap()));
        assert!(!engine.applies_within(&water, &LodRange::new(17, 20).unwrap()));
        assert!(!engine.applies_within(&square_record(&[("name", "x")]), &LodRange::full()));
    }
}
