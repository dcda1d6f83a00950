//! Cascading stylesheet support
//!
//! # Submodules
//! - `parser` - MapCSS-subset grammar
//! - `rules` - Compiled selectors, conditions and rules
//! - `engine` - Cascade resolution per record and LOD
//! - `attributes` - Merged attribute sets and color parsing

mod attributes;
mod engine;
mod parser;
mod rules;

pub use attributes::{pack_color, parse_color, AttributeSet};
pub use engine::{StyleEngine, StyleMatch};
pub use parser::{load_stylesheet, parse_stylesheet};
pub use rules::{Condition, Declaration, Directive, Rule, Selector, SelectorTarget, StyleSheet};
