//! Prompt variation: option-group expansion and output counting.

pub mod counter;
pub mod grammar;

pub use counter::{fan_outs, total_outputs_for};
pub use grammar::{
    expand_for_dispatch, has_brackets, parse, preview, total_count, GrammarConfig, SyntaxError,
    VariationGrammar, VariationParse,
};
