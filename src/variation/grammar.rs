//! Bracketed option-group grammar.
//!
//! A template such as `"@hero at [dawn, noon] in [the forest, the city]"` denotes the
//! cartesian product of its groups. Text outside brackets is copied verbatim into every
//! expansion, and the rightmost group varies fastest, so index `i` of an expansion list
//! always maps to the same combination of option indices for a given template.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_MAX_OPTIONS: usize = 10;
pub const DEFAULT_MAX_PREVIEW: usize = 5;
pub const DEFAULT_MAX_COMBINATIONS: usize = 1000;

/// Grammar configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrammarConfig {
    /// Maximum options per group. Exceeding it is a validation error.
    #[serde(default = "default_max_options")]
    pub max_options: usize,

    /// Maximum expansions materialized by [`preview`].
    #[serde(default = "default_max_preview")]
    pub max_preview: usize,

    /// Trim whitespace around each option before substitution.
    #[serde(default = "default_true")]
    pub trim_whitespace: bool,

    /// Largest product a template may denote. Larger products are a validation error
    /// and dispatch as one literal prompt.
    #[serde(default = "default_max_combinations")]
    pub max_combinations: usize,
}

fn default_max_options() -> usize {
    DEFAULT_MAX_OPTIONS
}

fn default_max_preview() -> usize {
    DEFAULT_MAX_PREVIEW
}

fn default_max_combinations() -> usize {
    DEFAULT_MAX_COMBINATIONS
}

fn default_true() -> bool {
    true
}

impl Default for GrammarConfig {
    fn default() -> Self {
        Self {
            max_options: default_max_options(),
            max_preview: default_max_preview(),
            trim_whitespace: default_true(),
            max_combinations: default_max_combinations(),
        }
    }
}

/// Why a template was rejected. Positions are character offsets into the template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxError {
    Unclosed { position: usize },
    UnexpectedClose { position: usize },
    Nested { position: usize },
    EmptyGroup { position: usize },
    EmptyOption { position: usize },
    TooManyOptions { position: usize, count: usize, max: usize },
    TooManyCombinations { max: usize },
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyntaxError::Unclosed { position } => {
                write!(f, "Unclosed '[' at position {}", position)
            }
            SyntaxError::UnexpectedClose { position } => {
                write!(f, "Unexpected ']' at position {} without a matching '['", position)
            }
            SyntaxError::Nested { position } => {
                write!(f, "Nested brackets are not supported (position {})", position)
            }
            SyntaxError::EmptyGroup { position } => {
                write!(f, "Empty option group at position {}", position)
            }
            SyntaxError::EmptyOption { position } => {
                write!(f, "Empty option in group at position {}", position)
            }
            SyntaxError::TooManyOptions {
                position,
                count,
                max,
            } => write!(
                f,
                "Option group at position {} has {} options (maximum {})",
                position, count, max
            ),
            SyntaxError::TooManyCombinations { max } => {
                write!(f, "Prompt expands to more than {} combinations", max)
            }
        }
    }
}

impl std::error::Error for SyntaxError {}

/// Result of parsing a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariationParse {
    pub is_valid: bool,
    /// Full number of combinations; 1 for plain prompts and on failure.
    pub total_count: usize,
    /// Concrete prompts. Empty when invalid, possibly capped when produced by [`preview`].
    pub expanded_prompts: Vec<String>,
    pub error: Option<SyntaxError>,
    /// Corrected template, when one can be derived.
    pub suggestion: Option<String>,
}

impl VariationParse {
    fn rejected(rejection: Rejection) -> Self {
        Self {
            is_valid: false,
            total_count: 1,
            expanded_prompts: Vec::new(),
            error: Some(rejection.error),
            suggestion: rejection.suggestion,
        }
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }

    /// True when `expanded_prompts` holds fewer entries than `total_count`.
    pub fn is_truncated(&self) -> bool {
        self.is_valid && self.expanded_prompts.len() < self.total_count
    }
}

/// Parse and fully expand a template.
pub fn parse(prompt: &str, config: &GrammarConfig) -> VariationParse {
    parse_with_limit(prompt, config, usize::MAX)
}

/// Parse a template, materializing at most `config.max_preview` expansions.
/// `total_count` still reports the full product.
pub fn preview(prompt: &str, config: &GrammarConfig) -> VariationParse {
    parse_with_limit(prompt, config, config.max_preview)
}

/// Number of concrete prompts the template denotes, without expanding it.
/// Plain prompts and invalid templates count as one.
pub fn total_count(prompt: &str, config: &GrammarConfig) -> usize {
    match scan(prompt, config) {
        Ok(template) => template.combination_count(config.max_combinations).unwrap_or(1),
        Err(_) => 1,
    }
}

/// Expansions to dispatch. Invalid templates fall back to the literal prompt.
pub fn expand_for_dispatch(prompt: &str, config: &GrammarConfig) -> Vec<String> {
    let parsed = parse(prompt, config);
    if parsed.is_valid {
        parsed.expanded_prompts
    } else {
        vec![prompt.to_string()]
    }
}

/// True iff the prompt contains at least one well-formed, non-empty group.
/// A group with brackets nested inside it is not well-formed.
pub fn has_brackets(prompt: &str) -> bool {
    let mut open: Option<usize> = None;
    let mut depth = 0usize;
    let mut nested = false;
    for (offset, ch) in prompt.char_indices() {
        match ch {
            '[' => {
                depth += 1;
                if depth == 1 {
                    open = Some(offset);
                    nested = false;
                } else {
                    nested = true;
                }
            }
            ']' if depth > 0 => {
                depth -= 1;
                if depth > 0 {
                    continue;
                }
                if let Some(start) = open.take() {
                    if !nested && !prompt[start + 1..offset].trim().is_empty() {
                        return true;
                    }
                }
            }
            _ => {}
        }
    }
    false
}

/// Grammar bound to a configuration.
#[derive(Debug, Clone, Default)]
pub struct VariationGrammar {
    config: GrammarConfig,
}

impl VariationGrammar {
    pub fn new(config: GrammarConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GrammarConfig {
        &self.config
    }

    pub fn parse(&self, prompt: &str) -> VariationParse {
        parse(prompt, &self.config)
    }

    pub fn preview(&self, prompt: &str) -> VariationParse {
        preview(prompt, &self.config)
    }

    pub fn total_count(&self, prompt: &str) -> usize {
        total_count(prompt, &self.config)
    }

    pub fn expand_for_dispatch(&self, prompt: &str) -> Vec<String> {
        expand_for_dispatch(prompt, &self.config)
    }

    pub fn has_brackets(&self, prompt: &str) -> bool {
        has_brackets(prompt)
    }
}

fn parse_with_limit(prompt: &str, config: &GrammarConfig, limit: usize) -> VariationParse {
    let template = match scan(prompt, config) {
        Ok(template) => template,
        Err(rejection) => return VariationParse::rejected(rejection),
    };
    let Some(total) = template.combination_count(config.max_combinations) else {
        return VariationParse::rejected(Rejection {
            error: SyntaxError::TooManyCombinations {
                max: config.max_combinations,
            },
            suggestion: None,
        });
    };
    VariationParse {
        is_valid: true,
        total_count: total,
        expanded_prompts: template.expand(total.min(limit)),
        error: None,
        suggestion: None,
    }
}

struct Rejection {
    error: SyntaxError,
    suggestion: Option<String>,
}

enum Segment<'a> {
    Literal(&'a str),
    Group(Vec<&'a str>),
}

struct Template<'a> {
    segments: Vec<Segment<'a>>,
}

impl<'a> Template<'a> {
    fn group_sizes(&self) -> Vec<usize> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Group(options) => Some(options.len()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Product of group sizes, or `None` once it exceeds `max`.
    fn combination_count(&self, max: usize) -> Option<usize> {
        self.group_sizes()
            .into_iter()
            .try_fold(1usize, |acc, size| acc.checked_mul(size).filter(|n| *n <= max))
    }

    /// Odometer enumeration, rightmost group fastest.
    fn expand(&self, take: usize) -> Vec<String> {
        let sizes = self.group_sizes();
        let mut indices = vec![0usize; sizes.len()];
        let mut out = Vec::new();
        for _ in 0..take {
            out.push(self.render(&indices));
            for slot in (0..indices.len()).rev() {
                indices[slot] += 1;
                if indices[slot] < sizes[slot] {
                    break;
                }
                indices[slot] = 0;
            }
        }
        out
    }

    fn render(&self, indices: &[usize]) -> String {
        let mut out = String::new();
        let mut group = 0;
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Group(options) => {
                    out.push_str(options[indices[group]]);
                    group += 1;
                }
            }
        }
        out
    }
}

fn scan<'a>(prompt: &'a str, config: &GrammarConfig) -> Result<Template<'a>, Rejection> {
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut open: Option<usize> = None;

    for (offset, ch) in prompt.char_indices() {
        match ch {
            '[' => {
                if open.is_some() {
                    return Err(Rejection {
                        error: SyntaxError::Nested {
                            position: char_position(prompt, offset),
                        },
                        suggestion: Some(flatten_brackets(prompt)),
                    });
                }
                open = Some(offset);
            }
            ']' => {
                let Some(start) = open.take() else {
                    return Err(Rejection {
                        error: SyntaxError::UnexpectedClose {
                            position: char_position(prompt, offset),
                        },
                        suggestion: Some(format!("{}{}", &prompt[..offset], &prompt[offset + 1..])),
                    });
                };
                if literal_start < start {
                    segments.push(Segment::Literal(&prompt[literal_start..start]));
                }
                segments.push(Segment::Group(split_options(prompt, start, offset, config)?));
                literal_start = offset + 1;
            }
            _ => {}
        }
    }

    if let Some(start) = open {
        return Err(Rejection {
            error: SyntaxError::Unclosed {
                position: char_position(prompt, start),
            },
            suggestion: Some(format!("{}]", prompt.trim_end())),
        });
    }
    if literal_start < prompt.len() {
        segments.push(Segment::Literal(&prompt[literal_start..]));
    }
    Ok(Template { segments })
}

/// Split the group spanning `prompt[open..=close]` into its options.
fn split_options<'a>(
    prompt: &'a str,
    open: usize,
    close: usize,
    config: &GrammarConfig,
) -> Result<Vec<&'a str>, Rejection> {
    let body = &prompt[open + 1..close];
    let position = char_position(prompt, open);

    if body.trim().is_empty() {
        return Err(Rejection {
            error: SyntaxError::EmptyGroup { position },
            suggestion: Some(remove_span(prompt, open, close + 1)),
        });
    }

    let raw: Vec<&str> = body.split(',').collect();
    if raw.iter().any(|option| option.trim().is_empty()) {
        let kept: Vec<&str> = raw
            .iter()
            .map(|option| option.trim())
            .filter(|option| !option.is_empty())
            .collect();
        return Err(Rejection {
            error: SyntaxError::EmptyOption { position },
            suggestion: Some(replace_span(prompt, open, close + 1, &format_group(&kept))),
        });
    }

    if raw.len() > config.max_options {
        let kept: Vec<&str> = raw
            .iter()
            .take(config.max_options)
            .map(|option| option.trim())
            .collect();
        let suggestion = if kept.is_empty() {
            remove_span(prompt, open, close + 1)
        } else {
            replace_span(prompt, open, close + 1, &format_group(&kept))
        };
        return Err(Rejection {
            error: SyntaxError::TooManyOptions {
                position,
                count: raw.len(),
                max: config.max_options,
            },
            suggestion: Some(suggestion),
        });
    }

    if config.trim_whitespace {
        Ok(raw.into_iter().map(str::trim).collect())
    } else {
        Ok(raw)
    }
}

fn char_position(prompt: &str, byte_offset: usize) -> usize {
    prompt[..byte_offset].chars().count()
}

fn format_group(options: &[&str]) -> String {
    format!("[{}]", options.join(", "))
}

fn replace_span(prompt: &str, start: usize, end: usize, replacement: &str) -> String {
    format!("{}{}{}", &prompt[..start], replacement, &prompt[end..])
}

fn remove_span(prompt: &str, start: usize, end: usize) -> String {
    let before = prompt[..start].trim_end();
    let after = &prompt[end..];
    if before.is_empty() {
        after.trim_start().to_string()
    } else {
        format!("{}{}", before, after)
    }
}

/// Keep only the outermost bracket pair of each nesting run; drop stray closers.
fn flatten_brackets(prompt: &str) -> String {
    let mut out = String::with_capacity(prompt.len());
    let mut depth = 0usize;
    for ch in prompt.chars() {
        match ch {
            '[' => {
                if depth == 0 {
                    out.push('[');
                }
                depth += 1;
            }
            ']' => {
                if depth == 1 {
                    out.push(']');
                }
                depth = depth.saturating_sub(1);
            }
            _ => out.push(ch),
        }
    }
    out
}
