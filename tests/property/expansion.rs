//! Expansion laws over generated templates.

use proptest::prelude::*;
use shotqueue::variation::{expand_for_dispatch, parse, total_count, GrammarConfig};

fn option() -> impl Strategy<Value = String> {
    "[a-z]{1,6}( [a-z]{1,4})?"
}

fn literal() -> impl Strategy<Value = String> {
    "[a-z ,.@]{0,8}"
}

/// Template built from alternating literals and groups, plus the group sizes.
fn template() -> impl Strategy<Value = (String, Vec<usize>)> {
    (
        literal(),
        prop::collection::vec((prop::collection::vec(option(), 1..=4), literal()), 0..=3),
    )
        .prop_map(|(head, parts)| {
            let mut prompt = head;
            let mut sizes = Vec::new();
            for (options, tail) in parts {
                sizes.push(options.len());
                prompt.push('[');
                prompt.push_str(&options.join(", "));
                prompt.push(']');
                prompt.push_str(&tail);
            }
            (prompt, sizes)
        })
}

/// Expansion count is the product of group sizes
#[test]
fn test_count_is_product_of_group_sizes() {
    let mut runner = proptest::test_runner::TestRunner::default();
    let config = GrammarConfig::default();

    runner
        .run(&template(), |(prompt, sizes)| {
            let expected: usize = sizes.iter().product();
            let parsed = parse(&prompt, &config);

            prop_assert!(parsed.is_valid, "{prompt:?} rejected: {:?}", parsed.error);
            prop_assert_eq!(parsed.total_count, expected);
            prop_assert_eq!(parsed.expanded_prompts.len(), expected);
            prop_assert_eq!(total_count(&prompt, &config), expected);
            Ok(())
        })
        .unwrap();
}

/// Expanded prompts are plain prompts that expand to themselves
#[test]
fn test_expansions_are_fixed_points() {
    let mut runner = proptest::test_runner::TestRunner::default();
    let config = GrammarConfig::default();

    runner
        .run(&template(), |(prompt, _)| {
            for expanded in parse(&prompt, &config).expanded_prompts {
                prop_assert!(!expanded.contains('[') && !expanded.contains(']'));
                let again = parse(&expanded, &config);
                prop_assert!(again.is_valid);
                prop_assert_eq!(again.expanded_prompts, vec![expanded.clone()]);
            }
            Ok(())
        })
        .unwrap();
}

proptest! {
    /// Prompts without brackets expand to exactly themselves.
    #[test]
    fn plain_prompt_is_identity(prompt in "[^\\[\\]]{0,40}") {
        let parsed = parse(&prompt, &GrammarConfig::default());
        prop_assert!(parsed.is_valid);
        prop_assert_eq!(parsed.total_count, 1);
        prop_assert_eq!(parsed.expanded_prompts, vec![prompt]);
    }

    /// The count used for estimates always matches what would be dispatched,
    /// including malformed templates.
    #[test]
    fn count_matches_dispatch(prompt in "[ab ,\\[\\]]{0,24}", max_options in 1usize..4) {
        let config = GrammarConfig { max_options, ..GrammarConfig::default() };
        prop_assert_eq!(
            total_count(&prompt, &config),
            expand_for_dispatch(&prompt, &config).len()
        );
    }

    /// Index `k` of the expansion list is the mixed-radix decoding of `k` over the
    /// group sizes, rightmost group fastest.
    #[test]
    fn expansion_order_is_mixed_radix(sizes in prop::collection::vec(1usize..=4, 0..=3)) {
        let groups: Vec<String> = sizes
            .iter()
            .enumerate()
            .map(|(g, &n)| {
                let options: Vec<String> = (0..n).map(|o| format!("g{g}o{o}")).collect();
                format!("[{}]", options.join(", "))
            })
            .collect();
        let prompt = format!("shot {}", groups.join(" "));
        let parsed = parse(&prompt, &GrammarConfig::default());
        prop_assert_eq!(&parsed, &parse(&prompt, &GrammarConfig::default()));

        for (k, expanded) in parsed.expanded_prompts.iter().enumerate() {
            let mut rest = k;
            let mut picks = vec![0usize; sizes.len()];
            for g in (0..sizes.len()).rev() {
                picks[g] = rest % sizes[g];
                rest /= sizes[g];
            }
            let labels: Vec<String> = picks
                .iter()
                .enumerate()
                .map(|(g, o)| format!("g{g}o{o}"))
                .collect();
            prop_assert_eq!(expanded, &format!("shot {}", labels.join(" ")));
        }
    }
}
