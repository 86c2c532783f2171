// Copyright (c) The invocation-core Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Materializes the (abi × parameterization) product for a module: one variant name per
//! combination of ABI, instant-app/secondary-user mode, device-state axis, and mainline APK
//! combination the resolved [`CommandOptions`] asks for.
//!
//! Expansion happens purely on names here; the [`crate::suite::SuiteScheduler`] is responsible
//! for actually constructing a [`crate::suite::ModuleDefinition`] per surviving variant.

use crate::config::CommandOptions;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Expands `base_module_name` into the full set of variant names implied by `abis` and
/// `options`, before filtering.
pub fn expand_variants(base_module_name: &str, abis: &[String], options: &CommandOptions) -> Vec<String> {
    let mut variants: Vec<String> = if options.expand_abis && !abis.is_empty() {
        abis.iter().map(|abi| format!("{base_module_name} {abi}")).collect()
    } else {
        vec![base_module_name.to_string()]
    };

    if options.enable_instant_app {
        let instant: Vec<String> = variants.iter().map(|v| format!("{v}[instant_app]")).collect();
        variants.extend(instant);
    }

    if options.enable_secondary_user {
        let secondary: Vec<String> = variants
            .iter()
            .map(|v| format!("{v}[secondary_user]"))
            .collect();
        variants.extend(secondary);
    }

    for state in &options.device_state_axes {
        let with_state: Vec<String> = variants
            .iter()
            .map(|v| format!("{v}[all_foldable_states:{state}]"))
            .collect();
        variants.extend(with_state);
    }

    for combo in &options.mainline_apk_combinations {
        variants.push(format!("{base_module_name}[mainline:{combo}]"));
    }

    variants
}

/// Keeps only the variants that survive `options`'s include/exclude filters.
///
/// A filter may target either the base module name (matching every variant derived from it) or
/// one specific variant name; exclusion always wins over inclusion.
pub fn filter_variants(base_module_name: &str, variants: Vec<String>, options: &CommandOptions) -> Vec<String> {
    variants
        .into_iter()
        .filter(|variant| passes(base_module_name, variant, options))
        .collect()
}

fn passes(base_module_name: &str, variant_name: &str, options: &CommandOptions) -> bool {
    let excluded = options
        .exclude_filters
        .iter()
        .any(|f| f == base_module_name || f == variant_name);
    if excluded {
        return false;
    }

    options.include_filters.is_empty()
        || options
            .include_filters
            .iter()
            .any(|f| f == base_module_name || f == variant_name)
}

/// Orders `variants` deterministically from `seed`, or leaves them in declaration order when no
/// seed was configured.
pub fn order_variants(variants: Vec<String>, seed: Option<u64>) -> Vec<String> {
    order_items(variants, seed)
}

/// Shuffles `items` deterministically from `seed`, or leaves them in declaration order when no
/// seed was configured. Generic over the item type so [`crate::suite::expand_modules`] can
/// reorder fully-built [`crate::suite::ModuleDefinition`]s the same way `order_variants` reorders
/// their names.
pub fn order_items<T>(mut items: Vec<T>, seed: Option<u64>) -> Vec<T> {
    if let Some(seed) = seed {
        let mut rng = StdRng::seed_from_u64(seed);
        items.shuffle(&mut rng);
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(mutate: impl FnOnce(&mut CommandOptions)) -> CommandOptions {
        let mut options = CommandOptions::default();
        mutate(&mut options);
        options
    }

    #[test]
    fn no_expansion_requested_yields_the_base_module_alone() {
        let options = CommandOptions::default();
        let variants = expand_variants("Foo", &["arm64-v8a".to_string()], &options);
        assert_eq!(variants, vec!["Foo"]);
    }

    #[test]
    fn abi_expansion_produces_one_variant_per_abi() {
        let options = options(|o| o.expand_abis = true);
        let abis = vec!["arm64-v8a".to_string(), "armeabi-v7a".to_string()];
        let variants = expand_variants("Foo", &abis, &options);
        assert_eq!(variants, vec!["Foo arm64-v8a", "Foo armeabi-v7a"]);
    }

    #[test]
    fn instant_app_doubles_the_variant_set() {
        let options = options(|o| o.enable_instant_app = true);
        let variants = expand_variants("Foo", &[], &options);
        assert_eq!(variants, vec!["Foo", "Foo[instant_app]"]);
    }

    #[test]
    fn mainline_combinations_each_add_one_variant_off_the_base_name() {
        let options = options(|o| {
            o.mainline_apk_combinations = vec!["com.foo.apk".to_string(), "com.bar.apex".to_string()];
        });
        let variants = expand_variants("Foo", &[], &options);
        assert_eq!(
            variants,
            vec!["Foo", "Foo[mainline:com.foo.apk]", "Foo[mainline:com.bar.apex]"]
        );
    }

    #[test]
    fn exclude_filter_on_base_name_drops_every_variant() {
        let options = options(|o| o.exclude_filters = vec!["Foo".to_string()]);
        let variants = expand_variants("Foo", &[], &options);
        let filtered = filter_variants("Foo", variants, &options);
        assert!(filtered.is_empty());
    }

    #[test]
    fn include_filter_on_specific_variant_keeps_only_that_one() {
        let options = options(|o| {
            o.expand_abis = true;
            o.include_filters = vec!["Foo arm64-v8a".to_string()];
        });
        let abis = vec!["arm64-v8a".to_string(), "armeabi-v7a".to_string()];
        let variants = expand_variants("Foo", &abis, &options);
        let filtered = filter_variants("Foo", variants, &options);
        assert_eq!(filtered, vec!["Foo arm64-v8a"]);
    }

    #[test]
    fn ordering_with_no_seed_preserves_declaration_order() {
        let variants = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let ordered = order_variants(variants.clone(), None);
        assert_eq!(ordered, variants);
    }

    #[test]
    fn ordering_with_the_same_seed_is_deterministic() {
        let variants = vec!["a".to_string(), "b".to_string(), "c".to_string(), "d".to_string()];
        let first = order_variants(variants.clone(), Some(42));
        let second = order_variants(variants, Some(42));
        assert_eq!(first, second);
    }
}
