// Copyright (c) The Verifyica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The resolver: expands one class's arguments and builds its
//! descriptor subtree.
//!
//! Raw method discovery (folding selectors into a `class → methods`
//! map) is the external `TestClassIntrospector`'s job; this module
//! picks up from there — invoking the argument supplier, normalizing
//! its output, applying argument-index selection and class/tag
//! filters, validating the "one method per declaring class per role"
//! invariant, and assembling the ordered, pruned descriptor tree.

use crate::descriptor::{ArgumentDescriptor, ClassDescriptor, TestMethodDescriptor};
use crate::errors::DiscoveryError;
use crate::filter::ClassFilter;
use crate::introspect::{OrderedMethod, SupplierElement, SupplierOutput, TestClassIntrospector};
use std::collections::{HashMap, HashSet};
use tracing::debug;
use verifyica_model::{Argument, UniqueId};

/// Options steering resolution of a single class.
#[derive(Default)]
pub struct ResolveOptions<'a> {
    /// Class-name and tag filters (spec. §4.1 step 5).
    pub class_filter: Option<&'a ClassFilter>,
    /// If `Some`, only these argument indices survive (spec. §4.1
    /// step 3: unique-id-indicated argument filtering).
    pub selected_argument_indices: Option<&'a HashSet<usize>>,
    /// The engine-wide ceiling `argumentParallelism` is clamped to.
    pub argument_parallelism_ceiling: usize,
}

fn validate_unique_per_declaring_class<Invoker>(
    methods: &[OrderedMethod<Invoker>],
    class_name: &str,
    role: &'static str,
) -> Result<(), DiscoveryError> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for method in methods {
        *seen.entry(method.declaring_class.as_str()).or_insert(0) += 1;
    }
    if let Some((_, count)) = seen.iter().find(|(_, count)| **count > 1) {
        return Err(DiscoveryError::DuplicateLifecycleRole {
            class_name: class_name.to_string(),
            role,
            count: *count,
        });
    }
    Ok(())
}

fn normalize_supplier_output<A>(
    output: SupplierOutput<A>,
) -> Option<Vec<Argument<A>>> {
    match output {
        SupplierOutput::None => None,
        SupplierOutput::SingleRaw(value) => Some(vec![Argument::new(Argument::<A>::synthesized_name(0), value)]),
        SupplierOutput::SingleArgument(argument) => Some(vec![argument]),
        SupplierOutput::Many(elements) => Some(
            elements
                .into_iter()
                .enumerate()
                .map(|(index, element)| match element {
                    SupplierElement::Raw(value) => Argument::new(Argument::<A>::synthesized_name(index), value),
                    SupplierElement::Named(argument) => argument,
                })
                .collect(),
        ),
    }
}

fn sort_by_order_then_name<Invoker>(methods: &mut [OrderedMethod<Invoker>]) {
    methods.sort_by(|a, b| {
        a.sort_key()
            .0
            .cmp(&b.sort_key().0)
            .then_with(|| a.sort_key().1.cmp(b.sort_key().1))
    });
}

/// Resolves one class into its descriptor subtree, or `None` if the
/// class is pruned (its supplier returned nothing, or it was filtered
/// out entirely by `options.class_filter`).
pub async fn resolve_class<I: TestClassIntrospector>(
    introspector: &I,
    options: &ResolveOptions<'_>,
) -> Result<Option<ClassDescriptor<I>>, DiscoveryError> {
    let class_name = introspector.class_name().to_string();
    let class_id = UniqueId::engine().with_class(&class_name);

    if let Some(filter) = options.class_filter {
        if !filter.keeps_class_name(&class_name) || !filter.keeps_tags(introspector.tags()) {
            debug!(class = %class_name, "pruned by class/tag filter");
            return Ok(None);
        }
    }

    let mut prepare_methods = introspector.prepare_methods();
    let mut conclude_methods = introspector.conclude_methods();
    let mut before_all_methods = introspector.before_all_methods();
    let mut after_all_methods = introspector.after_all_methods();

    validate_unique_per_declaring_class(&prepare_methods, &class_name, "Prepare")?;
    validate_unique_per_declaring_class(&conclude_methods, &class_name, "Conclude")?;
    validate_unique_per_declaring_class(&before_all_methods, &class_name, "BeforeAll")?;
    validate_unique_per_declaring_class(&after_all_methods, &class_name, "AfterAll")?;

    sort_by_order_then_name(&mut prepare_methods);
    sort_by_order_then_name(&mut conclude_methods);
    sort_by_order_then_name(&mut before_all_methods);
    sort_by_order_then_name(&mut after_all_methods);

    let supplier = introspector.argument_supplier();
    let supplier_output = supplier
        .supply()
        .await
        .map_err(|source| DiscoveryError::SupplierFailed {
            class_name: class_name.clone(),
            source,
        })?;

    let Some(raw_arguments) = normalize_supplier_output(supplier_output) else {
        debug!(class = %class_name, "supplier returned nothing, class pruned");
        return Ok(None);
    };

    let mut arguments = Vec::new();
    for (index, argument) in raw_arguments.into_iter().enumerate() {
        if let Some(selected) = options.selected_argument_indices {
            if !selected.contains(&index) {
                continue;
            }
        }

        let mut test_methods = introspector.test_methods();
        test_methods.retain(|spec| !spec.method.disabled);

        let mut specs: Vec<_> = test_methods
            .into_iter()
            .map(|mut spec| {
                validate_unique_per_declaring_class(&spec.before_each, &class_name, "BeforeEach")?;
                validate_unique_per_declaring_class(&spec.after_each, &class_name, "AfterEach")?;
                sort_by_order_then_name(&mut spec.before_each);
                sort_by_order_then_name(&mut spec.after_each);
                Ok(spec)
            })
            .collect::<Result<_, DiscoveryError>>()?;
        specs.sort_by(|a, b| {
            a.method
                .sort_key()
                .0
                .cmp(&b.method.sort_key().0)
                .then_with(|| a.method.sort_key().1.cmp(b.method.sort_key().1))
        });

        if specs.is_empty() {
            debug!(class = %class_name, argument = index, "pruned: no test method children");
            continue;
        }

        let argument_id = class_id.with_argument(index);
        let test_method_descriptors = specs
            .into_iter()
            .map(|spec| TestMethodDescriptor {
                id: argument_id.with_method(spec.method.method_name.clone()),
                before_each_methods: spec.before_each,
                test_method: spec.method,
                after_each_methods: spec.after_each,
            })
            .collect();

        arguments.push(ArgumentDescriptor {
            id: argument_id,
            argument_index: index,
            argument,
            before_all_methods: clone_static_invokers(&before_all_methods),
            after_all_methods: clone_static_invokers(&after_all_methods),
            test_methods: test_method_descriptors,
        });
    }

    arguments.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    if arguments.is_empty() {
        debug!(class = %class_name, "pruned: no argument children");
        return Ok(None);
    }

    let argument_parallelism = crate::config::ResolvedEngineConfig::clamp_argument_parallelism(
        introspector.argument_parallelism(),
        options.argument_parallelism_ceiling,
    );

    debug!(class = %class_name, arguments = arguments.len(), "resolved class");

    Ok(Some(ClassDescriptor {
        id: class_id,
        display_name: introspector.display_name().to_string(),
        prepare_methods,
        conclude_methods,
        argument_parallelism,
        scenario: introspector.is_scenario(),
        arguments,
    }))
}

fn clone_static_invokers<Invoker: Clone>(methods: &[OrderedMethod<Invoker>]) -> Vec<OrderedMethod<Invoker>> {
    methods
        .iter()
        .map(|m| OrderedMethod {
            declaring_class: m.declaring_class.clone(),
            method_name: m.method_name.clone(),
            order: m.order,
            display_name: m.display_name.clone(),
            tags: m.tags.clone(),
            disabled: m.disabled,
            invoke: m.invoke.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::SimpleIntrospector;

    #[tokio::test]
    async fn prunes_class_when_supplier_returns_nothing() {
        let introspector = SimpleIntrospector::new("com.example.Empty").with_no_arguments();
        let options = ResolveOptions {
            argument_parallelism_ceiling: 1,
            ..Default::default()
        };
        let resolved = resolve_class(&introspector, &options).await.unwrap();
        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn builds_tree_with_synthesized_names_for_raw_elements() {
        let introspector = SimpleIntrospector::new("com.example.Basic").with_arguments(vec!["x", "y"]);
        let options = ResolveOptions {
            argument_parallelism_ceiling: 1,
            ..Default::default()
        };
        let class = resolve_class(&introspector, &options).await.unwrap().unwrap();
        assert_eq!(class.arguments.len(), 2);
        assert_eq!(class.arguments[0].argument.name(), "x");
        assert_eq!(class.arguments[1].argument.name(), "y");
    }

    #[tokio::test]
    async fn argument_index_selection_keeps_only_selected_indices() {
        let introspector = SimpleIntrospector::new("com.example.Basic").with_arguments(vec!["x", "y", "z"]);
        let mut selected = HashSet::new();
        selected.insert(1usize);
        let options = ResolveOptions {
            selected_argument_indices: Some(&selected),
            argument_parallelism_ceiling: 1,
            ..Default::default()
        };
        let class = resolve_class(&introspector, &options).await.unwrap().unwrap();
        assert_eq!(class.arguments.len(), 1);
        assert_eq!(class.arguments[0].argument_index, 1);
    }

    #[tokio::test]
    async fn class_name_filter_prunes_whole_class() {
        crate::test_support::init_tracing();
        let introspector = SimpleIntrospector::new("com.example.Basic").with_arguments(vec!["x"]);
        let filter = ClassFilter::parse_filter_file("f", "EXCLUDE CLASS_NAME com\\.example\\..*\n").unwrap();
        let options = ResolveOptions {
            class_filter: Some(&filter),
            argument_parallelism_ceiling: 1,
            ..Default::default()
        };
        let resolved = resolve_class(&introspector, &options).await.unwrap();
        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn class_argument_parallelism_is_clamped_to_the_engine_ceiling() {
        let introspector = SimpleIntrospector::new("com.example.Wide")
            .with_arguments(vec!["x"])
            .with_argument_parallelism(10);
        let options = ResolveOptions {
            argument_parallelism_ceiling: 3,
            ..Default::default()
        };
        let class = resolve_class(&introspector, &options).await.unwrap().unwrap();
        assert_eq!(class.argument_parallelism, 3);
    }

    #[tokio::test]
    async fn class_argument_parallelism_below_ceiling_is_kept_as_declared() {
        let introspector = SimpleIntrospector::new("com.example.Narrow")
            .with_arguments(vec!["x"])
            .with_argument_parallelism(2);
        let options = ResolveOptions {
            argument_parallelism_ceiling: 5,
            ..Default::default()
        };
        let class = resolve_class(&introspector, &options).await.unwrap().unwrap();
        assert_eq!(class.argument_parallelism, 2);
    }

    #[tokio::test]
    async fn duplicate_lifecycle_role_is_a_fatal_discovery_error() {
        let introspector = SimpleIntrospector::new("com.example.Bad")
            .with_arguments(vec!["x"])
            .with_duplicate_before_all();
        let options = ResolveOptions {
            argument_parallelism_ceiling: 1,
            ..Default::default()
        };
        let err = resolve_class(&introspector, &options).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::DuplicateLifecycleRole { .. }));
    }
}
