use proptest::prelude::*;
use runex_exp::{expand, DefaultSpec, FieldSpec, Override, OverrideValue};

proptest! {
    #[test]
    fn cardinality_is_product_of_axis_lengths(
        axes in prop::collection::vec(prop::collection::vec(any::<i64>(), 1..4), 1..5),
    ) {
        let names: Vec<String> = (0..axes.len()).map(|idx| format!("f{idx}")).collect();
        let spec = DefaultSpec::new(
            names.iter().map(|name| FieldSpec::required(name.clone())).collect(),
        );
        let sweep = Override::grid(
            names
                .iter()
                .zip(&axes)
                .map(|(name, values)| (name.clone(), OverrideValue::many(values.iter().copied()))),
        );
        let sets = expand(&spec, &sweep).unwrap();
        let expected: usize = axes.iter().map(|axis| axis.len()).product();
        prop_assert_eq!(sets.len(), expected);
        for set in &sets {
            prop_assert_eq!(set.len(), names.len());
            for name in &names {
                prop_assert!(set.contains_key(name));
            }
        }
    }

    #[test]
    fn defaults_fill_unsupplied_fields(defaults in prop::collection::vec(any::<i64>(), 1..6)) {
        let spec = DefaultSpec::new(
            defaults
                .iter()
                .enumerate()
                .map(|(idx, value)| FieldSpec::with_default(format!("f{idx}"), *value))
                .collect(),
        );
        let sets = expand(&spec, &Override::empty()).unwrap();
        prop_assert_eq!(sets.len(), 1);
        for (idx, value) in defaults.iter().enumerate() {
            prop_assert_eq!(
                sets[0].get(&format!("f{idx}")),
                Some(&runex_exp::ParamValue::Int(*value))
            );
        }
    }
}
