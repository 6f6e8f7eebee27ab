use crosstab::db::Value;
use crosstab::dims::{expand, Axis, DimSpec, Discovered, HeaderPath};
use crosstab::labels::VarLabels;
use crosstab::sql::Predicate;
use crosstab::Result;
use proptest::prelude::*;

/// Chain of row levels `v0 -> v1 -> ...` from (cardinality, has_total) pairs.
fn chain(levels: &[(usize, bool)]) -> DimSpec {
    let mut spec: Option<DimSpec> = None;
    for (i, (_, total)) in levels.iter().enumerate().rev() {
        let mut level = DimSpec::row(format!("v{i}"));
        if *total {
            level = level.with_total();
        }
        if let Some(child) = spec.take() {
            level = level.with_child(child);
        }
        spec = Some(level);
    }
    spec.unwrap()
}

/// Every level `vi` has values 0..n_i under any filter.
fn uniform(levels: Vec<(usize, bool)>) -> impl FnMut(&str, &[Predicate]) -> Result<Vec<Discovered>> {
    move |var, _filters| {
        let i: usize = var[1..].parse().unwrap();
        Ok((0..levels[i].0)
            .rev()
            .map(|v| Discovered::new(Value::Integer(v as i64), 1))
            .collect())
    }
}

fn totals_last(paths: &[HeaderPath], depth: usize) -> bool {
    paths.windows(2).all(|pair| {
        (0..depth).all(|k| {
            let same_prefix = pair[0].entries[..k]
                .iter()
                .zip(&pair[1].entries[..k])
                .all(|(a, b)| a.label == b.label);
            !(same_prefix && pair[0].entries[k].is_total && !pair[1].entries[k].is_total)
        })
    })
}

proptest! {
    #[test]
    fn path_count_is_product_of_level_sizes(
        levels in prop::collection::vec((0usize..4, any::<bool>()), 1..4)
    ) {
        let spec = chain(&levels);
        let mut source = uniform(levels.clone());
        let paths = expand(&[spec], Axis::Row, &mut source, &VarLabels::new()).unwrap();

        let expected: usize = levels.iter().map(|(n, t)| n + usize::from(*t)).product();
        prop_assert_eq!(paths.len(), expected);
        prop_assert!(paths.iter().all(|p| p.len() == levels.len()));
        prop_assert!(totals_last(&paths, levels.len()));
    }

    #[test]
    fn values_sorted_within_level(n in 1usize..8) {
        let mut source = uniform(vec![(n, true)]);
        let paths = expand(&[DimSpec::row("v0").with_total()], Axis::Row, &mut source, &VarLabels::new()).unwrap();
        let values: Vec<Value> = paths[..n].iter().map(|p| p.entries[0].value.clone()).collect();
        let expected: Vec<Value> = (0..n as i64).map(Value::Integer).collect();
        prop_assert_eq!(values, expected);
        prop_assert!(paths[n].entries[0].is_total);
    }
}
