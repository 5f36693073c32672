use std::path::{Path, PathBuf};

use runex_exp::{
    Campaign, DefaultSpec, FieldSpec, Override, OverrideValue, ParamValue, ParameterSet,
    Runner, RunResult,
};
use tempfile::TempDir;

fn defaults() -> DefaultSpec {
    DefaultSpec::new(vec![
        FieldSpec::with_default("p1", "x"),
        FieldSpec::with_default("p2", 3),
        FieldSpec::required("p3"),
    ])
}

fn script() -> Vec<String> {
    vec![
        "sh".to_string(),
        "-c".to_string(),
        "echo stdout; echo stderr >&2; echo file > out.txt".to_string(),
        "sh".to_string(),
    ]
}

fn campaign_root(tmp: &TempDir) -> PathBuf {
    tmp.path().join("temp_campaign")
}

fn new_campaign(root: &Path) -> Campaign {
    Campaign::create(script(), root, defaults(), false).expect("create campaign")
}

fn resolved(p1: ParamValue, p2: i64, p3: i64) -> ParameterSet {
    ParameterSet::from([
        ("p1".to_string(), p1),
        ("p2".to_string(), ParamValue::Int(p2)),
        ("p3".to_string(), ParamValue::Int(p3)),
    ])
}

#[test]
fn create_persists_command_and_defaults() {
    let tmp = TempDir::new().expect("tempdir");
    let campaign = new_campaign(&campaign_root(&tmp));
    assert_eq!(campaign.config().command, script());
    assert_eq!(campaign.config().defaults, defaults());
    assert!(campaign.config().root.is_absolute());
}

#[test]
fn reopen_with_identical_config_succeeds() {
    let tmp = TempDir::new().expect("tempdir");
    let root = campaign_root(&tmp);
    let campaign = new_campaign(&root);
    drop(campaign);

    let campaign = Campaign::create(script(), &root, defaults(), false).expect("reopen");
    assert_eq!(campaign.config().defaults, defaults());
}

#[test]
fn reopen_with_different_defaults_conflicts() {
    let tmp = TempDir::new().expect("tempdir");
    let root = campaign_root(&tmp);
    let campaign = new_campaign(&root);
    drop(campaign);

    let mut changed = defaults();
    changed.fields.push(FieldSpec::with_default("p4", 0));
    let err = Campaign::create(script(), &root, changed, false).expect_err("conflict");
    assert_eq!(err.info().code, "config-conflict");
}

#[test]
fn reopen_with_different_command_conflicts() {
    let tmp = TempDir::new().expect("tempdir");
    let root = campaign_root(&tmp);
    let campaign = new_campaign(&root);
    drop(campaign);

    let other = vec!["sh".to_string(), "-c".to_string(), "true".to_string()];
    let err = Campaign::create(other, &root, defaults(), false).expect_err("conflict");
    assert_eq!(err.info().code, "config-conflict");
}

#[test]
fn overwrite_replaces_conflicting_campaign() {
    let tmp = TempDir::new().expect("tempdir");
    let root = campaign_root(&tmp);
    let campaign = new_campaign(&root);
    drop(campaign);

    let mut changed = defaults();
    changed.fields.push(FieldSpec::with_default("p4", 0));
    let campaign =
        Campaign::create(script(), &root, changed.clone(), true).expect("overwrite");
    assert_eq!(campaign.config().defaults, changed);

    let reloaded = Campaign::load(&root).expect("load");
    assert_eq!(reloaded.config().defaults, changed);
}

#[test]
fn load_missing_campaign_fails() {
    let tmp = TempDir::new().expect("tempdir");
    let err = Campaign::load(campaign_root(&tmp)).expect_err("missing");
    assert_eq!(err.info().code, "campaign-not-found");
}

#[test]
fn missing_runs_over_empty_store_lists_every_combination() {
    let tmp = TempDir::new().expect("tempdir");
    let spec = DefaultSpec::new(vec![
        FieldSpec::required("seed"),
        FieldSpec::with_default("n", 1000),
    ]);
    let campaign =
        Campaign::create(script(), campaign_root(&tmp), spec, false).expect("create");
    let sweep = Override::grid([("seed", OverrideValue::many([1, 2, 3]))]);

    let missing: Vec<ParameterSet> = campaign.missing_runs(&sweep, 1).expect("missing").collect();
    let expected: Vec<ParameterSet> = [1, 2, 3]
        .into_iter()
        .map(|seed| {
            ParameterSet::from([
                ("seed".to_string(), ParamValue::Int(seed)),
                ("n".to_string(), ParamValue::Int(1000)),
            ])
        })
        .collect();
    assert_eq!(missing, expected);
}

#[test]
fn satisfied_combinations_are_skipped() {
    let tmp = TempDir::new().expect("tempdir");
    let mut campaign = new_campaign(&campaign_root(&tmp));

    let first = Override::grid([
        ("p1", OverrideValue::one(0)),
        ("p3", OverrideValue::many([1, 2, 3])),
    ]);
    let recorded = campaign
        .run_missing(&Runner::sequential(), &first, 1)
        .expect("run");
    assert_eq!(recorded, 3);

    // Re-running the same sweep issues nothing.
    assert_eq!(campaign.missing_runs(&first, 1).expect("missing").count(), 0);

    let second = Override::grid([
        ("p1", OverrideValue::one(4)),
        ("p2", OverrideValue::one(1)),
        ("p3", OverrideValue::many([5, 6])),
    ]);
    let missing: Vec<ParameterSet> =
        campaign.missing_runs(&second, 1).expect("missing").collect();
    assert_eq!(
        missing,
        vec![
            resolved(ParamValue::Int(4), 1, 5),
            resolved(ParamValue::Int(4), 1, 6),
        ]
    );
}

#[test]
fn replica_deficit_issues_only_the_remainder() {
    let tmp = TempDir::new().expect("tempdir");
    let mut campaign = new_campaign(&campaign_root(&tmp));

    let combination = resolved(ParamValue::Str("x".to_string()), 3, 1);
    campaign
        .write_result(RunResult::new("seeded", 0.01, 0, combination.clone()))
        .expect("seed result");

    let sweep = Override::grid([("p3", OverrideValue::one(1))]);
    let missing: Vec<ParameterSet> =
        campaign.missing_runs(&sweep, 2).expect("missing").collect();
    assert_eq!(missing, vec![combination.clone()]);

    let recorded = campaign
        .run_missing(&Runner::sequential(), &sweep, 2)
        .expect("run");
    assert_eq!(recorded, 1);
    assert_eq!(campaign.store().count_matching(&combination), 2);
}

#[test]
fn campaign_is_resumable_across_reload() {
    let tmp = TempDir::new().expect("tempdir");
    let root = campaign_root(&tmp);
    let mut campaign = new_campaign(&root);
    let sweep = Override::grid([("p3", OverrideValue::many([1, 2]))]);
    campaign
        .run_missing(&Runner::sequential(), &sweep, 1)
        .expect("run");
    drop(campaign);

    let mut campaign = Campaign::load(&root).expect("load");
    assert_eq!(campaign.missing_runs(&sweep, 1).expect("missing").count(), 0);
    let recorded = campaign
        .run_missing(&Runner::sequential(), &sweep, 1)
        .expect("rerun");
    assert_eq!(recorded, 0);
}

#[test]
fn failed_runs_still_satisfy_the_deficit() {
    let tmp = TempDir::new().expect("tempdir");
    let root = campaign_root(&tmp);
    let failing = vec!["sh".to_string(), "-c".to_string(), "exit 3".to_string()];
    let mut campaign =
        Campaign::create(failing, &root, defaults(), false).expect("create");

    let sweep = Override::grid([("p3", OverrideValue::one(1))]);
    campaign
        .run_missing(&Runner::sequential(), &sweep, 1)
        .expect("run");

    let results = campaign.results_for(&sweep).expect("results");
    let (result, _) = &results[0];
    assert_eq!(result.exitcode, 3);
    assert_eq!(campaign.missing_runs(&sweep, 1).expect("missing").count(), 0);
}

#[test]
fn results_are_paired_with_artifacts() {
    let tmp = TempDir::new().expect("tempdir");
    let mut campaign = new_campaign(&campaign_root(&tmp));
    let sweep = Override::grid([("p3", OverrideValue::many([1, 2]))]);
    campaign
        .run_missing(&Runner::sequential(), &sweep, 1)
        .expect("run");

    let narrowed = Override::grid([("p3", OverrideValue::one(1))]);
    let results = campaign.results_for(&narrowed).expect("results");
    assert_eq!(results.len(), 1);
    let (result, artifacts) = &results[0];
    assert_eq!(result.params.get("p3"), Some(&ParamValue::Int(1)));
    for name in ["stdout", "stderr", "out.txt"] {
        let path = artifacts.get(name).expect("artifact present");
        assert!(path.is_file());
    }

    let everything = campaign.all_results().expect("all results");
    assert_eq!(everything.len(), 2);
}

#[test]
fn parallel_runner_records_every_missing_combination() {
    let tmp = TempDir::new().expect("tempdir");
    let mut campaign = new_campaign(&campaign_root(&tmp));
    let sweep = Override::grid([("p3", OverrideValue::many([1, 2, 3, 4]))]);

    let recorded = campaign
        .run_missing(&Runner::parallel(2), &sweep, 1)
        .expect("run");
    assert_eq!(recorded, 4);
    assert_eq!(campaign.all_results().expect("results").len(), 4);
    assert_eq!(campaign.missing_runs(&sweep, 1).expect("missing").count(), 0);
}
