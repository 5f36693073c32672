use std::fs;

use runex_exp::{
    Campaign, DefaultSpec, FieldSpec, Override, OverrideValue, Runner,
};

const SCRIPT: &str = r#"
seed=0
samples=1000
while [ $# -gt 0 ]; do
    case "$1" in
        --seed) seed=$2; shift 2 ;;
        --samples) samples=$2; shift 2 ;;
        *) shift ;;
    esac
done
awk -v seed="$seed" -v n="$samples" 'BEGIN {
    srand(seed)
    hits = 0
    for (i = 0; i < n; i++) {
        x = rand(); y = rand()
        if (x * x + y * y <= 1) hits++
    }
    printf "%.6f\n", 4 * hits / n
}' > pi.txt
"#;

fn main() {
    let root = std::env::temp_dir().join("runex_pi_sweep");
    let command = vec![
        "sh".to_string(),
        "-c".to_string(),
        SCRIPT.to_string(),
        "sh".to_string(),
    ];
    let defaults = DefaultSpec::new(vec![
        FieldSpec::required("seed"),
        FieldSpec::with_default("samples", 10_000),
    ]);

    let mut campaign = Campaign::create(command, &root, defaults, true).expect("create campaign");
    let sweep = Override::grid([("seed", OverrideValue::many([1, 2, 3, 4]))]);
    let recorded = campaign
        .run_missing(&Runner::parallel(2), &sweep, 1)
        .expect("run sweep");
    println!("recorded {recorded} runs under {}", root.display());

    for (result, artifacts) in campaign.all_results().expect("results") {
        let pi = artifacts
            .get("pi.txt")
            .and_then(|path| fs::read_to_string(path).ok())
            .unwrap_or_default();
        println!(
            "seed={} -> pi~{} ({}s, exit {})",
            result.params["seed"],
            pi.trim(),
            result.time,
            result.exitcode
        );
    }
}
