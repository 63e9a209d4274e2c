use alignprob_core::{LoadError, PosteriorAggregator, ScoreModel};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

fn write_table(lines: &[&str]) -> NamedTempFile {
    let mut f = NamedTempFile::new().expect("create temp table");
    for l in lines { writeln!(f, "{}", l).unwrap(); }
    f
}

#[test]
fn aggregator_is_order_independent_on_reference_row() {
    // length 100: weight 0.9, true NB(50, 0.6), invalid NB(10, 0.2)
    let table = write_table(&["#alignprob-calibration v1", "100\t0.9\t50\t0.6\t10\t0.2"]);
    let model = ScoreModel::from_path(1, table.path()).expect("load table");

    let mut forward = PosteriorAggregator::new(&model, 100);
    for s in [80, 95, 60] { forward.add_alignment(s).unwrap(); }

    let mut shuffled = PosteriorAggregator::new(&model, 100);
    for s in [60, 95, 80] { shuffled.add_alignment(s).unwrap(); }

    let a = forward.max_posterior().unwrap();
    let b = shuffled.max_posterior().unwrap();
    assert!((a - b).abs() < 1e-9, "{} vs {}", a, b);
    assert_eq!(forward.max_score(), Some(95));

    for s in [60, 80, 95] {
        let pa = forward.posterior(s).unwrap();
        let pb = shuffled.posterior(s).unwrap();
        assert!((pa - pb).abs() < 1e-9);
    }
}

#[test]
fn negative_true_prob_fails_whole_load() {
    let table = write_table(&[
        "100\t0.9\t50\t0.6\t10\t0.2",
        "150\t0.9\t50\t-0.6\t10\t0.2",
    ]);

    let err = ScoreModel::from_path(1, table.path()).unwrap_err();
    assert!(matches!(err, LoadError::MalformedRow { line: 2, .. }), "{:?}", err);

    // A failed in-place load leaves nothing queryable behind
    let mut model = ScoreModel::new(1);
    assert!(model.load_table(table.path()).is_err());
    assert!(model.is_empty());
    assert_eq!(model.prob_true(100, 80), 0.0);
    assert_eq!(model.calibrated_length(100), None);
}

#[test]
fn missing_table_is_not_found() {
    let err = ScoreModel::from_path(1, "/definitely/not/here.tsv").unwrap_err();
    assert!(matches!(err, LoadError::NotFound { .. }));
}

#[test]
fn row_invariant_violations_are_rejected() {
    for bad in [
        "100\t1.5\t50\t0.6\t10\t0.2",  // weight > 1
        "100\t0.9\t0\t0.6\t10\t0.2",   // size == 0
        "100\t0.9\t50\t0.6\t10\t0",    // prob == 0
        "100\t0.9\t50\t1.2\t10\t0.2",  // prob > 1
        "100\t0.9\t50\tnan\t10\t0.2",  // non-finite
        "-5\t0.9\t50\t0.6\t10\t0.2",   // negative length
        "100\t0.9\t50\t0.6\t10",       // missing column
    ] {
        let table = write_table(&[bad]);
        let err = ScoreModel::from_path(1, table.path()).unwrap_err();
        assert!(matches!(err, LoadError::MalformedRow { .. }), "{}: {:?}", bad, err);
    }
}

#[test]
fn model_is_shared_read_only_across_threads() {
    let table = write_table(&["50\t0.8\t20\t0.5\t5\t0.1", "100\t0.9\t50\t0.6\t10\t0.2"]);
    let model = Arc::new(ScoreModel::from_path(2, table.path()).unwrap());

    let expected: Vec<f64> = (0..8).map(|i| model.classify(100, 150 + i, 0.5)).collect();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let model = Arc::clone(&model);
            std::thread::spawn(move || {
                let mut agg = PosteriorAggregator::new(&model, 100);
                agg.add_alignment(150 + i).unwrap();
                agg.add_alignment(140).unwrap();
                (model.classify(100, 150 + i, 0.5), agg.max_posterior().unwrap())
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let (posterior, max_posterior) = handle.join().unwrap();
        assert_eq!(posterior, expected[i]);
        assert!(max_posterior > 0.0 && max_posterior <= 1.0);
    }
}

#[test]
fn uncalibrated_lengths_fall_back_to_shorter_row() {
    let table = write_table(&["50\t0.8\t20\t0.5\t5\t0.1", "100\t0.9\t50\t0.6\t10\t0.2"]);
    let model = ScoreModel::from_path(1, table.path()).unwrap();

    // 99 is served by the length-50 row, 250 by the length-100 row
    let row50 = model.row(50).unwrap().true_dist;
    let row100 = model.row(100).unwrap().true_dist;
    assert_eq!(model.prob_true(99, 90), row50.pmf(9));
    assert_eq!(model.prob_true(250, 240), row100.pmf(10));

    // Nothing shorter than 50 is calibrated
    assert_eq!(model.classify(30, 30, 0.9), 0.0);
}
