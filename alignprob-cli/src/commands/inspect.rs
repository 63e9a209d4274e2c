//! Inspect command implementation - validate and summarise a calibration table

use anyhow::{anyhow, Result};
use std::path::PathBuf;

use alignprob_core::{AlignedLength, CalibrationParser, Score, ScoreModel};

use crate::config::Config;
use crate::error::CliError;

pub fn execute(
    config: &Config,
    table: Option<PathBuf>,
    match_score: Option<i32>,
    queries: Vec<String>,
    dump: bool,
) -> Result<()> {
    let table = table
        .or_else(|| config.model.table.clone())
        .ok_or_else(|| CliError::config("No calibration table given (use --table or model.table)"))?;
    let match_score = match_score.unwrap_or(config.model.match_score);

    let model = ScoreModel::from_path(match_score, &table).map_err(CliError::from)?;
    let summary = model.summary();

    println!("Table: {}", table.display());
    println!("Rows: {}", summary.rows);
    if let (Some(min), Some(max)) = (summary.min_length, summary.max_length) {
        println!("Aligned lengths: {}..={}", min, max);
    }
    println!("Mean mixture weight: {:.4}", summary.mean_weight);
    println!("Match score: {}", summary.match_score);

    for query in &queries {
        let (len, score) = parse_query(query)?;
        let served_by = model
            .calibrated_length(len)
            .map_or_else(|| "uncalibrated".to_string(), |l| l.to_string());
        println!(
            "{}:{}\trow={}\tprob_true={:.6e}\tprob_invalid={:.6e}\tprob_false={:.6e}\tclassify={:.6}",
            len,
            score,
            served_by,
            model.prob_true(len, score),
            model.prob_invalid(len, score),
            model.prob_false(len, score),
            model.classify(len, score, config.classify.prior),
        );
    }

    if dump {
        print!("{}", CalibrationParser::to_text(model.table()));
    }

    Ok(())
}

/// Parse a `LENGTH:SCORE` query.
fn parse_query(query: &str) -> Result<(AlignedLength, Score)> {
    let (len, score) = query
        .split_once(':')
        .ok_or_else(|| anyhow!("Invalid query '{}': expected LENGTH:SCORE", query))?;
    let len = len.trim().parse::<AlignedLength>()
        .map_err(|_| anyhow!("Invalid aligned length in query '{}'", query))?;
    let score = score.trim().parse::<Score>()
        .map_err(|_| anyhow!("Invalid score in query '{}'", query))?;
    Ok((len, score))
}
