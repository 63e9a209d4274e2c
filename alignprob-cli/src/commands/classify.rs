//! Classify command implementation - score grouped alignment candidates
//!
//! Input is tab-separated `read_id aligned_length score`, one alignment per line.
//! Consecutive lines sharing a read id are the alternative placements of that
//! read. Within a read, placements are aggregated per aligned length.

use anyhow::{Context, Result};
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use alignprob_core::{AlignedLength, AlignmentClass, PosteriorAggregator, Score, ScoreModel};

use crate::config::Config;
use crate::error::{CliError, CliResult};

/// Output column names in order.
pub const OUTPUT_COLUMNS: [&str; 10] = [
    "read_id",
    "aligned_length",
    "score",
    "prob_true",
    "prob_invalid",
    "prob_false",
    "classify",
    "posterior",
    "is_best",
    "call",
];

/// One candidate placement read from the input.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentRecord {
    pub read_id: String,
    pub aligned_length: AlignedLength,
    pub score: Score,
}

/// A placement with everything the model says about it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredAlignment {
    pub record: AlignmentRecord,
    pub prob_true: f64,
    pub prob_invalid: f64,
    pub prob_false: f64,
    pub classify: f64,
    pub posterior: f64,
    pub is_best: bool,
    pub call: AlignmentClass,
}

impl ScoredAlignment {
    pub fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{:.6e}\t{:.6e}\t{:.6e}\t{:.6}\t{:.6}\t{}\t{}",
            self.record.read_id,
            self.record.aligned_length,
            self.record.score,
            self.prob_true,
            self.prob_invalid,
            self.prob_false,
            self.classify,
            self.posterior,
            u8::from(self.is_best),
            self.call,
        )
    }
}

/// Decision parameters shared by every read.
#[derive(Debug, Clone, Copy)]
pub struct ClassifyParams {
    pub prior: f64,
    pub threshold: f64,
}

pub fn execute(
    config: &Config,
    table: Option<PathBuf>,
    input: PathBuf,
    output: Option<PathBuf>,
    match_score: Option<i32>,
    prior: Option<f64>,
    threshold: Option<f64>,
) -> Result<()> {
    let table = table
        .or_else(|| config.model.table.clone())
        .ok_or_else(|| CliError::config("No calibration table given (use --table or model.table)"))?;
    let match_score = match_score.unwrap_or(config.model.match_score);
    if match_score <= 0 {
        return Err(CliError::config(format!("match score must be positive, got {}", match_score)).into());
    }
    let params = ClassifyParams {
        prior: prior.unwrap_or(config.classify.prior),
        threshold: threshold.unwrap_or(config.classify.threshold),
    };
    crate::config::check_probability("prior", params.prior)?;
    crate::config::check_probability("threshold", params.threshold)?;

    log::info!("Loading calibration table: {}", table.display());
    let model = ScoreModel::from_path(match_score, &table).map_err(CliError::from)?;
    // The model is complete before any worker sees it and is never mutated again
    let model = Arc::new(model);

    let reader = open_input(&input)?;
    let mut writer: Box<dyn Write> = match &output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create output: {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    };

    let stats = run(&model, reader, &mut writer, params, config.general.batch_size)?;
    writer.flush()?;

    log::info!(
        "Scored {} alignments from {} reads ({} called true)",
        stats.alignments,
        stats.reads,
        stats.called_true
    );
    Ok(())
}

fn open_input(input: &Path) -> Result<Box<dyn BufRead>> {
    if input.as_os_str() == "-" {
        return Ok(Box::new(BufReader::new(std::io::stdin())));
    }
    if !input.exists() {
        return Err(CliError::file_not_found(input.to_path_buf()).into());
    }
    let file = File::open(input)
        .with_context(|| format!("Failed to open input: {}", input.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub reads: usize,
    pub alignments: usize,
    pub called_true: usize,
}

/// Stream reads from `reader`, scoring `batch_size` reads at a time in parallel
/// and writing results in input order.
pub fn run<R: BufRead, W: Write>(
    model: &ScoreModel,
    reader: R,
    writer: &mut W,
    params: ClassifyParams,
    batch_size: usize,
) -> Result<RunStats> {
    let mut stats = RunStats::default();
    let mut batch: Vec<Vec<AlignmentRecord>> = Vec::with_capacity(batch_size);
    let mut current: Vec<AlignmentRecord> = Vec::new();

    writeln!(writer, "{}", OUTPUT_COLUMNS.join("\t"))?;

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let record = parse_record(idx + 1, trimmed)?;
        if current.first().is_some_and(|r| r.read_id != record.read_id) {
            batch.push(std::mem::take(&mut current));
            if batch.len() >= batch_size {
                flush_batch(model, &mut batch, writer, params, &mut stats)?;
            }
        }
        current.push(record);
    }

    if !current.is_empty() {
        batch.push(current);
    }
    flush_batch(model, &mut batch, writer, params, &mut stats)?;

    Ok(stats)
}

fn flush_batch<W: Write>(
    model: &ScoreModel,
    batch: &mut Vec<Vec<AlignmentRecord>>,
    writer: &mut W,
    params: ClassifyParams,
    stats: &mut RunStats,
) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }
    log::debug!("Scoring batch of {} reads", batch.len());

    let scored: Vec<Vec<ScoredAlignment>> = batch
        .par_iter()
        .map(|records| score_read(model, records, params))
        .collect();

    for read in &scored {
        stats.reads += 1;
        for alignment in read {
            stats.alignments += 1;
            if alignment.call == AlignmentClass::True {
                stats.called_true += 1;
            }
            writeln!(writer, "{}", alignment.to_line())?;
        }
    }

    batch.clear();
    Ok(())
}

/// Parse one `read_id aligned_length score` line.
pub fn parse_record(line_num: usize, line: &str) -> CliResult<AlignmentRecord> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 3 {
        return Err(CliError::invalid_input(
            line_num,
            format!("expected 3 fields, got {}", fields.len()),
        ));
    }

    let aligned_length = fields[1].trim().parse::<AlignedLength>()
        .map_err(|_| CliError::invalid_input(line_num, format!("invalid aligned length: {}", fields[1])))?;
    let score = fields[2].trim().parse::<Score>()
        .map_err(|_| CliError::invalid_input(line_num, format!("invalid score: {}", fields[2])))?;

    Ok(AlignmentRecord {
        read_id: fields[0].to_string(),
        aligned_length,
        score,
    })
}

/// Score every placement of one read. Placements are aggregated per aligned
/// length; output keeps the input order.
pub fn score_read(model: &ScoreModel, records: &[AlignmentRecord], params: ClassifyParams) -> Vec<ScoredAlignment> {
    let mut aggregators: Vec<PosteriorAggregator<'_>> = Vec::new();
    for record in records {
        let idx = match aggregators
            .iter()
            .position(|agg| agg.aligned_length() == Some(record.aligned_length))
        {
            Some(idx) => idx,
            None => {
                aggregators.push(PosteriorAggregator::new(model, record.aligned_length));
                aggregators.len() - 1
            }
        };
        if let Err(e) = aggregators[idx].add_alignment(record.score) {
            log::warn!("Skipping alignment of read {}: {}", record.read_id, e);
        }
    }

    records
        .iter()
        .map(|record| {
            let agg = aggregators
                .iter()
                .find(|agg| agg.aligned_length() == Some(record.aligned_length));
            let posterior = agg.and_then(|a| a.posterior(record.score).ok()).unwrap_or(0.0);
            let is_best = agg.and_then(|a| a.max_score()) == Some(record.score);

            let mut call = model.call(record.aligned_length, record.score, params.prior, params.threshold);
            if call == AlignmentClass::True && posterior < params.threshold {
                call = AlignmentClass::False;
            }

            ScoredAlignment {
                record: record.clone(),
                prob_true: model.prob_true(record.aligned_length, record.score),
                prob_invalid: model.prob_invalid(record.aligned_length, record.score),
                prob_false: model.prob_false(record.aligned_length, record.score),
                classify: model.classify(record.aligned_length, record.score, params.prior),
                posterior,
                is_best,
                call,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const TABLE: &str = "100\t0.9\t50\t0.6\t10\t0.2\n150\t0.8\t60\t0.6\t12\t0.2\n";

    fn model() -> ScoreModel {
        ScoreModel::from_reader(1, Cursor::new(TABLE)).unwrap()
    }

    fn params() -> ClassifyParams {
        ClassifyParams { prior: 0.5, threshold: 0.5 }
    }

    #[test]
    fn test_parse_record() {
        let record = parse_record(1, "read1\t100\t87").unwrap();
        assert_eq!(record.read_id, "read1");
        assert_eq!(record.aligned_length, 100);
        assert_eq!(record.score, 87);

        assert!(matches!(parse_record(4, "read1\t100"), Err(CliError::InvalidInput { line: 4, .. })));
        assert!(parse_record(1, "read1\tabc\t87").is_err());
    }

    #[test]
    fn test_score_read_single_best() {
        let model = model();
        let records: Vec<AlignmentRecord> = [80, 67, 40]
            .iter()
            .map(|&score| AlignmentRecord { read_id: "r".into(), aligned_length: 100, score })
            .collect();

        let scored = score_read(&model, &records, params());
        assert_eq!(scored.len(), 3);
        assert_eq!(scored.iter().filter(|s| s.is_best).count(), 1);
        assert!(scored[0].is_best);

        let total: f64 = scored.iter().map(|s| s.posterior).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_read_groups_by_length() {
        let model = model();
        let records = vec![
            AlignmentRecord { read_id: "r".into(), aligned_length: 100, score: 70 },
            AlignmentRecord { read_id: "r".into(), aligned_length: 150, score: 110 },
        ];
        let scored = score_read(&model, &records, params());
        // Each length is its own candidate set of one
        assert!(scored.iter().all(|s| s.is_best));
        assert!(scored.iter().all(|s| (s.posterior - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_score_read_demotes_ambiguous_true_calls() {
        let model = model();
        let params = ClassifyParams { prior: 0.5, threshold: 0.6 };
        assert_eq!(model.call(100, 67, params.prior, params.threshold), AlignmentClass::True);

        // Two equally good placements split the posterior evenly
        let records = vec![
            AlignmentRecord { read_id: "r".into(), aligned_length: 100, score: 67 },
            AlignmentRecord { read_id: "r".into(), aligned_length: 100, score: 67 },
        ];
        let scored = score_read(&model, &records, params);
        for alignment in &scored {
            assert!((alignment.posterior - 0.5).abs() < 1e-12);
            assert_eq!(alignment.call, AlignmentClass::False);
            assert!(alignment.to_line().ends_with("\tfalse"));
        }

        // A lone placement keeps its call
        let scored = score_read(&model, &records[..1], params);
        assert!((scored[0].posterior - 1.0).abs() < 1e-12);
        assert_eq!(scored[0].call, AlignmentClass::True);
        assert!(scored[0].to_line().ends_with("\ttrue"));
    }

    #[test]
    fn test_run_preserves_order_across_batches() {
        let model = model();
        let input = "# header comment\n\
                     r1\t100\t67\n\
                     r1\t100\t60\n\
                     r2\t100\t70\n\
                     r3\t150\t100\n\
                     r3\t150\t99\n";
        let mut out = Vec::new();
        let stats = run(&model, Cursor::new(input), &mut out, params(), 1).unwrap();

        assert_eq!(stats.reads, 3);
        assert_eq!(stats.alignments, 5);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], OUTPUT_COLUMNS.join("\t"));
        let ids: Vec<&str> = lines[1..].iter().map(|l| l.split('\t').next().unwrap()).collect();
        assert_eq!(ids, ["r1", "r1", "r2", "r3", "r3"]);
        assert!(lines[1..].iter().all(|l| l.split('\t').count() == OUTPUT_COLUMNS.len()));
    }

    #[test]
    fn test_run_reports_bad_line() {
        let model = model();
        let mut out = Vec::new();
        let err = run(&model, Cursor::new("r1\t100\t67\nr2\tx\t1\n"), &mut out, params(), 10).unwrap_err();
        let cli_err = err.downcast_ref::<CliError>().unwrap();
        assert!(matches!(cli_err, CliError::InvalidInput { line: 2, .. }));
    }
}
