//! Standard Workload Format I/O.
//!
//! Input: whitespace-separated numeric rows of 18 columns, with `;`-prefixed
//! header/comment lines. Only the `; MaxProcs:` header is interpreted.
//!
//! Output: the same schema describing the simulated execution. Two otherwise
//! unused columns carry per-job metadata: column 17 ("preceding job number")
//! holds the number of under-predictions the job suffered and column 18
//! ("think time") holds the initial prediction.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write as _};
use std::path::Path;

use crate::job::{CarriedColumns, Job};

/// Errors reading an SWF trace.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// Underlying I/O failure.
    #[error("reading trace: {0}")]
    Io(#[from] std::io::Error),
    /// A data row that is not 18 numeric columns.
    #[error("unparseable SWF row at line {line}: {reason}")]
    BadRow {
        /// 1-based line number in the input.
        line: usize,
        /// What was wrong with the row.
        reason: String,
    },
    /// Neither the trace header nor the configuration provide a cluster size.
    #[error("trace has no '; MaxProcs:' header and num_processors is not configured")]
    MissingMaxProcs,
}

/// A parsed workload trace.
#[derive(Debug, Default)]
pub struct Trace {
    /// Cluster size from the `; MaxProcs:` header, when present.
    pub max_procs: Option<u32>,
    /// Jobs in file order.
    pub jobs: Vec<Job>,
}

impl Trace {
    /// Parses a trace from a reader.
    ///
    /// Rows with a non-positive processor request or a negative run time are
    /// not expressible in the simulation and are skipped with a warning.
    pub fn parse(reader: impl BufRead) -> Result<Self, TraceError> {
        let mut trace = Trace::default();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            if let Some(rest) = text.strip_prefix(';') {
                if let Some(value) = rest.trim().strip_prefix("MaxProcs:") {
                    let parsed = value.trim().parse::<u32>().map_err(|_| TraceError::BadRow {
                        line: idx + 1,
                        reason: format!("bad MaxProcs value {value:?}"),
                    })?;
                    trace.max_procs = Some(parsed);
                }
                continue;
            }
            if let Some(job) = parse_row(text, idx + 1)? {
                trace.jobs.push(job);
            }
        }
        Ok(trace)
    }

    /// Parses a trace file.
    pub fn parse_file(path: &Path) -> Result<Self, TraceError> {
        Self::parse(BufReader::new(File::open(path)?))
    }
}

fn field(columns: &[&str], index: usize, line: usize) -> Result<i64, TraceError> {
    let raw = columns[index];
    // Some traces carry fractional values (e.g. average CPU time).
    raw.parse::<i64>()
        .or_else(|_| raw.parse::<f64>().map(|v| v.round() as i64))
        .map_err(|_| TraceError::BadRow {
            line,
            reason: format!("column {} is not numeric: {raw:?}", index + 1),
        })
}

fn parse_row(text: &str, line: usize) -> Result<Option<Job>, TraceError> {
    let columns: Vec<&str> = text.split_whitespace().collect();
    if columns.len() < 18 {
        return Err(TraceError::BadRow {
            line,
            reason: format!("expected 18 columns, found {}", columns.len()),
        });
    }

    let id = field(&columns, 0, line)?;
    let submit_time = field(&columns, 1, line)?;
    let run_time = field(&columns, 3, line)?;
    let allocated = field(&columns, 4, line)?;
    let requested = field(&columns, 7, line)?;
    let requested_time = field(&columns, 8, line)?;

    let processors = if requested > 0 { requested } else { allocated };
    if id < 0 || submit_time < 0 || run_time < 0 || processors <= 0 {
        log::warn!("skipping unusable job at line {line}: {text}");
        return Ok(None);
    }
    let user_estimated = if requested_time > 0 { requested_time } else { run_time };

    let mut job = Job::new(
        id as u64,
        submit_time,
        processors as u32,
        run_time,
        user_estimated,
        field(&columns, 11, line)?,
        field(&columns, 12, line)?,
        field(&columns, 13, line)?,
    );
    job.carried = CarriedColumns {
        avg_cpu_time: field(&columns, 5, line)?,
        used_memory: field(&columns, 6, line)?,
        requested_memory: field(&columns, 9, line)?,
        status: field(&columns, 10, line)?,
        queue: field(&columns, 14, line)?,
        partition: field(&columns, 15, line)?,
    };
    Ok(Some(job))
}

/// Writes the simulated execution of `jobs` as an SWF trace.
///
/// The file is written to a temporary sibling and renamed into place so a
/// crash never leaves a half-written trace behind.
pub fn write_output(path: &Path, num_processors: u32, jobs: &[&Job]) -> std::io::Result<()> {
    let tmp = path.with_extension("swf.tmp");
    {
        let mut w = BufWriter::new(File::create(&tmp)?);
        writeln!(w, "; MaxProcs: {num_processors}")?;
        for job in jobs {
            writeln!(w, "{}", format_row(job))?;
        }
        w.flush()?;
    }
    std::fs::rename(tmp, path)
}

fn format_row(job: &Job) -> String {
    let wait = job.wait_time().unwrap_or(-1);
    let c = &job.carried;
    format!(
        "{} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {}",
        job.id,
        job.submit_time,
        wait,
        job.actual_run_time,
        job.num_required_processors,
        c.avg_cpu_time,
        c.used_memory,
        job.num_required_processors,
        job.user_estimated_run_time,
        c.requested_memory,
        c.status,
        job.user_id,
        job.group_id,
        job.executable_id,
        c.queue,
        c.partition,
        job.num_underpredict,
        job.initial_prediction.unwrap_or(job.user_estimated_run_time),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
; SWF trace
; MaxProcs: 128

1 0 -1 100 4 -1 -1 4 200 -1 1 3 2 9 0 0 -1 -1
2 5 -1 50 -1 -1 -1 8 100 -1 1 3 2 9 0 0 -1 -1
; trailing comment
3 9 -1 -5 2 -1 -1 2 10 -1 0 3 2 9 0 0 -1 -1
";

    #[test]
    fn parses_header_rows_and_skips_unusable() {
        let trace = Trace::parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(trace.max_procs, Some(128));
        // Job 3 has a negative run time and is dropped.
        assert_eq!(trace.jobs.len(), 2);

        let j1 = &trace.jobs[0];
        assert_eq!(j1.id, 1);
        assert_eq!(j1.num_required_processors, 4);
        assert_eq!(j1.actual_run_time, 100);
        assert_eq!(j1.user_estimated_run_time, 200);
        assert_eq!(j1.executable_id, 9);
    }

    #[test]
    fn requested_processors_fall_back_to_allocated() {
        let row = "4 0 -1 10 16 -1 -1 -1 60 -1 1 1 1 1 0 0 -1 -1";
        let trace = Trace::parse(row.as_bytes()).unwrap();
        assert_eq!(trace.jobs[0].num_required_processors, 16);
    }

    #[test]
    fn short_row_is_an_error() {
        let err = Trace::parse("1 2 3".as_bytes()).unwrap_err();
        assert!(matches!(err, TraceError::BadRow { line: 1, .. }));
    }

    #[test]
    fn output_row_carries_prediction_metadata() {
        let trace = Trace::parse(SAMPLE.as_bytes()).unwrap();
        let mut job = trace.jobs[0].clone();
        job.start_time = Some(40);
        job.num_underpredict = 2;
        job.initial_prediction = Some(120);
        let row = format_row(&job);
        let cols: Vec<&str> = row.split_whitespace().collect();
        assert_eq!(cols.len(), 18);
        assert_eq!(cols[2], "40"); // wait
        assert_eq!(cols[16], "2"); // under-predictions
        assert_eq!(cols[17], "120"); // initial prediction
    }
}
