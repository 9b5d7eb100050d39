//! Scheduling-decision journal with fast-forward replay.
//!
//! An append-only CSV of `timestamp,job_id` rows, one per started job. On
//! restart the previous journal is renamed to `.saved` and replayed: as long
//! as its head matches the current simulated time and a pending job, the
//! scheduler starts that job without solving. Replay is a three-state
//! machine with one-way transitions: replaying, stopped-clean,
//! stopped-aborted. Journal problems never abort the simulation; they only
//! disable the fast-forward.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write as _};
use std::path::{Path, PathBuf};

use swfsim_core::{JobId, Time};

#[derive(Debug)]
enum ReplayState {
    Replaying(VecDeque<(Time, JobId)>),
    StoppedClean,
    StoppedAborted,
}

/// The journal attached to one simulation's output path.
#[derive(Debug)]
pub(crate) struct Journal {
    path: PathBuf,
    saved_path: PathBuf,
    state: ReplayState,
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

fn read_entries(path: &Path) -> std::io::Result<VecDeque<(Time, JobId)>> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = VecDeque::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        let parse = || -> Option<(Time, JobId)> {
            let (time, id) = text.split_once(',')?;
            Some((time.trim().parse().ok()?, id.trim().parse().ok()?))
        };
        match parse() {
            Some(entry) => entries.push_back(entry),
            None => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("bad journal row at line {}: {text:?}", idx + 1),
                ));
            }
        }
    }
    Ok(entries)
}

impl Journal {
    /// Opens the journal for `output_swf`, consuming any saved journal from
    /// a previous run.
    pub(crate) fn open(output_swf: &Path) -> Self {
        let path = with_suffix(output_swf, ".journal");
        let saved_path = with_suffix(&path, ".saved");

        let state = if !saved_path.exists() && !path.exists() {
            // Nothing to replay; a fresh journal will be written.
            ReplayState::StoppedClean
        } else {
            let prepared = if saved_path.exists() {
                Ok(())
            } else {
                std::fs::rename(&path, &saved_path)
            };
            match prepared.and_then(|()| read_entries(&saved_path)) {
                Ok(entries) => {
                    log::info!("journal replay initialized ({} entries)", entries.len());
                    ReplayState::Replaying(entries)
                }
                Err(err) => {
                    log::warn!("journal replay not possible: {err}");
                    ReplayState::StoppedAborted
                }
            }
        };
        // The live journal is rewritten from scratch as the run proceeds.
        let _ = std::fs::remove_file(&path);
        Journal { path, saved_path, state }
    }

    pub(crate) fn is_replaying(&self) -> bool {
        matches!(self.state, ReplayState::Replaying(_))
    }

    /// Next saved entry, while replaying.
    pub(crate) fn peek(&self) -> Option<(Time, JobId)> {
        match &self.state {
            ReplayState::Replaying(entries) => entries.front().copied(),
            _ => None,
        }
    }

    /// Consumes the head entry.
    pub(crate) fn advance(&mut self) {
        if let ReplayState::Replaying(entries) = &mut self.state {
            entries.pop_front();
        }
    }

    /// Permanently leaves replay; `clean` marks an exhausted journal as
    /// opposed to an aborted one.
    pub(crate) fn stop_replay(&mut self, clean: bool) {
        if !self.is_replaying() {
            return;
        }
        let _ = std::fs::remove_file(&self.saved_path);
        self.state = if clean {
            ReplayState::StoppedClean
        } else {
            ReplayState::StoppedAborted
        };
    }

    /// Appends one started job, replayed or live.
    pub(crate) fn record_start(&mut self, now: Time, job: JobId) {
        let append = || -> std::io::Result<()> {
            let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
            writeln!(file, "{now},{job}")
        };
        if let Err(err) = append() {
            log::warn!("could not append to journal {}: {err}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("swfsim-journal-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn missing_journal_disables_replay_without_error() {
        let dir = tmp_dir("missing");
        let journal = Journal::open(&dir.join("out.swf"));
        assert!(!journal.is_replaying());
        assert_eq!(journal.peek(), None);
    }

    #[test]
    fn journal_round_trip_and_replay() {
        let dir = tmp_dir("roundtrip");
        let out = dir.join("out.swf");

        let mut journal = Journal::open(&out);
        journal.record_start(0, 7);
        journal.record_start(0, 3);
        journal.record_start(120, 11);

        // A restart renames the journal and replays it in order.
        let mut replay = Journal::open(&out);
        assert!(replay.is_replaying());
        assert_eq!(replay.peek(), Some((0, 7)));
        replay.advance();
        assert_eq!(replay.peek(), Some((0, 3)));
        replay.advance();
        assert_eq!(replay.peek(), Some((120, 11)));
        replay.advance();
        assert_eq!(replay.peek(), None);
        replay.stop_replay(true);
        assert!(!replay.is_replaying());
        assert!(!dir.join("out.swf.journal.saved").exists());
    }

    #[test]
    fn corrupt_journal_aborts_replay() {
        let dir = tmp_dir("corrupt");
        let out = dir.join("out.swf");
        std::fs::write(dir.join("out.swf.journal"), "0,7\nnot-a-row\n").unwrap();
        let journal = Journal::open(&out);
        assert!(!journal.is_replaying());
    }

    #[test]
    fn stop_replay_is_one_way() {
        let dir = tmp_dir("oneway");
        let out = dir.join("out.swf");
        std::fs::write(dir.join("out.swf.journal"), "5,1\n").unwrap();
        let mut journal = Journal::open(&out);
        assert!(journal.is_replaying());
        journal.stop_replay(false);
        assert!(!journal.is_replaying());
        assert_eq!(journal.peek(), None);
        journal.stop_replay(true);
        assert!(!journal.is_replaying());
    }
}
