use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use ndarray::ArrayView1;
use ndarray_npy::NpzWriter;
use crate::drivers::{RythmError, SampleBatch};
/// Sessions at least this long stream straight to a text file.
pub const SPILL_THRESHOLD_MIN: u32 = 5;
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordingMode {
    /// Keep everything in memory until an explicit snapshot save.
    Accumulate,
    /// Append every batch to `path` as it arrives.
    Spill { path: PathBuf },
}
/// Raw data of the current session, either held in memory or spilled.
pub struct SessionRecorder {
    mode: RecordingMode,
    ch0: Vec<f64>,
    ch1: Vec<f64>,
    t: Vec<f64>,
    unsaved: bool,
    // bumped on every reset so a snapshot cannot clear a later session's flag
    session: u64,
}
impl Default for SessionRecorder {
    fn default() -> Self {
        Self::new()
    }
}
impl SessionRecorder {
    pub fn new() -> Self {
        Self {
            mode: RecordingMode::Accumulate,
            ch0: Vec::new(),
            ch1: Vec::new(),
            t: Vec::new(),
            unsaved: false,
            session: 0,
        }
    }
    /// Spill file name for a session starting now, e.g. `2026-10-19-14-05.txt`.
    pub fn spill_name_now() -> String {
        chrono::Local::now().format("%Y-%m-%d-%H-%M.txt").to_string()
    }
    /// Starts a new session. The mode chosen here holds until the next reset.
    pub fn reset(&mut self, duration_min: u32, spill_path: impl Into<PathBuf>) {
        self.ch0.clear();
        self.ch1.clear();
        self.t.clear();
        self.unsaved = false;
        self.session += 1;
        self.mode = if duration_min < SPILL_THRESHOLD_MIN {
            RecordingMode::Accumulate
        } else {
            RecordingMode::Spill {
                path: spill_path.into(),
            }
        };
        log::info!("session recorder reset: {:?}", self.mode);
    }
    pub fn mode(&self) -> &RecordingMode {
        &self.mode
    }
    pub fn has_unsaved(&self) -> bool {
        self.unsaved
    }
    /// Samples currently held in memory.
    pub fn len(&self) -> usize {
        self.t.len()
    }
    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }
    /// Records one batch. In spill mode a failed write keeps the batch in
    /// memory (marked unsaved) and still reports the error.
    pub fn append(&mut self, batch: &SampleBatch) -> Result<(), RythmError> {
        let RecordingMode::Spill { path } = &self.mode else {
            self.accumulate(batch);
            return Ok(());
        };
        let written = append_lines(path, batch);
        if written.is_err() {
            self.accumulate(batch);
        }
        written
    }
    fn accumulate(&mut self, batch: &SampleBatch) {
        self.ch0.extend_from_slice(&batch.ch0);
        self.ch1.extend_from_slice(&batch.ch1);
        self.t.extend_from_slice(&batch.t);
        self.unsaved = true;
    }
    /// Copies the in-memory data out, or `None` when there is nothing held.
    pub fn snapshot(&self) -> Option<Snapshot> {
        if self.is_empty() {
            return None;
        }
        Some(Snapshot {
            session: self.session,
            ch0: self.ch0.clone(),
            ch1: self.ch1.clone(),
            t: self.t.clone(),
        })
    }
    /// Clears the unsaved flag if nothing was appended since `snapshot`.
    pub fn mark_saved(&mut self, snapshot: &Snapshot) {
        if snapshot.session == self.session && snapshot.len() == self.len() {
            self.unsaved = false;
        }
    }
}
/// Samples copied out of a recorder so they can be written without holding it.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    session: u64,
    ch0: Vec<f64>,
    ch1: Vec<f64>,
    t: Vec<f64>,
}
impl Snapshot {
    pub fn len(&self) -> usize {
        self.t.len()
    }
    /// Writes a compressed `.npz` with arrays `ch0`, `ch1` and `T`.
    pub fn write_npz(&self, path: &Path) -> Result<PathBuf, RythmError> {
        let path = path.with_extension("npz");
        let file = File::create(&path).map_err(|source| RythmError::Persistence {
            path: path.clone(),
            source,
        })?;
        let mut npz = NpzWriter::new_compressed(BufWriter::new(file));
        npz.add_array("ch0", &ArrayView1::from(self.ch0.as_slice()))?;
        npz.add_array("ch1", &ArrayView1::from(self.ch1.as_slice()))?;
        npz.add_array("T", &ArrayView1::from(self.t.as_slice()))?;
        let mut writer = npz.finish()?;
        writer.flush().map_err(|source| RythmError::Persistence {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}
pub fn lock(recorder: &Mutex<SessionRecorder>) -> MutexGuard<'_, SessionRecorder> {
    recorder.lock().unwrap_or_else(PoisonError::into_inner)
}
/// Saves the in-memory data of a shared recorder to `path` (as `.npz`).
/// The lock is held only to copy the data and to clear the flag, so the
/// engine keeps appending while the archive is compressed. Returns `None`
/// when there was nothing to save.
pub fn save_to_file(
    recorder: &Mutex<SessionRecorder>,
    path: &Path,
) -> Result<Option<PathBuf>, RythmError> {
    let Some(snapshot) = lock(recorder).snapshot() else {
        return Ok(None);
    };
    let written = snapshot.write_npz(path)?;
    lock(recorder).mark_saved(&snapshot);
    log::info!("saved {} samples to {}", snapshot.len(), written.display());
    Ok(Some(written))
}
/// Saves only when there is unsaved data and `confirm` agrees. Both prompts
/// run without the lock. Declining (or cancelling the path prompt) leaves the
/// data in memory only, so it is lost when the process exits.
pub fn save_if_needed(
    recorder: &Mutex<SessionRecorder>,
    confirm: impl FnOnce() -> bool,
    choose_path: impl FnOnce() -> Option<PathBuf>,
) -> Result<Option<PathBuf>, RythmError> {
    if !lock(recorder).has_unsaved() || !confirm() {
        return Ok(None);
    }
    match choose_path() {
        Some(path) => save_to_file(recorder, &path),
        None => Ok(None),
    }
}
fn append_lines(path: &Path, batch: &SampleBatch) -> Result<(), RythmError> {
    let mut text = String::with_capacity(batch.len() * 24);
    for ((ch0, ch1), t) in batch.ch0.iter().zip(&batch.ch1).zip(&batch.t) {
        text.push_str(&format!("{ch0} {ch1} {t}\n"));
    }
    let persist_err = |source| RythmError::Persistence {
        path: path.to_path_buf(),
        source,
    };
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(persist_err)?;
    file.write_all(text.as_bytes()).map_err(persist_err)
}
#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;
    use ndarray_npy::NpzReader;
    use std::sync::{mpsc, Arc};
    use std::thread;
    use std::time::{Duration, Instant};
    fn batch(n: usize, offset: f64) -> SampleBatch {
        SampleBatch {
            ch0: (0..n).map(|i| offset + i as f64).collect(),
            ch1: (0..n).map(|i| -(offset + i as f64)).collect(),
            t: (0..n).map(|i| (i * 20) as f64).collect(),
            elapsed_ms: 10_000,
        }
    }
    #[test]
    fn short_sessions_accumulate_and_mark_unsaved() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = SessionRecorder::new();
        rec.reset(4, dir.path().join("unused.txt"));
        assert_eq!(rec.mode(), &RecordingMode::Accumulate);
        assert!(!rec.has_unsaved());
        rec.append(&batch(3, 0.0)).unwrap();
        assert!(rec.has_unsaved());
        assert_eq!(rec.len(), 3);
        assert!(!dir.path().join("unused.txt").exists());
    }
    #[test]
    fn long_sessions_spill_one_line_per_sample() {
        let dir = tempfile::tempdir().unwrap();
        let spill = dir.path().join("session.txt");
        let mut rec = SessionRecorder::new();
        rec.reset(5, &spill);
        assert!(matches!(rec.mode(), RecordingMode::Spill { .. }));
        rec.append(&batch(3, 1.0)).unwrap();
        rec.append(&batch(2, 10.0)).unwrap();
        assert!(!rec.has_unsaved());
        assert!(rec.is_empty());
        let text = std::fs::read_to_string(&spill).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["1 -1 0", "2 -2 20", "3 -3 40", "10 -10 0", "11 -11 20"]);
    }
    #[test]
    fn failed_spill_falls_back_to_memory() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = SessionRecorder::new();
        rec.reset(10, dir.path().join("missing").join("session.txt"));
        let err = rec.append(&batch(2, 0.0)).unwrap_err();
        assert!(matches!(err, RythmError::Persistence { .. }));
        assert!(rec.has_unsaved());
        assert_eq!(rec.len(), 2);
    }
    fn shared_with(n: usize) -> Mutex<SessionRecorder> {
        let mut rec = SessionRecorder::new();
        rec.reset(1, "unused.txt");
        rec.append(&batch(n, 0.5)).unwrap();
        Mutex::new(rec)
    }
    #[test]
    fn snapshot_save_writes_npz_and_clears_flag() {
        let dir = tempfile::tempdir().unwrap();
        let rec = shared_with(4);
        let written = save_to_file(&rec, &dir.path().join("snap")).unwrap().unwrap();
        assert_eq!(written.extension().unwrap(), "npz");
        assert!(!lock(&rec).has_unsaved());
        let mut npz = NpzReader::new(File::open(&written).unwrap()).unwrap();
        let names = npz.names().unwrap();
        assert_eq!(names.len(), 3);
        let entry = |prefix: &str| names.iter().find(|n| n.starts_with(prefix)).unwrap().clone();
        let ch0: Array1<f64> = npz.by_name(&entry("ch0")).unwrap();
        let t: Array1<f64> = npz.by_name(&entry("T")).unwrap();
        assert_eq!(ch0.to_vec(), vec![0.5, 1.5, 2.5, 3.5]);
        assert_eq!(t.to_vec(), vec![0.0, 20.0, 40.0, 60.0]);
    }
    #[test]
    fn empty_session_saves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let rec = Mutex::new(SessionRecorder::new());
        let target = dir.path().join("empty");
        assert_eq!(save_to_file(&rec, &target).unwrap(), None);
        assert!(!target.with_extension("npz").exists());
    }
    #[test]
    fn save_if_needed_only_prompts_with_unsaved_data() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("exit.npz");
        let rec = Mutex::new(SessionRecorder::new());
        lock(&rec).reset(2, "unused.txt");
        let out = save_if_needed(&rec, || panic!("no prompt without data"), || None).unwrap();
        assert_eq!(out, None);
        lock(&rec).append(&batch(2, 0.0)).unwrap();
        assert_eq!(save_if_needed(&rec, || false, || Some(target.clone())).unwrap(), None);
        assert!(lock(&rec).has_unsaved());
        assert!(!target.exists());
        let saved = save_if_needed(&rec, || true, || Some(target.clone())).unwrap();
        assert_eq!(saved, Some(target.clone()));
        assert!(target.exists());
        assert!(!lock(&rec).has_unsaved());
    }
    #[test]
    fn appends_proceed_while_save_prompt_is_open() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("slow.npz");
        let rec = Arc::new(shared_with(2));
        let (entered_tx, entered_rx) = mpsc::channel();
        let saver = {
            let rec = Arc::clone(&rec);
            let target = target.clone();
            thread::spawn(move || {
                save_if_needed(
                    &rec,
                    move || {
                        entered_tx.send(()).unwrap();
                        thread::sleep(Duration::from_millis(400));
                        true
                    },
                    move || Some(target),
                )
            })
        };
        entered_rx.recv().unwrap();
        let started = Instant::now();
        lock(&rec).append(&batch(3, 10.0)).unwrap();
        assert!(started.elapsed() < Duration::from_millis(200));
        let saved = saver.join().unwrap().unwrap();
        assert_eq!(saved, Some(target));
        // the batch arrived before the copy was taken, so it is in the archive
        assert!(!lock(&rec).has_unsaved());
    }
    #[test]
    fn data_appended_after_snapshot_stays_unsaved() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = SessionRecorder::new();
        rec.reset(1, "unused.txt");
        rec.append(&batch(2, 0.0)).unwrap();
        let snapshot = rec.snapshot().unwrap();
        rec.append(&batch(2, 5.0)).unwrap();
        snapshot.write_npz(&dir.path().join("partial")).unwrap();
        rec.mark_saved(&snapshot);
        assert!(rec.has_unsaved());
        let stale = rec.snapshot().unwrap();
        rec.reset(1, "unused.txt");
        rec.append(&batch(4, 0.0)).unwrap();
        rec.mark_saved(&stale);
        assert!(rec.has_unsaved());
    }
    #[test]
    fn reset_clears_previous_session() {
        let mut rec = SessionRecorder::new();
        rec.reset(1, "unused.txt");
        rec.append(&batch(5, 0.0)).unwrap();
        rec.reset(1, "unused.txt");
        assert!(rec.is_empty());
        assert!(!rec.has_unsaved());
    }
}
