use crate::config::Config;
use crate::integrity::{
    classify, Database, FileFingerprint, FileStatus, HandledSet, ScanStats, Store,
};
use crate::notify::Notifier;
use crate::progress;
use crate::run_log::{ErrorLog, RunLog};
use crate::schedule::CheckpointTimer;
use anyhow::{Context, Result};
use chrono::Utc;
use indicatif::ProgressBar;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

const CORRUPTION_TITLE: &str = "Corruption";

/// Drives one run: walks the tree, fingerprints every regular file, and keeps
/// the database and checkpoint up to date so the run can be resumed.
pub struct IntegrityChecker<'a> {
    store: &'a Store,
    notifier: &'a dyn Notifier,
    log: RunLog,
    errors: ErrorLog,
    database: Database,
    handled: HandledSet,
    timer: CheckpointTimer,
    stats: ScanStats,
    spinner: Option<ProgressBar>,
}

impl<'a> IntegrityChecker<'a> {
    /// Load prior state and mark the run as in progress.
    ///
    /// Fails without touching the database if it cannot be parsed.
    pub fn open(config: &Config, store: &'a Store, notifier: &'a dyn Notifier) -> Result<Self> {
        let started_at = Utc::now();
        let log = RunLog::create(config, started_at)?;
        let errors = ErrorLog::create(config, started_at)?;

        let loaded = match store.load() {
            Ok(loaded) => loaded,
            Err(e) => {
                log.error(format!("Failed to load database: {}", e));
                return Err(e).context("Failed to load database");
            }
        };
        if loaded.recovered_from_backup {
            log.error(format!(
                "Database was corrupted! Restored {} from {}",
                store.database_path().display(),
                store.backup_path().display()
            ));
        }
        if let Some(reason) = &loaded.discarded_backup {
            log.error(format!(
                "Discarded incomplete backup {}: {}",
                store.backup_path().display(),
                reason
            ));
        }

        let handled = store
            .load_checkpoint()
            .context("Failed to load scan checkpoint")?;
        // Written immediately so a run killed before its first save still resumes
        store
            .save_checkpoint(&handled)
            .context("Failed to write scan checkpoint")?;
        log.info(format!(
            "Started with {} files already checked",
            handled.len()
        ));

        Ok(Self {
            store,
            notifier,
            log,
            errors,
            database: loaded.database,
            handled,
            timer: CheckpointTimer::from_config(config),
            stats: ScanStats::default(),
            spinner: None,
        })
    }

    pub fn with_spinner(mut self, spinner: ProgressBar) -> Self {
        self.spinner = Some(spinner);
        self
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn handled(&self) -> &HandledSet {
        &self.handled
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    pub fn run_log(&self) -> &RunLog {
        &self.log
    }

    /// Scan `root` and finish the run
    pub fn run(mut self, root: &Path) -> Result<ScanStats> {
        self.check_dir(root)?;
        self.clean_up()
    }

    /// Depth-first walk of `root`.
    ///
    /// Symlinks are never followed or hashed. A directory that cannot be
    /// listed is logged and its subtree skipped; the root itself must be
    /// readable, since an empty walk would prune the whole database.
    pub fn check_dir(&mut self, root: &Path) -> Result<()> {
        std::fs::read_dir(root)
            .with_context(|| format!("Failed to read root directory: {}", root.display()))?;

        let walker = WalkDir::new(root).follow_links(false).sort_by_file_name();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| root.display().to_string());
                    self.log
                        .error(format!("Error trying to access {}: {}", path, e));
                    continue;
                }
            };

            let file_type = entry.file_type();
            if file_type.is_symlink() {
                tracing::debug!("Skipping symlink {}", entry.path().display());
                continue;
            }
            if file_type.is_dir() {
                continue;
            }
            if !file_type.is_file() {
                tracing::debug!("Skipping special file {}", entry.path().display());
                continue;
            }

            self.handle_file(entry.path())?;
        }
        Ok(())
    }

    /// Fingerprint one file and apply the classification.
    ///
    /// Only persistence failures are returned; problems with the file itself
    /// are logged and the walk continues.
    pub fn handle_file(&mut self, path: &Path) -> Result<()> {
        let Some(key) = path_key(path) else {
            self.log.warn(format!(
                "Skipping {}: path cannot be stored",
                path.display()
            ));
            return Ok(());
        };

        if self.handled.contains(&key) {
            self.stats.resumed_files += 1;
            return Ok(());
        }

        match FileFingerprint::from_path(path) {
            Ok(current) => self.apply(key, current),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // Gone since it was listed; its entry is pruned at clean-up
                self.log.info(format!("File disappeared before hashing: {}", key));
            }
            Err(e) => {
                // Keep the prior fingerprint: a read failure must not erase the baseline
                self.log.error(format!("Failed to read {}: {}", key, e));
                self.stats.unreadable_files += 1;
                self.mark_handled(key);
            }
        }

        self.checkpoint_if_due()
    }

    fn apply(&mut self, key: String, current: FileFingerprint) {
        let prior = self.database.get(&key).cloned();
        let status = classify(
            prior.as_ref(),
            &current.content_hash,
            current.modification_time,
        );
        self.stats.record(status);

        if let (FileStatus::Corrupted, Some(prior)) = (status, prior.as_ref()) {
            self.report_corruption(&key, prior, &current);
        }
        if status.needs_update() {
            self.database.insert(key.clone(), current);
        }
        self.mark_handled(key);
    }

    fn mark_handled(&mut self, key: String) {
        if let Some(ref sp) = self.spinner {
            progress::update_scan_message(sp, self.handled.len() + 1, &key);
        }
        self.handled.insert(key);
    }

    fn report_corruption(&self, key: &str, old: &FileFingerprint, new: &FileFingerprint) {
        self.log.error(format!("Corruption on {}", key));

        if let Err(e) = self.errors.record(key, old, new) {
            self.log.error(format!("{:#}", e));
        }
        if let Err(e) = self.notifier.send(CORRUPTION_TITLE, key) {
            self.log
                .warn(format!("Failed to send notification for {}: {}", key, e));
        }
    }

    fn checkpoint_if_due(&mut self) -> Result<()> {
        if self.timer.is_due() {
            self.save_progress()?;
        }
        Ok(())
    }

    /// Persist the checkpoint and database now
    pub fn save_progress(&mut self) -> Result<()> {
        self.store
            .save(&self.database, &self.handled)
            .context("Failed to save progress")?;
        self.timer.reset();
        self.log.info("Saved progress");
        Ok(())
    }

    /// Finish the run: prune entries not seen in this run, drop the checkpoint
    /// and record the completion time, in that order.
    pub fn clean_up(mut self) -> Result<ScanStats> {
        if let Some(sp) = self.spinner.take() {
            progress::finish_and_clear(&sp);
        }

        self.log.info("Removing non-existing");
        let pruned = self
            .store
            .prune(&self.database, &self.handled)
            .context("Failed to prune database")?;
        self.stats.pruned_entries = self.database.len() - pruned.len();
        self.database = pruned;

        self.log.info(format!(
            "Removing {}",
            self.store.checkpoint_path().display()
        ));
        self.store
            .clear_checkpoint()
            .context("Failed to remove scan checkpoint")?;

        self.store
            .mark_run_finished(Utc::now())
            .context("Failed to record run completion")?;
        self.log.info(format!("Finished: {}", self.stats));
        Ok(self.stats)
    }
}

/// Database key for `path`; `None` when it cannot round-trip through the
/// JSON database and the line-based checkpoint
fn path_key(path: &Path) -> Option<String> {
    let key = path.to_str()?;
    if key.contains('\n') || key.contains('\r') {
        return None;
    }
    Some(key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotifyError;
    use std::cell::RefCell;
    use std::fs;
    use std::path::PathBuf;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: RefCell<Vec<(String, String)>>,
    }

    impl Notifier for RecordingNotifier {
        fn send(&self, title: &str, message: &str) -> Result<(), NotifyError> {
            self.sent
                .borrow_mut()
                .push((title.to_string(), message.to_string()));
            Ok(())
        }
    }

    struct FailingNotifier;

    impl Notifier for FailingNotifier {
        fn send(&self, _title: &str, _message: &str) -> Result<(), NotifyError> {
            Err(NotifyError::Transport("connection refused".to_string()))
        }
    }

    struct Fixture {
        _state: TempDir,
        _tree: TempDir,
        root: PathBuf,
        config: Config,
        store: Store,
    }

    fn setup() -> Fixture {
        let state = TempDir::new().unwrap();
        let tree = TempDir::new().unwrap();
        let root = fs::canonicalize(tree.path()).unwrap();
        fs::create_dir_all(root.join("photos/2024")).unwrap();
        fs::write(root.join("photos/2024/a.jpg"), "jpeg bytes").unwrap();
        fs::write(root.join("photos/b.png"), "png bytes").unwrap();
        fs::write(root.join("notes.txt"), "hello").unwrap();

        let config = Config::with_state_dir(state.path());
        let store = Store::new(&config);
        Fixture {
            _state: state,
            _tree: tree,
            root,
            config,
            store,
        }
    }

    fn run_once(fx: &Fixture, notifier: &dyn Notifier) -> ScanStats {
        IntegrityChecker::open(&fx.config, &fx.store, notifier)
            .unwrap()
            .run(&fx.root)
            .unwrap()
    }

    fn key(fx: &Fixture, rel: &str) -> String {
        fx.root.join(rel).to_str().unwrap().to_string()
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        fs::OpenOptions::new()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    /// Rewrite content while keeping the recorded modification time
    fn corrupt(path: &Path, content: &str) {
        let mtime = fs::metadata(path).unwrap().modified().unwrap();
        fs::write(path, content).unwrap();
        set_mtime(path, mtime);
    }

    #[test]
    fn test_first_run_records_every_file() {
        let fx = setup();
        let notifier = RecordingNotifier::default();

        let stats = run_once(&fx, &notifier);

        assert_eq!(stats.new_files, 3);
        assert_eq!(stats.corrupted_files, 0);
        let db = fx.store.load().unwrap().database;
        assert_eq!(db.len(), 3);
        assert!(db.contains_key(&key(&fx, "photos/2024/a.jpg")));
        assert!(!fx.store.has_checkpoint());
        assert!(fx.store.last_run_finished().unwrap().is_some());
        assert!(notifier.sent.borrow().is_empty());
    }

    #[test]
    fn test_unchanged_tree_is_idempotent() {
        let fx = setup();
        let notifier = RecordingNotifier::default();

        run_once(&fx, &notifier);
        let first = fs::read(fx.store.database_path()).unwrap();
        let stats = run_once(&fx, &notifier);
        let second = fs::read(fx.store.database_path()).unwrap();

        assert_eq!(first, second);
        assert_eq!(stats.unchanged_files, 3);
        assert_eq!(stats.pruned_entries, 0);
    }

    #[test]
    fn test_detects_corruption() {
        let fx = setup();
        let notifier = RecordingNotifier::default();
        run_once(&fx, &notifier);

        let victim = fx.root.join("photos/b.png");
        corrupt(&victim, "pnG bytes");

        let stats = run_once(&fx, &notifier);
        assert_eq!(stats.corrupted_files, 1);
        assert_eq!(
            *notifier.sent.borrow(),
            vec![("Corruption".to_string(), key(&fx, "photos/b.png"))]
        );

        // The new fingerprint is stored so the same damage is reported once
        let db = fx.store.load().unwrap().database;
        let expected = FileFingerprint::from_path(&victim).unwrap();
        assert_eq!(db[&key(&fx, "photos/b.png")], expected);

        let stats = run_once(&fx, &notifier);
        assert_eq!(stats.corrupted_files, 0);
        assert_eq!(notifier.sent.borrow().len(), 1);
    }

    #[test]
    fn test_corruption_written_to_error_log() {
        let fx = setup();
        let notifier = RecordingNotifier::default();
        run_once(&fx, &notifier);
        corrupt(&fx.root.join("notes.txt"), "jello");

        let checker = IntegrityChecker::open(&fx.config, &fx.store, &notifier).unwrap();
        let error_path = checker.errors.path().to_path_buf();
        let log_path = checker.run_log().path().to_path_buf();
        checker.run(&fx.root).unwrap();

        let errors = fs::read_to_string(error_path).unwrap();
        assert!(errors.starts_with(&format!("{}: OLD: ", key(&fx, "notes.txt"))));
        let log = fs::read_to_string(log_path).unwrap();
        assert!(log.contains(&format!("ERROR: Corruption on {}", key(&fx, "notes.txt"))));
    }

    #[test]
    fn test_edit_with_new_mtime_is_change() {
        let fx = setup();
        let notifier = RecordingNotifier::default();
        run_once(&fx, &notifier);

        let edited = fx.root.join("notes.txt");
        fs::write(&edited, "hello, edited").unwrap();
        set_mtime(&edited, SystemTime::now() + Duration::from_secs(60));

        let stats = run_once(&fx, &notifier);
        assert_eq!(stats.changed_files, 1);
        assert_eq!(stats.corrupted_files, 0);
        assert!(notifier.sent.borrow().is_empty());
    }

    #[test]
    fn test_notification_failure_does_not_abort() {
        let fx = setup();
        run_once(&fx, &FailingNotifier);
        corrupt(&fx.root.join("notes.txt"), "jello");

        let stats = run_once(&fx, &FailingNotifier);
        assert_eq!(stats.corrupted_files, 1);
        assert!(!fx.store.has_checkpoint());
    }

    #[test]
    fn test_deleted_file_is_pruned() {
        let fx = setup();
        let notifier = RecordingNotifier::default();
        run_once(&fx, &notifier);

        fs::remove_file(fx.root.join("photos/2024/a.jpg")).unwrap();
        let stats = run_once(&fx, &notifier);

        assert_eq!(stats.pruned_entries, 1);
        let db = fx.store.load().unwrap().database;
        assert!(!db.contains_key(&key(&fx, "photos/2024/a.jpg")));
        assert_eq!(db.len(), 2);
    }

    #[test]
    fn test_resumes_from_checkpoint() {
        let fx = setup();
        let notifier = RecordingNotifier::default();
        let done = key(&fx, "notes.txt");

        // State left behind by an interrupted run that already handled notes.txt
        fx.store.load().unwrap();
        let mut db = Database::new();
        db.insert(done.clone(), FileFingerprint::new("00".repeat(32), 1.0));
        let handled: HandledSet = [done.clone()].into_iter().collect();
        fx.store.save(&db, &handled).unwrap();

        let stats = run_once(&fx, &notifier);

        assert_eq!(stats.resumed_files, 1);
        assert_eq!(stats.new_files, 2);
        // Not rehashed, so the recorded fingerprint is untouched
        let db = fx.store.load().unwrap().database;
        assert_eq!(db[&done].content_hash, "00".repeat(32));
        assert!(notifier.sent.borrow().is_empty());
    }

    #[test]
    fn test_open_marks_run_in_progress() {
        let fx = setup();
        let notifier = RecordingNotifier::default();

        let _checker = IntegrityChecker::open(&fx.config, &fx.store, &notifier).unwrap();
        assert!(fx.store.has_checkpoint());
    }

    #[test]
    fn test_periodic_save_writes_checkpoint() {
        let fx = setup();
        let notifier = RecordingNotifier::default();
        let mut config = fx.config.clone();
        config.save_interval = Duration::ZERO;

        let mut checker = IntegrityChecker::open(&config, &fx.store, &notifier).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        checker.handle_file(&fx.root.join("notes.txt")).unwrap();

        let saved = fx.store.load_checkpoint().unwrap();
        assert!(saved.contains(&key(&fx, "notes.txt")));
        let db = fx.store.load().unwrap().database;
        assert!(db.contains_key(&key(&fx, "notes.txt")));
    }

    #[test]
    fn test_recovery_is_logged_as_error() {
        let fx = setup();
        let notifier = RecordingNotifier::default();
        fx.store.load().unwrap();
        fs::write(fx.store.backup_path(), b"{}").unwrap();

        let checker = IntegrityChecker::open(&fx.config, &fx.store, &notifier).unwrap();
        assert!(!fx.store.backup_path().exists());

        let log = fs::read_to_string(checker.run_log().path()).unwrap();
        assert!(log.contains("ERROR: Database was corrupted!"));
    }

    #[test]
    fn test_incomplete_backup_is_logged_and_run_continues() {
        let fx = setup();
        let notifier = RecordingNotifier::default();
        run_once(&fx, &notifier);
        fs::write(fx.store.backup_path(), b"{\"/half").unwrap();

        let checker = IntegrityChecker::open(&fx.config, &fx.store, &notifier).unwrap();
        let log_path = checker.run_log().path().to_path_buf();
        let stats = checker.run(&fx.root).unwrap();

        assert_eq!(stats.unchanged_files, 3);
        assert!(!fx.store.backup_path().exists());
        let log = fs::read_to_string(log_path).unwrap();
        assert!(log.contains("ERROR: Discarded incomplete backup"));
    }

    #[test]
    fn test_corrupt_database_aborts_before_scan() {
        let fx = setup();
        let notifier = RecordingNotifier::default();
        fx.store.load().unwrap();
        fs::write(fx.store.database_path(), b"not json").unwrap();

        assert!(IntegrityChecker::open(&fx.config, &fx.store, &notifier).is_err());
        assert!(!fx.store.has_checkpoint());
        assert_eq!(fs::read(fx.store.database_path()).unwrap(), b"not json");
    }

    #[test]
    fn test_missing_root_is_error() {
        let fx = setup();
        let notifier = RecordingNotifier::default();

        let mut checker = IntegrityChecker::open(&fx.config, &fx.store, &notifier).unwrap();
        assert!(checker.check_dir(&fx.root.join("does-not-exist")).is_err());
    }

    #[test]
    fn test_vanished_file_is_not_handled() {
        let fx = setup();
        let notifier = RecordingNotifier::default();

        let mut checker = IntegrityChecker::open(&fx.config, &fx.store, &notifier).unwrap();
        checker.handle_file(&fx.root.join("ghost.bin")).unwrap();

        assert!(checker.handled().is_empty());
        assert!(checker.database().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_skipped() {
        use std::os::unix::fs::symlink;

        let fx = setup();
        let notifier = RecordingNotifier::default();
        symlink(fx.root.join("notes.txt"), fx.root.join("link.txt")).unwrap();
        symlink(fx.root.join("photos"), fx.root.join("photos-link")).unwrap();

        let stats = run_once(&fx, &notifier);

        assert_eq!(stats.new_files, 3);
        let db = fx.store.load().unwrap().database;
        assert!(!db.contains_key(&key(&fx, "link.txt")));
        assert!(db.keys().all(|k| !k.contains("photos-link")));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let fx = setup();
        let notifier = RecordingNotifier::default();
        let locked = fx.root.join("photos/2024");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Permission bits do not restrict root
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let checker = IntegrityChecker::open(&fx.config, &fx.store, &notifier).unwrap();
        let log_path = checker.run_log().path().to_path_buf();
        let result = checker.run(&fx.root);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let stats = result.unwrap();
        assert_eq!(stats.new_files, 2);
        let db = fx.store.load().unwrap().database;
        assert!(db.contains_key(&key(&fx, "photos/b.png")));
        assert!(db.contains_key(&key(&fx, "notes.txt")));
        assert!(!db.contains_key(&key(&fx, "photos/2024/a.jpg")));
        assert!(!fx.store.has_checkpoint());
        assert!(fx.store.last_run_finished().unwrap().is_some());

        let log = fs::read_to_string(log_path).unwrap();
        assert!(log.contains(&format!(
            "ERROR: Error trying to access {}",
            locked.display()
        )));
    }

    #[test]
    fn test_path_key_rejects_newlines() {
        assert_eq!(path_key(Path::new("/data/a.jpg")), Some("/data/a.jpg".to_string()));
        assert_eq!(path_key(Path::new("/data/two\nlines")), None);
    }
}
