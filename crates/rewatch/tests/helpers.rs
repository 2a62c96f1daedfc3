//! Shared test utilities for rewatch tests
//!
//! `TextBundler` is a tiny line-based engine: it follows `import` lines,
//! evaluates `export default <expr>;` of the entry and renders it as a CJS or
//! ES module. `RecordingBackend` logs watch calls and lets tests inject
//! filesystem events by hand.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rewatch::config::resolve_path;
use rewatch::{
    Artifact, BackendError, BuildError, BundleEngine, FsEvent, FsEventKind, FsEventSender,
    ModuleRecord, OutputFormat, OutputTarget, RenderedChunk, WatchBackend, WatchConfig, WatchEvent,
    Watcher,
};
use serde_json::json;
use tempfile::TempDir;

/// Upper bound for waiting on a single event.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Expected CJS output for `export default <value>;`.
pub fn cjs(value: &str) -> String {
    format!("'use strict';\n\nvar main = {value};\n\nmodule.exports = main;\n")
}

/// Expected ES output for `export default <value>;`.
pub fn es(value: &str) -> String {
    format!("var main = {value};\n\nexport default main;\n")
}

// ---------------------------------------------------------------------------
// Projects on disk
// ---------------------------------------------------------------------------

pub struct Project {
    _dir: TempDir,
    pub root: PathBuf,
}

impl Project {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let root = dir.path().canonicalize().expect("canonicalize temp dir");
        Self { _dir: dir, root }
    }

    /// `main.js` exporting 42.
    pub fn basic() -> Self {
        let project = Self::new();
        project.write("main.js", "export default 42;\n");
        project
    }

    /// `main.js` re-exporting the default of `dep.js`, which is 42.
    pub fn with_dep() -> Self {
        let project = Self::new();
        project.write("main.js", "import dep from './dep.js';\nexport default dep;\n");
        project.write("dep.js", "export default 42;\n");
        project
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn write(&self, name: &str, content: &str) {
        std::fs::write(self.path(name), content).expect("write fixture");
    }

    pub fn read(&self, name: &str) -> String {
        std::fs::read_to_string(self.path(name)).expect("read output")
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).exists()
    }

    /// `main.js` → `bundle.js` as CJS, written to disk.
    pub fn config(&self) -> WatchConfig {
        WatchConfig::new("main.js")
            .cwd(&self.root)
            .dest("bundle.js")
            .format(OutputFormat::Cjs)
            .debounce_ms(20)
    }
}

// ---------------------------------------------------------------------------
// Test engine
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct EngineStats {
    pub builds: AtomicUsize,
    pub cache_hits: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl EngineStats {
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn cache_hits(&self) -> usize {
        self.cache_hits.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TextBundler {
    pub stats: Arc<EngineStats>,
    delay: Option<Duration>,
}

impl TextBundler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spend `delay` "compiling" after reading the sources.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl BundleEngine for TextBundler {
    async fn produce(
        &self,
        config: &WatchConfig,
        cache: Option<Arc<dyn Artifact>>,
    ) -> Result<Arc<dyn Artifact>, BuildError> {
        let current = self.stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_in_flight.fetch_max(current, Ordering::SeqCst);
        self.stats.builds.fetch_add(1, Ordering::SeqCst);
        if cache.is_some() {
            self.stats.cache_hits.fetch_add(1, Ordering::SeqCst);
        }

        let result = bundle(config);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
        result.map(|artifact| Arc::new(artifact) as Arc<dyn Artifact>)
    }
}

struct Parsed {
    /// `(binding, specifier)` per import line.
    imports: Vec<(Option<String>, String)>,
    default: Option<String>,
}

fn parse(file: &Path, source: &str) -> Result<Parsed, BuildError> {
    let mut parsed = Parsed {
        imports: Vec::new(),
        default: None,
    };

    for line in source.lines().map(str::trim) {
        if line.starts_with("import") {
            let quote = line.find(['\'', '"']).ok_or_else(|| parse_error(file, line))?;
            let rest = &line[quote + 1..];
            let end = rest.find(['\'', '"']).ok_or_else(|| parse_error(file, line))?;
            let binding = line
                .strip_prefix("import ")
                .and_then(|l| l.split_once(" from "))
                .map(|(name, _)| name.trim().to_string());
            parsed.imports.push((binding, rest[..end].to_string()));
        } else if let Some(expr) = line.strip_prefix("export default ") {
            parsed.default = Some(expr.trim_end_matches(';').trim().to_string());
        } else if line == "throw;" {
            panic!("engine crashed while bundling {}", file.display());
        } else if line.starts_with("export") {
            return Err(parse_error(file, line));
        }
    }
    Ok(parsed)
}

fn parse_error(file: &Path, line: &str) -> BuildError {
    BuildError::new(format!("Unexpected token in '{line}'"))
        .with_code("PARSE_ERROR")
        .with_file(file)
}

fn bundle(config: &WatchConfig) -> Result<TextArtifact, BuildError> {
    let cwd = config
        .working_dir()
        .map_err(|e| BuildError::new(e.to_string()))?;
    let entry = resolve_path(&cwd, &config.input);
    if !entry.is_file() {
        return Err(BuildError::new(format!(
            "Could not resolve entry ({})",
            config.input.display()
        ))
        .with_code("UNRESOLVED_ENTRY"));
    }

    let mut modules = Vec::new();
    let mut parsed = HashMap::new();
    let mut seen = HashSet::new();
    let mut queue = vec![entry.clone()];
    while let Some(file) = queue.pop() {
        if !seen.insert(file.clone()) {
            continue;
        }
        let source = std::fs::read_to_string(&file)
            .map_err(|e| BuildError::new(e.to_string()).with_file(&file))?;
        let module = parse(&file, &source)?;
        let dir = file.parent().unwrap_or(&cwd).to_path_buf();
        for (_, specifier) in &module.imports {
            let dep = resolve_path(&dir, Path::new(specifier));
            if !dep.is_file() {
                return Err(BuildError::new(format!(
                    "Could not resolve '{specifier}' from {}",
                    file.display()
                ))
                .with_code("UNRESOLVED_IMPORT"));
            }
            queue.push(dep);
        }
        modules.push(ModuleRecord::new(file.to_string_lossy(), source));
        parsed.insert(file, module);
    }
    modules.push(ModuleRecord::new("\0helpers.js", ""));

    let value = evaluate(&entry, &parsed, 0);
    Ok(TextArtifact {
        modules,
        value,
        cwd,
        input: config.input.clone(),
    })
}

fn evaluate(file: &Path, parsed: &HashMap<PathBuf, Parsed>, depth: usize) -> Option<String> {
    let module = parsed.get(file)?;
    let expr = module.default.as_ref()?;
    if depth > 16 {
        return None;
    }
    match module
        .imports
        .iter()
        .find(|(binding, _)| binding.as_deref() == Some(expr.as_str()))
    {
        Some((_, specifier)) => {
            let dir = file.parent()?;
            evaluate(&resolve_path(dir, Path::new(specifier)), parsed, depth + 1)
        }
        None => Some(expr.clone()),
    }
}

#[derive(Debug)]
pub struct TextArtifact {
    modules: Vec<ModuleRecord>,
    value: Option<String>,
    cwd: PathBuf,
    input: PathBuf,
}

#[async_trait]
impl Artifact for TextArtifact {
    fn modules(&self) -> Vec<ModuleRecord> {
        self.modules.clone()
    }

    async fn render(&self, target: &OutputTarget) -> Result<RenderedChunk, BuildError> {
        let value = self.value.as_ref().ok_or_else(|| {
            BuildError::new("Entry module has no default export").with_code("MISSING_EXPORT")
        })?;
        let code = match target.format {
            OutputFormat::Cjs => cjs(value),
            OutputFormat::Es => es(value),
            other => {
                return Err(BuildError::new(format!("Unsupported format: {other}"))
                    .with_code("UNSUPPORTED_FORMAT"));
            }
        };

        let mut chunk = RenderedChunk::new(code);
        if target.source_map().is_enabled() {
            chunk = chunk.with_map(json!({
                "version": 3,
                "file": target.dest.file_name().map(|n| n.to_string_lossy().into_owned()),
                "sources": [self.input.to_string_lossy()],
                "names": [],
                "mappings": "AAAA"
            }));
        }
        Ok(chunk)
    }

    async fn write(&self, target: &OutputTarget) -> Result<(), BuildError> {
        let chunk = self.render(target).await?;
        for (path, content) in rewatch::output::memory_entries(target, chunk)? {
            let path = resolve_path(&self.cwd, &path);
            std::fs::write(&path, content)
                .map_err(|e| BuildError::new(e.to_string()).with_file(&path))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Test backend
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct BackendLog {
    pub watched: Vec<PathBuf>,
    pub unwatched: Vec<PathBuf>,
    pub closed: bool,
}

impl BackendLog {
    /// Paths currently watched according to the call log.
    pub fn active(&self) -> Vec<PathBuf> {
        let mut active: Vec<PathBuf> = Vec::new();
        for path in &self.watched {
            if !active.contains(path) {
                active.push(path.clone());
            }
        }
        for path in &self.unwatched {
            active.retain(|p| p != path);
        }
        active
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    pub log: Arc<Mutex<BackendLog>>,
}

impl WatchBackend for RecordingBackend {
    fn watch(&mut self, path: &Path) -> Result<(), BackendError> {
        let mut log = self.log.lock();
        if log.closed {
            return Err(BackendError::Closed);
        }
        log.watched.push(path.to_path_buf());
        Ok(())
    }

    fn unwatch(&mut self, path: &Path) -> Result<(), BackendError> {
        self.log.lock().unwatched.push(path.to_path_buf());
        Ok(())
    }

    fn close(&mut self) {
        self.log.lock().closed = true;
    }
}

/// A watcher driven by a [`RecordingBackend`].
pub struct Recorded {
    pub watcher: Watcher,
    pub fs: FsEventSender,
    pub log: Arc<Mutex<BackendLog>>,
}

impl Recorded {
    pub fn start<E: BundleEngine + 'static>(engine: E, config: WatchConfig) -> Self {
        let backend = RecordingBackend::default();
        let log = Arc::clone(&backend.log);
        let mut sender = None;
        let watcher = Watcher::with_backend(engine, config, |fs| {
            sender = Some(fs);
            backend
        });
        Self {
            watcher,
            fs: sender.expect("backend factory called"),
            log,
        }
    }

    /// Write `content` to `path` and report it as changed.
    pub fn edit(&self, path: &Path, content: &str) {
        std::fs::write(path, content).expect("write fixture");
        self.notify(FsEventKind::Changed, path);
    }

    pub fn notify(&self, kind: FsEventKind, path: &Path) {
        self.fs
            .send(FsEvent::new(kind, path))
            .expect("build loop is running");
    }
}

// ---------------------------------------------------------------------------
// Event assertions
// ---------------------------------------------------------------------------

pub async fn next_event(watcher: &mut Watcher) -> WatchEvent {
    tokio::time::timeout(EVENT_TIMEOUT, watcher.next_event())
        .await
        .expect("timed out waiting for an event")
        .expect("event stream ended")
}

pub async fn expect_event(watcher: &mut Watcher, code: &str) -> WatchEvent {
    let event = next_event(watcher).await;
    assert_eq!(event.code(), code, "unexpected event: {event}");
    event
}

/// `BUILD_START` followed by `BUILD_END`; returns the latter.
pub async fn expect_build(watcher: &mut Watcher) -> WatchEvent {
    expect_event(watcher, "BUILD_START").await;
    expect_event(watcher, "BUILD_END").await
}

/// `BUILD_START` followed by `ERROR`; returns the latter.
pub async fn expect_failed_build(watcher: &mut Watcher) -> WatchEvent {
    expect_event(watcher, "BUILD_START").await;
    expect_event(watcher, "ERROR").await
}

/// Assert no event arrives within `window`.
pub async fn expect_quiet(watcher: &mut Watcher, window: Duration) {
    if let Ok(Some(event)) = tokio::time::timeout(window, watcher.next_event()).await {
        panic!("expected no event, got {event}");
    }
}

/// Give the backend time to settle before editing a watched file.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(200)).await;
}
