pub mod builders;
pub mod fake_backend;
pub mod fake_catalog;

use std::path::Path;
use std::sync::Once;

use gridstage::fs::mock::MockFileSystem;
use gridstage::layout::StageDirectoryLayout;
use tracing_subscriber::{fmt, EnvFilter};

pub use fake_backend::FakeBackend;
pub use fake_catalog::FakeCatalog;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Seeds virtual worker directories under a stage layout.
///
/// Each worker gets `<outdir>/<cluster>_<process>/` holding its data files
/// and `<bookdir>/<cluster>_<process>/` holding `lar.stat` and the JSON
/// side-cars.
pub struct WorkerTree<'a> {
    fs: &'a MockFileSystem,
    layout: &'a StageDirectoryLayout,
    cluster: u64,
}

impl<'a> WorkerTree<'a> {
    pub fn new(fs: &'a MockFileSystem, layout: &'a StageDirectoryLayout) -> Self {
        fs.add_dir(&layout.outdir);
        fs.add_dir(&layout.logdir);
        fs.add_dir(&layout.workdir);
        fs.add_dir(&layout.bookdir);
        Self {
            fs,
            layout,
            cluster: 1000,
        }
    }

    pub fn cluster(mut self, cluster: u64) -> Self {
        self.cluster = cluster;
        self
    }

    pub fn subdir(&self, process: u32) -> String {
        format!("{}_{}", self.cluster, process)
    }

    /// A worker that finished cleanly with one simulation file.
    pub fn good(&self, process: u32, events: u64) -> String {
        let name = format!("out_{}_{process}.root", self.cluster);
        self.with_file(process, &name, events, None);
        self.status(process, 0);
        name
    }

    /// A worker with its exit status set to `code` and one output file.
    pub fn failed(&self, process: u32, code: i32) {
        let name = format!("out_{}_{process}.root", self.cluster);
        self.with_file(process, &name, 10, None);
        self.status(process, code);
    }

    /// Add a simulation file with an event count and optional stream.
    pub fn with_file(&self, process: u32, name: &str, events: u64, stream: Option<&str>) {
        let sub = self.subdir(process);
        let md = match stream {
            Some(s) => serde_json::json!({ "events": events, "data_stream": s }),
            None => serde_json::json!({ "events": events }),
        };
        self.fs
            .add_file(self.layout.outdir.join(&sub).join(name), "data");
        self.fs.add_file(
            self.layout.bookdir.join(&sub).join(format!("{name}.json")),
            md.to_string(),
        );
    }

    /// Add a data file without side-car (histograms, ntuples).
    pub fn with_aux(&self, process: u32, name: &str) {
        let sub = self.subdir(process);
        self.fs
            .add_file(self.layout.outdir.join(&sub).join(name), "hist");
        self.fs.add_dir(self.layout.bookdir.join(&sub));
    }

    pub fn status(&self, process: u32, code: i32) {
        self.fs.add_file(
            self.layout.bookdir.join(self.subdir(process)).join("lar.stat"),
            format!("{code}\n"),
        );
    }

    /// Write an arbitrary record file into the worker's bookkeeping dir.
    pub fn record(&self, process: u32, name: &str, contents: &str) {
        self.fs.add_file(
            self.layout.bookdir.join(self.subdir(process)).join(name),
            contents,
        );
    }

    pub fn book_subdir(&self, process: u32) -> std::path::PathBuf {
        self.layout.bookdir.join(self.subdir(process))
    }
}

/// Read a bookkeeping file as trimmed, non-empty lines.
pub fn lines(fs: &MockFileSystem, path: &Path) -> Vec<String> {
    gridstage::fs::read_lines(fs, path).unwrap_or_default()
}
