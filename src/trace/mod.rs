use anyhow::{Result, anyhow, bail};
use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

const TRACE_DIR_NAME: &str = "gemini_chat/traces";
const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");

/// Append-only log of everything a session sent and received.
///
/// Cheap to clone; all clones write to the same file.
#[derive(Clone)]
pub struct SessionTrace {
    inner: Arc<TraceInner>,
}

struct TraceInner {
    writer: Mutex<BufWriter<File>>,
    file_path: PathBuf,
    write_failed: AtomicBool,
    warnings: WarningSink,
}

enum WarningSink {
    Stderr,
    #[cfg(test)]
    Buffer(Arc<Mutex<Vec<String>>>),
}

impl SessionTrace {
    pub fn create(session_id: &str) -> Result<Self> {
        let trace_dir = resolve_trace_dir_from_env()?;
        Self::create_in_dir(session_id, &trace_dir)
    }

    pub(crate) fn create_in_dir(session_id: &str, trace_dir: &Path) -> Result<Self> {
        fs::create_dir_all(trace_dir).map_err(|err| {
            anyhow!(
                "Failed to create trace directory {}: {err}",
                trace_dir.display()
            )
        })?;

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |duration| duration.as_secs());
        let file_path = trace_dir.join(format!("session-{session_id}-{timestamp}.log"));
        let file = create_trace_file(&file_path)
            .map_err(|err| anyhow!("Failed to create trace file {}: {err}", file_path.display()))?;

        Ok(Self::from_file(file, file_path, WarningSink::Stderr))
    }

    fn from_file(file: File, file_path: PathBuf, warnings: WarningSink) -> Self {
        Self {
            inner: Arc::new(TraceInner {
                writer: Mutex::new(BufWriter::new(file)),
                file_path,
                write_failed: AtomicBool::new(false),
                warnings,
            }),
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.inner.file_path
    }

    pub fn log_session_start(&self, model: &str, mode: &str) {
        self.log_single("session", &format!("mode={mode} model={model}"));
    }

    pub fn log_user_input(&self, text: &str) {
        self.log_lines("ai.in", text);
    }

    pub fn log_reply(&self, text: &str) {
        self.log_lines("ai.out", text);
    }

    pub fn log_error(&self, message: &str) {
        self.log_lines("ai.err", message);
    }

    pub fn log_fallback(&self, from: &str, to: &str) {
        self.log_single("ai.fallback", &format!("{from} -> {to}"));
    }

    /// `headers` are `name: value` lines, already redacted by the caller.
    pub fn log_http_request(&self, method: &str, url: &str, headers: &[String], body: &str) {
        self.log_single("ai.http.in", &format!("{method} {url}"));
        self.log_each("ai.http.in", headers);
        self.log_lines("ai.http.in", body);
    }

    pub fn log_http_response(&self, status: u16, headers: &[String], body: &str) {
        self.log_single("ai.http.out", &format!("HTTP {status}"));
        self.log_each("ai.http.out", headers);
        self.log_lines("ai.http.out", body);
    }

    pub fn log_http_error(&self, message: &str) {
        self.log_single("ai.http.err", message);
    }

    fn log_each(&self, kind: &str, lines: &[String]) {
        for line in lines {
            self.log_single(kind, line);
        }
    }

    fn log_lines(&self, kind: &str, text: &str) {
        if text.is_empty() {
            self.log_single(kind, "<empty>");
            return;
        }

        for line in text.lines() {
            self.log_single(kind, line);
        }
    }

    fn log_single(&self, kind: &str, text: &str) {
        let timestamp = format_timestamp(OffsetDateTime::now_utc());
        self.write_raw(&format!("[{timestamp}] [{kind:<11}] {text}\n"));
    }

    fn write_raw(&self, text: &str) {
        let Ok(mut writer) = self.inner.writer.lock() else {
            self.report_write_failure("failed to acquire trace writer lock");
            return;
        };

        if writer.write_all(text.as_bytes()).is_err() || writer.flush().is_err() {
            self.report_write_failure("failed to write to trace file");
        }
    }

    fn report_write_failure(&self, message: &str) {
        if self.inner.write_failed.swap(true, Ordering::Relaxed) {
            return;
        }
        let warning = format!("gemini_chat trace warning: {message}");
        match &self.inner.warnings {
            WarningSink::Stderr => eprintln!("{warning}"),
            #[cfg(test)]
            WarningSink::Buffer(buffer) => {
                if let Ok(mut warnings) = buffer.lock() {
                    warnings.push(warning);
                }
            }
        }
    }
}

#[cfg(unix)]
fn create_trace_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn create_trace_file(path: &Path) -> std::io::Result<File> {
    File::create(path)
}

fn format_timestamp(at: OffsetDateTime) -> String {
    at.format(TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

pub fn resolve_trace_dir_from_env() -> Result<PathBuf> {
    let xdg_state = env::var("XDG_STATE_HOME").ok();
    let home = dirs::home_dir();
    resolve_trace_dir(xdg_state.as_deref(), home.as_deref())
}

fn resolve_trace_dir(xdg_state_home: Option<&str>, home_dir: Option<&Path>) -> Result<PathBuf> {
    if let Some(xdg) = xdg_state_home {
        let trimmed = xdg.trim();
        if trimmed.is_empty() {
            bail!("Failed to resolve trace path: XDG_STATE_HOME is set but empty");
        }
        return Ok(PathBuf::from(trimmed).join(TRACE_DIR_NAME));
    }

    let home = home_dir
        .ok_or_else(|| anyhow!("Failed to resolve trace path: HOME directory is unavailable"))?;
    Ok(home.join(".local/state").join(TRACE_DIR_NAME))
}
