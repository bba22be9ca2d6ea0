use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

pub const LOG_LEVEL_ENV: &str = "SALT_GLASS_LOG_LEVEL";

/// Keeps the log file handle alive for the lifetime of the process.
pub struct LogGuard {
    file: Option<Arc<Mutex<File>>>,
}

impl LogGuard {
    pub fn path_hint(role: &str, log_dir: &Path) -> PathBuf {
        log_dir.join(format!("salt-glass-{}.log", sanitize_component(role)))
    }

    pub fn is_file_backed(&self) -> bool {
        self.file.is_some()
    }
}

struct FileWriter {
    file: Option<Arc<Mutex<File>>>,
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.write_all(buf);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
        Ok(())
    }
}

/// The terminal belongs to the dashboard and a worker's stdout belongs to its
/// pipe, so log lines only ever go to a file or nowhere.
pub fn init_logging(role: &str, log_dir: Option<&Path>, debug: bool) -> Option<LogGuard> {
    let level = if debug {
        "debug".to_string()
    } else {
        std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| "info".to_string())
    };
    let filter = if debug {
        EnvFilter::new(level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };
    let guard = match log_dir {
        Some(dir) => match open_log_file(role, dir) {
            Ok(guard) => guard,
            Err(err) => {
                eprintln!("log_file_error: {err}");
                LogGuard { file: None }
            }
        },
        None => LogGuard { file: None },
    };
    let make_writer = match guard.file.clone() {
        Some(file) => BoxMakeWriter::new(move || FileWriter {
            file: Some(file.clone()),
        }),
        None => BoxMakeWriter::new(io::sink),
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(make_writer)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return None;
    }
    Some(guard)
}

fn open_log_file(role: &str, log_dir: &Path) -> io::Result<LogGuard> {
    std::fs::create_dir_all(log_dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(LogGuard::path_hint(role, log_dir))?;
    Ok(LogGuard {
        file: Some(Arc::new(Mutex::new(file))),
    })
}

fn sanitize_component(input: &str) -> String {
    input
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}
