use chrono::Local;
use log::LevelFilter;
use std::io::{self, Write};

use env_logger::{Builder, Target};

/// Environment variable naming a log file that mirrors the console output
pub const LOG_FILE_ENV: &str = "ROAMCTL_LOG_FILE";

/// Multi-writer for logging to both file and stdout
struct DualWriter {
    file: std::fs::File,
    stdout: io::Stdout,
}

impl Write for DualWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write_all(buf)?;
        self.stdout.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.stdout.flush()?;
        Ok(())
    }
}

/// Initialize the process logger.
///
/// `log_file` (or `ROAMCTL_LOG_FILE`) adds a file copy of every line. When the
/// file cannot be opened the logger falls back to the console only.
pub fn init_logger(log_file: Option<&str>) {
    let path = log_file
        .map(str::to_string)
        .or_else(|| std::env::var(LOG_FILE_ENV).ok());

    if let Some(path) = path {
        if let Err(err) = init_dual_logger(&path) {
            eprintln!("Failed to initialize file logger at '{path}': {err}");
            console_builder().init();
        }
    } else {
        console_builder().init();
    }
}

fn console_builder() -> Builder {
    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .target(Target::Stdout)
        .filter_level(LevelFilter::Info)
        .parse_default_env();
    builder
}

/// Log to both a file and the terminal
fn init_dual_logger(path: &str) -> io::Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;

    let dual_writer = DualWriter {
        file,
        stdout: io::stdout(),
    };

    let mut builder = console_builder();
    builder.target(Target::Pipe(Box::new(dual_writer))).init();

    log::info!("Logging to {path} and terminal");

    Ok(())
}
