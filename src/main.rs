#[macro_use]
extern crate log;

use std::env::consts::{ARCH, EXE_SUFFIX, FAMILY, OS};
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::sync::{Arc, Mutex};

use anyhow::Error;
use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, TermLogger, TerminalMode, WriteLogger,
};

use crate::bing::config::LOG_FILE_NAME;
use crate::program::Program;

mod bing;
mod program;

/// Appends the debug log to `bing_image_creator.log` next to the program.
///
/// Flushes every 20 lines, so a download stopped by Ctrl-C still leaves its log on disk.
struct BufferedFileWriter {
    inner: Arc<Mutex<BufWriter<std::fs::File>>>,
    line_count: Arc<Mutex<usize>>,
}

impl BufferedFileWriter {
    fn new() -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(LOG_FILE_NAME)?;

        Ok(Self {
            inner: Arc::new(Mutex::new(BufWriter::with_capacity(16 * 1024, file))),
            line_count: Arc::new(Mutex::new(0)),
        })
    }
}

impl Write for BufferedFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut writer = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("Failed to acquire lock"))?;

        let size = writer.write(buf)?;

        if let Ok(mut count) = self.line_count.lock() {
            let lines = buf.iter().filter(|&&b| b == b'\n').count();
            if lines > 0 {
                *count += lines;
                if *count % 20 == 0 {
                    writer.flush()?;
                }
            }
        }

        Ok(size)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut writer = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("Failed to acquire lock"))?;
        writer.flush()
    }
}

impl Drop for BufferedFileWriter {
    fn drop(&mut self) {
        if let Ok(mut writer) = self.inner.lock() {
            let _ = writer.flush();
        }
    }
}

fn main() -> Result<(), Error> {
    initialize_logger();
    log_system_information();

    // A `.env` file next to the executable may carry the cookie.
    if let Err(e) = dotenvy::dotenv() {
        trace!("No .env file loaded: {}", e);
    }

    let program = Program::new();
    program.run()
}

fn terminal_only_logger() {
    let _ = TermLogger::init(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );
}

/// Initializes the logger with preset filtering and a buffered log file.
fn initialize_logger() {
    let mut config = ConfigBuilder::new();
    config.add_filter_allow_str("bing_image_downloader");

    let file_writer = match BufferedFileWriter::new() {
        Ok(writer) => writer,
        Err(e) => {
            eprintln!("Failed to open {}: {}. Logging will only output to terminal.", LOG_FILE_NAME, e);
            terminal_only_logger();
            return;
        }
    };

    if let Err(e) = CombinedLogger::init(vec![
        TermLogger::new(
            LevelFilter::Info,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(LevelFilter::max(), config.build(), file_writer),
    ]) {
        eprintln!("Failed to initialize combined logger: {}. Falling back to terminal-only logging.", e);
        terminal_only_logger();
    }
}

/// Logs important information about the system being used.
fn log_system_information() {
    trace!("Printing system information out into log for debug purposes...");
    trace!("ARCH:           \"{}\"", ARCH);
    trace!("EXE_SUFFIX:     \"{}\"", EXE_SUFFIX);
    trace!("FAMILY:         \"{}\"", FAMILY);
    trace!("OS:             \"{}\"", OS);
}
