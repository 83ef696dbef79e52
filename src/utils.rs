use std::io::{self, Write};

use indicatif::{ProgressBar, ProgressStyle};

pub fn progress_bar(len: u64) -> ProgressBar {
    ProgressBar::new(len).with_style(
        ProgressStyle::with_template("[{elapsed_precise}] {pos}/{len} {percent}% ({eta} left)")
            .expect("hardcoded"),
    )
}

/// Writes log lines to `inner`, hiding the progress bar while each one goes out so the two don't
/// tear each other.
pub struct LogWriter<W> {
    pb: ProgressBar,
    inner: W,
}

impl<W: Write> LogWriter<W> {
    pub fn new(pb: ProgressBar, inner: W) -> Self {
        Self { pb, inner }
    }
}

impl<W: Write> Write for LogWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let inner = &mut self.inner;
        self.pb.suspend(|| inner.write(buf))
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let inner = &mut self.inner;
        self.pb.suspend(|| inner.write_all(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_writer_passes_lines_through() {
        let pb = ProgressBar::hidden();
        pb.set_length(10);
        pb.inc(3);

        let mut writer = LogWriter::new(pb.clone(), Vec::new());
        writeln!(writer, "[1/10] Geocoding: Acme Clinic").unwrap();
        writer.flush().unwrap();

        assert_eq!(writer.inner, b"[1/10] Geocoding: Acme Clinic\n");
        assert_eq!(pb.position(), 3);
    }
}
