use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Size of the reusable read buffer. Large enough that most files are
/// streamed in a handful of syscalls; refilled in place rather than
/// reallocated per line.
const BUF_SIZE: usize = 256 * 1024 * 1024;

/// Sequentially streams newline-terminated records out of a file without
/// per-line heap churn. Owns one `BUF_SIZE` buffer for its whole lifetime;
/// `next_line()` hands back a borrowed byte slice valid until the next call.
pub struct LineReader {
    file: File,
    buf: Vec<u8>,
    // [pos, filled) is the unconsumed region of `buf`.
    pos: usize,
    filled: usize,
    eof: bool,
}

impl LineReader {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        hint_sequential(&file);
        Ok(Self {
            file,
            buf: vec![0u8; BUF_SIZE],
            pos: 0,
            filled: 0,
            eof: false,
        })
    }

    /// Rewinds to the start of the file and clears any buffered state, so
    /// the reader can be reused for a second pass (e.g. a validation epoch
    /// following a training epoch).
    pub fn reset(&mut self) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.pos = 0;
        self.filled = 0;
        self.eof = false;
        Ok(())
    }

    /// Returns the next line, without its trailing `\n`, or `None` at EOF.
    /// Refills the buffer and rewinds any unconsumed tail to the front
    /// whenever the current fill has no newline left in it.
    pub fn next_line(&mut self) -> io::Result<Option<&[u8]>> {
        loop {
            if let Some(nl) = memchr_newline(&self.buf[self.pos..self.filled]) {
                let line_end = self.pos + nl;
                let line_start = self.pos;
                self.pos = line_end + 1;
                return Ok(Some(trim_cr(&self.buf[line_start..line_end])));
            }

            if self.eof {
                if self.pos < self.filled {
                    let line_start = self.pos;
                    let line_end = self.filled;
                    self.pos = self.filled;
                    return Ok(Some(trim_cr(&self.buf[line_start..line_end])));
                }
                return Ok(None);
            }

            // No newline in the unconsumed region: slide it to the front
            // and read more in behind it.
            if self.pos > 0 {
                self.buf.copy_within(self.pos..self.filled, 0);
                self.filled -= self.pos;
                self.pos = 0;
            }
            if self.filled == self.buf.len() {
                // A single line longer than BUF_SIZE; grow to fit it.
                self.buf.resize(self.buf.len() * 2, 0);
            }
            let n = self.file.read(&mut self.buf[self.filled..])?;
            if n == 0 {
                self.eof = true;
            } else {
                self.filled += n;
            }
        }
    }
}

fn memchr_newline(haystack: &[u8]) -> Option<usize> {
    haystack.iter().position(|&b| b == b'\n')
}

fn trim_cr(line: &[u8]) -> &[u8] {
    if line.last() == Some(&b'\r') {
        &line[..line.len() - 1]
    } else {
        line
    }
}

#[cfg(unix)]
fn hint_sequential(file: &File) {
    use std::os::unix::io::AsRawFd;
    unsafe {
        libc::posix_fadvise(file.as_raw_fd(), 0, 0, libc::POSIX_FADV_SEQUENTIAL);
    }
}

#[cfg(not(unix))]
fn hint_sequential(_file: &File) {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn reads_lines_without_trailing_newline() {
        let f = write_tmp(b"a\nb\nc\n");
        let mut r = LineReader::open(f.path()).unwrap();
        assert_eq!(r.next_line().unwrap(), Some(&b"a"[..]));
        assert_eq!(r.next_line().unwrap(), Some(&b"b"[..]));
        assert_eq!(r.next_line().unwrap(), Some(&b"c"[..]));
        assert_eq!(r.next_line().unwrap(), None);
    }

    #[test]
    fn last_line_without_trailing_newline_is_yielded() {
        let f = write_tmp(b"a\nb");
        let mut r = LineReader::open(f.path()).unwrap();
        assert_eq!(r.next_line().unwrap(), Some(&b"a"[..]));
        assert_eq!(r.next_line().unwrap(), Some(&b"b"[..]));
        assert_eq!(r.next_line().unwrap(), None);
    }

    #[test]
    fn reset_allows_a_second_pass() {
        let f = write_tmp(b"x\ny\n");
        let mut r = LineReader::open(f.path()).unwrap();
        assert_eq!(r.next_line().unwrap(), Some(&b"x"[..]));
        r.reset().unwrap();
        assert_eq!(r.next_line().unwrap(), Some(&b"x"[..]));
        assert_eq!(r.next_line().unwrap(), Some(&b"y"[..]));
    }

    #[test]
    fn strips_carriage_return() {
        let f = write_tmp(b"a\r\nb\r\n");
        let mut r = LineReader::open(f.path()).unwrap();
        assert_eq!(r.next_line().unwrap(), Some(&b"a"[..]));
        assert_eq!(r.next_line().unwrap(), Some(&b"b"[..]));
    }
}
