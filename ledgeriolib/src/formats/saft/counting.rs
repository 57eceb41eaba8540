use std::io::{self, BufRead, Read};

/// Обёртка над `BufRead`: считает прочитанные байты и строки, чтобы у
/// ошибок разбора была позиция без буферизации документа.
pub struct CountingReader<R> {
    inner: R,
    consumed: u64,
    newlines: u64,
}

impl<R: BufRead> CountingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            consumed: 0,
            newlines: 0,
        }
    }

    pub fn bytes_consumed(&self) -> u64 {
        self.consumed
    }

    /// Номер строки (с 1) следующего непрочитанного байта.
    pub fn line(&self) -> u64 {
        self.newlines + 1
    }
}

impl<R: BufRead> Read for CountingReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let n = {
            let available = self.inner.fill_buf()?;
            let n = available.len().min(out.len());
            out[..n].copy_from_slice(&available[..n]);
            n
        };
        self.consume(n);
        Ok(n)
    }
}

impl<R: BufRead> BufRead for CountingReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        if amt > 0 {
            if let Ok(buf) = self.inner.fill_buf() {
                let upto = amt.min(buf.len());
                self.newlines += buf[..upto].iter().filter(|b| **b == b'\n').count() as u64;
            }
        }
        self.consumed += amt as u64;
        self.inner.consume(amt);
    }
}
