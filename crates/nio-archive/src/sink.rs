use std::{
    fs::File,
    io::{self, BufWriter, Cursor, Write},
};

/// Append-only destination for archive bytes.
///
/// `close` is called exactly once, after the seek table has been written.
pub trait Sink: Write {
    fn close(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl Sink for File {
    fn close(&mut self) -> io::Result<()> {
        self.flush()?;
        self.sync_all()
    }
}

impl<W: Sink> Sink for BufWriter<W> {
    fn close(&mut self) -> io::Result<()> {
        self.flush()?;
        self.get_mut().close()
    }
}

impl Sink for Vec<u8> {}

impl Sink for Cursor<Vec<u8>> {}
