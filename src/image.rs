//! Bitstream and flash image sources
//!
//! Files are rewound and read from the start. Standard input (`-`) cannot be
//! rewound and is consumed from its current position.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Chunk size used when streaming a bitstream
pub const STREAM_CHUNK_SIZE: usize = 4096;

fn is_stdio(path: &Path) -> bool {
    path == Path::new("-")
}

/// Open `path` for streaming, rewound to the start when seekable
pub fn open_source(path: &Path) -> io::Result<Box<dyn Read>> {
    if is_stdio(path) {
        return Ok(Box::new(io::stdin().lock()));
    }
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(0))?;
    Ok(Box::new(file))
}

/// Read a seekable source completely, starting from offset 0
pub fn read_from_start<R: Read + Seek>(source: &mut R) -> io::Result<Vec<u8>> {
    source.seek(SeekFrom::Start(0))?;
    let mut data = Vec::new();
    source.read_to_end(&mut data)?;
    Ok(data)
}

/// Read a whole image from `path`
pub fn read_image(path: &Path) -> io::Result<Vec<u8>> {
    if is_stdio(path) {
        let mut data = Vec::new();
        io::stdin().lock().read_to_end(&mut data)?;
        return Ok(data);
    }
    read_from_start(&mut File::open(path)?)
}

/// Write `data` to `path`, or standard output for `-`
pub fn write_output(path: &Path, data: &[u8]) -> io::Result<()> {
    if is_stdio(path) {
        let mut stdout = io::stdout().lock();
        stdout.write_all(data)?;
        return stdout.flush();
    }
    std::fs::write(path, data)
}

/// Feed `source` to `sink` in fixed-size chunks, returning the byte count
pub fn stream_chunks<R, F, E>(source: &mut R, mut sink: F) -> Result<usize, E>
where
    R: Read + ?Sized,
    F: FnMut(&[u8]) -> Result<(), E>,
    E: From<io::Error>,
{
    let mut buf = [0u8; STREAM_CHUNK_SIZE];
    let mut total = 0;
    loop {
        let n = match source.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        sink(&buf[..n])?;
        total += n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_from_start_rewinds() {
        let mut cursor = Cursor::new(vec![1u8, 2, 3, 4]);
        cursor.set_position(3);
        assert_eq!(read_from_start(&mut cursor).unwrap(), [1, 2, 3, 4]);
    }

    #[test]
    fn test_stream_chunks_continues_from_position() {
        let data: Vec<u8> = (0..10_000).map(|i| i as u8).collect();
        let mut cursor = Cursor::new(data.clone());
        cursor.set_position(100);

        let mut seen = Vec::new();
        let mut chunks = 0;
        let total = stream_chunks(&mut cursor, |chunk| {
            chunks += 1;
            seen.extend_from_slice(chunk);
            Ok::<(), io::Error>(())
        })
        .unwrap();

        assert_eq!(total, 9_900);
        assert_eq!(seen, &data[100..]);
        assert_eq!(chunks, 3);
    }

    #[test]
    fn test_stream_chunks_stops_on_sink_error() {
        let mut cursor = Cursor::new(vec![0u8; 10_000]);
        let result = stream_chunks(&mut cursor, |_| Err(io::Error::other("sink")));
        assert!(result.is_err());
    }
}
