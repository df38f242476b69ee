use std::io;
use std::path::Path;

use async_compression::tokio::bufread::GzipDecoder;
use tokio::fs::File;
use tokio::io::{AsyncRead, BufReader};

/// Byte source handed to a pipeline.
pub type Source = Box<dyn AsyncRead + Send + Unpin>;

/// Open `path` for reading. `-` is stdin; files ending in `.gz` are
/// decompressed on the fly, including multi-member archives produced by
/// concatenating rotated logs.
pub async fn open(path: &Path) -> io::Result<Source> {
    if path == Path::new("-") {
        return Ok(Box::new(tokio::io::stdin()));
    }

    let file = File::open(path).await?;
    if is_gzip(path) {
        let mut decoder = GzipDecoder::new(BufReader::new(file));
        decoder.multiple_members(true);
        Ok(Box::new(decoder))
    } else {
        Ok(Box::new(file))
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}
