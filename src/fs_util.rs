use std::fs::{self, File};
use std::io::{self, BufWriter, Write};

use camino::Utf8Path;
use tempfile::NamedTempFile;

use crate::error::SeqidxError;

/// Creates `dir`, failing if anything already sits at that path.
pub fn create_fresh_dir(dir: &Utf8Path) -> Result<(), SeqidxError> {
    if let Some(parent) = dir.parent().filter(|parent| !parent.as_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| SeqidxError::filesystem(parent, err))?;
    }
    match fs::create_dir(dir) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            Err(SeqidxError::DestinationExists(dir.to_path_buf()))
        }
        Err(err) => Err(SeqidxError::filesystem(dir, err)),
    }
}

/// Runs `fill` against a temporary file beside `destination` and moves it
/// into place only if `fill` succeeds, so a failed write never leaves a
/// partial file under the final name.
pub fn write_atomically<T, F>(destination: &Utf8Path, fill: F) -> Result<T, SeqidxError>
where
    F: FnOnce(&mut BufWriter<&File>) -> Result<T, SeqidxError>,
{
    let dir = destination
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or(Utf8Path::new("."));
    let temp = tempfile::Builder::new()
        .prefix(".seqidx-")
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(|err| SeqidxError::filesystem(dir, err))?;

    let value = {
        let mut writer = BufWriter::new(temp.as_file());
        let value = fill(&mut writer)?;
        writer
            .flush()
            .map_err(|err| SeqidxError::filesystem(destination, err))?;
        value
    };
    persist(temp, destination)?;
    Ok(value)
}

fn persist(temp: NamedTempFile, destination: &Utf8Path) -> Result<(), SeqidxError> {
    temp.persist(destination)
        .map_err(|err| SeqidxError::filesystem(destination, err.error))?;
    Ok(())
}

pub fn write_bytes_atomic(destination: &Utf8Path, content: &[u8]) -> Result<(), SeqidxError> {
    write_atomically(destination, |writer| {
        writer
            .write_all(content)
            .map_err(|err| SeqidxError::filesystem(destination, err))
    })
}
