//! Writing acquired bits to disk as test data.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Local;

use crate::bits::BitString;
use crate::error::{Error, Result};

/// On-disk encoding of exported bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// Literal `'0'`/`'1'` characters.
    Text,
    /// Bits packed into big-endian bytes.
    Binary,
}

impl FileFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Binary => "bin",
        }
    }

    /// Serialize `bits` in this format.
    pub fn encode(self, bits: &BitString) -> Vec<u8> {
        match self {
            Self::Text => bits.to_string().into_bytes(),
            Self::Binary => bits.to_bytes(),
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for FileFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "txt" => Ok(Self::Text),
            "bin" => Ok(Self::Binary),
            other => Err(Error::InvalidInput(format!(
                "unknown file type {other:?}, expected txt or bin"
            ))),
        }
    }
}

/// `<dir>/<YYYY-MM-DD_HH-MM>.<ext>` for the current local time.
pub fn export_path(dir: &Path, format: FileFormat) -> PathBuf {
    let stamp = Local::now().format("%Y-%m-%d_%H-%M");
    dir.join(format!("{stamp}.{}", format.extension()))
}

/// Write `bits` to `path` in `format`.
pub fn write_bits(path: &Path, bits: &BitString, format: FileFormat) -> Result<()> {
    fs::write(path, format.encode(bits)).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_file_types() {
        assert_eq!("txt".parse::<FileFormat>().unwrap(), FileFormat::Text);
        assert_eq!("BIN".parse::<FileFormat>().unwrap(), FileFormat::Binary);
        assert!("csv".parse::<FileFormat>().is_err());
    }

    #[test]
    fn path_carries_timestamp_and_extension() {
        let path = export_path(Path::new("/tmp/out"), FileFormat::Binary);
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with(".bin"));
        // YYYY-MM-DD_HH-MM
        assert_eq!(name.len(), "2024-01-01_00-00.bin".len());
        assert_eq!(&name[10..11], "_");
        assert_eq!(path.parent(), Some(Path::new("/tmp/out")));
    }

    #[test]
    fn writes_text_and_binary() {
        let tmp = tempfile::tempdir().unwrap();
        let bits = BitString::parse("1010000011").unwrap();

        let txt = tmp.path().join("bits.txt");
        write_bits(&txt, &bits, FileFormat::Text).unwrap();
        assert_eq!(fs::read_to_string(&txt).unwrap(), "1010000011");

        let bin = tmp.path().join("bits.bin");
        write_bits(&bin, &bits, FileFormat::Binary).unwrap();
        assert_eq!(fs::read(&bin).unwrap(), vec![0x02, 0x83]);
    }

    #[test]
    fn write_to_missing_directory_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("missing").join("bits.txt");
        let err = write_bits(&path, &BitString::parse("1").unwrap(), FileFormat::Text).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
