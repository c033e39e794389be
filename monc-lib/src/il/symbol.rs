use derive_more::Display;
use serde::{Deserialize, Serialize};

/// A position in a source file. Lines and columns are counted from zero
#[derive(
    Debug, Display, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[display(fmt = "{}:{}", line, column)]
pub struct FileLocation {
    pub line: u32,
    pub column: u32,
}

impl FileLocation {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// One source span bound to one instruction address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    /// empty if the code was generated without a source file
    pub source_file: String,
    pub start: FileLocation,
    pub end: FileLocation,
}

impl Symbol {
    pub fn new(source_file: impl Into<String>, start: FileLocation, end: FileLocation) -> Self {
        Self {
            source_file: source_file.into(),
            start,
            end,
        }
    }

    /// a symbol spanning a single line
    pub fn line(source_file: impl Into<String>, line: u32) -> Self {
        Self::new(
            source_file,
            FileLocation::new(line, 0),
            FileLocation::new(line, 0),
        )
    }

    pub fn has_source_file(&self) -> bool {
        !self.source_file.is_empty()
    }

    pub fn covers_line(&self, line: u32) -> bool {
        self.start.line <= line && line <= self.end.line
    }
}
