//! Writes a human readable listing of a module, annotated with source snippets

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};

use super::{IlFunction, IlModule, Symbol};

pub struct ListingWriter<W: Write> {
    writer: W,
    /// file contents by path, `None` if the file could not be read
    files: HashMap<String, Option<Vec<String>>>,
}

impl<W: Write> ListingWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            files: HashMap::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn write_module(&mut self, module: &IlModule) -> io::Result<()> {
        for (index, function) in module.defined_functions.iter().enumerate() {
            let name = module.function_name(index).unwrap_or("");
            self.write_function(name, index, function, None)?;
        }
        Ok(())
    }

    /// Writes one function. If `marker` is an address inside the function, the line for
    /// that address is prefixed with an arrow
    pub fn write_function(
        &mut self,
        name: &str,
        index: usize,
        function: &IlFunction,
        marker: Option<usize>,
    ) -> io::Result<()> {
        writeln!(self.writer, "[{}] {}", index, name)?;
        for (address, ins) in function.code.iter_original().enumerate() {
            let prefix = if marker == Some(address) { "->" } else { "  " };
            write!(
                self.writer,
                "{}{:>8}:  {} \t{}",
                prefix, address, ins.op, ins.immediate
            )?;
            if let Some(symbol) = function.symbol_at(address) {
                let snippet = self.snippet(symbol);
                write!(self.writer, "\t; {}", snippet)?;
            }
            writeln!(self.writer)?;
        }
        writeln!(self.writer)
    }

    fn snippet(&mut self, symbol: &Symbol) -> String {
        let Some(lines) = self.file(&symbol.source_file) else {
            return default_snippet(symbol);
        };
        let Some(line) = lines.get(symbol.start.line as usize) else {
            return default_snippet(symbol);
        };

        let col_start = symbol.start.column as usize;
        let col_end = if symbol.end.line != symbol.start.line {
            line.len()
        } else {
            symbol.end.column as usize
        };
        line.get(col_start..col_end)
            .map(str::to_owned)
            .unwrap_or_else(|| default_snippet(symbol))
    }

    fn file(&mut self, path: &str) -> Option<&Vec<String>> {
        if path.is_empty() {
            return None;
        }
        self.files
            .entry(path.to_owned())
            .or_insert_with(|| {
                fs::read_to_string(path)
                    .ok()
                    .map(|src| src.lines().map(str::to_owned).collect())
            })
            .as_ref()
    }
}

fn default_snippet(symbol: &Symbol) -> String {
    format!(
        "<{}; {},{} : {},{}>",
        symbol.source_file,
        symbol.start.line,
        symbol.start.column,
        symbol.end.line,
        symbol.end.column
    )
}

/// renders the listing of a whole module into a string
pub fn module_listing(module: &IlModule) -> io::Result<String> {
    let mut writer = ListingWriter::new(Vec::new());
    writer.write_module(module)?;
    Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
}
