use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use super::{Code, Instruction, Symbol};
use crate::utils;

/// A function in its final, linked form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IlFunction {
    pub code: Code,
    /// Only statement and expression boundaries carry a symbol
    pub symbols: BTreeMap<usize, Symbol>,
    /// number of operands the caller prepared, they are copied into the memory of the
    /// new frame
    pub arg_memory_size: usize,
}

impl IlFunction {
    pub fn new(code: impl IntoIterator<Item = Instruction>) -> Self {
        Self {
            code: code.into_iter().collect(),
            symbols: BTreeMap::new(),
            arg_memory_size: 0,
        }
    }

    pub fn with_symbols(mut self, symbols: impl IntoIterator<Item = (usize, Symbol)>) -> Self {
        self.symbols.extend(symbols);
        self
    }

    pub fn with_arg_memory_size(mut self, size: usize) -> Self {
        self.arg_memory_size = size;
        self
    }

    pub fn symbol_at(&self, address: usize) -> Option<&Symbol> {
        self.symbols.get(&address)
    }

    /// the first address at or after `address` that carries a symbol
    pub fn next_symbol_from(&self, address: usize) -> Option<(usize, &Symbol)> {
        self.symbols
            .range(address..)
            .next()
            .map(|(addr, sym)| (*addr, sym))
    }
}

/// A linked module, as delivered by the front end
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IlModule {
    pub defined_functions: Vec<IlFunction>,
    pub undefined_function_names: Vec<String>,
    /// maps exported names to an index into `defined_functions`
    pub exported_functions: BTreeMap<String, usize>,
    pub exported_enum_values: BTreeMap<String, i32>,
    pub strings: Vec<String>,
}

/// Identifies a module instance loaded into a vm
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display(fmt = "module#{}", _0)]
pub struct ModuleId(pub u32);

#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("Could not encode module: {0}")]
    Encode(postcard::Error),

    #[error("Could not decode module: {0}")]
    Decode(postcard::Error),

    #[error("Module was built by version {found:?}, expected {expected:?}")]
    VersionMismatch { found: [u16; 3], expected: [u16; 3] },
}

/// The on-disk form of a module
#[derive(Debug, Serialize, Deserialize)]
struct ModuleFile {
    /// version of the crate that wrote the module
    version: [u16; 3],
    module: IlModule,
}

impl IlModule {
    pub fn new(defined_functions: Vec<IlFunction>) -> Self {
        Self {
            defined_functions,
            ..Self::default()
        }
    }

    pub fn export(mut self, name: impl Into<String>, function: usize) -> Self {
        self.exported_functions.insert(name.into(), function);
        self
    }

    pub fn function(&self, index: usize) -> Option<&IlFunction> {
        self.defined_functions.get(index)
    }

    pub fn function_mut(&mut self, index: usize) -> Option<&mut IlFunction> {
        self.defined_functions.get_mut(index)
    }

    pub fn lookup_function(&self, name: &str) -> Option<usize> {
        self.exported_functions.get(name).copied()
    }

    /// the exported name of a function, if it has one
    pub fn function_name(&self, index: usize) -> Option<&str> {
        self.exported_functions
            .iter()
            .find(|(_, i)| **i == index)
            .map(|(name, _)| name.as_str())
    }

    /// Encodes the module. Breakpoints never end up in the output, the unpatched
    /// instructions are written
    pub fn to_bytes(&self) -> Result<Vec<u8>, ModuleError> {
        let file = ModuleFile {
            version: utils::get_version(),
            module: self.clone(),
        };
        postcard::to_stdvec(&file).map_err(ModuleError::Encode)
    }

    /// decodes a module, rejecting modules from a different major or minor version
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ModuleError> {
        let file: ModuleFile = postcard::from_bytes(bytes).map_err(ModuleError::Decode)?;
        let expected = utils::get_version();
        if file.version[..2] != expected[..2] {
            return Err(ModuleError::VersionMismatch {
                found: file.version,
                expected,
            });
        }
        Ok(file.module)
    }
}
