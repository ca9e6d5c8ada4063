// ==================== REFERENCE CATALOG ====================
// The fixed universe of collectible units (elements by atomic number).
// Loaded once at startup and read-only afterwards.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use thiserror::Error;

pub const BUILTIN_ELEMENT_CATALOG: &str = include_str!("data/elements.json");

/// Universe size used when no catalog entries could be loaded
pub const FALLBACK_CATALOG_SIZE: usize = 118;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to parse element catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read element catalog from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Atomic number → element symbol
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementCatalog {
    symbols: BTreeMap<u32, String>,
}

impl ElementCatalog {
    pub fn builtin() -> Self {
        match Self::from_json_str(BUILTIN_ELEMENT_CATALOG) {
            Ok(catalog) => catalog,
            Err(err) => {
                log::error!("[CATALOG] builtin table unreadable error:{}", err);
                Self::default()
            }
        }
    }

    /// Load an override file, falling back to the builtin table on any failure.
    pub fn load(override_path: Option<&Path>) -> Self {
        if let Some(path) = override_path {
            match Self::from_file(path) {
                Ok(catalog) => {
                    log::info!("[CATALOG] loaded path:{} elements:{}", path.display(), catalog.len());
                    return catalog;
                }
                Err(err) => {
                    log::warn!("[CATALOG] override failed path:{} error:{} - using builtin", path.display(), err);
                }
            }
        }
        Self::builtin()
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let contents = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(data: &str) -> Result<Self, CatalogError> {
        let symbols: BTreeMap<u32, String> = serde_json::from_str(data)?;
        Ok(Self::from_symbols(symbols))
    }

    pub fn from_symbols(symbols: BTreeMap<u32, String>) -> Self {
        // Atomic number 0 is not an element
        let symbols = symbols.into_iter().filter(|(number, _)| *number > 0).collect();
        Self { symbols }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Universe size `T` for percentage computation
    pub fn size(&self) -> usize {
        if self.symbols.is_empty() {
            FALLBACK_CATALOG_SIZE
        } else {
            self.symbols.len()
        }
    }

    pub fn symbol(&self, number: u32) -> Option<&str> {
        self.symbols.get(&number).map(String::as_str)
    }

    pub fn symbols(&self) -> &BTreeMap<u32, String> {
        &self.symbols
    }
}
