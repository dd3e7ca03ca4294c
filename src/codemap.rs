//! Language-pack collaborator interface for the code map section.
//!
//! Packs (Tree-sitter based in practice) are external; the pipeline only
//! asks which extensions a pack claims and what symbols it extracts. Files
//! no pack claims get a placeholder line in the emitted map.

use std::path::Path;

/// One extracted symbol.
#[derive(Clone, Debug)]
pub struct CodemapEntry {
    pub name: String,
    pub kind: String,
    pub signature: String,
    /// Enclosing type or module, when nested.
    pub container: Option<String>,
}

/// A pluggable symbol extractor for a family of file extensions.
pub trait LanguagePack {
    /// Extensions (without the dot) this pack handles.
    fn extensions(&self) -> &[&str];

    /// Extract symbols from `source`.
    fn parse(&self, path: &Path, source: &str) -> Vec<CodemapEntry>;
}

/// Registry of installed packs; first claim wins.
#[derive(Default)]
pub struct PackRegistry {
    packs: Vec<Box<dyn LanguagePack>>,
}

impl PackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, pack: Box<dyn LanguagePack>) {
        self.packs.push(pack);
    }

    /// The pack claiming `extension`, if any.
    pub fn pack_for(&self, extension: &str) -> Option<&dyn LanguagePack> {
        self.packs
            .iter()
            .find(|p| p.extensions().contains(&extension))
            .map(|p| p.as_ref())
    }
}
