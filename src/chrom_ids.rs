use rustc_hash::FxHashMap;

/// Process-wide chromosome name <-> small-integer interning, but carried
/// explicitly on a context value rather than as global state (Design Notes,
/// "Global state"). One `ChromIds` is created per run and threaded by
/// reference through the input adapter, the genetic map, and the pipeline.
#[derive(Debug, Default)]
pub struct ChromIds {
    names: Vec<String>,
    index: FxHashMap<String, u32>,
}

impl ChromIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id for `name`, interning it if this is the first time it
    /// has been seen.
    pub fn intern(&mut self, name: &str) -> u32 {
        if let Some(id) = self.index.get(name) {
            return *id;
        }
        let id = self.names.len() as u32;
        self.names.push(name.to_owned());
        self.index.insert(name.to_owned(), id);
        id
    }

    /// Looks up an id without interning; used by read-only consumers such as
    /// the genetic map after the VCF adapter has already interned every
    /// chromosome it will emit.
    pub fn get(&self, name: &str) -> Option<u32> {
        self.index.get(name).copied()
    }

    pub fn name(&self, id: u32) -> &str {
        &self.names[id as usize]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}
