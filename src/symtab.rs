//! Build-time symbol table for state names.
//!
//! Transition records may name states that have not been parsed yet, so the
//! compiler runs a classic declare-then-define scheme: the first mention of
//! a name creates an undefined entry, defining a state binds a value to it,
//! and anything still undefined after the last state node is an unresolved
//! forward reference.  The table only lives for the duration of one compile.
//!
//! Reserved record words are pre-seeded as defined entries so a single
//! lookup classifies a record as keyword or target.

/// Handle into a [`SymbolTable`].  Stable across later inserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymId(usize);

/// The four record names with fixed meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    /// Node metadata, skipped by the parser.
    Name,
    /// Signal list introducer.
    Set,
    /// Start-state marker.
    Start,
    /// Shutdown-terminal marker.
    Shutdown,
}

/// What a defined symbol stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymValue {
    Reserved(Keyword),
    /// Index of the state in declaration order.
    State(usize),
}

/// Why a `define` was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefineError {
    /// The name is one of the pre-seeded reserved words.
    Reserved,
    /// The name already has a state bound to it.
    AlreadyDefined,
}

struct Entry {
    name: String,
    value: Option<SymValue>,
}

/// Declare-or-define symbol table.  Linear scan; state counts are small.
pub struct SymbolTable {
    entries: Vec<Entry>,
}

impl SymbolTable {
    /// An empty table with the reserved words already defined.
    pub fn with_reserved() -> Self {
        let reserved = [
            (crate::tokens::REC_NAME, Keyword::Name),
            (crate::tokens::REC_SET, Keyword::Set),
            (crate::tokens::REC_START, Keyword::Start),
            (crate::tokens::REC_SHUTDOWN, Keyword::Shutdown),
        ];
        let entries = reserved
            .into_iter()
            .map(|(name, kw)| Entry {
                name: name.to_owned(),
                value: Some(SymValue::Reserved(kw)),
            })
            .collect();
        Self { entries }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    /// Fetch `name`, declaring it undefined if this is its first mention.
    /// Never fails: an existing definition is simply returned.
    pub fn lookup(&mut self, name: &str) -> SymId {
        if let Some(i) = self.position(name) {
            return SymId(i);
        }
        self.entries.push(Entry {
            name: name.to_owned(),
            value: None,
        });
        SymId(self.entries.len() - 1)
    }

    /// Bind `value` to `name`.  Fills in a previously declared entry;
    /// rejects reserved words and double definitions.
    pub fn define(&mut self, name: &str, value: SymValue) -> Result<SymId, DefineError> {
        match self.position(name) {
            Some(i) => match self.entries[i].value {
                Some(SymValue::Reserved(_)) => Err(DefineError::Reserved),
                Some(SymValue::State(_)) => Err(DefineError::AlreadyDefined),
                None => {
                    self.entries[i].value = Some(value);
                    Ok(SymId(i))
                }
            },
            None => {
                self.entries.push(Entry {
                    name: name.to_owned(),
                    value: Some(value),
                });
                Ok(SymId(self.entries.len() - 1))
            }
        }
    }

    /// The name behind a handle.
    pub fn name_of(&self, id: SymId) -> &str {
        &self.entries[id.0].name
    }

    /// The value behind a handle, `None` while only declared.
    pub fn value_of(&self, id: SymId) -> Option<SymValue> {
        self.entries[id.0].value
    }
}
