//! An ordered collection of symbol records with two auxiliary indexes: a
//! hashed name -> occurrence-count map used for O(1) duplicate queries, and a
//! first-character -> earliest-position table that narrows the linear anchor
//! scan performed when an alias is spliced in next to its original.

use crate::symbol::Symbol;
use foldhash::fast::RandomState;
use hashbrown::HashMap;

/// Sort orders supported by [`SymbolStore::sort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SortKey {
    /// Byte-wise lexicographic comparison of names. Stable, so the
    /// address-sortedness of `nm -n` input survives within equal names.
    ByName,
    /// Unsigned comparison of addresses. Stable, so insertion order breaks
    /// ties.
    ByAddress,
}

/// First character values we index: the printable ASCII range 32..=127.
const LETTER_BASE: u8 = 32;
const LETTER_SPAN: usize = 96;

#[derive(Default)]
pub(crate) struct SymbolStore {
    symbols: Vec<Symbol>,
    name_counts: HashMap<Box<str>, u32, RandomState>,
    letter_index: Option<LetterIndex>,
}

/// Earliest sequence position per first character. Only meaningful while the
/// sequence is name-sorted. Entries are not repaired when later insertions
/// shift positions right; a stale entry can only point earlier than the true
/// first occurrence, which keeps anchored scans correct.
struct LetterIndex {
    first_position: [Option<u32>; LETTER_SPAN],
}

impl LetterIndex {
    fn slot(first_byte: u8) -> Option<usize> {
        first_byte
            .checked_sub(LETTER_BASE)
            .map(usize::from)
            .filter(|&s| s < LETTER_SPAN)
    }

    fn start_for(&self, name: &str) -> Option<usize> {
        let slot = Self::slot(*name.as_bytes().first()?)?;
        self.first_position[slot].map(|p| p as usize)
    }
}

impl SymbolStore {
    pub(crate) fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Appends a record to the sequence tail and counts its name.
    pub(crate) fn push(&mut self, symbol: Symbol) {
        self.bump_count(symbol.name());
        self.symbols.push(symbol);
    }

    /// Number of records currently carrying `name`. Zero for unknown names.
    pub(crate) fn multiplicity(&self, name: &str) -> u32 {
        self.name_counts.get(name).copied().unwrap_or(0)
    }

    /// Inserts `symbol` immediately after the first record whose address is
    /// `anchor`, scanning from the letter-index entry for the symbol's first
    /// character when one is available. Returns false iff no record has the
    /// anchor address.
    pub(crate) fn insert_after(&mut self, anchor: u64, symbol: Symbol) -> bool {
        let start = self
            .letter_index
            .as_ref()
            .and_then(|index| index.start_for(symbol.name()))
            .unwrap_or(0);

        let Some(offset) = self.symbols[start..]
            .iter()
            .position(|s| s.address() == anchor)
        else {
            return false;
        };

        self.bump_count(symbol.name());
        self.symbols.insert(start + offset + 1, symbol);
        true
    }

    /// Records the earliest position of each first character. Call only while
    /// the sequence is sorted by name; any later sort discards the index.
    pub(crate) fn build_letter_index(&mut self) {
        let mut first_position = [None; LETTER_SPAN];
        for (position, symbol) in self.symbols.iter().enumerate() {
            if let Some(first_byte) = symbol.name().as_bytes().first()
                && let Some(slot) = LetterIndex::slot(*first_byte)
                && first_position[slot].is_none()
            {
                first_position[slot] = Some(position as u32);
            }
        }
        self.letter_index = Some(LetterIndex { first_position });
    }

    /// Stable sort of the sequence by the requested key.
    pub(crate) fn sort(&mut self, key: SortKey) {
        self.letter_index = None;
        match key {
            SortKey::ByName => self
                .symbols
                .sort_by(|a, b| a.name().as_bytes().cmp(b.name().as_bytes())),
            SortKey::ByAddress => self.symbols.sort_by_key(Symbol::address),
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    fn bump_count(&mut self, name: &str) {
        *self.name_counts.entry_ref(name).or_insert(0) += 1;
    }
}
