//! The aliasing pipeline: ingest an nm listing, find names that occur more
//! than once, and splice a distinguishable alias in next to every occurrence
//! that is allowed to have one. Aliases carry the original's address and type
//! and a suffix derived from the symbol's source location, falling back to a
//! per-run serial when no location can be had.

use crate::a2l::Addr2LineSession;
use crate::error::Result;
use crate::filters::NameFilter;
use crate::listing;
use crate::store::SortKey;
use crate::store::SymbolStore;
use crate::symbol::Symbol;
use crate::symbol::SymbolType;
use anyhow::Context;
use anyhow::ensure;
use std::io::BufRead;

/// Sanitized-path aliases always start the suffix with `_` (the rebased path
/// begins with `/`), so this marker identifies them.
const PATH_MARKER: &str = "@_";
/// Serial-form aliases are `<name>__alias__<decimal>`.
const SERIAL_MARKER: &str = "__alias__";

/// Whether a name was produced by a previous run of this tool. Seeing one in
/// the input means the listing has already been augmented and must pass
/// through untouched.
fn is_alias_name(name: &str) -> bool {
    if name.contains(PATH_MARKER) {
        return true;
    }
    name.find(SERIAL_MARKER).is_some_and(|position| {
        name[position + SERIAL_MARKER.len()..]
            .starts_with(|c: char| c.is_ascii_digit())
    })
}

/// Reads the listing into a fresh store. Malformed lines are skipped.
/// The returned flag reports whether any name already carries an alias
/// marker.
pub(crate) fn ingest<R: BufRead>(input: R) -> Result<(SymbolStore, bool)> {
    let mut store = SymbolStore::default();
    let mut already_processed = false;

    for line in input.lines() {
        let line = line.context("Failed to read nm data")?;
        let Some((address, sym_type, name)) = listing::parse_line(&line) else {
            if !line.trim().is_empty() {
                tracing::debug!(%line, "Skipping malformed nm line");
            }
            continue;
        };
        already_processed |= is_alias_name(name);
        store.push(Symbol::new(name.into(), address, sym_type));
    }

    tracing::info!(symbols = store.len(), "Scanned nm data");
    Ok((store, already_processed))
}

/// A duplicated occurrence that will receive an alias. Captured by value
/// before any insertion mutates the store; the address is the only link back
/// to the originating record.
struct Candidate {
    name: Box<str>,
    address: u64,
    sym_type: SymbolType,
}

fn collect_candidates(
    store: &SymbolStore,
    filter: &NameFilter,
    alias_data: bool,
) -> Vec<Candidate> {
    store
        .iter()
        .filter(|s| store.multiplicity(s.name()) > 1)
        .filter(|s| !filter.excludes(s.name()))
        .filter(|s| s.sym_type().is_aliasable(alias_data))
        .map(|s| Candidate {
            name: s.name().into(),
            address: s.address(),
            sym_type: s.sym_type(),
        })
        .collect()
}

/// Builds alias names. Owns the per-run serial; the addr2line session is
/// borrowed for the duration of the pass.
struct AliasNamer<'session> {
    session: Option<&'session mut Addr2LineSession>,
    serial: u64,
}

impl AliasNamer<'_> {
    fn synthesize(&mut self, name: &str, address: u64) -> String {
        if let Some(session) = self.session.as_deref_mut()
            && let Some(path) = session.resolve(address)
            && let Some(relative) = session.rebase(&path)
        {
            return sanitize(&format!("{name}@{relative}"));
        }
        format!("{name}{SERIAL_MARKER}{}", self.next_serial())
    }

    fn next_serial(&mut self) -> u64 {
        let serial = self.serial;
        self.serial += 1;
        serial
    }
}

/// Rewrites every character outside `[A-Za-z0-9@]` to `_` so downstream
/// consumers see the alias as a single identifier.
fn sanitize(alias: &str) -> String {
    alias
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '@' { c } else { '_' })
        .collect()
}

/// Name-sorts the store, finds the aliasable duplicates, splices an alias in
/// after each one, then restores address order. Returns how many aliases were
/// added.
pub(crate) fn add_aliases(
    store: &mut SymbolStore,
    filter: &NameFilter,
    session: Option<&mut Addr2LineSession>,
    alias_data: bool,
) -> Result<usize> {
    store.sort(SortKey::ByName);

    let candidates = collect_candidates(store, filter, alias_data);
    tracing::info!(candidates = candidates.len(), "Scanned nm data for duplicates");

    if !candidates.is_empty() {
        store.build_letter_index();
        let mut namer = AliasNamer { session, serial: 0 };

        for candidate in &candidates {
            let mut alias = namer.synthesize(&candidate.name, candidate.address);
            // Aggressive inlining can give two addresses the same source
            // line; a serial tiebreak keeps every name in the pass unique.
            while store.multiplicity(&alias) > 0 {
                alias = format!("{alias}_{}", namer.next_serial());
            }
            ensure!(
                store.insert_after(
                    candidate.address,
                    Symbol::new(alias.into(), candidate.address, candidate.sym_type),
                ),
                "No record at address {:016x} while aliasing `{}`",
                candidate.address,
                candidate.name
            );
        }
    }

    store.sort(SortKey::ByAddress);
    Ok(candidates.len())
}
