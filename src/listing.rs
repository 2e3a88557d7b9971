//! Reading and writing the textual `nm -n` symbol listing format: one symbol
//! per line, `<hex-address> <type-char> <name>`.

use crate::error::Result;
use crate::symbol::MAX_NAME_LEN;
use crate::symbol::Symbol;
use crate::symbol::SymbolType;
use std::io::BufWriter;
use std::io::Write;

/// Parses one nm line. Returns `None` for anything that isn't exactly three
/// whitespace-separated fields with a hex address, a single-character type
/// and a printable-ASCII name of bounded length. Callers skip such lines.
pub(crate) fn parse_line(line: &str) -> Option<(u64, SymbolType, &str)> {
    let mut fields = line.split_whitespace();

    let address_field = fields.next()?;
    let type_field = fields.next()?;
    let name = fields.next()?;
    if fields.next().is_some() {
        return None;
    }

    if !address_field.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let address = u64::from_str_radix(address_field, 16).ok()?;

    let &[type_code] = type_field.as_bytes() else {
        return None;
    };

    if name.len() > MAX_NAME_LEN || !name.bytes().all(|b| (0x21..0x7f).contains(&b)) {
        return None;
    }

    Some((address, SymbolType::new(type_code), name))
}

/// Writes the store's current contents in nm format. Addresses are
/// zero-padded to 8 hex digits and widen naturally beyond that, matching
/// what the kernel build's kallsyms step consumes.
pub(crate) fn write_listing<'a, W: Write>(
    out: W,
    symbols: impl Iterator<Item = &'a Symbol>,
) -> Result {
    let mut out = BufWriter::new(out);
    for symbol in symbols {
        writeln!(
            out,
            "{:08x} {} {}",
            symbol.address(),
            symbol.sym_type(),
            symbol.name()
        )?;
    }
    out.flush()?;
    Ok(())
}
