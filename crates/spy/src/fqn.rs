use std::fmt::Write as _;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::errors::{ErrorKind, SpyError, SpyResult};

/// Interned fully-qualified name.
///
/// An `Fqn` is a `u32` index into the VM-owned [`FqnTable`]. Two `Fqn`s are
/// equal iff their normalized textual forms are equal, because the table
/// interns structurally. Every global object in the VM has exactly one `Fqn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fqn(u32);

impl Fqn {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One `symbol[qualifiers]` segment of a fully-qualified name.
///
/// The first segment of an FQN is the module name and never carries
/// qualifiers. Qualifiers are themselves FQNs (type arguments of a generic
/// specialization).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FqnPart {
    pub symbol: String,
    pub qualifiers: Vec<Fqn>,
}

impl FqnPart {
    pub fn plain(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            qualifiers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FqnData {
    parts: Vec<FqnPart>,
}

/// Interner for fully-qualified names, owned by the VM.
///
/// Stores each distinct name once and hands out stable `u32` ids. Rendering
/// and parsing implement the wire syntax: segments joined by `::`, type
/// arguments in `[...]` joined by `,`, and symbols that are not plain
/// identifiers quoted with backticks.
#[derive(Debug, Default)]
pub struct FqnTable {
    data: Vec<FqnData>,
    map: AHashMap<FqnData, Fqn>,
}

impl FqnTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&mut self, data: FqnData) -> Fqn {
        if let Some(&fqn) = self.map.get(&data) {
            return fqn;
        }
        let fqn = Fqn(u32::try_from(self.data.len()).expect("FqnTable overflow"));
        self.data.push(data.clone());
        self.map.insert(data, fqn);
        fqn
    }

    /// Interns the FQN of a module root, e.g. `builtins`.
    pub fn module(&mut self, modname: &str) -> Fqn {
        self.intern(FqnData {
            parts: vec![FqnPart::plain(modname)],
        })
    }

    /// Appends a plain symbol segment: `base::symbol`.
    pub fn join(&mut self, base: Fqn, symbol: &str) -> Fqn {
        self.join_q(base, symbol, &[])
    }

    /// Appends a symbol segment with type-argument qualifiers:
    /// `base::symbol[q1, q2]`.
    pub fn join_q(&mut self, base: Fqn, symbol: &str, qualifiers: &[Fqn]) -> Fqn {
        let mut parts = self.data[base.index()].parts.clone();
        parts.push(FqnPart {
            symbol: symbol.to_owned(),
            qualifiers: qualifiers.to_vec(),
        });
        self.intern(FqnData { parts })
    }

    /// Adds qualifiers to the last segment: `mod::f` + `[i32]` → `mod::f[i32]`.
    ///
    /// Used to build the namespace of a generic specialization.
    pub fn with_qualifiers(&mut self, base: Fqn, qualifiers: &[Fqn]) -> Fqn {
        let mut parts = self.data[base.index()].parts.clone();
        let last = parts.last_mut().expect("FQN with no parts");
        last.qualifiers.extend_from_slice(qualifiers);
        self.intern(FqnData { parts })
    }

    /// The module name this FQN is rooted at.
    pub fn modname(&self, fqn: Fqn) -> &str {
        &self.data[fqn.index()].parts[0].symbol
    }

    /// The last symbol segment, e.g. `impl` for `test::add[i32]::impl`.
    pub fn symbol_name(&self, fqn: Fqn) -> &str {
        &self.data[fqn.index()].parts.last().expect("FQN with no parts").symbol
    }

    /// True when the FQN names a module itself (single segment).
    pub fn is_module(&self, fqn: Fqn) -> bool {
        self.data[fqn.index()].parts.len() == 1
    }

    /// True for a plain two-segment global (`mod::name`, no qualifiers).
    pub fn is_plain_global(&self, fqn: Fqn) -> bool {
        let parts = &self.data[fqn.index()].parts;
        parts.len() == 2 && parts.iter().all(|p| p.qualifiers.is_empty())
    }

    /// The qualifiers of the last segment, e.g. `[i32]` for
    /// `builtins::list[i32]`.
    pub fn last_qualifiers(&self, fqn: Fqn) -> Vec<Fqn> {
        self.data[fqn.index()]
            .parts
            .last()
            .map(|p| p.qualifiers.clone())
            .unwrap_or_default()
    }

    fn render_symbol(out: &mut String, symbol: &str) {
        let plain = !symbol.is_empty() && symbol.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
        if plain {
            out.push_str(symbol);
        } else {
            let _ = write!(out, "`{symbol}`");
        }
    }

    fn render_qualifier(&self, out: &mut String, q: Fqn) {
        // builtin type arguments render short: `test::add[i32]`, not
        // `test::add[builtins::i32]`; parse() resolves the short form back.
        let data = &self.data[q.index()];
        if data.parts.len() == 2 && data.parts[0].symbol == "builtins" && data.parts[1].qualifiers.is_empty() {
            Self::render_symbol(out, &data.parts[1].symbol);
        } else {
            self.render_into(out, q);
        }
    }

    fn render_into(&self, out: &mut String, fqn: Fqn) {
        let data = &self.data[fqn.index()];
        for (i, part) in data.parts.iter().enumerate() {
            if i > 0 {
                out.push_str("::");
            }
            Self::render_symbol(out, &part.symbol);
            if !part.qualifiers.is_empty() {
                out.push('[');
                for (j, &q) in part.qualifiers.iter().enumerate() {
                    if j > 0 {
                        out.push_str(", ");
                    }
                    self.render_qualifier(out, q);
                }
                out.push(']');
            }
        }
    }

    /// Renders the full wire form, e.g. `` test::add[i32]::impl ``.
    pub fn render(&self, fqn: Fqn) -> String {
        let mut out = String::new();
        self.render_into(&mut out, fqn);
        out
    }

    /// Short human form: bare symbol for `builtins::x` and plain `mod::name`
    /// globals, full wire form otherwise.
    pub fn human(&self, fqn: Fqn) -> String {
        let data = &self.data[fqn.index()];
        let all_plain = data.parts.iter().all(|p| p.qualifiers.is_empty());
        if data.parts.len() == 2 && all_plain && data.parts[0].symbol == "builtins" {
            return data.parts[1].symbol.clone();
        }
        self.render(fqn)
    }

    /// Parses the wire syntax back into an interned FQN.
    ///
    /// A bare qualifier symbol (e.g. `i32` in `test::add[i32]`) resolves to
    /// `builtins::<symbol>`.
    pub fn parse(&mut self, s: &str) -> SpyResult<Fqn> {
        let mut parser = FqnParser { table: self, s, pos: 0 };
        let fqn = parser.parse_fqn(false)?;
        if parser.pos != parser.s.len() {
            return Err(SpyError::new(
                ErrorKind::ValueError,
                format!("invalid FQN `{s}`: trailing characters"),
            ));
        }
        Ok(fqn)
    }
}

struct FqnParser<'a> {
    table: &'a mut FqnTable,
    s: &'a str,
    pos: usize,
}

impl FqnParser<'_> {
    fn error(&self, msg: &str) -> SpyError {
        SpyError::new(ErrorKind::ValueError, format!("invalid FQN `{}`: {msg}", self.s))
    }

    fn peek(&self) -> Option<u8> {
        self.s.as_bytes().get(self.pos).copied()
    }

    fn parse_symbol(&mut self) -> SpyResult<String> {
        if self.peek() == Some(b'`') {
            self.pos += 1;
            let start = self.pos;
            while let Some(b) = self.peek() {
                if b == b'`' {
                    let sym = self.s[start..self.pos].to_owned();
                    self.pos += 1;
                    return Ok(sym);
                }
                self.pos += 1;
            }
            return Err(self.error("unterminated backtick"));
        }
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(self.error("expected symbol"));
        }
        Ok(self.s[start..self.pos].to_owned())
    }

    fn parse_part(&mut self) -> SpyResult<FqnPart> {
        let symbol = self.parse_symbol()?;
        let mut qualifiers = Vec::new();
        if self.peek() == Some(b'[') {
            self.pos += 1;
            loop {
                qualifiers.push(self.parse_fqn(true)?);
                match self.peek() {
                    Some(b',') => {
                        self.pos += 1;
                        while self.peek() == Some(b' ') {
                            self.pos += 1;
                        }
                    }
                    Some(b']') => {
                        self.pos += 1;
                        break;
                    }
                    _ => return Err(self.error("expected `,` or `]` in qualifiers")),
                }
            }
        }
        Ok(FqnPart { symbol, qualifiers })
    }

    fn parse_fqn(&mut self, as_qualifier: bool) -> SpyResult<Fqn> {
        let mut parts = vec![self.parse_part()?];
        while self.s[self.pos..].starts_with("::") {
            self.pos += 2;
            parts.push(self.parse_part()?);
        }
        if as_qualifier && parts.len() == 1 && parts[0].qualifiers.is_empty() {
            // short builtin form inside qualifiers
            let symbol = parts[0].symbol.clone();
            let base = self.table.module("builtins");
            return Ok(self.table.join(base, &symbol));
        }
        Ok(self.table.intern(FqnData { parts }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_structural() {
        let mut t = FqnTable::new();
        let m = t.module("test");
        let a = t.join(m, "foo");
        let b = t.join(m, "foo");
        assert_eq!(a, b);
        assert_ne!(a, m);
    }

    #[test]
    fn render_parse_roundtrip() {
        let mut t = FqnTable::new();
        let b = t.module("builtins");
        let i32_t = t.join(b, "i32");
        let s_t = t.join(b, "str");
        let m = t.module("test");
        let add = t.join_q(m, "add", &[i32_t, s_t]);
        let f = t.join(add, "impl");
        let rendered = t.render(f);
        assert_eq!(rendered, "test::add[i32, str]::impl");
        let parsed = t.parse(&rendered).unwrap();
        assert_eq!(parsed, f);
    }

    #[test]
    fn odd_symbols_are_quoted() {
        let mut t = FqnTable::new();
        let m = t.module("test");
        let f = t.join(m, "fn#1");
        let rendered = t.render(f);
        assert_eq!(rendered, "test::`fn#1`");
        assert_eq!(t.parse(&rendered).unwrap(), f);
    }

    #[test]
    fn human_shortens_builtins() {
        let mut t = FqnTable::new();
        let b = t.module("builtins");
        let i32_t = t.join(b, "i32");
        assert_eq!(t.human(i32_t), "i32");
        let m = t.module("test");
        let foo = t.join(m, "foo");
        assert_eq!(t.human(foo), "test::foo");
    }
}
