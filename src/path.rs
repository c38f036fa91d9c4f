//! Projection of keys onto the flat blob namespace.
//!
//! Layout: `<root_folder>/<key type folder>/<fields>`.
//!
//! Ref keys store only the escaped symbol. Atom keys store six fields joined
//! by `*`:
//!
//! ```text
//! <symbol>*<version>*<creation_ts>*<content hash, 16 hex digits>*<start>*<end>
//! ```
//!
//! where an index value is written `t<i64>` or `s<escaped string>`. Symbols
//! and string indexes escape `%`, `*` and `/` so no field can contain a
//! separator. The escape is applied character by character, which keeps it
//! prefix preserving: the escaped form of a symbol prefix is a prefix of the
//! escaped symbol.
//!
//! Decoding only accepts the canonical output of [`encode_path`]. Anything
//! else is reported as [`StorageError::Malformed`].

use std::fmt::Write as _;

use crate::error::{StorageError, StorageResult};
use crate::key::{AtomKey, IndexValue, KeyType, RefKey, VariantKey};
use crate::library::LibraryPath;

/// Version of the blob path layout produced by [`encode_path`].
///
/// Objects written under an older layout must stay readable, so a layout
/// change has to add a decoder for the previous version rather than replace
/// it.
pub const PATH_FORMAT_VERSION: u32 = 1;

const FIELD_SEP: char = '*';
const ATOM_FIELDS: usize = 6;

pub fn root_folder(lib: &LibraryPath) -> String {
    lib.to_delim_path('/')
}

/// Listing prefix of all keys of `key_type`, with the trailing `/`.
pub fn type_prefix(root_folder: &str, key_type: KeyType) -> String {
    format!("{}/{}/", root_folder, key_type.folder())
}

/// Listing prefix of all keys of `key_type` whose symbol starts with
/// `symbol_prefix`.
pub fn symbol_prefix(root_folder: &str, key_type: KeyType, symbol_prefix: &str) -> String {
    let mut path = type_prefix(root_folder, key_type);
    escape_into(&mut path, symbol_prefix);
    path
}

pub fn encode_path(root_folder: &str, key: &VariantKey) -> String {
    let mut path = type_prefix(root_folder, key.key_type());
    match key {
        VariantKey::Ref(k) => escape_into(&mut path, k.symbol()),
        VariantKey::Atom(k) => {
            escape_into(&mut path, k.symbol());
            // Writing into a String cannot fail.
            let _ = write!(
                path,
                "{sep}{}{sep}{}{sep}{}{sep}",
                k.version_id(),
                k.creation_ts(),
                hex::encode(k.content_hash().to_be_bytes()),
                sep = FIELD_SEP
            );
            encode_index(&mut path, k.start_index());
            path.push(FIELD_SEP);
            encode_index(&mut path, k.end_index());
        }
    }
    path
}

pub fn decode_path(root_folder: &str, path: &str) -> StorageResult<VariantKey> {
    let rest = path
        .strip_prefix(root_folder)
        .and_then(|r| r.strip_prefix('/'))
        .ok_or_else(|| {
            StorageError::malformed(path, format!("not under root folder '{}'", root_folder))
        })?;
    let (folder, fields) = rest
        .split_once('/')
        .ok_or_else(|| StorageError::malformed(path, "missing key type folder"))?;
    if fields.contains('/') {
        return Err(StorageError::malformed(path, "unexpected nested path"));
    }
    let key_type = KeyType::from_folder(folder).ok_or_else(|| {
        StorageError::malformed(path, format!("unknown key type folder '{}'", folder))
    })?;

    let parts: Vec<&str> = fields.split(FIELD_SEP).collect();
    match parts.as_slice() {
        [symbol] => Ok(RefKey::new(key_type, unescape(path, symbol)?).into()),
        [symbol, version, ts, hash, start, end] => {
            let key = AtomKey::builder()
                .version_id(parse_u64(path, version)?)
                .creation_ts(parse_i64(path, ts)?)
                .content_hash(parse_hash(path, hash)?)
                .start_index(decode_index(path, start)?)
                .end_index(decode_index(path, end)?)
                .build(key_type, unescape(path, symbol)?);
            Ok(key.into())
        }
        _ => Err(StorageError::malformed(
            path,
            format!(
                "expected 1 or {} fields, found {}",
                ATOM_FIELDS,
                parts.len()
            ),
        )),
    }
}

fn escape_into(out: &mut String, raw: &str) {
    for ch in raw.chars() {
        match ch {
            '%' => out.push_str("%25"),
            '*' => out.push_str("%2A"),
            '/' => out.push_str("%2F"),
            c => out.push(c),
        }
    }
}

fn unescape(path: &str, field: &str) -> StorageResult<String> {
    let mut out = String::with_capacity(field.len());
    let mut rest = field;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let ch = match rest.get(pos + 1..pos + 3) {
            Some("25") => '%',
            Some("2A") => '*',
            Some("2F") => '/',
            _ => {
                return Err(StorageError::malformed(
                    path,
                    format!("invalid escape in '{}'", field),
                ))
            }
        };
        out.push(ch);
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    Ok(out)
}

fn encode_index(out: &mut String, value: &IndexValue) {
    match value {
        IndexValue::Timestamp(ts) => {
            let _ = write!(out, "t{}", ts);
        }
        IndexValue::String(s) => {
            out.push('s');
            escape_into(out, s);
        }
    }
}

fn decode_index(path: &str, field: &str) -> StorageResult<IndexValue> {
    if let Some(ts) = field.strip_prefix('t') {
        Ok(IndexValue::Timestamp(parse_i64(path, ts)?))
    } else if let Some(s) = field.strip_prefix('s') {
        Ok(IndexValue::String(unescape(path, s)?))
    } else {
        Err(StorageError::malformed(
            path,
            format!("invalid index value '{}'", field),
        ))
    }
}

fn is_canonical_digits(digits: &str) -> bool {
    !digits.is_empty()
        && digits.bytes().all(|b| b.is_ascii_digit())
        && (digits == "0" || !digits.starts_with('0'))
}

fn parse_u64(path: &str, field: &str) -> StorageResult<u64> {
    if !is_canonical_digits(field) {
        return Err(StorageError::malformed(
            path,
            format!("invalid number '{}'", field),
        ));
    }
    field
        .parse()
        .map_err(|e| StorageError::malformed(path, format!("invalid number '{}': {}", field, e)))
}

fn parse_i64(path: &str, field: &str) -> StorageResult<i64> {
    let digits = field.strip_prefix('-').unwrap_or(field);
    if !is_canonical_digits(digits) || field == "-0" {
        return Err(StorageError::malformed(
            path,
            format!("invalid number '{}'", field),
        ));
    }
    field
        .parse()
        .map_err(|e| StorageError::malformed(path, format!("invalid number '{}': {}", field, e)))
}

fn parse_hash(path: &str, field: &str) -> StorageResult<u64> {
    let invalid = || StorageError::malformed(path, format!("invalid content hash '{}'", field));
    let bytes: [u8; 8] = hex::decode(field)
        .map_err(|_| invalid())?
        .try_into()
        .map_err(|_| invalid())?;
    let hash = u64::from_be_bytes(bytes);
    // hex::decode also accepts upper case digits
    if hex::encode(bytes) != field {
        return Err(invalid());
    }
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use proptest::prelude::*;

    fn atom(symbol: &str, version: u64) -> VariantKey {
        AtomKey::builder()
            .version_id(version)
            .creation_ts(-42)
            .content_hash(0x0123_4567_89ab_cdef)
            .start_index(5)
            .end_index("x*y")
            .build(KeyType::TableData, symbol)
            .into()
    }

    #[test]
    fn test_encode_layout() {
        let key = atom("AAPL", 7);
        assert_eq!(
            encode_path("lib/daily", &key),
            "lib/daily/tdata/AAPL*7*-42*0123456789abcdef*t5*sx%2Ay"
        );

        let key: VariantKey = RefKey::new(KeyType::VersionRef, "a/b%c").into();
        assert_eq!(encode_path("lib", &key), "lib/vref/a%2Fb%25c");
    }

    #[test]
    fn test_decode_inverts_encode() {
        let keys = vec![
            atom("AAPL", 1),
            atom("", 0),
            atom("*/%", u64::MAX),
            RefKey::new(KeyType::SnapshotRef, "snap-1").into(),
            RefKey::new(KeyType::LibraryConfig, "").into(),
        ];
        for key in keys {
            let path = encode_path("root", &key);
            assert_eq!(decode_path("root", &path).unwrap(), key, "path {}", path);
        }
    }

    #[test]
    fn test_decode_rejects_foreign_paths() {
        let bad = [
            "other/tdata/AAPL",
            "root/tdata",
            "rootx/tdata/AAPL",
            "root/zzz/AAPL",
            "root/tdata/a/b",
            "root/tdata/AAPL*1",
            "root/tdata/AAPL*01*0*0000000000000000*t0*t0",
            "root/tdata/AAPL*+1*0*0000000000000000*t0*t0",
            "root/tdata/AAPL*1*-0*0000000000000000*t0*t0",
            "root/tdata/AAPL*1*0*0000000000ABCDEF*t0*t0",
            "root/tdata/AAPL*1*0*00*t0*t0",
            "root/tdata/AAPL*1*0*0000000000000000*x0*t0",
            "root/tdata/AAPL*1*0*0000000000000000*t*t0",
            "root/tdata/AAPL*18446744073709551616*0*0000000000000000*t0*t0",
            "root/vref/bad%2a",
            "root/vref/bad%",
            "root/vref/bad%4",
        ];
        for path in bad {
            let err = decode_path("root", path).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Malformed, "path {}", path);
        }
    }

    #[test]
    fn test_library_isolation() {
        let libs = [
            LibraryPath::new(["a"]).unwrap(),
            LibraryPath::new(["a", "tdata"]).unwrap(),
            LibraryPath::new(["ab"]).unwrap(),
            LibraryPath::new(["a", "b"]).unwrap(),
        ];
        let key: VariantKey = RefKey::new(KeyType::VersionRef, "sym").into();
        let other = atom("vref", 1);
        let mut seen = std::collections::HashSet::new();
        for lib in &libs {
            let root = root_folder(lib);
            assert!(seen.insert(encode_path(&root, &key)));
            assert!(seen.insert(encode_path(&root, &other)));
            for other_lib in libs.iter().filter(|l| *l != lib) {
                let foreign = encode_path(&root_folder(other_lib), &key);
                assert!(decode_path(&root, &foreign).is_err(), "{} read {}", lib, foreign);
            }
        }
    }

    #[test]
    fn test_symbol_prefix_matches_escaped_symbols() {
        let key = atom("A*B", 2);
        let path = encode_path("root", &key);
        assert!(path.starts_with(&symbol_prefix("root", KeyType::TableData, "A*")));
        assert!(!path.starts_with(&symbol_prefix("root", KeyType::TableIndex, "A*")));
        assert_eq!(symbol_prefix("root", KeyType::TableData, ""), "root/tdata/");
    }

    fn index_strategy() -> impl Strategy<Value = IndexValue> {
        prop_oneof![
            any::<i64>().prop_map(IndexValue::Timestamp),
            ".*".prop_map(IndexValue::String),
        ]
    }

    fn key_strategy() -> impl Strategy<Value = VariantKey> {
        let key_type = proptest::sample::select(KeyType::ALL.to_vec());
        prop_oneof![
            (key_type.clone(), ".*").prop_map(|(kt, sym)| VariantKey::Ref(RefKey::new(kt, sym))),
            (
                key_type,
                ".*",
                any::<u64>(),
                any::<i64>(),
                any::<u64>(),
                index_strategy(),
                index_strategy()
            )
                .prop_map(|(kt, sym, version, ts, hash, start, end)| {
                    VariantKey::Atom(
                        AtomKey::builder()
                            .version_id(version)
                            .creation_ts(ts)
                            .content_hash(hash)
                            .start_index(start)
                            .end_index(end)
                            .build(kt, sym),
                    )
                }),
        ]
    }

    proptest! {
        #[test]
        fn should_decode_every_encoded_key(key in key_strategy()) {
            let path = encode_path("lib/sub", &key);
            prop_assert_eq!(decode_path("lib/sub", &path).unwrap(), key);
        }

        #[test]
        fn should_keep_escaped_prefixes(symbol in ".*", cut in any::<prop::sample::Index>()) {
            let boundaries: Vec<usize> = symbol
                .char_indices()
                .map(|(i, _)| i)
                .chain(std::iter::once(symbol.len()))
                .collect();
            let prefix = &symbol[..boundaries[cut.index(boundaries.len())]];
            let key: VariantKey = RefKey::new(KeyType::SymbolList, symbol.clone()).into();
            let path = encode_path("r", &key);
            prop_assert!(path.starts_with(&symbol_prefix("r", KeyType::SymbolList, prefix)));
        }
    }
}
