use anyhow::{Context as _, Result};
use std::collections::BTreeMap;

/// The metadata lives at the very end of avi files and near the end of mpg,
/// so only this much of the file tail needs to be read.
pub const TAIL_LEN: u64 = 100_000;

/// `SS-Actors` is always the first key of the table. The block looks like:
/// MPG: <4 bytes count> <key> \0 [value] \0 <key> \0 ...
/// AVI: ATTR <4 bytes size> <4 bytes count> <key> \0 ...
const SENTINEL: &[u8] = b"SS-Actors";

const KEY_PREFIX: &str = "SS-";

/// Keys dropped from the record unless overridden on the command line.
pub const DEFAULT_IGNORE: &[&str] = &["OriginalFileSize", "ShowSqueeze"];

/// Key-sorted, so the serialized json is deterministic.
pub type Record = BTreeMap<String, String>;

/// Null-terminated byte strings read from `buf`, starting at `offset`.
/// Ends at the first string missing its terminator.
struct CStrings<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for CStrings<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.buf.get(self.offset..)?;
        let pos = rest.iter().position(|&b| b == 0)?;

        self.offset += pos + 1;
        Some(&rest[..pos])
    }
}

// The embedded strings are 8-bit text, not utf-8. Every byte maps to the
// code point of the same value.
fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn find(buf: &[u8], needle: &[u8]) -> Option<usize> {
    buf.windows(needle.len()).position(|window| window == needle)
}

/// Decode the embedded key/value table from the tail of a recording file.
///
/// Returns `Ok(None)` when the buffer carries no recognized metadata and an
/// error when the table ends before its declared pair count. Partial records
/// are never returned.
pub fn extract(buf: &[u8], ignore: &[String]) -> Result<Option<Record>> {
    let Some(offset) = find(buf, SENTINEL) else {
        return Ok(None);
    };

    let count_at = offset
        .checked_sub(4)
        .context("Metadata table starts before its pair count")?;
    let count = u32::from_le_bytes(buf[count_at..offset].try_into().unwrap());

    let mut strings = CStrings { buf, offset };
    let mut record = Record::new();

    for _ in 0..count {
        let key = strings
            .next()
            .context("Metadata table ended before the declared pair count")?;
        let value = strings
            .next()
            .context("Metadata key is missing its value")?;

        let key = latin1(key);
        let key = key.strip_prefix(KEY_PREFIX).unwrap_or(&key);

        if ignore.iter().any(|v| v == key) {
            continue;
        }

        record.insert(key.to_owned(), latin1(value));
    }

    Ok(Some(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(count: u32, table: &[u8]) -> Vec<u8> {
        let mut buf = vec![b'A'; 64];
        buf.extend_from_slice(&count.to_le_bytes());
        buf.extend_from_slice(table);
        buf
    }

    #[test]
    fn extracts_declared_pairs() {
        let buf = block(2, b"SS-Actors\0\0SS-Genre\0Comedy\0");
        let record = extract(&buf, &[]).unwrap().unwrap();

        assert_eq!(record.len(), 2);
        assert_eq!(record["Actors"], "");
        assert_eq!(record["Genre"], "Comedy");
    }

    #[test]
    fn missing_sentinel_means_no_metadata() {
        let result = extract(b"nothing recognizable in here", &[]).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn ignored_keys_are_dropped() {
        let buf = block(2, b"SS-Actors\0\0SS-Genre\0Comedy\0");
        let record = extract(&buf, &["Genre".to_owned()]).unwrap().unwrap();

        assert_eq!(record.len(), 1);
        assert!(!record.contains_key("Genre"));
    }

    #[test]
    fn short_table_is_an_error() {
        let buf = block(3, b"SS-Actors\0\0SS-Genre\0Comedy\0");
        assert!(extract(&buf, &[]).is_err());
    }

    #[test]
    fn sentinel_without_room_for_the_count_is_an_error() {
        assert!(extract(b"SS-Actors\0\0", &[]).is_err());
    }

    #[test]
    fn values_are_latin1() {
        let buf = block(1, b"SS-Actors\0Andr\xe9\0");
        let record = extract(&buf, &[]).unwrap().unwrap();

        assert_eq!(record["Actors"], "André");
    }

    #[test]
    fn later_duplicates_overwrite() {
        let buf = block(2, b"SS-Actors\0first\0SS-Actors\0second\0");
        let record = extract(&buf, &[]).unwrap().unwrap();

        assert_eq!(record.len(), 1);
        assert_eq!(record["Actors"], "second");
    }

    #[test]
    fn serialized_record_parses_back() {
        let buf = block(2, b"SS-Actors\0\0SS-Genre\0Comedy\0");
        let record = extract(&buf, &[]).unwrap().unwrap();

        let json = serde_json::to_string_pretty(&record).unwrap();
        let parsed: Record = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, record);
    }
}
