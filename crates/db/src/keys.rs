//! Row-key grammar and codecs for the tablet keyspaces.
//!
//! Every writable row lives under `<tableKey>:<hexBlockNum>:<primaryKey>`,
//! where the table key identifies one tablet instance and the block number
//! is rendered as 8 lowercase hex digits so that lexicographic key order is
//! ascending `(block_num, primary_key)` order.  ABI and checkpoint-index
//! rows instead embed a *reverse* block number (`u32::MAX - n`), so a
//! forward scan starting at the reverse encoding of the queried block
//! yields the newest row at or below it first.

use fluxdb_primitives::Name;

use crate::{DbError, DbResult};

/// Table-key prefix of key→accounts tablets.
pub const KEY_ACCOUNT_PREFIX: &str = "ka2";

/// Table-key prefix of auth-link tablets.
pub const AUTH_LINK_PREFIX: &str = "al";

/// Table-key prefix of table-scope tablets.
pub const TABLE_SCOPE_PREFIX: &str = "ts";

/// Key prefix of stored checkpoint indexes.
pub const INDEX_PREFIX: &str = "ti";

/// Key of the non-shard last-written-block marker.
pub const LAST_BLOCK_ROW_KEY: &str = "last";

/// Marker key of the shard with the given index, `shard-NNN`.
pub fn shard_last_block_key(shard_index: u32) -> String {
    format!("shard-{shard_index:03}")
}

/// Renders a block number as 8 lowercase hex digits, big-endian.
pub fn hex_block_num(block_num: u32) -> String {
    format!("{block_num:08x}")
}

/// Parses an 8-hex-digit block number chunk back to its value.
pub fn parse_hex_block_num(chunk: &str) -> DbResult<u32> {
    parse_hex_chunk(chunk, 8)
        .map(|v| v as u32)
        .ok_or_else(|| DbError::MalformedRowKey(chunk.to_string()))
}

/// Renders the reverse encoding of a block number, which sorts descending
/// by block.
pub fn hex_rev_block_num(block_num: u32) -> String {
    hex_block_num(u32::MAX - block_num)
}

/// Renders a 64-bit primary key as 16 lowercase hex digits.
pub fn hex_primary_key(primary_key: u64) -> String {
    format!("{primary_key:016x}")
}

fn parse_hex_chunk(chunk: &str, width: usize) -> Option<u64> {
    if chunk.len() != width || !chunk.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(chunk, 16).ok()
}

/// Decodes the reverse block number trailing a known `prefix` in `row_key`
/// (ABI and checkpoint-index keys).
pub fn chunk_key_rev_block_num(row_key: &str, prefix: &str) -> DbResult<u32> {
    let malformed = || DbError::MalformedRowKey(row_key.to_string());

    let chunk = row_key.strip_prefix(prefix).ok_or_else(malformed)?;
    let rev = parse_hex_chunk(chunk, 8).ok_or_else(malformed)?;
    Ok(u32::MAX - rev as u32)
}

/// Table key of a contract table tablet: `<contract>:<scope>:<table>`.
pub fn table_data_key(account: Name, scope: Name, table: Name) -> String {
    format!("{}:{}:{}", account.to_hex(), scope.to_hex(), table.to_hex())
}

/// Table key of a key→accounts tablet: `ka2:<publicKey>`.
pub fn key_account_key(public_key: &str) -> String {
    format!("{KEY_ACCOUNT_PREFIX}:{public_key}")
}

/// Table key of an auth-link tablet: `al:<account>`.
pub fn auth_link_key(account: Name) -> String {
    format!("{AUTH_LINK_PREFIX}:{}", account.to_hex())
}

/// Table key of a table-scope tablet: `ts:<account>:<table>`.
pub fn table_scope_key(account: Name, table: Name) -> String {
    format!("{TABLE_SCOPE_PREFIX}:{}:{}", account.to_hex(), table.to_hex())
}

/// Key prefix of an account's ABI rows, trailing colon included.
pub fn abi_prefix_key(account: Name) -> String {
    format!("{}:", account.to_hex())
}

/// Key prefix of a tablet's checkpoint-index rows, trailing colon included.
pub fn index_prefix_key(table_key: &str) -> String {
    format!("{INDEX_PREFIX}:{table_key}:")
}

/// Builds the stored key of one writable row.
pub fn writable_row_key(table_key: &str, block_num: u32, primary_key: &str) -> String {
    format!("{table_key}:{}:{primary_key}", hex_block_num(block_num))
}

/// Splits a writable row key back into `(block_num, primary_key)`.
///
/// Parsing is relative to the tablet being read: the key must be
/// `<table_key>:<8 hex digits>:<primary_key>` with a non-empty primary key
/// (which may itself contain colons, e.g. for key→accounts rows).
pub fn explode_writable_row_key<'k>(table_key: &str, row_key: &'k str) -> DbResult<(u32, &'k str)> {
    let malformed = || DbError::MalformedRowKey(row_key.to_string());

    let rest = row_key
        .strip_prefix(table_key)
        .and_then(|r| r.strip_prefix(':'))
        .ok_or_else(malformed)?;
    let (block_chunk, primary_key) = rest.split_at_checked(8).ok_or_else(malformed)?;
    let block_num = parse_hex_chunk(block_chunk, 8).ok_or_else(malformed)? as u32;
    let primary_key = primary_key.strip_prefix(':').ok_or_else(malformed)?;
    if primary_key.is_empty() {
        return Err(malformed());
    }

    Ok((block_num, primary_key))
}

fn split_primary_key<const N: usize>(primary_key: &str) -> DbResult<[u64; N]> {
    let malformed = || DbError::MalformedPrimaryKey(primary_key.to_string());

    let mut out = [0u64; N];
    let mut chunks = primary_key.split(':');
    for slot in out.iter_mut() {
        let chunk = chunks.next().ok_or_else(malformed)?;
        *slot = parse_hex_chunk(chunk, 16).ok_or_else(malformed)?;
    }
    if chunks.next().is_some() {
        return Err(malformed());
    }

    Ok(out)
}

/// Decodes a contract table primary key, 16 hex digits.
pub fn table_data_primary_key(primary_key: &str) -> DbResult<u64> {
    let [key] = split_primary_key::<1>(primary_key)?;
    Ok(key)
}

/// Decodes a key→accounts primary key, `<account>:<permission>`.
pub fn key_account_primary_key(primary_key: &str) -> DbResult<(u64, u64)> {
    let [account, permission] = split_primary_key::<2>(primary_key)?;
    Ok((account, permission))
}

/// Decodes an auth-link primary key, `<contract>:<action>`.
pub fn auth_link_primary_key(primary_key: &str) -> DbResult<(u64, u64)> {
    let [contract, action] = split_primary_key::<2>(primary_key)?;
    Ok((contract, action))
}

/// Decodes a table-scope primary key, the scope name.
pub fn table_scope_primary_key(primary_key: &str) -> DbResult<u64> {
    let [scope] = split_primary_key::<1>(primary_key)?;
    Ok(scope)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Name {
        s.parse().expect("valid name")
    }

    #[test]
    fn test_hex_block_num() {
        assert_eq!(hex_block_num(0), "00000000");
        assert_eq!(hex_block_num(5), "00000005");
        assert_eq!(hex_block_num(0xdead_beef), "deadbeef");

        assert_eq!(parse_hex_block_num("deadbeef").unwrap(), 0xdead_beef);
        assert_eq!(parse_hex_block_num(&hex_block_num(42)).unwrap(), 42);
        for bad in ["", "0000001", "000000001", "zzzzzzzz"] {
            assert!(parse_hex_block_num(bad).is_err(), "expected malformed: {bad:?}");
        }
    }

    #[test]
    fn test_rev_block_num_sorts_descending() {
        // Lexicographic ascending order of reverse encodings is descending
        // block order.
        let encoded = [hex_rev_block_num(11), hex_rev_block_num(7), hex_rev_block_num(0)];
        let mut sorted = encoded.clone();
        sorted.sort();
        assert_eq!(sorted, encoded);

        assert_eq!(hex_rev_block_num(7), "fffffff8");
        assert_eq!(hex_rev_block_num(11), "fffffff4");
    }

    #[test]
    fn test_chunk_key_rev_block_num() {
        let prefix = abi_prefix_key(name("eosio"));
        let row_key = format!("{prefix}{}", hex_rev_block_num(42));
        assert_eq!(chunk_key_rev_block_num(&row_key, &prefix).unwrap(), 42);

        assert!(chunk_key_rev_block_num("unrelated", &prefix).is_err());
        assert!(chunk_key_rev_block_num(&format!("{prefix}xyz"), &prefix).is_err());
    }

    #[test]
    fn test_explode_writable_row_key() {
        let tk = table_data_key(name("eosio"), name("scope"), name("table"));
        let row_key = writable_row_key(&tk, 8, "0000000000000010");
        let (block_num, pk) = explode_writable_row_key(&tk, &row_key).unwrap();
        assert_eq!(block_num, 8);
        assert_eq!(pk, "0000000000000010");

        // Composite primary keys keep their inner colons.
        let ka = key_account_key("EOS6MRyAj");
        let row_key = writable_row_key(&ka, 3, "00000000000000aa:00000000000000bb");
        let (block_num, pk) = explode_writable_row_key(&ka, &row_key).unwrap();
        assert_eq!(block_num, 3);
        assert_eq!(pk, "00000000000000aa:00000000000000bb");

        for bad in [
            "short",
            &format!("{tk}:0000008:pk"),
            &format!("{tk}:zzzzzzzz:pk"),
            &format!("{tk}:00000008:"),
            &format!("{tk}:00000008"),
        ] {
            assert!(
                explode_writable_row_key(&tk, bad).is_err(),
                "expected malformed: {bad}"
            );
        }
    }

    #[test]
    fn test_index_primary_key_decoders() {
        let (account, permission) =
            key_account_primary_key("00000000000000aa:00000000000000bb").unwrap();
        assert_eq!((account, permission), (0xaa, 0xbb));

        let (contract, action) = auth_link_primary_key(
            &format!("{}:{}", name("eosio.token").to_hex(), name("transfer").to_hex()),
        )
        .unwrap();
        assert_eq!(Name::new(contract).to_string(), "eosio.token");
        assert_eq!(Name::new(action).to_string(), "transfer");

        assert_eq!(table_scope_primary_key("0000000000000010").unwrap(), 0x10);
        assert_eq!(table_data_primary_key(&hex_primary_key(77)).unwrap(), 77);

        assert!(key_account_primary_key("0000000000000010").is_err());
        assert!(table_scope_primary_key("aa:bb").is_err());
        assert!(table_data_primary_key("not-hex").is_err());
    }

    #[test]
    fn test_table_keys() {
        assert_eq!(
            table_scope_key(name("eosio"), name("accounts")),
            format!("ts:{}:{}", name("eosio").to_hex(), name("accounts").to_hex())
        );
        assert_eq!(key_account_key("PUBKEY"), "ka2:PUBKEY");
        assert_eq!(auth_link_key(name("alice")), format!("al:{}", name("alice").to_hex()));
        assert!(abi_prefix_key(name("alice")).ends_with(':'));
        assert_eq!(index_prefix_key("a:b:c"), "ti:a:b:c:");
    }

    #[test]
    fn test_shard_last_block_key() {
        assert_eq!(shard_last_block_key(0), "shard-000");
        assert_eq!(shard_last_block_key(12), "shard-012");
        assert_eq!(shard_last_block_key(123), "shard-123");
    }
}
