//! `SWAP.*` / `DEBUG SWAPOUT` control surface (§6).

use coldtier_engine::{Result, SwapError};

use crate::server::{EvictOutcome, LoadOutcome, SwapServer};

/// A reply from [`handle_command`], shaped like the rest of the host
/// server's reply protocol (integer/bulk/array) rather than inventing a
/// swap-specific wire format.
#[derive(Debug, Clone, PartialEq)]
pub enum CliReply {
    /// A bare count or boolean (0/1).
    Integer(i64),
    /// A single text blob (e.g. `SWAP.INFO`'s `# Section` output).
    Bulk(String),
    /// Per-key diagnostic results (`DEBUG SWAPOUT`).
    Array(Vec<CliReply>),
    /// Acknowledges a command with no meaningful return value.
    Ok,
}

fn parse_usize(arg: &[u8], field: &'static str) -> Result<usize> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| SwapError::Data { db: 0, key: arg.to_vec(), reason: format!("{field} must be an unsigned integer") })
}

fn evict_label(outcome: EvictOutcome) -> &'static str {
    match outcome {
        EvictOutcome::Freed => "freed",
        EvictOutcome::Absent => "absent",
        EvictOutcome::Unsupported => "unsupported",
    }
}

/// Dispatches one swap control command. `name` is the already-uppercased
/// command name (for `DEBUG SWAPOUT`, the folded subcommand name
/// `"DEBUG.SWAPOUT"` — command tokenization and `DEBUG`'s subcommand
/// table both live in the host, not here).
pub fn handle_command(server: &SwapServer, db: u32, name: &str, args: &[Vec<u8>]) -> Result<CliReply> {
    match name {
        "SWAP.EVICT" => {
            let outcomes = server.evict_keys(db, args)?;
            let submitted = outcomes.iter().filter(|o| matches!(o, EvictOutcome::Freed)).count();
            Ok(CliReply::Integer(submitted as i64))
        }
        "SWAP.LOAD" => {
            let outcomes = server.load_keys(db, args)?;
            let loaded = outcomes.iter().filter(|o| matches!(o, LoadOutcome::Loaded)).count();
            Ok(CliReply::Integer(loaded as i64))
        }
        "DEBUG.SWAPOUT" => {
            let outcomes = server.evict_keys(db, args)?;
            let replies = args
                .iter()
                .zip(outcomes)
                .map(|(key, outcome)| CliReply::Bulk(format!("{}:{}", String::from_utf8_lossy(key), evict_label(outcome))))
                .collect();
            Ok(CliReply::Array(replies))
        }
        "SWAP.EXPIRED" => {
            let key = args.first().ok_or_else(|| SwapError::Data { db, key: Vec::new(), reason: "SWAP.EXPIRED needs a key".into() })?;
            let removed = server.expire_key(db, key)?;
            Ok(CliReply::Integer(removed as i64))
        }
        "SWAP.SCANEXPIRE" => {
            let limit = match args.first() {
                Some(arg) => parse_usize(arg, "SWAP.SCANEXPIRE limit")?,
                None => 100,
            };
            let processed = server.scan_expire(db, limit)?;
            Ok(CliReply::Integer(processed as i64))
        }
        "SWAP.MUTEXOP" => {
            let _guard = server.mutexop();
            Ok(CliReply::Ok)
        }
        "SWAP.INFO" => Ok(CliReply::Bulk(server.info_string())),
        other => Err(SwapError::Data { db, key: Vec::new(), reason: format!("unknown swap command {other}") }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coldtier_durability::{ColumnStore, MemStore};
    use coldtier_engine::SwapConfig;
    use std::sync::Arc;

    fn server() -> SwapServer {
        let store: Arc<dyn ColumnStore> = Arc::new(MemStore::new());
        SwapServer::new(SwapConfig::default(), store).unwrap()
    }

    #[test]
    fn evict_then_load_through_cli_names() {
        let s = server();
        s.put_hot(0, b"k", b"v".to_vec()).unwrap();
        let evicted = handle_command(&s, 0, "SWAP.EVICT", &[b"k".to_vec()]).unwrap();
        assert_eq!(evicted, CliReply::Integer(1));
        let loaded = handle_command(&s, 0, "SWAP.LOAD", &[b"k".to_vec()]).unwrap();
        assert_eq!(loaded, CliReply::Integer(1));
    }

    #[test]
    fn debug_swapout_reports_per_key_outcomes() {
        let s = server();
        s.put_hot(0, b"k", b"v".to_vec()).unwrap();
        let reply = handle_command(&s, 0, "DEBUG.SWAPOUT", &[b"k".to_vec(), b"ghost".to_vec()]).unwrap();
        match reply {
            CliReply::Array(items) => {
                assert_eq!(items, vec![CliReply::Bulk("k:freed".into()), CliReply::Bulk("ghost:absent".into())]);
            }
            other => panic!("expected Array, got {other:?}"),
        }
    }

    #[test]
    fn info_surfaces_as_bulk_text() {
        let s = server();
        match handle_command(&s, 0, "SWAP.INFO", &[]).unwrap() {
            CliReply::Bulk(text) => assert!(text.starts_with("# ColdFilter")),
            other => panic!("expected Bulk, got {other:?}"),
        }
    }

    #[test]
    fn unknown_command_is_an_error() {
        assert!(handle_command(&server(), 0, "SWAP.BOGUS", &[]).is_err());
    }
}
