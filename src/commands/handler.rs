//! Command Handler Module
//!
//! This module implements the line commands of the twinkv shell. Each input
//! line is split on whitespace, the first word picks the command
//! (case-insensitive) and the rest are its arguments.
//!
//! ## Supported Commands
//!
//! - `SET key <record> [EX seconds]` - Insert a key if absent
//! - `GET key` - Print a key's record
//! - `EXISTS key` - Check if a key exists
//! - `DEL key` - Delete a key
//! - `UPDATE key <record>` - Replace the record of an existing key
//! - `KEYS` - List all keys
//! - `RENAME key newkey` - Rename a key, printing 1 on success and 0 otherwise
//! - `TTL key` - Remaining seconds to live
//! - `FIND <record>` - List keys holding this record
//! - `SHOWALL` - List all records
//! - `UPLOAD path` - Load records from a file
//! - `EXPORT path` - Write all records to a file
//! - `INFO` - Store statistics
//! - `HELP` - List commands
//!
//! A `<record>` is five fields: `name surname birthday city coins`.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │  execute()  │───>│  dispatch() │───>│   cmd_*()   │      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      KeyValueStore          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use super::reply::Reply;
use crate::record::Record;
use crate::storage::KeyValueStore;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// The store type the shell works with, whichever engine backs it.
pub type SharedStore = Arc<dyn KeyValueStore<Key = String, Value = Record>>;

/// Command names with their argument synopsis, in HELP order.
pub const COMMANDS: &[(&str, &str)] = &[
    ("SET", "<key> <record> [EX <seconds>]"),
    ("GET", "<key>"),
    ("EXISTS", "<key>"),
    ("DEL", "<key>"),
    ("UPDATE", "<key> <record>"),
    ("KEYS", ""),
    ("RENAME", "<key> <newkey>"),
    ("TTL", "<key>"),
    ("FIND", "<record>"),
    ("SHOWALL", ""),
    ("UPLOAD", "<path>"),
    ("EXPORT", "<path>"),
    ("INFO", ""),
    ("HELP", ""),
];

const RECORD_FIELDS: usize = 5;

/// Executes text commands against a [`KeyValueStore`].
#[derive(Clone)]
pub struct CommandHandler {
    store: SharedStore,
}

impl CommandHandler {
    /// Creates a new command handler over the given store.
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Executes one input line and returns the reply.
    pub fn execute(&self, line: &str) -> Reply {
        let mut words = line.split_whitespace();

        let Some(name) = words.next() else {
            return Reply::error("ERR empty command");
        };
        let args: Vec<&str> = words.collect();

        let cmd = name.to_uppercase();
        debug!(command = %cmd, args = args.len(), "Executing command");
        self.dispatch(&cmd, &args)
    }

    /// Dispatches a command to its handler.
    fn dispatch(&self, cmd: &str, args: &[&str]) -> Reply {
        match cmd {
            "SET" => self.cmd_set(args),
            "GET" => self.cmd_get(args),
            "EXISTS" => self.cmd_exists(args),
            "DEL" => self.cmd_del(args),
            "UPDATE" => self.cmd_update(args),
            "KEYS" => self.cmd_keys(args),
            "RENAME" => self.cmd_rename(args),
            "TTL" => self.cmd_ttl(args),
            "FIND" => self.cmd_find(args),
            "SHOWALL" => self.cmd_showall(args),
            "UPLOAD" => self.cmd_upload(args),
            "EXPORT" => self.cmd_export(args),
            "INFO" => self.cmd_info(args),
            "HELP" => self.cmd_help(args),

            _ => Reply::error(format!("ERR unknown command '{}'", cmd)),
        }
    }

    // ========================================================================
    // Helper functions
    // ========================================================================

    fn wrong_args(cmd: &str) -> Reply {
        Reply::error(format!(
            "ERR wrong number of arguments for '{}' command",
            cmd
        ))
    }

    /// Parses a record from exactly five fields.
    fn parse_record(fields: &[&str]) -> Result<Record, Reply> {
        Record::from_fields(fields).map_err(|e| Reply::error(format!("ERR invalid record: {}", e)))
    }

    // ========================================================================
    // Storage Commands
    // ========================================================================

    /// SET key <record> [EX seconds]
    fn cmd_set(&self, args: &[&str]) -> Reply {
        let (record_end, ttl) = match args.len() {
            6 => (6, None),
            8 => {
                if !args[6].eq_ignore_ascii_case("EX") {
                    return Reply::error(format!("ERR unknown option '{}'", args[6]));
                }
                match args[7].parse::<u64>() {
                    Ok(secs) => (6, Some(Duration::from_secs(secs))),
                    Err(_) => return Reply::error("ERR invalid expire time"),
                }
            }
            _ => return Self::wrong_args("SET"),
        };

        let record = match Self::parse_record(&args[1..record_end]) {
            Ok(record) => record,
            Err(reply) => return reply,
        };
        let key = args[0].to_string();

        let inserted = match ttl {
            Some(ttl) => self.store.set_with_ttl(key, record, ttl),
            None => self.store.set(key, record),
        };
        Reply::Status(inserted)
    }

    /// GET key
    fn cmd_get(&self, args: &[&str]) -> Reply {
        let [key] = args else {
            return Self::wrong_args("GET");
        };

        match self.store.get(&key.to_string()) {
            Ok(record) => Reply::Text(record.to_string()),
            Err(_) => Reply::null(),
        }
    }

    /// EXISTS key
    fn cmd_exists(&self, args: &[&str]) -> Reply {
        let [key] = args else {
            return Self::wrong_args("EXISTS");
        };
        Reply::Bool(self.store.exists(&key.to_string()))
    }

    /// DEL key
    fn cmd_del(&self, args: &[&str]) -> Reply {
        let [key] = args else {
            return Self::wrong_args("DEL");
        };
        Reply::Status(self.store.del(&key.to_string()))
    }

    /// UPDATE key <record>
    fn cmd_update(&self, args: &[&str]) -> Reply {
        if args.len() != RECORD_FIELDS + 1 {
            return Self::wrong_args("UPDATE");
        }

        match Self::parse_record(&args[1..]) {
            Ok(record) => Reply::Status(self.store.update(&args[0].to_string(), record)),
            Err(reply) => reply,
        }
    }

    /// KEYS
    fn cmd_keys(&self, args: &[&str]) -> Reply {
        if !args.is_empty() {
            return Self::wrong_args("KEYS");
        }
        Reply::list(self.store.keys())
    }

    /// RENAME key newkey
    fn cmd_rename(&self, args: &[&str]) -> Reply {
        let [old, new] = args else {
            return Self::wrong_args("RENAME");
        };
        let renamed = self.store.rename(&old.to_string(), new.to_string());
        Reply::Integer(i64::from(renamed))
    }

    /// TTL key
    fn cmd_ttl(&self, args: &[&str]) -> Reply {
        let [key] = args else {
            return Self::wrong_args("TTL");
        };

        match self.store.ttl(&key.to_string()) {
            Ok(Some(secs)) => Reply::Integer(secs),
            Ok(None) => Reply::Integer(-1),
            Err(_) => Reply::null(),
        }
    }

    /// FIND <record>
    fn cmd_find(&self, args: &[&str]) -> Reply {
        if args.len() != RECORD_FIELDS {
            return Self::wrong_args("FIND");
        }

        match Self::parse_record(args) {
            Ok(record) => Reply::list(self.store.find(&record)),
            Err(reply) => reply,
        }
    }

    /// SHOWALL
    fn cmd_showall(&self, args: &[&str]) -> Reply {
        if !args.is_empty() {
            return Self::wrong_args("SHOWALL");
        }
        Reply::list(self.store.showall())
    }

    /// UPLOAD path
    fn cmd_upload(&self, args: &[&str]) -> Reply {
        let [path] = args else {
            return Self::wrong_args("UPLOAD");
        };

        match self.store.upload(Path::new(path)) {
            Ok(count) => Reply::Transfer { ok: true, count },
            Err(e) => {
                debug!(path = %path, error = %e, "Upload failed");
                Reply::Transfer { ok: false, count: 0 }
            }
        }
    }

    /// EXPORT path
    fn cmd_export(&self, args: &[&str]) -> Reply {
        let [path] = args else {
            return Self::wrong_args("EXPORT");
        };

        match self.store.export(Path::new(path)) {
            Ok(count) => Reply::Transfer { ok: true, count },
            Err(e) => {
                debug!(path = %path, error = %e, "Export failed");
                Reply::Transfer { ok: false, count: 0 }
            }
        }
    }

    /// INFO
    fn cmd_info(&self, args: &[&str]) -> Reply {
        if !args.is_empty() {
            return Self::wrong_args("INFO");
        }

        let stats = self.store.stats();
        let info = format!(
            "# Server\n\
             twinkv_version:{}\n\
             \n\
             # Keyspace\n\
             keys:{}\n\
             pending_expirations:{}\n\
             \n\
             # Operations\n\
             set_ops:{}\n\
             get_ops:{}\n\
             del_ops:{}\n\
             expired_keys:{}",
            crate::VERSION,
            stats.keys,
            stats.pending_expirations,
            stats.sets,
            stats.gets,
            stats.dels,
            stats.expired,
        );

        Reply::Text(info)
    }

    /// HELP
    fn cmd_help(&self, _args: &[&str]) -> Reply {
        Reply::list(COMMANDS.iter().map(|(name, synopsis)| {
            if synopsis.is_empty() {
                name.to_string()
            } else {
                format!("{} {}", name, synopsis)
            }
        }))
    }
}
