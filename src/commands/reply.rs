//! Command Replies
//!
//! A [`Reply`] is what a command produces. Its `Display` form is what the
//! interactive shell prints:
//!
//! ```text
//! OK                      successful boolean operation
//! (null)                  failed boolean operation or missing key
//! true / false            EXISTS
//! 42                      TTL (-1 when the key has no TTL)
//! 1) a                    numbered list (KEYS, FIND, SHOWALL), nothing
//! 2) b                    at all when the list is empty
//! 1 / 0                   RENAME
//! OK 12                   UPLOAD / EXPORT with the number of records
//! (error) message         malformed input
//! ```

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Outcome of an operation that either succeeds or does nothing.
    Status(bool),

    /// A yes/no answer.
    Bool(bool),

    Integer(i64),

    /// Free text, printed as is.
    Text(String),

    /// Items printed one per line with a 1-based index.
    List(Vec<String>),

    /// Outcome of a file transfer and the number of records moved.
    Transfer { ok: bool, count: usize },

    Error(String),
}

impl Reply {
    pub fn ok() -> Self {
        Reply::Status(true)
    }

    pub fn null() -> Self {
        Reply::Status(false)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Reply::Error(message.into())
    }

    /// Renders each item with its `Display` form.
    pub fn list<T: fmt::Display>(items: impl IntoIterator<Item = T>) -> Self {
        Reply::List(items.into_iter().map(|item| item.to_string()).collect())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }
}

fn status(ok: bool) -> &'static str {
    if ok {
        "OK"
    } else {
        "(null)"
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Status(ok) => f.write_str(status(*ok)),
            Reply::Bool(b) => write!(f, "{}", b),
            Reply::Integer(n) => write!(f, "{}", n),
            Reply::Text(s) => f.write_str(s),
            Reply::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) {}", i + 1, item)?;
                }
                Ok(())
            }
            Reply::Transfer { ok, count } => write!(f, "{} {}", status(*ok), count),
            Reply::Error(message) => write!(f, "(error) {}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(Reply::ok().to_string(), "OK");
        assert_eq!(Reply::null().to_string(), "(null)");
        assert_eq!(Reply::Bool(false).to_string(), "false");
        assert_eq!(Reply::Integer(-1).to_string(), "-1");
    }

    #[test]
    fn test_list_display() {
        assert_eq!(Reply::list(["a", "b", "c"]).to_string(), "1) a\n2) b\n3) c");
        assert_eq!(Reply::list(Vec::<String>::new()).to_string(), "");
    }

    #[test]
    fn test_transfer_and_error_display() {
        let reply = Reply::Transfer { ok: true, count: 3 };
        assert_eq!(reply.to_string(), "OK 3");

        let reply = Reply::Transfer { ok: false, count: 0 };
        assert_eq!(reply.to_string(), "(null) 0");

        let reply = Reply::error("ERR unknown command 'FOO'");
        assert!(reply.is_error());
        assert_eq!(reply.to_string(), "(error) ERR unknown command 'FOO'");
    }
}
