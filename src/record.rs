//! The value record stored by the shell and used in upload/export files.
//!
//! A record is five whitespace-separated fields:
//!
//! ```text
//! <name> <surname> <birthday> <city> <coins>
//! ```

use crate::error::ParseRecordError;
use std::fmt;
use std::str::FromStr;

/// A plain person record. The storage engines treat it as an opaque value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Record {
    pub name: String,
    pub surname: String,
    pub birthday: i32,
    pub city: String,
    pub coins: i32,
}

impl Record {
    pub fn new(
        name: impl Into<String>,
        surname: impl Into<String>,
        birthday: i32,
        city: impl Into<String>,
        coins: i32,
    ) -> Self {
        Self {
            name: name.into(),
            surname: surname.into(),
            birthday,
            city: city.into(),
            coins,
        }
    }

    /// Parses a record from exactly five already-split fields.
    pub fn from_fields(fields: &[&str]) -> Result<Self, ParseRecordError> {
        let [name, surname, birthday, city, coins] = fields else {
            return Err(ParseRecordError::FieldCount(fields.len()));
        };

        Ok(Self {
            name: (*name).to_string(),
            surname: (*surname).to_string(),
            birthday: parse_number("birthday", birthday)?,
            city: (*city).to_string(),
            coins: parse_number("coins", coins)?,
        })
    }
}

fn parse_number(field: &'static str, value: &str) -> Result<i32, ParseRecordError> {
    value.parse().map_err(|_| ParseRecordError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.name, self.surname, self.birthday, self.city, self.coins
        )
    }
}

impl FromStr for Record {
    type Err = ParseRecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        Self::from_fields(&fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let record: Record = "Ivan Petrov 1999 Moscow 42".parse().unwrap();
        assert_eq!(record, Record::new("Ivan", "Petrov", 1999, "Moscow", 42));
        assert_eq!(record.to_string(), "Ivan Petrov 1999 Moscow 42");
    }

    #[test]
    fn test_parse_tolerates_extra_whitespace() {
        let record: Record = "  Ann\tLee  2001 Oslo   7 ".parse().unwrap();
        assert_eq!(record.city, "Oslo");
        assert_eq!(record.coins, 7);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            "Ann Lee 2001 Oslo".parse::<Record>(),
            Err(ParseRecordError::FieldCount(4))
        );
        assert_eq!(
            "Ann Lee year Oslo 7".parse::<Record>(),
            Err(ParseRecordError::InvalidNumber {
                field: "birthday",
                value: "year".to_string()
            })
        );
        assert!(matches!(
            "Ann Lee 2001 Oslo many".parse::<Record>(),
            Err(ParseRecordError::InvalidNumber { field: "coins", .. })
        ));
    }
}
