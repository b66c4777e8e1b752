//! Identifier validation and quoting.
//!
//! Identifiers (table, column, index, routine names) cannot be bound as
//! statement parameters, so anything that ends up inside generated DDL must
//! pass the allow-list here first.

use crate::error::{DbError, DbResult};

/// Longest identifier the server accepts.
const MAX_IDENT_LEN: usize = 64;

/// Validate an identifier against the allow-list `[A-Za-z0-9_]{1,64}`.
pub fn validate_identifier(name: &str) -> DbResult<()> {
    if name.is_empty() || name.len() > MAX_IDENT_LEN {
        return Err(DbError::InvalidIdentifier(name.to_string()));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_')
    {
        return Err(DbError::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}

/// Validate and backtick-quote an identifier for interpolation into DDL.
pub fn quote_ident(name: &str) -> DbResult<String> {
    validate_identifier(name)?;
    Ok(format!("`{name}`"))
}

#[cfg(test)]
#[path = "ident_test.rs"]
mod tests;
