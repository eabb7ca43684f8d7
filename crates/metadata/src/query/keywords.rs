//! Reserved SQL keywords.
//!
//! The union of words either supported engine refuses as a bare identifier,
//! plus statement verbs that have no business appearing in a field name.

/// Check whether `token` is reserved, case-insensitively.
pub fn is_reserved(token: &str) -> bool {
    let upper = token.to_ascii_uppercase();
    matches!(
        upper.as_str(),
        "ALL"
            | "ALTER"
            | "ANALYZE"
            | "AND"
            | "ANY"
            | "AS"
            | "ASC"
            | "ATTACH"
            | "BETWEEN"
            | "BY"
            | "CASE"
            | "CAST"
            | "CHECK"
            | "COLLATE"
            | "COLUMN"
            | "CONSTRAINT"
            | "CREATE"
            | "CROSS"
            | "CURRENT_DATE"
            | "CURRENT_TIME"
            | "CURRENT_TIMESTAMP"
            | "DEFAULT"
            | "DELETE"
            | "DESC"
            | "DETACH"
            | "DISTINCT"
            | "DROP"
            | "ELSE"
            | "END"
            | "ESCAPE"
            | "EXCEPT"
            | "EXEC"
            | "EXISTS"
            | "FALSE"
            | "FETCH"
            | "FOR"
            | "FOREIGN"
            | "FROM"
            | "FULL"
            | "GRANT"
            | "GROUP"
            | "HAVING"
            | "IN"
            | "INDEX"
            | "INNER"
            | "INSERT"
            | "INTERSECT"
            | "INTO"
            | "IS"
            | "JOIN"
            | "LEFT"
            | "LIKE"
            | "LIMIT"
            | "NATURAL"
            | "NOT"
            | "NULL"
            | "OFFSET"
            | "ON"
            | "OR"
            | "ORDER"
            | "OUTER"
            | "PRAGMA"
            | "PRIMARY"
            | "REFERENCES"
            | "RETURNING"
            | "REVOKE"
            | "RIGHT"
            | "SELECT"
            | "SET"
            | "TABLE"
            | "THEN"
            | "TO"
            | "TRUE"
            | "TRUNCATE"
            | "UNION"
            | "UNIQUE"
            | "UPDATE"
            | "USING"
            | "VACUUM"
            | "VALUES"
            | "WHEN"
            | "WHERE"
            | "WITH"
    )
}

/// Whether `token` is a plain identifier: ASCII letter or underscore, then
/// letters, digits and underscores.
pub fn is_identifier(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
