//! Field annotation parsing.
//!
//! An annotation is a `;`-separated list of clauses:
//!
//! - `_` ignores the field entirely
//! - `fn=<name>` sets the column name (`fn=_` ignores, `fn=` keeps the default)
//! - `pk=<bool>` marks a primary key column; an unparseable value clears it
//!
//! Anything else is skipped and reported as a [`TagDiagnostic`].

use std::fmt;

/// Column name of an ignored field.
pub const IGNORED: &str = "_";

/// Parsed mapping information of one record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub column: String,
    pub primary_key: bool,
    pub ignored: bool,
}

impl Annotation {
    fn ignore(&mut self) {
        self.column = IGNORED.to_string();
        self.primary_key = false;
        self.ignored = true;
    }
}

/// A clause that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagDiagnostic {
    pub clause: String,
    pub reason: &'static str,
}

impl fmt::Display for TagDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.clause, self.reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parsed {
    pub annotation: Annotation,
    pub diagnostics: Vec<TagDiagnostic>,
}

/// Parses the annotation of the field `field_name`.
pub fn parse(field_name: &str, tag: &str) -> Parsed {
    let default_column = field_name.to_lowercase();
    let mut annotation = Annotation {
        column: default_column.clone(),
        primary_key: false,
        ignored: false,
    };
    let mut diagnostics = Vec::new();
    let mut reject = |clause: &str, reason| {
        diagnostics.push(TagDiagnostic {
            clause: clause.to_string(),
            reason,
        })
    };

    for clause in tag.split(';').map(str::trim) {
        if clause.is_empty() {
            continue;
        }
        if clause == IGNORED {
            annotation.ignore();
            continue;
        }

        let Some((key, value)) = clause.split_once('=') else {
            reject(clause, "expected `key=value` or `_`");
            continue;
        };
        if value.contains('=') {
            reject(clause, "expected a single `=`");
            continue;
        }

        match (key.trim(), value.trim()) {
            ("pk", value) => match parse_bool(value) {
                Some(pk) => annotation.primary_key = pk,
                None => {
                    annotation.primary_key = false;
                    reject(clause, "`pk` expects a boolean");
                }
            },
            ("fn", IGNORED) => annotation.ignore(),
            ("fn", "") => annotation.column = default_column.clone(),
            ("fn", name) => annotation.column = name.to_string(),
            _ => reject(clause, "unknown key"),
        }
    }

    // a later `pk=true` must not resurrect an ignored field
    if annotation.ignored {
        annotation.column = IGNORED.to_string();
        annotation.primary_key = false;
    }

    Parsed {
        annotation,
        diagnostics,
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotation(field: &str, tag: &str) -> Annotation {
        parse(field, tag).annotation
    }

    #[test]
    fn test_default_column_is_lowercased_field_name() {
        let a = annotation("UserName", "");
        assert_eq!(a.column, "username");
        assert!(!a.primary_key);
        assert!(!a.ignored);
    }

    #[test]
    fn test_explicit_column_and_primary_key() {
        let a = annotation("sid", "fn=id; pk=true");
        assert_eq!(a.column, "id");
        assert!(a.primary_key);

        let a = annotation("Sid", "pk=T;fn=");
        assert_eq!(a.column, "sid");
        assert!(a.primary_key);
    }

    #[test]
    fn test_ignore_forms() {
        for tag in ["_", "fn=_", "pk=true;_", "_;pk=true"] {
            let a = annotation("name", tag);
            assert!(a.ignored, "tag {tag:?}");
            assert_eq!(a.column, IGNORED);
            assert!(!a.primary_key);
        }
    }

    #[test]
    fn test_malformed_clauses_are_skipped_and_reported() {
        let parsed = parse("sid", "id;pk=maybe;color=red;fn=a=b;fn=ident");
        assert_eq!(parsed.annotation.column, "ident");
        assert!(!parsed.annotation.primary_key);
        let clauses: Vec<_> = parsed
            .diagnostics
            .iter()
            .map(|d| d.clause.as_str())
            .collect();
        assert_eq!(clauses, vec!["id", "pk=maybe", "color=red", "fn=a=b"]);
    }

    #[test]
    fn test_empty_clauses_are_not_diagnostics() {
        let parsed = parse("id", ";; pk=1 ;");
        assert!(parsed.diagnostics.is_empty());
        assert!(parsed.annotation.primary_key);
    }

    #[test]
    fn test_unparseable_pk_clears_an_earlier_pk() {
        let parsed = parse("sid", "pk=true;pk=maybe");
        assert!(!parsed.annotation.primary_key);
        assert_eq!(parsed.diagnostics.len(), 1);
    }
}
