use std::fmt;

/// A qualified `database.collection` identifier.
///
/// Collection names may themselves contain dots, so parsing splits on the
/// first dot only. A bare database name parses into a namespace with an
/// empty collection part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    database: String,
    collection: String,
}

impl Namespace {
    pub fn parse(ns: &str) -> Self {
        match ns.split_once('.') {
            Some((database, collection)) => {
                Self { database: database.to_string(), collection: collection.to_string() }
            }
            None => Self { database: ns.to_string(), collection: String::new() },
        }
    }

    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self { database: database.into(), collection: collection.into() }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn has_collection(&self) -> bool {
        !self.collection.is_empty()
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.collection.is_empty() {
            f.write_str(&self.database)
        } else {
            write!(f, "{}.{}", self.database, self.collection)
        }
    }
}

impl From<&str> for Namespace {
    fn from(ns: &str) -> Self {
        Self::parse(ns)
    }
}

#[cfg(test)]
mod tests {
    use super::Namespace;

    #[test]
    fn splits_at_first_dot_only() {
        let ns = Namespace::parse("db.coll.with.dots");
        assert_eq!(ns.database(), "db");
        assert_eq!(ns.collection(), "coll.with.dots");
    }

    #[test]
    fn database_only_namespace_has_empty_collection() {
        let ns = Namespace::parse("reporting");
        assert_eq!(ns.database(), "reporting");
        assert_eq!(ns.collection(), "");
        assert!(!ns.has_collection());
    }

    #[test]
    fn display_round_trips() {
        assert_eq!(Namespace::parse("app.users").to_string(), "app.users");
        assert_eq!(Namespace::parse("app").to_string(), "app");
        assert_eq!(Namespace::parse("a.b.c").to_string(), "a.b.c");
    }

    #[test]
    fn trailing_dot_yields_empty_collection() {
        let ns = Namespace::parse("db.");
        assert_eq!(ns.database(), "db");
        assert!(!ns.has_collection());
    }
}
