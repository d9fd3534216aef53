//! Gremlin script construction.

use std::fmt::{self, Write};

/// Anything that renders to a Gremlin script.
pub trait QueryBuilder {
    fn to_query(&self) -> String;
}

impl QueryBuilder for str {
    fn to_query(&self) -> String {
        self.to_string()
    }
}

impl QueryBuilder for String {
    fn to_query(&self) -> String {
        self.clone()
    }
}

impl<T: QueryBuilder + ?Sized> QueryBuilder for &T {
    fn to_query(&self) -> String {
        (**self).to_query()
    }
}

/// A literal step argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Str(s) => write!(f, "'{}'", escape(s)),
            Literal::Int(n) => write!(f, "{}", n),
            Literal::Float(x) if x.is_finite() => write!(f, "{:?}", x),
            Literal::Float(x) if x.is_nan() => f.write_str("Double.NaN"),
            Literal::Float(x) if *x > 0.0 => f.write_str("Double.POSITIVE_INFINITY"),
            Literal::Float(_) => f.write_str("Double.NEGATIVE_INFINITY"),
            Literal::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::Str(s.to_string())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Literal::Str(s)
    }
}

impl From<&String> for Literal {
    fn from(s: &String) -> Self {
        Literal::Str(s.clone())
    }
}

impl From<i64> for Literal {
    fn from(n: i64) -> Self {
        Literal::Int(n)
    }
}

impl From<i32> for Literal {
    fn from(n: i32) -> Self {
        Literal::Int(n.into())
    }
}

impl From<u32> for Literal {
    fn from(n: u32) -> Self {
        Literal::Int(n.into())
    }
}

impl From<f64> for Literal {
    fn from(x: f64) -> Self {
        Literal::Float(x)
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Literal::Bool(b)
    }
}

/// Escapes a value for a single-quoted Groovy string.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

/// Fluent traversal builder. Starts from [`g`].
///
/// ```
/// use gremlink_client::query::{g, QueryBuilder};
///
/// let q = g().v(["marko"]).out(&["knows"]).values(["name"]);
/// assert_eq!(q.to_query(), "g.V('marko').out('knows').values('name')");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Traversal {
    script: String,
}

/// The graph traversal source.
pub fn g() -> Traversal {
    Traversal {
        script: "g".to_string(),
    }
}

impl Traversal {
    fn step<I, L>(mut self, name: &str, args: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Literal>,
    {
        self.script.push('.');
        self.script.push_str(name);
        self.script.push('(');
        for (i, arg) in args.into_iter().enumerate() {
            if i > 0 {
                self.script.push_str(", ");
            }
            let _ = write!(self.script, "{}", arg.into());
        }
        self.script.push(')');
        self
    }

    fn bare(self, name: &str) -> Self {
        self.step(name, std::iter::empty::<Literal>())
    }

    fn label_step(self, name: &str, labels: &[&str]) -> Self {
        self.step(name, labels.iter().copied())
    }

    pub fn v<I, L>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Literal>,
    {
        self.step("V", ids)
    }

    pub fn e<I, L>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Literal>,
    {
        self.step("E", ids)
    }

    pub fn add_v(self, label: &str) -> Self {
        self.step("addV", [label])
    }

    pub fn add_e(self, label: &str) -> Self {
        self.step("addE", [label])
    }

    pub fn has(self, key: &str, value: impl Into<Literal>) -> Self {
        self.step("has", [Literal::from(key), value.into()])
    }

    pub fn has_label(self, label: &str) -> Self {
        self.step("hasLabel", [label])
    }

    pub fn has_id(self, id: impl Into<Literal>) -> Self {
        self.step("hasId", [id.into()])
    }

    pub fn property(self, key: &str, value: impl Into<Literal>) -> Self {
        self.step("property", [Literal::from(key), value.into()])
    }

    pub fn out(self, labels: &[&str]) -> Self {
        self.label_step("out", labels)
    }

    pub fn in_(self, labels: &[&str]) -> Self {
        self.label_step("in", labels)
    }

    pub fn out_e(self, labels: &[&str]) -> Self {
        self.label_step("outE", labels)
    }

    pub fn in_e(self, labels: &[&str]) -> Self {
        self.label_step("inE", labels)
    }

    pub fn both(self, labels: &[&str]) -> Self {
        self.label_step("both", labels)
    }

    /// Sets the outgoing end of an edge being added.
    pub fn from_v(mut self, id: impl Into<Literal>) -> Self {
        let _ = write!(self.script, ".from(__.V({}))", id.into());
        self
    }

    /// Sets the incoming end of an edge being added.
    pub fn to_v(mut self, id: impl Into<Literal>) -> Self {
        let _ = write!(self.script, ".to(__.V({}))", id.into());
        self
    }

    pub fn values<'a>(self, keys: impl IntoIterator<Item = &'a str>) -> Self {
        self.step("values", keys)
    }

    pub fn value_map(self) -> Self {
        self.bare("valueMap")
    }

    pub fn limit(self, n: i64) -> Self {
        self.step("limit", [n])
    }

    pub fn count(self) -> Self {
        self.bare("count")
    }

    pub fn id(self) -> Self {
        self.bare("id")
    }

    pub fn label(self) -> Self {
        self.bare("label")
    }

    pub fn drop(self) -> Self {
        self.bare("drop")
    }
}

impl QueryBuilder for Traversal {
    fn to_query(&self) -> String {
        self.script.clone()
    }
}

impl fmt::Display for Traversal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.script)
    }
}
