//! Verb names and the per-unit verb table.

use std::fmt;

use axum::http::Method;

/// A verb a unit can implement, in canonical `Allow` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
}

impl Verb {
    pub const ALL: [Verb; 6] = [
        Verb::Get,
        Verb::Head,
        Verb::Post,
        Verb::Put,
        Verb::Patch,
        Verb::Delete,
    ];

    /// Name of the script function implementing this verb.
    pub fn fn_name(self) -> &'static str {
        match self {
            Verb::Get => "get",
            Verb::Head => "head",
            Verb::Post => "post",
            Verb::Put => "put",
            Verb::Patch => "patch",
            Verb::Delete => "delete",
        }
    }

    pub fn from_fn_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.fn_name() == name)
    }

    pub fn from_method(method: &Method) -> Option<Self> {
        match *method {
            Method::GET => Some(Verb::Get),
            Method::HEAD => Some(Verb::Head),
            Method::POST => Some(Verb::Post),
            Method::PUT => Some(Verb::Put),
            Method::PATCH => Some(Verb::Patch),
            Method::DELETE => Some(Verb::Delete),
            _ => None,
        }
    }

    pub fn as_method(self) -> Method {
        match self {
            Verb::Get => Method::GET,
            Verb::Head => Method::HEAD,
            Verb::Post => Method::POST,
            Verb::Put => Method::PUT,
            Verb::Patch => Method::PATCH,
            Verb::Delete => Method::DELETE,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_method().as_str())
    }
}

/// Which verbs a compiled unit declares. Built once per compile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerbTable {
    declared: [bool; 6],
}

impl VerbTable {
    pub fn insert(&mut self, verb: Verb) {
        self.declared[verb.index()] = true;
    }

    pub fn has(&self, verb: Verb) -> bool {
        self.declared[verb.index()]
    }

    pub fn is_empty(&self) -> bool {
        !self.declared.iter().any(|d| *d)
    }

    /// Declared verbs in canonical order.
    pub fn verbs(&self) -> impl Iterator<Item = Verb> + '_ {
        Verb::ALL.into_iter().filter(|v| self.has(*v))
    }

    /// Methods to advertise in `Allow`: declared verbs, HEAD implied by GET,
    /// and OPTIONS last.
    pub fn allowed_methods(&self) -> Vec<Method> {
        let mut methods: Vec<Method> = Verb::ALL
            .into_iter()
            .filter(|v| self.has(*v) || (*v == Verb::Head && self.has(Verb::Get)))
            .map(Verb::as_method)
            .collect();
        methods.push(Method::OPTIONS);
        methods
    }

    pub fn allow_header(&self) -> String {
        self.allowed_methods()
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromIterator<Verb> for VerbTable {
    fn from_iter<I: IntoIterator<Item = Verb>>(iter: I) -> Self {
        let mut table = VerbTable::default();
        for verb in iter {
            table.insert(verb);
        }
        table
    }
}
