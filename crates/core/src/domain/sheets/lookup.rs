use std::{fmt::Formatter, str::FromStr};
use thiserror::Error;

/// How a session finds its spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Create a brand new spreadsheet with a generated title.
    Create,
    Title(String),
    Key(String),
    Url(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("Lookup key ({0}) does not match one of [title, key, url]")]
    UnknownMethod(String),
    #[error("Only one lookup may be given, got {0}")]
    Ambiguous(usize),
}

impl Lookup {
    pub fn from_keyword(method: &str, value: impl Into<String>) -> Result<Self, LookupError> {
        let value = value.into();
        match method {
            "title" => Ok(Lookup::Title(value)),
            "key" => Ok(Lookup::Key(value)),
            "url" => Ok(Lookup::Url(value)),
            other => Err(LookupError::UnknownMethod(other.to_string())),
        }
    }

    /// Zero keywords creates a spreadsheet, exactly one selects the lookup,
    /// anything more is rejected.
    pub fn from_keywords<I, K, V>(keywords: I) -> Result<Self, LookupError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut keywords = keywords.into_iter().collect::<Vec<_>>();
        match keywords.len() {
            0 => Ok(Lookup::Create),
            1 => {
                let (method, value) = keywords.remove(0);
                Lookup::from_keyword(method.as_ref(), value)
            }
            n => Err(LookupError::Ambiguous(n)),
        }
    }

    /// A positional argument is a title; mixing it with keywords is rejected.
    pub fn from_args<K, V>(
        positional: Option<String>,
        keywords: Vec<(K, V)>,
    ) -> Result<Self, LookupError>
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        match positional {
            Some(title) if keywords.is_empty() => Ok(Lookup::Title(title)),
            Some(_) => Err(LookupError::Ambiguous(keywords.len() + 1)),
            None => Lookup::from_keywords(keywords),
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Lookup::Create => "create",
            Lookup::Title(_) => "title",
            Lookup::Key(_) => "key",
            Lookup::Url(_) => "url",
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Lookup::Create => None,
            Lookup::Title(value) | Lookup::Key(value) | Lookup::Url(value) => Some(value),
        }
    }
}

impl std::fmt::Display for Lookup {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.value() {
            Some(value) => write!(f, "{}={}", self.method(), value),
            None => write!(f, "{}", self.method()),
        }
    }
}

/// Parses `method=value`; a string without `=` is a title.
impl FromStr for Lookup {
    type Err = LookupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((method, value)) => Lookup::from_keyword(method, value),
            None => Ok(Lookup::Title(s.to_string())),
        }
    }
}
