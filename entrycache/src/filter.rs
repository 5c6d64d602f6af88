// Copyright 2026 foyer Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{cmp::Ordering, fmt::Display, str::FromStr};

use entrycache_common::{
    dn::normalize_value,
    error::{Error, ErrorKind, Result},
};

use crate::entry::Entry;

/// An LDAP search filter in its parsed form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchFilter {
    /// `(&...)`, true for an empty list.
    And(Vec<SearchFilter>),
    /// `(|...)`, false for an empty list.
    Or(Vec<SearchFilter>),
    /// `(!...)`.
    Not(Box<SearchFilter>),
    /// `(attr=value)`.
    Equality {
        /// Attribute type.
        attr: String,
        /// Asserted value.
        value: String,
    },
    /// `(attr~=value)`, matched like equality.
    Approximate {
        /// Attribute type.
        attr: String,
        /// Asserted value.
        value: String,
    },
    /// `(attr>=value)`.
    GreaterOrEqual {
        /// Attribute type.
        attr: String,
        /// Asserted value.
        value: String,
    },
    /// `(attr<=value)`.
    LessOrEqual {
        /// Attribute type.
        attr: String,
        /// Asserted value.
        value: String,
    },
    /// `(attr=*)`.
    Present {
        /// Attribute type.
        attr: String,
    },
    /// `(attr=initial*any*final)`.
    Substring {
        /// Attribute type.
        attr: String,
        /// Leading part.
        initial: Option<String>,
        /// Inner parts, in order.
        any: Vec<String>,
        /// Trailing part.
        last: Option<String>,
    },
}

impl SearchFilter {
    /// Parse the string form of a filter. The outer parentheses may be omitted.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let wrapped;
        let s = if s.starts_with('(') {
            s
        } else {
            wrapped = format!("({s})");
            &wrapped
        };

        let mut parser = Parser { s, pos: 0 };
        let filter = parser.filter().map_err(|e| e.with_context("filter", s))?;
        if parser.pos != s.len() {
            return Err(Error::new(ErrorKind::Parse, "unexpected characters after filter")
                .with_context("filter", s)
                .with_context("position", parser.pos));
        }
        Ok(filter)
    }

    /// Whether the entry matches the filter. Values are compared case-insensitively.
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            SearchFilter::And(filters) => filters.iter().all(|f| f.matches(entry)),
            SearchFilter::Or(filters) => filters.iter().any(|f| f.matches(entry)),
            SearchFilter::Not(filter) => !filter.matches(entry),
            SearchFilter::Equality { attr, value } | SearchFilter::Approximate { attr, value } => {
                let value = normalize_value(value);
                values_of(entry, attr).any(|v| normalize_value(v) == value)
            }
            SearchFilter::GreaterOrEqual { attr, value } => {
                values_of(entry, attr).any(|v| compare(v, value) != Ordering::Less)
            }
            SearchFilter::LessOrEqual { attr, value } => {
                values_of(entry, attr).any(|v| compare(v, value) != Ordering::Greater)
            }
            SearchFilter::Present { attr } => values_of(entry, attr).next().is_some(),
            SearchFilter::Substring {
                attr,
                initial,
                any,
                last,
            } => values_of(entry, attr).any(|v| matches_substring(&normalize_value(v), initial, any, last)),
        }
    }
}

impl FromStr for SearchFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Display for SearchFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchFilter::And(filters) | SearchFilter::Or(filters) => {
                let op = if matches!(self, SearchFilter::And(_)) { '&' } else { '|' };
                write!(f, "({op}")?;
                for filter in filters {
                    write!(f, "{filter}")?;
                }
                write!(f, ")")
            }
            SearchFilter::Not(filter) => write!(f, "(!{filter})"),
            SearchFilter::Equality { attr, value } => write!(f, "({attr}={})", escape(value)),
            SearchFilter::Approximate { attr, value } => write!(f, "({attr}~={})", escape(value)),
            SearchFilter::GreaterOrEqual { attr, value } => write!(f, "({attr}>={})", escape(value)),
            SearchFilter::LessOrEqual { attr, value } => write!(f, "({attr}<={})", escape(value)),
            SearchFilter::Present { attr } => write!(f, "({attr}=*)"),
            SearchFilter::Substring {
                attr,
                initial,
                any,
                last,
            } => {
                write!(f, "({attr}=")?;
                if let Some(initial) = initial {
                    write!(f, "{}", escape(initial))?;
                }
                write!(f, "*")?;
                for part in any {
                    write!(f, "{}*", escape(part))?;
                }
                if let Some(last) = last {
                    write!(f, "{}", escape(last))?;
                }
                write!(f, ")")
            }
        }
    }
}

fn values_of<'a>(entry: &'a Entry, attr: &str) -> Box<dyn Iterator<Item = &'a String> + 'a> {
    if attr.eq_ignore_ascii_case("objectclass") {
        return Box::new(entry.object_classes().iter());
    }
    match entry.attribute(attr) {
        Some(attribute) => Box::new(attribute.values().iter()),
        None => Box::new(std::iter::empty()),
    }
}

/// Order integers numerically and everything else by normalized string.
fn compare(actual: &str, asserted: &str) -> Ordering {
    match (actual.trim().parse::<i64>(), asserted.trim().parse::<i64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => normalize_value(actual).cmp(&normalize_value(asserted)),
    }
}

fn matches_substring(value: &str, initial: &Option<String>, any: &[String], last: &Option<String>) -> bool {
    let mut rest = value;
    if let Some(initial) = initial {
        match rest.strip_prefix(normalize_value(initial).as_str()) {
            Some(r) => rest = r,
            None => return false,
        }
    }
    for part in any {
        let part = normalize_value(part);
        match rest.find(part.as_str()) {
            Some(i) => rest = &rest[i + part.len()..],
            None => return false,
        }
    }
    match last {
        Some(last) => rest.ends_with(normalize_value(last).as_str()),
        None => true,
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '*' => out.push_str("\\2a"),
            '(' => out.push_str("\\28"),
            ')' => out.push_str("\\29"),
            '\\' => out.push_str("\\5c"),
            '\0' => out.push_str("\\00"),
            c => out.push(c),
        }
    }
    out
}

struct Parser<'a> {
    s: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.s[self.pos..].chars().next()
    }

    fn expect(&mut self, c: char) -> Result<()> {
        match self.peek() {
            Some(p) if p == c => {
                self.pos += c.len_utf8();
                Ok(())
            }
            _ => Err(Error::new(ErrorKind::Parse, format!("expected '{c}'")).with_context("position", self.pos)),
        }
    }

    fn filter(&mut self) -> Result<SearchFilter> {
        self.expect('(')?;
        let filter = match self.peek() {
            Some('&') => {
                self.pos += 1;
                SearchFilter::And(self.list()?)
            }
            Some('|') => {
                self.pos += 1;
                SearchFilter::Or(self.list()?)
            }
            Some('!') => {
                self.pos += 1;
                SearchFilter::Not(Box::new(self.filter()?))
            }
            _ => self.item()?,
        };
        self.expect(')')?;
        Ok(filter)
    }

    fn list(&mut self) -> Result<Vec<SearchFilter>> {
        let mut filters = vec![];
        while self.peek() == Some('(') {
            filters.push(self.filter()?);
        }
        Ok(filters)
    }

    fn item(&mut self) -> Result<SearchFilter> {
        let start = self.pos;
        let end = self.s[start..]
            .find(['(', ')'])
            .map(|i| start + i)
            .ok_or_else(|| Error::new(ErrorKind::Parse, "unterminated filter item").with_context("position", start))?;
        let item = &self.s[start..end];
        self.pos = end;

        let Some(eq) = item.find('=') else {
            return Err(Error::new(ErrorKind::Parse, "missing operator in filter item").with_context("item", item));
        };
        let (attr, op) = match item[..eq].chars().last() {
            Some(c @ ('~' | '>' | '<')) => (&item[..eq - 1], Some(c)),
            _ => (&item[..eq], None),
        };
        let attr = attr.trim();
        if attr.is_empty() || !attr.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == ';') {
            return Err(Error::new(ErrorKind::Parse, "invalid attribute type in filter item").with_context("item", item));
        }
        let attr = attr.to_string();
        let raw = &item[eq + 1..];

        let filter = match op {
            Some('~') => SearchFilter::Approximate {
                attr,
                value: unescape(raw)?,
            },
            Some('>') => SearchFilter::GreaterOrEqual {
                attr,
                value: unescape(raw)?,
            },
            Some('<') => SearchFilter::LessOrEqual {
                attr,
                value: unescape(raw)?,
            },
            _ if raw == "*" => SearchFilter::Present { attr },
            _ if raw.contains('*') => {
                let mut parts = raw.split('*').map(unescape).collect::<Result<Vec<_>>>()?;
                let last = parts.pop().filter(|p| !p.is_empty());
                let initial = Some(parts.remove(0)).filter(|p| !p.is_empty());
                let any = parts.into_iter().filter(|p| !p.is_empty()).collect();
                SearchFilter::Substring {
                    attr,
                    initial,
                    any,
                    last,
                }
            }
            _ => SearchFilter::Equality {
                attr,
                value: unescape(raw)?,
            },
        };
        Ok(filter)
    }
}

/// Resolve `\XX` hex escapes of a filter value.
fn unescape(raw: &str) -> Result<String> {
    let mut bytes = Vec::with_capacity(raw.len());
    let mut iter = raw.bytes();
    while let Some(b) = iter.next() {
        if b != b'\\' {
            bytes.push(b);
            continue;
        }
        let hex = [iter.next(), iter.next()];
        let [Some(hi), Some(lo)] = hex else {
            return Err(Error::new(ErrorKind::Parse, "truncated escape in filter value").with_context("value", raw));
        };
        let digit = |b: u8| (b as char).to_digit(16);
        match (digit(hi), digit(lo)) {
            (Some(hi), Some(lo)) => bytes.push((hi * 16 + lo) as u8),
            _ => {
                return Err(Error::new(ErrorKind::Parse, "invalid escape in filter value").with_context("value", raw));
            }
        }
    }
    String::from_utf8(bytes).map_err(|e| Error::new(ErrorKind::Parse, "filter value is not UTF-8").with_source(e))
}

#[cfg(test)]
mod tests {
    use entrycache_common::dn::Dn;

    use super::*;

    fn entry() -> Entry {
        Entry::new(Dn::parse("uid=jdoe,ou=people,dc=example").unwrap())
            .with_object_class("top")
            .with_object_class("inetOrgPerson")
            .with_attribute("uid", ["jdoe"])
            .with_attribute("cn", ["John  Doe"])
            .with_attribute("employeeNumber", ["42"])
            .with_attribute("description", ["a (tricky) value*"])
    }

    fn check(filter: &str) -> bool {
        SearchFilter::parse(filter).unwrap().matches(&entry())
    }

    #[test]
    fn test_match() {
        assert!(check("(objectClass=inetorgperson)"));
        assert!(check("objectClass=*"));
        assert!(check("(uid=JDOE)"));
        assert!(check("(cn=john doe)"));
        assert!(!check("(uid=other)"));
        assert!(!check("(&(uid=jdoe)(objectClass=person)(!(objectClass=person)))"));
        assert!(check("(|(uid=other)(mail=*)(employeeNumber>=41))"));
        assert!(check("(employeeNumber<=42)"));
        assert!(!check("(employeeNumber>=100)"));
        assert!(check("(cn=jo*)"));
        assert!(check("(cn=*n d*)"));
        assert!(check("(cn=j*o*oe)"));
        assert!(!check("(cn=*smith)"));
        assert!(check("(description=a \\28tricky\\29 value\\2a)"));
        assert!(check("(cn~=John Doe)"));
        assert!(!check("(mail=*)"));
        assert!(check("(&)"));
        assert!(!check("(|)"));
    }

    #[test]
    fn test_parse_shapes() {
        assert_eq!(
            SearchFilter::parse("(cn=a*b*c)").unwrap(),
            SearchFilter::Substring {
                attr: "cn".into(),
                initial: Some("a".into()),
                any: vec!["b".into()],
                last: Some("c".into()),
            }
        );
        assert_eq!(
            SearchFilter::parse("(cn=*b*)").unwrap(),
            SearchFilter::Substring {
                attr: "cn".into(),
                initial: None,
                any: vec!["b".into()],
                last: None,
            }
        );
    }

    #[test]
    fn test_display() {
        for s in [
            "(&(objectClass=person)(!(uid=a\\2ab)))",
            "(|(cn=a*b*c)(cn=*x)(sn>=m)(sn<=n)(cn~=q))",
            "(mail=*)",
        ] {
            assert_eq!(SearchFilter::parse(s).unwrap().to_string(), s);
        }
    }

    #[test]
    fn test_parse_errors() {
        for s in ["(cn=a", "(cn)", "(=a)", "(cn=a))", "(&(cn=a)", "(cn=\\4)", "(cn=\\zz)", "((cn=a))"] {
            let err = SearchFilter::parse(s).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Parse, "{s}");
        }
    }
}
