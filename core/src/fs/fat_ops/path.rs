// Writer path grammar: `s:/dir/'quoted'/name`

use crate::fs::FatError;

/// A parsed volume path: components from the root, quoting removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskPath {
    components: Vec<String>,
}

impl DiskPath {
    /// Parse an optional `X:` drive prefix, `/` or `\` separators, and
    /// `'...'` quoting in which `\` escapes the next character.
    pub fn parse(path: &str) -> Result<Self, FatError> {
        let bytes = path.as_bytes();
        let rest = if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
            &path[2..]
        } else {
            path
        };

        let mut components = Vec::new();
        let mut current = String::new();
        let mut quoted = false;
        let mut chars = rest.chars();

        while let Some(c) = chars.next() {
            match c {
                '\'' => quoted = !quoted,
                '\\' if quoted => match chars.next() {
                    Some(escaped) => current.push(escaped),
                    None => return Err(FatError::InvalidPath(path.to_string())),
                },
                '/' | '\\' if !quoted => {
                    if !current.is_empty() {
                        components.push(core::mem::take(&mut current));
                    }
                }
                _ => current.push(c),
            }
        }
        if quoted {
            return Err(FatError::InvalidPath(path.to_string()));
        }
        if !current.is_empty() {
            components.push(current);
        }

        Ok(Self { components })
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Parent components and the final name; `None` for the root itself.
    pub fn split_last(&self) -> Option<(&[String], &str)> {
        self.components
            .split_last()
            .map(|(name, parents)| (parents, name.as_str()))
    }
}
