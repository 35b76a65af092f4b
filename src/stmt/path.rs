use std::fmt;

/// A dotted path addressing a field, possibly descending into nested json
/// structure (`profile.age`) or across a join scope.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a dotted string into a path.
    pub fn from_dotted(s: &str) -> Self {
        if s.is_empty() {
            return Self::new();
        }

        Self {
            segments: s.split('.').map(str::to_string).collect(),
        }
    }

    pub fn push(&mut self, segment: impl Into<String>) {
        self.segments.push(segment.into());
    }

    pub fn concat(&self, other: &Path) -> Path {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Path { segments }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn first(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Path with the first segment removed.
    pub fn rest(&self) -> Path {
        Path {
            segments: self.segments.iter().skip(1).cloned().collect(),
        }
    }

    /// Path with the first `n` segments removed.
    pub fn skip(&self, n: usize) -> Path {
        Path {
            segments: self.segments.iter().skip(n).cloned().collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(String::as_str)
    }

    /// The dotted rendering of the path.
    pub fn dotted(&self) -> String {
        self.segments.join(".")
    }
}

impl From<&str> for Path {
    fn from(value: &str) -> Self {
        Self::from_dotted(value)
    }
}

impl From<String> for Path {
    fn from(value: String) -> Self {
        Self::from_dotted(&value)
    }
}

impl From<&Self> for Path {
    fn from(value: &Self) -> Self {
        value.clone()
    }
}

impl FromIterator<String> for Path {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Self {
            segments: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dotted())
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({})", self.dotted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_dotted_round_trips() {
        let path = Path::from_dotted("profile.age");
        assert_eq!(path.len(), 2);
        assert_eq!(path.dotted(), "profile.age");
        assert_eq!(path.first(), Some("profile"));
        assert_eq!(path.rest().dotted(), "age");
    }

    #[test]
    fn empty_path() {
        let path = Path::from_dotted("");
        assert!(path.is_empty());
        assert_eq!(path.dotted(), "");
    }
}
