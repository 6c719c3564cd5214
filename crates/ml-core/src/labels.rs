//! Class-id to label lookup loaded from a plain-text label file.
//!
//! Two line shapes are accepted and may be mixed:
//! `"<id> <label>"` / `"<id>: <label>"`, or a bare label whose id is its
//! zero-based line number.

use std::{collections::BTreeMap, fs, path::Path};

use anyhow::{Context, Result};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelTable {
    labels: BTreeMap<i64, String>,
}

impl LabelTable {
    /// Read and parse a label file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read label file {}", path.display()))?;
        Ok(Self::parse(&contents))
    }

    pub fn parse(contents: &str) -> Self {
        let mut labels = BTreeMap::new();
        for (row, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match split_id(line) {
                Some((id, label)) => labels.insert(id, label.to_string()),
                None => labels.insert(row as i64, line.to_string()),
            };
        }
        Self { labels }
    }

    pub fn get(&self, class_id: i64) -> Option<&str> {
        self.labels.get(&class_id).map(String::as_str)
    }

    /// Label for `class_id`, or `class <id>` when the table has no entry.
    pub fn label_or_id(&self, class_id: i64) -> String {
        self.get(class_id)
            .map(str::to_string)
            .unwrap_or_else(|| format!("class {class_id}"))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

fn split_id(line: &str) -> Option<(i64, &str)> {
    let (head, rest) = line.split_once(|c: char| c == ':' || c.is_whitespace())?;
    if head.is_empty() || !head.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let label = rest.trim_start_matches(|c: char| c == ':' || c.is_whitespace());
    if label.is_empty() {
        return None;
    }
    Some((head.parse().ok()?, label.trim_end()))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn parses_numbered_lines() {
        let table = LabelTable::parse("0 person\n1: bicycle\n  2   car  \n");
        assert_eq!(table.get(0), Some("person"));
        assert_eq!(table.get(1), Some("bicycle"));
        assert_eq!(table.get(2), Some("car"));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn bare_lines_use_row_number() {
        let table = LabelTable::parse("person\nbicycle\n\ntraffic light\n");
        assert_eq!(table.get(0), Some("person"));
        assert_eq!(table.get(1), Some("bicycle"));
        assert_eq!(table.get(3), Some("traffic light"));
        assert_eq!(table.get(2), None);
    }

    #[test]
    fn sparse_ids_are_kept() {
        let table = LabelTable::parse("0  person\n87  teddy bear\n");
        assert_eq!(table.get(87), Some("teddy bear"));
        assert_eq!(table.label_or_id(5), "class 5");
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0 person").unwrap();
        let table = LabelTable::from_path(file.path()).unwrap();
        assert_eq!(table.get(0), Some("person"));
        assert!(LabelTable::from_path("/nonexistent/labels.txt").is_err());
    }
}
