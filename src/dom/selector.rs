//! Selector - The small subset of CSS selectors the document understands.
//!
//! Supported: `*`, `tag`, `#id`, `.class`, compounds like `div#main.wide`,
//! and comma-separated lists. No combinators or attribute selectors.

/// One compound selector.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Compound {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
}

/// Parsed selector list. Matches when any compound matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    compounds: Vec<Compound>,
}

impl Selector {
    /// Parse `source`. `None` for empty or unsupported syntax.
    pub fn parse(source: &str) -> Option<Self> {
        let compounds = source
            .split(',')
            .map(|part| parse_compound(part.trim()))
            .collect::<Option<Vec<_>>>()?;
        Some(Self { compounds })
    }

    pub fn matches(&self, tag: &str, id: Option<&str>, class_attr: Option<&str>) -> bool {
        self.compounds
            .iter()
            .any(|compound| compound_matches(compound, tag, id, class_attr))
    }
}

fn parse_compound(source: &str) -> Option<Compound> {
    if source.is_empty() {
        return None;
    }

    let mut compound = Compound::default();
    let mut rest = source;

    // Leading tag name or universal selector.
    let tag_end = rest.find(['#', '.']).unwrap_or(rest.len());
    let (tag, tail) = rest.split_at(tag_end);
    match tag {
        "" | "*" => {}
        name if is_ident(name) => compound.tag = Some(name.to_ascii_lowercase()),
        _ => return None,
    }
    rest = tail;

    while let Some(marker) = rest.chars().next() {
        let body = &rest[1..];
        let end = body.find(['#', '.']).unwrap_or(body.len());
        let (name, tail) = body.split_at(end);
        if !is_ident(name) {
            return None;
        }
        match marker {
            '#' => compound.id = Some(name.to_string()),
            '.' => compound.classes.push(name.to_string()),
            _ => return None,
        }
        rest = tail;
    }

    Some(compound)
}

fn is_ident(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn compound_matches(
    compound: &Compound,
    tag: &str,
    id: Option<&str>,
    class_attr: Option<&str>,
) -> bool {
    if let Some(expected) = &compound.tag {
        if expected != tag {
            return false;
        }
    }
    if let Some(expected) = &compound.id {
        if id != Some(expected.as_str()) {
            return false;
        }
    }
    compound.classes.iter().all(|class| {
        class_attr
            .map(|attr| attr.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    })
}
