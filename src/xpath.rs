use nom::branch::alt;
use nom::bytes::complete::take_while1;
use nom::character::complete::{char, digit1};
use nom::combinator::{all_consuming, map, map_res, opt};
use nom::multi::many1;
use nom::sequence::{delimited, pair, preceded};
use nom::IResult;

use crate::error::{ApkError, ApkResult};
use crate::manifest::XmlElement;
use crate::resources::ResourceMap;

/// Element name filter within a location step.
#[derive(Clone, Debug, PartialEq, Eq)]
enum NameTest {
    Any,
    Named(String),
}

impl NameTest {
    fn matches(&self, tag: &str) -> bool {
        match self {
            NameTest::Any => true,
            NameTest::Named(name) => name == tag,
        }
    }
}

/// One `/`-separated step of a location path.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Step {
    /// `@name`, allowed only as the final step.
    Attribute(String),
    /// `*` or `name`, with an optional 1-based `[n]` position predicate.
    Element { name: NameTest, index: Option<usize> },
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'
}

fn parse_name(input: &str) -> IResult<&str, String> {
    map(take_while1(is_name_char), str::to_string)(input)
}

fn parse_index(input: &str) -> IResult<&str, usize> {
    delimited(char('['), map_res(digit1, str::parse::<usize>), char(']'))(input)
}

fn parse_step(input: &str) -> IResult<&str, Step> {
    alt((
        map(preceded(char('@'), parse_name), Step::Attribute),
        map(
            pair(
                alt((
                    map(char('*'), |_| NameTest::Any),
                    map(parse_name, NameTest::Named),
                )),
                opt(parse_index),
            ),
            |(name, index)| Step::Element { name, index },
        ),
    ))(input)
}

fn parse_steps(input: &str) -> IResult<&str, Vec<Step>> {
    all_consuming(many1(preceded(char('/'), parse_step)))(input)
}

fn parse_path(expr: &str) -> ApkResult<Vec<Step>> {
    let (_, steps) = parse_steps(expr)
        .map_err(|_| ApkError::Malformed(format!("Invalid XPath expression: {expr}")))?;
    for (position, step) in steps.iter().enumerate() {
        match step {
            Step::Attribute(_) if position != steps.len() - 1 => {
                return Err(ApkError::Malformed(format!(
                    "Invalid XPath expression: attribute step must be last: {expr}"
                )));
            }
            Step::Element { index: Some(0), .. } => {
                return Err(ApkError::Malformed(format!(
                    "Invalid XPath expression: position predicates are 1-based: {expr}"
                )));
            }
            _ => {}
        }
    }
    Ok(steps)
}

/// Evaluates a restricted XPath expression against a manifest tree and
/// returns the matched values with resource references resolved.
///
/// Supported syntax is absolute paths of element steps (`name`, `*`, an
/// optional 1-based `[n]` predicate scoped to each parent) with an optional
/// trailing attribute step (`@name`). The first element step is matched
/// against `document` itself. Raw values that start with `@` are looked up
/// in `resources`; with `all` set every recorded value of the resource is
/// returned and unknown references are dropped, otherwise the first value is
/// taken and unknown references fall back to the raw text.
pub fn select_all(
    document: &XmlElement,
    expr: &str,
    resources: &ResourceMap,
    all: bool,
) -> ApkResult<Vec<String>> {
    let steps = parse_path(expr)?;
    let (attribute, element_steps) = match steps.split_last() {
        Some((Step::Attribute(name), rest)) => (Some(name.as_str()), rest),
        _ => (None, &steps[..]),
    };

    let mut matches: Vec<&XmlElement> = Vec::new();
    for (depth, step) in element_steps.iter().enumerate() {
        let (name, index) = match step {
            Step::Element { name, index } => (name, index),
            // parse_path already rejected non-final attribute steps
            Step::Attribute(_) => break,
        };
        if depth == 0 {
            // The leading step addresses the document root element itself.
            if name.matches(&document.tag) && index.unwrap_or(1) == 1 {
                matches.push(document);
            } else {
                matches.clear();
            }
            continue;
        }
        let mut next = Vec::new();
        for parent in &matches {
            let mut candidates = parent
                .children
                .iter()
                .filter(|child| name.matches(&child.tag));
            match index {
                Some(n) => {
                    if let Some(child) = candidates.nth(n - 1) {
                        next.push(child);
                    }
                }
                None => next.extend(candidates),
            }
        }
        matches = next;
    }

    let mut out = Vec::new();
    for element in matches {
        match attribute {
            Some(name) => {
                if let Some(value) = element.attribute(name) {
                    dereference(value, resources, all, &mut out);
                }
            }
            None => dereference(&element.text_content(), resources, all, &mut out),
        }
    }
    Ok(out)
}

/// Like [`select_all`] with `all` unset, returning the first match or an
/// empty string when nothing matched.
pub fn select_first(
    document: &XmlElement,
    expr: &str,
    resources: &ResourceMap,
) -> ApkResult<String> {
    let mut values = select_all(document, expr, resources, false)?;
    if values.is_empty() {
        Ok(String::new())
    } else {
        Ok(values.remove(0))
    }
}

fn dereference(raw: &str, resources: &ResourceMap, all: bool, out: &mut Vec<String>) {
    if !raw.starts_with('@') {
        out.push(raw.to_string());
        return;
    }
    match resources.get(raw) {
        Some(values) if all => out.extend(values.iter().cloned()),
        Some(values) => match values.first() {
            Some(value) => out.push(value.clone()),
            None => out.push(raw.to_string()),
        },
        None if all => {}
        None => out.push(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> XmlElement {
        let mut root = XmlElement::new("root");
        let mut child = XmlElement::new("child");
        child.set_attribute("attribute", "va");
        child.append_child(XmlElement::with_text("sub-child", "v1"));
        child.append_child(XmlElement::with_text("sub-child", "v2"));
        root.append_child(child);
        root.append_child(XmlElement::with_text("referencing", "@1"));
        root.append_child(XmlElement::with_text("missing", "@FFFF"));
        root
    }

    fn sample_resources() -> ResourceMap {
        let mut map = ResourceMap::new();
        map.insert("@1".to_string(), vec!["p".to_string(), "p2".to_string()]);
        map
    }

    #[test]
    fn selects_element_value() {
        let doc = sample_document();
        let value =
            select_first(&doc, "/root/child[1]/sub-child[1]", &ResourceMap::new()).unwrap();
        assert_eq!(value, "v1");
    }

    #[test]
    fn selects_all_child_values() {
        let doc = sample_document();
        let values =
            select_all(&doc, "/root/child[1]/sub-child", &ResourceMap::new(), false).unwrap();
        assert_eq!(values, vec!["v1".to_string(), "v2".to_string()]);
    }

    #[test]
    fn selects_attribute_value() {
        let doc = sample_document();
        let value =
            select_first(&doc, "/*/child[1]/@attribute", &ResourceMap::new()).unwrap();
        assert_eq!(value, "va");
    }

    #[test]
    fn resolves_reference_to_first_value() {
        let doc = sample_document();
        let value = select_first(&doc, "/root/referencing[1]", &sample_resources()).unwrap();
        assert_eq!(value, "p");
    }

    #[test]
    fn resolves_reference_to_all_values() {
        let doc = sample_document();
        let values = select_all(&doc, "/root/referencing[1]", &sample_resources(), true).unwrap();
        assert_eq!(values, vec!["p".to_string(), "p2".to_string()]);
    }

    #[test]
    fn unknown_reference_falls_back_to_literal() {
        let doc = sample_document();
        let value = select_first(&doc, "/root/missing[1]", &sample_resources()).unwrap();
        assert_eq!(value, "@FFFF");
    }

    #[test]
    fn unknown_reference_is_skipped_when_collecting_all() {
        let doc = sample_document();
        let values = select_all(&doc, "/root/missing[1]", &sample_resources(), true).unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn no_match_yields_empty_string() {
        let doc = sample_document();
        let value = select_first(&doc, "/root/absent[1]", &ResourceMap::new()).unwrap();
        assert_eq!(value, "");
    }

    #[test]
    fn attribute_step_must_be_last() {
        let doc = sample_document();
        let err = select_all(&doc, "/root/@attr/child", &ResourceMap::new(), false).unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Invalid XPath expression: attribute step must be last"));
    }

    #[test]
    fn zero_index_is_rejected() {
        let doc = sample_document();
        let err = select_all(&doc, "/root/child[0]", &ResourceMap::new(), false).unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Invalid XPath expression: position predicates are 1-based"));
    }
}
