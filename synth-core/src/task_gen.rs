//! Tolerant parser turning a task generator's free-form text into a
//! [`Task`]: a `Category:` line, a description, and a `Test cases:`
//! section whose lines name literal input/expected pairs for `solve`.
//!
//! The generator's prompt engineering lives outside this crate; this
//! module only has to survive whatever shape of text comes back. Supports
//! the closed literal grammar: strings (single or double quoted), signed
//! integers, floats, booleans, `None`, lists, tuples, and string-keyed
//! dicts.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::types::{Category, Task, TestCase, Value};

static TEST_CASE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*-?\s*solve\((.*)\)\s*(?:->|==|is|returns)\s*(.+?)\s*$").unwrap());
static CATEGORY_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*Category:\s*(.+?)\s*$").unwrap());

const CATEGORY_TAGS: &[(&str, Category)] = &[
    ("string-manipulation", Category::StringManipulation),
    ("string_manipulation", Category::StringManipulation),
    ("math", Category::Math),
    ("list-ops", Category::ListOps),
    ("list_ops", Category::ListOps),
    ("dict-ops", Category::DictOps),
    ("dict_ops", Category::DictOps),
    ("validation", Category::Validation),
    ("parsing", Category::Parsing),
    ("code-pattern", Category::CodePattern),
    ("code-error", Category::CodeError),
    ("code-logic", Category::CodeLogic),
    ("tool-error", Category::ToolError),
    ("general", Category::General),
];

/// Best-effort parse of a `Category: <TAG>` line into the closed category
/// set. Returns `None` if no line matches or the tag is unrecognized.
#[must_use]
pub fn parse_declared_category(text: &str) -> Option<Category> {
    let tag = CATEGORY_LINE.captures(text)?[1].to_lowercase();
    CATEGORY_TAGS.iter().find(|(name, _)| *name == tag).map(|(_, category)| *category)
}

/// Parse every `- solve(<literal>) -> <literal>` style line (also
/// accepting `==`, `is`, `returns`) into an ordered list of test cases,
/// capped at `max_cases`. Lines whose literal cannot be parsed are skipped
/// rather than aborting the whole task.
#[must_use]
pub fn parse_test_cases(text: &str, max_cases: usize) -> Vec<TestCase> {
    let mut cases = Vec::new();
    for cap in TEST_CASE_LINE.captures_iter(text) {
        if cases.len() >= max_cases {
            break;
        }
        let Some(input) = parse_literal(cap[1].trim()) else { continue };
        let Some(expected) = parse_literal(cap[2].trim()) else { continue };
        cases.push(TestCase { input, expected });
    }
    cases
}

/// Build a [`Task`] from raw generator text: the description is the text
/// with the `Category:` line and everything from `Test cases:` onward
/// stripped; test cases are parsed per [`parse_test_cases`].
#[must_use]
pub fn parse_generated_task(text: &str, max_cases: usize) -> Task {
    let description = text
        .lines()
        .take_while(|line| !line.trim_start().to_lowercase().starts_with("test cases:"))
        .filter(|line| !CATEGORY_LINE.is_match(line))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();

    Task::new(description, parse_test_cases(text, max_cases))
}

struct LiteralParser<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    src: &'a str,
}

impl<'a> LiteralParser<'a> {
    fn new(src: &'a str) -> Self {
        Self { chars: src.char_indices().peekable(), src }
    }

    fn skip_ws(&mut self) {
        while matches!(self.chars.peek(), Some((_, c)) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn parse_value(&mut self) -> Option<Value> {
        self.skip_ws();
        match self.peek_char()? {
            '\'' | '"' => self.parse_string(),
            '[' => self.parse_sequence('[', ']', false),
            '(' => self.parse_sequence('(', ')', true),
            '{' => self.parse_dict(),
            _ => self.parse_scalar(),
        }
    }

    fn parse_string(&mut self) -> Option<Value> {
        let (_, quote) = self.chars.next()?;
        let start = self.chars.peek().map_or(self.src.len(), |&(i, _)| i);
        let mut end = start;
        loop {
            let (i, c) = self.chars.next()?;
            if c == '\\' {
                self.chars.next();
                end = self.chars.peek().map_or(self.src.len(), |&(j, _)| j);
                continue;
            }
            if c == quote {
                end = i;
                break;
            }
        }
        let raw = &self.src[start..end];
        Some(Value::Str(unescape(raw)))
    }

    fn parse_sequence(&mut self, open: char, close: char, as_tuple: bool) -> Option<Value> {
        let (_, c) = self.chars.next()?;
        debug_assert_eq!(c, open);
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek_char() == Some(close) {
                self.chars.next();
                break;
            }
            items.push(self.parse_value()?);
            self.skip_ws();
            match self.peek_char() {
                Some(',') => {
                    self.chars.next();
                }
                Some(c) if c == close => {
                    self.chars.next();
                    break;
                }
                _ => return None,
            }
        }
        Some(if as_tuple { Value::Tuple(items) } else { Value::List(items) })
    }

    fn parse_dict(&mut self) -> Option<Value> {
        self.chars.next();
        let mut map = BTreeMap::new();
        loop {
            self.skip_ws();
            if self.peek_char() == Some('}') {
                self.chars.next();
                break;
            }
            let Value::Str(key) = self.parse_string()? else { return None };
            self.skip_ws();
            if self.peek_char() != Some(':') {
                return None;
            }
            self.chars.next();
            let value = self.parse_value()?;
            map.insert(key, value);
            self.skip_ws();
            match self.peek_char() {
                Some(',') => {
                    self.chars.next();
                }
                Some('}') => {
                    self.chars.next();
                    break;
                }
                _ => return None,
            }
        }
        Some(Value::Dict(map))
    }

    fn parse_scalar(&mut self) -> Option<Value> {
        let start = self.chars.peek()?.0;
        let mut end = start;
        while let Some(&(i, c)) = self.chars.peek() {
            if c.is_whitespace() || c == ',' || c == ']' || c == ')' || c == '}' {
                break;
            }
            end = i + c.len_utf8();
            self.chars.next();
        }
        let token = &self.src[start..end];
        parse_scalar_token(token)
    }
}

fn parse_scalar_token(token: &str) -> Option<Value> {
    match token {
        "None" => return Some(Value::Null),
        "True" => return Some(Value::Bool(true)),
        "False" => return Some(Value::Bool(false)),
        _ => {}
    }
    if let Ok(i) = token.parse::<i64>() {
        return Some(Value::Int(i));
    }
    if let Ok(f) = token.parse::<f64>() {
        return Some(Value::Float(f));
    }
    None
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Parse one literal (string, signed int, float, bool, `None`, list,
/// tuple, or dict) from `text`, ignoring any trailing garbage.
#[must_use]
pub fn parse_literal(text: &str) -> Option<Value> {
    LiteralParser::new(text.trim()).parse_value()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_strings_both_styles() {
        assert_eq!(parse_literal("'racecar'"), Some(Value::Str("racecar".to_string())));
        assert_eq!(parse_literal("\"hello\""), Some(Value::Str("hello".to_string())));
    }

    #[test]
    fn parses_signed_integer_and_float() {
        assert_eq!(parse_literal("-42"), Some(Value::Int(-42)));
        assert_eq!(parse_literal("3.5"), Some(Value::Float(3.5)));
    }

    #[test]
    fn parses_bool_and_none() {
        assert_eq!(parse_literal("True"), Some(Value::Bool(true)));
        assert_eq!(parse_literal("None"), Some(Value::Null));
    }

    #[test]
    fn parses_list_tuple_and_dict() {
        assert_eq!(parse_literal("[1, 2, 3]"), Some(Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)])));
        assert_eq!(parse_literal("(1, 2)"), Some(Value::Tuple(vec![Value::Int(1), Value::Int(2)])));
        let dict = parse_literal("{'a': 1, 'b': 2}").unwrap();
        assert_eq!(dict, Value::Dict(BTreeMap::from([("a".to_string(), Value::Int(1)), ("b".to_string(), Value::Int(2))])));
    }

    #[test]
    fn parses_test_case_lines_with_all_four_operators() {
        let text = "Test cases:\n- solve('racecar') -> True\n- solve('hello') == False\n- solve(1) is 1\n- solve([1,2]) returns [1,2]\n";
        let cases = parse_test_cases(text, 8);
        assert_eq!(cases.len(), 4);
        assert_eq!(cases[0].input, Value::Str("racecar".to_string()));
        assert_eq!(cases[0].expected, Value::Bool(true));
    }

    #[test]
    fn caps_at_max_cases() {
        let mut text = String::from("Test cases:\n");
        for i in 0..20 {
            text.push_str(&format!("- solve({i}) -> {i}\n"));
        }
        assert_eq!(parse_test_cases(&text, 8).len(), 8);
    }

    #[test]
    fn declared_category_is_recognized_case_insensitively() {
        assert_eq!(parse_declared_category("Category: String-Manipulation\n"), Some(Category::StringManipulation));
    }

    #[test]
    fn description_excludes_category_line_and_test_cases_section() {
        let text = "Category: math\nImplement solve(input) that doubles a number.\n\nTest cases:\n- solve(2) -> 4\n";
        let task = parse_generated_task(text, 8);
        assert!(!task.description.to_lowercase().contains("category"));
        assert!(!task.description.to_lowercase().contains("test cases"));
        assert_eq!(task.test_cases.len(), 1);
    }
}
