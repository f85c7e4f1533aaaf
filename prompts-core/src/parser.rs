//! # Template Lexing
//!
//! nom parsers for the pieces of template syntax the renderer understands:
//!
//! - `{{#each name}}...{{/each}}` iteration blocks
//! - `{{#if name}}...{{/if}}` conditional blocks
//! - `{{name}}` placeholders
//!
//! Block bodies end at the first matching close tag, so blocks do not nest.
//! Anything that fails to parse is plain text; there is no syntax error.

use nom::IResult;
use nom::Parser;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_till, take_till1, take_until, take_while1};
use nom::character::complete::satisfy;
use nom::combinator::{map, recognize};
use nom::sequence::{delimited, preceded};

/// A block marker and the raw text between its open and close tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block<'a> {
    pub name: &'a str,
    pub body: &'a str,
}

/// A name referenced by a template, as found by a lexical scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference<'a> {
    Placeholder(&'a str),
    Condition(&'a str),
    Collection(&'a str),
}

impl<'a> Reference<'a> {
    pub fn name(&self) -> &'a str {
        match self {
            Reference::Placeholder(name)
            | Reference::Condition(name)
            | Reference::Collection(name) => name,
        }
    }
}

fn word(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_').parse(input)
}

fn whitespace(input: &str) -> IResult<&str, &str> {
    take_while1(char::is_whitespace).parse(input)
}

fn block_open<'a>(keyword: &'static str, input: &'a str) -> IResult<&'a str, &'a str> {
    delimited((tag("{{#"), tag(keyword), whitespace), word, tag("}}")).parse(input)
}

fn block<'a>(keyword: &'static str, close: &'static str, input: &'a str) -> IResult<&'a str, Block<'a>> {
    let (input, name) = block_open(keyword, input)?;
    let (input, body) = take_until(close).parse(input)?;
    let (input, _) = tag(close).parse(input)?;
    Ok((input, Block { name, body }))
}

pub fn parse_each_block(input: &str) -> IResult<&str, Block<'_>> {
    block("each", "{{/each}}", input)
}

pub fn parse_if_block(input: &str) -> IResult<&str, Block<'_>> {
    block("if", "{{/if}}", input)
}

/// `{{name}}` where the name does not start with `#` or `/` and holds no `}`.
/// The returned name is untrimmed.
pub fn parse_placeholder(input: &str) -> IResult<&str, &str> {
    delimited(
        tag("{{"),
        recognize((satisfy(|c: char| c != '#' && c != '/'), take_till(|c: char| c == '}'))),
        tag("}}"),
    )
    .parse(input)
}

fn block_reference<'a>(keyword: &'static str, input: &'a str) -> IResult<&'a str, &'a str> {
    delimited(
        preceded((tag("{{#"), tag(keyword)), whitespace),
        take_till1(|c: char| c == '}'),
        tag("}}"),
    )
    .parse(input)
}

fn each_reference(input: &str) -> IResult<&str, &str> {
    block_reference("each", input)
}

fn if_reference(input: &str) -> IResult<&str, &str> {
    block_reference("if", input)
}

/// Recognises any reference at the start of `input`.
pub fn parse_reference(input: &str) -> IResult<&str, Reference<'_>> {
    alt((
        map(each_reference, Reference::Collection),
        map(if_reference, Reference::Condition),
        map(parse_placeholder, Reference::Placeholder),
    ))
    .parse(input)
}

/// Scans `input` left to right, replacing every non-overlapping match of
/// `parser` that begins at a `{{` with the output of `replace`.
///
/// With `escapable` set, a `{{` directly preceded by a backslash never starts
/// a match.
pub fn rewrite<'a, T>(
    input: &'a str,
    escapable: bool,
    mut parser: impl FnMut(&'a str) -> IResult<&'a str, T>,
    mut replace: impl FnMut(T, &'a str) -> String,
) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find("{{") {
        output.push_str(&rest[..pos]);
        let candidate = &rest[pos..];
        let offset = input.len() - candidate.len();
        let escaped = escapable && input[..offset].ends_with('\\');

        match parser(candidate) {
            Ok((remaining, value)) if !escaped => {
                let matched = &candidate[..candidate.len() - remaining.len()];
                output.push_str(&replace(value, matched));
                rest = remaining;
            }
            _ => {
                output.push('{');
                rest = &candidate[1..];
            }
        }
    }

    output.push_str(rest);
    output
}

/// Collects every reference in `input`, in order of appearance.
pub fn scan_references(input: &str) -> Vec<Reference<'_>> {
    let mut references = Vec::new();
    let mut rest = input;

    while let Some(pos) = rest.find("{{") {
        let candidate = &rest[pos..];
        match parse_reference(candidate) {
            Ok((remaining, reference)) => {
                references.push(reference);
                rest = remaining;
            }
            Err(_) => rest = &candidate[1..],
        }
    }

    references
}
