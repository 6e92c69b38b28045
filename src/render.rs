//! Preprocessor round-trip used by the scope engine.
//!
//! The scope engine wraps a whole stylesheet in `.scope { ... }` and needs a
//! renderer that expands that nesting into flat CSS. Two are provided:
//!
//! - [`NestingRenderer`] flattens nested rules in-process. Rule bodies,
//!   selectors and whitespace are copied verbatim, so wrapping and unwrapping
//!   a stylesheet gives back the same bytes.
//! - [`LesscRenderer`] pipes the source through an external `lessc`.

use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;

/// A source the renderer could not process.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (line {line})")]
pub struct RenderError {
    pub message: String,
    pub line: usize,
}

impl RenderError {
    fn at(source: &str, offset: usize, message: impl Into<String>) -> Self {
        let line = source.get(..offset).unwrap_or(source).matches('\n').count() + 1;
        Self {
            message: message.into(),
            line,
        }
    }
}

/// Expands CSS-like source with nested rules into flat CSS.
pub trait Render: Sync {
    fn render(&self, source: &str) -> Result<String, RenderError>;
}

/// Built-in renderer resolving nested rules and `&` parent references.
#[derive(Debug, Default, Clone, Copy)]
pub struct NestingRenderer;

impl Render for NestingRenderer {
    fn render(&self, source: &str) -> Result<String, RenderError> {
        let (nodes, tail) = Parser::new(source).parse_list(false)?;
        let mut out = String::with_capacity(source.len() + source.len() / 4);
        emit_list(&nodes, None, &mut out);
        out.push_str(&tail);
        Ok(out)
    }
}

/// Renders through an external less compiler reading from stdin.
#[derive(Debug, Clone)]
pub struct LesscRenderer {
    program: String,
}

impl LesscRenderer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Render for LesscRenderer {
    fn render(&self, source: &str) -> Result<String, RenderError> {
        let failed = |message: String| RenderError { message, line: 0 };

        let mut child = Command::new(&self.program)
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| failed(format!("could not start {}: {}", self.program, err)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| failed(format!("no stdin for {}", self.program)))?;

        // Feed stdin from a second thread so a full stdout pipe cannot stall us.
        let (fed, output) = thread::scope(|scope| {
            let feeder = scope.spawn(move || stdin.write_all(source.as_bytes()));
            let output = child.wait_with_output();
            let fed = feeder
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked")));
            (fed, output)
        });

        let output = output.map_err(|err| failed(format!("{} failed: {}", self.program, err)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = match stderr.trim() {
                "" => format!("{} exited with {}", self.program, output.status),
                stderr => stderr.to_string(),
            };
            return Err(failed(message));
        }
        fed.map_err(|err| failed(format!("could not write to {}: {}", self.program, err)))?;

        String::from_utf8(output.stdout)
            .map_err(|_| failed(format!("{} produced invalid UTF-8", self.program)))
    }
}

/// Lossless syntax tree. `lead` is the whitespace before a node, `tail` the
/// whitespace before a closing brace.
#[derive(Debug)]
enum Node<'a> {
    Comment {
        lead: &'a str,
        text: &'a str,
    },
    /// Declaration or `@statement;`, including the `;` when present.
    Statement {
        lead: &'a str,
        text: &'a str,
    },
    Block {
        lead: &'a str,
        prelude: &'a str,
        body: Vec<Node<'a>>,
        tail: &'a str,
    },
}

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek(0).is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn skip_comment(&mut self) -> Result<(), RenderError> {
        let start = self.pos;
        match self.src[self.pos + 2..].find("*/") {
            Some(end) => {
                self.pos += 2 + end + 2;
                Ok(())
            }
            None => Err(RenderError::at(self.src, start, "unterminated comment")),
        }
    }

    fn skip_string(&mut self) -> Result<(), RenderError> {
        let start = self.pos;
        let quote = self.bytes[self.pos];
        self.pos += 1;
        while let Some(b) = self.peek(0) {
            match b {
                b'\\' => self.pos += 2,
                b'\n' => break,
                _ if b == quote => {
                    self.pos += 1;
                    return Ok(());
                }
                _ => self.pos += 1,
            }
        }
        Err(RenderError::at(self.src, start, "unterminated string"))
    }

    /// Parse nodes until the end of input (top level) or a closing brace.
    fn parse_list(&mut self, nested: bool) -> Result<(Vec<Node<'a>>, &'a str), RenderError> {
        let mut nodes = Vec::new();

        loop {
            let lead_start = self.pos;
            self.skip_whitespace();
            let lead = &self.src[lead_start..self.pos];

            match self.peek(0) {
                None if nested => {
                    return Err(RenderError::at(self.src, self.pos, "missing closing '}'"));
                }
                None => return Ok((nodes, lead)),
                Some(b'}') if nested => {
                    self.pos += 1;
                    return Ok((nodes, lead));
                }
                Some(b'}') => {
                    return Err(RenderError::at(self.src, self.pos, "unexpected '}'"));
                }
                Some(b'/') if self.peek(1) == Some(b'*') => {
                    let start = self.pos;
                    self.skip_comment()?;
                    nodes.push(Node::Comment {
                        lead,
                        text: &self.src[start..self.pos],
                    });
                }
                Some(_) => nodes.push(self.parse_item(lead)?),
            }
        }
    }

    fn parse_item(&mut self, lead: &'a str) -> Result<Node<'a>, RenderError> {
        let start = self.pos;
        let mut parens = 0usize;

        while let Some(b) = self.peek(0) {
            match b {
                b'"' | b'\'' => self.skip_string()?,
                b'/' if self.peek(1) == Some(b'*') => self.skip_comment()?,
                b'(' | b'[' => {
                    parens += 1;
                    self.pos += 1;
                }
                b')' | b']' => {
                    parens = parens.saturating_sub(1);
                    self.pos += 1;
                }
                b';' if parens == 0 => {
                    self.pos += 1;
                    return Ok(Node::Statement {
                        lead,
                        text: &self.src[start..self.pos],
                    });
                }
                b'{' if parens == 0 => {
                    let prelude = &self.src[start..self.pos];
                    self.pos += 1;
                    let (body, tail) = self.parse_list(true)?;
                    return Ok(Node::Block {
                        lead,
                        prelude,
                        body,
                        tail,
                    });
                }
                b'}' if parens == 0 => break,
                _ => self.pos += 1,
            }
        }

        // Last declaration of a block without a trailing ';', or stray text at
        // the end of input.
        Ok(Node::Statement {
            lead,
            text: &self.src[start..self.pos],
        })
    }
}

/// At-rules whose children are rules that inherit the enclosing selector.
const CONDITIONAL_AT_RULES: &[&str] = &[
    "media",
    "supports",
    "container",
    "layer",
    "document",
    "-moz-document",
    "scope",
    "starting-style",
];

fn at_rule_name(prelude: &str) -> Option<String> {
    let rest = prelude.trim_start().strip_prefix('@')?;
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '(' || c == '{')
        .unwrap_or(rest.len());
    Some(rest[..end].to_ascii_lowercase())
}

fn is_at_statement(text: &str) -> bool {
    text.trim_start().starts_with('@')
}

fn has_blocks(body: &[Node]) -> bool {
    body.iter().any(|n| matches!(n, Node::Block { .. }))
}

fn write_verbatim(node: &Node, out: &mut String) {
    match node {
        Node::Comment { lead, text } | Node::Statement { lead, text } => {
            out.push_str(lead);
            out.push_str(text);
        }
        Node::Block {
            lead,
            prelude,
            body,
            tail,
        } => {
            out.push_str(lead);
            out.push_str(prelude);
            out.push('{');
            for child in body {
                write_verbatim(child, out);
            }
            out.push_str(tail);
            out.push('}');
        }
    }
}

fn emit_list(nodes: &[Node], parent: Option<&[String]>, out: &mut String) {
    for node in nodes {
        match node {
            Node::Block {
                lead,
                prelude,
                body,
                tail,
            } => emit_block(lead, prelude, body, tail, parent, out),
            _ => write_verbatim(node, out),
        }
    }
}

fn emit_block(
    lead: &str,
    prelude: &str,
    body: &[Node],
    tail: &str,
    parent: Option<&[String]>,
    out: &mut String,
) {
    match at_rule_name(prelude) {
        Some(name) if CONDITIONAL_AT_RULES.contains(&name.as_str()) => {
            out.push_str(lead);
            out.push_str(prelude);
            out.push('{');
            match parent {
                Some(parent) => {
                    let selector = parent.join(", ");
                    emit_children(body, &selector, parent, "", out);
                }
                None => emit_list(body, None, out),
            }
            out.push_str(tail);
            out.push('}');
        }
        // Keyframes, font faces and the like are copied as they are.
        Some(_) => {
            out.push_str(lead);
            out.push_str(prelude);
            out.push('{');
            for child in body {
                write_verbatim(child, out);
            }
            out.push_str(tail);
            out.push('}');
        }
        None => {
            let selector = resolve_selector(prelude, parent);
            if !bubbles(body, parent.is_none()) {
                out.push_str(lead);
                out.push_str(&selector);
                out.push('{');
                for child in body {
                    write_verbatim(child, out);
                }
                out.push_str(tail);
                out.push('}');
                return;
            }

            let parts: Vec<String> = split_selectors(&selector)
                .into_iter()
                .map(|part| part.trim().to_string())
                .collect();
            let own = format!("{}{}", lead, selector);
            if !has_declarations(body) {
                out.push_str(lead);
            }
            if emit_children(body, &own, &parts, tail, out) {
                return;
            }
            out.push_str(tail);
        }
    }
}

fn has_declarations(body: &[Node]) -> bool {
    body.iter().any(
        |n| matches!(n, Node::Statement { text, .. } if !is_at_statement(text) && !text.trim().is_empty()),
    )
}

/// Whether a rule's children must be emitted outside of it: nested blocks and
/// at-statements always are, and so are the comments of a top-level rule
/// holding no declarations.
fn bubbles(body: &[Node], top_level: bool) -> bool {
    has_blocks(body)
        || body
            .iter()
            .any(|n| matches!(n, Node::Statement { text, .. } if is_at_statement(text)))
        || (top_level
            && !has_declarations(body)
            && body.iter().any(|n| matches!(n, Node::Comment { .. })))
}

/// Emit the body of a rule that contains nested blocks.
///
/// Declarations are gathered into one rule on `head`, placed first; the
/// nested blocks follow, resolved against `parent`. Returns whether the
/// declaration rule was written (it then owns `tail`).
fn emit_children(body: &[Node], head: &str, parent: &[String], tail: &str, out: &mut String) -> bool {
    let declarations: Vec<&Node> = body
        .iter()
        .filter(|n| matches!(n, Node::Statement { text, .. } if !is_at_statement(text)))
        .collect();
    let has_declarations = has_declarations(body);

    if has_declarations {
        out.push_str(head);
        out.push('{');
        for node in &declarations {
            write_verbatim(node, out);
        }
        out.push_str(tail);
        out.push('}');
    }

    for node in body {
        match node {
            Node::Block {
                lead,
                prelude,
                body,
                tail,
            } => emit_block(lead, prelude, body, tail, Some(parent), out),
            Node::Statement { text, .. } if !is_at_statement(text) => {}
            _ => write_verbatim(node, out),
        }
    }

    has_declarations
}

/// Combine a nested selector list with its parent selectors.
///
/// Each part keeps its own surrounding whitespace; `&` is replaced by the
/// parent, otherwise the parent is prepended with a descendant combinator.
fn resolve_selector(prelude: &str, parent: Option<&[String]>) -> String {
    let Some(parent) = parent else {
        return prelude.to_string();
    };

    split_selectors(prelude)
        .into_iter()
        .map(|part| {
            let trimmed = part.trim_start();
            let lead = &part[..part.len() - trimmed.len()];
            let combined: Vec<String> = parent
                .iter()
                .map(|p| {
                    substitute_parent(trimmed, p)
                        .unwrap_or_else(|| format!("{} {}", p, trimmed))
                })
                .collect();
            format!("{}{}", lead, combined.join(", "))
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Replace each `&` outside strings and attribute brackets with `parent`.
/// `None` when the selector has no such reference.
fn substitute_parent(selector: &str, parent: &str) -> Option<String> {
    let mut out = String::with_capacity(selector.len() + parent.len());
    let mut found = false;
    let mut brackets = 0usize;
    let mut quote: Option<char> = None;

    for c in selector.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '[' => brackets += 1,
                ']' => brackets = brackets.saturating_sub(1),
                '&' if brackets == 0 => {
                    out.push_str(parent);
                    found = true;
                    continue;
                }
                _ => {}
            },
        }
        out.push(c);
    }

    found.then_some(out)
}

/// Split a selector list on top-level commas.
fn split_selectors(selector: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in selector.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '(' | '[' => depth += 1,
                ')' | ']' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => {
                    parts.push(&selector[start..i]);
                    start = i + 1;
                }
                _ => {}
            },
        }
    }
    parts.push(&selector[start..]);
    parts
}
