use super::{validation_error, Block, BlockKind, Document, Item, Property, Value};
use crate::error_codes::PullError;

/// Parse schema text into a document.
///
/// Only the top-level structure is parsed: blocks and the trivia between
/// them. Datasource and generator bodies are additionally split into
/// properties. Model and enum bodies are kept as raw text.
pub fn parse_document(text: &str, origin: &str) -> Result<Document, PullError> {
    let mut cur = Cursor::new(text, 1);
    let mut doc = Document::default();
    let mut trivia_start = 0;

    loop {
        cur.skip_trivia();
        if cur.at_end() {
            doc.trailing = text[trivia_start..].to_string();
            break;
        }

        let block_start = cur.pos;
        let line = cur.line;
        let keyword = cur.ident();
        let kind = BlockKind::from_keyword(keyword).ok_or_else(|| {
            validation_error(
                "This line is invalid. It does not start with any known Prisma schema keyword.",
                origin,
                line,
            )
        })?;

        cur.skip_inline_ws();
        let name = cur.ident();
        if name.is_empty() {
            return Err(validation_error(
                &format!("Expected a name after `{}`.", kind.keyword()),
                origin,
                cur.line,
            ));
        }

        cur.skip_trivia();
        if !cur.eat('{') {
            return Err(validation_error(
                &format!(
                    "Expected `{{` to open the body of {} `{}`.",
                    kind.keyword(),
                    name
                ),
                origin,
                cur.line,
            ));
        }

        let body_start = cur.pos;
        let body_line = cur.line;
        cur.skip_block_body()
            .map_err(|(msg, at)| validation_error(&msg, origin, at.unwrap_or(line)))?;
        let body = &text[body_start..cur.pos - 1];

        let properties = if kind.is_config() {
            parse_properties(body, body_line)
                .map_err(|(msg, at)| validation_error(&msg, origin, at))?
        } else {
            Vec::new()
        };

        doc.items.push(Item {
            leading: text[trivia_start..block_start].to_string(),
            block: Block {
                kind,
                name: name.to_string(),
                raw: text[block_start..cur.pos].to_string(),
                line,
                properties,
            },
        });
        trivia_start = cur.pos;
    }

    Ok(doc)
}

type ScanError = (String, Option<usize>);

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str, line: usize) -> Self {
        Self { src, pos: 0, line }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.src[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    /// Whitespace (including newlines) and `//` comments.
    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == '/' && self.peek_second() == Some('/') {
                self.skip_line_comment();
            } else {
                break;
            }
        }
    }

    fn skip_inline_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace() && c != '\n') {
            self.bump();
        }
    }

    fn ident(&mut self) -> &'a str {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.bump();
        }
        &self.src[start..self.pos]
    }

    /// Consume a string literal; the opening quote must be next.
    fn string(&mut self) -> Result<String, ScanError> {
        let line = self.line;
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => {
                    return Err(("This string literal is not terminated.".to_string(), Some(line)))
                }
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(c) => out.push(c),
                    None => {
                        return Err((
                            "This string literal is not terminated.".to_string(),
                            Some(line),
                        ))
                    }
                },
                Some(c) => out.push(c),
            }
        }
    }

    /// Advance past the `}` matching an already consumed `{`.
    fn skip_block_body(&mut self) -> Result<(), ScanError> {
        let mut depth = 1usize;
        while let Some(c) = self.peek() {
            match c {
                '"' => {
                    self.string()?;
                }
                '/' if self.peek_second() == Some('/') => self.skip_line_comment(),
                '{' => {
                    depth += 1;
                    self.bump();
                }
                '}' => {
                    self.bump();
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {
                    self.bump();
                }
            }
        }
        Err(("This block is missing its closing brace.".to_string(), None))
    }
}

fn parse_properties(body: &str, first_line: usize) -> Result<Vec<Property>, (String, usize)> {
    let mut cur = Cursor::new(body, first_line);
    let mut props = Vec::new();

    loop {
        cur.skip_trivia();
        if cur.at_end() {
            break;
        }
        let line = cur.line;
        let key = cur.ident();
        if key.is_empty() {
            return Err((
                "Expected a key-value pair such as `provider = \"...\"`.".to_string(),
                line,
            ));
        }
        cur.skip_inline_ws();
        if !cur.eat('=') {
            return Err((
                format!("Expected `=` after property `{}`.", key),
                line,
            ));
        }
        cur.skip_inline_ws();
        let value = parse_value(&mut cur).map_err(|(m, at)| (m, at.unwrap_or(line)))?;
        props.push(Property {
            key: key.to_string(),
            value,
        });
    }

    Ok(props)
}

fn parse_value(cur: &mut Cursor<'_>) -> Result<Value, ScanError> {
    let line = cur.line;
    match cur.peek() {
        Some('"') => cur.string().map(Value::Str),
        Some('[') => {
            cur.bump();
            let mut items = Vec::new();
            loop {
                cur.skip_trivia();
                match cur.peek() {
                    Some(']') => {
                        cur.bump();
                        return Ok(Value::Array(items));
                    }
                    Some(',') => {
                        cur.bump();
                    }
                    None => return Err(("This array is not closed.".to_string(), Some(line))),
                    Some(_) => items.push(parse_value(cur)?),
                }
            }
        }
        Some(c) if c.is_alphanumeric() || c == '_' || c == '-' => {
            let start = cur.pos;
            while matches!(cur.peek(), Some(c) if c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
            {
                cur.bump();
            }
            let word = &cur.src[start..cur.pos];

            if cur.peek() == Some('(') {
                if word == "env" {
                    cur.bump();
                    cur.skip_inline_ws();
                    if cur.peek() != Some('"') {
                        return Err((
                            "The env() function expects a string argument.".to_string(),
                            Some(line),
                        ));
                    }
                    let name = cur.string()?;
                    cur.skip_inline_ws();
                    if !cur.eat(')') {
                        return Err(("Expected `)` after env() argument.".to_string(), Some(line)));
                    }
                    return Ok(Value::Env(name));
                }
                let mut depth = 0usize;
                while let Some(c) = cur.peek() {
                    match c {
                        '"' => {
                            cur.string()?;
                            continue;
                        }
                        '(' => depth += 1,
                        ')' => {
                            depth -= 1;
                            if depth == 0 {
                                cur.bump();
                                break;
                            }
                        }
                        '\n' => {
                            return Err(("Unbalanced parentheses.".to_string(), Some(line)))
                        }
                        _ => {}
                    }
                    cur.bump();
                }
                return Ok(Value::Raw(cur.src[start..cur.pos].to_string()));
            }

            Ok(match word {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => Value::Raw(word.to_string()),
            })
        }
        _ => {
            let start = cur.pos;
            cur.skip_line_comment();
            Err((
                format!("Unexpected value `{}`.", cur.src[start..cur.pos].trim()),
                Some(line),
            ))
        }
    }
}
