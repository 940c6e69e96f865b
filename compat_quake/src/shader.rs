use std::fmt;

use serde::{Deserialize, Serialize};

// id Tech 3 shader scripts (`scripts/*.shader`): a sequence of named blocks,
// each holding global directives and nested `{ ... }` stages.

#[derive(Debug, PartialEq, Eq)]
pub enum ShaderError {
    UnexpectedToken { line: usize, found: String },
    ExpectedOpenBrace { line: usize, shader: String },
    UnexpectedEof { shader: String },
    NestingTooDeep { line: usize },
    UnterminatedComment { line: usize },
    UnterminatedString { line: usize },
}

impl fmt::Display for ShaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderError::UnexpectedToken { line, found } => {
                write!(f, "unexpected '{}' on line {}", found, line)
            }
            ShaderError::ExpectedOpenBrace { line, shader } => write!(
                f,
                "expected '{{' after shader '{}' on line {}",
                shader, line
            ),
            ShaderError::UnexpectedEof { shader } => {
                write!(f, "unexpected end of script inside shader '{}'", shader)
            }
            ShaderError::NestingTooDeep { line } => {
                write!(f, "stage blocks cannot nest (line {})", line)
            }
            ShaderError::UnterminatedComment { line } => {
                write!(f, "unterminated block comment starting on line {}", line)
            }
            ShaderError::UnterminatedString { line } => {
                write!(f, "unterminated string on line {}", line)
            }
        }
    }
}

impl std::error::Error for ShaderError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShaderStage {
    pub directives: Vec<Directive>,
}

impl ShaderStage {
    pub fn directive(&self, name: &str) -> Option<&Directive> {
        find_directive(&self.directives, name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shader {
    pub name: String,
    pub directives: Vec<Directive>,
    pub stages: Vec<ShaderStage>,
}

impl Shader {
    /// Case-insensitive lookup; the engine treats keywords without regard to case.
    pub fn directive(&self, name: &str) -> Option<&Directive> {
        find_directive(&self.directives, name)
    }
}

fn find_directive<'a>(directives: &'a [Directive], name: &str) -> Option<&'a Directive> {
    directives
        .iter()
        .find(|directive| directive.name.eq_ignore_ascii_case(name))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    Word(String),
    Open,
    Close,
    Newline,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    line: usize,
}

pub fn parse_shader_script(text: &str) -> Result<Vec<Shader>, ShaderError> {
    let tokens = tokenize(text)?;
    let mut cursor = Cursor { tokens, pos: 0 };
    let mut shaders = Vec::new();

    while let Some(token) = cursor.next_significant() {
        let name = match token.kind {
            TokenKind::Word(name) => name,
            other => {
                return Err(ShaderError::UnexpectedToken {
                    line: token.line,
                    found: describe(&other),
                })
            }
        };
        // Anything trailing the name on its line is ignored, as the engine does.
        cursor.skip_line();
        match cursor.next_significant() {
            Some(Token {
                kind: TokenKind::Open,
                ..
            }) => {}
            Some(token) => {
                return Err(ShaderError::ExpectedOpenBrace {
                    line: token.line,
                    shader: name,
                })
            }
            None => return Err(ShaderError::UnexpectedEof { shader: name }),
        }
        shaders.push(parse_body(&mut cursor, name)?);
    }
    Ok(shaders)
}

fn parse_body(cursor: &mut Cursor, name: String) -> Result<Shader, ShaderError> {
    let mut directives = Vec::new();
    let mut stages = Vec::new();
    loop {
        let Some(token) = cursor.next_significant() else {
            return Err(ShaderError::UnexpectedEof { shader: name });
        };
        match token.kind {
            TokenKind::Close => break,
            TokenKind::Open => stages.push(parse_stage(cursor, &name)?),
            TokenKind::Word(word) => directives.push(cursor.directive(word)),
            TokenKind::Newline => {}
        }
    }
    Ok(Shader {
        name,
        directives,
        stages,
    })
}

fn parse_stage(cursor: &mut Cursor, shader: &str) -> Result<ShaderStage, ShaderError> {
    let mut stage = ShaderStage::default();
    loop {
        let Some(token) = cursor.next_significant() else {
            return Err(ShaderError::UnexpectedEof {
                shader: shader.to_string(),
            });
        };
        match token.kind {
            TokenKind::Close => return Ok(stage),
            TokenKind::Open => return Err(ShaderError::NestingTooDeep { line: token.line }),
            TokenKind::Word(word) => stage.directives.push(cursor.directive(word)),
            TokenKind::Newline => {}
        }
    }
}

struct Cursor {
    tokens: Vec<Token>,
    pos: usize,
}

impl Cursor {
    fn next_significant(&mut self) -> Option<Token> {
        while let Some(token) = self.tokens.get(self.pos) {
            self.pos += 1;
            if token.kind != TokenKind::Newline {
                return Some(token.clone());
            }
        }
        None
    }

    fn skip_line(&mut self) {
        while let Some(Token {
            kind: TokenKind::Word(_),
            ..
        }) = self.tokens.get(self.pos)
        {
            self.pos += 1;
        }
    }

    // A directive runs from its keyword to the end of the line or the next brace.
    fn directive(&mut self, name: String) -> Directive {
        let mut args = Vec::new();
        while let Some(Token {
            kind: TokenKind::Word(word),
            ..
        }) = self.tokens.get(self.pos)
        {
            args.push(word.clone());
            self.pos += 1;
        }
        Directive { name, args }
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Word(word) => word.clone(),
        TokenKind::Open => "{".to_string(),
        TokenKind::Close => "}".to_string(),
        TokenKind::Newline => "newline".to_string(),
    }
}

fn tokenize(text: &str) -> Result<Vec<Token>, ShaderError> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    let mut line = 1;
    let mut word = String::new();

    fn flush(word: &mut String, tokens: &mut Vec<Token>, line: usize) {
        if !word.is_empty() {
            tokens.push(Token {
                kind: TokenKind::Word(std::mem::take(word)),
                line,
            });
        }
    }

    while let Some(ch) = chars.next() {
        match ch {
            '\n' => {
                flush(&mut word, &mut tokens, line);
                tokens.push(Token {
                    kind: TokenKind::Newline,
                    line,
                });
                line += 1;
            }
            '/' if chars.peek() == Some(&'/') => {
                flush(&mut word, &mut tokens, line);
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                flush(&mut word, &mut tokens, line);
                chars.next();
                let start = line;
                let mut closed = false;
                while let Some(next) = chars.next() {
                    if next == '\n' {
                        line += 1;
                    } else if next == '*' && chars.peek() == Some(&'/') {
                        chars.next();
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return Err(ShaderError::UnterminatedComment { line: start });
                }
            }
            '"' => {
                flush(&mut word, &mut tokens, line);
                let mut quoted = String::new();
                let mut closed = false;
                for next in chars.by_ref() {
                    if next == '"' {
                        closed = true;
                        break;
                    }
                    if next == '\n' {
                        break;
                    }
                    quoted.push(next);
                }
                if !closed {
                    return Err(ShaderError::UnterminatedString { line });
                }
                tokens.push(Token {
                    kind: TokenKind::Word(quoted),
                    line,
                });
            }
            '{' | '}' => {
                flush(&mut word, &mut tokens, line);
                let kind = if ch == '{' {
                    TokenKind::Open
                } else {
                    TokenKind::Close
                };
                tokens.push(Token { kind, line });
            }
            ch if ch.is_whitespace() => flush(&mut word, &mut tokens, line),
            ch => word.push(ch),
        }
    }
    flush(&mut word, &mut tokens, line);
    Ok(tokens)
}
