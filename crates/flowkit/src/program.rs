//! Cadence program analysis.
//!
//! [`Program`] scans Cadence source once to find its imports, top-level
//! contract declarations, transaction declarations and the arity of the
//! transaction's `prepare` block. Comments and string literals are skipped,
//! so commented-out imports are not reported.
//!
//! Import rewriting splices the byte range of an import statement found by
//! the scan: [`Program::replace_import`] edits the source and scans it again.

use std::fmt;
use std::ops::Range;

use crate::error::ProgramError;
use crate::types::Address;

/// Cadence's built-in crypto contract, never resolved from configuration.
const CRYPTO_IMPORT: &str = "Crypto";

/// How an import names its target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImportKind {
    /// `import X from "./X.cdc"`
    FilePath,
    /// `import X` or `import "X"`
    Identifier,
}

/// An import that still needs an address.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Import {
    /// The file path or identifier being imported.
    pub token: String,
    pub kind: ImportKind,
}

impl fmt::Display for Import {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

/// Cadence source plus what a scan of it found.
#[derive(Clone, Debug)]
pub struct Program {
    code: String,
    location: Option<String>,
    analysis: Analysis,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Analysis {
    imports: Vec<Import>,
    statements: Vec<ImportStatement>,
    contracts: Vec<String>,
    transactions: usize,
    prepare_params: Option<usize>,
    has_main: bool,
}

impl Program {
    /// Scan `code`. `location` is the source's path, needed to resolve
    /// relative file imports.
    pub fn new(code: impl Into<Vec<u8>>, location: Option<String>) -> Result<Self, ProgramError> {
        let code = String::from_utf8(code.into()).map_err(|_| ProgramError::InvalidUtf8)?;
        let analysis = analyze(&code)?;
        Ok(Self {
            code,
            location,
            analysis,
        })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn into_code(self) -> Vec<u8> {
        self.code.into_bytes()
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// File-path and identifier imports, excluding `Crypto`.
    pub fn imports(&self) -> &[Import] {
        &self.analysis.imports
    }

    pub fn has_imports(&self) -> bool {
        !self.analysis.imports.is_empty()
    }

    /// Name of the single top-level contract or contract interface.
    pub fn name(&self) -> Result<&str, ProgramError> {
        match self.analysis.contracts.as_slice() {
            [name] => Ok(name),
            names => Err(ProgramError::ContractCount(names.len())),
        }
    }

    /// Whether the source declares a transaction.
    pub fn is_transaction(&self) -> bool {
        self.analysis.transactions > 0
    }

    /// Whether the source declares a top-level `main` function.
    pub fn is_script(&self) -> bool {
        self.analysis.has_main
    }

    /// Parameters of the transaction's `prepare` block, zero without one.
    ///
    /// Fails unless the source declares exactly one transaction.
    pub fn prepare_param_count(&self) -> Result<usize, ProgramError> {
        if self.analysis.transactions != 1 {
            return Err(ProgramError::TransactionCount(self.analysis.transactions));
        }
        Ok(self.analysis.prepare_params.unwrap_or(0))
    }

    /// Point the first import of `token` at `address` and rescan.
    ///
    /// `import X from "token"` becomes `import X from 0x..`, `import "token"`
    /// and `import token` become `import token from 0x..`. Only import
    /// statements found by the scan are edited, never text inside comments
    /// or strings. Source without a matching import is left unchanged.
    pub fn replace_import(&mut self, token: &str, address: Address) -> Result<(), ProgramError> {
        let Some(statement) = self.analysis.statements.iter().find(|s| s.imports(token)) else {
            return Ok(());
        };
        let replacement = statement.rewrite(token, &address.to_hex_prefixed());
        let code = splice(&self.code, statement.span.clone(), &replacement);

        self.analysis = analyze(&code)?;
        self.code = code;
        Ok(())
    }
}

fn splice(code: &str, range: Range<usize>, with: &str) -> String {
    let mut out = String::with_capacity(code.len() + with.len());
    out.push_str(&code[..range.start]);
    out.push_str(with);
    out.push_str(&code[range.end..]);
    out
}

/// An unresolved import statement and the bytes it spans.
#[derive(Clone, Debug, PartialEq, Eq)]
struct ImportStatement {
    span: Range<usize>,
    form: ImportForm,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum ImportForm {
    /// `import A, B from "location"`
    Located { names: Vec<String>, location: String },
    /// `import "location"`
    Quoted(String),
    /// `import A, B`
    Bare(Vec<String>),
}

impl ImportStatement {
    fn imports(&self, token: &str) -> bool {
        match &self.form {
            ImportForm::Located { location, .. } => location == token,
            ImportForm::Quoted(location) => location == token,
            ImportForm::Bare(names) => names.iter().any(|n| n == token),
        }
    }

    fn rewrite(&self, token: &str, target: &str) -> String {
        match &self.form {
            ImportForm::Located { names, .. } => format!("import {} from {}", names.join(", "), target),
            ImportForm::Quoted(_) => format!("import {} from {}", token, target),
            ImportForm::Bare(names) => {
                let rest: Vec<&str> = names.iter().map(String::as_str).filter(|n| *n != token).collect();
                let mut out = format!("import {} from {}", token, target);
                if !rest.is_empty() {
                    out.push_str("\nimport ");
                    out.push_str(&rest.join(", "));
                }
                out
            }
        }
    }
}

// ============================================================================
// Scanner
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
enum TokenKind {
    Ident(String),
    Str(String),
    /// Numbers, including hex address literals.
    Number,
    Punct(char),
}

#[derive(Clone, Debug)]
struct Token {
    kind: TokenKind,
    /// Brace depth the token sits at.
    depth: usize,
    /// Parenthesis depth the token sits at.
    parens: usize,
    /// Byte range in the source.
    span: Range<usize>,
}

impl Token {
    fn is_ident(&self, word: &str) -> bool {
        matches!(&self.kind, TokenKind::Ident(w) if w == word)
    }

    fn is_punct(&self, c: char) -> bool {
        self.kind == TokenKind::Punct(c)
    }

    fn ident(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Ident(w) => Some(w),
            _ => None,
        }
    }
}

fn tokenize(code: &str) -> Result<Vec<Token>, ProgramError> {
    let chars: Vec<char> = code.chars().collect();
    let offsets: Vec<usize> = code
        .char_indices()
        .map(|(at, _)| at)
        .chain(std::iter::once(code.len()))
        .collect();
    let span = |from: usize, to: usize| offsets[from]..offsets[to.min(chars.len())];
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut depth = 0usize;
    let mut parens = 0usize;
    let mut i = 0;

    let err = |line: usize, message: &str| ProgramError::Parse {
        line,
        message: message.to_string(),
    };

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\n' => {
                line += 1;
                i += 1;
            }
            c if c.is_whitespace() => i += 1,
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                let start = line;
                let mut nesting = 0usize;
                loop {
                    match (chars.get(i), chars.get(i + 1)) {
                        (Some('/'), Some('*')) => {
                            nesting += 1;
                            i += 2;
                        }
                        (Some('*'), Some('/')) => {
                            nesting -= 1;
                            i += 2;
                            if nesting == 0 {
                                break;
                            }
                        }
                        (Some('\n'), _) => {
                            line += 1;
                            i += 1;
                        }
                        (Some(_), _) => i += 1,
                        (None, _) => return Err(err(start, "unterminated block comment")),
                    }
                }
            }
            '"' => {
                let start = line;
                let begin = i;
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some('"') => {
                            i += 1;
                            break;
                        }
                        Some('\\') => {
                            if let Some(escaped) = chars.get(i + 1) {
                                value.push(*escaped);
                            }
                            i += 2;
                        }
                        Some('\n') | None => return Err(err(start, "unterminated string literal")),
                        Some(ch) => {
                            value.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Str(value),
                    depth,
                    parens,
                    span: span(begin, i),
                });
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Ident(chars[start..i].iter().collect()),
                    depth,
                    parens,
                    span: span(start, i),
                });
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Number,
                    depth,
                    parens,
                    span: span(start, i),
                });
            }
            _ => {
                // Closing delimiters sit at the depth of their opener.
                match c {
                    '}' => depth = depth.checked_sub(1).ok_or_else(|| err(line, "unexpected '}'"))?,
                    ')' => parens = parens.checked_sub(1).ok_or_else(|| err(line, "unexpected ')'"))?,
                    _ => {}
                }
                tokens.push(Token {
                    kind: TokenKind::Punct(c),
                    depth,
                    parens,
                    span: span(i, i + 1),
                });
                match c {
                    '{' => depth += 1,
                    '(' => parens += 1,
                    _ => {}
                }
                i += 1;
            }
        }
    }

    if depth != 0 {
        return Err(err(line, "unclosed '{'"));
    }
    if parens != 0 {
        return Err(err(line, "unclosed '('"));
    }
    Ok(tokens)
}

fn analyze(code: &str) -> Result<Analysis, ProgramError> {
    let tokens = tokenize(code)?;
    let mut analysis = Analysis::default();
    let mut i = 0;

    while i < tokens.len() {
        let token = &tokens[i];
        let top_level = token.depth == 0 && token.parens == 0;

        if top_level && token.is_ident("import") {
            i = scan_import(&tokens, i, &mut analysis);
            continue;
        }

        if top_level && token.is_ident("contract") {
            let mut next = i + 1;
            if tokens.get(next).is_some_and(|t| t.is_ident("interface")) {
                next += 1;
            }
            if let Some(name) = tokens.get(next).and_then(Token::ident) {
                analysis.contracts.push(name.to_string());
            }
            i = next + 1;
            continue;
        }

        if top_level
            && token.is_ident("transaction")
            && tokens
                .get(i + 1)
                .is_some_and(|t| t.is_punct('{') || t.is_punct('('))
        {
            analysis.transactions += 1;
            if analysis.transactions == 1 {
                analysis.prepare_params = prepare_params(&tokens, i + 1);
            }
        }

        if top_level
            && token.is_ident("fun")
            && tokens.get(i + 1).is_some_and(|t| t.is_ident("main"))
        {
            analysis.has_main = true;
        }

        i += 1;
    }

    Ok(analysis)
}

/// Parse the import whose `import` keyword sits at `at`. Returns the index
/// to continue scanning from.
fn scan_import(tokens: &[Token], at: usize, analysis: &mut Analysis) -> usize {
    let start = tokens[at].span.start;
    let mut i = at + 1;
    let mut record = |form: ImportForm, end: usize| {
        let targets: Vec<&str> = match &form {
            ImportForm::Located { location, .. } | ImportForm::Quoted(location) => vec![location.as_str()],
            ImportForm::Bare(names) => names.iter().map(String::as_str).collect(),
        };
        for token in targets.into_iter().filter(|t| *t != CRYPTO_IMPORT) {
            let kind = match &form {
                ImportForm::Bare(_) => ImportKind::Identifier,
                _ => string_import_kind(token),
            };
            analysis.imports.push(Import {
                token: token.to_string(),
                kind,
            });
        }
        analysis.statements.push(ImportStatement {
            span: start..end,
            form,
        });
    };

    // import "X" / import "./X.cdc"
    if let Some(Token {
        kind: TokenKind::Str(location),
        span,
        ..
    }) = tokens.get(i)
    {
        record(ImportForm::Quoted(location.clone()), span.end);
        return i + 1;
    }

    let mut names = Vec::new();
    let mut end = start;
    while let Some(token) = tokens.get(i) {
        let Some(name) = token.ident() else { break };
        if name == "from" {
            break;
        }
        names.push(name.to_string());
        end = token.span.end;
        i += 1;
        if tokens.get(i).is_some_and(|t| t.is_punct(',')) {
            i += 1;
        } else {
            break;
        }
    }

    if tokens.get(i).is_some_and(|t| t.is_ident("from")) {
        // Address imports are already resolved.
        if let Some(Token {
            kind: TokenKind::Str(location),
            span,
            ..
        }) = tokens.get(i + 1)
        {
            record(
                ImportForm::Located {
                    names,
                    location: location.clone(),
                },
                span.end,
            );
        }
        return i + 2;
    }

    if !names.is_empty() {
        record(ImportForm::Bare(names), end);
    }
    i
}

fn string_import_kind(location: &str) -> ImportKind {
    if location.ends_with(".cdc") {
        ImportKind::FilePath
    } else {
        ImportKind::Identifier
    }
}

/// Count the parameters of `prepare(..)` inside the transaction body that
/// starts at or after `start`.
fn prepare_params(tokens: &[Token], start: usize) -> Option<usize> {
    let open = start + tokens[start..].iter().position(|t| t.is_punct('{') && t.depth == 0 && t.parens == 0)?;
    let body = &tokens[open + 1..];

    let prepare = body
        .iter()
        .take_while(|t| t.depth >= 1)
        .position(|t| t.depth == 1 && t.is_ident("prepare"))?;
    let args = &body[prepare + 1..];
    let first = args.first()?;
    if !first.is_punct('(') {
        return None;
    }

    let inner_parens = first.parens + 1;
    let inner_depth = first.depth;
    let mut count = 0;
    let mut seen_any = false;
    for t in &args[1..] {
        if t.is_punct(')') && t.parens == first.parens {
            break;
        }
        seen_any = true;
        if t.is_punct(',') && t.parens == inner_parens && t.depth == inner_depth {
            count += 1;
        }
    }
    Some(if seen_any { count + 1 } else { 0 })
}
