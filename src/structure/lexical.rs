// Copyright 2025 Eric Jingryd (tidynest@proton.me)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Built-in structural parser
//!
//! Recognises a practical subset of PowerShell (pipelines, commands and
//! parameters, the expression grammar, member access and invocation, type
//! literals, script blocks, hashtables, and the common keyword statements)
//! and reports node types named after PowerShell's own syntax tree classes,
//! in pre-order. Two synthetic tags mirror what the external parser helper
//! emits:
//!
//! - `InvokeExpressionAst` for a command named `Invoke-Expression`/`iex`
//! - `EncodedCommand` for an encoded-command parameter given to
//!   `powershell`/`pwsh` (any abbreviation, or `-ec`), or spelled out in
//!   full on any command
//!
//! # Example
//!
//! ```
//! use pwsh_guard::structure::{LexicalParser, StructuralParser};
//!
//! let nodes = LexicalParser::new().parse("Get-Process | Sort-Object CPU")?;
//! assert_eq!(nodes.iter().filter(|n| *n == "CommandAst").count(), 2);
//! # Ok::<(), pwsh_guard::structure::ParseError>(())
//! ```

use crate::structure::lexer::{tokenize, Group, Token, TokenKind};
use crate::structure::{ParseError, StructuralParser};

/// Nesting limit for groups, blocks and unary chains
const MAX_DEPTH: usize = 256;

const INVOKE_EXPRESSION_NAMES: [&str; 2] = ["invoke-expression", "iex"];
const POWERSHELL_HOSTS: [&str; 4] = ["powershell", "powershell.exe", "pwsh", "pwsh.exe"];

const BINARY_OPERATORS: [&str; 31] = [
    "eq", "ne", "gt", "ge", "lt", "le", "like", "notlike", "match", "notmatch", "contains",
    "notcontains", "in", "notin", "replace", "split", "join", "f", "and", "or", "xor", "band",
    "bor", "bxor", "is", "isnot", "as", "shl", "shr", "creplace", "ireplace",
];
const UNARY_OPERATORS: [&str; 4] = ["not", "bnot", "join", "split"];
const ARITHMETIC: [&str; 6] = ["+", "-", "*", "/", "%", ".."];
const ASSIGNMENT: [&str; 6] = ["=", "+=", "-=", "*=", "/=", "%="];
const PREFIX: [&str; 5] = ["!", "-", "+", "++", "--"];

fn is_binary_operator(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    if BINARY_OPERATORS.contains(&name.as_str()) {
        return true;
    }
    // Case-sensitive and explicit case-insensitive forms: -ceq, -ilike
    name.strip_prefix(|c: char| c == 'c' || c == 'i')
        .is_some_and(|base| base.len() > 1 && BINARY_OPERATORS.contains(&base))
}

fn is_unary_operator(name: &str) -> bool {
    UNARY_OPERATORS.contains(&name.to_ascii_lowercase().as_str())
}

/// True if an unescaped `$` would expand inside a double-quoted body
fn is_expandable(body: &str) -> bool {
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '`' => {
                chars.next();
            }
            '$' => {
                if chars
                    .peek()
                    .is_some_and(|n| n.is_alphanumeric() || matches!(n, '_' | '{' | '(' | '?' | '$' | ':'))
                {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}

/// Whether a statement must be followed by a separator
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Ends {
    /// Pipelines, assignments and flow statements
    Open,
    /// Statements ending in a block or parenthesised clause
    Closed,
}

type Parsed<T = ()> = Result<T, ParseError>;

struct Walker<'s, 't> {
    tokens: &'t [Token<'s>],
    pos: usize,
    depth: usize,
    end: usize,
    nodes: Vec<&'static str>,
}

impl<'s, 't> Walker<'s, 't> {
    fn new(tokens: &'t [Token<'s>], end: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            end,
            nodes: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Cursor helpers
    // ------------------------------------------------------------------

    fn peek(&self) -> Option<&'t Token<'s>> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&'t TokenKind<'s>> {
        self.peek().map(|t| &t.kind)
    }

    fn peek_nth(&self, n: usize) -> Option<&'t Token<'s>> {
        self.tokens.get(self.pos + n)
    }

    fn bump(&mut self) -> Option<&'t Token<'s>> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::Syntax {
            offset: self.peek().map_or(self.end, |t| t.offset),
            message: message.into(),
        }
    }

    fn push(&mut self, tag: &'static str) {
        self.nodes.push(tag);
    }

    /// Inserts a parent tag in front of nodes emitted since `mark`
    fn wrap(&mut self, mark: usize, tag: &'static str) {
        self.nodes.insert(mark, tag);
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Parsed<T>) -> Parsed<T> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek_kind(), Some(TokenKind::Separator)) {
            self.pos += 1;
        }
    }

    fn at_keyword(&self, offset: usize, keyword: &str) -> bool {
        matches!(
            self.peek_nth(offset).map(|t| &t.kind),
            Some(TokenKind::Word(w)) if w.eq_ignore_ascii_case(keyword)
        )
    }

    fn expect_open(&mut self, group: Group) -> Parsed {
        match self.peek_kind() {
            Some(TokenKind::Open(g)) if *g == group => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(self.error(format!("missing '{}'", opener(group)))),
        }
    }

    fn expect_close(&mut self, closer: char) -> Parsed {
        match self.peek_kind() {
            Some(TokenKind::Close(c)) if *c == closer => {
                self.pos += 1;
                Ok(())
            }
            None => Err(self.error(format!("missing closing '{}'", closer))),
            Some(_) => Err(self.error(format!("expected '{}'", closer))),
        }
    }

    /// Consumes a bracketed group without interpreting it
    fn skip_group(&mut self) -> Parsed {
        let mut stack: Vec<char> = Vec::new();
        loop {
            match self.bump().map(|t| &t.kind) {
                Some(TokenKind::Open(g)) => stack.push(g.closer()),
                Some(TokenKind::Close(c)) => {
                    if stack.pop() != Some(*c) {
                        self.pos -= 1;
                        return Err(self.error(format!("unexpected '{}'", c)));
                    }
                    if stack.is_empty() {
                        return Ok(());
                    }
                }
                Some(_) if !stack.is_empty() => {}
                Some(_) => return Err(self.error("expected a bracketed group")),
                None => {
                    let closer = stack.last().copied().unwrap_or(')');
                    return Err(self.error(format!("missing closing '{}'", closer)));
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn script(&mut self) -> Parsed {
        self.push("ScriptBlockAst");
        self.push("NamedBlockAst");
        self.statements(None)
    }

    fn statements(&mut self, terminator: Option<char>) -> Parsed {
        loop {
            self.skip_separators();
            match self.peek_kind() {
                None => {
                    return match terminator {
                        Some(c) => Err(self.error(format!("missing closing '{}'", c))),
                        None => Ok(()),
                    };
                }
                Some(TokenKind::Close(c)) => {
                    return if Some(*c) == terminator {
                        Ok(())
                    } else {
                        Err(self.error(format!("unexpected '{}'", c)))
                    };
                }
                Some(_) => {}
            }

            if self.statement()? == Ends::Open {
                match self.peek_kind() {
                    None | Some(TokenKind::Separator) | Some(TokenKind::Close(_)) => {}
                    Some(_) => return Err(self.error("unexpected token after statement")),
                }
            }
        }
    }

    fn statement(&mut self) -> Parsed<Ends> {
        let keyword = match self.peek_kind() {
            Some(TokenKind::Word(w)) => w.to_ascii_lowercase(),
            _ => return self.pipeline_or_assignment(false).map(|_| Ends::Open),
        };
        let paren_follows = matches!(
            self.peek_nth(1).map(|t| &t.kind),
            Some(TokenKind::Open(Group::Paren))
        );
        let brace_follows = matches!(
            self.peek_nth(1).map(|t| &t.kind),
            Some(TokenKind::Open(Group::Brace))
        );

        match keyword.as_str() {
            "if" => self.if_statement(),
            "foreach" if paren_follows => self.foreach_statement(),
            "for" if paren_follows => self.for_statement(),
            "while" if paren_follows => self.while_statement(),
            "switch" => self.switch_statement(),
            "do" if brace_follows => self.do_statement(),
            "try" if brace_follows => self.try_statement(),
            "function" | "filter" => self.function_definition(),
            "param" if paren_follows => {
                self.pos += 1;
                self.push("ParamBlockAst");
                self.skip_group()?;
                Ok(Ends::Closed)
            }
            "return" => self.flow_statement("ReturnStatementAst"),
            "throw" => self.flow_statement("ThrowStatementAst"),
            "exit" => self.flow_statement("ExitStatementAst"),
            "break" => self.loop_control("BreakStatementAst"),
            "continue" => self.loop_control("ContinueStatementAst"),
            _ => self.pipeline_or_assignment(false).map(|_| Ends::Open),
        }
    }

    fn block(&mut self) -> Parsed {
        self.expect_open(Group::Brace)?;
        self.push("StatementBlockAst");
        self.nested(|w| w.statements(Some('}')))?;
        self.expect_close('}')
    }

    fn condition(&mut self) -> Parsed {
        self.expect_open(Group::Paren)?;
        self.skip_separators();
        if matches!(self.peek_kind(), None | Some(TokenKind::Close(_))) {
            return Err(self.error("missing condition"));
        }
        self.nested(|w| w.pipeline_or_assignment(false))?;
        self.skip_separators();
        self.expect_close(')')
    }

    /// Peeks past separators for a continuation keyword (`else`, `catch`)
    fn continues_with(&mut self, keywords: &[&str]) -> Option<String> {
        let saved = self.pos;
        self.skip_separators();
        if let Some(TokenKind::Word(w)) = self.peek_kind() {
            let lower = w.to_ascii_lowercase();
            if keywords.contains(&lower.as_str()) {
                return Some(lower);
            }
        }
        self.pos = saved;
        None
    }

    fn if_statement(&mut self) -> Parsed<Ends> {
        self.pos += 1;
        self.push("IfStatementAst");
        self.condition()?;
        self.block()?;

        while let Some(keyword) = self.continues_with(&["elseif", "else"]) {
            self.pos += 1;
            if keyword == "elseif" {
                self.condition()?;
                self.block()?;
            } else {
                self.block()?;
                break;
            }
        }
        Ok(Ends::Closed)
    }

    fn foreach_statement(&mut self) -> Parsed<Ends> {
        self.pos += 1;
        self.push("ForEachStatementAst");
        self.expect_open(Group::Paren)?;

        match self.bump().map(|t| &t.kind) {
            Some(TokenKind::Variable(_)) => self.push("VariableExpressionAst"),
            _ => return Err(self.error("missing loop variable")),
        }
        if !self.at_keyword(0, "in") {
            return Err(self.error("missing 'in'"));
        }
        self.pos += 1;
        self.nested(|w| w.pipeline_or_assignment(false))?;
        self.expect_close(')')?;
        self.block()?;
        Ok(Ends::Closed)
    }

    fn for_statement(&mut self) -> Parsed<Ends> {
        self.pos += 1;
        self.push("ForStatementAst");
        self.expect_open(Group::Paren)?;
        self.nested(|w| w.statements(Some(')')))?;
        self.expect_close(')')?;
        self.block()?;
        Ok(Ends::Closed)
    }

    fn while_statement(&mut self) -> Parsed<Ends> {
        self.pos += 1;
        self.push("WhileStatementAst");
        self.condition()?;
        self.block()?;
        Ok(Ends::Closed)
    }

    fn do_statement(&mut self) -> Parsed<Ends> {
        self.pos += 1;
        let mark = self.nodes.len();
        self.block()?;

        match self.continues_with(&["while", "until"]).as_deref() {
            Some("while") => self.wrap(mark, "DoWhileStatementAst"),
            Some(_) => self.wrap(mark, "DoUntilStatementAst"),
            None => return Err(self.error("missing 'while' or 'until' after do block")),
        }
        self.pos += 1;
        self.condition()?;
        Ok(Ends::Closed)
    }

    fn switch_statement(&mut self) -> Parsed<Ends> {
        self.pos += 1;
        self.push("SwitchStatementAst");
        while matches!(self.peek_kind(), Some(TokenKind::Parameter { .. })) {
            self.pos += 1;
        }
        self.condition()?;
        self.expect_open(Group::Brace)?;

        loop {
            self.skip_separators();
            match self.peek_kind() {
                Some(TokenKind::Close('}')) => break,
                None => return Err(self.error("missing closing '}'")),
                Some(TokenKind::Word(_)) => {
                    self.pos += 1;
                    self.push("StringConstantExpressionAst");
                }
                Some(_) => self.nested(|w| w.unary())?,
            }
            self.block()?;
        }
        self.expect_close('}')?;
        Ok(Ends::Closed)
    }

    fn try_statement(&mut self) -> Parsed<Ends> {
        self.pos += 1;
        self.push("TryStatementAst");
        self.block()?;

        let mut handlers = 0;
        while let Some(keyword) = self.continues_with(&["catch", "finally"]) {
            self.pos += 1;
            handlers += 1;
            if keyword == "catch" {
                self.push("CatchClauseAst");
                while let Some(kind) = self.peek_kind() {
                    match kind {
                        TokenKind::TypeLiteral(_) => self.push("TypeConstraintAst"),
                        TokenKind::Comma => {}
                        _ => break,
                    }
                    self.pos += 1;
                }
                self.block()?;
            } else {
                self.block()?;
                break;
            }
        }

        if handlers == 0 {
            return Err(self.error("try block needs a catch or finally block"));
        }
        Ok(Ends::Closed)
    }

    fn function_definition(&mut self) -> Parsed<Ends> {
        self.pos += 1;
        self.push("FunctionDefinitionAst");
        match self.bump().map(|t| &t.kind) {
            Some(TokenKind::Word(_)) => {}
            _ => return Err(self.error("missing function name")),
        }
        if matches!(self.peek_kind(), Some(TokenKind::Open(Group::Paren))) {
            self.push("ParameterAst");
            self.skip_group()?;
        }
        self.expect_open(Group::Brace)?;
        self.push("ScriptBlockAst");
        self.push("NamedBlockAst");
        self.nested(|w| w.statements(Some('}')))?;
        self.expect_close('}')?;
        Ok(Ends::Closed)
    }

    fn flow_statement(&mut self, tag: &'static str) -> Parsed<Ends> {
        self.pos += 1;
        self.push(tag);
        if !matches!(
            self.peek_kind(),
            None | Some(TokenKind::Separator) | Some(TokenKind::Close(_))
        ) {
            self.pipeline_or_assignment(false)?;
        }
        Ok(Ends::Open)
    }

    fn loop_control(&mut self, tag: &'static str) -> Parsed<Ends> {
        self.pos += 1;
        self.push(tag);
        if matches!(self.peek_kind(), Some(TokenKind::Word(_))) {
            self.pos += 1;
            self.push("StringConstantExpressionAst");
        }
        Ok(Ends::Open)
    }

    // ------------------------------------------------------------------
    // Pipelines and commands
    // ------------------------------------------------------------------

    fn starts_command(&self) -> bool {
        matches!(
            self.peek_kind(),
            Some(TokenKind::Word(_)) | Some(TokenKind::Invoke(_))
        )
    }

    /// A pipeline, or an assignment whose right side is a statement
    ///
    /// As the right side of an assignment, a lone expression is not
    /// wrapped in a `PipelineAst`.
    fn pipeline_or_assignment(&mut self, rhs: bool) -> Parsed {
        let mark = self.nodes.len();

        if self.starts_command() {
            self.push("PipelineAst");
            self.command()?;
            return self.pipeline_tail();
        }

        self.expression(true)?;

        if let Some(TokenKind::Operator(op)) = self.peek_kind() {
            if ASSIGNMENT.contains(op) {
                self.pos += 1;
                self.wrap(mark, "AssignmentStatementAst");
                self.skip_separators();
                if matches!(self.peek_kind(), None | Some(TokenKind::Close(_))) {
                    return Err(self.error("missing value after assignment"));
                }
                return self.nested(|w| w.pipeline_or_assignment(true));
            }
        }

        self.wrap(mark, "CommandExpressionAst");
        self.redirections()?;
        if rhs && !matches!(self.peek_kind(), Some(TokenKind::Pipe)) {
            return Ok(());
        }
        self.wrap(mark, "PipelineAst");
        self.pipeline_tail()
    }

    fn pipeline_tail(&mut self) -> Parsed {
        while matches!(self.peek_kind(), Some(TokenKind::Pipe)) {
            self.pos += 1;
            self.skip_separators();
            match self.peek_kind() {
                None | Some(TokenKind::Pipe) | Some(TokenKind::Close(_)) => {
                    return Err(self.error("empty pipe element"));
                }
                _ => {}
            }

            if self.starts_command() {
                self.command()?;
            } else {
                let mark = self.nodes.len();
                self.expression(true)?;
                self.wrap(mark, "CommandExpressionAst");
                self.redirections()?;
            }
        }
        Ok(())
    }

    fn redirections(&mut self) -> Parsed {
        while let Some(TokenKind::Redirection(r)) = self.peek_kind() {
            self.pos += 1;
            if r.ends_with("&1") || r.ends_with("&2") {
                self.push("MergingRedirectionAst");
            } else {
                self.push("FileRedirectionAst");
                self.command_argument()?;
            }
        }
        Ok(())
    }

    fn command(&mut self) -> Parsed {
        self.push("CommandAst");

        let host = match self.bump().map(|t| &t.kind) {
            Some(TokenKind::Word(name)) => {
                self.push("StringConstantExpressionAst");
                Some(name.to_ascii_lowercase())
            }
            Some(TokenKind::Invoke(_)) => match self.peek_kind() {
                Some(TokenKind::Word(name))
                | Some(TokenKind::SingleQuoted(name))
                | Some(TokenKind::DoubleQuoted(name)) => {
                    self.pos += 1;
                    self.push("StringConstantExpressionAst");
                    Some(name.to_ascii_lowercase())
                }
                Some(_) => {
                    self.nested(|w| w.postfix())?;
                    None
                }
                None => return Err(self.error("missing command after call operator")),
            },
            _ => return Err(self.error("expected a command")),
        };

        if host
            .as_deref()
            .is_some_and(|name| INVOKE_EXPRESSION_NAMES.contains(&name))
        {
            self.push("InvokeExpressionAst");
        }
        let is_host = host
            .as_deref()
            .is_some_and(|name| POWERSHELL_HOSTS.contains(&name));

        loop {
            match self.peek_kind() {
                None
                | Some(TokenKind::Pipe)
                | Some(TokenKind::Separator)
                | Some(TokenKind::Close(_)) => break,
                Some(TokenKind::Parameter { name, colon }) => {
                    self.pos += 1;
                    self.push("CommandParameterAst");
                    if is_encoded_command(name, is_host) {
                        self.push("EncodedCommand");
                    }
                    if *colon {
                        self.command_argument()?;
                    }
                }
                Some(TokenKind::Redirection(_)) => self.redirections()?,
                Some(TokenKind::Comma) => {
                    self.pos += 1;
                    self.push("UnaryExpressionAst");
                    self.command_argument()?;
                }
                Some(_) => {
                    let mark = self.nodes.len();
                    self.command_argument()?;
                    if matches!(self.peek_kind(), Some(TokenKind::Comma)) {
                        self.wrap(mark, "ArrayLiteralAst");
                        while matches!(self.peek_kind(), Some(TokenKind::Comma)) {
                            self.pos += 1;
                            self.command_argument()?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn command_argument(&mut self) -> Parsed {
        match self.peek_kind() {
            Some(TokenKind::Word(_)) | Some(TokenKind::Operator(_)) => {
                self.pos += 1;
                self.push("StringConstantExpressionAst");
                Ok(())
            }
            Some(TokenKind::Parameter { .. }) => {
                self.pos += 1;
                self.push("StringConstantExpressionAst");
                Ok(())
            }
            _ => self.nested(|w| w.postfix()),
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Binary operator chain; `commas` allows an array literal operand
    fn expression(&mut self, commas: bool) -> Parsed {
        let mark = self.nodes.len();
        self.operand(commas)?;

        loop {
            match self.peek_kind() {
                Some(TokenKind::Operator(op)) if ARITHMETIC.contains(op) => {
                    self.pos += 1;
                    self.wrap(mark, "BinaryExpressionAst");
                    self.skip_separators();
                    self.operand(commas)?;
                }
                Some(TokenKind::Parameter { name, .. }) if is_binary_operator(name) => {
                    self.pos += 1;
                    self.wrap(mark, "BinaryExpressionAst");
                    self.skip_separators();
                    self.operand(commas)?;
                }
                // `$a -1` lexes as a negative literal
                Some(TokenKind::Number(n)) if n.starts_with('-') => {
                    self.pos += 1;
                    self.wrap(mark, "BinaryExpressionAst");
                    self.push("ConstantExpressionAst");
                }
                _ => return Ok(()),
            }
        }
    }

    fn operand(&mut self, commas: bool) -> Parsed {
        let mark = self.nodes.len();
        self.nested(|w| w.unary())?;

        if commas && matches!(self.peek_kind(), Some(TokenKind::Comma)) {
            self.wrap(mark, "ArrayLiteralAst");
            while matches!(self.peek_kind(), Some(TokenKind::Comma)) {
                self.pos += 1;
                self.skip_separators();
                self.nested(|w| w.unary())?;
            }
        }
        Ok(())
    }

    fn unary(&mut self) -> Parsed {
        match self.peek_kind() {
            Some(TokenKind::Operator(op)) if PREFIX.contains(op) => {
                self.pos += 1;
                self.push("UnaryExpressionAst");
                self.nested(|w| w.unary())
            }
            Some(TokenKind::Parameter { name, .. }) if is_unary_operator(name) => {
                self.pos += 1;
                self.push("UnaryExpressionAst");
                self.nested(|w| w.unary())
            }
            Some(TokenKind::Comma) => {
                self.pos += 1;
                self.push("UnaryExpressionAst");
                self.nested(|w| w.unary())
            }
            Some(TokenKind::TypeLiteral(_)) if self.cast_follows() => {
                self.pos += 1;
                self.push("ConvertExpressionAst");
                self.push("TypeConstraintAst");
                self.nested(|w| w.unary())
            }
            _ => self.postfix(),
        }
    }

    /// A type literal followed by a value is a cast
    fn cast_follows(&self) -> bool {
        matches!(
            self.peek_nth(1).map(|t| &t.kind),
            Some(TokenKind::SingleQuoted(_))
                | Some(TokenKind::DoubleQuoted(_))
                | Some(TokenKind::HereString { .. })
                | Some(TokenKind::Variable(_))
                | Some(TokenKind::Number(_))
                | Some(TokenKind::TypeLiteral(_))
                | Some(TokenKind::Open(Group::Paren))
                | Some(TokenKind::Open(Group::SubExpression))
                | Some(TokenKind::Open(Group::ArrayExpression))
                | Some(TokenKind::Open(Group::Hashtable))
        )
    }

    fn postfix(&mut self) -> Parsed {
        let mark = self.nodes.len();
        self.primary()?;

        loop {
            match self.peek_kind() {
                Some(TokenKind::Member(_)) | Some(TokenKind::StaticMember(_)) => {
                    self.pos += 1;
                    let call = matches!(
                        self.peek(),
                        Some(Token { kind: TokenKind::Open(Group::Paren), spaced: false, .. })
                    );
                    if call {
                        self.wrap(mark, "InvokeMemberExpressionAst");
                        self.push("StringConstantExpressionAst");
                        self.method_arguments()?;
                    } else {
                        self.wrap(mark, "MemberExpressionAst");
                        self.push("StringConstantExpressionAst");
                    }
                }
                Some(TokenKind::Open(Group::Index)) => {
                    self.pos += 1;
                    self.wrap(mark, "IndexExpressionAst");
                    self.skip_separators();
                    self.nested(|w| w.expression(true))?;
                    self.skip_separators();
                    self.expect_close(']')?;
                }
                Some(TokenKind::Operator("++")) | Some(TokenKind::Operator("--")) => {
                    self.pos += 1;
                    self.wrap(mark, "UnaryExpressionAst");
                }
                _ => return Ok(()),
            }
        }
    }

    fn method_arguments(&mut self) -> Parsed {
        self.expect_open(Group::Paren)?;
        self.skip_separators();
        if matches!(self.peek_kind(), Some(TokenKind::Close(')'))) {
            self.pos += 1;
            return Ok(());
        }

        loop {
            self.nested(|w| w.expression(false))?;
            self.skip_separators();
            match self.peek_kind() {
                Some(TokenKind::Comma) => {
                    self.pos += 1;
                    self.skip_separators();
                }
                _ => return self.expect_close(')'),
            }
        }
    }

    fn primary(&mut self) -> Parsed {
        let kind = match self.peek_kind() {
            Some(kind) => kind,
            None => return Err(self.error("missing expression")),
        };

        match kind {
            TokenKind::SingleQuoted(_) | TokenKind::HereString { expandable: false, .. } => {
                self.pos += 1;
                self.push("StringConstantExpressionAst");
            }
            TokenKind::DoubleQuoted(body) | TokenKind::HereString { body, .. } => {
                self.pos += 1;
                if is_expandable(body) {
                    self.push("ExpandableStringExpressionAst");
                } else {
                    self.push("StringConstantExpressionAst");
                }
            }
            TokenKind::Number(_) => {
                self.pos += 1;
                self.push("ConstantExpressionAst");
            }
            TokenKind::Variable(_) => {
                self.pos += 1;
                self.push("VariableExpressionAst");
            }
            TokenKind::TypeLiteral(_) => {
                self.pos += 1;
                self.push("TypeExpressionAst");
            }
            TokenKind::Open(Group::Paren) => {
                self.pos += 1;
                self.push("ParenExpressionAst");
                self.skip_separators();
                if matches!(self.peek_kind(), None) {
                    return Err(self.error("missing closing ')'"));
                }
                if matches!(self.peek_kind(), Some(TokenKind::Close(')'))) {
                    return Err(self.error("missing expression inside '()'"));
                }
                self.nested(|w| w.statement())?;
                self.skip_separators();
                self.expect_close(')')?;
            }
            TokenKind::Open(Group::SubExpression) => {
                self.pos += 1;
                self.push("SubExpressionAst");
                self.push("StatementBlockAst");
                self.nested(|w| w.statements(Some(')')))?;
                self.expect_close(')')?;
            }
            TokenKind::Open(Group::ArrayExpression) => {
                self.pos += 1;
                self.push("ArrayExpressionAst");
                self.push("StatementBlockAst");
                self.nested(|w| w.statements(Some(')')))?;
                self.expect_close(')')?;
            }
            TokenKind::Open(Group::Brace) => {
                self.pos += 1;
                self.push("ScriptBlockExpressionAst");
                self.push("ScriptBlockAst");
                self.push("NamedBlockAst");
                self.nested(|w| w.statements(Some('}')))?;
                self.expect_close('}')?;
            }
            TokenKind::Open(Group::Hashtable) => {
                self.pos += 1;
                self.push("HashtableAst");
                self.nested(|w| w.hashtable_entries())?;
            }
            TokenKind::Close(c) => return Err(self.error(format!("unexpected '{}'", c))),
            _ => return Err(self.error("unexpected token in expression")),
        }
        Ok(())
    }

    fn hashtable_entries(&mut self) -> Parsed {
        loop {
            self.skip_separators();
            match self.peek_kind() {
                Some(TokenKind::Close('}')) => {
                    self.pos += 1;
                    return Ok(());
                }
                None => return Err(self.error("missing closing '}'")),
                Some(TokenKind::Word(_)) => {
                    self.pos += 1;
                    self.push("StringConstantExpressionAst");
                }
                Some(_) => self.unary()?,
            }

            if !matches!(self.peek_kind(), Some(TokenKind::Operator("="))) {
                return Err(self.error("missing '=' in hashtable entry"));
            }
            self.pos += 1;
            self.skip_separators();
            self.statement()?;

            match self.peek_kind() {
                Some(TokenKind::Separator) | Some(TokenKind::Close('}')) => {}
                None => return Err(self.error("missing closing '}'")),
                Some(_) => return Err(self.error("unexpected token in hashtable")),
            }
        }
    }
}

fn opener(group: Group) -> &'static str {
    match group {
        Group::Paren => "(",
        Group::Brace => "{",
        Group::Index => "[",
        Group::SubExpression => "$(",
        Group::ArrayExpression => "@(",
        Group::Hashtable => "@{",
    }
}

/// Encoded-command parameter detection
///
/// PowerShell hosts accept any prefix of `-EncodedCommand` and the `-ec`
/// alias; on other commands only the full name counts.
fn is_encoded_command(name: &str, host: bool) -> bool {
    let name = name.to_ascii_lowercase();
    if name == "encodedcommand" {
        return true;
    }
    host && (name == "ec" || "encodedcommand".starts_with(name.as_str()))
}

/// In-process structural parser
#[derive(Clone, Copy, Debug, Default)]
pub struct LexicalParser;

impl LexicalParser {
    pub fn new() -> Self {
        Self
    }
}

impl StructuralParser for LexicalParser {
    fn parse(&self, command: &str) -> Result<Vec<String>, ParseError> {
        let tokens = tokenize(command)?;
        if tokens.iter().all(|t| t.kind == TokenKind::Separator) {
            return Err(ParseError::Syntax {
                offset: 0,
                message: "empty script".to_string(),
            });
        }

        let mut walker = Walker::new(&tokens, command.len());
        walker.script()?;
        Ok(walker.nodes.into_iter().map(String::from).collect())
    }

    fn name(&self) -> &'static str {
        "lexical"
    }
}
