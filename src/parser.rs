use std::mem;

use crate::ast::{Expr, Pool, TemplateElement, TemplatePart, Token, TokenKind};
use crate::error::Error;
use crate::grammar::Grammar;
use crate::lexer::Lexer;

/// Lex and parse a source string against a grammar.
pub fn parse(grammar: &Grammar, source: &str) -> Result<Expr, Error> {
    let tokens = Lexer::new(grammar, source).tokenize()?;
    let mut parser = Parser::new(grammar);
    for token in tokens {
        parser.add_token(token)?;
    }
    parser.complete()
}

/// Parser states. Each state accepts a fixed set of token kinds; the
/// sub-expression states (grouping, filter bodies, call arguments,
/// object/array members, ternary branches) delegate their tokens to a
/// nested parser until one of the state's stop tokens surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ExpectOperand,
    ExpectBinOp,
    Identifier,
    Traverse,
    ExpectObjKey,
    ExpectKeyValSep,
    ExpectTransform,
    PostTransform,
    PostArgs,
    SubExpression,
    Filter,
    ArgVal,
    ObjVal,
    ArrayVal,
    TernaryMid,
    TernaryEnd,
    Complete,
}

/// Delimiters that can hand control back from a nested parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopToken {
    CloseParen,
    CloseBracket,
    CloseCurl,
    Comma,
    Colon,
}

/// An ancestor of the cursor that is still missing its rightmost child.
///
/// The chain of frames *is* the transient parent chain the precedence
/// promotion walks: binary operators fold frames of greater-or-equal
/// precedence before pushing their own, which yields left-associativity;
/// assignment and ternary frames never fold into an operand, so they act
/// as barriers and collect the whole right-hand tree when the expression
/// completes.
enum Frame {
    Binary {
        op: String,
        precedence: u8,
        left: Expr,
    },
    Unary {
        op: String,
    },
    Assign {
        target: String,
    },
    Ternary {
        test: Expr,
        consequent: Option<Expr>,
    },
}

impl Frame {
    fn close(self, right: Expr) -> Result<Expr, Error> {
        match self {
            Frame::Binary { op, left, .. } => Ok(Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            }),
            Frame::Unary { op } => Ok(Expr::Unary {
                op,
                right: Box::new(right),
            }),
            Frame::Assign { target } => Ok(Expr::Assignment {
                target,
                value: Box::new(right),
            }),
            Frame::Ternary { .. } => Err(Error::IncompleteExpression("ternary branch")),
        }
    }
}

/// A streaming parser: push tokens one at a time, then call
/// [`Parser::complete`] to take the finished tree.
///
/// There is no backtracking. The parser keeps a cursor (the most recent
/// complete operand), a stack of incomplete ancestors, and — while inside
/// any bracketed construct — a nested parser that owns the tokens until
/// its stop token arrives.
pub struct Parser<'g> {
    grammar: &'g Grammar,
    state: State,
    stack: Vec<Frame>,
    cursor: Option<Expr>,
    /// Completed `;`-separated trees (top-level parser only).
    expressions: Vec<Expr>,
    sub: Option<Box<Parser<'g>>>,
    stops: Vec<(StopToken, State)>,
    /// Set when the active nested parser inherited this parser's stop
    /// tokens; its stop then also stops this parser.
    parent_stop: bool,
    /// A leading-dot identifier appeared somewhere in this parse.
    relative: bool,
    next_ident_encapsulate: bool,
    next_ident_relative: bool,
    pending_obj_key: Option<String>,
    is_sub: bool,
}

impl<'g> Parser<'g> {
    pub fn new(grammar: &'g Grammar) -> Self {
        Self::with_stops(grammar, Vec::new(), false)
    }

    fn new_sub(grammar: &'g Grammar, stops: Vec<(StopToken, State)>) -> Self {
        Self::with_stops(grammar, stops, true)
    }

    fn with_stops(grammar: &'g Grammar, stops: Vec<(StopToken, State)>, is_sub: bool) -> Self {
        Parser {
            grammar,
            state: State::ExpectOperand,
            stack: Vec::new(),
            cursor: None,
            expressions: Vec::new(),
            sub: None,
            stops,
            parent_stop: false,
            relative: false,
            next_ident_encapsulate: false,
            next_ident_relative: false,
            pending_obj_key: None,
            is_sub,
        }
    }

    /// Feed the next token of the stream.
    pub fn add_token(&mut self, token: Token) -> Result<(), Error> {
        self.feed(token).map(|_| ())
    }

    /// Finish the parse and return the tree. Collected `;`-members are
    /// wrapped in a sequence only when there are at least two of them.
    pub fn complete(mut self) -> Result<Expr, Error> {
        let tail = self.complete_tree()?;
        let mut exprs = mem::take(&mut self.expressions);
        match tail {
            Some(tree) => exprs.push(tree),
            None => {
                if exprs.is_empty() {
                    return Err(Error::IncompleteExpression("expression"));
                }
            }
        }
        if exprs.len() == 1 {
            Ok(exprs.remove(0))
        } else {
            Ok(Expr::Sequence(exprs))
        }
    }

    fn feed(&mut self, token: Token) -> Result<Option<State>, Error> {
        if self.state == State::Complete {
            return Err(Error::UnexpectedToken(token.raw.trim().to_string()));
        }
        if uses_sub_parser(self.state) {
            if self.sub.is_none() {
                self.start_sub();
            }
            let stopped = match self.sub.as_mut() {
                Some(sub) => sub.feed(token)?,
                None => None,
            };
            if let Some(stop_state) = stopped {
                self.end_sub()?;
                if self.parent_stop {
                    return Ok(Some(stop_state));
                }
                self.state = stop_state;
            }
            return Ok(None);
        }
        self.dispatch(token)
    }

    fn dispatch(&mut self, token: Token) -> Result<Option<State>, Error> {
        use TokenKind::*;
        let Token { kind, raw } = token;
        match (self.state, kind) {
            // ---- operand position ----
            (State::ExpectOperand, Literal(value)) => {
                self.cursor = Some(Expr::Literal(value));
                self.state = State::ExpectBinOp;
            }
            (State::ExpectOperand, Identifier(name)) => {
                self.handle_identifier(name);
                self.state = State::Identifier;
            }
            (State::ExpectOperand, UnaryOp(op)) => {
                self.stack.push(Frame::Unary { op });
            }
            (State::ExpectOperand, OpenParen) => {
                self.state = State::SubExpression;
            }
            (State::ExpectOperand, OpenCurl) => {
                self.cursor = Some(Expr::Object(Vec::new()));
                self.state = State::ExpectObjKey;
            }
            (State::ExpectOperand, OpenBracket) => {
                self.cursor = Some(Expr::Array(Vec::new()));
                self.state = State::ArrayVal;
            }
            (State::ExpectOperand, Dot) => {
                self.handle_dot();
                self.state = State::Traverse;
            }
            (State::ExpectOperand, TemplateString(parts)) => {
                let template = self.build_template(parts)?;
                self.cursor = Some(template);
                self.state = State::ExpectBinOp;
            }

            // ---- after a complete operand ----
            (State::ExpectBinOp, BinaryOp(op)) => {
                self.handle_binary_op(op)?;
                self.state = State::ExpectOperand;
            }
            (State::ExpectBinOp, Pipe) => {
                self.state = State::ExpectTransform;
            }
            (State::ExpectBinOp, Dot) => {
                self.handle_dot();
                self.state = State::Traverse;
            }
            (State::ExpectBinOp, OpenBracket) => {
                self.state = State::Filter;
            }
            (State::ExpectBinOp, Question) => {
                self.handle_question()?;
                self.state = State::TernaryMid;
            }
            (State::ExpectBinOp, Semicolon) if !self.is_sub => {
                self.handle_semicolon()?;
                self.state = State::ExpectOperand;
            }

            // ---- after an identifier chain ----
            (State::Identifier, BinaryOp(op)) => {
                self.handle_binary_op(op)?;
                self.state = State::ExpectOperand;
            }
            (State::Identifier, Dot) => {
                self.handle_dot();
                self.state = State::Traverse;
            }
            (State::Identifier, OpenBracket) => {
                self.state = State::Filter;
            }
            (State::Identifier, OpenParen) => {
                self.handle_function_call()?;
                self.state = State::ArgVal;
            }
            (State::Identifier, Pipe) => {
                self.state = State::ExpectTransform;
            }
            (State::Identifier, Question) => {
                self.handle_question()?;
                self.state = State::TernaryMid;
            }
            (State::Identifier, Semicolon) if !self.is_sub => {
                self.handle_semicolon()?;
                self.state = State::ExpectOperand;
            }

            (State::Traverse, Identifier(name)) => {
                self.handle_identifier(name);
                self.state = State::Identifier;
            }

            // ---- object literal keys ----
            (State::ExpectObjKey, Identifier(name)) => {
                self.pending_obj_key = Some(name);
                self.state = State::ExpectKeyValSep;
            }
            (State::ExpectObjKey, Literal(value)) => {
                self.pending_obj_key = Some(match value {
                    crate::value::Value::String(s) => s,
                    other => other.to_display_string(),
                });
                self.state = State::ExpectKeyValSep;
            }
            (State::ExpectObjKey, CloseCurl) => {
                self.state = State::ExpectBinOp;
            }
            (State::ExpectKeyValSep, Colon) => {
                self.state = State::ObjVal;
            }

            // ---- transform pipe ----
            (State::ExpectTransform, Identifier(name)) => {
                self.handle_transform(name)?;
                self.state = State::PostTransform;
            }
            (State::PostTransform, OpenParen) => {
                self.state = State::ArgVal;
            }
            (State::PostTransform, BinaryOp(op)) => {
                self.handle_binary_op(op)?;
                self.state = State::ExpectOperand;
            }
            (State::PostTransform, Dot) => {
                self.handle_dot();
                self.state = State::Traverse;
            }
            (State::PostTransform, OpenBracket) => {
                self.state = State::Filter;
            }
            (State::PostTransform, Pipe) => {
                self.state = State::ExpectTransform;
            }
            (State::PostTransform, Question) => {
                self.handle_question()?;
                self.state = State::TernaryMid;
            }
            (State::PostTransform, Semicolon) if !self.is_sub => {
                self.handle_semicolon()?;
                self.state = State::ExpectOperand;
            }

            // ---- after call arguments closed ----
            (State::PostArgs, BinaryOp(op)) => {
                self.handle_binary_op(op)?;
                self.state = State::ExpectOperand;
            }
            (State::PostArgs, Dot) => {
                self.handle_dot();
                self.state = State::Traverse;
            }
            (State::PostArgs, OpenBracket) => {
                self.state = State::Filter;
            }
            (State::PostArgs, Pipe) => {
                self.state = State::ExpectTransform;
            }
            (State::PostArgs, Question) => {
                self.handle_question()?;
                self.state = State::TernaryMid;
            }
            (State::PostArgs, Semicolon) if !self.is_sub => {
                self.handle_semicolon()?;
                self.state = State::ExpectOperand;
            }

            (_, kind) => {
                if let Some(stop) = stop_token_of(&kind) {
                    if let Some(next) = self.stop_state(stop) {
                        return Ok(Some(next));
                    }
                }
                return Err(Error::UnexpectedToken(raw.trim().to_string()));
            }
        }
        Ok(None)
    }

    // ---- handlers ----

    fn handle_identifier(&mut self, name: String) {
        if self.next_ident_encapsulate {
            self.next_ident_encapsulate = false;
            let from = self.cursor.take().map(Box::new);
            self.cursor = Some(Expr::Identifier {
                name,
                from,
                relative: false,
            });
        } else {
            let relative = mem::take(&mut self.next_ident_relative);
            self.cursor = Some(Expr::Identifier {
                name,
                from: None,
                relative,
            });
        }
    }

    /// A dot either chains the next identifier onto the current operand
    /// or, with nothing to chain onto, marks it relative to the filter's
    /// current element.
    fn handle_dot(&mut self) {
        self.next_ident_encapsulate = self.cursor.is_some();
        self.next_ident_relative = !self.next_ident_encapsulate;
        if self.next_ident_relative {
            self.relative = true;
        }
    }

    fn handle_binary_op(&mut self, op: String) -> Result<(), Error> {
        if op == "=" {
            match self.cursor {
                Some(Expr::Identifier {
                    ref name,
                    from: None,
                    relative: false,
                }) => {
                    let target = name.clone();
                    self.cursor = None;
                    self.stack.push(Frame::Assign { target });
                    return Ok(());
                }
                _ => return Err(Error::AssignmentTarget),
            }
        }
        let precedence = self.grammar.binary_precedence(&op).unwrap_or(0);
        self.fold_operators(precedence)?;
        let left = self.take_cursor("operand")?;
        self.stack.push(Frame::Binary {
            op,
            precedence,
            left,
        });
        Ok(())
    }

    fn handle_question(&mut self) -> Result<(), Error> {
        // everything built so far becomes the condition
        self.fold_operators(0)?;
        let test = self.take_cursor("ternary condition")?;
        self.stack.push(Frame::Ternary {
            test,
            consequent: None,
        });
        Ok(())
    }

    fn handle_semicolon(&mut self) -> Result<(), Error> {
        let tree = self.fold_tree()?;
        self.expressions.push(tree);
        self.next_ident_encapsulate = false;
        self.next_ident_relative = false;
        Ok(())
    }

    fn handle_function_call(&mut self) -> Result<(), Error> {
        match self.cursor {
            Some(Expr::Identifier {
                ref name,
                from: None,
                relative: false,
            }) => {
                let name = name.clone();
                self.cursor = Some(Expr::Call {
                    pool: Pool::Functions,
                    name,
                    args: Vec::new(),
                });
                Ok(())
            }
            _ => Err(Error::UnexpectedToken("(".to_string())),
        }
    }

    fn handle_transform(&mut self, name: String) -> Result<(), Error> {
        let subject = self.take_cursor("transform subject")?;
        self.cursor = Some(Expr::Call {
            pool: Pool::Transforms,
            name,
            args: vec![subject],
        });
        Ok(())
    }

    fn build_template(&self, parts: Vec<TemplatePart>) -> Result<Expr, Error> {
        let mut elements = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                TemplatePart::Static(text) => elements.push(TemplateElement::Text(text)),
                TemplatePart::Interpolation(src) => {
                    elements.push(TemplateElement::Expr(parse(self.grammar, &src)?));
                }
            }
        }
        Ok(Expr::Template(elements))
    }

    // ---- tree assembly ----

    fn take_cursor(&mut self, what: &'static str) -> Result<Expr, Error> {
        self.cursor.take().ok_or(Error::IncompleteExpression(what))
    }

    /// Fold operator frames whose precedence is at least `precedence`
    /// into the cursor. Unary frames always fold; assignment and ternary
    /// frames never do.
    fn fold_operators(&mut self, precedence: u8) -> Result<(), Error> {
        loop {
            let fold = match self.stack.last() {
                Some(Frame::Unary { .. }) => true,
                Some(Frame::Binary { precedence: p, .. }) => *p >= precedence,
                _ => false,
            };
            if !fold {
                return Ok(());
            }
            if let Some(frame) = self.stack.pop() {
                let right = self.take_cursor("operand")?;
                self.cursor = Some(frame.close(right)?);
            }
        }
    }

    /// Collapse the cursor and every pending frame into one tree.
    fn fold_tree(&mut self) -> Result<Expr, Error> {
        let mut node = self.take_cursor("expression")?;
        while let Some(frame) = self.stack.pop() {
            node = frame.close(node)?;
        }
        Ok(node)
    }

    // ---- nested parsing ----

    fn start_sub(&mut self) {
        let (stops, parent_stop) = match end_states(self.state) {
            Some(stops) => (stops, false),
            // the ternary alternate runs to whatever ends the enclosing
            // expression, so it inherits this parser's stop tokens
            None => (self.stops.clone(), true),
        };
        self.parent_stop = parent_stop;
        self.sub = Some(Box::new(Parser::new_sub(self.grammar, stops)));
    }

    fn end_sub(&mut self) -> Result<(), Error> {
        let Some(mut sub) = self.sub.take() else {
            return Ok(());
        };
        let ast = sub.complete_tree()?;
        let sub_relative = sub.relative;
        if sub_relative && self.state != State::Filter {
            // relativity inside grouping, arguments, branches, or
            // collection members still marks the enclosing filter body
            self.relative = true;
        }
        match self.state {
            State::SubExpression => {
                let inner = ast.ok_or(Error::IncompleteExpression("expression after ("))?;
                self.cursor = Some(inner);
            }
            State::Filter => {
                let expr = ast.ok_or(Error::IncompleteExpression("filter expression"))?;
                let subject = self.take_cursor("filter subject")?;
                self.cursor = Some(Expr::Filter {
                    subject: Box::new(subject),
                    expr: Box::new(expr),
                    relative: sub_relative,
                });
            }
            State::ArgVal => {
                if let Some(arg) = ast {
                    match self.cursor {
                        Some(Expr::Call { ref mut args, .. }) => args.push(arg),
                        _ => return Err(Error::IncompleteExpression("function call")),
                    }
                }
            }
            State::ObjVal => {
                let value = ast.ok_or(Error::IncompleteExpression("object value"))?;
                let key = self
                    .pending_obj_key
                    .take()
                    .ok_or(Error::IncompleteExpression("object key"))?;
                match self.cursor {
                    Some(Expr::Object(ref mut entries)) => entries.push((key, value)),
                    _ => return Err(Error::IncompleteExpression("object literal")),
                }
            }
            State::ArrayVal => {
                if let Some(element) = ast {
                    match self.cursor {
                        Some(Expr::Array(ref mut elements)) => elements.push(element),
                        _ => return Err(Error::IncompleteExpression("array literal")),
                    }
                }
            }
            State::TernaryMid => match self.stack.last_mut() {
                // an absent consequent is the elvis form
                Some(Frame::Ternary { consequent, .. }) => *consequent = ast,
                _ => return Err(Error::IncompleteExpression("ternary branch")),
            },
            State::TernaryEnd => {
                let alternate = ast.ok_or(Error::IncompleteExpression("ternary alternate"))?;
                match self.stack.pop() {
                    Some(Frame::Ternary { test, consequent }) => {
                        self.cursor = Some(Expr::Conditional {
                            test: Box::new(test),
                            consequent: consequent.map(Box::new),
                            alternate: Box::new(alternate),
                        });
                    }
                    _ => return Err(Error::IncompleteExpression("ternary branch")),
                }
            }
            _ => return Err(Error::IncompleteExpression("expression")),
        }
        Ok(())
    }

    /// Finish this parser's own tree (sequence members excluded); `None`
    /// when no tokens produced content, which the delimiter handlers use
    /// for empty argument lists, arrays, and elvis consequents.
    fn complete_tree(&mut self) -> Result<Option<Expr>, Error> {
        if uses_sub_parser(self.state) {
            if self.state != State::TernaryEnd {
                return Err(Error::IncompleteExpression(missing_part(self.state)));
            }
            if self.sub.is_some() {
                self.end_sub()?;
            } else if matches!(self.stack.last(), Some(Frame::Ternary { .. })) {
                // ':' was the last token; no alternate ever arrived. With
                // no ternary frame left the alternate already completed
                // through an inherited stop token.
                return Err(Error::IncompleteExpression(missing_part(self.state)));
            }
        }
        let has_content = self.cursor.is_some() || !self.stack.is_empty();
        if has_content && !completable(self.state) {
            return Err(Error::IncompleteExpression(missing_part(self.state)));
        }
        self.state = State::Complete;
        if !has_content {
            return Ok(None);
        }
        self.fold_tree().map(Some)
    }

    fn stop_state(&self, stop: StopToken) -> Option<State> {
        self.stops
            .iter()
            .find(|(s, _)| *s == stop)
            .map(|(_, next)| *next)
    }
}

fn uses_sub_parser(state: State) -> bool {
    matches!(
        state,
        State::SubExpression
            | State::Filter
            | State::ArgVal
            | State::ObjVal
            | State::ArrayVal
            | State::TernaryMid
            | State::TernaryEnd
    )
}

/// The stop tokens that end a nested parse begun in this state, and the
/// state the outer parser resumes in. `None` means the nested parse has
/// no delimiter of its own (the ternary alternate) and inherits.
fn end_states(state: State) -> Option<Vec<(StopToken, State)>> {
    match state {
        State::SubExpression => Some(vec![(StopToken::CloseParen, State::ExpectBinOp)]),
        State::Filter => Some(vec![(StopToken::CloseBracket, State::Identifier)]),
        State::ArgVal => Some(vec![
            (StopToken::Comma, State::ArgVal),
            (StopToken::CloseParen, State::PostArgs),
        ]),
        State::ObjVal => Some(vec![
            (StopToken::Comma, State::ExpectObjKey),
            (StopToken::CloseCurl, State::ExpectBinOp),
        ]),
        State::ArrayVal => Some(vec![
            (StopToken::Comma, State::ArrayVal),
            (StopToken::CloseBracket, State::ExpectBinOp),
        ]),
        State::TernaryMid => Some(vec![(StopToken::Colon, State::TernaryEnd)]),
        _ => None,
    }
}

fn completable(state: State) -> bool {
    matches!(
        state,
        State::ExpectBinOp
            | State::Identifier
            | State::PostArgs
            | State::PostTransform
            | State::TernaryEnd
            | State::Complete
    )
}

fn missing_part(state: State) -> &'static str {
    match state {
        State::SubExpression | State::ArgVal => "closing )",
        State::Filter | State::ArrayVal => "closing ]",
        State::ObjVal | State::ExpectObjKey | State::ExpectKeyValSep => "closing }",
        State::TernaryMid => "ternary branch",
        State::TernaryEnd => "ternary alternate",
        State::ExpectOperand | State::Traverse => "operand",
        State::ExpectTransform => "transform name",
        _ => "expression",
    }
}

fn stop_token_of(kind: &TokenKind) -> Option<StopToken> {
    match kind {
        TokenKind::CloseParen => Some(StopToken::CloseParen),
        TokenKind::CloseBracket => Some(StopToken::CloseBracket),
        TokenKind::CloseCurl => Some(StopToken::CloseCurl),
        TokenKind::Comma => Some(StopToken::Comma),
        TokenKind::Colon => Some(StopToken::Colon),
        _ => None,
    }
}
