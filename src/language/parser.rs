use crate::language::{
    errors::{SyntaxError, SyntaxErrors},
    lexer::lex,
    span::{LineIndex, Position, Span},
    token::{Token, TokenKind},
};
use crate::runtime::node::{
    AccessorNode, DeclNode, EnumDeclNode, FieldDecl, ForNode, FuncCallNode, FuncNode, IfBlockNode,
    IfNode, ImportNode, ListNode, Node, NodeKind, NodeRef, ObjectNode, OpNode, Operator, Param,
    TryCatchNode, TypeBody, TypeDeclNode, WhileNode,
};

/// Parses a whole source file into top-level statement nodes.
pub fn parse_program(source: &str) -> Result<Vec<NodeRef>, SyntaxErrors> {
    let tokens = match lex(source) {
        Ok(tokens) => tokens,
        Err(errors) => {
            let errs = errors
                .into_iter()
                .map(|err| SyntaxError::new(err.message, err.span))
                .collect();
            return Err(SyntaxErrors::new(errs));
        }
    };
    Parser::new(source, tokens).parse()
}

struct Parser {
    lines: LineIndex,
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<SyntaxError>,
    suppress_block_literal: bool,
}

impl Parser {
    fn new(source: &str, tokens: Vec<Token>) -> Self {
        Self {
            lines: LineIndex::new(source),
            tokens,
            pos: 0,
            errors: Vec::new(),
            suppress_block_literal: false,
        }
    }

    fn parse(mut self) -> Result<Vec<NodeRef>, SyntaxErrors> {
        let mut statements = Vec::new();
        while !self.is_eof() {
            if self.matches(TokenKind::Semi) {
                continue;
            }
            match self.parse_statement() {
                Ok(statement) => statements.push(statement),
                Err(err) => {
                    self.report(err);
                    self.synchronize_statement();
                }
            }
        }
        if self.errors.is_empty() {
            Ok(statements)
        } else {
            Err(SyntaxErrors::new(self.errors))
        }
    }

    fn parse_statement(&mut self) -> Result<NodeRef, SyntaxError> {
        let start = self.current_span_start();
        let statement = match self.peek_kind() {
            Some(TokenKind::Var) => {
                self.advance();
                self.parse_declaration(start, false)?
            }
            Some(TokenKind::Const) => {
                self.advance();
                self.parse_declaration(start, true)?
            }
            Some(TokenKind::Fn) if matches!(self.peek_kind_n(1), Some(TokenKind::Identifier(_))) => {
                self.advance();
                self.parse_named_function(start)?
            }
            Some(TokenKind::Type) if !matches!(self.peek_kind_n(1), Some(TokenKind::LParen)) => {
                self.advance();
                self.parse_type_decl(start)?
            }
            Some(TokenKind::Enum) => {
                self.advance();
                self.parse_enum(start)?
            }
            Some(TokenKind::Import) if !matches!(self.peek_kind_n(1), Some(TokenKind::LParen)) => {
                self.advance();
                self.parse_import(start)?
            }
            Some(TokenKind::Return) => {
                self.advance();
                let value = if self.at_statement_end() {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.node(NodeKind::Return(value), start)
            }
            Some(TokenKind::Break) => {
                self.advance();
                self.node(NodeKind::Break, start)
            }
            Some(TokenKind::Continue) => {
                self.advance();
                self.node(NodeKind::Continue, start)
            }
            Some(TokenKind::While) => {
                self.advance();
                self.parse_while(start)?
            }
            Some(TokenKind::For) => {
                self.advance();
                self.parse_for(start)?
            }
            Some(TokenKind::Try) => {
                self.advance();
                self.parse_try(start)?
            }
            Some(TokenKind::LBrace) => self.parse_block()?,
            _ => self.parse_expression()?,
        };
        self.consume_optional(TokenKind::Semi);
        Ok(statement)
    }

    fn parse_declaration(&mut self, start: usize, constant: bool) -> Result<NodeRef, SyntaxError> {
        let name = self.expect_identifier("Expected a name after declaration keyword")?;
        let ty = if self.matches(TokenKind::Colon) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };
        let value = if self.matches(TokenKind::Eq) {
            Some(self.parse_expression()?)
        } else if constant {
            return Err(self
                .error_here("Constants need an initial value")
                .with_help(format!("write `const {name} = <value>`")));
        } else {
            None
        };
        if let Some(value) = &value {
            name_function(value, &name);
        }
        let decl = DeclNode { name, ty, value };
        let kind = if constant {
            NodeKind::ConstantDecl(decl)
        } else {
            NodeKind::VariableDecl(decl)
        };
        Ok(self.node(kind, start))
    }

    /// `fn name(params) (: Ret)? => expr | { ... }`, sugar for a constant.
    fn parse_named_function(&mut self, start: usize) -> Result<NodeRef, SyntaxError> {
        let name = self.expect_identifier("Expected function name")?;
        let func_start = self.current_span_start();
        self.expect(TokenKind::LParen)?;
        let params = self.parse_params()?;
        let func = self.parse_lambda_tail(func_start, params, true)?;
        name_function(&func, &name);
        Ok(self.node(
            NodeKind::ConstantDecl(DeclNode {
                name,
                ty: None,
                value: Some(func),
            }),
            start,
        ))
    }

    fn parse_type_decl(&mut self, start: usize) -> Result<NodeRef, SyntaxError> {
        let name = self.expect_identifier("Expected type name")?;
        let body = if self.check(TokenKind::LBrace) {
            TypeBody::Fields(self.parse_type_fields()?)
        } else if self.check(TokenKind::LParen) {
            let func_start = self.current_span_start();
            self.advance();
            let params = self.parse_params()?;
            if self.matches(TokenKind::FatArrow) {
                let body = self.parse_lambda_body()?;
                let func = self.function_node(func_start, &name, params, Some(body), None);
                TypeBody::Refinement(func)
            } else if self.matches(TokenKind::Eq) {
                let body = self.parse_expression()?;
                let func = self.function_node(func_start, &name, params, Some(body), None);
                TypeBody::Function(func)
            } else {
                return Err(self
                    .error_here("Expected `=>` or `=` after type parameters")
                    .with_help("use `=>` for a refinement predicate, `=` for a type function"));
            }
        } else if self.matches(TokenKind::Eq) {
            TypeBody::Alias(self.parse_type_expr()?)
        } else {
            return Err(self.error_here("Expected `{`, `(` or `=` after type name"));
        };
        Ok(self.node(NodeKind::TypeDecl(TypeDeclNode { name, body }), start))
    }

    fn parse_type_fields(&mut self) -> Result<Vec<FieldDecl>, SyntaxError> {
        self.expect(TokenKind::LBrace)?;
        let mut fields = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_eof() {
            if self.matches(TokenKind::Comma) || self.matches(TokenKind::Semi) {
                continue;
            }
            let name = self.expect_property_name("Expected field name")?;
            self.expect(TokenKind::Colon)?;
            let ty = self.parse_type_expr()?;
            let default = if self.matches(TokenKind::Eq) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            fields.push(FieldDecl { name, ty, default });
        }
        self.expect(TokenKind::RBrace)?;
        Ok(fields)
    }

    fn parse_enum(&mut self, start: usize) -> Result<NodeRef, SyntaxError> {
        let name = self.expect_identifier("Expected enum name")?;
        self.expect(TokenKind::LBrace)?;
        let mut variants = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_eof() {
            if self.matches(TokenKind::Comma) || self.matches(TokenKind::Semi) {
                continue;
            }
            variants.push(self.expect_identifier("Expected enum variant")?);
        }
        self.expect(TokenKind::RBrace)?;
        if variants.is_empty() {
            return Err(SyntaxError::new(
                format!("Enum `{name}` needs at least one variant"),
                Span::new(start, self.current_span_start()),
            ));
        }
        Ok(self.node(NodeKind::EnumDecl(EnumDeclNode { name, variants }), start))
    }

    fn parse_import(&mut self, start: usize) -> Result<NodeRef, SyntaxError> {
        let path = self.expect_string_literal("Expected import path string")?;
        let alias = if self.matches(TokenKind::As) {
            Some(self.expect_identifier("Expected alias after 'as'")?)
        } else {
            None
        };
        Ok(self.node(NodeKind::Import(ImportNode { path, alias }), start))
    }

    fn parse_while(&mut self, start: usize) -> Result<NodeRef, SyntaxError> {
        let cond = self.parse_condition()?;
        let body = self.parse_block()?;
        Ok(self.node(NodeKind::WhileLoop(WhileNode { cond, body }), start))
    }

    fn parse_for(&mut self, start: usize) -> Result<NodeRef, SyntaxError> {
        let item = self.expect_identifier("Expected loop variable")?;
        let mut index = None;
        let mut list = None;
        if self.matches(TokenKind::Comma) {
            index = Some(self.expect_identifier("Expected index variable")?);
            if self.matches(TokenKind::Comma) {
                list = Some(self.expect_identifier("Expected list variable")?);
            }
        }
        self.expect(TokenKind::In)?;
        let iterable = self.parse_condition()?;
        let body = self.parse_block()?;
        Ok(self.node(
            NodeKind::ForLoop(ForNode {
                item,
                index,
                list,
                iterable,
                body,
            }),
            start,
        ))
    }

    fn parse_try(&mut self, start: usize) -> Result<NodeRef, SyntaxError> {
        let body = self.parse_block()?;
        self.expect(TokenKind::Catch)?;
        let binding = if self.matches(TokenKind::LParen) {
            let name = self.expect_identifier("Expected error binding")?;
            self.expect(TokenKind::RParen)?;
            Some(name)
        } else if let Some(TokenKind::Identifier(name)) = self.peek_kind() {
            self.advance();
            Some(name)
        } else {
            None
        };
        let handler = self.parse_block()?;
        Ok(self.node(
            NodeKind::TryCatch(TryCatchNode {
                body,
                binding,
                handler,
            }),
            start,
        ))
    }

    fn parse_if(&mut self, start: usize) -> Result<NodeRef, SyntaxError> {
        let mut branches = Vec::new();
        let mut otherwise = None;
        let mut branch_start = start;
        loop {
            let cond = self.parse_condition()?;
            let body = self.parse_block()?;
            branches.push(self.node(NodeKind::IfStatement(IfNode { cond, body }), branch_start));
            if !self.matches(TokenKind::Else) {
                break;
            }
            branch_start = self.current_span_start();
            if self.matches(TokenKind::If) {
                continue;
            }
            otherwise = Some(self.parse_block()?);
            break;
        }
        Ok(self.node(NodeKind::IfBlock(IfBlockNode { branches, otherwise }), start))
    }

    /// An expression directly followed by a block, so `X {` is not an
    /// instantiation.
    fn parse_condition(&mut self) -> Result<NodeRef, SyntaxError> {
        let previous = self.suppress_block_literal;
        self.suppress_block_literal = true;
        let result = self.parse_expression();
        self.suppress_block_literal = previous;
        result
    }

    fn parse_block(&mut self) -> Result<NodeRef, SyntaxError> {
        let start = self.current_span_start();
        self.expect(TokenKind::LBrace)?;
        let previous = self.suppress_block_literal;
        self.suppress_block_literal = false;
        let mut statements = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_eof() {
            if self.matches(TokenKind::Semi) {
                continue;
            }
            match self.parse_statement() {
                Ok(statement) => statements.push(statement),
                Err(err) => {
                    self.suppress_block_literal = previous;
                    return Err(err);
                }
            }
        }
        self.suppress_block_literal = previous;
        self.expect(TokenKind::RBrace)?;
        Ok(self.node(NodeKind::Block(statements), start))
    }

    fn parse_expression(&mut self) -> Result<NodeRef, SyntaxError> {
        stacker::maybe_grow(64 * 1024, 1024 * 1024, || self.parse_assignment())
    }

    /// Type annotations are ordinary expressions parsed above `||`/`&&`, so
    /// a following `=` or `=>` ends them.
    fn parse_type_expr(&mut self) -> Result<NodeRef, SyntaxError> {
        let previous = self.suppress_block_literal;
        self.suppress_block_literal = true;
        let result = stacker::maybe_grow(64 * 1024, 1024 * 1024, || self.parse_union());
        self.suppress_block_literal = previous;
        result
    }

    fn parse_assignment(&mut self) -> Result<NodeRef, SyntaxError> {
        let start = self.current_span_start();
        let target = self.parse_or()?;
        let compound = match self.peek_kind() {
            Some(TokenKind::Eq) => None,
            Some(TokenKind::PlusEq) => Some(Operator::Add),
            Some(TokenKind::MinusEq) => Some(Operator::Sub),
            Some(TokenKind::StarEq) => Some(Operator::Mul),
            Some(TokenKind::SlashEq) => Some(Operator::Div),
            _ => return Ok(target),
        };
        if !is_assignable(&target) {
            return Err(self
                .error_here("Invalid assignment target")
                .with_help("assign to a name, a `.property` or an `[index]`"));
        }
        self.advance();
        let value = self.parse_assignment()?;
        let value = match compound {
            Some(op) => self.node(
                NodeKind::Op(OpNode {
                    op,
                    left: Some(target.clone()),
                    right: value,
                }),
                start,
            ),
            None => value,
        };
        Ok(self.binary(Operator::Assign, target, value, start))
    }

    fn parse_or(&mut self) -> Result<NodeRef, SyntaxError> {
        let start = self.current_span_start();
        let mut left = self.parse_and()?;
        while self.matches(TokenKind::PipePipe) {
            let right = self.parse_and()?;
            left = self.binary(Operator::Or, left, right, start);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<NodeRef, SyntaxError> {
        let start = self.current_span_start();
        let mut left = self.parse_equality()?;
        while self.matches(TokenKind::AmpersandAmpersand) {
            let right = self.parse_equality()?;
            left = self.binary(Operator::And, left, right, start);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<NodeRef, SyntaxError> {
        let start = self.current_span_start();
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::EqEq) => Operator::Eq,
                Some(TokenKind::BangEq) => Operator::Ne,
                _ => break,
            };
            self.advance();
            let right = self.parse_comparison()?;
            left = self.binary(op, left, right, start);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<NodeRef, SyntaxError> {
        let start = self.current_span_start();
        let mut left = self.parse_union()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Lt) => Operator::Lt,
                Some(TokenKind::LtEq) => Operator::Le,
                Some(TokenKind::Gt) => Operator::Gt,
                Some(TokenKind::GtEq) => Operator::Ge,
                Some(TokenKind::Is) => Operator::Is,
                _ => break,
            };
            self.advance();
            let right = self.parse_union()?;
            left = self.binary(op, left, right, start);
        }
        Ok(left)
    }

    fn parse_union(&mut self) -> Result<NodeRef, SyntaxError> {
        let start = self.current_span_start();
        let mut left = self.parse_range()?;
        while self.matches(TokenKind::Pipe) {
            let right = self.parse_range()?;
            left = self.binary(Operator::Union, left, right, start);
        }
        Ok(left)
    }

    fn parse_range(&mut self) -> Result<NodeRef, SyntaxError> {
        let start = self.current_span_start();
        let left = self.parse_additive()?;
        if self.matches(TokenKind::DotDot) {
            let right = self.parse_additive()?;
            return Ok(self.binary(Operator::Range, left, right, start));
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<NodeRef, SyntaxError> {
        let start = self.current_span_start();
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => Operator::Add,
                Some(TokenKind::Minus) => Operator::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = self.binary(op, left, right, start);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<NodeRef, SyntaxError> {
        let start = self.current_span_start();
        let mut left = self.parse_power()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => Operator::Mul,
                Some(TokenKind::Slash) => Operator::Div,
                Some(TokenKind::Percent) => Operator::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_power()?;
            left = self.binary(op, left, right, start);
        }
        Ok(left)
    }

    fn parse_power(&mut self) -> Result<NodeRef, SyntaxError> {
        let start = self.current_span_start();
        let base = self.parse_unary()?;
        if self.matches(TokenKind::Caret) {
            let exponent = self.parse_power()?;
            return Ok(self.binary(Operator::Pow, base, exponent, start));
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> Result<NodeRef, SyntaxError> {
        let start = self.current_span_start();
        let op = match self.peek_kind() {
            Some(TokenKind::Minus) => Operator::Neg,
            Some(TokenKind::Bang) => Operator::Not,
            Some(TokenKind::Ampersand) => Operator::Ref,
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        Ok(self.node(
            NodeKind::Op(OpNode {
                op,
                left: None,
                right: operand,
            }),
            start,
        ))
    }

    fn parse_postfix(&mut self) -> Result<NodeRef, SyntaxError> {
        let start = self.current_span_start();
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                Some(TokenKind::LParen) => {
                    self.advance();
                    let args = self.parse_arguments()?;
                    expr = self.node(NodeKind::FuncCall(FuncCallNode { callee: expr, args }), start);
                }
                Some(TokenKind::Dot) => {
                    self.advance();
                    let name_start = self.current_span_start();
                    let name = self.expect_property_name("Expected property name after '.'")?;
                    let property = self.node(NodeKind::Id(name), name_start);
                    expr = self.binary(Operator::Dot, expr, property, start);
                }
                Some(TokenKind::LBracket) => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(TokenKind::RBracket)?;
                    expr = self.node(NodeKind::Accessor(AccessorNode { target: expr, index }), start);
                }
                Some(TokenKind::ColonColon) => {
                    self.advance();
                    let hook_start = self.current_span_start();
                    let name = self.expect_identifier("Expected hook name after '::'")?;
                    let callee = self.node(NodeKind::Id(name), hook_start);
                    let args = if self.matches(TokenKind::LParen) {
                        self.parse_arguments()?
                    } else {
                        Vec::new()
                    };
                    let call = self.node(NodeKind::FuncCall(FuncCallNode { callee, args }), hook_start);
                    expr = self.binary(Operator::Meta, expr, call, start);
                }
                Some(TokenKind::LBrace)
                    if !self.suppress_block_literal
                        && is_type_reference(&expr)
                        && self.looks_like_object_literal() =>
                {
                    let object = self.parse_object_literal()?;
                    if let NodeKind::Object(inner) = &mut object.borrow_mut().kind {
                        inner.instance_of = Some(expr.clone());
                    }
                    object.borrow_mut().pos = self.position(start);
                    expr = object;
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_arguments(&mut self) -> Result<Vec<NodeRef>, SyntaxError> {
        let previous = self.suppress_block_literal;
        self.suppress_block_literal = false;
        let mut args = Vec::new();
        let result = loop {
            if self.matches(TokenKind::RParen) {
                break Ok(());
            }
            match self.parse_expression() {
                Ok(arg) => args.push(arg),
                Err(err) => break Err(err),
            }
            if !self.matches(TokenKind::Comma) {
                break self.expect(TokenKind::RParen).map(|_| ());
            }
        };
        self.suppress_block_literal = previous;
        result.map(|_| args)
    }

    fn parse_primary(&mut self) -> Result<NodeRef, SyntaxError> {
        let start = self.current_span_start();
        match self.peek_kind() {
            Some(TokenKind::Number(value)) => {
                self.advance();
                Ok(self.node(NodeKind::Number(value), start))
            }
            Some(TokenKind::String(value)) => {
                self.advance();
                Ok(self.node(NodeKind::String(value), start))
            }
            Some(TokenKind::True) => {
                self.advance();
                Ok(self.node(NodeKind::Boolean(true), start))
            }
            Some(TokenKind::False) => {
                self.advance();
                Ok(self.node(NodeKind::Boolean(false), start))
            }
            Some(TokenKind::Identifier(name)) => {
                self.advance();
                Ok(self.node(NodeKind::Id(name), start))
            }
            Some(TokenKind::Import) => {
                self.advance();
                Ok(self.node(NodeKind::Id("import".into()), start))
            }
            // `type(x)` is the builtin; declarations never have `(` after the keyword.
            Some(TokenKind::Type) if matches!(self.peek_kind_n(1), Some(TokenKind::LParen)) => {
                self.advance();
                Ok(self.node(NodeKind::Id("type".into()), start))
            }
            Some(TokenKind::LParen) => {
                if self.is_lambda_ahead() {
                    self.advance();
                    let params = self.parse_params()?;
                    return self.parse_lambda_tail(start, params, false);
                }
                self.advance();
                let previous = self.suppress_block_literal;
                self.suppress_block_literal = false;
                let inner = self.parse_expression();
                self.suppress_block_literal = previous;
                let inner = inner?;
                self.expect(TokenKind::RParen)?;
                Ok(self.node(NodeKind::Paren(inner), start))
            }
            Some(TokenKind::LBracket) => self.parse_list_literal(),
            Some(TokenKind::LBrace) => self.parse_object_literal(),
            Some(TokenKind::Fn) => {
                self.advance();
                if let Some(TokenKind::Identifier(name)) = self.peek_kind() {
                    self.advance();
                    self.expect(TokenKind::LParen)?;
                    let params = self.parse_params()?;
                    let func = self.parse_lambda_tail(start, params, true)?;
                    name_function(&func, &name);
                    return Ok(func);
                }
                self.expect(TokenKind::LParen)?;
                self.parse_fn_expression(start)
            }
            Some(TokenKind::If) => {
                self.advance();
                self.parse_if(start)
            }
            Some(other) => Err(self
                .error_here(&format!("Unexpected {}", other.describe()))
                .with_label("expected an expression")),
            None => Err(self.error_here("Unexpected end of input")),
        }
    }

    fn parse_list_literal(&mut self) -> Result<NodeRef, SyntaxError> {
        let start = self.current_span_start();
        self.expect(TokenKind::LBracket)?;
        let previous = self.suppress_block_literal;
        self.suppress_block_literal = false;
        let mut elements = Vec::new();
        let result = loop {
            if self.matches(TokenKind::RBracket) {
                break Ok(());
            }
            match self.parse_expression() {
                Ok(element) => elements.push(element),
                Err(err) => break Err(err),
            }
            if !self.matches(TokenKind::Comma) {
                break self.expect(TokenKind::RBracket).map(|_| ());
            }
        };
        self.suppress_block_literal = previous;
        result?;
        Ok(self.node(
            NodeKind::List(ListNode {
                elements,
                is_union: false,
            }),
            start,
        ))
    }

    fn parse_object_literal(&mut self) -> Result<NodeRef, SyntaxError> {
        let start = self.current_span_start();
        self.expect(TokenKind::LBrace)?;
        let previous = self.suppress_block_literal;
        self.suppress_block_literal = false;
        let mut object = ObjectNode::default();
        let result = loop {
            if self.matches(TokenKind::RBrace) {
                break Ok(());
            }
            if self.matches(TokenKind::Comma) || self.matches(TokenKind::Semi) {
                continue;
            }
            let key = match self.expect_property_name("Expected property name") {
                Ok(key) => key,
                Err(err) => break Err(err),
            };
            if let Err(err) = self.expect(TokenKind::Colon) {
                break Err(err);
            }
            match self.parse_expression() {
                Ok(value) => {
                    name_function(&value, &key);
                    object.insert(key, value);
                }
                Err(err) => break Err(err),
            }
        };
        self.suppress_block_literal = previous;
        result?;
        Ok(self.node(NodeKind::Object(object), start))
    }

    /// After `fn(`: a function type `fn(T) -> R` or an anonymous function.
    fn parse_fn_expression(&mut self, start: usize) -> Result<NodeRef, SyntaxError> {
        let checkpoint = self.pos;
        if let Ok(params) = self.parse_params() {
            if matches!(
                self.peek_kind(),
                Some(TokenKind::FatArrow | TokenKind::LBrace | TokenKind::Colon)
            ) {
                return self.parse_lambda_tail(start, params, true);
            }
        }
        self.pos = checkpoint;
        let mut params = Vec::new();
        let mut index = 0;
        while !self.check(TokenKind::RParen) && !self.is_eof() {
            let ty = self.parse_type_expr()?;
            params.push(Param {
                name: format!("_{index}"),
                ty: Some(ty),
                default: None,
            });
            index += 1;
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        let return_type = if self.matches(TokenKind::Arrow) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };
        Ok(self.node(
            NodeKind::Func(FuncNode {
                params,
                return_type,
                is_signature: true,
                ..FuncNode::default()
            }),
            start,
        ))
    }

    /// Parameter list after the opening parenthesis, through `)`.
    fn parse_params(&mut self) -> Result<Vec<Param>, SyntaxError> {
        let mut params = Vec::new();
        loop {
            if self.matches(TokenKind::RParen) {
                break;
            }
            let name = self.expect_identifier("Expected parameter name")?;
            let ty = if self.matches(TokenKind::Colon) {
                Some(self.parse_type_expr()?)
            } else {
                None
            };
            let default = if self.matches(TokenKind::Eq) {
                Some(self.parse_type_expr()?)
            } else {
                None
            };
            params.push(Param { name, ty, default });
            if !self.matches(TokenKind::Comma) {
                self.expect(TokenKind::RParen)?;
                break;
            }
        }
        Ok(params)
    }

    /// Everything after a parameter list: optional return type, then
    /// `=> body` (or a bare block when `allow_bare_block`).
    fn parse_lambda_tail(
        &mut self,
        start: usize,
        params: Vec<Param>,
        allow_bare_block: bool,
    ) -> Result<NodeRef, SyntaxError> {
        let return_type = if self.matches(TokenKind::Colon) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };
        let body = if self.matches(TokenKind::FatArrow) {
            self.parse_lambda_body()?
        } else if allow_bare_block && self.check(TokenKind::LBrace) {
            self.parse_block()?
        } else {
            return Err(self.error_here("Expected `=>` after parameter list"));
        };
        Ok(self.function_node(start, "", params, Some(body), return_type))
    }

    fn parse_lambda_body(&mut self) -> Result<NodeRef, SyntaxError> {
        if self.check(TokenKind::LBrace) {
            self.parse_block()
        } else {
            let previous = self.suppress_block_literal;
            self.suppress_block_literal = false;
            let body = self.parse_expression();
            self.suppress_block_literal = previous;
            body
        }
    }

    fn function_node(
        &self,
        start: usize,
        name: &str,
        params: Vec<Param>,
        body: Option<NodeRef>,
        return_type: Option<NodeRef>,
    ) -> NodeRef {
        self.node(
            NodeKind::Func(FuncNode {
                name: name.to_string(),
                params,
                body,
                return_type,
                ..FuncNode::default()
            }),
            start,
        )
    }

    /// At `(`: finds the matching `)` and checks for `=>` or a return type.
    fn is_lambda_ahead(&self) -> bool {
        let mut depth = 0usize;
        let mut index = self.pos;
        while let Some(token) = self.tokens.get(index) {
            match token.kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return matches!(
                            self.tokens.get(index + 1).map(|t| &t.kind),
                            Some(TokenKind::FatArrow | TokenKind::Colon)
                        );
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
            index += 1;
        }
        false
    }

    /// At `{`: `{}` or `{ name:` starts an object literal.
    fn looks_like_object_literal(&self) -> bool {
        match self.peek_kind_n(1) {
            Some(TokenKind::RBrace) => true,
            Some(TokenKind::Identifier(_) | TokenKind::String(_)) => {
                matches!(self.peek_kind_n(2), Some(TokenKind::Colon))
            }
            _ => false,
        }
    }

    fn binary(&self, op: Operator, left: NodeRef, right: NodeRef, start: usize) -> NodeRef {
        self.node(
            NodeKind::Op(OpNode {
                op,
                left: Some(left),
                right,
            }),
            start,
        )
    }

    fn node(&self, kind: NodeKind, start: usize) -> NodeRef {
        NodeRef::new(Node::new(kind).at(self.position(start)))
    }

    fn position(&self, offset: usize) -> Position {
        self.lines.position(offset)
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.peek_kind(),
            Some(TokenKind::Semi | TokenKind::RBrace | TokenKind::Eof) | None
        )
    }

    fn expect_identifier(&mut self, msg: &str) -> Result<String, SyntaxError> {
        match self.peek_kind() {
            Some(TokenKind::Identifier(name)) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error_here(msg)),
        }
    }

    /// Identifiers, strings and keywords are all valid property names.
    fn expect_property_name(&mut self, msg: &str) -> Result<String, SyntaxError> {
        match self.peek_kind() {
            Some(TokenKind::Identifier(name)) | Some(TokenKind::String(name)) => {
                self.advance();
                Ok(name)
            }
            Some(kind) if kind.is_keyword() => {
                self.advance();
                Ok(kind.keyword_text().to_string())
            }
            _ => Err(self.error_here(msg)),
        }
    }

    fn expect_string_literal(&mut self, msg: &str) -> Result<String, SyntaxError> {
        match self.peek_kind() {
            Some(TokenKind::String(value)) => {
                self.advance();
                Ok(value)
            }
            _ => Err(self.error_here(msg)),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<&Token, SyntaxError> {
        if self.check(kind.clone()) {
            Ok(self.advance())
        } else {
            let found = self
                .peek_kind()
                .map(|found| found.describe())
                .unwrap_or_else(|| "end of file".into());
            Err(self
                .error_here(&format!("Expected {}, found {found}", kind.describe()))
                .with_label(format!("expected {}", kind.describe())))
        }
    }

    fn consume_optional(&mut self, kind: TokenKind) -> bool {
        self.matches(kind)
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        matches!(self.peek_kind(), Some(tk) if tk == kind)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.tokens.get(self.pos).map(|t| t.kind.clone())
    }

    fn peek_kind_n(&self, n: usize) -> Option<TokenKind> {
        self.tokens.get(self.pos + n).map(|t| t.kind.clone())
    }

    fn advance(&mut self) -> &Token {
        let index = self.pos.min(self.tokens.len().saturating_sub(1));
        self.pos = (self.pos + 1).min(self.tokens.len());
        &self.tokens[index]
    }

    fn is_eof(&self) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Eof) | None)
    }

    fn current_span_start(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|t| t.span.start)
            .unwrap_or_else(|| self.tokens.last().map(|t| t.span.end).unwrap_or(0))
    }

    fn error_here(&self, message: &str) -> SyntaxError {
        let span = self
            .tokens
            .get(self.pos)
            .map(|t| t.span)
            .unwrap_or_else(|| {
                self.tokens
                    .last()
                    .map(|t| t.span)
                    .unwrap_or_else(|| Span::new(0, 0))
            });
        SyntaxError::new(message.to_string(), span)
    }

    fn report(&mut self, err: SyntaxError) {
        self.errors.push(err);
    }

    fn synchronize_statement(&mut self) {
        while !self.is_eof() {
            match self.peek_kind() {
                Some(TokenKind::Semi) => {
                    self.advance();
                    return;
                }
                Some(
                    TokenKind::Var
                    | TokenKind::Const
                    | TokenKind::Fn
                    | TokenKind::Type
                    | TokenKind::Enum
                    | TokenKind::Import
                    | TokenKind::Return
                    | TokenKind::While
                    | TokenKind::For
                    | TokenKind::Try,
                ) => return,
                _ => {
                    self.advance();
                }
            }
        }
    }
}

fn name_function(value: &NodeRef, name: &str) {
    if let NodeKind::Func(func) = &mut value.borrow_mut().kind {
        if func.name.is_empty() && !func.is_signature {
            func.name = name.to_string();
        }
    }
}

fn is_assignable(node: &NodeRef) -> bool {
    match &node.borrow().kind {
        NodeKind::Id(_) | NodeKind::Accessor(_) => true,
        NodeKind::Op(op) => op.op == Operator::Dot,
        _ => false,
    }
}

fn is_type_reference(node: &NodeRef) -> bool {
    match &node.borrow().kind {
        NodeKind::Id(_) => true,
        NodeKind::Op(op) => op.op == Operator::Dot,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(source: &str) -> NodeRef {
        let mut nodes = parse_program(source).expect("parse");
        assert_eq!(nodes.len(), 1, "expected a single statement");
        nodes.remove(0)
    }

    #[test]
    fn const_lambda_gets_declaration_name() {
        let node = parse_one("const add = (a: Number, b: Number) => a + b");
        let inner = node.borrow();
        let NodeKind::ConstantDecl(decl) = &inner.kind else {
            panic!("expected const declaration");
        };
        let value = decl.value.as_ref().expect("value");
        let value = value.borrow();
        let NodeKind::Func(func) = &value.kind else {
            panic!("expected function");
        };
        assert_eq!(func.name, "add");
        assert_eq!(func.params.len(), 2);
        assert!(func.params.iter().all(|param| param.ty.is_some()));
    }

    #[test]
    fn precedence_binds_multiplication_tighter() {
        let node = parse_one("1 + 2 * 3");
        let inner = node.borrow();
        let NodeKind::Op(op) = &inner.kind else {
            panic!("expected op");
        };
        assert_eq!(op.op, Operator::Add);
        assert!(matches!(&op.right.borrow().kind, NodeKind::Op(mul) if mul.op == Operator::Mul));
    }

    #[test]
    fn if_condition_does_not_instantiate() {
        let node = parse_one("if ready { x = 1 } else { x = 2 }");
        let inner = node.borrow();
        let NodeKind::IfBlock(block) = &inner.kind else {
            panic!("expected if block");
        };
        assert_eq!(block.branches.len(), 1);
        assert!(block.otherwise.is_some());
    }

    #[test]
    fn instantiation_after_type_name() {
        let node = parse_one("var p = Point { x: 1, y: 2 }");
        let inner = node.borrow();
        let NodeKind::VariableDecl(decl) = &inner.kind else {
            panic!("expected declaration");
        };
        let value = decl.value.as_ref().expect("value").borrow();
        let NodeKind::Object(object) = &value.kind else {
            panic!("expected object");
        };
        assert!(object.instance_of.is_some());
        assert_eq!(object.keys, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn hook_calls_parse_as_meta_operator() {
        let node = parse_one("x::onChange(handler)");
        let inner = node.borrow();
        let NodeKind::Op(op) = &inner.kind else {
            panic!("expected op");
        };
        assert_eq!(op.op, Operator::Meta);
        assert!(matches!(op.right.borrow().kind, NodeKind::FuncCall(_)));
    }

    #[test]
    fn type_declarations_cover_all_forms() {
        let nodes = parse_program(
            "type Point { x: Number, y: Number = 0 }\n\
             type Positive(n: Number) => n > 0\n\
             type Pair(A, B) = [A, B]\n\
             type Id = Number | String",
        )
        .expect("parse");
        let bodies: Vec<&'static str> = nodes
            .iter()
            .map(|node| match &node.borrow().kind {
                NodeKind::TypeDecl(decl) => match decl.body {
                    TypeBody::Fields(_) => "fields",
                    TypeBody::Refinement(_) => "refinement",
                    TypeBody::Function(_) => "function",
                    TypeBody::Alias(_) => "alias",
                },
                _ => "other",
            })
            .collect();
        assert_eq!(bodies, vec!["fields", "refinement", "function", "alias"]);
    }

    #[test]
    fn function_types_and_named_functions() {
        let node = parse_one("var f: fn(Number, String) -> Boolean = fn check(a, b) { return true }");
        let _ = node;
        let sugar = parse_one("fn twice(x) => x * 2");
        assert!(matches!(sugar.borrow().kind, NodeKind::ConstantDecl(_)));
    }

    #[test]
    fn compound_assignment_desugars() {
        let node = parse_one("total += 2");
        let inner = node.borrow();
        let NodeKind::Op(op) = &inner.kind else {
            panic!("expected assignment");
        };
        assert_eq!(op.op, Operator::Assign);
        assert!(matches!(&op.right.borrow().kind, NodeKind::Op(add) if add.op == Operator::Add));
    }

    #[test]
    fn type_followed_by_paren_is_the_builtin_call() {
        let node = parse_one("println(type(x))");
        let inner = node.borrow();
        let NodeKind::FuncCall(outer) = &inner.kind else {
            panic!("expected call");
        };
        let arg = outer.args[0].borrow();
        let NodeKind::FuncCall(call) = &arg.kind else {
            panic!("expected nested call");
        };
        assert_eq!(call.callee.as_id().as_deref(), Some("type"));

        let statement = parse_one("type(x)");
        assert!(matches!(statement.borrow().kind, NodeKind::FuncCall(_)));
    }

    #[test]
    fn errors_are_collected_across_statements() {
        let errors = parse_program("var = 1\nconst y\nvar ok = 2").expect_err("should fail");
        assert_eq!(errors.errors.len(), 2);
    }

    #[test]
    fn positions_point_at_statement_start() {
        let nodes = parse_program("var a = 1\n  foo()").expect("parse");
        assert_eq!(nodes[1].pos(), Position::new(2, 3, 12));
    }
}
