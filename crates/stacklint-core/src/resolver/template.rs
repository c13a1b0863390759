//! Minimal chart-template renderer with line provenance.
//!
//! Charts use a Go-template dialect; this renderer covers the subset IaC
//! charts lean on — value/chart/release lookups, `include`/`define`,
//! `if`/`else`, `range`, comments, and the common pipeline functions — and
//! refuses anything else so a chart is either rendered faithfully or fails
//! as a whole.
//!
//! Every rendered line remembers the 1-based template line it came from.
//! Text expanded from expressions (multi-line `include`, `nindent`,
//! `toYaml`) maps entirely to the expression's own line, which is what the
//! line detector needs to invert rendering.

use std::collections::HashMap;

use serde_json::Value;

/// Template values and identity a chart renders against.
#[derive(Debug, Clone)]
pub(crate) struct RenderContext {
    /// Parsed `values.yaml` (null when the chart has none).
    pub values: Value,
    /// `Chart.yaml` name.
    pub chart_name: String,
    /// `Chart.yaml` version.
    pub chart_version: String,
    /// Release name used for `.Release.Name`.
    pub release_name: String,
}

#[derive(Debug, Clone)]
pub(crate) enum Node {
    Text { text: String, line: usize },
    Expr { expr: String, line: usize },
    If { branches: Vec<(Option<String>, Vec<Node>)> },
    Range { expr: String, body: Vec<Node>, line: usize },
}

/// Parsed templates plus the named blocks they define.
#[derive(Debug, Default)]
pub(crate) struct Engine {
    defines: HashMap<String, Vec<Node>>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one template source, absorbing its `define` blocks and
    /// returning the renderable body.
    pub fn load(&mut self, source: &str) -> Result<Vec<Node>, String> {
        let tokens = lex(source)?;
        let (body, defines) = parse(tokens)?;
        self.defines.extend(defines);
        Ok(body)
    }

    /// Render a parsed body to `(text, source_line)` pairs, one per output
    /// line.
    pub fn render(&self, body: &[Node], ctx: &RenderContext) -> Result<Vec<(String, usize)>, String> {
        let mut emitter = Emitter::default();
        self.render_nodes(body, ctx, &ctx.values.clone(), &mut emitter)?;
        Ok(emitter.finish())
    }

    fn render_nodes(
        &self,
        nodes: &[Node],
        ctx: &RenderContext,
        dot: &Value,
        emitter: &mut Emitter,
    ) -> Result<(), String> {
        for node in nodes {
            match node {
                Node::Text { text, line } => emitter.push(text, *line, true),
                Node::Expr { expr, line } => {
                    let value = self.eval_pipeline(expr, ctx, dot)?;
                    emitter.push(&value_to_string(&value), *line, false);
                }
                Node::If { branches } => {
                    for (condition, body) in branches {
                        let taken = match condition {
                            Some(expr) => truthy(&self.eval_pipeline(expr, ctx, dot)?),
                            None => true,
                        };
                        if taken {
                            self.render_nodes(body, ctx, dot, emitter)?;
                            break;
                        }
                    }
                }
                Node::Range { expr, body, line } => {
                    let value = self.eval_pipeline(expr, ctx, dot)?;
                    match value {
                        Value::Array(items) => {
                            for item in items {
                                self.render_nodes(body, ctx, &item, emitter)?;
                            }
                        }
                        Value::Null => {}
                        other => {
                            return Err(format!(
                                "line {line}: range over non-sequence value {other}"
                            ));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Render a define body to a plain string (used by `include`).
    fn render_define(&self, name: &str, ctx: &RenderContext, dot: &Value) -> Result<String, String> {
        let body = self
            .defines
            .get(name)
            .ok_or_else(|| format!("include of undefined template {name:?}"))?;
        let mut emitter = Emitter::default();
        self.render_nodes(body, ctx, dot, &mut emitter)?;
        let text = emitter
            .finish()
            .into_iter()
            .map(|(line, _)| line)
            .collect::<Vec<_>>()
            .join("\n");
        Ok(text.trim().to_string())
    }

    fn eval_pipeline(&self, expr: &str, ctx: &RenderContext, dot: &Value) -> Result<Value, String> {
        let mut stages = split_top_level(expr, '|');
        if stages.is_empty() {
            return Err("empty expression".into());
        }
        let mut value = self.eval_call(&stages.remove(0), ctx, dot, None)?;
        for stage in stages {
            value = self.eval_call(&stage, ctx, dot, Some(value))?;
        }
        Ok(value)
    }

    fn eval_call(
        &self,
        stage: &str,
        ctx: &RenderContext,
        dot: &Value,
        piped: Option<Value>,
    ) -> Result<Value, String> {
        let tokens = tokenize(stage);
        let Some(head) = tokens.first() else {
            return Err("empty pipeline stage".into());
        };

        if !is_function_name(head) {
            if tokens.len() > 1 {
                return Err(format!("unsupported expression: {stage}"));
            }
            return self.eval_atom(head, ctx, dot);
        }

        let mut args = tokens[1..]
            .iter()
            .map(|token| self.eval_atom(token, ctx, dot))
            .collect::<Result<Vec<Value>, String>>()?;
        if let Some(piped) = piped {
            args.push(piped);
        }
        self.apply(head, &args, ctx)
    }

    #[allow(clippy::too_many_lines)]
    fn apply(&self, name: &str, args: &[Value], ctx: &RenderContext) -> Result<Value, String> {
        let arity = |n: usize| -> Result<(), String> {
            if args.len() == n {
                Ok(())
            } else {
                Err(format!("{name} expects {n} arguments, got {}", args.len()))
            }
        };
        match name {
            "include" => {
                arity(2)?;
                let template = as_str(&args[0])?;
                Ok(Value::String(self.render_define(&template, ctx, &args[1])?))
            }
            "printf" => {
                let format = as_str(args.first().ok_or("printf without format")?)?;
                Ok(Value::String(printf(&format, &args[1..])))
            }
            "default" => {
                arity(2)?;
                if truthy(&args[1]) {
                    Ok(args[1].clone())
                } else {
                    Ok(args[0].clone())
                }
            }
            "quote" => Ok(Value::String(format!("\"{}\"", value_to_string(&args[args.len() - 1])))),
            "upper" => Ok(Value::String(value_to_string(&args[args.len() - 1]).to_uppercase())),
            "lower" => Ok(Value::String(value_to_string(&args[args.len() - 1]).to_lowercase())),
            "trunc" => {
                arity(2)?;
                let n = as_usize(&args[0])?;
                let mut text = value_to_string(&args[1]);
                text.truncate(n);
                Ok(Value::String(text))
            }
            "trimSuffix" => {
                arity(2)?;
                let suffix = as_str(&args[0])?;
                let text = value_to_string(&args[1]);
                Ok(Value::String(
                    text.strip_suffix(&suffix).map_or(text.clone(), str::to_string),
                ))
            }
            "trimPrefix" => {
                arity(2)?;
                let prefix = as_str(&args[0])?;
                let text = value_to_string(&args[1]);
                Ok(Value::String(
                    text.strip_prefix(&prefix).map_or(text.clone(), str::to_string),
                ))
            }
            "indent" => {
                arity(2)?;
                let n = as_usize(&args[0])?;
                Ok(Value::String(indent_text(&value_to_string(&args[1]), n)))
            }
            "nindent" => {
                arity(2)?;
                let n = as_usize(&args[0])?;
                Ok(Value::String(format!(
                    "\n{}",
                    indent_text(&value_to_string(&args[1]), n)
                )))
            }
            "toYaml" => {
                arity(1)?;
                let rendered = serde_yaml::to_string(&args[0]).map_err(|e| e.to_string())?;
                Ok(Value::String(rendered.trim_end().to_string()))
            }
            "not" => {
                arity(1)?;
                Ok(Value::Bool(!truthy(&args[0])))
            }
            "eq" => {
                arity(2)?;
                Ok(Value::Bool(args[0] == args[1]))
            }
            "ne" => {
                arity(2)?;
                Ok(Value::Bool(args[0] != args[1]))
            }
            "and" => Ok(args
                .iter()
                .find(|a| !truthy(a))
                .cloned()
                .unwrap_or_else(|| args.last().cloned().unwrap_or(Value::Null))),
            "or" => Ok(args
                .iter()
                .find(|a| truthy(a))
                .cloned()
                .unwrap_or_else(|| args.last().cloned().unwrap_or(Value::Null))),
            "required" => {
                arity(2)?;
                if args[1].is_null() {
                    Err(as_str(&args[0]).unwrap_or_else(|_| "required value missing".into()))
                } else {
                    Ok(args[1].clone())
                }
            }
            other => Err(format!("unsupported template function {other:?}")),
        }
    }

    fn eval_atom(&self, token: &str, ctx: &RenderContext, dot: &Value) -> Result<Value, String> {
        if let Some(inner) = token.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
            return self.eval_pipeline(inner, ctx, dot);
        }
        if let Some(inner) = token.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
            return Ok(Value::String(inner.replace("\\\"", "\"")));
        }
        match token {
            "." => return Ok(dot.clone()),
            "true" => return Ok(Value::Bool(true)),
            "false" => return Ok(Value::Bool(false)),
            _ => {}
        }
        if let Ok(n) = token.parse::<i64>() {
            return Ok(Value::from(n));
        }
        if let Ok(f) = token.parse::<f64>() {
            return Ok(Value::from(f));
        }

        // `$` is the root context; the lookups below already treat
        // .Values/.Chart/.Release as absolute.
        let path = token.strip_prefix('$').unwrap_or(token);
        let Some(path) = path.strip_prefix('.') else {
            return Err(format!("unsupported expression atom {token:?}"));
        };
        let segments: Vec<&str> = path.split('.').collect();
        match segments.as_slice() {
            ["Values", rest @ ..] => Ok(lookup(&ctx.values, rest)),
            ["Chart", "Name"] => Ok(Value::String(ctx.chart_name.clone())),
            ["Chart", "Version"] => Ok(Value::String(ctx.chart_version.clone())),
            ["Release", "Name"] => Ok(Value::String(ctx.release_name.clone())),
            ["Release", "Namespace"] => Ok(Value::String("default".into())),
            ["Release", "Service"] => Ok(Value::String("Helm".into())),
            rest => Ok(lookup(dot, rest)),
        }
    }
}

fn is_function_name(token: &str) -> bool {
    token
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
        && !matches!(token, "true" | "false")
}

fn lookup(root: &Value, path: &[&str]) -> Value {
    let mut current = root;
    for key in path {
        match current.get(key) {
            Some(next) => current = next,
            None => return Value::Null,
        }
    }
    current.clone()
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

fn as_str(value: &Value) -> Result<String, String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| format!("expected a string, got {value}"))
}

fn as_usize(value: &Value) -> Result<usize, String> {
    value
        .as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| format!("expected a number, got {value}"))
}

fn indent_text(text: &str, n: usize) -> String {
    let pad = " ".repeat(n);
    text.lines()
        .map(|line| format!("{pad}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn printf(format: &str, args: &[Value]) -> String {
    let mut out = String::new();
    let mut arg_index = 0usize;
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('s' | 'd' | 'v') => {
                if let Some(arg) = args.get(arg_index) {
                    out.push_str(&value_to_string(arg));
                }
                arg_index += 1;
            }
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Lexing and parsing
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Token {
    Text { text: String, line: usize },
    Tag {
        body: String,
        line: usize,
        trim_left: bool,
        trim_right: bool,
    },
}

fn lex(source: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut rest = source;
    let mut line = 1usize;

    while let Some(open) = rest.find("{{") {
        let (text, after) = rest.split_at(open);
        if !text.is_empty() {
            tokens.push(Token::Text {
                text: text.to_string(),
                line,
            });
            line += text.matches('\n').count();
        }
        let after = &after[2..];
        let close = if after.trim_start().starts_with("/*") {
            after
                .find("*/}}")
                .map(|i| (i + 2, i + 4))
                .ok_or_else(|| format!("line {line}: unterminated template comment"))?
        } else {
            after
                .find("}}")
                .map(|i| (i, i + 2))
                .ok_or_else(|| format!("line {line}: unterminated template tag"))?
        };
        let raw = &after[..close.0];
        let trim_left = raw.starts_with('-');
        let trim_right = raw.ends_with('-') && raw.len() > 1;
        let body = raw
            .trim_start_matches('-')
            .trim_end_matches('-')
            .trim()
            .to_string();
        tokens.push(Token::Tag {
            body,
            line,
            trim_left,
            trim_right,
        });
        line += raw.matches('\n').count();
        rest = &after[close.1..];
    }
    if !rest.is_empty() {
        tokens.push(Token::Text {
            text: rest.to_string(),
            line,
        });
    }
    chomp(&mut tokens);
    Ok(tokens)
}

fn is_control(body: &str) -> bool {
    body == "else" || body == "end" || body.starts_with("if ") || body.starts_with("else if ")
        || body.starts_with("range ")
        || body.starts_with("define ")
        || body.starts_with("/*")
}

/// Apply whitespace control statically, so the renderer never sees it.
///
/// Explicit `{{-`/`-}}` markers chomp all adjacent whitespace, as written.
/// A control tag written without markers but standing alone on its line is
/// removed line and all: the spaces before it and its trailing newline
/// vanish. A control tag whose `{{-` already consumed the preceding newline
/// keeps its trailing newline, which is what terminates the previous output
/// line.
fn chomp(tokens: &mut [Token]) {
    for index in 0..tokens.len() {
        let (control, trim_left, trim_right) = match &tokens[index] {
            Token::Tag {
                body,
                trim_left,
                trim_right,
                ..
            } => (is_control(body), *trim_left, *trim_right),
            Token::Text { .. } => continue,
        };

        // Whether the tag starts its own output line once the left side is
        // handled; only then may the standalone rule eat the right newline.
        let mut at_line_start = index == 0;
        if index > 0 {
            match &mut tokens[index - 1] {
                Token::Text { text, .. } => {
                    if trim_left {
                        *text = text.trim_end().to_string();
                    } else if control {
                        let trimmed = text.trim_end_matches([' ', '\t']);
                        if trimmed.ends_with('\n') {
                            *text = trimmed.to_string();
                            at_line_start = true;
                        }
                    }
                }
                Token::Tag { .. } => at_line_start = true,
            }
        }
        if index + 1 < tokens.len() {
            if let Token::Text { text, line } = &mut tokens[index + 1] {
                if trim_right {
                    let removed = text.len() - text.trim_start().len();
                    *line += text[..removed].matches('\n').count();
                    *text = text.trim_start().to_string();
                } else if control && at_line_start {
                    let spaces = text.len() - text.trim_start_matches([' ', '\t']).len();
                    if text[spaces..].starts_with('\n') {
                        *line += 1;
                        *text = text[spaces + 1..].to_string();
                    }
                }
            }
        }
    }
}

enum Frame {
    If {
        branches: Vec<(Option<String>, Vec<Node>)>,
        current: Option<String>,
        nodes: Vec<Node>,
    },
    Range {
        expr: String,
        line: usize,
        nodes: Vec<Node>,
    },
    Define {
        name: String,
        nodes: Vec<Node>,
    },
}

#[allow(clippy::too_many_lines)]
fn parse(tokens: Vec<Token>) -> Result<(Vec<Node>, HashMap<String, Vec<Node>>), String> {
    let mut root: Vec<Node> = Vec::new();
    let mut defines: HashMap<String, Vec<Node>> = HashMap::new();
    let mut stack: Vec<Frame> = Vec::new();

    let mut push_node = |stack: &mut Vec<Frame>, root: &mut Vec<Node>, node: Node| {
        match stack.last_mut() {
            Some(Frame::If { nodes, .. } | Frame::Range { nodes, .. } | Frame::Define { nodes, .. }) => {
                nodes.push(node);
            }
            None => root.push(node),
        }
    };

    for token in tokens {
        match token {
            Token::Text { text, line } => {
                if !text.is_empty() {
                    push_node(&mut stack, &mut root, Node::Text { text, line });
                }
            }
            Token::Tag { body, line, .. } => {
                if body.starts_with("/*") || body.is_empty() {
                    continue;
                }
                if let Some(condition) = body.strip_prefix("if ") {
                    stack.push(Frame::If {
                        branches: Vec::new(),
                        current: Some(condition.trim().to_string()),
                        nodes: Vec::new(),
                    });
                } else if let Some(condition) = body.strip_prefix("else if ") {
                    match stack.last_mut() {
                        Some(Frame::If { branches, current, nodes, .. }) => {
                            branches.push((current.take(), std::mem::take(nodes)));
                            *current = Some(condition.trim().to_string());
                        }
                        _ => return Err(format!("line {line}: 'else if' outside if")),
                    }
                } else if body == "else" {
                    match stack.last_mut() {
                        Some(Frame::If { branches, current, nodes, .. }) => {
                            branches.push((current.take(), std::mem::take(nodes)));
                            *current = None;
                        }
                        _ => return Err(format!("line {line}: 'else' outside if")),
                    }
                } else if let Some(expr) = body.strip_prefix("range ") {
                    let expr = expr.trim();
                    if expr.contains(":=") {
                        return Err(format!("line {line}: range variables are not supported"));
                    }
                    stack.push(Frame::Range {
                        expr: expr.to_string(),
                        line,
                        nodes: Vec::new(),
                    });
                } else if let Some(name) = body.strip_prefix("define ") {
                    let name = name.trim().trim_matches('"').to_string();
                    stack.push(Frame::Define {
                        name,
                        nodes: Vec::new(),
                    });
                } else if body == "end" {
                    let frame = stack
                        .pop()
                        .ok_or_else(|| format!("line {line}: 'end' without an open block"))?;
                    match frame {
                        Frame::If {
                            mut branches,
                            current,
                            nodes,
                        } => {
                            branches.push((current, nodes));
                            push_node(&mut stack, &mut root, Node::If { branches });
                        }
                        Frame::Range { expr, line, nodes } => {
                            push_node(&mut stack, &mut root, Node::Range { expr, body: nodes, line });
                        }
                        Frame::Define { name, nodes } => {
                            defines.insert(name, nodes);
                        }
                    }
                } else if body.starts_with("with ") || body.starts_with("template ") || body.starts_with("block ") {
                    return Err(format!("line {line}: unsupported template action {body:?}"));
                } else {
                    push_node(&mut stack, &mut root, Node::Expr { expr: body, line });
                }
            }
        }
    }
    if !stack.is_empty() {
        return Err("template block left open at end of input".into());
    }
    Ok((root, defines))
}

/// Split on `separator` outside quotes and parentheses.
fn split_top_level(expr: &str, separator: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_string = false;
    for c in expr.chars() {
        match c {
            '"' => {
                in_string = !in_string;
                current.push(c);
            }
            '(' if !in_string => {
                depth += 1;
                current.push(c);
            }
            ')' if !in_string => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            c if c == separator && !in_string && depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            c => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Split a pipeline stage into atoms: quoted strings and parenthesized
/// groups stay whole.
fn tokenize(stage: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_string = false;
    for c in stage.chars() {
        match c {
            '"' => {
                in_string = !in_string;
                current.push(c);
            }
            '(' if !in_string => {
                depth += 1;
                current.push(c);
            }
            ')' if !in_string => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            c if c.is_whitespace() && !in_string && depth == 0 => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

// ---------------------------------------------------------------------------
// Output assembly
// ---------------------------------------------------------------------------

/// Accumulates rendered text, remembering which template line started each
/// output line.
#[derive(Debug, Default)]
struct Emitter {
    lines: Vec<(String, usize)>,
    current: String,
    current_src: Option<usize>,
}

impl Emitter {
    /// Append a fragment. `advance` is true for literal template text, where
    /// newlines move the source cursor; expression output keeps its source
    /// line however many lines it spans.
    fn push(&mut self, fragment: &str, src: usize, advance: bool) {
        let mut src_cursor = src;
        for c in fragment.chars() {
            if c == '\n' {
                let line_src = self.current_src.unwrap_or(src_cursor);
                self.lines.push((std::mem::take(&mut self.current), line_src));
                self.current_src = None;
                if advance {
                    src_cursor += 1;
                }
            } else {
                if self.current_src.is_none() {
                    self.current_src = Some(src_cursor);
                }
                self.current.push(c);
            }
        }
    }

    fn finish(mut self) -> Vec<(String, usize)> {
        if let Some(src) = self.current_src {
            self.lines.push((self.current, src));
        }
        self.lines
    }
}
