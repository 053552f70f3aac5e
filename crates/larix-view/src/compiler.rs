//! Blade-style template syntax compiled to tera
//!
//! Echoes, comments and `@directives` are rewritten into tera tags; anything
//! already written in tera syntax passes through untouched. Expressions get a
//! light translation: `$var` loses its sigil, `->` becomes `.`, `&&`/`||`/`!`
//! become `and`/`or`/`not` and `a ?? b` becomes `a | default(value=b)`.

use crate::components::{SLOT_CLOSE, SLOT_OPEN};
use crate::{ViewError, ViewResult};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

static COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{\{--.*?--\}\}").expect("valid regex"));
static VERBATIM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)@verbatim(.*?)@endverbatim").expect("valid regex"));
static ECHO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\{!!\s*(.+?)\s*!!\}|(@?)\{\{\s*(.+?)\s*\}\}").expect("valid regex")
});
static FOREACH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^(.+?)\s+as\s+\$?([A-Za-z_]\w*)(?:\s*=>\s*\$?([A-Za-z_]\w*))?\s*$")
        .expect("valid regex")
});
static VARIABLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$([A-Za-z_])").expect("valid regex"));
static LOOP_ITERATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$loop->iteration\b").expect("valid regex"));
static LOOP_INDEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$loop->index\b").expect("valid regex"));

const VERBATIM_MARK: char = '\u{0}';

/// Output of a custom directive, given the raw text between its parentheses
pub type DirectiveHandler = Arc<dyn Fn(Option<&str>) -> String + Send + Sync>;

const DIRECTIVES: &[&str] = &[
    "if", "elseif", "else", "endif", "unless", "endunless", "isset", "endisset", "empty",
    "endempty", "foreach", "endforeach", "break", "continue", "auth", "endauth", "guest",
    "endguest", "can", "endcan", "cannot", "endcannot", "canany", "endcanany", "env", "endenv",
    "production", "endproduction", "csrf", "method", "json", "include", "includeIf", "extends",
    "section", "endsection", "stop", "show", "yield", "parent", "component", "endcomponent",
    "slot", "endslot",
];

#[derive(Debug, Clone, PartialEq)]
enum Open {
    Conditional(&'static str),
    Foreach,
    Section(String),
    Component,
    Slot,
}

impl fmt::Display for Open {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Open::Conditional(name) => write!(f, "@{}", name),
            Open::Foreach => f.write_str("@foreach"),
            Open::Section(name) => write!(f, "@section('{}')", name),
            Open::Component => f.write_str("@component"),
            Open::Slot => f.write_str("@slot"),
        }
    }
}

#[derive(Clone, Default)]
pub struct TemplateCompiler {
    custom: HashMap<String, DirectiveHandler>,
}

impl fmt::Debug for TemplateCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut custom: Vec<&String> = self.custom.keys().collect();
        custom.sort();
        f.debug_struct("TemplateCompiler").field("custom", &custom).finish()
    }
}

impl TemplateCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `@name(...)`; built-in directives cannot be replaced
    pub fn directive<F>(&mut self, name: &str, handler: F) -> ViewResult<()>
    where
        F: Fn(Option<&str>) -> String + Send + Sync + 'static,
    {
        if DIRECTIVES.contains(&name) || !is_identifier(name) {
            return Err(ViewError::Configuration(format!(
                "cannot register directive @{}",
                name
            )));
        }
        self.custom.insert(name.to_string(), Arc::new(handler));
        Ok(())
    }

    pub fn compile(&self, view: &str, source: &str) -> ViewResult<String> {
        let source = COMMENT.replace_all(source, "");

        let mut verbatim = Vec::new();
        let source = VERBATIM.replace_all(&source, |caps: &Captures| {
            verbatim.push(caps[1].to_string());
            format!("{m}{}{m}", verbatim.len() - 1, m = VERBATIM_MARK)
        });

        let source = ECHO.replace_all(&source, |caps: &Captures| {
            if let Some(raw) = caps.get(1) {
                return format!("{{{{ {} | safe }}}}", translate_expression(raw.as_str()));
            }
            if &caps[2] == "@" {
                return format!("{{% raw %}}{{{{ {} }}}}{{% endraw %}}", &caps[3]);
            }
            format!("{{{{ {} }}}}", translate_expression(&caps[3]))
        });

        let mut pass = Pass::new(view);
        pass.run(self, &source)?;
        let mut compiled = pass.finish()?;

        for (index, text) in verbatim.iter().enumerate() {
            let mark = format!("{m}{}{m}", index, m = VERBATIM_MARK);
            compiled = compiled.replace(&mark, &format!("{{% raw %}}{}{{% endraw %}}", text));
        }
        Ok(compiled)
    }

    fn knows(&self, name: &str) -> bool {
        DIRECTIVES.contains(&name) || self.custom.contains_key(name)
    }
}

struct Pass<'v> {
    view: &'v str,
    out: String,
    open: Vec<Open>,
    extends: Option<String>,
}

impl<'v> Pass<'v> {
    fn new(view: &'v str) -> Self {
        Self {
            view,
            out: String::new(),
            open: Vec::new(),
            extends: None,
        }
    }

    fn error(&self, message: impl Into<String>) -> ViewError {
        ViewError::compile(self.view, message)
    }

    fn run(&mut self, compiler: &TemplateCompiler, source: &str) -> ViewResult<()> {
        let mut rest = source;
        while let Some(at) = rest.find('@') {
            self.out.push_str(&rest[..at]);
            let after = &rest[at + 1..];

            if let Some(stripped) = after.strip_prefix('@') {
                self.out.push('@');
                rest = stripped;
                continue;
            }
            // e-mail addresses and the like
            let glued = self
                .out
                .chars()
                .last()
                .map_or(false, |c| c.is_alphanumeric() || c == '.' || c == '_');
            let len = after
                .find(|c: char| !c.is_ascii_alphabetic())
                .unwrap_or(after.len());
            let name = &after[..len];
            if glued || name.is_empty() || !compiler.knows(name) {
                self.out.push('@');
                rest = after;
                continue;
            }

            let mut remaining = &after[len..];
            let mut args = None;
            let spaced = remaining.trim_start_matches([' ', '\t']);
            if spaced.starts_with('(') {
                let (inner, used) = balanced(spaced)
                    .ok_or_else(|| self.error(format!("unclosed parenthesis after @{}", name)))?;
                args = Some(inner);
                remaining = &spaced[used..];
            }

            let compiled = match compiler.custom.get(name) {
                Some(handler) => handler(args),
                None => self.directive(name, args)?,
            };
            self.out.push_str(&compiled);
            rest = remaining;
        }
        self.out.push_str(rest);
        Ok(())
    }

    fn finish(self) -> ViewResult<String> {
        if let Some(open) = self.open.last() {
            return Err(ViewError::compile(self.view, format!("unclosed {}", open)));
        }
        Ok(match self.extends {
            Some(parent) => format!("{{% extends \"{}\" %}}{}", parent, self.out),
            None => self.out,
        })
    }

    fn required<'a>(&self, name: &str, args: Option<&'a str>) -> ViewResult<&'a str> {
        match args.map(str::trim) {
            Some(args) if !args.is_empty() => Ok(args),
            _ => Err(self.error(format!("@{} needs an argument", name))),
        }
    }

    fn close(&mut self, directive: &str, expected: &Open) -> ViewResult<Open> {
        let matches = match (self.open.last(), expected) {
            (Some(Open::Section(_)), Open::Section(_)) => true,
            (Some(open), expected) => open == expected,
            (None, _) => false,
        };
        if !matches {
            return Err(self.error(format!("unexpected @{}", directive)));
        }
        self.open
            .pop()
            .ok_or_else(|| self.error(format!("unexpected @{}", directive)))
    }

    fn conditional(&mut self, name: &'static str, tag: String) -> ViewResult<String> {
        self.open.push(Open::Conditional(name));
        Ok(tag)
    }

    fn directive(&mut self, name: &str, args: Option<&str>) -> ViewResult<String> {
        let output = match name {
            "if" => {
                let condition = translate_expression(self.required(name, args)?);
                self.conditional("if", format!("{{% if {} %}}", condition))?
            }
            "elseif" | "else" => {
                if !matches!(self.open.last(), Some(Open::Conditional(_))) {
                    return Err(self.error(format!("@{} outside of a conditional", name)));
                }
                if name == "else" {
                    "{% else %}".to_string()
                } else {
                    let condition = translate_expression(self.required(name, args)?);
                    format!("{{% elif {} %}}", condition)
                }
            }
            // tera has no unary not over a group, so unless is an if with an empty branch
            "unless" => {
                let condition = translate_expression(self.required(name, args)?);
                self.conditional("unless", format!("{{% if {} %}}{{% else %}}", condition))?
            }
            "isset" => {
                let subject = translate_expression(self.required(name, args)?);
                self.conditional("isset", format!("{{% if {} is filled %}}", subject))?
            }
            "empty" => {
                let subject = translate_expression(self.required(name, args)?);
                self.conditional("empty", format!("{{% if {} is blank %}}", subject))?
            }
            "auth" => self.conditional("auth", "{% if auth_user is filled %}".to_string())?,
            "guest" => self.conditional("guest", "{% if auth_user is blank %}".to_string())?,
            "can" => {
                let ability = translate_expression(self.required(name, args)?);
                self.conditional("can", format!("{{% if {} in abilities %}}", ability))?
            }
            "cannot" => {
                let ability = translate_expression(self.required(name, args)?);
                self.conditional("cannot", format!("{{% if {} in abilities %}}{{% else %}}", ability))?
            }
            "canany" => {
                let list = self.required(name, args)?;
                let tests: Vec<String> = list_items(list)
                    .iter()
                    .map(|ability| format!("{} in abilities", translate_expression(ability)))
                    .collect();
                self.conditional("canany", format!("{{% if {} %}}", tests.join(" or ")))?
            }
            "env" => {
                let envs = self.required(name, args)?;
                let test = if envs.trim_start().starts_with('[') {
                    format!("app_env in {}", translate_expression(envs))
                } else {
                    format!("app_env == {}", translate_expression(envs))
                };
                self.conditional("env", format!("{{% if {} %}}", test))?
            }
            "production" => self.conditional(
                "production",
                "{% if app_env == \"production\" %}".to_string(),
            )?,
            "endif" | "endunless" | "endisset" | "endempty" | "endauth" | "endguest" | "endcan"
            | "endcannot" | "endcanany" | "endenv" | "endproduction" => {
                let opener = opener_of(name);
                self.close(name, &Open::Conditional(opener))?;
                "{% endif %}".to_string()
            }

            "foreach" => {
                let spec = self.required(name, args)?;
                let caps = FOREACH
                    .captures(spec)
                    .ok_or_else(|| self.error(format!("cannot parse @foreach({})", spec)))?;
                let items = translate_expression(&caps[1]);
                self.open.push(Open::Foreach);
                match caps.get(3) {
                    Some(value) => format!("{{% for {}, {} in {} %}}", &caps[2], value.as_str(), items),
                    None => format!("{{% for {} in {} %}}", &caps[2], items),
                }
            }
            "endforeach" => {
                self.close(name, &Open::Foreach)?;
                "{% endfor %}".to_string()
            }
            "break" | "continue" => {
                if !self.open.contains(&Open::Foreach) {
                    return Err(self.error(format!("@{} outside of @foreach", name)));
                }
                match args.map(str::trim).filter(|a| !a.is_empty()) {
                    Some(condition) => format!(
                        "{{% if {} %}}{{% {} %}}{{% endif %}}",
                        translate_expression(condition),
                        name
                    ),
                    None => format!("{{% {} %}}", name),
                }
            }

            "csrf" => r#"<input type="hidden" name="_token" value="{{ csrf_token }}">"#.to_string(),
            "method" => {
                let method = self.required(name, args)?;
                match unquote(method) {
                    Some(literal) => format!(
                        r#"<input type="hidden" name="_method" value="{}">"#,
                        literal.to_ascii_uppercase()
                    ),
                    None => format!(
                        r#"<input type="hidden" name="_method" value="{{{{ {} | upper }}}}">"#,
                        translate_expression(method)
                    ),
                }
            }
            "json" => {
                let parts = split_args(self.required(name, args)?);
                let pretty = if parts.len() > 1 { "pretty=true" } else { "" };
                format!("{{{{ {} | json_encode({}) | safe }}}}", translate_expression(parts[0]), pretty)
            }

            "include" | "includeIf" => {
                let parts = split_args(self.required(name, args)?);
                let target = unquote(parts[0])
                    .ok_or_else(|| self.error(format!("@{} needs a quoted view name", name)))?;
                let mut tags = String::new();
                if let Some(data) = parts.get(1) {
                    for (key, value) in self.pairs(data)? {
                        tags.push_str(&format!("{{% set {} = {} %}}", key, value));
                    }
                }
                let missing = if name == "includeIf" { " ignore missing" } else { "" };
                tags.push_str(&format!("{{% include \"{}\"{} %}}", template_name(target), missing));
                tags
            }
            "extends" => {
                let parent = self.required(name, args)?;
                let parent = unquote(parent)
                    .ok_or_else(|| self.error("@extends needs a quoted view name"))?;
                if self.extends.is_some() {
                    return Err(self.error("@extends used twice"));
                }
                self.extends = Some(template_name(parent));
                String::new()
            }
            "section" => {
                let parts = split_args(self.required(name, args)?);
                let block = self.block_name(parts[0])?;
                match parts.get(1) {
                    Some(content) => format!(
                        "{{% block {b} %}}{}{{% endblock {b} %}}",
                        escaped_echo(content),
                        b = block
                    ),
                    None => {
                        self.open.push(Open::Section(block.clone()));
                        format!("{{% block {} %}}", block)
                    }
                }
            }
            "endsection" | "stop" | "show" => match self.close(name, &Open::Section(String::new()))? {
                Open::Section(block) => format!("{{% endblock {} %}}", block),
                _ => return Err(self.error(format!("unexpected @{}", name))),
            },
            "yield" => {
                let parts = split_args(self.required(name, args)?);
                let block = self.block_name(parts[0])?;
                let default = parts
                    .get(1)
                    .map(|d| escaped_echo(d))
                    .unwrap_or_default();
                format!("{{% block {b} %}}{}{{% endblock {b} %}}", default, b = block)
            }
            "parent" => "{{ super() }}".to_string(),

            "component" => {
                let tag = self.component(self.required(name, args)?)?;
                self.open.push(Open::Component);
                tag
            }
            "endcomponent" => {
                self.close(name, &Open::Component)?;
                "{% endfilter %}".to_string()
            }
            "slot" => {
                if !self.open.contains(&Open::Component) {
                    return Err(self.error("@slot outside of @component"));
                }
                let parts = split_args(self.required(name, args)?);
                let slot = self.block_name(parts[0])?;
                match parts.get(1) {
                    Some(content) => format!(
                        "{}{}-->{{{{ {} }}}}{}",
                        SLOT_OPEN,
                        slot,
                        translate_expression(content),
                        SLOT_CLOSE
                    ),
                    None => {
                        self.open.push(Open::Slot);
                        format!("{}{}-->", SLOT_OPEN, slot)
                    }
                }
            }
            "endslot" => {
                self.close(name, &Open::Slot)?;
                SLOT_CLOSE.to_string()
            }
            other => return Err(self.error(format!("unsupported directive @{}", other))),
        };
        Ok(output)
    }

    fn block_name(&self, arg: &str) -> ViewResult<String> {
        let name = unquote(arg).ok_or_else(|| self.error(format!("expected a quoted name, got {}", arg)))?;
        let name: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        if !is_identifier(&name) {
            return Err(self.error(format!("invalid block name '{}'", name)));
        }
        Ok(name)
    }

    /// `['key' => expr, ...]` into `(key, tera expr)` pairs
    fn pairs(&self, array: &str) -> ViewResult<Vec<(String, String)>> {
        let inner = array
            .trim()
            .strip_prefix('[')
            .and_then(|a| a.strip_suffix(']'))
            .ok_or_else(|| self.error(format!("expected an array, got {}", array)))?;
        let mut pairs = Vec::new();
        for item in split_args(inner) {
            let arrow = find_top_level(item, "=>")
                .ok_or_else(|| self.error(format!("expected 'key' => value, got {}", item)))?;
            let key = unquote(item[..arrow].trim())
                .filter(|k| is_identifier(k))
                .ok_or_else(|| self.error(format!("invalid key in {}", item)))?;
            pairs.push((key.to_string(), translate_expression(&item[arrow + 2..])));
        }
        Ok(pairs)
    }

    fn component(&self, args: &str) -> ViewResult<String> {
        let parts = split_args(args);
        let name = unquote(parts[0]).ok_or_else(|| self.error("@component needs a quoted name"))?;
        let mut kwargs = vec![format!("_component=\"{}\"", name)];
        let mut has_token = false;
        if let Some(props) = parts.get(1) {
            for (key, value) in self.pairs(props)? {
                has_token |= key == "csrf_token";
                kwargs.push(format!("{}={}", key, value));
            }
        }
        if !has_token {
            kwargs.push("csrf_token=csrf_token".to_string());
        }
        Ok(format!("{{% filter component({}) %}}", kwargs.join(", ")))
    }
}

fn opener_of(end: &str) -> &'static str {
    match end {
        "endunless" => "unless",
        "endisset" => "isset",
        "endempty" => "empty",
        "endauth" => "auth",
        "endguest" => "guest",
        "endcan" => "can",
        "endcannot" => "cannot",
        "endcanany" => "canany",
        "endenv" => "env",
        "endproduction" => "production",
        _ => "if",
    }
}

/// `users.index` → `users/index.html`; names already ending in `.html` are kept
pub fn template_name(view: &str) -> String {
    if view.ends_with(".html") {
        view.to_string()
    } else {
        format!("{}.html", view.replace('.', "/"))
    }
}

/// Rewrite a Blade expression into tera syntax
pub fn translate_expression(expr: &str) -> String {
    let expr = expr.trim();
    if let Some(at) = find_top_level(expr, "??") {
        return format!(
            "{} | default(value={})",
            translate_expression(&expr[..at]),
            translate_expression(&expr[at + 2..])
        );
    }
    segments(expr)
        .into_iter()
        .map(|(quoted, part)| if quoted { part.to_string() } else { translate_code(part) })
        .collect()
}

/// Echo of an inline `@section`/`@yield` value. Tera skips autoescaping for
/// string concatenation, so the engine's `e` filter is applied explicitly.
fn escaped_echo(expr: &str) -> String {
    format!("{{{{ {} | e }}}}", translate_expression(expr))
}

fn translate_code(code: &str) -> String {
    let code = LOOP_ITERATION.replace_all(code, "loop.index");
    let code = LOOP_INDEX.replace_all(&code, "loop.index0");
    let code = VARIABLE.replace_all(&code, "$1");
    code.replace("->", ".")
        .replace("!==", "!=")
        .replace("===", "==")
        .replace("&&", " and ")
        .replace("||", " or ")
        .replace("!=", "\u{1}")
        .replace('!', "not ")
        .replace('\u{1}', "!=")
}

/// Split into `(quoted, text)` runs so string literals are left alone
fn segments(expr: &str) -> Vec<(bool, &str)> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in expr.char_indices() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    parts.push((true, &expr[start..=i]));
                    start = i + 1;
                    quote = None;
                }
            }
            None if c == '\'' || c == '"' => {
                if start < i {
                    parts.push((false, &expr[start..i]));
                }
                start = i;
                quote = Some(c);
            }
            None => {}
        }
    }
    if start < expr.len() {
        parts.push((quote.is_some(), &expr[start..]));
    }
    parts
}

/// Byte offset of `needle` outside of quotes and brackets
fn find_top_level(s: &str, needle: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ if depth == 0 && s[i..].starts_with(needle) => return Some(i),
            _ => {}
        }
    }
    None
}

fn split_args(s: &str) -> Vec<&str> {
    let mut args = Vec::new();
    let mut rest = s;
    while let Some(comma) = find_top_level(rest, ",") {
        args.push(rest[..comma].trim());
        rest = &rest[comma + 1..];
    }
    if !rest.trim().is_empty() || args.is_empty() {
        args.push(rest.trim());
    }
    args
}

/// Items of `['a', 'b']`, or the single argument when it is not a list
fn list_items(s: &str) -> Vec<&str> {
    let trimmed = s.trim();
    match trimmed.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        Some(inner) => split_args(inner),
        None => vec![trimmed],
    }
}

/// Contents of a balanced `( ... )` at the start of `s` and the bytes consumed
fn balanced(s: &str) -> Option<(&str, usize)> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some((&s[1..i], i + 1));
                }
            }
            _ => {}
        }
    }
    None
}

fn unquote(s: &str) -> Option<&str> {
    let s = s.trim();
    let first = s.chars().next()?;
    if (first == '\'' || first == '"') && s.len() >= 2 && s.ends_with(first) {
        Some(&s[1..s.len() - 1])
    } else {
        None
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
