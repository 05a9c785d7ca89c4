//! CSS and XPath query engine over a [`Tree`].
//!
//! Supported CSS: type, universal, `#id`, `.class`, attribute conditions
//! (`[a]`, `=`, `~=`, `|=`, `^=`, `$=`, `*=`, optional `i` flag), the four
//! combinators, selector groups, and the structural pseudo-classes
//! `:first-child`, `:last-child`, `:only-child`, `:first-of-type`,
//! `:last-of-type`, `:nth-child(an+b)`, `:nth-of-type(an+b)` and
//! `:not(compound)`.
//!
//! Supported XPath: absolute and relative location paths over the child and
//! descendant axes, name and `*` tests, and predicates made of positions,
//! `last()`, attribute existence, `=`/`!=` comparisons on `@attr`, `text()`
//! and `.`, `contains()`, `starts-with()`, `normalize-space()`, `not()`,
//! `and`, `or` and parentheses.
//!
//! Results are always distinct elements in document order.

use std::collections::BTreeSet;

use crate::dom::{NodeId, Tree};
use crate::locator::LocatorType;
use crate::result::{HealError, HealResult};

/// Whether a selector string is written as XPath
#[must_use]
pub fn is_xpath(selector: &str) -> bool {
    let trimmed = selector.trim_start();
    trimmed.starts_with('/') || trimmed.starts_with("./")
}

/// A compiled selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// CSS selector group
    Css(CssSelector),
    /// XPath location path
    XPath(XPathExpr),
}

impl Selector {
    /// Compile, detecting XPath by its leading `/` or `./`
    pub fn parse(selector: &str) -> HealResult<Self> {
        if is_xpath(selector) {
            XPathExpr::parse(selector).map(Self::XPath)
        } else {
            CssSelector::parse(selector).map(Self::Css)
        }
    }

    /// Matching elements in document order
    #[must_use]
    pub fn select(&self, tree: &Tree) -> Vec<NodeId> {
        match self {
            Self::Css(css) => css.select(tree),
            Self::XPath(xpath) => xpath.select(tree),
        }
    }
}

impl Tree {
    /// Run a CSS or XPath selector
    ///
    /// # Errors
    ///
    /// Returns [`HealError::Selector`] when the selector is outside the
    /// supported grammar.
    pub fn try_select(&self, selector: &str) -> HealResult<Vec<NodeId>> {
        Ok(Selector::parse(selector)?.select(self))
    }

    /// Run a selector, treating unsupported syntax as "matches nothing"
    #[must_use]
    pub fn select(&self, selector: &str) -> Vec<NodeId> {
        self.try_select(selector).unwrap_or_default()
    }

    /// Number of elements a selector matches (0 on unsupported syntax)
    #[must_use]
    pub fn count(&self, selector: &str) -> usize {
        self.select(selector).len()
    }

    /// Resolve a typed locator
    pub fn try_select_locator(
        &self,
        value: &str,
        locator_type: LocatorType,
    ) -> HealResult<Vec<NodeId>> {
        match locator_type {
            LocatorType::Css => Ok(CssSelector::parse(value)?.select(self)),
            LocatorType::Xpath => Ok(XPathExpr::parse(value)?.select(self)),
            LocatorType::Id => Ok(self.by_id(value)),
            LocatorType::Name => Ok(self
                .elements()
                .into_iter()
                .filter(|e| self.attr(*e, "name") == Some(value))
                .collect()),
        }
    }

    /// Resolve a typed locator, treating unsupported syntax as no match
    #[must_use]
    pub fn select_locator(&self, value: &str, locator_type: LocatorType) -> Vec<NodeId> {
        self.try_select_locator(value, locator_type)
            .unwrap_or_default()
    }
}

struct Cursor<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn eat(&mut self, token: &str) -> bool {
        let len = token.chars().count();
        let matches = self
            .chars
            .get(self.pos..self.pos + len)
            .is_some_and(|window| window.iter().copied().eq(token.chars()));
        if matches {
            self.pos += len;
        }
        matches
    }

    /// Eat a word that must not run on into an identifier
    fn eat_keyword(&mut self, word: &str) -> bool {
        let len = word.chars().count();
        let boundary = !self.peek_at(len).is_some_and(is_xpath_name_char);
        let matches = self
            .chars
            .get(self.pos..self.pos + len)
            .is_some_and(|w| w.iter().copied().eq(word.chars()));
        if matches && boundary {
            self.pos += len;
            return true;
        }
        false
    }

    fn expect(&mut self, token: &str) -> HealResult<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{token}'")))
        }
    }

    fn error(&self, message: impl AsRef<str>) -> HealError {
        HealError::selector(
            self.source,
            format!("{} at offset {}", message.as_ref(), self.pos),
        )
    }

    fn take_while(&mut self, accept: fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(ch) = self.peek() {
            if !accept(ch) {
                break;
            }
            out.push(ch);
            self.pos += 1;
        }
        out
    }

    /// CSS identifier with backslash escapes
    fn css_ident(&mut self) -> String {
        let mut out = String::new();
        while let Some(ch) = self.peek() {
            if ch == '\\' {
                self.pos += 1;
                if let Some(escaped) = self.bump() {
                    out.push(escaped);
                }
                continue;
            }
            if !is_css_name_char(ch) {
                break;
            }
            out.push(ch);
            self.pos += 1;
        }
        out
    }

    fn quoted(&mut self) -> HealResult<String> {
        let Some(quote) = self.bump().filter(|q| *q == '"' || *q == '\'') else {
            return Err(self.error("expected quoted string"));
        };
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some(ch) if ch == quote => return Ok(out),
                Some('\\') => {
                    if let Some(escaped) = self.bump() {
                        out.push(escaped);
                    }
                }
                Some(ch) => out.push(ch),
            }
        }
    }

    /// Raw text up to the `)` matching an already consumed `(`
    fn balanced_paren_body(&mut self) -> HealResult<String> {
        let mut depth = 1usize;
        let mut quote: Option<char> = None;
        let mut out = String::new();
        while let Some(ch) = self.bump() {
            match (quote, ch) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '"' | '\'') => quote = Some(ch),
                (None, '(') => depth += 1,
                (None, ')') => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(out);
                    }
                }
                _ => {}
            }
            out.push(ch);
        }
        Err(self.error("unbalanced parentheses"))
    }
}

fn is_css_name_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '-' || ch == '_' || !ch.is_ascii()
}

fn is_xpath_name_char(ch: char) -> bool {
    ch.is_alphanumeric() || matches!(ch, '-' | '_' | '.')
}

// ---------------------------------------------------------------------------
// CSS
// ---------------------------------------------------------------------------

/// Parsed CSS selector group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssSelector {
    groups: Vec<Vec<SelectorPart>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SelectorPart {
    step: SelectorStep,
    /// Relation to the part on the left; `None` for the leftmost part
    combinator: Option<Combinator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
    AdjacentSibling,
    GeneralSibling,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct SelectorStep {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrCondition>,
    pseudos: Vec<PseudoClass>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals,
    Includes,
    DashMatch,
    Prefix,
    Suffix,
    Substring,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrCondition {
    name: String,
    op: AttrOp,
    value: String,
    ignore_case: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Nth {
    a: i64,
    b: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PseudoClass {
    FirstChild,
    LastChild,
    OnlyChild,
    FirstOfType,
    LastOfType,
    NthChild(Nth),
    NthOfType(Nth),
    Not(Box<SelectorStep>),
}

impl CssSelector {
    /// Parse a selector group such as `form .row > input[type="email"]`
    pub fn parse(source: &str) -> HealResult<Self> {
        let mut cursor = Cursor::new(source);
        let mut groups = Vec::new();
        loop {
            cursor.skip_ws();
            groups.push(parse_chain(&mut cursor)?);
            if cursor.eat(",") {
                continue;
            }
            if cursor.is_eof() {
                break;
            }
            return Err(cursor.error("unexpected character"));
        }
        Ok(Self { groups })
    }

    /// Whether `node` matches any selector in the group
    #[must_use]
    pub fn matches(&self, tree: &Tree, node: NodeId) -> bool {
        self.groups
            .iter()
            .any(|parts| matches_chain(tree, node, parts))
    }

    /// Matching elements in document order
    #[must_use]
    pub fn select(&self, tree: &Tree) -> Vec<NodeId> {
        tree.elements()
            .into_iter()
            .filter(|node| self.matches(tree, *node))
            .collect()
    }
}

fn parse_chain(cursor: &mut Cursor<'_>) -> HealResult<Vec<SelectorPart>> {
    let mut parts: Vec<SelectorPart> = Vec::new();
    let mut pending: Option<Combinator> = None;
    loop {
        let step = parse_compound(cursor)?;
        let combinator = if parts.is_empty() {
            None
        } else {
            Some(pending.take().unwrap_or(Combinator::Descendant))
        };
        parts.push(SelectorPart { step, combinator });

        let had_ws = cursor.skip_ws();
        let explicit = match cursor.peek() {
            None | Some(',') => break,
            Some('>') => Some(Combinator::Child),
            Some('+') => Some(Combinator::AdjacentSibling),
            Some('~') => Some(Combinator::GeneralSibling),
            Some(_) if had_ws => None,
            Some(_) => return Err(cursor.error("unexpected character")),
        };
        if let Some(explicit) = explicit {
            cursor.bump();
            cursor.skip_ws();
            pending = Some(explicit);
        }
        if matches!(cursor.peek(), None | Some(',')) {
            return Err(cursor.error("dangling combinator"));
        }
    }
    Ok(parts)
}

fn parse_compound(cursor: &mut Cursor<'_>) -> HealResult<SelectorStep> {
    let start = cursor.pos;
    let mut step = SelectorStep::default();

    if cursor.eat("*") {
        // universal: no tag constraint
    } else if cursor
        .peek()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '\\')
    {
        step.tag = Some(cursor.css_ident().to_ascii_lowercase());
    }

    loop {
        match cursor.peek() {
            Some('#') => {
                cursor.bump();
                let id = cursor.css_ident();
                if id.is_empty() {
                    return Err(cursor.error("empty id selector"));
                }
                step.id = Some(id);
            }
            Some('.') => {
                cursor.bump();
                let class = cursor.css_ident();
                if class.is_empty() {
                    return Err(cursor.error("empty class selector"));
                }
                step.classes.push(class);
            }
            Some('[') => {
                cursor.bump();
                step.attrs.push(parse_attr_condition(cursor)?);
            }
            Some(':') => {
                cursor.bump();
                step.pseudos.push(parse_pseudo(cursor)?);
            }
            _ => break,
        }
    }

    if cursor.pos == start {
        return Err(cursor.error("expected selector"));
    }
    Ok(step)
}

fn parse_attr_condition(cursor: &mut Cursor<'_>) -> HealResult<AttrCondition> {
    cursor.skip_ws();
    let name = cursor.css_ident().to_ascii_lowercase();
    if name.is_empty() {
        return Err(cursor.error("empty attribute name"));
    }
    cursor.skip_ws();
    if cursor.eat("]") {
        return Ok(AttrCondition {
            name,
            op: AttrOp::Exists,
            value: String::new(),
            ignore_case: false,
        });
    }

    let op = [
        ("~=", AttrOp::Includes),
        ("|=", AttrOp::DashMatch),
        ("^=", AttrOp::Prefix),
        ("$=", AttrOp::Suffix),
        ("*=", AttrOp::Substring),
        ("=", AttrOp::Equals),
    ]
    .into_iter()
    .find_map(|(token, op)| cursor.eat(token).then_some(op))
    .ok_or_else(|| cursor.error("unknown attribute operator"))?;

    cursor.skip_ws();
    let value = if matches!(cursor.peek(), Some('"' | '\'')) {
        cursor.quoted()?
    } else {
        let bare = cursor.css_ident();
        if bare.is_empty() {
            return Err(cursor.error("missing attribute value"));
        }
        bare
    };
    cursor.skip_ws();
    let mut ignore_case = false;
    if cursor.eat("i") || cursor.eat("I") {
        ignore_case = true;
    } else if cursor.eat("s") || cursor.eat("S") {
        ignore_case = false;
    }
    cursor.skip_ws();
    cursor.expect("]")?;
    Ok(AttrCondition {
        name,
        op,
        value,
        ignore_case,
    })
}

fn parse_pseudo(cursor: &mut Cursor<'_>) -> HealResult<PseudoClass> {
    if cursor.peek() == Some(':') {
        return Err(cursor.error("pseudo-elements are not supported"));
    }
    let name = cursor.css_ident().to_ascii_lowercase();
    let arg = if cursor.eat("(") {
        Some(cursor.balanced_paren_body()?)
    } else {
        None
    };
    let pseudo = match (name.as_str(), arg) {
        ("first-child", None) => PseudoClass::FirstChild,
        ("last-child", None) => PseudoClass::LastChild,
        ("only-child", None) => PseudoClass::OnlyChild,
        ("first-of-type", None) => PseudoClass::FirstOfType,
        ("last-of-type", None) => PseudoClass::LastOfType,
        ("nth-child", Some(arg)) => PseudoClass::NthChild(parse_nth(&arg).ok_or_else(|| {
            cursor.error(format!("invalid :nth-child argument '{arg}'"))
        })?),
        ("nth-of-type", Some(arg)) => PseudoClass::NthOfType(parse_nth(&arg).ok_or_else(|| {
            cursor.error(format!("invalid :nth-of-type argument '{arg}'"))
        })?),
        ("not", Some(arg)) => {
            let mut inner = Cursor::new(arg.trim());
            let step = parse_compound(&mut inner)?;
            if !inner.is_eof() {
                return Err(cursor.error(":not() takes a single compound selector"));
            }
            PseudoClass::Not(Box::new(step))
        }
        (other, _) => return Err(cursor.error(format!("unsupported pseudo-class ':{other}'"))),
    };
    Ok(pseudo)
}

fn parse_nth(arg: &str) -> Option<Nth> {
    let compact: String = arg
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    match compact.as_str() {
        "odd" => return Some(Nth { a: 2, b: 1 }),
        "even" => return Some(Nth { a: 2, b: 0 }),
        _ => {}
    }
    let Some((coefficient, offset)) = compact.split_once('n') else {
        return compact.parse().ok().map(|b| Nth { a: 0, b });
    };
    let a = match coefficient {
        "" | "+" => 1,
        "-" => -1,
        other => other.parse().ok()?,
    };
    let b = if offset.is_empty() {
        0
    } else {
        offset.parse().ok()?
    };
    Some(Nth { a, b })
}

impl Nth {
    fn matches(self, position: usize) -> bool {
        let position = position as i64;
        if self.a == 0 {
            return position == self.b;
        }
        let diff = position - self.b;
        diff % self.a == 0 && diff / self.a >= 0
    }
}

fn matches_chain(tree: &Tree, node: NodeId, parts: &[SelectorPart]) -> bool {
    let Some((last, rest)) = parts.split_last() else {
        return false;
    };
    if !matches_step(tree, node, &last.step) {
        return false;
    }
    if rest.is_empty() {
        return true;
    }
    match last.combinator.unwrap_or(Combinator::Descendant) {
        Combinator::Descendant => tree
            .ancestors(node)
            .any(|ancestor| matches_chain(tree, ancestor, rest)),
        Combinator::Child => tree
            .parent_element(node)
            .is_some_and(|parent| matches_chain(tree, parent, rest)),
        Combinator::AdjacentSibling => tree
            .previous_element_sibling(node)
            .is_some_and(|prev| matches_chain(tree, prev, rest)),
        Combinator::GeneralSibling => {
            let (siblings, position) = tree.element_siblings(node);
            position.is_some_and(|p| {
                siblings[..p]
                    .iter()
                    .any(|prev| matches_chain(tree, *prev, rest))
            })
        }
    }
}

fn matches_step(tree: &Tree, node: NodeId, step: &SelectorStep) -> bool {
    let Some(tag) = tree.tag_name(node) else {
        return false;
    };
    if step.tag.as_deref().is_some_and(|t| t != tag) {
        return false;
    }
    if let Some(id) = &step.id {
        if tree.attr(node, "id") != Some(id.as_str()) {
            return false;
        }
    }
    if !step.classes.is_empty() {
        let classes = tree.classes(node);
        if !step.classes.iter().all(|c| classes.contains(&c.as_str())) {
            return false;
        }
    }
    step.attrs
        .iter()
        .all(|cond| cond.matches(tree.attr(node, &cond.name)))
        && step
            .pseudos
            .iter()
            .all(|pseudo| pseudo.matches(tree, node, tag))
}

impl AttrCondition {
    fn matches(&self, actual: Option<&str>) -> bool {
        let Some(actual) = actual else {
            return false;
        };
        let (actual, expected) = if self.ignore_case {
            (actual.to_lowercase(), self.value.to_lowercase())
        } else {
            (actual.to_string(), self.value.clone())
        };
        match self.op {
            AttrOp::Exists => true,
            AttrOp::Equals => actual == expected,
            AttrOp::Includes => actual.split_whitespace().any(|word| word == expected),
            AttrOp::DashMatch => {
                actual == expected || actual.starts_with(&format!("{expected}-"))
            }
            AttrOp::Prefix => !expected.is_empty() && actual.starts_with(&expected),
            AttrOp::Suffix => !expected.is_empty() && actual.ends_with(&expected),
            AttrOp::Substring => !expected.is_empty() && actual.contains(&expected),
        }
    }
}

impl PseudoClass {
    fn matches(&self, tree: &Tree, node: NodeId, tag: &str) -> bool {
        if let Self::Not(inner) = self {
            return !matches_step(tree, node, inner);
        }
        let (siblings, position) = tree.element_siblings(node);
        let Some(position) = position else {
            return false;
        };
        let of_type = || -> (usize, usize) {
            let same: Vec<NodeId> = siblings
                .iter()
                .copied()
                .filter(|s| tree.tag_name(*s) == Some(tag))
                .collect();
            let index = same.iter().position(|s| *s == node).unwrap_or(0);
            (index, same.len())
        };
        match self {
            Self::FirstChild => position == 0,
            Self::LastChild => position + 1 == siblings.len(),
            Self::OnlyChild => siblings.len() == 1,
            Self::FirstOfType => of_type().0 == 0,
            Self::LastOfType => {
                let (index, len) = of_type();
                index + 1 == len
            }
            Self::NthChild(nth) => nth.matches(position + 1),
            Self::NthOfType(nth) => nth.matches(of_type().0 + 1),
            Self::Not(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// XPath
// ---------------------------------------------------------------------------

/// Parsed XPath location path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XPathExpr {
    steps: Vec<XPathStep>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct XPathStep {
    axis: Axis,
    /// `None` for `*`
    name: Option<String>,
    predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    Position(usize),
    Last,
    Test(BoolExpr),
}

/// Disjunction of conjunctions
#[derive(Debug, Clone, PartialEq, Eq)]
struct BoolExpr(Vec<Vec<Term>>);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Term {
    Exists(Value),
    Compare {
        value: Value,
        op: CompareOp,
        literal: String,
    },
    Not(BoolExpr),
    Group(BoolExpr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Attr(String),
    Text,
    Context,
    Normalized(Box<Value>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Contains,
    StartsWith,
}

impl XPathExpr {
    /// Parse a location path such as `//form[@id='login']//button[2]`
    pub fn parse(source: &str) -> HealResult<Self> {
        let trimmed = source.trim();
        let mut cursor = Cursor::new(trimmed);
        let mut steps = Vec::new();

        let mut axis = if cursor.eat(".//") || cursor.eat("//") {
            Axis::Descendant
        } else {
            cursor.eat("./");
            cursor.eat("/");
            Axis::Child
        };

        loop {
            steps.push(parse_xpath_step(&mut cursor, axis)?);
            cursor.skip_ws();
            if cursor.is_eof() {
                break;
            }
            axis = if cursor.eat("//") {
                Axis::Descendant
            } else if cursor.eat("/") {
                Axis::Child
            } else {
                return Err(cursor.error("unexpected character"));
            };
        }
        Ok(Self { steps })
    }

    /// Matching elements in document order
    #[must_use]
    pub fn select(&self, tree: &Tree) -> Vec<NodeId> {
        let mut context = vec![tree.root()];
        for step in &self.steps {
            let mut next = BTreeSet::new();
            for node in &context {
                let parents: Vec<NodeId> = match step.axis {
                    Axis::Child => vec![*node],
                    Axis::Descendant => std::iter::once(*node)
                        .chain(tree.descendant_elements(*node))
                        .collect(),
                };
                for parent in parents {
                    next.extend(step.apply(tree, parent));
                }
            }
            context = next.into_iter().collect();
            if context.is_empty() {
                break;
            }
        }
        context.retain(|n| tree.is_element(*n));
        context
    }
}

fn parse_xpath_step(cursor: &mut Cursor<'_>, axis: Axis) -> HealResult<XPathStep> {
    cursor.skip_ws();
    let name = if cursor.eat("*") {
        None
    } else {
        let name = cursor.take_while(is_xpath_name_char);
        if name.is_empty() {
            return Err(cursor.error("expected element name"));
        }
        if cursor.eat("::") {
            return Err(cursor.error(format!("unsupported axis '{name}::'")));
        }
        if cursor.peek() == Some('(') {
            return Err(cursor.error(format!("unsupported node test '{name}()'")));
        }
        Some(name.to_ascii_lowercase())
    };

    let mut predicates = Vec::new();
    loop {
        cursor.skip_ws();
        if !cursor.eat("[") {
            break;
        }
        cursor.skip_ws();
        let predicate = if cursor.peek().is_some_and(|c| c.is_ascii_digit()) {
            let digits = cursor.take_while(|c| c.is_ascii_digit());
            let index: usize = digits
                .parse()
                .map_err(|_| cursor.error("invalid position"))?;
            if index == 0 {
                return Err(cursor.error("positions start at 1"));
            }
            Predicate::Position(index)
        } else if cursor.eat("last()") {
            Predicate::Last
        } else {
            Predicate::Test(parse_or(cursor)?)
        };
        cursor.skip_ws();
        cursor.expect("]")?;
        predicates.push(predicate);
    }

    Ok(XPathStep {
        axis,
        name,
        predicates,
    })
}

fn parse_or(cursor: &mut Cursor<'_>) -> HealResult<BoolExpr> {
    let mut alternatives = vec![parse_and(cursor)?];
    loop {
        cursor.skip_ws();
        if !cursor.eat_keyword("or") {
            break;
        }
        alternatives.push(parse_and(cursor)?);
    }
    Ok(BoolExpr(alternatives))
}

fn parse_and(cursor: &mut Cursor<'_>) -> HealResult<Vec<Term>> {
    let mut terms = vec![parse_term(cursor)?];
    loop {
        cursor.skip_ws();
        if !cursor.eat_keyword("and") {
            break;
        }
        terms.push(parse_term(cursor)?);
    }
    Ok(terms)
}

fn parse_value(cursor: &mut Cursor<'_>) -> HealResult<Value> {
    cursor.skip_ws();
    if cursor.eat("@") {
        let name = cursor.take_while(is_xpath_name_char);
        if name.is_empty() {
            return Err(cursor.error("expected attribute name"));
        }
        return Ok(Value::Attr(name.to_ascii_lowercase()));
    }
    if cursor.eat("text()") {
        return Ok(Value::Text);
    }
    if cursor.eat("normalize-space(") {
        cursor.skip_ws();
        let inner = if cursor.peek() == Some(')') {
            Value::Context
        } else {
            parse_value(cursor)?
        };
        cursor.skip_ws();
        cursor.expect(")")?;
        return Ok(Value::Normalized(Box::new(inner)));
    }
    if cursor.eat("string()") || cursor.eat(".") {
        return Ok(Value::Context);
    }
    Err(cursor.error("expected @attribute, text(), . or normalize-space()"))
}

fn parse_term(cursor: &mut Cursor<'_>) -> HealResult<Term> {
    cursor.skip_ws();
    if cursor.eat("not(") {
        let inner = parse_or(cursor)?;
        cursor.skip_ws();
        cursor.expect(")")?;
        return Ok(Term::Not(inner));
    }
    for (function, op) in [
        ("contains(", CompareOp::Contains),
        ("starts-with(", CompareOp::StartsWith),
    ] {
        if cursor.eat(function) {
            let value = parse_value(cursor)?;
            cursor.skip_ws();
            cursor.expect(",")?;
            cursor.skip_ws();
            let literal = cursor.quoted()?;
            cursor.skip_ws();
            cursor.expect(")")?;
            return Ok(Term::Compare { value, op, literal });
        }
    }
    if cursor.eat("(") {
        let inner = parse_or(cursor)?;
        cursor.skip_ws();
        cursor.expect(")")?;
        return Ok(Term::Group(inner));
    }

    let value = parse_value(cursor)?;
    cursor.skip_ws();
    let op = if cursor.eat("!=") {
        CompareOp::Ne
    } else if cursor.eat("=") {
        CompareOp::Eq
    } else {
        return Ok(Term::Exists(value));
    };
    cursor.skip_ws();
    let literal = cursor.quoted()?;
    Ok(Term::Compare { value, op, literal })
}

impl XPathStep {
    fn apply(&self, tree: &Tree, parent: NodeId) -> Vec<NodeId> {
        let mut matched: Vec<NodeId> = tree
            .element_children(parent)
            .into_iter()
            .filter(|child| {
                self.name
                    .as_deref()
                    .map_or(true, |name| tree.tag_name(*child) == Some(name))
            })
            .collect();
        for predicate in &self.predicates {
            let len = matched.len();
            matched = matched
                .into_iter()
                .enumerate()
                .filter(|(index, node)| match predicate {
                    Predicate::Position(p) => index + 1 == *p,
                    Predicate::Last => index + 1 == len,
                    Predicate::Test(expr) => expr.eval(tree, *node),
                })
                .map(|(_, node)| node)
                .collect();
        }
        matched
    }
}

fn normalize_space(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl Value {
    fn strings(&self, tree: &Tree, node: NodeId) -> Vec<String> {
        match self {
            Self::Attr(name) => tree.attr(node, name).map(str::to_string).into_iter().collect(),
            Self::Text => tree.own_texts(node).into_iter().map(str::to_string).collect(),
            Self::Context => vec![tree.text(node)],
            Self::Normalized(inner) => {
                let first = inner.strings(tree, node).into_iter().next().unwrap_or_default();
                vec![normalize_space(&first)]
            }
        }
    }
}

impl BoolExpr {
    fn eval(&self, tree: &Tree, node: NodeId) -> bool {
        self.0
            .iter()
            .any(|terms| terms.iter().all(|term| term.eval(tree, node)))
    }
}

impl Term {
    fn eval(&self, tree: &Tree, node: NodeId) -> bool {
        match self {
            Self::Exists(value) => value.strings(tree, node).iter().any(|s| match value {
                Value::Attr(_) => true,
                _ => !s.is_empty(),
            }),
            Self::Compare { value, op, literal } => {
                value.strings(tree, node).iter().any(|s| match op {
                    CompareOp::Eq => s == literal,
                    CompareOp::Ne => s != literal,
                    CompareOp::Contains => s.contains(literal.as_str()),
                    CompareOp::StartsWith => s.starts_with(literal.as_str()),
                })
            }
            Self::Not(inner) => !inner.eval(tree, node),
            Self::Group(inner) => inner.eval(tree, node),
        }
    }
}
