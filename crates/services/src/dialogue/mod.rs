//! Dialogue logic expressions, e.g. `must greet and name then verify then close`.
//!
//! An expression is a chain of clauses separated by `then`; each clause lists
//! the ids (joined by `and`) that must all be seen before the chain advances.
//! An id prefixed with `not` must never be seen instead. A chain led by `if`
//! also holds when its first clause never triggers.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExpressionError {
    #[error("Empty expression")]
    Empty,
    #[error("Expression must start with 'if' or 'must', found '{0}'")]
    InvalidLead(String),
    #[error("Repeated 'and'")]
    RepeatedAnd,
    #[error("Clause without ids before '{0}'")]
    EmptyClause(String),
    #[error("Missing 'and' or 'then' between '{0}' and '{1}'")]
    MissingConnective(String, String),
    #[error("Expression ends with '{0}'")]
    DanglingConnective(String),
    #[error("Unexpected keyword '{0}'")]
    UnexpectedKeyword(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    If,
    Must,
    Then,
    And,
    Not,
}

impl Keyword {
    fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "if" => Some(Keyword::If),
            "must" => Some(Keyword::Must),
            "then" => Some(Keyword::Then),
            "and" => Some(Keyword::And),
            "not" => Some(Keyword::Not),
            _ => None,
        }
    }
}

/// One clause of the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateNode {
    required: Vec<String>,
    forbidden: Vec<String>,
    is_final: bool,
}

impl StateNode {
    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Ids negated with `not`; the clause cannot hold once any of them is seen.
    pub fn forbidden(&self) -> &[String] {
        &self.forbidden
    }

    /// Whether a run that never leaves this node is accepted.
    pub fn is_final(&self) -> bool {
        self.is_final
    }

    fn is_open(&self, said: &HashSet<&str>) -> bool {
        self.forbidden.iter().all(|id| !said.contains(id.as_str()))
    }
}

/// Limits checked on top of clause order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowLimits {
    /// Times the whole chain has to complete; zero counts as once.
    pub repeat: usize,
    /// Per id, the most groups it may come after the previous clause
    /// completed. Occurrences further away do not count.
    pub max_gap: HashMap<String, usize>,
}

/// Evaluation state of one `accepts` call.
#[derive(Debug, Default)]
struct Progress {
    cursor: usize,
    completed: usize,
    satisfied: HashSet<usize>,
    /// 1-based group position at which the previous clause completed.
    last_step: usize,
}

impl Progress {
    fn advance(&mut self, nodes: &[StateNode], step: usize, said: &HashSet<&str>) {
        self.cursor += 1;
        self.satisfied.clear();
        self.last_step = step;
        self.skip_negated(nodes, said);
    }

    /// Steps over clauses that only forbid ids and still hold, wrapping to a
    /// new cycle after the last clause. Needs at least one clause with
    /// required ids to terminate.
    fn skip_negated(&mut self, nodes: &[StateNode], said: &HashSet<&str>) {
        loop {
            if self.cursor == nodes.len() {
                self.completed += 1;
                self.cursor = 0;
            }
            let node = &nodes[self.cursor];
            if node.required.is_empty() && node.is_open(said) {
                self.cursor += 1;
            } else {
                return;
            }
        }
    }
}

/// Compiled dialogue logic. Evaluation never mutates the machine, so one
/// compiled expression can be shared and reused freely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowMachine {
    expression: String,
    nodes: Vec<StateNode>,
}

impl FlowMachine {
    pub fn compile(expression: &str) -> Result<Self, ExpressionError> {
        let mut tokens = expression.split_whitespace();
        let lead = tokens.next().ok_or(ExpressionError::Empty)?;
        let vacuous = match Keyword::parse(lead) {
            Some(Keyword::If) => true,
            Some(Keyword::Must) => false,
            _ => return Err(ExpressionError::InvalidLead(lead.to_string())),
        };

        let mut nodes: Vec<StateNode> = Vec::new();
        let mut clause: Vec<String> = Vec::new();
        let mut forbidden: Vec<String> = Vec::new();
        let mut negate = false;
        // last token kept for error reporting; None right after a clause opener
        let mut prev: Option<(&str, Option<Keyword>)> = None;

        for token in tokens {
            match Keyword::parse(token) {
                Some(Keyword::And) => match prev {
                    Some((_, None)) => prev = Some((token, Some(Keyword::And))),
                    Some((_, Some(Keyword::And))) => return Err(ExpressionError::RepeatedAnd),
                    _ => return Err(ExpressionError::EmptyClause(token.to_string())),
                },
                Some(Keyword::Then) => match prev {
                    Some((_, None)) => {
                        nodes.push(StateNode {
                            required: std::mem::take(&mut clause),
                            forbidden: std::mem::take(&mut forbidden),
                            is_final: false,
                        });
                        prev = None;
                    }
                    _ => return Err(ExpressionError::EmptyClause(token.to_string())),
                },
                Some(Keyword::Not) => {
                    if let Some((last, None)) = prev {
                        return Err(ExpressionError::MissingConnective(
                            last.to_string(),
                            token.to_string(),
                        ));
                    }
                    negate = !negate;
                    prev = Some((token, Some(Keyword::Not)));
                }
                Some(_) => return Err(ExpressionError::UnexpectedKeyword(token.to_string())),
                None => {
                    if let Some((last, None)) = prev {
                        return Err(ExpressionError::MissingConnective(
                            last.to_string(),
                            token.to_string(),
                        ));
                    }
                    let target = if negate { &mut forbidden } else { &mut clause };
                    if !target.iter().any(|id| id == token) {
                        target.push(token.to_string());
                    }
                    negate = false;
                    prev = Some((token, None));
                }
            }
        }

        match prev {
            Some((_, None)) => nodes.push(StateNode {
                required: clause,
                forbidden,
                is_final: false,
            }),
            Some((last, Some(_))) => {
                return Err(ExpressionError::DanglingConnective(last.to_string()));
            }
            None if nodes.is_empty() => {
                return Err(ExpressionError::EmptyClause(lead.to_string()));
            }
            None => return Err(ExpressionError::DanglingConnective("then".to_string())),
        }

        if let Some(first) = nodes.first_mut() {
            first.is_final = vacuous;
        }

        Ok(Self {
            expression: expression.to_string(),
            nodes,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn nodes(&self) -> &[StateNode] {
        &self.nodes
    }

    /// Every id any clause requires.
    pub fn required_ids(&self) -> HashSet<&str> {
        self.nodes
            .iter()
            .flat_map(|n| n.required.iter().map(String::as_str))
            .collect()
    }

    /// Evaluates a `|`-separated sequence of `,`-separated id groups,
    /// e.g. `"greet,name|verify"`.
    pub fn accepts(&self, sequence: &str) -> bool {
        self.accepts_groups(sequence.split('|').map(|group| {
            group
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
        }))
    }

    /// Evaluates id groups in order. Ids inside one group apply one after
    /// another, so a single group may complete several clauses.
    pub fn accepts_groups<G, I, S>(&self, groups: G) -> bool
    where
        G: IntoIterator<Item = I>,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.accepts_limited(groups, &FlowLimits::default())
    }

    /// Like [`FlowMachine::accepts_groups`], with repeat and distance limits.
    ///
    /// After the last clause completes the chain starts over, until it has
    /// completed `limits.repeat` times.
    pub fn accepts_limited<G, I, S>(&self, groups: G, limits: &FlowLimits) -> bool
    where
        G: IntoIterator<Item = I>,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let groups: Vec<Vec<S>> = groups
            .into_iter()
            .map(|group| group.into_iter().collect())
            .collect();
        let said: HashSet<&str> = groups.iter().flatten().map(|id| id.as_ref()).collect();

        if self.nodes.iter().all(|n| n.required.is_empty()) {
            return self.nodes.iter().all(|n| n.is_open(&said));
        }

        let repeat = limits.repeat.max(1);
        let mut progress = Progress::default();
        progress.skip_negated(&self.nodes, &said);

        'scan: for (at, group) in groups.iter().enumerate() {
            let step = at + 1;
            for id in group {
                if progress.completed >= repeat {
                    break 'scan;
                }
                let node = &self.nodes[progress.cursor];
                if !node.is_open(&said) {
                    break 'scan;
                }
                let id = id.as_ref();
                let Some(pos) = node.required.iter().position(|r| r == id) else {
                    continue;
                };
                if progress.cursor > 0 {
                    let too_far = limits
                        .max_gap
                        .get(id)
                        .is_some_and(|gap| step.saturating_sub(progress.last_step) > *gap);
                    if too_far {
                        continue;
                    }
                }
                if progress.satisfied.insert(pos) && progress.satisfied.len() == node.required.len()
                {
                    progress.advance(&self.nodes, step, &said);
                }
            }
        }

        progress.completed >= repeat || (progress.cursor == 0 && self.nodes[0].is_final)
    }
}

impl FromStr for FlowMachine {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::compile(s)
    }
}

impl fmt::Display for FlowMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}
