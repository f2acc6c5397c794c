use std::collections::HashMap;

/// Binary operator precedence, keyed by the operator character.
///
/// Every stored precedence is positive; a missing entry means the character
/// is not an infix operator.
#[derive(Debug, Clone)]
pub struct OperatorTable {
    precedence: HashMap<char, i32>,
}

/// The entry an operator had before `OperatorTable::define` replaced it.
#[derive(Debug, Clone, Copy, PartialEq)]
#[must_use]
pub struct Snapshot {
    op: char,
    previous: Option<i32>,
}

impl OperatorTable {
    pub fn empty() -> Self {
        OperatorTable {
            precedence: HashMap::new(),
        }
    }

    pub fn precedence(&self, op: char) -> Option<i32> {
        self.precedence.get(&op).copied().filter(|&p| p > 0)
    }

    /// Installs `op` with `precedence`, returning what to restore on rollback.
    /// Non-positive precedences remove the entry instead.
    pub fn define(&mut self, op: char, precedence: i32) -> Snapshot {
        let previous = if precedence > 0 {
            self.precedence.insert(op, precedence)
        } else {
            self.precedence.remove(&op)
        };
        Snapshot { op, previous }
    }

    pub fn restore(&mut self, snapshot: Snapshot) {
        match snapshot.previous {
            Some(p) => self.precedence.insert(snapshot.op, p),
            None => self.precedence.remove(&snapshot.op),
        };
    }
}

impl Default for OperatorTable {
    fn default() -> Self {
        let mut table = OperatorTable::empty();
        for &(op, prec) in &[('=', 2), ('<', 10), ('+', 20), ('-', 20), ('*', 40)] {
            let _ = table.define(op, prec);
        }
        table
    }
}
