//! Statement tree of a function body.
//!
//! A body is an arena of [`Stmt`]s: blocks, which own a scope and an ordered
//! list of statements, and commands, which own the blocks they run. Every
//! statement knows its parent so the checker can walk out of nested blocks
//! when control leaves them.

use zinnia_core::{Operator, ScopeId, Span};

use crate::pipeline::Expression;

/// Handle of a statement in a [`FunctionBody`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StmtId(pub u32);

impl StmtId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The kind of a [`Command`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Expression,
    /// Loop without a condition.
    Cycle,
    While,
    DoWhile,
    For,
    If,
    Try,
    Return,
    Break,
    Continue,
    Goto,
    Label,
    Throw,
    Rethrow,
}

impl CommandKind {
    #[inline]
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            CommandKind::Return | CommandKind::Break | CommandKind::Continue | CommandKind::Goto
        )
    }

    #[inline]
    pub fn is_loop(self) -> bool {
        matches!(
            self,
            CommandKind::Cycle | CommandKind::While | CommandKind::DoWhile | CommandKind::For
        )
    }
}

/// Compile-time knowledge about a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionResult {
    True,
    False,
    Unknown,
}

impl ConditionResult {
    pub fn of(expr: Option<&Expression>) -> Self {
        match expr.map(|e| e.root.condition_result()) {
            // A missing condition never ends the loop.
            None => ConditionResult::True,
            Some(Some(true)) => ConditionResult::True,
            Some(Some(false)) => ConditionResult::False,
            Some(None) => ConditionResult::Unknown,
        }
    }
}

impl From<bool> for ConditionResult {
    fn from(value: bool) -> Self {
        if value {
            ConditionResult::True
        } else {
            ConditionResult::False
        }
    }
}

/// A statement that is not a block.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Expression(Expression),
    Cycle {
        body: StmtId,
    },
    While {
        condition: Expression,
        body: StmtId,
    },
    DoWhile {
        body: StmtId,
        condition: Expression,
    },
    For {
        init: Option<Expression>,
        condition: Option<Expression>,
        step: Option<Expression>,
        body: StmtId,
    },
    /// `if`/`else if` chain; each condition guards the block next to it.
    If {
        branches: Vec<(Expression, StmtId)>,
        otherwise: Option<StmtId>,
    },
    Try {
        body: StmtId,
        catch: Option<StmtId>,
        finally: Option<StmtId>,
    },
    Return(Option<Expression>),
    Break,
    Continue,
    Goto(String),
    Label(String),
    Throw(Expression),
    Rethrow,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Expression(_) => CommandKind::Expression,
            Command::Cycle { .. } => CommandKind::Cycle,
            Command::While { .. } => CommandKind::While,
            Command::DoWhile { .. } => CommandKind::DoWhile,
            Command::For { .. } => CommandKind::For,
            Command::If { .. } => CommandKind::If,
            Command::Try { .. } => CommandKind::Try,
            Command::Return(_) => CommandKind::Return,
            Command::Break => CommandKind::Break,
            Command::Continue => CommandKind::Continue,
            Command::Goto(_) => CommandKind::Goto,
            Command::Label(_) => CommandKind::Label,
            Command::Throw(_) => CommandKind::Throw,
            Command::Rethrow => CommandKind::Rethrow,
        }
    }

    /// Blocks owned by the command, in source order.
    pub fn blocks(&self) -> Vec<StmtId> {
        match self {
            Command::Cycle { body }
            | Command::While { body, .. }
            | Command::DoWhile { body, .. }
            | Command::For { body, .. } => vec![*body],
            Command::If { branches, otherwise } => branches
                .iter()
                .map(|(_, block)| *block)
                .chain(*otherwise)
                .collect(),
            Command::Try {
                body,
                catch,
                finally,
            } => std::iter::once(*body).chain(*catch).chain(*finally).collect(),
            _ => Vec::new(),
        }
    }

    /// Body of a loop command.
    pub fn loop_body(&self) -> Option<StmtId> {
        match self {
            Command::Cycle { body }
            | Command::While { body, .. }
            | Command::DoWhile { body, .. }
            | Command::For { body, .. } => Some(*body),
            _ => None,
        }
    }

    /// Whether the body of a loop runs at least once.
    ///
    /// `for (i = c0; i REL c1; ...)` with constant bounds is decided by
    /// comparing the bounds.
    pub fn will_run(&self) -> ConditionResult {
        match self {
            Command::Cycle { .. } | Command::DoWhile { .. } => ConditionResult::True,
            Command::While { condition, .. } => ConditionResult::of(Some(condition)),
            Command::For {
                init, condition, ..
            } => match ConditionResult::of(condition.as_ref()) {
                ConditionResult::Unknown => init
                    .as_ref()
                    .zip(condition.as_ref())
                    .and_then(|(init, condition)| first_iteration(init, condition))
                    .map_or(ConditionResult::Unknown, ConditionResult::from),
                known => known,
            },
            _ => ConditionResult::Unknown,
        }
    }

    /// The condition checked after each iteration of a loop.
    pub fn loop_condition(&self) -> ConditionResult {
        match self {
            Command::Cycle { .. } => ConditionResult::True,
            Command::While { condition, .. } | Command::DoWhile { condition, .. } => {
                ConditionResult::of(Some(condition))
            }
            Command::For { condition, .. } => ConditionResult::of(condition.as_ref()),
            _ => ConditionResult::False,
        }
    }
}

/// Evaluate `i REL c1` for the initial value of `i = c0`.
fn first_iteration(init: &Expression, condition: &Expression) -> Option<bool> {
    let init = &init.root;
    if !init.is_op(Operator::Assignment) {
        return None;
    }
    let var = init.children[0].ident()?;
    let start = init.children[1].const_value()?;

    let condition = &condition.root;
    let op = condition.operator().filter(|op| op.is_rel_equality())?;
    let (left, right) = (&condition.children[0], &condition.children[1]);
    let (op, bound) = if left.ident() == Some(var) {
        (op, right.const_value()?)
    } else if right.ident() == Some(var) {
        (op.mirrored(), left.const_value()?)
    } else {
        return None;
    };

    if start.kind() != bound.kind() {
        return None;
    }
    start.do_operation(Some(bound), op)?.as_bool()
}

/// Statement payload.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Block { scope: ScopeId, children: Vec<StmtId> },
    Command(Command),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub parent: Option<StmtId>,
    pub span: Span,
}

impl Stmt {
    pub fn command(&self) -> Option<&Command> {
        match &self.kind {
            StmtKind::Command(command) => Some(command),
            StmtKind::Block { .. } => None,
        }
    }

    #[inline]
    pub fn is_block(&self) -> bool {
        matches!(self.kind, StmtKind::Block { .. })
    }
}

/// The statements of one function body.
///
/// Blocks are created detached with [`block`] and become part of the tree
/// when the command owning them is pushed:
///
/// ```ignore
/// let mut body = FunctionBody::new(scope, span);
/// let then = body.block(scope);
/// body.push(then, span, Command::Expression(assign_x));
/// body.push(body.root(), span, Command::If { branches: vec![(cond, then)], otherwise: None });
/// ```
///
/// [`block`]: FunctionBody::block
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionBody {
    /// The function scope; holds the parameters and numbers the locals.
    pub scope: ScopeId,
    /// Reported by `NotAllPathReturn`.
    pub declaration: Span,
    stmts: Vec<Stmt>,
}

impl FunctionBody {
    pub fn new(scope: ScopeId, declaration: Span) -> Self {
        Self {
            scope,
            declaration,
            stmts: vec![Stmt {
                kind: StmtKind::Block {
                    scope,
                    children: Vec::new(),
                },
                parent: None,
                span: declaration,
            }],
        }
    }

    /// The outermost block.
    #[inline]
    pub fn root(&self) -> StmtId {
        StmtId(0)
    }

    #[inline]
    pub fn get(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }

    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.len() == 1 && self.children(self.root()).is_empty()
    }

    /// A detached block with its own scope.
    pub fn block(&mut self, scope: ScopeId) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        self.stmts.push(Stmt {
            kind: StmtKind::Block {
                scope,
                children: Vec::new(),
            },
            parent: None,
            span: Span::default(),
        });
        id
    }

    /// Append `command` to `block` and attach the blocks it owns.
    ///
    /// # Panics
    ///
    /// Panics if `block` is not a block or one of the command's blocks is
    /// already attached.
    pub fn push(&mut self, block: StmtId, span: Span, command: Command) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        for child in command.blocks() {
            let child = &mut self.stmts[child.index()];
            assert!(
                child.is_block() && child.parent.is_none(),
                "statement {:?} cannot be owned by a new command",
                id
            );
            child.parent = Some(id);
            child.span = span;
        }
        self.stmts.push(Stmt {
            kind: StmtKind::Command(command),
            parent: Some(block),
            span,
        });
        match &mut self.stmts[block.index()].kind {
            StmtKind::Block { children, .. } => children.push(id),
            StmtKind::Command(_) => panic!("statement {block:?} is not a block"),
        }
        id
    }

    /// Statements of a block; empty for commands.
    pub fn children(&self, id: StmtId) -> &[StmtId] {
        match &self.get(id).kind {
            StmtKind::Block { children, .. } => children,
            StmtKind::Command(_) => &[],
        }
    }

    #[inline]
    pub fn parent(&self, id: StmtId) -> Option<StmtId> {
        self.get(id).parent
    }

    #[inline]
    pub fn command(&self, id: StmtId) -> Option<&Command> {
        self.get(id).command()
    }

    /// Scope a statement runs in: its own for blocks, the enclosing block's
    /// for commands.
    pub fn scope_of(&self, id: StmtId) -> ScopeId {
        let mut current = id;
        loop {
            match &self.get(current).kind {
                StmtKind::Block { scope, .. } => return *scope,
                StmtKind::Command(_) => match self.parent(current) {
                    Some(parent) => current = parent,
                    None => return self.scope,
                },
            }
        }
    }

    /// Ancestors of `id`, innermost first, not including `id`.
    pub fn ancestors(&self, id: StmtId) -> impl Iterator<Item = StmtId> + '_ {
        std::iter::successors(self.parent(id), move |&current| self.parent(current))
    }

    /// Whether `id` is `ancestor` or nested inside it.
    pub fn is_within(&self, id: StmtId, ancestor: StmtId) -> bool {
        id == ancestor || self.ancestors(id).any(|a| a == ancestor)
    }

    /// The `Label` command named `name`.
    pub fn find_label(&self, name: &str) -> Option<StmtId> {
        self.stmts.iter().enumerate().find_map(|(index, stmt)| match stmt.command() {
            Some(Command::Label(label)) if label == name => Some(StmtId(index as u32)),
            _ => None,
        })
    }

    /// The `Try` command whose `finally` block is `block`.
    pub fn finally_owner(&self, block: StmtId) -> Option<StmtId> {
        let parent = self.parent(block)?;
        match self.command(parent)? {
            Command::Try {
                finally: Some(finally),
                ..
            } if *finally == block => Some(parent),
            _ => None,
        }
    }

    /// Commands of the body in source order.
    pub fn commands(&self) -> impl Iterator<Item = (StmtId, &Command)> + '_ {
        self.stmts
            .iter()
            .enumerate()
            .filter_map(|(index, stmt)| stmt.command().map(|c| (StmtId(index as u32), c)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{ExprNode, LinkArena, NodeVariables};
    use crate::testing::*;
    use zinnia_core::{ConstValue, ScopeKind};

    fn expression(root: crate::node::ExprNode) -> Expression {
        Expression {
            root,
            links: LinkArena::new(),
            vars: NodeVariables::default(),
        }
    }

    #[test]
    fn pushed_commands_own_their_blocks() {
        let mut f = Fixture::new();
        let inner = f.state.idents.create_scope(ScopeKind::Code, f.scope);
        let mut body = FunctionBody::new(f.scope, Span::default());
        let block = body.block(inner);
        let brk = body.push(block, Span::point(2, 5), Command::Break);
        let looped = body.push(body.root(), Span::point(1, 1), Command::Cycle { body: block });

        assert_eq!(body.parent(block), Some(looped));
        assert_eq!(body.children(body.root()), &[looped]);
        assert_eq!(body.scope_of(brk), inner);
        assert_eq!(body.scope_of(looped), f.scope);
        assert_eq!(body.ancestors(brk).collect::<Vec<_>>(), vec![block, looped, body.root()]);
        assert!(body.is_within(brk, looped));
        assert_eq!(body.command(looped).map(Command::kind), Some(CommandKind::Cycle));
    }

    #[test]
    fn finally_blocks_know_their_try() {
        let f = Fixture::new();
        let mut body = FunctionBody::new(f.scope, Span::default());
        let tried = body.block(f.scope);
        let finally = body.block(f.scope);
        let command = body.push(
            body.root(),
            Span::default(),
            Command::Try {
                body: tried,
                catch: None,
                finally: Some(finally),
            },
        );
        assert_eq!(body.finally_owner(finally), Some(command));
        assert_eq!(body.finally_owner(tried), None);
    }

    #[test]
    fn constant_bounds_decide_whether_a_for_loop_runs() {
        let mut f = Fixture::new();
        let int = f.int32();
        let i = f.local("i", int);
        let bound = |value| ExprNode::constant(ConstValue::integer(value), int, code("c"));
        let init = expression(assign(ExprNode::id(i, code("i")), bound(0)));
        let less = |value| {
            expression(op(Operator::Less, vec![ExprNode::id(i, code("i")), bound(value)]))
        };

        let mut body = FunctionBody::new(f.scope, Span::default());
        let runs = body.block(f.scope);
        let never = body.block(f.scope);
        let make = |condition, body| Command::For {
            init: Some(init.clone()),
            condition: Some(condition),
            step: None,
            body,
        };
        assert_eq!(make(less(10), runs).will_run(), ConditionResult::True);
        assert_eq!(make(less(0), never).will_run(), ConditionResult::False);

        let flipped = expression(op(Operator::Greater, vec![bound(10), ExprNode::id(i, code("i"))]));
        assert_eq!(make(flipped, runs).will_run(), ConditionResult::True);
    }

    #[test]
    fn missing_for_condition_loops_forever() {
        let f = Fixture::new();
        let mut body = FunctionBody::new(f.scope, Span::default());
        let block = body.block(f.scope);
        let command = Command::For {
            init: None,
            condition: None,
            step: None,
            body: block,
        };
        assert_eq!(command.will_run(), ConditionResult::True);
        assert_eq!(command.loop_condition(), ConditionResult::True);
    }
}
