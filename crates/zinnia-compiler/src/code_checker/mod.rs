//! Statement-level flow analysis of function bodies.
//!
//! [`CodeChecker`] walks every path through a [`FunctionBody`], carrying
//! the set of locals that hold a value. Branches are walked as separate
//! paths; a path reaching a command another path already visited merges
//! into it and continues only if it knows less than the earlier visit. The
//! walk reports
//!
//! - reads of locals that are not assigned on every path (`UnassignedVar`),
//! - output reference parameters left unassigned on exit,
//! - jumps out of a `finally` block (`CannotLeaveFinally`),
//! - non-void functions whose end is reachable (`NotAllPathReturn`),
//!
//! and, once the walk is done, unused locals, locals that are written but
//! never read and the first command of every unreachable run.

mod command;
mod context;

pub use command::{Command, CommandKind, ConditionResult, FunctionBody, Stmt, StmtId, StmtKind};
pub use context::{Destination, FlowState, LocalSet, LocalUsage};

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;
use zinnia_core::{
    CompilationError, IdentFlags, IdentId, IdentKind, ReferenceMode, ScopeKind, Span, TypeKind,
    VariableKind,
};

use crate::pipeline::Expression;
use crate::state::CompilerState;

/// Check `body` and report into the state's diagnostics. Returns `false`
/// if an error was reported; warnings do not fail the check.
///
/// Does nothing when code checking is disabled in the configuration.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn check_function(state: &CompilerState, body: &FunctionBody) -> bool {
    if !state.config.check_code {
        return true;
    }
    CodeChecker::new(state, body).check()
}

enum Step {
    Enter(StmtId),
    Leave(StmtId),
    Stop,
}

/// Walks one function body.
pub struct CodeChecker<'a> {
    state: &'a CompilerState,
    body: &'a FunctionBody,
    /// Locals of the function, indexed by `local_index`.
    locals: &'a [IdentId],
    usage: Vec<LocalUsage>,
    /// Entry states of visited commands, one per pending-jump stack.
    visited: FxHashMap<StmtId, Vec<(Vec<(StmtId, Destination)>, LocalSet)>>,
    /// States at the start of loop bodies.
    heads: FxHashMap<(StmtId, Vec<(StmtId, Destination)>), LocalSet>,
    reported: FxHashSet<(IdentId, Span)>,
    rejected: FxHashSet<StmtId>,
    falls_off_end: bool,
    failed: bool,
}

impl<'a> CodeChecker<'a> {
    pub fn new(state: &'a CompilerState, body: &'a FunctionBody) -> Self {
        let locals = state.idents.locals(body.scope);
        Self {
            state,
            body,
            locals,
            usage: vec![LocalUsage::empty(); locals.len()],
            visited: FxHashMap::default(),
            heads: FxHashMap::default(),
            reported: FxHashSet::default(),
            rejected: FxHashSet::default(),
            falls_off_end: false,
            failed: false,
        }
    }

    /// Walk the body and report. Returns `false` if an error was reported.
    pub fn check(mut self) -> bool {
        let root = self.body.root();
        self.walk(Step::Enter(root), FlowState::new(self.locals.len()));

        self.report_usage();
        if self.falls_off_end && self.needs_return_value() {
            self.error(CompilationError::NotAllPathReturn {
                span: self.body.declaration,
            });
        }
        self.report_unreachable(root, false);

        debug!(
            statements = self.body.len(),
            visited = self.visited.len(),
            locals = self.locals.len(),
            failed = self.failed,
            "checked function body"
        );
        !self.failed
    }

    /// Whether `id` was reached on some path.
    pub fn is_reachable(&self, id: StmtId) -> bool {
        self.visited.contains_key(&id)
    }

    fn error(&mut self, error: CompilationError) {
        self.failed = true;
        self.state.diagnostics.add(error);
    }

    fn needs_return_value(&self) -> bool {
        match self.state.idents.scope(self.body.scope).kind {
            ScopeKind::Function { ret, .. } => !self.state.types.is_void(ret),
            _ => false,
        }
    }

    // ========================================================================
    // Walk
    // ========================================================================

    fn walk(&mut self, mut step: Step, mut flow: FlowState) {
        loop {
            step = match step {
                Step::Enter(id) => self.enter(id, &mut flow),
                Step::Leave(id) => self.leave(id, &mut flow),
                Step::Stop => return,
            };
        }
    }

    fn enter(&mut self, id: StmtId, flow: &mut FlowState) -> Step {
        let body = self.body;
        self.reset_outside(id, flow);

        let command = match &body.get(id).kind {
            StmtKind::Block { children, .. } => {
                return children.first().map_or(Step::Leave(id), |&first| Step::Enter(first));
            }
            StmtKind::Command(command) => command,
        };
        if !self.merge(id, flow) {
            return Step::Stop;
        }

        match command {
            Command::Expression(expr) => {
                self.process(expr, flow);
                Step::Leave(id)
            }
            Command::Label(_) => Step::Leave(id),
            Command::If {
                branches,
                otherwise,
            } => {
                for (condition, block) in branches {
                    self.process(condition, flow);
                    match ConditionResult::of(Some(condition)) {
                        ConditionResult::False => {}
                        // Later branches and `otherwise` are never taken.
                        ConditionResult::True => return Step::Enter(*block),
                        ConditionResult::Unknown => self.walk(Step::Enter(*block), flow.clone()),
                    }
                }
                otherwise.map_or(Step::Leave(id), Step::Enter)
            }
            Command::Cycle { .. }
            | Command::While { .. }
            | Command::DoWhile { .. }
            | Command::For { .. } => self.enter_loop(id, command, flow),
            Command::Try { body: tried, catch, .. } => {
                // The handler may run before any statement of the body.
                if let Some(catch) = catch {
                    self.walk(Step::Enter(*catch), flow.clone());
                }
                Step::Enter(*tried)
            }
            Command::Return(value) => {
                if let Some(value) = value {
                    self.process(value, flow);
                }
                self.jump(id, Destination::Return, flow)
            }
            Command::Break => match self.enclosing_loop(id) {
                Some((looped, _)) => self.jump(id, Destination::Leave(looped), flow),
                None => panic!("break outside of a loop at {:?}", body.get(id).span),
            },
            Command::Continue => match self.enclosing_loop(id) {
                Some((_, looped_body)) => self.jump(id, Destination::Leave(looped_body), flow),
                None => panic!("continue outside of a loop at {:?}", body.get(id).span),
            },
            Command::Goto(label) => match body.find_label(label) {
                Some(target) => self.jump(id, Destination::Enter(target), flow),
                None => {
                    if self.rejected.insert(id) {
                        self.error(CompilationError::UnknownId {
                            name: label.clone(),
                            span: body.get(id).span,
                        });
                    }
                    Step::Stop
                }
            },
            Command::Throw(value) => {
                self.process(value, flow);
                self.route(id, Destination::Raise, flow)
            }
            Command::Rethrow => self.route(id, Destination::Raise, flow),
        }
    }

    fn enter_loop(&mut self, id: StmtId, command: &Command, flow: &mut FlowState) -> Step {
        match command {
            Command::For {
                init, condition, ..
            } => {
                for expr in [init, condition].into_iter().flatten() {
                    self.process(expr, flow);
                }
            }
            Command::While { condition, .. } => self.process(condition, flow),
            _ => {}
        }

        let Some(body) = command.loop_body() else {
            return Step::Leave(id);
        };
        match command.will_run() {
            ConditionResult::False => Step::Leave(id),
            ConditionResult::True => {
                self.heads
                    .insert((id, flow.pending.clone()), flow.assigned.clone());
                Step::Enter(body)
            }
            ConditionResult::Unknown => {
                self.heads
                    .insert((id, flow.pending.clone()), flow.assigned.clone());
                self.walk(Step::Enter(body), flow.clone());
                Step::Leave(id)
            }
        }
    }

    /// The body of `looped` finished an iteration.
    fn end_iteration(&mut self, looped: StmtId, command: &Command, flow: &mut FlowState) -> Step {
        match command {
            Command::For {
                condition, step, ..
            } => {
                for expr in [step, condition].into_iter().flatten() {
                    self.process(expr, flow);
                }
            }
            Command::While { condition, .. } | Command::DoWhile { condition, .. } => {
                self.process(condition, flow)
            }
            _ => {}
        }

        let condition = command.loop_condition();
        if condition != ConditionResult::False
            && let Some(body) = command.loop_body()
        {
            let key = (looped, flow.pending.clone());
            let again = match self.heads.get_mut(&key) {
                Some(head) if head.is_subset(&flow.assigned) => None,
                Some(head) => {
                    head.intersect_with(&flow.assigned);
                    Some(head.clone())
                }
                None => {
                    self.heads.insert(key, flow.assigned.clone());
                    Some(flow.assigned.clone())
                }
            };
            if let Some(assigned) = again {
                let next = FlowState {
                    assigned,
                    pending: flow.pending.clone(),
                };
                self.walk(Step::Enter(body), next);
            }
        }

        if condition == ConditionResult::True {
            Step::Stop
        } else {
            Step::Leave(looped)
        }
    }

    fn leave(&mut self, id: StmtId, flow: &mut FlowState) -> Step {
        let body = self.body;
        let Some(parent) = body.parent(id) else {
            self.falls_off_end = true;
            self.exit(flow);
            return Step::Stop;
        };

        match &body.get(parent).kind {
            StmtKind::Block { children, .. } => {
                let next = children
                    .iter()
                    .position(|&child| child == id)
                    .and_then(|position| children.get(position + 1));
                next.map_or(Step::Leave(parent), |&next| Step::Enter(next))
            }
            StmtKind::Command(command) => match command {
                Command::If { .. } => Step::Leave(parent),
                Command::Cycle { .. }
                | Command::While { .. }
                | Command::DoWhile { .. }
                | Command::For { .. } => self.end_iteration(parent, command, flow),
                Command::Try { finally, .. } => match finally {
                    Some(finally) if *finally == id => match flow.pending.last() {
                        Some(&(owner, destination)) if owner == parent => {
                            flow.pending.pop();
                            self.route(parent, destination, flow)
                        }
                        _ => Step::Leave(parent),
                    },
                    Some(finally) => Step::Enter(*finally),
                    None => Step::Leave(parent),
                },
                _ => panic!("{:?} does not own blocks", command.kind()),
            },
        }
    }

    // ========================================================================
    // Jumps
    // ========================================================================

    /// Innermost loop around `id` and its body.
    fn enclosing_loop(&self, id: StmtId) -> Option<(StmtId, StmtId)> {
        let body = self.body;
        body.ancestors(id).find_map(|ancestor| {
            let looped = body.command(ancestor)?.loop_body()?;
            Some((ancestor, looped))
        })
    }

    /// Statement a jump from `from` to `destination` does not leave.
    fn jump_limit(&self, from: StmtId, destination: Destination) -> Option<StmtId> {
        let body = self.body;
        match destination {
            Destination::Leave(target) => Some(target),
            Destination::Enter(target) => body
                .ancestors(from)
                .find(|&ancestor| body.is_within(target, ancestor)),
            Destination::Return | Destination::Raise => None,
        }
    }

    /// An explicit jump: rejected if it leaves a `finally` block.
    fn jump(&mut self, from: StmtId, destination: Destination, flow: &mut FlowState) -> Step {
        let body = self.body;
        let limit = self.jump_limit(from, destination);
        let leaves_finally = body
            .ancestors(from)
            .take_while(|&ancestor| Some(ancestor) != limit)
            .any(|ancestor| body.finally_owner(ancestor).is_some());

        if leaves_finally {
            if self.rejected.insert(from) {
                self.error(CompilationError::CannotLeaveFinally {
                    span: body.get(from).span,
                });
            }
            return Step::Stop;
        }
        self.route(from, destination, flow)
    }

    /// Move control from `from` to `destination`, running the `finally`
    /// blocks left on the way first.
    fn route(&mut self, from: StmtId, destination: Destination, flow: &mut FlowState) -> Step {
        let body = self.body;
        let limit = self.jump_limit(from, destination);

        for ancestor in body.ancestors(from) {
            if Some(ancestor) == limit {
                break;
            }
            let Some(owner) = body.parent(ancestor) else {
                continue;
            };
            let Some(Command::Try {
                body: tried,
                catch,
                finally,
            }) = body.command(owner)
            else {
                continue;
            };

            if *finally == Some(ancestor) {
                continue;
            }
            if destination == Destination::Raise && *tried == ancestor && catch.is_some() {
                return Step::Stop;
            }
            if let Some(finally) = finally {
                flow.pending.push((owner, destination));
                return Step::Enter(*finally);
            }
        }

        match destination {
            Destination::Enter(target) => Step::Enter(target),
            Destination::Leave(target) => Step::Leave(target),
            Destination::Return => {
                self.exit(flow);
                Step::Stop
            }
            Destination::Raise => Step::Stop,
        }
    }

    /// Control leaves the function normally.
    fn exit(&mut self, flow: &FlowState) {
        let (state, locals) = (self.state, self.locals);
        for (index, &local) in locals.iter().enumerate() {
            let ident = state.idents.get(local);
            if !matches!(ident.kind, IdentKind::Variable(VariableKind::Parameter)) {
                continue;
            }
            let gets_assigned = matches!(
                state.types.kind(ident.ty),
                TypeKind::Reference {
                    mode: ReferenceMode::IdGetsAssigned,
                    ..
                }
            );
            if gets_assigned
                && !flow.assigned.contains(index)
                && self.reported.insert((local, ident.declaration))
            {
                self.error(CompilationError::UnassignedVar {
                    name: ident.name.clone(),
                    span: ident.declaration,
                });
            }
        }
    }

    // ========================================================================
    // Path state
    // ========================================================================

    /// Forget assignments of locals whose scope does not enclose `id`.
    fn reset_outside(&self, id: StmtId, flow: &mut FlowState) {
        let scope = self.body.scope_of(id);
        let (idents, locals) = (&self.state.idents, self.locals);
        let outside: Vec<usize> = flow
            .assigned
            .iter()
            .filter(|&index| {
                locals
                    .get(index)
                    .is_some_and(|&local| !idents.is_sub_scope_of(scope, idents.get(local).scope))
            })
            .collect();
        for index in outside {
            flow.assigned.remove(index);
        }
    }

    /// Record that `flow` reaches the command `id`. Returns whether the
    /// command has to be walked with the (possibly narrowed) state.
    fn merge(&mut self, id: StmtId, flow: &mut FlowState) -> bool {
        let entries = self.visited.entry(id).or_default();
        match entries.iter_mut().find(|(pending, _)| *pending == flow.pending) {
            None => {
                entries.push((flow.pending.clone(), flow.assigned.clone()));
                true
            }
            Some((_, stored)) if stored.is_subset(&flow.assigned) => false,
            Some((_, stored)) => {
                stored.intersect_with(&flow.assigned);
                flow.assigned = stored.clone();
                true
            }
        }
    }

    fn local_index(&self, id: IdentId) -> Option<usize> {
        let index = self.state.idents.get(id).local_index? as usize;
        (self.locals.get(index) == Some(&id)).then_some(index)
    }

    /// Apply the variable usage of an evaluated expression.
    fn process(&mut self, expr: &Expression, flow: &mut FlowState) {
        let state = self.state;
        let vars = &expr.vars;

        for &(id, span) in &vars.used_before_assign {
            let Some(index) = self.local_index(id) else {
                continue;
            };
            self.usage[index] |= LocalUsage::READ | LocalUsage::USED;

            let ident = state.idents.get(id);
            if !flow.assigned.contains(index)
                && !ident.flags.contains(IdentFlags::PRE_ASSIGNED)
                && self.reported.insert((id, span))
            {
                self.error(CompilationError::UnassignedVar {
                    name: ident.name.clone(),
                    span,
                });
            }
        }

        for &id in &vars.read {
            if let Some(index) = self.local_index(id) {
                self.usage[index] |= LocalUsage::READ | LocalUsage::USED;
            }
        }
        for &id in &vars.assigned {
            if let Some(index) = self.local_index(id) {
                flow.assigned.insert(index);
                self.usage[index] |= LocalUsage::USED;
            }
        }
        for &id in &vars.address_used {
            if let Some(index) = self.local_index(id) {
                flow.assigned.insert(index);
                self.usage[index] |= LocalUsage::USED | LocalUsage::ADDRESS_USED;
            }
        }
    }

    // ========================================================================
    // Reports
    // ========================================================================

    fn report_usage(&mut self) {
        let (state, locals) = (self.state, self.locals);
        for (index, &local) in locals.iter().enumerate() {
            let ident = state.idents.get(local);
            if !matches!(ident.kind, IdentKind::Variable(VariableKind::Local)) {
                continue;
            }

            let mut usage = self.usage[index];
            if ident.flags.contains(IdentFlags::USED) {
                usage |= LocalUsage::USED;
            }

            let name = ident.name.clone();
            let span = ident.declaration;
            if !usage.contains(LocalUsage::USED) && !ident.is_read_only() {
                state.diagnostics.add(CompilationError::UnusedId { name, span });
            } else if !usage.intersects(LocalUsage::READ | LocalUsage::ADDRESS_USED)
                && !ident.flags.contains(IdentFlags::PRE_ASSIGNED)
            {
                state
                    .diagnostics
                    .add(CompilationError::AssignedButNeverUsed { name, span });
            }
        }
    }

    /// Warn at the first command of every run of unreachable commands.
    fn report_unreachable(&self, block: StmtId, mut unreachable: bool) {
        let body = self.body;
        for &child in body.children(block) {
            let reached = self.is_reachable(child);
            if !reached && !unreachable {
                self.state.diagnostics.add(CompilationError::UnreachableCode {
                    span: body.get(child).span,
                });
            }
            unreachable = !reached;

            if let Some(command) = body.command(child) {
                for nested in command.blocks() {
                    self.report_unreachable(nested, unreachable);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{ExprNode, LinkArena, NodeVariables};
    use crate::testing::*;
    use zinnia_core::{CompilerConfig, ConstValue, Operator, Param, ScopeId, TypeId};

    fn line(n: u32) -> Span {
        Span::point(n, 1)
    }

    fn effect(vars: NodeVariables) -> Expression {
        Expression {
            root: ExprNode::literal(ConstValue::integer(0), code("0")),
            links: LinkArena::new(),
            vars,
        }
    }

    fn nothing() -> Expression {
        effect(NodeVariables::default())
    }

    fn writes(id: IdentId) -> Expression {
        effect(NodeVariables {
            assigned: vec![id],
            ..NodeVariables::default()
        })
    }

    fn reads(id: IdentId, at: u32) -> Expression {
        effect(NodeVariables {
            read: vec![id],
            used_before_assign: vec![(id, line(at))],
            ..NodeVariables::default()
        })
    }

    /// A condition with no constant value.
    fn unknown() -> Expression {
        Expression {
            root: name("flag"),
            links: LinkArena::new(),
            vars: NodeVariables::default(),
        }
    }

    /// A condition folded to `value`.
    fn fixed(value: bool) -> Expression {
        Expression {
            root: boolean(value),
            links: LinkArena::new(),
            vars: NodeVariables::default(),
        }
    }

    fn function(f: &mut Fixture, ret: TypeId) -> FunctionBody {
        let scope = f.state.function_scope(ScopeId::GLOBAL, ret, None);
        FunctionBody::new(scope, line(1))
    }

    fn void(f: &Fixture) -> TypeId {
        f.state.types.builtins().void
    }

    fn local(f: &mut Fixture, body: &FunctionBody, name: &str) -> IdentId {
        let int = f.int32();
        f.state
            .idents
            .create_local(body.scope, name, int, Span::point(1, 5))
            .unwrap()
    }

    fn block(body: &mut FunctionBody, commands: Vec<(u32, Command)>) -> StmtId {
        let block = body.block(body.scope);
        for (at, command) in commands {
            body.push(block, line(at), command);
        }
        block
    }

    fn unassigned_at(f: &Fixture, at: u32) -> usize {
        f.count(|e| matches!(e, CompilationError::UnassignedVar { span, .. } if *span == line(at)))
    }

    fn unreachable(f: &Fixture) -> Vec<Span> {
        f.state
            .diagnostics
            .messages()
            .into_iter()
            .filter(|e| matches!(e, CompilationError::UnreachableCode { .. }))
            .map(|e| e.span())
            .collect()
    }

    #[test]
    fn assignments_on_both_branches_reach_the_use() {
        let mut f = Fixture::new();
        let ret = void(&f);
        let mut body = function(&mut f, ret);
        let x = local(&mut f, &body, "x");
        let then = block(&mut body, vec![(3, Command::Expression(writes(x)))]);
        let otherwise = block(&mut body, vec![(4, Command::Expression(writes(x)))]);
        let root = body.root();
        body.push(
            root,
            line(2),
            Command::If {
                branches: vec![(unknown(), then)],
                otherwise: Some(otherwise),
            },
        );
        body.push(root, line(5), Command::Expression(reads(x, 5)));

        assert!(check_function(&f.state, &body));
        assert_eq!(f.state.diagnostics.error_count(), 0);
        assert_eq!(f.state.diagnostics.warning_count(), 0);
    }

    #[test]
    fn a_missing_else_leaves_the_variable_unassigned() {
        let mut f = Fixture::new();
        let ret = void(&f);
        let mut body = function(&mut f, ret);
        let x = local(&mut f, &body, "x");
        let then = block(&mut body, vec![(3, Command::Expression(writes(x)))]);
        let root = body.root();
        body.push(
            root,
            line(2),
            Command::If {
                branches: vec![(unknown(), then)],
                otherwise: None,
            },
        );
        body.push(root, line(5), Command::Expression(reads(x, 5)));

        assert!(!check_function(&f.state, &body));
        assert_eq!(unassigned_at(&f, 5), 1);
        assert_eq!(f.state.diagnostics.error_count(), 1);
    }

    #[test]
    fn a_constant_true_branch_always_assigns() {
        let mut f = Fixture::new();
        let ret = void(&f);
        let mut body = function(&mut f, ret);
        let x = local(&mut f, &body, "x");
        let then = block(&mut body, vec![(3, Command::Expression(writes(x)))]);
        let root = body.root();
        body.push(
            root,
            line(2),
            Command::If {
                branches: vec![(fixed(true), then)],
                otherwise: None,
            },
        );
        body.push(root, line(5), Command::Expression(reads(x, 5)));

        assert!(check_function(&f.state, &body));
        assert!(f.state.diagnostics.is_empty());
    }

    #[test]
    fn a_constant_false_branch_is_unreachable() {
        let mut f = Fixture::new();
        let ret = void(&f);
        let mut body = function(&mut f, ret);
        let then = block(&mut body, vec![(3, Command::Expression(nothing()))]);
        let root = body.root();
        body.push(
            root,
            line(2),
            Command::If {
                branches: vec![(fixed(false), then)],
                otherwise: None,
            },
        );
        body.push(root, line(5), Command::Expression(nothing()));

        assert!(check_function(&f.state, &body));
        assert_eq!(unreachable(&f), vec![line(3)]);
        assert_eq!(f.state.diagnostics.warning_count(), 1);
    }

    #[test]
    fn branches_after_a_constant_true_one_are_not_taken() {
        let mut f = Fixture::new();
        let ret = void(&f);
        let mut body = function(&mut f, ret);
        let first = block(&mut body, vec![(3, Command::Expression(nothing()))]);
        let second = block(&mut body, vec![(5, Command::Expression(nothing()))]);
        let otherwise = block(&mut body, vec![(7, Command::Expression(nothing()))]);
        let root = body.root();
        body.push(
            root,
            line(2),
            Command::If {
                branches: vec![(fixed(true), first), (unknown(), second)],
                otherwise: Some(otherwise),
            },
        );

        assert!(check_function(&f.state, &body));
        assert_eq!(unreachable(&f), vec![line(5), line(7)]);
    }

    #[test]
    fn code_after_return_is_reported_once() {
        let mut f = Fixture::new();
        let int = f.int32();
        let mut body = function(&mut f, int);
        let root = body.root();
        let one = ExprNode::constant(ConstValue::integer(1), int, code("1"));
        let value = Expression {
            root: one,
            links: LinkArena::new(),
            vars: NodeVariables::default(),
        };
        body.push(root, line(2), Command::Return(Some(value)));
        body.push(root, line(3), Command::Expression(nothing()));
        let nested = block(&mut body, vec![(5, Command::Expression(nothing()))]);
        body.push(
            root,
            line(4),
            Command::If {
                branches: vec![(unknown(), nested)],
                otherwise: None,
            },
        );

        assert!(check_function(&f.state, &body));
        assert_eq!(unreachable(&f), vec![line(3)]);
        assert_eq!(f.count(|e| matches!(e, CompilationError::NotAllPathReturn { .. })), 0);
    }

    #[test]
    fn non_void_functions_must_return_on_every_path() {
        let mut f = Fixture::new();
        let int = f.int32();
        let mut body = function(&mut f, int);
        let then = block(&mut body, vec![(3, Command::Return(None))]);
        let root = body.root();
        body.push(
            root,
            line(2),
            Command::If {
                branches: vec![(unknown(), then)],
                otherwise: None,
            },
        );
        assert!(!check_function(&f.state, &body));
        assert_eq!(
            f.count(|e| matches!(e, CompilationError::NotAllPathReturn { span } if *span == line(1))),
            1
        );

        let mut f = Fixture::new();
        let mut body = function(&mut f, int);
        let then = block(&mut body, vec![(3, Command::Return(None))]);
        let otherwise = block(&mut body, vec![(4, Command::Return(None))]);
        let root = body.root();
        body.push(
            root,
            line(2),
            Command::If {
                branches: vec![(unknown(), then)],
                otherwise: Some(otherwise),
            },
        );
        assert!(check_function(&f.state, &body));
    }

    #[test]
    fn infinite_loops_never_fall_off_the_end() {
        let mut f = Fixture::new();
        let int = f.int32();
        let mut body = function(&mut f, int);
        let looped = block(&mut body, vec![(3, Command::Expression(nothing()))]);
        let root = body.root();
        body.push(root, line(2), Command::Cycle { body: looped });
        body.push(root, line(4), Command::Expression(nothing()));

        assert!(check_function(&f.state, &body));
        assert_eq!(unreachable(&f), vec![line(4)]);
        assert_eq!(f.count(|e| matches!(e, CompilationError::NotAllPathReturn { .. })), 0);
    }

    #[test]
    fn break_leaves_an_infinite_loop() {
        let mut f = Fixture::new();
        let int = f.int32();
        let mut body = function(&mut f, int);
        let looped = block(&mut body, vec![(3, Command::Break), (4, Command::Expression(nothing()))]);
        let root = body.root();
        body.push(root, line(2), Command::Cycle { body: looped });
        body.push(root, line(5), Command::Return(None));

        assert!(check_function(&f.state, &body));
        assert_eq!(unreachable(&f), vec![line(4)]);
    }

    #[test]
    fn loops_that_may_not_run_do_not_assign() {
        let mut f = Fixture::new();
        let ret = void(&f);
        let mut body = function(&mut f, ret);
        let x = local(&mut f, &body, "x");
        let looped = block(&mut body, vec![(3, Command::Expression(writes(x)))]);
        let root = body.root();
        body.push(
            root,
            line(2),
            Command::While {
                condition: unknown(),
                body: looped,
            },
        );
        body.push(root, line(4), Command::Expression(reads(x, 4)));

        assert!(!check_function(&f.state, &body));
        assert_eq!(unassigned_at(&f, 4), 1);
    }

    #[test]
    fn do_while_bodies_run_at_least_once() {
        let mut f = Fixture::new();
        let ret = void(&f);
        let mut body = function(&mut f, ret);
        let x = local(&mut f, &body, "x");
        let looped = block(&mut body, vec![(3, Command::Expression(writes(x)))]);
        let root = body.root();
        body.push(
            root,
            line(2),
            Command::DoWhile {
                body: looped,
                condition: unknown(),
            },
        );
        body.push(root, line(4), Command::Expression(reads(x, 4)));

        assert!(check_function(&f.state, &body));
    }

    #[test]
    fn constant_for_bounds_run_the_body() {
        let mut f = Fixture::new();
        let int32 = f.int32();
        let ret = void(&f);
        f.local("i", int32);
        f.local("x", int32);
        f.function("consume", vec![Param::new("value", int32)], ret);

        let init = f.process(assign(name("i"), int(0))).unwrap();
        let condition = f.process(op(Operator::Less, vec![name("i"), int(10)])).unwrap();
        let step = f
            .process(assign(name("i"), op(Operator::Add, vec![name("i"), int(1)])))
            .unwrap();
        let write = f.process(assign(name("x"), int(1))).unwrap();
        let read = f.process(call("consume", vec![name("x")])).unwrap();

        let mut body = FunctionBody::new(f.scope, line(1));
        let looped = block(&mut body, vec![(3, Command::Expression(write))]);
        let root = body.root();
        let command = Command::For {
            init: Some(init),
            condition: Some(condition),
            step: Some(step),
            body: looped,
        };
        assert_eq!(command.will_run(), ConditionResult::True);
        body.push(root, line(2), command);
        body.push(root, line(4), Command::Expression(read));

        assert!(check_function(&f.state, &body));
        assert_eq!(f.state.diagnostics.error_count(), 0);
    }

    #[test]
    fn gotos_merge_assignment_state_at_the_label() {
        let mut f = Fixture::new();
        let ret = void(&f);
        let mut body = function(&mut f, ret);
        let x = local(&mut f, &body, "x");
        let then = block(
            &mut body,
            vec![
                (3, Command::Expression(writes(x))),
                (4, Command::Label("again".into())),
                (5, Command::Expression(reads(x, 5))),
            ],
        );
        let otherwise = block(&mut body, vec![(6, Command::Goto("again".into()))]);
        let root = body.root();
        body.push(
            root,
            line(2),
            Command::If {
                branches: vec![(unknown(), then)],
                otherwise: Some(otherwise),
            },
        );

        assert!(!check_function(&f.state, &body));
        assert_eq!(unassigned_at(&f, 5), 1);
        assert!(unreachable(&f).is_empty());
    }

    #[test]
    fn unknown_labels_are_reported() {
        let mut f = Fixture::new();
        let ret = void(&f);
        let mut body = function(&mut f, ret);
        let root = body.root();
        body.push(root, line(2), Command::Goto("nowhere".into()));

        assert!(!check_function(&f.state, &body));
        assert_eq!(
            f.count(|e| matches!(e, CompilationError::UnknownId { name, .. } if name == "nowhere")),
            1
        );
    }

    #[test]
    fn finally_blocks_cannot_be_left_by_a_jump() {
        let mut f = Fixture::new();
        let ret = void(&f);
        let mut body = function(&mut f, ret);
        let tried = block(&mut body, vec![(3, Command::Expression(nothing()))]);
        let finally = block(&mut body, vec![(5, Command::Return(None))]);
        let root = body.root();
        body.push(
            root,
            line(2),
            Command::Try {
                body: tried,
                catch: None,
                finally: Some(finally),
            },
        );

        assert!(!check_function(&f.state, &body));
        assert_eq!(
            f.count(|e| matches!(e, CompilationError::CannotLeaveFinally { span } if *span == line(5))),
            1
        );
    }

    #[test]
    fn returns_run_the_finally_block_first() {
        let mut f = Fixture::new();
        let ret = void(&f);
        let mut body = function(&mut f, ret);
        let x = local(&mut f, &body, "x");
        let tried = block(&mut body, vec![(3, Command::Return(None))]);
        let finally = block(&mut body, vec![(5, Command::Expression(reads(x, 5)))]);
        let root = body.root();
        body.push(
            root,
            line(2),
            Command::Try {
                body: tried,
                catch: None,
                finally: Some(finally),
            },
        );
        body.push(root, line(6), Command::Expression(nothing()));

        assert!(!check_function(&f.state, &body));
        assert_eq!(unassigned_at(&f, 5), 1);
        assert_eq!(unreachable(&f), vec![line(6)]);
    }

    #[test]
    fn breaks_through_finally_continue_after_the_loop() {
        let mut f = Fixture::new();
        let int = f.int32();
        let mut body = function(&mut f, int);
        let tried = block(&mut body, vec![(4, Command::Break)]);
        let finally = block(&mut body, vec![(6, Command::Expression(nothing()))]);
        let looped = block(
            &mut body,
            vec![(
                3,
                Command::Try {
                    body: tried,
                    catch: None,
                    finally: Some(finally),
                },
            )],
        );
        let root = body.root();
        body.push(root, line(2), Command::Cycle { body: looped });
        body.push(root, line(7), Command::Return(None));

        assert!(check_function(&f.state, &body));
        assert!(unreachable(&f).is_empty());
    }

    #[test]
    fn exceptions_reach_the_handler() {
        let mut f = Fixture::new();
        let ret = void(&f);
        let mut body = function(&mut f, ret);
        let thrown = block(&mut body, vec![(4, Command::Throw(nothing()))]);
        let tried = block(
            &mut body,
            vec![
                (
                    3,
                    Command::If {
                        branches: vec![(unknown(), thrown)],
                        otherwise: None,
                    },
                ),
                (5, Command::Expression(nothing())),
            ],
        );
        let catch = block(&mut body, vec![(7, Command::Expression(nothing()))]);
        let root = body.root();
        body.push(
            root,
            line(2),
            Command::Try {
                body: tried,
                catch: Some(catch),
                finally: None,
            },
        );
        body.push(root, line(8), Command::Expression(nothing()));

        assert!(check_function(&f.state, &body));
        assert!(unreachable(&f).is_empty());
    }

    #[test]
    fn statements_after_a_throw_are_unreachable() {
        let mut f = Fixture::new();
        let ret = void(&f);
        let mut body = function(&mut f, ret);
        let tried = block(
            &mut body,
            vec![(3, Command::Throw(nothing())), (4, Command::Expression(nothing()))],
        );
        let catch = block(&mut body, vec![(6, Command::Rethrow)]);
        let root = body.root();
        body.push(
            root,
            line(2),
            Command::Try {
                body: tried,
                catch: Some(catch),
                finally: None,
            },
        );
        body.push(root, line(7), Command::Expression(nothing()));

        assert!(check_function(&f.state, &body));
        assert_eq!(unreachable(&f), vec![line(4), line(7)]);
    }

    #[test]
    fn unused_and_write_only_locals_are_warned() {
        let mut f = Fixture::new();
        let ret = void(&f);
        let mut body = function(&mut f, ret);
        local(&mut f, &body, "unused");
        let written = local(&mut f, &body, "written");
        let read = local(&mut f, &body, "read");
        let root = body.root();
        body.push(root, line(2), Command::Expression(writes(written)));
        body.push(root, line(3), Command::Expression(writes(read)));
        body.push(root, line(4), Command::Expression(reads(read, 4)));

        assert!(check_function(&f.state, &body));
        assert_eq!(
            f.count(|e| matches!(e, CompilationError::UnusedId { name, .. } if name == "unused")),
            1
        );
        assert_eq!(
            f.count(|e| matches!(e, CompilationError::AssignedButNeverUsed { name, .. } if name == "written")),
            1
        );
        assert_eq!(f.state.diagnostics.warning_count(), 2);
    }

    #[test]
    fn output_parameters_must_be_assigned_on_exit() {
        let mut f = Fixture::new();
        let ret = void(&f);
        let int = f.int32();
        let out = f.state.types.reference_to(int, ReferenceMode::IdGetsAssigned);

        let mut body = function(&mut f, ret);
        f.state
            .idents
            .declare_parameter(body.scope, "result", out, Span::point(1, 10))
            .unwrap();
        let root = body.root();
        body.push(root, line(2), Command::Return(None));
        assert!(!check_function(&f.state, &body));
        assert_eq!(
            f.count(|e| matches!(e, CompilationError::UnassignedVar { name, .. } if name == "result")),
            1
        );

        let mut f = Fixture::new();
        let out = f.state.types.reference_to(int, ReferenceMode::IdGetsAssigned);
        let mut body = function(&mut f, ret);
        let result = f
            .state
            .idents
            .declare_parameter(body.scope, "result", out, Span::point(1, 10))
            .unwrap();
        let root = body.root();
        body.push(root, line(2), Command::Expression(writes(result)));
        assert!(check_function(&f.state, &body));
    }

    #[test]
    fn disabled_checking_reports_nothing() {
        let mut f = Fixture::with_config(CompilerConfig::default().with_code_checking(false));
        let int = f.int32();
        let mut body = function(&mut f, int);
        let root = body.root();
        body.push(root, line(2), Command::Expression(nothing()));

        assert!(check_function(&f.state, &body));
        assert!(f.state.diagnostics.messages().is_empty());
    }
}
