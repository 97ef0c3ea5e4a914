//! Macro expansion stage.
//!
//! A name bound in the [`MacroTable`] is replaced by a copy of the macro's
//! replacement tree. Parameterized macros first become a
//! [`NodeKind::Macro`] node that the enclosing call expands with its
//! arguments. An argument used more than once by the replacement is
//! evaluated once into a link.

use rustc_hash::FxHashMap;
use zinnia_core::{CompilationError, Operator};

use crate::node::{ExprNode, LinkId, NodeKind};
use crate::pipeline::{ExpressionPlugin, PluginResult, PluginRoot};

/// Index of a macro in the [`MacroTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacroId(pub u32);

/// A named replacement tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Macro {
    pub name: String,
    pub params: Vec<String>,
    /// Raw tree; parameters appear as [`NodeKind::MacroArg`] leaves.
    pub replacement: ExprNode,
}

impl Macro {
    /// Number of `MacroArg(index)` leaves in the replacement.
    fn uses_of(&self, index: usize) -> usize {
        let mut count = 0;
        self.replacement.for_each(&mut |n| {
            if n.kind == NodeKind::MacroArg(index) {
                count += 1;
            }
        });
        count
    }
}

#[derive(Debug, Clone, Default)]
pub struct MacroTable {
    macros: Vec<Macro>,
    by_name: FxHashMap<String, MacroId>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define `name`, replacing an earlier definition.
    pub fn define(&mut self, name: impl Into<String>, params: Vec<String>, replacement: ExprNode) -> MacroId {
        let name = name.into();
        let entry = Macro {
            name: name.clone(),
            params,
            replacement,
        };
        if let Some(&id) = self.by_name.get(&name) {
            self.macros[id.0 as usize] = entry;
            return id;
        }
        let id = MacroId(self.macros.len() as u32);
        self.macros.push(entry);
        self.by_name.insert(name, id);
        id
    }

    pub fn find(&self, name: &str) -> Option<MacroId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: MacroId) -> &Macro {
        &self.macros[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }
}

/// The macro expansion stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreProcessor;

/// How a macro argument is substituted.
enum Argument {
    Copy(ExprNode),
    Link(LinkId),
    Unused,
}

impl ExpressionPlugin for PreProcessor {
    fn new_node(&self, root: &mut PluginRoot<'_>, node: &mut ExprNode) -> PluginResult {
        match node.kind {
            NodeKind::Str => {
                let Some(id) = root.state.macros.find(node.code.as_str()) else {
                    return PluginResult::Succeeded;
                };
                let definition = root.state.macros.get(id);
                if !definition.params.is_empty() {
                    let code = node.code.clone();
                    node.replace(ExprNode::new(NodeKind::Macro(id), code));
                    return PluginResult::Ready;
                }

                let body = definition.replacement.clone();
                match expand_root(root, &body, &[]) {
                    Some(expansion) => {
                        node.replace(expansion);
                        PluginResult::Ready
                    }
                    None => PluginResult::Failed,
                }
            }
            NodeKind::Op(Operator::Call)
                if matches!(node.children.first().map(|c| &c.kind), Some(NodeKind::Macro(_))) =>
            {
                expand_call(root, node)
            }
            _ => match node.children.iter().find_map(macro_of) {
                Some(id) => {
                    report_param_count(root, id, 0, node);
                    PluginResult::Failed
                }
                None => PluginResult::Succeeded,
            },
        }
    }

    fn end(&self, root: &mut PluginRoot<'_>, node: &mut ExprNode) -> PluginResult {
        match macro_of(node) {
            Some(id) => {
                report_param_count(root, id, 0, node);
                PluginResult::Failed
            }
            None => PluginResult::Succeeded,
        }
    }
}

fn macro_of(node: &ExprNode) -> Option<MacroId> {
    match node.kind {
        NodeKind::Macro(id) => Some(id),
        _ => None,
    }
}

fn report_param_count(root: &PluginRoot<'_>, id: MacroId, found: usize, node: &ExprNode) {
    let definition = root.state.macros.get(id);
    root.state.diagnostics.add(CompilationError::ParamCount {
        name: definition.name.clone(),
        expected: definition.params.len(),
        found,
        span: node.code.span(),
    });
}

fn expand_call(root: &mut PluginRoot<'_>, node: &mut ExprNode) -> PluginResult {
    let Some(id) = macro_of(&node.children[0]) else {
        return PluginResult::Succeeded;
    };
    let definition = root.state.macros.get(id).clone();
    let mut args = node.children.split_off(1);
    if args.len() != definition.params.len() {
        report_param_count(root, id, args.len(), node);
        return PluginResult::Failed;
    }

    for arg in &mut args {
        if root.finish_node(arg, true) == PluginResult::Failed {
            return PluginResult::Failed;
        }
    }

    let mut links = Vec::new();
    let args: Vec<Argument> = args
        .into_iter()
        .enumerate()
        .map(|(index, arg)| match definition.uses_of(index) {
            0 => Argument::Unused,
            1 => Argument::Copy(arg),
            _ if arg.operator().is_none() && arg.links.is_empty() => Argument::Copy(arg),
            _ => {
                let link = root.new_link(arg);
                links.push(link);
                Argument::Link(link)
            }
        })
        .collect();

    match expand_root(root, &definition.replacement, &args) {
        Some(mut expansion) => {
            expansion.links.extend(links);
            node.replace(expansion);
            PluginResult::Ready
        }
        None => PluginResult::Failed,
    }
}

/// Expand `body` with processed children; the root itself is left for
/// the pipeline.
fn expand_root(root: &mut PluginRoot<'_>, body: &ExprNode, args: &[Argument]) -> Option<ExprNode> {
    if let NodeKind::MacroArg(index) = body.kind {
        return instantiate(root, &args[index]);
    }
    let mut node = ExprNode::new(body.kind.clone(), body.code.clone()).with_flags(body.flags);
    node.ty = body.ty;
    for child in &body.children {
        node.children.push(expand(root, child, args)?);
    }
    Some(node)
}

fn expand(root: &mut PluginRoot<'_>, body: &ExprNode, args: &[Argument]) -> Option<ExprNode> {
    if let NodeKind::MacroArg(index) = body.kind {
        return instantiate(root, &args[index]);
    }
    let node = expand_root(root, body, args)?;
    root.new_node(node)
}

fn instantiate(root: &mut PluginRoot<'_>, arg: &Argument) -> Option<ExprNode> {
    match arg {
        Argument::Copy(node) => Some(node.clone()),
        Argument::Link(link) => root.linking_node(*link),
        Argument::Unused => unreachable!("unused macro argument instantiated"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zinnia_core::{
        CodeString, CompilerConfig, ConstValue, FunctionInfo, IdentKind, Identifier, ScopeId, Span,
    };

    use crate::state::CompilerState;

    fn code(text: &str) -> CodeString {
        CodeString::new(text, Span::new(1, 1, text.len() as u32))
    }

    fn int(value: i64) -> ExprNode {
        ExprNode::literal(ConstValue::integer(value), code(&value.to_string()))
    }

    fn square_macro(state: &mut CompilerState) {
        let arg = || ExprNode::new(NodeKind::MacroArg(0), code("x"));
        state.macros.define(
            "SQR",
            vec!["x".into()],
            ExprNode::op(Operator::Multiply, vec![arg(), arg()], code("x * x")),
        );
    }

    fn call(callee: &str, args: Vec<ExprNode>) -> ExprNode {
        let mut children = vec![ExprNode::name(code(callee))];
        children.extend(args);
        ExprNode::op(Operator::Call, children, code(callee))
    }

    #[test]
    fn parameterless_macro_is_replaced() {
        let mut state = CompilerState::new(CompilerConfig::default());
        state.macros.define(
            "TEN",
            vec![],
            ExprNode::op(Operator::Add, vec![int(4), int(6)], code("4 + 6")),
        );
        let mut root = PluginRoot::for_constants(&mut state, ScopeId::GLOBAL, false);
        let expr = root.process(ExprNode::name(code("TEN"))).unwrap();
        assert_eq!(expr.root.const_value(), Some(&ConstValue::integer(10)));
    }

    #[test]
    fn constant_arguments_are_copied() {
        let mut state = CompilerState::new(CompilerConfig::default());
        square_macro(&mut state);
        let mut root = PluginRoot::for_constants(&mut state, ScopeId::GLOBAL, false);
        let expr = root.process(call("SQR", vec![int(7)])).unwrap();
        assert_eq!(expr.root.const_value(), Some(&ConstValue::integer(49)));
        assert!(expr.links.is_empty());
    }

    #[test]
    fn operator_arguments_are_linked() {
        let mut state = CompilerState::new(CompilerConfig::default());
        square_macro(&mut state);
        let int32 = state.types.builtins().int32;
        let fn_ty = state.types.function(int32, vec![]);
        state
            .idents
            .declare(
                ScopeId::GLOBAL,
                Identifier::new("next", IdentKind::Function(FunctionInfo::new(vec![], int32)), fn_ty, Span::default())
                    .with_flags(zinnia_core::IdentFlags::STATIC),
            )
            .unwrap();

        let scope = state.function_scope(ScopeId::GLOBAL, int32, None);
        let mut root = PluginRoot::for_code_scope(&mut state, scope);
        let expr = root.process(call("SQR", vec![call("next", vec![])])).unwrap();

        assert_eq!(expr.links.len(), 1);
        assert!(expr.root.is_op(Operator::Multiply));
        assert!(expr.root.children.iter().all(|c| matches!(c.kind, NodeKind::Linking(_))));
    }

    #[test]
    fn wrong_argument_count_is_reported() {
        let mut state = CompilerState::new(CompilerConfig::default());
        square_macro(&mut state);
        let mut root = PluginRoot::for_constants(&mut state, ScopeId::GLOBAL, false);
        assert!(root.process(call("SQR", vec![int(1), int(2)])).is_none());
        assert!(root.process(ExprNode::name(code("SQR"))).is_none());
        drop(root);
        assert_eq!(
            state
                .diagnostics
                .count_where(|e| matches!(e, CompilationError::ParamCount { .. })),
            2
        );
    }
}
