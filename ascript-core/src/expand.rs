use std::collections::BTreeMap;

use ascript_protocol::CompileError;
use ascript_protocol::CompileErrorKind;
use ascript_protocol::ForEachSpec;
use ascript_protocol::IfSpec;
use ascript_protocol::Operation;
use ascript_protocol::Predicate;
use ascript_protocol::Script;
use ascript_protocol::Verb;

/// Maximum items a single `ForEach` (or batch-verb) call may expand over.
pub const MAX_FOREACH_ITEMS: usize = 256;
/// Maximum operations a whole script may expand into, main and cleanup
/// combined; a cheap defense against an agent nesting `ForEach`/`Include`
/// to exhaust host memory before a single byte of a step runs.
pub const MAX_EXPANDED_OPERATIONS: usize = 1024;
/// Maximum nesting depth of `ForEach`/`If`/`Include` bodies.
pub const MAX_EXPANSION_DEPTH: usize = 3;

/// A primitive operation with any `If` guard it was wrapped in, produced once
/// every structural verb (`ForEach`, `If`, `Include`, the `*Many` batch verbs)
/// has been eliminated. Nothing downstream of this point ever sees a
/// structural verb again.
#[derive(Debug, Clone)]
pub struct ExpandedOp {
    pub operation: Operation,
    pub guard: Option<Predicate>,
}

struct Budget {
    remaining: usize,
}

impl Budget {
    fn take_one(&mut self, verb: Verb, step_index: usize) -> Result<(), CompileError> {
        if self.remaining == 0 {
            return Err(CompileError::new(
                verb,
                step_index,
                CompileErrorKind::Expansion,
                format!("script expands to more than {MAX_EXPANDED_OPERATIONS} operations"),
            ));
        }
        self.remaining -= 1;
        Ok(())
    }
}

/// Expands both `script.operations` and `script.cleanup`, sharing one
/// operation budget across the two so a script cannot dodge the cap by
/// pushing bulk work into cleanup.
pub fn expand_script(script: &Script) -> Result<(Vec<ExpandedOp>, Vec<ExpandedOp>), CompileError> {
    let mut budget = Budget { remaining: MAX_EXPANDED_OPERATIONS };
    let main = expand_list(&script.operations, &script.fragments, 0, &mut budget)?;
    let cleanup = expand_list(&script.cleanup, &script.fragments, 0, &mut budget)?;
    Ok((main, cleanup))
}

fn expand_list(
    ops: &[Operation],
    fragments: &BTreeMap<String, Vec<Operation>>,
    depth: usize,
    budget: &mut Budget,
) -> Result<Vec<ExpandedOp>, CompileError> {
    let mut out = Vec::new();
    for (index, op) in ops.iter().enumerate() {
        expand_one(op, fragments, depth, index, budget, &mut out)?;
    }
    Ok(out)
}

fn expand_one(
    op: &Operation,
    fragments: &BTreeMap<String, Vec<Operation>>,
    depth: usize,
    step_index: usize,
    budget: &mut Budget,
    out: &mut Vec<ExpandedOp>,
) -> Result<(), CompileError> {
    match op.verb {
        Verb::ForEach => expand_for_each(op, step_index, fragments, depth, budget, out),
        Verb::If => expand_if(op, step_index, fragments, depth, budget, out),
        Verb::Include => expand_include(op, step_index, fragments, depth, budget, out),
        Verb::FileWriteMany => expand_batch_pairs(op, Verb::FileWrite, step_index, budget, out),
        Verb::FileCopyMany => expand_batch_pairs(op, Verb::FileCopy, step_index, budget, out),
        Verb::FileDeleteMany => expand_batch_singles(op, Verb::FileDelete, step_index, budget, out),
        _ => {
            budget.take_one(op.verb, step_index)?;
            out.push(ExpandedOp { operation: op.clone(), guard: None });
            Ok(())
        }
    }
}

fn check_depth(verb: Verb, step_index: usize, depth: usize) -> Result<(), CompileError> {
    if depth >= MAX_EXPANSION_DEPTH {
        return Err(CompileError::new(
            verb,
            step_index,
            CompileErrorKind::Expansion,
            format!("nesting exceeds the maximum depth of {MAX_EXPANSION_DEPTH}"),
        ));
    }
    Ok(())
}

fn reject_if_labeled_or_captured(body: &Operation, step_index: usize) -> Result<(), CompileError> {
    if body.label.is_some() || body.capture_as.is_some() {
        return Err(CompileError::new(
            body.verb,
            step_index,
            CompileErrorKind::Expansion,
            "a ForEach or If body may not declare label or captureAs; every replica would collide",
        ));
    }
    Ok(())
}

fn expand_for_each(
    op: &Operation,
    step_index: usize,
    fragments: &BTreeMap<String, Vec<Operation>>,
    depth: usize,
    budget: &mut Budget,
    out: &mut Vec<ExpandedOp>,
) -> Result<(), CompileError> {
    check_depth(op.verb, step_index, depth)?;
    let ForEachSpec { items, body } = op
        .for_each
        .as_ref()
        .ok_or_else(|| CompileError::new(op.verb, step_index, CompileErrorKind::ShapeViolation, "ForEach requires a forEach body"))?;

    if items.len() > MAX_FOREACH_ITEMS {
        return Err(CompileError::new(
            op.verb,
            step_index,
            CompileErrorKind::Expansion,
            format!("ForEach has {} items, exceeding the cap of {MAX_FOREACH_ITEMS}", items.len()),
        ));
    }
    reject_if_labeled_or_captured(body, step_index)?;
    if body.verb == Verb::ForEach {
        return Err(CompileError::new(
            op.verb,
            step_index,
            CompileErrorKind::Expansion,
            "ForEach bodies cannot themselves be ForEach",
        ));
    }

    for (item_index, item) in items.iter().enumerate() {
        let mut replica = (**body).clone();
        for arg in &mut replica.args {
            *arg = substitute_loop_variables(arg, item, item_index);
        }
        expand_one(&replica, fragments, depth + 1, step_index, budget, out)?;
    }
    Ok(())
}

fn substitute_loop_variables(arg: &str, item: &str, index: usize) -> String {
    arg.replace("$ITEM", item).replace("$INDEX", &index.to_string())
}

fn expand_if(
    op: &Operation,
    step_index: usize,
    fragments: &BTreeMap<String, Vec<Operation>>,
    depth: usize,
    budget: &mut Budget,
    out: &mut Vec<ExpandedOp>,
) -> Result<(), CompileError> {
    check_depth(op.verb, step_index, depth)?;
    let IfSpec { predicate, body } = op
        .if_
        .as_ref()
        .ok_or_else(|| CompileError::new(op.verb, step_index, CompileErrorKind::ShapeViolation, "If requires an if body"))?;

    let mut nested = Vec::new();
    expand_one(body, fragments, depth + 1, step_index, budget, &mut nested)?;
    for expanded in &mut nested {
        if expanded.guard.is_some() {
            return Err(CompileError::new(
                op.verb,
                step_index,
                CompileErrorKind::Expansion,
                "nested If bodies cannot themselves be guarded",
            ));
        }
        expanded.guard = Some(predicate.clone());
    }
    out.extend(nested);
    Ok(())
}

fn expand_include(
    op: &Operation,
    step_index: usize,
    fragments: &BTreeMap<String, Vec<Operation>>,
    depth: usize,
    budget: &mut Budget,
    out: &mut Vec<ExpandedOp>,
) -> Result<(), CompileError> {
    check_depth(op.verb, step_index, depth)?;
    let name = op.args.first().ok_or_else(|| {
        CompileError::new(op.verb, step_index, CompileErrorKind::ShapeViolation, "Include requires a fragment name argument")
    })?;
    let fragment = fragments.get(name).ok_or_else(|| {
        CompileError::new(op.verb, step_index, CompileErrorKind::Expansion, format!("no fragment registered under {name:?}"))
    })?;
    let expanded = expand_list(fragment, fragments, depth + 1, budget)?;
    out.extend(expanded);
    Ok(())
}

fn expand_batch_pairs(
    op: &Operation,
    inner_verb: Verb,
    step_index: usize,
    budget: &mut Budget,
    out: &mut Vec<ExpandedOp>,
) -> Result<(), CompileError> {
    if op.args.len() % 2 != 0 {
        return Err(CompileError::new(
            op.verb,
            step_index,
            CompileErrorKind::ShapeViolation,
            "batch verb arguments must form pairs",
        ));
    }
    let pair_count = op.args.len() / 2;
    if pair_count > MAX_FOREACH_ITEMS {
        return Err(CompileError::new(
            op.verb,
            step_index,
            CompileErrorKind::Expansion,
            format!("batch verb has {pair_count} items, exceeding the cap of {MAX_FOREACH_ITEMS}"),
        ));
    }
    for chunk in op.args.chunks(2) {
        budget.take_one(op.verb, step_index)?;
        out.push(ExpandedOp {
            operation: Operation::simple(inner_verb, [chunk[0].clone(), chunk[1].clone()]),
            guard: None,
        });
    }
    Ok(())
}

fn expand_batch_singles(
    op: &Operation,
    inner_verb: Verb,
    step_index: usize,
    budget: &mut Budget,
    out: &mut Vec<ExpandedOp>,
) -> Result<(), CompileError> {
    if op.args.len() > MAX_FOREACH_ITEMS {
        return Err(CompileError::new(
            op.verb,
            step_index,
            CompileErrorKind::Expansion,
            format!("batch verb has {} items, exceeding the cap of {MAX_FOREACH_ITEMS}", op.args.len()),
        ));
    }
    for arg in &op.args {
        budget.take_one(op.verb, step_index)?;
        out.push(ExpandedOp { operation: Operation::simple(inner_verb, [arg.clone()]), guard: None });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use ascript_protocol::ForEachSpec;
    use ascript_protocol::Script;

    fn foreach_op(items: Vec<&str>) -> Operation {
        Operation {
            for_each: Some(ForEachSpec {
                items: items.into_iter().map(String::from).collect(),
                body: Box::new(Operation::simple(Verb::FileWrite, ["/out/$ITEM.txt", "body-$INDEX"])),
            }),
            ..Operation::simple(Verb::ForEach, Vec::<String>::new())
        }
    }

    #[test]
    fn for_each_substitutes_item_and_index() {
        let script = Script { operations: vec![foreach_op(vec!["a", "b"])], cleanup: vec![], options: None, fragments: Default::default() };
        let (main, _) = expand_script(&script).expect("expands");
        assert_eq!(main.len(), 2);
        assert_eq!(main[0].operation.args, vec!["/out/a.txt", "body-0"]);
        assert_eq!(main[1].operation.args, vec!["/out/b.txt", "body-1"]);
    }

    #[test]
    fn nested_for_each_is_rejected() {
        let inner = foreach_op(vec!["x"]);
        let op = Operation {
            for_each: Some(ForEachSpec { items: vec!["a".to_string()], body: Box::new(inner) }),
            ..Operation::simple(Verb::ForEach, Vec::<String>::new())
        };
        let script = Script { operations: vec![op], cleanup: vec![], options: None, fragments: Default::default() };
        let err = expand_script(&script).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::Expansion);
    }

    #[test]
    fn for_each_over_budget_is_rejected() {
        let items: Vec<&str> = (0..300).map(|_| "x").collect();
        let script = Script { operations: vec![foreach_op(items)], cleanup: vec![], options: None, fragments: Default::default() };
        assert!(expand_script(&script).is_err());
    }

    #[test]
    fn if_attaches_guard_without_eliminating_the_body() {
        let op = Operation {
            if_: Some(IfSpec {
                predicate: Predicate::PrevEmpty,
                body: Box::new(Operation::simple(Verb::FileRead, ["/a.txt"])),
            }),
            ..Operation::simple(Verb::If, Vec::<String>::new())
        };
        let script = Script { operations: vec![op], cleanup: vec![], options: None, fragments: Default::default() };
        let (main, _) = expand_script(&script).expect("expands");
        assert_eq!(main.len(), 1);
        assert!(matches!(main[0].guard, Some(Predicate::PrevEmpty)));
        assert_eq!(main[0].operation.verb, Verb::FileRead);
    }

    #[test]
    fn include_splices_in_a_registered_fragment() {
        let mut fragments = BTreeMap::new();
        fragments.insert("setup".to_string(), vec![Operation::simple(Verb::DirCreate, ["/work"])]);
        let script = Script {
            operations: vec![Operation::simple(Verb::Include, ["setup"])],
            cleanup: vec![],
            options: None,
            fragments,
        };
        let (main, _) = expand_script(&script).expect("expands");
        assert_eq!(main.len(), 1);
        assert_eq!(main[0].operation.verb, Verb::DirCreate);
    }

    #[test]
    fn batch_delete_expands_one_op_per_argument() {
        let script = Script {
            operations: vec![Operation::simple(Verb::FileDeleteMany, ["/a.txt", "/b.txt", "/c.txt"])],
            cleanup: vec![],
            options: None,
            fragments: Default::default(),
        };
        let (main, _) = expand_script(&script).expect("expands");
        assert_eq!(main.len(), 3);
        assert!(main.iter().all(|e| e.operation.verb == Verb::FileDelete));
    }

    #[test]
    fn batch_copy_requires_even_argument_count() {
        let script = Script {
            operations: vec![Operation::simple(Verb::FileCopyMany, ["/a.txt", "/b.txt", "/c.txt"])],
            cleanup: vec![],
            options: None,
            fragments: Default::default(),
        };
        assert!(expand_script(&script).is_err());
    }
}
