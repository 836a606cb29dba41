use crate::Tree;
use crate::selector::{
    AttrMatcher, AttrOp, Combinator, Compound, Nth, PseudoClass, Selector, SelectorPart,
};

const STACK_RED_ZONE: usize = 64 * 1024;
const STACK_GROWTH: usize = 1024 * 1024;

pub(crate) fn select<T: Tree>(tree: &T, root: T::Node, selector: &Selector) -> Vec<T::Node> {
    let mut matched = Vec::new();
    if !tree.is_alive(root) {
        return matched;
    }

    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if matches(tree, node, selector) {
            matched.push(node);
        }
        stack.extend(tree.children(node).iter().rev().copied());
    }
    matched
}

pub(crate) fn matches<T: Tree>(tree: &T, node: T::Node, selector: &Selector) -> bool {
    tree.is_element(node)
        && selector
            .groups()
            .iter()
            .any(|chain| matches_chain(tree, node, chain))
}

fn matches_any_chain<T: Tree>(tree: &T, node: T::Node, chains: &[Vec<SelectorPart>]) -> bool {
    chains.iter().any(|chain| matches_chain(tree, node, chain))
}

/// Matches right to left, backtracking over every candidate ancestor or
/// sibling for the descendant and general-sibling combinators.
fn matches_chain<T: Tree>(tree: &T, node: T::Node, chain: &[SelectorPart]) -> bool {
    let Some((last, rest)) = chain.split_last() else {
        return false;
    };
    if !matches_compound(tree, node, &last.compound) {
        return false;
    }
    if rest.is_empty() {
        return true;
    }

    stacker::maybe_grow(STACK_RED_ZONE, STACK_GROWTH, || {
        match last.combinator.unwrap_or(Combinator::Descendant) {
            Combinator::Child => {
                parent_element(tree, node).is_some_and(|parent| matches_chain(tree, parent, rest))
            }
            Combinator::Descendant => {
                let mut cursor = parent_element(tree, node);
                while let Some(ancestor) = cursor {
                    if matches_chain(tree, ancestor, rest) {
                        return true;
                    }
                    cursor = parent_element(tree, ancestor);
                }
                false
            }
            Combinator::AdjacentSibling => previous_element_sibling(tree, node)
                .is_some_and(|sibling| matches_chain(tree, sibling, rest)),
            Combinator::GeneralSibling => {
                let mut cursor = previous_element_sibling(tree, node);
                while let Some(sibling) = cursor {
                    if matches_chain(tree, sibling, rest) {
                        return true;
                    }
                    cursor = previous_element_sibling(tree, sibling);
                }
                false
            }
        }
    })
}

fn matches_compound<T: Tree>(tree: &T, node: T::Node, compound: &Compound) -> bool {
    let Some(tag_name) = tree.tag_name(node) else {
        return false;
    };

    if let Some(tag) = &compound.tag {
        if !tag_name.eq_ignore_ascii_case(tag) {
            return false;
        }
    }

    if let Some(id) = &compound.id {
        if tree.attr(node, "id") != Some(id.as_str()) {
            return false;
        }
    }

    if !compound.classes.is_empty() {
        let classes = tree.attr(node, "class").unwrap_or("");
        if compound
            .classes
            .iter()
            .any(|class_name| !classes.split_whitespace().any(|token| token == class_name))
        {
            return false;
        }
    }

    if !compound
        .attrs
        .iter()
        .all(|matcher| matches_attr(tree.attr(node, &matcher.name), matcher))
    {
        return false;
    }

    compound
        .pseudo_classes
        .iter()
        .all(|pseudo| matches_pseudo_class(tree, node, pseudo))
}

fn matches_attr(actual: Option<&str>, matcher: &AttrMatcher) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    if matcher.op == AttrOp::Exists {
        return true;
    }

    let (actual, expected) = if matcher.case_insensitive {
        (actual.to_lowercase(), matcher.value.to_lowercase())
    } else {
        (actual.to_string(), matcher.value.clone())
    };

    match matcher.op {
        AttrOp::Exists => true,
        AttrOp::Equals => actual == expected,
        AttrOp::Prefix => !expected.is_empty() && actual.starts_with(&expected),
        AttrOp::Suffix => !expected.is_empty() && actual.ends_with(&expected),
        AttrOp::Substring => !expected.is_empty() && actual.contains(&expected),
        AttrOp::Includes => {
            !expected.is_empty()
                && !expected.contains(char::is_whitespace)
                && actual.split_whitespace().any(|token| token == expected)
        }
        AttrOp::DashMatch => {
            actual == expected
                || actual
                    .strip_prefix(&expected)
                    .is_some_and(|rest| rest.starts_with('-'))
        }
    }
}

fn matches_pseudo_class<T: Tree>(tree: &T, node: T::Node, pseudo: &PseudoClass) -> bool {
    match pseudo {
        PseudoClass::FirstChild => position(tree, node, false, false) == Some(1),
        PseudoClass::LastChild => position(tree, node, false, true) == Some(1),
        PseudoClass::OnlyChild => {
            position(tree, node, false, false) == Some(1)
                && position(tree, node, false, true) == Some(1)
        }
        PseudoClass::FirstOfType => position(tree, node, true, false) == Some(1),
        PseudoClass::LastOfType => position(tree, node, true, true) == Some(1),
        PseudoClass::OnlyOfType => {
            position(tree, node, true, false) == Some(1)
                && position(tree, node, true, true) == Some(1)
        }
        PseudoClass::Empty => tree.children(node).is_empty(),
        PseudoClass::Root => tree
            .parent(node)
            .is_some_and(|parent| !tree.is_element(parent)),
        PseudoClass::NthChild(nth) => nth_position(tree, node, *nth, false, false),
        PseudoClass::NthLastChild(nth) => nth_position(tree, node, *nth, false, true),
        PseudoClass::NthOfType(nth) => nth_position(tree, node, *nth, true, false),
        PseudoClass::NthLastOfType(nth) => nth_position(tree, node, *nth, true, true),
        PseudoClass::Not(chains) => !matches_any_chain(tree, node, chains),
        PseudoClass::Is(chains) => matches_any_chain(tree, node, chains),
        PseudoClass::Has(chains) => {
            let mut stack = tree.children(node).to_vec();
            while let Some(descendant) = stack.pop() {
                if tree.is_element(descendant) && matches_any_chain(tree, descendant, chains) {
                    return true;
                }
                stack.extend_from_slice(tree.children(descendant));
            }
            false
        }
    }
}

fn nth_position<T: Tree>(tree: &T, node: T::Node, nth: Nth, of_type: bool, from_end: bool) -> bool {
    position(tree, node, of_type, from_end).is_some_and(|index| nth.matches(index))
}

/// 1-based position of `node` among its element siblings, optionally only
/// counting siblings with the same tag, counted from the start or the end.
/// Nodes without a parent have no position.
fn position<T: Tree>(tree: &T, node: T::Node, of_type: bool, from_end: bool) -> Option<usize> {
    let parent = tree.parent(node)?;
    let tag_name = tree.tag_name(node)?;
    let counts = |sibling: &&T::Node| {
        tree.tag_name(**sibling)
            .is_some_and(|sibling_tag| !of_type || sibling_tag == tag_name)
    };

    let siblings = tree.children(parent);
    let found = if from_end {
        siblings
            .iter()
            .rev()
            .filter(counts)
            .position(|sibling| *sibling == node)
    } else {
        siblings
            .iter()
            .filter(counts)
            .position(|sibling| *sibling == node)
    };
    found.map(|index| index + 1)
}

fn parent_element<T: Tree>(tree: &T, node: T::Node) -> Option<T::Node> {
    tree.parent(node).filter(|parent| tree.is_element(*parent))
}

fn previous_element_sibling<T: Tree>(tree: &T, node: T::Node) -> Option<T::Node> {
    let parent = tree.parent(node)?;
    let siblings = tree.children(parent);
    let index = siblings.iter().position(|sibling| *sibling == node)?;
    siblings[..index]
        .iter()
        .rev()
        .copied()
        .find(|sibling| tree.is_element(*sibling))
}
