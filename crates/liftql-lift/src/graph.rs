//! Co-occurrence graphs over the operands of an n-ary formula, and their
//! connected components.

use liftql_logic::Formula;
use std::collections::BTreeSet;

/// Dense symmetric adjacency matrix; `adjacency[i][j]` iff `i` and `j` are
/// linked. The diagonal is ignored.
pub type AdjacencyMatrix = Vec<Vec<bool>>;

/// Build a graph with an edge between `i` and `j` iff their key sets
/// intersect.
pub fn co_occurrence_graph<T, K: Ord>(
    items: &[T],
    mut keys: impl FnMut(&T) -> BTreeSet<K>,
) -> AdjacencyMatrix {
    let key_sets: Vec<BTreeSet<K>> = items.iter().map(&mut keys).collect();
    let n = items.len();
    let mut adjacency = vec![vec![false; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            if !key_sets[i].is_disjoint(&key_sets[j]) {
                adjacency[i][j] = true;
                adjacency[j][i] = true;
            }
        }
    }
    adjacency
}

/// Edge iff two formulas mention a common predicate symbol.
pub fn symbol_co_occurrence_graph(formulas: &[Formula]) -> AdjacencyMatrix {
    co_occurrence_graph(formulas, |f| {
        f.predicates().into_iter().map(str::to_owned).collect()
    })
}

/// Edge iff two formulas share a free variable.
pub fn variable_co_occurrence_graph(formulas: &[Formula]) -> AdjacencyMatrix {
    co_occurrence_graph(formulas, Formula::free_variables)
}

/// Partition the nodes into connected components by iterative frontier
/// expansion. Components are ordered by their smallest node.
pub fn connected_components(adjacency: &AdjacencyMatrix) -> Vec<BTreeSet<usize>> {
    let n = adjacency.len();
    let mut assigned = vec![false; n];
    let mut components = Vec::new();
    for start in 0..n {
        if assigned[start] {
            continue;
        }
        assigned[start] = true;
        let mut component = BTreeSet::from([start]);
        let mut frontier = vec![start];
        while let Some(node) = frontier.pop() {
            for (next, &linked) in adjacency[node].iter().enumerate() {
                if linked && !assigned[next] {
                    assigned[next] = true;
                    component.insert(next);
                    frontier.push(next);
                }
            }
        }
        components.push(component);
    }
    components
}

/// Group the operands of a conjunction (disjunction) into sub-conjunctions
/// (sub-disjunctions) that share no predicate symbol. Any other formula is its
/// own single component. Singleton groups are returned unwrapped.
pub fn symbol_connected_components(formula: &Formula) -> Vec<Formula> {
    let (operands, rebuild): (&[Formula], fn(Vec<Formula>) -> Formula) = match formula {
        Formula::Conjunction(fs) => (fs.as_slice(), Formula::Conjunction as fn(_) -> _),
        Formula::Disjunction(fs) => (fs.as_slice(), Formula::Disjunction as fn(_) -> _),
        other => return vec![other.clone()],
    };
    connected_components(&symbol_co_occurrence_graph(operands))
        .into_iter()
        .map(|component| {
            let mut members: Vec<Formula> =
                component.into_iter().map(|i| operands[i].clone()).collect();
            if members.len() == 1 {
                members.pop().unwrap_or(Formula::True)
            } else {
                rebuild(members)
            }
        })
        .collect()
}
