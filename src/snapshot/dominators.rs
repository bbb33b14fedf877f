//! Dominator tree and retained-size computation over the reference graph.
//!
//! Uses the iterative algorithm from Cooper, Harvey and Kennedy ("A Simple,
//! Fast Dominance Algorithm") over a synthetic super-root whose successors are
//! the GC roots.

const UNDEFINED: u32 = u32::MAX;

pub(crate) struct DominatorTree {
    /// Immediate dominator per node; `None` for unreachable nodes and nodes
    /// dominated only by the synthetic root.
    pub idom: Vec<Option<u32>>,
    /// Shallow size of each node plus everything it dominates.
    pub retained: Vec<u64>,
    /// Number of nodes reachable from the roots.
    pub reachable: usize,
}

fn successors<'a>(edges: &'a [Vec<u32>], roots: &'a [u32], node: u32) -> &'a [u32] {
    if node as usize == edges.len() {
        roots
    } else {
        &edges[node as usize]
    }
}

/// Depth-first postorder from the synthetic root (`edges.len()`).
fn postorder(edges: &[Vec<u32>], roots: &[u32]) -> Vec<u32> {
    let root = edges.len() as u32;
    let mut visited = vec![false; edges.len() + 1];
    let mut order = Vec::with_capacity(edges.len() + 1);
    let mut stack: Vec<(u32, usize)> = vec![(root, 0)];
    visited[root as usize] = true;
    while let Some(top) = stack.last_mut() {
        let node = top.0;
        let succs = successors(edges, roots, node);
        if top.1 < succs.len() {
            let next = succs[top.1];
            top.1 += 1;
            if !visited[next as usize] {
                visited[next as usize] = true;
                stack.push((next, 0));
            }
        } else {
            order.push(node);
            stack.pop();
        }
    }
    order
}

fn intersect(doms: &[u32], post_index: &[u32], mut a: u32, mut b: u32) -> u32 {
    while a != b {
        while post_index[a as usize] < post_index[b as usize] {
            a = doms[a as usize];
        }
        while post_index[b as usize] < post_index[a as usize] {
            b = doms[b as usize];
        }
    }
    a
}

/// Computes immediate dominators and retained sizes.
///
/// `edges[v]` lists the nodes referenced by `v`; `roots` are GC roots;
/// `shallow[v]` is the node's own footprint.
pub(crate) fn compute(edges: &[Vec<u32>], roots: &[u32], shallow: &[u64]) -> DominatorTree {
    let n = edges.len();
    let root = n as u32;
    let order = postorder(edges, roots);

    let mut post_index = vec![UNDEFINED; n + 1];
    for (idx, &node) in order.iter().enumerate() {
        post_index[node as usize] = idx as u32;
    }

    let mut preds: Vec<Vec<u32>> = vec![Vec::new(); n + 1];
    for &node in &order {
        for &succ in successors(edges, roots, node) {
            preds[succ as usize].push(node);
        }
    }

    let mut doms = vec![UNDEFINED; n + 1];
    doms[root as usize] = root;
    let mut changed = true;
    while changed {
        changed = false;
        for &node in order.iter().rev().skip(1) {
            let mut new_idom = UNDEFINED;
            for &pred in &preds[node as usize] {
                if doms[pred as usize] == UNDEFINED {
                    continue;
                }
                new_idom = if new_idom == UNDEFINED {
                    pred
                } else {
                    intersect(&doms, &post_index, pred, new_idom)
                };
            }
            if doms[node as usize] != new_idom {
                doms[node as usize] = new_idom;
                changed = true;
            }
        }
    }

    let mut retained = shallow.to_vec();
    // Postorder visits every node before its dominator.
    for &node in &order {
        if node == root {
            continue;
        }
        let dom = doms[node as usize];
        if dom != root && dom != UNDEFINED {
            let sum = retained[dom as usize].saturating_add(retained[node as usize]);
            retained[dom as usize] = sum;
        }
    }

    let idom = (0..n)
        .map(|node| match doms[node] {
            UNDEFINED => None,
            dom if dom == root => None,
            dom => Some(dom),
        })
        .collect();

    DominatorTree {
        idom,
        retained,
        reachable: order.len().saturating_sub(1),
    }
}
