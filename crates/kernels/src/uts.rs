//! Unbalanced tree search over a binomial Galton-Watson tree.
//!
//! Every node carries a 32-byte RNG state. A child's state is the SHA-256
//! digest of its parent's state and its index, so the tree shape depends only
//! on the root seed and never on the order in which nodes are visited.

use std::path::Path;

use inncabs_bench::Benchmark;
use inncabs_core::{InputError, InputResult, Tokens};
use inncabs_engine::{Driver, EngineResult, Policy, RecursiveTask, Scheduler, Step};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

/// Cap on children below the root.
const MAX_CHILDREN: u32 = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct UtsParams {
    /// Branching factor at the root.
    pub root_branching: f64,
    /// Probability that a non-root node has children (`q`).
    pub non_leaf_prob: f64,
    /// Number of children of a non-leaf node (`m`).
    pub non_leaf_children: u32,
    pub root_seed: u32,
    /// Digest evaluations per spawned child.
    pub granularity: u32,
    /// Expected tree size from the input file; 0 when unknown.
    pub expected_size: u64,
    pub expected_depth: u32,
    pub expected_leaves: u64,
}

impl UtsParams {
    /// Parse `b_0 q m root_id granularity exp_size exp_depth exp_leaves`.
    pub fn parse(text: &str) -> InputResult<Self> {
        let mut t = Tokens::new(text);
        let params = Self {
            root_branching: t.next("root branching factor")?,
            non_leaf_prob: t.next("non-leaf probability")?,
            non_leaf_children: t.next("non-leaf branching factor")?,
            root_seed: t.next("root seed")?,
            granularity: t.next::<u32>("compute granularity")?.max(1),
            expected_size: t.next("expected tree size")?,
            expected_depth: t.next("expected tree depth")?,
            expected_leaves: t.next("expected leaf count")?,
        };
        if !(0.0..=1.0).contains(&params.non_leaf_prob) {
            return Err(InputError::Parse {
                line: 1,
                message: format!("non-leaf probability {} outside [0, 1]", params.non_leaf_prob),
            });
        }
        Ok(params)
    }

    pub fn load(path: impl AsRef<Path>) -> InputResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let params = Self::parse(&text)?;
        info!(
            "UTS input {}: b_0={}, q={}, m={}, seed={}, E(n)={:.4}",
            path.display(),
            params.root_branching,
            params.non_leaf_prob,
            params.non_leaf_children,
            params.root_seed,
            params.non_leaf_prob * f64::from(params.non_leaf_children)
        );
        Ok(params)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtsNode {
    height: u32,
    state: [u8; 32],
    num_children: u32,
}

fn digest(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Uniform value in [0, 1) drawn from the low 31 bits of the state.
fn to_prob(state: &[u8; 32]) -> f64 {
    let tail = [state[28], state[29], state[30], state[31]];
    let v = u32::from_be_bytes(tail) & 0x7fff_ffff;
    f64::from(v) / 2_147_483_648.0
}

impl UtsParams {
    pub fn root(&self) -> UtsNode {
        let state = digest(&[&self.root_seed.to_be_bytes()[..]]);
        let mut root = UtsNode { height: 0, state, num_children: 0 };
        root.num_children = self.num_children(&root);
        root
    }

    fn num_children(&self, node: &UtsNode) -> u32 {
        if node.height == 0 {
            let floor = self.root_branching.floor().max(0.0) as u32;
            let ceil = self.root_branching.ceil().max(0.0) as u32;
            return floor.min(ceil);
        }
        let n = if to_prob(&node.state) < self.non_leaf_prob {
            self.non_leaf_children
        } else {
            0
        };
        n.min(MAX_CHILDREN)
    }

    fn child(&self, parent: &UtsNode, index: u32) -> UtsNode {
        let mut state = parent.state;
        for _ in 0..self.granularity {
            state = digest(&[&parent.state[..], &index.to_be_bytes()[..]]);
        }
        let mut child = UtsNode {
            height: parent.height + 1,
            state,
            num_children: 0,
        };
        child.num_children = self.num_children(&child);
        child
    }

    fn children(&self, parent: &UtsNode) -> Vec<UtsNode> {
        (0..parent.num_children).map(|i| self.child(parent, i)).collect()
    }
}

/// Counts the nodes of the subtree rooted at each descriptor.
pub struct Uts {
    params: UtsParams,
}

impl RecursiveTask for Uts {
    type Input = UtsNode;
    type Output = u64;

    fn name(&self) -> &str {
        "uts"
    }

    fn is_base_case(&self, node: &UtsNode) -> bool {
        node.num_children == 0
    }

    fn base_case(&self, _: UtsNode) -> EngineResult<u64> {
        Ok(1)
    }

    fn decompose(&self, node: UtsNode, step: &Step<'_, Self>) -> EngineResult<u64> {
        let handles = self
            .params
            .children(&node)
            .into_iter()
            .map(|child| step.spawn(child))
            .collect();
        step.fold(handles, 1, |size, subtree| size + subtree)
    }
}

pub fn run(scheduler: &Scheduler, policy: Policy, params: &UtsParams) -> EngineResult<u64> {
    let root = params.root();
    let task = Uts { params: params.clone() };
    Driver::new(task, scheduler.clone(), policy).run_sync(root)
}

/// Summary of a sequential traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TreeStats {
    pub size: u64,
    pub leaves: u64,
    pub max_depth: u32,
}

/// Independent depth-first traversal with an explicit stack.
pub fn traverse(params: &UtsParams) -> TreeStats {
    let mut stats = TreeStats::default();
    let mut stack = vec![params.root()];
    while let Some(node) = stack.pop() {
        stats.size += 1;
        stats.max_depth = stats.max_depth.max(node.height);
        if node.num_children == 0 {
            stats.leaves += 1;
        } else {
            stack.extend(params.children(&node));
        }
    }
    stats
}

pub struct UtsBenchmark {
    label: String,
    params: UtsParams,
    reference: Option<TreeStats>,
}

impl UtsBenchmark {
    pub fn new(label: impl Into<String>, params: UtsParams) -> Self {
        Self {
            label: label.into(),
            params,
            reference: None,
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> InputResult<Self> {
        let path = path.as_ref();
        Ok(Self::new(path.display().to_string(), UtsParams::load(path)?))
    }
}

impl Benchmark for UtsBenchmark {
    type Output = u64;

    fn name(&self) -> String {
        format!("Unbalanced Tree Search ({})", self.label)
    }

    fn initialize(&mut self) {
        if self.reference.is_none() {
            let stats = traverse(&self.params);
            if self.params.expected_size != 0 && self.params.expected_size != stats.size {
                debug!(
                    "UTS reference size {} differs from file value {}",
                    stats.size, self.params.expected_size
                );
            }
            self.reference = Some(stats);
        }
    }

    fn execute(&mut self, scheduler: &Scheduler, policy: Policy) -> EngineResult<u64> {
        run(scheduler, policy, &self.params)
    }

    fn check(&self, output: &u64) -> bool {
        self.reference.is_some_and(|r| r.size == *output)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn small() -> UtsParams {
        UtsParams::parse("4 0.2 4 7 1 0 0 0").unwrap()
    }

    #[test]
    fn parse_input_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "2000.0 0.124875 8 42 1\n4130071 1572 3305118").unwrap();
        let params = UtsParams::load(file.path()).unwrap();
        assert_eq!(params.root_branching, 2000.0);
        assert_eq!(params.non_leaf_children, 8);
        assert_eq!(params.root_seed, 42);
        assert_eq!(params.expected_size, 4_130_071);
        assert_eq!(params.expected_leaves, 3_305_118);
    }

    #[test]
    fn truncated_input_is_rejected() {
        assert!(matches!(UtsParams::parse("4 0.2 4"), Err(InputError::Missing(_))));
        assert!(matches!(
            UtsParams::parse("4 1.5 4 0 1 0 0 0"),
            Err(InputError::Parse { .. })
        ));
    }

    #[test]
    fn granularity_is_at_least_one() {
        let params = UtsParams::parse("4 0.2 4 7 0 0 0 0").unwrap();
        assert_eq!(params.granularity, 1);
    }

    #[test]
    fn tree_is_deterministic() {
        let params = small();
        assert_eq!(params.root().num_children, 4);
        let a = traverse(&params);
        let b = traverse(&params);
        assert_eq!(a, b);
        assert!(a.size >= 5);
        assert!(a.leaves >= 4);
    }

    #[test]
    fn fractional_root_branching_floors() {
        let params = UtsParams::parse("3.7 0.0 4 1 1 0 0 0").unwrap();
        let stats = traverse(&params);
        assert_eq!(stats.size, 4);
        assert_eq!(stats.leaves, 3);
        assert_eq!(stats.max_depth, 1);
    }
}
