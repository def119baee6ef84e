//! LU factorization of a block-sparse matrix.
//!
//! The matrix is `n x n` blocks of `bs x bs` floats; many blocks start out
//! empty. For every diagonal block the factorization runs two phases of
//! independent block operations separated by barriers: forward substitution
//! and block division, then block updates that may fill in empty blocks.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use inncabs_bench::Benchmark;
use inncabs_engine::{barrier_join, EngineError, EngineResult, Handle, Policy, Scheduler};
use tracing::{debug, warn};

pub const EPSILON: f32 = 1.0e-6;

const INIT_SEED: i64 = 1325;

type Block = Vec<f32>;

/// Whether block `(ii, jj)` is non-empty in a freshly generated matrix.
fn present(ii: usize, jj: usize) -> bool {
    if ii == jj || ii + 1 == jj || jj + 1 == ii {
        return true;
    }
    let empty = (ii < jj && ii % 3 != 0) || (ii > jj && jj % 3 != 0) || ii % 2 == 1 || jj % 2 == 1;
    !empty
}

/// Blocks in row-major order, filled from the same pseudo-random sequence
/// on every call.
fn generate(n: usize, bs: usize) -> Vec<Option<Block>> {
    let mut value = INIT_SEED;
    (0..n * n)
        .map(|idx| {
            present(idx / n, idx % n).then(|| {
                (0..bs * bs)
                    .map(|_| {
                        value = (3125 * value) % 65536;
                        ((value as f64 - 32768.0) / 16384.0) as f32
                    })
                    .collect()
            })
        })
        .collect()
}

fn lu0(diag: &mut [f32], bs: usize) {
    for k in 0..bs {
        for i in k + 1..bs {
            diag[i * bs + k] /= diag[k * bs + k];
            for j in k + 1..bs {
                diag[i * bs + j] -= diag[i * bs + k] * diag[k * bs + j];
            }
        }
    }
}

fn bdiv(diag: &[f32], row: &mut [f32], bs: usize) {
    for i in 0..bs {
        for k in 0..bs {
            row[i * bs + k] /= diag[k * bs + k];
            for j in k + 1..bs {
                row[i * bs + j] -= row[i * bs + k] * diag[k * bs + j];
            }
        }
    }
}

fn bmod(row: &[f32], col: &[f32], inner: &mut [f32], bs: usize) {
    for i in 0..bs {
        for j in 0..bs {
            for k in 0..bs {
                inner[i * bs + j] -= row[i * bs + k] * col[k * bs + j];
            }
        }
    }
}

fn fwd(diag: &[f32], col: &mut [f32], bs: usize) {
    for j in 0..bs {
        for k in 0..bs {
            for i in k + 1..bs {
                col[i * bs + j] -= diag[i * bs + k] * col[k * bs + j];
            }
        }
    }
}

/// Single-threaded factorization over plain blocks.
pub fn factorize_sequential(blocks: &mut [Option<Block>], n: usize, bs: usize) {
    for kk in 0..n {
        let Some(mut diag) = blocks[kk * n + kk].take() else {
            continue;
        };
        lu0(&mut diag, bs);
        for jj in kk + 1..n {
            if let Some(col) = blocks[kk * n + jj].as_mut() {
                fwd(&diag, col, bs);
            }
        }
        for ii in kk + 1..n {
            if let Some(row) = blocks[ii * n + kk].as_mut() {
                bdiv(&diag, row, bs);
            }
        }
        blocks[kk * n + kk] = Some(diag);
        for ii in kk + 1..n {
            let Some(row) = blocks[ii * n + kk].clone() else {
                continue;
            };
            for jj in kk + 1..n {
                let Some(col) = blocks[kk * n + jj].clone() else {
                    continue;
                };
                let inner = blocks[ii * n + jj].get_or_insert_with(|| vec![0.0; bs * bs]);
                bmod(&row, &col, inner, bs);
            }
        }
    }
}

/// Block matrix shared between concurrently running block operations.
#[derive(Debug)]
pub struct SparseMatrix {
    n: usize,
    bs: usize,
    blocks: Vec<Arc<RwLock<Option<Block>>>>,
}

fn poisoned() -> EngineError {
    EngineError::LockPoisoned("sparselu block".into())
}

impl SparseMatrix {
    pub fn generate(n: usize, bs: usize) -> Self {
        Self::from_blocks(n, bs, generate(n, bs))
    }

    fn from_blocks(n: usize, bs: usize, blocks: Vec<Option<Block>>) -> Self {
        Self {
            n,
            bs,
            blocks: blocks.into_iter().map(|b| Arc::new(RwLock::new(b))).collect(),
        }
    }

    fn block(&self, ii: usize, jj: usize) -> &Arc<RwLock<Option<Block>>> {
        &self.blocks[ii * self.n + jj]
    }

    fn read(&self, ii: usize, jj: usize) -> EngineResult<RwLockReadGuard<'_, Option<Block>>> {
        self.block(ii, jj).read().map_err(|_| poisoned())
    }

    fn write(&self, ii: usize, jj: usize) -> EngineResult<RwLockWriteGuard<'_, Option<Block>>> {
        self.block(ii, jj).write().map_err(|_| poisoned())
    }

    fn is_present(&self, ii: usize, jj: usize) -> EngineResult<bool> {
        Ok(self.read(ii, jj)?.is_some())
    }

    /// Copy of every block, for verification.
    pub fn snapshot(&self) -> EngineResult<Vec<Option<Block>>> {
        self.blocks
            .iter()
            .map(|b| b.read().map(|g| g.clone()).map_err(|_| poisoned()))
            .collect()
    }

    /// One line per block row, `x` for a present block.
    pub fn structure(&self) -> EngineResult<String> {
        let mut out = String::with_capacity(self.n * (self.n + 1));
        for ii in 0..self.n {
            for jj in 0..self.n {
                out.push(if self.is_present(ii, jj)? { 'x' } else { ' ' });
            }
            out.push('\n');
        }
        Ok(out)
    }
}

/// A unit of block work on one target block.
#[derive(Debug, Clone, Copy)]
enum BlockOp {
    Fwd { kk: usize, jj: usize },
    Bdiv { kk: usize, ii: usize },
    Bmod { kk: usize, ii: usize, jj: usize },
}

impl BlockOp {
    fn apply(self, m: &SparseMatrix) -> EngineResult<()> {
        let bs = m.bs;
        let missing = || EngineError::failed(format!("{:?} touched an empty block", self));
        match self {
            BlockOp::Fwd { kk, jj } => {
                let diag = m.read(kk, kk)?;
                let mut col = m.write(kk, jj)?;
                fwd(diag.as_deref().ok_or_else(missing)?, col.as_deref_mut().ok_or_else(missing)?, bs);
            }
            BlockOp::Bdiv { kk, ii } => {
                let diag = m.read(kk, kk)?;
                let mut row = m.write(ii, kk)?;
                bdiv(diag.as_deref().ok_or_else(missing)?, row.as_deref_mut().ok_or_else(missing)?, bs);
            }
            BlockOp::Bmod { kk, ii, jj } => {
                let row = m.read(ii, kk)?;
                let col = m.read(kk, jj)?;
                let mut inner = m.write(ii, jj)?;
                let inner = inner.get_or_insert_with(|| vec![0.0; bs * bs]);
                bmod(row.as_deref().ok_or_else(missing)?, col.as_deref().ok_or_else(missing)?, inner, bs);
            }
        }
        Ok(())
    }
}

fn spawn_phase(scheduler: &Scheduler, policy: Policy, m: &Arc<SparseMatrix>, ops: Vec<BlockOp>) -> EngineResult<()> {
    let handles: Vec<Handle<()>> = ops
        .into_iter()
        .map(|op| {
            let m = Arc::clone(m);
            scheduler.spawn(policy, move || op.apply(&m))
        })
        .collect();
    barrier_join(handles)
}

/// Factorize `m` in place, running every block operation under `policy`.
pub fn run(scheduler: &Scheduler, policy: Policy, m: &Arc<SparseMatrix>) -> EngineResult<()> {
    let n = m.n;
    for kk in 0..n {
        {
            let mut diag = m.write(kk, kk)?;
            match diag.as_deref_mut() {
                Some(diag) => lu0(diag, m.bs),
                None => continue,
            }
        }

        let mut phase = Vec::new();
        for jj in kk + 1..n {
            if m.is_present(kk, jj)? {
                phase.push(BlockOp::Fwd { kk, jj });
            }
        }
        for ii in kk + 1..n {
            if m.is_present(ii, kk)? {
                phase.push(BlockOp::Bdiv { kk, ii });
            }
        }
        spawn_phase(scheduler, policy, m, phase)?;

        let cols = (kk + 1..n)
            .filter_map(|jj| m.is_present(kk, jj).map(|p| p.then_some(jj)).transpose())
            .collect::<EngineResult<Vec<_>>>()?;
        let mut phase = Vec::new();
        for ii in kk + 1..n {
            if m.is_present(ii, kk)? {
                phase.extend(cols.iter().map(|&jj| BlockOp::Bmod { kk, ii, jj }));
            }
        }
        spawn_phase(scheduler, policy, m, phase)?;
    }
    Ok(())
}

/// Blocks of `actual` match `expected` in structure and within relative
/// error [`EPSILON`].
pub fn matches(expected: &[Option<Block>], actual: &[Option<Block>]) -> bool {
    expected.len() == actual.len()
        && expected.iter().zip(actual).enumerate().all(|(idx, pair)| match pair {
            (None, None) => true,
            (Some(e), Some(a)) => block_matches(idx, e, a),
            _ => {
                warn!("block {} differs in structure", idx);
                false
            }
        })
}

fn block_matches(idx: usize, expected: &[f32], actual: &[f32]) -> bool {
    expected.iter().zip(actual).enumerate().all(|(k, (&e, &a))| {
        let diff = (e - a).abs();
        if diff == 0.0 {
            return true;
        }
        let ok = e != 0.0 && diff / e.abs() <= EPSILON;
        if !ok {
            warn!("block {} entry {}: expected {}, found {}", idx, k, e, a);
        }
        ok
    })
}

pub struct SparseLuBenchmark {
    pub n: usize,
    pub bs: usize,
    reference: Option<Vec<Option<Block>>>,
    matrix: Option<Arc<SparseMatrix>>,
}

impl SparseLuBenchmark {
    pub fn new(n: usize, bs: usize) -> Self {
        Self {
            n,
            bs,
            reference: None,
            matrix: None,
        }
    }
}

impl Benchmark for SparseLuBenchmark {
    type Output = Arc<SparseMatrix>;

    fn name(&self) -> String {
        format!(
            "SparseLU Factorization ({}x{} matrix with {}x{} blocks) ",
            self.n, self.n, self.bs, self.bs
        )
    }

    fn initialize(&mut self) {
        if self.reference.is_none() {
            let mut blocks = generate(self.n, self.bs);
            factorize_sequential(&mut blocks, self.n, self.bs);
            self.reference = Some(blocks);
        }
        let matrix = SparseMatrix::generate(self.n, self.bs);
        if let Ok(structure) = matrix.structure() {
            debug!("initial structure:\n{}", structure);
        }
        self.matrix = Some(Arc::new(matrix));
    }

    fn execute(&mut self, scheduler: &Scheduler, policy: Policy) -> EngineResult<Arc<SparseMatrix>> {
        let m = self
            .matrix
            .take()
            .ok_or_else(|| EngineError::InvalidInput("matrix not initialized".into()))?;
        run(scheduler, policy, &m)?;
        Ok(m)
    }

    fn check(&self, output: &Arc<SparseMatrix>) -> bool {
        match (&self.reference, output.snapshot()) {
            (Some(reference), Ok(actual)) => matches(reference, &actual),
            _ => false,
        }
    }
}
