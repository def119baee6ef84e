//! Interaction-net reduction of unary arithmetic.
//!
//! The net `end(mul(N, N))` is built from zero/successor chains and reduced
//! by firing rewrite rules on every cut (two cells joined at their principal
//! ports) concurrently. Cells live in an append-only arena, each behind its
//! own mutex. A reduction reads its cut without holding locks, locks the two
//! cells and all their neighbours in ascending id order, validates what it
//! read and then rewires, retrying when a neighbour changed in between.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use inncabs_bench::Benchmark;
use inncabs_engine::{
    lock_ordered, retry_validated, Attempt, Driver, EngineError, EngineResult, Policy, RecursiveTask, Scheduler, Step,
};
use tracing::{debug, trace};

/// Cell kinds, ordered so that the larger symbol of a cut owns the rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Symbol {
    End,
    Mul,
    Add,
    Zero,
    Dup,
    Eraser,
    Succ,
}

impl Symbol {
    pub fn arity(self) -> usize {
        match self {
            Symbol::End | Symbol::Zero | Symbol::Eraser => 1,
            Symbol::Succ => 2,
            Symbol::Add | Symbol::Mul | Symbol::Dup => 3,
        }
    }

    pub fn glyph(self) -> char {
        match self {
            Symbol::End => '#',
            Symbol::Mul => '*',
            Symbol::Add => '+',
            Symbol::Zero => '0',
            Symbol::Dup => 'd',
            Symbol::Eraser => 'e',
            Symbol::Succ => 's',
        }
    }
}

/// One end of a wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Port {
    pub cell: usize,
    pub port: usize,
}

impl Port {
    fn new(cell: usize, port: usize) -> Self {
        Self { cell, port }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellData {
    pub symbol: Symbol,
    ports: [Option<Port>; 3],
    pub alive: bool,
}

impl CellData {
    fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            ports: [None; 3],
            alive: true,
        }
    }

    pub fn port(&self, index: usize) -> Option<Port> {
        if index < self.symbol.arity() {
            self.ports[index]
        } else {
            None
        }
    }

    fn principal(&self) -> Option<usize> {
        self.port(0).map(|p| p.cell)
    }

    fn neighbour(&self, index: usize) -> Option<usize> {
        self.port(index).map(|p| p.cell)
    }
}

fn lock_error(what: &str) -> EngineError {
    EngineError::LockPoisoned(format!("intersim {}", what))
}

/// Append-only arena of cells.
#[derive(Debug, Default)]
pub struct Net {
    cells: RwLock<Vec<Arc<Mutex<CellData>>>>,
}

impl Net {
    fn from_cells(cells: Vec<CellData>) -> Self {
        Self {
            cells: RwLock::new(cells.into_iter().map(|c| Arc::new(Mutex::new(c))).collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.cells.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cell(&self, id: usize) -> EngineResult<Arc<Mutex<CellData>>> {
        let cells = self.cells.read().map_err(|_| lock_error("arena"))?;
        cells
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::failed(format!("dangling cell reference {}", id)))
    }

    /// Copy of a cell, locked only for the duration of the copy.
    pub fn read(&self, id: usize) -> EngineResult<CellData> {
        let cell = self.cell(id)?;
        let data = cell.lock().map_err(|_| lock_error("cell"))?;
        Ok(data.clone())
    }

    fn alloc(&self, symbol: Symbol) -> EngineResult<usize> {
        let mut cells = self.cells.write().map_err(|_| lock_error("arena"))?;
        cells.push(Arc::new(Mutex::new(CellData::new(symbol))));
        Ok(cells.len() - 1)
    }

    /// Value of the zero/successor chain starting at `cell`, if it is one.
    pub fn to_value(&self, mut cell: usize) -> EngineResult<Option<u64>> {
        let mut value = 0;
        loop {
            let data = self.read(cell)?;
            match (data.symbol, data.neighbour(1)) {
                (Symbol::Zero, _) => return Ok(Some(value)),
                (Symbol::Succ, Some(pred)) => {
                    value += 1;
                    cell = pred;
                }
                _ => return Ok(None),
            }
        }
    }
}

/// Single-threaded construction of an initial net.
#[derive(Debug, Default)]
pub struct NetBuilder {
    cells: Vec<CellData>,
}

impl NetBuilder {
    fn add(&mut self, symbol: Symbol) -> usize {
        self.cells.push(CellData::new(symbol));
        self.cells.len() - 1
    }

    fn link(&mut self, a: Port, b: Port) {
        self.cells[a.cell].ports[a.port] = Some(b);
        self.cells[b.cell].ports[b.port] = Some(a);
    }

    /// Chain of `value` successors ending in zero; returns the outermost cell.
    pub fn number(&mut self, value: u64) -> usize {
        let mut top = self.add(Symbol::Zero);
        for _ in 0..value {
            let succ = self.add(Symbol::Succ);
            self.link(Port::new(succ, 1), Port::new(top, 0));
            top = succ;
        }
        top
    }

    fn binary(&mut self, symbol: Symbol, lhs: Port, rhs: Port) -> Port {
        let cell = self.add(symbol);
        self.link(Port::new(cell, 0), lhs);
        self.link(Port::new(cell, 2), rhs);
        Port::new(cell, 1)
    }

    pub fn add_op(&mut self, lhs: Port, rhs: Port) -> Port {
        self.binary(Symbol::Add, lhs, rhs)
    }

    pub fn mul_op(&mut self, lhs: Port, rhs: Port) -> Port {
        self.binary(Symbol::Mul, lhs, rhs)
    }

    pub fn end(&mut self, result: Port) -> usize {
        let cell = self.add(Symbol::End);
        self.link(Port::new(cell, 0), result);
        cell
    }

    pub fn build(self) -> Net {
        Net::from_cells(self.cells)
    }
}

/// `end(mul(n, n))`; returns the net and the id of the end cell.
pub fn square_net(n: u64) -> (Net, usize) {
    let mut b = NetBuilder::default();
    let lhs = b.number(n);
    let rhs = b.number(n);
    let product = b.mul_op(Port::new(lhs, 0), Port::new(rhs, 0));
    let end = b.end(product);
    (b.build(), end)
}

/// Local copy of the locked cells plus any cells created by the rule.
struct Rewrite<'n> {
    net: &'n Net,
    cells: BTreeMap<usize, CellData>,
    created: Vec<usize>,
}

impl<'n> Rewrite<'n> {
    fn data(&mut self, id: usize) -> EngineResult<&mut CellData> {
        self.cells
            .get_mut(&id)
            .ok_or_else(|| EngineError::failed(format!("cell {} is not locked by this rewrite", id)))
    }

    fn port(&mut self, cell: usize, index: usize) -> EngineResult<Port> {
        self.data(cell)?
            .port(index)
            .ok_or_else(|| EngineError::failed(format!("cell {} has no wire on port {}", cell, index)))
    }

    fn link(&mut self, a: Port, b: Port) -> EngineResult<()> {
        self.data(a.cell)?.ports[a.port] = Some(b);
        self.data(b.cell)?.ports[b.port] = Some(a);
        Ok(())
    }

    fn die(&mut self, cell: usize) -> EngineResult<()> {
        self.data(cell)?.alive = false;
        Ok(())
    }

    fn create(&mut self, symbol: Symbol) -> EngineResult<usize> {
        let id = self.net.alloc(symbol)?;
        self.cells.insert(id, CellData::new(symbol));
        self.created.push(id);
        Ok(id)
    }

    fn is_cut(&self, a: usize, b: usize) -> bool {
        let principal = |c: usize| self.cells.get(&c).and_then(CellData::principal);
        principal(a) == Some(b) && principal(b) == Some(a)
    }

    /// Fire the rule for the cut `a`-`b`, where `a` has the larger symbol.
    /// Returns the cells of newly created cuts, or `None` if no rule applies.
    fn fire(&mut self, a: usize, b: usize, sa: Symbol, sb: Symbol) -> EngineResult<Option<Vec<usize>>> {
        let p = Port::new;
        let mut cuts = Vec::new();
        match (sa, sb) {
            (Symbol::Zero, Symbol::Add) => {
                let x = self.port(b, 1)?;
                let y = self.port(b, 2)?;
                self.link(x, y)?;
                self.die(a)?;
                self.die(b)?;
                if self.is_cut(x.cell, y.cell) {
                    cuts.push(x.cell);
                }
            }
            (Symbol::Zero, Symbol::Mul) => {
                let x = self.port(b, 1)?;
                let y = self.port(b, 2)?;
                let e = self.create(Symbol::Eraser)?;
                self.link(p(a, 0), x)?;
                self.link(p(e, 0), y)?;
                self.die(b)?;
                if self.is_cut(a, x.cell) {
                    cuts.push(x.cell);
                }
                if self.is_cut(e, y.cell) {
                    cuts.push(y.cell);
                }
            }
            (Symbol::Dup, Symbol::Zero) => {
                let x = self.port(a, 1)?;
                let y = self.port(a, 2)?;
                let n = self.create(Symbol::Zero)?;
                self.link(p(b, 0), x)?;
                self.link(p(n, 0), y)?;
                self.die(a)?;
                if self.is_cut(b, x.cell) {
                    cuts.push(x.cell);
                }
                if self.is_cut(n, y.cell) {
                    cuts.push(y.cell);
                }
            }
            (Symbol::Succ, Symbol::Add) => {
                let x = self.port(a, 1)?;
                let y = self.port(b, 1)?;
                self.link(x, p(b, 0))?;
                self.link(y, p(a, 0))?;
                self.link(p(a, 1), p(b, 1))?;
                if self.is_cut(x.cell, b) {
                    cuts.push(x.cell);
                }
                if self.is_cut(y.cell, a) {
                    cuts.push(y.cell);
                }
            }
            (Symbol::Succ, Symbol::Mul) => {
                let x = self.port(a, 1)?;
                let y = self.port(b, 1)?;
                let z = self.port(b, 2)?;
                let add = self.create(Symbol::Add)?;
                let dup = self.create(Symbol::Dup)?;
                self.link(p(b, 0), x)?;
                self.link(p(b, 1), p(add, 0))?;
                self.link(p(b, 2), p(dup, 1))?;
                self.link(p(add, 1), y)?;
                self.link(p(add, 2), p(dup, 2))?;
                self.link(p(dup, 0), z)?;
                self.die(a)?;
                if self.is_cut(x.cell, b) {
                    cuts.push(x.cell);
                }
                if self.is_cut(dup, z.cell) {
                    cuts.push(dup);
                }
            }
            (Symbol::Succ, Symbol::Dup) => {
                let x = self.port(a, 1)?;
                let y = self.port(b, 1)?;
                let z = self.port(b, 2)?;
                let succ = self.create(Symbol::Succ)?;
                self.link(p(b, 0), x)?;
                self.link(p(b, 1), p(succ, 1))?;
                self.link(p(b, 2), p(a, 1))?;
                self.link(p(succ, 0), z)?;
                self.link(p(a, 0), y)?;
                if self.is_cut(x.cell, b) {
                    cuts.push(x.cell);
                }
                if self.is_cut(y.cell, a) {
                    cuts.push(y.cell);
                }
                if self.is_cut(z.cell, succ) {
                    cuts.push(z.cell);
                }
            }
            (Symbol::Succ, Symbol::Eraser) => {
                let x = self.port(a, 1)?;
                self.link(p(b, 0), x)?;
                self.die(a)?;
                if self.is_cut(x.cell, b) {
                    cuts.push(x.cell);
                }
            }
            (Symbol::Eraser, Symbol::Zero) => {
                self.die(a)?;
                self.die(b)?;
            }
            _ => {
                trace!("no rule for {} {}", sa.glyph(), sb.glyph());
                return Ok(None);
            }
        }
        Ok(Some(cuts))
    }
}

/// Outcome of one attempt to reduce a cut.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Reduction {
    /// The cut was already reduced by someone else.
    Stale,
    /// No rule applies to the pair.
    Inert,
    Fired(Vec<usize>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redex {
    /// Find every cut in the initial net.
    Scan,
    /// Reduce the cut containing this cell.
    Cut(usize),
}

pub struct Intersim {
    net: Arc<Net>,
}

impl Intersim {
    pub fn new(net: Arc<Net>) -> Self {
        Self { net }
    }

    fn attempt(&self, start: usize) -> EngineResult<Attempt<Reduction>> {
        let first = self.net.read(start)?;
        if !first.alive {
            return Ok(Attempt::Commit(Reduction::Stale));
        }
        let partner = first
            .principal()
            .ok_or_else(|| EngineError::failed(format!("cell {} has no principal wire", start)))?;
        let second = self.net.read(partner)?;
        let ((a, seen_a), (b, seen_b)) = if first.symbol < second.symbol {
            ((partner, second), (start, first))
        } else {
            ((start, first), (partner, second))
        };
        let neighbours = [
            seen_a.neighbour(1),
            seen_a.neighbour(2),
            seen_b.neighbour(1),
            seen_b.neighbour(2),
        ];

        let handles = [Some(a), Some(b)]
            .into_iter()
            .chain(neighbours)
            .flatten()
            .map(|id| Ok((id, self.net.cell(id)?)))
            .collect::<EngineResult<Vec<_>>>()?;
        let mut guards = lock_ordered(handles.iter().map(|(id, cell)| (*id, cell.as_ref())).collect())?;

        let (Some(now_a), Some(now_b)) = (guards.get(&a), guards.get(&b)) else {
            return Err(EngineError::failed("cut cells missing from lock set"));
        };
        let current = [
            now_a.neighbour(1),
            now_a.neighbour(2),
            now_b.neighbour(1),
            now_b.neighbour(2),
        ];
        let valid = now_a.alive
            && now_b.alive
            && now_a.principal() == Some(b)
            && now_a.symbol == seen_a.symbol
            && now_b.symbol == seen_b.symbol
            && current == neighbours
            && neighbours.iter().flatten().all(|id| guards.get(id).is_some_and(|c| c.alive));
        if !valid {
            return Ok(if now_a.alive {
                Attempt::Retry
            } else {
                Attempt::Commit(Reduction::Stale)
            });
        }

        let mut rewrite = Rewrite {
            net: &self.net,
            cells: guards
                .keys()
                .filter_map(|id| guards.get(id).map(|c| (*id, c.clone())))
                .collect(),
            created: Vec::new(),
        };
        let Some(cuts) = rewrite.fire(a, b, seen_a.symbol, seen_b.symbol)? else {
            return Ok(Attempt::Commit(Reduction::Inert));
        };

        for id in &rewrite.created {
            let cell = self.net.cell(*id)?;
            let mut slot = cell.lock().map_err(|_| lock_error("cell"))?;
            if let Some(data) = rewrite.cells.get(id) {
                *slot = data.clone();
            }
        }
        for (id, data) in rewrite.cells {
            if let Some(slot) = guards.get_mut(&id) {
                *slot = data;
            }
        }
        Ok(Attempt::Commit(Reduction::Fired(cuts)))
    }

    fn scan(&self) -> EngineResult<Vec<usize>> {
        let mut cuts = Vec::new();
        for id in 0..self.net.len() {
            let cell = self.net.read(id)?;
            if let Some(partner) = cell.principal() {
                if id < partner && self.net.read(partner)?.principal() == Some(id) {
                    cuts.push(id);
                }
            }
        }
        Ok(cuts)
    }
}

impl RecursiveTask for Intersim {
    type Input = Redex;
    /// Number of rules fired.
    type Output = u64;

    fn name(&self) -> &str {
        "intersim"
    }

    fn is_base_case(&self, _: &Redex) -> bool {
        false
    }

    fn base_case(&self, _: Redex) -> EngineResult<u64> {
        Ok(0)
    }

    fn decompose(&self, input: Redex, step: &Step<'_, Self>) -> EngineResult<u64> {
        let mut cut = match input {
            Redex::Scan => {
                let cuts = self.scan()?;
                debug!("found {} initial cut(s)", cuts.len());
                let handles = cuts.into_iter().map(|c| step.spawn(Redex::Cut(c))).collect();
                return step.fold(handles, 0, |total, fired| total + fired);
            }
            Redex::Cut(cell) => cell,
        };

        // A single follow-up cut continues on this step.
        let mut fired = 0;
        loop {
            match retry_validated(|| self.attempt(cut))? {
                Reduction::Stale | Reduction::Inert => return Ok(fired),
                Reduction::Fired(cuts) => {
                    fired += 1;
                    match cuts.as_slice() {
                        [next] => cut = *next,
                        _ => {
                            let handles = cuts.into_iter().map(|c| step.spawn(Redex::Cut(c))).collect();
                            return step.fold(handles, fired, |total, more| total + more);
                        }
                    }
                }
            }
        }
    }
}

/// Reduce `net` to normal form; returns the number of rules fired.
pub fn run(scheduler: &Scheduler, policy: Policy, net: Arc<Net>) -> EngineResult<u64> {
    Driver::new(Intersim::new(net), scheduler.clone(), policy).run_sync(Redex::Scan)
}

/// Value wired to the end cell, if it is a number.
pub fn result_value(net: &Net, end: usize) -> EngineResult<Option<u64>> {
    match net.read(end)?.neighbour(0) {
        Some(cell) => net.to_value(cell),
        None => Ok(None),
    }
}

pub struct IntersimBenchmark {
    pub n: u64,
    net: Option<(Arc<Net>, usize)>,
}

impl IntersimBenchmark {
    pub fn new(n: u64) -> Self {
        Self { n, net: None }
    }
}

impl Benchmark for IntersimBenchmark {
    type Output = u64;

    fn name(&self) -> String {
        format!("Intersim (N = {})", self.n)
    }

    fn initialize(&mut self) {
        let (net, end) = square_net(self.n);
        self.net = Some((Arc::new(net), end));
    }

    fn execute(&mut self, scheduler: &Scheduler, policy: Policy) -> EngineResult<u64> {
        let (net, _) = self
            .net
            .as_ref()
            .ok_or_else(|| EngineError::InvalidInput("net not initialized".into()))?;
        run(scheduler, policy, Arc::clone(net))
    }

    fn check(&self, _: &u64) -> bool {
        let Some((net, end)) = &self.net else {
            return false;
        };
        match result_value(net, *end) {
            Ok(value) => value == Some(self.n * self.n),
            Err(e) => {
                debug!("reading result failed: {}", e);
                false
            }
        }
    }
}
