//! Floorplan: place cells with alternative shapes on a board so that the
//! bounding footprint has minimal area.
//!
//! The search alternates between two kinds of steps, modelled as one tagged
//! input: an outer step enumerates every shape and north-west corner for the
//! next cell, and an inner step lays one such candidate down on a private
//! copy of the board and recurses into the following cell. The best area and
//! layout found so far live in a shared [`BestRecord`] used for pruning.

use std::path::Path;
use std::sync::Arc;

use inncabs_bench::Benchmark;
use inncabs_core::{InputError, InputResult, Tokens};
use inncabs_engine::{BestRecord, Driver, EngineResult, Policy, RecursiveTask, Scheduler, Step};
use tracing::{debug, info, trace, warn};

pub const ROWS: usize = 64;
pub const COLS: usize = 64;

type Board = Vec<u8>;

/// Cell ids are stored in one board byte each.
pub const MAX_CELLS: usize = u8::MAX as usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellSpec {
    /// Alternative `(rows, cols)` shapes.
    pub shapes: Vec<(i64, i64)>,
    /// Cell this one must sit to the right of; negative for none.
    pub left: i64,
    /// Cell this one must sit below; negative for none.
    pub above: i64,
    /// Cell placed after this one; 0 ends the chain.
    pub next: usize,
}

/// Inclusive bounds of a placed cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    top: i64,
    bot: i64,
    lhs: i64,
    rhs: i64,
}

/// Cell 0 is a sentinel that the first real cell is anchored to.
const SENTINEL: Extent = Extent {
    top: 0,
    bot: 0,
    lhs: -1,
    rhs: -1,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloorplanProblem {
    /// Index 0 is the sentinel; real cells are `1..=n`.
    cells: Vec<CellSpec>,
    /// Expected minimum area, when the input file provides one.
    pub expected_area: Option<i64>,
}

impl FloorplanProblem {
    /// Parse the cell file: `n`, then per cell the shape count, the shapes as
    /// `rows cols` pairs and `left above next`, then an optional expected area.
    pub fn parse(text: &str) -> InputResult<Self> {
        let mut t = Tokens::new(text);
        let n: usize = t.next("cell count")?;
        if n > MAX_CELLS {
            return Err(InputError::Parse {
                line: 1,
                message: format!("{} cells exceed the limit of {}", n, MAX_CELLS),
            });
        }
        let mut cells = Vec::with_capacity(n + 1);
        cells.push(CellSpec {
            shapes: Vec::new(),
            left: 0,
            above: 0,
            next: 0,
        });
        for id in 1..=n {
            let count: usize = t.next(&format!("shape count of cell {}", id))?;
            let shapes = (0..count)
                .map(|_| Ok((t.next("shape rows")?, t.next("shape cols")?)))
                .collect::<InputResult<Vec<(i64, i64)>>>()?;
            let cell = CellSpec {
                shapes,
                left: t.next("left neighbour")?,
                above: t.next("above neighbour")?,
                next: t.next("next cell")?,
            };
            let in_range = |r: i64| r < 0 || (r as usize) <= n;
            if !in_range(cell.left) || !in_range(cell.above) || cell.next > n {
                return Err(InputError::Parse {
                    line: 0,
                    message: format!("cell {} refers to a cell outside 0..={}", id, n),
                });
            }
            cells.push(cell);
        }
        let expected_area = t.next_opt("expected area")?;
        Ok(Self { cells, expected_area })
    }

    pub fn load(path: impl AsRef<Path>) -> InputResult<Self> {
        let path = path.as_ref();
        let problem = Self::parse(&std::fs::read_to_string(path)?)?;
        info!(
            "Loaded floorplan {} with {} cells",
            path.display(),
            problem.cells.len() - 1
        );
        Ok(problem)
    }

    /// Every north-west corner at which shape `shape` of cell `id` can start,
    /// given the placement of its left and above neighbours.
    fn starts(&self, id: usize, shape: usize, extents: &[Extent]) -> Vec<(i64, i64)> {
        let cell = &self.cells[id];
        let (rows, cols) = cell.shapes[shape];
        let neighbour = |r: i64| usize::try_from(r).ok().map(|r| extents[r]);

        match (neighbour(cell.left), neighbour(cell.above)) {
            (Some(left), Some(above)) => {
                let top = above.bot + 1;
                let lhs = left.rhs + 1;
                let bot = top + rows;
                let rhs = lhs + cols;
                let touches = top <= left.bot && bot >= left.top && lhs <= above.rhs && rhs >= above.lhs;
                if touches {
                    vec![(top, lhs)]
                } else {
                    Vec::new()
                }
            }
            (Some(left), None) => {
                let top = (left.top - rows + 1).max(0);
                let bot = left.bot.min(ROWS as i64);
                (top..=bot).map(|row| (row, left.rhs + 1)).collect()
            }
            (None, Some(above)) => {
                let lhs = (above.lhs - cols + 1).max(0);
                let rhs = above.rhs.min(COLS as i64);
                (lhs..=rhs).map(|col| (above.bot + 1, col)).collect()
            }
            (None, None) => Vec::new(),
        }
    }
}

/// Mark the extent of cell `id` on the board. Fails on overlap or when the
/// extent leaves the board.
fn lay_down(board: &mut Board, id: usize, e: Extent) -> bool {
    if e.top < 0 || e.lhs < 0 || e.bot >= ROWS as i64 || e.rhs >= COLS as i64 {
        return false;
    }
    for i in e.top as usize..=e.bot as usize {
        for j in e.lhs as usize..=e.rhs as usize {
            let slot = &mut board[i * COLS + j];
            if *slot != 0 {
                return false;
            }
            // `parse` keeps ids within `MAX_CELLS`.
            *slot = id as u8;
        }
    }
    true
}

/// Best layout found so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub footprint: (i64, i64),
    board: Board,
}

impl Layout {
    pub fn area(&self) -> i64 {
        self.footprint.0 * self.footprint.1
    }

    /// One line per board row inside the footprint; cell `k` is drawn as the
    /// `k`-th capital letter.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for i in 0..self.footprint.0 as usize {
            for j in 0..self.footprint.1 as usize {
                let id = self.board[i * COLS + j];
                out.push(glyph(id));
            }
            out.push('\n');
        }
        out
    }
}

/// Cells 1-26 are `A`-`Z`, 27-52 are `a`-`z`, the rest `#`.
fn glyph(id: u8) -> char {
    match id {
        0 => ' ',
        1..=26 => char::from(b'A' + id - 1),
        27..=52 => char::from(b'a' + id - 27),
        _ => '#',
    }
}

#[derive(Debug, Clone)]
pub enum FloorplanStep {
    /// Enumerate candidates for cell `id`.
    Outer {
        id: usize,
        footprint: (i64, i64),
        board: Arc<Board>,
        extents: Vec<Extent>,
    },
    /// Try one shape at one corner.
    Inner(Candidate),
}

#[derive(Debug, Clone)]
pub struct Candidate {
    id: usize,
    shape: usize,
    corner: (i64, i64),
    footprint: (i64, i64),
    board: Arc<Board>,
    extents: Vec<Extent>,
}

pub struct Floorplan {
    problem: Arc<FloorplanProblem>,
    best: BestRecord<Layout>,
}

impl Floorplan {
    pub fn new(problem: Arc<FloorplanProblem>) -> Self {
        Self {
            problem,
            best: BestRecord::new((ROWS * COLS) as i64),
        }
    }

    fn root(&self) -> FloorplanStep {
        FloorplanStep::Outer {
            id: 1,
            footprint: (0, 0),
            board: Arc::new(vec![0; ROWS * COLS]),
            extents: vec![SENTINEL; self.problem.cells.len()],
        }
    }

    /// Returns the number of candidates visited below the inner step.
    fn place(&self, candidate: Candidate, step: &Step<'_, Self>) -> EngineResult<u64> {
        let Candidate {
            id,
            shape,
            corner,
            footprint,
            board,
            mut extents,
        } = candidate;
        let cell = &self.problem.cells[id];
        let (rows, cols) = cell.shapes[shape];
        let extent = Extent {
            top: corner.0,
            bot: corner.0 + rows - 1,
            lhs: corner.1,
            rhs: corner.1 + cols - 1,
        };
        extents[id] = extent;

        let mut board = Board::clone(&board);
        if !lay_down(&mut board, id, extent) {
            trace!("cell {}, shape {} does not fit", id, shape);
            return Ok(0);
        }

        let footprint = (footprint.0.max(extent.bot + 1), footprint.1.max(extent.rhs + 1));
        let area = footprint.0 * footprint.1;

        if cell.next == 0 {
            self.best.offer_with(area, || Layout { footprint, board })?;
            Ok(0)
        } else if self.best.improves(area) {
            let next = FloorplanStep::Outer {
                id: cell.next,
                footprint,
                board: Arc::new(board),
                extents,
            };
            step.spawn(next).into_result()
        } else {
            trace!("pruned at area {} (best {})", area, self.best.score());
            Ok(0)
        }
    }
}

impl RecursiveTask for Floorplan {
    type Input = FloorplanStep;
    type Output = u64;

    fn name(&self) -> &str {
        "floorplan"
    }

    fn is_base_case(&self, input: &FloorplanStep) -> bool {
        match input {
            FloorplanStep::Outer { id, .. } => self.problem.cells[*id].shapes.is_empty(),
            FloorplanStep::Inner(_) => false,
        }
    }

    fn base_case(&self, _: FloorplanStep) -> EngineResult<u64> {
        Ok(0)
    }

    fn decompose(&self, input: FloorplanStep, step: &Step<'_, Self>) -> EngineResult<u64> {
        match input {
            FloorplanStep::Outer {
                id,
                footprint,
                board,
                extents,
            } => {
                let mut candidates = 0u64;
                let mut handles = Vec::new();
                for shape in 0..self.problem.cells[id].shapes.len() {
                    let corners = self.problem.starts(id, shape, &extents);
                    candidates += corners.len() as u64;
                    for corner in corners {
                        handles.push(step.spawn(FloorplanStep::Inner(Candidate {
                            id,
                            shape,
                            corner,
                            footprint,
                            board: Arc::clone(&board),
                            extents: extents.clone(),
                        })));
                    }
                }
                step.fold(handles, candidates, |total, visited| total + visited)
            }
            FloorplanStep::Inner(candidate) => self.place(candidate, step),
        }
    }
}

/// Outcome of one floorplan search.
#[derive(Debug, Clone)]
pub struct FloorplanResult {
    pub area: i64,
    pub layout: Option<Layout>,
    /// Candidate placements enumerated during the search.
    pub visited: u64,
}

pub fn run(scheduler: &Scheduler, policy: Policy, problem: Arc<FloorplanProblem>) -> EngineResult<FloorplanResult> {
    let task = Floorplan::new(problem);
    let root = task.root();
    let driver = Driver::new(task, scheduler.clone(), policy);
    let visited = driver.run_sync(root)?;
    let (area, layout) = driver.task().best.snapshot()?;
    Ok(FloorplanResult { area, layout, visited })
}

pub struct FloorplanBenchmark {
    label: String,
    problem: Arc<FloorplanProblem>,
}

impl FloorplanBenchmark {
    pub fn new(label: impl Into<String>, problem: FloorplanProblem) -> Self {
        Self {
            label: label.into(),
            problem: Arc::new(problem),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> InputResult<Self> {
        let path = path.as_ref();
        Ok(Self::new(path.display().to_string(), FloorplanProblem::load(path)?))
    }
}

impl Benchmark for FloorplanBenchmark {
    type Output = FloorplanResult;

    fn name(&self) -> String {
        format!("Floorplan with input file \"{}\"", self.label)
    }

    fn execute(&mut self, scheduler: &Scheduler, policy: Policy) -> EngineResult<FloorplanResult> {
        run(scheduler, policy, Arc::clone(&self.problem))
    }

    fn check(&self, output: &FloorplanResult) -> bool {
        if let Some(layout) = &output.layout {
            debug!("Minimum area = {}\n{}", output.area, layout.render());
        }
        match self.problem.expected_area {
            Some(expected) => output.area == expected,
            None => {
                warn!("No expected area in input, accepting any complete layout");
                output.layout.is_some()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use inncabs_core::EngineConfig;

    use super::*;

    const TWO_CELLS: &str = "2\n1\n2 2\n0 -1 2\n2\n1 3\n2 1\n1 -1 0\n6\n";

    #[test]
    fn parse_cells() {
        let problem = FloorplanProblem::parse(TWO_CELLS).unwrap();
        assert_eq!(problem.cells.len(), 3);
        assert_eq!(problem.cells[2].shapes, vec![(1, 3), (2, 1)]);
        assert_eq!(problem.cells[1].next, 2);
        assert_eq!(problem.expected_area, Some(6));
    }

    #[test]
    fn expected_area_is_optional() {
        let problem = FloorplanProblem::parse("1\n1\n1 1\n0 -1 0\n").unwrap();
        assert_eq!(problem.expected_area, None);
    }

    #[test]
    fn too_many_cells_are_rejected() {
        let text = format!("{}\n", MAX_CELLS + 1);
        assert!(matches!(
            FloorplanProblem::parse(&text),
            Err(InputError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn glyphs_cover_every_cell_id() {
        assert_eq!(glyph(0), ' ');
        assert_eq!(glyph(1), 'A');
        assert_eq!(glyph(26), 'Z');
        assert_eq!(glyph(27), 'a');
        assert_eq!(glyph(52), 'z');
        assert_eq!(glyph(200), '#');
        assert_eq!(glyph(u8::MAX), '#');
    }

    #[test]
    fn dangling_reference_is_rejected() {
        assert!(matches!(
            FloorplanProblem::parse("1\n1\n1 1\n0 -1 5\n"),
            Err(InputError::Parse { .. })
        ));
        assert!(matches!(
            FloorplanProblem::parse("2\n1\n1 1\n0 -1 2\n"),
            Err(InputError::Missing(_))
        ));
    }

    #[test]
    fn first_cell_anchors_at_origin() {
        let problem = FloorplanProblem::parse(TWO_CELLS).unwrap();
        let extents = vec![SENTINEL; 3];
        assert_eq!(problem.starts(1, 0, &extents), vec![(0, 0)]);
    }

    #[test]
    fn overlapping_lay_down_fails() {
        let mut board = vec![0; ROWS * COLS];
        let a = Extent { top: 0, bot: 1, lhs: 0, rhs: 1 };
        let b = Extent { top: 1, bot: 1, lhs: 1, rhs: 3 };
        assert!(lay_down(&mut board, 1, a));
        assert!(!lay_down(&mut board, 2, b));
        let off_board = Extent { top: 63, bot: 64, lhs: 0, rhs: 0 };
        assert!(!lay_down(&mut board, 3, off_board));
    }

    #[test]
    fn two_cells_pack_into_area_six() {
        let scheduler = Scheduler::new(EngineConfig {
            worker_threads: 2,
            ..EngineConfig::default()
        })
        .unwrap();
        let problem = Arc::new(FloorplanProblem::parse(TWO_CELLS).unwrap());
        for policy in Policy::ALL {
            let result = run(&scheduler, policy, Arc::clone(&problem)).unwrap();
            assert_eq!(result.area, 6, "{}", policy);
            assert_eq!(result.visited, 5, "{}", policy);
            assert_eq!(result.layout.unwrap().footprint, (2, 3));
        }
    }

    #[test]
    fn render_uses_letters() {
        let mut board = vec![0; ROWS * COLS];
        lay_down(&mut board, 1, Extent { top: 0, bot: 1, lhs: 0, rhs: 1 });
        lay_down(&mut board, 2, Extent { top: 0, bot: 0, lhs: 2, rhs: 2 });
        let layout = Layout { footprint: (2, 3), board };
        assert_eq!(layout.area(), 6);
        assert_eq!(layout.render(), "AAB\nAA \n");
    }
}
