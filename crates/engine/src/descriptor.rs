/// Immutable input bundle for one recursive step.
///
/// Recursion builds new descriptors for children; an existing descriptor is
/// never modified. The depth is carried for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDescriptor<S> {
    input: S,
    depth: usize,
}

impl<S> TaskDescriptor<S> {
    /// Descriptor for the root of a call tree.
    pub fn root(input: S) -> Self {
        Self { input, depth: 0 }
    }

    /// Descriptor for a child one level below `parent_depth`.
    pub fn child(input: S, parent_depth: usize) -> Self {
        Self {
            input,
            depth: parent_depth + 1,
        }
    }

    pub fn input(&self) -> &S {
        &self.input
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Consume the descriptor, yielding its input.
    pub fn into_input(self) -> S {
        self.input
    }
}
