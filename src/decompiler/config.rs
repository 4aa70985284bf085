//! Configuration for the decompiler.

use crate::script::PROGRAM_START;

/// Configuration for [`ExpressionTree::from_program_with_config`].
///
/// The defaults reproduce the classic behavior for compiled NCS files; every setting can be
/// adjusted with the builder-style `with_*` methods.
///
/// ```rust
/// use ncsdecomp::decompiler::DecompilerConfig;
///
/// let config = DecompilerConfig::default()
///     .with_max_call_depth(32)
///     .with_hoist_declarations(false);
/// assert_eq!(config.entry_offset, 13);
/// assert!(!config.hoist_declarations);
/// ```
///
/// [`ExpressionTree::from_program_with_config`]: crate::decompiler::ExpressionTree::from_program_with_config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecompilerConfig {
    /// Offset of the synthetic entry function (default: 13).
    pub entry_offset: u32,

    /// Maximum nesting of subroutine calls followed during decompilation (default: 64).
    ///
    /// A subroutine reached deeper than this decompiles to an empty block. Every level of
    /// nesting recurses through the block decompiler, so the default stays within a 2 MiB
    /// thread stack in unoptimized builds.
    pub max_call_depth: usize,

    /// Merge adjacent declaration and assignment statements (default: true).
    pub hoist_declarations: bool,

    /// Name the globals initializer and the main function by call depth (default: true).
    pub infer_function_names: bool,

    /// Decompile branches scheduled by the entry function itself (default: true).
    pub drain_entry_branches: bool,
}

impl Default for DecompilerConfig {
    fn default() -> Self {
        Self {
            entry_offset: PROGRAM_START,
            max_call_depth: 64,
            hoist_declarations: true,
            infer_function_names: true,
            drain_entry_branches: true,
        }
    }
}

impl DecompilerConfig {
    /// Sets the entry offset.
    #[must_use]
    pub fn with_entry_offset(mut self, offset: u32) -> Self {
        self.entry_offset = offset;
        self
    }

    /// Sets the maximum call depth.
    #[must_use]
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Enables or disables declaration hoisting.
    #[must_use]
    pub fn with_hoist_declarations(mut self, enabled: bool) -> Self {
        self.hoist_declarations = enabled;
        self
    }

    /// Enables or disables function naming.
    #[must_use]
    pub fn with_infer_function_names(mut self, enabled: bool) -> Self {
        self.infer_function_names = enabled;
        self
    }

    /// Enables or disables decompilation of branches deferred by the entry function.
    #[must_use]
    pub fn with_drain_entry_branches(mut self, enabled: bool) -> Self {
        self.drain_entry_branches = enabled;
        self
    }
}
