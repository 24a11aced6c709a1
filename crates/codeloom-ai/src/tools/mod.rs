//! Tool registry and the built-in tools.

mod bash;
mod file;
mod registry;

use std::path::Path;

pub use bash::{CommandOutput, DEFAULT_COMMAND_TIMEOUT_SECS, RunCommandTool};
pub use file::{FindFilesTool, ListFilesTool, ReadFileTool, RenameFileTool, WriteFileTool};
pub(crate) use file::normalize_path;
pub use registry::ToolRegistry;

/// Registry with every built-in tool rooted at `workdir`.
pub fn builtin_registry(workdir: &Path, command_timeout_secs: u64) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(ReadFileTool::new(workdir));
    registry.register(ListFilesTool::new(workdir));
    registry.register(FindFilesTool::new(workdir));
    registry.register(WriteFileTool::new(workdir));
    registry.register(RenameFileTool::new(workdir));
    registry.register(RunCommandTool::new(workdir).with_timeout(command_timeout_secs));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_contents() {
        let registry = builtin_registry(Path::new("."), 30);
        assert_eq!(
            registry.list(),
            vec![
                "find_files",
                "list_files",
                "read_file",
                "rename_file",
                "run_command",
                "write_file"
            ]
        );
    }
}
