//! Sandbox installation: what a fresh VM may and may not reach.
//!
//! Module resolution goes through the project's resource layer, file
//! access goes through the path policy, script output goes to the
//! configured sinks, and the process-touching corners of `os` are removed.

use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::OutputSink;
use coronest_core::Project;
use mlua::{Function, Lua, MultiValue, Table, Value as LuaValue};

/// Glue installed over the fresh globals. Receives the host sinks and the
/// confined open routine; rewires `print`, `io.write`, `io.stderr`, and
/// `io.open`, and strips the process-touching `os` functions.
const SETUP: &str = r##"
local write_out, write_err, open_file = ...

local function render(...)
  local parts = {}
  for i = 1, select("#", ...) do
    parts[i] = tostring(select(i, ...))
  end
  return table.concat(parts)
end

function print(...)
  local parts = {}
  for i = 1, select("#", ...) do
    parts[i] = tostring(select(i, ...))
  end
  write_out(table.concat(parts, "\t") .. "\n")
end

io.write = function(...)
  write_out(render(...))
end

io.stderr = setmetatable({}, {
  __index = {
    write = function(_, ...)
      write_err(render(...))
    end,
  },
})

io.open = open_file

-- Every other filesystem or process door in the standard libraries.
io.lines = nil
io.input = nil
io.output = nil
io.popen = nil
io.tmpfile = nil
loadfile = nil
dofile = nil
package.loadlib = nil
package.cpath = ""

os.execute = nil
os.exit = nil
os.remove = nil
os.rename = nil
os.tmpname = nil
os.setlocale = nil
"##;

/// Installs the sandbox over a freshly created VM. Must run under the VM
/// lock, before any script code.
pub(crate) fn install(
    lua: &Lua,
    project: &Project,
    out: &OutputSink,
    err: &OutputSink,
) -> RuntimeResult<()> {
    restrict_searchers(lua, project)?;

    let original_open: Function = lua
        .globals()
        .get::<Table>("io")?
        .get::<Function>("open")?;
    let policy = project.paths().clone();
    let open_file = lua.create_function(move |_, (path, mode): (String, Option<String>)| {
        match policy.resolve(&path) {
            Ok(resolved) => {
                let resolved = resolved.to_string_lossy().to_string();
                original_open.call::<MultiValue>((resolved, mode))
            }
            Err(refusal) => {
                log::warn!("refused file access: {path}");
                Err(mlua::Error::RuntimeError(refusal.to_string()))
            }
        }
    })?;

    let write_out = writer(lua, out.clone())?;
    let write_err = writer(lua, err.clone())?;

    lua.load(SETUP)
        .set_name("@sandbox")
        .call::<()>((write_out, write_err, open_file))
        .map_err(RuntimeError::from)
}

fn writer(lua: &Lua, sink: OutputSink) -> RuntimeResult<Function> {
    let f = lua.create_function(move |_, text: mlua::String| {
        let mut sink = sink.lock();
        sink.write_all(&text.as_bytes())
            .map_err(mlua::Error::external)?;
        Ok(())
    })?;
    Ok(f)
}

/// Replaces `package.searchers` so that only the preload searcher and the
/// project-resource searcher remain; `require` can no longer reach the
/// filesystem or the host.
fn restrict_searchers(lua: &Lua, project: &Project) -> RuntimeResult<()> {
    let package: Table = lua.globals().get("package")?;
    let searchers: Table = package.get("searchers")?;
    let preload: Function = searchers.get(1)?;

    let resources = project.resources().clone();
    let resource_searcher = lua.create_function(move |lua, name: String| {
        let path = format!("{}.lua", name.replace('.', "/"));
        match resources.read(&path) {
            Some(bytes) => {
                let loader = lua
                    .load(bytes.as_slice())
                    .set_name(format!("@{path}"))
                    .into_function()?;
                Ok((
                    LuaValue::Function(loader),
                    LuaValue::String(lua.create_string(&path)?),
                ))
            }
            None => Ok((
                LuaValue::String(lua.create_string(format!("\n\tno resource '{path}'"))?),
                LuaValue::Nil,
            )),
        }
    })?;

    let fresh = lua.create_table()?;
    fresh.set(1, preload)?;
    fresh.set(2, resource_searcher)?;
    package.set("searchers", fresh)?;
    package.set("path", "")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use coronest_core::{
        CoreResult, DirectoryProject, InlineDispatcher, NullEvaluationSource, PathPolicy,
    };
    use parking_lot::Mutex;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn sink() -> (OutputSink, Arc<Mutex<Vec<u8>>>) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let writer = buffer.clone();
        let sink: OutputSink = Arc::new(Mutex::new(SinkWriter(writer)));
        (sink, buffer)
    }

    struct SinkWriter(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for SinkWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn project(root: &std::path::Path) -> Project {
        let dir = Arc::new(DirectoryProject::new(root));
        Project::new(
            dir.clone(),
            dir,
            Arc::new(InlineDispatcher),
            Arc::new(NullEvaluationSource),
        )
    }

    fn sandboxed(root: &std::path::Path) -> (Lua, Arc<Mutex<Vec<u8>>>, Arc<Mutex<Vec<u8>>>) {
        let lua = Lua::new();
        let (out, out_buf) = sink();
        let (err, err_buf) = sink();
        install(&lua, &project(root), &out, &err).unwrap();
        (lua, out_buf, err_buf)
    }

    #[test]
    fn test_require_resolves_project_resources() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("answer.lua"), "return 42").unwrap();

        let (lua, _, _) = sandboxed(dir.path());
        let value: i64 = lua.load("return require('answer')").eval().unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_require_reports_missing_resources() {
        let dir = tempfile::tempdir().unwrap();
        let (lua, _, _) = sandboxed(dir.path());
        let error = lua.load("return require('missing')").eval::<i64>();
        let message = error.unwrap_err().to_string();
        assert!(message.contains("no resource 'missing.lua'"));
    }

    #[test]
    fn test_open_refuses_paths_outside_project() {
        let dir = tempfile::tempdir().unwrap();
        let (lua, _, _) = sandboxed(dir.path());
        let error = lua
            .load("return io.open('../outside.txt', 'r')")
            .eval::<LuaValue>();
        let message = error.unwrap_err().to_string();
        assert!(message.contains("outside the project root"));
    }

    #[test]
    fn test_open_reads_project_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.txt"), "payload").unwrap();

        let (lua, _, _) = sandboxed(dir.path());
        let content: String = lua
            .load("local f = io.open('data.txt', 'r'); local c = f:read('a'); f:close(); return c")
            .eval()
            .unwrap();
        assert_eq!(content, "payload");
    }

    #[test]
    fn test_print_goes_to_out_sink() {
        let dir = tempfile::tempdir().unwrap();
        let (lua, out, _) = sandboxed(dir.path());
        lua.load("print('a', 1)").exec().unwrap();
        assert_eq!(String::from_utf8(out.lock().clone()).unwrap(), "a\t1\n");
    }

    #[test]
    fn test_stderr_goes_to_err_sink() {
        let dir = tempfile::tempdir().unwrap();
        let (lua, _, err) = sandboxed(dir.path());
        lua.load("io.stderr:write('oops')").exec().unwrap();
        assert_eq!(String::from_utf8(err.lock().clone()).unwrap(), "oops");
    }

    #[test]
    fn test_os_is_hardened() {
        let dir = tempfile::tempdir().unwrap();
        let (lua, _, _) = sandboxed(dir.path());
        let os: Table = lua.globals().get("os").unwrap();
        for name in ["execute", "exit", "remove", "rename", "tmpname", "setlocale"] {
            let value: LuaValue = os.get(name).unwrap();
            assert!(value.is_nil(), "os.{name} should be removed");
        }
        // Time functions stay available.
        let value: LuaValue = os.get("time").unwrap();
        assert!(value.is_function());
    }

    #[test]
    fn test_unconfined_file_doors_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let (lua, _, _) = sandboxed(dir.path());
        for probe in [
            "return io.lines == nil",
            "return io.popen == nil",
            "return io.tmpfile == nil",
            "return loadfile == nil",
            "return dofile == nil",
            "return package.loadlib == nil",
        ] {
            let passes: bool = lua.load(probe).eval().unwrap();
            assert!(passes, "{probe}");
        }
    }

    #[test]
    fn test_policy_errors_surface_as_script_errors() {
        struct DenyAll;
        impl PathPolicy for DenyAll {
            fn resolve(&self, path: &str) -> CoreResult<PathBuf> {
                Err(coronest_core::CoreError::path_outside_project(path))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let lua = Lua::new();
        let (out, _) = sink();
        let (err, _) = sink();
        let dir_project = Arc::new(DirectoryProject::new(dir.path()));
        let project = Project::new(
            dir_project,
            Arc::new(DenyAll),
            Arc::new(InlineDispatcher),
            Arc::new(NullEvaluationSource),
        );
        install(&lua, &project, &out, &err).unwrap();

        let error = lua.load("io.open('anything')").exec().unwrap_err();
        assert!(error.to_string().contains("outside the project root"));
    }
}
